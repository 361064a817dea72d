//! XCA cross-gateway document query and retrieve: ebXML AdhocQueryRequest
//! and XDS.b RetrieveDocumentSetRequest envelopes.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use roxmltree::{Document, Node};
use std::io::Cursor;

use crate::types::DocumentQueryParams;
use crate::Result;

const SOAP_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
const QUERY_NS: &str = "urn:oasis:names:tc:ebxml-regrep:xsd:query:3.0";
const RIM_NS: &str = "urn:oasis:names:tc:ebxml-regrep:xsd:rim:3.0";
const XDS_NS: &str = "urn:ihe:iti:xds-b:2007";
const WSA_NS: &str = "http://www.w3.org/2005/08/addressing";
const QUERY_ACTION: &str = "urn:ihe:iti:2007:CrossGatewayQuery";
const RETRIEVE_ACTION: &str = "urn:ihe:iti:2007:CrossGatewayRetrieve";
/// FindDocuments stored query id.
const FIND_DOCUMENTS_QUERY_ID: &str = "urn:uuid:14d4debf-8f97-4251-9a74-a90016b0af0d";
/// XDSDocumentEntry.uniqueId identification scheme.
const UNIQUE_ID_SCHEME: &str = "urn:uuid:2e82c1f6-a085-4c72-9da3-8640a32e42ab";
const APPROVED_STATUS: &str = "'urn:oasis:names:tc:ebxml-regrep:StatusType:Approved'";

type XmlWriter = Writer<Cursor<Vec<u8>>>;

fn start(writer: &mut XmlWriter, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
    let mut elem = BytesStart::new(name);
    for (k, v) in attrs {
        elem.push_attribute((*k, *v));
    }
    writer.write_event(Event::Start(elem))?;
    Ok(())
}

fn end(writer: &mut XmlWriter, name: &str) -> Result<()> {
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn text_element(writer: &mut XmlWriter, name: &str, text: &str) -> Result<()> {
    start(writer, name, &[])?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    end(writer, name)
}

fn slot(writer: &mut XmlWriter, name: &str, value: &str) -> Result<()> {
    start(writer, "rim:Slot", &[("name", name)])?;
    start(writer, "rim:ValueList", &[])?;
    text_element(writer, "rim:Value", value)?;
    end(writer, "rim:ValueList")?;
    end(writer, "rim:Slot")
}

/// Build a FindDocuments query scoped to one patient in one community.
pub fn build_query_request(params: &DocumentQueryParams, query_id: &str) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    start(
        &mut writer,
        "soap:Envelope",
        &[
            ("xmlns:soap", SOAP_NS),
            ("xmlns:query", QUERY_NS),
            ("xmlns:rim", RIM_NS),
            ("xmlns:wsa", WSA_NS),
        ],
    )?;
    start(&mut writer, "soap:Header", &[])?;
    text_element(&mut writer, "wsa:Action", QUERY_ACTION)?;
    text_element(&mut writer, "wsa:MessageID", &format!("urn:uuid:{query_id}"))?;
    end(&mut writer, "soap:Header")?;

    start(&mut writer, "soap:Body", &[])?;
    start(&mut writer, "query:AdhocQueryRequest", &[("federated", "false")])?;
    start(&mut writer, "rim:AdhocQuery", &[("id", FIND_DOCUMENTS_QUERY_ID)])?;

    let community = params.home_community_id.as_deref().unwrap_or_default();
    slot(
        &mut writer,
        "$XDSDocumentEntryPatientId",
        &format!("'{}^^^&{}&ISO'", params.patient_id, community),
    )?;
    slot(&mut writer, "$XDSDocumentEntryStatus", APPROVED_STATUS)?;
    if let Some(from) = &params.date_from {
        slot(
            &mut writer,
            "$XDSDocumentEntryCreationTimeFrom",
            &from.replace('-', ""),
        )?;
    }
    if let Some(to) = &params.date_to {
        slot(
            &mut writer,
            "$XDSDocumentEntryCreationTimeTo",
            &to.replace('-', ""),
        )?;
    }

    end(&mut writer, "rim:AdhocQuery")?;
    end(&mut writer, "query:AdhocQueryRequest")?;
    end(&mut writer, "soap:Body")?;
    end(&mut writer, "soap:Envelope")?;

    let bytes = writer.into_inner().into_inner();
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Build a retrieve for one document in one repository.
pub fn build_retrieve_request(
    home_community_id: &str,
    repository_unique_id: &str,
    document_unique_id: &str,
    query_id: &str,
) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    start(
        &mut writer,
        "soap:Envelope",
        &[("xmlns:soap", SOAP_NS), ("xmlns:xds", XDS_NS), ("xmlns:wsa", WSA_NS)],
    )?;
    start(&mut writer, "soap:Header", &[])?;
    text_element(&mut writer, "wsa:Action", RETRIEVE_ACTION)?;
    text_element(&mut writer, "wsa:MessageID", &format!("urn:uuid:{query_id}"))?;
    end(&mut writer, "soap:Header")?;

    start(&mut writer, "soap:Body", &[])?;
    start(&mut writer, "xds:RetrieveDocumentSetRequest", &[])?;
    start(&mut writer, "xds:DocumentRequest", &[])?;
    text_element(&mut writer, "xds:HomeCommunityId", home_community_id)?;
    text_element(&mut writer, "xds:RepositoryUniqueId", repository_unique_id)?;
    text_element(&mut writer, "xds:DocumentUniqueId", document_unique_id)?;
    end(&mut writer, "xds:DocumentRequest")?;
    end(&mut writer, "xds:RetrieveDocumentSetRequest")?;
    end(&mut writer, "soap:Body")?;
    end(&mut writer, "soap:Envelope")?;

    let bytes = writer.into_inner().into_inner();
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[derive(Debug, Clone)]
pub struct XcaDocument {
    pub document_unique_id: Option<String>,
    pub repository_unique_id: Option<String>,
    pub title: Option<String>,
    pub creation_time: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<String>,
}

#[derive(Debug, Clone)]
pub struct XcaRetrievedDocument {
    pub document_unique_id: String,
    pub repository_unique_id: Option<String>,
    pub home_community_id: Option<String>,
    pub mime_type: Option<String>,
    /// Base64 document bytes as carried on the wire.
    pub content: String,
}

fn child<'a>(node: Node<'a, 'a>, name: &str) -> Option<Node<'a, 'a>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn descendant<'a>(node: Node<'a, 'a>, name: &str) -> Option<Node<'a, 'a>> {
    node.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn node_text(node: Node) -> Option<String> {
    let text: String = node
        .descendants()
        .filter_map(|n| n.text())
        .collect::<Vec<_>>()
        .join("");
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn slot_value<'a>(object: Node<'a, 'a>, name: &str) -> Option<String> {
    object
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "Slot")
        .find(|n| n.attribute("name") == Some(name))
        .and_then(|n| descendant(n, "Value"))
        .and_then(node_text)
}

/// Pull document entries out of an AdhocQueryResponse.
pub fn parse_query_response(xml: &str) -> Result<Vec<XcaDocument>> {
    let doc = Document::parse(xml)?;
    let Some(list) = descendant(doc.root(), "RegistryObjectList") else {
        return Ok(Vec::new());
    };

    let mut documents = Vec::new();
    for object in list
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "ExtrinsicObject")
    {
        let document_unique_id = object
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "ExternalIdentifier")
            .find(|n| n.attribute("identificationScheme") == Some(UNIQUE_ID_SCHEME))
            .and_then(|n| n.attribute("value"))
            .map(str::to_string);

        documents.push(XcaDocument {
            document_unique_id,
            repository_unique_id: slot_value(object, "repositoryUniqueId"),
            title: child(object, "Name")
                .and_then(|n| child(n, "LocalizedString"))
                .and_then(|n| n.attribute("value"))
                .map(str::to_string),
            creation_time: slot_value(object, "creationTime"),
            mime_type: object.attribute("mimeType").map(str::to_string),
            size: slot_value(object, "size"),
        });
    }
    Ok(documents)
}

/// Pull the document out of a RetrieveDocumentSetResponse, if present.
pub fn parse_retrieve_response(xml: &str) -> Result<Option<XcaRetrievedDocument>> {
    let doc = Document::parse(xml)?;
    let Some(response) = descendant(doc.root(), "DocumentResponse") else {
        return Ok(None);
    };
    let Some(document_unique_id) = child(response, "DocumentUniqueId").and_then(node_text) else {
        return Ok(None);
    };

    Ok(Some(XcaRetrievedDocument {
        document_unique_id,
        repository_unique_id: child(response, "RepositoryUniqueId").and_then(node_text),
        home_community_id: child(response, "HomeCommunityId").and_then(node_text),
        mime_type: child(response, "mimeType").and_then(node_text),
        content: child(response, "Document").and_then(node_text).unwrap_or_default(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_request_scopes_patient_and_status() {
        let params = DocumentQueryParams {
            patient_id: "EPIC-123".into(),
            home_community_id: Some("2.16.840.1.113883.3.6147".into()),
            document_type: None,
            date_from: Some("2024-01-01".into()),
            date_to: None,
        };
        let xml = build_query_request(&params, "query-2").unwrap();

        assert!(xml.contains("urn:ihe:iti:2007:CrossGatewayQuery"));
        assert!(xml.contains("'EPIC-123^^^&amp;2.16.840.1.113883.3.6147&amp;ISO'"));
        assert!(xml.contains("$XDSDocumentEntryStatus"));
        assert!(xml.contains("$XDSDocumentEntryCreationTimeFrom"));
        assert!(xml.contains("20240101"));
        assert!(!xml.contains("CreationTimeTo"));
    }

    #[test]
    fn query_response_entries_are_extracted() {
        let xml = r#"<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope"
            xmlns:query="urn:oasis:names:tc:ebxml-regrep:xsd:query:3.0"
            xmlns:rim="urn:oasis:names:tc:ebxml-regrep:xsd:rim:3.0">
          <soap:Body>
            <query:AdhocQueryResponse>
              <rim:RegistryObjectList>
                <rim:ExtrinsicObject mimeType="text/xml">
                  <rim:Slot name="repositoryUniqueId"><rim:ValueList><rim:Value>1.3.6.1.4.1.21367.2005.3.7</rim:Value></rim:ValueList></rim:Slot>
                  <rim:Slot name="creationTime"><rim:ValueList><rim:Value>20240315</rim:Value></rim:ValueList></rim:Slot>
                  <rim:Slot name="size"><rim:ValueList><rim:Value>2048</rim:Value></rim:ValueList></rim:Slot>
                  <rim:Name><rim:LocalizedString value="Discharge Summary"/></rim:Name>
                  <rim:ExternalIdentifier identificationScheme="urn:uuid:2e82c1f6-a085-4c72-9da3-8640a32e42ab" value="1.2.3.4.5"/>
                </rim:ExtrinsicObject>
              </rim:RegistryObjectList>
            </query:AdhocQueryResponse>
          </soap:Body>
        </soap:Envelope>"#;

        let documents = parse_query_response(xml).unwrap();
        assert_eq!(documents.len(), 1);
        let doc = &documents[0];
        assert_eq!(doc.document_unique_id.as_deref(), Some("1.2.3.4.5"));
        assert_eq!(
            doc.repository_unique_id.as_deref(),
            Some("1.3.6.1.4.1.21367.2005.3.7")
        );
        assert_eq!(doc.title.as_deref(), Some("Discharge Summary"));
        assert_eq!(doc.creation_time.as_deref(), Some("20240315"));
        assert_eq!(doc.mime_type.as_deref(), Some("text/xml"));
        assert_eq!(doc.size.as_deref(), Some("2048"));
    }

    #[test]
    fn retrieve_round_trip_through_the_codec() {
        let request = build_retrieve_request(
            "2.16.840.1.113883.3.6147",
            "1.3.6.1.4.1.21367.2005.3.7",
            "1.2.3.4.5",
            "query-3",
        )
        .unwrap();
        assert!(request.contains("urn:ihe:iti:2007:CrossGatewayRetrieve"));
        assert!(request.contains("<xds:DocumentUniqueId>1.2.3.4.5</xds:DocumentUniqueId>"));

        let response = r#"<Envelope><Body>
          <RetrieveDocumentSetResponse>
            <DocumentResponse>
              <HomeCommunityId>2.16.840.1.113883.3.6147</HomeCommunityId>
              <RepositoryUniqueId>1.3.6.1.4.1.21367.2005.3.7</RepositoryUniqueId>
              <DocumentUniqueId>1.2.3.4.5</DocumentUniqueId>
              <mimeType>text/xml</mimeType>
              <Document>PENsaW5pY2FsRG9jdW1lbnQvPg==</Document>
            </DocumentResponse>
          </RetrieveDocumentSetResponse>
        </Body></Envelope>"#;

        let document = parse_retrieve_response(response).unwrap().unwrap();
        assert_eq!(document.document_unique_id, "1.2.3.4.5");
        assert_eq!(document.content, "PENsaW5pY2FsRG9jdW1lbnQvPg==");
        assert_eq!(document.mime_type.as_deref(), Some("text/xml"));

        assert!(parse_retrieve_response("<Envelope><Body/></Envelope>")
            .unwrap()
            .is_none());
    }
}
