//! XML -> [`CcdaDocument`].

use chrono::Utc;
use roxmltree::{Document, Node};
use uuid::Uuid;

use crate::error::CcdaError;
use crate::types::{
    parse_hl7_datetime, CcdaDocument, DocumentAuthor, DocumentSection, DocumentType,
};
use crate::Result;

/// Parse a clinical document. Tag names are matched without regard to
/// namespace prefixes, so both `urn:hl7-org:v3` and unqualified content read
/// the same way.
pub fn parse(xml: &str) -> Result<CcdaDocument> {
    let doc = Document::parse(xml)?;
    let root = doc.root_element();
    if root.tag_name().name() != "ClinicalDocument" {
        return Err(CcdaError::InvalidDocument(
            "missing ClinicalDocument root element".into(),
        ));
    }

    let id = extract_id(root);
    let document_type = extract_document_type(root);
    let patient_id = extract_patient_id(root);
    let creation_time = child(root, "effectiveTime")
        .and_then(|n| n.attribute("value"))
        .and_then(parse_hl7_datetime)
        .unwrap_or_else(Utc::now);
    let title = child(root, "title")
        .and_then(node_text)
        .or_else(|| Some(document_type.display_name().to_string()));
    let author = extract_author(root);
    let sections = extract_sections(root);

    Ok(CcdaDocument {
        id,
        document_type,
        patient_id,
        title,
        creation_time,
        author,
        sections,
        raw_xml: Some(xml.to_string()),
    })
}

fn child<'a>(node: Node<'a, 'a>, name: &str) -> Option<Node<'a, 'a>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn children<'a>(node: Node<'a, 'a>, name: &'a str) -> impl Iterator<Item = Node<'a, 'a>> {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

fn node_text(node: Node) -> Option<String> {
    let text = node.text()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// The first `id` element carrying an extension wins; a bare root attribute
/// is the fallback. Documents without any usable id get a fresh one.
fn extract_id(root: Node) -> String {
    let ids: Vec<Node> = children(root, "id").collect();
    ids.iter()
        .find_map(|n| n.attribute("extension"))
        .or_else(|| ids.first().and_then(|n| n.attribute("root")))
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn extract_document_type(root: Node) -> DocumentType {
    children(root, "templateId")
        .filter_map(|n| n.attribute("root"))
        .find_map(DocumentType::from_template_oid)
        .unwrap_or(DocumentType::Unstructured)
}

fn extract_patient_id(root: Node) -> String {
    child(root, "recordTarget")
        .and_then(|n| child(n, "patientRole"))
        .and_then(|n| child(n, "id"))
        .and_then(|n| n.attribute("extension"))
        .unwrap_or_default()
        .to_string()
}

fn extract_author(root: Node) -> Option<DocumentAuthor> {
    let assigned = child(root, "author").and_then(|n| child(n, "assignedAuthor"))?;

    let id = child(assigned, "id")
        .and_then(|n| n.attribute("extension"))
        .map(str::to_string);

    // Person names come either as flat text or as given/family parts.
    let name = child(assigned, "assignedPerson")
        .and_then(|n| child(n, "name"))
        .and_then(|name_node| {
            let parts: Vec<String> = ["given", "family"]
                .into_iter()
                .filter_map(|part| child(name_node, part).and_then(node_text))
                .collect();
            if parts.is_empty() {
                node_text(name_node)
            } else {
                Some(parts.join(" "))
            }
        });

    let organization = child(assigned, "representedOrganization")
        .and_then(|n| child(n, "name"))
        .and_then(node_text);

    Some(DocumentAuthor {
        id,
        name,
        organization,
    })
}

fn extract_sections(root: Node) -> Vec<DocumentSection> {
    let Some(body) = child(root, "component").and_then(|n| child(n, "structuredBody")) else {
        return Vec::new();
    };

    children(body, "component")
        .filter_map(|c| child(c, "section"))
        .map(|section| DocumentSection {
            code: child(section, "code")
                .and_then(|n| n.attribute("code"))
                .unwrap_or_default()
                .to_string(),
            title: child(section, "title")
                .and_then(node_text)
                .unwrap_or_default(),
            narrative: child(section, "text").and_then(narrative_text),
        })
        .collect()
}

fn narrative_text(node: Node) -> Option<String> {
    let joined: Vec<&str> = node
        .descendants()
        .filter_map(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    if joined.is_empty() {
        None
    } else {
        Some(joined.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    pub(crate) const SAMPLE_CCD: &str = r#"<?xml version="1.0"?>
<ClinicalDocument xmlns="urn:hl7-org:v3">
  <realmCode code="US"/>
  <typeId root="2.16.840.1.113883.1.3" extension="POCD_HD000040"/>
  <templateId root="2.16.840.1.113883.10.20.22.1.1"/>
  <templateId root="2.16.840.1.113883.10.20.22.1.2"/>
  <id root="2.16.840.1.113883.19" extension="DOC-001"/>
  <code code="34133-9" codeSystem="2.16.840.1.113883.6.1"/>
  <title>Continuity of Care Document</title>
  <effectiveTime value="20240115093000"/>
  <confidentialityCode code="N"/>
  <recordTarget>
    <patientRole>
      <id root="2.16.840.1.113883.19" extension="PAT-42"/>
      <patient>
        <name><given>Jane</given><family>Doe</family></name>
      </patient>
    </patientRole>
  </recordTarget>
  <author>
    <time value="20240115093000"/>
    <assignedAuthor>
      <id root="2.16.840.1.113883.4.6" extension="1234567890"/>
      <assignedPerson><name><given>Gregory</given><family>House</family></name></assignedPerson>
      <representedOrganization><name>Good Health Clinic</name></representedOrganization>
    </assignedAuthor>
  </author>
  <custodian>
    <assignedCustodian>
      <representedCustodianOrganization>
        <id root="2.16.840.1.113883.19"/>
        <name>Good Health Clinic</name>
      </representedCustodianOrganization>
    </assignedCustodian>
  </custodian>
  <component>
    <structuredBody>
      <component>
        <section>
          <code code="48765-2" codeSystem="2.16.840.1.113883.6.1"/>
          <title>Allergies</title>
          <text><table><tbody><tr><td>Penicillin</td></tr></tbody></table></text>
        </section>
      </component>
      <component>
        <section>
          <code code="10160-0" codeSystem="2.16.840.1.113883.6.1"/>
          <title>Medications</title>
        </section>
      </component>
    </structuredBody>
  </component>
</ClinicalDocument>"#;

    #[test]
    fn parses_sample_ccd() {
        let doc = parse(SAMPLE_CCD).unwrap();
        assert_eq!(doc.id, "DOC-001");
        assert_eq!(doc.document_type, DocumentType::Ccd);
        assert_eq!(doc.patient_id, "PAT-42");
        assert_eq!(doc.title.as_deref(), Some("Continuity of Care Document"));
        assert_eq!(doc.creation_time.year(), 2024);

        let author = doc.author.unwrap();
        assert_eq!(author.id.as_deref(), Some("1234567890"));
        assert_eq!(author.name.as_deref(), Some("Gregory House"));
        assert_eq!(author.organization.as_deref(), Some("Good Health Clinic"));

        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.sections[0].code, "48765-2");
        assert_eq!(doc.sections[0].narrative.as_deref(), Some("Penicillin"));
        assert!(doc.sections[1].narrative.is_none());
    }

    #[test]
    fn wrong_root_is_invalid() {
        let err = parse("<Bundle xmlns=\"urn:hl7-org:v3\"/>").unwrap_err();
        assert!(matches!(err, CcdaError::InvalidDocument(_)));
    }

    #[test]
    fn unknown_template_is_unstructured() {
        let xml = r#"<ClinicalDocument xmlns="urn:hl7-org:v3">
            <templateId root="9.9.9"/>
            <id root="1.2.3"/>
        </ClinicalDocument>"#;
        let doc = parse(xml).unwrap();
        assert_eq!(doc.document_type, DocumentType::Unstructured);
        assert_eq!(doc.id, "1.2.3");
    }
}
