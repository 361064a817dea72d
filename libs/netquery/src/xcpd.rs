//! XCPD cross-gateway patient discovery: PRPA_IN201305UV02 requests and
//! PRPA_IN201306UV02 responses, carried in SOAP 1.2 envelopes.

use chrono::Utc;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use roxmltree::{Document, Node};
use std::io::Cursor;

use crate::types::PatientDemographics;
use crate::Result;

const SOAP_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
const HL7_V3_NS: &str = "urn:hl7-org:v3";
const WSA_NS: &str = "http://www.w3.org/2005/08/addressing";
const HL7_ROOT_OID: &str = "2.16.840.1.113883.1.6";
const ACTION: &str = "urn:hl7-org:v3:PRPA_IN201305UV02:CrossGatewayPatientDiscovery";

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

fn empty(writer: &mut XmlWriter, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
    let mut elem = BytesStart::new(name);
    for (k, v) in attrs {
        elem.push_attribute((*k, *v));
    }
    writer.write_event(Event::Empty(elem))?;
    Ok(())
}

fn text_element(writer: &mut XmlWriter, name: &str, text: &str) -> Result<()> {
    start(writer, name, &[])?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    end(writer, name)
}

/// Build a patient discovery request addressed to one responding gateway.
pub fn build_discovery_request(
    patient: &PatientDemographics,
    sender_oid: &str,
    receiver_oid: &str,
    endpoint: &str,
    query_id: &str,
) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    start(
        &mut writer,
        "soap:Envelope",
        &[
            ("xmlns:soap", SOAP_NS),
            ("xmlns:urn", HL7_V3_NS),
            ("xmlns:wsa", WSA_NS),
        ],
    )?;

    start(&mut writer, "soap:Header", &[])?;
    text_element(&mut writer, "wsa:Action", ACTION)?;
    text_element(&mut writer, "wsa:MessageID", &format!("urn:uuid:{query_id}"))?;
    text_element(&mut writer, "wsa:To", endpoint)?;
    end(&mut writer, "soap:Header")?;

    start(&mut writer, "soap:Body", &[])?;
    start(&mut writer, "urn:PRPA_IN201305UV02", &[("ITSVersion", "XML_1.0")])?;

    empty(
        &mut writer,
        "urn:id",
        &[("root", HL7_ROOT_OID), ("extension", query_id)],
    )?;
    let creation_time = Utc::now().format("%Y%m%d%H%M%S").to_string();
    empty(&mut writer, "urn:creationTime", &[("value", &creation_time)])?;
    empty(
        &mut writer,
        "urn:interactionId",
        &[("root", HL7_ROOT_OID), ("extension", "PRPA_IN201305UV02")],
    )?;
    empty(&mut writer, "urn:processingCode", &[("code", "P")])?;
    empty(&mut writer, "urn:processingModeCode", &[("code", "T")])?;
    empty(&mut writer, "urn:acceptAckCode", &[("code", "AL")])?;

    device(&mut writer, "urn:receiver", "RCV", receiver_oid)?;
    device(&mut writer, "urn:sender", "SND", sender_oid)?;

    start(
        &mut writer,
        "urn:controlActProcess",
        &[("classCode", "CACT"), ("moodCode", "EVN")],
    )?;
    empty(&mut writer, "urn:code", &[("code", "PRPA_TE201305UV02")])?;
    start(&mut writer, "urn:queryByParameter", &[])?;
    empty(
        &mut writer,
        "urn:queryId",
        &[("root", HL7_ROOT_OID), ("extension", query_id)],
    )?;
    empty(&mut writer, "urn:statusCode", &[("code", "new")])?;
    empty(&mut writer, "urn:responseModalityCode", &[("code", "R")])?;
    empty(&mut writer, "urn:responsePriorityCode", &[("code", "I")])?;

    start(&mut writer, "urn:parameterList", &[])?;
    if patient.first_name.is_some() || patient.last_name.is_some() {
        start(&mut writer, "urn:livingSubjectName", &[])?;
        start(&mut writer, "urn:value", &[])?;
        if let Some(given) = &patient.first_name {
            text_element(&mut writer, "urn:given", given)?;
        }
        if let Some(family) = &patient.last_name {
            text_element(&mut writer, "urn:family", family)?;
        }
        end(&mut writer, "urn:value")?;
        text_element(&mut writer, "urn:semanticsText", "LivingSubject.name")?;
        end(&mut writer, "urn:livingSubjectName")?;
    }
    if let Some(dob) = &patient.date_of_birth {
        start(&mut writer, "urn:livingSubjectBirthTime", &[])?;
        empty(&mut writer, "urn:value", &[("value", dob.replace('-', "").as_str())])?;
        text_element(&mut writer, "urn:semanticsText", "LivingSubject.birthTime")?;
        end(&mut writer, "urn:livingSubjectBirthTime")?;
    }
    if let Some(gender) = &patient.gender {
        let code = if gender.eq_ignore_ascii_case("male") { "M" } else { "F" };
        start(&mut writer, "urn:livingSubjectAdministrativeGender", &[])?;
        empty(&mut writer, "urn:value", &[("code", code)])?;
        text_element(
            &mut writer,
            "urn:semanticsText",
            "LivingSubject.administrativeGender",
        )?;
        end(&mut writer, "urn:livingSubjectAdministrativeGender")?;
    }
    end(&mut writer, "urn:parameterList")?;

    end(&mut writer, "urn:queryByParameter")?;
    end(&mut writer, "urn:controlActProcess")?;
    end(&mut writer, "urn:PRPA_IN201305UV02")?;
    end(&mut writer, "soap:Body")?;
    end(&mut writer, "soap:Envelope")?;

    let bytes = writer.into_inner().into_inner();
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn device(writer: &mut XmlWriter, name: &str, type_code: &str, oid: &str) -> Result<()> {
    start(writer, name, &[("typeCode", type_code)])?;
    start(
        writer,
        "urn:device",
        &[("classCode", "DEV"), ("determinerCode", "INSTANCE")],
    )?;
    empty(writer, "urn:id", &[("root", oid)])?;
    end(writer, "urn:device")?;
    end(writer, name)
}

/// One subject from a PRPA_IN201306UV02 response.
#[derive(Debug, Clone)]
pub struct XcpdPatient {
    pub patient_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
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

/// Pull the matched subjects out of a discovery response. Tag names are
/// matched without regard to namespace prefixes.
pub fn parse_discovery_response(xml: &str) -> Result<Vec<XcpdPatient>> {
    let doc = Document::parse(xml)?;
    let Some(response) = descendant(doc.root(), "PRPA_IN201306UV02") else {
        return Ok(Vec::new());
    };
    let Some(control_act) = child(response, "controlActProcess") else {
        return Ok(Vec::new());
    };

    let mut patients = Vec::new();
    for subject in control_act
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "subject")
    {
        let Some(patient) = descendant(subject, "patient") else {
            continue;
        };
        let person = child(patient, "patientPerson");
        let name = person.and_then(|p| child(p, "name"));

        patients.push(XcpdPatient {
            patient_id: child(patient, "id")
                .and_then(|n| n.attribute("extension"))
                .map(str::to_string),
            first_name: name.and_then(|n| child(n, "given")).and_then(node_text),
            last_name: name.and_then(|n| child(n, "family")).and_then(node_text),
            date_of_birth: person
                .and_then(|p| child(p, "birthTime"))
                .and_then(|n| n.attribute("value"))
                .map(str::to_string),
            gender: person
                .and_then(|p| child(p, "administrativeGenderCode"))
                .and_then(|n| n.attribute("code"))
                .map(str::to_string),
        });
    }
    Ok(patients)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_demographics_and_addressing() {
        let patient = PatientDemographics {
            first_name: Some("Jane".into()),
            last_name: Some("Doe".into()),
            date_of_birth: Some("1980-04-02".into()),
            gender: Some("female".into()),
            ..Default::default()
        };
        let xml = build_discovery_request(
            &patient,
            "2.999.1.2",
            "2.16.840.1.113883.3.6147",
            "https://epic.example.org/carequality/xcpd",
            "query-1",
        )
        .unwrap();

        assert!(xml.contains("CrossGatewayPatientDiscovery"));
        assert!(xml.contains("<wsa:MessageID>urn:uuid:query-1</wsa:MessageID>"));
        assert!(xml.contains("<wsa:To>https://epic.example.org/carequality/xcpd</wsa:To>"));
        assert!(xml.contains("<urn:given>Jane</urn:given>"));
        assert!(xml.contains("<urn:family>Doe</urn:family>"));
        assert!(xml.contains("value=\"19800402\""));
        assert!(xml.contains("code=\"F\""));
        assert!(xml.contains("ITSVersion=\"XML_1.0\""));
    }

    #[test]
    fn response_subjects_are_extracted() {
        let xml = r#"<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope" xmlns:urn="urn:hl7-org:v3">
          <soap:Body>
            <urn:PRPA_IN201306UV02>
              <urn:controlActProcess>
                <urn:subject>
                  <urn:registrationEvent>
                    <urn:subject1>
                      <urn:patient>
                        <urn:id root="2.16.840.1.113883.3.6147" extension="EPIC-123"/>
                        <urn:patientPerson>
                          <urn:name><urn:given>Jane</urn:given><urn:family>Doe</urn:family></urn:name>
                          <urn:administrativeGenderCode code="F"/>
                          <urn:birthTime value="19800402"/>
                        </urn:patientPerson>
                      </urn:patient>
                    </urn:subject1>
                  </urn:registrationEvent>
                </urn:subject>
              </urn:controlActProcess>
            </urn:PRPA_IN201306UV02>
          </soap:Body>
        </soap:Envelope>"#;

        let patients = parse_discovery_response(xml).unwrap();
        assert_eq!(patients.len(), 1);
        assert_eq!(patients[0].patient_id.as_deref(), Some("EPIC-123"));
        assert_eq!(patients[0].first_name.as_deref(), Some("Jane"));
        assert_eq!(patients[0].last_name.as_deref(), Some("Doe"));
        assert_eq!(patients[0].date_of_birth.as_deref(), Some("19800402"));
        assert_eq!(patients[0].gender.as_deref(), Some("F"));
    }

    #[test]
    fn empty_response_yields_no_patients() {
        let xml = r#"<Envelope><Body><PRPA_IN201306UV02><controlActProcess/></PRPA_IN201306UV02></Body></Envelope>"#;
        assert!(parse_discovery_response(xml).unwrap().is_empty());
    }
}
