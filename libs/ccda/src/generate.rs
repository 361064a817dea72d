//! Structured data -> C-CDA XML.

use chrono::Utc;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use uuid::Uuid;

use crate::types::{format_hl7_datetime, DocumentType};
use crate::Result;

const HL7_V3_NS: &str = "urn:hl7-org:v3";
const SDTC_NS: &str = "urn:hl7-org:sdtc";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
const LOINC_OID: &str = "2.16.840.1.113883.6.1";
const LOCAL_OID: &str = "2.16.840.1.113883.19";
const NPI_OID: &str = "2.16.840.1.113883.4.6";
const US_REALM_HEADER_OID: &str = "2.16.840.1.113883.10.20.22.1.1";
const SECTION_TEMPLATE_OID: &str = "2.16.840.1.113883.10.20.22.2.1";
const OBSERVATION_TEMPLATE_OID: &str = "2.16.840.1.113883.10.20.22.4.2";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostalAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientInfo {
    pub first_name: String,
    pub last_name: String,
    /// ISO date, e.g. `1980-01-01`.
    pub dob: String,
    pub gender: String,
    pub address: Option<PostalAddress>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorInfo {
    pub name: String,
    pub organization: String,
    pub npi: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntryInput {
    pub code: String,
    pub code_system: Option<String>,
    pub display: Option<String>,
    pub value: Option<String>,
    pub unit: Option<String>,
    pub effective_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionInput {
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub entries: Vec<EntryInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub document_type: DocumentType,
    pub patient_id: String,
    pub patient: PatientInfo,
    pub author: AuthorInfo,
    pub sections: Vec<SectionInput>,
}

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

/// Generate a clinical document. The emitted XML parses back through
/// [`crate::parse`] with the same type, patient and section structure.
pub fn generate(request: &GenerateRequest) -> Result<String> {
    let document_id = Uuid::new_v4().to_string();
    let now = format_hl7_datetime(Utc::now());
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    start(
        &mut writer,
        "ClinicalDocument",
        &[
            ("xmlns", HL7_V3_NS),
            ("xmlns:sdtc", SDTC_NS),
            ("xmlns:xsi", XSI_NS),
        ],
    )?;

    empty(&mut writer, "realmCode", &[("code", "US")])?;
    empty(
        &mut writer,
        "typeId",
        &[("root", "2.16.840.1.113883.1.3"), ("extension", "POCD_HD000040")],
    )?;
    empty(&mut writer, "templateId", &[("root", US_REALM_HEADER_OID)])?;
    if let Some(oid) = request.document_type.template_oid() {
        empty(&mut writer, "templateId", &[("root", oid)])?;
    }
    empty(
        &mut writer,
        "id",
        &[("root", LOCAL_OID), ("extension", document_id.as_str())],
    )?;
    empty(
        &mut writer,
        "code",
        &[
            ("code", request.document_type.loinc_code()),
            ("codeSystem", LOINC_OID),
            ("codeSystemName", "LOINC"),
            ("displayName", request.document_type.display_name()),
        ],
    )?;
    let title = request
        .sections
        .first()
        .map(|s| s.title.as_str())
        .unwrap_or("Clinical Document");
    text_element(&mut writer, "title", title)?;
    empty(&mut writer, "effectiveTime", &[("value", now.as_str())])?;
    empty(
        &mut writer,
        "confidentialityCode",
        &[("code", "N"), ("codeSystem", "2.16.840.1.113883.5.25")],
    )?;
    empty(&mut writer, "languageCode", &[("code", "en-US")])?;

    write_record_target(&mut writer, request)?;
    write_author(&mut writer, &request.author, &now)?;
    write_custodian(&mut writer, &request.author.organization)?;

    start(&mut writer, "component", &[])?;
    start(&mut writer, "structuredBody", &[])?;
    for section in &request.sections {
        write_section(&mut writer, section)?;
    }
    end(&mut writer, "structuredBody")?;
    end(&mut writer, "component")?;

    end(&mut writer, "ClinicalDocument")?;
    let bytes = writer.into_inner().into_inner();
    Ok(String::from_utf8(bytes)?)
}

fn write_record_target(writer: &mut XmlWriter, request: &GenerateRequest) -> Result<()> {
    start(writer, "recordTarget", &[])?;
    start(writer, "patientRole", &[])?;
    empty(
        writer,
        "id",
        &[("root", LOCAL_OID), ("extension", request.patient_id.as_str())],
    )?;

    match &request.patient.address {
        Some(addr) => {
            start(writer, "addr", &[])?;
            text_element(writer, "streetAddressLine", &addr.street)?;
            text_element(writer, "city", &addr.city)?;
            text_element(writer, "state", &addr.state)?;
            text_element(writer, "postalCode", &addr.zip)?;
            text_element(writer, "country", addr.country.as_deref().unwrap_or("US"))?;
            end(writer, "addr")?;
        }
        None => empty(writer, "addr", &[("nullFlavor", "UNK")])?,
    }
    if let Some(phone) = &request.patient.phone {
        empty(writer, "telecom", &[("value", format!("tel:{phone}").as_str())])?;
    }

    start(writer, "patient", &[])?;
    start(writer, "name", &[])?;
    text_element(writer, "given", &request.patient.first_name)?;
    text_element(writer, "family", &request.patient.last_name)?;
    end(writer, "name")?;
    let gender_code = if request.patient.gender.eq_ignore_ascii_case("male") {
        "M"
    } else {
        "F"
    };
    empty(
        writer,
        "administrativeGenderCode",
        &[("code", gender_code), ("codeSystem", "2.16.840.1.113883.5.1")],
    )?;
    let birth = request.patient.dob.replace('-', "");
    empty(writer, "birthTime", &[("value", birth.as_str())])?;
    end(writer, "patient")?;

    end(writer, "patientRole")?;
    end(writer, "recordTarget")
}

fn write_author(writer: &mut XmlWriter, author: &AuthorInfo, now: &str) -> Result<()> {
    start(writer, "author", &[])?;
    empty(writer, "time", &[("value", now)])?;
    start(writer, "assignedAuthor", &[])?;
    match &author.npi {
        Some(npi) => empty(writer, "id", &[("root", NPI_OID), ("extension", npi.as_str())])?,
        None => empty(writer, "id", &[("nullFlavor", "UNK")])?,
    }
    start(writer, "assignedPerson", &[])?;
    text_element(writer, "name", &author.name)?;
    end(writer, "assignedPerson")?;
    start(writer, "representedOrganization", &[])?;
    text_element(writer, "name", &author.organization)?;
    end(writer, "representedOrganization")?;
    end(writer, "assignedAuthor")?;
    end(writer, "author")
}

fn write_custodian(writer: &mut XmlWriter, organization: &str) -> Result<()> {
    start(writer, "custodian", &[])?;
    start(writer, "assignedCustodian", &[])?;
    start(writer, "representedCustodianOrganization", &[])?;
    empty(writer, "id", &[("root", LOCAL_OID)])?;
    text_element(writer, "name", organization)?;
    end(writer, "representedCustodianOrganization")?;
    end(writer, "assignedCustodian")?;
    end(writer, "custodian")
}

fn write_section(writer: &mut XmlWriter, section: &SectionInput) -> Result<()> {
    start(writer, "component", &[])?;
    start(writer, "section", &[])?;
    empty(writer, "templateId", &[("root", SECTION_TEMPLATE_OID)])?;
    empty(
        writer,
        "code",
        &[
            ("code", section.code.as_str()),
            ("codeSystem", LOINC_OID),
            ("codeSystemName", "LOINC"),
            ("displayName", section.title.as_str()),
        ],
    )?;
    text_element(writer, "title", &section.title)?;

    // Human-readable narrative first, then machine-readable entries.
    start(writer, "text", &[])?;
    start(writer, "table", &[])?;
    start(writer, "tbody", &[])?;
    for (index, entry) in section.entries.iter().enumerate() {
        start(writer, "tr", &[])?;
        let label = entry
            .display
            .clone()
            .or_else(|| Some(entry.code.clone()).filter(|c| !c.is_empty()))
            .unwrap_or_else(|| format!("Entry {}", index + 1));
        text_element(writer, "td", &label)?;
        end(writer, "tr")?;
    }
    end(writer, "tbody")?;
    end(writer, "table")?;
    end(writer, "text")?;

    for entry in &section.entries {
        write_entry(writer, entry)?;
    }

    end(writer, "section")?;
    end(writer, "component")
}

fn write_entry(writer: &mut XmlWriter, entry: &EntryInput) -> Result<()> {
    start(writer, "entry", &[])?;
    start(
        writer,
        "observation",
        &[("classCode", "OBS"), ("moodCode", "EVN")],
    )?;
    empty(writer, "templateId", &[("root", OBSERVATION_TEMPLATE_OID)])?;
    let entry_id = Uuid::new_v4().to_string();
    empty(writer, "id", &[("root", entry_id.as_str())])?;
    empty(
        writer,
        "code",
        &[
            ("code", entry.code.as_str()),
            ("codeSystem", entry.code_system.as_deref().unwrap_or(LOINC_OID)),
            ("displayName", entry.display.as_deref().unwrap_or("")),
        ],
    )?;
    empty(writer, "statusCode", &[("code", "completed")])?;
    if let Some(time) = &entry.effective_time {
        empty(writer, "effectiveTime", &[("value", time.as_str())])?;
    }
    if let Some(value) = &entry.value {
        empty(
            writer,
            "value",
            &[
                ("xsi:type", "PQ"),
                ("value", value.as_str()),
                ("unit", entry.unit.as_deref().unwrap_or("")),
            ],
        )?;
    }
    end(writer, "observation")?;
    end(writer, "entry")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    fn request() -> GenerateRequest {
        GenerateRequest {
            document_type: DocumentType::Ccd,
            patient_id: "PAT-42".into(),
            patient: PatientInfo {
                first_name: "Jane".into(),
                last_name: "Doe".into(),
                dob: "1980-01-01".into(),
                gender: "female".into(),
                address: None,
                phone: Some("555-0100".into()),
            },
            author: AuthorInfo {
                name: "Gregory House".into(),
                organization: "Good Health Clinic".into(),
                npi: Some("1234567890".into()),
            },
            sections: vec![SectionInput {
                code: "48765-2".into(),
                title: "Allergies".into(),
                entries: vec![EntryInput {
                    code: "419511003".into(),
                    code_system: Some("2.16.840.1.113883.6.96".into()),
                    display: Some("Penicillin allergy".into()),
                    ..Default::default()
                }],
            }],
        }
    }

    #[test]
    fn generated_document_round_trips() {
        let xml = generate(&request()).unwrap();
        let doc = parse(&xml).unwrap();
        assert_eq!(doc.document_type, DocumentType::Ccd);
        assert_eq!(doc.patient_id, "PAT-42");
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].code, "48765-2");
        assert_eq!(
            doc.sections[0].narrative.as_deref(),
            Some("Penicillin allergy")
        );
        let author = doc.author.unwrap();
        assert_eq!(author.id.as_deref(), Some("1234567890"));
        assert_eq!(author.organization.as_deref(), Some("Good Health Clinic"));
    }

    #[test]
    fn missing_address_and_npi_use_null_flavor() {
        let mut req = request();
        req.patient.address = None;
        req.author.npi = None;
        let xml = generate(&req).unwrap();
        assert!(xml.contains(r#"<addr nullFlavor="UNK"/>"#));
        assert!(xml.contains(r#"<id nullFlavor="UNK"/>"#));
    }

    #[test]
    fn type_template_and_loinc_code_match() {
        let mut req = request();
        req.document_type = DocumentType::DischargeSummary;
        let xml = generate(&req).unwrap();
        assert!(xml.contains("2.16.840.1.113883.10.20.22.1.8"));
        assert!(xml.contains(r#"code="18842-5""#));
    }
}
