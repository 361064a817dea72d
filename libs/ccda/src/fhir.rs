//! C-CDA -> FHIR document Bundle.

use serde_json::{json, Value as JsonValue};

use crate::types::CcdaDocument;

/// Build a FHIR `Bundle` of type `document`: the Patient entry first,
/// followed by a Composition mirroring the document's sections.
pub fn to_fhir(document: &CcdaDocument) -> JsonValue {
    let patient = json!({
        "resourceType": "Patient",
        "id": document.patient_id,
    });

    let sections: Vec<JsonValue> = document
        .sections
        .iter()
        .map(|section| {
            json!({
                "code": {
                    "coding": [{
                        "system": "http://loinc.org",
                        "code": section.code,
                        "display": section.title,
                    }],
                },
                "title": section.title,
            })
        })
        .collect();

    let authors: Vec<JsonValue> = document
        .author
        .as_ref()
        .and_then(|a| a.name.as_ref())
        .map(|name| vec![json!({ "display": name })])
        .unwrap_or_default();

    let composition = json!({
        "resourceType": "Composition",
        "id": document.id,
        "status": "final",
        "type": {
            "coding": [{
                "system": "http://loinc.org",
                "code": document.document_type.loinc_code(),
                "display": document.title,
            }],
        },
        "subject": { "reference": format!("Patient/{}", document.patient_id) },
        "date": document.creation_time.to_rfc3339(),
        "author": authors,
        "title": document.title,
        "section": sections,
    });

    json!({
        "resourceType": "Bundle",
        "type": "document",
        "timestamp": document.creation_time.to_rfc3339(),
        "entry": [
            { "resource": patient },
            { "resource": composition },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DocumentAuthor, DocumentSection, DocumentType};
    use chrono::{TimeZone, Utc};

    #[test]
    fn bundle_layout() {
        let document = CcdaDocument {
            id: "DOC-1".into(),
            document_type: DocumentType::Ccd,
            patient_id: "PAT-1".into(),
            title: Some("Summary".into()),
            creation_time: Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap(),
            author: Some(DocumentAuthor {
                id: None,
                name: Some("Dr. House".into()),
                organization: None,
            }),
            sections: vec![DocumentSection {
                code: "48765-2".into(),
                title: "Allergies".into(),
                narrative: None,
            }],
            raw_xml: None,
        };

        let bundle = to_fhir(&document);
        assert_eq!(bundle["resourceType"], "Bundle");
        assert_eq!(bundle["type"], "document");
        assert_eq!(bundle["entry"][0]["resource"]["resourceType"], "Patient");

        let composition = &bundle["entry"][1]["resource"];
        assert_eq!(composition["resourceType"], "Composition");
        assert_eq!(composition["type"]["coding"][0]["code"], "34133-9");
        assert_eq!(composition["subject"]["reference"], "Patient/PAT-1");
        assert_eq!(composition["author"][0]["display"], "Dr. House");
        assert_eq!(composition["section"][0]["title"], "Allergies");
    }

    #[test]
    fn missing_author_yields_empty_list() {
        let document = CcdaDocument {
            id: "DOC-2".into(),
            document_type: DocumentType::ProgressNote,
            patient_id: "PAT-2".into(),
            title: None,
            creation_time: Utc::now(),
            author: None,
            sections: vec![],
            raw_xml: None,
        };
        let bundle = to_fhir(&document);
        assert_eq!(bundle["entry"][1]["resource"]["author"], json!([]));
    }
}
