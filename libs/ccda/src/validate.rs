//! Structural validation against the US Realm Header requirements.

use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Check the elements every conformant document must carry. Unparseable XML
/// and a wrong root element are reported the same way as missing elements,
/// so the caller always gets a report rather than an error.
pub fn validate(xml: &str) -> ValidationReport {
    let mut errors = Vec::new();

    let doc = match Document::parse(xml) {
        Ok(doc) => doc,
        Err(err) => {
            errors.push(format!("XML parsing error: {err}"));
            return ValidationReport {
                valid: false,
                errors,
            };
        }
    };

    let root = doc.root_element();
    if root.tag_name().name() != "ClinicalDocument" {
        errors.push("Missing ClinicalDocument root element".to_string());
        return ValidationReport {
            valid: false,
            errors,
        };
    }

    for required in [
        "typeId",
        "id",
        "code",
        "effectiveTime",
        "recordTarget",
        "author",
        "custodian",
    ] {
        if child(root, required).is_none() {
            errors.push(format!("Missing {required} element"));
        }
    }

    if let Some(patient_role) = child(root, "recordTarget").and_then(|n| child(n, "patientRole")) {
        if child(patient_role, "id").is_none() {
            errors.push("Missing patient id".to_string());
        }
        if child(patient_role, "patient").is_none() {
            errors.push("Missing patient element".to_string());
        }
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}

fn child<'a>(node: Node<'a, 'a>, name: &str) -> Option<Node<'a, 'a>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}
