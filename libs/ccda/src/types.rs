//! Document model and the consolidated CDA template/LOINC tables.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Consolidated CDA document templates the gateway recognizes. Anything
/// outside this table parses as [`DocumentType::Unstructured`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Ccd,
    DischargeSummary,
    ProgressNote,
    HistoryAndPhysical,
    ConsultationNote,
    OperativeNote,
    ProcedureNote,
    ReferralNote,
    TransferSummary,
    CarePlan,
    Unstructured,
}

impl DocumentType {
    pub fn from_template_oid(oid: &str) -> Option<Self> {
        match oid {
            "2.16.840.1.113883.10.20.22.1.2" => Some(Self::Ccd),
            "2.16.840.1.113883.10.20.22.1.8" => Some(Self::DischargeSummary),
            "2.16.840.1.113883.10.20.22.1.9" => Some(Self::ProgressNote),
            "2.16.840.1.113883.10.20.22.1.3" => Some(Self::HistoryAndPhysical),
            "2.16.840.1.113883.10.20.22.1.4" => Some(Self::ConsultationNote),
            "2.16.840.1.113883.10.20.22.1.7" => Some(Self::OperativeNote),
            "2.16.840.1.113883.10.20.22.1.6" => Some(Self::ProcedureNote),
            "2.16.840.1.113883.10.20.22.1.14" => Some(Self::ReferralNote),
            "2.16.840.1.113883.10.20.22.1.13" => Some(Self::TransferSummary),
            "2.16.840.1.113883.10.20.22.1.15" => Some(Self::CarePlan),
            _ => None,
        }
    }

    /// Type-specific template OID; `None` for unstructured content, which
    /// only carries the US Realm Header template.
    pub fn template_oid(self) -> Option<&'static str> {
        match self {
            Self::Ccd => Some("2.16.840.1.113883.10.20.22.1.2"),
            Self::DischargeSummary => Some("2.16.840.1.113883.10.20.22.1.8"),
            Self::ProgressNote => Some("2.16.840.1.113883.10.20.22.1.9"),
            Self::HistoryAndPhysical => Some("2.16.840.1.113883.10.20.22.1.3"),
            Self::ConsultationNote => Some("2.16.840.1.113883.10.20.22.1.4"),
            Self::OperativeNote => Some("2.16.840.1.113883.10.20.22.1.7"),
            Self::ProcedureNote => Some("2.16.840.1.113883.10.20.22.1.6"),
            Self::ReferralNote => Some("2.16.840.1.113883.10.20.22.1.14"),
            Self::TransferSummary => Some("2.16.840.1.113883.10.20.22.1.13"),
            Self::CarePlan => Some("2.16.840.1.113883.10.20.22.1.15"),
            Self::Unstructured => None,
        }
    }

    pub fn loinc_code(self) -> &'static str {
        match self {
            Self::Ccd | Self::Unstructured => "34133-9",
            Self::DischargeSummary => "18842-5",
            Self::ProgressNote => "11506-3",
            Self::HistoryAndPhysical => "34117-2",
            Self::ConsultationNote => "11488-4",
            Self::OperativeNote => "11504-8",
            Self::ProcedureNote => "28570-0",
            Self::ReferralNote => "57133-1",
            Self::TransferSummary => "18761-7",
            Self::CarePlan => "18776-5",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Ccd | Self::Unstructured => "Summarization of Episode Note",
            Self::DischargeSummary => "Discharge Summary",
            Self::ProgressNote => "Progress Note",
            Self::HistoryAndPhysical => "History and Physical Note",
            Self::ConsultationNote => "Consultation Note",
            Self::OperativeNote => "Operative Note",
            Self::ProcedureNote => "Procedure Note",
            Self::ReferralNote => "Referral Note",
            Self::TransferSummary => "Transfer Summary Note",
            Self::CarePlan => "Plan of Care Note",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAuthor {
    pub id: Option<String>,
    pub name: Option<String>,
    pub organization: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSection {
    /// LOINC section code.
    pub code: String,
    pub title: String,
    pub narrative: Option<String>,
}

/// Parsed view of one clinical document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CcdaDocument {
    pub id: String,
    pub document_type: DocumentType,
    pub patient_id: String,
    pub title: Option<String>,
    pub creation_time: DateTime<Utc>,
    pub author: Option<DocumentAuthor>,
    pub sections: Vec<DocumentSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_xml: Option<String>,
}

/// HL7 packed datetime (`YYYYMMDD` optionally followed by `HHMMSS`).
pub fn parse_hl7_datetime(value: &str) -> Option<DateTime<Utc>> {
    if value.len() < 8 {
        return None;
    }
    let year = value.get(0..4)?.parse::<i32>().ok()?;
    let month = value.get(4..6)?.parse::<u32>().ok()?;
    let day = value.get(6..8)?.parse::<u32>().ok()?;
    let hour = value.get(8..10).and_then(|v| v.parse().ok()).unwrap_or(0);
    let minute = value.get(10..12).and_then(|v| v.parse().ok()).unwrap_or(0);
    let second = value.get(12..14).and_then(|v| v.parse().ok()).unwrap_or(0);

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::from_hms_opt(hour, minute, second)?;
    Some(Utc.from_utc_datetime(&NaiveDateTime::new(date, time)))
}

pub fn format_hl7_datetime(value: DateTime<Utc>) -> String {
    value.format("%Y%m%d%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn template_oids_round_trip() {
        for ty in [
            DocumentType::Ccd,
            DocumentType::DischargeSummary,
            DocumentType::CarePlan,
        ] {
            let oid = ty.template_oid().unwrap();
            assert_eq!(DocumentType::from_template_oid(oid), Some(ty));
        }
        assert!(DocumentType::from_template_oid("1.2.3").is_none());
        assert!(DocumentType::Unstructured.template_oid().is_none());
    }

    #[test]
    fn packed_datetime_with_and_without_time() {
        let full = parse_hl7_datetime("20240115093045").unwrap();
        assert_eq!(full.hour(), 9);
        assert_eq!(full.second(), 45);

        let date_only = parse_hl7_datetime("20240115").unwrap();
        assert_eq!(date_only.hour(), 0);

        assert!(parse_hl7_datetime("2024").is_none());
        assert!(parse_hl7_datetime("2024XX15").is_none());
    }

    #[test]
    fn packed_datetime_format() {
        let dt = parse_hl7_datetime("20240115093045").unwrap();
        assert_eq!(format_hl7_datetime(dt), "20240115093045");
    }
}
