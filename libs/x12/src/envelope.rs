//! Interchange envelope: ISA/GS/ST control data.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::segment::Segment;

/// Control data lifted out of the ISA/GS/ST envelope segments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterchangeEnvelope {
    pub isa_control_number: String,
    pub gs_control_number: String,
    pub st_control_number: String,
    pub sender_id: String,
    pub sender_qualifier: String,
    pub receiver_id: String,
    pub receiver_qualifier: String,
    pub interchange_date: Option<DateTime<Utc>>,
}

impl InterchangeEnvelope {
    /// ISA is fixed-position: qualifiers and ids sit at ISA05..ISA08, the
    /// date/time at ISA09/ISA10 and the control number at ISA13.
    pub fn apply_isa(&mut self, segment: &Segment) {
        self.sender_qualifier = segment.element(4).unwrap_or_default().to_string();
        self.sender_id = segment.element_trimmed(5).unwrap_or_default().to_string();
        self.receiver_qualifier = segment.element(6).unwrap_or_default().to_string();
        self.receiver_id = segment.element_trimmed(7).unwrap_or_default().to_string();
        self.interchange_date = parse_isa_datetime(
            segment.element(8).unwrap_or_default(),
            segment.element(9).unwrap_or_default(),
        );
        self.isa_control_number = segment.element(12).unwrap_or_default().to_string();
    }

    pub fn apply_gs(&mut self, segment: &Segment) {
        self.gs_control_number = segment.element(5).unwrap_or_default().to_string();
    }

    pub fn apply_st(&mut self, segment: &Segment) {
        self.st_control_number = segment.element(1).unwrap_or_default().to_string();
    }
}

/// ISA09 is `yyMMdd`, ISA10 is `HHmm`; two-digit years are 2000-based.
fn parse_isa_datetime(date: &str, time: &str) -> Option<DateTime<Utc>> {
    if date.len() < 6 {
        return None;
    }
    let year = 2000 + date.get(0..2)?.parse::<i32>().ok()?;
    let month = date.get(2..4)?.parse::<u32>().ok()?;
    let day = date.get(4..6)?.parse::<u32>().ok()?;
    let hour = time.get(0..2).and_then(|h| h.parse::<u32>().ok()).unwrap_or(0);
    let minute = time.get(2..4).and_then(|m| m.parse::<u32>().ok()).unwrap_or(0);

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    Some(Utc.from_utc_datetime(&NaiveDateTime::new(date, time)))
}

/// Fresh zero-padded numeric control number; ISA and GS use 9 digits,
/// ST uses 4.
pub fn control_number(len: u32) -> String {
    let bound = 10u64.pow(len);
    let n = rand::thread_rng().gen_range(0..bound);
    format!("{n:0width$}", width = len as usize)
}

/// ISA sender/receiver ids are space-padded to exactly 15 characters.
pub fn pad_isa_id(id: &str) -> String {
    let mut s: String = id.chars().take(15).collect();
    while s.len() < 15 {
        s.push(' ');
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn isa_positions() {
        let isa = Segment::new(
            "ISA",
            vec![
                "00".into(),
                "          ".into(),
                "00".into(),
                "          ".into(),
                "ZZ".into(),
                "SENDER         ".into(),
                "ZZ".into(),
                "RECEIVER       ".into(),
                "240115".into(),
                "0930".into(),
                "^".into(),
                "00501".into(),
                "000000905".into(),
                "0".into(),
                "P".into(),
                ":".into(),
            ],
        );
        let mut envelope = InterchangeEnvelope::default();
        envelope.apply_isa(&isa);

        assert_eq!(envelope.sender_id, "SENDER");
        assert_eq!(envelope.sender_qualifier, "ZZ");
        assert_eq!(envelope.receiver_id, "RECEIVER");
        assert_eq!(envelope.isa_control_number, "000000905");
        assert_eq!(envelope.interchange_date.unwrap().year(), 2024);
    }

    #[test]
    fn control_number_width() {
        for _ in 0..20 {
            assert_eq!(control_number(9).len(), 9);
            assert_eq!(control_number(4).len(), 4);
        }
        assert!(control_number(9).chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn isa_id_padding() {
        assert_eq!(pad_isa_id("SENDER").len(), 15);
        assert_eq!(pad_isa_id("A-VERY-LONG-IDENTIFIER").len(), 15);
    }
}
