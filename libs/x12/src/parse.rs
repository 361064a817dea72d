//! Raw EDI text -> segments + envelope.

use serde::{Deserialize, Serialize};

use crate::envelope::InterchangeEnvelope;
use crate::error::X12Error;
use crate::segment::{Delimiters, Segment};
use crate::types::TransactionSetKind;
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedInterchange {
    pub envelope: InterchangeEnvelope,
    /// `None` when neither GS01 nor ST01 maps to a supported family.
    pub kind: Option<TransactionSetKind>,
    pub segments: Vec<Segment>,
    pub raw: String,
}

impl ParsedInterchange {
    pub fn segment_ids(&self) -> Vec<&str> {
        self.segments.iter().map(|s| s.id.as_str()).collect()
    }

    pub fn first(&self, id: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.id == id)
    }
}

/// Split on the segment delimiter, then the element delimiter; the first
/// element of each segment is its id. The ST mapping wins over GS when both
/// are present (matching how a 999 labels the acknowledged set, not the
/// group).
///
/// Content whose delimiter structure cannot be read at all is fatal.
pub fn parse(raw: &str) -> Result<ParsedInterchange> {
    parse_with(raw, Delimiters::default())
}

pub fn parse_with(raw: &str, delimiters: Delimiters) -> Result<ParsedInterchange> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(X12Error::Malformed("empty content".into()));
    }
    if !trimmed.contains(delimiters.element) {
        return Err(X12Error::Malformed(format!(
            "no element delimiter '{}' found",
            delimiters.element
        )));
    }

    let mut envelope = InterchangeEnvelope::default();
    let mut kind: Option<TransactionSetKind> = None;
    let mut segments = Vec::new();

    for line in trimmed.split(delimiters.segment) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split(delimiters.element);
        let id = parts.next().unwrap_or_default().trim().to_string();
        if id.is_empty() || id.len() > 3 || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(X12Error::Malformed(format!("unreadable segment id: {line:.20}")));
        }
        let elements: Vec<String> = parts.map(str::to_string).collect();
        let segment = Segment::new(id, elements);

        match segment.id.as_str() {
            "ISA" => envelope.apply_isa(&segment),
            "GS" => {
                envelope.apply_gs(&segment);
                if kind.is_none() {
                    kind = segment
                        .element(0)
                        .and_then(TransactionSetKind::from_functional_group);
                }
            }
            "ST" => {
                envelope.apply_st(&segment);
                if let Some(set) = segment.element(0).and_then(TransactionSetKind::from_set_code) {
                    kind = Some(set);
                }
            }
            _ => {}
        }

        segments.push(segment);
    }

    if segments.is_empty() {
        return Err(X12Error::Malformed("no segments".into()));
    }

    Ok(ParsedInterchange {
        envelope,
        kind,
        segments,
        raw: raw.to_string(),
    })
}
