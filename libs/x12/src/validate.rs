//! Envelope validation. Collects every violation instead of stopping at the
//! first, so a single 999 can report them all.

use crate::parse::ParsedInterchange;

/// Required envelope segments plus the SE01 count rule. A mismatch between
/// the declared and actual segment count is a validation error, not a parse
/// failure.
pub fn validate(parsed: &ParsedInterchange) -> Vec<String> {
    let mut errors = Vec::new();
    let ids = parsed.segment_ids();

    for required in ["ISA", "GS", "ST", "SE", "GE", "IEA"] {
        if !ids.contains(&required) {
            errors.push(format!("Missing {required} segment"));
        }
    }

    // SE01 must equal the number of segments from ST through SE inclusive.
    let st_index = ids.iter().position(|id| *id == "ST");
    let se_index = ids.iter().position(|id| *id == "SE");
    if let (Some(st), Some(se)) = (st_index, se_index) {
        if se > st {
            let expected = se - st + 1;
            let declared = parsed.segments[se].element(0).unwrap_or_default();
            match declared.parse::<usize>() {
                Ok(count) if count == expected => {}
                Ok(count) => errors.push(format!(
                    "SE segment count mismatch: expected {expected}, got {count}"
                )),
                Err(_) => errors.push(format!(
                    "SE segment count is not numeric: '{declared}'"
                )),
            }
        } else {
            errors.push("SE segment precedes ST segment".to_string());
        }
    }

    errors
}
