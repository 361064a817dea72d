//! Segment-level representation of an X12 interchange.

use serde::{Deserialize, Serialize};

/// Delimiters for one interchange. The gateway emits the conventional set
/// and accepts the same on inbound content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiters {
    pub segment: char,
    pub element: char,
    pub subelement: char,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            segment: '~',
            element: '*',
            subelement: ':',
        }
    }
}

/// One segment: the id plus its data elements (the id is not repeated in
/// `elements`, so `elements[0]` is the first data element).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub elements: Vec<String>,
}

impl Segment {
    pub fn new(id: impl Into<String>, elements: Vec<String>) -> Self {
        Self {
            id: id.into(),
            elements,
        }
    }

    /// Data element by zero-based position, empty elements included.
    pub fn element(&self, index: usize) -> Option<&str> {
        self.elements.get(index).map(String::as_str)
    }

    /// Data element, trimmed; `None` when absent or blank. ISA ids are
    /// space-padded to 15 characters, so most callers want this form.
    pub fn element_trimmed(&self, index: usize) -> Option<&str> {
        self.element(index).map(str::trim).filter(|s| !s.is_empty())
    }

    /// First component of a composite element (split on the subelement
    /// delimiter), e.g. the procedure code in `HC:99213`.
    pub fn component(&self, index: usize, delimiters: Delimiters) -> Option<&str> {
        self.element(index)
            .and_then(|e| e.split(delimiters.subelement).next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_accessors() {
        let seg = Segment::new(
            "NM1",
            vec!["IL".into(), "1".into(), "DOE".into(), "".into()],
        );
        assert_eq!(seg.element(0), Some("IL"));
        assert_eq!(seg.element(3), Some(""));
        assert_eq!(seg.element_trimmed(3), None);
        assert_eq!(seg.element(9), None);
    }

    #[test]
    fn composite_split() {
        let seg = Segment::new("SV1", vec!["HC:99213".into(), "150".into()]);
        assert_eq!(seg.component(0, Delimiters::default()), Some("HC"));
    }
}
