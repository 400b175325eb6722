//! Record-shape detection.
//!
//! Only the first record of a result set is inspected. This is a heuristic
//! keyed on field counts, not a schema check: later records are never
//! validated against the sample, and the mapper copes with whatever it finds.

use serde_json::Value;
use std::fmt;

/// The four recognized record layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordLayout {
    /// Tag A: bag of nested entities, no edges. Also the fallback.
    EntityBag,
    /// Tag B: two scalar fields, `source → target`.
    SimplePair,
    /// Tag C: one nested entity plus scalar keys (`entity → key`, labeled).
    EntityWithKey,
    /// Tag D: three or more scalar fields, `source → target` labeled by the third.
    Triple,
}

impl RecordLayout {
    pub fn tag(self) -> char {
        match self {
            Self::EntityBag => 'A',
            Self::SimplePair => 'B',
            Self::EntityWithKey => 'C',
            Self::Triple => 'D',
        }
    }

    pub fn from_tag(tag: char) -> Option<Self> {
        match tag.to_ascii_uppercase() {
            'A' => Some(Self::EntityBag),
            'B' => Some(Self::SimplePair),
            'C' => Some(Self::EntityWithKey),
            'D' => Some(Self::Triple),
            _ => None,
        }
    }
}

impl fmt::Display for RecordLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

pub fn detect_layout(records: &[Value]) -> RecordLayout {
    let Some(Value::Object(sample)) = records.first() else {
        return RecordLayout::EntityBag;
    };

    let dict_fields = sample.values().filter(|v| v.is_object()).count();
    let fields = sample.len();

    match (dict_fields, fields) {
        (1, n) if n >= 3 => RecordLayout::EntityWithKey,
        (0, 2) => RecordLayout::SimplePair,
        (0, n) if n >= 3 => RecordLayout::Triple,
        _ => RecordLayout::EntityBag,
    }
}
