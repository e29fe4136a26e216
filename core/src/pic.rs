//! Person-in-charge assignments.
//!
//! Stored documents carry a PIC either as a single engineer name or as a
//! list of names. Both shapes deserialize into `PicAssignment`; code that
//! needs the engineers works on the normalized list from `engineers()`.

use crate::normalize::same;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PicAssignment {
    OneEngineer(String),
    ManyEngineers(Vec<String>),
}

impl PicAssignment {
    pub fn one(name: impl Into<String>) -> Self {
        Self::OneEngineer(name.into())
    }

    pub fn many<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::ManyEngineers(names.into_iter().map(Into::into).collect())
    }

    /// Trimmed, non-empty engineer names in their original order.
    /// Names that differ only by case or padding appear once.
    pub fn engineers(&self) -> Vec<&str> {
        let raw: Vec<&str> = match self {
            Self::OneEngineer(name) => vec![name.as_str()],
            Self::ManyEngineers(names) => names.iter().map(String::as_str).collect(),
        };
        let mut out: Vec<&str> = Vec::with_capacity(raw.len());
        for name in raw.into_iter().map(str::trim) {
            if !name.is_empty() && !out.iter().any(|seen| same(seen, name)) {
                out.push(name);
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.engineers().is_empty()
    }

    pub fn includes(&self, engineer: &str) -> bool {
        self.engineers().iter().any(|name| same(name, engineer))
    }

    /// Collapse to the canonical shape: one name becomes `OneEngineer`,
    /// anything else `ManyEngineers`.
    pub fn normalized(&self) -> Self {
        let names = self.engineers();
        match names.as_slice() {
            [single] => Self::OneEngineer((*single).to_string()),
            _ => Self::ManyEngineers(names.into_iter().map(String::from).collect()),
        }
    }
}

impl fmt::Display for PicAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.engineers().join(" / "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_both_document_shapes() {
        let one: PicAssignment = serde_json::from_str(r#""Therese""#).unwrap();
        let many: PicAssignment = serde_json::from_str(r#"["Mark", "Karl"]"#).unwrap();
        assert_eq!(one, PicAssignment::one("Therese"));
        assert_eq!(many.engineers(), vec!["Mark", "Karl"]);
    }

    #[test]
    fn engineers_drop_blanks_and_duplicates() {
        let pic = PicAssignment::many([" Mark ", "", "mark", "Karl"]);
        assert_eq!(pic.engineers(), vec!["Mark", "Karl"]);
        assert_eq!(pic.to_string(), "Mark / Karl");
        assert!(pic.includes("KARL"));
    }

    #[test]
    fn normalized_collapses_single_entry_lists() {
        let pic = PicAssignment::many(["Patrick", " patrick "]);
        assert_eq!(pic.normalized(), PicAssignment::one("Patrick"));
        assert!(PicAssignment::many(Vec::<String>::new()).is_empty());
    }
}
