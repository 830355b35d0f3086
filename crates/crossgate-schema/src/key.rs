//! Composite ledger keys of the form `\0TYPE\0part\0part\0...`.
//!
//! The encoding sorts all keys of one entity kind together, so a key built
//! from a kind and a leading subset of parts is a valid scan prefix.

use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;

const SEPARATOR: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Crossing,
    Lane,
    Request,
    RequestAudit,
    Sequence,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Crossing,
        EntityKind::Lane,
        EntityKind::Request,
        EntityKind::RequestAudit,
        EntityKind::Sequence,
    ];

    pub fn type_tag(self) -> &'static str {
        match self {
            EntityKind::Crossing => "CROSSING",
            EntityKind::Lane => "LANE",
            EntityKind::Request => "REQUEST",
            EntityKind::RequestAudit => "REQUEST_AUDIT",
            EntityKind::Sequence => "SEQUENCE",
        }
    }

    pub fn from_type_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.type_tag() == tag)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompositeKey {
    kind: EntityKind,
    parts: Vec<String>,
}

impl CompositeKey {
    pub fn new<I, S>(kind: EntityKind, parts: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parts: Vec<String> = parts.into_iter().map(Into::into).collect();
        for part in &parts {
            if part.is_empty() {
                return Err(SchemaError::InvalidKey(format!(
                    "empty key part for {kind}"
                )));
            }
            if part.as_bytes().contains(&SEPARATOR) {
                return Err(SchemaError::InvalidKey(format!(
                    "key part for {kind} contains a NUL byte"
                )));
            }
        }
        Ok(Self { kind, parts })
    }

    /// A key matching every record of `kind`.
    pub fn prefix(kind: EntityKind) -> Self {
        Self {
            kind,
            parts: Vec::new(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            2 + self.kind.type_tag().len() + self.parts.iter().map(|p| p.len() + 1).sum::<usize>(),
        );
        out.push(SEPARATOR);
        out.extend_from_slice(self.kind.type_tag().as_bytes());
        out.push(SEPARATOR);
        for part in &self.parts {
            out.extend_from_slice(part.as_bytes());
            out.push(SEPARATOR);
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SchemaError> {
        let rest = bytes
            .strip_prefix(&[SEPARATOR])
            .ok_or_else(|| SchemaError::InvalidKey("missing leading separator".to_owned()))?;
        let rest = rest
            .strip_suffix(&[SEPARATOR])
            .ok_or_else(|| SchemaError::InvalidKey("missing trailing separator".to_owned()))?;

        let mut segments = rest.split(|b| *b == SEPARATOR);
        let tag = segments
            .next()
            .and_then(|s| std::str::from_utf8(s).ok())
            .ok_or_else(|| SchemaError::InvalidKey("unreadable type tag".to_owned()))?;
        let kind = EntityKind::from_type_tag(tag)
            .ok_or_else(|| SchemaError::InvalidKey(format!("unknown type tag '{tag}'")))?;

        let parts = segments
            .map(|s| {
                std::str::from_utf8(s)
                    .map(str::to_owned)
                    .map_err(|_| SchemaError::InvalidKey("key part is not UTF-8".to_owned()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(kind, parts)
    }

    /// True if `self`, used as a prefix, covers `other`.
    pub fn is_prefix_of(&self, other: &CompositeKey) -> bool {
        self.kind == other.kind
            && self.parts.len() <= other.parts.len()
            && self.parts.iter().zip(&other.parts).all(|(a, b)| a == b)
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for part in &self.parts {
            write!(f, "/{part}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_with_separators() {
        let key = CompositeKey::new(EntityKind::Lane, ["C1", "L1"]).unwrap();
        assert_eq!(key.to_bytes(), b"\0LANE\0C1\0L1\0".to_vec());
        assert_eq!(key.to_string(), "LANE/C1/L1");
    }

    #[test]
    fn bytes_roundtrip() {
        let key = CompositeKey::new(EntityKind::RequestAudit, ["42"]).unwrap();
        let back = CompositeKey::from_bytes(&key.to_bytes()).unwrap();
        assert_eq!(back, key);
        assert_eq!(back.kind(), EntityKind::RequestAudit);
        assert_eq!(back.parts(), ["42".to_owned()]);
    }

    #[test]
    fn prefix_bytes_roundtrip() {
        let key = CompositeKey::prefix(EntityKind::Crossing);
        assert_eq!(key.to_bytes(), b"\0CROSSING\0".to_vec());
        assert_eq!(CompositeKey::from_bytes(&key.to_bytes()).unwrap(), key);
    }

    #[test]
    fn rejects_empty_and_nul_parts() {
        assert!(CompositeKey::new(EntityKind::Crossing, [""]).is_err());
        assert!(CompositeKey::new(EntityKind::Crossing, ["a\0b"]).is_err());
    }

    #[test]
    fn rejects_malformed_bytes() {
        assert!(CompositeKey::from_bytes(b"LANE\0").is_err());
        assert!(CompositeKey::from_bytes(b"\0LANE").is_err());
        assert!(CompositeKey::from_bytes(b"\0NOPE\0x\0").is_err());
    }

    #[test]
    fn prefix_matching() {
        let lanes_of_c1 = CompositeKey::new(EntityKind::Lane, ["C1"]).unwrap();
        let l1 = CompositeKey::new(EntityKind::Lane, ["C1", "L1"]).unwrap();
        let other = CompositeKey::new(EntityKind::Lane, ["C2", "L1"]).unwrap();
        let crossing = CompositeKey::new(EntityKind::Crossing, ["C1"]).unwrap();
        assert!(lanes_of_c1.is_prefix_of(&l1));
        assert!(!lanes_of_c1.is_prefix_of(&other));
        assert!(!lanes_of_c1.is_prefix_of(&crossing));
        assert!(CompositeKey::prefix(EntityKind::Lane).is_prefix_of(&other));
    }

    #[test]
    fn type_tags_roundtrip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_type_tag(kind.type_tag()), Some(kind));
        }
    }
}
