use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::trigger::{parse_byte, parse_kind, split_fields, ActionKind, Trigger, ANY};

/// One slot of a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field<T> {
    Any,
    Is(T),
}

impl<T: PartialEq> Field<T> {
    pub fn matches(&self, value: &T) -> bool {
        match self {
            Field::Any => true,
            Field::Is(expected) => expected == value,
        }
    }

    /// True when every value `other` accepts is also accepted here.
    pub fn subsumes(&self, other: &Field<T>) -> bool {
        match (self, other) {
            (Field::Any, _) => true,
            (Field::Is(a), Field::Is(b)) => a == b,
            (Field::Is(_), Field::Any) => false,
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Field::Any)
    }
}

const fn byte_field(value: u8) -> Field<u8> {
    if value == ANY {
        Field::Any
    } else {
        Field::Is(value)
    }
}

fn raw_byte(field: Field<u8>) -> u8 {
    match field {
        Field::Any => ANY,
        Field::Is(value) => value,
    }
}

/// Row-side trigger with optional wildcards.
///
/// Matching packs both sides into a word and compares them under a mask in
/// which wildcard bytes are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PatternRepr", into = "PatternRepr")]
pub struct Pattern {
    pub kind: Field<ActionKind>,
    pub primary: Field<u8>,
    pub secondary: Field<u8>,
    pub modifier: Field<u8>,
}

impl Pattern {
    /// Matches every event.
    pub const ANY_EVENT: Pattern = Pattern {
        kind: Field::Any,
        primary: Field::Any,
        secondary: Field::Any,
        modifier: Field::Any,
    };

    /// Pattern for `kind`; [`ANY`] in an id slot is a wildcard.
    pub const fn new(kind: ActionKind, primary: u8, secondary: u8, modifier: u8) -> Self {
        Pattern {
            kind: Field::Is(kind),
            primary: byte_field(primary),
            secondary: byte_field(secondary),
            modifier: byte_field(modifier),
        }
    }

    /// Decode the four raw bytes of a table entry. Returns `None` for an
    /// unknown action number.
    pub fn from_raw(raw: [u8; 4]) -> Option<Self> {
        let kind = if raw[0] == ANY {
            Field::Any
        } else {
            Field::Is(ActionKind::from_u8(raw[0])?)
        };
        Some(Pattern {
            kind,
            primary: byte_field(raw[1]),
            secondary: byte_field(raw[2]),
            modifier: byte_field(raw[3]),
        })
    }

    pub fn raw(&self) -> [u8; 4] {
        let kind = match self.kind {
            Field::Any => ANY,
            Field::Is(kind) => kind as u8,
        };
        [
            kind,
            raw_byte(self.primary),
            raw_byte(self.secondary),
            raw_byte(self.modifier),
        ]
    }

    pub fn packed(&self) -> u32 {
        u32::from_le_bytes(self.raw())
    }

    pub fn mask(&self) -> u32 {
        let byte = |any: bool| if any { 0x00 } else { 0xFF };
        u32::from_le_bytes([
            byte(self.kind.is_any()),
            byte(self.primary.is_any()),
            byte(self.secondary.is_any()),
            byte(self.modifier.is_any()),
        ])
    }

    pub fn matches(&self, event: &Trigger) -> bool {
        let mask = self.mask();
        event.packed() & mask == self.packed() & mask
    }

    /// True when this pattern matches every event `other` matches, i.e. a row
    /// with `other` placed after this one could never fire.
    pub fn subsumes(&self, other: &Pattern) -> bool {
        self.kind.subsumes(&other.kind)
            && self.primary.subsumes(&other.primary)
            && self.secondary.subsumes(&other.secondary)
            && self.modifier.subsumes(&other.modifier)
    }

    /// Number of concrete (non-wildcard) fields.
    pub fn specificity(&self) -> u32 {
        self.mask().count_ones() / 8
    }
}

impl From<Trigger> for Pattern {
    fn from(trigger: Trigger) -> Self {
        Pattern {
            kind: Field::Is(trigger.kind),
            primary: Field::Is(trigger.primary),
            secondary: Field::Is(trigger.secondary),
            modifier: Field::Is(trigger.modifier),
        }
    }
}

fn write_byte(f: &mut fmt::Formatter<'_>, field: Field<u8>) -> fmt::Result {
    match field {
        Field::Any => f.write_str("*"),
        Field::Is(value) => write!(f, "{value}"),
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Field::Any => f.write_str("*")?,
            Field::Is(kind) => write!(f, "{kind}")?,
        }
        for field in [self.primary, self.secondary, self.modifier] {
            f.write_str(":")?;
            write_byte(f, field)?;
        }
        Ok(())
    }
}

fn is_wildcard(text: &str) -> bool {
    matches!(text, "*" | "any" | "ANY")
}

fn parse_byte_field(text: &str) -> Result<Field<u8>, DispatchError> {
    if is_wildcard(text) {
        Ok(Field::Any)
    } else {
        parse_byte(text).map(byte_field)
    }
}

/// The raw wildcard byte is accepted in the kind slot too, matching
/// [`Pattern::from_raw`].
fn parse_kind_field(text: &str) -> Result<Field<ActionKind>, DispatchError> {
    if is_wildcard(text) || matches!(parse_byte(text), Ok(ANY)) {
        Ok(Field::Any)
    } else {
        parse_kind(text).map(Field::Is)
    }
}

impl FromStr for Pattern {
    type Err = DispatchError;

    /// Parses `kind:primary:secondary:modifier` where any slot may be `*`.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let [kind, primary, secondary, modifier] = split_fields(input)?;
        Ok(Pattern {
            kind: parse_kind_field(kind)?,
            primary: parse_byte_field(primary)?,
            secondary: parse_byte_field(secondary)?,
            modifier: parse_byte_field(modifier)?,
        })
    }
}

/// Script-side field: a number, a wildcard string, or an action name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum FieldRepr {
    Number(u8),
    Text(String),
}

impl FieldRepr {
    fn into_text(self) -> String {
        match self {
            FieldRepr::Number(value) => value.to_string(),
            FieldRepr::Text(text) => text,
        }
    }
}

/// Either `"use:5:7:*"` or `["use", 5, 7, "*"]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum PatternRepr {
    Text(String),
    Fields(Vec<FieldRepr>),
}

impl TryFrom<PatternRepr> for Pattern {
    type Error = DispatchError;

    fn try_from(repr: PatternRepr) -> Result<Self, Self::Error> {
        match repr {
            PatternRepr::Text(text) => text.parse(),
            PatternRepr::Fields(fields) => {
                let joined = fields
                    .into_iter()
                    .map(FieldRepr::into_text)
                    .collect::<Vec<_>>()
                    .join(":");
                joined.parse()
            }
        }
    }
}

impl From<Pattern> for PatternRepr {
    fn from(pattern: Pattern) -> Self {
        let byte = |field: Field<u8>| match field {
            Field::Any => FieldRepr::Text("*".to_string()),
            Field::Is(value) => FieldRepr::Number(value),
        };
        let kind = match pattern.kind {
            Field::Any => "*".to_string(),
            Field::Is(kind) => kind.as_str().to_string(),
        };
        PatternRepr::Fields(vec![
            FieldRepr::Text(kind),
            byte(pattern.primary),
            byte(pattern.secondary),
            byte(pattern.modifier),
        ])
    }
}
