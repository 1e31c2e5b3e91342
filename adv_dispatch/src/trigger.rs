use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// Raw field value meaning "match anything" in a pattern.
pub const ANY: u8 = 0xFF;

/// Verb of a room event. Discriminants follow the classic room action
/// numbering so packed triggers stay compatible with raw tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ActionKind {
    Tick = 0,
    Walk = 1,
    Use = 2,
    Get = 3,
    Look = 4,
    Talk = 5,
    TouchedWarp = 6,
    TouchedHotspot = 7,
    FinishedAnimation = 10,
    FinishedWalking = 12,
    FinishedBeamingIn = 13,
    FinishedBeamingOut = 14,
    FinishedEnteringRoom = 15,
    Options = 16,
}

impl ActionKind {
    pub const ALL: [ActionKind; 14] = [
        ActionKind::Tick,
        ActionKind::Walk,
        ActionKind::Use,
        ActionKind::Get,
        ActionKind::Look,
        ActionKind::Talk,
        ActionKind::TouchedWarp,
        ActionKind::TouchedHotspot,
        ActionKind::FinishedAnimation,
        ActionKind::FinishedWalking,
        ActionKind::FinishedBeamingIn,
        ActionKind::FinishedBeamingOut,
        ActionKind::FinishedEnteringRoom,
        ActionKind::Options,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Tick => "tick",
            ActionKind::Walk => "walk",
            ActionKind::Use => "use",
            ActionKind::Get => "get",
            ActionKind::Look => "look",
            ActionKind::Talk => "talk",
            ActionKind::TouchedWarp => "touched_warp",
            ActionKind::TouchedHotspot => "touched_hotspot",
            ActionKind::FinishedAnimation => "finished_animation",
            ActionKind::FinishedWalking => "finished_walking",
            ActionKind::FinishedBeamingIn => "finished_beaming_in",
            ActionKind::FinishedBeamingOut => "finished_beaming_out",
            ActionKind::FinishedEnteringRoom => "finished_entering_room",
            ActionKind::Options => "options",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| *kind as u8 == value)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete event handed to a dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Trigger {
    pub kind: ActionKind,
    pub primary: u8,
    pub secondary: u8,
    pub modifier: u8,
}

impl Trigger {
    pub const fn new(kind: ActionKind, primary: u8, secondary: u8, modifier: u8) -> Self {
        Trigger {
            kind,
            primary,
            secondary,
            modifier,
        }
    }

    /// World tick number `frame`. Frames past 254 all report 254, since 255
    /// is the wildcard byte and could never be matched exactly.
    pub fn tick(frame: u32) -> Self {
        let frame = frame.min(u32::from(ANY) - 1) as u8;
        Trigger::new(ActionKind::Tick, frame, 0, 0)
    }

    /// Packed little-endian word: kind, primary, secondary, modifier.
    pub fn packed(&self) -> u32 {
        u32::from_le_bytes([self.kind as u8, self.primary, self.secondary, self.modifier])
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.kind, self.primary, self.secondary, self.modifier
        )
    }
}

pub(crate) fn split_fields(input: &str) -> Result<[&str; 4], DispatchError> {
    let parts: Vec<&str> = input.split(':').map(str::trim).collect();
    <[&str; 4]>::try_from(parts.as_slice()).map_err(|_| DispatchError::FieldCount {
        input: input.to_string(),
        found: parts.len(),
    })
}

pub(crate) fn parse_kind(text: &str) -> Result<ActionKind, DispatchError> {
    ActionKind::from_name(text)
        .or_else(|| text.parse::<u8>().ok().and_then(ActionKind::from_u8))
        .ok_or_else(|| DispatchError::UnknownAction(text.to_string()))
}

pub(crate) fn parse_byte(text: &str) -> Result<u8, DispatchError> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => text.parse::<u8>(),
    };
    parsed.map_err(|_| DispatchError::InvalidField(text.to_string()))
}

impl FromStr for Trigger {
    type Err = DispatchError;

    /// Parses `kind:primary:secondary:modifier`, e.g. `use:5:7:3`.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let [kind, primary, secondary, modifier] = split_fields(input)?;
        Ok(Trigger::new(
            parse_kind(kind)?,
            parse_byte(primary)?,
            parse_byte(secondary)?,
            parse_byte(modifier)?,
        ))
    }
}
