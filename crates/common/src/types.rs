// Core domain types shared across CollabSpace crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A verified user identity, derived once from the connection credential.
///
/// Immutable for the life of a connection; never updated from
/// client-supplied payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub display_name: String,
    pub email: String,
}

/// The kind of fan-out group a room represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RoomKind {
    Document,
    Meeting,
}

impl RoomKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Meeting => "meeting",
        }
    }
}

impl fmt::Display for RoomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown room kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown room kind '{0}', expected 'document' or 'meeting'")]
pub struct ParseRoomKindError(pub String);

impl FromStr for RoomKind {
    type Err = ParseRoomKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" => Ok(Self::Document),
            "meeting" => Ok(Self::Meeting),
            other => Err(ParseRoomKindError(other.to_string())),
        }
    }
}

/// Identifies one room: a kind plus the opaque external id assigned by the
/// persistence backend (e.g. `document:doc-1`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RoomKey {
    pub kind: RoomKind,
    pub id: String,
}

impl RoomKey {
    pub fn new(kind: RoomKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }

    pub fn document(id: impl Into<String>) -> Self {
        Self::new(RoomKind::Document, id)
    }

    pub fn meeting(id: impl Into<String>) -> Self {
        Self::new(RoomKind::Meeting, id)
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Media track kinds a meeting participant can toggle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Video,
    Audio,
}

impl MediaType {
    /// Membership attribute field the toggle is recorded under.
    pub const fn attribute_field(self) -> &'static str {
        match self {
            Self::Video => "video_enabled",
            Self::Audio => "audio_enabled",
        }
    }
}
