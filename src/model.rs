use crate::error::ValidationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

static COORD_PATTERN: OnceLock<Regex> = OnceLock::new();
static NAME_PATTERN: OnceLock<Regex> = OnceLock::new();

fn coord_pattern() -> &'static Regex {
    COORD_PATTERN.get_or_init(|| Regex::new(r"^-?\d+\s-?\d+$").expect("static regex"))
}

fn name_pattern() -> &'static Regex {
    NAME_PATTERN.get_or_init(|| Regex::new(r"^[\w-]{1,20}$").expect("static regex"))
}

/// World partition a replay records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Overworld,
    #[value(alias = "the_nether")]
    #[serde(alias = "the_nether")]
    Nether,
    #[value(alias = "the_end")]
    #[serde(alias = "the_end")]
    End,
}

impl Dimension {
    /// Path part of the namespaced dimension id (`minecraft:<path>`).
    pub fn resource_path(self) -> &'static str {
        match self {
            Dimension::Overworld => "overworld",
            Dimension::Nether => "the_nether",
            Dimension::End => "the_end",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource_path())
    }
}

impl FromStr for Dimension {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overworld" => Ok(Dimension::Overworld),
            "nether" | "the_nether" => Ok(Dimension::Nether),
            "end" | "the_end" => Ok(Dimension::End),
            other => Err(ValidationError::Dimension(other.to_string())),
        }
    }
}

/// Chunk coordinate pair `(x, z)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub x: i64,
    pub z: i64,
}

impl FromStr for ChunkCoord {
    type Err = ValidationError;

    /// Accepts `"<x> <z>"` with exactly one whitespace character between the
    /// two integers. Surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !coord_pattern().is_match(s) {
            return Err(ValidationError::Coordinates);
        }
        let mut parts = s.split_whitespace();
        let x = parts.next().and_then(|v| v.parse().ok());
        let z = parts.next().and_then(|v| v.parse().ok());
        match (x, z) {
            (Some(x), Some(z)) => Ok(ChunkCoord { x, z }),
            // digits matched but overflowed i64
            _ => Err(ValidationError::Coordinates),
        }
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.x, self.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRegion {
    pub start: ChunkCoord,
    pub end: ChunkCoord,
}

/// Operator-chosen replay name, guaranteed to match `^[\w-]{1,20}$`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionName(String);

impl SessionName {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if name_pattern().is_match(trimmed) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(ValidationError::Name)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionName> for String {
    fn from(name: SessionName) -> Self {
        name.0
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identity of the UI element bound to a session: the surface it was
/// rendered on and the element itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AffordanceRef {
    pub channel_id: u64,
    pub message_id: u64,
}

impl fmt::Display for AffordanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel_id, self.message_id)
    }
}

impl FromStr for AffordanceRef {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ValidationError::Affordance(s.to_string());
        let (channel, message) = s.split_once(':').ok_or_else(invalid)?;
        Ok(AffordanceRef {
            channel_id: channel.parse().map_err(|_| invalid())?,
            message_id: message.parse().map_err(|_| invalid())?,
        })
    }
}

/// Business state of a session; the render layer maps it to affordances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionState {
    Recording,
    Stopped { artifact_file: String },
}

impl SessionState {
    pub fn is_recording(&self) -> bool {
        matches!(self, SessionState::Recording)
    }

    pub fn artifact_file(&self) -> Option<&str> {
        match self {
            SessionState::Recording => None,
            SessionState::Stopped { artifact_file } => Some(artifact_file),
        }
    }
}

/// One named remote recording over a chunk region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaySession {
    name: SessionName,
    dimension: Option<Dimension>,
    region: Option<ChunkRegion>,
    state: SessionState,
    affordance: AffordanceRef,
    created_at: Option<String>,
}

impl ReplaySession {
    pub fn new(
        name: SessionName,
        dimension: Option<Dimension>,
        region: Option<ChunkRegion>,
        state: SessionState,
        affordance: AffordanceRef,
        created_at: Option<String>,
    ) -> Self {
        Self {
            name,
            dimension,
            region,
            state,
            affordance,
            created_at,
        }
    }

    pub fn name(&self) -> &SessionName {
        &self.name
    }

    pub fn dimension(&self) -> Option<Dimension> {
        self.dimension
    }

    pub fn region(&self) -> Option<ChunkRegion> {
        self.region
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn affordance(&self) -> AffordanceRef {
        self.affordance
    }

    pub fn created_at(&self) -> Option<&str> {
        self.created_at.as_deref()
    }

    pub fn mark_stopped(&mut self, artifact_file: String) {
        self.state = SessionState::Stopped { artifact_file };
    }
}

/// Current time as RFC 3339, falling back to a fixed marker if formatting fails.
pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_length_boundaries() {
        assert!(SessionName::parse("a").is_ok());
        assert!(SessionName::parse("abcdefghij_-0123456").is_ok());
        assert_eq!(SessionName::parse(&"x".repeat(20)).unwrap().as_str().len(), 20);
        assert_eq!(SessionName::parse(&"x".repeat(21)), Err(ValidationError::Name));
        assert_eq!(SessionName::parse(""), Err(ValidationError::Name));
    }

    #[test]
    fn name_rejects_characters_outside_word_class() {
        for bad in ["has space", "semi;colon", "dot.name", "quote\"", "slash/"] {
            assert_eq!(SessionName::parse(bad), Err(ValidationError::Name), "{bad}");
        }
        assert_eq!(SessionName::parse("  run1 ").unwrap().as_str(), "run1");
    }

    #[test]
    fn coordinates_follow_boundary_pattern() {
        assert_eq!("0 0".parse::<ChunkCoord>(), Ok(ChunkCoord { x: 0, z: 0 }));
        assert_eq!(
            " -12 40 ".parse::<ChunkCoord>(),
            Ok(ChunkCoord { x: -12, z: 40 })
        );
        assert_eq!(
            "3\t-4".parse::<ChunkCoord>(),
            Ok(ChunkCoord { x: 3, z: -4 })
        );
        for bad in ["1,2", "1  2", "1", "a b", "1 2 3", "--1 2", "99999999999999999999 1"] {
            assert_eq!(
                bad.parse::<ChunkCoord>(),
                Err(ValidationError::Coordinates),
                "{bad}"
            );
        }
    }

    #[test]
    fn dimension_resource_paths() {
        assert_eq!(Dimension::Overworld.resource_path(), "overworld");
        assert_eq!("nether".parse::<Dimension>().unwrap(), Dimension::Nether);
        assert_eq!("the_end".parse::<Dimension>().unwrap(), Dimension::End);
        assert!("moon".parse::<Dimension>().is_err());
    }

    #[test]
    fn affordance_ref_parses_and_displays() {
        let r: AffordanceRef = "12:345".parse().unwrap();
        assert_eq!(
            r,
            AffordanceRef {
                channel_id: 12,
                message_id: 345
            }
        );
        assert_eq!(r.to_string(), "12:345");
        assert!("12".parse::<AffordanceRef>().is_err());
        assert!("a:b".parse::<AffordanceRef>().is_err());
    }
}
