//! Core value types shared by the engine, protocol and registry.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

// ============================================
// Color
// ============================================

/// One of the two competitors in a bout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Blue,
}

impl Color {
    pub const ALL: [Color; 2] = [Color::Red, Color::Blue];

    pub fn opponent(self) -> Color {
        match self {
            Color::Red => Color::Blue,
            Color::Blue => Color::Red,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Color::Red => write!(f, "red"),
            Color::Blue => write!(f, "blue"),
        }
    }
}

/// A value held once per color, serialized as `{"red": .., "blue": ..}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerColor<T> {
    pub red: T,
    pub blue: T,
}

impl<T: Copy> PerColor<T> {
    pub fn splat(value: T) -> Self {
        Self { red: value, blue: value }
    }
}

impl<T> Index<Color> for PerColor<T> {
    type Output = T;

    fn index(&self, color: Color) -> &T {
        match color {
            Color::Red => &self.red,
            Color::Blue => &self.blue,
        }
    }
}

impl<T> IndexMut<Color> for PerColor<T> {
    fn index_mut(&mut self, color: Color) -> &mut T {
        match color {
            Color::Red => &mut self.red,
            Color::Blue => &mut self.blue,
        }
    }
}

// ============================================
// MatchStatus
// ============================================

/// Bout lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    /// Waiting for the referee roster to fill and test in
    Connecting,
    /// Round in progress, votes accepted
    Running,
    /// Between rounds (or after a drawn round)
    Break,
    /// Interrupted; operator must resume
    Paused,
    /// Terminal until a new match is started
    Over,
}

impl MatchStatus {
    pub fn is_terminal(self) -> bool {
        self == MatchStatus::Over
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            MatchStatus::Connecting => "connecting",
            MatchStatus::Running => "running",
            MatchStatus::Break => "break",
            MatchStatus::Paused => "paused",
            MatchStatus::Over => "over",
        };
        f.write_str(s)
    }
}

// ============================================
// ConnectionId
// ============================================

/// Transport-assigned identity of one connected party (operator console or referee device).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opponent_is_involutive() {
        for c in Color::ALL {
            assert_eq!(c.opponent().opponent(), c);
            assert_ne!(c.opponent(), c);
        }
    }

    #[test]
    fn per_color_serializes_as_named_pair() {
        let mut scores = PerColor::splat(0u32);
        scores[Color::Blue] += 3;
        let json = serde_json::to_value(scores).unwrap();
        assert_eq!(json, serde_json::json!({"red": 0, "blue": 3}));
    }

    #[test]
    fn status_uses_lowercase_wire_names() {
        assert_eq!(serde_json::to_value(MatchStatus::Break).unwrap(), "break");
        assert_eq!(MatchStatus::Over.to_string(), "over");
        assert!(MatchStatus::Over.is_terminal());
        assert!(!MatchStatus::Paused.is_terminal());
    }
}
