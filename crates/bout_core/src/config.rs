//! Match setup input and engine tuning.

use crate::error::BoutError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Longest competitor / referee display name kept.
pub const MAX_NAME_CHARS: usize = 24;

pub const MIN_REFEREES: u32 = 1;
pub const MAX_REFEREES: u32 = 7;

// ============================================
// MatchConfig
// ============================================

/// Per-match configuration captured at setup and preserved across "new match".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub referees_required: u32,
    pub round_secs: u32,
    pub break_secs: u32,
    pub rounds_to_win: u32,
    pub point_gap: u32,
    pub passphrase: String,
    pub red_name: String,
    pub blue_name: String,
    pub category: String,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            referees_required: 3,
            round_secs: 120,
            break_secs: 60,
            rounds_to_win: 2,
            point_gap: 12,
            passphrase: "1234".to_string(),
            red_name: "RED".to_string(),
            blue_name: "BLUE".to_string(),
            category: String::new(),
        }
    }
}

impl MatchConfig {
    /// Clamp every field into its accepted range rather than rejecting setup input.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        let passphrase = self.passphrase.trim().to_string();
        Self {
            referees_required: self.referees_required.clamp(MIN_REFEREES, MAX_REFEREES),
            round_secs: self.round_secs.clamp(20, 600),
            break_secs: self.break_secs.clamp(5, 600),
            rounds_to_win: self.rounds_to_win.max(1),
            point_gap: self.point_gap.max(1),
            passphrase: if passphrase.is_empty() {
                defaults.passphrase
            } else {
                passphrase
            },
            red_name: clean_name(&self.red_name).unwrap_or(defaults.red_name),
            blue_name: clean_name(&self.blue_name).unwrap_or(defaults.blue_name),
            category: self.category.trim().to_string(),
        }
    }

    pub fn round_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.round_secs))
    }

    pub fn break_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.break_secs))
    }
}

/// Trim and truncate a display name; `None` if nothing is left.
pub fn clean_name(raw: &str) -> Option<String> {
    let trimmed: String = raw.trim().chars().take(MAX_NAME_CHARS).collect();
    let trimmed = trimmed.trim_end().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

// ============================================
// Passphrase
// ============================================

/// Shared per-match referee passphrase, kept only as a SHA-256 digest.
#[derive(Clone, PartialEq, Eq)]
pub struct Passphrase([u8; 32]);

impl Passphrase {
    pub fn new(plain: &str) -> Self {
        Self(Sha256::digest(plain.as_bytes()).into())
    }

    pub fn verify(&self, candidate: &str) -> bool {
        let digest: [u8; 32] = Sha256::digest(candidate.as_bytes()).into();
        digest
            .iter()
            .zip(self.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl std::fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Passphrase(..)")
    }
}

// ============================================
// EngineSettings
// ============================================

/// Registry eviction policy for matches nobody needs anymore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// How long an `over` match stays around for late viewers
    pub finished_retention_secs: u64,
    /// Matches with no referees and no inbound traffic for this long are dropped
    pub idle_ttl_secs: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            finished_retention_secs: 30 * 60,
            idle_ttl_secs: 12 * 60 * 60,
        }
    }
}

impl RetentionPolicy {
    pub fn finished_retention(&self) -> Duration {
        Duration::from_secs(self.finished_retention_secs)
    }

    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }
}

/// Engine-wide timing constants. Copied into every match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub scoring_window_ms: u64,
    pub activity_decay_ms: u64,
    pub history_capacity: usize,
    pub tick_ms: u64,
    pub running_timer_emit_ms: u64,
    pub stopped_timer_emit_ms: u64,
    pub roster_refresh_ms: u64,
    pub retention: RetentionPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            scoring_window_ms: 1_300,
            activity_decay_ms: 2_500,
            history_capacity: 128,
            tick_ms: 100,
            running_timer_emit_ms: 200,
            stopped_timer_emit_ms: 1_000,
            roster_refresh_ms: 1_000,
            retention: RetentionPolicy::default(),
        }
    }
}

impl EngineSettings {
    pub fn scoring_window(&self) -> Duration {
        Duration::from_millis(self.scoring_window_ms)
    }

    pub fn activity_decay(&self) -> Duration {
        Duration::from_millis(self.activity_decay_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn running_timer_emit(&self) -> Duration {
        Duration::from_millis(self.running_timer_emit_ms)
    }

    pub fn stopped_timer_emit(&self) -> Duration {
        Duration::from_millis(self.stopped_timer_emit_ms)
    }

    pub fn roster_refresh(&self) -> Duration {
        Duration::from_millis(self.roster_refresh_ms)
    }

    pub fn validate(&self) -> crate::Result<()> {
        let invalid = |msg: &str| Err(BoutError::InvalidConfig(msg.to_string()));
        if self.scoring_window_ms == 0 {
            return invalid("scoring_window_ms must be positive");
        }
        if self.tick_ms == 0 {
            return invalid("tick_ms must be positive");
        }
        if self.history_capacity == 0 {
            return invalid("history_capacity must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_clamps_out_of_range_setup() {
        let cfg = MatchConfig {
            referees_required: 12,
            round_secs: 5,
            break_secs: 9_999,
            rounds_to_win: 0,
            point_gap: 0,
            passphrase: "   ".into(),
            red_name: "  A very long competitor name that overflows  ".into(),
            blue_name: "".into(),
            category: "  -68kg ".into(),
        }
        .sanitized();

        assert_eq!(cfg.referees_required, MAX_REFEREES);
        assert_eq!(cfg.round_secs, 20);
        assert_eq!(cfg.break_secs, 600);
        assert_eq!(cfg.rounds_to_win, 1);
        assert_eq!(cfg.point_gap, 1);
        assert_eq!(cfg.passphrase, "1234");
        assert_eq!(cfg.red_name.chars().count(), MAX_NAME_CHARS);
        assert!(cfg.red_name.starts_with("A very long"));
        assert_eq!(cfg.blue_name, "BLUE");
        assert_eq!(cfg.category, "-68kg");
    }

    #[test]
    fn partial_yaml_like_json_falls_back_to_defaults() {
        let cfg: MatchConfig = serde_json::from_str(r#"{"round_secs": 90}"#).unwrap();
        assert_eq!(cfg.round_secs, 90);
        assert_eq!(cfg.referees_required, 3);
        assert_eq!(cfg.round_duration(), Duration::from_secs(90));
    }

    #[test]
    fn passphrase_verifies_only_exact_input() {
        let p = Passphrase::new("fighters");
        assert!(p.verify("fighters"));
        assert!(!p.verify("Fighters"));
        assert!(!p.verify(""));
        assert_eq!(format!("{:?}", p), "Passphrase(..)");
    }

    #[test]
    fn default_settings_are_valid() {
        let s = EngineSettings::default();
        assert!(s.validate().is_ok());
        assert_eq!(s.scoring_window(), Duration::from_millis(1_300));
        let bad = EngineSettings { tick_ms: 0, ..s };
        assert!(matches!(
            bad.validate(),
            Err(BoutError::InvalidConfig(msg)) if msg.contains("tick_ms")
        ));
    }
}
