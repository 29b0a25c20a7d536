//! Bout CLI Library
//!
//! Runs the scoring core behind a line-oriented JSON transport: inbound
//! envelopes on stdin, routed deliveries on stdout, logs on stderr.

use anyhow::{Context, Result};
use bout_core::{Broadcaster, ConnectionId, EngineSettings, MatchConfig, MatchRegistry, Outbound};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Deployment settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Configuration applied to every match created at startup
    #[serde(rename = "match")]
    pub match_config: MatchConfig,
    pub engine: EngineSettings,
    /// Fixed match codes to open; a random one is generated when empty
    pub codes: Vec<String>,
}

pub fn load_settings(path: &Path) -> Result<Settings> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
    let settings: Settings = serde_yaml::from_str(&raw)
        .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;
    settings
        .engine
        .validate()
        .with_context(|| format!("Invalid engine settings in {}", path.display()))?;
    Ok(settings)
}

pub fn default_settings_yaml() -> Result<String> {
    Ok(serde_yaml::to_string(&Settings::default())?)
}

// ============================================
// Line transport
// ============================================

/// One stdout record for the external transport to act on.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum OutLine<'a> {
    Created { code: &'a str },
    Subscribe { code: &'a str, conn: &'a ConnectionId },
    Unsubscribe { conn: &'a ConnectionId },
    Publish { code: &'a str, message: &'a Outbound },
    Send { conn: &'a ConnectionId, message: &'a Outbound },
}

/// Broadcaster that writes one JSON record per delivery.
pub struct LineBroadcaster<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> LineBroadcaster<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn announce(&self, code: &str) {
        self.write(&OutLine::Created { code });
    }

    fn write(&self, line: &OutLine<'_>) {
        let encoded = match serde_json::to_string(line) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to encode outbound record");
                return;
            }
        };
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(out, "{encoded}").and_then(|_| out.flush()) {
            warn!(error = %e, "failed to write outbound record");
        }
    }
}

impl<W: Write + Send> Broadcaster for LineBroadcaster<W> {
    fn subscribe(&self, code: &str, conn: &ConnectionId) {
        self.write(&OutLine::Subscribe { code, conn });
    }

    fn unsubscribe(&self, conn: &ConnectionId) {
        self.write(&OutLine::Unsubscribe { conn });
    }

    fn publish(&self, code: &str, message: &Outbound) {
        self.write(&OutLine::Publish { code, message });
    }

    fn send_to(&self, conn: &ConnectionId, message: &Outbound) {
        self.write(&OutLine::Send { conn, message });
    }
}

/// Counters for one stdin session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub handled: usize,
    pub failed: usize,
}

/// Feed every non-blank input line to the registry until EOF.
pub fn run_session<R: BufRead>(registry: &MatchRegistry, input: R) -> Result<SessionStats> {
    let mut stats = SessionStats::default();
    for line in input.lines() {
        let line = line.context("Failed to read inbound line")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match registry.handle_json(line) {
            Ok(()) => stats.handled += 1,
            Err(e) => {
                stats.failed += 1;
                debug!(error = %e, "inbound envelope not handled");
            }
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bout_core::{ManualClock, MatchStatus};
    use std::io::Cursor;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn records(&self) -> Vec<serde_json::Value> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }
    }

    #[test]
    fn settings_load_from_yaml_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bout.yaml");
        std::fs::write(
            &path,
            "match:\n  referees_required: 5\n  red_name: Hong\nengine:\n  tick_ms: 50\ncodes: [RING01]\n",
        )
        .unwrap();

        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.match_config.referees_required, 5);
        assert_eq!(settings.match_config.red_name, "Hong");
        assert_eq!(settings.match_config.round_secs, 120);
        assert_eq!(settings.engine.tick_ms, 50);
        assert_eq!(settings.engine.scoring_window_ms, 1_300);
        assert_eq!(settings.codes, vec!["RING01".to_string()]);
    }

    #[test]
    fn invalid_engine_settings_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "engine:\n  tick_ms: 0\n").unwrap();
        assert!(load_settings(&path).is_err());
        assert!(load_settings(&dir.path().join("missing.yaml")).is_err());
    }

    #[test]
    fn default_yaml_round_trips() {
        let yaml = default_settings_yaml().unwrap();
        assert!(yaml.contains("match:"));
        let parsed: Settings = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, Settings::default());
    }

    #[test]
    fn session_routes_lines_to_the_registry() {
        let buf = SharedBuf::default();
        let lines = Arc::new(LineBroadcaster::new(buf.clone()));
        let registry = MatchRegistry::new(
            EngineSettings::default(),
            Arc::new(ManualClock::new()),
            lines.clone(),
        );
        registry
            .create_with_code(
                "RING01",
                MatchConfig {
                    referees_required: 1,
                    ..MatchConfig::default()
                },
            )
            .unwrap();
        lines.announce("RING01");

        let input = [
            r#"{"conn":"op","code":"RING01","event":"join_operator"}"#,
            "",
            r#"{"conn":"r1","code":"RING01","event":"join_referee","password":"1234","name":"Seo"}"#,
            r#"{"conn":"r1","code":"RING01","event":"referee_activity","password":"1234"}"#,
            r#"{"conn":"op","code":"RING01","event":"proceed"}"#,
            r#"{"conn":"op","code":"WRONG1","event":"join_operator"}"#,
            "garbage",
        ]
        .join("\n");

        let stats = run_session(&registry, Cursor::new(input)).unwrap();
        assert_eq!(stats, SessionStats { handled: 4, failed: 2 });
        assert_eq!(
            registry.with_match("RING01", |m| m.status()).unwrap(),
            MatchStatus::Running
        );

        let records = buf.records();
        assert_eq!(records[0]["kind"], "created");
        assert!(records
            .iter()
            .any(|r| r["kind"] == "subscribe" && r["conn"] == "r1" && r["code"] == "RING01"));
        assert!(records
            .iter()
            .any(|r| r["kind"] == "publish" && r["message"]["event"] == "proceed_main"));
        assert!(records.iter().any(|r| r["kind"] == "send"
            && r["conn"] == "op"
            && r["message"]["event"] == "error"
            && r["message"]["message"] == "Invalid code"));
    }
}
