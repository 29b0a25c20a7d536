//! Match registry: owns every active match, keyed by its join code.
//!
//! Each match sits behind its own mutex so inbound handlers and the periodic
//! sweep serialize per match without blocking one another across matches.
//! The registry is an explicit object handed to every caller; there is no
//! global match table.

use crate::api::dispatch::apply;
use crate::api::protocol::{Command, Envelope, Outbound};
use crate::broadcast::{Broadcaster, Effect, Effects};
use crate::clock::Clock;
use crate::config::{EngineSettings, MatchConfig};
use crate::engine::Match;
use crate::error::{BoutError, Result};
use crate::models::ConnectionId;
use rand::Rng;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

/// Unambiguous characters for human-typed match codes.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LEN: usize = 6;

pub type SharedMatch = Arc<Mutex<Match>>;

/// Outcome of one periodic sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub swept: usize,
    pub evicted: Vec<String>,
    pub faults: usize,
}

pub struct MatchRegistry {
    matches: RwLock<HashMap<String, SharedMatch>>,
    settings: EngineSettings,
    clock: Arc<dyn Clock>,
    broadcaster: Arc<dyn Broadcaster>,
}

pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

fn lock_match(entry: &Mutex<Match>) -> MutexGuard<'_, Match> {
    entry.lock().unwrap_or_else(|poisoned| {
        warn!("recovering poisoned match lock");
        poisoned.into_inner()
    })
}

impl MatchRegistry {
    pub fn new(
        settings: EngineSettings,
        clock: Arc<dyn Clock>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            matches: RwLock::new(HashMap::new()),
            settings,
            clock,
            broadcaster,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn read_map(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, SharedMatch>> {
        self.matches.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_map(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, SharedMatch>> {
        self.matches.write().unwrap_or_else(|e| e.into_inner())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create a match under a fresh random code.
    pub fn create(&self, config: MatchConfig) -> String {
        let mut map = self.write_map();
        let code = loop {
            let candidate = generate_code();
            if !map.contains_key(&candidate) {
                break candidate;
            }
        };
        let m = Match::new(code.clone(), config, self.settings, self.clock.now());
        map.insert(code.clone(), Arc::new(Mutex::new(m)));
        info!(%code, "match created");
        code
    }

    pub fn create_with_code(&self, code: &str, config: MatchConfig) -> Result<()> {
        let code = code.trim().to_string();
        if code.is_empty() {
            return Err(BoutError::InvalidConfig("empty match code".into()));
        }
        let mut map = self.write_map();
        if map.contains_key(&code) {
            return Err(BoutError::DuplicateCode { code });
        }
        let m = Match::new(code.clone(), config, self.settings, self.clock.now());
        map.insert(code.clone(), Arc::new(Mutex::new(m)));
        info!(%code, "match created");
        Ok(())
    }

    /// Reinitialize a match's runtime state in place ("new match").
    pub fn reset(&self, code: &str) -> Result<()> {
        let entry = self.get(code).ok_or_else(|| BoutError::UnknownCode {
            code: code.to_string(),
        })?;
        let mut fx = Effects::new();
        lock_match(&entry).new_match(self.clock.now(), &mut fx);
        self.publish_all(code, fx);
        Ok(())
    }

    pub fn remove(&self, code: &str) -> bool {
        self.write_map().remove(code).is_some()
    }

    pub fn get(&self, code: &str) -> Option<SharedMatch> {
        self.read_map().get(code).cloned()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.read_map().contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.read_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_map().is_empty()
    }

    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.read_map().keys().cloned().collect();
        codes.sort();
        codes
    }

    /// Run `f` against one match under its lock.
    pub fn with_match<R>(&self, code: &str, f: impl FnOnce(&mut Match) -> R) -> Result<R> {
        let entry = self.get(code).ok_or_else(|| BoutError::UnknownCode {
            code: code.to_string(),
        })?;
        let mut m = lock_match(&entry);
        Ok(f(&mut *m))
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    pub fn handle_json(&self, raw: &str) -> Result<()> {
        self.handle(Envelope::from_json(raw)?)
    }

    /// Route one inbound envelope to its match and deliver the results.
    ///
    /// Effects are delivered after the match lock is released, so the
    /// broadcaster may block or call back into the registry.
    pub fn handle(&self, envelope: Envelope) -> Result<()> {
        let Envelope { conn, code, command } = envelope;
        if command == Command::Disconnect {
            self.disconnect(&conn);
            return Ok(());
        }

        let Some(entry) = self.get(&code) else {
            match command {
                Command::JoinReferee { .. } => self.broadcaster.send_to(
                    &conn,
                    &Outbound::JoinResult {
                        ok: false,
                        name: None,
                        error: Some("Invalid code".to_string()),
                    },
                ),
                Command::JoinOperator => self.broadcaster.send_to(
                    &conn,
                    &Outbound::Error {
                        message: "Invalid code".to_string(),
                    },
                ),
                _ => {}
            }
            debug!(%code, %conn, "unknown match code");
            return Err(BoutError::UnknownCode { code });
        };

        let fx = {
            let mut m = lock_match(&entry);
            apply(&mut *m, &conn, command, self.clock.now())
        };
        self.broadcaster.deliver(&code, &conn, fx);
        Ok(())
    }

    /// Transport reports a dropped connection.
    pub fn disconnect(&self, conn: &ConnectionId) {
        let entries: Vec<(String, SharedMatch)> = self
            .read_map()
            .iter()
            .map(|(code, m)| (code.clone(), Arc::clone(m)))
            .collect();
        for (code, entry) in entries {
            let mut fx = Effects::new();
            let was_referee = lock_match(&entry).disconnect(conn, self.clock.now(), &mut fx);
            if was_referee {
                self.publish_all(&code, fx);
                break;
            }
        }
        self.broadcaster.unsubscribe(conn);
    }

    fn publish_all(&self, code: &str, fx: Effects) {
        for effect in fx {
            if let Effect::Publish(message) = effect {
                self.broadcaster.publish(code, &message);
            }
        }
    }

    // =========================================================================
    // Periodic sweep
    // =========================================================================

    /// Tick every match once. A fault in one match is contained and logged;
    /// the rest of the sweep continues.
    pub fn sweep(&self) -> SweepReport {
        let entries: Vec<(String, SharedMatch)> = self
            .read_map()
            .iter()
            .map(|(code, m)| (code.clone(), Arc::clone(m)))
            .collect();

        let mut report = SweepReport::default();
        let mut expired = Vec::new();
        for (code, entry) in entries {
            let result = catch_unwind(AssertUnwindSafe(|| {
                let now = self.clock.now();
                let (fx, evictable) = {
                    let mut m = lock_match(&entry);
                    let fx = m.on_tick(now);
                    (fx, m.is_evictable(now.mono, &self.settings.retention))
                };
                self.publish_all(&code, fx);
                evictable
            }));
            report.swept += 1;
            match result {
                Ok(true) => expired.push(code),
                Ok(false) => {}
                Err(_) => {
                    report.faults += 1;
                    warn!(%code, "match sweep panicked; continuing with next match");
                }
            }
        }

        for code in expired {
            self.broadcaster
                .publish(&code, &Outbound::notice("Match expired"));
            if self.remove(&code) {
                info!(%code, "match evicted");
                report.evicted.push(code);
            }
        }
        report
    }
}
