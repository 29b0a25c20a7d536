//! # bout_core - Authoritative Scoring Core for Combat-Sport Bouts
//!
//! This library turns independent referee scoring signals and operator
//! commands into one converged score, round/match outcome and countdown
//! shared by every display attached to a bout.
//!
//! ## Features
//! - Quorum vote aggregation over a sliding 1.3s scoring window
//! - Drift-free countdown with a wall-clock projection for remote rendering
//! - Round/match state machine with point-gap finalize and undo
//! - Instant video review (IVR) decided by referee quorum
//! - Transport-agnostic: JSON envelopes in, [`broadcast::Effects`] out

// Engine operations take the current moment and an effects sink explicitly
#![allow(clippy::too_many_arguments)]

pub mod api;
pub mod broadcast;
pub mod clock;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod models;
pub mod registry;

// Re-export main API
pub use api::{apply, Command, Envelope, Outbound, StateSnapshot, TimerAction};
pub use error::{BoutError, Rejection, Result};

pub use broadcast::{Broadcaster, Effect, Effects, LocalHub, RecordingBroadcaster};
pub use clock::{Clock, ManualClock, Moment, SystemClock};
pub use config::{EngineSettings, MatchConfig, RetentionPolicy};
pub use driver::PeriodicDriver;
pub use engine::{Match, TimerProjection};
pub use models::{Color, ConnectionId, MatchStatus, PerColor};
pub use registry::{MatchRegistry, SweepReport};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_local_hub_end_to_end() {
        let hub = Arc::new(LocalHub::new());
        let registry = MatchRegistry::new(
            EngineSettings::default(),
            Arc::new(ManualClock::new()),
            hub.clone(),
        );
        let code = registry.create(MatchConfig {
            referees_required: 1,
            ..MatchConfig::default()
        });

        let op_rx = hub.connect(ConnectionId::new("op"));
        let ref_rx = hub.connect(ConnectionId::new("r1"));

        let send = |body: serde_json::Value| {
            let mut body = body;
            body["code"] = json!(code);
            registry.handle_json(&body.to_string()).unwrap();
        };
        send(json!({"conn": "op", "event": "join_operator"}));
        send(json!({"conn": "r1", "event": "join_referee", "password": "1234", "name": "Yoon"}));
        send(json!({"conn": "r1", "event": "referee_activity", "password": "1234"}));
        send(json!({"conn": "op", "event": "proceed"}));
        send(json!({"conn": "op", "event": "timer", "action": "start"}));
        send(json!({"conn": "r1", "event": "cast_vote", "password": "1234", "color": "blue", "points": 2}));

        let op_msgs: Vec<Outbound> = op_rx.try_iter().collect();
        let last_state = op_msgs
            .iter()
            .rev()
            .find_map(|m| match m {
                Outbound::State(s) => Some(s.clone()),
                _ => None,
            })
            .expect("operator receives state snapshots");
        assert_eq!(last_state.status, MatchStatus::Running);
        assert_eq!(last_state.scores, PerColor { red: 0, blue: 2 });

        let ref_msgs: Vec<Outbound> = ref_rx.try_iter().collect();
        assert!(ref_msgs.iter().any(|m| matches!(
            m,
            Outbound::JoinResult { ok: true, name: Some(n), .. } if n == "Yoon"
        )));
        assert!(ref_msgs.iter().any(|m| matches!(m, Outbound::ProceedMain)));
    }

    #[test]
    fn test_snapshot_wire_format() {
        let m = Match::new(
            "WIRE22",
            MatchConfig::default(),
            EngineSettings::default(),
            Moment::now(),
        );
        let value = serde_json::to_value(Outbound::State(m.snapshot())).unwrap();
        assert_eq!(value["event"], "state");
        assert_eq!(value["status"], "connecting");
        assert_eq!(value["round"], 1);
        assert_eq!(value["ivr_budget"], json!({"red": 1, "blue": 1}));
        assert_eq!(value["red_name"], "RED");
        assert!(value["ivr_pending"].is_null());
    }
}
