//! Wire protocol: the closed set of inbound commands and outbound snapshots.
//!
//! Every outbound message is a complete replace-on-receipt snapshot; clients
//! never apply diffs.

use crate::engine::roster::RosterStatus;
use crate::engine::timer::TimerProjection;
use crate::models::{Color, ConnectionId, MatchStatus, PerColor};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ============================================
// Inbound
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TimerAction {
    Start,
    Pause,
    ResetRound,
    ResetBreak,
}

/// Everything an operator console or referee device can ask of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Command {
    // Operator console
    JoinOperator,
    SetNames {
        #[serde(default)]
        red: String,
        #[serde(default)]
        blue: String,
    },
    SetCategory {
        #[serde(default)]
        category: String,
    },
    Proceed,
    Timer {
        action: TimerAction,
    },
    AdjustScore {
        color: Color,
        delta: i64,
    },
    ApplyPenalty {
        color: Color,
    },
    Undo,
    NextRound,
    DeclareWinner {
        color: Color,
    },
    RequestReplay {
        color: Color,
    },
    AcknowledgeReplay,
    NewMatch,

    // Referee devices
    JoinReferee {
        password: String,
        #[serde(default)]
        name: String,
    },
    RenameReferee {
        password: String,
        name: String,
    },
    RefereeActivity {
        password: String,
    },
    CastVote {
        password: String,
        color: Color,
        points: i64,
    },
    PenaltySignal {
        password: String,
        color: Color,
    },
    AcceptReplay {
        password: String,
    },
    DeclineReplay {
        password: String,
    },

    /// Raised by the transport when a connection drops
    Disconnect,
}

/// One inbound message as delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Envelope {
    /// Sending connection
    pub conn: ConnectionId,
    /// Match code; ignored for `disconnect`
    #[serde(default)]
    pub code: String,
    #[serde(flatten)]
    pub command: Command,
}

impl Envelope {
    pub fn new(conn: impl Into<ConnectionId>, code: impl Into<String>, command: Command) -> Self {
        Self {
            conn: conn.into(),
            code: code.into(),
            command,
        }
    }

    pub fn from_json(raw: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

// ============================================
// Outbound
// ============================================

/// Match state as shown on every display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub status: MatchStatus,
    pub round: u32,
    pub rounds_to_win: u32,
    pub round_wins: PerColor<u32>,
    pub scores: PerColor<u32>,
    pub penalties: PerColor<u32>,
    pub ivr_budget: PerColor<u32>,
    pub ivr_pending: Option<Color>,
    pub red_name: String,
    pub blue_name: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Outbound {
    State(StateSnapshot),
    Timer(TimerProjection),
    RemoteStatus(RosterStatus),
    RoundFinished {
        winner: Option<Color>,
        round: u32,
        round_wins: PerColor<u32>,
    },
    MatchFinished {
        winner: Color,
        round_wins: PerColor<u32>,
    },
    IvrOverlay {
        color: Color,
        referees: usize,
    },
    IvrVotes {
        accepts: usize,
        declines: usize,
    },
    IvrResult {
        accepted: bool,
        color: Color,
    },
    ScoreApplied {
        color: Color,
        points: u8,
        by_count: usize,
        by: Vec<ConnectionId>,
    },
    VoteTrace {
        referee: ConnectionId,
        color: Color,
        points: u8,
    },
    PenaltyTrace {
        referee: ConnectionId,
        color: Color,
    },
    JoinResult {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    ProceedMain,
    ForceSetup {
        reason: String,
    },
    Notice {
        message: String,
    },
    Error {
        message: String,
    },
}

impl Outbound {
    pub fn notice(message: impl Into<String>) -> Self {
        Outbound::Notice {
            message: message.into(),
        }
    }

    /// Wire name of the message, as found in its `event` field.
    pub fn event_name(&self) -> &'static str {
        match self {
            Outbound::State(_) => "state",
            Outbound::Timer(_) => "timer",
            Outbound::RemoteStatus(_) => "remote_status",
            Outbound::RoundFinished { .. } => "round_finished",
            Outbound::MatchFinished { .. } => "match_finished",
            Outbound::IvrOverlay { .. } => "ivr_overlay",
            Outbound::IvrVotes { .. } => "ivr_votes",
            Outbound::IvrResult { .. } => "ivr_result",
            Outbound::ScoreApplied { .. } => "score_applied",
            Outbound::VoteTrace { .. } => "vote_trace",
            Outbound::PenaltyTrace { .. } => "penalty_trace",
            Outbound::JoinResult { .. } => "join_result",
            Outbound::ProceedMain => "proceed_main",
            Outbound::ForceSetup { .. } => "force_setup",
            Outbound::Notice { .. } => "notice",
            Outbound::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_parses_flat_tagged_json() {
        let env = Envelope::from_json(
            r#"{"conn":"ref-1","code":"ABC234","event":"cast_vote","password":"1234","color":"red","points":2}"#,
        )
        .unwrap();
        assert_eq!(env.conn, ConnectionId::new("ref-1"));
        assert_eq!(env.code, "ABC234");
        assert_eq!(
            env.command,
            Command::CastVote {
                password: "1234".into(),
                color: Color::Red,
                points: 2
            }
        );
    }

    #[test]
    fn disconnect_needs_no_code() {
        let env = Envelope::from_json(r#"{"conn":"x","event":"disconnect"}"#).unwrap();
        assert_eq!(env.command, Command::Disconnect);
        assert!(env.code.is_empty());
    }

    #[test]
    fn timer_action_is_snake_case() {
        let env = Envelope::from_json(
            r#"{"conn":"op","code":"C","event":"timer","action":"reset_break"}"#,
        )
        .unwrap();
        assert_eq!(
            env.command,
            Command::Timer {
                action: TimerAction::ResetBreak
            }
        );
    }

    #[test]
    fn unknown_event_is_rejected() {
        assert!(Envelope::from_json(r#"{"conn":"x","code":"C","event":"explode"}"#).is_err());
        assert!(Envelope::from_json("not json").is_err());
    }

    #[test]
    fn outbound_is_tagged_by_event() {
        let msg = Outbound::IvrResult {
            accepted: false,
            color: Color::Blue,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"event": "ivr_result", "accepted": false, "color": "blue"})
        );
        assert_eq!(msg.event_name(), "ivr_result");

        let join = Outbound::JoinResult {
            ok: false,
            name: None,
            error: Some("Wrong password".into()),
        };
        assert_eq!(
            serde_json::to_value(&join).unwrap(),
            json!({"event": "join_result", "ok": false, "error": "Wrong password"})
        );
        assert_eq!(
            serde_json::to_value(Outbound::ProceedMain).unwrap(),
            json!({"event": "proceed_main"})
        );
    }
}
