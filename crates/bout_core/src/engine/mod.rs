//! Scoring engine: vote aggregation, authoritative timer, replay review,
//! undo history and the match state machine that ties them together.

pub mod history;
pub mod ivr;
pub mod match_state;
pub mod roster;
pub mod timer;
pub mod votes;


pub use history::{History, HistoryEntry};
pub use ivr::{IvrChallenge, IvrOutcome};
pub use match_state::{Match, IVR_BUDGET};
pub use roster::{Referee, RefereeSlot, Roster, RosterStatus};
pub use timer::{MatchTimer, TimerProjection};
pub use votes::{quorum, select_award, Vote, VoteBuffer, VoterGroup};
