//! The match aggregate and its round/match state machine.
//!
//! All mutation of a bout goes through [`Match`]. Operations take the current
//! [`Moment`] explicitly and push their outbound messages into an [`Effects`]
//! batch; refused operations return a [`Rejection`] and leave the match untouched.

use super::history::{History, HistoryEntry};
use super::ivr::{IvrChallenge, IvrOutcome};
use super::roster::{Roster, RosterStatus};
use super::timer::{MatchTimer, TimerProjection};
use super::votes::{quorum, valid_points, Vote, VoteBuffer};
use crate::api::protocol::{Outbound, StateSnapshot, TimerAction};
use crate::broadcast::Effects;
use crate::clock::Moment;
use crate::config::{clean_name, EngineSettings, MatchConfig, Passphrase, RetentionPolicy};
use crate::error::Rejection;
use crate::models::{Color, ConnectionId, MatchStatus, PerColor};
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tracing::{debug, info};

type Outcome = Result<(), Rejection>;

/// Replay challenges each color starts with.
pub const IVR_BUDGET: u32 = 1;

#[derive(Debug)]
pub struct Match {
    code: String,
    config: MatchConfig,
    passphrase: Passphrase,
    settings: EngineSettings,

    status: MatchStatus,
    round: u32,
    round_wins: PerColor<u32>,
    scores: PerColor<u32>,
    penalties: PerColor<u32>,
    ivr_budget: PerColor<u32>,
    ivr: Option<IvrChallenge>,
    roster: Roster,
    votes: VoteBuffer,
    timer: MatchTimer,
    history: History,

    created_at: DateTime<Utc>,
    last_inbound: Instant,
    finished_at: Option<Instant>,
    last_timer_emit: Option<Instant>,
    last_roster_emit: Option<Instant>,
}

impl Match {
    pub fn new(code: impl Into<String>, config: MatchConfig, settings: EngineSettings, now: Moment) -> Self {
        let config = config.sanitized();
        Self {
            code: code.into(),
            passphrase: Passphrase::new(&config.passphrase),
            timer: MatchTimer::stopped(config.round_duration()),
            history: History::with_capacity(settings.history_capacity),
            config,
            settings,
            status: MatchStatus::Connecting,
            round: 1,
            round_wins: PerColor::default(),
            scores: PerColor::default(),
            penalties: PerColor::default(),
            ivr_budget: PerColor::splat(IVR_BUDGET),
            ivr: None,
            roster: Roster::new(),
            votes: VoteBuffer::new(),
            created_at: now.wall,
            last_inbound: now.mono,
            finished_at: None,
            last_timer_emit: None,
            last_roster_emit: None,
        }
    }

    // =========================================================================
    // Read access
    // =========================================================================

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn status(&self) -> MatchStatus {
        self.status
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn round_wins(&self) -> PerColor<u32> {
        self.round_wins
    }

    pub fn scores(&self) -> PerColor<u32> {
        self.scores
    }

    pub fn penalties(&self) -> PerColor<u32> {
        self.penalties
    }

    pub fn ivr_budget(&self) -> PerColor<u32> {
        self.ivr_budget
    }

    pub fn ivr_challenge(&self) -> Option<&IvrChallenge> {
        self.ivr.as_ref()
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn votes(&self) -> &VoteBuffer {
        &self.votes
    }

    pub fn timer(&self) -> &MatchTimer {
        &self.timer
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn quorum(&self) -> usize {
        quorum(self.roster.len())
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            status: self.status,
            round: self.round,
            rounds_to_win: self.config.rounds_to_win,
            round_wins: self.round_wins,
            scores: self.scores,
            penalties: self.penalties,
            ivr_budget: self.ivr_budget,
            ivr_pending: self.ivr.as_ref().map(|c| c.color),
            red_name: self.config.red_name.clone(),
            blue_name: self.config.blue_name.clone(),
            category: self.config.category.clone(),
        }
    }

    pub fn roster_status(&self, now: Instant) -> RosterStatus {
        self.roster.status(
            now,
            self.settings.activity_decay(),
            self.config.referees_required as usize,
        )
    }

    pub fn timer_projection(&self, now: Moment) -> TimerProjection {
        self.timer.project(now)
    }

    // =========================================================================
    // Snapshot helpers
    // =========================================================================

    fn publish_state(&self, fx: &mut Effects) {
        fx.publish(Outbound::State(self.snapshot()));
    }

    fn publish_timer(&mut self, now: Moment, fx: &mut Effects) {
        self.last_timer_emit = Some(now.mono);
        fx.publish(Outbound::Timer(self.timer.project(now)));
    }

    fn publish_roster(&mut self, now: Instant, fx: &mut Effects) {
        self.last_roster_emit = Some(now);
        fx.publish(Outbound::RemoteStatus(self.roster_status(now)));
    }

    // =========================================================================
    // Guards
    // =========================================================================

    fn require_live(&self) -> Outcome {
        if self.status.is_terminal() {
            return Err(Rejection::MatchOver);
        }
        Ok(())
    }

    fn require_passphrase(&self, candidate: &str) -> Outcome {
        if self.passphrase.verify(candidate) {
            Ok(())
        } else {
            Err(Rejection::BadPassphrase)
        }
    }

    fn require_referee(&self, conn: &ConnectionId) -> Outcome {
        if self.roster.contains(conn) {
            Ok(())
        } else {
            Err(Rejection::UnknownReferee)
        }
    }

    /// Record inbound traffic for idle eviction.
    pub fn touch(&mut self, now: Instant) {
        self.last_inbound = now;
    }

    fn flush_votes(&mut self) {
        if !self.votes.is_empty() {
            debug!(code = %self.code, dropped = self.votes.len(), "flushing vote buffer");
        }
        self.votes.clear();
    }

    // =========================================================================
    // Joining and referee housekeeping
    // =========================================================================

    pub fn join_operator(&mut self, now: Moment, fx: &mut Effects) {
        fx.subscribe();
        fx.reply(Outbound::State(self.snapshot()));
        fx.reply(Outbound::RemoteStatus(self.roster_status(now.mono)));
        fx.reply(Outbound::Timer(self.timer.project(now)));
    }

    pub fn join_referee(
        &mut self,
        conn: &ConnectionId,
        password: &str,
        name: &str,
        now: Moment,
        fx: &mut Effects,
    ) -> Outcome {
        self.require_passphrase(password)?;
        let name = self.roster.join(conn.clone(), name, now.wall);
        info!(code = %self.code, %conn, %name, referees = self.roster.len(), "referee joined");
        fx.subscribe();
        self.publish_roster(now.mono, fx);
        fx.reply(Outbound::JoinResult {
            ok: true,
            name: Some(name),
            error: None,
        });
        Ok(())
    }

    pub fn rename_referee(
        &mut self,
        conn: &ConnectionId,
        password: &str,
        name: &str,
        now: Moment,
        fx: &mut Effects,
    ) -> Outcome {
        self.require_passphrase(password)?;
        self.require_referee(conn)?;
        if !self.roster.rename(conn, name) {
            return Err(Rejection::EmptyName);
        }
        self.publish_roster(now.mono, fx);
        Ok(())
    }

    /// Test-light press: marks the device active and tested.
    pub fn referee_activity(
        &mut self,
        conn: &ConnectionId,
        password: &str,
        now: Moment,
        fx: &mut Effects,
    ) -> Outcome {
        self.require_passphrase(password)?;
        self.require_referee(conn)?;
        self.roster.touch(conn, now.mono);
        self.publish_roster(now.mono, fx);
        Ok(())
    }

    /// A referee suggesting a penalty. Only forwarded to the operator.
    pub fn penalty_signal(
        &mut self,
        conn: &ConnectionId,
        password: &str,
        color: Color,
        now: Moment,
        fx: &mut Effects,
    ) -> Outcome {
        self.require_passphrase(password)?;
        self.require_referee(conn)?;
        self.roster.touch(conn, now.mono);
        self.publish_roster(now.mono, fx);
        fx.publish(Outbound::PenaltyTrace {
            referee: conn.clone(),
            color,
        });
        Ok(())
    }

    /// Drop a connection. A referee leaving invalidates quorum composition, so
    /// the whole match pauses. Returns whether `conn` was a referee here.
    pub fn disconnect(&mut self, conn: &ConnectionId, now: Moment, fx: &mut Effects) -> bool {
        if self.roster.remove(conn).is_none() {
            return false;
        }
        self.votes.purge_voter(conn);
        let mut replay = None;
        if let Some(ch) = self.ivr.as_mut() {
            ch.withdraw(conn);
            if !self.roster.is_empty() {
                replay = Some((ch.color, ch.reassess(self.roster.ids())));
            }
        }
        self.timer.pause(now.mono);
        if !self.status.is_terminal() {
            self.status = MatchStatus::Paused;
            self.flush_votes();
        }
        info!(code = %self.code, %conn, referees = self.roster.len(), "referee disconnected, match paused");
        self.publish_roster(now.mono, fx);
        fx.publish(Outbound::ForceSetup {
            reason: "Referee disconnected".to_string(),
        });
        self.publish_state(fx);
        self.publish_timer(now, fx);
        if let Some((color, outcome)) = replay {
            self.resolve_replay(color, outcome, fx);
        }
        true
    }

    // =========================================================================
    // Vote aggregation
    // =========================================================================

    /// Buffer a vote iff the round is running and `conn` is a referee.
    pub fn accept_vote(&mut self, conn: &ConnectionId, color: Color, points: u8, now: Instant) -> Outcome {
        if self.status != MatchStatus::Running {
            return Err(Rejection::WrongStatus(self.status));
        }
        self.require_referee(conn)?;
        self.votes.push(Vote {
            voter: conn.clone(),
            color,
            points,
            cast_at: now,
        });
        Ok(())
    }

    pub fn cast_vote(
        &mut self,
        conn: &ConnectionId,
        password: &str,
        color: Color,
        points: i64,
        now: Moment,
        fx: &mut Effects,
    ) -> Outcome {
        self.require_passphrase(password)?;
        if !valid_points(points) {
            return Err(Rejection::InvalidPoints(points));
        }
        let points = points as u8;
        self.accept_vote(conn, color, points, now.mono)?;
        self.roster.touch(conn, now.mono);
        self.evaluate(now, fx);
        self.publish_roster(now.mono, fx);
        fx.publish(Outbound::VoteTrace {
            referee: conn.clone(),
            color,
            points,
        });
        Ok(())
    }

    /// Award the best in-window group that reached quorum, if any.
    ///
    /// Safe to call from both the inline vote path and the periodic sweep:
    /// an award removes its voters' votes from the buffer it was read from.
    pub fn evaluate(&mut self, now: Moment, fx: &mut Effects) -> bool {
        let window = self.settings.scoring_window();
        if self.status != MatchStatus::Running {
            self.votes.prune(now.mono, window);
            return false;
        }
        let Some(award) = self.votes.take_award(now.mono, window, self.roster.len()) else {
            return false;
        };

        let by: Vec<ConnectionId> = award.voters.iter().cloned().collect();
        let awarded = &mut self.scores[award.color];
        *awarded = awarded.saturating_add(u32::from(award.points));
        self.history.push(HistoryEntry::Score {
            color: award.color,
            delta: i64::from(award.points),
            by: by.clone(),
        });
        debug!(
            code = %self.code,
            color = %award.color,
            points = award.points,
            voters = by.len(),
            "quorum award"
        );

        fx.publish(Outbound::ScoreApplied {
            color: award.color,
            points: award.points,
            by_count: by.len(),
            by,
        });
        let finalized = self.check_point_gap(now, fx);
        if !finalized {
            self.publish_state(fx);
        }
        true
    }

    // =========================================================================
    // Round / match transitions
    // =========================================================================

    /// Finalize the round if the score margin reached the configured gap.
    fn check_point_gap(&mut self, now: Moment, fx: &mut Effects) -> bool {
        if !matches!(self.status, MatchStatus::Running | MatchStatus::Paused) {
            return false;
        }
        let (red, blue) = (self.scores.red, self.scores.blue);
        if red.abs_diff(blue) >= self.config.point_gap {
            let leader = if red > blue { Color::Red } else { Color::Blue };
            self.finalize_round(leader, now, fx);
            return true;
        }
        false
    }

    fn finalize_round(&mut self, winner: Color, now: Moment, fx: &mut Effects) {
        self.round_wins[winner] = self.round_wins[winner].saturating_add(1);
        self.timer.pause(now.mono);
        self.scores = PerColor::default();
        self.penalties = PerColor::default();
        self.history.clear();
        self.flush_votes();

        if self.round_wins[winner] >= self.config.rounds_to_win {
            self.finish(winner, now, fx);
            return;
        }

        self.status = MatchStatus::Break;
        self.timer.reset_to(self.config.break_duration());
        self.timer.start(now.mono);
        info!(code = %self.code, round = self.round, %winner, "round finalized");
        fx.publish(Outbound::RoundFinished {
            winner: Some(winner),
            round: self.round,
            round_wins: self.round_wins,
        });
        self.publish_state(fx);
        self.publish_timer(now, fx);
    }

    fn finish(&mut self, winner: Color, now: Moment, fx: &mut Effects) {
        self.status = MatchStatus::Over;
        self.finished_at = Some(now.mono);
        info!(code = %self.code, %winner, red = self.round_wins.red, blue = self.round_wins.blue, "match over");
        fx.publish(Outbound::MatchFinished {
            winner,
            round_wins: self.round_wins,
        });
        self.publish_state(fx);
        self.publish_timer(now, fx);
    }

    fn end_round_by_time(&mut self, now: Moment, fx: &mut Effects) {
        let (red, blue) = (self.scores.red, self.scores.blue);
        if red == blue {
            self.status = MatchStatus::Break;
            self.flush_votes();
            self.timer.reset_to(self.config.break_duration());
            info!(code = %self.code, round = self.round, "round drawn on time");
            fx.publish(Outbound::RoundFinished {
                winner: None,
                round: self.round,
                round_wins: self.round_wins,
            });
            self.publish_state(fx);
            self.publish_timer(now, fx);
        } else {
            let leader = if red > blue { Color::Red } else { Color::Blue };
            self.finalize_round(leader, now, fx);
        }
    }

    fn end_break(&mut self, now: Moment, fx: &mut Effects) {
        self.status = MatchStatus::Paused;
        self.flush_votes();
        self.timer.reset_to(self.config.round_duration());
        self.publish_state(fx);
        self.publish_timer(now, fx);
    }

    /// Operator "proceed": leave setup once every required referee is connected and tested.
    pub fn proceed(&mut self, now: Moment, fx: &mut Effects) -> Outcome {
        if !matches!(self.status, MatchStatus::Connecting | MatchStatus::Paused) {
            return Err(Rejection::WrongStatus(self.status));
        }
        let required = self.config.referees_required as usize;
        let untested = self.roster.untested();
        if self.roster.len() < required || untested > 0 {
            return Err(Rejection::RosterNotReady {
                connected: self.roster.len(),
                required,
                untested,
            });
        }
        self.status = MatchStatus::Running;
        self.flush_votes();
        self.timer.reset_to(self.config.round_duration());
        info!(code = %self.code, round = self.round, "proceeding to main");
        fx.publish(Outbound::ProceedMain);
        self.publish_state(fx);
        self.publish_timer(now, fx);
        Ok(())
    }

    pub fn next_round(&mut self, now: Moment, fx: &mut Effects) -> Outcome {
        self.require_live()?;
        if self.status == MatchStatus::Connecting {
            return Err(Rejection::WrongStatus(self.status));
        }
        self.round += 1;
        self.scores = PerColor::default();
        self.penalties = PerColor::default();
        self.history.clear();
        self.flush_votes();
        self.status = MatchStatus::Running;
        self.timer.reset_to(self.config.round_duration());
        info!(code = %self.code, round = self.round, "next round");
        self.publish_state(fx);
        self.publish_timer(now, fx);
        Ok(())
    }

    pub fn declare_winner(&mut self, color: Color, now: Moment, fx: &mut Effects) -> Outcome {
        self.require_live()?;
        self.round_wins[color] = self.config.rounds_to_win;
        self.timer.pause(now.mono);
        self.flush_votes();
        self.finish(color, now, fx);
        Ok(())
    }

    /// Reinitialize runtime state, keeping code and configuration.
    pub fn new_match(&mut self, now: Moment, fx: &mut Effects) {
        self.status = MatchStatus::Connecting;
        self.round = 1;
        self.round_wins = PerColor::default();
        self.scores = PerColor::default();
        self.penalties = PerColor::default();
        self.ivr_budget = PerColor::splat(IVR_BUDGET);
        self.ivr = None;
        self.roster.clear();
        self.votes.clear();
        self.timer.reset_to(self.config.round_duration());
        self.history.clear();
        self.finished_at = None;
        info!(code = %self.code, "new match");
        fx.publish(Outbound::ForceSetup {
            reason: "New match".to_string(),
        });
        self.publish_state(fx);
        self.publish_timer(now, fx);
    }

    // =========================================================================
    // Timer control
    // =========================================================================

    pub fn timer_control(&mut self, action: TimerAction, now: Moment, fx: &mut Effects) -> Outcome {
        self.require_live()?;
        match action {
            TimerAction::Start => {
                if !matches!(self.status, MatchStatus::Running | MatchStatus::Break) {
                    return Err(Rejection::WrongStatus(self.status));
                }
                self.timer.start(now.mono);
            }
            TimerAction::Pause => self.timer.pause(now.mono),
            TimerAction::ResetRound => self.timer.reset_to(self.config.round_duration()),
            TimerAction::ResetBreak => self.timer.reset_to(self.config.break_duration()),
        }
        self.publish_timer(now, fx);
        self.publish_state(fx);
        Ok(())
    }

    // =========================================================================
    // Operator overrides
    // =========================================================================

    pub fn adjust_score(&mut self, color: Color, delta: i64, now: Moment, fx: &mut Effects) -> Outcome {
        self.require_live()?;
        if delta == 0 {
            return Err(Rejection::ZeroDelta);
        }
        let before = i64::from(self.scores[color]);
        let after = before.saturating_add(delta).clamp(0, i64::from(u32::MAX));
        self.scores[color] = after as u32;
        self.history.push(HistoryEntry::Score {
            color,
            delta: after - before,
            by: Vec::new(),
        });
        if !self.check_point_gap(now, fx) {
            self.publish_state(fx);
        }
        Ok(())
    }

    /// Official penalty: +1 penalty for `color`, +1 point for its opponent.
    pub fn apply_penalty(&mut self, color: Color, now: Moment, fx: &mut Effects) -> Outcome {
        self.require_live()?;
        self.history.push(HistoryEntry::Penalty { color });
        self.penalties[color] = self.penalties[color].saturating_add(1);
        let other = color.opponent();
        self.scores[other] = self.scores[other].saturating_add(1);
        if !self.check_point_gap(now, fx) {
            self.publish_state(fx);
        }
        Ok(())
    }

    pub fn undo(&mut self, fx: &mut Effects) -> Outcome {
        self.require_live()?;
        let entry = self.history.pop().ok_or(Rejection::EmptyHistory)?;
        match entry {
            HistoryEntry::Score { color, delta, .. } => {
                let restored = i64::from(self.scores[color])
                    .saturating_sub(delta)
                    .clamp(0, i64::from(u32::MAX));
                self.scores[color] = restored as u32;
            }
            HistoryEntry::Penalty { color } => {
                let other = color.opponent();
                self.penalties[color] = self.penalties[color].saturating_sub(1);
                self.scores[other] = self.scores[other].saturating_sub(1);
            }
        }
        self.publish_state(fx);
        Ok(())
    }

    pub fn set_names(&mut self, red: &str, blue: &str, fx: &mut Effects) {
        if let Some(name) = clean_name(red) {
            self.config.red_name = name;
        }
        if let Some(name) = clean_name(blue) {
            self.config.blue_name = name;
        }
        self.publish_state(fx);
    }

    pub fn set_category(&mut self, category: &str, fx: &mut Effects) {
        self.config.category = category.trim().to_string();
        self.publish_state(fx);
    }

    // =========================================================================
    // Instant video review
    // =========================================================================

    pub fn request_replay(&mut self, color: Color, fx: &mut Effects) -> Outcome {
        self.require_live()?;
        if self.ivr.is_some() {
            return Err(Rejection::ChallengePending);
        }
        if self.ivr_budget[color] == 0 {
            return Err(Rejection::NoReplayBudget(color));
        }
        self.ivr = Some(IvrChallenge::open(color));
        info!(code = %self.code, %color, "replay challenge opened");
        fx.publish(Outbound::IvrOverlay {
            color,
            referees: self.roster.len(),
        });
        Ok(())
    }

    pub fn accept_replay(&mut self, conn: &ConnectionId, password: &str, fx: &mut Effects) -> Outcome {
        self.require_passphrase(password)?;
        self.require_referee(conn)?;
        let referees = self.roster.len();
        let ch = self.ivr.as_mut().ok_or(Rejection::NoChallenge)?;
        let color = ch.color;
        let outcome = ch.accept(conn.clone(), referees);
        self.resolve_replay(color, outcome, fx);
        Ok(())
    }

    pub fn decline_replay(&mut self, conn: &ConnectionId, password: &str, fx: &mut Effects) -> Outcome {
        self.require_passphrase(password)?;
        self.require_referee(conn)?;
        let ch = self.ivr.as_mut().ok_or(Rejection::NoChallenge)?;
        let color = ch.color;
        let outcome = ch.decline(conn.clone(), self.roster.ids());
        self.resolve_replay(color, outcome, fx);
        Ok(())
    }

    /// Close the challenge on a decision, or publish the running tally.
    /// Only a declined challenge consumes the requester's budget.
    fn resolve_replay(&mut self, color: Color, outcome: IvrOutcome, fx: &mut Effects) {
        let accepted = match outcome {
            IvrOutcome::Recorded { accepts, declines } => {
                fx.publish(Outbound::IvrVotes { accepts, declines });
                return;
            }
            IvrOutcome::Accepted => true,
            IvrOutcome::Declined => false,
        };
        self.ivr = None;
        if accepted {
            info!(code = %self.code, %color, "replay challenge accepted");
        } else {
            self.ivr_budget[color] = self.ivr_budget[color].saturating_sub(1);
            info!(code = %self.code, %color, left = self.ivr_budget[color], "replay challenge declined");
        }
        fx.publish(Outbound::IvrResult { accepted, color });
        self.publish_state(fx);
    }

    /// Operator dismisses the overlay; also cancels a still-pending challenge.
    pub fn acknowledge_replay(&mut self, fx: &mut Effects) {
        self.ivr = None;
        self.publish_state(fx);
    }

    // =========================================================================
    // Periodic driver hooks
    // =========================================================================

    fn due(last: Option<Instant>, every: Duration, now: Instant) -> bool {
        last.map_or(true, |t| now.saturating_duration_since(t) >= every)
    }

    /// One sweep: flush stale votes, detect timer expiry, refresh displays.
    pub fn on_tick(&mut self, now: Moment) -> Effects {
        let mut fx = Effects::new();
        self.evaluate(now, &mut fx);

        if self.timer.is_running() {
            if Self::due(self.last_timer_emit, self.settings.running_timer_emit(), now.mono) {
                self.publish_timer(now, &mut fx);
            }
            if self.timer.expire_if_due(now.mono) {
                debug!(code = %self.code, status = %self.status, "timer expired");
                match self.status {
                    MatchStatus::Running => self.end_round_by_time(now, &mut fx),
                    MatchStatus::Break => self.end_break(now, &mut fx),
                    _ => self.publish_timer(now, &mut fx),
                }
            }
        } else if Self::due(self.last_timer_emit, self.settings.stopped_timer_emit(), now.mono) {
            self.publish_timer(now, &mut fx);
        }

        if Self::due(self.last_roster_emit, self.settings.roster_refresh(), now.mono) {
            self.publish_roster(now.mono, &mut fx);
        }
        fx
    }

    /// Whether the registry may drop this match under `policy`.
    pub fn is_evictable(&self, now: Instant, policy: &RetentionPolicy) -> bool {
        if let (MatchStatus::Over, Some(done)) = (self.status, self.finished_at) {
            if now.saturating_duration_since(done) >= policy.finished_retention() {
                return true;
            }
        }
        self.roster.is_empty() && now.saturating_duration_since(self.last_inbound) >= policy.idle_ttl()
    }
}
