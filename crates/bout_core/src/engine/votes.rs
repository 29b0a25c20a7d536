//! Time-windowed majority aggregation of referee scoring signals.
//!
//! Votes are buffered with their arrival instant. Evaluation groups the
//! in-window votes by `(color, points)`, counts distinct voters per group and
//! awards the best group that reaches quorum. The award removes every vote of
//! the winning voters from the buffer, so a second evaluation over the same
//! buffer can never award the same group again.

use crate::models::{Color, ConnectionId};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// Minimum distinct-referee agreement: `max(1, ceil(referees / 2))`.
pub fn quorum(referee_count: usize) -> usize {
    referee_count.div_ceil(2).max(1)
}

/// Point values a referee device can signal.
pub fn valid_points(points: i64) -> bool {
    (1..=3).contains(&points)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub voter: ConnectionId,
    pub color: Color,
    pub points: u8,
    pub cast_at: Instant,
}

// ============================================
// VoterGroup
// ============================================

/// Distinct voters that agree on one `(color, points)` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoterGroup {
    pub color: Color,
    pub points: u8,
    pub voters: BTreeSet<ConnectionId>,
    /// Arrival of the group's earliest vote; last-resort tie-break
    pub first_cast: Instant,
}

impl VoterGroup {
    pub fn size(&self) -> usize {
        self.voters.len()
    }

    /// Ranking used to pick among qualifying groups: bigger consensus first,
    /// then the higher call, then whichever call arrived first.
    pub fn rank(&self, other: &Self) -> Ordering {
        other
            .size()
            .cmp(&self.size())
            .then_with(|| other.points.cmp(&self.points))
            .then_with(|| self.first_cast.cmp(&other.first_cast))
            .then_with(|| self.color.cmp(&other.color))
    }
}

/// Best group reaching `quorum`, if any.
pub fn select_award(groups: &[VoterGroup], quorum: usize) -> Option<&VoterGroup> {
    groups
        .iter()
        .filter(|g| g.size() >= quorum)
        .min_by(|a, b| a.rank(b))
}

// ============================================
// VoteBuffer
// ============================================

#[derive(Debug, Clone, Default)]
pub struct VoteBuffer {
    votes: Vec<Vote>,
}

impl VoteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, vote: Vote) {
        self.votes.push(vote);
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vote> {
        self.votes.iter()
    }

    pub fn clear(&mut self) {
        self.votes.clear();
    }

    /// Drop votes older than `window` at `now`.
    pub fn prune(&mut self, now: Instant, window: Duration) {
        self.votes
            .retain(|v| now.saturating_duration_since(v.cast_at) <= window);
    }

    pub fn purge_voter(&mut self, voter: &ConnectionId) {
        self.votes.retain(|v| &v.voter != voter);
    }

    pub fn remove_voters(&mut self, voters: &BTreeSet<ConnectionId>) {
        self.votes.retain(|v| !voters.contains(&v.voter));
    }

    /// Group buffered votes by call, in order of first appearance.
    pub fn groups(&self) -> Vec<VoterGroup> {
        let mut groups: Vec<VoterGroup> = Vec::new();
        for v in &self.votes {
            match groups
                .iter_mut()
                .find(|g| g.color == v.color && g.points == v.points)
            {
                Some(g) => {
                    g.voters.insert(v.voter.clone());
                    if v.cast_at < g.first_cast {
                        g.first_cast = v.cast_at;
                    }
                }
                None => groups.push(VoterGroup {
                    color: v.color,
                    points: v.points,
                    voters: BTreeSet::from([v.voter.clone()]),
                    first_cast: v.cast_at,
                }),
            }
        }
        groups
    }

    /// Prune, then pick and consume the winning group.
    ///
    /// The returned group's voters have had all their buffered votes removed,
    /// including votes for other calls.
    pub fn take_award(
        &mut self,
        now: Instant,
        window: Duration,
        referee_count: usize,
    ) -> Option<VoterGroup> {
        self.prune(now, window);
        if self.votes.is_empty() {
            return None;
        }
        let groups = self.groups();
        let winner = select_award(&groups, quorum(referee_count))?.clone();
        self.remove_voters(&winner.voters);
        Some(winner)
    }
}
