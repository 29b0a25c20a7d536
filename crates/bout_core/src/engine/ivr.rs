//! Instant video review: one operator-opened challenge at a time, resolved by referee quorum.

use super::votes::quorum;
use crate::models::{Color, ConnectionId};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IvrChallenge {
    pub color: Color,
    pub accepts: BTreeSet<ConnectionId>,
    pub declines: BTreeSet<ConnectionId>,
}

/// Result of feeding one referee vote into a pending challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IvrOutcome {
    /// Still open; carries the current tallies
    Recorded { accepts: usize, declines: usize },
    Accepted,
    Declined,
}

impl IvrChallenge {
    pub fn open(color: Color) -> Self {
        Self {
            color,
            accepts: BTreeSet::new(),
            declines: BTreeSet::new(),
        }
    }

    fn tally(&self) -> IvrOutcome {
        IvrOutcome::Recorded {
            accepts: self.accepts.len(),
            declines: self.declines.len(),
        }
    }

    /// Rostered referees that have cast neither vote.
    pub fn unvoted<'a>(&self, roster: impl Iterator<Item = &'a ConnectionId>) -> usize {
        roster
            .filter(|id| !self.accepts.contains(*id) && !self.declines.contains(*id))
            .count()
    }

    pub fn accept(&mut self, voter: ConnectionId, referee_count: usize) -> IvrOutcome {
        self.declines.remove(&voter);
        self.accepts.insert(voter);
        if self.accepts.len() >= quorum(referee_count) {
            IvrOutcome::Accepted
        } else {
            self.tally()
        }
    }

    /// Declines only resolve once acceptance can no longer reach quorum.
    pub fn decline<'a>(
        &mut self,
        voter: ConnectionId,
        roster: impl Iterator<Item = &'a ConnectionId> + Clone,
    ) -> IvrOutcome {
        self.accepts.remove(&voter);
        self.declines.insert(voter);
        let referee_count = roster.clone().count();
        let reachable = self.accepts.len() + self.unvoted(roster);
        if reachable < quorum(referee_count) {
            IvrOutcome::Declined
        } else {
            self.tally()
        }
    }

    /// Drop a departed referee's vote.
    pub fn withdraw(&mut self, voter: &ConnectionId) {
        self.accepts.remove(voter);
        self.declines.remove(voter);
    }

    /// Re-run both resolution checks after the roster shrank.
    pub fn reassess<'a>(&self, roster: impl Iterator<Item = &'a ConnectionId> + Clone) -> IvrOutcome {
        let need = quorum(roster.clone().count());
        if self.accepts.len() >= need {
            IvrOutcome::Accepted
        } else if self.accepts.len() + self.unvoted(roster) < need {
            IvrOutcome::Declined
        } else {
            self.tally()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<ConnectionId> {
        names.iter().map(|n| ConnectionId::new(*n)).collect()
    }

    #[test]
    fn decline_resolves_only_when_acceptance_unreachable() {
        let roster = ids(&["a", "b", "c", "d"]);
        let mut ch = IvrChallenge::open(Color::Red);

        assert_eq!(
            ch.decline("a".into(), roster.iter()),
            IvrOutcome::Recorded { accepts: 0, declines: 1 }
        );
        assert_eq!(
            ch.decline("b".into(), roster.iter()),
            IvrOutcome::Recorded { accepts: 0, declines: 2 }
        );
        assert_eq!(ch.decline("c".into(), roster.iter()), IvrOutcome::Declined);
    }

    #[test]
    fn accepts_reach_quorum() {
        let mut ch = IvrChallenge::open(Color::Blue);
        assert_eq!(
            ch.accept("a".into(), 3),
            IvrOutcome::Recorded { accepts: 1, declines: 0 }
        );
        // Same voter twice does not inflate the tally.
        assert_eq!(
            ch.accept("a".into(), 3),
            IvrOutcome::Recorded { accepts: 1, declines: 0 }
        );
        assert_eq!(ch.accept("b".into(), 3), IvrOutcome::Accepted);
    }

    #[test]
    fn switching_vote_moves_voter() {
        let roster = ids(&["a", "b", "c"]);
        let mut ch = IvrChallenge::open(Color::Red);
        ch.accept("a".into(), 3);
        ch.decline("a".into(), roster.iter());
        assert!(ch.accepts.is_empty());
        assert_eq!(ch.unvoted(roster.iter()), 2);
        ch.withdraw(&"a".into());
        assert!(ch.declines.is_empty());
    }

    #[test]
    fn reassess_after_roster_shrinks() {
        let mut ch = IvrChallenge::open(Color::Red);
        ch.accept("a".into(), 3);
        let remaining = ids(&["a", "c"]);
        assert_eq!(ch.reassess(remaining.iter()), IvrOutcome::Accepted);

        let roster = ids(&["a", "b", "c", "d"]);
        let mut ch = IvrChallenge::open(Color::Blue);
        ch.decline("a".into(), roster.iter());
        ch.decline("b".into(), roster.iter());
        assert_eq!(
            ch.reassess(roster.iter()),
            IvrOutcome::Recorded { accepts: 0, declines: 2 }
        );
        let remaining = ids(&["a", "b", "d"]);
        assert_eq!(ch.reassess(remaining.iter()), IvrOutcome::Declined);
    }
}
