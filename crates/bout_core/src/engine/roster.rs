//! Connected referee devices.

use crate::config::clean_name;
use crate::models::ConnectionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Referee {
    pub name: String,
    pub joined_at: DateTime<Utc>,
    pub last_seen: Option<Instant>,
    /// Has signaled at least once since joining
    pub tested: bool,
}

/// One slot of the roster status broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefereeSlot {
    pub slot: usize,
    pub name: String,
    pub connected: bool,
    pub active: bool,
    pub tested: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterStatus {
    pub referees: Vec<RefereeSlot>,
    pub count: usize,
    pub required: usize,
}

/// Referees in join order.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: Vec<(ConnectionId, Referee)>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&Referee> {
        self.entries.iter().find(|(c, _)| c == id).map(|(_, r)| r)
    }

    fn get_mut(&mut self, id: &ConnectionId) -> Option<&mut Referee> {
        self.entries.iter_mut().find(|(c, _)| c == id).map(|(_, r)| r)
    }

    pub fn ids(&self) -> impl Iterator<Item = &ConnectionId> + Clone {
        self.entries.iter().map(|(c, _)| c)
    }

    /// Add a referee, or rename it if the connection already joined. Returns the stored name.
    pub fn join(&mut self, id: ConnectionId, name: &str, now: DateTime<Utc>) -> String {
        let name = clean_name(name).unwrap_or_else(|| "Judge".to_string());
        match self.get_mut(&id) {
            Some(existing) => existing.name = name.clone(),
            None => self.entries.push((
                id,
                Referee {
                    name: name.clone(),
                    joined_at: now,
                    last_seen: None,
                    tested: false,
                },
            )),
        }
        name
    }

    pub fn rename(&mut self, id: &ConnectionId, name: &str) -> bool {
        match (self.get_mut(id), clean_name(name)) {
            (Some(r), Some(name)) => {
                r.name = name;
                true
            }
            _ => false,
        }
    }

    /// Record a signal from the referee. Returns false for unknown connections.
    pub fn touch(&mut self, id: &ConnectionId, now: Instant) -> bool {
        match self.get_mut(id) {
            Some(r) => {
                r.last_seen = Some(now);
                r.tested = true;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &ConnectionId) -> Option<Referee> {
        let idx = self.entries.iter().position(|(c, _)| c == id)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn untested(&self) -> usize {
        self.entries.iter().filter(|(_, r)| !r.tested).count()
    }

    /// Activity is derived from recency at the time of the call, never stored.
    pub fn status(&self, now: Instant, decay: Duration, required: usize) -> RosterStatus {
        let referees = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (_, r))| RefereeSlot {
                slot: i + 1,
                name: if r.name.is_empty() {
                    format!("Ref {}", i + 1)
                } else {
                    r.name.clone()
                },
                connected: true,
                active: r
                    .last_seen
                    .is_some_and(|seen| now.saturating_duration_since(seen) < decay),
                tested: r.tested,
            })
            .collect();
        RosterStatus {
            referees,
            count: self.entries.len(),
            required,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECAY: Duration = Duration::from_millis(2_500);

    #[test]
    fn join_is_idempotent_per_connection() {
        let mut roster = Roster::new();
        let now = Utc::now();
        roster.join("c1".into(), "Kim", now);
        roster.join("c2".into(), "   ", now);
        assert_eq!(roster.join("c1".into(), "Lee", now), "Lee");
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.get(&"c2".into()).unwrap().name, "Judge");
    }

    #[test]
    fn activity_decays_without_mutation() {
        let mut roster = Roster::new();
        let t0 = Instant::now();
        roster.join("c1".into(), "A", Utc::now());
        roster.join("c2".into(), "B", Utc::now());
        assert!(roster.touch(&"c1".into(), t0));
        assert!(!roster.touch(&"ghost".into(), t0));

        let fresh = roster.status(t0 + Duration::from_millis(1_000), DECAY, 3);
        assert!(fresh.referees[0].active && fresh.referees[0].tested);
        assert!(!fresh.referees[1].active && !fresh.referees[1].tested);
        assert_eq!((fresh.count, fresh.required), (2, 3));

        let stale = roster.status(t0 + Duration::from_millis(2_600), DECAY, 3);
        assert!(!stale.referees[0].active);
        assert!(stale.referees[0].tested);
        assert_eq!(roster.untested(), 1);
    }

    #[test]
    fn remove_keeps_join_order_of_others() {
        let mut roster = Roster::new();
        for id in ["a", "b", "c"] {
            roster.join(id.into(), id, Utc::now());
        }
        assert!(roster.remove(&"b".into()).is_some());
        assert!(roster.remove(&"b".into()).is_none());
        let ids: Vec<&str> = roster.ids().map(|c| c.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        let status = roster.status(Instant::now(), DECAY, 3);
        assert_eq!(status.referees[1].slot, 2);
    }

    #[test]
    fn ids_can_be_walked_twice() {
        let mut roster = Roster::new();
        for id in ["a", "b"] {
            roster.join(id.into(), id, Utc::now());
        }
        let ids = roster.ids();
        assert_eq!(ids.clone().count(), 2);
        assert_eq!(ids.map(|c| c.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn rename_ignores_empty_and_unknown() {
        let mut roster = Roster::new();
        roster.join("a".into(), "A", Utc::now());
        assert!(!roster.rename(&"a".into(), "  "));
        assert!(!roster.rename(&"z".into(), "Z"));
        assert!(roster.rename(&"a".into(), " Park "));
        assert_eq!(roster.get(&"a".into()).unwrap().name, "Park");
    }
}
