//! Centroid-proximity identity deduplication.
//!
//! An `IdentityTracker` remembers the centroid of every person it has judged
//! new. A detection whose centroid lies strictly closer than the distance
//! threshold to any remembered centroid is the same person. Identities are
//! never evicted or moved; a session ends by dropping or resetting the
//! tracker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::detect::BoundingBox;

pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 50.0;
pub const DEFAULT_MAX_SESSIONS: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackedIdentity {
    pub centroid: (f32, f32),
}

#[derive(Clone, Debug)]
pub struct IdentityTracker {
    distance_threshold: f32,
    identities: Vec<TrackedIdentity>,
}

impl Default for IdentityTracker {
    fn default() -> Self {
        Self::new(DEFAULT_DISTANCE_THRESHOLD)
    }
}

impl IdentityTracker {
    pub fn new(distance_threshold: f32) -> Self {
        Self {
            distance_threshold,
            identities: Vec::new(),
        }
    }

    /// Returns true and records the centroid when `bbox` is a new person.
    pub fn observe(&mut self, bbox: &BoundingBox) -> bool {
        let (cx, cy) = bbox.centroid();
        let seen = self.identities.iter().any(|identity| {
            let (dx, dy) = (cx - identity.centroid.0, cy - identity.centroid.1);
            (dx * dx + dy * dy).sqrt() < self.distance_threshold
        });
        if seen {
            return false;
        }
        self.identities.push(TrackedIdentity { centroid: (cx, cy) });
        true
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn identities(&self) -> &[TrackedIdentity] {
        &self.identities
    }

    pub fn distance_threshold(&self) -> f32 {
        self.distance_threshold
    }

    /// Forget every identity, starting a new session.
    pub fn reset(&mut self) {
        self.identities.clear();
    }
}

/// Trackers keyed by caller-supplied session id, for the service form.
///
/// Each session is its own `Mutex` so concurrent requests for different
/// sessions do not serialise on each other.
pub struct SessionStore {
    distance_threshold: f32,
    max_sessions: usize,
    sessions: Mutex<HashMap<String, Arc<Mutex<IdentityTracker>>>>,
}

impl SessionStore {
    pub fn new(distance_threshold: f32, max_sessions: usize) -> Self {
        Self {
            distance_threshold,
            max_sessions,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Tracker for `session_id`, created on first use.
    ///
    /// Returns `Ok(None)` when the store is full and the id is unknown.
    pub fn session(&self, session_id: &str) -> Result<Option<Arc<Mutex<IdentityTracker>>>> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| anyhow!("session store lock poisoned"))?;
        if let Some(tracker) = sessions.get(session_id) {
            return Ok(Some(tracker.clone()));
        }
        if sessions.len() >= self.max_sessions {
            log::warn!(
                "session store full ({} sessions); '{}' runs without shared dedup state",
                sessions.len(),
                session_id
            );
            return Ok(None);
        }
        let tracker = Arc::new(Mutex::new(IdentityTracker::new(self.distance_threshold)));
        sessions.insert(session_id.to_string(), tracker.clone());
        log::debug!("opened dedup session '{}'", session_id);
        Ok(Some(tracker))
    }

    /// Drop a session. Returns false when it did not exist.
    pub fn end(&self, session_id: &str) -> Result<bool> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| anyhow!("session store lock poisoned"))?;
        Ok(sessions.remove(session_id).is_some())
    }

    pub fn len(&self) -> Result<usize> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| anyhow!("session store lock poisoned"))?;
        Ok(sessions.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Fresh tracker with this store's threshold, for requests without a session.
    pub fn ephemeral(&self) -> IdentityTracker {
        IdentityTracker::new(self.distance_threshold)
    }
}
