use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Position of a call in the intake dialogue.  Carried in the `step` query parameter of every
/// `<Gather>` action URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Step {
    #[default]
    Detect,
    Name,
    Dob,
    When,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Step::Detect => "detect",
            Step::Name => "name",
            Step::Dob => "dob",
            Step::When => "when",
        }
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "detect" => Ok(Step::Detect),
            "name" => Ok(Step::Name),
            "dob" => Ok(Step::Dob),
            "when" => Ok(Step::When),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller wants, as classified during `detect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPath {
    New,
    Reschedule,
    Cancel,
    Frontdesk,
}

impl CallPath {
    pub fn as_str(self) -> &'static str {
        match self {
            CallPath::New => "new",
            CallPath::Reschedule => "reschedule",
            CallPath::Cancel => "cancel",
            CallPath::Frontdesk => "frontdesk",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallSession {
    pub call_sid: String,
    pub step: Step,
    pub path: Option<CallPath>,
    pub caller_name: Option<String>,
    /// Eight touch-tone digits, MMDDYYYY as keyed by the caller.
    pub date_of_birth: Option<String>,
    pub preferred_when: Option<String>,
    /// Failed attempts at the current step; reset whenever the step advances.
    pub attempts: u32,
    /// Webhook turns handled so far.  Zero means the session was just created.
    pub turns: u32,
    pub created: Instant,
    pub last_seen: Instant,
    /// Set once the dialogue has produced a terminal reply.
    pub closed: bool,
}

impl CallSession {
    pub fn new(call_sid: &str, now: Instant) -> Self {
        Self {
            call_sid: call_sid.to_string(),
            step: Step::Detect,
            path: None,
            caller_name: None,
            date_of_birth: None,
            preferred_when: None,
            attempts: 0,
            turns: 0,
            created: now,
            last_seen: now,
            closed: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.path.is_some()
            && self.caller_name.is_some()
            && self.date_of_birth.is_some()
            && self.preferred_when.is_some()
    }

    /// Number of caller-supplied fields collected so far.
    pub fn collected(&self) -> usize {
        [
            self.path.is_some(),
            self.caller_name.is_some(),
            self.date_of_birth.is_some(),
            self.preferred_when.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}

/// Sessions keyed by `CallSid`, plus an index ordered by `last_seen` so the stalest call is
/// always at the front.
#[derive(Default)]
struct Sessions {
    by_sid: HashMap<String, CallSession>,
    by_recency: BTreeSet<(Instant, String)>,
}

impl Sessions {
    fn remove(&mut self, call_sid: &str) -> Option<CallSession> {
        let session = self.by_sid.remove(call_sid)?;
        self.by_recency
            .remove(&(session.last_seen, session.call_sid.clone()));
        Some(session)
    }

    fn pop_least_recent(&mut self) -> Option<CallSession> {
        let (_, call_sid) = self.by_recency.pop_first()?;
        self.by_sid.remove(&call_sid)
    }

    fn least_recent_seen(&self) -> Option<Instant> {
        self.by_recency.first().map(|(seen, _)| *seen)
    }
}

/// Process-local store of in-flight call sessions, keyed by `CallSid`.
///
/// Sessions idle for longer than `ttl` are treated as abandoned, and the store never holds more
/// than `capacity` calls: inserting into a full store evicts the least recently seen session.
pub struct SessionStore {
    sessions: Mutex<Sessions>,
    ttl: Duration,
    capacity: usize,
}

impl SessionStore {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(Sessions::default()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Sessions> {
        // A panic while holding the lock leaves at worst one half-updated session behind.
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` against the session for `call_sid`, creating it first if it is absent or expired.
    ///
    /// If `f` closes the session it is removed from the store and handed back alongside `f`'s
    /// result.
    pub fn with_session<R>(
        &self,
        call_sid: &str,
        now: Instant,
        f: impl FnOnce(&mut CallSession) -> R,
    ) -> (R, Option<CallSession>) {
        let mut sessions = self.lock();

        // Take the session out while it is worked on; it goes back in under its new recency key.
        let mut session = match sessions.remove(call_sid) {
            Some(session) if self.is_expired(session.last_seen, now) => {
                debug!(call_sid, "session expired; starting over");
                CallSession::new(call_sid, now)
            }
            Some(session) => session,
            None => {
                if sessions.by_sid.len() >= self.capacity {
                    if let Some(evicted) = sessions.pop_least_recent() {
                        warn!(
                            call_sid = %evicted.call_sid,
                            "session store full; evicting least recent call"
                        );
                    }
                }
                CallSession::new(call_sid, now)
            }
        };

        session.last_seen = now;
        let result = f(&mut session);

        if session.closed {
            return (result, Some(session));
        }
        sessions
            .by_recency
            .insert((session.last_seen, call_sid.to_string()));
        sessions.by_sid.insert(call_sid.to_string(), session);
        (result, None)
    }

    pub fn remove(&self, call_sid: &str) -> Option<CallSession> {
        self.lock().remove(call_sid)
    }

    /// Drop every session idle for longer than the ttl; returns how many were dropped.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let mut sessions = self.lock();
        let mut dropped = 0;
        while sessions
            .least_recent_seen()
            .map_or(false, |seen| self.is_expired(seen, now))
        {
            sessions.pop_least_recent();
            dropped += 1;
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().by_sid.len()
    }

    #[cfg(test)]
    pub fn get(&self, call_sid: &str) -> Option<CallSession> {
        self.lock().by_sid.get(call_sid).cloned()
    }

    fn is_expired(&self, last_seen: Instant, now: Instant) -> bool {
        now.saturating_duration_since(last_seen) > self.ttl
    }
}
