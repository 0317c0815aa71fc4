//! In-memory session tracking per execution context
//!
//! A session starts with the first event from a context and is replaced when
//! the context moves to another domain. Nothing here is persisted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::record::domain_of;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub context_id: String,
    pub session_id: String,
    pub domain: String,
    pub url: String,
    pub start_time: i64,
    pub last_activity: i64,
    pub log_count: u64,
}

#[derive(Debug)]
pub struct SessionTracker {
    clock: Arc<dyn Clock>,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Record one event. Returns the session after the update.
    pub fn on_event(&self, context_id: &str, url: &str, session_id: &str) -> Session {
        let now = self.clock.now_ms();
        let domain = domain_of(url);
        let mut sessions = self.sessions.lock();

        match sessions.get_mut(context_id) {
            Some(session) if session.domain == domain => {
                session.last_activity = now;
                session.log_count += 1;
                session.url = url.to_string();
                session.clone()
            }
            _ => {
                let session = Session {
                    context_id: context_id.to_string(),
                    session_id: session_id.to_string(),
                    domain,
                    url: url.to_string(),
                    start_time: now,
                    last_activity: now,
                    log_count: 1,
                };
                debug!(context_id, session_id, "Started session");
                sessions.insert(context_id.to_string(), session.clone());
                session
            }
        }
    }

    /// Returns true if a session was tracked
    pub fn on_context_closed(&self, context_id: &str) -> bool {
        self.sessions.lock().remove(context_id).is_some()
    }

    /// Drop the session if the context moved to another domain. Returns true
    /// if it was dropped.
    pub fn on_context_navigated(&self, context_id: &str, new_url: &str) -> bool {
        let new_domain = domain_of(new_url);
        let mut sessions = self.sessions.lock();
        match sessions.get(context_id) {
            Some(session) if session.domain != new_domain => {
                sessions.remove(context_id);
                debug!(context_id, domain = %new_domain, "Session ended by navigation");
                true
            }
            _ => false,
        }
    }

    /// Remove sessions idle for longer than `max_idle_ms`
    pub fn sweep_inactive(&self, max_idle_ms: i64) -> usize {
        let now = self.clock.now_ms();
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, session| now - session.last_activity <= max_idle_ms);
        before - sessions.len()
    }

    pub fn get(&self, context_id: &str) -> Option<Session> {
        self.sessions.lock().get(context_id).cloned()
    }

    /// Snapshot ordered by start time
    pub fn active_sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<_> = self.sessions.lock().values().cloned().collect();
        sessions.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.context_id.cmp(&b.context_id))
        });
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Sweep idle sessions on a fixed interval until the handle is aborted
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration, max_idle_ms: i64) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = self.sweep_inactive(max_idle_ms);
                if removed > 0 {
                    info!(removed, remaining = self.len(), "Swept inactive sessions");
                }
            }
        })
    }
}
