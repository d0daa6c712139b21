//! Process-wide registry of resumable sessions.
//!
//! The store maps a client identifier to a [`SharedSession`]. Every active
//! call resolves through it and the sweep task prunes it, so the map is
//! guarded by a single lock and only exposes [`SessionStore::resolve`] and
//! [`SessionStore::sweep`]; callers never iterate it directly.
//!
//! Each session additionally sits behind its own async drain lock. A producer
//! holds that lock for as long as it emits, which serializes concurrent calls
//! presenting the same identifier and lets the sweep recognise sessions that
//! are in use.

use core::time::Duration;
use numstream_core::{CursorProbe, Session, types::Value};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tokio::time::Instant;

/// A session shared between the store and the call draining it.
pub type SharedSession = Arc<tokio::sync::Mutex<Session>>;

/// How a call's session was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// No identifier was supplied; the session lives only as long as the call.
    Ephemeral,
    /// A new session was registered under the identifier.
    Created,
    /// An existing session was handed back; the fresh sequence was discarded.
    Resumed,
}

/// Result of [`SessionStore::resolve`].
pub struct Resolved {
    pub session: SharedSession,
    pub resolution: Resolution,
}

/// Outcome of a single sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted: usize,
    pub retained: usize,
}

struct Entry {
    session: SharedSession,
    cursor: CursorProbe,
}

/// Registry of sessions keyed by client identifier, with idle eviction.
pub struct SessionStore {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl SessionStore {
    /// Creates an empty store evicting sessions idle for longer than `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// How long a session may sit idle before the sweep evicts it.
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Obtains the session for a call.
    ///
    /// - Without an identifier, wraps `sequence` in a session that is not
    ///   retained.
    /// - With an unknown identifier, registers a new session built from
    ///   `sequence`.
    /// - With a known identifier, returns the stored session untouched and
    ///   drops `sequence`.
    pub fn resolve(&self, client_id: Option<&str>, quantity: i64, sequence: Vec<Value>) -> Resolved {
        let Some(client_id) = client_id else {
            return Resolved {
                session: Self::wrap(quantity, sequence).0,
                resolution: Resolution::Ephemeral,
            };
        };

        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(client_id) {
            return Resolved {
                session: Arc::clone(&entry.session),
                resolution: Resolution::Resumed,
            };
        }

        let (session, cursor) = Self::wrap(quantity, sequence);
        entries.insert(
            client_id.to_owned(),
            Entry {
                session: Arc::clone(&session),
                cursor,
            },
        );
        Resolved {
            session,
            resolution: Resolution::Created,
        }
    }

    /// Evicts every idle session whose last access is more than the TTL
    /// before `now`.
    ///
    /// Sessions whose drain lock is held are being streamed and always
    /// survive.
    pub fn sweep(&self, now: Instant) -> SweepReport {
        let mut report = SweepReport::default();
        let ttl = self.ttl;

        self.entries.lock().retain(|client_id, entry| {
            let Ok(session) = entry.session.try_lock() else {
                tracing::debug!(
                    client_id = %client_id,
                    position = entry.cursor.get(),
                    "Session busy"
                );
                report.retained += 1;
                return true;
            };

            let idle = session.idle_for(now);
            if idle > ttl {
                tracing::debug!(
                    client_id = %client_id,
                    position = session.position(),
                    idle_secs = idle.as_secs_f64(),
                    "Evicting idle session"
                );
                report.evicted += 1;
                false
            } else {
                tracing::debug!(
                    client_id = %client_id,
                    position = session.position(),
                    ttl_secs = (ttl - idle).as_secs_f64(),
                    "Session retained"
                );
                report.retained += 1;
                true
            }
        });

        report
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when no resumable session is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Whether a session is registered under `client_id`.
    pub fn contains(&self, client_id: &str) -> bool {
        self.entries.lock().contains_key(client_id)
    }

    fn wrap(quantity: i64, sequence: Vec<Value>) -> (SharedSession, CursorProbe) {
        let session = Session::new(quantity, sequence);
        let cursor = session.cursor_probe();
        (Arc::new(tokio::sync::Mutex::new(session)), cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(30);

    fn values(raw: &[u32]) -> Vec<Value> {
        raw.iter().copied().map(Value::from).collect()
    }

    #[tokio::test]
    async fn ephemeral_sessions_are_not_retained() {
        let store = SessionStore::new(TTL);
        assert_eq!(store.ttl(), TTL);
        let resolved = store.resolve(None, 3, values(&[1, 2, 4]));
        assert_eq!(resolved.resolution, Resolution::Ephemeral);
        assert_eq!(resolved.session.lock().await.len(), 3);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn unknown_identifier_registers_session() {
        let store = SessionStore::new(TTL);
        let resolved = store.resolve(Some("a"), 3, values(&[1, 2, 4]));
        assert_eq!(resolved.resolution, Resolution::Created);
        assert!(store.contains("a"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn known_identifier_resumes_and_discards_fresh_sequence() {
        let store = SessionStore::new(TTL);
        let first = store.resolve(Some("x"), 10, values(&[1, 2, 4, 8, 16]));
        {
            let mut session = first.session.lock().await;
            for _ in 0..4 {
                session.advance();
            }
        }

        let resumed = store.resolve(Some("x"), 6, values(&[8, 16, 32, 64, 128, 256]));
        assert_eq!(resumed.resolution, Resolution::Resumed);
        assert!(Arc::ptr_eq(&first.session, &resumed.session));

        let mut session = resumed.session.lock().await;
        assert_eq!(session.position(), 4);
        assert_eq!(session.len(), 5);
        assert_eq!(session.target_quantity(), 10);
        assert_eq!(session.current(), Some(&Value::from(16_u32)));
    }

    #[tokio::test]
    async fn identifiers_are_independent() {
        let store = SessionStore::new(TTL);
        let a = store.resolve(Some("a"), 1, values(&[1]));
        let b = store.resolve(Some("b"), 1, values(&[2]));
        assert!(!Arc::ptr_eq(&a.session, &b.session));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn sweep_evicts_expired_sessions() {
        let store = SessionStore::new(TTL);
        store.resolve(Some("a"), 1, values(&[1]));
        store.resolve(Some("b"), 1, values(&[1]));

        let report = store.sweep(Instant::now() + TTL + Duration::from_secs(1));
        assert_eq!(report, SweepReport { evicted: 2, retained: 0 });
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn sweep_keeps_sessions_idle_for_exactly_ttl() {
        let store = SessionStore::new(TTL);
        let session = store.resolve(Some("a"), 1, values(&[1])).session;
        let accessed = session.lock().await.last_accessed();

        let report = store.sweep(accessed + TTL);
        assert_eq!(report, SweepReport { evicted: 0, retained: 1 });
        assert!(store.contains("a"));

        let report = store.sweep(accessed + TTL + Duration::from_nanos(1));
        assert_eq!(report, SweepReport { evicted: 1, retained: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_keeps_sessions_within_ttl() {
        let store = SessionStore::new(TTL);
        store.resolve(Some("a"), 1, values(&[1]));

        tokio::time::advance(TTL).await;
        let report = store.sweep(Instant::now());
        assert_eq!(report, SweepReport { evicted: 0, retained: 1 });
        assert!(store.contains("a"));
    }

    #[tokio::test]
    async fn sweep_never_evicts_sessions_being_drained() {
        let store = SessionStore::new(TTL);
        let resolved = store.resolve(Some("busy"), 1, values(&[1]));
        let _drain = resolved.session.lock().await;

        let report = store.sweep(Instant::now() + TTL * 10);
        assert_eq!(report, SweepReport { evicted: 0, retained: 1 });
        assert!(store.contains("busy"));
    }

    #[tokio::test(start_paused = true)]
    async fn accessed_session_outlives_idle_one() {
        let store = SessionStore::new(TTL);
        let idle = store.resolve(Some("idle"), 2, values(&[1, 2])).session;
        let active = store.resolve(Some("active"), 2, values(&[1, 2])).session;
        drop(idle);

        tokio::time::advance(Duration::from_secs(20)).await;
        active.lock().await.advance();
        tokio::time::advance(Duration::from_secs(15)).await;

        let report = store.sweep(Instant::now());
        assert_eq!(report, SweepReport { evicted: 1, retained: 1 });
        assert!(!store.contains("idle"));
        assert!(store.contains("active"));
    }
}
