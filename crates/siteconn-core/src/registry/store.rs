use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};
use url::Url;

use super::eviction::{EvictionPolicy, LruCap, Unbounded};
use crate::auth::Credential;
use crate::error::{Result, SessionError};
use crate::session::{normalize_target, Connector, Session};
use crate::transport::Transport;

/// Registry address of a session: who is connected, and to which site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub username: String,
    pub target: Url,
}

impl SessionKey {
    pub fn new(username: impl Into<String>, target: Url) -> Self {
        Self {
            username: username.into(),
            target,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.username, self.target)
    }
}

struct RegisteredSession<T: Transport> {
    session: Arc<Session<T>>,
    last_used: AtomicU64,
}

pub(crate) struct RegistryInner<T: Transport> {
    connector: Arc<Connector<T>>,
    entries: DashMap<SessionKey, RegisteredSession<T>>,
    most_recent: Mutex<Option<SessionKey>>,
    clock: AtomicU64,
    eviction: Box<dyn EvictionPolicy>,
}

impl<T: Transport> RegistryInner<T> {
    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn touch(&self, key: &SessionKey) {
        if let Some(entry) = self.entries.get(key) {
            entry.last_used.store(self.tick(), Ordering::Relaxed);
        }
        *self.most_recent.lock() = Some(key.clone());
    }

    pub(crate) fn store(self: &Arc<Self>, session: Arc<Session<T>>) -> Result<()> {
        let key = session.key();
        match self.entries.entry(key.clone()) {
            Entry::Occupied(_) => {
                return Err(SessionError::DuplicateSession {
                    username: key.username,
                    target: key.target.to_string(),
                });
            }
            Entry::Vacant(vacant) => {
                if !session.bind_registry(Arc::downgrade(self)) && !session.owned_by(self) {
                    debug!(key = %key, "Session already belongs to another registry");
                }
                vacant.insert(RegisteredSession {
                    session,
                    last_used: AtomicU64::new(self.tick()),
                });
            }
        }
        info!(key = %key, "Stored session");
        self.touch(&key);
        self.evict();
        Ok(())
    }

    fn lookup(&self, key: &SessionKey) -> Option<Arc<Session<T>>> {
        let session = self.entries.get(key).map(|entry| Arc::clone(&entry.session))?;
        self.touch(key);
        Some(session)
    }

    fn evict(&self) {
        if !self.eviction.is_bounded() {
            return;
        }
        let snapshot: Vec<(SessionKey, u64)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.last_used.load(Ordering::Relaxed)))
            .collect();

        for victim in self.eviction.select_victims(&snapshot) {
            if self.entries.remove(&victim).is_some() {
                debug!(key = %victim, "Evicted session");
                self.forget_most_recent(&victim);
            }
        }
    }

    fn forget_most_recent(&self, key: &SessionKey) {
        let mut most_recent = self.most_recent.lock();
        if most_recent.as_ref() == Some(key) {
            *most_recent = None;
        }
    }
}

/// Keyed store of live sessions, shared by everything in the host process
/// that talks to the platform.
///
/// Holds at most one session per (username, target). Cloning yields another
/// handle onto the same store.
pub struct SessionRegistry<T: Transport> {
    inner: Arc<RegistryInner<T>>,
}

impl<T: Transport> Clone for SessionRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> SessionRegistry<T> {
    /// Eviction follows `max_sessions` in the connector's config: unbounded
    /// when unset, otherwise LRU capped at that size.
    pub fn new(connector: Arc<Connector<T>>) -> Self {
        let eviction: Box<dyn EvictionPolicy> = match connector.config().max_sessions {
            Some(max) => Box::new(LruCap::new(max)),
            None => Box::new(Unbounded),
        };
        Self::with_eviction(connector, eviction)
    }

    pub fn with_eviction(connector: Arc<Connector<T>>, eviction: Box<dyn EvictionPolicy>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                connector,
                entries: DashMap::new(),
                most_recent: Mutex::new(None),
                clock: AtomicU64::new(0),
                eviction,
            }),
        }
    }

    pub fn connector(&self) -> &Arc<Connector<T>> {
        &self.inner.connector
    }

    /// Insert `session`. Fails if its (username, target) is already present.
    pub fn store(&self, session: Arc<Session<T>>) -> Result<()> {
        self.inner.store(session)
    }

    /// Look up a session pointed at `target`.
    ///
    /// With a `user`, this is an exact key lookup. With an empty `user` any
    /// session whose target ends with `target` matches, whoever it belongs to;
    /// the first one found is returned.
    pub fn find(&self, target: &str, user: &str) -> Option<Arc<Session<T>>> {
        if !user.is_empty() {
            let target = normalize_target(target).ok()?;
            return self.inner.lookup(&SessionKey::new(user, target));
        }

        let suffix = match normalize_target(target) {
            Ok(url) => url.to_string(),
            Err(_) => target.trim().trim_end_matches('/').to_string(),
        };
        if suffix.is_empty() {
            return None;
        }

        let key = self
            .inner
            .entries
            .iter()
            .find(|entry| entry.key().target.as_str().ends_with(&suffix))
            .map(|entry| entry.key().clone())?;
        self.inner.lookup(&key)
    }

    /// Return the registered session for (credential, target), creating an
    /// unconnected one if there is none. Never connects.
    pub fn get_or_create(&self, credential: Arc<Credential>, target: &str) -> Result<Arc<Session<T>>> {
        let target = normalize_target(target)?;
        let key = SessionKey::new(credential.username(), target.clone());
        if let Some(session) = self.inner.lookup(&key) {
            return Ok(session);
        }

        let session = match self.inner.entries.entry(key.clone()) {
            // Another caller created it between the lookup and here.
            Entry::Occupied(occupied) => Arc::clone(&occupied.get().session),
            Entry::Vacant(vacant) => {
                let session = Arc::new(Session::unconnected(
                    credential,
                    target,
                    Arc::clone(&self.inner.connector),
                    Some(Arc::downgrade(&self.inner)),
                ));
                // Stamped now so a concurrent eviction never sees it as the oldest.
                vacant.insert(RegisteredSession {
                    session: Arc::clone(&session),
                    last_used: AtomicU64::new(self.inner.tick()),
                });
                info!(key = %key, "Created session");
                session
            }
        };
        self.inner.touch(&key);
        self.inner.evict();
        Ok(session)
    }

    /// The session most recently stored or found.
    pub fn most_recently_used(&self) -> Result<Arc<Session<T>>> {
        let key = self
            .inner
            .most_recent
            .lock()
            .clone()
            .ok_or(SessionError::NoActiveSession)?;
        self.inner
            .entries
            .get(&key)
            .map(|entry| Arc::clone(&entry.session))
            .ok_or(SessionError::NoActiveSession)
    }

    pub fn remove(&self, key: &SessionKey) -> Option<Arc<Session<T>>> {
        let (_, removed) = self.inner.entries.remove(key)?;
        self.inner.forget_most_recent(key);
        debug!(key = %key, "Removed session");
        Some(removed.session)
    }

    pub fn keys(&self) -> Vec<SessionKey> {
        self.inner.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}
