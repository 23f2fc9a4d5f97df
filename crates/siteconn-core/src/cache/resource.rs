use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Last-fetched metadata of a remote resource, as returned by the site.
pub type Snapshot = serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Folder,
    List,
    ContentType,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Folder => "folder",
            ResourceKind::List => "list",
            ResourceKind::ContentType => "content-type",
        }
    }
}

type Table = HashMap<String, CachedData<Snapshot>>;

#[derive(Default)]
struct Tables {
    folder: Table,
    list: Table,
    content_type: Table,
}

impl Tables {
    fn table(&mut self, kind: ResourceKind) -> &mut Table {
        match kind {
            ResourceKind::Folder => &mut self.folder,
            ResourceKind::List => &mut self.list,
            ResourceKind::ContentType => &mut self.content_type,
        }
    }
}

/// The folder, list and content-type caches of one session.
///
/// All three tables sit behind one lock. Entries never expire; callers
/// invalidate after mutating the corresponding remote resource. While
/// disabled every read misses and every write is dropped.
pub struct ResourceCaches {
    enabled: AtomicBool,
    tables: Mutex<Tables>,
}

impl ResourceCaches {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            tables: Mutex::new(Tables::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn folder(&self) -> ResourceCache<'_> {
        self.of(ResourceKind::Folder)
    }

    pub fn list(&self) -> ResourceCache<'_> {
        self.of(ResourceKind::List)
    }

    pub fn content_type(&self) -> ResourceCache<'_> {
        self.of(ResourceKind::ContentType)
    }

    pub fn of(&self, kind: ResourceKind) -> ResourceCache<'_> {
        ResourceCache { owner: self, kind }
    }

    pub fn clear_all(&self) {
        if !self.is_enabled() {
            return;
        }
        let mut tables = self.tables.lock();
        *tables = Tables::default();
    }
}

impl fmt::Debug for ResourceCaches {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.tables.lock();
        f.debug_struct("ResourceCaches")
            .field("enabled", &self.is_enabled())
            .field("folders", &tables.folder.len())
            .field("lists", &tables.list.len())
            .field("content_types", &tables.content_type.len())
            .finish()
    }
}

/// View onto one table of a [`ResourceCaches`].
#[derive(Clone, Copy)]
pub struct ResourceCache<'a> {
    owner: &'a ResourceCaches,
    kind: ResourceKind,
}

impl ResourceCache<'_> {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn get(&self, key: &str) -> Option<Snapshot> {
        self.get_entry(key).map(|entry| entry.data)
    }

    pub fn get_entry(&self, key: &str) -> Option<CachedData<Snapshot>> {
        if !self.owner.is_enabled() {
            return None;
        }
        self.owner.tables.lock().table(self.kind).get(key).cloned()
    }

    pub fn put(&self, key: impl Into<String>, value: Snapshot) {
        if !self.owner.is_enabled() {
            return;
        }
        let key = key.into();
        debug!(kind = self.kind.as_str(), key = %key, "Caching resource");
        self.owner
            .tables
            .lock()
            .table(self.kind)
            .insert(key, CachedData::new(value));
    }

    pub fn invalidate(&self, key: &str) {
        if !self.owner.is_enabled() {
            return;
        }
        self.owner.tables.lock().table(self.kind).remove(key);
    }

    pub fn clear(&self) {
        if !self.owner.is_enabled() {
            return;
        }
        self.owner.tables.lock().table(self.kind).clear();
    }

    pub fn len(&self) -> usize {
        if !self.owner.is_enabled() {
            return 0;
        }
        self.owner.tables.lock().table(self.kind).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
