//! Collaborators consumed by the `cache` and `paginate` directives.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::error::BoxError;
use crate::Value;

/// A rendered fragment to store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    /// Whether the key is shared by every site instead of the current one.
    pub global: bool,
    /// How long to keep the entry, `None` for the store default.
    pub duration: Option<Duration>,
    /// When the entry expires, takes precedence over `duration`.
    pub expiration: Option<DateTime<Utc>>,
    pub body: String,
}

/// The backend of the `cache` directive.
///
/// An empty string is a valid cached body and must be returned as
/// `Some(String::new())`, `None` means the key is not cached.
pub trait CacheStore: Send + Sync {
    /// Looks up a cached body.
    fn get(&self, key: &str, global: bool) -> Result<Option<String>, BoxError>;

    /// Called when a block starts buffering after a miss, stores that track
    /// the dependencies of an entry can start doing so here.
    fn start(&self, global: bool) -> Result<(), BoxError> {
        let _ = global;
        Ok(())
    }

    /// Stores a rendered body.
    fn put(&self, entry: CacheEntry) -> Result<(), BoxError>;
}

/// A thread-safe in-memory [`CacheStore`].
#[derive(Debug)]
pub struct MemoryStore {
    default_duration: Option<Duration>,
    entries: Mutex<HashMap<(bool, String), Stored>>,
}

#[derive(Debug)]
struct Stored {
    body: String,
    expires: Option<DateTime<Utc>>,
}

/// A source of rows for the `paginate` directive.
pub trait Query: Send {
    /// The pre-existing result limit.
    fn limit(&self) -> Option<usize>;

    fn set_limit(&mut self, limit: Option<usize>);

    /// Returns at most `count` rows starting at `offset`.
    fn slice(&mut self, offset: usize, count: usize) -> Result<Vec<Value>, BoxError>;

    /// Returns the total number of rows, ignoring the limit.
    fn count(&mut self) -> Result<usize, BoxError>;
}

/// A [`Query`] over an in-memory list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    rows: Vec<Value>,
    limit: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            default_duration: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the lifetime of entries stored without a duration or expiration.
    pub fn with_default_duration(mut self, duration: Duration) -> Self {
        self.default_duration = Some(duration);
        self
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.entries
            .lock()
            .values()
            .filter(|s| s.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Stored {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires.map_or(true, |at| now < at)
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str, global: bool) -> Result<Option<String>, BoxError> {
        let mut entries = self.entries.lock();
        let k = (global, key.to_owned());
        match entries.get(&k) {
            Some(stored) if stored.is_live(Utc::now()) => Ok(Some(stored.body.clone())),
            Some(_) => {
                entries.remove(&k);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn put(&self, entry: CacheEntry) -> Result<(), BoxError> {
        let CacheEntry {
            key,
            global,
            duration,
            expiration,
            body,
        } = entry;
        let expires = match (expiration, duration.or(self.default_duration)) {
            (Some(at), _) => Some(at),
            (None, Some(d)) => Utc::now().checked_add_signed(d),
            (None, None) => None,
        };
        tracing::trace!(%key, global, ?expires, "storing fragment");
        self.entries
            .lock()
            .insert((global, key), Stored { body, expires });
        Ok(())
    }
}

impl ListQuery {
    pub fn new(rows: Vec<Value>) -> Self {
        Self { rows, limit: None }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl Query for ListQuery {
    fn limit(&self) -> Option<usize> {
        self.limit
    }

    fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    fn slice(&mut self, offset: usize, count: usize) -> Result<Vec<Value>, BoxError> {
        Ok(self.rows.iter().skip(offset).take(count).cloned().collect())
    }

    fn count(&mut self) -> Result<usize, BoxError> {
        Ok(self.rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, global: bool, body: &str) -> CacheEntry {
        CacheEntry {
            key: key.into(),
            global,
            duration: None,
            expiration: None,
            body: body.into(),
        }
    }

    #[test]
    fn memory_store_namespaces() {
        let store = MemoryStore::new();
        store.put(entry("k", true, "global")).unwrap();
        store.put(entry("k", false, "")).unwrap();
        assert_eq!(store.get("k", true).unwrap().as_deref(), Some("global"));
        assert_eq!(store.get("k", false).unwrap().as_deref(), Some(""));
        assert_eq!(store.get("other", false).unwrap(), None);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn memory_store_expired() {
        let store = MemoryStore::new();
        store
            .put(CacheEntry {
                expiration: Some(Utc::now() - Duration::seconds(1)),
                ..entry("k", false, "stale")
            })
            .unwrap();
        assert_eq!(store.get("k", false).unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn list_query_slice() {
        let mut query = ListQuery::new((0..5).map(Value::from).collect()).with_limit(2);
        assert_eq!(query.limit(), Some(2));
        query.set_limit(None);
        assert_eq!(
            query.slice(3, 10).unwrap(),
            [Value::from(3), Value::from(4)]
        );
        assert_eq!(query.count().unwrap(), 5);
    }
}
