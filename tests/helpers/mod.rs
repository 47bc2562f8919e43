#![allow(dead_code)]

mod writer;

use std::collections::HashMap;
use std::io;

use parking_lot::Mutex;
use quill::{BoxError, CacheEntry, CacheStore};

pub use self::writer::Writer;

/// A store call observed by [`RecordingStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Get { key: String, global: bool, hit: bool },
    Start { global: bool },
    Put { key: String, global: bool, body: String },
}

/// An in-memory cache store that records every call.
#[derive(Default)]
pub struct RecordingStore {
    entries: Mutex<HashMap<(bool, String), String>>,
    calls: Mutex<Vec<Call>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with an entry.
    pub fn with_entry(self, key: &str, global: bool, body: &str) -> Self {
        self.entries
            .lock()
            .insert((global, key.to_owned()), body.to_owned());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Returns the keys of all `put` calls.
    pub fn put_keys(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Put { key, .. } => Some(key.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn entry(&self, key: &str, global: bool) -> Option<String> {
        self.entries.lock().get(&(global, key.to_owned())).cloned()
    }
}

impl CacheStore for RecordingStore {
    fn get(&self, key: &str, global: bool) -> Result<Option<String>, BoxError> {
        let body = self.entries.lock().get(&(global, key.to_owned())).cloned();
        self.calls.lock().push(Call::Get {
            key: key.to_owned(),
            global,
            hit: body.is_some(),
        });
        Ok(body)
    }

    fn start(&self, global: bool) -> Result<(), BoxError> {
        self.calls.lock().push(Call::Start { global });
        Ok(())
    }

    fn put(&self, entry: CacheEntry) -> Result<(), BoxError> {
        self.calls.lock().push(Call::Put {
            key: entry.key.clone(),
            global: entry.global,
            body: entry.body.clone(),
        });
        self.entries
            .lock()
            .insert((entry.global, entry.key), entry.body);
        Ok(())
    }
}

/// A cache store whose reads always fail.
pub struct FailingStore;

impl CacheStore for FailingStore {
    fn get(&self, _: &str, _: bool) -> Result<Option<String>, BoxError> {
        Err(io::Error::new(io::ErrorKind::ConnectionRefused, "store is down").into())
    }

    fn put(&self, _: CacheEntry) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Installs a test subscriber, honouring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
