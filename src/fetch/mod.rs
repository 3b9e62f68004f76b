//! Deduplicating resource cache.
//!
//! Every key maps to one shared in-flight retrieval. The slot is stored
//! before the caller first awaits, so concurrent demand for the same key
//! never issues a second request. Successful resources stay cached for the
//! lifetime of the cache; a failed retrieval clears its slot so the next
//! caller retries.

use anyhow::Result;
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::datum::{convert_timestamps, Datum};
use crate::error::FetchError;
use crate::logging::{self, ProfileScope};

pub mod retry;
mod transport;

pub use transport::{FileTransport, HttpTransport};

/// Source of raw resource bodies.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn retrieve(&self, key: &str) -> Result<String>;
}

pub type FetchResult = Result<Arc<Datum>, FetchError>;

type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

struct Slot {
    id: u64,
    pending: SharedFetch,
}

#[derive(Clone)]
pub struct FetchCache {
    transport: Arc<dyn Transport>,
    slots: Arc<Mutex<HashMap<String, Slot>>>,
    next_id: Arc<AtomicU64>,
}

impl FetchCache {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns the shared retrieval for `key`, starting it if needed.
    ///
    /// The slot is claimed synchronously, before the returned future is
    /// polled. An empty key resolves to [`Datum::Null`] without a retrieval.
    pub fn fetch(&self, key: &str) -> BoxFuture<'static, FetchResult> {
        if key.is_empty() {
            return futures_util::future::ready(Ok(Arc::new(Datum::Null))).boxed();
        }
        let mut slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(slot) = slots.get(key) {
            return slot.pending.clone().boxed();
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let pending = retrieve(
            self.transport.clone(),
            self.slots.clone(),
            key.to_string(),
            id,
        )
        .boxed()
        .shared();
        slots.insert(
            key.to_string(),
            Slot {
                id,
                pending: pending.clone(),
            },
        );
        pending.boxed()
    }

    /// Optional dependency: an absent or empty key yields `None` at once.
    pub fn fetch_optional(
        &self,
        key: Option<&str>,
    ) -> BoxFuture<'static, Result<Option<Arc<Datum>>, FetchError>> {
        match key {
            Some(key) if !key.is_empty() => self.fetch(key).map(|r| r.map(Some)).boxed(),
            _ => futures_util::future::ready(Ok(None)).boxed(),
        }
    }

    /// True once `key` has a pending or completed entry.
    pub fn is_cached(&self, key: &str) -> bool {
        self.slots
            .lock()
            .map(|slots| slots.contains_key(key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn retrieve(
    transport: Arc<dyn Transport>,
    slots: Arc<Mutex<HashMap<String, Slot>>>,
    key: String,
    id: u64,
) -> FetchResult {
    logging::log_fetch_start(&key);
    let scope = ProfileScope::with_context("fetch", &[("key", logging::v_str(&key))]);

    let result = match transport.retrieve(&key).await {
        Ok(body) => decode(&key, &body).map(|doc| (doc, body.len())),
        Err(err) => Err(FetchError::Transport {
            key: key.clone(),
            reason: format!("{:#}", err),
        }),
    };

    match result {
        Ok((doc, bytes)) => {
            logging::log_fetch_done(&key, bytes, scope.elapsed_ms());
            Ok(doc)
        }
        Err(err) => {
            logging::log_fetch_failed(&key, &err.to_string());
            if let Ok(mut slots) = slots.lock() {
                if slots.get(&key).map(|s| s.id) == Some(id) {
                    slots.remove(&key);
                }
            }
            Err(err)
        }
    }
}

fn decode(key: &str, body: &str) -> FetchResult {
    if body.trim().is_empty() {
        return Err(FetchError::EmptyPayload {
            key: key.to_string(),
        });
    }
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| FetchError::Decode {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    if value.is_null() {
        return Err(FetchError::EmptyPayload {
            key: key.to_string(),
        });
    }
    let mut doc = Datum::from(value);
    convert_timestamps(&mut doc);
    Ok(Arc::new(doc))
}
