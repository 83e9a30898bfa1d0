//! In-flight request deduplication.
//!
//! Concurrent callers asking for the same `(method, path, params)` share a
//! single outbound call. The first caller starts the work on a detached task;
//! later callers join it until it settles. The entry is removed from the map
//! by the task itself, before the result reaches any waiter, so the next
//! call after settlement always starts fresh.
//!
//! Dropping a waiter never cancels the shared call.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tracing::debug;

use crate::telemetry;
use crate::{OrdeloError, Result};

/// Canonical identity of an outbound request.
///
/// Parameters are held sorted, so two keys built from the same pairs in a
/// different order are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    method: String,
    path: String,
    params: BTreeMap<String, String>,
}

impl RequestKey {
    pub fn new<I, K, V>(method: &str, path: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.into(),
            params: params
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Shorthand for a `GET` key.
    pub fn get<I, K, V>(path: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new("GET", path, params)
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)?;
        for (i, (k, v)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{k}={v}")?;
        }
        Ok(())
    }
}

type SharedResult<T> = Shared<BoxFuture<'static, Result<T>>>;

/// Map of in-flight requests, one live entry per [`RequestKey`].
pub struct DeduplicationRegistry<T> {
    pending: Arc<Mutex<HashMap<RequestKey, SharedResult<T>>>>,
}

impl<T> Clone for DeduplicationRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<T> Default for DeduplicationRegistry<T> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> DeduplicationRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the in-flight call for `key`, or start `factory()` if there is none.
    ///
    /// `factory` is only invoked when no call is pending. Every caller gets
    /// a clone of the same result, success or failure.
    pub async fn dedupe<F, Fut>(&self, key: RequestKey, factory: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let shared = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            match pending.get(&key) {
                Some(existing) => {
                    metrics::counter!(telemetry::DEDUP_JOINS_TOTAL, "path" => key.path.clone())
                        .increment(1);
                    debug!(request = %key, "joining in-flight request");
                    existing.clone()
                }
                None => {
                    let shared = self.start(key.clone(), factory());
                    pending.insert(key, shared.clone());
                    shared
                }
            }
        };
        shared.await
    }

    /// Number of requests currently in flight.
    pub fn in_flight(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn start<Fut>(&self, key: RequestKey, work: Fut) -> SharedResult<T>
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let pending = Arc::clone(&self.pending);
        let task = tokio::spawn(async move {
            let result = work.await;
            pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&key);
            result
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(OrdeloError::Http(format!("request task failed: {e}"))))
        }
        .boxed()
        .shared()
    }
}
