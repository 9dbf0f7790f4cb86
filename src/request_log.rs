//! Append-only log of request/response exchanges.
//!
//! Every alert and every module error carries the id of the exchange that
//! triggered it, so the exact network traffic can be looked up afterwards.

use crate::http::{Request, Response};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// One logged exchange.
#[derive(Debug, Clone, Serialize)]
pub struct RequestLogEntry {
    pub id: u64,
    pub host: String,
    pub request: Request,
    pub response: Response,
}

/// Append-only exchange log. Implementations hand out unique ids atomically.
pub trait RequestLog: Send + Sync {
    /// Appends the exchange and returns its id.
    fn append(&self, request: &Request, response: &Response, host: &str) -> u64;

    /// Looks up a previously appended exchange.
    fn get(&self, id: u64) -> Option<RequestLogEntry>;
}

/// `RequestLog` kept in memory for the lifetime of the scan.
#[derive(Debug)]
pub struct InMemoryRequestLog {
    next_id: AtomicU64,
    entries: DashMap<u64, RequestLogEntry>,
}

impl InMemoryRequestLog {
    pub fn new() -> Self {
        InMemoryRequestLog {
            next_id: AtomicU64::new(1),
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InMemoryRequestLog {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestLog for InMemoryRequestLog {
    fn append(&self, request: &Request, response: &Response, host: &str) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        trace!("Logging exchange {} for {}", id, request.url);
        self.entries.insert(
            id,
            RequestLogEntry {
                id,
                host: host.to_string(),
                request: request.clone(),
                response: response.clone(),
            },
        );
        id
    }

    fn get(&self, id: u64) -> Option<RequestLogEntry> {
        self.entries.get(&id).map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use url::Url;

    #[test]
    fn test_ids_are_unique_under_contention() {
        let log = InMemoryRequestLog::new();
        let url = Url::parse("http://example.com/").unwrap();
        let request = Request::get(url.clone());
        let response = Response::new(url, 200, "ok");

        let ids: Vec<u64> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| scope.spawn(|| log.append(&request, &response, "example.com")))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 16);
        assert_eq!(log.len(), 16);
        let entry = log.get(ids[0]).unwrap();
        assert_eq!(entry.host, "example.com");
        assert_eq!(entry.response.status, 200);
    }
}
