//! Scan-wide collaborators and the alert publication path.

use crate::alert::{AlertStore, AlertValue, MESSAGE_PROPERTY, PublishOutcome};
use crate::diagnostics::DiagnosticSink;
use crate::http::{Request, Response};
use crate::request_log::RequestLog;
use crate::stats::ScanStats;
use std::sync::Arc;
use tracing::trace;

/// The durable stores of a scan plus its diagnostics sink and statistics.
///
/// Cloning is cheap; every clone refers to the same stores.
#[derive(Clone)]
pub struct Workspace {
    alert_store: Arc<dyn AlertStore>,
    request_log: Arc<dyn RequestLog>,
    diagnostics: Arc<dyn DiagnosticSink>,
    stats: Arc<ScanStats>,
}

impl Workspace {
    pub fn new(
        alert_store: Arc<dyn AlertStore>,
        request_log: Arc<dyn RequestLog>,
        diagnostics: Arc<dyn DiagnosticSink>,
        stats: Arc<ScanStats>,
    ) -> Self {
        Workspace {
            alert_store,
            request_log,
            diagnostics,
            stats,
        }
    }

    pub fn alert_store(&self) -> &Arc<dyn AlertStore> {
        &self.alert_store
    }

    pub fn request_log(&self) -> &Arc<dyn RequestLog> {
        &self.request_log
    }

    pub fn diagnostics(&self) -> &Arc<dyn DiagnosticSink> {
        &self.diagnostics
    }

    pub fn stats(&self) -> &Arc<ScanStats> {
        &self.stats
    }

    /// Publishes an alert on behalf of a response-processing module.
    #[allow(clippy::too_many_arguments)]
    pub fn publish_alert(
        &self,
        scan_id: u64,
        alert_type: &str,
        key: Option<&str>,
        message: Option<&str>,
        request: &Request,
        response: &Response,
        properties: &[(&str, AlertValue)],
    ) -> PublishOutcome {
        self.diagnostics.debug(&format!(
            "Publishing Alert: ({}) [{}] {}",
            alert_type,
            request.uri(),
            message.unwrap_or("")
        ));
        self.commit_alert(scan_id, alert_type, key, message, request, response, properties)
    }

    /// Deduplicates and stores an alert.
    ///
    /// The key check, the request-log append and the insert all happen while the
    /// store's lock is held, so concurrent publishers with the same key produce
    /// exactly one alert.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn commit_alert(
        &self,
        scan_id: u64,
        alert_type: &str,
        key: Option<&str>,
        message: Option<&str>,
        request: &Request,
        response: &Response,
        properties: &[(&str, AlertValue)],
    ) -> PublishOutcome {
        let mut tx = self.alert_store.lock();

        if let Some(key) = key {
            if tx.has_alert_key(scan_id, key) {
                trace!("Alert with key '{}' already present, suppressing", key);
                self.stats.increment_alerts_suppressed();
                return PublishOutcome::Suppressed;
            }
        }

        let request_id = self.request_log.append(request, response, &response.host());
        let mut alert = tx.create_alert(alert_type, key, scan_id, request_id);

        for (name, value) in properties {
            if name.trim().is_empty() {
                self.diagnostics
                    .warn("Property key passed to publish_alert() is blank, skipping");
                continue;
            }
            alert.set_property(name, value.clone());
        }
        if let Some(message) = message {
            alert.set_property(MESSAGE_PROPERTY, AlertValue::from(message));
        }

        tx.add_alert(alert);
        self.stats.increment_alerts_published();
        PublishOutcome::Published { request_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::InMemoryAlertStore;
    use crate::diagnostics::RecordingSink;
    use crate::request_log::InMemoryRequestLog;
    use std::sync::atomic::Ordering;
    use url::Url;

    fn workspace() -> (Workspace, Arc<InMemoryAlertStore>, Arc<RecordingSink>) {
        let store = Arc::new(InMemoryAlertStore::new());
        let sink = Arc::new(RecordingSink::new());
        let workspace = Workspace::new(
            store.clone(),
            Arc::new(InMemoryRequestLog::new()),
            sink.clone(),
            Arc::new(ScanStats::new()),
        );
        (workspace, store, sink)
    }

    fn exchange() -> (Request, Response) {
        let url = Url::parse("http://example.com/search?q=test").unwrap();
        (Request::get(url.clone()), Response::new(url, 200, "<html></html>"))
    }

    #[test]
    fn test_keyed_publish_is_deduplicated() {
        let (workspace, store, _) = workspace();
        let (req, res) = exchange();

        let first = workspace.publish_alert(1, "xss", Some("xss:q"), Some("reflected"), &req, &res, &[]);
        let second = workspace.publish_alert(1, "xss", Some("xss:q"), Some("reflected"), &req, &res, &[]);

        assert!(matches!(first, PublishOutcome::Published { .. }));
        assert_eq!(second, PublishOutcome::Suppressed);
        assert_eq!(store.alerts(1).len(), 1);
        assert_eq!(workspace.stats().alerts_suppressed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unkeyed_publish_is_never_deduplicated() {
        let (workspace, store, _) = workspace();
        let (req, res) = exchange();

        workspace.publish_alert(1, "info", None, None, &req, &res, &[]);
        workspace.publish_alert(1, "info", None, None, &req, &res, &[]);
        assert_eq!(store.alerts(1).len(), 2);
    }

    #[test]
    fn test_blank_property_key_is_skipped_with_warning() {
        let (workspace, store, sink) = workspace();
        let (req, res) = exchange();

        let outcome = workspace.publish_alert(
            4,
            "xss",
            None,
            Some("payload echoed"),
            &req,
            &res,
            &[("param", "q".into()), ("  ", "dropped".into()), ("status", 200u16.into())],
        );

        let PublishOutcome::Published { request_id } = outcome else {
            panic!("expected the alert to be published");
        };
        let alerts = store.alerts(4);
        let alert = &alerts[0];
        assert_eq!(alert.request_id, request_id);
        assert_eq!(alert.properties.len(), 3);
        assert_eq!(alert.property("param"), Some(&AlertValue::String("q".into())));
        assert_eq!(alert.message(), Some("payload echoed"));
        assert_eq!(sink.warnings().len(), 1);
    }

    #[test]
    fn test_concurrent_publishers_create_exactly_one_alert() {
        let (workspace, store, _) = workspace();
        let (req, res) = exchange();

        let outcomes: Vec<PublishOutcome> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        workspace.publish_alert(9, "sqli", Some("sqli:id"), None, &req, &res, &[])
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let published = outcomes
            .iter()
            .filter(|o| matches!(o, PublishOutcome::Published { .. }))
            .count();
        assert_eq!(published, 1);
        assert_eq!(store.alerts(9).len(), 1);
    }
}
