//! Alerts and the scan-wide alert store.
//!
//! The store is shared by every check module of a scan. Deduplication relies on
//! its exclusive lock: the "does this key exist" check and the insert have to
//! happen under one `AlertTransaction`, otherwise two modules racing on the same
//! key would both pass the check.

use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::collections::HashSet;

/// Reserved property under which the alert message is stored.
pub const MESSAGE_PROPERTY: &str = "message";

/// A property value attached to an alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AlertValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// Anything else, carried as structured JSON.
    Opaque(serde_json::Value),
}

impl AlertValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AlertValue::String(value) => Some(value),
            _ => None,
        }
    }
}

impl From<&str> for AlertValue {
    fn from(value: &str) -> Self {
        AlertValue::String(value.to_string())
    }
}

impl From<String> for AlertValue {
    fn from(value: String) -> Self {
        AlertValue::String(value)
    }
}

impl From<i64> for AlertValue {
    fn from(value: i64) -> Self {
        AlertValue::Integer(value)
    }
}

impl From<i32> for AlertValue {
    fn from(value: i32) -> Self {
        AlertValue::Integer(i64::from(value))
    }
}

impl From<u16> for AlertValue {
    fn from(value: u16) -> Self {
        AlertValue::Integer(i64::from(value))
    }
}

impl From<f64> for AlertValue {
    fn from(value: f64) -> Self {
        AlertValue::Float(value)
    }
}

impl From<bool> for AlertValue {
    fn from(value: bool) -> Self {
        AlertValue::Bool(value)
    }
}

impl From<serde_json::Value> for AlertValue {
    fn from(value: serde_json::Value) -> Self {
        AlertValue::Opaque(value)
    }
}

/// A published finding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub alert_type: String,
    pub key: Option<String>,
    pub scan_id: u64,
    pub request_id: u64,
    /// Insertion-ordered properties. Setting an existing name replaces its value in place.
    pub properties: Vec<(String, AlertValue)>,
}

impl Alert {
    pub fn new(alert_type: &str, key: Option<&str>, scan_id: u64, request_id: u64) -> Self {
        Alert {
            alert_type: alert_type.to_string(),
            key: key.map(str::to_string),
            scan_id,
            request_id,
            properties: Vec::new(),
        }
    }

    pub fn set_property(&mut self, name: &str, value: AlertValue) {
        match self.properties.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => self.properties.push((name.to_string(), value)),
        }
    }

    pub fn property(&self, name: &str) -> Option<&AlertValue> {
        self.properties
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn message(&self) -> Option<&str> {
        self.property(MESSAGE_PROPERTY).and_then(AlertValue::as_str)
    }
}

/// Result of a publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The alert was stored; `request_id` references the logged exchange.
    Published { request_id: u64 },
    /// An alert with the same dedup key already exists for this scan.
    Suppressed,
}

/// Operations available while holding the alert store's exclusive lock.
/// Dropping the transaction releases the lock.
pub trait AlertTransaction {
    fn has_alert_key(&self, scan_id: u64, key: &str) -> bool;

    fn create_alert(
        &self,
        alert_type: &str,
        key: Option<&str>,
        scan_id: u64,
        request_id: u64,
    ) -> Alert;

    fn add_alert(&mut self, alert: Alert);
}

/// Scan-wide alert storage.
pub trait AlertStore: Send + Sync {
    /// Acquires the exclusive lock.
    fn lock(&self) -> Box<dyn AlertTransaction + '_>;

    /// Reads back the alerts of a scan. Not synchronized with in-flight publishes.
    fn alerts(&self, scan_id: u64) -> Vec<Alert>;
}

#[derive(Debug, Default)]
struct AlertTable {
    alerts: Vec<Alert>,
    keys: HashSet<(u64, String)>,
}

/// `AlertStore` kept in memory, guarded by a `parking_lot::Mutex`.
#[derive(Debug, Default)]
pub struct InMemoryAlertStore {
    table: Mutex<AlertTable>,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored alerts across all scans.
    pub fn len(&self) -> usize {
        self.table.lock().alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct InMemoryTransaction<'a> {
    table: MutexGuard<'a, AlertTable>,
}

impl AlertTransaction for InMemoryTransaction<'_> {
    fn has_alert_key(&self, scan_id: u64, key: &str) -> bool {
        self.table.keys.contains(&(scan_id, key.to_string()))
    }

    fn create_alert(
        &self,
        alert_type: &str,
        key: Option<&str>,
        scan_id: u64,
        request_id: u64,
    ) -> Alert {
        Alert::new(alert_type, key, scan_id, request_id)
    }

    fn add_alert(&mut self, alert: Alert) {
        if let Some(key) = &alert.key {
            self.table.keys.insert((alert.scan_id, key.clone()));
        }
        self.table.alerts.push(alert);
    }
}

impl AlertStore for InMemoryAlertStore {
    fn lock(&self) -> Box<dyn AlertTransaction + '_> {
        Box::new(InMemoryTransaction {
            table: self.table.lock(),
        })
    }

    fn alerts(&self, scan_id: u64) -> Vec<Alert> {
        self.table
            .lock()
            .alerts
            .iter()
            .filter(|alert| alert.scan_id == scan_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_keep_insertion_order() {
        let mut alert = Alert::new("xss", None, 1, 10);
        alert.set_property("param", "q".into());
        alert.set_property("status", 200u16.into());
        alert.set_property("param", "id".into());
        assert_eq!(alert.properties.len(), 2);
        assert_eq!(alert.properties[0].0, "param");
        assert_eq!(alert.property("param"), Some(&AlertValue::String("id".into())));
        assert_eq!(alert.message(), None);
    }

    #[test]
    fn test_keys_are_scoped_per_scan() {
        let store = InMemoryAlertStore::new();
        {
            let mut tx = store.lock();
            let alert = tx.create_alert("sqli", Some("sqli:/item"), 1, 1);
            tx.add_alert(alert);
        }
        let tx = store.lock();
        assert!(tx.has_alert_key(1, "sqli:/item"));
        assert!(!tx.has_alert_key(2, "sqli:/item"));
        drop(tx);
        assert_eq!(store.alerts(1).len(), 1);
        assert!(store.alerts(2).is_empty());
    }

    #[test]
    fn test_alert_serializes_values_untagged() {
        let mut alert = Alert::new("vinfo-metatags", None, 3, 7);
        alert.set_property("resource", "/index.html".into());
        alert.set_property("count", 2i64.into());
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["properties"][0][1], "/index.html");
        assert_eq!(json["properties"][1][1], 2);
    }
}
