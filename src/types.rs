//! Record types exchanged with the resolution backend and the discovery callback

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single key/value pair from a service's TXT record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxtRecord {
    /// Key
    pub key: String,
    /// Value; `None` for a boolean (key-only) attribute
    pub value: Option<String>,
}

impl TxtRecord {
    /// Create a key/value TXT entry
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// Create a key-only TXT entry
    pub fn flag(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }
}

impl fmt::Display for TxtRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={}", self.key, value),
            None => write!(f, "{}", self.key),
        }
    }
}

impl<K: Into<String>, V: Into<String>> From<(K, V)> for TxtRecord {
    fn from((key, value): (K, V)) -> Self {
        Self::new(key, value)
    }
}

/// A raw query result as produced by the resolution backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredRecord {
    /// Service instance name (e.g. "Living Room Printer")
    pub instance_name: String,
    /// Host the instance runs on, if it could be resolved
    pub hostname: Option<String>,
    /// Service port
    pub port: u16,
    /// TXT attributes in backend order
    pub txt_records: Vec<TxtRecord>,
}

impl DiscoveredRecord {
    /// Create a record with a resolved hostname and no TXT attributes
    pub fn new(instance_name: impl Into<String>, hostname: impl Into<String>, port: u16) -> Self {
        Self {
            instance_name: instance_name.into(),
            hostname: Some(hostname.into()),
            port,
            txt_records: Vec::new(),
        }
    }

    /// Drop the hostname, as for a record whose host never resolved
    pub fn without_hostname(mut self) -> Self {
        self.hostname = None;
        self
    }

    /// Attach TXT attributes
    pub fn with_txt_records(mut self, txt_records: Vec<TxtRecord>) -> Self {
        self.txt_records = txt_records;
        self
    }

    /// View this record as a discovered service, if its hostname resolved
    pub fn to_service(&self) -> Option<DiscoveredService> {
        let hostname = self.hostname.as_deref().filter(|h| !h.is_empty())?;
        Some(DiscoveredService {
            instance_name: self.instance_name.clone(),
            hostname: hostname.to_string(),
            port: self.port,
            txt_records: self.txt_records.clone(),
        })
    }
}

/// A discovered service instance, as handed to the discovery callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredService {
    /// Service instance name
    pub instance_name: String,
    /// Host the instance runs on
    pub hostname: String,
    /// Service port
    pub port: u16,
    /// TXT attributes in backend order
    pub txt_records: Vec<TxtRecord>,
}

impl DiscoveredService {
    /// Look up a TXT value by key
    pub fn txt(&self, key: &str) -> Option<&str> {
        self.txt_records
            .iter()
            .find(|r| r.key == key)
            .and_then(|r| r.value.as_deref())
    }
}

impl fmt::Display for DiscoveredService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.instance_name, self.hostname, self.port)
    }
}

/// Split a conventional `_service._proto` string at its last dot
///
/// Returns `("_http", "_tcp")` for `"_http._tcp"`. The protocol half keeps no
/// leading dot.
pub fn split_service_type(full: &str) -> Option<(&str, &str)> {
    let (service, protocol) = full.rsplit_once('.')?;
    if service.is_empty() || protocol.is_empty() {
        return None;
    }
    Some((service, protocol))
}
