//! Registry of remote services.
//!
//! Services are keyed by name. The `ServiceId` a service sends is stored as an
//! attribute but never used for lookup, so a service that restarts with a new
//! id still maps onto its existing record.

use crate::envelope::{ServiceId, ServiceMeta};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

/// One registered remote handler process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    pub id: ServiceId,
    pub version: String,
    pub description: String,
    pub online: bool,
    pub last_ping: Option<DateTime<Utc>>,
    pub last_pong: Option<DateTime<Utc>>,
    pub responded_count: u64,
}

impl Service {
    pub fn new(name: impl Into<String>, id: ServiceId, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id,
            version: version.into(),
            description: String::new(),
            online: false,
            last_ping: None,
            last_pong: None,
            responded_count: 0,
        }
    }
}

impl From<&ServiceMeta> for Service {
    fn from(meta: &ServiceMeta) -> Self {
        Self {
            description: meta.description.clone(),
            ..Self::new(meta.name.clone(), meta.id, meta.version.clone())
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.online { "online" } else { "offline" };
        write!(f, "{} ({})", self.name, state)
    }
}

/// What `register` did with the offered record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// First registration under this name.
    Inserted,
    /// The name was already known; the existing record was flipped online.
    Reonlined,
}

/// Thread-safe map of known services.
///
/// Lookups share a read lock; every mutation takes the write lock for the
/// duration of a single map operation. No lock is held across an `.await`.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, Service>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service, or bring an existing record with the same name
    /// back online.
    ///
    /// Re-registration keeps the existing record (including its response
    /// count); the offered record is discarded.
    pub fn register(&self, mut service: Service) -> RegisterOutcome {
        let mut services = self.services.write();
        if let Some(existing) = services.get_mut(&service.name) {
            existing.online = true;
            info!(service = %existing.name, "Service already registered, marked online");
            return RegisterOutcome::Reonlined;
        }

        service.online = true;
        info!(
            service = %service.name,
            id = %service.id,
            version = %service.version,
            "Service registered"
        );
        services.insert(service.name.clone(), service);
        RegisterOutcome::Inserted
    }

    /// Snapshot of the record for `name`.
    pub fn lookup(&self, name: &str) -> Option<Service> {
        self.services.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.read().contains_key(name)
    }

    /// Record that a heartbeat was sent to `name`.
    ///
    /// Returns `false` (and does nothing) if the service is unknown.
    pub fn record_ping(&self, name: &str, at: DateTime<Utc>) -> bool {
        self.update(name, "ping", |service| service.last_ping = Some(at))
    }

    /// Record a heartbeat reply from `name`.
    pub fn record_pong(&self, name: &str, at: DateTime<Utc>) -> bool {
        self.update(name, "pong", |service| service.last_pong = Some(at))
    }

    /// Count one completed round trip for `name`.
    pub fn increment_responded(&self, name: &str) -> bool {
        self.update(name, "responded", |service| service.responded_count += 1)
    }

    /// Mark a service offline. Used by an external liveness monitor; the
    /// registry itself never expires services.
    pub fn mark_offline(&self, name: &str) -> bool {
        self.update(name, "offline", |service| service.online = false)
    }

    /// Names of all known services, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of every service currently marked online.
    pub fn online(&self) -> Vec<Service> {
        self.services
            .read()
            .values()
            .filter(|service| service.online)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }

    fn update(&self, name: &str, event: &'static str, f: impl FnOnce(&mut Service)) -> bool {
        let mut services = self.services.write();
        match services.get_mut(name) {
            Some(service) => {
                f(service);
                true
            }
            None => {
                debug!(service = %name, event, "Heartbeat update for unknown service ignored");
                false
            }
        }
    }
}
