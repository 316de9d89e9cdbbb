//! Backend registry.
//!
//! # Responsibilities
//! - Map a logical service name to its base URL
//! - Accept registrations and deregistrations at runtime
//! - Re-seed from configuration on reload
//!
//! The forwarding path only ever calls [`BackendRegistry::resolve`].

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use url::Url;

use crate::config::ServiceConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("service name must not be empty")]
    EmptyName,

    #[error("invalid service url '{0}'")]
    InvalidUrl(String),

    #[error("service '{0}' is not registered")]
    NotRegistered(String),
}

/// Name → base URL lookup shared by every request handler.
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    services: Arc<DashMap<String, Url>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configured services, skipping unparsable URLs.
    pub fn from_config(services: &[ServiceConfig]) -> Self {
        let registry = Self::new();
        registry.seed(services);
        registry
    }

    pub fn resolve(&self, service: &str) -> Option<Url> {
        self.services.get(service).map(|entry| entry.value().clone())
    }

    /// Register or replace a service. Returns the previous URL, if any.
    pub fn register(&self, service: &str, url: &str) -> Result<Option<Url>, RegistryError> {
        let service = service.trim();
        if service.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let url = parse_base_url(url).ok_or_else(|| RegistryError::InvalidUrl(url.to_string()))?;

        tracing::info!(service, url = %url, "Service registered");
        Ok(self.services.insert(service.to_string(), url))
    }

    pub fn deregister(&self, service: &str) -> Result<Url, RegistryError> {
        let (_, url) = self
            .services
            .remove(service)
            .ok_or_else(|| RegistryError::NotRegistered(service.to_string()))?;
        tracing::info!(service, "Service deregistered");
        Ok(url)
    }

    /// Overwrite configured services with their configured URLs.
    ///
    /// Services registered at runtime and absent from the config are kept.
    pub fn seed(&self, services: &[ServiceConfig]) {
        for service in services {
            match parse_base_url(&service.url) {
                Some(url) => {
                    self.services.insert(service.name.clone(), url);
                }
                None => {
                    tracing::warn!(service = %service.name, url = %service.url, "Invalid service URL, not registered");
                }
            }
        }
    }

    /// Sorted snapshot of every registration.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.services
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().to_string()))
            .collect()
    }
}

/// Only plain `http` URLs with a host can be used as forwarding targets;
/// the backend client does not speak TLS.
pub(crate) fn parse_base_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw.trim()).ok()?;
    if url.scheme() == "http" && url.host().is_some() {
        Some(url)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_resolve_deregister() {
        let registry = BackendRegistry::new();
        assert!(registry.resolve("user").is_none());

        assert_eq!(registry.register("user", "http://127.0.0.1:5000"), Ok(None));
        assert_eq!(
            registry.resolve("user").map(|u| u.to_string()),
            Some("http://127.0.0.1:5000/".to_string())
        );

        let previous = registry.register("user", "http://127.0.0.1:6000").unwrap();
        assert_eq!(previous.map(|u| u.port()), Some(Some(5000)));

        assert!(registry.deregister("user").is_ok());
        assert_eq!(
            registry.deregister("user"),
            Err(RegistryError::NotRegistered("user".into()))
        );
    }

    #[test]
    fn test_rejects_bad_registrations() {
        let registry = BackendRegistry::new();
        assert_eq!(registry.register("  ", "http://a"), Err(RegistryError::EmptyName));
        assert_eq!(
            registry.register("user", "not a url"),
            Err(RegistryError::InvalidUrl("not a url".into()))
        );
        assert!(registry.register("user", "mailto:ops@example.com").is_err());
        assert!(registry.register("user", "https://user.internal").is_err());
    }

    #[test]
    fn test_seed_keeps_runtime_registrations() {
        let registry = BackendRegistry::new();
        registry.register("scores", "http://127.0.0.1:7000").unwrap();
        registry.seed(&[ServiceConfig {
            name: "user".into(),
            prefix: "/user".into(),
            url: "http://127.0.0.1:5000".into(),
        }]);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["user"], "http://127.0.0.1:5000/");
    }
}
