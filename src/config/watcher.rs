//! Configuration file watcher for hot reload.
//!
//! Only the service list is hot-reloadable, so a reload is forwarded only when
//! it changes a service. Editors typically emit several modify/create events
//! per save; the repeats load an identical service list and are dropped here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::{GatewayConfig, ServiceConfig};

/// Service-level difference between two configurations.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ServiceChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Same name, different prefix or URL.
    pub updated: Vec<String>,
}

impl ServiceChanges {
    pub fn between(current: &[ServiceConfig], next: &[ServiceConfig]) -> Self {
        let mut changes = Self::default();
        for service in next {
            match current.iter().find(|s| s.name == service.name) {
                None => changes.added.push(service.name.clone()),
                Some(previous) if previous != service => changes.updated.push(service.name.clone()),
                Some(_) => {}
            }
        }
        for service in current {
            if !next.iter().any(|s| s.name == service.name) {
                changes.removed.push(service.name.clone());
            }
        }
        changes
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

/// A watcher that monitors the configuration file for changes.
///
/// Only configurations that load and validate are forwarded; a broken edit
/// leaves the running gateway untouched.
pub struct ConfigWatcher {
    path: PathBuf,
    services: Vec<ServiceConfig>,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl ConfigWatcher {
    /// Watch `path`, comparing reloads against the services of `current`.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path, current: &GatewayConfig) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                services: current.services.clone(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self {
            path,
            mut services,
            update_tx,
        } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => match load_config(&path) {
                    Ok(next) => {
                        let changes = ServiceChanges::between(&services, &next.services);
                        if changes.is_empty() {
                            tracing::debug!(path = ?path, "Config event without service changes, ignored");
                            return;
                        }
                        tracing::info!(
                            added = ?changes.added,
                            removed = ?changes.removed,
                            updated = ?changes.updated,
                            "Config reloaded with service changes"
                        );
                        services = next.services.clone();
                        let _ = update_tx.send(next);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                    }
                },
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&watched, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?watched, "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str, url: &str) -> ServiceConfig {
        ServiceConfig {
            name: name.into(),
            prefix: format!("/{}", name),
            url: url.into(),
        }
    }

    #[test]
    fn test_identical_lists_have_no_changes() {
        let services = vec![service("user", "http://a:1"), service("competition", "http://b:2")];
        assert!(ServiceChanges::between(&services, &services).is_empty());
    }

    #[test]
    fn test_reports_added_removed_updated() {
        let current = vec![service("user", "http://a:1"), service("competition", "http://b:2")];
        let next = vec![service("user", "http://a:9"), service("scores", "http://c:3")];

        let changes = ServiceChanges::between(&current, &next);
        assert_eq!(changes.added, vec!["scores".to_string()]);
        assert_eq!(changes.removed, vec!["competition".to_string()]);
        assert_eq!(changes.updated, vec!["user".to_string()]);
    }

    #[test]
    fn test_removed_service_is_still_a_change() {
        let current = vec![service("user", "http://a:1")];
        let changes = ServiceChanges::between(&current, &[]);
        assert!(!changes.is_empty());
        assert_eq!(changes.removed, vec!["user".to_string()]);
    }
}
