//! Adapter registration table.
//!
//! An [`AdapterCatalog`] lists the adapter implementations compiled into the
//! process and the connector versions each supports. [`AdapterFactory`] is
//! configured once from a successful resolution: it picks, for every
//! resolved connector, the implementation supporting the resolved version.
//! The factory itself never resolves versions.

use crate::adapter::Adapter;
use crate::adapters::{
    HttpRequestAdapter, ManualTriggerAdapter, NotificationSink, SendNotificationAdapter,
    TransformAdapter, http, notification, transform, trigger,
};
use crate::credential::CredentialLookup;
use crate::error::FactoryError;
use rootcause::prelude::Report;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use switchyard_resolver::{ConnectorId, ResolutionResult, Version, VersionRange};
use tracing::{debug, instrument};

/// Builds an adapter for a resolved connector version.
pub type AdapterConstructor = Arc<dyn Fn(&Version) -> Arc<dyn Adapter> + Send + Sync>;

struct CatalogEntry {
    supports: VersionRange,
    construct: AdapterConstructor,
}

/// Shared services the built-in adapters depend on.
#[derive(Clone)]
pub struct BuiltinServices {
    pub credentials: Arc<dyn CredentialLookup>,
    pub notifications: Arc<dyn NotificationSink>,
    pub http: reqwest::Client,
}

/// The adapter implementations available to this process.
#[derive(Default)]
pub struct AdapterCatalog {
    entries: BTreeMap<ConnectorId, Vec<CatalogEntry>>,
}

impl fmt::Debug for AdapterCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(id, entries)| {
                let ranges: Vec<String> = entries.iter().map(|e| e.supports.to_string()).collect();
                (id, ranges)
            }))
            .finish()
    }
}

impl AdapterCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an implementation for the connector versions in `supports`.
    ///
    /// Earlier registrations win when ranges overlap.
    #[must_use]
    pub fn register(
        mut self,
        connector: impl Into<ConnectorId>,
        supports: VersionRange,
        construct: AdapterConstructor,
    ) -> Self {
        self.entries
            .entry(connector.into())
            .or_default()
            .push(CatalogEntry {
                supports,
                construct,
            });
        self
    }

    /// The catalog of built-in adapters, all supporting `^1.0.0`.
    #[must_use]
    pub fn builtin(services: BuiltinServices) -> Self {
        let v1 = || VersionRange::caret(&Version::new(1, 0, 0));
        let BuiltinServices {
            credentials,
            notifications,
            http: client,
        } = services;

        Self::new()
            .register(
                trigger::CONNECTOR_ID,
                v1(),
                Arc::new(|version: &Version| {
                    Arc::new(ManualTriggerAdapter::new(version.clone())) as Arc<dyn Adapter>
                }),
            )
            .register(
                transform::CONNECTOR_ID,
                v1(),
                Arc::new(|version: &Version| {
                    Arc::new(TransformAdapter::new(version.clone())) as Arc<dyn Adapter>
                }),
            )
            .register(
                notification::CONNECTOR_ID,
                v1(),
                Arc::new(move |version: &Version| {
                    Arc::new(SendNotificationAdapter::new(
                        version.clone(),
                        Arc::clone(&notifications),
                    )) as Arc<dyn Adapter>
                }),
            )
            .register(
                http::CONNECTOR_ID,
                v1(),
                Arc::new(move |version: &Version| {
                    Arc::new(HttpRequestAdapter::new(
                        version.clone(),
                        client.clone(),
                        Arc::clone(&credentials),
                    )) as Arc<dyn Adapter>
                }),
            )
    }

    /// Returns true if any implementation supports this connector version.
    #[must_use]
    pub fn supports(&self, connector: &str, version: &Version) -> bool {
        self.find(connector, version).is_some()
    }

    /// Connector ids with at least one implementation.
    pub fn connector_ids(&self) -> impl Iterator<Item = &ConnectorId> {
        self.entries.keys()
    }

    fn find(&self, connector: &str, version: &Version) -> Option<&CatalogEntry> {
        self.entries
            .get(connector)?
            .iter()
            .find(|entry| entry.supports.matches(version))
    }
}

struct Registration {
    version: Version,
    adapter: Arc<dyn Adapter>,
}

/// Maps node types to ready-to-run adapters.
#[derive(Default)]
pub struct AdapterFactory {
    adapters: BTreeMap<String, Registration>,
}

impl fmt::Debug for AdapterFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.adapters
                    .iter()
                    .map(|(id, registration)| (id, registration.version.to_string())),
            )
            .finish()
    }
}

impl AdapterFactory {
    /// Creates an empty factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the table from a successful resolution.
    ///
    /// # Errors
    ///
    /// Returns `ResolutionFailed` if the resolution did not succeed, or
    /// `Unsupported` if a resolved connector version has no implementation
    /// in the catalog.
    #[instrument(skip_all, fields(resolved = resolution.resolved_versions.len()))]
    pub fn configure(
        resolution: &ResolutionResult,
        catalog: &AdapterCatalog,
    ) -> Result<Self, Report<FactoryError>> {
        if !resolution.success {
            return Err(FactoryError::ResolutionFailed {
                message: resolution
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "unknown failure".to_string()),
            }
            .into());
        }

        let mut factory = Self::new();
        for (connector, version) in &resolution.resolved_versions {
            let entry = catalog.find(connector.as_str(), version).ok_or_else(|| {
                FactoryError::Unsupported {
                    connector: connector.to_string(),
                    version: version.to_string(),
                }
            })?;
            factory = factory.with_adapter(connector.as_str(), version.clone(), (entry.construct)(version));
            debug!(%connector, %version, "adapter registered");
        }
        Ok(factory)
    }

    /// Registers an adapter directly.
    #[must_use]
    pub fn with_adapter(
        mut self,
        node_type: impl Into<String>,
        version: Version,
        adapter: Arc<dyn Adapter>,
    ) -> Self {
        self.adapters
            .insert(node_type.into(), Registration { version, adapter });
        self
    }

    /// Returns the adapter for a node type.
    #[must_use]
    pub fn create(&self, node_type: &str) -> Option<Arc<dyn Adapter>> {
        self.adapters
            .get(node_type)
            .map(|registration| Arc::clone(&registration.adapter))
    }

    /// Returns true if an adapter is registered for the node type.
    #[must_use]
    pub fn is_available(&self, node_type: &str) -> bool {
        self.adapters.contains_key(node_type)
    }

    /// All registered node types, sorted.
    #[must_use]
    pub fn available_types(&self) -> Vec<&str> {
        self.adapters.keys().map(String::as_str).collect()
    }

    /// The connector version an adapter was built for.
    #[must_use]
    pub fn version_of(&self, node_type: &str) -> Option<&Version> {
        self.adapters
            .get(node_type)
            .map(|registration| &registration.version)
    }
}
