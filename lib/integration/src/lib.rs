//! Connector adapters for switchyard.
//!
//! This crate provides:
//!
//! - **Adapter trait**: the single execution interface every connector
//!   exposes to the workflow engine
//! - **Adapter factory**: a registration table built from resolved
//!   connector versions
//! - **Credential lookup**: tenant-scoped credential access for adapters
//! - **Built-in adapters**: manual trigger, transform, notification, and
//!   HTTP request

pub mod adapter;
pub mod adapters;
pub mod credential;
pub mod error;
pub mod factory;

#[cfg(test)]
pub(crate) mod test_support;

pub use adapter::{Adapter, AdapterInfo, AdapterResult, ExecutionContext, RunMetadata};
pub use credential::{CredentialData, CredentialLookup, CredentialType, InMemoryCredentialStore};
pub use error::{AdapterError, CredentialError, FactoryError};
pub use factory::{AdapterCatalog, AdapterConstructor, AdapterFactory, BuiltinServices};
