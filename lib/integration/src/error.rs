//! Error types for the integration crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `AdapterError`: failures reported by an adapter's execution
//! - `CredentialError`: failures looking up tenant credentials
//! - `FactoryError`: configuration errors building the adapter table

use switchyard_core::{CredentialId, TenantId};
use std::fmt;

/// Errors from adapter execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// The node config is missing a field or has the wrong shape.
    InvalidConfig { reason: String },
    /// Connection to the external service failed.
    ConnectionFailed { reason: String },
    /// Credentials were missing, expired, or rejected.
    AuthenticationFailed { reason: String },
    /// The external service answered with a failure status.
    RequestFailed { status: u16, reason: String },
    /// Delivery through a sink failed.
    DeliveryFailed { reason: String },
    /// Timeout waiting for the external service.
    Timeout,
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { reason } => write!(f, "invalid node config: {reason}"),
            Self::ConnectionFailed { reason } => write!(f, "connection failed: {reason}"),
            Self::AuthenticationFailed { reason } => {
                write!(f, "authentication failed: {reason}")
            }
            Self::RequestFailed { status, reason } => {
                write!(f, "request failed with status {status}: {reason}")
            }
            Self::DeliveryFailed { reason } => write!(f, "delivery failed: {reason}"),
            Self::Timeout => write!(f, "operation timed out"),
        }
    }
}

impl std::error::Error for AdapterError {}

/// Errors from credential lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// No credential with this id exists for the tenant.
    NotFound { id: CredentialId, tenant_id: TenantId },
    /// Stored credential data could not be decoded.
    InvalidFormat { reason: String },
    /// The backing store failed.
    StorageFailed { reason: String },
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { id, tenant_id } => {
                write!(f, "credential {id} not found for tenant {tenant_id}")
            }
            Self::InvalidFormat { reason } => write!(f, "invalid credential format: {reason}"),
            Self::StorageFailed { reason } => {
                write!(f, "credential storage failed: {reason}")
            }
        }
    }
}

impl std::error::Error for CredentialError {}

/// Errors from configuring the adapter factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactoryError {
    /// The resolution the factory was asked to configure from had failed.
    ResolutionFailed { message: String },
    /// A resolved connector version has no adapter implementation.
    Unsupported { connector: String, version: String },
}

impl fmt::Display for FactoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResolutionFailed { message } => {
                write!(f, "cannot configure adapters from a failed resolution: {message}")
            }
            Self::Unsupported { connector, version } => {
                write!(f, "no adapter implementation supports {connector}@{version}")
            }
        }
    }
}

impl std::error::Error for FactoryError {}
