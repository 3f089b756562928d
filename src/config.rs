//! Endpoint configuration.
//!
//! [`EndpointConfig`] controls request parsing (discovery path, invoke
//! segment, object key header), lock acquisition and the state store
//! backend. Defaults work out of the box; the binary reads overrides from the
//! environment with [`EndpointConfig::from_env`].
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use durable_object_endpoint::{EndpointConfig, StoreConfig};
//!
//! let config = EndpointConfig::default()
//!     .with_lock_timeout(Duration::from_secs(5))
//!     .with_store(StoreConfig::File { root: "/tmp/objects".into() });
//!
//! assert_eq!(config.lock_timeout, Some(Duration::from_secs(5)));
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::EndpointError;
use crate::state::{FileStateStore, InMemoryStateStore, SharedStateStore};

/// Environment variable naming the file store root. Unset means in-memory.
pub const STORE_DIR_ENV: &str = "DURABLE_OBJECT_STORE_DIR";
/// Environment variable holding the lock timeout in milliseconds.
pub const LOCK_TIMEOUT_ENV: &str = "DURABLE_OBJECT_LOCK_TIMEOUT_MS";
/// Environment variable overriding the object key header name.
pub const KEY_HEADER_ENV: &str = "DURABLE_OBJECT_KEY_HEADER";

/// Default path suffix that serves the discovery manifest.
pub const DEFAULT_DISCOVERY_PATH: &str = "/discover";
/// Default path segment preceding `{service}/{handler}`.
pub const DEFAULT_INVOKE_SEGMENT: &str = "invoke";
/// Default header carrying the object key.
pub const DEFAULT_OBJECT_KEY_HEADER: &str = "x-object-key";

/// State store backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StoreConfig {
    /// Process-local map; state is lost on restart.
    #[default]
    InMemory,
    /// One JSON document per object key under `root`.
    File {
        /// Directory holding the state files
        root: PathBuf,
    },
}

impl StoreConfig {
    /// Builds the configured backend.
    pub fn build(&self) -> SharedStateStore {
        match self {
            StoreConfig::InMemory => Arc::new(InMemoryStateStore::new()),
            StoreConfig::File { root } => Arc::new(FileStateStore::new(root.clone())),
        }
    }
}

/// Configuration for an [`InvocationRouter`](crate::InvocationRouter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Path suffix answered with the discovery manifest
    pub discovery_path: String,
    /// Segment that precedes `{service}/{handler}`, matched case-insensitively
    pub invoke_segment: String,
    /// Header carrying the object key, matched case-insensitively
    pub object_key_header: String,
    /// Maximum wait for an object's execution slot. `None` waits forever.
    pub lock_timeout: Option<Duration>,
    /// State store backend
    pub store: StoreConfig,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            discovery_path: DEFAULT_DISCOVERY_PATH.to_string(),
            invoke_segment: DEFAULT_INVOKE_SEGMENT.to_string(),
            object_key_header: DEFAULT_OBJECT_KEY_HEADER.to_string(),
            lock_timeout: None,
            store: StoreConfig::InMemory,
        }
    }
}

impl EndpointConfig {
    /// Sets the discovery path suffix.
    pub fn with_discovery_path(mut self, path: impl Into<String>) -> Self {
        self.discovery_path = path.into();
        self
    }

    /// Sets the invoke segment.
    pub fn with_invoke_segment(mut self, segment: impl Into<String>) -> Self {
        self.invoke_segment = segment.into();
        self
    }

    /// Sets the object key header name. Stored lowercase.
    pub fn with_object_key_header(mut self, header: impl Into<String>) -> Self {
        self.object_key_header = header.into().to_ascii_lowercase();
        self
    }

    /// Sets the lock acquisition timeout.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Sets the state store backend.
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, EndpointError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EndpointError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup(STORE_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            config = config.with_store(StoreConfig::File {
                root: PathBuf::from(dir),
            });
        }

        if let Some(raw) = lookup(LOCK_TIMEOUT_ENV).filter(|v| !v.trim().is_empty()) {
            let millis: u64 = raw.trim().parse().map_err(|_| {
                EndpointError::validation(format!(
                    "{} must be a whole number of milliseconds, got '{}'",
                    LOCK_TIMEOUT_ENV, raw
                ))
            })?;
            config = config.with_lock_timeout(Duration::from_millis(millis));
        }

        if let Some(header) = lookup(KEY_HEADER_ENV) {
            let header = header.trim();
            if header.is_empty() {
                return Err(EndpointError::validation(format!(
                    "{} must not be empty",
                    KEY_HEADER_ENV
                )));
            }
            config = config.with_object_key_header(header);
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration can route requests.
    pub fn validate(&self) -> Result<(), EndpointError> {
        if !self.discovery_path.starts_with('/') {
            return Err(EndpointError::validation(format!(
                "discovery path must start with '/', got '{}'",
                self.discovery_path
            )));
        }
        if self.invoke_segment.is_empty() || self.invoke_segment.contains('/') {
            return Err(EndpointError::validation(format!(
                "invoke segment must be a single non-empty path segment, got '{}'",
                self.invoke_segment
            )));
        }
        if self.object_key_header.is_empty() {
            return Err(EndpointError::validation("object key header must not be empty"));
        }
        if self.lock_timeout == Some(Duration::ZERO) {
            return Err(EndpointError::validation("lock timeout must be greater than zero"));
        }
        Ok(())
    }
}
