//! Engine configuration
//!
//! Options come from code (`EngineOptions { .. }`) or from the environment:
//!
//! | variable               | values             | default  |
//! |------------------------|--------------------|----------|
//! | `SHIM_ENGINE_REVISION` | `legacy`, `modern` | `modern` |
//! | `SHIM_THREADPOOL_SIZE` | 1..=128            | 4        |

use once_cell::sync::Lazy;
use shim_sdk::Revision;

use crate::error::{EngineError, EngineSetupResult};

/// Environment variable selecting the native API revision.
pub const REVISION_VAR: &str = "SHIM_ENGINE_REVISION";

/// Environment variable sizing the work pool.
pub const THREADPOOL_VAR: &str = "SHIM_THREADPOOL_SIZE";

/// Default number of work pool threads.
pub const DEFAULT_THREADPOOL_SIZE: usize = 4;

/// Upper bound on work pool threads.
pub const MAX_THREADPOOL_SIZE: usize = 128;

static ENV_OPTIONS: Lazy<EngineOptions> = Lazy::new(|| match EngineOptions::from_env() {
    Ok(options) => options,
    Err(err) => {
        log::warn!("{}; using default engine options", err);
        EngineOptions::default()
    }
});

/// Configuration for an [`crate::Isolate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Native calling convention the isolate accepts
    pub revision: Revision,
    /// Number of work pool threads
    pub threadpool_size: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            revision: Revision::Modern,
            threadpool_size: DEFAULT_THREADPOOL_SIZE,
        }
    }
}

impl EngineOptions {
    /// Options with the given revision and default pool size
    pub fn with_revision(revision: Revision) -> Self {
        Self {
            revision,
            ..Self::default()
        }
    }

    /// Read options from the environment
    pub fn from_env() -> EngineSetupResult<Self> {
        let revision = std::env::var(REVISION_VAR).ok();
        let threads = std::env::var(THREADPOOL_VAR).ok();
        Self::from_vars(revision.as_deref(), threads.as_deref())
    }

    /// Check the values a caller may have set by hand
    pub fn validate(&self) -> EngineSetupResult<()> {
        if !(1..=MAX_THREADPOOL_SIZE).contains(&self.threadpool_size) {
            return Err(EngineError::InvalidOption {
                name: THREADPOOL_VAR,
                value: self.threadpool_size.to_string(),
            });
        }
        Ok(())
    }

    /// Environment options, read once per process
    pub fn from_env_cached() -> Self {
        *ENV_OPTIONS
    }

    /// Build options from raw variable values; `None` means unset
    pub fn from_vars(revision: Option<&str>, threads: Option<&str>) -> EngineSetupResult<Self> {
        let mut options = Self::default();
        if let Some(value) = revision {
            options.revision = parse_revision(value)?;
        }
        if let Some(value) = threads {
            options.threadpool_size = parse_threadpool_size(value)?;
        }
        Ok(options)
    }
}

/// Parse a revision name, case-insensitively
pub fn parse_revision(value: &str) -> EngineSetupResult<Revision> {
    match value.trim().to_ascii_lowercase().as_str() {
        "legacy" => Ok(Revision::Legacy),
        "modern" => Ok(Revision::Modern),
        _ => Err(EngineError::InvalidOption {
            name: REVISION_VAR,
            value: value.to_string(),
        }),
    }
}

fn parse_threadpool_size(value: &str) -> EngineSetupResult<usize> {
    match value.trim().parse::<usize>() {
        Ok(n) if (1..=MAX_THREADPOOL_SIZE).contains(&n) => Ok(n),
        _ => Err(EngineError::InvalidOption {
            name: THREADPOOL_VAR,
            value: value.to_string(),
        }),
    }
}
