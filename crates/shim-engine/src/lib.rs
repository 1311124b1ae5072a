//! Shim Reference Engine
//!
//! A small embedded engine that implements [`shim_sdk::Engine`] in either
//! native API revision. It exists so extensions written against the SDK can
//! be run and tested without a production engine:
//! - **Heap**: generation-checked handle slots with mark/sweep collection (`heap`)
//! - **Isolate**: handle scopes, exceptions, persistents and weak callbacks (`isolate`)
//! - **Work pool**: named worker threads for queued blocking work (`pool`)
//! - **Options**: revision and pool size from code or the environment (`options`)
//!
//! # Example
//!
//! ```rust,ignore
//! use shim_engine::{EngineOptions, Isolate};
//! use shim_sdk::{Context, Revision};
//!
//! let isolate = Isolate::new(EngineOptions::with_revision(Revision::Legacy))?;
//! let ctx = Context::enter(&isolate);
//! let greeting = ctx.string_new_copy("hello");
//! assert_eq!(ctx.string_value(&greeting).as_deref(), Some("hello"));
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![allow(clippy::not_unsafe_ptr_arg_deref)]

// ============================================================================
// Modules
// ============================================================================

/// Host-level error types
pub mod error;

/// Engine configuration
pub mod options;

/// Work pool threads
pub mod pool;

mod api;
mod heap;
mod isolate;
mod ops;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{EngineError, EngineSetupResult};
pub use heap::ScriptFn;
pub use isolate::{GcStats, Isolate};
pub use options::{
    parse_revision, EngineOptions, DEFAULT_THREADPOOL_SIZE, MAX_THREADPOOL_SIZE, REVISION_VAR,
    THREADPOOL_VAR,
};
pub use pool::{Completion, JobId, WorkPool};
