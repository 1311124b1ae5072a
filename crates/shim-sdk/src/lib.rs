//! Shim SDK - one native-extension API over every engine revision
//!
//! Native extensions are written once against this crate and run unmodified
//! on engines implementing either native calling convention:
//! - **Values**: tagged handles with explicit ownership (`value` module)
//! - **Contexts**: per-call scope and exception trap (`context` module)
//! - **Functions**: registration and re-entrant calls (`function` module),
//!   bridged to each revision by the `adapter` module
//! - **Unpacking**: typed argument extraction (`unpack` module)
//! - **Persistents**: long-lived and weak handles (`persistent` module)
//! - **Work**: background computation with engine-thread completion (`work` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use shim_sdk::{Context, CallArgs, FunctionSpec, Unpack, Value};
//!
//! fn add(ctx: &Context, args: &mut CallArgs) -> bool {
//!     let (mut a, mut b) = (0i64, 0i64);
//!     if !Unpack::new().integer(&mut a).integer(&mut b).apply(ctx, args) {
//!         return false;
//!     }
//!     args.set_return(ctx.number_new((a + b) as f64));
//!     true
//! }
//!
//! fn init(ctx: &Context, exports: &Value, _module: &Value) -> bool {
//!     ctx.obj_set_funcs(exports, &[FunctionSpec::new("add", add, 2)])
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Engine surface
// ============================================================================

/// Native ABI types for both engine revisions
pub mod sys;

/// The engine interface the shim is written against
pub mod engine;

// ============================================================================
// Core Modules
// ============================================================================

/// Tagged values and type checks
pub mod value;

/// Per-call context
pub mod context;

/// Error construction and the exception trap
pub mod error;

mod convert;
mod property;

/// Native function registration and invocation
pub mod function;

/// Calling-convention adapters
pub mod adapter;

/// Argument unpacking
pub mod unpack;

/// Persistent and weak handles
pub mod persistent;

/// Background work
pub mod work;

/// Module initialization
pub mod module;

// ============================================================================
// Re-exports
// ============================================================================

pub use adapter::{callback_for, legacy_entry, modern_entry};
pub use context::Context;
pub use convert::{int32_of, uint32_of};
pub use engine::Engine;
pub use error::{format_message, ShimError, ShimResult, ERROR_LENGTH};
pub use function::{CallArgs, FunctionHolder, FunctionSpec, NativeFn};
pub use module::{module_initialize, ModuleInit};
pub use persistent::{Persistent, WeakCallback};
pub use property::PRIVATE_KEY;
pub use sys::{
    EngineResult, ErrorKind, NativeCallback, PersistentId, PropertyKey, RawHandle, Revision,
    ScopeId, WorkStatus,
};
pub use unpack::{unpack_one, Slot, Unpack};
pub use value::{Ownership, TypeTag, Value};
pub use work::queue_work;
