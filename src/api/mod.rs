//! Purpose: Host-side API for loading components and calling into them.
//! Exports: component loading, sync and async dispatch, object wrappers, callback support.
//! Role: Public surface used by bindings; native-side helpers live in `native`.
//! Invariants: Nothing here calls a component before its contract has been verified.
mod call;
mod callback;
mod cleaner;
mod component;
mod future;
mod object;

pub use crate::core::buffer::{BufferAllocator, ForeignBytes, LocalAllocator, RustBuffer};
pub use crate::core::checksum::{ComponentDef, Contract};
pub use crate::core::config::{CleanerKind, RuntimeConfig};
pub use crate::core::convert::FfiConverter;
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{CallError, Error, ErrorKind};
pub use crate::core::status::{CallStatus, ForeignFuture, ForeignFutureResult};
pub use call::{rust_call, rust_call_with_error};
pub use callback::{
    CallbackRegistry, callback_runtime, foreign_future_free, handle_callback,
    pending_foreign_futures, register_vtable, spawn_foreign_future,
};
pub use cleaner::{Cleanable, Cleaner, InlineCleaner, ThreadCleaner, cleaner_for};
pub use component::{
    BufferOps, Component, ComponentCell, DylibSource, StaticSymbols, SymbolSource,
    platform_library_name, resolve_symbol, verify_contract,
};
pub use future::{
    AsyncEntryPoints, continuation_callback, pending_continuations, rust_call_async,
    rust_call_async_infallible,
};
pub use object::{ClonedHandle, ForeignObject, ObjectCloneFn, ObjectFreeFn, ObjectVTable};
