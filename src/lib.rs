//! Purpose: Runtime for calling Rust components across a C ABI and back.
//! Exports: `api` (host side), `native` (component side), `abi` (fixed entry points), `core`.
//! Role: Shared by component libraries, their host bindings, and the `uniwire` CLI.
//! Invariants: Both sides agree on layouts and names through `core` alone.
//! Invariants: Nothing crosses the boundary without a Call Status or an explicit free.
pub mod abi;
pub mod api;
pub mod core;
pub mod native;

pub use crate::core::convert::FfiConverter;
pub use crate::core::error::{CallError, Error, ErrorKind};
