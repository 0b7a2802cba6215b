//! Purpose: Helpers for libraries that export entry points to a host.
//! Exports: scaffolding, Arc handles, poll-driven futures, callback invocation.
//! Role: Everything a generated native entry point calls into.
//! Invariants: Nothing here unwinds across the ABI or frees memory it does not own.
pub mod foreign;
pub mod future;
pub mod handles;
pub mod scaffolding;
