// Wire-level primitives shared by host bindings and native scaffolding.
pub mod buffer;
pub mod checksum;
pub mod config;
pub mod convert;
pub mod error;
pub mod handle_map;
pub mod status;
pub mod wire;
