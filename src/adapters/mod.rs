//! Adapters for the storage engine, the stage workers and the HTTP surface.

pub mod http;
pub mod sqlite;
pub mod stages;
