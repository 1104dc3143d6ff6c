// Library root: the store, its backends and the consumer-facing surfaces,
// exported for the binary and the integration tests.

pub mod backend;
pub mod catalog;
pub mod chat;
pub mod fixtures;
pub mod memory;
pub mod realtime;
pub mod rest;
pub mod schedule;
pub mod store;
pub mod studio;
