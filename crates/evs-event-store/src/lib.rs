//! # Event Store
//!
//! The event-store read/append contract consumed by the gateway and by any
//! higher-level aggregate-persistence layer, plus the in-memory backend and
//! the store-backed producer.
//!
//! ## Contract
//!
//! - `append` enforces the optimistic-concurrency precondition atomically;
//!   a conflicting expectation fails with no partial write
//! - `read` goes strictly forward in ascending stream-position order; short
//!   reads and missing streams are not errors
//! - `read_all` tails the store across streams in global-position order

pub mod memory;
pub mod producer;
pub mod store;

pub use memory::*;
pub use producer::*;
pub use store::*;
