//! # Event Gateway
//!
//! The routing-and-produce runtime: consumes events from a subscription
//! source, routes them through a transform, and produces the results to
//! destination streams with per-stream ordering and cross-stream
//! parallelism.
//!
//! ## Components
//!
//! - [`handler::GatewayHandler`]: transform → group by stream → produce,
//!   with synchronous and asynchronous acknowledgment modes
//! - [`registry::ClientRegistry`]: single-flight get-or-create cache of
//!   destination clients
//! - [`broker`]: in-memory topic broker and the registry-backed producer
//! - [`shovel::Shovel`]: polling subscription loop with checkpointing

pub mod broker;
pub mod checkpoint;
pub mod handler;
pub mod registry;
pub mod shovel;
pub mod transform;

pub use broker::*;
pub use checkpoint::*;
pub use handler::*;
pub use registry::*;
pub use shovel::*;
pub use transform::*;
