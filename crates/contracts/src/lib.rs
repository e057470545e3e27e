//! # Contracts
//!
//! Frozen interface contracts shared by every tablecast crate: the captured event
//! model, routing channels, the manifest blueprint and the capability traits
//! (change store, sink, transform, event handler).
//! Business crates depend on this crate only, never on each other's internals.
//!
//! ## Delivery model
//! - Events are captured by triggers inside the source store and carry a
//!   store-assigned, strictly increasing `id`
//! - The `delivered` flag is the only durability marker; it flips once, after a
//!   complete fan-out attempt

mod blueprint;
mod channel;
mod error;
mod event;
mod handler;
mod sink;
mod store;
mod transform;

pub use blueprint::*;
pub use channel::Channel;
pub use error::*;
pub use event::*;
pub use handler::{EventHandler, LocalEventHandler};
pub use sink::{DataSink, LocalDataSink};
pub use store::{ChangeStore, LocalChangeStore};
pub use transform::{Transform, TransformRegistry};
