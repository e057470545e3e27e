//! # Capture
//!
//! Change-capture side of the pipeline.
//!
//! Responsibilities:
//! - Provision the change log, capture procedure and per-table triggers
//! - Own the durable cursor (delivered flag) over the change log
//! - Poll undelivered events oldest-first and hand each one, with its routed
//!   channels, to an `EventHandler`
//!
//! ## Usage Example
//!
//! ```ignore
//! use capture::{Installer, Listener, PostgresStore, RoutingTable};
//!
//! let mut store = PostgresStore::connect(&dsn, timeout).await?;
//! Installer::new(tables).install(&mut store).await?;
//!
//! let routing = RoutingTable::from_channels(&blueprint.channels);
//! let mut listener = Listener::new(store, routing, processor);
//! listener.run(poll_interval, batch_limit).await?; // returns only on fatal error
//! ```

mod error;
mod installer;
mod listener;
mod memory;
mod postgres;
mod routing;
pub mod schema;

pub use contracts::{CapturedEvent, ChangeStore, Channel, EventHandler};
pub use error::{CaptureError, Result};
pub use installer::Installer;
pub use listener::{Listener, ListenerStats, PollOutcome};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use routing::{normalize_table_name, RoutingTable};
