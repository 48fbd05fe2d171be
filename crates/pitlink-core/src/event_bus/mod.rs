//! # Event Bus Module
//!
//! Connects asynchronous hardware I/O to synchronous and reactive consumers.
//!
//! ## Overview
//!
//! - [`Subscribers`]: one stream of values, persistent and one-shot handlers
//! - [`EventBus`]: named channels, one [`Subscribers`] list each, plus a
//!   tokio broadcast receiver for async consumers
//! - [`Observable`]: value holder that notifies only on change
//! - [`BlockingValue`]: bounded-wait handoff slot
//!
//! Handlers run on whichever thread dispatches. Nothing here assumes a UI
//! thread; marshaling is the consumer's job.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pitlink_core::event_bus::EventBus;
//!
//! let bus: EventBus<u32> = EventBus::new();
//! bus.register_event("base-max-angle");
//! let id = bus.subscribe("base-max-angle", |angle| tracing::info!(angle));
//! bus.dispatch("base-max-angle", 900);
//! bus.unsubscribe("base-max-angle", id.unwrap());
//! ```

mod bus;
mod subscribers;
mod sync;

pub use bus::*;
pub use subscribers::*;
pub use sync::*;
