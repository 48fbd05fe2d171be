//! # Pitlink Core
//!
//! Core types shared by every Pitlink crate: the error taxonomy, the
//! thread-safe state aliases, and the event bus with its synchronization
//! primitives.

pub mod error;
pub mod event_bus;
pub mod types;

pub use error::{ConnectionError, Error, Result, SettingError};

pub use event_bus::{
    BlockingValue, EventBus, EventBusConfig, Observable, SubscriptionId, Subscribers,
};

pub use types::{
    thread_safe, thread_safe_map, thread_safe_none, thread_safe_rw, thread_safe_rw_map,
    SharedCallback, ThreadSafe, ThreadSafeMap, ThreadSafeOption, ThreadSafeRw, ThreadSafeRwMap,
};
