//! Type aliases for the shared-state shapes used across the stack.
//!
//! Every piece of mutable state in Pitlink is touched from more than one
//! thread (I/O bridge threads dispatch, callers set and get), so only
//! thread-safe shapes live here. All locks are `parking_lot` locks.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pitlink_core::types::*;
//!
//! // Instead of: Arc<Mutex<HashMap<String, u8>>>
//! let cache: ThreadSafeMap<String, u8> = thread_safe_map();
//! ```

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// A thread-safe, mutex-protected wrapper for cross-thread sharing.
///
/// # Example
/// ```rust,ignore
/// let flag: ThreadSafe<bool> = thread_safe(false);
/// *flag.lock() = true;
/// ```
pub type ThreadSafe<T> = Arc<Mutex<T>>;

/// A thread-safe optional wrapper for lazily-initialized cross-thread state.
pub type ThreadSafeOption<T> = Arc<Mutex<Option<T>>>;

/// A thread-safe hash map for cross-thread key-value storage.
pub type ThreadSafeMap<K, V> = Arc<Mutex<HashMap<K, V>>>;

/// A thread-safe reader-writer lock wrapper for read-heavy workloads.
///
/// Use when reads greatly outnumber writes, such as the loaded command
/// registry which is read on every frame and replaced only on reload.
pub type ThreadSafeRw<T> = Arc<RwLock<T>>;

/// A thread-safe reader-writer hash map.
pub type ThreadSafeRwMap<K, V> = Arc<RwLock<HashMap<K, V>>>;

/// A shareable callback receiving a single value.
///
/// Reference counted so a dispatcher can clone the handler list out of
/// its lock before invoking handlers.
pub type SharedCallback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Create a new `ThreadSafe<T>` from a value.
#[inline]
pub fn thread_safe<T>(value: T) -> ThreadSafe<T> {
    Arc::new(Mutex::new(value))
}

/// Create a new `ThreadSafeOption<T>` initialized to `None`.
#[inline]
pub fn thread_safe_none<T>() -> ThreadSafeOption<T> {
    Arc::new(Mutex::new(None))
}

/// Create a new empty `ThreadSafeMap<K, V>`.
#[inline]
pub fn thread_safe_map<K, V>() -> ThreadSafeMap<K, V> {
    Arc::new(Mutex::new(HashMap::new()))
}

/// Create a new `ThreadSafeRw<T>` from a value.
#[inline]
pub fn thread_safe_rw<T>(value: T) -> ThreadSafeRw<T> {
    Arc::new(RwLock::new(value))
}

/// Create a new empty `ThreadSafeRwMap<K, V>`.
#[inline]
pub fn thread_safe_rw_map<K, V>() -> ThreadSafeRwMap<K, V> {
    Arc::new(RwLock::new(HashMap::new()))
}
