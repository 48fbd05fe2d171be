//! Type system utilities and aliases.
//!
//! ## Modules
//!
//! - [`aliases`]: Type aliases for `Arc<Mutex<T>>`, `Arc<RwLock<T>>` and shared callbacks.

pub mod aliases;

pub use aliases::*;
