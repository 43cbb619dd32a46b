//! File watching and change classification.

pub mod debounce;
pub mod hash;
pub mod invalidator;
pub mod watcher;

pub use debounce::Debouncer;
pub use invalidator::{Invalidation, Invalidator};
pub use watcher::FileWatcher;
