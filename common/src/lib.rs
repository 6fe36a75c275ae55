//! Filesystem primitives shared by the nvup crates.
//!
//! Everything that mutates on-disk state in nvup goes through one of these
//! helpers: a per-path advisory lock, a stage-then-rename file write, a link
//! replacement that falls back to platform alternatives, and a cooperative
//! cancellation token threaded through blocking work.

pub mod atomic;
pub mod cancel;
pub mod link;
pub mod lock;

pub use atomic::write_atomic;
pub use cancel::{CancelToken, Cancelled};
pub use link::{LinkKind, LinkMethod, read_link_target, remove_link, update_link};
pub use lock::{AdvisoryLock, LockError, lock_path_for};
