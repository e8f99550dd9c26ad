//! Virtual user pool for loadcheck
//!
//! A virtual user is a credentialed identity with its own session (cookie
//! jar and conditional-request cache). The pool hands out exclusive leases:
//! a lease owns its user until it is released or dropped, so two workers
//! can never touch the same session at once.

pub mod error;
pub mod pool;
pub mod session;
pub mod user;

pub use error::PoolError;
pub use pool::{UserLease, UserPool};
pub use session::{CacheRecord, Session, SessionSettings};
pub use user::VirtualUser;
