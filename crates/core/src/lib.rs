//! Herald core domain logic.
//!
//! Everything in this crate is synchronous and free of I/O:
//!
//! - [`registry`]: the immutable catalog of notification types, built once
//!   from per-feature declarations ([`catalog`]).
//! - [`preference`]: the short-circuiting preference chain.
//! - [`alert`] and [`hashing`]: alert records, merge rules and hash keys.
//! - [`event`] and [`digest`]: persisted events, supersession and digest
//!   layout.
//! - [`session`]: per-session email/alert bookkeeping.
//! - [`config`]: engine configuration loaded from the environment.

pub mod alert;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod digest;
pub mod error;
pub mod event;
pub mod hashing;
pub mod preference;
pub mod registry;
pub mod session;
pub mod setting;
pub mod target;
pub mod types;
