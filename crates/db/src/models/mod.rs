//! Row structs for every Herald table.
//!
//! Rows convert into `herald_core` domain types with `TryFrom`, failing with
//! a `CoreError` when a stored enum string is unknown.

pub mod alert;
pub mod directory;
pub mod event;
pub mod preference;
pub mod watermark;
