//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument. Methods that must run under a
//! merge lock take the open transaction instead.

pub mod alert_repo;
pub mod directory_repo;
pub mod event_repo;
pub mod preference_repo;
pub mod watermark_repo;

pub use alert_repo::AlertRepo;
pub use directory_repo::DirectoryRepo;
pub use event_repo::EventRepo;
pub use preference_repo::PreferenceRepo;
pub use watermark_repo::WatermarkRepo;
