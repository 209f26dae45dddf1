//! Player UI
//!
//! The egui experience menu rendered over the AR view, plus the
//! thumbnail cache behind it.

pub mod menu;
pub mod thumbnail_cache;

pub use menu::{ExperienceMenu, MenuAction};
pub use thumbnail_cache::ThumbnailCache;
