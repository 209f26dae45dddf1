//! Session lifecycle, target binding and the active-session object

pub mod binder;
pub mod manager;
pub mod session;

pub use binder::{bind_targets, resolve_found_glow, AnchorBinding, BindOutcome};
pub use manager::{SessionError, SessionManager, SessionState, TrackerFactory};
pub use session::ArSession;
