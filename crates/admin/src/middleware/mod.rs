//! HTTP middleware for the back office.
//!
//! Layers applied in `main` (outermost first): Sentry, `TraceLayer`, sessions.
//! Route-level auth is done with the extractors in [`auth`].

pub mod auth;
pub mod session;

pub use auth::{RequireAdminRole, RequireStaff, clear_current_staff, set_current_staff};
pub use session::create_session_layer;
