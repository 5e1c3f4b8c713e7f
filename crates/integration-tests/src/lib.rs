//! Integration tests for the RBL Sourcing back office.
//!
//! No external services are needed. [`FakeRecordStore`] serves the part of
//! the record store REST API the back office uses, on an ephemeral local
//! port, and [`TestApp`] runs the back-office router against it.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p rbl-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `store_client` - REST client: auth, re-auth, paging, errors
//! - `business_ids` - Identifier generation over HTTP, including conflicts
//! - `reminders` - Scheduler ticks against stored reminders
//! - `api` - Staff login and the JSON API end to end

pub mod app;
pub mod fake_store;
pub mod mailer;

pub use app::TestApp;
pub use fake_store::FakeRecordStore;
pub use mailer::RecordingMailer;
