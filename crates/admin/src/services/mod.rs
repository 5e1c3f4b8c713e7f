//! Business logic services for the back office.
//!
//! # Services
//!
//! - `dashboard` - Customer, inquiry and supplier aggregates
//! - `email` - Email delivery via SMTP
//! - `ids` - Sequential `PROD_`/`CUST_` identifier generation
//! - `inquiries` - Inquiry search, stats and numbering
//! - `notify` - Reminder email formatting and dispatch
//! - `reminders` - Periodic reminder scheduler

pub mod dashboard;
pub mod email;
pub mod ids;
pub mod inquiries;
pub mod notify;
pub mod reminders;

pub use dashboard::DashboardSummary;
pub use email::{EmailError, EmailService, Mailer, OutgoingEmail};
pub use ids::{IdError, IdGenerator};
pub use notify::NotificationDispatcher;
pub use reminders::{DueReminder, ReminderScheduler, SkipReason, TickReport, partition_due};
