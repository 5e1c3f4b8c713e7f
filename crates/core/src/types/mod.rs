//! Core types for RBL Sourcing.
//!
//! Type-safe wrappers for identifiers, addresses, amounts and lifecycle states.

pub mod business_id;
pub mod email;
pub mod inquiry;
pub mod price;
pub mod status;
pub mod timestamp;

pub use business_id::{BusinessId, BusinessIdError, SequenceKind, SequenceScan};
pub use email::{Email, EmailError};
pub use inquiry::{InquiryNumber, InquiryStatus};
pub use price::Price;
pub use status::*;
pub use timestamp::{TimestampError, format_minutes, local_to_utc, parse_utc_timestamp};
