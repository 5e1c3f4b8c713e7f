//! Session-related types for staff authentication.

use serde::{Deserialize, Serialize};

use rbl_core::{Email, StaffRole};

use crate::store::AuthenticatedUser;

/// Session-stored staff identity.
///
/// Minimal data stored in the session to identify the logged-in staff member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentStaff {
    /// Record id in the `users` collection.
    pub id: String,
    pub email: Email,
    /// Display name; falls back to the email address.
    pub name: String,
    pub role: StaffRole,
}

impl CurrentStaff {
    /// Build the session identity from a successful password login.
    ///
    /// Returns `None` if the store returned a user without a usable email.
    #[must_use]
    pub fn from_user(user: &AuthenticatedUser) -> Option<Self> {
        let email = Email::parse(user.record.str_field("email")?).ok()?;
        let name = user
            .record
            .str_field("name")
            .map_or_else(|| email.to_string(), String::from);
        Some(Self {
            id: user.record.id.clone(),
            email,
            name,
            role: StaffRole::from_record(user.record.str_field("role")),
        })
    }
}

/// Session keys for staff authentication data.
pub mod keys {
    /// Key for storing the current logged-in staff member.
    pub const CURRENT_STAFF: &str = "current_staff";
}
