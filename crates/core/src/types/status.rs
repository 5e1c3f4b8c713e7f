//! Role and lifecycle enums.

use serde::{Deserialize, Serialize};

/// Role of a staff user in the `users` auth collection.
///
/// Anything other than `admin` (including a missing role) is treated as
/// regular staff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    /// Full access, including supplier management.
    Admin,
    /// Day-to-day access to customers, products, inquiries and reminders.
    #[default]
    Staff,
}

impl StaffRole {
    /// Read a role from a stored value, defaulting to [`StaffRole::Staff`].
    #[must_use]
    pub fn from_record(value: Option<&str>) -> Self {
        match value.map(|s| s.trim().to_ascii_lowercase()) {
            Some(role) if role == "admin" => Self::Admin,
            _ => Self::Staff,
        }
    }

    /// Whether this role may manage suppliers.
    #[must_use]
    pub const fn can_manage_suppliers(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl std::fmt::Display for StaffRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Staff => write!(f, "staff"),
        }
    }
}

impl std::str::FromStr for StaffRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "staff" => Ok(Self::Staff),
            _ => Err(format!("invalid staff role: {s}")),
        }
    }
}

/// Delivery state of a reminder, derived from its `sent` and `failed` flags.
///
/// ```text
/// Pending --dispatch ok--> Dispatched
/// Pending --attempt cap--> Failed
/// any     --edit---------> Pending
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderState {
    /// Not yet delivered; eligible once its scheduled time has passed.
    Pending,
    /// Delivered and marked `sent`.
    Dispatched,
    /// Gave up after the attempt cap (dead letter).
    Failed,
}

impl ReminderState {
    /// Derive the state from stored flags. `sent` wins over `failed`.
    #[must_use]
    pub const fn from_flags(sent: bool, failed: bool) -> Self {
        match (sent, failed) {
            (true, _) => Self::Dispatched,
            (false, true) => Self::Failed,
            (false, false) => Self::Pending,
        }
    }

    /// Whether the scheduler still considers this reminder.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for ReminderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Dispatched => write!(f, "dispatched"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staff_role_from_record() {
        assert_eq!(StaffRole::from_record(Some("admin")), StaffRole::Admin);
        assert_eq!(StaffRole::from_record(Some(" Admin ")), StaffRole::Admin);
        assert_eq!(StaffRole::from_record(Some("staff")), StaffRole::Staff);
        assert_eq!(StaffRole::from_record(Some("")), StaffRole::Staff);
        assert_eq!(StaffRole::from_record(None), StaffRole::Staff);
    }

    #[test]
    fn test_staff_role_permissions() {
        assert!(StaffRole::Admin.can_manage_suppliers());
        assert!(!StaffRole::Staff.can_manage_suppliers());
    }

    #[test]
    fn test_staff_role_display_roundtrip() {
        for role in [StaffRole::Admin, StaffRole::Staff] {
            assert_eq!(role.to_string().parse::<StaffRole>(), Ok(role));
        }
        assert!("viewer".parse::<StaffRole>().is_err());
    }

    #[test]
    fn test_reminder_state_from_flags() {
        assert_eq!(ReminderState::from_flags(false, false), ReminderState::Pending);
        assert_eq!(ReminderState::from_flags(true, false), ReminderState::Dispatched);
        assert_eq!(ReminderState::from_flags(false, true), ReminderState::Failed);
        assert_eq!(ReminderState::from_flags(true, true), ReminderState::Dispatched);
        assert!(ReminderState::Pending.is_pending());
        assert!(!ReminderState::Failed.is_pending());
    }
}
