//! Sales inquiry numbering and status.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Placeholder used when a business id has no sequence segment.
const MISSING_SEGMENT: &str = "0000";

/// Pipeline status of a sales inquiry, in workflow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum InquiryStatus {
    #[default]
    Inquiry,
    Quoting,
    #[serde(rename = "Quotation Finalized")]
    QuotationFinalized,
    #[serde(rename = "Payment Received")]
    PaymentReceived,
    #[serde(rename = "In Shipment")]
    InShipment,
    #[serde(rename = "Arrived KTM")]
    ArrivedKtm,
    Delivered,
    Closed,
}

impl InquiryStatus {
    /// All statuses in workflow order.
    pub const ALL: [Self; 8] = [
        Self::Inquiry,
        Self::Quoting,
        Self::QuotationFinalized,
        Self::PaymentReceived,
        Self::InShipment,
        Self::ArrivedKtm,
        Self::Delivered,
        Self::Closed,
    ];

    /// The label stored in the record store and shown to staff.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Inquiry => "Inquiry",
            Self::Quoting => "Quoting",
            Self::QuotationFinalized => "Quotation Finalized",
            Self::PaymentReceived => "Payment Received",
            Self::InShipment => "In Shipment",
            Self::ArrivedKtm => "Arrived KTM",
            Self::Delivered => "Delivered",
            Self::Closed => "Closed",
        }
    }

    /// Look up a status by its stored label.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.label() == label)
    }

    /// Closed inquiries no longer count as active.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for InquiryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Inquiry reference such as `INQ-2025-0011-0042`.
///
/// Built from the year and the sequence segments of the customer and product
/// business ids. The number is a label, not a unique key: the same customer
/// and product in the same year yield the same number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InquiryNumber(String);

impl InquiryNumber {
    /// Compose an inquiry number from the business ids of its customer and product.
    ///
    /// ```
    /// use rbl_core::InquiryNumber;
    ///
    /// let n = InquiryNumber::compose(2025, Some("CUST_2025_0011"), Some("PROD_2024_0042"));
    /// assert_eq!(n.as_str(), "INQ-2025-0011-0042");
    ///
    /// let n = InquiryNumber::compose(2025, Some("legacy"), None);
    /// assert_eq!(n.as_str(), "INQ-2025-0000-0000");
    /// ```
    #[must_use]
    pub fn compose(year: i32, customer_id: Option<&str>, product_id: Option<&str>) -> Self {
        Self(format!(
            "INQ-{year}-{}-{}",
            sequence_segment(customer_id),
            sequence_segment(product_id)
        ))
    }

    /// Fallback label used when the referenced records cannot be loaded.
    #[must_use]
    pub fn fallback(customer_record: &str, product_record: &str) -> Self {
        Self(format!("{customer_record}-{product_record}"))
    }

    /// The inquiry number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the number and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for InquiryNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Third `_`-separated segment of a business id, or `0000`.
fn sequence_segment(business_id: Option<&str>) -> &str {
    business_id
        .and_then(|id| id.split('_').nth(2))
        .unwrap_or(MISSING_SEGMENT)
}
