//! Human-readable, year-scoped sequential business identifiers.
//!
//! Products and customers carry an identifier such as `PROD_2025_0042` next to
//! the record store's opaque record id. The sequence is derived from the
//! highest sequence already present for the same prefix and year; there is no
//! persisted counter.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Minimum width of the zero-padded sequence part.
const SEQUENCE_WIDTH: usize = 4;

/// Entity types that receive a sequential business identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceKind {
    Product,
    Customer,
}

impl SequenceKind {
    /// Every sequenced entity type.
    pub const ALL: [Self; 2] = [Self::Product, Self::Customer];

    /// Identifier prefix (`PROD`, `CUST`).
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Product => "PROD",
            Self::Customer => "CUST",
        }
    }

    /// Record store collection holding this entity type.
    #[must_use]
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Product => "products",
            Self::Customer => "customers",
        }
    }

    /// Record field that stores the business identifier.
    #[must_use]
    pub const fn field(self) -> &'static str {
        match self {
            Self::Product => "product_id",
            Self::Customer => "customer_id",
        }
    }

    /// The `{PREFIX}_{YEAR}_` prefix every identifier of this kind and year shares.
    #[must_use]
    pub fn year_prefix(self, year: i32) -> String {
        format!("{}_{year}_", self.prefix())
    }
}

impl fmt::Display for SequenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Product => write!(f, "product"),
            Self::Customer => write!(f, "customer"),
        }
    }
}

impl std::str::FromStr for SequenceKind {
    type Err = BusinessIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "product" | "products" | "prod" => Ok(Self::Product),
            "customer" | "customers" | "cust" => Ok(Self::Customer),
            _ => Err(BusinessIdError::UnknownPrefix(s.to_string())),
        }
    }
}

/// Errors that can occur when parsing a [`BusinessId`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BusinessIdError {
    /// The identifier does not have three `_`-separated parts.
    #[error("business id must look like PREFIX_YEAR_SEQUENCE, got {0:?}")]
    Shape(String),
    /// The prefix is not a known entity type.
    #[error("unknown business id prefix: {0}")]
    UnknownPrefix(String),
    /// The year part is not a number.
    #[error("invalid year in business id: {0}")]
    Year(String),
    /// The sequence part is not a plain decimal number.
    #[error("invalid sequence in business id: {0}")]
    Sequence(String),
}

/// A parsed business identifier, e.g. `CUST_2025_0011`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusinessId {
    kind: SequenceKind,
    year: i32,
    sequence: u32,
}

impl BusinessId {
    /// Create an identifier from its parts.
    #[must_use]
    pub const fn new(kind: SequenceKind, year: i32, sequence: u32) -> Self {
        Self {
            kind,
            year,
            sequence,
        }
    }

    /// The first identifier of a year (`..._0001`).
    #[must_use]
    pub const fn first(kind: SequenceKind, year: i32) -> Self {
        Self::new(kind, year, 1)
    }

    /// Parse an identifier in `PREFIX_YEAR_SEQUENCE` form.
    ///
    /// # Errors
    ///
    /// Returns an error if the shape, prefix, year or sequence is invalid.
    pub fn parse(s: &str) -> Result<Self, BusinessIdError> {
        let mut parts = s.splitn(3, '_');
        let (Some(prefix), Some(year), Some(sequence)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(BusinessIdError::Shape(s.to_string()));
        };

        let kind = SequenceKind::ALL
            .into_iter()
            .find(|kind| kind.prefix() == prefix)
            .ok_or_else(|| BusinessIdError::UnknownPrefix(prefix.to_string()))?;
        let year = year
            .parse::<i32>()
            .map_err(|_| BusinessIdError::Year(year.to_string()))?;
        let sequence =
            parse_sequence(sequence).ok_or_else(|| BusinessIdError::Sequence(sequence.to_string()))?;

        Ok(Self::new(kind, year, sequence))
    }

    /// Entity type of this identifier.
    #[must_use]
    pub const fn kind(&self) -> SequenceKind {
        self.kind
    }

    /// Year part.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// Sequence number within the year.
    #[must_use]
    pub const fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Scan existing identifiers and compute the next one for `kind` and `year`.
    ///
    /// Identifiers with a different prefix or year are ignored. Identifiers that
    /// share the prefix but carry a non-numeric tail are collected in
    /// [`SequenceScan::malformed`] and otherwise skipped.
    pub fn scan<'a, I>(kind: SequenceKind, year: i32, existing: I) -> SequenceScan
    where
        I: IntoIterator<Item = &'a str>,
    {
        let prefix = kind.year_prefix(year);
        let mut max_seen = 0u32;
        let mut matched = 0usize;
        let mut malformed = Vec::new();

        for id in existing {
            let Some(tail) = id.strip_prefix(&prefix) else {
                continue;
            };
            match parse_sequence(tail) {
                Some(sequence) => {
                    matched += 1;
                    max_seen = max_seen.max(sequence);
                }
                None => malformed.push(id.to_string()),
            }
        }

        SequenceScan {
            next: Self::new(kind, year, max_seen.saturating_add(1)),
            max_seen,
            matched,
            malformed,
        }
    }
}

impl fmt::Display for BusinessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{:0width$}",
            self.kind.prefix(),
            self.year,
            self.sequence,
            width = SEQUENCE_WIDTH
        )
    }
}

impl std::str::FromStr for BusinessId {
    type Err = BusinessIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for BusinessId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BusinessId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Outcome of scanning existing identifiers for the next sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceScan {
    /// The identifier to assign next.
    pub next: BusinessId,
    /// Highest well-formed sequence found (0 when none matched).
    pub max_seen: u32,
    /// Number of well-formed identifiers with the same prefix and year.
    pub matched: usize,
    /// Identifiers with the right prefix but an unparsable sequence.
    pub malformed: Vec<String>,
}

/// Parse a sequence tail: one or more ASCII digits, nothing else.
fn parse_sequence(tail: &str) -> Option<u32> {
    if tail.is_empty() || !tail.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    tail.parse().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_pads_to_four_digits() {
        let id = BusinessId::new(SequenceKind::Product, 2025, 7);
        assert_eq!(id.to_string(), "PROD_2025_0007");
    }

    #[test]
    fn test_display_keeps_wide_sequences() {
        let id = BusinessId::new(SequenceKind::Customer, 2025, 12_345);
        assert_eq!(id.to_string(), "CUST_2025_12345");
    }

    #[test]
    fn test_parse_valid() {
        let id = BusinessId::parse("CUST_2025_0011").unwrap();
        assert_eq!(id.kind(), SequenceKind::Customer);
        assert_eq!(id.year(), 2025);
        assert_eq!(id.sequence(), 11);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            BusinessId::parse("PROD2025"),
            Err(BusinessIdError::Shape(_))
        ));
        assert!(matches!(
            BusinessId::parse("ITEM_2025_0001"),
            Err(BusinessIdError::UnknownPrefix(_))
        ));
        assert!(matches!(
            BusinessId::parse("PROD_20x5_0001"),
            Err(BusinessIdError::Year(_))
        ));
        assert!(matches!(
            BusinessId::parse("PROD_2025_abc"),
            Err(BusinessIdError::Sequence(_))
        ));
        assert!(matches!(
            BusinessId::parse("PROD_2025_+12"),
            Err(BusinessIdError::Sequence(_))
        ));
    }

    #[test]
    fn test_scan_contiguous_sequences() {
        let existing: Vec<String> = (1..=12)
            .map(|n| BusinessId::new(SequenceKind::Product, 2025, n).to_string())
            .collect();
        let scan = BusinessId::scan(
            SequenceKind::Product,
            2025,
            existing.iter().map(String::as_str),
        );
        assert_eq!(scan.next.to_string(), "PROD_2025_0013");
        assert_eq!(scan.matched, 12);
        assert!(scan.malformed.is_empty());
    }

    #[test]
    fn test_scan_skips_malformed_suffix() {
        let scan = BusinessId::scan(
            SequenceKind::Product,
            2025,
            ["PROD_2025_0003", "PROD_2025_abc"],
        );
        assert_eq!(scan.next.to_string(), "PROD_2025_0004");
        assert_eq!(scan.malformed, vec!["PROD_2025_abc".to_string()]);
    }

    #[test]
    fn test_scan_empty_starts_at_one() {
        let scan = BusinessId::scan(SequenceKind::Customer, 2025, std::iter::empty());
        assert_eq!(scan.next.to_string(), "CUST_2025_0001");
        assert_eq!(scan.max_seen, 0);
    }

    #[test]
    fn test_scan_ignores_other_years_and_prefixes() {
        let scan = BusinessId::scan(
            SequenceKind::Product,
            2025,
            ["PROD_2024_0099", "CUST_2025_0050", "", "PROD_2025_0002"],
        );
        assert_eq!(scan.next.to_string(), "PROD_2025_0003");
        assert_eq!(scan.matched, 1);
    }

    #[test]
    fn test_scan_uses_max_not_count() {
        // Gaps left by deletions are never refilled.
        let scan = BusinessId::scan(
            SequenceKind::Product,
            2025,
            ["PROD_2025_0009", "PROD_2025_0001"],
        );
        assert_eq!(scan.next.sequence(), 10);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("product".parse::<SequenceKind>().unwrap(), SequenceKind::Product);
        assert_eq!("CUST".parse::<SequenceKind>().unwrap(), SequenceKind::Customer);
        assert!("supplier".parse::<SequenceKind>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let id = BusinessId::new(SequenceKind::Customer, 2026, 3);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"CUST_2026_0003\"");
        let parsed: BusinessId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
