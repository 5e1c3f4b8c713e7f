//! Builder for record store filter expressions.
//!
//! Values are always emitted as double-quoted string literals with `\` and `"`
//! escaped, so user search input cannot break out of the expression.
//!
//! ```
//! use rbl_admin::store::Filter;
//!
//! let search = Filter::any([
//!     Filter::like("name", "o\"brien"),
//!     Filter::like("email", "o\"brien"),
//! ]);
//! let filter = Filter::all([Filter::eq("role", "staff"), search.unwrap()]).unwrap();
//! assert_eq!(
//!     filter.to_string(),
//!     r#"role = "staff" && (name ~ "o\"brien" || email ~ "o\"brien")"#
//! );
//! ```

use core::fmt;

/// A filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    expr: String,
    compound: bool,
}

impl Filter {
    fn compare(field: &str, op: &str, value: &str) -> Self {
        Self {
            expr: format!("{field} {op} {}", quote(value)),
            compound: false,
        }
    }

    /// `field = "value"`
    #[must_use]
    pub fn eq(field: &str, value: &str) -> Self {
        Self::compare(field, "=", value)
    }

    /// `field ~ "value"` (case-insensitive contains)
    #[must_use]
    pub fn like(field: &str, value: &str) -> Self {
        Self::compare(field, "~", value)
    }

    /// `field >= "value"`
    #[must_use]
    pub fn gte(field: &str, value: &str) -> Self {
        Self::compare(field, ">=", value)
    }

    /// Join with `&&`. Returns `None` for an empty input.
    pub fn all(filters: impl IntoIterator<Item = Self>) -> Option<Self> {
        Self::join(filters, "&&")
    }

    /// Join with `||`. Returns `None` for an empty input.
    pub fn any(filters: impl IntoIterator<Item = Self>) -> Option<Self> {
        Self::join(filters, "||")
    }

    /// Contains-match `term` against each field, or `None` for a blank term.
    #[must_use]
    pub fn search(fields: &[&str], term: &str) -> Option<Self> {
        let term = term.trim();
        if term.is_empty() {
            return None;
        }
        Self::any(fields.iter().map(|field| Self::like(field, term)))
    }

    fn join(filters: impl IntoIterator<Item = Self>, op: &str) -> Option<Self> {
        let parts: Vec<Self> = filters.into_iter().collect();
        match parts.len() {
            0 => None,
            1 => parts.into_iter().next(),
            _ => Some(Self {
                expr: parts
                    .iter()
                    .map(Self::grouped)
                    .collect::<Vec<_>>()
                    .join(&format!(" {op} ")),
                compound: true,
            }),
        }
    }

    fn grouped(&self) -> String {
        if self.compound {
            format!("({})", self.expr)
        } else {
            self.expr.clone()
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

impl From<Filter> for String {
    fn from(filter: Filter) -> Self {
        filter.expr
    }
}

/// Quote a string literal for a filter expression.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_comparisons() {
        assert_eq!(Filter::eq("sent", "false").to_string(), r#"sent = "false""#);
        assert_eq!(
            Filter::gte("created", "2025-01-01 00:00:00").to_string(),
            r#"created >= "2025-01-01 00:00:00""#
        );
    }

    #[test]
    fn test_escapes_quotes_and_backslashes() {
        assert_eq!(
            Filter::like("name", r#"a"b\c"#).to_string(),
            r#"name ~ "a\"b\\c""#
        );
    }

    #[test]
    fn test_join_single_and_empty() {
        assert_eq!(Filter::all(Vec::new()), None);
        assert_eq!(
            Filter::any([Filter::eq("a", "1")]).unwrap().to_string(),
            r#"a = "1""#
        );
    }

    #[test]
    fn test_nested_groups() {
        let inner = Filter::any([Filter::eq("a", "1"), Filter::eq("b", "2")]).unwrap();
        let outer = Filter::all([inner, Filter::eq("c", "3")]).unwrap();
        assert_eq!(
            outer.to_string(),
            r#"(a = "1" || b = "2") && c = "3""#
        );
    }

    #[test]
    fn test_search() {
        assert_eq!(Filter::search(&["name", "email"], "   "), None);
        assert_eq!(
            Filter::search(&["name", "email"], " ram ").unwrap().to_string(),
            r#"name ~ "ram" || email ~ "ram""#
        );
    }
}
