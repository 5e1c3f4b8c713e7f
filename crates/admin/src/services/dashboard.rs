//! Dashboard aggregates.

use std::collections::HashMap;

use rbl_core::Price;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::store::collections::{CUSTOMERS, INQUIRIES, PRODUCTS, SUPPLIERS};
use crate::store::{FULL_LIST_PAGE_SIZE, ListQuery, Record, RecordStore, StoreError};

/// Entries in each top-customers chart.
pub const TOP_CUSTOMERS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerInquiries {
    pub customer: String,
    pub inquiries: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerAmount {
    pub customer: String,
    pub amount: Price,
}

/// Counts and charts shown on the dashboard.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardSummary {
    pub customers: usize,
    pub inquiries: usize,
    pub suppliers: usize,
    pub top_by_inquiries: Vec<CustomerInquiries>,
    pub top_by_amount: Vec<CustomerAmount>,
}

/// Load every collection the dashboard needs and aggregate it.
///
/// # Errors
///
/// Returns the first store error encountered.
pub async fn load<S: RecordStore>(store: &S) -> Result<DashboardSummary, StoreError> {
    let query = ListQuery::new().per_page(FULL_LIST_PAGE_SIZE);
    let supplier_query = ListQuery::new().per_page(1);
    let (customers, inquiries, products, suppliers) = tokio::try_join!(
        store.list_all(CUSTOMERS, &query),
        store.list_all(INQUIRIES, &query),
        store.list_all(PRODUCTS, &query),
        store.list(SUPPLIERS, &supplier_query),
    )?;

    let mut summary = summarize(&customers, &inquiries, &products);
    summary.suppliers = usize::try_from(suppliers.total_items).unwrap_or(usize::MAX);
    Ok(summary)
}

/// Aggregate inquiry counts and order value per customer.
///
/// An inquiry's value is its product's price times its quantity, with a
/// missing or zero quantity counted as 1 and an unknown product as price 0.
/// Amounts beyond the decimal range are clamped to [`Decimal::MAX`].
/// Customers without inquiries are left out of both charts. Ties keep the
/// customers' original order.
#[must_use]
pub fn summarize(customers: &[Record], inquiries: &[Record], products: &[Record]) -> DashboardSummary {
    let prices: HashMap<&str, Price> = products
        .iter()
        .map(|p| (p.id.as_str(), Price::from_value_or_zero(p.get("price"))))
        .collect();

    let mut per_customer: HashMap<&str, (usize, Price)> = HashMap::new();
    for inquiry in inquiries {
        let Some(customer) = inquiry.str_field("customer_id") else {
            continue;
        };
        let price = inquiry
            .str_field("product_id")
            .and_then(|id| prices.get(id).copied())
            .unwrap_or(Price::ZERO);
        let quantity = match inquiry.u32_field("quantity") {
            0 => 1,
            n => n,
        };

        let entry = per_customer.entry(customer).or_insert((0, Price::ZERO));
        entry.0 += 1;
        entry.1 = entry.1.saturating_add(price.saturating_mul(Decimal::from(quantity)));
    }

    let mut by_inquiries = Vec::new();
    let mut by_amount = Vec::new();
    for customer in customers {
        let Some(&(count, amount)) = per_customer.get(customer.id.as_str()) else {
            continue;
        };
        let name = customer.str_field("name").unwrap_or("Unknown").to_string();
        by_inquiries.push(CustomerInquiries {
            customer: name.clone(),
            inquiries: count,
        });
        by_amount.push(CustomerAmount {
            customer: name,
            amount,
        });
    }

    by_inquiries.sort_by(|a, b| b.inquiries.cmp(&a.inquiries));
    by_amount.sort_by(|a, b| b.amount.cmp(&a.amount));
    by_inquiries.truncate(TOP_CUSTOMERS);
    by_amount.truncate(TOP_CUSTOMERS);

    DashboardSummary {
        customers: customers.len(),
        inquiries: inquiries.len(),
        suppliers: 0,
        top_by_inquiries: by_inquiries,
        top_by_amount: by_amount,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;
    use std::sync::Arc;

    use serde_json::{Value, json};

    use super::*;
    use crate::store::memory::MemoryStore;

    fn record(id: &str, fields: Value) -> Record {
        Record {
            id: id.to_string(),
            fields: fields.as_object().cloned().unwrap(),
            ..Record::default()
        }
    }

    fn price(s: &str) -> Price {
        Price::new(Decimal::from_str(s).unwrap())
    }

    #[test]
    fn test_summarize_counts_and_amounts() {
        let customers = vec![
            record("c1", json!({ "name": "Everest Traders" })),
            record("c2", json!({ "name": "Lumbini Imports" })),
            record("c3", json!({ "name": "No Orders Ltd" })),
        ];
        let products = vec![
            record("p1", json!({ "price": 12.5 })),
            record("p2", json!({ "price": "1,000" })),
        ];
        let inquiries = vec![
            record("i1", json!({ "customer_id": "c1", "product_id": "p1", "quantity": 4 })),
            record("i2", json!({ "customer_id": "c1", "product_id": "p1" })),
            record("i3", json!({ "customer_id": "c2", "product_id": "p2", "quantity": 2 })),
            record("i4", json!({ "customer_id": "c2", "product_id": "gone", "quantity": 9 })),
            record("i5", json!({ "customer_id": "c2", "product_id": "p1", "quantity": 0 })),
        ];

        let summary = summarize(&customers, &inquiries, &products);
        assert_eq!(summary.customers, 3);
        assert_eq!(summary.inquiries, 5);

        assert_eq!(
            summary.top_by_inquiries,
            vec![
                CustomerInquiries { customer: "Lumbini Imports".to_string(), inquiries: 3 },
                CustomerInquiries { customer: "Everest Traders".to_string(), inquiries: 2 },
            ]
        );
        assert_eq!(
            summary.top_by_amount,
            vec![
                CustomerAmount { customer: "Lumbini Imports".to_string(), amount: price("2012.5") },
                CustomerAmount { customer: "Everest Traders".to_string(), amount: price("62.5") },
            ]
        );
    }

    #[test]
    fn test_summarize_keeps_top_ten() {
        let customers: Vec<_> = (0..12)
            .map(|n| record(&format!("c{n}"), json!({ "name": format!("Customer {n}") })))
            .collect();
        let inquiries: Vec<_> = (0..12)
            .flat_map(|n| {
                (0..=n).map(move |k| record(&format!("i{n}-{k}"), json!({ "customer_id": format!("c{n}") })))
            })
            .collect();

        let summary = summarize(&customers, &inquiries, &[]);
        assert_eq!(summary.top_by_inquiries.len(), TOP_CUSTOMERS);
        assert_eq!(summary.top_by_inquiries[0].customer, "Customer 11");
        assert_eq!(summary.top_by_inquiries[0].inquiries, 12);
        assert!(summary.top_by_amount.iter().all(|c| c.amount == Price::ZERO));
    }

    #[test]
    fn test_summarize_clamps_oversized_amounts() {
        let customers = vec![
            record("c1", json!({ "name": "Everest Traders" })),
            record("c2", json!({ "name": "Lumbini Imports" })),
        ];
        let products = vec![
            record("p1", json!({ "price": "50000000000000000000000000000" })),
            record("p2", json!({ "price": 10 })),
        ];
        let inquiries = vec![
            record("i1", json!({ "customer_id": "c1", "product_id": "p1", "quantity": 2 })),
            record("i2", json!({ "customer_id": "c1", "product_id": "p1", "quantity": 1 })),
            record("i3", json!({ "customer_id": "c2", "product_id": "p2", "quantity": 3 })),
        ];

        let summary = summarize(&customers, &inquiries, &products);
        assert_eq!(summary.top_by_amount[0].customer, "Everest Traders");
        assert_eq!(summary.top_by_amount[0].amount, Price::new(Decimal::MAX));
        assert_eq!(summary.top_by_amount[1].amount, price("30"));
    }

    #[tokio::test]
    async fn test_load_counts_suppliers() {
        let store = Arc::new(MemoryStore::new());
        let customer = store.seed(CUSTOMERS, json!({ "name": "Everest Traders" }));
        store.seed(INQUIRIES, json!({ "customer_id": customer }));
        store.seed(SUPPLIERS, json!({ "name": "A" }));
        store.seed(SUPPLIERS, json!({ "name": "B" }));

        let summary = load(&store).await.unwrap();
        assert_eq!(summary.customers, 1);
        assert_eq!(summary.inquiries, 1);
        assert_eq!(summary.suppliers, 2);
        assert_eq!(summary.top_by_inquiries.len(), 1);
    }
}
