//! GraphQL documents used to enrich forwarded resource events.

use storelink_dispatch::EnrichmentQuery;

const ORDER_QUERY: &str = r#"
query OrderForEvent($id: ID!) {
  order(id: $id) {
    id
    name
    displayFinancialStatus
    displayFulfillmentStatus
    totalPriceSet { shopMoney { amount currencyCode } }
    customer { id }
  }
}
"#;

const PRODUCT_QUERY: &str = r#"
query ProductForEvent($id: ID!) {
  product(id: $id) {
    id
    title
    handle
    status
    totalInventory
  }
}
"#;

const CUSTOMER_QUERY: &str = r#"
query CustomerForEvent($id: ID!) {
  customer(id: $id) {
    id
    displayName
    numberOfOrders
    amountSpent { amount currencyCode }
  }
}
"#;

const ORDER_SCOPES: &[&str] = &["read_orders"];
const PRODUCT_SCOPES: &[&str] = &["read_products"];
const CUSTOMER_SCOPES: &[&str] = &["read_customers"];

/// Returns the enrichment query for a topic namespace.
#[must_use]
pub fn query_for(namespace: &str) -> Option<EnrichmentQuery> {
    let (document, scopes) = match namespace {
        "orders" => (ORDER_QUERY, ORDER_SCOPES),
        "products" => (PRODUCT_QUERY, PRODUCT_SCOPES),
        "customers" => (CUSTOMER_QUERY, CUSTOMER_SCOPES),
        _ => return None,
    };
    Some(EnrichmentQuery::new(document.trim(), scopes))
}
