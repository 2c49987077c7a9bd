//! Simulated shop data for the tamperlog reference harness.
//!
//! All data in this module is hardcoded and fictional. It stands in for the
//! catalog and cart services that publish audit events in a real deployment.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

use tamperlog_contracts::event::{AuditAction, AuditEvent, DedupKey};

// ── Catalog (mock) ────────────────────────────────────────────────────────────

/// A catalog product as the catalog service sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: &'static str,
    pub name: &'static str,
    pub category: &'static str,
    pub price_cents: u64,
}

/// The fixed mock catalog.
pub fn catalog() -> Vec<Product> {
    vec![
        Product { id: "42", name: "Espresso Grinder", category: "kitchen", price_cents: 12_900 },
        Product { id: "43", name: "Pour-Over Kettle", category: "kitchen", price_cents: 5_400 },
        Product { id: "51", name: "Trail Runner GTX", category: "footwear", price_cents: 15_500 },
        Product { id: "60", name: "Merino Beanie", category: "apparel", price_cents: 2_800 },
        Product { id: "77", name: "Desk Lamp", category: "home", price_cents: 4_100 },
    ]
}

/// Fixed reference instant so scenario output is reproducible.
pub fn shop_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

fn product_values(product: &Product, price_cents: u64) -> String {
    json!({
        "Name": product.name,
        "Category": product.category,
        "PriceCents": price_cents,
    })
    .to_string()
}

/// A staff member or shopper, as captured by the producing service.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: &'static str,
    pub email: &'static str,
}

pub const CATALOG_ADMIN: Actor = Actor {
    user_id: "staff-007",
    email: "catalog.admin@shop.example",
};

pub const SHOPPER: Actor = Actor {
    user_id: "cust-1138",
    email: "jo.shopper@mail.example",
};

fn with_request(event: AuditEvent, actor: Actor, correlation: &str) -> AuditEvent {
    event.with_user(actor.user_id, actor.email).with_request_context(
        Some(correlation.to_string()),
        Some("203.0.113.24".to_string()),
        Some("shop-admin/2.4 (+https://shop.example)".to_string()),
    )
}

// ── Catalog events ────────────────────────────────────────────────────────────

pub fn product_created(key: impl Into<DedupKey>, product: &Product, at: DateTime<Utc>) -> AuditEvent {
    let event = AuditEvent::new(key, "Product", AuditAction::Created, product.id, at)
        .with_values(None, Some(product_values(product, product.price_cents)));
    with_request(event, CATALOG_ADMIN, &format!("corr-create-{}", product.id))
}

pub fn price_changed(
    key: impl Into<DedupKey>,
    product: &Product,
    new_price_cents: u64,
    at: DateTime<Utc>,
) -> AuditEvent {
    let event = AuditEvent::new(key, "Product", AuditAction::Modified, product.id, at).with_values(
        Some(product_values(product, product.price_cents)),
        Some(product_values(product, new_price_cents)),
    );
    with_request(event, CATALOG_ADMIN, &format!("corr-price-{}", product.id))
}

pub fn product_deleted(key: impl Into<DedupKey>, product: &Product, at: DateTime<Utc>) -> AuditEvent {
    let event = AuditEvent::new(key, "Product", AuditAction::Deleted, product.id, at)
        .with_values(Some(product_values(product, product.price_cents)), None);
    with_request(event, CATALOG_ADMIN, &format!("corr-delete-{}", product.id))
}

// ── Cart events ───────────────────────────────────────────────────────────────

pub fn cart_item_added(
    key: impl Into<DedupKey>,
    cart_id: &str,
    product: &Product,
    quantity: u32,
    at: DateTime<Utc>,
) -> AuditEvent {
    let values = json!({
        "ProductId": product.id,
        "Quantity": quantity,
        "UnitPriceCents": product.price_cents,
    })
    .to_string();
    let event = AuditEvent::new(key, "CartItem", AuditAction::Created, format!("{}/{}", cart_id, product.id), at)
        .with_values(None, Some(values));
    with_request(event, SHOPPER, &format!("corr-cart-{}", cart_id))
}

// ── Event streams ─────────────────────────────────────────────────────────────

/// `count` distinct events with keys `{prefix}-0000`, `{prefix}-0001`, ...
///
/// Cycles through the catalog, mixing catalog edits and cart activity the way
/// a busy storefront would. Timestamps advance one second per event.
pub fn storefront_traffic(prefix: &str, count: usize) -> Vec<AuditEvent> {
    let products = catalog();
    let epoch = shop_epoch();
    (0..count)
        .map(|i| {
            let product = &products[i % products.len()];
            let key = format!("{}-{:04}", prefix, i);
            let at = epoch + Duration::seconds(i as i64);
            match i % 3 {
                0 => cart_item_added(key, &format!("cart-{}", i / 3), product, 1 + (i % 4) as u32, at),
                1 => price_changed(key, product, product.price_cents + (i as u64) * 10, at),
                _ => product_created(key, product, at),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storefront_traffic_keys_are_distinct() {
        let events = storefront_traffic("t", 40);
        let mut keys: Vec<_> = events.iter().map(|e| e.dedup_key.clone()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 40);
        assert_eq!(events[3].dedup_key.as_str(), "t-0003");
    }

    #[test]
    fn test_price_change_carries_both_snapshots() {
        let product = &catalog()[0];
        let event = price_changed("p", product, 9_900, shop_epoch());
        assert_eq!(event.action, AuditAction::Modified);
        assert!(event.old_values.as_deref().unwrap().contains("12900"));
        assert!(event.new_values.as_deref().unwrap().contains("9900"));
        assert_eq!(event.user_email.as_deref(), Some(CATALOG_ADMIN.email));
    }

    #[test]
    fn test_delete_has_no_new_values() {
        let event = product_deleted("d", &catalog()[1], shop_epoch());
        assert!(event.old_values.is_some());
        assert!(event.new_values.is_none());
    }
}
