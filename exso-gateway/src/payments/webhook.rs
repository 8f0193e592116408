//! Payment provider webhook events
//!
//! Events arrive as loosely-shaped JSON; only a few paths matter, so they
//! are read straight off a `serde_json::Value`.

use serde_json::Value;

use crate::ledger::PaymentReceipt;

/// Event names that mean money changed hands
const PAID_EVENTS: &[&str] = &["order_created", "order_paid"];

/// Where providers put the caller-supplied reference, in priority order
const REFERENCE_PATHS: &[&[&str]] = &[
    &["meta", "custom_data", "payment_nonce"],
    &["meta", "payment_nonce"],
    &["data", "attributes", "checkout_data", "custom", "payment_nonce"],
    &["data", "attributes", "custom_data", "payment_nonce"],
    &["data", "attributes", "payment_nonce"],
    &["data", "attributes", "first_order_item", "custom", "payment_nonce"],
    &["data", "metadata", "payment_nonce"],
    &["data", "object", "client_reference_id"],
    &["data", "object", "metadata", "payment_nonce"],
];

fn lookup<'a>(event: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(event, |node, key| node.get(*key))
}

fn lookup_string(event: &Value, path: &[&str]) -> Option<String> {
    match lookup(event, path)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn event_name(event: &Value) -> Option<String> {
    lookup_string(event, &["meta", "event_name"])
        .or_else(|| lookup_string(event, &["type"]))
}

/// A paid status or one of the paid event names
pub fn is_paid_event(event: &Value) -> bool {
    let status = lookup_string(event, &["data", "attributes", "status"])
        .or_else(|| lookup_string(event, &["data", "object", "payment_status"]))
        .unwrap_or_default();
    if status.eq_ignore_ascii_case("paid") {
        return true;
    }
    event_name(event)
        .map(|name| PAID_EVENTS.contains(&name.as_str()) || name == "checkout.session.completed")
        .unwrap_or(false)
}

/// First non-blank reference found, trimmed
pub fn extract_reference(event: &Value) -> Option<String> {
    REFERENCE_PATHS.iter().find_map(|path| match lookup(event, path)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}

pub fn receipt(event: &Value) -> PaymentReceipt {
    PaymentReceipt {
        event_name: event_name(event),
        order_id: lookup_string(event, &["data", "id"]),
        checkout_id: lookup_string(event, &["data", "attributes", "identifier"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_paid_by_event_name_or_status() {
        assert!(is_paid_event(&json!({"meta": {"event_name": "order_created"}})));
        assert!(is_paid_event(&json!({"meta": {"event_name": "order_paid"}})));
        assert!(is_paid_event(&json!({
            "meta": {"event_name": "subscription_updated"},
            "data": {"attributes": {"status": "PAID"}}
        })));
        assert!(!is_paid_event(&json!({"meta": {"event_name": "order_refunded"}})));
        assert!(!is_paid_event(&json!({})));
        assert!(!is_paid_event(&json!(null)));
    }

    #[test]
    fn test_reference_priority_and_trimming() {
        let event = json!({
            "meta": {"custom_data": {"payment_nonce": "  first  "}},
            "data": {"attributes": {"payment_nonce": "second"}}
        });
        assert_eq!(extract_reference(&event).as_deref(), Some("first"));

        let event = json!({
            "meta": {"custom_data": {"payment_nonce": "   "}},
            "data": {"attributes": {"first_order_item": {"custom": {"payment_nonce": "deep"}}}}
        });
        assert_eq!(extract_reference(&event).as_deref(), Some("deep"));

        let event = json!({"meta": {"payment_nonce": 42}});
        assert_eq!(extract_reference(&event), None);
    }

    #[test]
    fn test_receipt_fields() {
        let event = json!({
            "meta": {"event_name": "order_created"},
            "data": {"id": 991, "attributes": {"identifier": "chk_1"}}
        });
        assert_eq!(
            receipt(&event),
            PaymentReceipt {
                event_name: Some("order_created".into()),
                order_id: Some("991".into()),
                checkout_id: Some("chk_1".into()),
            }
        );
    }
}
