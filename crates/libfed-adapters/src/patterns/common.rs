//! Shared JSON-holding extraction used by adapter patterns whose wire
//! format is "a generic `items` array of branch/status/call-number
//! objects" rather than a vendor-specific envelope — the browser-context
//! façade (pattern g) and the aggregate-source adapter both shape their
//! responses this way once the collaborator/aggregator has done its own
//! normalization.

use libfed_domain::{BookHolding, BranchId, MaterialType, Status, SystemId};
use serde_json::Value;

use crate::base::fingerprint;
use crate::normalize::{normalize_material, normalize_status};

/// Parse a `{"items": [{branch, status, callNumber, materialType}, ...]}`
/// payload into holdings, using `Unknown` placeholders for absent fields
/// rather than rejecting the record outright.
pub fn holdings_from_generic_json(
    system_id: &SystemId,
    system_name: &str,
    catalog_url: &str,
    isbn13: &str,
    payload: &Value,
) -> Vec<BookHolding> {
    let items = payload.get("items").and_then(Value::as_array).cloned().unwrap_or_default();

    items
        .iter()
        .map(|item| {
            let branch_name = item.get("branch").and_then(Value::as_str).filter(|s| !s.is_empty()).unwrap_or("Unknown").to_string();
            let call_number = item.get("callNumber").and_then(Value::as_str).map(str::to_string);
            let raw_status = item.get("status").and_then(Value::as_str).unwrap_or("").to_string();
            let material = item.get("materialType").and_then(Value::as_str).unwrap_or("");
            let branch_id = BranchId::new(system_id, &branch_name);

            BookHolding {
                isbn: isbn13.to_string(),
                system_id: system_id.clone(),
                branch_id,
                system_name: system_name.to_string(),
                branch_name: branch_name.clone(),
                call_number: call_number.clone(),
                collection: String::new(),
                volume: None,
                material_type: if material.is_empty() { MaterialType::Unknown } else { normalize_material(material) },
                status: if raw_status.is_empty() { Status::Unknown } else { normalize_status(&raw_status) },
                due_date: None,
                hold_count: None,
                copy_count: None,
                raw_status,
                catalog_url: catalog_url.to_string(),
                fingerprint: fingerprint(system_id.as_ref(), isbn13, Some(&branch_name), call_number.as_deref(), None),
                is_secondary_source: false,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_items_yields_empty_vec() {
        let payload = serde_json::json!({ "items": [] });
        let holdings = holdings_from_generic_json(&SystemId::from("sys-a"), "Sys A", "https://example.org", "9780306406157", &payload);
        assert!(holdings.is_empty());
    }

    #[test]
    fn missing_fields_fall_back_to_unknown() {
        let payload = serde_json::json!({ "items": [{}] });
        let holdings = holdings_from_generic_json(&SystemId::from("sys-a"), "Sys A", "https://example.org", "9780306406157", &payload);
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].branch_name, "Unknown");
        assert_eq!(holdings[0].status, Status::Unknown);
        assert_eq!(holdings[0].material_type, MaterialType::Unknown);
    }
}
