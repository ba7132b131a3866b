// firebase-uid ownership rules applied to CMS payloads

use serde_json::Value;

/// Header carrying the caller's Firebase user id
pub const OWNER_HEADER: &str = "firebase-uid";

/// CMS field holding the owning Firebase user id
pub const OWNER_FIELD: &str = "firebase-uid";

/// What a CMS path addresses, as far as ownership is concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemScope {
    /// `.../collections/{id}/items/{item_id}[/...]`; carries the canonical
    /// item path used to look up the owner
    Item(String),
    /// `.../collections/{id}/items` (list, create, bulk writes)
    Collection,
    /// `.../collections/{id}/items/{live,publish,bulk}`
    CollectionAction,
    /// Anything else (sites, collection schemas, assets)
    Other,
}

/// Collection-level endpoints that share the `items/{item_id}` shape
const COLLECTION_ACTIONS: [&str; 3] = ["live", "publish", "bulk"];

/// Classify a CMS path relative to the API root
pub fn item_scope(path: &str) -> ItemScope {
    let segments: Vec<&str> = path
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    for (i, window) in segments.windows(3).enumerate() {
        if window[0] == "collections" && window[2] == "items" {
            return match segments.get(i + 3) {
                None => ItemScope::Collection,
                Some(action) if COLLECTION_ACTIONS.contains(action) => {
                    ItemScope::CollectionAction
                }
                Some(item_id) => ItemScope::Item(segments[..i + 3].join("/") + "/" + item_id),
            };
        }
    }
    ItemScope::Other
}

/// Owner of a CMS item; `fieldData` (v2) wins over top-level fields (v1)
fn item_owner(item: &Value) -> Option<&str> {
    item.get("fieldData")
        .and_then(|fields| fields.get(OWNER_FIELD))
        .or_else(|| item.get(OWNER_FIELD))
        .and_then(Value::as_str)
}

/// True when the item carries `uid` as its owner
pub fn is_owned_by(item: &Value, uid: &str) -> bool {
    item_owner(item) == Some(uid)
}

/// Drop list items not owned by `uid`. Payloads without an `items` array are
/// returned unchanged.
pub fn filter_owned_items(mut body: Value, uid: &str) -> Value {
    if let Some(items) = body.get_mut("items").and_then(Value::as_array_mut) {
        let before = items.len();
        items.retain(|item| is_owned_by(item, uid));
        tracing::debug!(
            "Ownership filter kept {} of {} items for uid {}",
            items.len(),
            before,
            uid
        );

        let kept = items.len();
        if let Some(count) = body.get_mut("count") {
            *count = Value::from(kept);
        }
        // Page-local total; other owners' items are not counted
        if let Some(total) = body.pointer_mut("/pagination/total") {
            *total = Value::from(kept);
        }
    }
    body
}

/// Write `uid` into the item's field data so the record is owned by the caller
pub fn stamp_owner(mut body: Value, uid: &str) -> Value {
    if let Some(obj) = body.as_object_mut() {
        match obj.get_mut("fieldData").and_then(Value::as_object_mut) {
            Some(fields) => {
                fields.insert(OWNER_FIELD.to_string(), Value::from(uid));
            }
            None => {
                obj.insert(OWNER_FIELD.to_string(), Value::from(uid));
            }
        }
    }
    body
}
