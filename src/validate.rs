//! Structural check for hybrid payloads arriving from outside.

use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::Value;

use crate::payload::PayloadMode;

/// The envelope of [`HybridPayload`](crate::HybridPayload) with the layer
/// contents left unparsed. Field names and the mode tag come from the same
/// serde attributes, so the two cannot disagree on spelling.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayloadShape {
    #[allow(dead_code)]
    e2ee: IgnoredAny,
    #[allow(dead_code)]
    server: IgnoredAny,
    mode: PayloadMode,
    #[allow(dead_code)]
    can_translate: IgnoredAny,
    #[allow(dead_code)]
    timestamp: IgnoredAny,
}

/// Whether `value` looks like a hybrid payload.
///
/// True for any object that has `e2ee`, `server`, `canTranslate` and
/// `timestamp` keys and `"mode": "hybrid"`. The layers themselves are not
/// inspected. Never panics.
pub fn is_valid_hybrid_payload(value: &Value) -> bool {
    if !value.is_object() {
        return false;
    }
    matches!(
        PayloadShape::deserialize(value),
        Ok(PayloadShape { mode: PayloadMode::Hybrid, .. })
    )
}
