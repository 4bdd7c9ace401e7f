#![no_main]

use libfuzzer_sys::fuzz_target;
use meeshy_hybrid::{is_valid_hybrid_payload, HybridPayload, PayloadMode};

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    let valid = is_valid_hybrid_payload(&value);
    // Anything the strict parser accepts in hybrid mode, the validator accepts
    if let Ok(payload) = HybridPayload::from_json(value) {
        if payload.mode == PayloadMode::Hybrid {
            assert!(valid);
        }
    }
});
