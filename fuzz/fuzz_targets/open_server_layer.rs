#![no_main]

use libfuzzer_sys::fuzz_target;
use meeshy_envelope::{SealedText, ServerLayerCipher, SymmetricKey};
use once_cell::sync::Lazy;

static KEY: Lazy<SymmetricKey> = Lazy::new(|| SymmetricKey::from_bytes([0x42; 32]));

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let a = (data[0] as usize) % (data.len() + 1);
    let b = if data.len() > 1 { (data[1] as usize) % (data.len() + 1) } else { 0 };
    let (i, j) = if a <= b { (a, b) } else { (b, a) };

    let text = |bytes: &[u8]| String::from_utf8_lossy(bytes).into_owned();
    let sealed = SealedText {
        ciphertext: text(&data[..i]),
        iv: text(&data[i..j]),
        auth_tag: text(&data[j..]),
    };

    // Forging a tag under a fixed key must never succeed
    assert!(ServerLayerCipher::new().decrypt(&sealed, &KEY).is_err());
});
