//! Fuzz target for inbound request decoding
//!
//! Arbitrary bytes arrive on the wire one line at a time; decoding must
//! never panic, and anything that decodes must re-encode to a value that
//! decodes to the same request.

#![no_main]

use libfuzzer_sys::fuzz_target;
use turnstile_proto::Request;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(request) = serde_json::from_str::<Request>(text) else {
        return;
    };

    let encoded = serde_json::to_string(&request).expect("decoded request must re-encode");
    let again: Request = serde_json::from_str(&encoded).expect("re-encoded request must decode");
    assert_eq!(request, again);
});
