#![no_main]

use libfuzzer_sys::fuzz_target;
use wayfarer_networking::protocols::parse_response_header;

fuzz_target!(|data: &[u8]| {
    // Headers never exceed the status, a space, 1024 bytes of meta and CRLF
    if data.len() > 2048 {
        return;
    }

    if let Ok(header) = parse_response_header(data) {
        let _ = header.outcome();
    }
});
