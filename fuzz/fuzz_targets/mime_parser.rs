#![no_main]

use libfuzzer_sys::fuzz_target;
use wayfarer_networking::MimeType;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let mime = MimeType::parse_or_octet_stream(input);
        let _ = mime.charset();
        let _ = mime.is_text();
        let _ = mime.to_string();
    }
});
