#![no_main]

use libfuzzer_sys::fuzz_target;
use wayfarer_networking::{GopherSelector, Location};

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Keep inputs in the range a request line can carry
        if input.len() > 4096 {
            return;
        }

        if let Ok(location) = Location::parse(input) {
            let _ = location.cache_key();
            let _ = location.root();
            let _ = location.parent();
            let _ = location.resolve("../other?q");
            let _ = location.with_query(input);
            if location.scheme() == "gopher" {
                let _ = GopherSelector::from_location(&location).request_line();
            }
        }
    }
});
