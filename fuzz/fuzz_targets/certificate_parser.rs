#![no_main]

use libfuzzer_sys::fuzz_target;
use wayfarer_security::HostCertificate;

fuzz_target!(|data: &[u8]| {
    if let Ok(certificate) = HostCertificate::from_der(data) {
        let _ = certificate.fingerprint();
        let _ = certificate.subject();
    }
});
