#![no_main]
use geoipd::{Database, GeoIpService, IpRequest};
use libfuzzer_sys::fuzz_target;
use std::sync::{Arc, OnceLock};

/// Smallest valid IPv6 database: one node, both records "no data"
fn service() -> &'static GeoIpService {
    static SERVICE: OnceLock<GeoIpService> = OnceLock::new();
    SERVICE.get_or_init(|| {
        let mut image = vec![0, 0, 1, 0, 0, 1];
        image.extend_from_slice(&[0u8; 16]);
        image.extend_from_slice(b"\xAB\xCD\xEFMaxMind.com");
        // {binary_format_major_version: 2, ip_version: 6, node_count: 1, record_size: 24}
        image.push(0xE4);
        for (key, value) in [
            ("binary_format_major_version", 2u8),
            ("ip_version", 6),
            ("node_count", 1),
            ("record_size", 24),
        ] {
            image.push(0x40 | key.len() as u8);
            image.extend_from_slice(key.as_bytes());
            image.extend_from_slice(&[0xA1, value]);
        }
        let db = Database::from_bytes(image).expect("valid image");
        GeoIpService::new(Arc::new(db))
    })
}

fuzz_target!(|data: &[u8]| {
    // Arbitrary text must come back as a declared failure, never a panic
    if let Ok(s) = std::str::from_utf8(data) {
        let req = IpRequest::new(s);
        let _ = service().query_country(&req);
        let _ = service().query_city(&req);
        let _ = service().query_subdivision(&req);
    }
});
