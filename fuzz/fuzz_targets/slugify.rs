#![no_main]

use libfuzzer_sys::fuzz_target;
use scoutpost_core::naming::{InstanceNames, slugify, validate_identity};

fuzz_target!(|data: &[u8]| {
    let Ok(identity) = std::str::from_utf8(data) else {
        return;
    };

    let slug = slugify(identity);
    assert!(
        slug.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'),
        "slug outside alphabet: {slug:?}"
    );
    assert_eq!(slugify(&slug), slug, "slugify is not idempotent");

    // accepted identities must yield names docker and the proxy accept
    if validate_identity(identity).is_ok() {
        let names = InstanceNames::derive(identity);
        assert!(!names.subdomain.trim_matches('-').is_empty());
        assert!(names.container_name.starts_with("ns_"));
        assert!(names.db_name.starts_with("ns_user_"));
    }
});
