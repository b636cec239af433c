//! Property-based tests for URI templates and template specs
//!
//! These verify that variable expansion is lossless, that spec strings
//! parse back into the criteria they were built from, and that malformed
//! specs are rejected instead of half-applied.

use multicloud::compute::{OsFamily, TemplateBuilderSpec};
use multicloud::http::{add_host_if_missing, uri_builder};
use proptest::prelude::*;
use std::collections::HashMap;
use url::Url;

/// Values that survive url normalization (no dot segments)
fn arb_value() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 _~!*()@,&+$-]{1,24}"
}

fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn decode(s: &str) -> String {
    urlencoding::decode(s).map(|c| c.into_owned()).unwrap_or_default()
}

proptest! {
    /// A path variable decodes back to the value it was built from
    #[test]
    fn path_variable_round_trips(value in arb_value()) {
        let url = uri_builder("https://api.example.com/v1/{id}")
            .build(&vars(&[("id", &value)]))
            .unwrap();
        let segment = url.path().trim_start_matches("/v1/");
        prop_assert_eq!(decode(segment), value);
    }

    /// Query variables come back out of the parsed query untouched
    #[test]
    fn query_variable_round_trips(value in arb_value(), key in "[a-z]{1,8}") {
        let template = format!("https://api.example.com/servers?{}={{v}}", key);
        let url = uri_builder(&template).build(&vars(&[("v", &value)])).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        prop_assert_eq!(pairs, vec![(key, value)]);
    }

    /// Expansion never leaves a `{name}` token behind
    #[test]
    fn no_unexpanded_tokens(a in "[a-z0-9]{1,10}", b in "[a-z0-9]{1,10}") {
        let url = uri_builder("https://{a}.example.com/{b}/{a}")
            .build(&vars(&[("a", &a), ("b", &b)]))
            .unwrap();
        prop_assert!(!url.as_str().contains('{'), "url contains an unexpanded '{{'");
        let expected_host = format!("{}.example.com", a);
        prop_assert_eq!(url.host_str(), Some(expected_host.as_str()));
    }

    /// Relative endpoints borrow the scheme, host and port of the base
    #[test]
    fn add_host_keeps_base_authority(path in "(/[a-z0-9]{1,8}){1,4}", port in 1024u16..65535) {
        let base = Url::parse(&format!("https://compute.example.com:{}/api", port)).unwrap();
        let url = add_host_if_missing(&path, &base).unwrap();
        prop_assert_eq!(url.host_str(), Some("compute.example.com"));
        prop_assert_eq!(url.port(), Some(port));
        prop_assert_eq!(url.path(), path.as_str());
    }
}

// =============================================================================
// Template specs
// =============================================================================

fn arb_family() -> impl Strategy<Value = OsFamily> {
    prop::sample::select(OsFamily::ALL.to_vec())
}

proptest! {
    /// Hardware and image criteria parse back into typed fields
    #[test]
    fn spec_fields_round_trip(
        cores in 1u32..64,
        ram in 256u32..262144,
        family in arb_family(),
        is_64bit in any::<bool>(),
        location in "[a-z]{2}-[a-z]{4,8}-[0-9]",
    ) {
        let text = format!(
            "minCores={}, minRam={}, osFamily={}, os64Bit={}, locationId={}",
            cores, ram, family, is_64bit, location
        );
        let spec = TemplateBuilderSpec::parse(&text).unwrap();
        prop_assert_eq!(spec.min_cores, Some(cores as f64));
        prop_assert_eq!(spec.min_ram, Some(ram));
        prop_assert_eq!(spec.os_family, Some(family));
        prop_assert_eq!(spec.os_64bit, Some(is_64bit));
        prop_assert_eq!(spec.location_id.clone(), Some(location));
        prop_assert_eq!(spec.to_string(), text);
    }

    /// Keys outside the known set are rejected by name
    #[test]
    fn unknown_keys_rejected(key in "[a-z]{3,12}Zz", value in "[a-z0-9]{1,8}") {
        let err = TemplateBuilderSpec::parse(&format!("{}={}", key, value)).unwrap_err();
        prop_assert_eq!(err.to_string(), format!("unknown key {}", key));
    }

    /// Non-numeric ram is a type error, never silently ignored
    #[test]
    fn non_numeric_ram_rejected(value in "[a-z]{1,8}") {
        let err = TemplateBuilderSpec::parse(&format!("minRam={}", value)).unwrap_err();
        prop_assert_eq!(
            err.to_string(),
            format!("key minRam value set to {}, must be integer", value)
        );
    }

    /// An image id conflicts with every image criterion
    #[test]
    fn image_id_conflicts_with_family(family in arb_family(), id in "[a-z0-9-]{1,12}") {
        let err = TemplateBuilderSpec::parse(&format!("osFamily={},imageId={}", family, id)).unwrap_err();
        prop_assert_eq!(
            err.to_string(),
            format!("operating system family was already set to {}", family)
        );
    }
}
