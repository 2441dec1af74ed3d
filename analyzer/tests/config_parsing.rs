//! Endpoint and probe-path import: JSON, headered CSV, positional CSV,
//! and the row-numbered validation errors.

use locus_analyzer::config::{
    parse_endpoints_text, parse_probe_paths_text, validate_endpoints, validate_probe_paths,
};
use rstest::rstest;

#[test]
fn csv_with_headers_parses_one_endpoint() {
    let text = "id,host,port,region,lat,lon\nnyc,1.2.3.4,9000,us-east,40.7,-74.0\n";
    let endpoints = parse_endpoints_text(text).unwrap();
    assert_eq!(endpoints.len(), 1);
    let ep = &endpoints[0];
    assert_eq!(ep.id, "nyc");
    assert_eq!(ep.host, "1.2.3.4");
    assert_eq!(ep.port, 9000);
    assert_eq!(ep.region_hint.as_deref(), Some("us-east"));
    assert_eq!(ep.lat, Some(40.7));
    assert_eq!(ep.lon, Some(-74.0));
}

#[test]
fn json_array_parses() {
    let text = r#"[{"id":"sto","host":"5.6.7.8","port":9000,"lat":59.3,"lon":18.0}]"#;
    let endpoints = parse_endpoints_text(text).unwrap();
    assert_eq!(endpoints.len(), 1);
    assert_eq!(endpoints[0].id, "sto");
    assert_eq!(endpoints[0].host, "5.6.7.8");
}

#[test]
fn json_object_with_endpoints_key_parses() {
    let text = r#"{"endpoints":[{"id":"a","host":"h","port":1234}]}"#;
    let endpoints = parse_endpoints_text(text).unwrap();
    assert_eq!(endpoints.len(), 1);
    assert_eq!(endpoints[0].port, 1234);
}

#[test]
fn positional_csv_defaults_the_port() {
    let text = "ams,2.3.4.5\nsyd,6.7.8.9,9100,ap-south,-33.9,151.2\n";
    let endpoints = parse_endpoints_text(text).unwrap();
    assert_eq!(endpoints.len(), 2);
    assert_eq!(endpoints[0].port, 9000);
    assert_eq!(endpoints[0].region_hint, None);
    assert_eq!(endpoints[1].port, 9100);
    assert_eq!(endpoints[1].lat, Some(-33.9));
}

#[test]
fn rows_without_id_or_host_are_skipped() {
    let text = "id,host,port\n,1.2.3.4,9000\nok,2.2.2.2,9000\n";
    let endpoints = parse_endpoints_text(text).unwrap();
    assert_eq!(endpoints.len(), 1);
    assert_eq!(endpoints[0].id, "ok");
}

#[test]
fn empty_input_yields_no_endpoints() {
    assert!(parse_endpoints_text("").unwrap().is_empty());
    assert!(parse_endpoints_text("   \n  ").unwrap().is_empty());
}

#[test]
fn non_numeric_port_is_a_parse_error() {
    let text = "id,host,port\nbad,1.2.3.4,notaport\n";
    assert!(parse_endpoints_text(text).is_err());
}

#[rstest]
#[case("id,host,port,region,lat,lon\na,h,70000,r,0,0\n", "invalid port")]
#[case("id,host,port,region,lat,lon\na,h,9000,r,95.0,0\n", "invalid lat")]
#[case("id,host,port,region,lat,lon\na,h,9000,r,0,190.0\n", "invalid lon")]
fn out_of_range_fields_fail_validation(#[case] text: &str, #[case] expected: &str) {
    let endpoints = parse_endpoints_text(text).unwrap();
    let errors = validate_endpoints(&endpoints);
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].contains(expected), "{errors:?}");
    assert!(errors[0].starts_with("Row 1:"), "{errors:?}");
}

#[test]
fn duplicate_ids_fail_validation() {
    let text = "id,host,port\na,h1,9000\na,h2,9000\n";
    let endpoints = parse_endpoints_text(text).unwrap();
    let errors = validate_endpoints(&endpoints);
    assert_eq!(errors, vec!["Row 2: duplicate id a".to_string()]);
}

#[test]
fn probe_paths_csv_parses() {
    let text = "id,bindInterface,bindIp\nvpn,,\ndirect,en0,\n";
    let paths = parse_probe_paths_text(text).unwrap();
    assert_eq!(paths.len(), 2);
    assert_eq!(paths[0].id, "vpn");
    assert_eq!(paths[0].bind_interface, None);
    assert_eq!(paths[1].bind_interface.as_deref(), Some("en0"));
}

#[test]
fn probe_paths_validate_bind_ip() {
    let text = r#"[{"id":"vpn","bindIp":"10.0.0.1"},{"id":"bad","bindIp":"not-an-ip"}]"#;
    let paths = parse_probe_paths_text(text).unwrap();
    let errors = validate_probe_paths(&paths);
    assert_eq!(errors, vec!["Path 2: invalid bindIp not-an-ip".to_string()]);
}
