use serde_json::{json, Value};

use super::{NormalizeError, Normalized, Normalizer, RawRecord, SourceConfig};
use crate::logic::identifier::derive_observable;
use crate::logic::objects::{ObjectKind, ObservableKind, SourceRef};

fn normalizer() -> Normalizer {
    Normalizer::new(SourceConfig::default()).unwrap()
}

fn record(body: Value) -> RawRecord {
    RawRecord::new(SourceRef::new("test", 0), body)
}

fn count(normalized: &Normalized, kind: ObjectKind) -> usize {
    normalized.objects.iter().filter(|o| o.kind == kind).count()
}

fn relationship_types(normalized: &Normalized) -> Vec<&str> {
    let mut types: Vec<&str> = normalized
        .relationships
        .iter()
        .map(|r| r.relationship_type.as_str())
        .collect();
    types.sort();
    types
}

#[test]
fn test_anchors() {
    let anchors = normalizer().anchors();
    assert_eq!(anchors.len(), 2);
    assert_eq!(anchors[0].kind, ObjectKind::MarkingDefinition);
    assert_eq!(anchors[1].kind, ObjectKind::Identity);
    assert_eq!(anchors[1].attr_str("name"), Some("Intel Connector"));
}

#[test]
fn test_reputation_record() {
    let out = normalizer()
        .normalize(&record(json!({
            "value": "1.2.3.4",
            "categories": {"spam": 30, "botnet": 90}
        })))
        .unwrap();

    let ip = out
        .objects
        .iter()
        .find(|o| o.kind == ObjectKind::Observable(ObservableKind::Ipv4Addr))
        .unwrap();
    assert_eq!(ip.score, Some(90));
    assert!(ip.labels.contains("spam") && ip.labels.contains("botnet"));
    assert_eq!(ip.id, derive_observable(ObservableKind::Ipv4Addr, "1.2.3.4").unwrap().id);

    assert_eq!(count(&out, ObjectKind::Indicator), 1);
    assert_eq!(relationship_types(&out), vec!["based-on"]);
}

#[test]
fn test_reputation_without_indicator() {
    let normalizer = Normalizer::new(SourceConfig {
        create_indicator: false,
        ..SourceConfig::default()
    })
    .unwrap();
    let out = normalizer
        .normalize(&record(json!({"value": "evil.com", "categories": {"cnc": "70"}})))
        .unwrap();

    assert_eq!(out.objects.len(), 1);
    assert_eq!(out.objects[0].kind, ObjectKind::Observable(ObservableKind::DomainName));
    assert!(out.relationships.is_empty());
}

#[test]
fn test_score_over_100_is_capped() {
    let out = normalizer()
        .normalize(&record(json!({"value": "1.2.3.4", "categories": {"cnc": 127}})))
        .unwrap();
    assert!(out.objects.iter().all(|o| o.score == Some(100)));
}

#[test]
fn test_indicator_record_with_malware() {
    let out = normalizer()
        .normalize(&record(json!({
            "indicator_type": "url",
            "indicator_data": "HTTP://Evil.com/payload",
            "malware_family": "Emotet",
            "confidence": "high",
            "kill_chain_phases": ["Command and Control"]
        })))
        .unwrap();

    assert_eq!(count(&out, ObjectKind::Observable(ObservableKind::Url)), 1);
    assert_eq!(count(&out, ObjectKind::Malware), 1);
    assert_eq!(relationship_types(&out), vec!["based-on", "indicates"]);

    let indicator = out.objects.iter().find(|o| o.kind == ObjectKind::Indicator).unwrap();
    assert_eq!(indicator.score, Some(80));
    assert_eq!(indicator.attr_str("pattern"), Some("[url:value = 'http://evil.com/payload']"));
    assert_eq!(
        indicator.attr("kill_chain_phases"),
        Some(&json!([{"kill_chain_name": "mitre-attack", "phase_name": "command-and-control"}]))
    );
}

#[test]
fn test_indicator_file_hash() {
    let out = normalizer()
        .normalize(&record(json!({
            "indicator_type": "sha256",
            "indicator_data": "A".repeat(64),
            "confidence": 60
        })))
        .unwrap();

    let file = out
        .objects
        .iter()
        .find(|o| o.kind == ObjectKind::Observable(ObservableKind::File))
        .unwrap();
    assert_eq!(file.attr("hashes"), Some(&json!({"SHA-256": "a".repeat(64)})));
}

#[test]
fn test_beacon_record() {
    let out = normalizer()
        .normalize(&record(json!({
            "base": "victim.example.com",
            "actorip": "5.6.7.8",
            "actorhostname": "NA"
        })))
        .unwrap();

    // base + actor ip + indicator for the actor
    assert_eq!(out.objects.len(), 3);
    assert_eq!(relationship_types(&out), vec!["based-on", "related-to"]);
}

#[test]
fn test_scan_event_record() {
    let normalizer = Normalizer::new(SourceConfig {
        min_score: 0,
        ..SourceConfig::default()
    })
    .unwrap();
    let out = normalizer
        .normalize(&record(json!({
            "timestamp": "2024-05-01 10:00:00",
            "ip": "192.0.2.10",
            "hostname": "scan.example.net",
            "asn": 64500,
            "tag": "open-proxy;Scanner",
            "severity": "medium"
        })))
        .unwrap();

    assert_eq!(out.objects.len(), 3);
    assert!(out.objects.iter().all(|o| o.score == Some(50)));
    assert!(out.objects.iter().all(|o| o.labels.contains("open-proxy") && o.labels.contains("scanner")));
    assert_eq!(relationship_types(&out), vec!["related-to", "related-to"]);
    assert_eq!(count(&out, ObjectKind::NetworkTraffic), 0);
}

#[test]
fn test_scan_port_and_protocol_yield_network_traffic() {
    let out = normalizer()
        .normalize(&record(json!({
            "timestamp": "2024-05-01 10:00:00",
            "ip": "192.0.2.10",
            "port": "8080",
            "protocol": "TCP",
            "severity": "high"
        })))
        .unwrap();

    let ip = derive_observable(ObservableKind::Ipv4Addr, "192.0.2.10").unwrap();
    let traffic = out
        .objects
        .iter()
        .find(|o| o.kind == ObjectKind::NetworkTraffic)
        .unwrap();

    assert_eq!(traffic.attr_str("dst_ref"), Some(ip.id.as_str()));
    assert_eq!(traffic.attr("dst_port"), Some(&json!(8080)));
    assert_eq!(traffic.attr("protocols"), Some(&json!(["tcp"])));
    assert_eq!(traffic.attr("is_active"), Some(&json!(false)));
    assert_eq!(traffic.attr_str("start"), Some("2024-05-01T10:00:00Z"));
    assert_eq!(traffic.attr_str("end"), Some("2024-05-01T10:00:00Z"));
    assert_eq!(
        traffic.attr_str("x_description"),
        Some("Network Traffic 192.0.2.10 - tcp:8080")
    );
    assert_eq!(traffic.score, Some(80));

    let edge = out
        .relationships
        .iter()
        .find(|r| r.target_id == traffic.id)
        .unwrap();
    assert_eq!(edge.relationship_type, "related-to");
    assert_eq!(edge.source_id, ip.id);

    // Same destination, port and protocol from another row: same object
    let again = normalizer()
        .normalize(&record(json!({"ip": "192.0.2.10", "port": 8080, "protocol": "tcp", "tag": "proxy", "severity": "high"})))
        .unwrap();
    assert!(again.objects.iter().any(|o| o.id == traffic.id));
}

#[test]
fn test_scan_traffic_needs_port_and_protocol() {
    let n = normalizer();
    for body in [
        json!({"ip": "192.0.2.10", "port": 8080, "severity": "high"}),
        json!({"ip": "192.0.2.10", "protocol": "tcp", "severity": "high"}),
        json!({"ip": "192.0.2.10", "port": "http", "protocol": "tcp", "severity": "high"}),
    ] {
        let out = n.normalize(&record(body)).unwrap();
        assert_eq!(count(&out, ObjectKind::NetworkTraffic), 0);
        assert_eq!(count(&out, ObjectKind::Observable(ObservableKind::Ipv4Addr)), 1);
    }
}

#[test]
fn test_report_record() {
    let normalizer = Normalizer::new(SourceConfig {
        min_score: 0,
        ..SourceConfig::default()
    })
    .unwrap();
    let out = normalizer
        .normalize(&record(json!({"file_name": "scan_2024.csv", "content": "ip,port\n1.2.3.4,80\n"})))
        .unwrap();

    assert_eq!(out.objects.len(), 1);
    let artifact = &out.objects[0];
    assert_eq!(artifact.kind, ObjectKind::Artifact);
    assert_eq!(artifact.score, Some(0));
    assert_eq!(artifact.attr_str("mime_type"), Some("text/csv"));
    assert!(artifact.attr("payload_bin").is_some());
}

#[test]
fn test_blocklist_record() {
    let out = normalizer()
        .normalize(&record(json!({"feed": "ET-Compromised", "value": "10.0.0.1", "observable_type": "ipv4"})))
        .unwrap();

    let ip = out.objects.iter().find(|o| o.kind.is_observable()).unwrap();
    assert_eq!(ip.score, Some(crate::constants::DEFAULT_FEED_SCORE));
    assert!(ip.labels.contains("et-compromised"));
}

#[test]
fn test_floor_filters_low_scores() {
    let out = normalizer()
        .normalize(&record(json!({"value": "1.2.3.4", "categories": {"spam": 15}})))
        .unwrap();
    assert!(out.objects.is_empty());
    assert!(out.relationships.is_empty());
    assert_eq!(out.filtered, 2);
}

#[test]
fn test_floor_applies_to_malware_and_artifacts() {
    let n = normalizer();

    let out = n
        .normalize(&record(json!({
            "indicator_type": "domain",
            "indicator_data": "evil.com",
            "malware_family": "qakbot",
            "confidence": 10
        })))
        .unwrap();
    assert!(out.objects.is_empty());
    assert!(out.relationships.is_empty());
    assert_eq!(out.filtered, 3);

    let out = n
        .normalize(&record(json!({"file_name": "scan.csv", "content": "ip\n1.2.3.4\n"})))
        .unwrap();
    assert!(out.objects.is_empty());
    assert_eq!(out.filtered, 1);
}

#[test]
fn test_malware_shares_indicator_score() {
    let out = normalizer()
        .normalize(&record(json!({
            "indicator_type": "domain",
            "indicator_data": "evil.com",
            "malware_family": "qakbot",
            "confidence": 65
        })))
        .unwrap();

    let malware = out.objects.iter().find(|o| o.kind == ObjectKind::Malware).unwrap();
    let indicator = out.objects.iter().find(|o| o.kind == ObjectKind::Indicator).unwrap();
    assert_eq!(malware.score, Some(65));
    assert_eq!(malware.score, indicator.score);
}

#[test]
fn test_unsupported_and_invalid() {
    let n = normalizer();
    assert_eq!(n.normalize(&record(json!({"hello": "world"}))).unwrap_err(), NormalizeError::Unsupported);
    assert_eq!(n.normalize(&record(json!("just a string"))).unwrap_err(), NormalizeError::Unsupported);

    let err = n
        .normalize(&record(json!({"indicator_type": "ipv4", "indicator_data": "999.1.1.1"})))
        .unwrap_err();
    assert!(matches!(err, NormalizeError::InvalidFields(_)));
    assert_eq!(err.cause(), "invalid");
}

#[test]
fn test_normalization_is_idempotent() {
    let n = normalizer();
    let raw = record(json!({"value": "1.2.3.4", "categories": {"spam": 30}}));
    let a = n.normalize(&raw).unwrap();
    let b = n.normalize(&raw).unwrap();

    let ids = |x: &Normalized| x.objects.iter().map(|o| o.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&a), ids(&b));
}
