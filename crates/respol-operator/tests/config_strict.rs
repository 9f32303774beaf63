#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use respol_core::error::ErrorClass;
use respol_operator::config::{self, StoreBackend};

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
controller:
  workerz: 4 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.class(), ErrorClass::Client);
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.controller.resync_secs, 60);
    assert_eq!(cfg.admission.path, "/validate-deployment");
    assert!(!cfg.admission.fail_open);
    assert_eq!(cfg.engine.query, "data.kubernetes.policy.allow");
    assert_eq!(cfg.store.backend, StoreBackend::Memory);
    assert_eq!(
        cfg.operator.cert_path().to_str(),
        Some("/tmp/k8s-webhook-server/serving-certs/tls.crt")
    );
}

#[test]
fn full_config() {
    let ok = r#"
version: 1
operator:
  webhook_listen: "127.0.0.1:9443"
  tls: false
controller:
  workers: 4
  resync_secs: 30
admission:
  timeout_ms: 2000
  fail_open: true
engine:
  cache: true
  cache_capacity: 16
store:
  backend: memory
  seed_path: ./seed.yaml
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.controller.workers, 4);
    assert!(cfg.admission.fail_open);
    assert!(cfg.engine.cache);
    assert!(!cfg.operator.tls);
}

#[test]
fn rejects_out_of_range_values() {
    for bad in [
        "version: 2\n",
        "version: 1\ncontroller: { workers: 0 }\n",
        "version: 1\ncontroller: { backoff_base_ms: 100, backoff_max_ms: 10 }\n",
        "version: 1\nadmission: { timeout_ms: 50 }\n",
        "version: 1\nadmission: { path: validate }\n",
        "version: 1\noperator: { probe_listen: \"nope\" }\n",
        "version: 1\nengine: { cache: true, cache_capacity: 0 }\n",
        "version: 1\nstore: { backend: kubernetes, seed_path: x.yaml }\n",
    ] {
        assert!(config::load_from_str(bad).is_err(), "accepted: {bad}");
    }
}

#[test]
fn bare_port_listen_binds_all_interfaces() {
    let cfg = config::load_from_str("version: 1\noperator: { metrics_listen: \":8080\", probe_listen: \":8081\" }\n")
        .expect("must parse");
    assert_eq!(cfg.operator.metrics_addr().unwrap().to_string(), "0.0.0.0:8080");
    assert_eq!(cfg.operator.probe_addr().unwrap().to_string(), "0.0.0.0:8081");
    assert_eq!(config::parse_listen("127.0.0.1:9443").unwrap().port(), 9443);
    assert!(config::parse_listen(":http").is_err());
}
