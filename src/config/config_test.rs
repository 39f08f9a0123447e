use serial_test::serial;
use temp_env::with_vars;

use super::*;

fn cleanup_all_txn_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("TXN__") || key == "CONFIG_PATH" {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_config_should_initialize_with_hardcoded_values() {
    let config = CoordinatorConfig::default();

    assert_eq!(config.cluster.node_id, 1);
    assert_eq!(config.cluster.logical_version, crate::LogicalVersion::CURRENT.0);
    assert_eq!(config.transaction.num_shards, 4);
    assert_eq!(config.transaction.max_timeout_ms, 900_000);
    assert_eq!(config.offsets.num_partitions, 8);
    assert!(!config.monitoring.prometheus_enabled);
}

#[test]
#[serial]
fn new_should_merge_environment_overrides() {
    cleanup_all_txn_env_vars();
    with_vars(
        vec![
            ("TXN__TRANSACTION__NUM_SHARDS", Some("16")),
            ("TXN__CLUSTER__LOGICAL_VERSION", Some("5")),
        ],
        || {
            let config = CoordinatorConfig::new().unwrap();

            assert_eq!(config.transaction.num_shards, 16);
            assert_eq!(config.cluster.logical_version, 5);
        },
    );
}

#[test]
#[serial]
fn new_should_load_file_from_config_path() {
    cleanup_all_txn_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("node.toml");
    std::fs::write(
        &config_path,
        r#"
        [group]
        session_timeout_ms = 6000
        member_expiry_interval_ms = 500
        "#,
    )
    .unwrap();

    with_vars(vec![("CONFIG_PATH", Some(config_path.to_str().unwrap()))], || {
        let config = CoordinatorConfig::new().unwrap();

        assert_eq!(config.group.session_timeout_ms, 6000);
        assert_eq!(config.group.member_expiry_interval_ms, 500);
        // Untouched sections keep their defaults
        assert_eq!(config.transaction.num_shards, 4);
    });
}

#[test]
#[serial]
fn with_override_config_should_merge_file_settings() {
    cleanup_all_txn_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("dynamic_config.toml");

    std::fs::write(
        &config_path,
        r#"
        [cluster]
        db_root_dir = "/tmp/xx/db"

        [retry.marker_write]
        max_retries = 9
        base_delay_ms = 5
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let base_config = CoordinatorConfig::new().expect("success");
        let config = base_config
            .with_override_config(config_path.to_str().unwrap())
            .unwrap();

        assert_eq!(
            config.cluster.db_root_dir.as_os_str().to_str(),
            Some("/tmp/xx/db")
        );
        assert_eq!(config.retry.marker_write.max_retries, 9);
        assert_eq!(config.retry.marker_write.base_delay_ms, 5);
    });
}

#[test]
#[serial]
fn environment_should_win_over_override_file() {
    cleanup_all_txn_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("override.toml");
    std::fs::write(&config_path, "[offsets]\nnum_partitions = 3\n").unwrap();

    with_vars(vec![("TXN__OFFSETS__NUM_PARTITIONS", Some("12"))], || {
        let config = CoordinatorConfig::default()
            .with_override_config(config_path.to_str().unwrap())
            .unwrap();

        assert_eq!(config.offsets.num_partitions, 12);
    });
}

#[test]
fn validation_should_fail_with_invalid_cluster_config() {
    let mut config = CoordinatorConfig::default();
    config.cluster.node_id = 0;

    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_unsupported_logical_version() {
    let mut config = CoordinatorConfig::default();
    config.cluster.logical_version = crate::LogicalVersion::CURRENT.0 + 1;

    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_duplicate_cluster_members() {
    let mut config = CoordinatorConfig::default();
    config.cluster.initial_cluster = vec![
        ClusterMember {
            id: 2,
            logical_version: 6,
        },
        ClusterMember {
            id: 2,
            logical_version: 5,
        },
    ];

    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_default_timeout_above_max() {
    let mut config = CoordinatorConfig::default();
    config.transaction.default_timeout_ms = config.transaction.max_timeout_ms + 1;

    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_zero_shards_and_partitions() {
    let mut config = CoordinatorConfig::default();
    config.transaction.num_shards = 0;
    assert!(config.validate().is_err());

    let mut config = CoordinatorConfig::default();
    config.offsets.num_partitions = 0;
    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_inverted_backoff() {
    let mut config = CoordinatorConfig::default();
    config.retry.log_append.base_delay_ms = 10_000;
    config.retry.log_append.max_delay_ms = 10;

    assert!(config.validate().is_err());
}

#[test]
fn validation_should_reject_privileged_prometheus_port() {
    let mut config = CoordinatorConfig::default();
    config.monitoring.prometheus_enabled = true;
    config.monitoring.prometheus_port = 80;

    assert!(config.validate().is_err());
}

#[test]
fn default_config_should_pass_validation() {
    assert!(CoordinatorConfig::default().validate().is_ok());
}
