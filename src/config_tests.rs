// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `config.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use std::io::Write;

    const MINIMAL: &str = r"
region: cn-east-1
loadbalance:
  bind: http://inventory:8080/api/v1/loadbalance/bind
  released: http://inventory:8080/api/v1/loadbalance/released
  list: http://inventory:8080/api/v1/loadbalance/list
";

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = LoadBalanceConfig::from_yaml(MINIMAL).unwrap();

        assert_eq!(config.region, "cn-east-1");
        assert_eq!(
            config.endpoints.bind,
            "http://inventory:8080/api/v1/loadbalance/bind"
        );
        assert_eq!(config.leader_election.name, "loadbalance-controller");
        assert_eq!(config.leader_election.namespace, "kube-system");
        assert_eq!(config.leader_election.lease_duration_seconds, 60);
        assert_eq!(config.leader_election.renew_deadline_seconds, 15);
        assert_eq!(config.leader_election.retry_period_seconds, 5);
        assert_eq!(config.resync_period(), Duration::from_secs(30));
        assert!(!config.controller.requeue_on_failure);
    }

    #[test]
    fn test_full_config() {
        let yaml = r"
region: eu-west
loadbalance:
  bind: https://inventory/bind
  released: https://inventory/released
  list: https://inventory/list
leaderElection:
  name: lb-leader
  namespace: infra
  leaseDurationSeconds: 30
  renewDeadlineSeconds: 20
  retryPeriodSeconds: 4
controller:
  resyncPeriodSeconds: 120
  requeueOnFailure: true
";
        let config = LoadBalanceConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.leader_election.name, "lb-leader");
        assert_eq!(config.leader_election.namespace, "infra");
        assert_eq!(config.resync_period(), Duration::from_secs(120));
        assert!(config.controller.requeue_on_failure);

        let election = config.leader_election.election_config().unwrap();
        assert_eq!(election.lease_duration, Duration::from_secs(30));
        assert_eq!(election.renew_deadline, Duration::from_secs(20));
        assert_eq!(election.retry_period, Duration::from_secs(4));
        assert!(election.release_on_cancel);
    }

    #[test]
    fn test_missing_region_defaults_to_empty() {
        let yaml = r"
loadbalance:
  bind: http://inventory/bind
  released: http://inventory/released
  list: http://inventory/list
";
        let config = LoadBalanceConfig::from_yaml(yaml).unwrap();
        assert!(config.region.is_empty());
    }

    #[test]
    fn test_missing_endpoints_is_parse_error() {
        let result = LoadBalanceConfig::from_yaml("region: cn-east-1\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_relative_endpoint_rejected() {
        let yaml = r"
loadbalance:
  bind: /api/v1/loadbalance/bind
  released: http://inventory/released
  list: http://inventory/list
";
        match LoadBalanceConfig::from_yaml(yaml) {
            Err(ConfigError::InvalidEndpoint { field, .. }) => assert_eq!(field, "bind"),
            other => panic!("expected invalid bind endpoint, got {other:?}"),
        }
    }

    #[test]
    fn test_non_http_endpoint_rejected() {
        let yaml = r"
loadbalance:
  bind: http://inventory/bind
  released: http://inventory/released
  list: ftp://inventory/list
";
        match LoadBalanceConfig::from_yaml(yaml) {
            Err(ConfigError::InvalidEndpoint { field, reason, .. }) => {
                assert_eq!(field, "list");
                assert!(reason.contains("ftp"));
            }
            other => panic!("expected invalid list endpoint, got {other:?}"),
        }
    }

    #[test]
    fn test_inconsistent_lease_timing_rejected() {
        let yaml = r"
loadbalance:
  bind: http://inventory/bind
  released: http://inventory/released
  list: http://inventory/list
leaderElection:
  leaseDurationSeconds: 10
  renewDeadlineSeconds: 15
";
        let result = LoadBalanceConfig::from_yaml(yaml);
        assert!(matches!(result, Err(ConfigError::LeaderElection(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = LoadBalanceConfig::load(file.path()).unwrap();
        assert_eq!(config.region, "cn-east-1");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yml");

        match LoadBalanceConfig::load(&path) {
            Err(ConfigError::Read { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected read error, got {other:?}"),
        }
    }
}
