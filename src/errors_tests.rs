// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `errors.rs`

#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn test_rejected_displays_backend_message() {
        let err = AllocationError::Rejected {
            operation: "bind",
            code: 500,
            message: "ip has been bound".to_string(),
        };
        assert_eq!(err.to_string(), "ip has been bound");
        assert_eq!(err.error_type(), "backend_rejected");
    }

    #[test]
    fn test_pool_errors_match_backend_wording() {
        let err = AllocationError::NoAvailableIp;
        assert_eq!(err.to_string(), "no available ip");
        assert_eq!(
            AllocationError::CacheExhausted.to_string(),
            "no available ip by cache"
        );
    }

    #[test]
    fn test_reconcile_error_carries_service_context() {
        let err = ReconcileError::Allocation {
            operation: "bind",
            namespace: "default".to_string(),
            name: "web".to_string(),
            source: AllocationError::NoAvailableIp,
        };

        let message = err.to_string();
        assert!(message.contains("default/web"));
        assert!(message.contains("bind"));
        assert!(message.contains("no available ip"));
        assert_eq!(err.error_type(), "no_available_ip");
    }

    #[test]
    fn test_status_update_error_type() {
        let err = ReconcileError::StatusUpdate {
            namespace: "default".to_string(),
            name: "web".to_string(),
            ip: "10.0.0.1".to_string(),
            source: ClusterApiError::Conflict {
                kind: "Service",
                namespace: "default".to_string(),
                name: "web".to_string(),
            },
        };

        assert_eq!(err.error_type(), "status_update_error");
        assert!(err.to_string().contains("10.0.0.1"));
    }

    #[test]
    fn test_invalid_key_error_type() {
        let err = ReconcileError::InvalidKey("a/b/c".to_string());
        assert_eq!(err.error_type(), "invalid_key");
        assert!(err.to_string().contains("a/b/c"));
    }

    #[test]
    fn test_lease_errors_name_the_lease() {
        let conflict = LeaseError::Conflict {
            name: "loadbalance-controller".to_string(),
        };
        assert!(conflict.to_string().contains("modified concurrently"));

        let malformed = LeaseError::Malformed {
            name: "loadbalance-controller".to_string(),
            reason: "missing resourceVersion".to_string(),
        };
        assert_eq!(
            malformed.to_string(),
            "lease loadbalance-controller is malformed: missing resourceVersion"
        );
    }

    #[test]
    fn test_empty_identity_message() {
        assert!(LeaderElectionError::EmptyIdentity
            .to_string()
            .contains("identity must not be empty"));
    }
}
