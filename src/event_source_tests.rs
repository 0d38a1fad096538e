// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `event_source.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use k8s_openapi::api::core::v1::ServiceSpec;
    use kube::api::ObjectMeta;
    use serde_json::json;
    use std::sync::Mutex;

    fn service(namespace: &str, name: &str, type_: &str, rv: &str) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                resource_version: Some(rv.to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                type_: Some(type_.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn lb(name: &str, rv: &str) -> Service {
        service("default", name, "LoadBalancer", rv)
    }

    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<String> {
            let mut calls = self.calls.lock().unwrap().clone();
            calls.sort();
            calls
        }

        fn push(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl ServiceEventHandler for Recorder {
        fn on_add(&self, svc: &Service) {
            self.push(format!("add:{}", service_key(svc)));
        }

        fn on_update(&self, _old: &Service, new: &Service) {
            self.push(format!("update:{}", service_key(new)));
        }

        fn on_delete(&self, deleted: DeletedObject) {
            match deleted {
                DeletedObject::Service(svc) => self.push(format!("delete:{}", service_key(&svc))),
                DeletedObject::Tombstone(t) => self.push(format!("tombstone:{}", t.key)),
                DeletedObject::Unknown(_) => self.push("unknown".to_string()),
            }
        }
    }

    async fn drain(queue: &WorkQueue) -> Vec<String> {
        let mut keys = Vec::new();
        while !queue.is_empty() {
            let key = queue.get().await.unwrap();
            queue.done(&key);
            keys.push(key);
        }
        keys.sort();
        keys
    }

    // =====================================================
    // Keys
    // =====================================================

    #[test]
    fn test_service_key_and_split_key() {
        let svc = lb("web", "1");
        assert_eq!(service_key(&svc), "default/web");
        assert_eq!(
            split_key("default/web").unwrap(),
            ("default".to_string(), "web".to_string())
        );
        let (namespace, name) = split_key("web").unwrap();
        assert_eq!(namespace, "");
        assert_eq!(name, "web");
    }

    #[test]
    fn test_split_key_rejects_malformed_keys() {
        assert!(matches!(split_key("a/b/c"), Err(ReconcileError::InvalidKey(_))));
        assert!(matches!(split_key("default/"), Err(ReconcileError::InvalidKey(_))));
        assert!(matches!(split_key(""), Err(ReconcileError::InvalidKey(_))));
    }

    #[test]
    fn test_is_load_balancer() {
        assert!(is_load_balancer(&lb("web", "1")));
        assert!(!is_load_balancer(&service("default", "web", "ClusterIP", "1")));
        assert!(!is_load_balancer(&Service::default()));
    }

    // =====================================================
    // QueueingEventHandler
    // =====================================================

    #[tokio::test]
    async fn test_add_enqueues_only_load_balancers() {
        let queue = Arc::new(WorkQueue::new());
        let handler = QueueingEventHandler::new(Arc::clone(&queue));

        handler.on_add(&lb("web", "1"));
        handler.on_add(&service("default", "internal", "ClusterIP", "1"));
        handler.on_add(&service("default", "node", "NodePort", "1"));

        assert_eq!(drain(&queue).await, vec!["default/web"]);
    }

    #[tokio::test]
    async fn test_update_with_same_version_is_ignored() {
        let queue = Arc::new(WorkQueue::new());
        let handler = QueueingEventHandler::new(Arc::clone(&queue));

        handler.on_update(&lb("web", "7"), &lb("web", "7"));
        assert!(queue.is_empty());

        handler.on_update(&lb("web", "7"), &lb("web", "8"));
        assert_eq!(drain(&queue).await, vec!["default/web"]);
    }

    #[tokio::test]
    async fn test_update_to_non_load_balancer_is_ignored() {
        let queue = Arc::new(WorkQueue::new());
        let handler = QueueingEventHandler::new(Arc::clone(&queue));

        let cluster_ip = service("default", "web", "ClusterIP", "2");
        handler.on_update(&lb("web", "1"), &cluster_ip);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_delete_of_live_service_enqueues_key() {
        let queue = Arc::new(WorkQueue::new());
        let handler = QueueingEventHandler::new(Arc::clone(&queue));

        let internal = service("default", "internal", "ClusterIP", "3");
        handler.on_delete(DeletedObject::Service(lb("web", "3")));
        handler.on_delete(DeletedObject::Service(internal));

        assert_eq!(drain(&queue).await, vec!["default/web"]);
    }

    #[tokio::test]
    async fn test_delete_tombstone_wrapping_service_enqueues_key() {
        let queue = Arc::new(WorkQueue::new());
        let handler = QueueingEventHandler::new(Arc::clone(&queue));

        let tombstone = Tombstone {
            key: "default/web".to_string(),
            object: serde_json::to_value(lb("web", "3")).unwrap(),
        };
        assert_eq!(tombstone.service().unwrap().name_any(), "web");

        handler.on_delete(DeletedObject::Tombstone(tombstone));
        assert_eq!(drain(&queue).await, vec!["default/web"]);
    }

    #[tokio::test]
    async fn test_malformed_tombstone_is_dropped() {
        let queue = Arc::new(WorkQueue::new());
        let handler = QueueingEventHandler::new(Arc::clone(&queue));

        let not_a_service = Tombstone {
            key: "default/web".to_string(),
            object: json!({"apiVersion": "v1", "kind": "Endpoints", "metadata": {"name": "web"}}),
        };
        assert!(not_a_service.service().is_err());

        handler.on_delete(DeletedObject::Tombstone(not_a_service));
        handler.on_delete(DeletedObject::Unknown(json!("garbage")));

        assert!(queue.is_empty());
    }

    // =====================================================
    // ServiceInformer
    // =====================================================

    #[test]
    fn test_initial_list_is_buffered_until_complete() {
        let recorder = Recorder::default();
        let mut informer = ServiceInformer::new(recorder.clone());

        informer.handle_event(watcher::Event::Init);
        informer.handle_event(watcher::Event::InitApply(lb("web", "1")));
        informer.handle_event(watcher::Event::InitApply(lb("api", "1")));

        assert!(recorder.calls().is_empty());
        assert!(informer.store().state().is_empty());

        informer.handle_event(watcher::Event::InitDone);

        assert_eq!(recorder.calls(), vec!["add:default/api", "add:default/web"]);
        assert_eq!(informer.store().state().len(), 2);
    }

    #[test]
    fn test_apply_distinguishes_add_from_update() {
        let recorder = Recorder::default();
        let mut informer = ServiceInformer::new(recorder.clone());

        informer.handle_event(watcher::Event::Apply(lb("web", "1")));
        informer.handle_event(watcher::Event::Apply(lb("web", "2")));

        assert_eq!(
            recorder.calls(),
            vec!["add:default/web", "update:default/web"]
        );
    }

    #[test]
    fn test_delete_removes_from_cache_before_notifying() {
        let recorder = Recorder::default();
        let mut informer = ServiceInformer::new(recorder.clone());

        informer.handle_event(watcher::Event::Apply(lb("web", "1")));
        informer.handle_event(watcher::Event::Delete(lb("web", "2")));

        assert!(informer.store().state().is_empty());
        assert_eq!(
            recorder.calls(),
            vec!["add:default/web", "delete:default/web"]
        );
    }

    #[test]
    fn test_relist_reports_vanished_services_as_tombstones() {
        let recorder = Recorder::default();
        let mut informer = ServiceInformer::new(recorder.clone());

        informer.handle_event(watcher::Event::Init);
        informer.handle_event(watcher::Event::InitApply(lb("web", "1")));
        informer.handle_event(watcher::Event::InitApply(lb("gone", "1")));
        informer.handle_event(watcher::Event::InitDone);
        recorder.calls.lock().unwrap().clear();

        informer.handle_event(watcher::Event::Init);
        informer.handle_event(watcher::Event::InitApply(lb("web", "1")));
        informer.handle_event(watcher::Event::InitDone);

        assert_eq!(
            recorder.calls(),
            vec!["tombstone:default/gone", "update:default/web"]
        );
        assert_eq!(informer.store().state().len(), 1);
    }

    #[tokio::test]
    async fn test_relist_tombstone_reaches_queue() {
        let queue = Arc::new(WorkQueue::new());
        let mut informer = ServiceInformer::new(QueueingEventHandler::new(Arc::clone(&queue)));

        informer.handle_event(watcher::Event::Init);
        informer.handle_event(watcher::Event::InitApply(lb("web", "1")));
        informer.handle_event(watcher::Event::InitApply(lb("gone", "1")));
        informer.handle_event(watcher::Event::InitDone);
        assert_eq!(drain(&queue).await, vec!["default/gone", "default/web"]);

        informer.handle_event(watcher::Event::Init);
        informer.handle_event(watcher::Event::InitApply(lb("web", "1")));
        informer.handle_event(watcher::Event::InitDone);

        // web is unchanged, gone is delivered as a tombstone
        assert_eq!(drain(&queue).await, vec!["default/gone"]);
    }

    #[tokio::test]
    async fn test_resync_reannounces_every_cached_service() {
        let queue = Arc::new(WorkQueue::new());
        let mut informer = ServiceInformer::new(QueueingEventHandler::new(Arc::clone(&queue)));

        informer.handle_event(watcher::Event::Apply(lb("web", "1")));
        informer.handle_event(watcher::Event::Apply(service(
            "default", "internal", "ClusterIP", "1",
        )));
        drain(&queue).await;

        informer.resync();
        assert_eq!(drain(&queue).await, vec!["default/web"]);
    }
}
