//! Storage Module Tests
//!
//! Validates key placement and the versioned store mechanics.
//!
//! ## Test Scopes
//! - **Partitioner**: deterministic hashing, fair distribution, home-node mapping.
//! - **VersionedStore**: version counting, compare-and-set, the typed cache.
//! - **Store tasks**: read and compare-and-set against a remote home node.

#[cfg(test)]
mod tests {
    use crate::cluster::testing::{fast_protocol, key_homed_on, memory_cluster};
    use crate::codec::wire::{DeepCopy, Wire};
    use crate::error::{CodecError, TaskError};
    use crate::membership::directory::NodeDirectory;
    use crate::membership::types::{Node, NodeId};
    use crate::storage::memory::VersionedStore;
    use crate::storage::partitioner::PartitionManager;
    use crate::storage::protocol::{CompareAndSetTask, ReadEntryTask};
    use crate::storage::types::{ABSENT_VERSION, CasOutcome};
    use crate::transport::types::Reliability;

    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::Arc;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Inventory {
        sku: String,
        count: u64,
    }

    impl Wire for Inventory {
        const TYPE_ID: &'static str = "test.inventory";

        fn restore(&mut self, remote: Self) {
            *self = remote;
        }
    }

    impl DeepCopy for Inventory {
        fn deep_copy(&self) -> Self {
            self.clone()
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Label(String);

    impl Wire for Label {
        const TYPE_ID: &'static str = "test.label";

        fn restore(&mut self, remote: Self) {
            *self = remote;
        }
    }

    fn node(id: &str, port: u16) -> Node {
        let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
        Node::from_bind(NodeId::from(id), addr)
    }

    fn single_node_store() -> Arc<VersionedStore> {
        let directory = NodeDirectory::new(node("solo", 5000), vec![]);
        VersionedStore::new(Arc::new(PartitionManager::new(directory)))
    }

    fn inventory(count: u64) -> Inventory {
        Inventory {
            sku: "widget".to_string(),
            count,
        }
    }

    // ============================================================
    // PARTITIONER TESTS
    // ============================================================

    #[test]
    fn test_partition_is_deterministic_and_in_range() {
        let directory = NodeDirectory::new(node("solo", 5000), vec![]);
        let partitioner = PartitionManager::new(directory);

        assert_eq!(
            partitioner.get_partition("book_100"),
            partitioner.get_partition("book_100")
        );
        for i in 0..1000 {
            let partition = partitioner.get_partition(&format!("test_key_{}", i));
            assert!(partition < partitioner.num_partitions);
        }
    }

    #[test]
    fn test_partition_distribution() {
        let directory = NodeDirectory::new(node("solo", 5000), vec![]);
        let partitioner = PartitionManager::new(directory);

        let mut partition_counts = HashMap::new();
        for i in 0..10000 {
            let partition = partitioner.get_partition(&format!("book_{}", i));
            *partition_counts.entry(partition).or_insert(0) += 1;
        }

        // ~39 keys per partition on average.
        assert!(
            partition_counts.len() > 100,
            "Should have more than 100 distinct partitions used, got: {}",
            partition_counts.len()
        );
    }

    #[test]
    fn test_home_node_agrees_across_members() {
        // Every member sees the same sorted directory, so placement matches.
        let members = vec![node("a", 5000), node("b", 5001), node("c", 5002)];
        let views: Vec<PartitionManager> = members
            .iter()
            .map(|local| PartitionManager::new(NodeDirectory::new(local.clone(), members.clone())))
            .collect();

        for i in 0..500 {
            let key = format!("order-{}", i);
            let home = views[0].home_node(&key);
            assert_eq!(views[1].home_node(&key), home);
            assert_eq!(views[2].home_node(&key), home);
            assert_eq!(views.iter().filter(|v| v.is_home(&key)).count(), 1);
        }
    }

    #[test]
    fn test_partitions_split_between_members() {
        let members = vec![node("a", 5000), node("b", 5001)];
        let a = PartitionManager::new(NodeDirectory::new(members[0].clone(), members.clone()));
        let b = PartitionManager::new(NodeDirectory::new(members[1].clone(), members.clone()));

        assert_eq!(a.my_partitions().len(), 128);
        assert_eq!(b.my_partitions().len(), 128);
        assert!(a.my_partitions().iter().all(|p| !b.my_partitions().contains(p)));
    }

    // ============================================================
    // VERSIONED STORE TESTS
    // ============================================================

    #[test]
    fn test_absent_key_has_version_zero() {
        let store = single_node_store();

        assert!(store.get("missing").is_none());
        assert_eq!(store.version("missing"), ABSENT_VERSION);
        assert!(store.get_typed::<Inventory>("missing").unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_increments_version() {
        let store = single_node_store();

        assert_eq!(store.put("stock", inventory(1)).unwrap(), 1);
        assert_eq!(store.put("stock", inventory(2)).unwrap(), 2);

        let entry = store.get("stock").unwrap();
        assert_eq!(entry.version, 2);
        assert_eq!(entry.type_id, Inventory::TYPE_ID);
        assert_eq!(Inventory::decode(&entry.bytes).unwrap(), inventory(2));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_compare_and_set_on_absent_key() {
        let store = single_node_store();
        let bytes = inventory(5).encode().unwrap();

        let conflict = store.compare_and_set("stock", 3, Inventory::TYPE_ID, bytes.clone());
        assert_eq!(conflict, CasOutcome::Conflict { current: 0 });

        let committed = store.compare_and_set("stock", ABSENT_VERSION, Inventory::TYPE_ID, bytes);
        assert_eq!(committed, CasOutcome::Committed { version: 1 });
    }

    #[test]
    fn test_compare_and_set_rejects_stale_version() {
        let store = single_node_store();
        store.put("stock", inventory(1)).unwrap();
        store.put("stock", inventory(2)).unwrap();

        let stale = store.compare_and_set_typed("stock", 1, inventory(99)).unwrap();
        assert_eq!(stale, CasOutcome::Conflict { current: 2 });
        assert_eq!(store.get_typed::<Inventory>("stock").unwrap().unwrap().0.count, 2);

        let fresh = store.compare_and_set_typed("stock", 2, inventory(3)).unwrap();
        assert_eq!(fresh, CasOutcome::Committed { version: 3 });
    }

    #[test]
    fn test_put_if_version_reports_conflict() {
        let store = single_node_store();
        store.put("stock", inventory(1)).unwrap();

        let err = store.put_if_version("stock", 0, inventory(2)).unwrap_err();

        assert_eq!(
            err,
            TaskError::VersionConflict {
                key: "stock".to_string(),
                expected: 0,
                actual: 1,
            }
        );
    }

    #[test]
    fn test_typed_reads_share_the_cached_instance() {
        let store = single_node_store();
        let bytes = inventory(7).encode().unwrap();
        store.compare_and_set("stock", 0, Inventory::TYPE_ID, bytes);

        let (first, version) = store.get_typed::<Inventory>("stock").unwrap().unwrap();
        let (second, _) = store.get_typed::<Inventory>("stock").unwrap().unwrap();

        assert_eq!(version, 1);
        assert_eq!(first.count, 7);
        assert!(Arc::ptr_eq(&first, &second), "second read should hit the cache");
    }

    #[test]
    fn test_typed_read_with_wrong_type_fails() {
        let store = single_node_store();
        store.put("stock", inventory(1)).unwrap();

        let err = store.get_typed::<Label>("stock").unwrap_err();

        assert_eq!(
            err,
            CodecError::TypeMismatch {
                stored: Inventory::TYPE_ID.to_string(),
                requested: Label::TYPE_ID.to_string(),
            }
        );
    }

    // ============================================================
    // STORE TASK TESTS
    // ============================================================

    #[tokio::test(start_paused = true)]
    async fn test_read_task_fetches_remote_entry() {
        let cluster = memory_cluster(2, Reliability::ReliableStream, fast_protocol());
        let key = key_homed_on(cluster.node(0), &cluster.id(1), "read");
        cluster.node(1).store().put(&key, inventory(11)).unwrap();

        let task = cluster
            .node(0)
            .submit(&cluster.id(1), ReadEntryTask::new(&key))
            .unwrap()
            .await
            .unwrap();

        let found = task.found.unwrap();
        assert_eq!(found.version, 1);
        assert_eq!(Inventory::decode(&found.bytes).unwrap(), inventory(11));
        assert!(cluster.node(0).store().get(&key).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cas_task_commits_on_remote_home() {
        let cluster = memory_cluster(2, Reliability::Unreliable, fast_protocol());
        let key = key_homed_on(cluster.node(0), &cluster.id(1), "cas");
        let bytes = inventory(4).encode().unwrap();

        let task = cluster
            .node(0)
            .submit(
                &cluster.id(1),
                CompareAndSetTask::new(&key, 0, Inventory::TYPE_ID, bytes.clone()),
            )
            .unwrap()
            .await
            .unwrap();
        assert_eq!(task.outcome, Some(CasOutcome::Committed { version: 1 }));

        let again = cluster
            .node(0)
            .submit(
                &cluster.id(1),
                CompareAndSetTask::new(&key, 0, Inventory::TYPE_ID, bytes),
            )
            .unwrap()
            .await
            .unwrap();
        assert_eq!(again.outcome, Some(CasOutcome::Conflict { current: 1 }));

        let (stored, version) = cluster
            .node(1)
            .store()
            .get_typed::<Inventory>(&key)
            .unwrap()
            .unwrap();
        assert_eq!(version, 1);
        assert_eq!(stored.count, 4);
    }
}
