//! Property-based tests for the identity mapping store.
//!
//! Generates arbitrary upsert sequences and verifies the per-integration
//! bijection invariant holds no matter the order or mix of operations.
//!
//! Run with: `cargo test --test proptest_mapping`

use std::collections::HashSet;

use proptest::prelude::*;

use rentsync::storage::memory::MemoryStore;
use rentsync::storage::traits::{MappingStore, StoreError};
use rentsync::EntityKind;

/// One upsert attempt: `(integration, local, remote)` drawn from small
/// ranges so collisions actually happen.
fn upsert_strategy() -> impl Strategy<Value = (i64, i64, i64)> {
    (1i64..=2, 1i64..=8, 100i64..=108)
}

fn run_ops(ops: &[(i64, i64, i64)]) -> MemoryStore {
    let store = MemoryStore::new();
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    rt.block_on(async {
        for &(integration_id, local_id, remote_id) in ops {
            // Conflicts are expected; panics are not.
            let result = store
                .upsert(integration_id, EntityKind::Product, local_id, remote_id)
                .await;
            if let Err(err) = result {
                assert!(matches!(err, StoreError::MappingConflict { .. }));
            }
        }
    });
    store
}

proptest! {
    /// After any upsert sequence, each (integration, local) and each
    /// (integration, remote) appears at most once.
    #[test]
    fn bijection_survives_arbitrary_upserts(
        ops in prop::collection::vec(upsert_strategy(), 0..64)
    ) {
        let store = run_ops(&ops);

        let mut locals = HashSet::new();
        let mut remotes = HashSet::new();
        for mapping in store.all_mappings() {
            prop_assert!(locals.insert((mapping.integration_id, mapping.kind, mapping.local_id)));
            prop_assert!(remotes.insert((mapping.integration_id, mapping.kind, mapping.remote_id)));
        }
    }

    /// Re-playing a sequence against the store it produced is a no-op:
    /// every surviving pair upserts cleanly and nothing new appears.
    #[test]
    fn replaying_survivors_is_idempotent(
        ops in prop::collection::vec(upsert_strategy(), 0..64)
    ) {
        let store = run_ops(&ops);
        let survivors = store.all_mappings();
        let before = survivors.len();

        let rt = tokio::runtime::Builder::new_current_thread().build().expect("runtime");
        rt.block_on(async {
            for mapping in &survivors {
                store
                    .upsert(
                        mapping.integration_id,
                        mapping.kind,
                        mapping.local_id,
                        mapping.remote_id,
                    )
                    .await
                    .expect("replaying an existing pair must succeed");
            }
        });
        prop_assert_eq!(store.all_mappings().len(), before);
    }

    /// Lookup stays consistent with what upsert reported.
    #[test]
    fn lookups_agree_with_upsert_results(
        ops in prop::collection::vec(upsert_strategy(), 0..64)
    ) {
        let store = run_ops(&ops);
        let rt = tokio::runtime::Builder::new_current_thread().build().expect("runtime");
        rt.block_on(async {
            for mapping in store.all_mappings() {
                let by_local = store
                    .find_by_local(mapping.integration_id, mapping.kind, mapping.local_id)
                    .await
                    .unwrap()
                    .expect("mapping visible by local id");
                assert_eq!(by_local.remote_id, mapping.remote_id);

                let by_remote = store
                    .find_by_remote(mapping.integration_id, mapping.kind, mapping.remote_id)
                    .await
                    .unwrap()
                    .expect("mapping visible by remote id");
                assert_eq!(by_remote.local_id, mapping.local_id);
            }
        });
    }
}
