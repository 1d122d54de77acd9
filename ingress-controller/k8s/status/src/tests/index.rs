use super::*;
use ingress_controller_k8s_api::Patch;
use pretty_assertions::assert_eq;
use rstest::rstest;
use tokio::time;

#[test]
fn unchanged_records_are_not_patched_again() {
    let (index, _claims, mut updates) = new_test_index(TEST_HOSTNAME, 10);
    let root = ResourceId::virtual_host("ns", "root");
    let frag = ResourceId::fragment("ns", "frag");
    let outcomes = reached(&[root.clone(), frag.clone()]);

    index.write().apply_outcomes(&outcomes);
    assert_eq!(drain(&mut updates), vec![accepted(&root), accepted(&frag)]);

    index.write().apply_outcomes(&outcomes);
    assert_eq!(drain(&mut updates), vec![]);
}

#[test]
fn changed_records_are_patched() {
    let (index, _claims, mut updates) = new_test_index(TEST_HOSTNAME, 10);
    let root = ResourceId::virtual_host("ns", "root");
    let mut outcomes = reached(&[root.clone()]);
    index.write().apply_outcomes(&outcomes);
    drain(&mut updates);

    // A new generation is always written, even if nothing else changed.
    outcomes.generations.insert(root.clone(), 2);
    index.write().apply_outcomes(&outcomes);
    assert_eq!(drain(&mut updates).len(), 1);
    assert_eq!(
        index.read().record(&root).map(|r| r.observed_generation),
        Some(2)
    );

    outcomes.error(&root, Reason::DuplicateHostname, "claimed", &[]);
    index.write().apply_outcomes(&outcomes);
    let patched = drain(&mut updates);
    assert_eq!(patched.len(), 1);
    let Patch::Merge(ref value) = patched[0].patch else {
        panic!("unexpected patch: {:?}", patched[0].patch);
    };
    assert_eq!(value["kind"], "VirtualHost");
    assert_eq!(value["status"]["validity"]["state"], "Invalid");
    assert_eq!(value["status"]["validity"]["observedGeneration"], 2);
    assert_eq!(
        value["status"]["validity"]["conditions"][0]["reason"],
        "DuplicateHostname"
    );
}

#[test]
fn orphaning_is_a_write() {
    let (index, _claims, mut updates) = new_test_index(TEST_HOSTNAME, 10);
    let root = ResourceId::virtual_host("ns", "root");
    let frag = ResourceId::fragment("ns", "frag");
    index
        .write()
        .apply_outcomes(&reached(&[root.clone(), frag.clone()]));
    drain(&mut updates);

    let mut outcomes = reached(&[root.clone(), frag.clone()]);
    outcomes.reachable.remove(&frag);
    outcomes.record(&frag, Condition::info(Reason::Orphaned, "orphaned"), &[]);
    index.write().apply_outcomes(&outcomes);

    let patched = drain(&mut updates);
    assert_eq!(patched.len(), 1);
    assert_eq!(patched[0].id, frag);
    assert_eq!(
        index.read().record(&frag).map(|r| r.state),
        Some(ValidityState::Orphaned)
    );
}

#[test]
fn deleted_resources_are_forgotten() {
    let (index, _claims, mut updates) = new_test_index(TEST_HOSTNAME, 10);
    let root = ResourceId::virtual_host("ns", "root");
    index.write().apply_outcomes(&reached(&[root.clone()]));
    drain(&mut updates);

    index.write().apply_outcomes(&reached(&[]));
    assert_eq!(drain(&mut updates), vec![]);
    assert!(index.read().record(&root).is_none());

    // Recreating the resource writes its status again.
    index.write().apply_outcomes(&reached(&[root.clone()]));
    assert_eq!(drain(&mut updates), vec![accepted(&root)]);
}

#[rstest]
#[case::other_holder("ingress-controller-1")]
#[case::unclaimed("")]
fn followers_do_not_patch(#[case] holder: &str) {
    let (index, claims, mut updates) = new_test_index(holder, 10);
    let root = ResourceId::virtual_host("ns", "root");
    index.write().apply_outcomes(&reached(&[root.clone()]));
    assert_eq!(drain(&mut updates), vec![]);

    // Once the lease is acquired, the pending record is written.
    claims.send(claim(TEST_HOSTNAME)).unwrap();
    index.write().reconcile();
    assert_eq!(drain(&mut updates), vec![accepted(&root)]);
}

#[test]
fn full_queues_defer_patches() {
    let (index, _claims, mut updates) = new_test_index(TEST_HOSTNAME, 1);
    let a = ResourceId::virtual_host("ns", "a");
    let b = ResourceId::virtual_host("ns", "b");
    let outcomes = reached(&[a.clone(), b.clone()]);

    index.write().apply_outcomes(&outcomes);
    assert_eq!(drain(&mut updates), vec![accepted(&a)]);

    // The dropped patch is sent on the next pass.
    index.write().apply_outcomes(&outcomes);
    assert_eq!(drain(&mut updates), vec![accepted(&b)]);
}

#[tokio::test(start_paused = true)]
async fn acquiring_the_lease_re_emits_records() {
    let (index, claims, mut updates) = new_test_index(TEST_HOSTNAME, 10);
    let root = ResourceId::virtual_host("ns", "root");
    index.write().apply_outcomes(&reached(&[root.clone()]));
    assert_eq!(updates.recv().await, Some(accepted(&root)));

    let task = tokio::spawn(Index::run(index.clone(), time::Duration::from_secs(10)));

    // The first reconciliation happens immediately.
    assert_eq!(updates.recv().await, Some(accepted(&root)));

    claims.send(claim("ingress-controller-1")).unwrap();
    time::sleep(time::Duration::from_secs(1)).await;
    assert_eq!(drain(&mut updates), vec![]);

    // Another process may have written a different status in the meantime.
    claims.send(claim(TEST_HOSTNAME)).unwrap();
    assert_eq!(updates.recv().await, Some(accepted(&root)));
    task.abort();
}

#[test]
fn recreated_resources_are_patched_again() {
    let (index, _claims, mut updates) = new_test_index(TEST_HOSTNAME, 10);
    let root = ResourceId::virtual_host("ns", "root");
    let mut outcomes = reached(&[root.clone()]);
    outcomes.uids.insert(root.clone(), "8c3f2a10".to_string());
    index.write().apply_outcomes(&outcomes);
    assert_eq!(drain(&mut updates), vec![accepted(&root)]);

    // Replaced between two passes: the record is the same, but the new
    // object has no status yet.
    outcomes.uids.insert(root.clone(), "d41e77b2".to_string());
    index.write().apply_outcomes(&outcomes);
    assert_eq!(drain(&mut updates), vec![accepted(&root)]);

    index.write().apply_outcomes(&outcomes);
    assert_eq!(drain(&mut updates), vec![]);
}
