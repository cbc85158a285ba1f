//! Scenario S2 (spec.md §8): conditional writes through the public
//! facade — a condition gates the whole command, not just the target
//! path, and clearing it restores unconditional behavior.

use cabinetree::testing::TestingShim;
use cabinetree::{Cluster, Status};

#[tokio::test]
async fn s2_condition_gates_unrelated_writes() {
    let cluster = Cluster::new(TestingShim::new());
    let mut tree = cluster.tree();

    tree.write("/a", b"v1".to_vec()).await.unwrap();

    tree.set_condition("/a", b"v2".to_vec()).unwrap();
    let err = tree.write("/b", b"anything".to_vec()).await.unwrap_err();
    assert_eq!(err.status, Status::ConditionNotMet);
    assert!(tree.read("/b").await.is_err());

    tree.set_condition("/a", b"v1".to_vec()).unwrap();
    tree.write("/b", b"anything".to_vec()).await.unwrap();
    assert_eq!(tree.read("/b").await.unwrap(), b"anything".to_vec());
}

#[tokio::test]
async fn empty_expected_contents_matches_a_missing_file() {
    let cluster = Cluster::new(TestingShim::new());
    let mut tree = cluster.tree();
    tree.set_condition("/does/not/exist", Vec::new()).unwrap();
    tree.write("/a", b"x".to_vec()).await.unwrap();
}

#[tokio::test]
async fn clearing_the_condition_restores_unconditional_writes() {
    let cluster = Cluster::new(TestingShim::new());
    let mut tree = cluster.tree();
    tree.write("/a", b"v1".to_vec()).await.unwrap();
    tree.set_condition("/a", b"wrong".to_vec()).unwrap();
    assert!(tree.write("/b", Vec::new()).await.is_err());
    tree.clear_condition();
    tree.write("/b", Vec::new()).await.unwrap();
}

#[tokio::test]
async fn condition_also_gates_remove_operations() {
    let cluster = Cluster::new(TestingShim::new());
    let mut tree = cluster.tree();
    tree.make_directory("/dir").await.unwrap();
    tree.write("/keep", b"yes".to_vec()).await.unwrap();

    tree.set_condition("/keep", b"no".to_vec()).unwrap();
    assert!(tree.remove_directory("/dir").await.is_err());
    assert!(tree.remove_file("/keep").await.is_err());

    tree.set_condition("/keep", b"yes".to_vec()).unwrap();
    tree.remove_directory("/dir").await.unwrap();
    assert!(tree.list_directory("/").await.unwrap().iter().all(|e| e != "dir/"));
}
