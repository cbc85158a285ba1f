//! Scenario S1 (spec.md §8): basic tree usage end to end through the
//! public [`cabinetree::Cluster`]/`TreeHandle` facade, backed by
//! [`cabinetree::testing::TestingShim`].

use cabinetree::testing::TestingShim;
use cabinetree::Cluster;

#[tokio::test]
async fn s1_make_write_read_remove_round_trip() {
    let cluster = Cluster::new(TestingShim::new());
    let tree = cluster.tree();

    tree.make_directory("/a/b/c").await.expect("makeDirectory");
    assert_eq!(tree.list_directory("/a/b").await.unwrap(), vec!["c/".to_string()]);

    tree.write("/a/b/c/file", b"hello world".to_vec()).await.expect("write");
    assert_eq!(tree.read("/a/b/c/file").await.unwrap(), b"hello world".to_vec());

    tree.remove_file("/a/b/c/file").await.expect("removeFile");
    assert!(tree.list_directory("/a/b/c").await.unwrap().is_empty());

    tree.remove_directory("/a").await.expect("removeDirectory");
    assert!(tree.list_directory("/").await.unwrap().is_empty());
}

#[tokio::test]
async fn make_directory_is_idempotent_through_the_facade() {
    let cluster = Cluster::new(TestingShim::new());
    let tree = cluster.tree();
    tree.make_directory("/x").await.unwrap();
    tree.make_directory("/x").await.unwrap();
    assert_eq!(tree.list_directory("/").await.unwrap(), vec!["x/".to_string()]);
}

#[tokio::test]
async fn removing_root_preserves_the_tree() {
    let cluster = Cluster::new(TestingShim::new());
    let tree = cluster.tree();
    tree.make_directory("/a/b").await.unwrap();
    tree.remove_directory("/").await.unwrap();
    assert!(tree.list_directory("/").await.unwrap().is_empty());
    // The root itself is still usable after being cleared.
    tree.make_directory("/fresh").await.unwrap();
    assert_eq!(tree.list_directory("/").await.unwrap(), vec!["fresh/".to_string()]);
}

#[tokio::test]
async fn ex_methods_panic_on_failure_and_return_values_on_success() {
    let cluster = Cluster::new(TestingShim::new());
    let tree = cluster.tree();
    tree.write_ex("/a", b"v".to_vec()).await;
    assert_eq!(tree.read_ex("/a").await, b"v".to_vec());

    let doomed = tree.clone();
    let handle = tokio::spawn(async move { doomed.read_ex("/missing").await });
    assert!(handle.await.is_err(), "read_ex on a missing path should panic");
}
