//! Path canonicalization (spec.md §4.1) exercised both at the
//! [`cabinetree::path::PathName`] level and end to end through
//! [`cabinetree::TreeHandle`]'s working-directory resolution, which
//! re-parses the caller's path against `working_directory` *before* it
//! ever reaches the wire.

use cabinetree::path::PathName;
use cabinetree::testing::TestingShim;
use cabinetree::Cluster;

#[test]
fn nested_dot_dot_sequences_cancel_out() {
    let p = PathName::parse("a/../b/../../c", "/x/y").unwrap();
    // "/x/y" + "a/.." -> "/x/y", + "b/.." -> "/x/y", + ".." -> "/x", + "c" -> "/x/c"
    assert_eq!(p.canonical(), "/x/c");
}

#[test]
fn trailing_dot_dot_leaves_the_parent_directory() {
    let p = PathName::parse("/a/b/..", "/").unwrap();
    assert_eq!(p.canonical(), "/a");
}

#[test]
fn parents_through_names_the_prefix_at_a_given_depth() {
    let p = PathName::parse("/a/b/c", "/").unwrap();
    assert_eq!(p.parents_through(0), "/");
    assert_eq!(p.parents_through(1), "/a");
    assert_eq!(p.parents_through(2), "/a/b");
}

#[test]
fn components_excludes_the_synthetic_root_prefix() {
    let p = PathName::parse("/a/b", "/").unwrap();
    assert_eq!(p.components(), vec!["a", "b"]);
    let root = PathName::parse("/", "/").unwrap();
    assert!(root.components().is_empty());
}

#[tokio::test]
async fn relative_writes_resolve_against_a_working_directory_two_levels_deep() {
    let cluster = Cluster::new(TestingShim::new());
    let mut tree = cluster.tree();
    tree.make_directory("/a/b/c").await.unwrap();
    tree.set_working_directory("/a/b/c").await.unwrap();
    tree.write("../sibling", b"v".to_vec()).await.unwrap();
    assert_eq!(tree.read("/a/b/sibling").await.unwrap(), b"v".to_vec());
}

#[tokio::test]
async fn changing_working_directory_twice_resolves_relative_to_the_latest() {
    let cluster = Cluster::new(TestingShim::new());
    let mut tree = cluster.tree();
    tree.make_directory("/a/b").await.unwrap();
    tree.set_working_directory("/a").await.unwrap();
    tree.set_working_directory("b").await.unwrap();
    assert_eq!(tree.working_directory(), "/a/b");
    tree.write("file", b"x".to_vec()).await.unwrap();
    assert_eq!(tree.read("/a/b/file").await.unwrap(), b"x".to_vec());
}

#[tokio::test]
async fn cloning_a_tree_handle_preserves_its_working_directory_independently() {
    let cluster = Cluster::new(TestingShim::new());
    let mut tree = cluster.tree();
    tree.make_directory("/a/b").await.unwrap();
    tree.set_working_directory("/a").await.unwrap();

    let mut sibling = tree.clone();
    sibling.set_working_directory("b").await.unwrap();

    assert_eq!(tree.working_directory(), "/a");
    assert_eq!(sibling.working_directory(), "/a/b");
}

#[tokio::test]
async fn walking_above_root_through_the_facade_is_an_invalid_argument() {
    let cluster = Cluster::new(TestingShim::new());
    let tree = cluster.tree();
    let err = tree.write("/a/../../b", b"x".to_vec()).await.unwrap_err();
    assert_eq!(err.status, cabinetree::Status::InvalidArgument);
}
