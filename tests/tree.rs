//! Integration tests for tree materialization, lookup and refresh.

use reg_explorer::{
    ExplorerConfig, ExplorerError, KeyStore, MemoryStore, NodeId, Tree, TreeEvent, ValueData,
};
use std::time::Duration;

/// Builds a small registry:
///
/// ```text
/// HKCU
///   Software
///     Vendor
///       App          (Version = 3, InstallPath = "C:\App")
///       Tools
///     Other
///   Environment      (Path, TEMP)
/// HKLM
///   SYSTEM
///     Select        (Current = 1)
///   SAM              (denied)
/// ```
fn build_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.set_value("HKCU\\Software\\Vendor\\App", "Version", ValueData::DWord(3)).unwrap();
    store
        .set_value("HKCU\\Software\\Vendor\\App", "InstallPath", ValueData::String("C:\\App".into()))
        .unwrap();
    store.create_key("HKCU\\Software\\Vendor\\Tools").unwrap();
    store.create_key("HKCU\\Software\\Other").unwrap();
    store
        .set_value("HKCU\\Environment", "Path", ValueData::ExpandString("%SystemRoot%".into()))
        .unwrap();
    store
        .set_value("HKCU\\Environment", "TEMP", ValueData::String("C:\\Temp".into()))
        .unwrap();
    store.set_value("HKLM\\SYSTEM\\Select", "Current", ValueData::DWord(1)).unwrap();
    store.create_key("HKLM\\SAM").unwrap();
    store.deny_access("HKLM\\SAM").unwrap();
    store
}

fn open_tree(store: &MemoryStore) -> (Tree<&MemoryStore>, NodeId, NodeId) {
    let config = ExplorerConfig::default().with_selection_delay(Duration::ZERO);
    let mut tree = Tree::with_config(store, config);
    let hkcu = tree.add_root(store.open_root("HKCU").unwrap());
    let hklm = tree.add_root(store.open_root("HKLM").unwrap());
    (tree, hkcu, hklm)
}

fn child_names(tree: &Tree<&MemoryStore>, id: NodeId) -> Vec<String> {
    tree.node(id)
        .unwrap()
        .children()
        .iter()
        .map(|&c| tree.node(c).unwrap().display_name().to_string())
        .collect()
}

/// Children mirror the store's subkeys in order, with joined paths.
fn assert_mirrors_store(tree: &Tree<&MemoryStore>, store: &MemoryStore, id: NodeId) {
    let node = tree.node(id).unwrap();
    let key = store.open_root(node.absolute_path()).unwrap();
    assert_eq!(child_names(tree, id), store.subkey_names(&key).unwrap());

    for &child in node.children() {
        let child_node = tree.node(child).unwrap();
        assert_eq!(
            child_node.absolute_path(),
            format!("{}\\{}", node.absolute_path(), child_node.display_name())
        );
        assert_eq!(child_node.parent(), Some(id));
    }
}

#[test]
fn test_materialized_children_mirror_store() {
    let store = build_store();
    let (mut tree, hkcu, _) = open_tree(&store);

    tree.prepopulate_full(hkcu).unwrap();

    let mut stack = vec![hkcu];
    while let Some(id) = stack.pop() {
        assert!(tree.node(id).unwrap().is_materialized());
        assert_mirrors_store(&tree, &store, id);
        stack.extend(tree.node(id).unwrap().children().iter().copied());
    }
}

#[test]
fn test_denied_subkey_is_skipped() {
    let store = build_store();
    let (mut tree, _, hklm) = open_tree(&store);

    tree.expand(hklm).unwrap();

    assert_eq!(child_names(&tree, hklm), vec!["SYSTEM"]);
    assert!(tree.node(hklm).unwrap().is_materialized());
}

#[test]
fn test_enumeration_failure_leaves_node_unmaterialized() {
    let store = build_store();
    let (mut tree, hkcu, _) = open_tree(&store);
    tree.expand(hkcu).unwrap();
    let software = tree.find_exact("HKCU\\Software").unwrap();
    tree.expand(software).unwrap();
    let other = tree.find_exact("HKCU\\Software\\Other").unwrap();
    assert!(tree.node(other).unwrap().is_materialized());

    // The key disappears behind the tree's back.
    store.remove_key("HKCU\\Software\\Other").unwrap();
    let err = tree.refresh(other, false).unwrap_err();
    assert!(matches!(err, ExplorerError::Enumeration { .. }));
    assert!(!tree.node(other).unwrap().is_materialized());

    // Refreshing the parent drops it for good.
    tree.refresh(software, false).unwrap();
    assert_eq!(child_names(&tree, software), vec!["Vendor"]);
    assert!(tree.node(other).is_none());
}

#[test]
fn test_find_exact_only_sees_materialized_nodes() {
    let store = build_store();
    let (mut tree, hkcu, _) = open_tree(&store);

    assert!(tree.find_exact("HKCU\\Software\\Vendor\\App").is_none());
    assert_eq!(tree.find_exact("hkcu"), Some(hkcu));

    tree.expand(hkcu).unwrap();
    // Vendor was prefetched as a child of Software, App was not.
    assert!(tree.find_exact("HKCU\\Software\\Vendor").is_some());
    assert!(tree.find_exact("HKCU\\Software\\Vendor\\App").is_none());

    let vendor = tree.find_exact("HKCU\\Software\\Vendor").unwrap();
    tree.materialize_immediate_children(vendor).unwrap();

    let app = tree.find_exact("hkcu\\SOFTWARE\\vendor\\app").unwrap();
    assert_eq!(tree.node(app).unwrap().absolute_path(), "HKCU\\Software\\Vendor\\App");
    assert_eq!(tree.find_exact_from(hkcu, "HKCU\\Software\\Vendor\\App"), Some(app));
}

#[test]
fn test_find_exact_across_roots() {
    let store = build_store();
    let (mut tree, _, hklm) = open_tree(&store);
    tree.expand(hklm).unwrap();

    let select = tree.find_exact("HKLM\\SYSTEM\\Select").unwrap();
    assert_eq!(tree.node(select).unwrap().display_name(), "Select");
    assert!(tree.find_exact("HKLM\\SAM").is_none());
    assert!(tree.find_exact("HKEY_CLASSES_ROOT").is_none());
}

#[test]
fn test_refresh_picks_up_added_and_removed_keys() {
    let store = build_store();
    let (mut tree, hkcu, _) = open_tree(&store);
    tree.expand(hkcu).unwrap();
    let software = tree.find_exact("HKCU\\Software").unwrap();
    assert_eq!(child_names(&tree, software), vec!["Vendor", "Other"]);

    store.remove_key("HKCU\\Software\\Other").unwrap();
    store.create_key("HKCU\\Software\\NewVendor").unwrap();

    // Stale until refreshed.
    assert_eq!(child_names(&tree, software), vec!["Vendor", "Other"]);

    tree.refresh(software, true).unwrap();
    assert_eq!(child_names(&tree, software), vec!["Vendor", "NewVendor"]);
    assert!(tree.node(software).unwrap().is_expanded());
    assert!(tree.find_exact("HKCU\\Software\\Other").is_none());
    assert!(tree.find_exact("HKCU\\Software\\NewVendor").is_some());
}

#[test]
fn test_refresh_releases_descendants() {
    let store = build_store();
    let (mut tree, hkcu, _) = open_tree(&store);
    tree.prepopulate_full(hkcu).unwrap();
    let before = tree.len();

    tree.refresh(hkcu, false).unwrap();

    // HKCU's grandchildren are gone until expanded again.
    assert!(tree.len() < before);
    assert!(tree.find_exact("HKCU\\Software\\Vendor").is_none());
    assert_eq!(child_names(&tree, hkcu), vec!["Software", "Environment"]);
}

#[test]
fn test_go_to_path_expands_ancestors_and_selects() {
    let store = build_store();
    let (mut tree, hkcu, _) = open_tree(&store);
    tree.expand(hkcu).unwrap();
    let vendor = tree.find_exact("HKCU\\Software\\Vendor").unwrap();
    tree.expand(vendor).unwrap();

    let ticket = tree
        .go_to_path("HKCU\\Software\\Vendor\\App\\\\")
        .unwrap()
        .expect("App is resident");
    let app = ticket.node();

    assert_eq!(tree.selected(), Some(app));
    for id in tree.ancestors(app).unwrap() {
        assert!(tree.node(id).unwrap().is_expanded());
    }

    let rows = tree.details_for(&ticket).unwrap().unwrap();
    let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["InstallPath", "Version"]);
}

#[test]
fn test_go_to_unknown_path() {
    let store = build_store();
    let (mut tree, _, _) = open_tree(&store);
    assert!(tree.go_to_path("HKCU\\Nope").unwrap().is_none());
    assert_eq!(tree.selected(), None);
}

#[test]
fn test_stale_selection_is_discarded() {
    let store = build_store();
    let (mut tree, hkcu, hklm) = open_tree(&store);
    let changes = tree.selection_changes();

    let first = tree.select(hkcu).unwrap();
    let second = tree.select(hklm).unwrap();

    assert!(!first.settle(tree.config().selection_delay));
    assert!(tree.details_for(&first).unwrap().is_none());
    assert!(tree.node(hkcu).unwrap().values().is_none());

    let rows = tree.details_for(&second).unwrap().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "(Default)");
    assert_eq!(rows[0].value, "(value not set)");

    assert_eq!(changes.try_recv().unwrap().ticket.node(), hkcu);
    assert_eq!(changes.try_recv().unwrap().previous, Some(hkcu));
}

#[test]
fn test_settled_details_uses_configured_delay() {
    let store = build_store();
    let (mut tree, hkcu, hklm) = open_tree(&store);
    tree.expand(hklm).unwrap();
    let select = tree.find_exact("HKLM\\SYSTEM\\Select").unwrap();

    let passed_over = tree.select(hkcu).unwrap();
    let ticket = tree.select(select).unwrap();

    assert!(tree.settled_details(&passed_over).unwrap().is_none());
    assert!(tree.node(hkcu).unwrap().values().is_none());

    let rows = tree.settled_details(&ticket).unwrap().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "Current");
    assert_eq!(rows[0].value, "0x1 (1)");
}

#[test]
fn test_refresh_clears_selection_of_discarded_node() {
    let store = build_store();
    let (mut tree, hkcu, _) = open_tree(&store);
    tree.expand(hkcu).unwrap();
    let software = tree.find_exact("HKCU\\Software").unwrap();
    let ticket = tree.select(software).unwrap();

    tree.refresh(hkcu, false).unwrap();

    assert_eq!(tree.selected(), None);
    assert!(!ticket.is_current());
}

#[test]
fn test_events_flushed_after_expand() {
    let store = build_store();
    let (mut tree, hkcu, _) = open_tree(&store);
    let events = tree.subscribe();

    tree.expand(hkcu).unwrap();

    let received: Vec<TreeEvent> = events.try_iter().collect();
    assert_eq!(received.first(), Some(&TreeEvent::ChildrenChanged(hkcu)));
    assert_eq!(received.last(), Some(&TreeEvent::Expanded(hkcu)));
    // HKCU plus its two children.
    let changed = received
        .iter()
        .filter(|e| matches!(e, TreeEvent::ChildrenChanged(_)))
        .count();
    assert_eq!(changed, 3);

    tree.collapse(hkcu).unwrap();
    assert_eq!(events.try_recv().unwrap(), TreeEvent::Collapsed(hkcu));
}

#[test]
fn test_stale_node_errors() {
    let store = build_store();
    let (mut tree, hkcu, _) = open_tree(&store);
    tree.expand(hkcu).unwrap();
    let software = tree.find_exact("HKCU\\Software").unwrap();
    tree.refresh(hkcu, false).unwrap();

    assert!(matches!(tree.expand(software), Err(ExplorerError::StaleNode(id)) if id == software));
    assert!(matches!(tree.select(software), Err(ExplorerError::StaleNode(_))));
}
