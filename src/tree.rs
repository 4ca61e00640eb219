//! Lazily-materialized tree of store keys.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. A node owns its
//! children through the id list it keeps; the parent id stored in each child
//! is a plain back-reference used to walk towards the root.
//!
//! ```text
//! HKCU                 materialized, expanded
//! ├── Software         materialized (prefetched by expanding HKCU)
//! │   └── Vendor       not materialized
//! └── Environment      materialized (leaf)
//! ```
//!
//! A node is *materialized* once its child list mirrors the store's subkeys.
//! Lookups by path only consult what has been materialized so far; nothing
//! here touches the store unless a method says it does.

use crate::config::ExplorerConfig;
use crate::error::{ExplorerError, Result};
use crate::format::{detail_rows, DetailRow};
use crate::selection::{SelectionChange, SelectionTicket, SelectionTracker};
use crate::store::KeyStore;
use crate::utils::{last_segment, strip_prefix_ignore_case};
use crate::value::Value;
use crossbeam_channel::{unbounded, Receiver, Sender};
use slab::Slab;
use std::ops::{Deref, DerefMut};
use tracing::{debug, instrument, warn};

/// Stable identifier of a tree node.
///
/// Ids are never reused: once a node is discarded, its id stays stale even if
/// the arena slot is recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: usize,
    generation: u64,
}

impl NodeId {
    pub(crate) fn new(index: usize, generation: u64) -> Self {
        Self { index, generation }
    }
}

/// One key of the tree.
#[derive(Debug, Clone)]
pub struct Node {
    generation: u64,
    absolute_path: String,
    display_name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    values: Option<Vec<Value>>,
    materialized: bool,
    expanded: bool,
}

impl Node {
    /// Absolute key path without trailing separator.
    pub fn absolute_path(&self) -> &str {
        &self.absolute_path
    }

    /// Last segment of the path.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Parent node, `None` for roots.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in store enumeration order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Value snapshot, `None` until the values have been loaded.
    pub fn values(&self) -> Option<&[Value]> {
        self.values.as_deref()
    }

    /// Whether the children reflect the store's subkeys.
    pub fn is_materialized(&self) -> bool {
        self.materialized
    }

    /// Whether the node has been expanded.
    pub fn is_expanded(&self) -> bool {
        self.expanded
    }
}

/// Change notification emitted by the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEvent {
    /// The child list of the node was replaced or cleared.
    ChildrenChanged(NodeId),
    /// The node was expanded.
    Expanded(NodeId),
    /// The node was collapsed.
    Collapsed(NodeId),
    /// The value snapshot of the node was (re)loaded.
    ValuesLoaded(NodeId),
}

/// Read-only view of the resident nodes.
///
/// This is all the search worker gets: it can walk what is in memory but has
/// no way to reach the store.
#[derive(Debug, Clone, Copy)]
pub struct ResidentTree<'a> {
    nodes: &'a Slab<Node>,
}

impl<'a> ResidentTree<'a> {
    /// Looks up a node, `None` if the id is stale.
    pub fn node(&self, id: NodeId) -> Option<&'a Node> {
        self.nodes
            .get(id.index)
            .filter(|node| node.generation == id.generation)
    }
}

/// Lazily-materialized tree over a [`KeyStore`].
pub struct Tree<S: KeyStore> {
    store: S,
    config: ExplorerConfig,
    nodes: Slab<Node>,
    /// Store handles, indexed like `nodes`.
    handles: Vec<Option<S::Handle>>,
    roots: Vec<NodeId>,
    next_generation: u64,
    batch_depth: usize,
    pending: Vec<TreeEvent>,
    subscribers: Vec<Sender<TreeEvent>>,
    selection: SelectionTracker,
}

impl<S: KeyStore> Tree<S> {
    /// Creates an empty tree over `store` with the default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, ExplorerConfig::default())
    }

    /// Creates an empty tree over `store`.
    pub fn with_config(store: S, config: ExplorerConfig) -> Self {
        Self {
            store,
            config,
            nodes: Slab::new(),
            handles: Vec::new(),
            roots: Vec::new(),
            next_generation: 0,
            batch_depth: 0,
            pending: Vec::new(),
            subscribers: Vec::new(),
            selection: SelectionTracker::new(),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The active configuration.
    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    /// Root nodes in the order they were added.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Number of resident nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the tree has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks up a node, `None` if the id is stale.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.resident().node(id)
    }

    /// Read-only view of the resident nodes.
    pub fn resident(&self) -> ResidentTree<'_> {
        ResidentTree { nodes: &self.nodes }
    }

    fn get(&self, id: NodeId) -> Result<&Node> {
        self.node(id).ok_or(ExplorerError::StaleNode(id))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.index)
            .filter(|node| node.generation == id.generation)
            .ok_or(ExplorerError::StaleNode(id))
    }

    fn handle(&self, id: NodeId) -> Result<&S::Handle> {
        self.get(id)?;
        self.handles
            .get(id.index)
            .and_then(Option::as_ref)
            .ok_or(ExplorerError::StaleNode(id))
    }

    fn insert_node(
        &mut self,
        handle: S::Handle,
        parent: Option<NodeId>,
        absolute_path: String,
        display_name: String,
    ) -> NodeId {

        let generation = self.next_generation;
        self.next_generation += 1;

        let index = self.nodes.insert(Node {
            generation,
            absolute_path,
            display_name,
            parent,
            children: Vec::new(),
            values: None,
            materialized: false,
            expanded: false,
        });
        if self.handles.len() <= index {
            self.handles.resize_with(index + 1, || None);
        }
        self.handles[index] = Some(handle);

        NodeId::new(index, generation)
    }

    /// Discards the descendants of `id`, releasing their handles.
    fn remove_descendants(&mut self, id: NodeId) -> Result<usize> {
        let mut stack = std::mem::take(&mut self.get_mut(id)?.children);
        let mut removed = 0;

        while let Some(current) = stack.pop() {
            if self.node(current).is_none() {
                continue;
            }
            let node = self.nodes.remove(current.index);
            self.handles[current.index] = None;
            stack.extend(node.children);
            if self.selection.current() == Some(current) {
                self.selection.clear();
            }
            removed += 1;
        }

        Ok(removed)
    }

    /// Returns a receiver of all future change notifications.
    ///
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&mut self) -> Receiver<TreeEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Opens a batch-mutation scope.
    ///
    /// Notifications raised while the guard is alive are queued and
    /// delivered, in order, when the outermost guard is dropped.
    pub fn batch(&mut self) -> BatchGuard<'_, S> {
        self.batch_depth += 1;
        BatchGuard { tree: self }
    }

    fn batched<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let mut guard = self.batch();
        f(&mut *guard)
    }

    fn end_batch(&mut self) {
        self.batch_depth -= 1;
        if self.batch_depth == 0 && !self.pending.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            debug!(count = pending.len(), "Flushing batched tree events");
            for event in pending {
                self.broadcast(event);
            }
        }
    }

    fn emit(&mut self, event: TreeEvent) {
        if self.batch_depth > 0 {
            self.pending.push(event);
        } else {
            self.broadcast(event);
        }
    }

    fn broadcast(&mut self, event: TreeEvent) {
        self.subscribers.retain(|tx| tx.send(event).is_ok());
    }

    /// Adds a root node for an already opened key.
    ///
    /// The root starts unmaterialized; call [`Tree::expand`] to load it.
    pub fn add_root(&mut self, handle: S::Handle) -> NodeId {
        let absolute_path = self
            .store
            .key_path(&handle)
            .trim_end_matches(self.config.separator)
            .to_string();
        let display_name = last_segment(&absolute_path, self.config.separator).to_string();
        let id = self.insert_node(handle, None, absolute_path, display_name);
        debug!(path = %self.nodes[id.index].absolute_path, "Added root");
        self.roots.push(id);
        id
    }

    /// Loads the direct children of a node from the store.
    ///
    /// A child's path is the parent's path joined with the enumerated name.
    /// Does nothing if the node is already materialized. Subkeys that cannot
    /// be opened are skipped. If the key itself cannot be enumerated the
    /// error is returned and the node stays unmaterialized.
    #[instrument(skip(self))]
    pub fn materialize_immediate_children(&mut self, id: NodeId) -> Result<()> {
        let node = self.get(id)?;
        if node.materialized {
            return Ok(());
        }
        let path = node.absolute_path.clone();

        let opened = {
            let handle = self.handle(id)?;
            if self.store.subkey_count(handle)? == 0 {
                Vec::new()
            } else {
                let names = self.store.subkey_names(handle)?;
                let mut opened = Vec::with_capacity(names.len());
                for name in names {
                    match self.store.open_subkey(handle, &name) {
                        Ok(child) => opened.push((name, child)),
                        Err(err) => {
                            warn!(parent = %path, subkey = %name, error = %err, "Skipping subkey that cannot be opened");
                        }
                    }
                }
                opened
            }
        };

        // Whatever is left over from an interrupted refresh goes first.
        self.remove_descendants(id)?;

        let separator = self.config.separator;
        let children: Vec<NodeId> = opened
            .into_iter()
            .map(|(name, handle)| {
                let child_path = format!("{}{}{}", path, separator, name);
                self.insert_node(handle, Some(id), child_path, name)
            })
            .collect();
        debug!(path = %path, count = children.len(), "Materialized children");

        let node = self.get_mut(id)?;
        node.children = children;
        node.materialized = true;
        self.emit(TreeEvent::ChildrenChanged(id));
        Ok(())
    }

    /// Expands a node: materializes it and prefetches one level below it.
    ///
    /// The prefetch lets every child report whether it has children of its
    /// own. A child that fails to enumerate is logged and left
    /// unmaterialized; expanding it later retries.
    #[instrument(skip(self))]
    pub fn expand(&mut self, id: NodeId) -> Result<()> {
        self.batched(|tree| {
            tree.materialize_immediate_children(id)?;

            let children = tree.get(id)?.children.clone();
            for child in children {
                if let Err(err) = tree.materialize_immediate_children(child) {
                    warn!(error = %err, "Prefetch of child failed");
                }
            }

            let node = tree.get_mut(id)?;
            if !node.expanded {
                node.expanded = true;
                tree.emit(TreeEvent::Expanded(id));
            }
            Ok(())
        })
    }

    /// Marks a node as collapsed. Its children stay resident.
    pub fn collapse(&mut self, id: NodeId) -> Result<()> {
        let node = self.get_mut(id)?;
        if node.expanded {
            node.expanded = false;
            self.emit(TreeEvent::Collapsed(id));
        }
        Ok(())
    }

    /// Discards everything below a node and reloads it from the store.
    ///
    /// Child ids handed out before the refresh become stale. The node's
    /// value snapshot is dropped as well. With `expand_after` the node is
    /// expanded afterwards, including the one-level prefetch.
    #[instrument(skip(self))]
    pub fn refresh(&mut self, id: NodeId, expand_after: bool) -> Result<()> {
        self.batched(|tree| {
            let removed = tree.remove_descendants(id)?;
            let node = tree.get_mut(id)?;
            node.materialized = false;
            node.values = None;
            debug!(path = %node.absolute_path, removed, "Discarded subtree for refresh");
            tree.emit(TreeEvent::ChildrenChanged(id));

            tree.materialize_immediate_children(id)?;
            if expand_after {
                tree.expand(id)?;
            }
            Ok(())
        })
    }

    /// Materializes every descendant of a node and loads all their values.
    ///
    /// Afterwards the subtree can be walked without any store call. This is
    /// proportional to the number of keys below the node.
    ///
    /// A failure to load `id` itself is returned. A descendant that can no
    /// longer be enumerated (for instance because the key was deleted) is
    /// logged and left unmaterialized, and its subtree is skipped.
    #[instrument(skip(self))]
    pub fn prepopulate_full(&mut self, id: NodeId) -> Result<()> {
        self.batched(|tree| {
            tree.load_node(id)?;
            let mut stack: Vec<NodeId> = tree.get(id)?.children.iter().rev().copied().collect();
            let mut visited = 1usize;
            let mut skipped = 0usize;

            while let Some(current) = stack.pop() {
                match tree.load_node(current) {
                    Ok(()) => {}
                    Err(err @ ExplorerError::Enumeration { .. }) => {
                        warn!(error = %err, "Skipping subtree that cannot be enumerated");
                        tree.remove_descendants(current)?;
                        tree.get_mut(current)?.materialized = false;
                        tree.emit(TreeEvent::ChildrenChanged(current));
                        skipped += 1;
                        continue;
                    }
                    Err(err) if err.is_recoverable() => {
                        warn!(error = %err, "Skipping unreadable subtree");
                        skipped += 1;
                        continue;
                    }
                    Err(err) => return Err(err),
                }
                stack.extend(tree.get(current)?.children.iter().rev().copied());
                visited += 1;
            }

            debug!(visited, skipped, "Prepopulated subtree");
            Ok(())
        })
    }

    /// Materializes the children of one node and loads its values.
    fn load_node(&mut self, id: NodeId) -> Result<()> {
        self.materialize_immediate_children(id)?;
        self.load_values(id)?;
        Ok(())
    }

    /// Loads the value snapshot of a node, if not loaded yet.
    ///
    /// A value that disappears between listing and reading is skipped.
    pub fn load_values(&mut self, id: NodeId) -> Result<&[Value]> {
        if self.get(id)?.values.is_none() {
            let values = {
                let handle = self.handle(id)?;
                let names = if self.store.value_count(handle)? == 0 {
                    Vec::new()
                } else {
                    self.store.value_names(handle)?
                };

                let mut values = Vec::with_capacity(names.len());
                for name in names {
                    let read = self.store.value_kind(handle, &name).and_then(|kind| {
                        Ok(match self.store.value(handle, &name)? {
                            Some(data) => Value::new(name.clone(), data),
                            None => Value::absent(name.clone(), kind),
                        })
                    });
                    match read {
                        Ok(value) => values.push(value),
                        Err(err) if err.is_recoverable() => {
                            warn!(value = %name, error = %err, "Skipping unreadable value");
                        }
                        Err(err) => return Err(err),
                    }
                }
                values
            };

            self.get_mut(id)?.values = Some(values);
            self.emit(TreeEvent::ValuesLoaded(id));
        }

        Ok(self.get(id)?.values.as_deref().unwrap_or(&[]))
    }

    /// Finds the node whose path equals `path` (compared case-insensitively).
    ///
    /// Only materialized nodes are consulted; a key that exists in the store
    /// but has not been reached by expansion is not found.
    pub fn find_exact(&self, path: &str) -> Option<NodeId> {
        self.roots
            .iter()
            .find_map(|&root| self.find_exact_from(root, path))
    }

    /// Like [`Tree::find_exact`], restricted to the subtree under `start`.
    pub fn find_exact_from(&self, start: NodeId, path: &str) -> Option<NodeId> {
        let separator = self.config.separator;
        let mut current = start;

        loop {
            let node = self.node(current)?;
            let rest = strip_prefix_ignore_case(path, &node.absolute_path)?;
            if rest.is_empty() {
                return Some(current);
            }
            if !rest.starts_with(separator) {
                return None;
            }

            current = node.children.iter().copied().find(|&child| {
                self.node(child)
                    .and_then(|c| strip_prefix_ignore_case(path, &c.absolute_path))
                    .map_or(false, |rest| rest.is_empty() || rest.starts_with(separator))
            })?;
        }
    }

    /// Ids of the node and all its ancestors, innermost first.
    pub fn ancestors(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            chain.push(node_id);
            current = self.get(node_id)?.parent;
        }
        Ok(chain)
    }

    /// Navigates to a key by path: expands it and every ancestor, then selects it.
    ///
    /// Trailing separators are ignored. Returns `None` if no resident node
    /// has that path.
    #[instrument(skip(self))]
    pub fn go_to_path(&mut self, path: &str) -> Result<Option<SelectionTicket>> {
        let path = path.trim_end_matches(self.config.separator);
        let found = match self.find_exact(path) {
            Some(found) => found,
            None => {
                debug!("Path not resident");
                return Ok(None);
            }
        };

        let chain = self.ancestors(found)?;
        self.batched(|tree| {
            for node in chain.into_iter().rev() {
                tree.expand(node)?;
            }
            Ok(())
        })?;

        self.select(found).map(Some)
    }

    /// Selects a node and returns the ticket for this selection.
    pub fn select(&mut self, id: NodeId) -> Result<SelectionTicket> {
        self.get(id)?;
        Ok(self.selection.select(id))
    }

    /// Currently selected node.
    pub fn selected(&self) -> Option<NodeId> {
        self.selection.current()
    }

    /// Returns a receiver of all future selection changes.
    pub fn selection_changes(&mut self) -> Receiver<SelectionChange> {
        self.selection.subscribe()
    }

    /// Waits out the configured selection delay, then loads the details.
    ///
    /// Returns `None` if another node was selected in the meantime, so rapid
    /// navigation costs no store calls for keys the user only passed over.
    pub fn settled_details(&mut self, ticket: &SelectionTicket) -> Result<Option<Vec<DetailRow>>> {
        if !ticket.settle(self.config.selection_delay) {
            debug!(node = ?ticket.node(), "Selection moved on before settling");
            return Ok(None);
        }
        self.details_for(ticket)
    }

    /// Loads and renders the values of the selected key.
    ///
    /// Returns `None` without touching the store if the ticket has been
    /// superseded by a newer selection.
    pub fn details_for(&mut self, ticket: &SelectionTicket) -> Result<Option<Vec<DetailRow>>> {
        if !ticket.is_current() {
            debug!(node = ?ticket.node(), "Discarding stale selection");
            return Ok(None);
        }
        let values = self.load_values(ticket.node())?;
        Ok(Some(detail_rows(values)))
    }
}

/// Guard returned by [`Tree::batch`].
///
/// Dereferences to the tree, so mutations can be made through it.
pub struct BatchGuard<'a, S: KeyStore> {
    tree: &'a mut Tree<S>,
}

impl<S: KeyStore> Deref for BatchGuard<'_, S> {
    type Target = Tree<S>;

    fn deref(&self) -> &Self::Target {
        self.tree
    }
}

impl<S: KeyStore> DerefMut for BatchGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.tree
    }
}

impl<S: KeyStore> Drop for BatchGuard<'_, S> {
    fn drop(&mut self) {
        self.tree.end_batch();
    }
}
