//! # Document Model
//!
//! An arena-backed markup tree. Each [`Document`] owns every node it allocates;
//! nodes are addressed by [`NodeId`] and never shared between documents.
//!
//! ## Key Invariants
//!
//! 1. **Exclusive Ownership**: a node appears in at most one parent's child list.
//! 2. **Computed Siblings**: previous/next siblings are derived from the parent's
//!    ordered child list, so they can never disagree with it.
//! 3. **Fixed Root**: the root is always a `Document` node, has no parent, and
//!    can be neither moved nor used as a sibling anchor.
//! 4. **Detach Keeps Storage**: a detached node stays allocated until the
//!    document drops; it can be reinserted or simply left behind.

use std::collections::VecDeque;

use crate::error::StructuralError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ATTRIBUTES
// ═══════════════════════════════════════════════════════════════════════════════

/// Attribute mapping with unique keys. Source order is kept for serialization
/// and for declarations evaluated left to right, but lookups are by key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attributes {
    entries: Vec<(String, String)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == name)
    }

    /// Insert or overwrite. Overwriting keeps the original position.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let pos = self.entries.iter().position(|(k, _)| k == name)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut String)> {
        self.entries.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        for (k, v) in iter {
            attrs.set(k, v);
        }
        attrs
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODE KINDS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportTarget {
    Fragment,
    Component,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Tag {
        name: String,
        attributes: Attributes,
    },
    Text(String),
    Comment(String),
    Cdata(String),
    ProcessingInstruction {
        target: String,
        data: String,
    },
    FragmentRef {
        src: String,
        attributes: Attributes,
    },
    ComponentRef {
        src: String,
        attributes: Attributes,
    },
    Slot {
        name: String,
        required: bool,
    },
    Content {
        name: String,
    },
    VarDecl {
        attributes: Attributes,
    },
    ImportDecl {
        src: String,
        alias: String,
        target: ImportTarget,
    },
}

impl NodeKind {
    pub fn tag(name: impl Into<String>) -> Self {
        NodeKind::Tag {
            name: name.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        NodeKind::Text(value.into())
    }

    pub fn is_directive(&self) -> bool {
        matches!(
            self,
            NodeKind::FragmentRef { .. }
                | NodeKind::ComponentRef { .. }
                | NodeKind::Slot { .. }
                | NodeKind::Content { .. }
                | NodeKind::VarDecl { .. }
                | NodeKind::ImportDecl { .. }
        )
    }

    pub fn is_tag(&self) -> bool {
        matches!(self, NodeKind::Tag { .. })
    }

    pub fn tag_name(&self) -> Option<&str> {
        match self {
            NodeKind::Tag { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn is_whitespace_text(&self) -> bool {
        matches!(self, NodeKind::Text(t) if t.trim().is_empty())
    }
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Options for [`Document::find_child`] and [`Document::find_children`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FindOptions {
    pub recursive: bool,
    pub tags_only: bool,
}

impl FindOptions {
    pub fn direct() -> Self {
        Self::default()
    }

    pub fn recursive() -> Self {
        Self {
            recursive: true,
            tags_only: false,
        }
    }

    pub fn tags_only(mut self) -> Self {
        self.tags_only = true;
        self
    }
}

pub type NodePredicate<'a> = &'a dyn Fn(&NodeKind) -> bool;

// ═══════════════════════════════════════════════════════════════════════════════
// DOCUMENT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Structural equality of the trees reachable from each root. Node ids and
/// detached leftovers do not take part.
impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.same_subtree(self.root(), other, other.root())
    }
}

impl Document {
    fn same_subtree(&self, a: NodeId, other: &Document, b: NodeId) -> bool {
        let (left, right) = (self.children(a), other.children(b));
        self.kind(a) == other.kind(b)
            && left.len() == right.len()
            && left
                .iter()
                .zip(right)
                .all(|(&x, &y)| self.same_subtree(x, other, y))
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Allocate a detached node.
    pub fn create(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    /// # Panics
    /// If `id` was not allocated by this document.
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id.index()].kind
    }

    pub fn set_kind(&mut self, id: NodeId, kind: NodeKind) {
        self.nodes[id.index()].kind = kind;
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).first().copied()
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).last().copied()
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        let (parent, pos) = self.position(id)?;
        pos.checked_sub(1).map(|p| self.children(parent)[p])
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let (parent, pos) = self.position(id)?;
        self.children(parent).get(pos + 1).copied()
    }

    /// True when `id` is reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.ancestors(id).last().unwrap_or(id) == self.root()
    }

    /// Parent chain from `id` upwards, excluding `id` itself.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |p| self.parent(*p))
    }

    pub fn is_ancestor_of(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.ancestors(node).any(|a| a == ancestor)
    }

    fn position(&self, id: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.parent(id)?;
        let pos = self.children(parent).iter().position(|c| *c == id)?;
        Some((parent, pos))
    }

    fn check(&self, id: NodeId) -> Result<(), StructuralError> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(StructuralError::UnknownNode(id))
        }
    }

    /// `node` may be moved under or next to `anchor`.
    fn check_movable(&self, node: NodeId, anchor: NodeId) -> Result<(), StructuralError> {
        self.check(node)?;
        self.check(anchor)?;
        if node == self.root() {
            return Err(StructuralError::RootMove(node));
        }
        if node == anchor || self.is_ancestor_of(node, anchor) {
            return Err(StructuralError::Cycle { node, anchor });
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // MUTATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Remove `id` from its parent. Detaching a parentless node is a no-op.
    pub fn detach(&mut self, id: NodeId) -> Result<(), StructuralError> {
        self.check(id)?;
        if let Some((parent, pos)) = self.position(id) {
            self.nodes[parent.index()].children.remove(pos);
        }
        self.nodes[id.index()].parent = None;
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), StructuralError> {
        self.check_movable(child, parent)?;
        self.detach(child)?;
        self.nodes[parent.index()].children.push(child);
        self.nodes[child.index()].parent = Some(parent);
        Ok(())
    }

    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), StructuralError> {
        self.check_movable(child, parent)?;
        self.detach(child)?;
        self.nodes[parent.index()].children.insert(0, child);
        self.nodes[child.index()].parent = Some(parent);
        Ok(())
    }

    /// Insert `node` directly after `anchor`.
    pub fn append_sibling(&mut self, anchor: NodeId, node: NodeId) -> Result<(), StructuralError> {
        self.insert_beside(anchor, node, 1)
    }

    /// Insert `node` directly before `anchor`.
    pub fn prepend_sibling(&mut self, anchor: NodeId, node: NodeId) -> Result<(), StructuralError> {
        self.insert_beside(anchor, node, 0)
    }

    fn insert_beside(
        &mut self,
        anchor: NodeId,
        node: NodeId,
        offset: usize,
    ) -> Result<(), StructuralError> {
        self.check(anchor)?;
        if anchor == self.root() {
            return Err(StructuralError::RootSibling(anchor));
        }
        self.check_movable(node, anchor)?;
        let parent = self.parent(anchor).ok_or(StructuralError::Detached(anchor))?;
        self.detach(node)?;
        // Position is looked up after the detach since it may shift the anchor.
        let (_, pos) = self
            .position(anchor)
            .ok_or(StructuralError::Detached(anchor))?;
        self.nodes[parent.index()].children.insert(pos + offset, node);
        self.nodes[node.index()].parent = Some(parent);
        Ok(())
    }

    /// Put `replacements` where `id` stands, in order, then detach `id`.
    pub fn replace_self(
        &mut self,
        id: NodeId,
        replacements: &[NodeId],
    ) -> Result<(), StructuralError> {
        self.check(id)?;
        if id == self.root() {
            return Err(StructuralError::RootMove(id));
        }
        if replacements.is_empty() {
            return Err(StructuralError::EmptyReplacement(id));
        }
        self.parent(id).ok_or(StructuralError::Detached(id))?;
        let mut anchor = id;
        for &node in replacements {
            self.append_sibling(anchor, node)?;
            anchor = node;
        }
        self.detach(id)
    }

    /// Replace `id` with its own children, then detach it.
    pub fn unwrap_node(&mut self, id: NodeId) -> Result<(), StructuralError> {
        let children = self.children(id).to_vec();
        if children.is_empty() {
            return self.detach(id);
        }
        self.replace_self(id, &children)
    }

    /// Exchange the positions of `a` and `b`. Each keeps its own children.
    pub fn swap_with(&mut self, a: NodeId, b: NodeId) -> Result<(), StructuralError> {
        self.check(a)?;
        self.check(b)?;
        if a == b {
            return Ok(());
        }
        for id in [a, b] {
            if id == self.root() {
                return Err(StructuralError::RootMove(id));
            }
        }
        if self.is_ancestor_of(a, b) {
            return Err(StructuralError::Cycle { node: a, anchor: b });
        }
        if self.is_ancestor_of(b, a) {
            return Err(StructuralError::Cycle { node: b, anchor: a });
        }

        let pos_a = self.position(a);
        let pos_b = self.position(b);
        if let Some((parent, pos)) = pos_a {
            self.nodes[parent.index()].children[pos] = b;
        }
        if let Some((parent, pos)) = pos_b {
            self.nodes[parent.index()].children[pos] = a;
        }
        self.nodes[a.index()].parent = pos_b.map(|(p, _)| p);
        self.nodes[b.index()].parent = pos_a.map(|(p, _)| p);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CLONING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Copy `id` into a new detached node of this document. With `deep`, the
    /// subtree is copied too and `on_pair` sees every (original, copy) pair.
    pub fn clone_node(
        &mut self,
        id: NodeId,
        deep: bool,
        on_pair: &mut dyn FnMut(NodeId, NodeId),
    ) -> Result<NodeId, StructuralError> {
        self.check(id)?;
        if id == self.root() {
            return Err(StructuralError::RootMove(id));
        }
        let copy = self.create(self.kind(id).clone());
        on_pair(id, copy);
        if deep {
            for child in self.children(id).to_vec() {
                let child_copy = self.clone_node(child, true, on_pair)?;
                self.append_child(copy, child_copy)?;
            }
        }
        Ok(copy)
    }

    /// Deep-copy the subtree at `id` of `source` into this document. The copy
    /// is left detached.
    pub fn import_node(
        &mut self,
        source: &Document,
        id: NodeId,
        on_pair: &mut dyn FnMut(NodeId, NodeId),
    ) -> Result<NodeId, StructuralError> {
        source.check(id)?;
        if id == source.root() {
            return Err(StructuralError::RootMove(id));
        }
        let copy = self.create(source.kind(id).clone());
        on_pair(id, copy);
        for &child in source.children(id) {
            let child_copy = self.import_node(source, child, on_pair)?;
            self.append_child(copy, child_copy)?;
        }
        Ok(copy)
    }

    /// Deep-copy every child of `parent` in `source`; the copies are detached.
    pub fn import_children(
        &mut self,
        source: &Document,
        parent: NodeId,
    ) -> Result<Vec<NodeId>, StructuralError> {
        source.check(parent)?;
        source
            .children(parent)
            .iter()
            .map(|&child| self.import_node(source, child, &mut |_, _| {}))
            .collect()
    }

    /// A compacted, fully independent copy holding only the nodes reachable
    /// from the root. `on_pair` sees every (original, copy) pair, root included.
    pub fn deep_clone(&self, on_pair: &mut dyn FnMut(NodeId, NodeId)) -> Document {
        let mut copy = Document::new();
        on_pair(self.root(), copy.root());
        let mut queue: VecDeque<(NodeId, NodeId)> = VecDeque::new();
        queue.push_back((self.root(), copy.root()));
        while let Some((original, target)) = queue.pop_front() {
            for &child in self.children(original) {
                let child_copy = copy.create(self.kind(child).clone());
                copy.nodes[child_copy.index()].parent = Some(target);
                copy.nodes[target.index()].children.push(child_copy);
                on_pair(child, child_copy);
                queue.push_back((child, child_copy));
            }
        }
        copy
    }

    /// Move every child of `parent` into a new standalone document.
    pub fn create_subtree_from_children(
        &mut self,
        parent: NodeId,
    ) -> Result<Document, StructuralError> {
        self.check(parent)?;
        let mut subtree = Document::new();
        let root = subtree.root();
        for child in self.children(parent).to_vec() {
            let copy = subtree.import_node(self, child, &mut |_, _| {})?;
            subtree.append_child(root, copy)?;
            self.detach(child)?;
        }
        Ok(subtree)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TRAVERSAL
    // ═══════════════════════════════════════════════════════════════════════════

    /// Preorder depth-first visit of `start` and its descendants.
    pub fn walk(&self, start: NodeId, visitor: &mut dyn FnMut(&Document, NodeId)) {
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            visitor(self, id);
            stack.extend(self.children(id).iter().rev().copied());
        }
    }

    /// Preorder list of the strict descendants of `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.walk(id, &mut |_, n| out.push(n));
        out.remove(0);
        out
    }

    pub fn find_child(
        &self,
        parent: NodeId,
        options: FindOptions,
        predicate: NodePredicate<'_>,
    ) -> Option<NodeId> {
        self.candidates(parent, options)
            .into_iter()
            .find(|&id| predicate(self.kind(id)))
    }

    pub fn find_children(
        &self,
        parent: NodeId,
        options: FindOptions,
        predicate: NodePredicate<'_>,
    ) -> Vec<NodeId> {
        self.candidates(parent, options)
            .into_iter()
            .filter(|&id| predicate(self.kind(id)))
            .collect()
    }

    fn candidates(&self, parent: NodeId, options: FindOptions) -> Vec<NodeId> {
        let nodes = if options.recursive {
            self.descendants(parent)
        } else {
            self.children(parent).to_vec()
        };
        nodes
            .into_iter()
            .filter(|&id| !options.tags_only || self.kind(id).is_tag())
            .collect()
    }

    /// Apply `chain` level by level: the first predicate filters the children
    /// of `root`, each following predicate filters the children of the previous
    /// matches. Returns the matches of the last predicate in document order.
    pub fn find_by_path(&self, root: NodeId, chain: &[NodePredicate<'_>]) -> Vec<NodeId> {
        let mut current = vec![root];
        for predicate in chain {
            current = current
                .into_iter()
                .flat_map(|id| self.children(id).iter().copied())
                .filter(|&id| predicate(self.kind(id)))
                .collect();
            if current.is_empty() {
                break;
            }
        }
        if chain.is_empty() {
            Vec::new()
        } else {
            current
        }
    }

    /// Concatenated text of every text and CDATA descendant.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.walk(id, &mut |doc, n| match doc.kind(n) {
            NodeKind::Text(t) | NodeKind::Cdata(t) => out.push_str(t),
            _ => {}
        });
        out
    }

    /// Number of nodes reachable from the root, root included.
    pub fn reachable_count(&self) -> usize {
        let mut count = 0;
        self.walk(self.root(), &mut |_, _| count += 1);
        count
    }
}
