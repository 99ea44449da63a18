//! Enriched construct tree
//!
//! The raw `tree.json` hierarchy plus, for every construct that resolves to one, the
//! source position of the code that created it. Nodes live in an arena and refer to
//! each other by [`NodeId`], so parent links are plain indices.
//!
//! A reverse index maps `"<file>:<zero-based line>"` to the construct created on that
//! line. Children are registered before the node that declares them: when a
//! construct and one of its descendants share a line, the enclosing construct wins.
//! Children are visited in id order, so among siblings the greater id wins.

use crate::{
    location::{IndexKey, SourceLocation},
    navigation::NavigationRecord,
    proto::{ConstructInfo, RawNode},
    template::{TemplateIndex, TemplateRange},
    trace::{LogicalIdIndex, TraceReconstructor},
};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedNode {
    pub id: String,
    pub path: String,
    pub construct_info: Option<ConstructInfo>,
    pub source: Option<SourceLocation>,
    pub parent: Option<NodeId>,
    pub children: BTreeMap<String, NodeId>,
}

impl EnrichedNode {
    pub fn navigation_record(&self) -> Option<NavigationRecord> {
        self.source
            .as_ref()
            .map(|source| NavigationRecord::new(&self.id, &self.path, source))
    }
}

#[derive(Debug, Clone)]
pub struct ConstructTree {
    nodes: Vec<EnrichedNode>,
    index: HashMap<IndexKey, NodeId>,
    logical_ids: LogicalIdIndex,
}

impl ConstructTree {
    pub fn build(
        root: &RawNode,
        traces: &mut TraceReconstructor<'_>,
        logical_ids: LogicalIdIndex,
    ) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            logical_ids,
        };
        tree.insert(root, None, traces);

        debug!(
            "Built construct tree with {} nodes, {} indexed locations",
            tree.nodes.len(),
            tree.index.len()
        );
        tree
    }

    fn insert(
        &mut self,
        raw: &RawNode,
        parent: Option<NodeId>,
        traces: &mut TraceReconstructor<'_>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        // the app root has no creating frame of its own
        let source = match parent {
            Some(_) => traces.resolve_source(raw),
            None => None,
        };

        self.nodes.push(EnrichedNode {
            id: raw.id.clone(),
            path: raw.path.clone(),
            construct_info: raw.construct_info.clone(),
            source,
            parent,
            children: BTreeMap::new(),
        });

        for (child_id, child) in &raw.children {
            let child_node = self.insert(child, Some(id), traces);
            self.nodes[id.0].children.insert(child_id.clone(), child_node);
        }

        if let Some(key) = self.nodes[id.0].source.as_ref().map(SourceLocation::index_key) {
            self.index.insert(key, id);
        }
        id
    }

    pub fn root(&self) -> &EnrichedNode {
        &self.nodes[0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn indexed_locations(&self) -> usize {
        self.index.len()
    }

    pub fn get(&self, id: NodeId) -> Option<&EnrichedNode> {
        self.nodes.get(id.0)
    }

    pub fn lookup(&self, key: &IndexKey) -> Option<NodeId> {
        self.index.get(key).copied()
    }

    pub fn node_at(&self, key: &IndexKey) -> Option<&EnrichedNode> {
        self.lookup(key).and_then(|id| self.get(id))
    }

    pub fn parent_of(&self, node: &EnrichedNode) -> Option<&EnrichedNode> {
        node.parent.and_then(|id| self.get(id))
    }

    /// Root-to-node path ending at the construct created on the queried line.
    pub fn branch_at(&self, key: &IndexKey) -> Option<Branch<'_>> {
        let target = self.lookup(key)?;

        let mut nodes = vec![target];
        let mut current = self.nodes[target.0].parent;
        while let Some(id) = current {
            nodes.push(id);
            current = self.nodes[id.0].parent;
        }
        nodes.reverse();

        Some(Branch { tree: self, nodes })
    }

    pub fn logical_id_of(&self, node: &EnrichedNode) -> Option<&str> {
        self.logical_ids.get(&node.path)
    }

    /// Template ranges of the queried construct and everything beneath it.
    pub fn resources_under(&self, key: &IndexKey, templates: &TemplateIndex) -> Vec<TemplateRange> {
        let Some(start) = self.lookup(key) else {
            return Vec::new();
        };

        self.pre_order(start)
            .filter_map(|node| self.logical_id_of(node))
            .filter_map(|logical_id| templates.get(logical_id))
            .cloned()
            .collect()
    }

    /// Enclosing constructs of the queried one, root first.
    pub fn incoming_callers(&self, key: &IndexKey) -> Vec<NavigationRecord> {
        let Some(branch) = self.branch_at(key) else {
            return Vec::new();
        };

        branch
            .ancestors()
            .filter_map(EnrichedNode::navigation_record)
            .collect()
    }

    /// The queried construct and everything it creates, in pre-order.
    pub fn outgoing_callees(&self, key: &IndexKey) -> Vec<NavigationRecord> {
        let Some(start) = self.lookup(key) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        self.pre_order(start)
            .filter_map(EnrichedNode::navigation_record)
            .filter(|record| seen.insert((record.path.clone(), record.line)))
            .collect()
    }

    pub fn ancestor_chain_items(&self, key: &IndexKey) -> Vec<NavigationRecord> {
        let Some(branch) = self.branch_at(key) else {
            return Vec::new();
        };

        branch
            .nodes()
            .filter_map(EnrichedNode::navigation_record)
            .collect()
    }

    fn pre_order(&self, start: NodeId) -> impl Iterator<Item = &EnrichedNode> + '_ {
        let mut stack = vec![start];
        std::iter::from_fn(move || {
            let id = stack.pop()?;
            let node = &self.nodes[id.0];
            stack.extend(node.children.values().rev().copied());
            Some(node)
        })
    }
}

/// Pruned root-to-node path: every node but the last has exactly one child on the
/// branch, and siblings are dropped.
#[derive(Debug, Clone)]
pub struct Branch<'t> {
    tree: &'t ConstructTree,
    nodes: Vec<NodeId>,
}

impl<'t> Branch<'t> {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn nodes(&self) -> impl Iterator<Item = &'t EnrichedNode> + '_ {
        let tree = self.tree;
        self.nodes.iter().map(move |id| &tree.nodes[id.0])
    }

    /// Every node above the queried one, root first.
    pub fn ancestors(&self) -> impl Iterator<Item = &'t EnrichedNode> + '_ {
        self.nodes().take(self.nodes.len().saturating_sub(1))
    }

    pub fn root(&self) -> Option<&'t EnrichedNode> {
        self.nodes.first().map(|id| &self.tree.nodes[id.0])
    }

    pub fn leaf(&self) -> Option<&'t EnrichedNode> {
        self.nodes.last().map(|id| &self.tree.nodes[id.0])
    }

    /// The next node toward the leaf, if `node` is on the branch.
    pub fn child_of(&self, node: NodeId) -> Option<&'t EnrichedNode> {
        let position = self.nodes.iter().position(|id| *id == node)?;
        self.nodes
            .get(position + 1)
            .map(|id| &self.tree.nodes[id.0])
    }
}
