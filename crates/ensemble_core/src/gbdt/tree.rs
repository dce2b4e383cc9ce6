//! Decision tree structures for ensemble inference
//!
//! A tree is an owned arena of nodes indexed directly by node id, with the
//! root at id 0. Construction validates the whole structure once so the
//! evaluation walk is a plain array-indexed loop.

use crate::evaluator::Sample;
use std::fmt;

/// Id of the root node in every tree
pub const ROOT_ID: u32 = 0;

/// Largest node id accepted; bounds the arena allocation
pub const MAX_NODE_ID: u32 = (1 << 24) - 1;

/// A decision tree node (split or leaf)
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Terminal node carrying the tree's additive contribution
    Leaf { id: u32, value: f64 },

    /// Internal node routing on `sample[feature] < threshold`
    Split {
        id: u32,
        /// Distance from the root (diagnostic only)
        depth: u32,
        /// Index into the ensemble's feature-name list
        feature: usize,
        threshold: f64,
        /// Target when the feature value is below the threshold
        yes: u32,
        /// Target when the feature value is at or above the threshold
        no: u32,
        /// Target when the feature value is missing
        missing: u32,
    },
}

impl Node {
    /// Create a new leaf node
    pub fn leaf(id: u32, value: f64) -> Self {
        Node::Leaf { id, value }
    }

    /// Create a new split node; depth is assigned when the tree is assembled
    pub fn split(id: u32, feature: usize, threshold: f64, yes: u32, no: u32, missing: u32) -> Self {
        Node::Split {
            id,
            depth: 0,
            feature,
            threshold,
            yes,
            no,
            missing,
        }
    }

    pub fn id(&self) -> u32 {
        match self {
            Node::Leaf { id, .. } | Node::Split { id, .. } => *id,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    /// Get the leaf value if this is a leaf node
    pub fn leaf_value(&self) -> Option<f64> {
        match self {
            Node::Leaf { value, .. } => Some(*value),
            Node::Split { .. } => None,
        }
    }

    fn set_depth(&mut self, new_depth: u32) {
        if let Node::Split { depth, .. } = self {
            *depth = new_depth;
        }
    }
}

/// Structural fault hit while walking a tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeFault {
    /// A branch target is not present in the arena
    DanglingReference { node: u32, target: u32 },
    /// A split reads a feature slot the sample does not have
    FeatureOutOfRange { node: u32, feature: usize, len: usize },
    /// The walk visited more nodes than the tree holds
    CycleDetected { node: u32 },
}

impl TreeFault {
    /// Node at which the fault was detected
    pub fn node(&self) -> u32 {
        match self {
            TreeFault::DanglingReference { node, .. }
            | TreeFault::FeatureOutOfRange { node, .. }
            | TreeFault::CycleDetected { node } => *node,
        }
    }
}

impl fmt::Display for TreeFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeFault::DanglingReference { node, target } => {
                write!(f, "node {node} references missing node {target}")
            }
            TreeFault::FeatureOutOfRange { node, feature, len } => write!(
                f,
                "node {node} reads feature {feature} but the sample has {len} features"
            ),
            TreeFault::CycleDetected { node } => {
                write!(f, "walk did not terminate (last node {node})")
            }
        }
    }
}

/// A single decision tree in arena form
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    /// Slot `i` holds the node with id `i`; ids may be sparse
    nodes: Vec<Option<Node>>,
    /// Number of occupied slots
    len: usize,
}

impl Tree {
    /// Assemble and validate a tree from a flat list of nodes.
    ///
    /// Checks that ids are unique, the root exists, every branch target
    /// resolves, `missing` is one of the split's own `yes`/`no` children, and
    /// every node is reached exactly once from the root via its `yes`/`no`
    /// edges. Split depths are recomputed from the structure.
    pub fn from_nodes(nodes: Vec<Node>) -> Result<Self, String> {
        if nodes.is_empty() {
            return Err("Tree has no nodes".to_string());
        }

        let mut max_id = 0u32;
        for node in &nodes {
            let id = node.id();
            if id > MAX_NODE_ID {
                return Err(format!("Node id {id} exceeds limit {MAX_NODE_ID}"));
            }
            max_id = max_id.max(id);
        }

        let len = nodes.len();
        let mut arena: Vec<Option<Node>> = vec![None; max_id as usize + 1];
        for node in nodes {
            let slot = &mut arena[node.id() as usize];
            if slot.is_some() {
                return Err(format!("Duplicate node id {}", node.id()));
            }
            *slot = Some(node);
        }

        if arena[ROOT_ID as usize].is_none() {
            return Err("Tree has no root node (id 0)".to_string());
        }

        // Every target must resolve before the reachability walk
        for node in arena.iter().flatten() {
            if let Node::Split {
                id,
                yes,
                no,
                missing,
                ..
            } = node
            {
                if yes == no {
                    return Err(format!("Node {id} has identical yes/no target {yes}"));
                }
                for (edge, target) in [("yes", yes), ("no", no), ("missing", missing)] {
                    let resolved = arena
                        .get(*target as usize)
                        .map_or(false, |slot| slot.is_some());
                    if !resolved {
                        return Err(format!(
                            "Node {id} has dangling {edge} reference to node {target}"
                        ));
                    }
                }
                if *missing != *yes && *missing != *no {
                    return Err(format!(
                        "Node {id} routes missing values to node {missing}, \
                         which is neither its yes ({yes}) nor its no ({no}) child"
                    ));
                }
            }
        }

        let mut visited = vec![false; arena.len()];
        let mut reached = 0usize;
        let mut stack = vec![(ROOT_ID, 0u32)];
        while let Some((id, depth)) = stack.pop() {
            let slot = id as usize;
            if visited[slot] {
                return Err(format!("Node {id} is reachable by more than one path"));
            }
            visited[slot] = true;
            reached += 1;

            if let Some(node) = arena[slot].as_mut() {
                node.set_depth(depth);
                if let Node::Split { yes, no, .. } = node {
                    stack.push((*no, depth + 1));
                    stack.push((*yes, depth + 1));
                }
            }
        }

        if reached != len {
            let orphan = arena
                .iter()
                .flatten()
                .find(|node| !visited[node.id() as usize])
                .map(Node::id)
                .unwrap_or_default();
            return Err(format!("Node {orphan} is not reachable from the root"));
        }

        Ok(Self { nodes: arena, len })
    }

    /// Single-leaf tree contributing a constant
    pub fn stump(value: f64) -> Self {
        Self {
            nodes: vec![Some(Node::leaf(ROOT_ID, value))],
            len: 1,
        }
    }

    /// Evaluate this tree on a sample.
    ///
    /// A present value strictly below the threshold follows `yes`, otherwise
    /// `no`; a missing value (or NaN) follows `missing`.
    pub fn evaluate(&self, sample: &Sample) -> Result<f64, TreeFault> {
        let mut id = ROOT_ID;

        for _ in 0..self.len {
            let node = self
                .node(id)
                .ok_or(TreeFault::DanglingReference { node: id, target: id })?;

            let (feature, threshold, yes, no, missing) = match node {
                Node::Leaf { value, .. } => return Ok(*value),
                Node::Split {
                    feature,
                    threshold,
                    yes,
                    no,
                    missing,
                    ..
                } => (*feature, *threshold, *yes, *no, *missing),
            };

            let value = sample.get(feature).ok_or(TreeFault::FeatureOutOfRange {
                node: id,
                feature,
                len: sample.len(),
            })?;

            let next = match value {
                Some(v) if !v.is_nan() => {
                    if v < threshold {
                        yes
                    } else {
                        no
                    }
                }
                _ => missing,
            };

            if self.node(next).is_none() {
                return Err(TreeFault::DanglingReference { node: id, target: next });
            }
            id = next;
        }

        Err(TreeFault::CycleDetected { node: id })
    }

    /// Look up a node by id
    pub fn node(&self, id: u32) -> Option<&Node> {
        self.nodes.get(id as usize).and_then(Option::as_ref)
    }

    /// Get the root node
    pub fn root(&self) -> &Node {
        // `from_nodes` and `stump` both guarantee slot 0 is occupied
        self.nodes[ROOT_ID as usize]
            .as_ref()
            .unwrap_or_else(|| unreachable!("tree without root"))
    }

    /// Nodes in ascending id order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().flatten()
    }

    /// Resolved `[yes, no]` children of a split node
    pub fn children(&self, id: u32) -> Option<[&Node; 2]> {
        match self.node(id)? {
            Node::Split { yes, no, .. } => Some([self.node(*yes)?, self.node(*no)?]),
            Node::Leaf { .. } => None,
        }
    }

    /// Number of nodes in the tree
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn num_leaves(&self) -> usize {
        self.nodes().filter(|node| node.is_leaf()).count()
    }

    /// Depth of the deepest split plus one; 0 for a stump
    pub fn depth(&self) -> u32 {
        self.nodes()
            .filter_map(|node| match node {
                Node::Split { depth, .. } => Some(depth + 1),
                Node::Leaf { .. } => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Highest feature index referenced by any split
    pub fn max_feature(&self) -> Option<usize> {
        self.nodes()
            .filter_map(|node| match node {
                Node::Split { feature, .. } => Some(*feature),
                Node::Leaf { .. } => None,
            })
            .max()
    }
}
