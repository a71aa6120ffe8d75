/**
 * @file src/graph.rs
 * @brief Heterogeneous graph storage with per-relation adjacency
 *
 * In-memory graph store for relational link prediction. Nodes are grouped
 * by type name with a dense per-type id space; edges are grouped by
 * canonical (source-type, relation, destination-type) triples. Every
 * relation keeps an explicit edge list plus a forward adjacency map, so
 * layers and samplers walk edges directly instead of registering callbacks
 * with a message-passing engine.
 *
 * ## Core Components:
 * - **CanonicalEdgeType**: (src-type, relation, dst-type) storage key
 * - **HeteroGraph**: node sets, relation stores, named feature tensors
 * - **NodeMapping**: local-id -> original-id tables of derived subgraphs
 *
 * Graphs are multigraphs: duplicate edges are kept, and pair removal drops
 * every copy. Relation stores sit in ordered maps, so iteration order (and
 * with it any float accumulation downstream) is deterministic.
 */

use ndarray::{concatenate, Array2, Axis};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{GNNError, GNNResult};

// === TYPE ALIASES ===

/// Node identifier inside one node type's dense id space
pub type NodeIndex = usize;
/// Edge position inside one relation's edge list
pub type EdgeIndex = usize;
/// Node feature matrix: rows = nodes of one type, columns = feature dims
pub type NodeFeatures = Array2<f32>;
/// Per node type, the local-id -> original-id table of a derived subgraph
pub type NodeMapping = HashMap<String, Vec<NodeIndex>>;

// === CANONICAL EDGE TYPES ===

/**
 * Canonical edge type: the (source-type, relation, destination-type)
 * triple keying one relation's edge store.
 *
 * The full triple keys graph storage, while layer parameters are keyed by
 * relation name alone, so two relations sharing a name but connecting
 * different node types stay distinct in the graph yet share parameters.
 */
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CanonicalEdgeType {
    pub src_type: String,
    pub relation: String,
    pub dst_type: String,
}

impl CanonicalEdgeType {
    /// Build a canonical edge type from string-like parts
    pub fn new(
        src_type: impl Into<String>,
        relation: impl Into<String>,
        dst_type: impl Into<String>,
    ) -> Self {
        Self {
            src_type: src_type.into(),
            relation: relation.into(),
            dst_type: dst_type.into(),
        }
    }

    /// True when source and destination node types coincide
    pub fn is_homogeneous(&self) -> bool {
        self.src_type == self.dst_type
    }
}

impl fmt::Display for CanonicalEdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.src_type, self.relation, self.dst_type)
    }
}

// === RELATION STORAGE ===

/// Edge storage for one canonical relation: explicit list plus adjacency
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "RawRelationStore"))]
struct RelationStore {
    /// Edges in insertion order; duplicates allowed
    edges: Vec<(NodeIndex, NodeIndex)>,
    /// source -> destinations, one entry per stored edge
    #[cfg_attr(feature = "serde", serde(skip_serializing))]
    forward_adj: HashMap<NodeIndex, Vec<NodeIndex>>,
    /// Distinct endpoint pairs, for O(1) existence checks
    #[cfg_attr(feature = "serde", serde(skip_serializing))]
    pairs: HashSet<(NodeIndex, NodeIndex)>,
}

impl RelationStore {
    fn from_edges(edges: &[(NodeIndex, NodeIndex)]) -> Self {
        let mut store = Self::default();
        for &(src, dst) in edges {
            store.add_edge(src, dst);
        }
        store
    }

    fn add_edge(&mut self, src: NodeIndex, dst: NodeIndex) {
        self.edges.push((src, dst));
        self.forward_adj.entry(src).or_default().push(dst);
        self.pairs.insert((src, dst));
    }

    fn contains(&self, src: NodeIndex, dst: NodeIndex) -> bool {
        self.pairs.contains(&(src, dst))
    }

    /// Drop every stored (src, dst) edge; returns the removed positions in
    /// ascending order so feature rows can be dropped alongside
    fn remove_pair(&mut self, src: NodeIndex, dst: NodeIndex) -> Vec<EdgeIndex> {
        let removed: Vec<EdgeIndex> = self
            .edges
            .iter()
            .enumerate()
            .filter(|(_, &edge)| edge == (src, dst))
            .map(|(position, _)| position)
            .collect();
        if removed.is_empty() {
            return removed;
        }
        self.edges.retain(|&edge| edge != (src, dst));
        if let Some(dsts) = self.forward_adj.get_mut(&src) {
            dsts.retain(|&d| d != dst);
            if dsts.is_empty() {
                self.forward_adj.remove(&src);
            }
        }
        self.pairs.remove(&(src, dst));
        removed
    }
}

/// Wire form of `RelationStore`: only the edge list travels, adjacency and
/// the pair set are rebuilt on decode
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct RawRelationStore {
    edges: Vec<(NodeIndex, NodeIndex)>,
}

#[cfg(feature = "serde")]
impl From<RawRelationStore> for RelationStore {
    fn from(raw: RawRelationStore) -> Self {
        Self::from_edges(&raw.edges)
    }
}

// === HETEROGENEOUS GRAPH ===

/**
 * Heterogeneous multigraph with named feature tensors.
 *
 * Node ids are dense per type (`0..num_nodes(type)`); edges live under
 * their canonical edge type. Feature tensors attach by name to node types
 * (rows = nodes) or to relations (rows = edges in storage order); the
 * row-count invariants are enforced at insertion and preserved by removal,
 * self-loop augmentation and subgraph extraction.
 */
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawHeteroGraph"))]
pub struct HeteroGraph {
    /// Nodes per type name, ids 0..count
    node_counts: BTreeMap<String, usize>,
    /// One edge store per canonical relation, iterated in key order
    relations: BTreeMap<CanonicalEdgeType, RelationStore>,
    /// Named node feature tensors per node type
    node_features: HashMap<String, HashMap<String, NodeFeatures>>,
    /// Named edge feature tensors per canonical relation
    edge_features: HashMap<CanonicalEdgeType, HashMap<String, Array2<f32>>>,
}

impl HeteroGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `count` additional nodes under `node_type`
    pub fn add_nodes(&mut self, node_type: impl Into<String>, count: usize) {
        *self.node_counts.entry(node_type.into()).or_insert(0) += count;
    }

    pub fn num_nodes(&self, node_type: &str) -> usize {
        self.node_counts.get(node_type).copied().unwrap_or(0)
    }

    /// Node type names in sorted order
    pub fn node_types(&self) -> Vec<&str> {
        self.node_counts.keys().map(String::as_str).collect()
    }

    /// Canonical edge types in sorted order
    pub fn edge_types(&self) -> Vec<&CanonicalEdgeType> {
        self.relations.keys().collect()
    }

    /**
     * Append edges under a canonical relation.
     *
     * Both endpoint node types must already be registered and every
     * endpoint id must be in range; validation happens before any edge is
     * stored, so a failed call leaves the graph untouched. Duplicate pairs
     * are kept (multigraph).
     */
    pub fn add_edges(
        &mut self,
        etype: CanonicalEdgeType,
        pairs: &[(NodeIndex, NodeIndex)],
    ) -> GNNResult<()> {
        let src_count = self.num_nodes(&etype.src_type);
        let dst_count = self.num_nodes(&etype.dst_type);
        for &(src, dst) in pairs {
            if src >= src_count || dst >= dst_count {
                return Err(GNNError::InvalidInput(format!(
                    "edge ({}, {}) out of range for {} with {} source and {} destination nodes",
                    src, dst, etype, src_count, dst_count
                )));
            }
        }
        let store = self.relations.entry(etype).or_default();
        for &(src, dst) in pairs {
            store.add_edge(src, dst);
        }
        Ok(())
    }

    pub fn num_edges(&self, etype: &CanonicalEdgeType) -> usize {
        self.relations.get(etype).map(|s| s.edges.len()).unwrap_or(0)
    }

    /// Edge list of one relation, in storage order
    pub fn edges(&self, etype: &CanonicalEdgeType) -> GNNResult<&[(NodeIndex, NodeIndex)]> {
        self.relations
            .get(etype)
            .map(|s| s.edges.as_slice())
            .ok_or_else(|| GNNError::InvalidInput(format!("unknown edge type {}", etype)))
    }

    pub fn has_edge(&self, etype: &CanonicalEdgeType, src: NodeIndex, dst: NodeIndex) -> bool {
        self.relations
            .get(etype)
            .map(|s| s.contains(src, dst))
            .unwrap_or(false)
    }

    /// Outgoing neighbors of one node across every relation it sources, as
    /// (destination-type, destination-id) pairs in relation order
    pub fn out_neighbors(&self, node_type: &str, node: NodeIndex) -> Vec<(&str, NodeIndex)> {
        let mut neighbors = Vec::new();
        for (etype, store) in &self.relations {
            if etype.src_type != node_type {
                continue;
            }
            if let Some(dsts) = store.forward_adj.get(&node) {
                for &dst in dsts {
                    neighbors.push((etype.dst_type.as_str(), dst));
                }
            }
        }
        neighbors
    }

    /**
     * Remove every edge between `src` and `dst` under one relation,
     * multi-edges included. Edge feature rows of that relation are dropped
     * alongside so they stay aligned with the surviving edges. Returns the
     * number of edges removed; an unknown relation removes nothing.
     */
    pub fn remove_edges_between(
        &mut self,
        etype: &CanonicalEdgeType,
        src: NodeIndex,
        dst: NodeIndex,
    ) -> usize {
        let removed = match self.relations.get_mut(etype) {
            Some(store) => store.remove_pair(src, dst),
            None => return 0,
        };
        if removed.is_empty() {
            return 0;
        }
        if let Some(named) = self.edge_features.get_mut(etype) {
            let dropped: HashSet<EdgeIndex> = removed.iter().copied().collect();
            for tensor in named.values_mut() {
                let keep: Vec<usize> = (0..tensor.nrows())
                    .filter(|row| !dropped.contains(row))
                    .collect();
                *tensor = tensor.select(Axis(0), &keep);
            }
        }
        removed.len()
    }

    // === FEATURE STORAGE ===

    /// Attach a named feature tensor to a node type (rows = nodes)
    pub fn set_node_features(
        &mut self,
        node_type: &str,
        name: &str,
        features: NodeFeatures,
    ) -> GNNResult<()> {
        let count = self.num_nodes(node_type);
        if features.nrows() != count {
            return Err(GNNError::DimensionMismatch(format!(
                "feature tensor '{}' has {} rows but node type '{}' has {} nodes",
                name,
                features.nrows(),
                node_type,
                count
            )));
        }
        self.node_features
            .entry(node_type.to_string())
            .or_default()
            .insert(name.to_string(), features);
        Ok(())
    }

    pub fn node_features(&self, node_type: &str, name: &str) -> Option<&NodeFeatures> {
        self.node_features.get(node_type).and_then(|m| m.get(name))
    }

    /// Attach a named feature tensor to a relation (rows = edges in
    /// storage order)
    pub fn set_edge_features(
        &mut self,
        etype: &CanonicalEdgeType,
        name: &str,
        features: Array2<f32>,
    ) -> GNNResult<()> {
        let count = self.num_edges(etype);
        if features.nrows() != count {
            return Err(GNNError::DimensionMismatch(format!(
                "feature tensor '{}' has {} rows but relation {} has {} edges",
                name,
                features.nrows(),
                etype,
                count
            )));
        }
        self.edge_features
            .entry(etype.clone())
            .or_default()
            .insert(name.to_string(), features);
        Ok(())
    }

    pub fn edge_features(&self, etype: &CanonicalEdgeType, name: &str) -> Option<&Array2<f32>> {
        self.edge_features.get(etype).and_then(|m| m.get(name))
    }

    // === DERIVED GRAPHS ===

    /**
     * Independent copy with a self loop (i, i) appended for every node
     * under every relation whose source and destination types coincide.
     *
     * Loops are appended even when already present, and edge feature
     * tensors of the touched relations are padded with zero rows to keep
     * their row counts aligned. The receiver is never mutated.
     */
    pub fn with_self_loops(&self) -> GNNResult<Self> {
        let mut augmented = self.clone();
        for (etype, store) in augmented.relations.iter_mut() {
            if !etype.is_homogeneous() {
                continue;
            }
            let count = self.num_nodes(&etype.src_type);
            for node in 0..count {
                store.add_edge(node, node);
            }
            if let Some(named) = augmented.edge_features.get_mut(etype) {
                for tensor in named.values_mut() {
                    let padding = Array2::<f32>::zeros((count, tensor.ncols()));
                    let padded = concatenate(Axis(0), &[tensor.view(), padding.view()])?;
                    *tensor = padded;
                }
            }
        }
        Ok(augmented)
    }

    /**
     * Induced subgraph over per-type node selections.
     *
     * Selections are deduplicated and sorted; local ids are assigned by
     * sorted position, making extraction deterministic. A relation
     * survives when both its endpoint types appear in the selection, even
     * if none of its edges do. Node feature rows are sliced to the kept
     * nodes and edge feature rows to the kept edges.
     *
     * Returns the subgraph together with the per-type local-id ->
     * original-id table.
     */
    pub fn induced_subgraph(
        &self,
        selection: &HashMap<String, Vec<NodeIndex>>,
    ) -> GNNResult<(Self, NodeMapping)> {
        let mut mapping: NodeMapping = HashMap::new();
        let mut local_of: HashMap<&str, HashMap<NodeIndex, NodeIndex>> = HashMap::new();
        for (node_type, ids) in selection {
            let count = match self.node_counts.get(node_type) {
                Some(&count) => count,
                None => {
                    return Err(GNNError::InvalidInput(format!(
                        "unknown node type '{}' in subgraph selection",
                        node_type
                    )))
                }
            };
            let originals: Vec<NodeIndex> = ids
                .iter()
                .copied()
                .collect::<BTreeSet<NodeIndex>>()
                .into_iter()
                .collect();
            if let Some(&max) = originals.last() {
                if max >= count {
                    return Err(GNNError::InvalidInput(format!(
                        "node {} out of range for type '{}' with {} nodes",
                        max, node_type, count
                    )));
                }
            }
            let table: HashMap<NodeIndex, NodeIndex> = originals
                .iter()
                .enumerate()
                .map(|(local, &orig)| (orig, local))
                .collect();
            local_of.insert(node_type.as_str(), table);
            mapping.insert(node_type.clone(), originals);
        }

        let mut subgraph = HeteroGraph::new();
        for (node_type, originals) in &mapping {
            subgraph.add_nodes(node_type.clone(), originals.len());
        }

        for (etype, store) in &self.relations {
            let src_table = match local_of.get(etype.src_type.as_str()) {
                Some(table) => table,
                None => continue,
            };
            let dst_table = match local_of.get(etype.dst_type.as_str()) {
                Some(table) => table,
                None => continue,
            };
            let mut kept_edges: Vec<(NodeIndex, NodeIndex)> = Vec::new();
            let mut kept_rows: Vec<usize> = Vec::new();
            for (position, &(src, dst)) in store.edges.iter().enumerate() {
                if let (Some(&local_src), Some(&local_dst)) =
                    (src_table.get(&src), dst_table.get(&dst))
                {
                    kept_edges.push((local_src, local_dst));
                    kept_rows.push(position);
                }
            }
            subgraph
                .relations
                .insert(etype.clone(), RelationStore::from_edges(&kept_edges));
            if let Some(named) = self.edge_features.get(etype) {
                let sliced: HashMap<String, Array2<f32>> = named
                    .iter()
                    .map(|(name, tensor)| (name.clone(), tensor.select(Axis(0), &kept_rows)))
                    .collect();
                subgraph.edge_features.insert(etype.clone(), sliced);
            }
        }

        for (node_type, originals) in &mapping {
            if let Some(named) = self.node_features.get(node_type) {
                let sliced: HashMap<String, NodeFeatures> = named
                    .iter()
                    .map(|(name, tensor)| (name.clone(), tensor.select(Axis(0), originals)))
                    .collect();
                subgraph.node_features.insert(node_type.clone(), sliced);
            }
        }

        Ok((subgraph, mapping))
    }
}

/// Wire form of `HeteroGraph`: decoded edges and feature tensors are
/// re-funneled through the validating mutators, so a decoded graph
/// satisfies the same range and row-count invariants as a built one
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct RawHeteroGraph {
    node_counts: BTreeMap<String, usize>,
    relations: BTreeMap<CanonicalEdgeType, RelationStore>,
    node_features: HashMap<String, HashMap<String, NodeFeatures>>,
    edge_features: HashMap<CanonicalEdgeType, HashMap<String, Array2<f32>>>,
}

#[cfg(feature = "serde")]
impl TryFrom<RawHeteroGraph> for HeteroGraph {
    type Error = GNNError;

    fn try_from(raw: RawHeteroGraph) -> GNNResult<Self> {
        let mut graph = HeteroGraph {
            node_counts: raw.node_counts,
            ..Self::default()
        };
        for (etype, store) in raw.relations {
            graph.add_edges(etype, &store.edges)?;
        }
        for (node_type, named) in raw.node_features {
            for (name, features) in named {
                graph.set_node_features(&node_type, &name, features)?;
            }
        }
        for (etype, named) in raw.edge_features {
            for (name, features) in named {
                graph.set_edge_features(&etype, &name, features)?;
            }
        }
        Ok(graph)
    }
}

// === TESTS ===
