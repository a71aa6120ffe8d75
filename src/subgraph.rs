/**
 * @file src/subgraph.rs
 * @brief K-hop enclosing subgraph extraction around target node pairs
 *
 * For a candidate edge (u, v), the sampler collects the union of the k-hop
 * out-neighborhoods of both endpoints, extracts the induced subgraph with
 * an original-id mapping, and strips every direct edge between the pair in
 * both directions so the label cannot leak through the very edge being
 * predicted.
 *
 * ## Extraction Walk:
 * - frontier entries are typed (node-type, id) pairs, so bipartite target
 *   relations expand correctly; the homogeneous molecular case falls out
 *   as a special case
 * - both targets' frontiers are merged and deduplicated at every hop
 * - hop sets use ordered containers and selections are sorted before
 *   local ids are assigned, so extraction is deterministic
 *
 * The sampler never mutates the shared base graph: every call works on
 * its own induced copy, which keeps concurrent sampling of disjoint pairs
 * safe.
 */

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::graph::{CanonicalEdgeType, HeteroGraph, NodeIndex, NodeMapping};
use crate::{GNNError, GNNResult};

// === CONFIGURATION ===

/// Sampler knobs
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SubgraphSamplerConfig {
    /// Out-neighbor expansion depth from each target
    pub num_hops: usize,
    /// Worker threads used by `sample_batch`
    pub num_workers: usize,
}

impl Default for SubgraphSamplerConfig {
    fn default() -> Self {
        Self {
            num_hops: 1,
            num_workers: 32,
        }
    }
}

// === OUTPUT ===

/// One extracted training example: the trimmed subgraph, the
/// local-id -> original-id tables, and the targets' local ids
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EnclosingSubgraph {
    pub graph: HeteroGraph,
    pub node_mapping: NodeMapping,
    /// Local ids of (source target, destination target)
    pub target_local: (NodeIndex, NodeIndex),
}

impl EnclosingSubgraph {
    /// Total node count across every type
    pub fn num_nodes(&self) -> usize {
        self.node_mapping.values().map(Vec::len).sum()
    }
}

// === SAMPLER ===

/**
 * Extracts enclosing subgraphs around candidate edges of one relation.
 *
 * Holds the base graph behind an `Arc` and reads it only, so disjoint
 * pairs can be sampled concurrently from many workers; `num_workers`
 * sizes the pool used by `sample_batch`.
 */
#[derive(Debug)]
pub struct EnclosingSubgraphSampler {
    graph: Arc<HeteroGraph>,
    target: CanonicalEdgeType,
    config: SubgraphSamplerConfig,
}

impl EnclosingSubgraphSampler {
    pub fn new(
        graph: Arc<HeteroGraph>,
        target: CanonicalEdgeType,
        config: SubgraphSamplerConfig,
    ) -> GNNResult<Self> {
        if config.num_hops == 0 {
            return Err(GNNError::InvalidConfiguration(
                "hop count must be at least 1".to_string(),
            ));
        }
        if config.num_workers == 0 {
            return Err(GNNError::InvalidConfiguration(
                "worker count must be positive".to_string(),
            ));
        }
        if graph.num_nodes(&target.src_type) == 0 || graph.num_nodes(&target.dst_type) == 0 {
            return Err(GNNError::InvalidConfiguration(format!(
                "target relation {} references an empty node type",
                target
            )));
        }
        Ok(Self {
            graph,
            target,
            config,
        })
    }

    /**
     * Extract the enclosing subgraph for one candidate pair.
     *
     * The walk follows outgoing edges of every relation for `num_hops`
     * hops from both targets, then induces the subgraph over the union of
     * everything visited. The two targets are located through the id
     * mapping with two independent lookups, and the direct edges between
     * them are removed in both orientations across every relation linking
     * the target types. A target with no outgoing edges simply contributes
     * an empty frontier for that hop.
     */
    pub fn sample(&self, pair: (NodeIndex, NodeIndex)) -> GNNResult<EnclosingSubgraph> {
        let (u, v) = pair;
        let src_type = self.target.src_type.as_str();
        let dst_type = self.target.dst_type.as_str();
        if u >= self.graph.num_nodes(src_type) || v >= self.graph.num_nodes(dst_type) {
            return Err(GNNError::InvalidInput(format!(
                "target pair ({}, {}) out of range for relation {}",
                u, v, self.target
            )));
        }

        // typed frontier expansion, merged over both targets
        let mut collected: BTreeMap<String, BTreeSet<NodeIndex>> = BTreeMap::new();
        collected.entry(src_type.to_string()).or_default().insert(u);
        collected.entry(dst_type.to_string()).or_default().insert(v);
        let mut frontier = collected.clone();

        for _ in 0..self.config.num_hops {
            let mut next: BTreeMap<String, BTreeSet<NodeIndex>> = BTreeMap::new();
            for (node_type, ids) in &frontier {
                for &id in ids {
                    for (neighbor_type, neighbor) in self.graph.out_neighbors(node_type, id) {
                        // visited nodes never re-enter the frontier
                        let visited = collected
                            .get(neighbor_type)
                            .map_or(false, |seen| seen.contains(&neighbor));
                        if !visited {
                            next.entry(neighbor_type.to_string()).or_default().insert(neighbor);
                        }
                    }
                }
            }
            for (node_type, ids) in &next {
                collected
                    .entry(node_type.clone())
                    .or_default()
                    .extend(ids.iter().copied());
            }
            frontier = next;
        }

        let selection: HashMap<String, Vec<NodeIndex>> = collected
            .into_iter()
            .map(|(node_type, ids)| (node_type, ids.into_iter().collect()))
            .collect();
        let (mut graph, node_mapping) = self.graph.induced_subgraph(&selection)?;

        // two independent lookups, one per endpoint
        let u_local = locate_target(&node_mapping, src_type, u)?;
        let v_local = locate_target(&node_mapping, dst_type, v)?;

        // strip the predicted pair's direct edges, both orientations
        let mut removed = 0;
        let etypes: Vec<CanonicalEdgeType> =
            graph.edge_types().into_iter().cloned().collect();
        for etype in &etypes {
            if etype.src_type == src_type && etype.dst_type == dst_type {
                removed += graph.remove_edges_between(etype, u_local, v_local);
            }
            if etype.src_type == dst_type && etype.dst_type == src_type {
                removed += graph.remove_edges_between(etype, v_local, u_local);
            }
        }

        let subgraph = EnclosingSubgraph {
            graph,
            node_mapping,
            target_local: (u_local, v_local),
        };
        log::debug!(
            "pair ({}, {}): {} nodes kept, {} direct edges removed",
            u,
            v,
            subgraph.num_nodes(),
            removed
        );
        Ok(subgraph)
    }

    /**
     * Extract subgraphs for a whole edge slice, preserving input order.
     *
     * With the `parallel` feature the extraction runs on a dedicated pool
     * of `num_workers` threads; otherwise it runs serially. Results are
     * identical either way.
     */
    pub fn sample_batch(
        &self,
        pairs: &[(NodeIndex, NodeIndex)],
    ) -> GNNResult<Vec<EnclosingSubgraph>> {
        let start = Instant::now();
        let subgraphs = self.sample_all(pairs)?;
        log::info!(
            "extracted {} enclosing subgraphs in {:?}",
            subgraphs.len(),
            start.elapsed()
        );
        Ok(subgraphs)
    }

    #[cfg(feature = "parallel")]
    fn sample_all(&self, pairs: &[(NodeIndex, NodeIndex)]) -> GNNResult<Vec<EnclosingSubgraph>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.num_workers)
            .build()
            .map_err(|e| GNNError::SamplingError(format!("failed to build worker pool: {}", e)))?;
        pool.install(|| pairs.par_iter().map(|&pair| self.sample(pair)).collect())
    }

    #[cfg(not(feature = "parallel"))]
    fn sample_all(&self, pairs: &[(NodeIndex, NodeIndex)]) -> GNNResult<Vec<EnclosingSubgraph>> {
        pairs.iter().map(|&pair| self.sample(pair)).collect()
    }
}

/// Find the unique local id mapping back to `original` in one type's table
fn locate_target(
    mapping: &NodeMapping,
    node_type: &str,
    original: NodeIndex,
) -> GNNResult<NodeIndex> {
    let table = mapping.get(node_type).ok_or_else(|| {
        GNNError::IntegrityError(format!(
            "subgraph mapping has no table for node type '{}'",
            node_type
        ))
    })?;
    let mut matches = table
        .iter()
        .enumerate()
        .filter(|(_, &orig)| orig == original)
        .map(|(local, _)| local);
    match (matches.next(), matches.next()) {
        (Some(local), None) => Ok(local),
        (None, _) => Err(GNNError::IntegrityError(format!(
            "target node {} of type '{}' is missing from the extracted subgraph",
            original, node_type
        ))),
        (Some(_), Some(_)) => Err(GNNError::IntegrityError(format!(
            "target node {} of type '{}' appears more than once in the subgraph mapping",
            original, node_type
        ))),
    }
}

// === TESTS ===
