/**
 * @file src/scorer.rs
 * @brief Dot-product scoring for candidate edges
 *
 * Scores every stored edge of one relation as the inner product of its
 * endpoint embeddings. The scorer is a pure function of its inputs: the
 * graph is read through a shared reference and a fresh score vector is
 * allocated per call, so repeated or concurrent scoring never interferes.
 */

use ndarray::Array1;
use std::collections::HashMap;

use crate::graph::{CanonicalEdgeType, HeteroGraph, NodeFeatures};
use crate::{GNNError, GNNResult};

/// Inner-product edge scorer over per-node-type embedding tables
pub struct DotProductScorer;

impl DotProductScorer {
    /**
     * One score per edge of `edge_type`, in edge-storage order.
     *
     * `embeddings` maps node type -> (num_nodes, width) table and must
     * cover both endpoint types of the relation; for a homogeneous
     * relation one table serves both sides.
     */
    pub fn score(
        graph: &HeteroGraph,
        embeddings: &HashMap<String, NodeFeatures>,
        edge_type: &CanonicalEdgeType,
    ) -> GNNResult<Array1<f32>> {
        let edges = graph.edges(edge_type)?;
        let source = embeddings.get(&edge_type.src_type).ok_or_else(|| {
            GNNError::InvalidConfiguration(format!(
                "embedding map has no entry for source type '{}'",
                edge_type.src_type
            ))
        })?;
        let destination = embeddings.get(&edge_type.dst_type).ok_or_else(|| {
            GNNError::InvalidConfiguration(format!(
                "embedding map has no entry for destination type '{}'",
                edge_type.dst_type
            ))
        })?;
        if source.ncols() != destination.ncols() {
            return Err(GNNError::DimensionMismatch(format!(
                "embedding widths differ for {}: '{}' is {}, '{}' is {}",
                edge_type,
                edge_type.src_type,
                source.ncols(),
                edge_type.dst_type,
                destination.ncols()
            )));
        }
        if source.nrows() != graph.num_nodes(&edge_type.src_type)
            || destination.nrows() != graph.num_nodes(&edge_type.dst_type)
        {
            return Err(GNNError::DimensionMismatch(format!(
                "embedding row counts do not match the node counts for {}",
                edge_type
            )));
        }

        let mut scores = Array1::<f32>::zeros(edges.len());
        for (position, &(src, dst)) in edges.iter().enumerate() {
            scores[position] = source.row(src).dot(&destination.row(dst));
        }
        Ok(scores)
    }
}

// === TESTS ===
