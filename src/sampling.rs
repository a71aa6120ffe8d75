/**
 * @file src/sampling.rs
 * @brief Positive/negative edge batch generation per data split
 *
 * Turns a split's observed edges into a labeled training batch. The train
 * split draws fresh negatives each call by corrupting one endpoint of the
 * positives, rejecting candidates that collide with existing edges of a
 * self-loop-augmented private copy of the base graph; evaluation splits
 * read their negatives from a precomputed list. Positives and negatives
 * are subsampled independently, concatenated with 1.0/0.0 labels, and
 * shuffled under one joint permutation.
 *
 * ## Numeric Contract:
 * - labels are a (n, 1) column of exactly 0.0 / 1.0, row-aligned with the
 *   edge list
 * - subsampling keeps floor(ratio * n) edges, drawn uniformly without
 *   replacement; the draw always re-permutes, ratio 1.0 included
 */

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::graph::{CanonicalEdgeType, HeteroGraph, NodeIndex};
use crate::{GNNError, GNNResult};

/// Attempts per negative before rejection sampling gives up
const MAX_NEGATIVE_ATTEMPTS: usize = 100;

// === SPLIT RECORDS ===

/// Observed edges of one data split
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SplitSpec {
    /// Observed positive edges
    pub positives: Vec<(NodeIndex, NodeIndex)>,
    /// Precomputed negatives; required for every split except train
    pub negatives: Option<Vec<(NodeIndex, NodeIndex)>>,
}

impl SplitSpec {
    /// Train-style record: negatives are drawn dynamically
    pub fn train(positives: Vec<(NodeIndex, NodeIndex)>) -> Self {
        Self {
            positives,
            negatives: None,
        }
    }

    /// Evaluation-style record with a fixed negative list
    pub fn with_negatives(
        positives: Vec<(NodeIndex, NodeIndex)>,
        negatives: Vec<(NodeIndex, NodeIndex)>,
    ) -> Self {
        Self {
            positives,
            negatives: Some(negatives),
        }
    }
}

// === EDGE BATCHES ===

/**
 * Edge/label pairs for one training or evaluation step.
 *
 * `labels` is a (n, 1) column: 1.0 marks an observed edge, 0.0 a
 * sampled-absent one. The row alignment and the binary label domain are
 * enforced at construction.
 */
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawEdgeBatch"))]
pub struct EdgeBatch {
    edges: Vec<(NodeIndex, NodeIndex)>,
    labels: Array2<f32>,
}

impl EdgeBatch {
    pub fn new(edges: Vec<(NodeIndex, NodeIndex)>, labels: Array2<f32>) -> GNNResult<Self> {
        if labels.nrows() != edges.len() || labels.ncols() != 1 {
            return Err(GNNError::DimensionMismatch(format!(
                "labels must be a {}x1 column, got {}x{}",
                edges.len(),
                labels.nrows(),
                labels.ncols()
            )));
        }
        if let Some(bad) = labels.iter().find(|&&label| label != 0.0 && label != 1.0) {
            return Err(GNNError::InvalidInput(format!(
                "labels must be exactly 0.0 or 1.0, got {}",
                bad
            )));
        }
        Ok(Self { edges, labels })
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn edges(&self) -> &[(NodeIndex, NodeIndex)] {
        &self.edges
    }

    /// (n, 1) label column aligned with `edges`
    pub fn labels(&self) -> &Array2<f32> {
        &self.labels
    }

    /// Number of rows labeled 1.0
    pub fn num_positives(&self) -> usize {
        self.labels.iter().filter(|&&label| label == 1.0).count()
    }

    pub fn into_parts(self) -> (Vec<(NodeIndex, NodeIndex)>, Array2<f32>) {
        (self.edges, self.labels)
    }
}

/// Wire form of `EdgeBatch`: deserialization funnels through
/// `EdgeBatch::new`, so decoded batches satisfy the same alignment and
/// label-domain invariants as constructed ones
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct RawEdgeBatch {
    edges: Vec<(NodeIndex, NodeIndex)>,
    labels: Array2<f32>,
}

#[cfg(feature = "serde")]
impl TryFrom<RawEdgeBatch> for EdgeBatch {
    type Error = GNNError;

    fn try_from(raw: RawEdgeBatch) -> GNNResult<Self> {
        Self::new(raw.edges, raw.labels)
    }
}

// === GENERATOR ===

/// Knobs for `PosNegEdgeGenerator`
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EdgeSampleConfig {
    /// Negatives drawn per positive edge on the train split
    pub neg_samples: usize,
    /// Fraction of each edge list kept on the train split
    pub subsample_ratio: f64,
    /// Jointly shuffle edges and labels after concatenation
    pub shuffle: bool,
    /// Fixed RNG seed; `None` draws from entropy
    pub seed: Option<u64>,
}

impl Default for EdgeSampleConfig {
    fn default() -> Self {
        Self {
            neg_samples: 1,
            subsample_ratio: 0.1,
            shuffle: true,
            seed: None,
        }
    }
}

/**
 * Produces labeled positive/negative edge batches for one target relation.
 *
 * The base graph is shared read-only; the train path augments a private
 * copy with self loops so corrupted candidates are also rejected against
 * every node's identity edge, and that copy never escapes the call.
 * Evaluation splits skip augmentation entirely and run at ratio 1.0.
 */
#[derive(Debug)]
pub struct PosNegEdgeGenerator {
    graph: Arc<HeteroGraph>,
    target: CanonicalEdgeType,
    splits: HashMap<String, SplitSpec>,
    config: EdgeSampleConfig,
}

impl PosNegEdgeGenerator {
    pub fn new(
        graph: Arc<HeteroGraph>,
        target: CanonicalEdgeType,
        splits: HashMap<String, SplitSpec>,
        config: EdgeSampleConfig,
    ) -> GNNResult<Self> {
        if !(0.0..=1.0).contains(&config.subsample_ratio) {
            return Err(GNNError::InvalidConfiguration(format!(
                "subsample ratio must lie in [0, 1], got {}",
                config.subsample_ratio
            )));
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
            splits,
            config,
        })
    }

    /**
     * Assemble the labeled edge batch for `split`.
     *
     * "train" runs dynamic negative sampling and subsamples at the
     * configured ratio; every other split uses its precomputed negatives
     * and ratio 1.0. With a fixed seed, repeated calls return identical
     * batches.
     */
    pub fn generate(&self, split: &str) -> GNNResult<EdgeBatch> {
        let spec = self
            .splits
            .get(split)
            .ok_or_else(|| GNNError::InvalidInput(format!("unknown split '{}'", split)))?;
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let is_train = split == "train";
        let ratio = if is_train {
            self.config.subsample_ratio
        } else {
            1.0
        };

        let negatives = if is_train {
            // private augmented copy; only the collision checks see it
            let loop_graph = self.graph.with_self_loops()?;
            self.corrupt_negatives(&spec.positives, &loop_graph, &mut rng)?
        } else {
            spec.negatives.clone().ok_or_else(|| {
                GNNError::InvalidConfiguration(format!(
                    "split '{}' has no precomputed negatives",
                    split
                ))
            })?
        };

        let positives = subsample(&spec.positives, ratio, &mut rng);
        let negatives = subsample(&negatives, ratio, &mut rng);
        log::debug!(
            "split '{}': {} positive / {} negative edges after subsampling",
            split,
            positives.len(),
            negatives.len()
        );

        let mut rows: Vec<((NodeIndex, NodeIndex), f32)> =
            Vec::with_capacity(positives.len() + negatives.len());
        rows.extend(positives.into_iter().map(|edge| (edge, 1.0)));
        rows.extend(negatives.into_iter().map(|edge| (edge, 0.0)));
        if self.config.shuffle {
            rows.shuffle(&mut rng);
        }

        let labels: Vec<f32> = rows.iter().map(|&(_, label)| label).collect();
        let edges: Vec<(NodeIndex, NodeIndex)> = rows.into_iter().map(|(edge, _)| edge).collect();
        let labels = Array2::from_shape_vec((edges.len(), 1), labels)?;
        EdgeBatch::new(edges, labels)
    }

    /// `neg_samples` corrupted copies per positive edge
    fn corrupt_negatives(
        &self,
        positives: &[(NodeIndex, NodeIndex)],
        collision_graph: &HeteroGraph,
        rng: &mut StdRng,
    ) -> GNNResult<Vec<(NodeIndex, NodeIndex)>> {
        let src_count = self.graph.num_nodes(&self.target.src_type);
        let dst_count = self.graph.num_nodes(&self.target.dst_type);
        let mut negatives = Vec::with_capacity(positives.len() * self.config.neg_samples);
        for &(src, dst) in positives {
            for _ in 0..self.config.neg_samples {
                negatives.push(self.draw_negative(
                    src,
                    dst,
                    src_count,
                    dst_count,
                    collision_graph,
                    rng,
                )?);
            }
        }
        Ok(negatives)
    }

    /// Corrupt one uniformly chosen endpoint, rejecting candidates that
    /// already exist in `collision_graph`. The retry loop is bounded.
    fn draw_negative(
        &self,
        src: NodeIndex,
        dst: NodeIndex,
        src_count: usize,
        dst_count: usize,
        collision_graph: &HeteroGraph,
        rng: &mut StdRng,
    ) -> GNNResult<(NodeIndex, NodeIndex)> {
        for _ in 0..MAX_NEGATIVE_ATTEMPTS {
            let candidate = if rng.gen_bool(0.5) {
                (rng.gen_range(0..src_count), dst)
            } else {
                (src, rng.gen_range(0..dst_count))
            };
            if !collision_graph.has_edge(&self.target, candidate.0, candidate.1) {
                return Ok(candidate);
            }
        }
        Err(GNNError::SamplingError(format!(
            "no non-colliding negative found for ({}, {}) after {} attempts",
            src, dst, MAX_NEGATIVE_ATTEMPTS
        )))
    }
}

/// Uniform selection without replacement keeping floor(ratio * n) edges.
/// The draw re-permutes unconditionally, ratio 1.0 included.
fn subsample(
    edges: &[(NodeIndex, NodeIndex)],
    ratio: f64,
    rng: &mut StdRng,
) -> Vec<(NodeIndex, NodeIndex)> {
    let keep = ((ratio * edges.len() as f64).floor() as usize).min(edges.len());
    rand::seq::index::sample(rng, edges.len(), keep)
        .into_iter()
        .map(|position| edges[position])
        .collect()
}

// === TESTS ===
