/**
 * @file src/dataset.rs
 * @brief Dataset adapters exposing (subgraph, label) training examples
 *
 * Two access styles over the same example shape:
 * - `GraphDataset` holds fully materialized subgraphs and answers index
 *   lookups directly
 * - `EdgeDataset` holds only labeled edges plus an edge -> subgraph
 *   transform, and extracts the subgraph on every access
 *
 * The lazy flavor trades repeated extraction work for a flat memory
 * footprint, which is what large candidate-edge sets need.
 */

use std::fmt;

use ndarray::Array2;

use crate::graph::NodeIndex;
use crate::sampling::EdgeBatch;
use crate::subgraph::EnclosingSubgraph;
use crate::{GNNError, GNNResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Edge -> enclosing subgraph extraction, usable from worker threads
pub type EdgeTransform =
    dyn Fn((NodeIndex, NodeIndex)) -> GNNResult<EnclosingSubgraph> + Send + Sync;

fn validate_labels(num_examples: usize, labels: &Array2<f32>) -> GNNResult<()> {
    if labels.nrows() != num_examples || labels.ncols() != 1 {
        return Err(GNNError::DimensionMismatch(format!(
            "expected a ({}, 1) label column, got ({}, {})",
            num_examples,
            labels.nrows(),
            labels.ncols()
        )));
    }
    Ok(())
}

// === MATERIALIZED DATASET ===

/// Index-based dataset over pre-extracted subgraphs
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawGraphDataset"))]
pub struct GraphDataset {
    graphs: Vec<EnclosingSubgraph>,
    labels: Array2<f32>,
}

impl GraphDataset {
    pub fn new(graphs: Vec<EnclosingSubgraph>, labels: Array2<f32>) -> GNNResult<Self> {
        validate_labels(graphs.len(), &labels)?;
        Ok(Self { graphs, labels })
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    pub fn labels(&self) -> &Array2<f32> {
        &self.labels
    }

    /// Example at `index` as a borrowed subgraph plus its scalar label
    pub fn get(&self, index: usize) -> GNNResult<(&EnclosingSubgraph, f32)> {
        if index >= self.graphs.len() {
            return Err(GNNError::InvalidInput(format!(
                "example index {} out of range for dataset of {}",
                index,
                self.graphs.len()
            )));
        }
        Ok((&self.graphs[index], self.labels[[index, 0]]))
    }
}

/// Wire form of `GraphDataset`: deserialization funnels through
/// `GraphDataset::new`, so decoded datasets keep graphs and labels aligned
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct RawGraphDataset {
    graphs: Vec<EnclosingSubgraph>,
    labels: Array2<f32>,
}

#[cfg(feature = "serde")]
impl TryFrom<RawGraphDataset> for GraphDataset {
    type Error = GNNError;

    fn try_from(raw: RawGraphDataset) -> GNNResult<Self> {
        Self::new(raw.graphs, raw.labels)
    }
}

// === LAZY DATASET ===

/**
 * Transform-based dataset that extracts subgraphs on demand.
 *
 * Stores the labeled edge list and a boxed transform; `get` runs the
 * transform on every call and nothing is cached, so accesses stay
 * independent and safe to issue from several threads at once.
 */
pub struct EdgeDataset {
    edges: Vec<(NodeIndex, NodeIndex)>,
    labels: Array2<f32>,
    transform: Box<EdgeTransform>,
}

impl EdgeDataset {
    pub fn new(
        edges: Vec<(NodeIndex, NodeIndex)>,
        labels: Array2<f32>,
        transform: Box<EdgeTransform>,
    ) -> GNNResult<Self> {
        validate_labels(edges.len(), &labels)?;
        Ok(Self {
            edges,
            labels,
            transform,
        })
    }

    /// Wrap an already validated generator batch
    pub fn from_batch(batch: EdgeBatch, transform: Box<EdgeTransform>) -> Self {
        let (edges, labels) = batch.into_parts();
        Self {
            edges,
            labels,
            transform,
        }
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

    pub fn labels(&self) -> &Array2<f32> {
        &self.labels
    }

    /// Example at `index`, extracting its subgraph through the transform
    pub fn get(&self, index: usize) -> GNNResult<(EnclosingSubgraph, f32)> {
        if index >= self.edges.len() {
            return Err(GNNError::InvalidInput(format!(
                "example index {} out of range for dataset of {}",
                index,
                self.edges.len()
            )));
        }
        let subgraph = (self.transform)(self.edges[index])?;
        Ok((subgraph, self.labels[[index, 0]]))
    }
}

impl fmt::Debug for EdgeDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeDataset")
            .field("num_edges", &self.edges.len())
            .finish_non_exhaustive()
    }
}

// === TESTS ===

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{CanonicalEdgeType, HeteroGraph};
    use crate::sampling::{EdgeSampleConfig, PosNegEdgeGenerator, SplitSpec};
    use crate::subgraph::{EnclosingSubgraphSampler, SubgraphSamplerConfig};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn bond() -> CanonicalEdgeType {
        CanonicalEdgeType::new("atom", "bond", "atom")
    }

    fn chain_sampler() -> EnclosingSubgraphSampler {
        let mut graph = HeteroGraph::new();
        graph.add_nodes("atom", 4);
        graph.add_edges(bond(), &[(0, 1), (1, 2), (2, 3)]).unwrap();
        EnclosingSubgraphSampler::new(
            Arc::new(graph),
            bond(),
            SubgraphSamplerConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_graph_dataset_indexing() {
        let sampler = chain_sampler();
        let graphs = vec![
            sampler.sample((0, 1)).unwrap(),
            sampler.sample((1, 2)).unwrap(),
        ];
        let labels = Array2::from_shape_vec((2, 1), vec![1.0, 0.0]).unwrap();
        let dataset = GraphDataset::new(graphs, labels).unwrap();

        assert_eq!(dataset.len(), 2);
        assert!(!dataset.is_empty());
        let (subgraph, label) = dataset.get(0).unwrap();
        assert_eq!(subgraph.node_mapping["atom"], vec![0, 1, 2]);
        assert_eq!(label, 1.0);
        let (_, label) = dataset.get(1).unwrap();
        assert_eq!(label, 0.0);
    }

    #[test]
    fn test_graph_dataset_rejects_bad_shapes() {
        let sampler = chain_sampler();
        let graphs = vec![sampler.sample((0, 1)).unwrap()];
        let wide = Array2::from_shape_vec((1, 2), vec![1.0, 0.0]).unwrap();
        assert!(matches!(
            GraphDataset::new(graphs.clone(), wide),
            Err(GNNError::DimensionMismatch(_))
        ));
        let long = Array2::from_shape_vec((3, 1), vec![1.0, 0.0, 1.0]).unwrap();
        assert!(matches!(
            GraphDataset::new(graphs, long),
            Err(GNNError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_graph_dataset_out_of_range_index() {
        let labels = Array2::from_shape_vec((0, 1), vec![]).unwrap();
        let dataset = GraphDataset::new(Vec::new(), labels).unwrap();
        assert!(dataset.is_empty());
        assert!(matches!(
            dataset.get(0),
            Err(GNNError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_edge_dataset_extracts_lazily_on_every_access() {
        let sampler = Arc::new(chain_sampler());
        let calls = Arc::new(AtomicUsize::new(0));
        let transform = {
            let sampler = sampler.clone();
            let calls = calls.clone();
            Box::new(move |pair| {
                calls.fetch_add(1, Ordering::SeqCst);
                sampler.sample(pair)
            })
        };
        let labels = Array2::from_shape_vec((2, 1), vec![1.0, 0.0]).unwrap();
        let dataset = EdgeDataset::new(vec![(0, 1), (1, 2)], labels, transform).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let (first, label) = dataset.get(0).unwrap();
        assert_eq!(first.node_mapping["atom"], vec![0, 1, 2]);
        assert_eq!(label, 1.0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // nothing is cached, a repeat access extracts again
        let (second, _) = dataset.get(0).unwrap();
        assert_eq!(second.node_mapping, first.node_mapping);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_edge_dataset_from_generator_batch() {
        let mut graph = HeteroGraph::new();
        graph.add_nodes("atom", 6);
        graph
            .add_edges(bond(), &[(0, 1), (1, 2), (2, 3), (3, 4), (4, 5)])
            .unwrap();
        let graph = Arc::new(graph);

        let generator = PosNegEdgeGenerator::new(
            graph.clone(),
            bond(),
            HashMap::from([(
                "train".to_string(),
                SplitSpec::train(vec![(0, 1), (1, 2), (2, 3)]),
            )]),
            EdgeSampleConfig {
                subsample_ratio: 1.0,
                seed: Some(7),
                ..EdgeSampleConfig::default()
            },
        )
        .unwrap();
        let batch = generator.generate("train").unwrap();
        let expected_len = batch.len();
        let expected_edges = batch.edges().to_vec();

        let sampler = Arc::new(
            EnclosingSubgraphSampler::new(graph, bond(), SubgraphSamplerConfig::default())
                .unwrap(),
        );
        let transform = {
            let sampler = sampler.clone();
            Box::new(move |pair| sampler.sample(pair))
        };
        let dataset = EdgeDataset::from_batch(batch, transform);

        assert_eq!(dataset.len(), expected_len);
        assert_eq!(dataset.edges(), expected_edges.as_slice());
        for index in 0..dataset.len() {
            let (subgraph, label) = dataset.get(index).unwrap();
            assert!(label == 0.0 || label == 1.0);
            let (u, v) = dataset.edges()[index];
            let (u_local, v_local) = subgraph.target_local;
            assert_eq!(subgraph.node_mapping["atom"][u_local], u);
            assert_eq!(subgraph.node_mapping["atom"][v_local], v);
            assert!(!subgraph.graph.has_edge(&bond(), u_local, v_local));
        }
    }

    #[test]
    fn test_edge_dataset_debug_omits_the_transform() {
        let sampler = Arc::new(chain_sampler());
        let transform = {
            let sampler = sampler.clone();
            Box::new(move |pair| sampler.sample(pair))
        };
        let labels = Array2::from_shape_vec((1, 1), vec![1.0]).unwrap();
        let dataset = EdgeDataset::new(vec![(0, 1)], labels, transform).unwrap();
        let rendered = format!("{:?}", dataset);
        assert!(rendered.contains("num_edges: 1"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_graph_dataset_deserialization_enforces_alignment() {
        let labels = Array2::from_shape_vec((0, 1), vec![]).unwrap();
        let dataset = GraphDataset::new(Vec::new(), labels).unwrap();
        let json = serde_json::to_string(&dataset).unwrap();
        let back: GraphDataset = serde_json::from_str(&json).unwrap();
        assert!(back.is_empty());

        // labels that outnumber the graphs must not decode
        let tampered = json.replace(r#""dim":[0,1],"data":[]"#, r#""dim":[1,1],"data":[1.0]"#);
        let err = serde_json::from_str::<GraphDataset>(&tampered).unwrap_err();
        assert!(err.to_string().contains("label column"));
    }
}
