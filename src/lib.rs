//! Relational graph neural network pipeline for link prediction
//!
//! This crate implements the core of a link-prediction system for
//! heterogeneous graphs: a relational convolution layer with per-edge-type
//! parameters, a dot-product edge scorer, and a sampling pipeline that turns
//! observed edges into labeled positive/negative batches and k-hop enclosing
//! subgraphs, the strategy used for molecular/QSAR-style datasets.
//!
//! ## 🧬 Pipeline Components
//!
//! - **HeteroGraph**: in-memory store with per-relation adjacency, named
//!   feature tensors, induced-subgraph extraction and self-loop augmentation
//! - **HeteroGraphConvLayer**: per-relation linear transforms with mean
//!   aggregation over incoming edges and sum combination across relations
//! - **DotProductScorer**: one inner-product score per stored edge of a
//!   target relation
//! - **PosNegEdgeGenerator**: balanced positive/negative edge batches per
//!   data split, with endpoint-corruption negative sampling
//! - **EnclosingSubgraphSampler**: k-hop neighborhoods around candidate
//!   pairs with the predicted edge stripped out
//! - **GraphDataset / EdgeDataset**: random-access adapters feeding an
//!   external training loop
//!
//! Training orchestration (optimizers, epochs, losses, metrics) and dataset
//! parsing live outside this crate; everything here operates on
//! already-materialized graphs and tensors.
//!
//! ### Quick Start:
//!
//! ```rust
//! use std::collections::HashMap;
//! use ndarray::Array2;
//! use zen_gnn::{CanonicalEdgeType, HeteroGraph, HeteroGraphConvLayer, InputWidths, WeightInit};
//!
//! # fn main() -> zen_gnn::GNNResult<()> {
//! let mut graph = HeteroGraph::new();
//! graph.add_nodes("atom", 3);
//! let bond = CanonicalEdgeType::new("atom", "bond", "atom");
//! graph.add_edges(bond.clone(), &[(0, 1), (1, 2)])?;
//!
//! let layer = HeteroGraphConvLayer::new(
//!     &["bond"],
//!     InputWidths::Shared(4),
//!     8,
//!     WeightInit::Xavier,
//!     true,
//!     Some(42),
//! )?;
//!
//! let mut features = HashMap::new();
//! features.insert("atom".to_string(), Array2::<f32>::ones((3, 4)));
//! let hidden = layer.forward(&graph, &features)?;
//! assert_eq!(hidden["atom"].dim(), (3, 8));
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags:
//!
//! - `serde` (default): serde derives on data-model and config types
//! - `parallel` (default): rayon-backed batch subgraph extraction

// Modules
pub mod conv;
pub mod dataset;
pub mod graph;
pub mod sampling;
pub mod scorer;
pub mod subgraph;

// Re-export main types
pub use conv::{HeteroGraphConvLayer, InputWidths, WeightInit};
pub use dataset::{EdgeDataset, EdgeTransform, GraphDataset};
pub use graph::{CanonicalEdgeType, EdgeIndex, HeteroGraph, NodeFeatures, NodeIndex, NodeMapping};
pub use sampling::{EdgeBatch, EdgeSampleConfig, PosNegEdgeGenerator, SplitSpec};
pub use scorer::DotProductScorer;
pub use subgraph::{EnclosingSubgraph, EnclosingSubgraphSampler, SubgraphSamplerConfig};

/// Errors raised across the link-prediction pipeline.
///
/// Configuration and integrity failures are fatal for the current call and
/// never yield partial tensors; degenerate inputs with a defined fallback
/// (a node with no incoming messages) are handled in place and do not
/// surface here.
#[derive(Debug, thiserror::Error)]
pub enum GNNError {
    /// A lookup referenced configuration that was never provided
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A remapped subgraph no longer identifies a target node uniquely
    #[error("Integrity error: {0}")]
    IntegrityError(String),

    /// Tensor or batch shapes disagree
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Out-of-range ids, unknown names, bad indices
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Sampling could not produce a valid draw
    #[error("Sampling error: {0}")]
    SamplingError(String),

    /// Array construction failure
    #[error("Array shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),
}

/// Result alias used throughout the crate
pub type GNNResult<T> = Result<T, GNNError>;
