/**
 * @file src/conv.rs
 * @brief Relational graph convolution with per-relation parameters
 *
 * Heterogeneous convolution step: every relation applies its own linear
 * transform to the source type's features, the transformed rows are
 * mean-aggregated over each destination node's incoming edges of that
 * relation, and the per-relation results are summed into one output tensor
 * per destination node type.
 *
 * ## Aggregation Semantics:
 * - **mean** over incoming edges of one relation; a destination with no
 *   incoming edges of that relation keeps a zero row
 * - **sum** across relations targeting the same node type
 *
 * Parameters are keyed by relation name, not node type: relations sharing
 * a source node type still hold independent weights. The forward pass
 * returns fresh tensors per call and never writes anything back onto the
 * graph.
 */

use ndarray::{Array1, Array2};
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Normal, Uniform};
use std::collections::{BTreeMap, HashMap};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::graph::{HeteroGraph, NodeFeatures};
use crate::{GNNError, GNNResult};

// === CONFIGURATION ===

/// Weight matrix initialization scheme
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum WeightInit {
    /// Uniform in ±sqrt(6 / (fan_in + fan_out))
    Xavier,
    /// Uniform in ±sqrt(2 / fan_in)
    He,
    /// Gaussian with mean 0 and the given standard deviation
    Normal { std: f32 },
    /// Uniform in ±limit
    Uniform { limit: f32 },
}

impl Default for WeightInit {
    fn default() -> Self {
        Self::Xavier
    }
}

/// Input feature width declaration for a layer's relations
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InputWidths {
    /// Every relation reads source features of the same width
    Shared(usize),
    /// One width per relation name; every relation must be covered
    PerRelation(HashMap<String, usize>),
}

impl InputWidths {
    fn width_for(&self, relation: &str) -> GNNResult<usize> {
        match self {
            Self::Shared(width) => Ok(*width),
            Self::PerRelation(map) => map.get(relation).copied().ok_or_else(|| {
                GNNError::InvalidConfiguration(format!(
                    "no input width configured for relation '{}'",
                    relation
                ))
            }),
        }
    }
}

/// Allocate a (rows, cols) weight matrix under the chosen scheme
fn create_weight_matrix(
    rows: usize,
    cols: usize,
    init: WeightInit,
    rng: &mut StdRng,
) -> GNNResult<Array2<f32>> {
    let matrix = match init {
        WeightInit::Xavier => {
            let limit = (6.0 / (rows + cols) as f32).sqrt();
            Array2::random_using((rows, cols), Uniform::new(-limit, limit), rng)
        }
        WeightInit::He => {
            let limit = (2.0 / rows as f32).sqrt();
            Array2::random_using((rows, cols), Uniform::new(-limit, limit), rng)
        }
        WeightInit::Normal { std } => {
            let dist = Normal::new(0.0, std).map_err(|e| {
                GNNError::InvalidConfiguration(format!("invalid normal initialization: {}", e))
            })?;
            Array2::random_using((rows, cols), dist, rng)
        }
        WeightInit::Uniform { limit } => {
            if limit <= 0.0 {
                return Err(GNNError::InvalidConfiguration(format!(
                    "uniform initialization limit must be positive, got {}",
                    limit
                )));
            }
            Array2::random_using((rows, cols), Uniform::new(-limit, limit), rng)
        }
    };
    Ok(matrix)
}

// === LAYER ===

/**
 * Relational graph convolution layer.
 *
 * Holds one weight matrix (and optional bias) per relation name. `forward`
 * consumes a node-type -> feature map and produces a fresh node-type ->
 * hidden map with one entry for every destination node type of the graph's
 * relations, each of shape (num_nodes_of_type, output_width).
 */
#[derive(Debug, Clone)]
pub struct HeteroGraphConvLayer {
    /// relation name -> (input_width, output_width) weight matrix
    weights: BTreeMap<String, Array2<f32>>,
    /// relation name -> output_width bias, when biases are enabled
    biases: Option<BTreeMap<String, Array1<f32>>>,
    /// Resolved input width per relation name
    input_widths: BTreeMap<String, usize>,
    output_width: usize,
}

impl HeteroGraphConvLayer {
    /**
     * Allocate parameters for the given relation names.
     *
     * Relations are deduplicated and visited in sorted order, so a fixed
     * `seed` yields the same parameters regardless of the caller's
     * ordering. Biases start at zero.
     */
    pub fn new(
        relations: &[&str],
        input_widths: InputWidths,
        output_width: usize,
        init: WeightInit,
        use_bias: bool,
        seed: Option<u64>,
    ) -> GNNResult<Self> {
        if relations.is_empty() {
            return Err(GNNError::InvalidConfiguration(
                "at least one relation is required".to_string(),
            ));
        }
        if output_width == 0 {
            return Err(GNNError::InvalidConfiguration(
                "output width must be positive".to_string(),
            ));
        }
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut names: Vec<&str> = relations.to_vec();
        names.sort_unstable();
        names.dedup();

        let mut weights = BTreeMap::new();
        let mut biases = if use_bias { Some(BTreeMap::new()) } else { None };
        let mut widths = BTreeMap::new();
        for name in names {
            let input_width = input_widths.width_for(name)?;
            if input_width == 0 {
                return Err(GNNError::InvalidConfiguration(format!(
                    "input width for relation '{}' must be positive",
                    name
                )));
            }
            let weight = create_weight_matrix(input_width, output_width, init, &mut rng)?;
            weights.insert(name.to_string(), weight);
            if let Some(bias_map) = biases.as_mut() {
                bias_map.insert(name.to_string(), Array1::zeros(output_width));
            }
            widths.insert(name.to_string(), input_width);
        }
        Ok(Self {
            weights,
            biases,
            input_widths: widths,
            output_width,
        })
    }

    pub fn output_width(&self) -> usize {
        self.output_width
    }

    /// Relation names with allocated parameters, in sorted order
    pub fn relations(&self) -> Vec<&str> {
        self.weights.keys().map(String::as_str).collect()
    }

    pub fn relation_weight(&self, relation: &str) -> Option<&Array2<f32>> {
        self.weights.get(relation)
    }

    pub fn relation_bias(&self, relation: &str) -> Option<&Array1<f32>> {
        self.biases.as_ref().and_then(|b| b.get(relation))
    }

    /// Replace one relation's weight matrix (shape-checked). The external
    /// training loop owns optimization and writes updates back here.
    pub fn set_relation_weight(&mut self, relation: &str, weight: Array2<f32>) -> GNNResult<()> {
        let expected_input = *self.input_widths.get(relation).ok_or_else(|| {
            GNNError::InvalidConfiguration(format!(
                "no parameters allocated for relation '{}'",
                relation
            ))
        })?;
        if weight.nrows() != expected_input || weight.ncols() != self.output_width {
            return Err(GNNError::DimensionMismatch(format!(
                "weight for relation '{}' must be {}x{}, got {}x{}",
                relation,
                expected_input,
                self.output_width,
                weight.nrows(),
                weight.ncols()
            )));
        }
        self.weights.insert(relation.to_string(), weight);
        Ok(())
    }

    /// Replace one relation's bias vector (shape-checked)
    pub fn set_relation_bias(&mut self, relation: &str, bias: Array1<f32>) -> GNNResult<()> {
        if !self.input_widths.contains_key(relation) {
            return Err(GNNError::InvalidConfiguration(format!(
                "no parameters allocated for relation '{}'",
                relation
            )));
        }
        let bias_map = self.biases.as_mut().ok_or_else(|| {
            GNNError::InvalidConfiguration("layer was built without biases".to_string())
        })?;
        if bias.len() != self.output_width {
            return Err(GNNError::DimensionMismatch(format!(
                "bias for relation '{}' must have length {}, got {}",
                relation,
                self.output_width,
                bias.len()
            )));
        }
        bias_map.insert(relation.to_string(), bias);
        Ok(())
    }

    /**
     * Run one convolution step.
     *
     * `features` maps node type -> (num_nodes, input_width) tensor and must
     * cover the source type of every relation stored in the graph. The
     * relations are visited in sorted order, so the cross-relation sums
     * accumulate deterministically.
     *
     * Per relation: transformed = features[src_type] · W_rel (+ bias), then
     * each destination row becomes the mean of the transformed rows of its
     * incoming sources, and the relation results targeting the same node
     * type are summed.
     */
    pub fn forward(
        &self,
        graph: &HeteroGraph,
        features: &HashMap<String, NodeFeatures>,
    ) -> GNNResult<HashMap<String, NodeFeatures>> {
        let mut outputs: HashMap<String, NodeFeatures> = HashMap::new();
        for etype in graph.edge_types() {
            let weight = self.weights.get(&etype.relation).ok_or_else(|| {
                GNNError::InvalidConfiguration(format!(
                    "no parameters allocated for relation '{}'",
                    etype.relation
                ))
            })?;
            let source = features.get(&etype.src_type).ok_or_else(|| {
                GNNError::InvalidConfiguration(format!(
                    "feature map has no entry for source type '{}' required by {}",
                    etype.src_type, etype
                ))
            })?;
            if source.ncols() != weight.nrows() {
                return Err(GNNError::DimensionMismatch(format!(
                    "features for '{}' are {} wide but relation '{}' expects {}",
                    etype.src_type,
                    source.ncols(),
                    etype.relation,
                    weight.nrows()
                )));
            }
            let source_nodes = graph.num_nodes(&etype.src_type);
            if source.nrows() != source_nodes {
                return Err(GNNError::DimensionMismatch(format!(
                    "features for '{}' have {} rows but the graph has {} nodes of that type",
                    etype.src_type,
                    source.nrows(),
                    source_nodes
                )));
            }

            let mut transformed = source.dot(weight);
            if let Some(biases) = &self.biases {
                if let Some(bias) = biases.get(&etype.relation) {
                    transformed += bias;
                }
            }

            let destination_nodes = graph.num_nodes(&etype.dst_type);
            let mut aggregated = Array2::<f32>::zeros((destination_nodes, self.output_width));
            let mut incoming = vec![0usize; destination_nodes];
            for &(src, dst) in graph.edges(etype)? {
                let mut row = aggregated.row_mut(dst);
                row += &transformed.row(src);
                incoming[dst] += 1;
            }
            // mean over incoming edges; destinations without any stay zero
            for (dst, &count) in incoming.iter().enumerate() {
                if count > 0 {
                    let mut row = aggregated.row_mut(dst);
                    row /= count as f32;
                }
            }

            match outputs.get_mut(&etype.dst_type) {
                Some(existing) => *existing += &aggregated,
                None => {
                    outputs.insert(etype.dst_type.clone(), aggregated);
                }
            }
        }
        Ok(outputs)
    }
}

// === TESTS ===
