//! Link Prediction Pipeline Integration Tests
//!
//! Drives the full pipeline the way a training loop would: build a
//! compound/protein interaction graph, generate labeled edge batches,
//! extract enclosing subgraphs around every candidate pair, run the
//! relational convolution over them, and score edges from the resulting
//! embeddings.

use std::collections::HashMap;
use std::sync::Arc;

use approx::assert_abs_diff_eq;
use ndarray::Array2;

use zen_gnn::{
    CanonicalEdgeType, DotProductScorer, EdgeDataset, EdgeSampleConfig, EnclosingSubgraphSampler,
    GraphDataset, HeteroGraph, HeteroGraphConvLayer, InputWidths, PosNegEdgeGenerator, SplitSpec,
    SubgraphSamplerConfig, WeightInit,
};

// === FIXTURE ===

fn binds() -> CanonicalEdgeType {
    CanonicalEdgeType::new("compound", "binds", "protein")
}

fn similar() -> CanonicalEdgeType {
    CanonicalEdgeType::new("compound", "similar", "compound")
}

fn assoc() -> CanonicalEdgeType {
    CanonicalEdgeType::new("protein", "assoc", "protein")
}

fn binds_edges() -> Vec<(usize, usize)> {
    vec![(0, 0), (1, 0), (2, 1), (3, 2), (4, 3), (5, 4)]
}

/// 8 compounds, 5 proteins, three relations, 6-wide "feat" tensors
fn interaction_graph() -> HeteroGraph {
    let mut graph = HeteroGraph::new();
    graph.add_nodes("compound", 8);
    graph.add_nodes("protein", 5);
    graph.add_edges(binds(), &binds_edges()).unwrap();
    graph
        .add_edges(similar(), &[(0, 1), (1, 2), (2, 0), (6, 7)])
        .unwrap();
    graph.add_edges(assoc(), &[(0, 1), (1, 2), (3, 4)]).unwrap();
    graph
        .set_node_features(
            "compound",
            "feat",
            Array2::from_shape_fn((8, 6), |(i, j)| 0.1 * (i * 6 + j) as f32),
        )
        .unwrap();
    graph
        .set_node_features(
            "protein",
            "feat",
            Array2::from_shape_fn((5, 6), |(i, j)| 0.05 * (i * 6 + j) as f32),
        )
        .unwrap();
    graph
}

fn train_generator(graph: Arc<HeteroGraph>, seed: u64) -> PosNegEdgeGenerator {
    PosNegEdgeGenerator::new(
        graph,
        binds(),
        HashMap::from([("train".to_string(), SplitSpec::train(binds_edges()))]),
        EdgeSampleConfig {
            subsample_ratio: 1.0,
            seed: Some(seed),
            ..EdgeSampleConfig::default()
        },
    )
    .unwrap()
}

fn base_features(graph: &HeteroGraph) -> HashMap<String, Array2<f32>> {
    let mut features = HashMap::new();
    for node_type in ["compound", "protein"] {
        let table = graph.node_features(node_type, "feat").unwrap().clone();
        features.insert(node_type.to_string(), table);
    }
    features
}

fn pipeline_layer(seed: u64) -> HeteroGraphConvLayer {
    HeteroGraphConvLayer::new(
        &["assoc", "binds", "similar"],
        InputWidths::Shared(6),
        4,
        WeightInit::Xavier,
        true,
        Some(seed),
    )
    .unwrap()
}

// === BATCH GENERATION ===

#[test]
fn test_train_split_generation_produces_balanced_batch() {
    let graph = Arc::new(interaction_graph());
    let generator = train_generator(graph.clone(), 17);
    let batch = generator.generate("train").unwrap();

    assert_eq!(batch.len(), 12);
    assert_eq!(batch.num_positives(), 6);
    let positives = binds_edges();
    for (edge, label) in batch.edges().iter().zip(batch.labels().iter()) {
        if *label == 1.0 {
            assert!(positives.contains(edge));
        } else {
            assert_eq!(*label, 0.0);
            assert!(!graph.has_edge(&binds(), edge.0, edge.1));
            assert!(edge.0 < 8 && edge.1 < 5);
        }
    }
}

#[test]
fn test_validation_split_keeps_precomputed_negatives() {
    let graph = Arc::new(interaction_graph());
    let positives = vec![(0, 0), (1, 0), (2, 1)];
    let negatives = vec![(6, 0), (7, 1), (5, 2)];
    let generator = PosNegEdgeGenerator::new(
        graph,
        binds(),
        HashMap::from([(
            "valid".to_string(),
            SplitSpec::with_negatives(positives.clone(), negatives.clone()),
        )]),
        EdgeSampleConfig {
            subsample_ratio: 0.25,
            seed: Some(3),
            ..EdgeSampleConfig::default()
        },
    )
    .unwrap();
    let batch = generator.generate("valid").unwrap();

    // evaluation splits ignore the training subsample ratio
    assert_eq!(batch.len(), 6);
    assert_eq!(batch.num_positives(), 3);
    let mut got_positives = Vec::new();
    let mut got_negatives = Vec::new();
    for (edge, label) in batch.edges().iter().zip(batch.labels().iter()) {
        if *label == 1.0 {
            got_positives.push(*edge);
        } else {
            got_negatives.push(*edge);
        }
    }
    got_positives.sort_unstable();
    got_negatives.sort_unstable();
    let mut expected_positives = positives;
    expected_positives.sort_unstable();
    let mut expected_negatives = negatives;
    expected_negatives.sort_unstable();
    assert_eq!(got_positives, expected_positives);
    assert_eq!(got_negatives, expected_negatives);
}

// === SUBGRAPH EXTRACTION ===

#[test]
fn test_enclosing_extraction_strips_the_predicted_edge() {
    let graph = Arc::new(interaction_graph());
    let generator = train_generator(graph.clone(), 29);
    let batch = generator.generate("train").unwrap();

    let sampler = EnclosingSubgraphSampler::new(
        graph,
        binds(),
        SubgraphSamplerConfig {
            num_hops: 1,
            num_workers: 2,
        },
    )
    .unwrap();
    let subgraphs = sampler.sample_batch(batch.edges()).unwrap();
    assert_eq!(subgraphs.len(), batch.len());

    for (pair, subgraph) in batch.edges().iter().zip(&subgraphs) {
        let (u_local, v_local) = subgraph.target_local;
        assert_eq!(subgraph.node_mapping["compound"][u_local], pair.0);
        assert_eq!(subgraph.node_mapping["protein"][v_local], pair.1);
        assert!(!subgraph.graph.has_edge(&binds(), u_local, v_local));

        // batched extraction matches one-off extraction
        let solo = sampler.sample(*pair).unwrap();
        assert_eq!(subgraph.node_mapping, solo.node_mapping);
        assert_eq!(
            subgraph.graph.edges(&binds()).unwrap(),
            solo.graph.edges(&binds()).unwrap()
        );
    }
}

// === CONVOLUTION AND SCORING ===

#[test]
fn test_convolution_runs_on_extracted_subgraph() {
    let graph = Arc::new(interaction_graph());
    let sampler = EnclosingSubgraphSampler::new(
        graph,
        binds(),
        SubgraphSamplerConfig::default(),
    )
    .unwrap();
    let subgraph = sampler.sample((0, 0)).unwrap();
    // 1 hop from compound 0 and protein 0
    assert_eq!(subgraph.node_mapping["compound"], vec![0, 1]);
    assert_eq!(subgraph.node_mapping["protein"], vec![0, 1]);

    let features = base_features(&subgraph.graph);
    let layer = pipeline_layer(11);
    let hidden = layer.forward(&subgraph.graph, &features).unwrap();
    assert_eq!(hidden["compound"].dim(), (2, 4));
    assert_eq!(hidden["protein"].dim(), (2, 4));
}

#[test]
fn test_edge_scores_follow_convolution() {
    let graph = interaction_graph();
    let features = base_features(&graph);
    let layer = pipeline_layer(11);
    let embeddings = layer.forward(&graph, &features).unwrap();

    let scores = DotProductScorer::score(&graph, &embeddings, &binds()).unwrap();
    assert_eq!(scores.len(), 6);
    let expected = embeddings["compound"]
        .row(0)
        .dot(&embeddings["protein"].row(0));
    assert_abs_diff_eq!(scores[0], expected, epsilon = 1e-6);

    // scoring never mutates its inputs
    let again = DotProductScorer::score(&graph, &embeddings, &binds()).unwrap();
    assert_eq!(scores, again);
}

// === DATASET ADAPTERS ===

#[test]
fn test_dataset_adapters_expose_identical_examples() {
    let graph = Arc::new(interaction_graph());
    let generator = train_generator(graph.clone(), 41);
    let batch = generator.generate("train").unwrap();

    let sampler = Arc::new(
        EnclosingSubgraphSampler::new(graph, binds(), SubgraphSamplerConfig::default()).unwrap(),
    );
    let subgraphs = sampler.sample_batch(batch.edges()).unwrap();
    let materialized = GraphDataset::new(subgraphs, batch.labels().clone()).unwrap();

    let transform = {
        let sampler = sampler.clone();
        Box::new(move |pair| sampler.sample(pair))
    };
    let lazy = EdgeDataset::from_batch(batch, transform);

    assert_eq!(materialized.len(), lazy.len());
    for index in [0, lazy.len() / 2, lazy.len() - 1] {
        let (stored, stored_label) = materialized.get(index).unwrap();
        let (extracted, lazy_label) = lazy.get(index).unwrap();
        assert_eq!(stored_label, lazy_label);
        assert_eq!(stored.node_mapping, extracted.node_mapping);
        assert_eq!(stored.target_local, extracted.target_local);
    }
}
