//! Gradient-boosted tree ensemble model
//!
//! - `tree`: arena-backed decision tree with tagged leaf/split nodes
//! - `ensemble`: the canonical multi-horizon artifact built on top of it
//!
//! # Evaluation semantics
//!
//! - A split sends a present value to `yes` when `value < threshold`
//!   (strict), otherwise to `no`
//! - A missing value (explicitly marked, or NaN) follows `missing`
//! - A horizon's prediction is the sum of its trees' leaf values, in tree
//!   order, plus the horizon's base score; no link function is applied
//! - All arithmetic is `f64`

pub mod ensemble;
pub mod tree;

pub use ensemble::{Ensemble, Horizon, DEFAULT_HORIZON, MODEL_TYPE};
pub use tree::{Node, Tree, TreeFault, MAX_NODE_ID, ROOT_ID};

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::evaluator::Sample;
    use std::collections::BTreeMap;

    fn two_tree_ensemble() -> Ensemble {
        let tree1 = Tree::from_nodes(vec![
            Node::split(0, 0, 50.0, 1, 2, 2),
            Node::leaf(1, 1.25),
            Node::leaf(2, 2.5),
        ])
        .unwrap();

        let tree2 = Tree::from_nodes(vec![
            Node::split(0, 1, 30.0, 1, 2, 1),
            Node::leaf(1, -0.5),
            Node::leaf(2, 0.5),
        ])
        .unwrap();

        Ensemble::new(
            vec!["pxi_score".into(), "vix".into()],
            0.25,
            BTreeMap::from([("7d".to_string(), vec![tree1, tree2])]),
        )
        .unwrap()
    }

    #[test]
    fn test_two_tree_ensemble_inference() {
        let ensemble = two_tree_ensemble();

        // Tree1: 30 < 50 -> yes -> 1.25; Tree2: 20 < 30 -> yes -> -0.5
        let score = ensemble
            .predict("7d", &Sample::from_dense(&[30.0, 20.0]))
            .unwrap();
        assert_eq!(score, 1.25 - 0.5 + 0.25);

        // Tree1: 60 >= 50 -> no -> 2.5; Tree2: 40 >= 30 -> no -> 0.5
        let score = ensemble
            .predict("7d", &Sample::from_dense(&[60.0, 40.0]))
            .unwrap();
        assert_eq!(score, 2.5 + 0.5 + 0.25);
    }

    #[test]
    fn test_deterministic_inference_repeated() {
        let ensemble = two_tree_ensemble();
        let sample = Sample::from_dense(&[49.999, 30.0]);

        let first = ensemble.predict("7d", &sample).unwrap();
        for _ in 0..100 {
            assert_eq!(
                ensemble.predict("7d", &sample).unwrap().to_bits(),
                first.to_bits()
            );
        }
    }

    #[test]
    fn test_missing_routing_per_tree() {
        let ensemble = two_tree_ensemble();
        let sample = Sample::from_options(vec![None, None]);

        // Tree1 missing -> 2 (2.5); Tree2 missing -> 1 (-0.5)
        assert_eq!(ensemble.predict("7d", &sample).unwrap(), 2.5 - 0.5 + 0.25);
    }
}
