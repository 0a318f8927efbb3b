use crate::{shap, BranchNode, LeafNode, Node, TrainError, Tree};
use itertools::izip;
use linfa::prelude::*;
use linfa_trees::{DecisionTree, SplitQuality, TreeNode};
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rand::{seq::index, Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

/// These are the options passed to `ForestClassifier::train`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForestTrainOptions {
	pub n_trees: usize,
	/// The maximum depth of each tree. `None` grows trees until their leaves are pure.
	pub max_depth: Option<usize>,
	/// The minimum number of training examples in a leaf.
	pub min_samples_leaf: usize,
	/// If true, the accuracy of each example's out-of-bag prediction is computed after training.
	pub compute_oob_score: bool,
	/// Seeds the bootstrap samples and feature subsets.
	pub seed: u64,
}

impl Default for ForestTrainOptions {
	fn default() -> Self {
		Self {
			n_trees: 100,
			max_depth: Some(1),
			min_samples_leaf: 1,
			compute_oob_score: false,
			seed: 0,
		}
	}
}

/**
A random forest binary classifier. Each tree is grown on a bootstrap sample of the training examples, using a random subset of `sqrt(n_features)` features, and predicts the fraction of positive examples in the leaf an example lands in. The forest's probability is the mean over its trees.
*/
#[derive(Debug, Clone)]
pub struct ForestClassifier {
	pub trees: Vec<Tree>,
	/// The out-of-bag accuracy, if it was requested.
	pub oob_accuracy: Option<f64>,
}

impl ForestClassifier {
	pub fn train(
		features: ArrayView2<f64>,
		labels: ArrayView1<usize>,
		options: &ForestTrainOptions,
	) -> Result<ForestClassifier, TrainError> {
		let n_examples = features.nrows();
		let n_features = features.ncols();
		if n_examples == 0 || n_features == 0 {
			return Err(TrainError::Empty);
		}
		if !(labels.iter().any(|label| *label == 0) && labels.iter().any(|label| *label == 1)) {
			return Err(TrainError::SingleClass);
		}
		let n_subspace_features = n_features.to_f64().unwrap().sqrt().floor().to_usize().unwrap().max(1);
		let mut rng = Xoshiro256Plus::seed_from_u64(options.seed);
		let mut trees = Vec::with_capacity(options.n_trees);
		let mut in_bag = Vec::with_capacity(options.n_trees);
		for _ in 0..options.n_trees {
			let rows: Vec<usize> = (0..n_examples).map(|_| rng.gen_range(0..n_examples)).collect();
			let mut subspace = index::sample(&mut rng, n_features, n_subspace_features).into_vec();
			subspace.sort_unstable();
			let records = features.select(Axis(0), &rows).select(Axis(1), &subspace);
			let targets = labels.select(Axis(0), &rows);
			let decision_tree = DecisionTree::params()
				.split_quality(SplitQuality::Gini)
				.max_depth(options.max_depth)
				.min_weight_leaf(options.min_samples_leaf.to_f32().unwrap())
				.fit(&Dataset::new(records, targets))
				.map_err(|error| TrainError::Fit(error.to_string()))?;
			let root = decision_tree
				.iter_nodes()
				.next()
				.ok_or_else(|| TrainError::Fit("the fitted tree has no nodes".to_owned()))?;
			let mut nodes = Vec::new();
			copy_node(
				root,
				&subspace,
				features,
				labels,
				&rows,
				rows.len().to_f64().unwrap(),
				&mut nodes,
			);
			trees.push(Tree { nodes });
			let mut tree_in_bag = vec![false; n_examples];
			for row in rows {
				tree_in_bag[row] = true;
			}
			in_bag.push(tree_in_bag);
		}
		let mut model = ForestClassifier {
			trees,
			oob_accuracy: None,
		};
		if options.compute_oob_score {
			model.oob_accuracy = model.compute_oob_accuracy(features, labels, &in_bag);
		}
		Ok(model)
	}

	/// The probability of label 1 for each row of `features`.
	pub fn predict_probabilities(&self, features: ArrayView2<f64>) -> Array1<f64> {
		let n_trees = self.trees.len().max(1).to_f64().unwrap();
		features
			.axis_iter(Axis(0))
			.map(|example| {
				self.trees
					.iter()
					.map(|tree| tree.predict(example))
					.sum::<f64>()
					/ n_trees
			})
			.collect()
	}

	/// The SHAP values of the probability of label 1 for each row of `features`. The values for label 0 are their negation.
	pub fn compute_shap_values(&self, features: ArrayView2<f64>) -> Array2<f64> {
		let mut shap_values = Array2::zeros(features.raw_dim());
		for (example, shap_values) in izip!(
			features.axis_iter(Axis(0)),
			shap_values.axis_iter_mut(Axis(0))
		) {
			shap::compute_shap(example, &self.trees, shap_values);
		}
		shap_values
	}

	fn compute_oob_accuracy(
		&self,
		features: ArrayView2<f64>,
		labels: ArrayView1<usize>,
		in_bag: &[Vec<bool>],
	) -> Option<f64> {
		let mut n_correct = 0usize;
		let mut n_scored = 0usize;
		for (example_index, (example, label)) in
			izip!(features.axis_iter(Axis(0)), labels.iter()).enumerate()
		{
			let out_of_bag: Vec<f64> = izip!(self.trees.iter(), in_bag.iter())
				.filter(|(_, in_bag)| !in_bag[example_index])
				.map(|(tree, _)| tree.predict(example))
				.collect();
			if out_of_bag.is_empty() {
				continue;
			}
			let probability = out_of_bag.iter().sum::<f64>() / out_of_bag.len().to_f64().unwrap();
			let prediction = usize::from(probability > 0.5);
			n_scored += 1;
			if prediction == *label {
				n_correct += 1;
			}
		}
		if n_scored == 0 {
			None
		} else {
			Some(n_correct.to_f64().unwrap() / n_scored.to_f64().unwrap())
		}
	}
}

/// Copy a fitted linfa tree into `nodes`, routing the bootstrap `rows` down the tree to record how many examples reach each node and the fraction of positives in each leaf. Returns the index of the copied node.
fn copy_node(
	node: &TreeNode<f64, usize>,
	subspace: &[usize],
	features: ArrayView2<f64>,
	labels: ArrayView1<usize>,
	rows: &[usize],
	n_examples: f64,
	nodes: &mut Vec<Node>,
) -> usize {
	let node_index = nodes.len();
	let examples_fraction = rows.len().to_f64().unwrap() / n_examples;
	let children = node.children();
	let left = children.first().and_then(|child| child.as_deref());
	let right = children.get(1).and_then(|child| child.as_deref());
	match (node.is_leaf(), left, right) {
		(false, Some(left), Some(right)) => {
			let (subspace_feature_index, split_value, _) = node.split();
			let feature_index = subspace[subspace_feature_index];
			// Reserve this node's slot so that children are placed after it.
			nodes.push(Node::Leaf(LeafNode {
				value: 0.0,
				examples_fraction,
			}));
			let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
				.iter()
				.copied()
				.partition(|row| features[[*row, feature_index]] < split_value);
			let left_child_index =
				copy_node(left, subspace, features, labels, &left_rows, n_examples, nodes);
			let right_child_index =
				copy_node(right, subspace, features, labels, &right_rows, n_examples, nodes);
			nodes[node_index] = Node::Branch(BranchNode {
				left_child_index,
				right_child_index,
				feature_index,
				split_value,
				examples_fraction,
			});
		}
		_ => {
			let n_positives = rows.iter().filter(|row| labels[**row] == 1).count();
			let value = if rows.is_empty() {
				0.0
			} else {
				n_positives.to_f64().unwrap() / rows.len().to_f64().unwrap()
			};
			nodes.push(Node::Leaf(LeafNode {
				value,
				examples_fraction,
			}));
		}
	}
	node_index
}

#[cfg(test)]
fn separable() -> (Array2<f64>, Array1<usize>) {
	let features = array![
		[0.0, 0.1],
		[0.1, 0.0],
		[0.2, 0.2],
		[0.3, 0.1],
		[0.7, 0.8],
		[0.8, 0.9],
		[0.9, 0.7],
		[1.0, 1.0],
	];
	let labels = array![0, 0, 0, 0, 1, 1, 1, 1];
	(features, labels)
}

#[test]
fn test_forest_separates_classes() {
	let (features, labels) = separable();
	let options = ForestTrainOptions {
		n_trees: 50,
		compute_oob_score: true,
		seed: 3,
		..Default::default()
	};
	let model = ForestClassifier::train(features.view(), labels.view(), &options).unwrap();
	assert_eq!(model.trees.len(), 50);
	let probabilities = model.predict_probabilities(features.view());
	assert!(probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
	assert!(probabilities[0] < 0.5);
	assert!(probabilities[7] > 0.5);
	let oob_accuracy = model.oob_accuracy.unwrap();
	assert!((0.0..=1.0).contains(&oob_accuracy));
}

#[test]
fn test_forest_shap_is_additive() {
	let (features, labels) = separable();
	let options = ForestTrainOptions {
		n_trees: 10,
		max_depth: Some(2),
		..Default::default()
	};
	let model = ForestClassifier::train(features.view(), labels.view(), &options).unwrap();
	let shap_values = model.compute_shap_values(features.view());
	let probabilities = model.predict_probabilities(features.view());
	let mut expected = Array1::zeros(2);
	let base = shap::compute_shap(features.row(0), &model.trees, expected.view_mut());
	for (row, probability) in izip!(shap_values.axis_iter(Axis(0)), probabilities.iter()) {
		assert!((base + row.sum() - probability).abs() < 1e-9);
	}
}

#[test]
fn test_forest_is_deterministic_for_a_seed() {
	let (features, labels) = separable();
	let options = ForestTrainOptions {
		n_trees: 5,
		seed: 11,
		..Default::default()
	};
	let a = ForestClassifier::train(features.view(), labels.view(), &options).unwrap();
	let b = ForestClassifier::train(features.view(), labels.view(), &options).unwrap();
	assert_eq!(
		a.predict_probabilities(features.view()),
		b.predict_probabilities(features.view())
	);
}
