use crate::{shap, BranchNode, LeafNode, Node, TrainError, Tree};
use itertools::izip;
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use std::ops::Neg;

/// The L2 penalty on leaf values, which also appears in the split gain.
const L2_REGULARIZATION: f64 = 1.0;

/// These are the options passed to `BoostingClassifier::train`.
#[derive(Debug, Clone, PartialEq)]
pub struct BoostingTrainOptions {
	pub n_trees: usize,
	pub max_depth: usize,
	/// The minimum sum of hessians in each child of a split.
	pub min_child_weight: f64,
	/// The learning rate scales the leaf values to control the effect each tree has on the output.
	pub learning_rate: f64,
}

impl Default for BoostingTrainOptions {
	fn default() -> Self {
		Self {
			n_trees: 100,
			max_depth: 6,
			min_child_weight: 1.0,
			learning_rate: 0.3,
		}
	}
}

/**
A gradient boosted trees binary classifier. Each round fits one regression tree to the gradients and hessians of the log loss, choosing splits greedily by their gain over every distinct feature value. The model's logit is the bias plus the sum of the tree outputs.
*/
#[derive(Debug, Clone)]
pub struct BoostingClassifier {
	/// The log odds of label 1 in the training labels, which is the logit before any tree is added.
	pub bias: f64,
	/// The trees for this model. Their leaf values are already scaled by the learning rate.
	pub trees: Vec<Tree>,
	n_features: usize,
}

struct GrowContext<'a> {
	features: ArrayView2<'a, f64>,
	gradients: &'a [f64],
	hessians: &'a [f64],
	n_examples: f64,
	options: &'a BoostingTrainOptions,
}

struct Split {
	feature_index: usize,
	split_value: f64,
}

impl BoostingClassifier {
	pub fn train(
		features: ArrayView2<f64>,
		labels: ArrayView1<usize>,
		options: &BoostingTrainOptions,
	) -> Result<BoostingClassifier, TrainError> {
		let n_examples = features.nrows();
		let n_features = features.ncols();
		if n_examples == 0 || n_features == 0 {
			return Err(TrainError::Empty);
		}
		let n_positives = labels.iter().filter(|label| **label == 1).count();
		if n_positives == 0 || n_positives == n_examples {
			return Err(TrainError::SingleClass);
		}
		let bias = (n_positives.to_f64().unwrap() / (n_examples - n_positives).to_f64().unwrap()).ln();
		let mut logits = vec![bias; n_examples];
		let mut gradients = vec![0.0; n_examples];
		let mut hessians = vec![0.0; n_examples];
		let mut trees = Vec::with_capacity(options.n_trees);
		for _ in 0..options.n_trees {
			update_gradients_and_hessians(&mut gradients, &mut hessians, labels, &logits);
			let context = GrowContext {
				features: features.view(),
				gradients: &gradients,
				hessians: &hessians,
				n_examples: n_examples.to_f64().unwrap(),
				options,
			};
			let mut nodes = Vec::new();
			grow(&context, (0..n_examples).collect(), 0, &mut nodes);
			let tree = Tree { nodes };
			for (logit, example) in izip!(logits.iter_mut(), features.axis_iter(Axis(0))) {
				*logit += tree.predict(example);
			}
			trees.push(tree);
		}
		Ok(BoostingClassifier {
			bias,
			trees,
			n_features,
		})
	}

	/// The probability of label 1 for each row of `features`.
	pub fn predict_probabilities(&self, features: ArrayView2<f64>) -> Array1<f64> {
		features
			.axis_iter(Axis(0))
			.map(|example| {
				let logit = self.bias + self.trees.iter().map(|tree| tree.predict(example)).sum::<f64>();
				1.0 / (logit.neg().exp() + 1.0)
			})
			.collect()
	}

	/// The SHAP values, in logit space, of each row of `features`.
	pub fn compute_shap_values(&self, features: ArrayView2<f64>) -> Array2<f64> {
		let mut shap_values = Array2::zeros(features.raw_dim());
		for (example, shap_values) in izip!(
			features.axis_iter(Axis(0)),
			shap_values.axis_iter_mut(Axis(0))
		) {
			shap::compute_shap_sum(example, &self.trees, self.bias, shap_values);
		}
		shap_values
	}

	pub fn n_features(&self) -> usize {
		self.n_features
	}
}

/// Compute the gradients and hessians of the log loss for each example given the labels and the current logits.
fn update_gradients_and_hessians(
	gradients: &mut [f64],
	hessians: &mut [f64],
	labels: ArrayView1<usize>,
	logits: &[f64],
) {
	for (gradient, hessian, label, logit) in izip!(gradients, hessians, labels, logits) {
		let probability = 1.0 / (logit.neg().exp() + 1.0);
		let label = if *label == 1 { 1.0 } else { 0.0 };
		*gradient = probability - label;
		*hessian = probability * (1.0 - probability);
	}
}

/// Grow the subtree for `rows` into `nodes` and return the index of its root.
fn grow(context: &GrowContext, rows: Vec<usize>, depth: usize, nodes: &mut Vec<Node>) -> usize {
	let node_index = nodes.len();
	let examples_fraction = rows.len().to_f64().unwrap() / context.n_examples;
	let sum_gradients: f64 = rows.iter().map(|row| context.gradients[*row]).sum();
	let sum_hessians: f64 = rows.iter().map(|row| context.hessians[*row]).sum();
	let split = if depth < context.options.max_depth {
		choose_best_split(context, &rows, sum_gradients, sum_hessians)
	} else {
		None
	};
	match split {
		Some(Split {
			feature_index,
			split_value,
		}) => {
			// Reserve this node's slot so that children are placed after it.
			nodes.push(Node::Leaf(LeafNode {
				value: 0.0,
				examples_fraction,
			}));
			let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
				.into_iter()
				.partition(|row| context.features[[*row, feature_index]] < split_value);
			let left_child_index = grow(context, left_rows, depth + 1, nodes);
			let right_child_index = grow(context, right_rows, depth + 1, nodes);
			nodes[node_index] = Node::Branch(BranchNode {
				left_child_index,
				right_child_index,
				feature_index,
				split_value,
				examples_fraction,
			});
		}
		None => {
			let value =
				-context.options.learning_rate * sum_gradients / (sum_hessians + L2_REGULARIZATION);
			nodes.push(Node::Leaf(LeafNode {
				value,
				examples_fraction,
			}));
		}
	}
	node_index
}

fn score(sum_gradients: f64, sum_hessians: f64) -> f64 {
	sum_gradients * sum_gradients / (sum_hessians + L2_REGULARIZATION)
}

/// Find the split of `rows` with the largest positive gain whose children both reach `min_child_weight`. Examples with a missing value go right.
fn choose_best_split(
	context: &GrowContext,
	rows: &[usize],
	sum_gradients: f64,
	sum_hessians: f64,
) -> Option<Split> {
	let parent_score = score(sum_gradients, sum_hessians);
	let min_child_weight = context.options.min_child_weight;
	let mut best: Option<(f64, Split)> = None;
	for feature_index in 0..context.features.ncols() {
		let mut sorted: Vec<(f64, usize)> = rows
			.iter()
			.map(|row| (context.features[[*row, feature_index]], *row))
			.filter(|(value, _)| !value.is_nan())
			.collect();
		sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
		let mut left_sum_gradients = 0.0;
		let mut left_sum_hessians = 0.0;
		for window in sorted.windows(2) {
			let (value, row) = window[0];
			let next_value = window[1].0;
			left_sum_gradients += context.gradients[row];
			left_sum_hessians += context.hessians[row];
			if value == next_value {
				continue;
			}
			let right_sum_hessians = sum_hessians - left_sum_hessians;
			if left_sum_hessians < min_child_weight || right_sum_hessians < min_child_weight {
				continue;
			}
			let gain = score(left_sum_gradients, left_sum_hessians)
				+ score(sum_gradients - left_sum_gradients, right_sum_hessians)
				- parent_score;
			let is_better = match &best {
				Some((best_gain, _)) => gain > *best_gain,
				None => gain > 0.0,
			};
			if is_better {
				best = Some((
					gain,
					Split {
						feature_index,
						split_value: (value + next_value) / 2.0,
					},
				));
			}
		}
	}
	best.map(|(_, split)| split)
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
fn test_boosting_separates_classes() {
	let (features, labels) = separable();
	let options = BoostingTrainOptions {
		n_trees: 20,
		max_depth: 2,
		..Default::default()
	};
	let model = BoostingClassifier::train(features.view(), labels.view(), &options).unwrap();
	assert_eq!(model.trees.len(), 20);
	let probabilities = model.predict_probabilities(features.view());
	assert_eq!(probabilities.len(), 8);
	assert!(probabilities.iter().take(4).all(|p| *p < 0.5));
	assert!(probabilities.iter().skip(4).all(|p| *p > 0.5));
}

#[test]
fn test_min_child_weight_blocks_splits() {
	let (features, labels) = separable();
	// Eight examples start with a total hessian of 2, so no child can reach 3.
	let options = BoostingTrainOptions {
		n_trees: 5,
		min_child_weight: 3.0,
		..Default::default()
	};
	let model = BoostingClassifier::train(features.view(), labels.view(), &options).unwrap();
	assert!(model
		.trees
		.iter()
		.all(|tree| tree.nodes.len() == 1 && matches!(tree.nodes[0], Node::Leaf(_))));
	let probabilities = model.predict_probabilities(features.view());
	assert!(probabilities.iter().all(|p| (p - 0.5).abs() < 1e-9));
}

#[test]
fn test_boosting_shap_sums_to_logit() {
	let (features, labels) = separable();
	let options = BoostingTrainOptions {
		n_trees: 10,
		max_depth: 3,
		min_child_weight: 0.1,
		..Default::default()
	};
	let model = BoostingClassifier::train(features.view(), labels.view(), &options).unwrap();
	let shap_values = model.compute_shap_values(features.view());
	let probabilities = model.predict_probabilities(features.view());
	for (example, shap_values, probability) in izip!(
		features.axis_iter(Axis(0)),
		shap_values.axis_iter(Axis(0)),
		probabilities.iter()
	) {
		let mut expected_values = Array1::zeros(2);
		let expected = shap::compute_shap_sum(example, &model.trees, model.bias, expected_values.view_mut());
		let logit = (probability / (1.0 - probability)).ln();
		assert!((expected + shap_values.sum() - logit).abs() < 1e-9);
	}
}
