use super::{BranchNode, Node, Tree};
use ndarray::prelude::*;
use num_traits::ToPrimitive;

/// Compute the SHAP values of a single example for the mean of the outputs of `trees`, writing one value per feature into `shap_values`. Returns the expected output, to which the SHAP values sum back up.
pub fn compute_shap(example: ArrayView1<f64>, trees: &[Tree], shap_values: ArrayViewMut1<f64>) -> f64 {
	if trees.is_empty() {
		let mut shap_values = shap_values;
		shap_values.fill(0.0);
		return 0.0;
	}
	let n_trees = trees.len().to_f64().unwrap();
	accumulate_shap(example, trees, 1.0 / n_trees, shap_values)
}

/// Compute the SHAP values of a single example for `bias` plus the sum of the outputs of `trees`. Returns the expected output.
pub fn compute_shap_sum(
	example: ArrayView1<f64>,
	trees: &[Tree],
	bias: f64,
	shap_values: ArrayViewMut1<f64>,
) -> f64 {
	bias + accumulate_shap(example, trees, 1.0, shap_values)
}

fn accumulate_shap(
	example: ArrayView1<f64>,
	trees: &[Tree],
	scale: f64,
	mut shap_values: ArrayViewMut1<f64>,
) -> f64 {
	shap_values.fill(0.0);
	for tree in trees {
		let shap_values_for_tree = tree_shap(example, tree);
		for (shap_value, tree_shap_value) in shap_values.iter_mut().zip(shap_values_for_tree) {
			*shap_value += tree_shap_value * scale;
		}
	}
	trees
		.iter()
		.map(|tree| compute_expectation(tree, 0))
		.sum::<f64>()
		* scale
}

/// This function, and the helper functions below it, are a direct port from https://github.com/slundberg/shap.
fn tree_shap(example: ArrayView1<f64>, tree: &Tree) -> Vec<f64> {
	let n_features = example.len();
	let mut phi = vec![0.0; n_features];
	let max_depth = max_depth(tree, 0, 0) + 2;
	let mut unique_path = vec![PathItem::new(); max_depth * (max_depth + 1) / 2];
	tree_shap_recursive(
		phi.as_mut_slice(),
		example,
		tree,
		0,
		unique_path.as_mut_slice(),
		0,
		1.0,
		1.0,
		None,
	);
	phi
}

#[derive(Debug, Clone)]
struct PathItem {
	feature_index: Option<usize>,
	zero_fraction: f64,
	one_fraction: f64,
	pweight: f64,
}

impl PathItem {
	fn new() -> Self {
		Self {
			feature_index: None,
			zero_fraction: 0.0,
			one_fraction: 0.0,
			pweight: 0.0,
		}
	}
}

#[allow(clippy::too_many_arguments)]
fn tree_shap_recursive(
	phi: &mut [f64],
	example: ArrayView1<f64>,
	tree: &Tree,
	node_index: usize,
	unique_path: &mut [PathItem],
	unique_depth: usize,
	parent_zero_fraction: f64,
	parent_one_fraction: f64,
	parent_feature_index: Option<usize>,
) {
	extend_path(
		unique_path,
		unique_depth,
		parent_zero_fraction,
		parent_one_fraction,
		parent_feature_index,
	);
	let mut unique_depth = unique_depth;
	let node = &tree.nodes[node_index];
	match node {
		Node::Leaf(n) => {
			for path_index in 1..=unique_depth {
				let weight = unwound_path_sum(unique_path, unique_depth, path_index);
				let path_item = &unique_path[path_index];
				let scale = weight * (path_item.one_fraction - path_item.zero_fraction);
				if let Some(feature_index) = path_item.feature_index {
					phi[feature_index] += scale * n.value;
				}
			}
		}
		Node::Branch(n) => {
			let (hot_child_index, cold_child_index) = compute_hot_cold_child(n, example);
			let hot_zero_fraction =
				tree.nodes[hot_child_index].examples_fraction() / n.examples_fraction;
			let cold_zero_fraction =
				tree.nodes[cold_child_index].examples_fraction() / n.examples_fraction;
			let mut incoming_zero_fraction = 1.0;
			let mut incoming_one_fraction = 1.0;
			let feature_index = n.feature_index;
			if let Some(path_index) =
				(1..=unique_depth).find(|i| unique_path[*i].feature_index == Some(feature_index))
			{
				incoming_zero_fraction = unique_path[path_index].zero_fraction;
				incoming_one_fraction = unique_path[path_index].one_fraction;
				unwind_path(unique_path, unique_depth, path_index);
				unique_depth -= 1;
			};
			let (parent_path, child_path) = unique_path.split_at_mut(unique_depth + 1);
			child_path[0..parent_path.len()].clone_from_slice(parent_path);
			tree_shap_recursive(
				phi,
				example,
				tree,
				hot_child_index,
				child_path,
				unique_depth + 1,
				hot_zero_fraction * incoming_zero_fraction,
				incoming_one_fraction,
				Some(feature_index),
			);
			child_path[0..parent_path.len()].clone_from_slice(parent_path);
			tree_shap_recursive(
				phi,
				example,
				tree,
				cold_child_index,
				child_path,
				unique_depth + 1,
				cold_zero_fraction * incoming_zero_fraction,
				0.0,
				Some(feature_index),
			);
		}
	};
}

fn extend_path(
	unique_path: &mut [PathItem],
	unique_depth: usize,
	zero_fraction: f64,
	one_fraction: f64,
	feature_index: Option<usize>,
) {
	unique_path[unique_depth] = PathItem {
		feature_index,
		zero_fraction,
		one_fraction,
		pweight: if unique_depth == 0 { 1.0 } else { 0.0 },
	};
	if unique_depth == 0 {
		return;
	}
	let depth = (unique_depth + 1).to_f64().unwrap();
	for i in (0..unique_depth).rev() {
		unique_path[i + 1].pweight +=
			one_fraction * unique_path[i].pweight * (i + 1).to_f64().unwrap() / depth;
		unique_path[i].pweight =
			zero_fraction * unique_path[i].pweight * (unique_depth - i).to_f64().unwrap() / depth;
	}
}

fn unwind_path(unique_path: &mut [PathItem], unique_depth: usize, path_index: usize) {
	let one_fraction = unique_path[path_index].one_fraction;
	let zero_fraction = unique_path[path_index].zero_fraction;
	let mut next_one_portion = unique_path[unique_depth].pweight;
	let depth = (unique_depth + 1).to_f64().unwrap();
	for i in (0..unique_depth).rev() {
		if one_fraction != 0.0 {
			let tmp = unique_path[i].pweight;
			unique_path[i].pweight =
				next_one_portion * depth / ((i + 1).to_f64().unwrap() * one_fraction);
			next_one_portion = tmp
				- unique_path[i].pweight * zero_fraction * (unique_depth - i).to_f64().unwrap()
					/ depth;
		} else {
			unique_path[i].pweight = unique_path[i].pweight * depth
				/ (zero_fraction * (unique_depth - i).to_f64().unwrap());
		}
	}
	for i in path_index..unique_depth {
		unique_path[i].feature_index = unique_path[i + 1].feature_index;
		unique_path[i].zero_fraction = unique_path[i + 1].zero_fraction;
		unique_path[i].one_fraction = unique_path[i + 1].one_fraction;
	}
}

fn unwound_path_sum(unique_path: &[PathItem], unique_depth: usize, path_index: usize) -> f64 {
	let one_fraction = unique_path[path_index].one_fraction;
	let zero_fraction = unique_path[path_index].zero_fraction;
	let mut next_one_portion = unique_path[unique_depth].pweight;
	let mut total = 0.0;
	if one_fraction != 0.0 {
		for i in (0..unique_depth).rev() {
			let tmp = next_one_portion / ((i + 1).to_f64().unwrap() * one_fraction);
			total += tmp;
			next_one_portion =
				unique_path[i].pweight - tmp * zero_fraction * (unique_depth - i).to_f64().unwrap();
		}
	} else {
		for i in (0..unique_depth).rev() {
			total += unique_path[i].pweight / (zero_fraction * (unique_depth - i).to_f64().unwrap());
		}
	}
	total * (unique_depth + 1).to_f64().unwrap()
}

fn compute_hot_cold_child(node: &BranchNode, example: ArrayView1<f64>) -> (usize, usize) {
	let hot_child_index = node.next_child_index(example);
	if hot_child_index == node.left_child_index {
		(node.left_child_index, node.right_child_index)
	} else {
		(node.right_child_index, node.left_child_index)
	}
}

fn max_depth(tree: &Tree, node_index: usize, depth: usize) -> usize {
	match &tree.nodes[node_index] {
		Node::Leaf(_) => depth,
		Node::Branch(n) => {
			let left_depth = max_depth(tree, n.left_child_index, depth + 1);
			let right_depth = max_depth(tree, n.right_child_index, depth + 1);
			left_depth.max(right_depth) + 1
		}
	}
}

fn compute_expectation(tree: &Tree, node_index: usize) -> f64 {
	let current_node = match &tree.nodes[node_index] {
		Node::Leaf(n) => return n.value,
		Node::Branch(n) => n,
	};
	let left_child = &tree.nodes[current_node.left_child_index];
	let right_child = &tree.nodes[current_node.right_child_index];
	let left_value = compute_expectation(tree, current_node.left_child_index);
	let right_value = compute_expectation(tree, current_node.right_child_index);
	(left_child.examples_fraction() / current_node.examples_fraction) * left_value
		+ (right_child.examples_fraction() / current_node.examples_fraction) * right_value
}

#[cfg(test)]
fn stump(feature_index: usize, left: f64, right: f64) -> Tree {
	use super::LeafNode;
	Tree {
		nodes: vec![
			Node::Branch(BranchNode {
				left_child_index: 1,
				right_child_index: 2,
				feature_index,
				split_value: 0.5,
				examples_fraction: 1.0,
			}),
			Node::Leaf(LeafNode {
				value: left,
				examples_fraction: 0.25,
			}),
			Node::Leaf(LeafNode {
				value: right,
				examples_fraction: 0.75,
			}),
		],
	}
}

#[test]
fn test_stump() {
	let tree = stump(1, 0.0, 1.0);
	let example = array![0.3, 0.9];
	let mut shap_values = Array1::zeros(2);
	let expected = compute_shap(example.view(), &[tree.clone()], shap_values.view_mut());
	assert!((expected - 0.75).abs() < 1e-12);
	assert_eq!(shap_values[0], 0.0);
	assert!((shap_values[1] - 0.25).abs() < 1e-12);
	assert!((expected + shap_values.sum() - tree.predict(example.view())).abs() < 1e-12);
}

#[test]
fn test_additivity_over_forest() {
	let trees = vec![stump(0, 0.2, 0.8), stump(1, 0.9, 0.1), stump(0, 0.4, 0.6)];
	let example = array![0.1, 0.7];
	let mut shap_values = Array1::zeros(2);
	let expected = compute_shap(example.view(), &trees, shap_values.view_mut());
	let prediction = trees.iter().map(|tree| tree.predict(example.view())).sum::<f64>() / 3.0;
	assert!((expected + shap_values.sum() - prediction).abs() < 1e-12);
}

#[test]
fn test_sum_of_trees() {
	let trees = vec![stump(0, -0.3, 0.3), stump(1, 0.2, -0.1)];
	let example = array![0.9, 0.2];
	let mut shap_values = Array1::zeros(2);
	let expected = compute_shap_sum(example.view(), &trees, -0.5, shap_values.view_mut());
	// 0.25 * -0.3 + 0.75 * 0.3 and 0.25 * 0.2 + 0.75 * -0.1 on top of the bias.
	assert!((expected - (-0.5 + 0.15 - 0.025)).abs() < 1e-12);
	let prediction = -0.5 + trees.iter().map(|tree| tree.predict(example.view())).sum::<f64>();
	assert!((expected + shap_values.sum() - prediction).abs() < 1e-12);
}
