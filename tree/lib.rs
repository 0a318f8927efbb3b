/*!
This crate implements the tree ensemble families: a random forest, [`ForestClassifier`](struct.ForestClassifier.html), for `RF` and gradient boosted trees, [`BoostingClassifier`](struct.BoostingClassifier.html), for `XGB`.

The forest grows each tree with [`linfa-trees`](https://docs.rs/linfa-trees) on a bootstrap sample and then copies it into the [`Tree`](struct.Tree.html) representation below, recording the fraction of training examples that reached each node. Boosting grows its own regression trees on the gradients and hessians of the log loss, directly in the same representation. Those fractions are what the tree SHAP algorithm in `shap.rs` needs to explain the predictions of both ensembles.
*/

#![allow(clippy::tabs_in_doc_comments)]

use ndarray::prelude::*;

mod boosting;
mod forest;
mod shap;

pub use self::boosting::{BoostingClassifier, BoostingTrainOptions};
pub use self::forest::{ForestClassifier, ForestTrainOptions};

#[derive(Debug, thiserror::Error)]
pub enum TrainError {
	#[error("tree ensembles require both classes in the training labels")]
	SingleClass,
	#[error("cannot train on an empty feature matrix")]
	Empty,
	#[error("failed to fit a decision tree: {0}")]
	Fit(String),
}

/// Trees are stored as a `Vec` of `Node`s. Each branch in the tree has two indexes into the `Vec`, one for each of its children. The root is at index 0.
#[derive(Debug, Clone)]
pub struct Tree {
	pub nodes: Vec<Node>,
}

impl Tree {
	/// Make a prediction for a given example.
	pub fn predict(&self, example: ArrayView1<f64>) -> f64 {
		// Start at the root node.
		let mut node_index = 0;
		// Traverse the tree until we get to a leaf.
		loop {
			match &self.nodes[node_index] {
				Node::Branch(branch) => node_index = branch.next_child_index(example),
				Node::Leaf(LeafNode { value, .. }) => return *value,
			}
		}
	}
}

/// A node is either a branch or a leaf.
#[derive(Debug, Clone)]
pub enum Node {
	Branch(BranchNode),
	Leaf(LeafNode),
}

impl Node {
	pub fn examples_fraction(&self) -> f64 {
		match self {
			Self::Leaf(LeafNode {
				examples_fraction, ..
			}) => *examples_fraction,
			Self::Branch(BranchNode {
				examples_fraction, ..
			}) => *examples_fraction,
		}
	}
}

/// A `BranchNode` is a branch in a tree. An example is sent to the left child if its value for `feature_index` is less than `split_value` and to the right child otherwise.
#[derive(Debug, Clone)]
pub struct BranchNode {
	/// This is the index in the tree's node vector for this node's left child.
	pub left_child_index: usize,
	/// This is the index in the tree's node vector for this node's right child.
	pub right_child_index: usize,
	pub feature_index: usize,
	pub split_value: f64,
	/// Branch nodes store the fraction of training examples that passed through them during training. This is used to compute SHAP values.
	pub examples_fraction: f64,
}

impl BranchNode {
	pub fn next_child_index(&self, example: ArrayView1<f64>) -> usize {
		if example[self.feature_index] < self.split_value {
			self.left_child_index
		} else {
			self.right_child_index
		}
	}
}

/// The leaves in a tree hold the values to output for examples that get sent to them.
#[derive(Debug, Clone)]
pub struct LeafNode {
	/// The fraction of positive training examples in this leaf for a forest, or the logit increment for boosting.
	pub value: f64,
	/// Leaf nodes store the fraction of training examples that were sent to them during training. This is used to compute SHAP values.
	pub examples_fraction: f64,
}
