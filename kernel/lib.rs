/*!
This crate implements the `SVM` family, a support vector classifier with an RBF kernel and Platt scaled probabilities provided by [`linfa-svm`](https://docs.rs/linfa-svm), and the model agnostic explainer used for families without a structural explainer.

The [`SamplingExplainer`](struct.SamplingExplainer.html) estimates SHAP values by sampling feature permutations against a small background summary of the training data. The summary is built by [`kmeans_background`](fn.kmeans_background.html), which clusters the training rows with [`linfa-clustering`](https://docs.rs/linfa-clustering) and weights each centroid by the size of its cluster.
*/

#![allow(clippy::tabs_in_doc_comments)]

mod background;
mod sampling;
mod svm;

pub use self::background::{kmeans_background, Background};
pub use self::sampling::SamplingExplainer;
pub use self::svm::{SvmClassifier, SvmTrainOptions};

#[derive(Debug, thiserror::Error)]
pub enum TrainError {
	#[error("the support vector classifier requires both classes in the training labels")]
	SingleClass,
	#[error("the support vector classifier failed to fit: {0}")]
	Fit(String),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ExplainError {
	#[error("the background summary is empty")]
	EmptyBackground,
	#[error("failed to cluster the background: {0}")]
	Clustering(String),
	#[error("the background has {expected} features but the examples have {actual}")]
	FeatureCount { expected: usize, actual: usize },
}
