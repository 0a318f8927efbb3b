/*!
This crate implements L1 penalized logistic regression, the `LogisticR` family, behind the train, predict and explain surface shared by every classifier family. Training runs accelerated proximal gradient descent, and the fitted weights and bias give probabilities and feature contributions directly.
*/

#![allow(clippy::tabs_in_doc_comments)]

mod binary_classifier;
mod shap;

pub use self::binary_classifier::BinaryClassifier;

/// These are the options passed to `BinaryClassifier::train`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainOptions {
	/// The inverse of the L1 regularization strength. Smaller values regularize more and zero out more weights.
	pub c: f64,
	/// The maximum number of optimizer iterations.
	pub max_iterations: u64,
}

impl Default for TrainOptions {
	fn default() -> Self {
		Self {
			c: 1.0,
			max_iterations: 100,
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum TrainError {
	#[error("logistic regression requires both classes in the training labels")]
	SingleClass,
	#[error("the regularization parameter C must be positive but was {0}")]
	InvalidC(f64),
	#[error("logistic regression failed to fit: {0}")]
	Fit(String),
}
