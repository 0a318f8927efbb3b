use crate::TrainError;
use lagsweep_metrics::{MeanVariance, Metric};
use linfa::{dataset::Pr, prelude::*};
use linfa_svm::Svm;
use ndarray::prelude::*;
use num_traits::ToPrimitive;

/// These are the options passed to `SvmClassifier::train`.
#[derive(Debug, Clone, PartialEq)]
pub struct SvmTrainOptions {
	/// The penalty for misclassified training examples.
	pub c: f64,
	/// The RBF kernel coefficient in `exp(-gamma * |x - y|^2)`. `None` uses `1 / (n_features * variance)` of the training matrix.
	pub gamma: Option<f64>,
}

impl Default for SvmTrainOptions {
	fn default() -> Self {
		Self { c: 1.0, gamma: None }
	}
}

pub struct SvmClassifier {
	model: Svm<f64, Pr>,
	pub gamma: f64,
}

impl std::fmt::Debug for SvmClassifier {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SvmClassifier")
			.field("gamma", &self.gamma)
			.finish()
	}
}

impl SvmClassifier {
	pub fn train(
		features: ArrayView2<f64>,
		labels: ArrayView1<usize>,
		options: &SvmTrainOptions,
	) -> Result<SvmClassifier, TrainError> {
		if !(labels.iter().any(|label| *label == 0) && labels.iter().any(|label| *label == 1)) {
			return Err(TrainError::SingleClass);
		}
		let gamma = options.gamma.unwrap_or_else(|| scale_gamma(features));
		let targets = labels.mapv(|label| label == 1);
		let dataset = Dataset::new(features.to_owned(), targets);
		let model = Svm::<f64, Pr>::params()
			.pos_neg_weights(options.c, options.c)
			.gaussian_kernel(1.0 / gamma)
			.fit(&dataset)
			.map_err(|error| TrainError::Fit(error.to_string()))?;
		Ok(SvmClassifier { model, gamma })
	}

	/// The probability of label 1 for each row of `features`.
	pub fn predict_probabilities(&self, features: ArrayView2<f64>) -> Array1<f64> {
		let probabilities: Array1<Pr> = self.model.predict(&features.to_owned());
		probabilities.mapv(|probability| (*probability).to_f64().unwrap_or(f64::NAN))
	}
}

/// `1 / (n_features * variance)` over every value of the matrix, or 1 when that variance is zero.
fn scale_gamma(features: ArrayView2<f64>) -> f64 {
	let values: Vec<f64> = features.iter().copied().collect();
	let variance = MeanVariance::compute(&values)
		.map(|mean_variance| mean_variance.variance)
		.unwrap_or(0.0);
	let n_features = features.ncols().max(1).to_f64().unwrap();
	if variance > 0.0 {
		1.0 / (n_features * variance)
	} else {
		1.0
	}
}

#[test]
fn test_scale_gamma() {
	let features = array![[0.0, 1.0], [1.0, 0.0]];
	// The variance of 0, 1, 1, 0 is 0.25.
	assert!((scale_gamma(features.view()) - 2.0).abs() < 1e-12);
	assert_eq!(scale_gamma(array![[1.0, 1.0]].view()), 1.0);
}

#[test]
fn test_svm_ranks_classes() {
	let features = array![
		[0.0, 0.1],
		[0.1, 0.0],
		[0.2, 0.2],
		[0.3, 0.1],
		[0.1, 0.3],
		[0.7, 0.8],
		[0.8, 0.9],
		[0.9, 0.7],
		[1.0, 1.0],
		[0.8, 0.6],
	];
	let labels = array![0, 0, 0, 0, 0, 1, 1, 1, 1, 1];
	let options = SvmTrainOptions {
		c: 10.0,
		gamma: Some(1.0),
	};
	let model = SvmClassifier::train(features.view(), labels.view(), &options).unwrap();
	let probabilities = model.predict_probabilities(array![[0.05, 0.05], [0.95, 0.95]].view());
	assert!(probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
	assert!(probabilities[0] < probabilities[1]);
}
