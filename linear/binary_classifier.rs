use crate::{shap, TrainError, TrainOptions};
use itertools::izip;
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use std::ops::Neg;

/// Training stops once no coefficient moves by more than this in an iteration.
const TOLERANCE: f64 = 1e-4;
/// The maximum number of times the step size is halved within one iteration.
const MAX_BACKTRACKS: usize = 64;

#[derive(Clone, Debug, PartialEq)]
pub struct BinaryClassifier {
	pub weights: Array1<f64>,
	pub bias: f64,
	/// the mean of each feature value in the training set, which is used to compute SHAP values
	pub means: Vec<f64>,
}

impl BinaryClassifier {
	/**
	Fit an L1 penalized logistic regression by accelerated proximal gradient descent.

	The objective is `||w||_1 + c * sum(log_loss)`, the same one liblinear minimizes, divided through by `c * n_examples`. The bias is not penalized. The step size is found by backtracking, so no learning rate is needed.
	*/
	pub fn train(
		features: ArrayView2<f64>,
		labels: ArrayView1<usize>,
		options: &TrainOptions,
	) -> Result<BinaryClassifier, TrainError> {
		if options.c <= 0.0 || !options.c.is_finite() {
			return Err(TrainError::InvalidC(options.c));
		}
		let has_both_classes =
			labels.iter().any(|label| *label == 0) && labels.iter().any(|label| *label == 1);
		if !has_both_classes {
			return Err(TrainError::SingleClass);
		}
		let n_examples = labels.len().to_f64().unwrap();
		let penalty = 1.0 / (options.c * n_examples);
		let targets = labels.mapv(|label| if label == 1 { 1.0 } else { 0.0 });
		let means = features
			.axis_iter(Axis(1))
			.map(|column| column.mean().unwrap_or(0.0))
			.collect();
		let mut model = BinaryClassifier {
			weights: Array1::zeros(features.ncols()),
			bias: 0.0,
			means,
		};
		let mut momentum = model.clone();
		let mut momentum_coefficient: f64 = 1.0;
		let mut lipschitz = 1.0;
		for _ in 0..options.max_iterations {
			let (loss, weight_gradients, bias_gradient) =
				momentum.compute_loss_and_gradients(features, targets.view());
			let mut candidate = None;
			for _ in 0..MAX_BACKTRACKS {
				let step = 1.0 / lipschitz;
				let weights = (&momentum.weights - &(&weight_gradients * step))
					.mapv_into(|weight| soft_threshold(weight, step * penalty));
				let bias = momentum.bias - step * bias_gradient;
				let weight_steps = &weights - &momentum.weights;
				let bias_step = bias - momentum.bias;
				let next = BinaryClassifier {
					weights,
					bias,
					means: Vec::new(),
				};
				let (next_loss, _, _) = next.compute_loss_and_gradients(features, targets.view());
				let bound = loss
					+ weight_gradients.dot(&weight_steps)
					+ bias_gradient * bias_step
					+ 0.5 * lipschitz * (weight_steps.dot(&weight_steps) + bias_step * bias_step);
				if next_loss <= bound + f64::EPSILON {
					candidate = Some(next);
					break;
				}
				lipschitz *= 2.0;
			}
			let candidate = match candidate {
				Some(candidate) => candidate,
				None => return Err(TrainError::Fit("the line search did not converge".to_owned())),
			};
			if !candidate.bias.is_finite() || candidate.weights.iter().any(|weight| !weight.is_finite())
			{
				return Err(TrainError::Fit("the coefficients diverged".to_owned()));
			}
			let next_momentum_coefficient =
				(1.0 + (1.0 + 4.0 * momentum_coefficient * momentum_coefficient).sqrt()) / 2.0;
			let extrapolation = (momentum_coefficient - 1.0) / next_momentum_coefficient;
			let weight_changes = &candidate.weights - &model.weights;
			let bias_change = candidate.bias - model.bias;
			let max_change = weight_changes
				.iter()
				.fold(bias_change.abs(), |max, change| max.max(change.abs()));
			momentum.weights = &candidate.weights + &(&weight_changes * extrapolation);
			momentum.bias = candidate.bias + bias_change * extrapolation;
			model.weights = candidate.weights;
			model.bias = candidate.bias;
			momentum_coefficient = next_momentum_coefficient;
			if max_change < TOLERANCE {
				break;
			}
		}
		Ok(model)
	}

	/// The mean log loss and its gradients with respect to the weights and the bias.
	fn compute_loss_and_gradients(
		&self,
		features: ArrayView2<f64>,
		targets: ArrayView1<f64>,
	) -> (f64, Array1<f64>, f64) {
		let logits = features.dot(&self.weights) + self.bias;
		let loss = izip!(logits.iter(), targets.iter())
			.map(|(logit, target)| logit.max(0.0) + logit.abs().neg().exp().ln_1p() - target * logit)
			.sum::<f64>()
			/ targets.len().to_f64().unwrap();
		let mut residuals = logits.mapv_into(|logit| 1.0 / (logit.neg().exp() + 1.0));
		izip!(residuals.view_mut(), targets).for_each(|(residual, target)| *residual -= target);
		let weight_gradients = features.t().dot(&residuals) / targets.len().to_f64().unwrap();
		let bias_gradient = residuals.mean().unwrap_or(0.0);
		(loss, weight_gradients, bias_gradient)
	}

	/// The probability of label 1 for each row of `features`.
	pub fn predict_probabilities(&self, features: ArrayView2<f64>) -> Array1<f64> {
		let logits = features.dot(&self.weights) + self.bias;
		logits.mapv_into(|logit| 1.0 / (logit.neg().exp() + 1.0))
	}

	/// The SHAP values, in logit space, of each row of `features`.
	pub fn compute_shap_values(&self, features: ArrayView2<f64>) -> Array2<f64> {
		let mut shap_values = Array2::zeros(features.raw_dim());
		for (example, shap_values) in izip!(features.axis_iter(Axis(0)), shap_values.axis_iter_mut(Axis(0)))
		{
			shap::compute_shap(
				example,
				self.bias,
				self.weights.view(),
				&self.means,
				shap_values,
			);
		}
		shap_values
	}
}

/// Shrink `value` toward zero by `threshold`, stopping at zero.
fn soft_threshold(value: f64, threshold: f64) -> f64 {
	value.signum() * (value.abs() - threshold).max(0.0)
}

#[cfg(test)]
fn separable() -> (Array2<f64>, Array1<usize>) {
	let features = array![
		[0.0, 0.9],
		[0.1, 0.8],
		[0.2, 1.0],
		[0.3, 0.7],
		[0.7, 0.2],
		[0.8, 0.1],
		[0.9, 0.3],
		[1.0, 0.0],
	];
	let labels = array![0, 0, 0, 0, 1, 1, 1, 1];
	(features, labels)
}

#[test]
fn test_train_separates_classes() {
	let (features, labels) = separable();
	let options = TrainOptions {
		c: 10.0,
		..Default::default()
	};
	let model = BinaryClassifier::train(features.view(), labels.view(), &options).unwrap();
	let probabilities = model.predict_probabilities(features.view());
	assert!(probabilities.iter().take(4).all(|p| *p < 0.5));
	assert!(probabilities.iter().skip(4).all(|p| *p > 0.5));
	assert!(model.weights[0] > 0.0);
}

#[test]
fn test_small_c_zeroes_every_weight() {
	let n_rows = 100;
	let labels: Array1<usize> = (0..n_rows).map(|row| usize::from(row % 2 == 0)).collect();
	let features = Array2::from_shape_fn((n_rows, 3), |(row, column)| match column {
		0 => labels[row].to_f64().unwrap() * 0.6 + (row % 5).to_f64().unwrap() * 0.1,
		_ => ((row * (column + 3)) % 7).to_f64().unwrap() / 7.0,
	});
	let sparse = BinaryClassifier::train(
		features.view(),
		labels.view(),
		&TrainOptions {
			c: 0.01,
			..Default::default()
		},
	)
	.unwrap();
	assert!(sparse.weights.iter().all(|weight| *weight == 0.0));
	// The bias alone predicts the balanced base rate.
	assert!(sparse.bias.abs() < 1e-3);
	let dense = BinaryClassifier::train(
		features.view(),
		labels.view(),
		&TrainOptions {
			c: 10.0,
			..Default::default()
		},
	)
	.unwrap();
	assert!(dense.weights[0] > 1.0);
}

#[test]
fn test_shap_values_shape() {
	let (features, labels) = separable();
	let model = BinaryClassifier::train(features.view(), labels.view(), &TrainOptions::default())
		.unwrap();
	let shap_values = model.compute_shap_values(features.view());
	assert_eq!(shap_values.dim(), (8, 2));
	// Contributions are centered on the training means.
	for column in shap_values.axis_iter(Axis(1)) {
		assert!(column.sum().abs() < 1e-9);
	}
}

#[test]
fn test_single_class() {
	let (features, _) = separable();
	let labels = Array1::zeros(8);
	assert!(matches!(
		BinaryClassifier::train(features.view(), labels.view(), &TrainOptions::default()),
		Err(TrainError::SingleClass)
	));
}
