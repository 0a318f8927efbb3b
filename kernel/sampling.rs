use crate::{Background, ExplainError};
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rand::{distributions::WeightedIndex, prelude::*};
use rand_xoshiro::Xoshiro256Plus;

/**
A `SamplingExplainer` estimates the SHAP values of any model from its predictions alone.

For each example, `n_samples` times, a background point and an ordering of the features are drawn at random. Starting from the background point, the example's features are switched in one at a time in that order, and each feature is credited with the change in the model output its switch caused. The credits are averaged over the samples. For every sample the credits sum to the difference between the output for the example and the output for the background point, so the estimates add up to the example's output minus the average background output.
*/
#[derive(Debug, Clone)]
pub struct SamplingExplainer<'a> {
	pub background: &'a Background,
	pub n_samples: usize,
	pub seed: u64,
}

impl<'a> SamplingExplainer<'a> {
	/// Compute one row of SHAP values per row of `features`. `predict` maps a matrix of examples to one output per example.
	pub fn explain(
		&self,
		features: ArrayView2<f64>,
		predict: &dyn Fn(ArrayView2<f64>) -> Array1<f64>,
	) -> Result<Array2<f64>, ExplainError> {
		let n_features = features.ncols();
		if self.background.points.nrows() == 0 {
			return Err(ExplainError::EmptyBackground);
		}
		if self.background.points.ncols() != n_features {
			return Err(ExplainError::FeatureCount {
				expected: self.background.points.ncols(),
				actual: n_features,
			});
		}
		let background_index = WeightedIndex::new(self.background.weights.iter())
			.map_err(|_| ExplainError::EmptyBackground)?;
		let mut rng = Xoshiro256Plus::seed_from_u64(self.seed);
		let n_samples = self.n_samples.max(1);
		let mut shap_values = Array2::zeros(features.raw_dim());
		let mut order: Vec<usize> = (0..n_features).collect();
		for (example, mut shap_values) in features
			.axis_iter(Axis(0))
			.zip(shap_values.axis_iter_mut(Axis(0)))
		{
			// Build every hybrid row for this example so the model is evaluated once per example.
			let mut hybrids = Array2::zeros((n_samples * (n_features + 1), n_features));
			let mut orders = Vec::with_capacity(n_samples);
			for sample in 0..n_samples {
				order.shuffle(&mut rng);
				let background = self.background.points.row(background_index.sample(&mut rng));
				let offset = sample * (n_features + 1);
				let mut hybrid = background.to_owned();
				hybrids.row_mut(offset).assign(&hybrid);
				for (step, feature_index) in order.iter().enumerate() {
					hybrid[*feature_index] = example[*feature_index];
					hybrids.row_mut(offset + step + 1).assign(&hybrid);
				}
				orders.push(order.clone());
			}
			let outputs = predict(hybrids.view());
			for (sample, order) in orders.iter().enumerate() {
				let offset = sample * (n_features + 1);
				for (step, feature_index) in order.iter().enumerate() {
					shap_values[*feature_index] += outputs[offset + step + 1] - outputs[offset + step];
				}
			}
			shap_values.mapv_inplace(|value| value / n_samples.to_f64().unwrap());
		}
		Ok(shap_values)
	}
}

#[test]
fn test_linear_model_credits() {
	let background = Background {
		points: array![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]],
		weights: array![0.5, 0.5],
	};
	let explainer = SamplingExplainer {
		background: &background,
		n_samples: 8,
		seed: 0,
	};
	let weights = array![1.0, -2.0, 0.5];
	let predict = |features: ArrayView2<f64>| features.dot(&weights);
	let features = array![[2.0, 1.0, 4.0]];
	let shap_values = explainer.explain(features.view(), &predict).unwrap();
	assert_eq!(shap_values.dim(), (1, 3));
	// For a linear model each credit is the weight times the distance from the sampled background point.
	assert!(shap_values[[0, 0]] >= 1.0 - 1e-9 && shap_values[[0, 0]] <= 2.0 + 1e-9);
	assert!(shap_values[[0, 1]] >= -2.0 - 1e-9 && shap_values[[0, 1]] <= 1e-9);
	// The output is 2 and the background outputs are 0 and -0.5.
	let sum = shap_values.sum();
	assert!(sum >= 2.0 - 1e-9 && sum <= 2.5 + 1e-9);
}

#[test]
fn test_rejects_mismatched_features() {
	let background = Background {
		points: array![[0.0, 0.0]],
		weights: array![1.0],
	};
	let explainer = SamplingExplainer {
		background: &background,
		n_samples: 4,
		seed: 0,
	};
	let predict = |features: ArrayView2<f64>| features.column(0).to_owned();
	assert_eq!(
		explainer.explain(array![[1.0]].view(), &predict).unwrap_err(),
		ExplainError::FeatureCount {
			expected: 2,
			actual: 1
		}
	);
}

#[test]
fn test_single_background_point_is_additive() {
	let background = Background {
		points: array![[0.0, 0.0]],
		weights: array![1.0],
	};
	let explainer = SamplingExplainer {
		background: &background,
		n_samples: 16,
		seed: 5,
	};
	// An interaction between the features is split between them but the total is exact.
	let predict = |features: ArrayView2<f64>| {
		features
			.axis_iter(Axis(0))
			.map(|row| row[0] * row[1] + row[0])
			.collect::<Array1<f64>>()
	};
	let shap_values = explainer.explain(array![[2.0, 3.0]].view(), &predict).unwrap();
	assert!((shap_values.sum() - 8.0).abs() < 1e-12);
	assert!(shap_values[[0, 0]] >= 2.0 && shap_values[[0, 0]] <= 8.0);
}
