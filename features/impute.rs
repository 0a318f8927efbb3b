use itertools::izip;
use linfa::prelude::*;
use linfa_elasticnet::ElasticNet;
use ndarray::prelude::*;
use num_traits::ToPrimitive;

#[derive(Debug, thiserror::Error)]
pub enum ImputeError {
	#[error("the imputer was fit on {expected} features but was given {actual}")]
	FeatureCount { expected: usize, actual: usize },
	#[error("failed to fit the regression imputing feature {feature_index}: {message}")]
	Regression {
		feature_index: usize,
		message: String,
	},
}

#[derive(Debug, Clone)]
pub struct IterativeImputerOptions {
	/// The maximum number of round robin passes over the features with missing values.
	pub max_iter: usize,
	/// Stop when the largest change of an imputed value is below this fraction of the largest observed magnitude.
	pub tolerance: f64,
	/// The ridge penalty of each per-feature regression.
	pub penalty: f64,
	/// The indices of the nominal features. Their imputed values are rounded to the nearest category observed in the train partition.
	pub nominal_features: Vec<usize>,
}

impl Default for IterativeImputerOptions {
	fn default() -> Self {
		Self {
			max_iter: 10,
			tolerance: 1e-3,
			penalty: 0.01,
			nominal_features: Vec::new(),
		}
	}
}

/**
An `IterativeImputer` fills missing values by modeling each feature with missing values as a function of the other features.

Missing values start at the column mean of the train partition. Then, in round robin order from the feature with the fewest missing values to the one with the most, a ridge regression is fit on the rows where the feature is observed and used to predict the rows where it is missing. The passes repeat until the imputed values stop changing or `max_iter` passes have run.

Every fitted regression is kept so that [`transform`](#method.transform) can replay the same sequence on a test partition without refitting. A feature with no missing values in the train partition has no regression, so its missing test values keep the train mean.

Imputed values of nominal features are finally rounded to the nearest category observed in the train partition, so they never take a value between two categories.
*/
#[derive(Debug, Clone)]
pub struct IterativeImputer {
	pub means: Vec<f64>,
	steps: Vec<ImputationStep>,
	/// The sorted distinct train values of each nominal feature.
	categories: Vec<(usize, Vec<f64>)>,
}

#[derive(Debug, Clone)]
struct ImputationStep {
	feature_index: usize,
	weights: Array1<f64>,
	intercept: f64,
}

impl ImputationStep {
	fn apply(&self, mut features: ArrayViewMut2<f64>, missing: ArrayView2<bool>) {
		let predictors = other_columns(features.view(), self.feature_index);
		let predictions = predictors.dot(&self.weights) + self.intercept;
		for (value, is_missing, prediction) in izip!(
			features.column_mut(self.feature_index),
			missing.column(self.feature_index),
			predictions.iter(),
		) {
			if *is_missing {
				*value = *prediction;
			}
		}
	}
}

impl IterativeImputer {
	pub fn fit_transform(
		features: ArrayView2<f64>,
		options: &IterativeImputerOptions,
	) -> Result<(IterativeImputer, Array2<f64>), ImputeError> {
		let missing = features.mapv(f64::is_nan);
		let means = column_means(features);
		let mut imputed = fill(features, &means);
		let mut steps = Vec::new();
		let n_missing: Vec<usize> = missing
			.axis_iter(Axis(1))
			.map(|column| column.iter().filter(|is_missing| **is_missing).count())
			.collect();
		let mut order: Vec<usize> = (0..features.ncols())
			.filter(|feature_index| n_missing[*feature_index] > 0)
			.collect();
		order.sort_by_key(|feature_index| n_missing[*feature_index]);
		let largest_observed = features
			.iter()
			.filter(|value| !value.is_nan())
			.fold(0.0f64, |max, value| max.max(value.abs()));
		let tolerance = options.tolerance * largest_observed;
		if features.ncols() < 2 {
			order.clear();
		}
		for _ in 0..options.max_iter {
			if order.is_empty() {
				break;
			}
			let previous = imputed.clone();
			for feature_index in order.iter().copied() {
				let observed_rows: Vec<usize> = missing
					.column(feature_index)
					.iter()
					.enumerate()
					.filter(|(_, is_missing)| !**is_missing)
					.map(|(row, _)| row)
					.collect();
				if observed_rows.len() < 2 {
					continue;
				}
				let records = other_columns(imputed.view(), feature_index).select(Axis(0), &observed_rows);
				let targets = imputed.column(feature_index).select(Axis(0), &observed_rows);
				let model = ElasticNet::params()
					.penalty(options.penalty)
					.l1_ratio(0.0)
					.fit(&Dataset::new(records, targets))
					.map_err(|error| ImputeError::Regression {
						feature_index,
						message: error.to_string(),
					})?;
				let step = ImputationStep {
					feature_index,
					weights: model.hyperplane().to_owned(),
					intercept: model.intercept(),
				};
				step.apply(imputed.view_mut(), missing.view());
				steps.push(step);
			}
			let change = izip!(imputed.iter(), previous.iter())
				.fold(0.0f64, |max, (a, b)| max.max((a - b).abs()));
			if change < tolerance {
				break;
			}
		}
		let categories = observed_categories(features, &options.nominal_features);
		snap_to_categories(imputed.view_mut(), missing.view(), &categories);
		Ok((
			IterativeImputer {
				means,
				steps,
				categories,
			},
			imputed,
		))
	}

	pub fn transform(&self, features: ArrayView2<f64>) -> Result<Array2<f64>, ImputeError> {
		if features.ncols() != self.means.len() {
			return Err(ImputeError::FeatureCount {
				expected: self.means.len(),
				actual: features.ncols(),
			});
		}
		let missing = features.mapv(f64::is_nan);
		let mut imputed = fill(features, &self.means);
		for step in self.steps.iter() {
			step.apply(imputed.view_mut(), missing.view());
		}
		snap_to_categories(imputed.view_mut(), missing.view(), &self.categories);
		Ok(imputed)
	}
}

fn observed_categories(features: ArrayView2<f64>, nominal_features: &[usize]) -> Vec<(usize, Vec<f64>)> {
	nominal_features
		.iter()
		.filter(|feature_index| **feature_index < features.ncols())
		.map(|feature_index| {
			let mut categories: Vec<f64> = features
				.column(*feature_index)
				.iter()
				.copied()
				.filter(|value| !value.is_nan())
				.collect();
			categories.sort_by(f64::total_cmp);
			categories.dedup();
			(*feature_index, categories)
		})
		.collect()
}

/// Replace each imputed value of a nominal feature with the closest observed category. Ties go to the smaller category.
fn snap_to_categories(
	mut features: ArrayViewMut2<f64>,
	missing: ArrayView2<bool>,
	categories: &[(usize, Vec<f64>)],
) {
	for (feature_index, categories) in categories {
		if categories.is_empty() {
			continue;
		}
		for (value, is_missing) in izip!(
			features.column_mut(*feature_index),
			missing.column(*feature_index)
		) {
			if !*is_missing {
				continue;
			}
			let mut closest = categories[0];
			for category in categories.iter().skip(1) {
				if (category - *value).abs() < (closest - *value).abs() {
					closest = *category;
				}
			}
			*value = closest;
		}
	}
}

/// Column means ignoring NaN. A column with no observed values has mean 0.
fn column_means(features: ArrayView2<f64>) -> Vec<f64> {
	features
		.axis_iter(Axis(1))
		.map(|column| {
			let (sum, count) = column
				.iter()
				.filter(|value| !value.is_nan())
				.fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
			if count == 0 {
				0.0
			} else {
				sum / count.to_f64().unwrap()
			}
		})
		.collect()
}

fn fill(features: ArrayView2<f64>, means: &[f64]) -> Array2<f64> {
	let mut filled = features.to_owned();
	for (mut column, mean) in izip!(filled.axis_iter_mut(Axis(1)), means) {
		column.mapv_inplace(|value| if value.is_nan() { *mean } else { value });
	}
	filled
}

fn other_columns(features: ArrayView2<f64>, feature_index: usize) -> Array2<f64> {
	let indices: Vec<usize> = (0..features.ncols())
		.filter(|index| *index != feature_index)
		.collect();
	features.select(Axis(1), &indices)
}

#[test]
fn test_imputes_from_correlated_feature() {
	let nan = f64::NAN;
	let train = array![
		[1.0, 2.0],
		[2.0, 4.0],
		[3.0, 6.0],
		[4.0, 8.0],
		[5.0, nan],
		[6.0, 12.0],
	];
	let (imputer, imputed) =
		IterativeImputer::fit_transform(train.view(), &IterativeImputerOptions::default()).unwrap();
	assert!(imputed.iter().all(|value| value.is_finite()));
	// The observed values are untouched and the missing one follows the linear trend far more closely than the mean of 6.4 does.
	assert_eq!(imputed[[3, 1]], 8.0);
	assert!((imputed[[4, 1]] - 10.0).abs() < 1.0);
	let test = array![[nan, 4.0], [7.0, nan]];
	let imputed = imputer.transform(test.view()).unwrap();
	assert_eq!(imputed[[0, 0]], 3.5);
	assert!((imputed[[1, 1]] - 14.0).abs() < 1.5);
}

#[test]
fn test_without_missing_values() {
	let train = array![[1.0, 2.0], [3.0, 4.0]];
	let (imputer, imputed) =
		IterativeImputer::fit_transform(train.view(), &IterativeImputerOptions::default()).unwrap();
	assert_eq!(imputed, train);
	let test = array![[f64::NAN, f64::NAN]];
	assert_eq!(imputer.transform(test.view()).unwrap(), array![[2.0, 3.0]]);
	assert!(matches!(
		imputer.transform(array![[1.0]].view()),
		Err(ImputeError::FeatureCount { .. })
	));
}

#[test]
fn test_nominal_features_take_observed_categories() {
	let nan = f64::NAN;
	// The site column only ever holds 0, 1 or 4.
	let train = array![
		[1.0, 0.0],
		[2.0, 0.0],
		[3.0, 1.0],
		[4.0, 4.0],
		[5.0, nan],
		[6.0, 4.0],
	];
	let options = IterativeImputerOptions {
		nominal_features: vec![1],
		..Default::default()
	};
	let (imputer, imputed) = IterativeImputer::fit_transform(train.view(), &options).unwrap();
	assert!([0.0, 1.0, 4.0].contains(&imputed[[4, 1]]));
	let imputed = imputer.transform(array![[2.5, nan]].view()).unwrap();
	assert!([0.0, 1.0, 4.0].contains(&imputed[[0, 1]]));
	// Here the site column is complete in the train partition, so a missing test value falls back to the train mean of 1.8 and rounds to 1.
	let train = array![[1.0, 0.0], [2.0, 0.0], [3.0, 1.0], [nan, 4.0], [6.0, 4.0]];
	let (imputer, _) = IterativeImputer::fit_transform(train.view(), &options).unwrap();
	let imputed = imputer.transform(array![[2.0, nan]].view()).unwrap();
	assert_eq!(imputed[[0, 1]], 1.0);
}

#[test]
fn test_train_complete_feature_uses_the_mean() {
	let nan = f64::NAN;
	let train = array![[1.0, 2.0, 0.5], [2.0, 4.0, 0.5], [3.0, nan, 0.5], [4.0, 8.0, 0.5]];
	let (imputer, _) =
		IterativeImputer::fit_transform(train.view(), &IterativeImputerOptions::default()).unwrap();
	let test = array![[nan, 6.0, nan]];
	let imputed = imputer.transform(test.view()).unwrap();
	assert_eq!(imputed[[0, 0]], 2.5);
	assert_eq!(imputed[[0, 2]], 0.5);
}
