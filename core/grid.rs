use crate::{
	model::{FamilySpec, Model, ModelOptions},
	split::{FoldSplit, StratifiedGroupKFold},
	Error,
};
use itertools::iproduct;
use lagsweep_kernel::SvmTrainOptions;
use lagsweep_metrics::{auc_roc, Mean, StreamingMetric};
use lagsweep_tree::{BoostingTrainOptions, ForestTrainOptions};
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rayon::prelude::*;
use tracing::debug;

/// The number of folds of the inner cross validation scoring each grid point.
pub const N_INNER_FOLDS: usize = 5;

/// The score maximized by the grid search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scoring {
	/// The recall of the positive class.
	Recall,
	AucRoc,
}

#[derive(Debug, Clone)]
pub struct GridSearchOptions {
	pub scoring: Scoring,
	/// Caps the family's number of threads.
	pub n_jobs: Option<usize>,
	/// Seeds the inner split.
	pub seed: u64,
}

#[derive(Debug)]
pub struct GridSearchOutput {
	pub options: ModelOptions,
	/// The best grid point refit on the whole partition.
	pub model: Model,
	pub score: f64,
}

/// `n` values evenly spaced in log space from `10^start` to `10^stop`.
pub fn logspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
	let step = if n > 1 {
		(stop - start) / (n - 1).to_f64().unwrap()
	} else {
		0.0
	};
	(0..n)
		.map(|i| 10f64.powf(start + step * i.to_f64().unwrap()))
		.collect()
}

pub fn logistic_regression_grid(_seed: u64) -> Vec<ModelOptions> {
	iproduct!(logspace(-4.0, 4.0, 20), [3000, 6000, 9000].iter())
		.map(|(c, max_iterations)| {
			ModelOptions::LogisticR(lagsweep_linear::TrainOptions {
				c,
				max_iterations: *max_iterations,
			})
		})
		.collect()
}

pub fn random_forest_grid(seed: u64) -> Vec<ModelOptions> {
	iproduct!([50, 100, 250, 500].iter(), [1].iter(), [1, 2, 3].iter())
		.map(|(n_trees, max_depth, min_samples_leaf)| {
			ModelOptions::RF(ForestTrainOptions {
				n_trees: *n_trees,
				max_depth: Some(*max_depth),
				min_samples_leaf: *min_samples_leaf,
				compute_oob_score: true,
				seed,
			})
		})
		.collect()
}

pub fn boosting_grid(_seed: u64) -> Vec<ModelOptions> {
	iproduct!(
		[50, 100, 250, 500].iter(),
		[1].iter(),
		[1.0, 3.0].iter(),
		[0.01, 0.1, 0.3].iter()
	)
	.map(|(n_trees, max_depth, min_child_weight, learning_rate)| {
		ModelOptions::XGB(BoostingTrainOptions {
			n_trees: *n_trees,
			max_depth: *max_depth,
			min_child_weight: *min_child_weight,
			learning_rate: *learning_rate,
		})
	})
	.collect()
}

pub fn svm_grid(_seed: u64) -> Vec<ModelOptions> {
	iproduct!([1.0, 10.0, 100.0].iter(), [1.0, 0.1, 0.01, 0.001].iter())
		.map(|(c, gamma)| {
			ModelOptions::SVM(SvmTrainOptions {
				c: *c,
				gamma: Some(*gamma),
			})
		})
		.collect()
}

/**
Score every point of the family's grid with a group stratified cross validation of `features` and refit the best one on all of `features`.

Points are scored in parallel. A point whose score is not finite, because an inner fold failed to train or had a single class, is never chosen. Among the rest, the first point in grid order with the highest score wins.
*/
pub fn grid_search(
	spec: &FamilySpec,
	features: ArrayView2<f64>,
	labels: ArrayView1<usize>,
	groups: &[usize],
	options: &GridSearchOptions,
) -> Result<GridSearchOutput, Error> {
	let labels_vec = labels.to_vec();
	let splits = StratifiedGroupKFold::new(N_INNER_FOLDS, options.seed).split(&labels_vec, groups)?;
	let grid = (spec.grid)(options.seed);
	let n_threads = match (spec.n_jobs, options.n_jobs) {
		(Some(family), Some(cap)) => family.min(cap),
		(Some(n_jobs), None) | (None, Some(n_jobs)) => n_jobs,
		// Zero lets rayon use every core.
		(None, None) => 0,
	};
	let pool = rayon::ThreadPoolBuilder::new()
		.num_threads(n_threads)
		.build()
		.map_err(|error| Error::ThreadPool(error.to_string()))?;
	let scores: Vec<f64> = pool.install(|| {
		grid.par_iter()
			.map(|grid_point| {
				let mut mean = Mean::default();
				for split in splits.iter() {
					mean.update(score_split(
						grid_point,
						features,
						labels,
						split,
						options.scoring,
					));
				}
				let score = mean.finalize().unwrap_or(f64::NAN);
				debug!(?grid_point, score, "scored grid point");
				score
			})
			.collect()
	});
	let mut best: Option<(usize, f64)> = None;
	for (index, score) in scores.iter().enumerate() {
		if !score.is_finite() {
			continue;
		}
		match best {
			Some((_, best_score)) if *score <= best_score => {}
			_ => best = Some((index, *score)),
		}
	}
	let (best_index, score) = best.ok_or(Error::NoFiniteScore)?;
	let options = grid[best_index].clone();
	let model = options.train(features, labels)?;
	Ok(GridSearchOutput {
		options,
		model,
		score,
	})
}

fn score_split(
	grid_point: &ModelOptions,
	features: ArrayView2<f64>,
	labels: ArrayView1<usize>,
	split: &FoldSplit,
	scoring: Scoring,
) -> f64 {
	let features_train = features.select(Axis(0), &split.train);
	let labels_train = labels.select(Axis(0), &split.train);
	let features_test = features.select(Axis(0), &split.test);
	let labels_test = labels.select(Axis(0), &split.test);
	let model = match grid_point.train(features_train.view(), labels_train.view()) {
		Ok(model) => model,
		Err(error) => {
			debug!(%error, "failed to train grid point");
			return f64::NAN;
		}
	};
	match scoring {
		Scoring::Recall => {
			let predictions = model.predict(features_test.view());
			let n_positives = labels_test.iter().filter(|label| **label == 1).count();
			let n_true_positives = predictions
				.iter()
				.zip(labels_test.iter())
				.filter(|(prediction, label)| **prediction == 1 && **label == 1)
				.count();
			if n_positives == 0 {
				0.0
			} else {
				n_true_positives.to_f64().unwrap() / n_positives.to_f64().unwrap()
			}
		}
		Scoring::AucRoc => {
			let probabilities = model.predict_probabilities(features_test.view());
			auc_roc(&probabilities.to_vec(), &labels_test.to_vec()).unwrap_or(f64::NAN)
		}
	}
}

#[test]
fn test_logspace() {
	let values = logspace(-4.0, 4.0, 20);
	assert_eq!(values.len(), 20);
	assert!((values[0] - 1e-4).abs() < 1e-12);
	assert!((values[19] - 1e4).abs() < 1e-6);
}

#[test]
fn test_grid_sizes() {
	assert_eq!(logistic_regression_grid(0).len(), 60);
	assert_eq!(random_forest_grid(0).len(), 12);
	assert_eq!(boosting_grid(0).len(), 24);
	assert_eq!(svm_grid(0).len(), 12);
}

#[test]
fn test_grid_search_picks_the_better_point() {
	use crate::model::Family;
	fn factory(_seed: u64) -> ModelOptions {
		ModelOptions::LogisticR(Default::default())
	}
	// Heavy regularization leaves only the intercept, which predicts the majority class for every row.
	fn grid(_seed: u64) -> Vec<ModelOptions> {
		vec![
			ModelOptions::LogisticR(lagsweep_linear::TrainOptions {
				c: 1e-6,
				max_iterations: 100,
			}),
			ModelOptions::LogisticR(lagsweep_linear::TrainOptions {
				c: 100.0,
				max_iterations: 100,
			}),
		]
	}
	let spec = FamilySpec {
		family: Family::LogisticR,
		factory,
		grid,
		n_jobs: Some(2),
	};
	let n_rows = 40;
	let groups: Vec<usize> = (0..n_rows).map(|row| row / 4).collect();
	let labels: Array1<usize> = (0..n_rows).map(|row| usize::from(row % 4 == 0)).collect();
	let features: Array2<f64> = Array2::from_shape_fn((n_rows, 2), |(row, column)| {
		let offset = (row % 7).to_f64().unwrap() * 0.01;
		if labels[row] == 1 {
			0.8 + offset + column.to_f64().unwrap() * 0.01
		} else {
			0.2 - offset + column.to_f64().unwrap() * 0.01
		}
	});
	let output = grid_search(
		&spec,
		features.view(),
		labels.view(),
		&groups,
		&GridSearchOptions {
			scoring: Scoring::Recall,
			n_jobs: None,
			seed: 0,
		},
	)
	.unwrap();
	assert_eq!(
		output.options,
		ModelOptions::LogisticR(lagsweep_linear::TrainOptions {
			c: 100.0,
			max_iterations: 100,
		})
	);
	assert!(output.score > 0.9);
}
