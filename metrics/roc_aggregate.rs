use crate::{auc, compute_roc_curve, interpolate_roc, MeanVariance, Metric, RocError};
use serde::{Deserialize, Serialize};

/// How fold ROC curves are combined into one summary curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RocAggregation {
	/// Average the per-fold interpolated true positive rates.
	#[default]
	Mean,
	/// Concatenate all labels and probabilities and compute a single curve.
	Pooled,
}

/// The ROC results of one cross validation fold.
#[derive(Debug, Clone)]
pub struct FoldRoc {
	/// The true positive rates interpolated onto the shared false positive rate grid.
	pub true_positive_rates: Vec<f64>,
	pub auc: f64,
	/// The positive class probabilities for the test rows of the fold.
	pub probabilities: Vec<f64>,
	pub labels: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RocSummary {
	pub false_positive_rates: Vec<f64>,
	pub true_positive_rates: Vec<f64>,
	pub auc_mean: f64,
	/// The population standard deviation of the per-fold AUCs.
	pub auc_std: f64,
}

impl RocSummary {
	fn undefined(grid: &[f64]) -> RocSummary {
		RocSummary {
			false_positive_rates: grid.to_owned(),
			true_positive_rates: vec![f64::NAN; grid.len()],
			auc_mean: f64::NAN,
			auc_std: f64::NAN,
		}
	}
}

/**
Combine the ROC curves of many folds, possibly from many runs, into one curve on `grid`.

With [`RocAggregation::Mean`] the summary curve is the mean of the fold curves and `auc_mean` is the mean of the fold AUCs. With [`RocAggregation::Pooled`] the curve and `auc_mean` come from one ROC curve over the concatenated fold predictions. In both cases the last true positive rate is 1.0 and `auc_std` measures the spread of the fold AUCs.

Folds whose test labels hold a single class carry a NaN AUC. They are left out of the mean curve and of the AUC statistics. If no fold has a defined AUC the summary is all NaN.
*/
pub fn aggregate_roc(
	folds: &[FoldRoc],
	grid: &[f64],
	aggregation: RocAggregation,
) -> Result<RocSummary, RocError> {
	if folds.is_empty() {
		return Err(RocError::NoFolds);
	}
	let defined: Vec<&FoldRoc> = folds.iter().filter(|fold| fold.auc.is_finite()).collect();
	let aucs: Vec<f64> = defined.iter().map(|fold| fold.auc).collect();
	let auc_stats = match MeanVariance::compute(&aucs) {
		Some(auc_stats) => auc_stats,
		None => return Ok(RocSummary::undefined(grid)),
	};
	let (mut true_positive_rates, auc_mean) = match aggregation {
		RocAggregation::Mean => {
			let mut sums = vec![0.0; grid.len()];
			for fold in defined.iter() {
				if fold.true_positive_rates.len() != grid.len() {
					return Err(RocError::GridMismatch {
						expected: grid.len(),
						actual: fold.true_positive_rates.len(),
					});
				}
				for (sum, tpr) in sums.iter_mut().zip(fold.true_positive_rates.iter()) {
					*sum += tpr;
				}
			}
			let n_folds = defined.len() as f64;
			let means = sums.into_iter().map(|sum| sum / n_folds).collect();
			(means, auc_stats.mean)
		}
		RocAggregation::Pooled => {
			let probabilities: Vec<f64> = folds
				.iter()
				.flat_map(|fold| fold.probabilities.iter().copied())
				.collect();
			let labels: Vec<usize> = folds
				.iter()
				.flat_map(|fold| fold.labels.iter().copied())
				.collect();
			match compute_roc_curve(&probabilities, &labels) {
				Ok(roc_curve) => (interpolate_roc(&roc_curve, grid), auc(&roc_curve)),
				Err(RocError::SingleClass) => return Ok(RocSummary::undefined(grid)),
				Err(error) => return Err(error),
			}
		}
	};
	if let Some(last) = true_positive_rates.last_mut() {
		*last = 1.0;
	}
	Ok(RocSummary {
		false_positive_rates: grid.to_owned(),
		true_positive_rates,
		auc_mean,
		auc_std: auc_stats.std(),
	})
}

#[cfg(test)]
fn fold(probabilities: &[f64], labels: &[usize], grid: &[f64]) -> FoldRoc {
	let roc_curve = compute_roc_curve(probabilities, labels).unwrap();
	FoldRoc {
		true_positive_rates: interpolate_roc(&roc_curve, grid),
		auc: auc(&roc_curve),
		probabilities: probabilities.to_owned(),
		labels: labels.to_owned(),
	}
}

#[test]
fn test_mean_forces_last_point() {
	let grid = crate::fpr_grid(5);
	let folds = vec![
		FoldRoc {
			true_positive_rates: vec![0.0, 0.2, 0.4, 0.6, 0.8],
			auc: 0.6,
			probabilities: vec![],
			labels: vec![],
		},
		FoldRoc {
			true_positive_rates: vec![0.0, 0.4, 0.6, 0.8, 0.9],
			auc: 0.8,
			probabilities: vec![],
			labels: vec![],
		},
	];
	let summary = aggregate_roc(&folds, &grid, RocAggregation::Mean).unwrap();
	assert_eq!(*summary.true_positive_rates.last().unwrap(), 1.0);
	assert!((summary.true_positive_rates[1] - 0.3).abs() < 1e-12);
	assert!((summary.auc_mean - 0.7).abs() < 1e-12);
	assert!((summary.auc_std - 0.1).abs() < 1e-12);
	assert_eq!(summary.false_positive_rates, grid);
}

#[test]
fn test_pooled_uses_all_predictions() {
	let grid = crate::fpr_grid(crate::N_FPR_GRID_POINTS);
	let folds = vec![
		fold(&[0.9, 0.8, 0.3, 0.1], &[1, 1, 0, 0], &grid),
		fold(&[0.7, 0.6, 0.4, 0.2], &[1, 0, 1, 0], &grid),
	];
	let summary = aggregate_roc(&folds, &grid, RocAggregation::Pooled).unwrap();
	let pooled = crate::auc_roc(
		&[0.9, 0.8, 0.3, 0.1, 0.7, 0.6, 0.4, 0.2],
		&[1, 1, 0, 0, 1, 0, 1, 0],
	)
	.unwrap();
	assert!((summary.auc_mean - pooled).abs() < 1e-12);
	assert_eq!(summary.true_positive_rates.len(), 100);
	assert_eq!(summary.true_positive_rates[0], 0.0);
	assert_eq!(summary.true_positive_rates[99], 1.0);
	// The spread still comes from the individual folds, 1.0 and 0.75.
	assert!((summary.auc_std - 0.125).abs() < 1e-12);
}

#[test]
fn test_no_folds() {
	let grid = crate::fpr_grid(3);
	assert_eq!(
		aggregate_roc(&[], &grid, RocAggregation::Mean),
		Err(RocError::NoFolds)
	);
}

#[test]
fn test_single_class_folds_are_skipped() {
	let grid = crate::fpr_grid(crate::N_FPR_GRID_POINTS);
	let undefined = FoldRoc {
		true_positive_rates: vec![f64::NAN; grid.len()],
		auc: f64::NAN,
		probabilities: vec![0.4, 0.3],
		labels: vec![0, 0],
	};
	let folds = vec![
		fold(&[0.9, 0.8, 0.3, 0.1], &[1, 1, 0, 0], &grid),
		undefined.clone(),
		fold(&[0.7, 0.6, 0.4, 0.2], &[1, 0, 1, 0], &grid),
	];
	let summary = aggregate_roc(&folds, &grid, RocAggregation::Mean).unwrap();
	assert!((summary.auc_mean - 0.875).abs() < 1e-12);
	assert!((summary.auc_std - 0.125).abs() < 1e-12);
	assert!(summary.true_positive_rates.iter().all(|tpr| tpr.is_finite()));
	let pooled = aggregate_roc(&folds, &grid, RocAggregation::Pooled).unwrap();
	assert!(pooled.auc_mean.is_finite());
	assert!((pooled.auc_std - 0.125).abs() < 1e-12);
	let summary = aggregate_roc(&[undefined], &grid, RocAggregation::Mean).unwrap();
	assert!(summary.auc_mean.is_nan());
	assert!(summary.true_positive_rates.iter().all(|tpr| tpr.is_nan()));
	assert_eq!(summary.false_positive_rates, grid);
}
