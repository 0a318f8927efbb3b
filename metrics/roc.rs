use num_traits::ToPrimitive;

/// The number of points in the false positive rate grid that fold ROC curves are interpolated onto.
pub const N_FPR_GRID_POINTS: usize = 100;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RocError {
	#[error("{n_probabilities} probabilities were given for {n_labels} labels")]
	LengthMismatch {
		n_probabilities: usize,
		n_labels: usize,
	},
	#[error("the ROC curve is undefined when the labels contain only one class")]
	SingleClass,
	#[error("at least one fold is required to aggregate ROC curves")]
	NoFolds,
	#[error("a fold curve has {actual} points but the grid has {expected}")]
	GridMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RocCurvePoint {
	/// The classification threshold.
	pub threshold: f64,
	/// The true positive rate for all predictions with probability >= threshold.
	pub true_positive_rate: f64,
	/// The false positive rate for all predictions with probability >= threshold.
	pub false_positive_rate: f64,
}

/// `n_points` evenly spaced false positive rates from 0 to 1 inclusive.
pub fn fpr_grid(n_points: usize) -> Vec<f64> {
	match n_points {
		0 => Vec::new(),
		1 => vec![0.0],
		_ => {
			let step = 1.0 / (n_points - 1).to_f64().unwrap();
			(0..n_points)
				.map(|i| if i == n_points - 1 { 1.0 } else { i.to_f64().unwrap() * step })
				.collect()
		}
	}
}

/**
This function computes the ROC curve from positive class probabilities and 0/1 labels. The curve starts at (0, 0) with an infinite threshold and adds one point per distinct probability, in order of decreasing threshold.
*/
pub fn compute_roc_curve(
	probabilities: &[f64],
	labels: &[usize],
) -> Result<Vec<RocCurvePoint>, RocError> {
	if probabilities.len() != labels.len() {
		return Err(RocError::LengthMismatch {
			n_probabilities: probabilities.len(),
			n_labels: labels.len(),
		});
	}
	let count_positives = labels.iter().filter(|label| **label == 1).count();
	let count_negatives = labels.len() - count_positives;
	if count_positives == 0 || count_negatives == 0 {
		return Err(RocError::SingleClass);
	}
	let mut tps_fps = compute_tps_fps_by_threshold(probabilities, labels);
	for i in 1..tps_fps.len() {
		tps_fps[i].true_positives += tps_fps[i - 1].true_positives;
		tps_fps[i].false_positives += tps_fps[i - 1].false_positives;
	}
	let count_positives = count_positives.to_f64().unwrap();
	let count_negatives = count_negatives.to_f64().unwrap();
	let mut roc_curve = vec![RocCurvePoint {
		threshold: f64::INFINITY,
		true_positive_rate: 0.0,
		false_positive_rate: 0.0,
	}];
	roc_curve.extend(tps_fps.iter().map(|point| RocCurvePoint {
		threshold: point.threshold,
		true_positive_rate: point.true_positives.to_f64().unwrap() / count_positives,
		false_positive_rate: point.false_positives.to_f64().unwrap() / count_negatives,
	}));
	Ok(roc_curve)
}

/// This function computes the area under a ROC curve using the trapezoid method.
pub fn auc(roc_curve: &[RocCurvePoint]) -> f64 {
	roc_curve
		.windows(2)
		.map(|window| {
			let (left, right) = (&window[0], &window[1]);
			let y_average = (left.true_positive_rate + right.true_positive_rate) / 2.0;
			let dx = right.false_positive_rate - left.false_positive_rate;
			y_average * dx
		})
		.sum()
}

/// This function computes the area under the receiver operating characteristic curve.
pub fn auc_roc(probabilities: &[f64], labels: &[usize]) -> Result<f64, RocError> {
	Ok(auc(&compute_roc_curve(probabilities, labels)?))
}

/**
Piecewise linear interpolation of the points (`xs`, `ys`) at `x`, where `xs` is non-decreasing. Values left of the first point take the first `y`, values right of the last point take the last `y`, and where `xs` repeats a value the last of the repeated points is used.
*/
pub fn interpolate(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
	let n = xs.len().min(ys.len());
	if n == 0 {
		return f64::NAN;
	}
	let j = xs[..n].partition_point(|value| *value <= x);
	if j == 0 {
		ys[0]
	} else if j == n {
		ys[n - 1]
	} else {
		let (x0, x1) = (xs[j - 1], xs[j]);
		let (y0, y1) = (ys[j - 1], ys[j]);
		y0 + (y1 - y0) * (x - x0) / (x1 - x0)
	}
}

/// Interpolate the true positive rates of `roc_curve` onto `grid`. The first point is pinned to a true positive rate of zero.
pub fn interpolate_roc(roc_curve: &[RocCurvePoint], grid: &[f64]) -> Vec<f64> {
	let xs: Vec<f64> = roc_curve.iter().map(|p| p.false_positive_rate).collect();
	let ys: Vec<f64> = roc_curve.iter().map(|p| p.true_positive_rate).collect();
	let mut true_positive_rates: Vec<f64> = grid.iter().map(|x| interpolate(*x, &xs, &ys)).collect();
	if let Some(first) = true_positive_rates.first_mut() {
		*first = 0.0;
	}
	true_positive_rates
}

#[derive(Debug)]
struct TpsFpsPoint {
	/// The classification threshold.
	threshold: f64,
	/// The true positives for this threshold.
	true_positives: usize,
	/// The false positives for this threshold.
	false_positives: usize,
}

/**
This function computes the counts of true positives and false positives at each classification threshold. Unlike the roc curve, each point contains just the count of true positives and false positives at this threshold instead of all values greater than or equal to this threshold.
*/
fn compute_tps_fps_by_threshold(probabilities: &[f64], labels: &[usize]) -> Vec<TpsFpsPoint> {
	let mut probabilities_labels: Vec<(f64, usize)> = probabilities
		.iter()
		.copied()
		.zip(labels.iter().copied())
		.collect();
	probabilities_labels.sort_by(|a, b| b.0.total_cmp(&a.0));
	let mut tps_fps: Vec<TpsFpsPoint> = Vec::new();
	for (probability, label) in probabilities_labels {
		let tp = usize::from(label == 1);
		match tps_fps.last_mut() {
			// If the probability is the same as the last one, add to the previous bucket.
			Some(last) if last.threshold == probability => {
				last.true_positives += tp;
				last.false_positives += 1 - tp;
			}
			_ => tps_fps.push(TpsFpsPoint {
				threshold: probability,
				true_positives: tp,
				false_positives: 1 - tp,
			}),
		}
	}
	tps_fps
}

#[test]
fn test_roc_curve() {
	let labels = vec![1, 1, 0, 0];
	let probabilities = vec![0.9, 0.4, 0.4, 0.2];
	let left = compute_roc_curve(&probabilities, &labels).unwrap();
	let right = vec![
		RocCurvePoint {
			threshold: f64::INFINITY,
			true_positive_rate: 0.0,
			false_positive_rate: 0.0,
		},
		RocCurvePoint {
			threshold: 0.9,
			true_positive_rate: 0.5,
			false_positive_rate: 0.0,
		},
		RocCurvePoint {
			threshold: 0.4,
			true_positive_rate: 1.0,
			false_positive_rate: 0.5,
		},
		RocCurvePoint {
			threshold: 0.2,
			true_positive_rate: 1.0,
			false_positive_rate: 1.0,
		},
	];
	assert_eq!(left, right);
	let auc = auc_roc(&probabilities, &labels).unwrap();
	assert!(f64::abs(auc - 0.875) < f64::EPSILON)
}

#[test]
fn test_single_class_is_an_error() {
	assert_eq!(
		compute_roc_curve(&[0.1, 0.7], &[1, 1]),
		Err(RocError::SingleClass)
	);
	assert_eq!(
		compute_roc_curve(&[0.1], &[1, 0]),
		Err(RocError::LengthMismatch {
			n_probabilities: 1,
			n_labels: 2
		})
	);
}

#[test]
fn test_fpr_grid() {
	let grid = fpr_grid(N_FPR_GRID_POINTS);
	assert_eq!(grid.len(), 100);
	assert_eq!(grid[0], 0.0);
	assert_eq!(grid[99], 1.0);
	assert!(grid.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_interpolate() {
	let xs = [0.0, 0.0, 0.5, 1.0];
	let ys = [0.0, 0.5, 1.0, 1.0];
	assert_eq!(interpolate(-1.0, &xs, &ys), 0.0);
	assert_eq!(interpolate(0.0, &xs, &ys), 0.5);
	assert!((interpolate(0.25, &xs, &ys) - 0.75).abs() < 1e-12);
	assert_eq!(interpolate(0.75, &xs, &ys), 1.0);
	assert_eq!(interpolate(2.0, &xs, &ys), 1.0);
}

#[test]
fn test_perfect_classifier_on_grid() {
	let probabilities = [0.9, 0.8, 0.7, 0.3, 0.2, 0.1];
	let labels = [1, 1, 1, 0, 0, 0];
	let roc_curve = compute_roc_curve(&probabilities, &labels).unwrap();
	assert!((auc(&roc_curve) - 1.0).abs() < 1e-12);
	let grid = fpr_grid(N_FPR_GRID_POINTS);
	let true_positive_rates = interpolate_roc(&roc_curve, &grid);
	assert_eq!(true_positive_rates[0], 0.0);
	assert!(true_positive_rates[1..].iter().all(|tpr| *tpr == 1.0));
	// Only the pinned origin keeps the area on the grid below one.
	let grid_auc: f64 = grid
		.windows(2)
		.zip(true_positive_rates.windows(2))
		.map(|(x, y)| (x[1] - x[0]) * (y[0] + y[1]) / 2.0)
		.sum();
	assert!((grid_auc - 1.0).abs() <= 1.0 / 99.0);
}
