use crate::ExplainError;
use itertools::izip;
use linfa::prelude::*;
use linfa_clustering::KMeans;
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

/// A weighted set of rows standing in for the training data when features are "removed" from an example.
#[derive(Debug, Clone, PartialEq)]
pub struct Background {
	pub points: Array2<f64>,
	/// The weight of each point. The weights sum to 1.
	pub weights: Array1<f64>,
}

/**
Summarize `features` with at most `k` weighted points.

When there are no more than `k` rows, every row is kept with equal weight. Otherwise the rows are clustered with k-means, each centroid is weighted by the fraction of rows in its cluster, and each centroid coordinate is replaced by the closest value observed in that column so that nominal columns keep valid values.
*/
pub fn kmeans_background(
	features: ArrayView2<f64>,
	k: usize,
	seed: u64,
) -> Result<Background, ExplainError> {
	let n_rows = features.nrows();
	if n_rows == 0 || k == 0 {
		return Err(ExplainError::EmptyBackground);
	}
	if n_rows <= k {
		let weight = 1.0 / n_rows.to_f64().unwrap();
		return Ok(Background {
			points: features.to_owned(),
			weights: Array1::from_elem(n_rows, weight),
		});
	}
	let rng = Xoshiro256Plus::seed_from_u64(seed);
	let observations = DatasetBase::from(features.to_owned());
	let model = KMeans::params_with_rng(k, rng)
		.max_n_iterations(300)
		.tolerance(1e-4)
		.fit(&observations)
		.map_err(|error| ExplainError::Clustering(error.to_string()))?;
	let memberships: Array1<usize> = model.predict(&features.to_owned());
	let mut counts = vec![0usize; k];
	for membership in memberships.iter() {
		counts[*membership] += 1;
	}
	let mut points = model.centroids().to_owned();
	for (mut point_column, column) in izip!(points.axis_iter_mut(Axis(1)), features.axis_iter(Axis(1)))
	{
		for value in point_column.iter_mut() {
			*value = closest(column, *value);
		}
	}
	// Empty clusters carry no weight and are dropped.
	let kept: Vec<usize> = (0..k).filter(|cluster| counts[*cluster] > 0).collect();
	let points = points.select(Axis(0), &kept);
	let weights = kept
		.iter()
		.map(|cluster| counts[*cluster].to_f64().unwrap() / n_rows.to_f64().unwrap())
		.collect();
	Ok(Background { points, weights })
}

fn closest(column: ArrayView1<f64>, value: f64) -> f64 {
	column
		.iter()
		.copied()
		.min_by(|a, b| (a - value).abs().total_cmp(&(b - value).abs()))
		.unwrap_or(value)
}

#[test]
fn test_small_input_is_kept() {
	let features = array![[0.0, 1.0], [1.0, 0.0]];
	let background = kmeans_background(features.view(), 10, 0).unwrap();
	assert_eq!(background.points, features);
	assert_eq!(background.weights, array![0.5, 0.5]);
}

#[test]
fn test_kmeans_summary() {
	let features = array![
		[0.0, 0.0],
		[0.1, 0.0],
		[0.0, 0.1],
		[5.0, 5.0],
		[5.1, 5.0],
		[5.0, 5.1],
	];
	let background = kmeans_background(features.view(), 2, 1).unwrap();
	assert!(background.points.nrows() <= 2);
	assert!((background.weights.sum() - 1.0).abs() < 1e-12);
	// Every coordinate is a value observed in its column.
	for (point_column, column) in izip!(background.points.axis_iter(Axis(1)), features.axis_iter(Axis(1))) {
		assert!(point_column.iter().all(|value| column.iter().any(|observed| observed == value)));
	}
}
