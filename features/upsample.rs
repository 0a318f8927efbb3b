use itertools::Itertools;
use lagsweep_metrics::{MeanVariance, Metric};
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum UpsampleError {
	#[error("nominal feature index {index} is out of range for {n_features} features")]
	NominalIndex { index: usize, n_features: usize },
	#[error("SMOTE-NC requires at least one continuous feature")]
	NoContinuousFeatures,
	#[error("the minority class has {n_samples} samples but at least 2 are required")]
	TooFewMinoritySamples { n_samples: usize },
	#[error("the labels contain only one class")]
	SingleClass,
	#[error("SMOTE-NC cannot upsample features with missing values")]
	MissingValues,
	#[error("{n_labels} labels and {n_groups} groups were given for {n_rows} rows")]
	LengthMismatch {
		n_rows: usize,
		n_labels: usize,
		n_groups: usize,
	},
}

/// The result of upsampling. The original rows come first, followed by the synthetic rows.
#[derive(Debug, Clone)]
pub struct Upsampled {
	pub features: Array2<f64>,
	pub labels: Array1<usize>,
	/// The group of each row. A synthetic row belongs to the group of the row it was generated from.
	pub groups: Vec<usize>,
}

/**
`SmoteNc` is the Synthetic Minority Over-sampling Technique for data with both nominal and continuous features. [Learn more](https://doi.org/10.1613/jair.953).

Synthetic minority rows are added until both classes have as many rows as the majority class. Each synthetic row is generated from a random minority row and one of its `k_neighbors` nearest minority neighbors:

- continuous features are interpolated at a random point between the row and the neighbor.
- nominal features take the most frequent value among the row's nearest neighbors, ties going to the smallest value.

The distance between two rows is the euclidean distance over the continuous features, plus the square of the median standard deviation of the continuous minority features, halved, for each nominal feature on which the rows differ.
*/
#[derive(Debug, Clone)]
pub struct SmoteNc {
	/// The positions of the nominal columns in the feature matrix.
	pub nominal_features: Vec<usize>,
	pub k_neighbors: usize,
	pub seed: u64,
}

impl SmoteNc {
	pub fn new(nominal_features: Vec<usize>, seed: u64) -> SmoteNc {
		SmoteNc {
			nominal_features,
			k_neighbors: 5,
			seed,
		}
	}

	pub fn fit_resample(
		&self,
		features: ArrayView2<f64>,
		labels: ArrayView1<usize>,
		groups: &[usize],
	) -> Result<Upsampled, UpsampleError> {
		let n_features = features.ncols();
		if labels.len() != features.nrows() || groups.len() != features.nrows() {
			return Err(UpsampleError::LengthMismatch {
				n_rows: features.nrows(),
				n_labels: labels.len(),
				n_groups: groups.len(),
			});
		}
		if let Some(index) = self
			.nominal_features
			.iter()
			.find(|index| **index >= n_features)
		{
			return Err(UpsampleError::NominalIndex {
				index: *index,
				n_features,
			});
		}
		let is_nominal: Vec<bool> = (0..n_features)
			.map(|index| self.nominal_features.contains(&index))
			.collect();
		let continuous: Vec<usize> = (0..n_features).filter(|i| !is_nominal[*i]).collect();
		let nominal: Vec<usize> = (0..n_features).filter(|i| is_nominal[*i]).collect();
		if continuous.is_empty() {
			return Err(UpsampleError::NoContinuousFeatures);
		}
		if features.iter().any(|value| value.is_nan()) {
			return Err(UpsampleError::MissingValues);
		}

		// Find the minority class. Ties go to the larger label.
		let counts = labels.iter().counts();
		if counts.len() < 2 {
			return Err(UpsampleError::SingleClass);
		}
		let (minority_label, n_minority) = counts
			.iter()
			.min_by_key(|(label, count)| (**count, std::cmp::Reverse(**label)))
			.map(|(label, count)| (**label, *count))
			.ok_or(UpsampleError::SingleClass)?;
		let n_majority = counts.values().copied().max().unwrap_or(0);
		let mut upsampled = Upsampled {
			features: features.to_owned(),
			labels: labels.to_owned(),
			groups: groups.to_owned(),
		};
		let n_synthetic = n_majority - n_minority;
		if n_synthetic == 0 {
			return Ok(upsampled);
		}
		if n_minority < 2 {
			return Err(UpsampleError::TooFewMinoritySamples {
				n_samples: n_minority,
			});
		}
		let minority_rows: Vec<usize> = labels
			.iter()
			.enumerate()
			.filter(|(_, label)| **label == minority_label)
			.map(|(row, _)| row)
			.collect();
		let minority = features.select(Axis(0), &minority_rows);

		let stds: Vec<f64> = continuous
			.iter()
			.map(|index| {
				let column = minority.column(*index).to_vec();
				MeanVariance::compute(&column)
					.map(|mean_variance| mean_variance.std())
					.unwrap_or(0.0)
			})
			.collect();
		let median_std = median(stds);
		let nominal_penalty = median_std * median_std / 2.0;

		let k = self.k_neighbors.min(n_minority - 1);
		let neighbors: Vec<Vec<usize>> = (0..n_minority)
			.map(|i| {
				let mut distances: Vec<(f64, usize)> = (0..n_minority)
					.filter(|j| *j != i)
					.map(|j| {
						let row = minority.row(i);
						let other = minority.row(j);
						let continuous_distance: f64 = continuous
							.iter()
							.map(|f| (row[*f] - other[*f]).powi(2))
							.sum();
						let n_mismatches = nominal.iter().filter(|f| row[**f] != other[**f]).count();
						let distance = continuous_distance
							+ nominal_penalty * n_mismatches.to_f64().unwrap();
						(distance, j)
					})
					.collect();
				distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
				distances.into_iter().take(k).map(|(_, j)| j).collect()
			})
			.collect();

		let mut rng = Xoshiro256Plus::seed_from_u64(self.seed);
		let mut synthetic = Array2::<f64>::zeros((n_synthetic, n_features));
		let mut synthetic_groups = Vec::with_capacity(n_synthetic);
		for mut new_row in synthetic.axis_iter_mut(Axis(0)) {
			let sample = rng.gen_range(0..n_minority);
			let neighbor = neighbors[sample][rng.gen_range(0..k)];
			let step: f64 = rng.gen();
			let row = minority.row(sample);
			let other = minority.row(neighbor);
			for f in continuous.iter() {
				new_row[*f] = row[*f] + step * (other[*f] - row[*f]);
			}
			for f in nominal.iter() {
				new_row[*f] = most_frequent(neighbors[sample].iter().map(|j| minority[[*j, *f]]));
			}
			synthetic_groups.push(groups[minority_rows[sample]]);
		}

		let features = ndarray::concatenate![Axis(0), upsampled.features, synthetic];
		upsampled.features = features;
		upsampled.labels = upsampled
			.labels
			.iter()
			.copied()
			.chain(std::iter::repeat(minority_label).take(n_synthetic))
			.collect();
		upsampled.groups.extend(synthetic_groups);
		Ok(upsampled)
	}
}

fn median(mut values: Vec<f64>) -> f64 {
	if values.is_empty() {
		return 0.0;
	}
	values.sort_by(|a, b| a.total_cmp(b));
	let mid = values.len() / 2;
	if values.len() % 2 == 0 {
		(values[mid - 1] + values[mid]) / 2.0
	} else {
		values[mid]
	}
}

/// The most frequent value, the smallest one on ties.
fn most_frequent(values: impl Iterator<Item = f64>) -> f64 {
	let mut counts: BTreeMap<u64, (f64, usize)> = BTreeMap::new();
	for value in values {
		counts.entry(value.to_bits()).or_insert((value, 0)).1 += 1;
	}
	counts
		.into_values()
		.fold(None, |best: Option<(f64, usize)>, (value, count)| match best {
			Some((best_value, best_count))
				if best_count > count || (best_count == count && best_value < value) =>
			{
				Some((best_value, best_count))
			}
			_ => Some((value, count)),
		})
		.map(|(value, _)| value)
		.unwrap_or(f64::NAN)
}

#[cfg(test)]
fn imbalanced() -> (Array2<f64>, Array1<usize>, Vec<usize>) {
	let features = array![
		[0.1, 1.0],
		[0.2, 1.0],
		[0.3, 2.0],
		[0.4, 2.0],
		[0.5, 1.0],
		[0.6, 2.0],
		[0.9, 3.0],
		[0.8, 3.0],
		[0.7, 3.0],
	];
	let labels = array![0, 0, 0, 0, 0, 0, 1, 1, 1];
	let groups = vec![0, 0, 1, 1, 2, 2, 3, 3, 4];
	(features, labels, groups)
}

#[test]
fn test_balances_classes() {
	let (features, labels, groups) = imbalanced();
	let smote = SmoteNc::new(vec![1], 42);
	let upsampled = smote
		.fit_resample(features.view(), labels.view(), &groups)
		.unwrap();
	assert_eq!(upsampled.features.nrows(), 12);
	assert_eq!(upsampled.labels.iter().filter(|l| **l == 1).count(), 6);
	assert_eq!(upsampled.features.slice(s![..9, ..]), features);
	for row in 9..12 {
		// Synthetic rows stay within the minority range and keep a valid category.
		let value = upsampled.features[[row, 0]];
		assert!((0.7..=0.9).contains(&value));
		assert_eq!(upsampled.features[[row, 1]], 3.0);
		assert!(upsampled.groups[row] == 3 || upsampled.groups[row] == 4);
	}
}

#[test]
fn test_is_deterministic_for_a_seed() {
	let (features, labels, groups) = imbalanced();
	let smote = SmoteNc::new(vec![1], 7);
	let a = smote.fit_resample(features.view(), labels.view(), &groups).unwrap();
	let b = smote.fit_resample(features.view(), labels.view(), &groups).unwrap();
	assert_eq!(a.features, b.features);
}

#[test]
fn test_rejects_invalid_input() {
	let (features, labels, groups) = imbalanced();
	assert_eq!(
		SmoteNc::new(vec![2], 0)
			.fit_resample(features.view(), labels.view(), &groups)
			.unwrap_err(),
		UpsampleError::NominalIndex {
			index: 2,
			n_features: 2
		}
	);
	assert_eq!(
		SmoteNc::new(vec![0, 1], 0)
			.fit_resample(features.view(), labels.view(), &groups)
			.unwrap_err(),
		UpsampleError::NoContinuousFeatures
	);
}

#[test]
fn test_most_frequent() {
	assert_eq!(most_frequent([2.0, 1.0, 2.0, 1.0].into_iter()), 1.0);
	assert_eq!(most_frequent([3.0, 2.0, 3.0].into_iter()), 3.0);
}
