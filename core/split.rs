use crate::Error;
use itertools::Itertools;
use num_traits::ToPrimitive;
use rand::{seq::SliceRandom, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

/// The train and test row indices of one fold. Both are in ascending row order.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldSplit {
	pub train: Vec<usize>,
	pub test: Vec<usize>,
}

/**
`StratifiedGroupKFold` splits rows into `n_splits` folds such that all rows of a group land in the same fold while the class ratio of each fold stays as close as possible to the overall ratio.

Groups are visited in a shuffled order, stably sorted so that groups whose class counts are most uneven come first. Each group goes to the fold where adding it keeps the per class spread of fold shares lowest, with ties going to the fold with fewer rows.
*/
#[derive(Debug, Clone)]
pub struct StratifiedGroupKFold {
	pub n_splits: usize,
	pub seed: u64,
}

impl StratifiedGroupKFold {
	pub fn new(n_splits: usize, seed: u64) -> StratifiedGroupKFold {
		StratifiedGroupKFold { n_splits, seed }
	}

	pub fn split(&self, labels: &[usize], groups: &[usize]) -> Result<Vec<FoldSplit>, Error> {
		let n_classes = labels.iter().max().map(|max| max + 1).unwrap_or(0);
		let group_ids: Vec<usize> = groups.iter().copied().unique().collect();
		let n_groups = group_ids.len();
		if n_groups < self.n_splits || self.n_splits < 2 {
			return Err(Error::TooFewGroups {
				n_groups,
				n_splits: self.n_splits,
			});
		}
		let group_positions: std::collections::HashMap<usize, usize> = group_ids
			.iter()
			.enumerate()
			.map(|(position, group)| (*group, position))
			.collect();
		let mut counts_per_group = vec![vec![0usize; n_classes]; n_groups];
		let mut counts_per_class = vec![0usize; n_classes];
		for (label, group) in labels.iter().zip(groups.iter()) {
			counts_per_group[group_positions[group]][*label] += 1;
			counts_per_class[*label] += 1;
		}

		let mut order: Vec<usize> = (0..n_groups).collect();
		let mut rng = Xoshiro256Plus::seed_from_u64(self.seed);
		order.shuffle(&mut rng);
		let spreads: Vec<f64> = counts_per_group
			.iter()
			.map(|counts| std(counts.iter().map(|count| count.to_f64().unwrap())))
			.collect();
		order.sort_by(|a, b| spreads[*b].total_cmp(&spreads[*a]));

		let mut counts_per_fold = vec![vec![0usize; n_classes]; self.n_splits];
		let mut fold_of_group = vec![0usize; n_groups];
		for group in order {
			let fold = self.best_fold(&counts_per_fold, &counts_per_group[group], &counts_per_class);
			for (fold_count, group_count) in counts_per_fold[fold]
				.iter_mut()
				.zip(counts_per_group[group].iter())
			{
				*fold_count += group_count;
			}
			fold_of_group[group] = fold;
		}

		let splits = (0..self.n_splits)
			.map(|fold| {
				let (test, train): (Vec<usize>, Vec<usize>) = (0..groups.len())
					.partition(|row| fold_of_group[group_positions[&groups[*row]]] == fold);
				FoldSplit { train, test }
			})
			.collect();
		Ok(splits)
	}

	fn best_fold(
		&self,
		counts_per_fold: &[Vec<usize>],
		group_counts: &[usize],
		counts_per_class: &[usize],
	) -> usize {
		let mut best_fold = 0;
		let mut min_eval = f64::INFINITY;
		let mut min_samples_in_fold = usize::MAX;
		for fold in 0..counts_per_fold.len() {
			// The mean over classes of the spread of each class's share across folds, with the group added to this fold.
			let fold_eval = (0..counts_per_class.len())
				.map(|class| {
					let total = counts_per_class[class].max(1).to_f64().unwrap();
					std(counts_per_fold.iter().enumerate().map(|(other, counts)| {
						let count = if other == fold {
							counts[class] + group_counts[class]
						} else {
							counts[class]
						};
						count.to_f64().unwrap() / total
					}))
				})
				.sum::<f64>()
				/ counts_per_class.len().max(1).to_f64().unwrap();
			let samples_in_fold: usize = counts_per_fold[fold].iter().sum();
			let is_close = (fold_eval - min_eval).abs() <= 1e-8 + 1e-10 * min_eval.abs();
			if fold_eval < min_eval || (is_close && samples_in_fold < min_samples_in_fold) {
				best_fold = fold;
				min_eval = fold_eval;
				min_samples_in_fold = samples_in_fold;
			}
		}
		best_fold
	}
}

/// The population standard deviation.
fn std(values: impl Iterator<Item = f64> + Clone) -> f64 {
	let n = values.clone().count().max(1).to_f64().unwrap();
	let mean = values.clone().sum::<f64>() / n;
	(values.map(|value| (value - mean).powi(2)).sum::<f64>() / n).sqrt()
}

#[test]
fn test_groups_stay_together() {
	let groups: Vec<usize> = (0..100).map(|row| row / 5).collect();
	let labels: Vec<usize> = (0..100).map(|row| usize::from(row % 5 < 2)).collect();
	let splits = StratifiedGroupKFold::new(5, 3).split(&labels, &groups).unwrap();
	assert_eq!(splits.len(), 5);
	let mut seen_test_rows = vec![false; 100];
	for split in splits.iter() {
		assert_eq!(split.train.len() + split.test.len(), 100);
		assert!(!split.test.is_empty());
		for row in split.test.iter() {
			assert!(!seen_test_rows[*row]);
			seen_test_rows[*row] = true;
		}
		for train_row in split.train.iter() {
			assert!(split
				.test
				.iter()
				.all(|test_row| groups[*test_row] != groups[*train_row]));
		}
		assert!(split.test.iter().any(|row| labels[*row] == 1));
		assert!(split.test.iter().any(|row| labels[*row] == 0));
	}
	assert!(seen_test_rows.into_iter().all(|seen| seen));
}

#[test]
fn test_split_is_seeded() {
	let groups: Vec<usize> = (0..60).map(|row| row / 3).collect();
	let labels: Vec<usize> = (0..60).map(|row| usize::from(row % 3 == 0)).collect();
	let a = StratifiedGroupKFold::new(5, 7).split(&labels, &groups).unwrap();
	let b = StratifiedGroupKFold::new(5, 7).split(&labels, &groups).unwrap();
	assert_eq!(a, b);
}

#[test]
fn test_too_few_groups() {
	let groups = vec![0, 0, 1, 1, 2, 2];
	let labels = vec![0, 1, 0, 1, 0, 1];
	assert!(matches!(
		StratifiedGroupKFold::new(5, 0).split(&labels, &groups),
		Err(Error::TooFewGroups {
			n_groups: 3,
			n_splits: 5
		})
	));
}
