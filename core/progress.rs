use crate::model::Family;

/// The progress events reported through the `update_progress` callback of [`run_experiment`](fn.run_experiment.html) and the sweep drivers.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
	Sweep(SweepProgress),
	Run {
		family: Family,
		run: usize,
		n_runs: usize,
	},
	Fold {
		family: Family,
		run: usize,
		fold: usize,
		n_folds: usize,
	},
	Aggregating(Family),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepProgress {
	pub n_lags: usize,
	pub max_depth: Option<usize>,
}
