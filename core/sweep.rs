use crate::{
	config::Settings,
	experiment::{run_experiment, ExperimentOptions, ExperimentOutput, ModelSpec},
	feature_set::{FeatureSet, Horizon},
	model::{Family, ModelOptions, Registry},
	progress::{Progress, SweepProgress},
	results::ResultStore,
};
use anyhow::{Context, Result};
use lagsweep_tree::ForestTrainOptions;
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use std::ops::RangeInclusive;
use tracing::info;

/// The forest depths tried at every lag.
pub const SWEEP_DEPTHS: RangeInclusive<usize> = 1..=5;

/// The number of runs of every sweep step.
pub const SWEEP_N_RUNS: usize = 5;

/// The grid of a lag sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct LagSweepOptions {
	pub lags: Vec<usize>,
	pub depths: Vec<usize>,
	pub n_runs: usize,
	/// The number of trees of every forest.
	pub n_trees: usize,
}

impl LagSweepOptions {
	/// The horizon's lag range, every depth in [`SWEEP_DEPTHS`](constant.SWEEP_DEPTHS.html) and [`SWEEP_N_RUNS`](constant.SWEEP_N_RUNS.html) runs of default sized forests.
	pub fn for_horizon(horizon: Horizon) -> LagSweepOptions {
		LagSweepOptions {
			lags: horizon.lag_range().collect(),
			depths: SWEEP_DEPTHS.collect(),
			n_runs: SWEEP_N_RUNS,
			n_trees: ForestTrainOptions::default().n_trees,
		}
	}
}

/// The mean AUC of every (lag, depth) step of a sweep.
#[derive(Debug, Clone)]
pub struct LagSweep {
	pub lags: Vec<usize>,
	pub depths: Vec<usize>,
	/// The shape is (lags x depths).
	pub auc: Array2<f64>,
}

impl LagSweep {
	/// The (lag, depth) with the highest mean AUC, the earliest winning on ties.
	pub fn best(&self) -> Option<(usize, usize, f64)> {
		let mut best: Option<(usize, usize, f64)> = None;
		for ((lag_index, depth_index), auc) in self.auc.indexed_iter() {
			if !auc.is_finite() {
				continue;
			}
			match best {
				Some((_, _, best_auc)) if *auc <= best_auc => {}
				_ => best = Some((self.lags[lag_index], self.depths[depth_index], *auc)),
			}
		}
		best
	}
}

/**
Sweep the number of lags and the forest depth.

Rows in the horizon's ramp-up period are dropped first. Then, for every lag count in `options.lags`, the lagged feature set is run with a random forest of each depth in `options.depths`, seeded with its depth, without tuning or attributions. Records are tagged with the depth. [`LagSweepOptions::for_horizon`](struct.LagSweepOptions.html#method.for_horizon) gives the full sweep.
*/
pub fn tune_lags(
	feature_set: &FeatureSet,
	options: &LagSweepOptions,
	registry: &Registry,
	settings: &Settings,
	store: &ResultStore,
	update_progress: &mut dyn FnMut(Progress),
) -> Result<LagSweep> {
	let feature_set = feature_set.exclude_ramp_up()?;
	let settings = Settings {
		n_runs: options.n_runs,
		..settings.clone()
	};
	let lags = options.lags.clone();
	let depths = options.depths.clone();
	let mut auc = Array2::from_elem((lags.len(), depths.len()), f64::NAN);
	for (lag_index, n_lags) in lags.iter().enumerate() {
		let lagged = feature_set
			.lagged(*n_lags)
			.with_context(|| format!("failed to lag {} by {}", feature_set.name, n_lags))?;
		for (depth_index, max_depth) in depths.iter().enumerate() {
			update_progress(Progress::Sweep(SweepProgress {
				n_lags: *n_lags,
				max_depth: Some(*max_depth),
			}));
			let model = ModelSpec {
				family: Family::RF,
				options: Some(ModelOptions::RF(ForestTrainOptions {
					n_trees: options.n_trees,
					max_depth: Some(*max_depth),
					seed: max_depth.to_u64().unwrap(),
					..Default::default()
				})),
			};
			let output = run_experiment(
				&lagged,
				&[model],
				registry,
				&settings,
				&ExperimentOptions {
					optimize: false,
					importance: false,
					max_depth: Some(*max_depth),
				},
				store,
				update_progress,
			)?;
			if let Some(family) = output.families.first() {
				auc[[lag_index, depth_index]] = family.roc.auc_mean;
				info!(n_lags, max_depth, auc = family.roc.auc_mean, "finished sweep step");
			}
		}
	}
	Ok(LagSweep { lags, depths, auc })
}

/// Run `models` on `feature_set` lagged by `n_lags`, first untuned without attributions, then tuned with attributions.
pub fn compare(
	feature_set: &FeatureSet,
	n_lags: usize,
	models: &[ModelSpec],
	registry: &Registry,
	settings: &Settings,
	store: &ResultStore,
	update_progress: &mut dyn FnMut(Progress),
) -> Result<(ExperimentOutput, ExperimentOutput)> {
	let lagged = feature_set
		.lagged(n_lags)
		.with_context(|| format!("failed to lag {} by {}", feature_set.name, n_lags))?;
	update_progress(Progress::Sweep(SweepProgress {
		n_lags,
		max_depth: None,
	}));
	let baseline = run_experiment(
		&lagged,
		models,
		registry,
		settings,
		&ExperimentOptions {
			optimize: false,
			importance: false,
			max_depth: None,
		},
		store,
		update_progress,
	)?;
	let optimized = run_experiment(
		&lagged,
		models,
		registry,
		settings,
		&ExperimentOptions {
			optimize: true,
			importance: true,
			max_depth: None,
		},
		store,
		update_progress,
	)?;
	Ok((baseline, optimized))
}

#[test]
fn test_best_step() {
	let sweep = LagSweep {
		lags: vec![1, 2],
		depths: vec![1, 2, 3],
		auc: array![[0.6, 0.7, f64::NAN], [0.7, 0.65, 0.5]],
	};
	assert_eq!(sweep.best(), Some((1, 2, 0.7)));
}

#[cfg(test)]
fn monthly_feature_set() -> FeatureSet {
	use lagsweep_dataframe::{Column, DataFrame, NumberColumn, TextColumn};
	// 20 participants observed in months 1 to 8, adherent in every even month.
	let n_rows = 160;
	let month = |row: usize| (1 + row % 8) as f64;
	let adherent: Vec<f64> = (0..n_rows).map(|row| (1.0 + month(row)) % 2.0).collect();
	let number = |name: &str, data: Vec<f64>| {
		Column::Number(NumberColumn {
			name: name.to_owned(),
			data,
		})
	};
	let dataframe = DataFrame {
		columns: vec![
			Column::Text(TextColumn {
				name: "id".to_owned(),
				data: (0..n_rows).map(|row| format!("p{:02}", row / 8)).collect(),
			}),
			number("study_month", (0..n_rows).map(month).collect()),
			number("site", (0..n_rows).map(|row| ((row / 8) % 2) as f64).collect()),
			number(
				"steps",
				(0..n_rows)
					.map(|row| 4000.0 + 2500.0 * adherent[row] + ((row * 37) % 11) as f64 * 100.0)
					.collect(),
			),
			number("adherent", adherent.clone()),
		],
	};
	FeatureSet {
		name: "monthly".to_owned(),
		dataframe,
		id_column: "id".to_owned(),
		target_column: "adherent".to_owned(),
		nominal_columns: vec!["site".to_owned()],
		horizon: Horizon::StudyMonth,
		n_lags: None,
	}
}

#[test]
fn test_for_horizon() {
	let options = LagSweepOptions::for_horizon(Horizon::StudyMonth);
	assert_eq!(options.lags, vec![1, 2, 3, 4]);
	assert_eq!(options.depths, vec![1, 2, 3, 4, 5]);
	assert_eq!(options.n_runs, 5);
	assert_eq!(options.n_trees, 100);
}

#[test]
fn test_tune_lags() {
	use crate::results::AUC_RESULTS_FILE_NAME;
	let dir = tempfile::tempdir().unwrap();
	let settings = Settings {
		results_dir: dir.path().join("results"),
		attributions_dir: dir.path().join("feature_importance"),
		..Settings::default()
	};
	let store = ResultStore::from_settings(&settings);
	let options = LagSweepOptions {
		lags: vec![1, 2],
		depths: vec![1, 2],
		n_runs: 1,
		n_trees: 10,
	};
	let mut steps = Vec::new();
	let sweep = tune_lags(
		&monthly_feature_set(),
		&options,
		&Registry::default(),
		&settings,
		&store,
		&mut |progress| {
			if let Progress::Sweep(progress) = progress {
				steps.push((progress.n_lags, progress.max_depth));
			}
		},
	)
	.unwrap();
	assert_eq!(
		steps,
		vec![(1, Some(1)), (1, Some(2)), (2, Some(1)), (2, Some(2))]
	);
	assert_eq!(sweep.auc.dim(), (2, 2));
	assert!(sweep.auc.iter().all(|auc| (0.0..=1.0).contains(auc)));
	assert!(sweep.best().is_some());
	let auc_lines: Vec<String> = std::fs::read_to_string(dir.path().join("results").join(AUC_RESULTS_FILE_NAME))
		.unwrap()
		.lines()
		.map(|line| line.to_owned())
		.collect();
	assert_eq!(auc_lines.len(), 1 + 4);
	assert!(auc_lines[1].starts_with("monthly,adherent,RF,-1,1,false,1,"));
	assert!(auc_lines[4].starts_with("monthly,adherent,RF,-1,2,false,2,"));
	// Nothing is explained during a sweep.
	assert!(!dir.path().join("feature_importance").exists());
}

#[test]
fn test_compare() {
	fn factory(seed: u64) -> ModelOptions {
		ModelOptions::RF(ForestTrainOptions {
			n_trees: 10,
			seed,
			..Default::default()
		})
	}
	fn grid(seed: u64) -> Vec<ModelOptions> {
		[1, 2]
			.iter()
			.map(|max_depth| {
				ModelOptions::RF(ForestTrainOptions {
					n_trees: 10,
					max_depth: Some(*max_depth),
					compute_oob_score: true,
					seed,
					..Default::default()
				})
			})
			.collect()
	}
	let registry = Registry {
		families: vec![crate::model::FamilySpec {
			family: Family::RF,
			factory,
			grid,
			n_jobs: Some(1),
		}],
	};
	let dir = tempfile::tempdir().unwrap();
	let settings = Settings {
		n_runs: 1,
		results_dir: dir.path().join("results"),
		attributions_dir: dir.path().join("feature_importance"),
		..Settings::default()
	};
	let store = ResultStore::from_settings(&settings);
	let (baseline, optimized) = compare(
		&monthly_feature_set(),
		2,
		&[ModelSpec::new(Family::RF)],
		&registry,
		&settings,
		&store,
		&mut |_| {},
	)
	.unwrap();
	assert_eq!(baseline.families.len(), 1);
	assert_eq!(optimized.families.len(), 1);
	assert!(!baseline.families[0].runs[0].optimized);
	assert!(optimized.families[0].runs[0].optimized);
	// Only the tuned pass writes attributions.
	assert!(baseline.families[0].attribution_key.is_none());
	let key = optimized.families[0].attribution_key.clone().unwrap();
	assert_eq!(key, "monthly_RF_2_lags_optimized");
	assert!(dir
		.path()
		.join("feature_importance")
		.join(format!("shap_{}.ob", key))
		.exists());
}
