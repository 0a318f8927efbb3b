use crate::{
	attribution::{aggregate_attributions, FoldAttribution},
	config::Settings,
	feature_set::FeatureSet,
	fold::{run_fold, FoldContext},
	model::{Family, ModelOptions, Registry},
	progress::Progress,
	results::{attribution_key, AucRecord, ResultStore, RocRecord, RunRecord, AGGREGATE_RUN},
	split::StratifiedGroupKFold,
};
use anyhow::{Context, Result};
use lagsweep_metrics::{
	aggregate_roc, fpr_grid, Accuracy, ClassificationMetrics, ClassificationMetricsInput, FoldRoc,
	RocSummary, StreamingMetric, N_FPR_GRID_POINTS,
};
use num_traits::ToPrimitive;
use tracing::info;

/// The number of cross validation folds of every run.
pub const N_FOLDS: usize = 5;

/// A family to run, with options replacing the family's untuned defaults.
#[derive(Debug, Clone)]
pub struct ModelSpec {
	pub family: Family,
	pub options: Option<ModelOptions>,
}

impl ModelSpec {
	pub fn new(family: Family) -> ModelSpec {
		ModelSpec {
			family,
			options: None,
		}
	}

	/// The specs of the families named in `settings.models`.
	pub fn from_settings(registry: &Registry, settings: &Settings) -> Result<Vec<ModelSpec>> {
		settings
			.models
			.iter()
			.map(|name| {
				let spec = registry.get(name)?;
				Ok(ModelSpec::new(spec.family))
			})
			.collect()
	}
}

#[derive(Debug, Clone, Default)]
pub struct ExperimentOptions {
	pub optimize: bool,
	pub importance: bool,
	/// Tags every record, for runs whose forests are limited to this depth.
	pub max_depth: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ExperimentOutput {
	pub families: Vec<FamilyOutput>,
}

#[derive(Debug, Clone)]
pub struct FamilyOutput {
	pub family: Family,
	pub runs: Vec<RunRecord>,
	pub roc: RocSummary,
	/// The key of the attribution blobs, if they were written.
	pub attribution_key: Option<String>,
}

/**
Run `settings.n_runs` cross validated runs of every model in `models` on `feature_set` and append the results to `store`.

Run `i` is seeded with `i`. A [`RunRecord`](struct.RunRecord.html) is appended after each run. Once every run of a family is done, its ROC curve and AUC are aggregated over all runs and folds and appended with run -1, and when `options.importance` is set its attributions are written.
*/
pub fn run_experiment(
	feature_set: &FeatureSet,
	models: &[ModelSpec],
	registry: &Registry,
	settings: &Settings,
	options: &ExperimentOptions,
	store: &ResultStore,
	update_progress: &mut dyn FnMut(Progress),
) -> Result<ExperimentOutput> {
	let design = feature_set
		.design()
		.with_context(|| format!("failed to build the design matrix of {}", feature_set.name))?;
	let labels = design.labels.to_vec();
	let grid = fpr_grid(N_FPR_GRID_POINTS);
	let n_features = design.features.ncols();
	let n_samples = design.features.nrows();
	let mut families = Vec::with_capacity(models.len());
	for model_spec in models {
		let family = model_spec.family;
		let family_spec = registry.get_family(family)?;
		let method = family.to_string();
		info!(%family, featureset = %feature_set.name, n_lags = ?feature_set.n_lags, optimize = options.optimize, "starting experiment");
		let mut fold_rocs = Vec::new();
		let mut fold_attributions: Vec<FoldAttribution> = Vec::new();
		let mut runs = Vec::with_capacity(settings.n_runs);
		for run in 0..settings.n_runs {
			update_progress(Progress::Run {
				family,
				run,
				n_runs: settings.n_runs,
			});
			let seed = run.to_u64().unwrap();
			let model_options = model_spec
				.options
				.clone()
				.unwrap_or_else(|| (family_spec.factory)(seed));
			let splits = StratifiedGroupKFold::new(N_FOLDS, seed).split(&labels, &design.groups)?;
			let mut train_accuracy = Accuracy::new();
			let mut test_metrics = ClassificationMetrics::binary();
			for (fold, split) in splits.iter().enumerate() {
				update_progress(Progress::Fold {
					family,
					run,
					fold,
					n_folds: splits.len(),
				});
				let context = FoldContext {
					family: family_spec,
					options: &model_options,
					optimize: options.optimize,
					importance: options.importance,
					seed,
					settings,
				};
				let result = run_fold(&design, split, fold, &context)
					.with_context(|| format!("{} run {} fold {} failed", family, run, fold))?;
				for (prediction, label) in result
					.train_predictions
					.iter()
					.zip(result.train_labels.iter())
				{
					train_accuracy.update((*prediction, *label));
				}
				test_metrics.update(ClassificationMetricsInput {
					predictions: &result.test_predictions.to_vec(),
					labels: &result.test_labels.to_vec(),
				});
				fold_rocs.push(FoldRoc {
					true_positive_rates: result.true_positive_rates,
					auc: result.auc,
					probabilities: result.test_probabilities.to_vec(),
					labels: result.test_labels.to_vec(),
				});
				if let Some(attribution) = result.attribution {
					fold_attributions.push(attribution);
				}
			}
			let test_metrics = test_metrics.finalize();
			let record = RunRecord {
				featureset: feature_set.name.clone(),
				target: feature_set.target_column.clone(),
				method: method.clone(),
				run: run.to_i64().unwrap(),
				n_lags: feature_set.n_lags,
				optimized: options.optimize,
				max_depth: options.max_depth,
				n_features,
				n_samples,
				train_accuracy: train_accuracy.finalize().unwrap_or(f64::NAN),
				test_accuracy: test_metrics.accuracy,
				test_precision: test_metrics.precision,
				test_recall: test_metrics.recall,
				test_f1_score: test_metrics.f1_score,
				test_support: test_metrics.support,
			};
			info!(
				%family,
				run,
				train_accuracy = record.train_accuracy,
				test_accuracy = record.test_accuracy,
				test_f1_score = record.test_f1_score,
				"finished run"
			);
			store.append_runs(&[record.clone()])?;
			runs.push(record);
		}

		update_progress(Progress::Aggregating(family));
		let roc = aggregate_roc(&fold_rocs, &grid, settings.roc_aggregation)?;
		info!(%family, auc_mean = roc.auc_mean, auc_std = roc.auc_std, "aggregated runs");
		let roc_records: Vec<RocRecord> = roc
			.false_positive_rates
			.iter()
			.zip(roc.true_positive_rates.iter())
			.map(|(fpr, tpr)| RocRecord {
				featureset: feature_set.name.clone(),
				target: feature_set.target_column.clone(),
				method: method.clone(),
				run: AGGREGATE_RUN,
				n_lags: feature_set.n_lags,
				optimized: options.optimize,
				max_depth: options.max_depth,
				fpr: *fpr,
				tpr: *tpr,
			})
			.collect();
		store.append_roc(&roc_records)?;
		store.append_auc(&[AucRecord {
			featureset: feature_set.name.clone(),
			target: feature_set.target_column.clone(),
			method: method.clone(),
			run: AGGREGATE_RUN,
			n_lags: feature_set.n_lags,
			optimized: options.optimize,
			max_depth: options.max_depth,
			auc_mean: roc.auc_mean,
			auc_std: roc.auc_std,
		}])?;

		let attribution_key = if options.importance {
			let aggregated = aggregate_attributions(&fold_attributions, design.features.view())?;
			let key = attribution_key(&feature_set.name, &method, feature_set.n_lags, options.optimize);
			let (test_rows_path, attribution_path) =
				store.write_attributions(&key, &design.feature_names, &aggregated)?;
			info!(
				%family,
				test_rows_path = %test_rows_path.display(),
				attribution_path = %attribution_path.display(),
				"wrote attributions"
			);
			Some(key)
		} else {
			None
		};

		families.push(FamilyOutput {
			family,
			runs,
			roc,
			attribution_key,
		});
	}
	Ok(ExperimentOutput { families })
}
