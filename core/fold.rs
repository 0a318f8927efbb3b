use crate::{
	attribution::FoldAttribution,
	config::Settings,
	feature_set::Design,
	grid::{grid_search, GridSearchOptions},
	model::{FamilySpec, ModelOptions},
	split::FoldSplit,
	Error,
};
use lagsweep_features::{IterativeImputer, IterativeImputerOptions, MinMaxScaler, SmoteNc};
use lagsweep_metrics::{auc, compute_roc_curve, fpr_grid, interpolate_roc, RocError, N_FPR_GRID_POINTS};
use ndarray::prelude::*;
use tracing::{info, warn};

/// How the min-max scaler is fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingMode {
	/// Fit on the upsampled train partition and apply to both partitions.
	FitOnTrain,
	/// Fit on each partition separately. The test partition's own range leaks into its scaled values, which biases its scores optimistically.
	PerPartition,
}

/// Everything `run_fold` needs besides the data.
#[derive(Debug, Clone)]
pub struct FoldContext<'a> {
	pub family: &'a FamilySpec,
	/// The options of an untuned model. Ignored when `optimize` is set.
	pub options: &'a ModelOptions,
	pub optimize: bool,
	pub importance: bool,
	/// Seeds upsampling, the inner split of the grid search and the explainer.
	pub seed: u64,
	pub settings: &'a Settings,
}

#[derive(Debug, Clone)]
pub struct FoldResult {
	/// The predictions on the upsampled, scaled train partition.
	pub train_predictions: Array1<usize>,
	pub train_labels: Array1<usize>,
	pub test_predictions: Array1<usize>,
	pub test_labels: Array1<usize>,
	/// The probability of label 1 for each test row.
	pub test_probabilities: Array1<f64>,
	/// The test ROC curve interpolated onto the false positive rate grid.
	pub true_positive_rates: Vec<f64>,
	pub auc: f64,
	pub attribution: Option<FoldAttribution>,
	pub oob_accuracy: Option<f64>,
}

/**
Train and evaluate one fold.

Imputation and scaling are fit on the train partition and upsampling only touches the train partition, so no test row influences the model. A test partition holding a single class gets a NaN AUC and NaN true positive rates. Any other error aborts the fold.
*/
pub fn run_fold(
	design: &Design,
	split: &FoldSplit,
	fold: usize,
	context: &FoldContext,
) -> Result<FoldResult, Error> {
	let n_features = design.features.ncols();
	if design.feature_names.contains(&design.id_column) {
		return Err(Error::IdColumnInFeatures(design.id_column.clone()));
	}
	if let Some(index) = design
		.nominal_indices
		.iter()
		.find(|index| **index >= n_features)
	{
		return Err(Error::NominalIndex {
			index: *index,
			n_features,
		});
	}
	let settings = context.settings;

	let mut features_train = design.features.select(Axis(0), &split.train);
	let labels_train = design.labels.select(Axis(0), &split.train);
	let groups_train: Vec<usize> = split.train.iter().map(|row| design.groups[*row]).collect();
	let mut features_test = design.features.select(Axis(0), &split.test);
	let test_labels = design.labels.select(Axis(0), &split.test);

	if settings.impute {
		let options = IterativeImputerOptions {
			nominal_features: design.nominal_indices.clone(),
			..Default::default()
		};
		let (imputer, imputed) = IterativeImputer::fit_transform(features_train.view(), &options)?;
		features_test = imputer.transform(features_test.view())?;
		features_train = imputed;
	}

	let upsampled = SmoteNc::new(design.nominal_indices.clone(), context.seed).fit_resample(
		features_train.view(),
		labels_train.view(),
		&groups_train,
	)?;

	let (features_train, features_test) = match settings.scaling {
		ScalingMode::FitOnTrain => {
			let (scaler, features_train) = MinMaxScaler::fit_transform(upsampled.features.view());
			let features_test = scaler.transform(features_test.view());
			(features_train, features_test)
		}
		ScalingMode::PerPartition => {
			warn!(fold, "scaling the test partition with its own range biases test scores optimistically");
			let (_, features_train) = MinMaxScaler::fit_transform(upsampled.features.view());
			let (_, features_test) = MinMaxScaler::fit_transform(features_test.view());
			(features_train, features_test)
		}
	};

	let model = if context.optimize {
		let output = grid_search(
			context.family,
			features_train.view(),
			upsampled.labels.view(),
			&upsampled.groups,
			&GridSearchOptions {
				scoring: settings.scoring,
				n_jobs: settings.n_jobs,
				seed: context.seed,
			},
		)?;
		info!(fold, options = ?output.options, score = output.score, "selected hyperparameters");
		output.model
	} else {
		context.options.train(features_train.view(), upsampled.labels.view())?
	};

	let train_predictions = model.predict(features_train.view());
	let test_probabilities = model.predict_probabilities(features_test.view());
	let test_predictions = test_probabilities.mapv(|probability| usize::from(probability > 0.5));

	let (true_positive_rates, auc) =
		match compute_roc_curve(&test_probabilities.to_vec(), &test_labels.to_vec()) {
			Ok(roc_curve) => (
				interpolate_roc(&roc_curve, &fpr_grid(N_FPR_GRID_POINTS)),
				auc(&roc_curve),
			),
			Err(RocError::SingleClass) => {
				warn!(fold, "the test labels contain a single class, recording an undefined AUC");
				(vec![f64::NAN; N_FPR_GRID_POINTS], f64::NAN)
			}
			Err(error) => return Err(error.into()),
		};

	let attribution = if context.importance {
		let outputs = model.explain(
			features_test.view(),
			features_train.view(),
			&settings.explainer,
			context.seed,
		)?;
		Some(FoldAttribution {
			outputs,
			test_indices: split.test.clone(),
		})
	} else {
		None
	};

	let oob_accuracy = model.oob_accuracy();
	if let Some(oob_accuracy) = oob_accuracy {
		info!(fold, oob_accuracy, "out-of-bag accuracy");
	}

	Ok(FoldResult {
		train_predictions,
		train_labels: upsampled.labels,
		test_predictions,
		test_labels,
		test_probabilities,
		true_positive_rates,
		auc,
		attribution,
		oob_accuracy,
	})
}

#[cfg(test)]
fn design() -> Design {
	let n_rows = 40;
	let labels: Array1<usize> = (0..n_rows).map(|row| usize::from(row % 4 == 0)).collect();
	let features = Array2::from_shape_fn((n_rows, 3), |(row, column)| match column {
		0 => labels[row] as f64 + (row % 5) as f64 * 0.1,
		1 => (row % 3) as f64,
		_ => {
			if row == 7 {
				f64::NAN
			} else {
				(row % 7) as f64
			}
		}
	});
	Design {
		features,
		labels,
		groups: (0..n_rows).map(|row| row / 4).collect(),
		feature_names: vec!["steps".to_owned(), "site".to_owned(), "mood".to_owned()],
		nominal_indices: vec![1],
		id_column: "id".to_owned(),
	}
}

#[test]
fn test_run_fold() {
	use crate::{model::Registry, split::StratifiedGroupKFold};
	let design = design();
	let registry = Registry::default();
	let family = registry.get("LogisticR").unwrap();
	let options = (family.factory)(0);
	let settings = Settings::default();
	let splits = StratifiedGroupKFold::new(5, 0)
		.split(&design.labels.to_vec(), &design.groups)
		.unwrap();
	let context = FoldContext {
		family,
		options: &options,
		optimize: false,
		importance: true,
		seed: 0,
		settings: &settings,
	};
	let result = run_fold(&design, &splits[0], 0, &context).unwrap();
	// Upsampling balances the train partition and leaves the test partition alone.
	let n_positive_train = result.train_labels.iter().filter(|label| **label == 1).count();
	assert_eq!(2 * n_positive_train, result.train_labels.len());
	assert_eq!(result.test_labels.len(), splits[0].test.len());
	assert_eq!(result.true_positive_rates.len(), N_FPR_GRID_POINTS);
	assert_eq!(result.true_positive_rates[0], 0.0);
	assert!((0.0..=1.0).contains(&result.auc));
	let attribution = result.attribution.unwrap();
	assert_eq!(attribution.outputs.len(), 1);
	assert_eq!(attribution.outputs[0].dim(), (splits[0].test.len(), 3));
	assert_eq!(attribution.test_indices, splits[0].test);
}

#[test]
fn test_id_column_is_rejected() {
	use crate::model::Registry;
	let mut design = design();
	design.feature_names[1] = "id".to_owned();
	let registry = Registry::default();
	let family = registry.get("RF").unwrap();
	let options = (family.factory)(0);
	let settings = Settings::default();
	let split = FoldSplit {
		train: (8..40).collect(),
		test: (0..8).collect(),
	};
	let context = FoldContext {
		family,
		options: &options,
		optimize: false,
		importance: false,
		seed: 0,
		settings: &settings,
	};
	assert!(matches!(
		run_fold(&design, &split, 0, &context),
		Err(Error::IdColumnInFeatures(_))
	));
	design.feature_names[1] = "site".to_owned();
	design.nominal_indices = vec![3];
	assert!(matches!(
		run_fold(&design, &split, 0, &context),
		Err(Error::NominalIndex {
			index: 3,
			n_features: 3
		})
	));
}

#[test]
fn test_single_class_test_partition() {
	use crate::model::Registry;
	let design = design();
	let registry = Registry::default();
	let family = registry.get("RF").unwrap();
	let options = (family.factory)(0);
	let settings = Settings::default();
	// Rows 1, 2 and 3 are all negative.
	let split = FoldSplit {
		train: (0..1).chain(4..40).collect(),
		test: vec![1, 2, 3],
	};
	let context = FoldContext {
		family,
		options: &options,
		optimize: false,
		importance: false,
		seed: 0,
		settings: &settings,
	};
	let result = run_fold(&design, &split, 0, &context).unwrap();
	assert!(result.auc.is_nan());
	assert_eq!(result.true_positive_rates.len(), N_FPR_GRID_POINTS);
	assert!(result.true_positive_rates.iter().all(|tpr| tpr.is_nan()));
	assert_eq!(result.test_predictions.len(), 3);
}

#[test]
fn test_scaling_modes() {
	use crate::model::Registry;
	let n_rows = 40;
	let labels: Array1<usize> = (0..n_rows).map(|row| usize::from(row % 4 == 0)).collect();
	// The test rows 0..8 are shifted far above the train range of the first feature.
	let features = Array2::from_shape_fn((n_rows, 2), |(row, column)| match column {
		0 => {
			let shift = if row < 8 { 5.0 } else { 0.0 };
			shift + labels[row] as f64 + (row % 5) as f64 * 0.05
		}
		_ => (row % 3) as f64 * 0.1,
	});
	let design = Design {
		features,
		labels,
		groups: (0..n_rows).map(|row| row / 4).collect(),
		feature_names: vec!["steps".to_owned(), "mood".to_owned()],
		nominal_indices: vec![],
		id_column: "id".to_owned(),
	};
	let split = FoldSplit {
		train: (8..40).collect(),
		test: (0..8).collect(),
	};
	let registry = Registry::default();
	let family = registry.get("LogisticR").unwrap();
	let options = ModelOptions::LogisticR(lagsweep_linear::TrainOptions {
		c: 100.0,
		..Default::default()
	});
	let run = |scaling| {
		let settings = Settings {
			scaling,
			..Settings::default()
		};
		let context = FoldContext {
			family,
			options: &options,
			optimize: false,
			importance: false,
			seed: 0,
			settings: &settings,
		};
		run_fold(&design, &split, 0, &context).unwrap()
	};
	// Scaled with the train range every shifted test row looks positive.
	let fit_on_train = run(ScalingMode::FitOnTrain);
	assert!(fit_on_train.test_predictions.iter().all(|prediction| *prediction == 1));
	// Scaled with its own range the test partition matches the train distribution again.
	let per_partition = run(ScalingMode::PerPartition);
	assert_eq!(per_partition.test_predictions, per_partition.test_labels);
}

#[test]
fn test_run_fold_with_grid_search() {
	use crate::model::Family;
	use lagsweep_tree::ForestTrainOptions;
	fn factory(seed: u64) -> ModelOptions {
		ModelOptions::RF(ForestTrainOptions {
			seed,
			..Default::default()
		})
	}
	fn grid(seed: u64) -> Vec<ModelOptions> {
		[5, 10]
			.iter()
			.map(|n_trees| {
				ModelOptions::RF(ForestTrainOptions {
					n_trees: *n_trees,
					compute_oob_score: true,
					seed,
					..Default::default()
				})
			})
			.collect()
	}
	let family = FamilySpec {
		family: Family::RF,
		factory,
		grid,
		n_jobs: Some(1),
	};
	let design = design();
	let options = factory(0);
	let settings = Settings::default();
	let split = FoldSplit {
		train: (8..40).collect(),
		test: (0..8).collect(),
	};
	let context = FoldContext {
		family: &family,
		options: &options,
		optimize: true,
		importance: false,
		seed: 0,
		settings: &settings,
	};
	let result = run_fold(&design, &split, 0, &context).unwrap();
	// Only the grid's forests compute an out-of-bag score.
	let oob_accuracy = result.oob_accuracy.unwrap();
	assert!((0.0..=1.0).contains(&oob_accuracy));
	assert!((0.0..=1.0).contains(&result.auc));
}
