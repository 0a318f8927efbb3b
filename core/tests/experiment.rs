use lagsweep_core::{
	read_blob, run_experiment, AttributionBlob, ExperimentOptions, Family, FeatureSet, Horizon,
	ModelSpec, Registry, ResultStore, Settings, TestRowsBlob, AUC_RESULTS_FILE_NAME,
	ROC_CURVES_FILE_NAME, RUN_RESULTS_FILE_NAME,
};
use lagsweep_metrics::RocAggregation;
use lagsweep_dataframe::{Column, DataFrame, NumberColumn, TextColumn};
use std::path::Path;

/// 20 participants with 5 weekly observations each. Two observations of every participant are adherent.
fn feature_set() -> FeatureSet {
	let n_rows = 100;
	let adherent: Vec<f64> = (0..n_rows).map(|row| if row % 5 < 2 { 1.0 } else { 0.0 }).collect();
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
				data: (0..n_rows).map(|row| format!("p{:02}", row / 5)).collect(),
			}),
			number("study_week", (0..n_rows).map(|row| (5 + row % 5) as f64).collect()),
			number("site", (0..n_rows).map(|row| ((row / 5) % 2) as f64).collect()),
			number(
				"steps",
				(0..n_rows)
					.map(|row| 4000.0 + 3000.0 * adherent[row] + ((row * 37) % 11) as f64 * 150.0)
					.collect(),
			),
			number(
				"mood",
				(0..n_rows)
					.map(|row| ((row * 13) % 7) as f64 + adherent[row])
					.collect(),
			),
			number("adherent", adherent.clone()),
		],
	};
	FeatureSet {
		name: "mems".to_owned(),
		dataframe,
		id_column: "id".to_owned(),
		target_column: "adherent".to_owned(),
		nominal_columns: vec!["site".to_owned()],
		horizon: Horizon::StudyWeek,
		n_lags: None,
	}
}

/// Replace the labels of a feature set, keeping its features.
fn with_adherent(mut feature_set: FeatureSet, adherent: Vec<f64>) -> FeatureSet {
	for column in feature_set.dataframe.columns.iter_mut() {
		if let Column::Number(column) = column {
			if column.name == "adherent" {
				column.data = adherent.clone();
			}
		}
	}
	feature_set
}

fn settings(dir: &Path) -> Settings {
	Settings {
		results_dir: dir.join("results"),
		attributions_dir: dir.join("feature_importance"),
		..Settings::default()
	}
}

fn read_lines(path: &Path) -> Vec<String> {
	std::fs::read_to_string(path)
		.unwrap()
		.lines()
		.map(|line| line.to_owned())
		.collect()
}

#[test]
fn test_random_forest_runs_append_records() {
	let dir = tempfile::tempdir().unwrap();
	let settings = settings(dir.path());
	let store = ResultStore::from_settings(&settings);
	let registry = Registry::default();
	let mut progress_events = 0;
	let output = run_experiment(
		&feature_set(),
		&[ModelSpec::new(Family::RF)],
		&registry,
		&settings,
		&ExperimentOptions::default(),
		&store,
		&mut |_| progress_events += 1,
	)
	.unwrap();
	assert_eq!(output.families.len(), 1);
	assert_eq!(output.families[0].runs.len(), 5);
	// One event per run and per fold, and one for the aggregation.
	assert_eq!(progress_events, 5 + 5 * 5 + 1);
	for record in output.families[0].runs.iter() {
		assert!((0.0..=1.0).contains(&record.train_accuracy));
		assert!((0.0..=1.0).contains(&record.test_accuracy));
		assert_eq!(record.n_features, 4);
		assert_eq!(record.n_samples, 100);
		assert_eq!(record.test_support, 100);
	}
	let roc = &output.families[0].roc;
	assert_eq!(roc.true_positive_rates.len(), 100);
	assert_eq!(roc.true_positive_rates[0], 0.0);
	assert_eq!(roc.true_positive_rates[99], 1.0);

	let results_dir = dir.path().join("results");
	assert_eq!(read_lines(&results_dir.join(RUN_RESULTS_FILE_NAME)).len(), 1 + 5);
	assert_eq!(read_lines(&results_dir.join(AUC_RESULTS_FILE_NAME)).len(), 1 + 1);
	assert_eq!(read_lines(&results_dir.join(ROC_CURVES_FILE_NAME)).len(), 1 + 100);
	let auc_lines = read_lines(&results_dir.join(AUC_RESULTS_FILE_NAME));
	assert!(auc_lines[1].starts_with("mems,adherent,RF,-1,,false,,"));

	// A rerun appends below the earlier rows without repeating the header.
	let settings = Settings {
		n_runs: 1,
		..settings
	};
	run_experiment(
		&feature_set(),
		&[ModelSpec::new(Family::RF)],
		&registry,
		&settings,
		&ExperimentOptions::default(),
		&store,
		&mut |_| {},
	)
	.unwrap();
	let run_lines = read_lines(&results_dir.join(RUN_RESULTS_FILE_NAME));
	assert_eq!(run_lines.len(), 1 + 6);
	assert_eq!(
		run_lines
			.iter()
			.filter(|line| line.starts_with("featureset,"))
			.count(),
		1
	);
	assert_eq!(read_lines(&results_dir.join(AUC_RESULTS_FILE_NAME)).len(), 1 + 2);
}

#[test]
fn test_every_family_is_processed_with_attributions() {
	let dir = tempfile::tempdir().unwrap();
	let settings = Settings {
		n_runs: 1,
		..settings(dir.path())
	};
	let store = ResultStore::from_settings(&settings);
	let output = run_experiment(
		&feature_set(),
		&[ModelSpec::new(Family::LogisticR), ModelSpec::new(Family::SVM)],
		&Registry::default(),
		&settings,
		&ExperimentOptions {
			importance: true,
			..Default::default()
		},
		&store,
		&mut |_| {},
	)
	.unwrap();
	assert_eq!(output.families.len(), 2);
	let auc_lines = read_lines(&dir.path().join("results").join(AUC_RESULTS_FILE_NAME));
	assert_eq!(auc_lines.len(), 1 + 2);

	let attributions_dir = dir.path().join("feature_importance");
	let test_rows: TestRowsBlob =
		read_blob(&attributions_dir.join("X_test_mems_LogisticR_0_lags.ob")).unwrap();
	assert_eq!(test_rows.rows.dim(), (100, 4));
	assert_eq!(test_rows.feature_names, vec!["study_week", "site", "steps", "mood"]);
	let logistic: AttributionBlob =
		read_blob(&attributions_dir.join("shap_mems_LogisticR_0_lags.ob")).unwrap();
	assert_eq!(logistic.outputs.len(), 1);
	assert_eq!(logistic.outputs[0].dim(), (100, 4));
	let svm: AttributionBlob =
		read_blob(&attributions_dir.join("shap_mems_SVM_0_lags.ob")).unwrap();
	assert_eq!(svm.outputs.len(), 2);
	assert_eq!(svm.outputs[1].dim(), (100, 4));
	assert_eq!(svm.outputs[0], svm.outputs[1].mapv(|value| -value));
}

#[test]
fn test_folds_without_positives_do_not_abort_the_run() {
	// Only p00, p01 and p02 are ever adherent, so at least two of the five test folds hold no positive row.
	let adherent = (0..100)
		.map(|row| if row < 15 && row % 5 < 2 { 1.0 } else { 0.0 })
		.collect();
	let feature_set = with_adherent(feature_set(), adherent);
	let dir = tempfile::tempdir().unwrap();
	let settings = Settings {
		n_runs: 1,
		..settings(dir.path())
	};
	let store = ResultStore::from_settings(&settings);
	let output = run_experiment(
		&feature_set,
		&[ModelSpec::new(Family::RF), ModelSpec::new(Family::LogisticR)],
		&Registry::default(),
		&settings,
		&ExperimentOptions::default(),
		&store,
		&mut |_| {},
	)
	.unwrap();
	assert_eq!(output.families.len(), 2);
	for family in output.families.iter() {
		assert!((0.0..=1.0).contains(&family.roc.auc_mean));
		assert!(family.roc.true_positive_rates.iter().all(|tpr| tpr.is_finite()));
		assert_eq!(family.roc.true_positive_rates[99], 1.0);
	}
	let results_dir = dir.path().join("results");
	assert_eq!(read_lines(&results_dir.join(AUC_RESULTS_FILE_NAME)).len(), 1 + 2);
	assert_eq!(read_lines(&results_dir.join(ROC_CURVES_FILE_NAME)).len(), 1 + 200);
}

#[test]
fn test_pooled_roc_aggregation() {
	let dir = tempfile::tempdir().unwrap();
	let settings = Settings {
		n_runs: 2,
		roc_aggregation: RocAggregation::Pooled,
		..settings(dir.path())
	};
	let store = ResultStore::from_settings(&settings);
	let output = run_experiment(
		&feature_set(),
		&[ModelSpec::new(Family::LogisticR)],
		&Registry::default(),
		&settings,
		&ExperimentOptions::default(),
		&store,
		&mut |_| {},
	)
	.unwrap();
	let roc = &output.families[0].roc;
	assert_eq!(roc.true_positive_rates.len(), 100);
	assert_eq!(roc.true_positive_rates[0], 0.0);
	assert_eq!(roc.true_positive_rates[99], 1.0);
	assert!(roc
		.true_positive_rates
		.windows(2)
		.all(|pair| pair[0] <= pair[1]));
	assert!((0.0..=1.0).contains(&roc.auc_mean));
	assert!(roc.auc_std >= 0.0);
	let results_dir = dir.path().join("results");
	assert_eq!(read_lines(&results_dir.join(RUN_RESULTS_FILE_NAME)).len(), 1 + 2);
	assert_eq!(read_lines(&results_dir.join(AUC_RESULTS_FILE_NAME)).len(), 1 + 1);
}

#[test]
fn test_boosting_is_explained_in_logit_space() {
	let dir = tempfile::tempdir().unwrap();
	let settings = Settings {
		n_runs: 1,
		..settings(dir.path())
	};
	let store = ResultStore::from_settings(&settings);
	let output = run_experiment(
		&feature_set(),
		&[ModelSpec::new(Family::XGB)],
		&Registry::default(),
		&settings,
		&ExperimentOptions {
			importance: true,
			..Default::default()
		},
		&store,
		&mut |_| {},
	)
	.unwrap();
	assert_eq!(output.families[0].family, Family::XGB);
	assert!((0.0..=1.0).contains(&output.families[0].roc.auc_mean));
	let attributions_dir = dir.path().join("feature_importance");
	let boosting: AttributionBlob =
		read_blob(&attributions_dir.join("shap_mems_XGB_0_lags.ob")).unwrap();
	assert_eq!(boosting.outputs.len(), 1);
	assert_eq!(boosting.outputs[0].dim(), (100, 4));
	assert!(boosting.outputs[0].iter().all(|value| value.is_finite()));
}
