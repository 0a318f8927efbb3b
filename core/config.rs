/*!
This module defines the `Config` struct, which is read from an optional YAML file, and the `Settings` it resolves to once every missing field has taken its default.
*/

use crate::{fold::ScalingMode, grid::Scoring, model::Family};
use anyhow::{Context, Result};
use lagsweep_metrics::RocAggregation;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
	pub n_runs: Option<usize>,
	pub results_dir: Option<PathBuf>,
	pub attributions_dir: Option<PathBuf>,
	pub scoring: Option<Scoring>,
	pub roc_aggregation: Option<RocAggregation>,
	pub scaling: Option<ScalingMode>,
	pub impute: Option<bool>,
	pub n_jobs: Option<usize>,
	pub models: Option<Vec<String>>,
	pub explainer: Option<ExplainerConfig>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExplainerConfig {
	pub n_background: Option<usize>,
	pub n_samples: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
	pub n_runs: usize,
	pub results_dir: PathBuf,
	pub attributions_dir: PathBuf,
	pub scoring: Scoring,
	pub roc_aggregation: RocAggregation,
	pub scaling: ScalingMode,
	pub impute: bool,
	/// Caps the number of threads of each grid search.
	pub n_jobs: Option<usize>,
	/// The families run when a request does not name any.
	pub models: Vec<String>,
	pub explainer: ExplainerSettings,
}

/// Options for the sampling explainer.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplainerSettings {
	/// The maximum number of k-means centroids summarizing the training partition.
	pub n_background: usize,
	/// The number of sampled feature orderings per explained row.
	pub n_samples: usize,
}

impl Default for ExplainerSettings {
	fn default() -> Self {
		Self {
			n_background: 10,
			n_samples: 32,
		}
	}
}

impl Default for Settings {
	fn default() -> Self {
		Settings::from_config(None)
	}
}

impl Settings {
	pub fn from_config(config: Option<Config>) -> Settings {
		let config = config.unwrap_or_default();
		let explainer = config.explainer.unwrap_or_default();
		let explainer_defaults = ExplainerSettings::default();
		Settings {
			n_runs: config.n_runs.unwrap_or(5),
			results_dir: config.results_dir.unwrap_or_else(|| "results".into()),
			attributions_dir: config
				.attributions_dir
				.unwrap_or_else(|| "feature_importance".into()),
			scoring: config.scoring.unwrap_or(Scoring::Recall),
			roc_aggregation: config.roc_aggregation.unwrap_or(RocAggregation::Mean),
			scaling: config.scaling.unwrap_or(ScalingMode::FitOnTrain),
			impute: config.impute.unwrap_or(true),
			n_jobs: config.n_jobs,
			models: config.models.unwrap_or_else(|| {
				[Family::LogisticR, Family::RF, Family::SVM]
					.iter()
					.map(|family| family.to_string())
					.collect()
			}),
			explainer: ExplainerSettings {
				n_background: explainer
					.n_background
					.unwrap_or(explainer_defaults.n_background),
				n_samples: explainer.n_samples.unwrap_or(explainer_defaults.n_samples),
			},
		}
	}
}

/// Load the config from the config file, if provided.
pub fn load_config(config_path: Option<&Path>) -> Result<Option<Config>> {
	if let Some(config_path) = config_path {
		let config = std::fs::read_to_string(config_path)
			.with_context(|| format!("failed to read config file {}", config_path.display()))?;
		let config = serde_yaml::from_str(&config)
			.with_context(|| format!("failed to parse config file {}", config_path.display()))?;
		Ok(Some(config))
	} else {
		Ok(None)
	}
}

#[test]
fn test_defaults() {
	let settings = Settings::default();
	assert_eq!(settings.n_runs, 5);
	assert_eq!(settings.results_dir, PathBuf::from("results"));
	assert_eq!(settings.attributions_dir, PathBuf::from("feature_importance"));
	assert_eq!(settings.scoring, Scoring::Recall);
	assert_eq!(settings.roc_aggregation, RocAggregation::Mean);
	assert_eq!(settings.scaling, ScalingMode::FitOnTrain);
	assert!(settings.impute);
	assert_eq!(settings.models, vec!["LogisticR", "RF", "SVM"]);
	assert_eq!(settings.explainer, ExplainerSettings::default());
}

#[test]
fn test_parse_config() {
	let config: Config = serde_yaml::from_str(
		r#"
n_runs: 2
scoring: auc_roc
roc_aggregation: pooled
scaling: per_partition
models: [XGB]
explainer:
  n_samples: 8
"#,
	)
	.unwrap();
	let settings = Settings::from_config(Some(config));
	assert_eq!(settings.n_runs, 2);
	assert_eq!(settings.scoring, Scoring::AucRoc);
	assert_eq!(settings.roc_aggregation, RocAggregation::Pooled);
	assert_eq!(settings.scaling, ScalingMode::PerPartition);
	assert_eq!(settings.models, vec!["XGB"]);
	assert_eq!(settings.explainer.n_samples, 8);
	assert_eq!(settings.explainer.n_background, 10);
	assert!(serde_yaml::from_str::<Config>("n_rums: 2").is_err());
}
