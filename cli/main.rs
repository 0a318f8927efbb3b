//! This module contains the main entrypoint to the lagsweep cli.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use lagsweep_core::{
	compare, load_config, run_experiment, tune_lags, ExperimentOptions, FeatureSet, Horizon,
	LagSweepOptions, ModelSpec, Progress, Registry, ResultStore, Settings,
};
use lagsweep_dataframe::{ColumnType, DataFrame, FromCsvOptions};
use std::{collections::BTreeMap, path::PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(
	about = "Run cross validated classification experiments over lagged feature sets.",
	disable_help_subcommand = true
)]
struct Options {
	#[clap(short, long, global = true, help = "the path to a config file")]
	config: Option<PathBuf>,
	#[clap(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	#[clap(name = "run", about = "run an experiment on a feature set")]
	Run(RunOptions),
	#[clap(
		name = "compare",
		about = "run an untuned pass then a tuned pass with attributions"
	)]
	Compare(CompareOptions),
	#[clap(name = "sweep", about = "sweep the number of lags and the forest depth")]
	Sweep(FeatureSetOptions),
}

#[derive(Args, Debug)]
struct FeatureSetOptions {
	#[clap(short, long, help = "the path to your .csv file")]
	file: PathBuf,
	#[clap(long, help = "the name of the feature set, defaults to the file name")]
	name: Option<String>,
	#[clap(long, default_value = "id", help = "the column identifying each participant")]
	id_column: String,
	#[clap(short, long, help = "the name of the column to predict")]
	target: String,
	#[clap(long, default_value = "study_day", help = "study_day, study_week or study_month")]
	horizon: String,
	#[clap(long = "nominal", help = "a nominal column, may be repeated")]
	nominal_columns: Vec<String>,
}

#[derive(Args, Debug)]
struct RunOptions {
	#[clap(flatten)]
	feature_set: FeatureSetOptions,
	#[clap(long, help = "lag the feature set by this many time steps")]
	n_lags: Option<usize>,
	#[clap(short, long = "model", help = "a model family to run, may be repeated")]
	models: Vec<String>,
	#[clap(long, help = "tune hyperparameters with a grid search")]
	optimize: bool,
	#[clap(long, help = "compute and write feature attributions")]
	importance: bool,
	#[clap(long, help = "drop the rows in the horizon's ramp-up period")]
	exclude_ramp_up: bool,
}

#[derive(Args, Debug)]
struct CompareOptions {
	#[clap(flatten)]
	feature_set: FeatureSetOptions,
	#[clap(long, help = "lag the feature set by this many time steps")]
	n_lags: usize,
	#[clap(short, long = "model", help = "a model family to run, may be repeated")]
	models: Vec<String>,
	#[clap(long, help = "drop the rows in the horizon's ramp-up period")]
	exclude_ramp_up: bool,
}

fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.with_writer(std::io::stderr)
		.init();
	let options = Options::parse();
	let result = load_config(options.config.as_deref())
		.map(Settings::from_config)
		.and_then(|settings| match options.command {
			Command::Run(options) => cli_run(options, &settings),
			Command::Compare(options) => cli_compare(options, &settings),
			Command::Sweep(options) => cli_sweep(options, &settings),
		});
	if let Err(error) = result {
		eprintln!("{}: {:#}", "error".red().bold(), error);
		std::process::exit(1);
	}
}

fn cli_run(options: RunOptions, settings: &Settings) -> Result<()> {
	let registry = Registry::default();
	let mut feature_set = load_feature_set(&options.feature_set)?;
	if options.exclude_ramp_up {
		feature_set = feature_set.exclude_ramp_up()?;
	}
	if let Some(n_lags) = options.n_lags {
		feature_set = feature_set.lagged(n_lags)?;
	}
	let models = model_specs(&options.models, &registry, settings)?;
	let store = ResultStore::from_settings(settings);
	let output = run_experiment(
		&feature_set,
		&models,
		&registry,
		settings,
		&ExperimentOptions {
			optimize: options.optimize,
			importance: options.importance,
			max_depth: None,
		},
		&store,
		&mut update_progress,
	)?;
	for family in output.families.iter() {
		eprintln!(
			"{} auc {:.3} ± {:.3}",
			family.family, family.roc.auc_mean, family.roc.auc_std
		);
	}
	eprintln!("Results were appended to {}.", settings.results_dir.display());
	Ok(())
}

fn cli_compare(options: CompareOptions, settings: &Settings) -> Result<()> {
	let registry = Registry::default();
	let mut feature_set = load_feature_set(&options.feature_set)?;
	if options.exclude_ramp_up {
		feature_set = feature_set.exclude_ramp_up()?;
	}
	let models = model_specs(&options.models, &registry, settings)?;
	let store = ResultStore::from_settings(settings);
	let (baseline, optimized) = compare(
		&feature_set,
		options.n_lags,
		&models,
		&registry,
		settings,
		&store,
		&mut update_progress,
	)?;
	for (baseline, optimized) in baseline.families.iter().zip(optimized.families.iter()) {
		eprintln!(
			"{} auc {:.3} untuned, {:.3} tuned",
			baseline.family, baseline.roc.auc_mean, optimized.roc.auc_mean
		);
	}
	eprintln!("Results were appended to {}.", settings.results_dir.display());
	Ok(())
}

fn cli_sweep(options: FeatureSetOptions, settings: &Settings) -> Result<()> {
	let registry = Registry::default();
	let feature_set = load_feature_set(&options)?;
	let store = ResultStore::from_settings(settings);
	let sweep = tune_lags(
		&feature_set,
		&LagSweepOptions::for_horizon(feature_set.horizon),
		&registry,
		settings,
		&store,
		&mut update_progress,
	)?;
	for (n_lags, aucs) in sweep.lags.iter().zip(sweep.auc.rows()) {
		let aucs: Vec<String> = aucs.iter().map(|auc| format!("{:.3}", auc)).collect();
		eprintln!("{:>2} lags: {}", n_lags, aucs.join(" "));
	}
	if let Some((n_lags, max_depth, auc)) = sweep.best() {
		eprintln!(
			"The best AUC, {:.3}, was reached with {} lags and depth {}.",
			auc, n_lags, max_depth
		);
	}
	Ok(())
}

fn load_feature_set(options: &FeatureSetOptions) -> Result<FeatureSet> {
	let horizon: Horizon = options.horizon.parse()?;
	// Ids are labels even when they look like numbers.
	let mut column_types = BTreeMap::new();
	column_types.insert(options.id_column.clone(), ColumnType::Text);
	let dataframe = DataFrame::from_path(
		&options.file,
		FromCsvOptions {
			column_types: Some(column_types),
			..Default::default()
		},
	)?;
	let name = match &options.name {
		Some(name) => name.clone(),
		None => options
			.file
			.file_stem()
			.map(|stem| stem.to_string_lossy().into_owned())
			.unwrap_or_else(|| "featureset".to_owned()),
	};
	info!(
		featureset = %name,
		n_rows = dataframe.nrows(),
		n_columns = dataframe.ncols(),
		"loaded feature set"
	);
	Ok(FeatureSet {
		name,
		dataframe,
		id_column: options.id_column.clone(),
		target_column: options.target.clone(),
		nominal_columns: options.nominal_columns.clone(),
		horizon,
		n_lags: None,
	})
}

fn model_specs(names: &[String], registry: &Registry, settings: &Settings) -> Result<Vec<ModelSpec>> {
	if names.is_empty() {
		return ModelSpec::from_settings(registry, settings);
	}
	names
		.iter()
		.map(|name| Ok(ModelSpec::new(registry.get(name)?.family)))
		.collect()
}

fn update_progress(progress: Progress) {
	match progress {
		Progress::Sweep(progress) => info!(
			n_lags = progress.n_lags,
			max_depth = ?progress.max_depth,
			"sweep step"
		),
		Progress::Run {
			family,
			run,
			n_runs,
		} => info!(%family, "run {} of {}", run + 1, n_runs),
		Progress::Fold {
			family,
			run,
			fold,
			n_folds,
		} => debug!(%family, run, "fold {} of {}", fold + 1, n_folds),
		Progress::Aggregating(family) => debug!(%family, "aggregating runs"),
	}
}
