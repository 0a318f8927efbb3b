/*!
This crate runs cross validated classification experiments over lagged feature sets.

A [`FeatureSet`](struct.FeatureSet.html) is turned into a design matrix, split into group stratified folds, and every fold is imputed, upsampled with SMOTE-NC, scaled, fit and evaluated by [`run_fold`](fn.run_fold.html). [`run_experiment`](fn.run_experiment.html) repeats this for every run and model family and appends the results to the CSV tables of a [`ResultStore`](struct.ResultStore.html). [`tune_lags`](fn.tune_lags.html) and [`compare`](fn.compare.html) drive experiments across lag counts.
*/

#![allow(clippy::tabs_in_doc_comments)]

mod attribution;
mod config;
mod error;
mod experiment;
mod feature_set;
mod fold;
mod grid;
mod model;
mod progress;
mod results;
mod split;
mod sweep;

pub use self::attribution::{aggregate_attributions, AggregatedAttribution, FoldAttribution};
pub use self::config::{load_config, Config, ExplainerConfig, ExplainerSettings, Settings};
pub use self::error::Error;
pub use self::experiment::{
	run_experiment, ExperimentOptions, ExperimentOutput, FamilyOutput, ModelSpec, N_FOLDS,
};
pub use self::feature_set::{Design, FeatureSet, Horizon};
pub use self::fold::{run_fold, FoldContext, FoldResult, ScalingMode};
pub use self::grid::{grid_search, logspace, GridSearchOptions, GridSearchOutput, Scoring};
pub use self::model::{Family, FamilySpec, Model, ModelOptions, Registry};
pub use self::progress::{Progress, SweepProgress};
pub use self::results::{
	attribution_key, read_blob, write_blob, AttributionBlob, AucRecord, ResultStore, RocRecord,
	RunRecord, TestRowsBlob, AGGREGATE_RUN, AUC_RESULTS_FILE_NAME, ROC_CURVES_FILE_NAME,
	RUN_RESULTS_FILE_NAME,
};
pub use self::split::{FoldSplit, StratifiedGroupKFold};
pub use self::sweep::{compare, tune_lags, LagSweep, LagSweepOptions, SWEEP_DEPTHS, SWEEP_N_RUNS};
