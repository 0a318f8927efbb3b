use lagsweep_features::{ImputeError, LagError, UpsampleError};
use lagsweep_kernel::ExplainError;
use lagsweep_metrics::RocError;

/// The integrity and model errors that abort a fold or a run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("unknown model family \"{0}\", expected one of LogisticR, RF, XGB, SVM")]
	UnknownFamily(String),
	#[error("unknown horizon \"{0}\", expected one of study_day, study_week, study_month")]
	UnknownHorizon(String),
	#[error("the column \"{0}\" does not exist")]
	UnknownColumn(String),
	#[error("the target column \"{0}\" must only contain the values 0 and 1")]
	InvalidTarget(String),
	#[error("nominal column index {index} is out of range for {n_features} features")]
	NominalIndex { index: usize, n_features: usize },
	#[error("the id column \"{0}\" must not be one of the model's input features")]
	IdColumnInFeatures(String),
	#[error("{n_groups} groups cannot be split into {n_splits} folds")]
	TooFewGroups { n_groups: usize, n_splits: usize },
	#[error("attributions are misaligned: {0}")]
	AttributionMisaligned(String),
	#[error("no grid point produced a finite score")]
	NoFiniteScore,
	#[error(transparent)]
	Lag(#[from] LagError),
	#[error(transparent)]
	Impute(#[from] ImputeError),
	#[error(transparent)]
	Upsample(#[from] UpsampleError),
	#[error(transparent)]
	Roc(#[from] RocError),
	#[error(transparent)]
	Explain(#[from] ExplainError),
	#[error(transparent)]
	LinearTrain(#[from] lagsweep_linear::TrainError),
	#[error(transparent)]
	TreeTrain(#[from] lagsweep_tree::TrainError),
	#[error(transparent)]
	KernelTrain(#[from] lagsweep_kernel::TrainError),
	#[error("failed to build the grid search thread pool: {0}")]
	ThreadPool(String),
}
