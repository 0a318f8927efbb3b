/*!
This crate implements the preprocessing applied to a feature set before a classifier sees it: [lagging](lag/index.html) the observations of each group, [iterative imputation](struct.IterativeImputer.html) of missing values, [SMOTE-NC](struct.SmoteNc.html) upsampling of the minority class and [min-max scaling](struct.MinMaxScaler.html).

Imputation, upsampling and scaling follow the fit/transform convention: statistics are fit on the train partition of a fold and the test partition is only ever transformed with them.
*/

#![allow(clippy::tabs_in_doc_comments)]

mod impute;
pub mod lag;
mod scale;
mod upsample;

pub use self::impute::{ImputeError, IterativeImputer, IterativeImputerOptions};
pub use self::lag::{lag, lagged_name, LagError};
pub use self::scale::MinMaxScaler;
pub use self::upsample::{SmoteNc, UpsampleError, Upsampled};
