/*!
This crate provides a basic implementation of dataframes, which are two dimensional arrays of data where each column can have a different data type, like a spreadsheet. It implements only what the experiment driver needs: loading a feature set from csv, selecting rows and columns, and converting columns to `f64` for the design matrix.
*/

#![allow(clippy::tabs_in_doc_comments)]

use itertools::izip;
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use std::{collections::HashMap, num::NonZeroUsize};

pub mod load;

pub use self::load::*;

#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
	pub columns: Vec<Column>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
	Unknown(UnknownColumn),
	Number(NumberColumn),
	Enum(EnumColumn),
	Text(TextColumn),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnknownColumn {
	pub name: String,
	pub len: usize,
}

/// A numeric column. Missing values are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberColumn {
	pub name: String,
	pub data: Vec<f64>,
}

/// A nominal column. Each value is `None` when missing or the 1-based position of the value in `options`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumColumn {
	pub name: String,
	pub options: Vec<String>,
	pub data: Vec<Option<NonZeroUsize>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextColumn {
	pub name: String,
	pub data: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
	Unknown,
	Number,
	Enum { options: Vec<String> },
	Text,
}

impl DataFrame {
	pub fn new(column_names: Vec<String>, column_types: Vec<ColumnType>) -> Self {
		let columns = column_names
			.into_iter()
			.zip(column_types.into_iter())
			.map(|(column_name, column_type)| match column_type {
				ColumnType::Unknown => Column::Unknown(UnknownColumn::new(column_name)),
				ColumnType::Number => Column::Number(NumberColumn::new(column_name)),
				ColumnType::Enum { options } => Column::Enum(EnumColumn::new(column_name, options)),
				ColumnType::Text => Column::Text(TextColumn::new(column_name)),
			})
			.collect();
		Self { columns }
	}

	pub fn ncols(&self) -> usize {
		self.columns.len()
	}

	pub fn nrows(&self) -> usize {
		self.columns.first().map(|column| column.len()).unwrap_or(0)
	}

	pub fn column_names(&self) -> impl Iterator<Item = &str> {
		self.columns.iter().map(|column| column.name())
	}

	pub fn column(&self, name: &str) -> Option<&Column> {
		self.columns.iter().find(|column| column.name() == name)
	}

	pub fn column_index(&self, name: &str) -> Option<usize> {
		self.columns.iter().position(|column| column.name() == name)
	}

	/// Produce a new dataframe containing the rows at `indices`, in that order.
	pub fn take(&self, indices: &[usize]) -> DataFrame {
		let columns = self
			.columns
			.iter()
			.map(|column| column.take(indices))
			.collect();
		DataFrame { columns }
	}

	/// Convert the named columns to a row major `f64` matrix. Enum columns produce their 0-based option index and missing values produce NaN. Returns `None` if any column is missing or is a text column.
	pub fn to_rows_f64(&self, column_names: &[&str]) -> Option<Array2<f64>> {
		let mut rows = Array2::from_elem((self.nrows(), column_names.len()), f64::NAN);
		for (mut ndarray_column, column_name) in izip!(rows.axis_iter_mut(Axis(1)), column_names)
		{
			let values = self.column(column_name)?.to_f64()?;
			for (a, b) in izip!(ndarray_column.iter_mut(), values) {
				*a = b;
			}
		}
		Some(rows)
	}
}

impl Column {
	pub fn len(&self) -> usize {
		match self {
			Self::Unknown(s) => s.len,
			Self::Number(s) => s.data.len(),
			Self::Enum(s) => s.data.len(),
			Self::Text(s) => s.data.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn name(&self) -> &str {
		match self {
			Self::Unknown(s) => s.name.as_str(),
			Self::Number(s) => s.name.as_str(),
			Self::Enum(s) => s.name.as_str(),
			Self::Text(s) => s.name.as_str(),
		}
	}

	pub fn set_name(&mut self, name: String) {
		match self {
			Self::Unknown(s) => s.name = name,
			Self::Number(s) => s.name = name,
			Self::Enum(s) => s.name = name,
			Self::Text(s) => s.name = name,
		}
	}

	pub fn as_number(&self) -> Option<&NumberColumn> {
		match self {
			Self::Number(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_enum(&self) -> Option<&EnumColumn> {
		match self {
			Self::Enum(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_text(&self) -> Option<&TextColumn> {
		match self {
			Self::Text(s) => Some(s),
			_ => None,
		}
	}

	pub fn take(&self, indices: &[usize]) -> Column {
		match self {
			Self::Unknown(column) => Column::Unknown(UnknownColumn {
				name: column.name.clone(),
				len: indices.len(),
			}),
			Self::Number(column) => Column::Number(NumberColumn {
				name: column.name.clone(),
				data: indices.iter().map(|i| column.data[*i]).collect(),
			}),
			Self::Enum(column) => Column::Enum(EnumColumn {
				name: column.name.clone(),
				options: column.options.clone(),
				data: indices.iter().map(|i| column.data[*i]).collect(),
			}),
			Self::Text(column) => Column::Text(TextColumn {
				name: column.name.clone(),
				data: indices.iter().map(|i| column.data[*i].clone()).collect(),
			}),
		}
	}

	/// Values of a number or enum column as `f64`.
	pub fn to_f64(&self) -> Option<Vec<f64>> {
		match self {
			Self::Unknown(column) => Some(vec![f64::NAN; column.len]),
			Self::Number(column) => Some(column.data.clone()),
			Self::Enum(column) => Some(
				column
					.data
					.iter()
					.map(|value| match value {
						Some(value) => (value.get() - 1).to_f64().unwrap(),
						None => f64::NAN,
					})
					.collect(),
			),
			Self::Text(_) => None,
		}
	}

	/**
	Dense codes for the values of this column in order of first appearance, used to turn an id column into groups. Missing values share one code.
	*/
	pub fn codes(&self) -> Vec<usize> {
		let keys: Vec<String> = match self {
			Self::Unknown(column) => vec![String::new(); column.len],
			Self::Number(column) => column.data.iter().map(|v| v.to_string()).collect(),
			Self::Enum(column) => column
				.data
				.iter()
				.map(|v| v.map(|v| v.get().to_string()).unwrap_or_default())
				.collect(),
			Self::Text(column) => column.data.clone(),
		};
		let mut codes_by_key: HashMap<String, usize> = HashMap::new();
		keys.into_iter()
			.map(|key| {
				let next = codes_by_key.len();
				*codes_by_key.entry(key).or_insert(next)
			})
			.collect()
	}
}

impl UnknownColumn {
	pub fn new(name: String) -> Self {
		Self { name, len: 0 }
	}
}

impl NumberColumn {
	pub fn new(name: String) -> Self {
		Self {
			name,
			data: Vec::new(),
		}
	}
}

impl EnumColumn {
	pub fn new(name: String, options: Vec<String>) -> Self {
		Self {
			name,
			options,
			data: Vec::new(),
		}
	}
}

impl TextColumn {
	pub fn new(name: String) -> Self {
		Self {
			name,
			data: Vec::new(),
		}
	}
}

#[test]
fn test_take_and_codes() {
	let dataframe = DataFrame {
		columns: vec![
			Column::Text(TextColumn {
				name: "id".to_owned(),
				data: vec!["b".to_owned(), "a".to_owned(), "b".to_owned()],
			}),
			Column::Number(NumberColumn {
				name: "x".to_owned(),
				data: vec![1.0, f64::NAN, 3.0],
			}),
		],
	};
	assert_eq!(dataframe.column("id").unwrap().codes(), vec![0, 1, 0]);
	let taken = dataframe.take(&[2, 0]);
	assert_eq!(taken.nrows(), 2);
	assert_eq!(taken.column("x").unwrap().as_number().unwrap().data, vec![3.0, 1.0]);
	assert!(dataframe.to_rows_f64(&["id"]).is_none());
	let rows = dataframe.to_rows_f64(&["x"]).unwrap();
	assert!(rows[[1, 0]].is_nan());
}
