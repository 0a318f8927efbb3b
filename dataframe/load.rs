use super::*;
use anyhow::Result;
use std::{
	collections::{BTreeMap, BTreeSet},
	path::Path,
};

#[derive(Clone)]
pub struct FromCsvOptions<'a> {
	pub column_types: Option<BTreeMap<String, ColumnType>>,
	pub infer_options: InferOptions,
	pub invalid_values: &'a [&'a str],
}

impl<'a> Default for FromCsvOptions<'a> {
	fn default() -> Self {
		Self {
			column_types: None,
			infer_options: InferOptions::default(),
			invalid_values: DEFAULT_INVALID_VALUES,
		}
	}
}

#[derive(Clone, Debug)]
pub struct InferOptions {
	pub enum_max_unique_values: usize,
}

impl Default for InferOptions {
	fn default() -> Self {
		Self {
			enum_max_unique_values: 100,
		}
	}
}

/// These values are the default values that are considered invalid.
const DEFAULT_INVALID_VALUES: &[&str] = &[
	"", "null", "NULL", "n/a", "N/A", "nan", "-nan", "NaN", "-NaN", "?",
];

fn parse_number(value: &str) -> Option<f64> {
	value.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

impl DataFrame {
	pub fn from_path(path: &Path, options: FromCsvOptions) -> Result<Self> {
		let mut reader = csv::Reader::from_path(path)?;
		Self::from_csv(&mut reader, options)
	}

	pub fn from_csv<R>(reader: &mut csv::Reader<R>, options: FromCsvOptions) -> Result<Self>
	where
		R: std::io::Read,
	{
		let column_names: Vec<String> = reader
			.headers()?
			.into_iter()
			.map(|column_name| column_name.to_owned())
			.collect();
		// The whole file is buffered so that the infer pass and the load pass see the same records without seeking.
		let mut records = Vec::new();
		let mut record = csv::StringRecord::new();
		while reader.read_record(&mut record)? {
			records.push(record.clone());
		}

		let column_types: Vec<ColumnType> = column_names
			.iter()
			.enumerate()
			.map(|(index, column_name)| {
				let column_type = options
					.column_types
					.as_ref()
					.and_then(|column_types| column_types.get(column_name));
				match column_type {
					Some(column_type) => column_type.clone(),
					None => {
						let mut infer_stats =
							InferStats::new(&options.infer_options, options.invalid_values);
						for record in records.iter() {
							infer_stats.update(record.get(index).unwrap_or(""));
						}
						infer_stats.finalize()
					}
				}
			})
			.collect();

		let mut dataframe = Self::new(column_names, column_types);
		for column in dataframe.columns.iter_mut() {
			match column {
				Column::Unknown(_) => {}
				Column::Number(column) => column.data.reserve_exact(records.len()),
				Column::Enum(column) => column.data.reserve_exact(records.len()),
				Column::Text(column) => column.data.reserve_exact(records.len()),
			}
		}
		// Insert the values of each record into the columns of the dataframe.
		for record in records.iter() {
			for (column, value) in dataframe.columns.iter_mut().zip(record.iter()) {
				match column {
					Column::Unknown(column) => {
						column.len += 1;
					}
					Column::Number(column) => {
						column.data.push(parse_number(value).unwrap_or(f64::NAN));
					}
					Column::Enum(column) => {
						let value = column
							.options
							.iter()
							.position(|option| option == value)
							.and_then(|position| NonZeroUsize::new(position + 1));
						column.data.push(value);
					}
					Column::Text(column) => column.data.push(value.to_owned()),
				}
			}
		}
		Ok(dataframe)
	}
}

#[derive(Clone, Debug)]
pub struct InferStats<'a> {
	infer_options: &'a InferOptions,
	invalid_values: &'a [&'a str],
	column_type: InferColumnType,
	unique_values: Option<BTreeSet<String>>,
}

#[derive(PartialEq, Clone, Copy, Debug)]
enum InferColumnType {
	Unknown,
	Number,
	Enum,
	Text,
}

impl<'a> InferStats<'a> {
	pub fn new(infer_options: &'a InferOptions, invalid_values: &'a [&'a str]) -> Self {
		Self {
			infer_options,
			invalid_values,
			column_type: InferColumnType::Unknown,
			unique_values: Some(BTreeSet::new()),
		}
	}

	pub fn update(&mut self, value: &str) {
		if self.invalid_values.contains(&value) {
			return;
		}
		if let Some(unique_values) = self.unique_values.as_mut() {
			if !unique_values.contains(value) {
				unique_values.insert(value.to_owned());
			}
			if unique_values.len() > self.infer_options.enum_max_unique_values {
				self.unique_values = None;
			}
		}
		match self.column_type {
			InferColumnType::Unknown | InferColumnType::Number => {
				if parse_number(value).is_some() {
					self.column_type = InferColumnType::Number;
				} else if self.unique_values.is_some() {
					self.column_type = InferColumnType::Enum;
				} else {
					self.column_type = InferColumnType::Text;
				}
			}
			InferColumnType::Enum => {
				if self.unique_values.is_none() {
					self.column_type = InferColumnType::Text;
				}
			}
			_ => {}
		}
	}

	pub fn finalize(self) -> ColumnType {
		match self.column_type {
			InferColumnType::Unknown => ColumnType::Unknown,
			InferColumnType::Number => ColumnType::Number,
			InferColumnType::Enum => ColumnType::Enum {
				options: self.unique_values.unwrap_or_default().into_iter().collect(),
			},
			InferColumnType::Text => ColumnType::Text,
		}
	}
}

#[test]
fn test_infer() {
	let csv = r#"number,enum,text
1,test,hello
,test,world
"#;
	let df = DataFrame::from_csv(
		&mut csv::Reader::from_reader(std::io::Cursor::new(csv)),
		FromCsvOptions {
			column_types: None,
			infer_options: InferOptions {
				enum_max_unique_values: 1,
			},
			..Default::default()
		},
	)
	.unwrap();
	assert_eq!(df.nrows(), 2);
	assert!(df.column("number").unwrap().as_number().unwrap().data[1].is_nan());
	insta::assert_debug_snapshot!(&df.columns[1..], @r###"
 [
     Enum(
         EnumColumn {
             name: "enum",
             options: [
                 "test",
             ],
             data: [
                 Some(
                     1,
                 ),
                 Some(
                     1,
                 ),
             ],
         },
     ),
     Text(
         TextColumn {
             name: "text",
             data: [
                 "hello",
                 "world",
             ],
         },
     ),
 ]
 "###);
}

#[test]
fn test_column_types() {
	let csv = r#"id,day,mood
p1,1,2
p2,1,3
"#;
	let mut column_types = BTreeMap::new();
	column_types.insert("id".to_owned(), ColumnType::Text);
	let df = DataFrame::from_csv(
		&mut csv::Reader::from_reader(std::io::Cursor::new(csv)),
		FromCsvOptions {
			column_types: Some(column_types),
			..Default::default()
		},
	)
	.unwrap();
	assert_eq!(
		df.column("id").unwrap().as_text().unwrap().data,
		vec!["p1".to_owned(), "p2".to_owned()]
	);
	assert_eq!(
		df.column("mood").unwrap().as_number().unwrap().data,
		vec![2.0, 3.0]
	);
}
