//! Raw event records and the sources they are read from
//!
//! An event record maps field names to scalar, boolean or array values, in the
//! flat layout of columnar collision data. Records are read one at a time from
//! JSON-lines files, each line holding one event.

use crate::{numeric::Float, Result};

use eyre::{eyre, WrapErr};
use serde::{Deserialize, Serialize};

use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader, Lines},
    path::{Path, PathBuf},
};

/// Input file list for which one trigger path is absent from part of the data
const NO_TK_MU50_FILE_LIST: &str = "SingleMuon_Run2016B_APV_ver2_7.txt";

/// Value of a single record field
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    /// Boolean flag (trigger decisions, noise filters, ID bits)
    Flag(bool),

    /// Number
    Scalar(Float),

    /// Per-object array
    Array(Vec<Float>),
}

/// One event worth of raw fields
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct EventRecord {
    /// Field storage
    fields: HashMap<String, FieldValue>,
}
//
impl EventRecord {
    // ### CONSTRUCTION ###

    /// Start an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any previous value
    pub fn set(&mut self, name: impl Into<String>, value: FieldValue) -> &mut Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Builder-style shorthand for scalar fields
    pub fn with_scalar(mut self, name: &str, value: Float) -> Self {
        self.set(name, FieldValue::Scalar(value));
        self
    }

    /// Builder-style shorthand for boolean fields
    pub fn with_flag(mut self, name: &str, value: bool) -> Self {
        self.set(name, FieldValue::Flag(value));
        self
    }

    /// Builder-style shorthand for array fields
    pub fn with_array(mut self, name: &str, values: Vec<Float>) -> Self {
        self.set(name, FieldValue::Array(values));
        self
    }

    // ### FIELD ACCESS ###

    /// Truth that a field is present
    pub fn has(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    fn field(&self, name: &str) -> Result<&FieldValue> {
        self.fields
            .get(name)
            .ok_or_else(|| eyre!("Event record has no field {name}"))
    }

    /// Read a scalar field. Flags read as 0 or 1.
    pub fn scalar(&self, name: &str) -> Result<Float> {
        match self.field(name)? {
            FieldValue::Scalar(x) => Ok(*x),
            FieldValue::Flag(b) => Ok(if *b { 1. } else { 0. }),
            FieldValue::Array(_) => Err(eyre!("Field {name} is an array, expected a scalar")),
        }
    }

    /// Read a non-negative integer field, such as an object count
    pub fn count(&self, name: &str) -> Result<usize> {
        let x = self.scalar(name)?;
        if x < 0. || x.fract() != 0. {
            return Err(eyre!("Field {name} = {x} is not a valid count"));
        }
        Ok(x as usize)
    }

    /// Read a boolean field. Numbers are true when non-zero.
    pub fn flag(&self, name: &str) -> Result<bool> {
        match self.field(name)? {
            FieldValue::Flag(b) => Ok(*b),
            FieldValue::Scalar(x) => Ok(*x != 0.),
            FieldValue::Array(_) => Err(eyre!("Field {name} is an array, expected a flag")),
        }
    }

    /// Read a boolean field that older productions may lack
    pub fn flag_or(&self, name: &str, default: bool) -> Result<bool> {
        if self.has(name) {
            self.flag(name)
        } else {
            Ok(default)
        }
    }

    /// Read an array field
    pub fn array(&self, name: &str) -> Result<&[Float]> {
        match self.field(name)? {
            FieldValue::Array(v) => Ok(v),
            _ => Err(eyre!("Field {name} is not an array")),
        }
    }

    /// Read one element of an array field
    pub fn array_at(&self, name: &str, idx: usize) -> Result<Float> {
        let array = self.array(name)?;
        array.get(idx).copied().ok_or_else(|| {
            eyre!(
                "Field {name} has {} entries, index {idx} is out of bounds",
                array.len()
            )
        })
    }

    /// Read one element of an array field as a signed integer
    pub fn array_int(&self, name: &str, idx: usize) -> Result<i32> {
        Ok(self.array_at(name, idx)? as i32)
    }

    /// Read one element of an array field as a boolean
    pub fn array_flag(&self, name: &str, idx: usize) -> Result<bool> {
        Ok(self.array_at(name, idx)? != 0.)
    }

    /// Same as `array_flag`, but tolerates a missing field
    pub fn array_flag_or(&self, name: &str, idx: usize, default: bool) -> Result<bool> {
        if self.has(name) {
            self.array_flag(name, idx)
        } else {
            Ok(default)
        }
    }
}

/// Anything that yields event records in sequence
///
/// Errors are I/O or decoding failures, which abort the shard being read.
pub trait RecordSource: Iterator<Item = Result<EventRecord>> {}
//
impl<I: Iterator<Item = Result<EventRecord>>> RecordSource for I {}

/// Record source reading a JSON-lines file
pub struct JsonLinesReader {
    /// File being read, for error messages
    path: PathBuf,

    /// Line iterator
    lines: Lines<BufReader<File>>,

    /// Number of the line that was read last
    line_number: usize,
}
//
impl JsonLinesReader {
    /// Open a record file
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .wrap_err_with(|| format!("Failed to open record file {}", path.display()))?;
        Ok(Self {
            path: path.to_owned(),
            lines: BufReader::new(file).lines(),
            line_number: 0,
        })
    }
}
//
impl Iterator for JsonLinesReader {
    type Item = Result<EventRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_number += 1;
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    return Some(Err::<EventRecord, _>(e).wrap_err_with(|| {
                        format!("Failed to read {}", self.path.display())
                    }))
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(serde_json::from_str(&line).wrap_err_with(|| {
                format!(
                    "Malformed event record at {}:{}",
                    self.path.display(),
                    self.line_number
                )
            }));
        }
    }
}

/// List of record files making up one dataset
#[derive(Debug)]
pub struct InputFileList {
    /// Record files, in processing order
    pub files: Vec<PathBuf>,

    /// The dataset lacks the TkMu50 trigger path
    pub no_tk_mu50: bool,
}
//
impl InputFileList {
    /// Read a file list, one record file per line. Failure is fatal.
    pub fn load(list_path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(list_path).wrap_err_with(|| {
            format!("Cannot open input file list {}", list_path.display())
        })?;
        let files = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect::<Vec<_>>();
        let no_tk_mu50 = list_path.to_string_lossy().contains(NO_TK_MU50_FILE_LIST);
        tracing::info!(
            "Loaded {} input files from {}",
            files.len(),
            list_path.display()
        );
        Ok(Self { files, no_tk_mu50 })
    }
}
