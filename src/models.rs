//! Data types and associated functions and methods

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::Display;
use validator::{Validate, ValidationError};

use crate::error::ActiveStorageError;
use crate::types::{DValue, Missing};

/// Supported numerical data types
#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DType {
    /// [i32]
    Int32,
    /// [i64]
    Int64,
    /// [u32]
    Uint32,
    /// [u64]
    Uint64,
    /// [f32]
    Float32,
    /// [f64]
    Float64,
}

impl DType {
    /// Returns the size of the associated type in bytes.
    pub fn size_of(self) -> usize {
        match self {
            Self::Int32 => std::mem::size_of::<i32>(),
            Self::Int64 => std::mem::size_of::<i64>(),
            Self::Uint32 => std::mem::size_of::<u32>(),
            Self::Uint64 => std::mem::size_of::<u64>(),
            Self::Float32 => std::mem::size_of::<f32>(),
            Self::Float64 => std::mem::size_of::<f64>(),
        }
    }
}

/// Where chunk reductions are computed.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Display, Eq, PartialEq, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    /// Chunks are read in full and reduced by the caller.
    #[default]
    Local,
    /// Chunks are reduced by the storage, which returns partial results only.
    Active,
}

/// Half-open index range `start..stop` along one dimension.
// NOTE: In serde, structs can be deserialised from sequences or maps. This allows us to support
// a [<start>, <stop>] API, with the convenience of named fields.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Extent {
    /// First index
    pub start: usize,
    /// One past the last index
    pub stop: usize,
}

impl Extent {
    /// Return a new Extent object.
    pub fn new(start: usize, stop: usize) -> Self {
        Extent { start, stop }
    }

    /// Number of indices covered. Zero for inverted extents.
    pub fn len(&self) -> usize {
        self.stop.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.stop)
    }
}

impl FromStr for Extent {
    type Err = ActiveStorageError;

    /// Parse `start:stop`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, stop) = s.split_once(':').ok_or_else(|| {
            ActiveStorageError::invalid_slice(format!("expected start:stop, got {s:?}"))
        })?;
        let parse = |index: &str| {
            index.trim().parse::<usize>().map_err(|_| {
                ActiveStorageError::invalid_slice(format!("invalid index {index:?} in {s:?}"))
            })
        };
        Ok(Extent::new(parse(start)?, parse(stop)?))
    }
}

/// The part of a variable a request operates on.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Selection {
    /// The whole variable
    #[default]
    All,
    /// One extent per dimension
    Extents(Vec<Extent>),
}

impl FromStr for Selection {
    type Err = ActiveStorageError;

    /// Parse `all`, or comma separated `start:stop` extents, one per dimension.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Selection::All);
        }
        let extents = s
            .split(',')
            .map(Extent::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Selection::Extents(extents))
    }
}

/// Controls how a selection is partitioned into chunks.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkHint {
    /// The whole selection is one chunk
    #[default]
    Whole,
    /// Chunks of at most this many indices along each dimension
    Shape(Vec<usize>),
    /// This many near-equal parts along the first dimension
    Split(usize),
}

impl FromStr for ChunkHint {
    type Err = ActiveStorageError;

    /// Parse `whole`, `split=<parts>` or `shape=<size>,<size>,...`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            ActiveStorageError::invalid_slice(format!(
                "expected whole, split=<parts> or shape=<sizes>, got {s:?}"
            ))
        };
        let parse = |size: &str| size.trim().parse::<usize>().map_err(|_| invalid());
        match s.trim().split_once('=') {
            None if s.trim() == "whole" => Ok(ChunkHint::Whole),
            Some(("split", parts)) => Ok(ChunkHint::Split(parse(parts)?)),
            Some(("shape", sizes)) => Ok(ChunkHint::Shape(
                sizes.split(',').map(parse).collect::<Result<_, _>>()?,
            )),
            _ => Err(invalid()),
        }
    }
}

/// One contiguous sub-array of a variable.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ChunkDescriptor {
    /// One extent per dimension
    pub extents: Vec<Extent>,
}

impl ChunkDescriptor {
    /// Return a new ChunkDescriptor object.
    pub fn new(extents: Vec<Extent>) -> Self {
        ChunkDescriptor { extents }
    }

    /// Shape of the sub-array.
    pub fn shape(&self) -> Vec<usize> {
        self.extents.iter().map(Extent::len).collect()
    }

    /// Number of elements in the sub-array.
    pub fn size(&self) -> usize {
        self.extents.iter().map(Extent::len).product()
    }
}

impl fmt::Display for ChunkDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let extents: Vec<String> = self.extents.iter().map(Extent::to_string).collect();
        write!(f, "[{}]", extents.join(", "))
    }
}

/// Where to find the mask for a variable.
///
/// Masks are numeric variables of the same shape as the data. Nonzero mask elements exclude the
/// corresponding data elements from a reduction.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum MaskSpec {
    /// No mask
    #[default]
    None,
    /// A variable stored alongside the data
    Internal {
        variable: String,
        #[serde(default)]
        group: Vec<String>,
    },
    /// A variable in a separate source
    External {
        identifier: String,
        variable: String,
        #[serde(default)]
        group: Vec<String>,
    },
}

/// A variable in a source, with the metadata needed to read and reduce it.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_variable_ref"))]
pub struct VariableRef {
    /// Identifier of the source containing the variable, e.g. a path
    #[validate(length(min = 1, message = "identifier must not be empty"))]
    pub identifier: String,
    /// Variable name
    #[validate(length(min = 1, message = "variable must not be empty"))]
    pub variable: String,
    /// Path of nested groups containing the variable, outermost first. Empty for the root group.
    #[serde(default)]
    pub group: Vec<String>,
    /// Element type
    pub dtype: DType,
    /// Shape of the multi-dimensional array
    #[validate(length(min = 1, message = "shape length must be greater than 0"))]
    pub shape: Vec<usize>,
    /// Missing data described by the variable's attributes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<Missing<DValue>>,
}

impl VariableRef {
    /// Return a VariableRef in the root group without missing data.
    pub fn new(identifier: &str, variable: &str, dtype: DType, shape: Vec<usize>) -> Self {
        VariableRef {
            identifier: identifier.to_string(),
            variable: variable.to_string(),
            group: vec![],
            dtype,
            shape,
            missing: None,
        }
    }

    pub fn with_group(mut self, group: Vec<String>) -> Self {
        self.group = group;
        self
    }

    pub fn with_missing(mut self, missing: Missing<DValue>) -> Self {
        self.missing = Some(missing);
        self
    }

    /// Total number of elements.
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    /// `group/.../variable` path of the variable within its source.
    pub fn path(&self) -> String {
        variable_path(&self.group, &self.variable)
    }
}

/// Join a group path and a variable name with `/`.
pub fn variable_path(group: &[String], variable: &str) -> String {
    group
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(variable))
        .collect::<Vec<_>>()
        .join("/")
}

/// Validate a variable reference
fn validate_variable_ref(variable: &VariableRef) -> Result<(), ValidationError> {
    if let Some(missing) = &variable.missing {
        missing.validate(variable.dtype)?;
    }
    Ok(())
}
