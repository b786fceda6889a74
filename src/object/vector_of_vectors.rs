use std::ops::Range;

use crate::datatype::Datatype;
use crate::dtype::Element;
use crate::metadata::Attributes;

use super::{Array, ArrayLayout, Lh5Object};

/// A ragged sequence of arrays.
///
/// Stored as `flattened_data`, the concatenation of all inner arrays, and
/// `cumulative_length`, where entry `i` is the end offset of vector `i`
/// in `flattened_data`. `flattened_data` is a one-dimensional [`Array`]
/// or another vector of vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorOfVectors {
    flattened_data: Box<Lh5Object>,
    cumulative_length: Vec<u64>,
    attrs: Attributes,
}

fn check_flattened(flattened: &Lh5Object) -> crate::Result<usize> {
    match flattened {
        Lh5Object::Array(a) if a.shape().len() == 1 && a.layout() == ArrayLayout::Plain => {
            Ok(a.len())
        }
        Lh5Object::VectorOfVectors(v) => Ok(v.len()),
        other => Err(crate::Error::TypeMismatch(format!(
            "flattened data must be a one-dimensional array or a vector of vectors, got {}",
            other.datatype()
        ))),
    }
}

fn check_cumulative_length(cumulative_length: &[u64], flattened_len: usize) -> crate::Result<()> {
    if let Some(w) = cumulative_length.windows(2).find(|w| w[1] < w[0]) {
        return Err(crate::Error::ShapeMismatch(format!(
            "cumulative length decreases from {} to {}",
            w[0], w[1]
        )));
    }
    let last = cumulative_length.last().copied().unwrap_or(0);
    if last != flattened_len as u64 {
        return Err(crate::Error::ShapeMismatch(format!(
            "cumulative length ends at {last}, but flattened data has {flattened_len} rows"
        )));
    }
    Ok(())
}

impl VectorOfVectors {
    pub fn new(
        flattened_data: impl Into<Lh5Object>,
        cumulative_length: Vec<u64>,
    ) -> crate::Result<Self> {
        let flattened_data = flattened_data.into();
        let flattened_len = check_flattened(&flattened_data)?;
        check_cumulative_length(&cumulative_length, flattened_len)?;
        Ok(Self {
            flattened_data: Box::new(flattened_data),
            cumulative_length,
            attrs: Attributes::new(),
        })
    }

    /// Build from the length of each vector.
    pub fn from_lengths(
        flattened_data: impl Into<Lh5Object>,
        lengths: &[u64],
    ) -> crate::Result<Self> {
        let cumulative_length = lengths
            .iter()
            .scan(0u64, |acc, &n| {
                *acc += n;
                Some(*acc)
            })
            .collect();
        Self::new(flattened_data, cumulative_length)
    }

    /// Build a single-level vector of vectors from nested vectors.
    pub fn from_vecs<T: Element>(vectors: Vec<Vec<T>>) -> Self {
        let lengths: Vec<u64> = vectors.iter().map(|v| v.len() as u64).collect();
        let flat: Vec<T> = vectors.into_iter().flatten().collect();
        let cumulative_length = lengths
            .iter()
            .scan(0u64, |acc, &n| {
                *acc += n;
                Some(*acc)
            })
            .collect();
        Self {
            flattened_data: Box::new(Array::new(flat).into()),
            cumulative_length,
            attrs: Attributes::new(),
        }
    }

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn flattened_data(&self) -> &Lh5Object {
        &self.flattened_data
    }

    pub fn cumulative_length(&self) -> &[u64] {
        &self.cumulative_length
    }

    /// Number of vectors.
    pub fn len(&self) -> usize {
        self.cumulative_length.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cumulative_length.is_empty()
    }

    /// Nesting depth; 1 for vectors of arrays.
    pub fn depth(&self) -> usize {
        match self.flattened_data.as_ref() {
            Lh5Object::VectorOfVectors(inner) => 1 + inner.depth(),
            _ => 1,
        }
    }

    /// Range of rows of `flattened_data` covered by vectors `range`.
    pub fn flattened_range(&self, range: &Range<usize>) -> Range<usize> {
        let offset = |i: usize| {
            if i == 0 {
                0
            } else {
                self.cumulative_length[i - 1] as usize
            }
        };
        offset(range.start)..offset(range.end)
    }

    /// Vector `index` as an array (or vector of vectors when nested).
    pub fn get(&self, index: usize) -> crate::Result<Lh5Object> {
        if index >= self.len() {
            return Err(crate::Error::ShapeMismatch(format!(
                "index {index} out of bounds for {} vectors",
                self.len()
            )));
        }
        let range = self.flattened_range(&(index..index + 1));
        self.flattened_data.slice_rows(range)
    }

    /// Inner vectors as `Vec`s, if this is a single-level vector of `T`.
    pub fn to_vecs<T: Element>(&self) -> Option<Vec<Vec<T>>> {
        let Lh5Object::Array(a) = self.flattened_data.as_ref() else {
            return None;
        };
        let flat = a.as_slice::<T>()?;
        Some(
            (0..self.len())
                .map(|i| flat[self.flattened_range(&(i..i + 1))].to_vec())
                .collect(),
        )
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Attributes {
        &mut self.attrs
    }

    pub fn datatype(&self) -> Datatype {
        Datatype::VectorOfVectors(Box::new(self.flattened_data.datatype()))
    }

    /// Vectors `range`, with offsets rebased to the start of the slice.
    pub fn slice(&self, range: Range<usize>) -> crate::Result<Self> {
        if range.start > range.end || range.end > self.len() {
            return Err(crate::Error::ShapeMismatch(format!(
                "row range {range:?} out of bounds for {} vectors",
                self.len()
            )));
        }
        let flat_range = self.flattened_range(&range);
        let base = flat_range.start as u64;
        Ok(Self {
            flattened_data: Box::new(self.flattened_data.slice_rows(flat_range)?),
            cumulative_length: self.cumulative_length[range]
                .iter()
                .map(|c| c - base)
                .collect(),
            attrs: self.attrs.clone(),
        })
    }

    pub(crate) fn check_append(&self, other: &VectorOfVectors) -> crate::Result<()> {
        self.flattened_data.check_append(&other.flattened_data)
    }

    pub(crate) fn append_unchecked(&mut self, other: &VectorOfVectors) {
        let base = self.cumulative_length.last().copied().unwrap_or(0);
        self.flattened_data.append_unchecked(&other.flattened_data);
        self.cumulative_length
            .extend(other.cumulative_length.iter().map(|c| c + base));
    }

    /// Append the vectors of `other`.
    pub fn append(&mut self, other: &VectorOfVectors) -> crate::Result<()> {
        self.check_append(other)?;
        self.append_unchecked(other);
        Ok(())
    }
}
