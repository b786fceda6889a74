use std::ops::Range;

use crate::datatype::Datatype;
use crate::dtype::{ArrayData, DType, Element, ScalarValue};
use crate::metadata::Attributes;

/// How an array's datatype is spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ArrayLayout {
    /// `array<N>{..}`
    #[default]
    Plain,
    /// `fixedsize_array<N>{..}`: the row count never changes.
    FixedSize,
    /// `array_of_equalsized_arrays<1,N>{..}`: rows of equal length, e.g. waveforms.
    EqualSized,
}

/// An n-dimensional array of fixed-width elements.
///
/// The first dimension counts rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    data: ArrayData,
    shape: Vec<usize>,
    layout: ArrayLayout,
    attrs: Attributes,
}

impl Array {
    /// A one-dimensional array.
    pub fn new(data: impl Into<ArrayData>) -> Self {
        let data = data.into();
        Self {
            shape: vec![data.len()],
            data,
            layout: ArrayLayout::Plain,
            attrs: Attributes::new(),
        }
    }

    /// An array with an explicit shape; the element count must match.
    pub fn with_shape(data: impl Into<ArrayData>, shape: Vec<usize>) -> crate::Result<Self> {
        Self::with_layout(data, shape, ArrayLayout::Plain)
    }

    /// A one-dimensional array whose length is fixed.
    pub fn fixed_size(data: impl Into<ArrayData>) -> Self {
        Self {
            layout: ArrayLayout::FixedSize,
            ..Self::new(data)
        }
    }

    /// Rows of `row_len` elements each.
    pub fn equal_sized(data: impl Into<ArrayData>, row_len: usize) -> crate::Result<Self> {
        let data = data.into();
        if row_len == 0 || data.len() % row_len != 0 {
            return Err(crate::Error::ShapeMismatch(format!(
                "{} elements cannot be split into rows of {row_len}",
                data.len()
            )));
        }
        let rows = data.len() / row_len;
        Self::with_layout(data, vec![rows, row_len], ArrayLayout::EqualSized)
    }

    pub fn with_layout(
        data: impl Into<ArrayData>,
        shape: Vec<usize>,
        layout: ArrayLayout,
    ) -> crate::Result<Self> {
        let data = data.into();
        if shape.is_empty() {
            return Err(crate::Error::ShapeMismatch(
                "arrays have at least one dimension".into(),
            ));
        }
        if layout == ArrayLayout::EqualSized && shape.len() != 2 {
            return Err(crate::Error::ShapeMismatch(format!(
                "arrays of equal-sized arrays are two-dimensional, got shape {shape:?}"
            )));
        }
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(crate::Error::ShapeMismatch(format!(
                "shape {shape:?} does not hold {} elements",
                data.len()
            )));
        }
        Ok(Self {
            data,
            shape,
            layout,
            attrs: Attributes::new(),
        })
    }

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn with_units(mut self, units: &str) -> Self {
        self.attrs.insert("units".into(), units.into());
        self
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn into_data(self) -> ArrayData {
        self.data
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn layout(&self) -> ArrayLayout {
        self.layout
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.shape[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements per row.
    pub fn row_len(&self) -> usize {
        self.shape[1..].iter().product()
    }

    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        self.data.as_slice()
    }

    /// Element at flat index `index`.
    pub fn get(&self, index: usize) -> Option<ScalarValue> {
        self.data.get(index)
    }

    pub fn units(&self) -> Option<&str> {
        super::units_of(&self.attrs)
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Attributes {
        &mut self.attrs
    }

    pub fn datatype(&self) -> Datatype {
        let element = self.dtype().element_kind();
        match self.layout {
            ArrayLayout::Plain => Datatype::Array {
                ndim: self.shape.len(),
                element,
            },
            ArrayLayout::FixedSize => Datatype::FixedSizeArray {
                ndim: self.shape.len(),
                element,
            },
            ArrayLayout::EqualSized => Datatype::ArrayOfEqualSizedArrays {
                outer: 1,
                inner: self.shape.len() - 1,
                element,
            },
        }
    }

    fn check_rows(&self, range: &Range<usize>) -> crate::Result<()> {
        if range.start > range.end || range.end > self.len() {
            return Err(crate::Error::ShapeMismatch(format!(
                "row range {range:?} out of bounds for {} rows",
                self.len()
            )));
        }
        Ok(())
    }

    /// Copy of rows `range`.
    pub fn slice(&self, range: Range<usize>) -> crate::Result<Self> {
        self.check_rows(&range)?;
        let stride = self.row_len();
        let mut shape = self.shape.clone();
        shape[0] = range.end - range.start;
        Ok(Self {
            data: self.data.slice(range.start * stride..range.end * stride)?,
            shape,
            layout: self.layout,
            attrs: self.attrs.clone(),
        })
    }

    /// Overwrite rows starting at `start_row` with `values`, which must hold whole rows.
    pub fn set_slice(&mut self, start_row: usize, values: &ArrayData) -> crate::Result<()> {
        let stride = self.row_len();
        if stride == 0 || values.len() % stride != 0 {
            return Err(crate::Error::ShapeMismatch(format!(
                "{} elements do not form whole rows of {stride}",
                values.len()
            )));
        }
        self.check_rows(&(start_row..start_row + values.len() / stride))?;
        self.data.splice(start_row * stride, values)
    }

    /// Replace the contents with `data`, keeping the inner shape.
    pub fn set_data(&mut self, data: impl Into<ArrayData>) -> crate::Result<()> {
        let data = data.into();
        let stride = self.row_len();
        if data.dtype() != self.dtype() {
            return Err(crate::Error::TypeMismatch(format!(
                "cannot replace {} data with {}",
                self.dtype(),
                data.dtype()
            )));
        }
        if self.layout == ArrayLayout::FixedSize && data.len() != self.data.len() {
            return Err(crate::Error::ShapeMismatch(format!(
                "fixed-size array holds {} elements, got {}",
                self.data.len(),
                data.len()
            )));
        }
        if stride == 0 || data.len() % stride != 0 {
            return Err(crate::Error::ShapeMismatch(format!(
                "{} elements do not form whole rows of {stride}",
                data.len()
            )));
        }
        self.shape[0] = data.len() / stride;
        self.data = data;
        Ok(())
    }

    pub(crate) fn check_append(&self, other: &Array) -> crate::Result<()> {
        if self.layout == ArrayLayout::FixedSize {
            return Err(crate::Error::NotAppendable("fixed-size array".into()));
        }
        if self.dtype() != other.dtype() {
            return Err(crate::Error::TypeMismatch(format!(
                "cannot append {} rows to {} array",
                other.dtype(),
                self.dtype()
            )));
        }
        if self.shape[1..] != other.shape[1..] {
            return Err(crate::Error::ShapeMismatch(format!(
                "cannot append rows of shape {:?} to rows of shape {:?}",
                &other.shape[1..],
                &self.shape[1..]
            )));
        }
        Ok(())
    }

    pub(crate) fn append_unchecked(&mut self, other: &Array) {
        if self.data.extend_from(&other.data).is_ok() {
            self.shape[0] += other.len();
        }
    }

    /// Append the rows of `other`.
    pub fn append(&mut self, other: &Array) -> crate::Result<()> {
        self.check_append(other)?;
        self.append_unchecked(other);
        Ok(())
    }
}
