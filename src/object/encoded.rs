use std::ops::Range;

use crate::datatype::{Datatype, ElementKind};
use crate::dtype::{DType, ScalarValue};
use crate::metadata::Attributes;

use super::{Array, ArrayLayout, Lh5Object, Scalar, VectorOfVectors};

/// Attribute naming the codec that produced `encoded_data`.
pub const CODEC_ATTR: &str = "codec";

/// Length of the waveforms before encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedSize {
    /// One length per waveform.
    PerRow(Array),
    /// A length shared by every waveform.
    Uniform(Scalar),
}

/// Waveforms compressed one by one into byte vectors.
///
/// `encoded_data` holds one byte vector per waveform. With
/// [`DecodedSize::PerRow`] this is a `VectorOfEncodedVectors`, with
/// [`DecodedSize::Uniform`] an `ArrayOfEncodedEqualSizedArrays`. The bytes
/// are kept opaque; see [`crate::waveform`] for decoding them.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedArray {
    element: ElementKind,
    encoded_data: VectorOfVectors,
    decoded_size: DecodedSize,
    attrs: Attributes,
}

fn check_encoded_data(encoded_data: &VectorOfVectors) -> crate::Result<()> {
    match encoded_data.flattened_data() {
        Lh5Object::Array(a) if a.dtype() == DType::U8 => Ok(()),
        other => Err(crate::Error::TypeMismatch(format!(
            "encoded data must be a vector of uint8 vectors, got {}",
            other.datatype()
        ))),
    }
}

impl EncodedArray {
    /// Waveforms of individual lengths, given per row in `decoded_size`.
    pub fn vector(encoded_data: VectorOfVectors, decoded_size: Array) -> crate::Result<Self> {
        check_encoded_data(&encoded_data)?;
        if !decoded_size.dtype().is_integer()
            || decoded_size.shape().len() != 1
            || decoded_size.layout() != ArrayLayout::Plain
        {
            return Err(crate::Error::TypeMismatch(format!(
                "decoded sizes must be a one-dimensional integer array, got {}",
                decoded_size.datatype()
            )));
        }
        if decoded_size.len() != encoded_data.len() {
            return Err(crate::Error::ShapeMismatch(format!(
                "{} decoded sizes for {} encoded vectors",
                decoded_size.len(),
                encoded_data.len()
            )));
        }
        Ok(Self {
            element: ElementKind::Real,
            encoded_data,
            decoded_size: DecodedSize::PerRow(decoded_size),
            attrs: Attributes::new(),
        })
    }

    /// Waveforms that all decode to `decoded_size` samples.
    pub fn equal_sized(encoded_data: VectorOfVectors, decoded_size: Scalar) -> crate::Result<Self> {
        check_encoded_data(&encoded_data)?;
        if !decoded_size.value().dtype().is_integer() {
            return Err(crate::Error::TypeMismatch(format!(
                "decoded size must be an integer, got {}",
                decoded_size.value().dtype()
            )));
        }
        Ok(Self {
            element: ElementKind::Real,
            encoded_data,
            decoded_size: DecodedSize::Uniform(decoded_size),
            attrs: Attributes::new(),
        })
    }

    /// Element category of the decoded samples.
    pub fn with_element(mut self, element: ElementKind) -> Self {
        self.element = element;
        self
    }

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn element(&self) -> ElementKind {
        self.element
    }

    pub fn encoded_data(&self) -> &VectorOfVectors {
        &self.encoded_data
    }

    pub fn decoded_size(&self) -> &DecodedSize {
        &self.decoded_size
    }

    /// Decoded length of every waveform.
    pub fn decoded_sizes(&self) -> crate::Result<Vec<u64>> {
        match &self.decoded_size {
            DecodedSize::PerRow(a) => a.data().to_u64_vec(),
            DecodedSize::Uniform(s) => {
                let size = s.value().to_data().to_u64_vec()?;
                Ok(vec![size.first().copied().unwrap_or(0); self.len()])
            }
        }
    }

    /// Value of the `codec` attribute.
    pub fn codec(&self) -> Option<&str> {
        self.attrs.get(CODEC_ATTR).and_then(serde_json::Value::as_str)
    }

    /// Number of waveforms.
    pub fn len(&self) -> usize {
        self.encoded_data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoded_data.is_empty()
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Attributes {
        &mut self.attrs
    }

    pub fn datatype(&self) -> Datatype {
        match self.decoded_size {
            DecodedSize::PerRow(_) => Datatype::VectorOfEncodedVectors(self.element),
            DecodedSize::Uniform(_) => Datatype::ArrayOfEncodedEqualSizedArrays(self.element),
        }
    }

    /// Waveforms `range`.
    pub fn slice(&self, range: Range<usize>) -> crate::Result<Self> {
        let decoded_size = match &self.decoded_size {
            DecodedSize::PerRow(a) => DecodedSize::PerRow(a.slice(range.clone())?),
            DecodedSize::Uniform(s) => DecodedSize::Uniform(s.clone()),
        };
        Ok(Self {
            element: self.element,
            encoded_data: self.encoded_data.slice(range)?,
            decoded_size,
            attrs: self.attrs.clone(),
        })
    }

    pub(crate) fn check_append(&self, other: &EncodedArray) -> crate::Result<()> {
        if self.codec() != other.codec() {
            return Err(crate::Error::TypeMismatch(format!(
                "cannot append waveforms encoded with {:?} to waveforms encoded with {:?}",
                other.codec(),
                self.codec()
            )));
        }
        match (&self.decoded_size, &other.decoded_size) {
            (DecodedSize::PerRow(a), DecodedSize::PerRow(b)) => a.check_append(b)?,
            (DecodedSize::Uniform(a), DecodedSize::Uniform(b)) => {
                if same_size(a.value(), b.value()) != Some(true) {
                    return Err(crate::Error::ShapeMismatch(format!(
                        "cannot append waveforms of {:?} samples to waveforms of {:?} samples",
                        b.value(),
                        a.value()
                    )));
                }
            }
            _ => {
                return Err(crate::Error::TypeMismatch(format!(
                    "cannot append {} to {}",
                    other.datatype(),
                    self.datatype()
                )));
            }
        }
        self.encoded_data.check_append(&other.encoded_data)
    }

    pub(crate) fn append_unchecked(&mut self, other: &EncodedArray) {
        self.encoded_data.append_unchecked(&other.encoded_data);
        if let (DecodedSize::PerRow(a), DecodedSize::PerRow(b)) =
            (&mut self.decoded_size, &other.decoded_size)
        {
            a.append_unchecked(b);
        }
    }

    /// Append the waveforms of `other`.
    pub fn append(&mut self, other: &EncodedArray) -> crate::Result<()> {
        self.check_append(other)?;
        self.append_unchecked(other);
        Ok(())
    }
}

fn same_size(a: &ScalarValue, b: &ScalarValue) -> Option<bool> {
    let a = a.to_data().to_u64_vec().ok()?;
    let b = b.to_data().to_u64_vec().ok()?;
    Some(a == b)
}
