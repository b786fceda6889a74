//! In-memory LH5 objects.
//!
//! Constructors validate shapes and types eagerly, so a value of any of these
//! types always satisfies the invariants of its datatype.

mod array;
mod encoded;
mod scalar;
mod structure;
mod table;
mod vector_of_vectors;

use std::ops::Range;

pub use array::{Array, ArrayLayout};
pub use encoded::{CODEC_ATTR, DecodedSize, EncodedArray};
pub use scalar::Scalar;
pub use structure::Struct;
pub use table::Table;
pub use vector_of_vectors::VectorOfVectors;

use crate::datatype::Datatype;
use crate::metadata::Attributes;

/// Any LH5 object.
#[derive(Debug, Clone, PartialEq)]
pub enum Lh5Object {
    Scalar(Scalar),
    Array(Array),
    VectorOfVectors(VectorOfVectors),
    EncodedArray(EncodedArray),
    Struct(Struct),
    Table(Table),
}

impl Lh5Object {
    pub fn datatype(&self) -> Datatype {
        match self {
            Lh5Object::Scalar(o) => o.datatype(),
            Lh5Object::Array(o) => o.datatype(),
            Lh5Object::VectorOfVectors(o) => o.datatype(),
            Lh5Object::EncodedArray(o) => o.datatype(),
            Lh5Object::Struct(o) => o.datatype(),
            Lh5Object::Table(o) => o.datatype(),
        }
    }

    pub fn attrs(&self) -> &Attributes {
        match self {
            Lh5Object::Scalar(o) => o.attrs(),
            Lh5Object::Array(o) => o.attrs(),
            Lh5Object::VectorOfVectors(o) => o.attrs(),
            Lh5Object::EncodedArray(o) => o.attrs(),
            Lh5Object::Struct(o) => o.attrs(),
            Lh5Object::Table(o) => o.attrs(),
        }
    }

    pub fn attrs_mut(&mut self) -> &mut Attributes {
        match self {
            Lh5Object::Scalar(o) => o.attrs_mut(),
            Lh5Object::Array(o) => o.attrs_mut(),
            Lh5Object::VectorOfVectors(o) => o.attrs_mut(),
            Lh5Object::EncodedArray(o) => o.attrs_mut(),
            Lh5Object::Struct(o) => o.attrs_mut(),
            Lh5Object::Table(o) => o.attrs_mut(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Lh5Object::Scalar(_) => "Scalar",
            Lh5Object::Array(_) => "Array",
            Lh5Object::VectorOfVectors(_) => "VectorOfVectors",
            Lh5Object::EncodedArray(o) => o.datatype().type_name(),
            Lh5Object::Struct(_) => "Struct",
            Lh5Object::Table(_) => "Table",
        }
    }

    /// Row count of array-like objects; `None` for scalars and structs.
    pub fn num_rows(&self) -> Option<usize> {
        match self {
            Lh5Object::Array(o) => Some(o.len()),
            Lh5Object::VectorOfVectors(o) => Some(o.len()),
            Lh5Object::EncodedArray(o) => Some(o.len()),
            Lh5Object::Table(o) => Some(o.len()),
            Lh5Object::Scalar(_) | Lh5Object::Struct(_) => None,
        }
    }

    /// Whether the object can be a column of a [`Table`].
    pub fn is_column(&self) -> bool {
        self.num_rows().is_some()
    }

    /// Rows `range` of an array-like object.
    ///
    /// Scalars are returned unchanged; struct fields are sliced individually.
    pub fn slice_rows(&self, range: Range<usize>) -> crate::Result<Lh5Object> {
        let out = match self {
            Lh5Object::Scalar(o) => o.clone().into(),
            Lh5Object::Array(o) => o.slice(range)?.into(),
            Lh5Object::VectorOfVectors(o) => o.slice(range)?.into(),
            Lh5Object::EncodedArray(o) => o.slice(range)?.into(),
            Lh5Object::Table(o) => o.slice(range)?.into(),
            Lh5Object::Struct(o) => {
                let mut out = Struct::new().with_attrs(o.attrs().clone());
                for (name, field) in o.iter() {
                    out.insert(name, field.slice_rows(range.clone())?)?;
                }
                out.into()
            }
        };
        Ok(out)
    }

    /// Check that the rows of `other` could be appended, without changing anything.
    pub fn check_append(&self, other: &Lh5Object) -> crate::Result<()> {
        match (self, other) {
            (Lh5Object::Array(a), Lh5Object::Array(b)) => a.check_append(b),
            (Lh5Object::VectorOfVectors(a), Lh5Object::VectorOfVectors(b)) => a.check_append(b),
            (Lh5Object::EncodedArray(a), Lh5Object::EncodedArray(b)) => a.check_append(b),
            (Lh5Object::Table(a), Lh5Object::Table(b)) => a.check_append_table(b),
            (Lh5Object::Struct(a), Lh5Object::Struct(b)) => a.check_append(b),
            (Lh5Object::Scalar(_), Lh5Object::Scalar(_)) => {
                Err(crate::Error::NotAppendable("scalar".into()))
            }
            (a, b) => Err(crate::Error::TypeMismatch(format!(
                "cannot append {} to {}",
                b.type_name(),
                a.type_name()
            ))),
        }
    }

    /// Append the rows of `other`. Nothing changes on error.
    pub fn append_rows(&mut self, other: &Lh5Object) -> crate::Result<()> {
        self.check_append(other)?;
        self.append_unchecked(other);
        Ok(())
    }

    /// Append after a successful [`Lh5Object::check_append`].
    pub(crate) fn append_unchecked(&mut self, other: &Lh5Object) {
        match (self, other) {
            (Lh5Object::Array(a), Lh5Object::Array(b)) => a.append_unchecked(b),
            (Lh5Object::VectorOfVectors(a), Lh5Object::VectorOfVectors(b)) => {
                a.append_unchecked(b)
            }
            (Lh5Object::EncodedArray(a), Lh5Object::EncodedArray(b)) => a.append_unchecked(b),
            (Lh5Object::Table(a), Lh5Object::Table(b)) => a.append_unchecked(b),
            (Lh5Object::Struct(a), Lh5Object::Struct(b)) => a.append_unchecked(b),
            _ => {}
        }
    }
}

macro_rules! impl_object_from {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for Lh5Object {
                fn from(value: $variant) -> Self {
                    Lh5Object::$variant(value)
                }
            }
        )*
    };
}

impl_object_from!(Scalar, Array, VectorOfVectors, EncodedArray, Struct, Table);

/// Value of the `units` attribute, if set.
pub(crate) fn units_of(attrs: &Attributes) -> Option<&str> {
    attrs.get("units").and_then(serde_json::Value::as_str)
}
