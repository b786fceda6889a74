//! Element types and typed buffers.

use std::fmt;
use std::ops::Range;

use crate::datatype::ElementKind;

/// Fixed-width element type of a backend dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Bool,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl DType {
    /// Name stored as the `dataType` of a dataset.
    pub fn name(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::U8 => "uint8",
            DType::I8 => "int8",
            DType::U16 => "uint16",
            DType::I16 => "int16",
            DType::U32 => "uint32",
            DType::I32 => "int32",
            DType::U64 => "uint64",
            DType::I64 => "int64",
            DType::F32 => "float32",
            DType::F64 => "float64",
        }
    }

    pub fn from_name(name: &str) -> crate::Result<Self> {
        let dtype = match name {
            "bool" => DType::Bool,
            "uint8" => DType::U8,
            "int8" => DType::I8,
            "uint16" => DType::U16,
            "int16" => DType::I16,
            "uint32" => DType::U32,
            "int32" => DType::I32,
            "uint64" => DType::U64,
            "int64" => DType::I64,
            "float32" => DType::F32,
            "float64" => DType::F64,
            s => return Err(crate::Error::TypeMismatch(format!("unsupported data type: {s}"))),
        };
        Ok(dtype)
    }

    /// Element category used in datatype descriptors.
    pub fn element_kind(self) -> ElementKind {
        match self {
            DType::Bool => ElementKind::Bool,
            _ => ElementKind::Real,
        }
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, DType::Bool | DType::F32 | DType::F64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A primitive that can live in an [`ArrayData`] buffer.
pub trait Element: Copy + PartialEq + fmt::Debug + Send + Sync + 'static {
    const DTYPE: DType;

    fn wrap(values: Vec<Self>) -> ArrayData;

    fn unwrap(data: &ArrayData) -> Option<&[Self]>;
}

macro_rules! impl_element {
    ($($variant:ident $ty:ty),* $(,)?) => {
        $(
            impl Element for $ty {
                const DTYPE: DType = DType::$variant;

                fn wrap(values: Vec<Self>) -> ArrayData {
                    ArrayData::$variant(values)
                }

                fn unwrap(data: &ArrayData) -> Option<&[Self]> {
                    match data {
                        ArrayData::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_element!(
    U8 u8, I8 i8, U16 u16, I16 i16, U32 u32, I32 i32, U64 u64, I64 i64, F32 f32, F64 f64,
);

impl Element for bool {
    const DTYPE: DType = DType::Bool;

    fn wrap(values: Vec<Self>) -> ArrayData {
        ArrayData::Bool(values)
    }

    fn unwrap(data: &ArrayData) -> Option<&[Self]> {
        match data {
            ArrayData::Bool(v) => Some(v),
            _ => None,
        }
    }
}

/// Flat, homogeneously typed element buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Bool(Vec<bool>),
    U8(Vec<u8>),
    I8(Vec<i8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    U64(Vec<u64>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! with_data {
    ($value:expr, $v:ident => $body:expr) => {
        match $value {
            ArrayData::Bool($v) => $body,
            ArrayData::U8($v) => $body,
            ArrayData::I8($v) => $body,
            ArrayData::U16($v) => $body,
            ArrayData::I16($v) => $body,
            ArrayData::U32($v) => $body,
            ArrayData::I32($v) => $body,
            ArrayData::U64($v) => $body,
            ArrayData::I64($v) => $body,
            ArrayData::F32($v) => $body,
            ArrayData::F64($v) => $body,
        }
    };
}

macro_rules! map_data {
    ($value:expr, $v:ident => $body:expr) => {
        match $value {
            ArrayData::Bool($v) => ArrayData::Bool($body),
            ArrayData::U8($v) => ArrayData::U8($body),
            ArrayData::I8($v) => ArrayData::I8($body),
            ArrayData::U16($v) => ArrayData::U16($body),
            ArrayData::I16($v) => ArrayData::I16($body),
            ArrayData::U32($v) => ArrayData::U32($body),
            ArrayData::I32($v) => ArrayData::I32($body),
            ArrayData::U64($v) => ArrayData::U64($body),
            ArrayData::I64($v) => ArrayData::I64($body),
            ArrayData::F32($v) => ArrayData::F32($body),
            ArrayData::F64($v) => ArrayData::F64($body),
        }
    };
}

impl ArrayData {
    pub fn empty(dtype: DType) -> Self {
        match dtype {
            DType::Bool => ArrayData::Bool(Vec::new()),
            DType::U8 => ArrayData::U8(Vec::new()),
            DType::I8 => ArrayData::I8(Vec::new()),
            DType::U16 => ArrayData::U16(Vec::new()),
            DType::I16 => ArrayData::I16(Vec::new()),
            DType::U32 => ArrayData::U32(Vec::new()),
            DType::I32 => ArrayData::I32(Vec::new()),
            DType::U64 => ArrayData::U64(Vec::new()),
            DType::I64 => ArrayData::I64(Vec::new()),
            DType::F32 => ArrayData::F32(Vec::new()),
            DType::F64 => ArrayData::F64(Vec::new()),
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            ArrayData::Bool(_) => DType::Bool,
            ArrayData::U8(_) => DType::U8,
            ArrayData::I8(_) => DType::I8,
            ArrayData::U16(_) => DType::U16,
            ArrayData::I16(_) => DType::I16,
            ArrayData::U32(_) => DType::U32,
            ArrayData::I32(_) => DType::I32,
            ArrayData::U64(_) => DType::U64,
            ArrayData::I64(_) => DType::I64,
            ArrayData::F32(_) => DType::F32,
            ArrayData::F64(_) => DType::F64,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        with_data!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy out the elements in `range`, which must lie within the buffer.
    pub fn slice(&self, range: Range<usize>) -> crate::Result<Self> {
        if range.start > range.end || range.end > self.len() {
            return Err(crate::Error::ShapeMismatch(format!(
                "element range {range:?} out of bounds for length {}",
                self.len()
            )));
        }
        Ok(map_data!(self, v => v[range.clone()].to_vec()))
    }

    /// Overwrite elements starting at `start` with the contents of `other`.
    pub fn splice(&mut self, start: usize, other: &ArrayData) -> crate::Result<()> {
        let end = start + other.len();
        if end > self.len() {
            return Err(crate::Error::ShapeMismatch(format!(
                "cannot write {} elements at offset {start} into length {}",
                other.len(),
                self.len()
            )));
        }
        let dtype = self.dtype();
        match (self, other) {
            (ArrayData::Bool(a), ArrayData::Bool(b)) => a[start..end].copy_from_slice(b),
            (ArrayData::U8(a), ArrayData::U8(b)) => a[start..end].copy_from_slice(b),
            (ArrayData::I8(a), ArrayData::I8(b)) => a[start..end].copy_from_slice(b),
            (ArrayData::U16(a), ArrayData::U16(b)) => a[start..end].copy_from_slice(b),
            (ArrayData::I16(a), ArrayData::I16(b)) => a[start..end].copy_from_slice(b),
            (ArrayData::U32(a), ArrayData::U32(b)) => a[start..end].copy_from_slice(b),
            (ArrayData::I32(a), ArrayData::I32(b)) => a[start..end].copy_from_slice(b),
            (ArrayData::U64(a), ArrayData::U64(b)) => a[start..end].copy_from_slice(b),
            (ArrayData::I64(a), ArrayData::I64(b)) => a[start..end].copy_from_slice(b),
            (ArrayData::F32(a), ArrayData::F32(b)) => a[start..end].copy_from_slice(b),
            (ArrayData::F64(a), ArrayData::F64(b)) => a[start..end].copy_from_slice(b),
            (_, b) => return Err(mismatch(dtype, b.dtype())),
        }
        Ok(())
    }

    /// Append all elements of `other`, which must have the same element type.
    pub fn extend_from(&mut self, other: &ArrayData) -> crate::Result<()> {
        let dtype = self.dtype();
        match (self, other) {
            (ArrayData::Bool(a), ArrayData::Bool(b)) => a.extend_from_slice(b),
            (ArrayData::U8(a), ArrayData::U8(b)) => a.extend_from_slice(b),
            (ArrayData::I8(a), ArrayData::I8(b)) => a.extend_from_slice(b),
            (ArrayData::U16(a), ArrayData::U16(b)) => a.extend_from_slice(b),
            (ArrayData::I16(a), ArrayData::I16(b)) => a.extend_from_slice(b),
            (ArrayData::U32(a), ArrayData::U32(b)) => a.extend_from_slice(b),
            (ArrayData::I32(a), ArrayData::I32(b)) => a.extend_from_slice(b),
            (ArrayData::U64(a), ArrayData::U64(b)) => a.extend_from_slice(b),
            (ArrayData::I64(a), ArrayData::I64(b)) => a.extend_from_slice(b),
            (ArrayData::F32(a), ArrayData::F32(b)) => a.extend_from_slice(b),
            (ArrayData::F64(a), ArrayData::F64(b)) => a.extend_from_slice(b),
            (_, b) => return Err(mismatch(dtype, b.dtype())),
        }
        Ok(())
    }

    /// Typed view of the buffer, `None` if `T` is not the element type.
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        T::unwrap(self)
    }

    /// Element at `index` as a [`ScalarValue`].
    pub fn get(&self, index: usize) -> Option<ScalarValue> {
        let value = match self {
            ArrayData::Bool(v) => ScalarValue::Bool(*v.get(index)?),
            ArrayData::U8(v) => ScalarValue::U8(*v.get(index)?),
            ArrayData::I8(v) => ScalarValue::I8(*v.get(index)?),
            ArrayData::U16(v) => ScalarValue::U16(*v.get(index)?),
            ArrayData::I16(v) => ScalarValue::I16(*v.get(index)?),
            ArrayData::U32(v) => ScalarValue::U32(*v.get(index)?),
            ArrayData::I32(v) => ScalarValue::I32(*v.get(index)?),
            ArrayData::U64(v) => ScalarValue::U64(*v.get(index)?),
            ArrayData::I64(v) => ScalarValue::I64(*v.get(index)?),
            ArrayData::F32(v) => ScalarValue::F32(*v.get(index)?),
            ArrayData::F64(v) => ScalarValue::F64(*v.get(index)?),
        };
        Some(value)
    }

    /// Integer buffers widened to `u64`; used for cumulative lengths.
    pub fn to_u64_vec(&self) -> crate::Result<Vec<u64>> {
        fn widen<T: Copy + TryInto<u64>>(v: &[T]) -> crate::Result<Vec<u64>> {
            v.iter()
                .map(|x| {
                    (*x).try_into()
                        .map_err(|_| crate::Error::ShapeMismatch("negative length".into()))
                })
                .collect()
        }
        match self {
            ArrayData::U8(v) => widen(v),
            ArrayData::I8(v) => widen(v),
            ArrayData::U16(v) => widen(v),
            ArrayData::I16(v) => widen(v),
            ArrayData::U32(v) => widen(v),
            ArrayData::I32(v) => widen(v),
            ArrayData::U64(v) => Ok(v.clone()),
            ArrayData::I64(v) => widen(v),
            other => Err(crate::Error::TypeMismatch(format!(
                "expected an integer buffer, got {}",
                other.dtype()
            ))),
        }
    }

    /// Integer buffers widened to `i64`.
    pub fn to_i64_vec(&self) -> crate::Result<Vec<i64>> {
        fn widen<T: Copy + TryInto<i64>>(v: &[T]) -> crate::Result<Vec<i64>> {
            v.iter()
                .map(|x| {
                    (*x).try_into()
                        .map_err(|_| crate::Error::ShapeMismatch("value exceeds int64".into()))
                })
                .collect()
        }
        match self {
            ArrayData::U8(v) => widen(v),
            ArrayData::I8(v) => widen(v),
            ArrayData::U16(v) => widen(v),
            ArrayData::I16(v) => widen(v),
            ArrayData::U32(v) => widen(v),
            ArrayData::I32(v) => widen(v),
            ArrayData::U64(v) => widen(v),
            ArrayData::I64(v) => Ok(v.clone()),
            other => Err(crate::Error::TypeMismatch(format!(
                "expected an integer buffer, got {}",
                other.dtype()
            ))),
        }
    }

    /// Narrow `values` to the integer type `dtype`, failing on overflow.
    pub fn from_i64(dtype: DType, values: Vec<i64>) -> crate::Result<Self> {
        fn narrow<T: TryFrom<i64>>(dtype: DType, values: Vec<i64>) -> crate::Result<Vec<T>> {
            values
                .into_iter()
                .map(|x| {
                    T::try_from(x).map_err(|_| {
                        crate::Error::ShapeMismatch(format!("{x} does not fit in {dtype}"))
                    })
                })
                .collect()
        }
        let data = match dtype {
            DType::U8 => ArrayData::U8(narrow(dtype, values)?),
            DType::I8 => ArrayData::I8(narrow(dtype, values)?),
            DType::U16 => ArrayData::U16(narrow(dtype, values)?),
            DType::I16 => ArrayData::I16(narrow(dtype, values)?),
            DType::U32 => ArrayData::U32(narrow(dtype, values)?),
            DType::I32 => ArrayData::I32(narrow(dtype, values)?),
            DType::U64 => ArrayData::U64(narrow(dtype, values)?),
            DType::I64 => ArrayData::I64(values),
            other => {
                return Err(crate::Error::TypeMismatch(format!(
                    "expected an integer type, got {other}"
                )));
            }
        };
        Ok(data)
    }
}

fn mismatch(expected: DType, actual: DType) -> crate::Error {
    crate::Error::TypeMismatch(format!("expected {expected} elements, got {actual}"))
}

impl<T: Element> From<Vec<T>> for ArrayData {
    fn from(values: Vec<T>) -> Self {
        T::wrap(values)
    }
}

/// A single typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Bool(bool),
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
}

impl ScalarValue {
    /// Backend element type; strings are stored as `uint8` bytes.
    pub fn dtype(&self) -> DType {
        match self {
            ScalarValue::Bool(_) => DType::Bool,
            ScalarValue::U8(_) | ScalarValue::String(_) => DType::U8,
            ScalarValue::I8(_) => DType::I8,
            ScalarValue::U16(_) => DType::U16,
            ScalarValue::I16(_) => DType::I16,
            ScalarValue::U32(_) => DType::U32,
            ScalarValue::I32(_) => DType::I32,
            ScalarValue::U64(_) => DType::U64,
            ScalarValue::I64(_) => DType::I64,
            ScalarValue::F32(_) => DType::F32,
            ScalarValue::F64(_) => DType::F64,
        }
    }

    pub fn element_kind(&self) -> ElementKind {
        match self {
            ScalarValue::String(_) => ElementKind::String,
            other => other.dtype().element_kind(),
        }
    }

    /// Payload written to the backend.
    pub fn to_data(&self) -> ArrayData {
        match self {
            ScalarValue::Bool(v) => ArrayData::Bool(vec![*v]),
            ScalarValue::U8(v) => ArrayData::U8(vec![*v]),
            ScalarValue::I8(v) => ArrayData::I8(vec![*v]),
            ScalarValue::U16(v) => ArrayData::U16(vec![*v]),
            ScalarValue::I16(v) => ArrayData::I16(vec![*v]),
            ScalarValue::U32(v) => ArrayData::U32(vec![*v]),
            ScalarValue::I32(v) => ArrayData::I32(vec![*v]),
            ScalarValue::U64(v) => ArrayData::U64(vec![*v]),
            ScalarValue::I64(v) => ArrayData::I64(vec![*v]),
            ScalarValue::F32(v) => ArrayData::F32(vec![*v]),
            ScalarValue::F64(v) => ArrayData::F64(vec![*v]),
            ScalarValue::String(s) => ArrayData::U8(s.as_bytes().to_vec()),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Bool(v) => write!(f, "{v}"),
            ScalarValue::U8(v) => write!(f, "{v}"),
            ScalarValue::I8(v) => write!(f, "{v}"),
            ScalarValue::U16(v) => write!(f, "{v}"),
            ScalarValue::I16(v) => write!(f, "{v}"),
            ScalarValue::U32(v) => write!(f, "{v}"),
            ScalarValue::I32(v) => write!(f, "{v}"),
            ScalarValue::U64(v) => write!(f, "{v}"),
            ScalarValue::I64(v) => write!(f, "{v}"),
            ScalarValue::F32(v) => write!(f, "{v}"),
            ScalarValue::F64(v) => write!(f, "{v}"),
            ScalarValue::String(v) => write!(f, "{v:?}"),
        }
    }
}

macro_rules! impl_scalar_from {
    ($($variant:ident $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for ScalarValue {
                fn from(v: $ty) -> Self {
                    ScalarValue::$variant(v)
                }
            }
        )*
    };
}

impl_scalar_from!(
    Bool bool, U8 u8, I8 i8, U16 u16, I16 i16, U32 u32, I32 i32, U64 u64, I64 i64, F32 f32,
    F64 f64, String String,
);

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::String(v.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_roundtrip() {
        for dtype in [
            DType::Bool,
            DType::U8,
            DType::I8,
            DType::U16,
            DType::I16,
            DType::U32,
            DType::I32,
            DType::U64,
            DType::I64,
            DType::F32,
            DType::F64,
        ] {
            assert_eq!(DType::from_name(dtype.name()).unwrap(), dtype);
        }
        assert!(DType::from_name("float16").is_err());
    }

    #[test]
    fn test_extend_type_mismatch() {
        let mut a = ArrayData::from(vec![1.0f64]);
        let err = a.extend_from(&ArrayData::from(vec![1u8])).unwrap_err();
        assert!(matches!(err, crate::Error::TypeMismatch(_)));
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn test_slice_and_splice() {
        let mut a = ArrayData::from(vec![1i32, 2, 3, 4]);
        assert_eq!(a.slice(1..3).unwrap(), ArrayData::from(vec![2i32, 3]));
        assert_eq!(a.slice(2..2).unwrap().len(), 0);
        assert!(a.slice(3..5).is_err());
        a.splice(2, &ArrayData::from(vec![7i32, 8])).unwrap();
        assert_eq!(a.as_slice::<i32>().unwrap(), &[1, 2, 7, 8]);
    }

    #[test]
    fn test_to_u64_vec() {
        let a = ArrayData::from(vec![0u32, 3, 5]);
        assert_eq!(a.to_u64_vec().unwrap(), vec![0, 3, 5]);
        assert!(ArrayData::from(vec![-1i64]).to_u64_vec().is_err());
        assert!(ArrayData::from(vec![1.0f32]).to_u64_vec().is_err());
    }

    #[test]
    fn test_i64_conversions() {
        let a = ArrayData::from(vec![-3i16, 0, 7]);
        assert_eq!(a.to_i64_vec().unwrap(), vec![-3, 0, 7]);
        assert!(ArrayData::from(vec![u64::MAX]).to_i64_vec().is_err());
        assert_eq!(
            ArrayData::from_i64(DType::U16, vec![1, 65535]).unwrap(),
            ArrayData::from(vec![1u16, 65535])
        );
        assert!(ArrayData::from_i64(DType::U8, vec![256]).is_err());
        assert!(ArrayData::from_i64(DType::F32, vec![1]).is_err());
    }
}
