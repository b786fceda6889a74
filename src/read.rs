//! Reading LH5 objects.

use std::ops::Range;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::datatype::{Datatype, ElementKind, decode_datatype};
use crate::file::Lh5File;
use crate::metadata::{DATATYPE_ATTR, NodeMetadata};
use crate::object::{
    Array, ArrayLayout, EncodedArray, Lh5Object, Scalar, Struct, Table, VectorOfVectors,
};
use crate::storage::{Lh5Backend, clamp_rows, join_path, normalize_path};

/// Restrictions applied while reading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    /// Row range `[start, end)` of array-like objects, clamped to the stored rows.
    pub rows: Option<Range<u64>>,
    /// Fields of a top-level struct or table to read.
    pub fields: Option<Vec<String>>,
}

impl ReadOptions {
    pub fn with_rows(mut self, rows: Range<u64>) -> Self {
        self.rows = Some(rows);
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}

/// Decoded datatype of a node.
pub(crate) fn node_datatype(path: &str, meta: &NodeMetadata) -> crate::Result<Datatype> {
    let descriptor = meta.datatype().ok_or_else(|| {
        crate::Error::TypeMismatch(format!("'{path}' has no datatype attribute"))
    })?;
    decode_datatype(descriptor)
}

/// Metadata of a child declared by its parent's datatype.
///
/// A missing child means the parent was not completely written.
pub(crate) fn child_metadata(
    backend: &Lh5Backend,
    parent: &str,
    name: &str,
) -> crate::Result<NodeMetadata> {
    let path = join_path(parent, name);
    backend
        .get_metadata(&path)?
        .ok_or(crate::Error::Incomplete(path))
}

/// Row count of an array-like node from metadata alone; `None` for scalars and structs.
pub(crate) fn node_rows(backend: &Lh5Backend, path: &str) -> crate::Result<Option<u64>> {
    let meta = backend.node_metadata(path)?;
    match node_datatype(path, &meta)? {
        Datatype::Scalar(_) | Datatype::Struct(_) => Ok(None),
        Datatype::VectorOfVectors(_) => match child_metadata(backend, path, "cumulative_length")? {
            NodeMetadata::Dataset(m) => Ok(Some(m.rows())),
            NodeMetadata::Group(_) => Err(crate::Error::TypeMismatch(format!(
                "cumulative length of '{path}' is a group"
            ))),
        },
        Datatype::VectorOfEncodedVectors(_) | Datatype::ArrayOfEncodedEqualSizedArrays(_) => {
            child_metadata(backend, path, "encoded_data")?;
            node_rows(backend, &join_path(path, "encoded_data"))
        }
        Datatype::Table(fields) => match fields.first() {
            Some(first) => {
                child_metadata(backend, path, first)?;
                node_rows(backend, &join_path(path, first))
            }
            None => Ok(Some(0)),
        },
        _ => match meta {
            NodeMetadata::Dataset(m) => Ok(Some(m.rows())),
            NodeMetadata::Group(_) => Err(crate::Error::TypeMismatch(format!(
                "array '{path}' is stored as a group"
            ))),
        },
    }
}

/// Declared fields to read, in the requested order.
fn select_fields(
    path: &str,
    declared: &[String],
    requested: Option<&[String]>,
) -> crate::Result<Vec<String>> {
    let Some(requested) = requested else {
        return Ok(declared.to_vec());
    };
    requested
        .iter()
        .map(|name| {
            if declared.contains(name) {
                Ok(name.clone())
            } else {
                Err(crate::Error::FieldNotFound(join_path(path, name)))
            }
        })
        .collect()
}

fn read_scalar(backend: &Lh5Backend, path: &str, kind: ElementKind) -> crate::Result<Scalar> {
    let (data, shape) = backend.read_dataset(path, None)?;
    match kind {
        ElementKind::String => {
            let bytes = data.as_slice::<u8>().ok_or_else(|| {
                crate::Error::TypeMismatch(format!("string '{path}' is stored as {}", data.dtype()))
            })?;
            let s = String::from_utf8(bytes.to_vec()).map_err(crate::Error::wrap)?;
            Ok(Scalar::new(s))
        }
        ElementKind::Complex => Err(crate::Error::TypeMismatch(format!(
            "complex values are not supported ('{path}')"
        ))),
        _ => {
            if !shape.is_empty() {
                return Err(crate::Error::ShapeMismatch(format!(
                    "scalar '{path}' has shape {shape:?}"
                )));
            }
            let value = data
                .get(0)
                .ok_or_else(|| crate::Error::ShapeMismatch(format!("scalar '{path}' is empty")))?;
            if value.element_kind() != kind {
                return Err(crate::Error::TypeMismatch(format!(
                    "'{path}' is declared {kind} but stores {}",
                    data.dtype()
                )));
            }
            Ok(Scalar::new(value))
        }
    }
}

fn read_array(
    backend: &Lh5Backend,
    path: &str,
    datatype: &Datatype,
    rows: Option<Range<u64>>,
) -> crate::Result<Array> {
    let (layout, ndim, element) = match *datatype {
        Datatype::Array { ndim, element } => (ArrayLayout::Plain, ndim, element),
        Datatype::FixedSizeArray { ndim, element } => (ArrayLayout::FixedSize, ndim, element),
        Datatype::ArrayOfEqualSizedArrays {
            outer,
            inner,
            element,
        } => (ArrayLayout::EqualSized, outer + inner, element),
        _ => {
            return Err(crate::Error::TypeMismatch(format!(
                "'{path}' is not an array ({datatype})"
            )));
        }
    };
    let (data, shape) = backend.read_dataset(path, rows)?;
    if data.dtype().element_kind() != element {
        return Err(crate::Error::TypeMismatch(format!(
            "'{path}' is declared {datatype} but stores {}",
            data.dtype()
        )));
    }
    if shape.len() != ndim {
        return Err(crate::Error::ShapeMismatch(format!(
            "'{path}' is declared {datatype} but has shape {shape:?}"
        )));
    }
    let shape = shape.into_iter().map(|n| n as usize).collect();
    Array::with_layout(data, shape, layout)
}

fn read_vector_of_vectors(
    backend: &Lh5Backend,
    path: &str,
    inner: &Datatype,
    rows: Option<Range<u64>>,
) -> crate::Result<VectorOfVectors> {
    child_metadata(backend, path, "cumulative_length")?;
    let (cl, _) = backend.read_dataset(&join_path(path, "cumulative_length"), None)?;
    let cl = cl.to_u64_vec()?;

    let range = clamp_rows(rows, cl.len() as u64);
    let (start, end) = (range.start as usize, range.end as usize);
    let offset = |i: usize| if i == 0 { 0 } else { cl[i - 1] };
    let flat_range = offset(start)..offset(end);
    let local = cl[start..end]
        .iter()
        .map(|c| {
            c.checked_sub(flat_range.start).ok_or_else(|| {
                crate::Error::ShapeMismatch(format!("cumulative length of '{path}' decreases"))
            })
        })
        .collect::<crate::Result<Vec<u64>>>()?;

    let flat_path = join_path(path, "flattened_data");
    let flat_meta = child_metadata(backend, path, "flattened_data")?;
    let flat_type = node_datatype(&flat_path, &flat_meta)?;
    if flat_type != *inner {
        return Err(crate::Error::TypeMismatch(format!(
            "flattened data of '{path}' is {flat_type}, expected {inner}"
        )));
    }
    let flat = read_node(backend, &flat_path, flat_meta, Some(flat_range), None)?;
    VectorOfVectors::new(flat, local)
}

fn read_encoded(
    backend: &Lh5Backend,
    path: &str,
    datatype: &Datatype,
    rows: Option<Range<u64>>,
) -> crate::Result<EncodedArray> {
    let data_meta = child_metadata(backend, path, "encoded_data")?;
    let encoded_data = match read_node(
        backend,
        &join_path(path, "encoded_data"),
        data_meta,
        rows.clone(),
        None,
    )? {
        Lh5Object::VectorOfVectors(v) => v,
        other => {
            return Err(crate::Error::TypeMismatch(format!(
                "encoded data of '{path}' is {}",
                other.datatype()
            )));
        }
    };
    let size_meta = child_metadata(backend, path, "decoded_size")?;
    let decoded_size = read_node(backend, &join_path(path, "decoded_size"), size_meta, rows, None)?;
    let encoded = match (datatype, decoded_size) {
        (Datatype::VectorOfEncodedVectors(_), Lh5Object::Array(sizes)) => {
            EncodedArray::vector(encoded_data, sizes)?
        }
        (Datatype::ArrayOfEncodedEqualSizedArrays(_), Lh5Object::Scalar(size)) => {
            EncodedArray::equal_sized(encoded_data, size)?
        }
        (_, other) => {
            return Err(crate::Error::TypeMismatch(format!(
                "'{path}' is declared {datatype} but its decoded size is {}",
                other.datatype()
            )));
        }
    };
    Ok(match datatype.element() {
        Some(element) => encoded.with_element(element),
        None => encoded,
    })
}

/// Read the node at `path` whose metadata is `meta`.
fn read_node(
    backend: &Lh5Backend,
    path: &str,
    meta: NodeMetadata,
    rows: Option<Range<u64>>,
    fields: Option<&[String]>,
) -> crate::Result<Lh5Object> {
    if meta.is_incomplete() {
        return Err(crate::Error::Incomplete(path.to_owned()));
    }
    let datatype = node_datatype(path, &meta)?;
    debug!("reading {datatype} from '{path}'");
    let mut object: Lh5Object = match &datatype {
        Datatype::Scalar(kind) => read_scalar(backend, path, *kind)?.into(),
        Datatype::Array { .. }
        | Datatype::FixedSizeArray { .. }
        | Datatype::ArrayOfEqualSizedArrays { .. } => {
            read_array(backend, path, &datatype, rows)?.into()
        }
        Datatype::VectorOfVectors(inner) => {
            read_vector_of_vectors(backend, path, inner, rows)?.into()
        }
        Datatype::VectorOfEncodedVectors(_) | Datatype::ArrayOfEncodedEqualSizedArrays(_) => {
            read_encoded(backend, path, &datatype, rows)?.into()
        }
        Datatype::Struct(declared) => {
            let mut out = Struct::new();
            for name in select_fields(path, declared, fields)? {
                let child = child_metadata(backend, path, &name)?;
                let field = read_node(backend, &join_path(path, &name), child, rows.clone(), None)?;
                out.insert(name, field)?;
            }
            out.into()
        }
        Datatype::Table(declared) => {
            let mut columns = Vec::new();
            for name in select_fields(path, declared, fields)? {
                let child = child_metadata(backend, path, &name)?;
                let column =
                    read_node(backend, &join_path(path, &name), child, rows.clone(), None)?;
                columns.push((name, column));
            }
            Table::from_fields(columns)?.into()
        }
    };
    let mut attrs = meta.into_attributes();
    attrs.remove(DATATYPE_ATTR);
    *object.attrs_mut() = attrs;
    Ok(object)
}

impl Lh5File {
    /// Read the object at `path`.
    pub fn read(&self, path: &str, options: &ReadOptions) -> crate::Result<Lh5Object> {
        let path = normalize_path(path)?;
        let meta = self.backend().node_metadata(&path)?;
        read_node(
            self.backend(),
            &path,
            meta,
            options.rows.clone(),
            options.fields.as_deref(),
        )
    }

    /// Datatype of the object at `path`, without reading it.
    pub fn datatype(&self, path: &str) -> crate::Result<Datatype> {
        let path = normalize_path(path)?;
        node_datatype(&path, &self.backend().node_metadata(&path)?)
    }

    /// Number of rows of the array-like object at `path`; `None` for scalars and structs.
    pub fn read_n_rows(&self, path: &str) -> crate::Result<Option<u64>> {
        node_rows(self.backend(), &normalize_path(path)?)
    }

    /// Paths of the children of the group at `path`, or `path` itself for a dataset.
    pub fn ls(&self, path: &str) -> crate::Result<Vec<String>> {
        let path = normalize_path(path)?;
        match self.backend().node_metadata(&path)? {
            NodeMetadata::Dataset(_) => Ok(vec![path]),
            NodeMetadata::Group(_) => Ok(self
                .backend()
                .list_children(&path)?
                .into_iter()
                .map(|name| join_path(&path, &name))
                .collect()),
        }
    }

    /// Iterate over the object at `path` in chunks of `buffer_len` rows.
    pub fn iter_rows(&self, path: &str, buffer_len: u64) -> crate::Result<Lh5Iterator<'_>> {
        if buffer_len == 0 {
            return Err(crate::Error::general("buffer length must be positive"));
        }
        let path = normalize_path(path)?;
        let n_rows = self.read_n_rows(&path)?.ok_or_else(|| {
            crate::Error::TypeMismatch(format!("'{path}' has no rows to iterate over"))
        })?;
        Ok(Lh5Iterator {
            file: self,
            path,
            fields: None,
            buffer_len,
            position: 0,
            n_rows,
        })
    }
}

/// Buffered iteration over the rows of an array or table.
///
/// Each item holds up to `buffer_len` rows; only the chunks backing those
/// rows are read. Iteration stops after the first error.
#[derive(Debug)]
pub struct Lh5Iterator<'a> {
    file: &'a Lh5File,
    path: String,
    fields: Option<Vec<String>>,
    buffer_len: u64,
    position: u64,
    n_rows: u64,
}

impl Lh5Iterator<'_> {
    /// Only read these fields of a table.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// First row of the next buffer.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn n_rows(&self) -> u64 {
        self.n_rows
    }
}

impl Iterator for Lh5Iterator<'_> {
    type Item = crate::Result<Lh5Object>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.n_rows {
            return None;
        }
        let end = (self.position + self.buffer_len).min(self.n_rows);
        let options = ReadOptions {
            rows: Some(self.position..end),
            fields: self.fields.clone(),
        };
        let out = self.file.read(&self.path, &options);
        self.position = if out.is_ok() { end } else { self.n_rows };
        Some(out)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (self.n_rows - self.position).div_ceil(self.buffer_len) as usize;
        (n, Some(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::ArrayData;
    use crate::write::WriteOptions;

    fn file_with(objects: &[(&str, Lh5Object)]) -> Lh5File {
        let mut f = Lh5File::in_memory().unwrap();
        let opts = WriteOptions {
            chunk_rows: 2,
            ..Default::default()
        };
        for (name, object) in objects {
            f.write(object, name, &opts).unwrap();
        }
        f
    }

    #[test]
    fn test_field_subset() {
        let t: Lh5Object = Table::from_fields([
            ("a", Array::new(vec![1u8, 2, 3])),
            ("b", Array::new(vec![4u8, 5, 6])),
        ])
        .unwrap()
        .into();
        let f = file_with(&[("t", t)]);
        let Lh5Object::Table(sub) = f
            .read("t", &ReadOptions::default().with_fields(["b"]))
            .unwrap()
        else {
            panic!("expected a table");
        };
        assert_eq!(sub.names().collect::<Vec<_>>(), vec!["b"]);
        assert!(matches!(
            f.read("t", &ReadOptions::default().with_fields(["c"])),
            Err(crate::Error::FieldNotFound(_))
        ));
    }

    #[test]
    fn test_vov_partial_read() {
        let v = VectorOfVectors::from_vecs(vec![vec![1i64], vec![], vec![2, 3], vec![4, 5, 6]]);
        let f = file_with(&[("v", v.clone().into())]);
        for (start, end) in [(0, 4), (1, 3), (2, 4), (3, 3), (0, 1)] {
            let read = f
                .read("v", &ReadOptions::default().with_rows(start..end))
                .unwrap();
            let expected = v.slice(start as usize..end as usize).unwrap();
            assert_eq!(read, expected.into(), "rows {start}..{end}");
        }
    }

    #[test]
    fn test_missing_field_is_incomplete() {
        let s: Lh5Object = Struct::from_fields([
            ("x", Scalar::new(1u8)),
            ("y", Scalar::new(2u8)),
        ])
        .unwrap()
        .into();
        let f = file_with(&[("s", s)]);
        f.backend().erase("s/y").unwrap();
        assert!(matches!(
            f.read("s", &ReadOptions::default()),
            Err(crate::Error::Incomplete(_))
        ));
    }

    #[test]
    fn test_string_scalar() {
        let f = file_with(&[("name", Scalar::new("ged").into()), ("empty", Scalar::new("").into())]);
        assert_eq!(
            f.read("name", &ReadOptions::default()).unwrap(),
            Scalar::new("ged").into()
        );
        assert_eq!(
            f.read("empty", &ReadOptions::default()).unwrap(),
            Scalar::new("").into()
        );
    }

    #[test]
    fn test_iterator() {
        let a: Lh5Object = Array::new((0..7u32).collect::<Vec<_>>()).into();
        let f = file_with(&[("a", a)]);
        let it = f.iter_rows("a", 3).unwrap();
        assert_eq!(it.size_hint(), (3, Some(3)));
        let lens: Vec<usize> = it
            .map(|buf| buf.unwrap().num_rows().unwrap())
            .collect();
        assert_eq!(lens, vec![3, 3, 1]);
        assert!(f.iter_rows("a", 0).is_err());
    }

    #[test]
    fn test_ls_and_n_rows() {
        let t: Lh5Object = Table::from_fields([("a", Array::new(vec![1u8, 2]))])
            .unwrap()
            .into();
        let f = file_with(&[("t", t), ("s", Scalar::new(1.0f64).into())]);
        assert_eq!(f.ls("").unwrap(), vec!["s", "t"]);
        assert_eq!(f.ls("t").unwrap(), vec!["t/a"]);
        assert_eq!(f.ls("t/a").unwrap(), vec!["t/a"]);
        assert_eq!(f.read_n_rows("t").unwrap(), Some(2));
        assert_eq!(f.read_n_rows("s").unwrap(), None);
        let (raw, shape) = f.backend().read_dataset("t/a", None).unwrap();
        assert_eq!(raw, ArrayData::from(vec![1u8, 2]));
        assert_eq!(shape, vec![2]);
    }

    #[test]
    fn test_encoded_partial_read() {
        let encoded = EncodedArray::vector(
            VectorOfVectors::from_vecs(vec![vec![1u8, 2], vec![3], vec![], vec![4, 5, 6]]),
            Array::new(vec![2u32, 1, 0, 3]),
        )
        .unwrap();
        let f = file_with(&[("wf", encoded.clone().into())]);
        assert_eq!(f.read_n_rows("wf").unwrap(), Some(4));
        let read = f
            .read("wf", &ReadOptions::default().with_rows(1..4))
            .unwrap();
        assert_eq!(read, encoded.slice(1..4).unwrap().into());

        let equal = EncodedArray::equal_sized(
            VectorOfVectors::from_vecs(vec![vec![7u8], vec![8, 9]]),
            Scalar::new(5u16),
        )
        .unwrap();
        let f = file_with(&[("wf", equal.clone().into())]);
        let Lh5Object::EncodedArray(read) = f
            .read("wf", &ReadOptions::default().with_rows(1..2))
            .unwrap()
        else {
            panic!("expected encoded waveforms");
        };
        assert_eq!(read.decoded_sizes().unwrap(), vec![5]);
        assert_eq!(read, equal.slice(1..2).unwrap());
    }
}
