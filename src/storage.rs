//! Backend adapter over a zarrs key-value store.
//!
//! Every node (group or dataset) is a key prefix holding an `attributes.json`
//! document. Dataset chunks are read and written through a [`zarrs::array::Array`]
//! built from that document: a regular bounded grid along the first dimension,
//! [`ChunkCodec`](crate::codec::ChunkCodec) blobs and
//! [`RowChunkKeyEncoding`](crate::chunk_key_encoding::RowChunkKeyEncoding) keys.

use std::ops::Range;

use bytes::Bytes;
use log::{debug, trace};
use zarrs::array::{
    Array, ArrayError, ArrayMetadata, ArrayMetadataV3, ArraySubset, CodecError, CodecOptions,
};
use zarrs::storage::{
    ListableStorageTraits, ReadableStorageTraits, ReadableWritableListableStorage,
    ReadableWritableListableStorageTraits, StoreKey, StorePrefix, WritableStorageTraits,
};

use crate::datatype::validate_name;
use crate::dtype::{ArrayData, DType};
use crate::metadata::{
    Attributes, Compression, DatasetMetadata, GroupMetadata, METADATA_KEY, NodeMetadata,
};

/// Rows per chunk unless the caller asks otherwise.
pub const DEFAULT_CHUNK_ROWS: u64 = 16384;

/// Creation-time properties of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetOptions {
    pub chunk_rows: u64,
    pub compression: Compression,
    pub resizable: bool,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            chunk_rows: DEFAULT_CHUNK_ROWS,
            compression: Compression::gzip(),
            resizable: true,
        }
    }
}

/// Normalise a `/`-separated path: no leading or trailing separators,
/// every component a valid name. The root is the empty string.
pub fn normalize_path(path: &str) -> crate::Result<String> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    for component in trimmed.split('/') {
        validate_name(component).map_err(|_| crate::Error::InvalidName(path.to_owned()))?;
    }
    Ok(trimmed.to_owned())
}

/// Join a parent path and a child name.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_owned()
    } else {
        format!("{parent}/{name}")
    }
}

/// Final component of a path.
pub fn base_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

fn node_prefix(path: &str) -> crate::Result<StorePrefix> {
    let s = if path.is_empty() {
        String::new()
    } else {
        format!("{path}/")
    };
    StorePrefix::new(s).map_err(crate::Error::wrap)
}

fn metadata_key(path: &str) -> crate::Result<StoreKey> {
    StoreKey::new(join_path(path, METADATA_KEY)).map_err(crate::Error::wrap)
}

/// Hierarchical view of a zarrs store.
///
/// The adapter is stateless apart from the store handle,
/// so clones can be used from several threads for reading.
#[derive(Clone)]
pub struct Lh5Backend {
    inner: ReadableWritableListableStorage,
}

impl Lh5Backend {
    pub fn new(inner: ReadableWritableListableStorage) -> Self {
        Self { inner }
    }

    /// The underlying store.
    pub fn storage(&self) -> &ReadableWritableListableStorage {
        &self.inner
    }

    /// Metadata of the node at `path`, `None` if there is no such node.
    pub fn get_metadata(&self, path: &str) -> crate::Result<Option<NodeMetadata>> {
        let key = metadata_key(path)?;
        let Some(bytes) = self
            .inner
            .get(&key)
            .map_err(|e| crate::Error::backend(path, e))?
        else {
            return Ok(None);
        };
        let meta = serde_json::from_slice(&bytes).map_err(|e| {
            crate::Error::general(format!("could not parse metadata of '{path}': {e}"))
        })?;
        Ok(Some(meta))
    }

    /// Metadata of the node at `path`, failing with [`crate::Error::NotFound`] if absent.
    pub fn node_metadata(&self, path: &str) -> crate::Result<NodeMetadata> {
        self.get_metadata(path)?
            .ok_or_else(|| crate::Error::NotFound(path.to_owned()))
    }

    /// Metadata of the dataset at `path`.
    pub fn dataset_metadata(&self, path: &str) -> crate::Result<DatasetMetadata> {
        match self.node_metadata(path)? {
            NodeMetadata::Dataset(m) => Ok(m),
            NodeMetadata::Group(_) => Err(crate::Error::TypeMismatch(format!(
                "'{path}' is a group, not a dataset"
            ))),
        }
    }

    pub fn set_metadata(&self, path: &str, meta: &NodeMetadata) -> crate::Result<()> {
        let key = metadata_key(path)?;
        let bytes = serde_json::to_vec(meta)?;
        trace!("writing metadata of '{path}'");
        self.inner
            .set(&key, Bytes::from(bytes))
            .map_err(|e| crate::Error::backend(path, e))
    }

    pub fn exists(&self, path: &str) -> crate::Result<bool> {
        let key = metadata_key(path)?;
        let size = self
            .inner
            .size_key(&key)
            .map_err(|e| crate::Error::backend(path, e))?;
        Ok(size.is_some())
    }

    /// Attributes of a node, including its `datatype`.
    pub fn read_attrs(&self, path: &str) -> crate::Result<Attributes> {
        Ok(self.node_metadata(path)?.into_attributes())
    }

    /// Replace the attributes of an existing node.
    pub fn write_attrs(&self, path: &str, attrs: Attributes) -> crate::Result<()> {
        let mut meta = self.node_metadata(path)?;
        *meta.attributes_mut() = attrs;
        self.set_metadata(path, &meta)
    }

    /// Create a group at `path`.
    ///
    /// Fails with [`crate::Error::PathExists`] if a node is already there.
    pub fn create_group(&self, path: &str, attrs: Attributes) -> crate::Result<()> {
        if self.exists(path)? {
            return Err(crate::Error::PathExists(path.to_owned()));
        }
        debug!("creating group '{path}'");
        let meta = GroupMetadata {
            attributes: attrs,
            ..Default::default()
        };
        self.set_metadata(path, &meta.into())
    }

    /// Create every missing ancestor group of `path` as a plain group.
    pub fn ensure_parents(&self, path: &str) -> crate::Result<()> {
        let mut parent = String::new();
        let components: Vec<&str> = path.split('/').collect();
        for component in &components[..components.len().saturating_sub(1)] {
            parent = join_path(&parent, component);
            match self.get_metadata(&parent)? {
                Some(NodeMetadata::Group(_)) => {}
                Some(NodeMetadata::Dataset(_)) => {
                    return Err(crate::Error::TypeMismatch(format!(
                        "'{parent}' is a dataset and cannot hold children"
                    )));
                }
                None => self.create_group(&parent, Attributes::new())?,
            }
        }
        Ok(())
    }

    /// Names of the children of the group at `path`, sorted.
    pub fn list_children(&self, path: &str) -> crate::Result<Vec<String>> {
        if let NodeMetadata::Dataset(_) = self.node_metadata(path)? {
            return Ok(Vec::new());
        }
        self.list_prefixes(path)
    }

    /// Names of the nodes stored directly below `path`, without reading the
    /// metadata of `path` itself. Only prefixes holding a metadata document count.
    pub fn list_stored_children(&self, path: &str) -> crate::Result<Vec<String>> {
        let mut names = self.list_prefixes(path)?;
        names.retain(|name| self.exists(&join_path(path, name)).unwrap_or(false));
        Ok(names)
    }

    fn list_prefixes(&self, path: &str) -> crate::Result<Vec<String>> {
        let prefix = node_prefix(path)?;
        let listing = self
            .inner
            .list_dir(&prefix)
            .map_err(|e| crate::Error::backend(path, e))?;
        let mut names: Vec<String> = listing
            .prefixes()
            .iter()
            .filter_map(|p| {
                p.as_str()
                    .strip_prefix(prefix.as_str())
                    .map(|s| s.trim_end_matches('/').to_owned())
            })
            .filter(|s| !s.is_empty())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Remove the node at `path` and everything below it.
    pub fn erase(&self, path: &str) -> crate::Result<()> {
        debug!("erasing '{path}'");
        let prefix = node_prefix(path)?;
        self.inner
            .erase_prefix(&prefix)
            .map_err(|e| crate::Error::backend(path, e))
    }

    /// Write the metadata of a new dataset without any chunks.
    pub fn create_dataset(
        &self,
        path: &str,
        data_type: &str,
        shape: &[u64],
        attrs: Attributes,
        options: &DatasetOptions,
    ) -> crate::Result<DatasetMetadata> {
        let meta = DatasetMetadata {
            dimensions: shape.to_vec(),
            chunk_rows: if shape.is_empty() { 1 } else { options.chunk_rows },
            data_type: data_type.to_owned(),
            compression: options.compression,
            resizable: options.resizable && !shape.is_empty(),
            incomplete: true,
            attributes: attrs,
        };
        // the zarr view validates chunking, codec and data type before the store is touched
        ArrayMetadataV3::try_from(&meta)?;
        debug!("creating dataset '{path}' with shape {shape:?}");
        self.set_metadata(path, &meta.clone().into())?;
        Ok(meta)
    }

    /// Zarr array addressing the chunks of the dataset at `path`.
    fn array(&self, path: &str, meta: &DatasetMetadata) -> crate::Result<Lh5Array> {
        let metadata = ArrayMetadataV3::try_from(meta)?;
        Array::new_with_metadata(
            self.inner.clone(),
            &format!("/{path}"),
            ArrayMetadata::V3(metadata),
        )
        .map_err(crate::Error::wrap)
    }

    /// Write `n_rows` rows of `data` starting at `first_row`.
    ///
    /// The rows must lie within `meta.dimensions`. Rows before `first_row` in
    /// a partially filled chunk are preserved. Metadata is not updated.
    pub fn write_rows(
        &self,
        path: &str,
        meta: &DatasetMetadata,
        first_row: u64,
        n_rows: u64,
        data: &ArrayData,
    ) -> crate::Result<()> {
        let dtype = meta.dtype()?;
        if data.dtype() != dtype {
            return Err(crate::Error::TypeMismatch(format!(
                "cannot write {} data into {dtype} dataset '{path}'",
                data.dtype()
            )));
        }
        let expected = n_rows.checked_mul(meta.row_stride());
        if expected != Some(data.len() as u64) {
            return Err(crate::Error::ShapeMismatch(format!(
                "{} elements do not form {n_rows} rows of '{path}'",
                data.len()
            )));
        }
        if first_row + n_rows > meta.rows() {
            return Err(crate::Error::ShapeMismatch(format!(
                "rows {first_row}..{} are outside the {} rows of '{path}'",
                first_row + n_rows,
                meta.rows()
            )));
        }
        if data.is_empty() {
            return Ok(());
        }
        let array = self.array(path, meta)?;
        let subset = row_subset(meta, first_row..first_row + n_rows);
        trace!("writing rows {:?} of '{path}'", subset.start());
        store_subset(&array, &subset, data).map_err(|e| array_error(path, e))
    }

    /// Read rows `rows` of a dataset whose metadata is `meta`.
    ///
    /// Only the chunks overlapping `rows` are fetched. A missing chunk is
    /// reported as [`crate::Error::Incomplete`].
    pub fn read_rows(
        &self,
        path: &str,
        meta: &DatasetMetadata,
        rows: Range<u64>,
    ) -> crate::Result<ArrayData> {
        let dtype = meta.dtype()?;
        if rows.is_empty() || meta.row_stride() == 0 {
            return Ok(ArrayData::empty(dtype));
        }
        let array = self.array(path, meta)?;
        let subset = row_subset(meta, rows);
        let chunks = array
            .chunks_in_array_subset(&subset)
            .map_err(crate::Error::wrap)?
            .ok_or_else(|| crate::Error::general(format!("no chunk grid for '{path}'")))?;
        for indices in &chunks.indices() {
            let key = array.chunk_key(&indices);
            let size = self
                .inner
                .size_key(&key)
                .map_err(|e| crate::Error::backend(path, e))?;
            if size.is_none() {
                return Err(crate::Error::Incomplete(format!(
                    "{path} (chunk {})",
                    key.as_str()
                )));
            }
        }
        retrieve_subset(&array, &subset, dtype).map_err(|e| array_error(path, e))
    }

    /// Create a dataset and write its payload in one go.
    ///
    /// The dataset is flagged incomplete until every chunk is stored.
    pub fn write_dataset(
        &self,
        path: &str,
        data: &ArrayData,
        shape: &[u64],
        attrs: Attributes,
        options: &DatasetOptions,
    ) -> crate::Result<DatasetMetadata> {
        let expected: u64 = shape.iter().product();
        if expected != data.len() as u64 {
            return Err(crate::Error::ShapeMismatch(format!(
                "shape {shape:?} does not match {} elements",
                data.len()
            )));
        }
        let mut meta = self.create_dataset(path, data.dtype().name(), shape, attrs, options)?;
        self.write_rows(path, &meta, 0, meta.rows(), data)?;
        meta.incomplete = false;
        self.set_metadata(path, &meta.clone().into())?;
        Ok(meta)
    }

    /// Read a dataset, optionally restricted to a row range.
    ///
    /// The range is clamped to the dataset's rows. Returns the elements
    /// and the shape of what was read.
    pub fn read_dataset(
        &self,
        path: &str,
        rows: Option<Range<u64>>,
    ) -> crate::Result<(ArrayData, Vec<u64>)> {
        let meta = self.dataset_metadata(path)?;
        if meta.incomplete {
            return Err(crate::Error::Incomplete(path.to_owned()));
        }
        let rows = clamp_rows(rows, meta.rows());
        let data = self.read_rows(path, &meta, rows.clone())?;
        let shape = if meta.dimensions.is_empty() {
            Vec::new()
        } else {
            std::iter::once(rows.end - rows.start)
                .chain(meta.inner_shape().iter().copied())
                .collect()
        };
        Ok((data, shape))
    }

    /// Append `n_rows` rows to a resizable dataset.
    ///
    /// `inner_shape` is the shape of one row. Returns the metadata as it was
    /// before the append, so that callers can roll back.
    pub fn append_dataset(
        &self,
        path: &str,
        data: &ArrayData,
        inner_shape: &[u64],
        n_rows: u64,
    ) -> crate::Result<DatasetMetadata> {
        let before = self.dataset_metadata(path)?;
        self.check_appendable(path, &before, data, inner_shape, n_rows)?;
        debug!("appending {n_rows} rows to '{path}'");
        let mut after = before.clone();
        after.dimensions[0] += n_rows;
        self.write_rows(path, &after, before.rows(), n_rows, data)?;
        self.set_metadata(path, &after.into())?;
        Ok(before)
    }

    /// Check, without writing, that `n_rows` rows of `data` can be appended to the dataset.
    pub fn check_appendable(
        &self,
        path: &str,
        meta: &DatasetMetadata,
        data: &ArrayData,
        inner_shape: &[u64],
        n_rows: u64,
    ) -> crate::Result<()> {
        if meta.incomplete {
            return Err(crate::Error::Incomplete(path.to_owned()));
        }
        if !meta.resizable || meta.dimensions.is_empty() {
            return Err(crate::Error::NotAppendable(path.to_owned()));
        }
        if meta.dtype()? != data.dtype() {
            return Err(crate::Error::TypeMismatch(format!(
                "cannot append {} data to {} dataset '{path}'",
                data.dtype(),
                meta.data_type
            )));
        }
        if meta.inner_shape() != inner_shape {
            return Err(crate::Error::ShapeMismatch(format!(
                "cannot append rows of shape {inner_shape:?} to '{path}' with rows of shape {:?}",
                meta.inner_shape()
            )));
        }
        if n_rows.checked_mul(meta.row_stride()) != Some(data.len() as u64) {
            return Err(crate::Error::ShapeMismatch(format!(
                "{} elements do not form {n_rows} rows of '{path}'",
                data.len()
            )));
        }
        Ok(())
    }
}

type Lh5Array = Array<dyn ReadableWritableListableStorageTraits>;

fn array_error(path: &str, error: ArrayError) -> crate::Error {
    match error {
        ArrayError::StorageError(e) | ArrayError::CodecError(CodecError::StorageError(e)) => {
            crate::Error::backend(path, e)
        }
        other => crate::Error::wrap(other),
    }
}

/// Subset covering whole rows `rows`; a scalar is its single element.
fn row_subset(meta: &DatasetMetadata, rows: Range<u64>) -> ArraySubset {
    let ranges: Vec<Range<u64>> = if meta.dimensions.is_empty() {
        vec![0..1]
    } else {
        std::iter::once(rows)
            .chain(meta.inner_shape().iter().map(|&n| 0..n))
            .collect()
    };
    ArraySubset::new_with_ranges(&ranges)
}

fn store_subset(
    array: &Lh5Array,
    subset: &ArraySubset,
    data: &ArrayData,
) -> Result<(), ArrayError> {
    // a chunk of zeros must still be stored: a missing chunk means an unfinished write
    let options = CodecOptions::default().with_store_empty_chunks(true);
    match data {
        ArrayData::Bool(v) => array.store_array_subset_opt(subset, v.as_slice(), &options),
        ArrayData::U8(v) => array.store_array_subset_opt(subset, v.as_slice(), &options),
        ArrayData::I8(v) => array.store_array_subset_opt(subset, v.as_slice(), &options),
        ArrayData::U16(v) => array.store_array_subset_opt(subset, v.as_slice(), &options),
        ArrayData::I16(v) => array.store_array_subset_opt(subset, v.as_slice(), &options),
        ArrayData::U32(v) => array.store_array_subset_opt(subset, v.as_slice(), &options),
        ArrayData::I32(v) => array.store_array_subset_opt(subset, v.as_slice(), &options),
        ArrayData::U64(v) => array.store_array_subset_opt(subset, v.as_slice(), &options),
        ArrayData::I64(v) => array.store_array_subset_opt(subset, v.as_slice(), &options),
        ArrayData::F32(v) => array.store_array_subset_opt(subset, v.as_slice(), &options),
        ArrayData::F64(v) => array.store_array_subset_opt(subset, v.as_slice(), &options),
    }
}

fn retrieve_subset(
    array: &Lh5Array,
    subset: &ArraySubset,
    dtype: DType,
) -> Result<ArrayData, ArrayError> {
    let data = match dtype {
        DType::Bool => ArrayData::Bool(array.retrieve_array_subset(subset)?),
        DType::U8 => ArrayData::U8(array.retrieve_array_subset(subset)?),
        DType::I8 => ArrayData::I8(array.retrieve_array_subset(subset)?),
        DType::U16 => ArrayData::U16(array.retrieve_array_subset(subset)?),
        DType::I16 => ArrayData::I16(array.retrieve_array_subset(subset)?),
        DType::U32 => ArrayData::U32(array.retrieve_array_subset(subset)?),
        DType::I32 => ArrayData::I32(array.retrieve_array_subset(subset)?),
        DType::U64 => ArrayData::U64(array.retrieve_array_subset(subset)?),
        DType::I64 => ArrayData::I64(array.retrieve_array_subset(subset)?),
        DType::F32 => ArrayData::F32(array.retrieve_array_subset(subset)?),
        DType::F64 => ArrayData::F64(array.retrieve_array_subset(subset)?),
    };
    Ok(data)
}

/// Clamp an optional `[start, end)` range to `0..n`.
pub fn clamp_rows(rows: Option<Range<u64>>, n: u64) -> Range<u64> {
    match rows {
        None => 0..n,
        Some(r) => {
            let end = r.end.min(n);
            r.start.min(end)..end
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use zarrs::storage::store::MemoryStore;

    use super::*;

    fn backend() -> Lh5Backend {
        Lh5Backend::new(Arc::new(MemoryStore::new()))
    }

    fn options(chunk_rows: u64) -> DatasetOptions {
        DatasetOptions {
            chunk_rows,
            compression: Compression::Raw,
            resizable: true,
        }
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/a/b/").unwrap(), "a/b");
        assert_eq!(normalize_path("/").unwrap(), "");
        assert!(normalize_path("a//b").is_err());
        assert!(normalize_path("a/attributes.json").is_err());
    }

    #[test]
    fn test_partial_read_across_chunks() {
        let b = backend();
        let data = ArrayData::from((0..10u32).collect::<Vec<_>>());
        b.write_dataset("x", &data, &[10], Attributes::new(), &options(3))
            .unwrap();
        let (part, shape) = b.read_dataset("x", Some(2..8)).unwrap();
        assert_eq!(part.as_slice::<u32>().unwrap(), &[2, 3, 4, 5, 6, 7]);
        assert_eq!(shape, vec![6]);

        let (empty, shape) = b.read_dataset("x", Some(5..5)).unwrap();
        assert!(empty.is_empty());
        assert_eq!(shape, vec![0]);

        let (tail, _) = b.read_dataset("x", Some(8..100)).unwrap();
        assert_eq!(tail.as_slice::<u32>().unwrap(), &[8, 9]);
    }

    #[test]
    fn test_partial_read_skips_other_chunks() {
        let b = backend();
        let data = ArrayData::from((0..9i16).collect::<Vec<_>>());
        b.write_dataset("x", &data, &[9], Attributes::new(), &options(3))
            .unwrap();
        // remove the first chunk; rows from later chunks are still readable
        b.storage()
            .erase(&StoreKey::new("x/0").unwrap())
            .unwrap();
        let (part, _) = b.read_dataset("x", Some(3..9)).unwrap();
        assert_eq!(part.len(), 6);
        assert!(matches!(
            b.read_dataset("x", Some(0..4)),
            Err(crate::Error::Incomplete(_))
        ));
    }

    #[test]
    fn test_chunks_of_zeros_are_stored() {
        let b = backend();
        let data = ArrayData::from(vec![0.0f64; 5]);
        b.write_dataset("t0", &data, &[5], Attributes::new(), &options(2))
            .unwrap();
        for key in ["t0/0", "t0/1", "t0/2"] {
            assert!(b.storage().get(&StoreKey::new(key).unwrap()).unwrap().is_some());
        }
        let (all, _) = b.read_dataset("t0", None).unwrap();
        assert_eq!(all, data);

        b.write_dataset("flags", &ArrayData::from(vec![false; 3]), &[3], Attributes::new(), &options(4))
            .unwrap();
        b.append_dataset("flags", &ArrayData::from(vec![false; 2]), &[], 2)
            .unwrap();
        let (flags, shape) = b.read_dataset("flags", None).unwrap();
        assert_eq!(flags, ArrayData::from(vec![false; 5]));
        assert_eq!(shape, vec![5]);
    }

    #[test]
    fn test_two_dimensional() {
        let b = backend();
        let data = ArrayData::from((0..12u8).collect::<Vec<_>>());
        b.write_dataset("w", &data, &[4, 3], Attributes::new(), &options(3))
            .unwrap();
        let (rows, shape) = b.read_dataset("w", Some(1..3)).unwrap();
        assert_eq!(shape, vec![2, 3]);
        assert_eq!(rows.as_slice::<u8>().unwrap(), &[3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_scalar_dataset() {
        let b = backend();
        b.write_dataset(
            "s",
            &ArrayData::from(vec![2.5f32]),
            &[],
            Attributes::new(),
            &options(10),
        )
        .unwrap();
        let (data, shape) = b.read_dataset("s", None).unwrap();
        assert_eq!(data, ArrayData::from(vec![2.5f32]));
        assert!(shape.is_empty());
        assert!(matches!(
            b.append_dataset("s", &ArrayData::from(vec![1.0f32]), &[], 1),
            Err(crate::Error::NotAppendable(_))
        ));
    }

    #[test]
    fn test_append_fills_partial_chunk() {
        let b = backend();
        b.write_dataset(
            "x",
            &ArrayData::from(vec![1i64, 2]),
            &[2],
            Attributes::new(),
            &options(3),
        )
        .unwrap();
        let before = b
            .append_dataset("x", &ArrayData::from(vec![3i64, 4, 5]), &[], 3)
            .unwrap();
        assert_eq!(before.rows(), 2);
        let (all, shape) = b.read_dataset("x", None).unwrap();
        assert_eq!(all.as_slice::<i64>().unwrap(), &[1, 2, 3, 4, 5]);
        assert_eq!(shape, vec![5]);
    }

    #[test]
    fn test_chunk_keys_on_disk() {
        let b = backend();
        let data = ArrayData::from((0..12u8).collect::<Vec<_>>());
        b.write_dataset("w", &data, &[4, 3], Attributes::new(), &options(3))
            .unwrap();
        for key in ["w/0/0", "w/0/1"] {
            let key = StoreKey::new(key).unwrap();
            assert!(b.storage().get(&key).unwrap().is_some());
        }
        // the edge chunk holds only the rows inside the extent
        let edge = b.storage().get(&StoreKey::new("w/0/1").unwrap()).unwrap().unwrap();
        assert_eq!(&edge[..12], &[0, 0, 0, 2, 0, 0, 0, 1, 0, 0, 0, 3]);
    }

    #[test]
    fn test_corrupt_chunk_header_is_an_error() {
        let b = backend();
        b.write_dataset("x", &ArrayData::from(vec![1u32, 2]), &[2], Attributes::new(), &options(4))
            .unwrap();
        let mut blob = vec![0, 0, 0, 3];
        blob.extend(std::iter::repeat_n(0xff, 12));
        b.storage()
            .set(&StoreKey::new("x/0").unwrap(), Bytes::from(blob))
            .unwrap();
        assert!(b.read_dataset("x", None).is_err());
    }

    #[test]
    fn test_append_zero_width_rows() {
        let b = backend();
        b.write_dataset("w", &ArrayData::from(Vec::<f32>::new()), &[3, 0], Attributes::new(), &options(2))
            .unwrap();
        b.append_dataset("w", &ArrayData::from(Vec::<f32>::new()), &[0], 2)
            .unwrap();
        let (data, shape) = b.read_dataset("w", None).unwrap();
        assert!(data.is_empty());
        assert_eq!(shape, vec![5, 0]);
        assert!(matches!(
            b.append_dataset("w", &ArrayData::from(vec![1.0f32]), &[0], 1),
            Err(crate::Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_append_checks() {
        let b = backend();
        let fixed = DatasetOptions {
            resizable: false,
            ..options(4)
        };
        b.write_dataset("f", &ArrayData::from(vec![1u8]), &[1], Attributes::new(), &fixed)
            .unwrap();
        assert!(matches!(
            b.append_dataset("f", &ArrayData::from(vec![1u8]), &[], 1),
            Err(crate::Error::NotAppendable(_))
        ));
        b.write_dataset("r", &ArrayData::from(vec![1u8]), &[1], Attributes::new(), &options(4))
            .unwrap();
        assert!(matches!(
            b.append_dataset("r", &ArrayData::from(vec![1.0f64]), &[], 1),
            Err(crate::Error::TypeMismatch(_))
        ));
        assert!(matches!(
            b.append_dataset("r", &ArrayData::from(vec![1u8, 2]), &[2], 1),
            Err(crate::Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_groups_and_children() {
        let b = backend();
        b.create_group("", Attributes::new()).unwrap();
        b.ensure_parents("a/b/c").unwrap();
        b.write_dataset("a/b/c", &ArrayData::from(vec![1u8]), &[1], Attributes::new(), &options(4))
            .unwrap();
        b.write_dataset("a/z", &ArrayData::from(vec![1u8]), &[1], Attributes::new(), &options(4))
            .unwrap();
        assert_eq!(b.list_children("").unwrap(), vec!["a"]);
        assert_eq!(b.list_children("a").unwrap(), vec!["b", "z"]);
        assert!(b.list_children("a/z").unwrap().is_empty());
        assert!(matches!(
            b.create_group("a", Attributes::new()),
            Err(crate::Error::PathExists(_))
        ));
        b.erase("a/b").unwrap();
        assert_eq!(b.list_children("a").unwrap(), vec!["z"]);
        assert!(!b.exists("a/b/c").unwrap());
    }

    #[test]
    fn test_attrs() {
        let b = backend();
        let mut attrs = Attributes::new();
        attrs.insert("units".into(), "ns".into());
        b.write_dataset("t", &ArrayData::from(vec![1u16]), &[1], attrs.clone(), &options(4))
            .unwrap();
        assert_eq!(b.read_attrs("t").unwrap(), attrs);
        assert!(matches!(
            b.read_attrs("missing"),
            Err(crate::Error::NotFound(_))
        ));
    }

    #[test]
    fn test_clamp_rows() {
        assert_eq!(clamp_rows(None, 4), 0..4);
        assert_eq!(clamp_rows(Some(1..3), 4), 1..3);
        assert_eq!(clamp_rows(Some(3..10), 4), 3..4);
        assert_eq!(clamp_rows(Some(6..10), 4), 4..4);
    }
}
