//! Writing LH5 objects.
//!
//! Every node goes through [`WriteState`]: its metadata is stored first,
//! flagged `incomplete`, and the flag is cleared only after all chunks and
//! children are stored. Readers therefore never mistake a half-written node
//! for a complete one.

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};

use crate::codec::ChunkCodec;
use crate::datatype::{Datatype, encode_datatype};
use crate::dtype::{ArrayData, DType, ScalarValue};
use crate::file::Lh5File;
use crate::metadata::{
    Attributes, Compression, DATATYPE_ATTR, DatasetMetadata, GroupMetadata, check_user_attributes,
};
use crate::object::{Array, ArrayLayout, CODEC_ATTR, DecodedSize, Lh5Object};
use crate::read::{node_datatype, node_rows};
use crate::storage::{DEFAULT_CHUNK_ROWS, DatasetOptions, Lh5Backend, join_path, normalize_path};

/// What to do when the target path already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Fail with [`crate::Error::PathExists`].
    #[default]
    WriteSafe,
    /// Delete the existing object and write the new one.
    Overwrite,
    /// Append the rows of the new object to the existing one.
    Append,
    /// Add the columns of a new table to an existing table.
    AppendColumn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    /// Group the object is written into; created if missing.
    pub group: String,
    pub mode: WriteMode,
    /// Compression of new datasets.
    pub compression: Compression,
    /// Rows per chunk of new datasets.
    pub chunk_rows: u64,
    /// Whether new datasets accept appended rows.
    pub resizable: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            group: String::new(),
            mode: WriteMode::default(),
            compression: Compression::gzip(),
            chunk_rows: DEFAULT_CHUNK_ROWS,
            resizable: true,
        }
    }
}

impl WriteOptions {
    pub fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    fn dataset_options(&self) -> DatasetOptions {
        DatasetOptions {
            chunk_rows: self.chunk_rows,
            compression: self.compression,
            resizable: self.resizable,
        }
    }
}

/// Progress of writing a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WriteState {
    Pending,
    /// Metadata stored, flagged incomplete.
    TypeEncoded,
    /// Chunks or children stored.
    PayloadWritten,
    /// Incomplete flag cleared.
    Complete,
}

struct NodeWriter<'a> {
    backend: &'a Lh5Backend,
    path: &'a str,
    state: WriteState,
}

impl<'a> NodeWriter<'a> {
    fn new(backend: &'a Lh5Backend, path: &'a str) -> Self {
        Self {
            backend,
            path,
            state: WriteState::Pending,
        }
    }

    fn advance(&mut self, next: WriteState) {
        debug_assert!(next > self.state, "{:?} -> {next:?}", self.state);
        trace!("'{}': {:?} -> {next:?}", self.path, self.state);
        self.state = next;
    }

    fn encode_group(&mut self, attrs: Attributes) -> crate::Result<()> {
        let meta = GroupMetadata {
            incomplete: true,
            attributes: attrs,
            ..Default::default()
        };
        self.backend.set_metadata(self.path, &meta.into())?;
        self.advance(WriteState::TypeEncoded);
        Ok(())
    }

    fn encode_dataset(
        &mut self,
        dtype: DType,
        shape: &[u64],
        attrs: Attributes,
        options: &DatasetOptions,
    ) -> crate::Result<DatasetMetadata> {
        let meta = self
            .backend
            .create_dataset(self.path, dtype.name(), shape, attrs, options)?;
        self.advance(WriteState::TypeEncoded);
        Ok(meta)
    }

    fn payload_written(&mut self) {
        self.advance(WriteState::PayloadWritten);
    }

    fn complete(&mut self) -> crate::Result<()> {
        let mut meta = self.backend.node_metadata(self.path)?;
        meta.set_incomplete(false);
        self.backend.set_metadata(self.path, &meta)?;
        self.advance(WriteState::Complete);
        Ok(())
    }
}

/// User attributes of `object` plus its datatype descriptor.
fn object_attrs(path: &str, object: &Lh5Object) -> crate::Result<Attributes> {
    check_user_attributes(path, object.attrs())?;
    let mut attrs = object.attrs().clone();
    attrs.insert(DATATYPE_ATTR.into(), encode_datatype(object).into());
    Ok(attrs)
}

/// Run every check `write_object` would make, without touching the store.
fn validate_object(path: &str, object: &Lh5Object, options: &DatasetOptions) -> crate::Result<()> {
    check_user_attributes(path, object.attrs())?;
    ChunkCodec::new(options.compression, options.chunk_rows)?;
    match object {
        Lh5Object::Scalar(_) | Lh5Object::Array(_) => Ok(()),
        Lh5Object::VectorOfVectors(v) => validate_object(
            &join_path(path, "flattened_data"),
            v.flattened_data(),
            options,
        ),
        Lh5Object::EncodedArray(e) => {
            let data_path = join_path(path, "encoded_data");
            check_user_attributes(&data_path, e.encoded_data().attrs())?;
            let size_attrs = match e.decoded_size() {
                DecodedSize::PerRow(a) => a.attrs(),
                DecodedSize::Uniform(s) => s.attrs(),
            };
            check_user_attributes(&join_path(path, "decoded_size"), size_attrs)?;
            validate_object(
                &join_path(&data_path, "flattened_data"),
                e.encoded_data().flattened_data(),
                options,
            )
        }
        Lh5Object::Struct(s) => s
            .iter()
            .try_for_each(|(name, field)| validate_object(&join_path(path, name), field, options)),
        Lh5Object::Table(t) => t
            .iter()
            .try_for_each(|(name, field)| validate_object(&join_path(path, name), field, options)),
    }
}

/// Write a new node, erasing whatever was stored of it if the write fails.
fn write_new_object(
    backend: &Lh5Backend,
    path: &str,
    object: &Lh5Object,
    options: &DatasetOptions,
) -> crate::Result<()> {
    write_object(backend, path, object, options).inspect_err(|e| {
        warn!("writing '{path}' failed: {e}");
        if let Err(erase_err) = backend.erase(path) {
            warn!("could not remove partial '{path}': {erase_err}");
        }
    })
}

fn to_u64_shape(shape: &[usize]) -> Vec<u64> {
    shape.iter().map(|&n| n as u64).collect()
}

/// Write `object` as a new node at `path`, which must not exist.
fn write_object(
    backend: &Lh5Backend,
    path: &str,
    object: &Lh5Object,
    options: &DatasetOptions,
) -> crate::Result<()> {
    debug!("writing {} to '{path}'", object.datatype());
    let attrs = object_attrs(path, object)?;
    let mut node = NodeWriter::new(backend, path);
    match object {
        Lh5Object::Scalar(s) => {
            let data = s.value().to_data();
            // strings are stored as a byte vector
            let shape = match s.value() {
                ScalarValue::String(_) => vec![data.len() as u64],
                _ => Vec::new(),
            };
            let fixed = DatasetOptions {
                resizable: false,
                ..*options
            };
            let meta = node.encode_dataset(data.dtype(), &shape, attrs, &fixed)?;
            backend.write_rows(path, &meta, 0, meta.rows(), &data)?;
        }
        Lh5Object::Array(a) => {
            let opts = DatasetOptions {
                resizable: options.resizable && a.layout() != ArrayLayout::FixedSize,
                ..*options
            };
            let meta = node.encode_dataset(a.dtype(), &to_u64_shape(a.shape()), attrs, &opts)?;
            backend.write_rows(path, &meta, 0, meta.rows(), a.data())?;
        }
        Lh5Object::VectorOfVectors(v) => {
            node.encode_group(attrs)?;
            write_object(
                backend,
                &join_path(path, "flattened_data"),
                v.flattened_data(),
                options,
            )?;
            let cumulative_length = Array::new(v.cumulative_length().to_vec());
            write_object(
                backend,
                &join_path(path, "cumulative_length"),
                &cumulative_length.into(),
                options,
            )?;
        }
        Lh5Object::EncodedArray(e) => {
            node.encode_group(attrs)?;
            write_object(
                backend,
                &join_path(path, "encoded_data"),
                &e.encoded_data().clone().into(),
                options,
            )?;
            write_object(
                backend,
                &join_path(path, "decoded_size"),
                &decoded_size_object(e.decoded_size()),
                options,
            )?;
        }
        Lh5Object::Struct(s) => {
            node.encode_group(attrs)?;
            for (name, field) in s.iter() {
                write_object(backend, &join_path(path, name), field, options)?;
            }
        }
        Lh5Object::Table(t) => {
            node.encode_group(attrs)?;
            for (name, field) in t.iter() {
                write_object(backend, &join_path(path, name), field, options)?;
            }
        }
    }
    node.payload_written();
    node.complete()
}

fn decoded_size_object(size: &DecodedSize) -> Lh5Object {
    match size {
        DecodedSize::PerRow(a) => a.clone().into(),
        DecodedSize::Uniform(s) => s.clone().into(),
    }
}

/// Rows to add to one dataset during an append.
struct AppendItem {
    path: String,
    data: ArrayData,
    inner_shape: Vec<u64>,
    n_rows: u64,
}

/// Collect the dataset appends needed to add `object` to the node at `path`,
/// checking each of them without writing anything.
fn plan_append(
    backend: &Lh5Backend,
    path: &str,
    object: &Lh5Object,
    items: &mut Vec<AppendItem>,
) -> crate::Result<()> {
    let meta = backend.node_metadata(path)?;
    if meta.is_incomplete() {
        return Err(crate::Error::Incomplete(path.to_owned()));
    }
    let existing = node_datatype(path, &meta)?;
    match (object, &existing) {
        (Lh5Object::Scalar(_), Datatype::Scalar(_)) => {
            Err(crate::Error::NotAppendable(path.to_owned()))
        }
        (Lh5Object::Array(a), dt) if a.datatype() == *dt => {
            let inner_shape = to_u64_shape(&a.shape()[1..]);
            let n_rows = a.len() as u64;
            let ds = backend.dataset_metadata(path)?;
            backend.check_appendable(path, &ds, a.data(), &inner_shape, n_rows)?;
            items.push(AppendItem {
                path: path.to_owned(),
                data: a.data().clone(),
                inner_shape,
                n_rows,
            });
            Ok(())
        }
        (Lh5Object::VectorOfVectors(v), dt) if v.datatype() == *dt => {
            plan_append(
                backend,
                &join_path(path, "flattened_data"),
                v.flattened_data(),
                items,
            )?;
            let cl_path = join_path(path, "cumulative_length");
            let cl_meta = backend.dataset_metadata(&cl_path)?;
            let n = cl_meta.rows();
            let base = if n == 0 {
                0
            } else {
                backend
                    .read_rows(&cl_path, &cl_meta, n - 1..n)?
                    .to_u64_vec()?
                    .first()
                    .copied()
                    .unwrap_or(0)
            };
            let data = ArrayData::from(
                v.cumulative_length()
                    .iter()
                    .map(|c| c + base)
                    .collect::<Vec<u64>>(),
            );
            let n_rows = v.len() as u64;
            backend.check_appendable(&cl_path, &cl_meta, &data, &[], n_rows)?;
            items.push(AppendItem {
                path: cl_path,
                data,
                inner_shape: Vec::new(),
                n_rows,
            });
            Ok(())
        }
        (Lh5Object::EncodedArray(e), dt) if e.datatype() == *dt => {
            let stored_codec = meta.attributes().get(CODEC_ATTR).and_then(|c| c.as_str());
            if stored_codec != e.codec() {
                return Err(crate::Error::TypeMismatch(format!(
                    "cannot append waveforms encoded with {:?} to '{path}' encoded with {stored_codec:?}",
                    e.codec()
                )));
            }
            let size_path = join_path(path, "decoded_size");
            if let DecodedSize::Uniform(size) = e.decoded_size() {
                let (stored, _) = backend.read_dataset(&size_path, None)?;
                if stored.to_u64_vec()? != size.value().to_data().to_u64_vec()? {
                    return Err(crate::Error::append_inconsistent(
                        path,
                        format!(
                            "stored waveforms have {:?} samples, new ones have {:?}",
                            stored.get(0),
                            size.value()
                        ),
                    ));
                }
            }
            plan_append(
                backend,
                &join_path(path, "encoded_data"),
                &e.encoded_data().clone().into(),
                items,
            )?;
            if let DecodedSize::PerRow(sizes) = e.decoded_size() {
                plan_append(backend, &size_path, &sizes.clone().into(), items)?;
            }
            Ok(())
        }
        (Lh5Object::Table(t), Datatype::Table(fields)) => {
            let inconsistent = |reason: String| crate::Error::append_inconsistent(path, reason);
            let mut expected: Vec<&str> = fields.iter().map(String::as_str).collect();
            let mut given: Vec<&str> = t.names().collect();
            expected.sort_unstable();
            given.sort_unstable();
            if expected != given {
                return Err(inconsistent(format!(
                    "table has fields {expected:?}, rows have fields {given:?}"
                )));
            }
            let mut existing_rows = None;
            for name in fields {
                let rows = node_rows(backend, &join_path(path, name))?;
                match existing_rows {
                    None => existing_rows = Some(rows),
                    Some(n) if n != rows => {
                        return Err(inconsistent(format!(
                            "stored column '{name}' has {rows:?} rows, expected {n:?}"
                        )));
                    }
                    Some(_) => {}
                }
            }
            for (name, field) in t.iter() {
                plan_append(backend, &join_path(path, name), field, items).map_err(|e| match e {
                    crate::Error::AppendInconsistent { .. } => e,
                    e => inconsistent(format!("column '{name}': {e}")),
                })?;
            }
            Ok(())
        }
        (Lh5Object::Struct(s), Datatype::Struct(fields)) => {
            if s.len() != fields.len() {
                return Err(crate::Error::TypeMismatch(format!(
                    "cannot append {} to '{path}' of type {existing}",
                    s.datatype()
                )));
            }
            for name in fields {
                plan_append(backend, &join_path(path, name), s.get(name)?, items)?;
            }
            Ok(())
        }
        (object, existing) => Err(crate::Error::TypeMismatch(format!(
            "cannot append {} to '{path}' of type {existing}",
            object.datatype()
        ))),
    }
}

fn append_object(backend: &Lh5Backend, path: &str, object: &Lh5Object) -> crate::Result<()> {
    let mut items = Vec::new();
    plan_append(backend, path, object, &mut items)?;

    let mut done: Vec<(&str, DatasetMetadata)> = Vec::with_capacity(items.len());
    for item in &items {
        match backend.append_dataset(&item.path, &item.data, &item.inner_shape, item.n_rows) {
            Ok(before) => done.push((item.path.as_str(), before)),
            Err(e) => {
                rollback(backend, &done);
                return Err(e);
            }
        }
    }
    Ok(())
}

/// Restore dataset metadata recorded before an append.
///
/// Rows written past the restored extent stay in the chunks but are not visible.
fn rollback(backend: &Lh5Backend, done: &[(&str, DatasetMetadata)]) {
    for (path, before) in done.iter().rev() {
        match backend.set_metadata(path, &before.clone().into()) {
            Ok(()) => warn!("rolled back '{path}' to {} rows", before.rows()),
            Err(e) => warn!("could not roll back '{path}': {e}"),
        }
    }
}

fn append_columns(
    backend: &Lh5Backend,
    path: &str,
    object: &Lh5Object,
    options: &DatasetOptions,
) -> crate::Result<()> {
    let Lh5Object::Table(table) = object else {
        return Err(crate::Error::TypeMismatch(format!(
            "only tables can be added as columns, got {}",
            object.type_name()
        )));
    };
    let mut meta = backend.node_metadata(path)?;
    if meta.is_incomplete() {
        return Err(crate::Error::Incomplete(path.to_owned()));
    }
    let Datatype::Table(mut fields) = node_datatype(path, &meta)? else {
        return Err(crate::Error::TypeMismatch(format!("'{path}' is not a table")));
    };
    if let Some(first) = fields.first() {
        let rows = node_rows(backend, &join_path(path, first))?;
        if rows != Some(table.len() as u64) {
            return Err(crate::Error::append_inconsistent(
                path,
                format!("table has {rows:?} rows, new columns have {}", table.len()),
            ));
        }
    }
    if let Some(name) = table.names().find(|n| fields.iter().any(|f| f == n)) {
        return Err(crate::Error::PathExists(join_path(path, name)));
    }
    for (name, column) in table.iter() {
        validate_object(&join_path(path, name), column, options)?;
    }

    let original = meta.clone();
    let existing = fields.len();
    meta.set_incomplete(true);
    backend.set_metadata(path, &meta)?;
    for (name, column) in table.iter() {
        if let Err(e) = write_new_object(backend, &join_path(path, name), column, options) {
            for added in &fields[existing..] {
                if let Err(erase_err) = backend.erase(&join_path(path, added)) {
                    warn!("could not remove column '{added}' of '{path}': {erase_err}");
                }
            }
            backend.set_metadata(path, &original)?;
            return Err(e);
        }
        fields.push(name.to_owned());
    }
    meta.attributes_mut()
        .insert(DATATYPE_ATTR.into(), Datatype::Table(fields).to_string().into());
    meta.set_incomplete(false);
    backend.set_metadata(path, &meta)
}

impl Lh5File {
    /// Write `object` as `name` inside `options.group`.
    pub fn write(
        &mut self,
        object: &Lh5Object,
        name: &str,
        options: &WriteOptions,
    ) -> crate::Result<()> {
        self.check_writable()?;
        let name = normalize_path(name)?;
        if name.is_empty() {
            return Err(crate::Error::InvalidName(
                "objects cannot be written to the root".into(),
            ));
        }
        let path = join_path(&normalize_path(&options.group)?, &name);
        let backend = self.backend();
        let dataset_options = options.dataset_options();
        backend.ensure_parents(&path)?;

        if !backend.exists(&path)? {
            info!("writing '{path}'");
            validate_object(&path, object, &dataset_options)?;
            return write_new_object(backend, &path, object, &dataset_options);
        }
        match options.mode {
            WriteMode::WriteSafe => Err(crate::Error::PathExists(path)),
            WriteMode::Overwrite => {
                info!("overwriting '{path}'");
                validate_object(&path, object, &dataset_options)?;
                backend.erase(&path)?;
                write_new_object(backend, &path, object, &dataset_options)
            }
            WriteMode::Append => {
                info!("appending to '{path}'");
                append_object(backend, &path, object)
            }
            WriteMode::AppendColumn => {
                info!("adding columns to '{path}'");
                append_columns(backend, &path, object, &dataset_options)
            }
        }
    }

    /// Replace the user attributes of an existing object.
    pub fn write_attrs(&mut self, path: &str, attrs: Attributes) -> crate::Result<()> {
        self.check_writable()?;
        let path = normalize_path(path)?;
        check_user_attributes(&path, &attrs)?;
        let backend = self.backend();
        let mut meta = backend.node_metadata(&path)?;
        let datatype = meta.attributes().get(DATATYPE_ATTR).cloned();
        *meta.attributes_mut() = attrs;
        if let Some(dt) = datatype {
            meta.attributes_mut().insert(DATATYPE_ATTR.into(), dt);
        }
        backend.set_metadata(&path, &meta)
    }

    /// Delete the object at `path`.
    pub fn delete(&mut self, path: &str) -> crate::Result<()> {
        self.check_writable()?;
        let path = normalize_path(path)?;
        if !self.backend().exists(&path)? {
            return Err(crate::Error::NotFound(path));
        }
        self.backend().erase(&path)
    }
}
