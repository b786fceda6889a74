use std::{borrow::Cow, num::NonZeroU64};

use serde::{Deserialize, Serialize};
use zarrs::{
    array::{
        ArrayMetadataV3, FillValueMetadata,
        chunk_grid::{RegularBoundedChunkGrid, RegularBoundedChunkGridConfiguration},
        data_type,
    },
    metadata::v3::MetadataV3,
    plugin::{ExtensionAliasesV3, ExtensionName},
};

use crate::chunk_key_encoding::RowChunkKeyEncoding;
use crate::codec::ChunkCodec;
use crate::dtype::DType;

/// Key of the metadata document stored under every node prefix.
pub const METADATA_KEY: &str = "attributes.json";

/// Version of the on-disk layout, recorded at the hierarchy root.
pub const LH5_VERSION: &str = "1.0.0";

/// Attribute holding the datatype descriptor of an LH5 object.
pub const DATATYPE_ATTR: &str = "datatype";

/// Keys used by the backend itself, unavailable as user attributes.
pub const RESERVED_KEYS: &[&str] = &[
    "lh5",
    "dimensions",
    "chunkRows",
    "dataType",
    "compression",
    "resizable",
    "incomplete",
    DATATYPE_ATTR,
];

pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Representation of node metadata, either a dataset or a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeMetadata {
    Dataset(DatasetMetadata),
    Group(GroupMetadata),
}

impl From<DatasetMetadata> for NodeMetadata {
    fn from(value: DatasetMetadata) -> Self {
        Self::Dataset(value)
    }
}

impl From<GroupMetadata> for NodeMetadata {
    fn from(value: GroupMetadata) -> Self {
        Self::Group(value)
    }
}

impl NodeMetadata {
    pub fn attributes(&self) -> &Attributes {
        match self {
            NodeMetadata::Dataset(m) => &m.attributes,
            NodeMetadata::Group(m) => &m.attributes,
        }
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        match self {
            NodeMetadata::Dataset(m) => &mut m.attributes,
            NodeMetadata::Group(m) => &mut m.attributes,
        }
    }

    /// Extract the unstructured attributes map.
    pub fn into_attributes(self) -> Attributes {
        match self {
            NodeMetadata::Dataset(m) => m.attributes,
            NodeMetadata::Group(m) => m.attributes,
        }
    }

    /// Raw datatype descriptor, if this node is an LH5 object.
    pub fn datatype(&self) -> Option<&str> {
        self.attributes()
            .get(DATATYPE_ATTR)
            .and_then(serde_json::Value::as_str)
    }

    pub fn is_incomplete(&self) -> bool {
        match self {
            NodeMetadata::Dataset(m) => m.incomplete,
            NodeMetadata::Group(m) => m.incomplete,
        }
    }

    pub fn set_incomplete(&mut self, incomplete: bool) {
        match self {
            NodeMetadata::Dataset(m) => m.incomplete = incomplete,
            NodeMetadata::Group(m) => m.incomplete = incomplete,
        }
    }
}

/// Metadata of a group node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupMetadata {
    /// LH5 layout version; present if this is the hierarchy root.
    #[serde(rename = "lh5", default, skip_serializing_if = "Option::is_none")]
    pub lh5_version: Option<String>,
    /// Set while the children of this group are being written.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub incomplete: bool,
    /// Unstructured attributes.
    #[serde(flatten)]
    pub attributes: Attributes,
}

/// Metadata of a dataset node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetMetadata {
    /// Dataset shape; the first dimension counts rows.
    /// An empty shape is a single scalar element.
    pub dimensions: Vec<u64>,
    /// Rows per chunk. Chunks always span every inner dimension.
    pub chunk_rows: u64,
    /// Element type name.
    pub data_type: String,
    /// Chunk compression configuration.
    #[serde(default)]
    pub compression: Compression,
    /// Whether rows can be appended.
    #[serde(default)]
    pub resizable: bool,
    /// Set while chunks are being written.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub incomplete: bool,
    /// Unstructured attributes.
    #[serde(flatten)]
    pub attributes: Attributes,
}

impl DatasetMetadata {
    pub fn dtype(&self) -> crate::Result<DType> {
        DType::from_name(&self.data_type)
    }

    /// Number of rows; 1 for a scalar dataset.
    pub fn rows(&self) -> u64 {
        self.dimensions.first().copied().unwrap_or(1)
    }

    /// Shape of the dimensions after the first.
    pub fn inner_shape(&self) -> &[u64] {
        self.dimensions.get(1..).unwrap_or(&[])
    }

    /// Elements per row.
    pub fn row_stride(&self) -> u64 {
        self.inner_shape().iter().product()
    }

    /// Number of chunk blobs backing the current rows.
    pub fn num_chunks(&self) -> u64 {
        self.rows().div_ceil(self.chunk_rows.max(1))
    }
}

/// Chunk compression configuration.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq, Copy)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Compression {
    /// Uncompressed.
    #[default]
    Raw,
    Bzip2 {
        /// Default 9. Must be in the range 1..=9.
        #[serde(default = "default_bzip2_block_size")]
        block_size: u8,
    },
    Gzip {
        /// Default -1, meaning "implementation default" (usually 6).
        #[serde(default = "default_gzip_level")]
        level: i8,
    },
}

fn default_bzip2_block_size() -> u8 {
    9
}

fn default_gzip_level() -> i8 {
    -1
}

impl Compression {
    /// Gzip at the implementation default level.
    pub fn gzip() -> Self {
        Compression::Gzip {
            level: default_gzip_level(),
        }
    }
}

/// Regular bounded grid splitting rows only; inner dimensions span whole chunks.
fn convert_chunk_grid(meta: &DatasetMetadata) -> crate::Result<MetadataV3> {
    let chunk_shape = std::iter::once(meta.chunk_rows)
        .chain(meta.inner_shape().iter().map(|&n| n.max(1)))
        .map(|n| NonZeroU64::new(n).ok_or_else(|| crate::Error::general("zero chunk size")))
        .collect::<crate::Result<Vec<_>>>()?;
    let out = MetadataV3::new_with_serializable_configuration(
        RegularBoundedChunkGrid::aliases_v3()
            .default_name
            .clone()
            .to_string(),
        &RegularBoundedChunkGridConfiguration { chunk_shape },
    )?;
    Ok(out)
}

fn convert_data_type(dtype: DType) -> MetadataV3 {
    let data_type = match dtype {
        DType::Bool => data_type::bool(),
        DType::U8 => data_type::uint8(),
        DType::I8 => data_type::int8(),
        DType::U16 => data_type::uint16(),
        DType::I16 => data_type::int16(),
        DType::U32 => data_type::uint32(),
        DType::I32 => data_type::int32(),
        DType::U64 => data_type::uint64(),
        DType::I64 => data_type::int64(),
        DType::F32 => data_type::float32(),
        DType::F64 => data_type::float64(),
    };
    let data_type_name = data_type
        .name_v3()
        .map_or_else(String::new, Cow::into_owned);
    let data_type_configuration = data_type.configuration_v3();
    if data_type_configuration.is_empty() {
        MetadataV3::new(data_type_name)
    } else {
        MetadataV3::new_with_configuration(data_type_name, data_type_configuration)
    }
}

fn convert_fill_value(dtype: DType) -> FillValueMetadata {
    match dtype {
        DType::Bool => FillValueMetadata::Bool(false),
        _ => FillValueMetadata::Number(serde_json::Number::from(0)),
    }
}

/// In-memory zarr view of a dataset, used to address its chunks.
///
/// Scalars are a one-element array. The metadata is never stored.
impl TryFrom<&DatasetMetadata> for ArrayMetadataV3 {
    type Error = crate::Error;

    fn try_from(value: &DatasetMetadata) -> Result<Self, Self::Error> {
        let dtype = value.dtype()?;
        let shape = if value.dimensions.is_empty() {
            vec![1]
        } else {
            value.dimensions.clone()
        };
        let codec = ChunkCodec::new(value.compression, value.chunk_rows)?;
        let out = Self::new(
            shape,
            convert_chunk_grid(value)?,
            convert_data_type(dtype),
            convert_fill_value(dtype),
            vec![codec.to_metadata()?],
        )
        .with_chunk_key_encoding(RowChunkKeyEncoding::metadata());
        Ok(out)
    }
}

/// Reject user attributes that collide with backend keys.
pub(crate) fn check_user_attributes(path: &str, attrs: &Attributes) -> crate::Result<()> {
    match attrs.keys().find(|k| RESERVED_KEYS.contains(&k.as_str())) {
        Some(k) => Err(crate::Error::InvalidName(format!(
            "{path}: attribute '{k}' is reserved"
        ))),
        None => Ok(()),
    }
}
