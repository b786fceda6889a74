use std::borrow::Cow;
use std::num::NonZeroU64;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use zarrs::array::CodecChain;
use zarrs::array::codec::BytesCodec;
use zarrs::array::codec::bytes_to_bytes::gzip::GzipCodec;
use zarrs::array::codec::{Bz2CompressionLevel, bytes_to_bytes::bz2::Bz2Codec};
use zarrs::metadata::v3::MetadataV3;
use zarrs::plugin::{ExtensionAliasesV3, PluginCreateError};
use zarrs_codec::{
    ArrayBytes, ArrayBytesRaw, ArrayCodecTraits, ArrayToBytesCodecTraits, BytesRepresentation,
    BytesToBytesCodecTraits, Codec, CodecError, CodecPluginV3, CodecTraits, CodecTraitsV3,
};

use crate::chunk::{ChunkHeader, ChunkMode};
use crate::metadata::Compression;

zarrs::plugin::impl_extension_aliases!(ChunkCodec, v3: "lh5.chunk", ["lh5.chunk"]);
inventory::submit! {
    CodecPluginV3::new::<ChunkCodec>()
}

/// Array-to-bytes codec for LH5 chunk blobs: a [`ChunkHeader`] followed by
/// the big-endian element payload, optionally compressed.
///
/// Stored chunks may hold fewer or more rows than the chunk grid expects,
/// because edge chunks grow on append and rows past the recorded extent are
/// left behind by interrupted appends. Decoding pads missing rows with zeros
/// and drops rows beyond the expected shape.
#[derive(Debug, Clone)]
pub struct ChunkCodec {
    configuration: ChunkCodecConfiguration,
    /// Always contains a big-endian bytes codec.
    /// May contain a single bytes-to-bytes codec for the compression.
    codecs: CodecChain,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Copy)]
#[serde(rename_all = "camelCase")]
pub struct ChunkCodecConfiguration {
    pub compression: Compression,
    /// Upper bound on the rows held by one chunk blob.
    pub chunk_rows: u64,
}

impl ChunkCodec {
    pub fn new(compression: Compression, chunk_rows: u64) -> crate::Result<Self> {
        if chunk_rows == 0 {
            return Err(crate::Error::general("chunk size must be positive"));
        }
        Ok(Self {
            codecs: compression_to_chain(&compression)?,
            configuration: ChunkCodecConfiguration {
                compression,
                chunk_rows,
            },
        })
    }

    pub fn new_with_configuration(
        configuration: &ChunkCodecConfiguration,
    ) -> Result<Self, PluginCreateError> {
        Self::new(configuration.compression, configuration.chunk_rows)
            .map_err(|e| PluginCreateError::Other(e.to_string()))
    }

    pub fn compression(&self) -> Compression {
        self.configuration.compression
    }

    /// Codec metadata as it appears in an array's codec list.
    pub(crate) fn to_metadata(&self) -> crate::Result<MetadataV3> {
        let name = ChunkCodec::aliases_v3().default_name.clone().to_string();
        Ok(MetadataV3::new_with_serializable_configuration(
            name,
            &self.configuration,
        )?)
    }
}

fn compression_to_b2b(
    compression: &Compression,
) -> crate::Result<Option<Arc<dyn BytesToBytesCodecTraits>>> {
    match compression {
        Compression::Raw => Ok(None),
        Compression::Bzip2 { block_size } => Ok(Some(Arc::new(Bz2Codec::new(
            Bz2CompressionLevel::new(u32::from(*block_size))
                .map_err(|n| crate::Error::general(format!("invalid bz2 block size {n}")))?,
        )))),
        Compression::Gzip { level } => {
            let level = match level {
                -1 => 6,
                n @ 0..=9 => *n as u32,
                n => {
                    return Err(crate::Error::general(format!(
                        "invalid gzip compression level {n}"
                    )));
                }
            };
            Ok(Some(Arc::new(
                GzipCodec::new(level).map_err(crate::Error::wrap)?,
            )))
        }
    }
}

fn compression_to_chain(compression: &Compression) -> crate::Result<CodecChain> {
    let compressor = compression_to_b2b(compression)?;
    Ok(CodecChain::new(
        vec![],
        Arc::new(BytesCodec::big()),
        compressor.into_iter().collect(),
    ))
}

fn codec_error(message: impl Into<String>) -> CodecError {
    CodecError::Other(message.into())
}

impl CodecTraitsV3 for ChunkCodec {
    fn create(metadata: &MetadataV3) -> Result<Codec, PluginCreateError>
    where
        Self: Sized,
    {
        let configuration = metadata.to_typed_configuration()?;
        let codec = Arc::new(ChunkCodec::new_with_configuration(&configuration)?);
        Ok(Codec::ArrayToBytes(codec))
    }
}

impl CodecTraits for ChunkCodec {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn configuration(
        &self,
        _version: zarrs::plugin::ZarrVersion,
        _options: &zarrs_codec::CodecMetadataOptions,
    ) -> Option<zarrs::metadata::Configuration> {
        match serde_json::to_value(self.configuration) {
            Ok(serde_json::Value::Object(map)) => Some(map.into()),
            _ => None,
        }
    }

    fn partial_decoder_capability(&self) -> zarrs_codec::PartialDecoderCapability {
        zarrs_codec::PartialDecoderCapability {
            partial_read: false,
            partial_decode: false,
        }
    }

    fn partial_encoder_capability(&self) -> zarrs_codec::PartialEncoderCapability {
        zarrs_codec::PartialEncoderCapability {
            partial_encode: false,
        }
    }
}

impl ArrayCodecTraits for ChunkCodec {
    fn recommended_concurrency(
        &self,
        _shape: &[NonZeroU64],
        _data_type: &zarrs::array::DataType,
    ) -> Result<zarrs_codec::RecommendedConcurrency, CodecError> {
        Ok(zarrs_codec::RecommendedConcurrency::new_maximum(1))
    }
}

impl ArrayToBytesCodecTraits for ChunkCodec {
    fn into_dyn(self: Arc<Self>) -> Arc<dyn ArrayToBytesCodecTraits> {
        self
    }

    fn encoded_representation(
        &self,
        shape: &[NonZeroU64],
        data_type: &zarrs::array::DataType,
        _fill_value: &zarrs::array::FillValue,
    ) -> Result<BytesRepresentation, CodecError> {
        let header_len = ChunkHeader::encoded_len(shape.len()) as u64;
        let ret = match (data_type.fixed_size(), self.configuration.compression) {
            (Some(fs), Compression::Raw) => {
                let numel: u64 = shape.iter().map(|n| n.get()).product();
                BytesRepresentation::FixedSize(header_len + numel * fs as u64)
            }
            _ => BytesRepresentation::UnboundedSize,
        };
        Ok(ret)
    }

    fn encode<'a>(
        &self,
        bytes: ArrayBytes<'a>,
        shape: &[NonZeroU64],
        data_type: &zarrs::array::DataType,
        fill_value: &zarrs::array::FillValue,
        options: &zarrs_codec::CodecOptions,
    ) -> Result<ArrayBytesRaw<'a>, CodecError> {
        let header_shape = shape
            .iter()
            .map(|n| u32::try_from(n.get()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| codec_error(format!("chunk shape {shape:?} does not fit in u32")))?;
        let payload = self
            .codecs
            .encode(bytes, shape, data_type, fill_value, options)?;
        let mut out = ChunkHeader::new(header_shape).to_bytes();
        out.extend_from_slice(&payload);
        Ok(Cow::Owned(out))
    }

    fn decode<'a>(
        &self,
        bytes: ArrayBytesRaw<'a>,
        shape: &[NonZeroU64],
        data_type: &zarrs::array::DataType,
        fill_value: &zarrs::array::FillValue,
        options: &zarrs_codec::CodecOptions,
    ) -> Result<ArrayBytes<'a>, CodecError> {
        let header = ChunkHeader::from_bytes(&bytes)
            .map_err(|e| codec_error(format!("chunk header could not be parsed: {e}")))?;
        if !matches!(header.mode, ChunkMode::Default) {
            return Err(codec_error(format!(
                "unsupported chunk mode: {:?}",
                header.mode
            )));
        }

        let expected: Vec<u64> = shape.iter().map(|n| n.get()).collect();
        let stored: Vec<u64> = header.shape.iter().map(|&n| u64::from(n)).collect();
        if stored.len() != expected.len() || stored.get(1..) != expected.get(1..) {
            return Err(codec_error(format!(
                "chunk header has shape {stored:?}, expected {expected:?}"
            )));
        }
        if stored[0] > self.configuration.chunk_rows {
            return Err(codec_error(format!(
                "chunk header holds {} rows, more than the {} rows per chunk",
                stored[0], self.configuration.chunk_rows
            )));
        }
        let element_size = data_type
            .fixed_size()
            .ok_or_else(|| codec_error("variable-length data types are not supported"))?;
        let stored_len = header
            .num_elements()
            .and_then(|n| n.checked_mul(element_size))
            .ok_or_else(|| codec_error(format!("chunk shape {stored:?} is too large")))?;
        let expected_len = expected
            .iter()
            .try_fold(element_size, |acc, &n| acc.checked_mul(usize::try_from(n).ok()?))
            .ok_or_else(|| codec_error(format!("chunk shape {expected:?} is too large")))?;

        let stored_shape = stored
            .iter()
            .map(|&n| NonZeroU64::new(n))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| codec_error(format!("chunk header has an empty dimension {stored:?}")))?;
        let payload = &bytes[header.data_offset()..];
        let decoded = self.codecs.decode(
            Cow::Owned(payload.to_vec()),
            &stored_shape,
            data_type,
            fill_value,
            options,
        )?;
        let mut raw = decoded.into_fixed()?.into_owned();
        if raw.len() != stored_len {
            return Err(codec_error(format!(
                "chunk payload has {} bytes, expected {stored_len}",
                raw.len()
            )));
        }
        // every LH5 dataset uses a zero fill value
        raw.resize(expected_len, 0);
        Ok(ArrayBytes::new_flen(raw))
    }
}
