use std::fmt::Write;

use zarrs::{
    array::{
        ChunkKeyEncoding, ChunkKeyEncodingTraits,
        chunk_key_encoding::{self as cke, api::ChunkKeyEncodingPlugin},
    },
    metadata::v3::MetadataV3,
    plugin::{ExtensionAliasesV3, PluginConfigurationInvalidError},
};

/// Chunk keys made of the grid indices in reverse order, joined by `/`.
///
/// Only rows are split into chunks, so a dataset's keys look like `3` for
/// one dimension and `0/3` for two.
#[derive(Debug, Clone, Copy)]
pub struct RowChunkKeyEncoding;

zarrs::plugin::impl_extension_aliases!(RowChunkKeyEncoding, v3: "lh5.rows", ["lh5.rows"]);
inventory::submit! {
    ChunkKeyEncodingPlugin::new::<RowChunkKeyEncoding>()
}

impl RowChunkKeyEncoding {
    pub(crate) fn metadata() -> MetadataV3 {
        MetadataV3::new(
            RowChunkKeyEncoding::aliases_v3()
                .default_name
                .clone()
                .to_string(),
        )
    }
}

impl ChunkKeyEncodingTraits for RowChunkKeyEncoding {
    fn create(
        metadata: &MetadataV3,
    ) -> Result<cke::api::ChunkKeyEncoding, zarrs::plugin::PluginCreateError>
    where
        Self: Sized,
    {
        if metadata.name() != "lh5.rows" {
            return Err(zarrs::plugin::PluginCreateError::NameInvalid {
                name: metadata.name().into(),
            });
        }
        if !metadata.configuration_is_none_or_empty() {
            return Err(zarrs::plugin::PluginCreateError::ConfigurationInvalid(
                PluginConfigurationInvalidError::new(
                    "row chunk key encoding does not take a configuration".into(),
                ),
            ));
        }
        Ok(ChunkKeyEncoding::new(Self))
    }

    fn configuration(&self) -> zarrs::metadata::Configuration {
        Default::default()
    }

    fn encode(&self, chunk_grid_indices: &[u64]) -> zarrs::storage::StoreKey {
        let mut s = String::with_capacity(chunk_grid_indices.len() * 2);
        for (i, idx) in chunk_grid_indices.iter().rev().enumerate() {
            if i > 0 {
                s.push('/');
            }
            let _ = write!(s, "{idx}");
        }
        zarrs::storage::StoreKey::new(s).expect("chunk key should be valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        let enc = RowChunkKeyEncoding;
        assert_eq!(enc.encode(&[4]).as_str(), "4");
        assert_eq!(enc.encode(&[4, 0]).as_str(), "0/4");
        assert_eq!(enc.encode(&[12, 0, 0]).as_str(), "0/0/12");
    }

    #[test]
    fn test_create_from_metadata() {
        let meta = RowChunkKeyEncoding::metadata();
        assert!(RowChunkKeyEncoding::create(&meta).is_ok());
        assert!(RowChunkKeyEncoding::create(&MetadataV3::new("default".to_string())).is_err());
    }
}
