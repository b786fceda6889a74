//! Lossless waveform compression.
//!
//! Waveforms are encoded one by one into byte vectors and stored as
//! [`EncodedArray`]s, with the codec named in the `codec` attribute.
//!
//! `uleb128_zigzag_diff` stores the first sample and then the difference of
//! every sample to the one before it. Each difference is zigzag-mapped to an
//! unsigned integer and written as an unsigned LEB128 varint, so the slowly
//! varying baselines of digitizer traces take a byte or two per sample.

use serde::{Deserialize, Serialize};

use crate::dtype::{ArrayData, DType};
use crate::metadata::Attributes;
use crate::object::{
    Array, ArrayLayout, CODEC_ATTR, DecodedSize, EncodedArray, Lh5Object, Scalar,
    VectorOfVectors,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaveformCodec {
    #[default]
    Uleb128ZigzagDiff,
}

impl WaveformCodec {
    /// Value of the `codec` attribute.
    pub fn name(self) -> &'static str {
        match self {
            WaveformCodec::Uleb128ZigzagDiff => "uleb128_zigzag_diff",
        }
    }

    pub fn from_name(name: &str) -> crate::Result<Self> {
        match name {
            "uleb128_zigzag_diff" => Ok(WaveformCodec::Uleb128ZigzagDiff),
            other => Err(crate::Error::Decode(format!("unsupported codec '{other}'"))),
        }
    }
}

pub fn zigzag_encode(x: i64) -> u64 {
    ((x << 1) ^ (x >> 63)) as u64
}

pub fn zigzag_decode(x: u64) -> i64 {
    ((x >> 1) as i64) ^ -((x & 1) as i64)
}

/// Append `value` to `out` as an unsigned LEB128 varint.
pub fn uleb128_encode(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Read one varint from the start of `bytes`; returns it with the number of bytes used.
pub fn uleb128_decode(bytes: &[u8]) -> crate::Result<(u64, usize)> {
    let mut value = 0u64;
    for (i, &byte) in bytes.iter().enumerate() {
        let shift = 7 * i as u32;
        let bits = u64::from(byte & 0x7f);
        if shift >= 64 || (shift > 0 && bits >> (64 - shift) != 0) {
            return Err(crate::Error::Decode("varint overflows 64 bits".into()));
        }
        value |= bits << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(crate::Error::Decode("truncated varint".into()))
}

/// Encode one waveform, appending its bytes to `out`.
pub fn encode_samples(samples: &[i64], out: &mut Vec<u8>) {
    let mut last = 0i64;
    for &x in samples {
        uleb128_encode(zigzag_encode(x.wrapping_sub(last)), out);
        last = x;
    }
}

/// Decode a waveform of exactly `n` samples, which must use every byte.
pub fn decode_samples(bytes: &[u8], n: usize) -> crate::Result<Vec<i64>> {
    let mut samples = Vec::with_capacity(n);
    let mut offset = 0;
    let mut last = 0i64;
    while samples.len() < n {
        let (value, used) = uleb128_decode(&bytes[offset..])?;
        offset += used;
        last = last.wrapping_add(zigzag_decode(value));
        samples.push(last);
    }
    if offset != bytes.len() {
        return Err(crate::Error::Decode(format!(
            "{} bytes left over after {n} samples",
            bytes.len() - offset
        )));
    }
    Ok(samples)
}

fn encode_rows(
    flat: &[i64],
    lengths: impl Iterator<Item = usize>,
) -> crate::Result<VectorOfVectors> {
    let mut bytes = Vec::new();
    let mut cumulative_length = Vec::new();
    let mut start = 0;
    for len in lengths {
        encode_samples(&flat[start..start + len], &mut bytes);
        start += len;
        cumulative_length.push(bytes.len() as u64);
    }
    VectorOfVectors::new(Array::new(bytes), cumulative_length)
}

fn size_u32(n: usize) -> crate::Result<u32> {
    u32::try_from(n).map_err(|_| crate::Error::ShapeMismatch(format!("waveform of {n} samples")))
}

/// Compress integer waveforms.
///
/// Two-dimensional arrays (one waveform per row) become encoded equal-sized
/// arrays; vectors of vectors become encoded vectors. The attributes of
/// `values` are kept and `codec` is added.
pub fn encode(values: &Lh5Object, codec: WaveformCodec) -> crate::Result<EncodedArray> {
    let mut attrs = values.attrs().clone();
    attrs.insert(CODEC_ATTR.into(), codec.name().into());
    let encoded = match values {
        Lh5Object::Array(a) if a.shape().len() == 2 => {
            let flat = a.data().to_i64_vec()?;
            let row_len = a.row_len();
            let encoded_data = encode_rows(&flat, std::iter::repeat_n(row_len, a.len()))?;
            EncodedArray::equal_sized(encoded_data, Scalar::new(size_u32(row_len)?))?
        }
        Lh5Object::VectorOfVectors(v) => {
            let Lh5Object::Array(inner) = v.flattened_data() else {
                return Err(crate::Error::TypeMismatch(
                    "only single-level vectors of vectors can be encoded".into(),
                ));
            };
            let flat = inner.data().to_i64_vec()?;
            let lengths: Vec<usize> = (0..v.len())
                .map(|i| v.flattened_range(&(i..i + 1)).len())
                .collect();
            let sizes = lengths
                .iter()
                .map(|&n| size_u32(n))
                .collect::<crate::Result<Vec<u32>>>()?;
            let encoded_data = encode_rows(&flat, lengths.into_iter())?;
            EncodedArray::vector(encoded_data, Array::new(sizes))?
        }
        other => {
            return Err(crate::Error::TypeMismatch(format!(
                "cannot encode {} as waveforms",
                other.datatype()
            )));
        }
    };
    Ok(encoded.with_attrs(attrs))
}

/// Decompress waveforms into samples of the integer type `dtype`.
///
/// Fails with [`crate::Error::Decode`] for unknown codecs or corrupt bytes,
/// and with [`crate::Error::ShapeMismatch`] if a sample does not fit `dtype`.
pub fn decode(encoded: &EncodedArray, dtype: DType) -> crate::Result<Lh5Object> {
    let codec = encoded
        .codec()
        .ok_or_else(|| crate::Error::Decode("no codec attribute".into()))?;
    match WaveformCodec::from_name(codec)? {
        WaveformCodec::Uleb128ZigzagDiff => {}
    }
    let bytes = encoded.encoded_data();
    let Some(flat_bytes) = bytes.to_vecs::<u8>() else {
        return Err(crate::Error::TypeMismatch("encoded data is not uint8".into()));
    };
    let sizes = encoded.decoded_sizes()?;
    let mut samples = Vec::new();
    for (row, &n) in flat_bytes.iter().zip(&sizes) {
        samples.extend(decode_samples(row, n as usize)?);
    }
    let data = ArrayData::from_i64(dtype, samples)?;

    let mut attrs: Attributes = encoded.attrs().clone();
    attrs.remove(CODEC_ATTR);
    let decoded: Lh5Object = match encoded.decoded_size() {
        DecodedSize::Uniform(_) => {
            let row_len = sizes.first().copied().unwrap_or(0) as usize;
            Array::with_layout(data, vec![encoded.len(), row_len], ArrayLayout::EqualSized)?
                .with_attrs(attrs)
                .into()
        }
        DecodedSize::PerRow(_) => VectorOfVectors::from_lengths(Array::new(data), &sizes)?
            .with_attrs(attrs)
            .into(),
    };
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zigzag() {
        for (x, z) in [(0i64, 0u64), (-1, 1), (1, 2), (-2, 3), (i64::MAX, u64::MAX - 1)] {
            assert_eq!(zigzag_encode(x), z);
            assert_eq!(zigzag_decode(z), x);
        }
        assert_eq!(zigzag_decode(u64::MAX), i64::MIN);
    }

    #[test]
    fn test_uleb128() {
        let mut out = Vec::new();
        uleb128_encode(624485, &mut out);
        assert_eq!(out, [0xe5, 0x8e, 0x26]);
        assert_eq!(uleb128_decode(&out).unwrap(), (624485, 3));

        out.clear();
        uleb128_encode(u64::MAX, &mut out);
        assert_eq!(out.len(), 10);
        assert_eq!(uleb128_decode(&out).unwrap(), (u64::MAX, 10));

        assert!(matches!(
            uleb128_decode(&[0x80, 0x80]),
            Err(crate::Error::Decode(_))
        ));
        let too_long = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x02];
        assert!(matches!(
            uleb128_decode(&too_long),
            Err(crate::Error::Decode(_))
        ));
    }

    #[test]
    fn test_diff_bytes() {
        let mut out = Vec::new();
        encode_samples(&[10, 12, 11, 11], &mut out);
        // 10 -> 20, +2 -> 4, -1 -> 1, 0 -> 0
        assert_eq!(out, [20, 4, 1, 0]);
        assert_eq!(decode_samples(&out, 4).unwrap(), vec![10, 12, 11, 11]);
        assert!(decode_samples(&out, 3).is_err());
        assert!(decode_samples(&out, 5).is_err());
    }

    #[test]
    fn test_equal_sized_waveforms() {
        let values = Array::equal_sized(vec![100u16, 101, 99, 100, 5000, 5002, 4990, 5001], 4)
            .unwrap()
            .with_units("ADC");
        let encoded = encode(&values.clone().into(), WaveformCodec::Uleb128ZigzagDiff).unwrap();
        assert_eq!(
            encoded.datatype().to_string(),
            "array_of_encoded_equalsized_arrays<1,1>{real}"
        );
        assert_eq!(encoded.codec(), Some("uleb128_zigzag_diff"));
        assert_eq!(encoded.decoded_sizes().unwrap(), vec![4, 4]);
        assert_eq!(
            decode(&encoded, DType::U16).unwrap(),
            Lh5Object::Array(values)
        );
        assert!(matches!(
            decode(&encoded, DType::U8),
            Err(crate::Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_ragged_waveforms() {
        let values = VectorOfVectors::from_vecs(vec![vec![-5i32, 3], vec![], vec![7, 7, 7]]);
        let encoded = encode(&values.clone().into(), WaveformCodec::Uleb128ZigzagDiff).unwrap();
        assert_eq!(encoded.decoded_sizes().unwrap(), vec![2, 0, 3]);
        assert_eq!(encoded.encoded_data().cumulative_length(), &[2, 2, 5]);
        assert_eq!(
            decode(&encoded, DType::I32).unwrap(),
            Lh5Object::VectorOfVectors(values)
        );
    }

    #[test]
    fn test_decode_rejects_unknown_codec() {
        let values = Array::equal_sized(vec![1i16, 2], 2).unwrap();
        let encoded = encode(&values.into(), WaveformCodec::Uleb128ZigzagDiff).unwrap();
        let mut attrs = encoded.attrs().clone();
        attrs.insert(CODEC_ATTR.into(), "radware_sigcompress".into());
        let radware = encoded.with_attrs(attrs);
        assert!(matches!(
            decode(&radware, DType::I16),
            Err(crate::Error::Decode(_))
        ));
        assert!(encode(&Array::new(vec![1.5f32]).into(), WaveformCodec::default()).is_err());
    }
}
