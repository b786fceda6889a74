/// Header preceding the payload of every chunk blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkHeader {
    pub(crate) mode: ChunkMode,
    /// Row-major: rows in this chunk first, then the inner dimensions.
    pub(crate) shape: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub(crate) enum ChunkMode {
    Default = 0,
}

fn read_u16(bytes: &[u8], offset: usize) -> crate::Result<u16> {
    bytes
        .get(offset..offset + 2)
        .and_then(|b| b.try_into().ok())
        .map(u16::from_be_bytes)
        .ok_or_else(|| crate::Error::general("truncated chunk header"))
}

fn read_u32(bytes: &[u8], offset: usize) -> crate::Result<u32> {
    bytes
        .get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_be_bytes)
        .ok_or_else(|| crate::Error::general("truncated chunk header"))
}

impl ChunkHeader {
    pub(crate) fn new(shape: Vec<u32>) -> Self {
        Self {
            mode: ChunkMode::Default,
            shape,
        }
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        let mut offset: usize = 0;

        let mode_num = read_u16(bytes, offset)?;
        offset += 2;
        let ndim = read_u16(bytes, offset)?;
        offset += 2;
        let mut shape = Vec::with_capacity(ndim as usize);
        for _ in 0..ndim {
            shape.push(read_u32(bytes, offset)?);
            offset += 4;
        }

        let mode = match mode_num {
            0 => ChunkMode::Default,
            n => return Err(crate::Error::general(format!("invalid chunk mode {n}"))),
        };
        Ok(ChunkHeader { mode, shape })
    }

    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data_offset());
        out.extend_from_slice(&(self.mode as u16).to_be_bytes());
        out.extend_from_slice(&(self.shape.len() as u16).to_be_bytes());
        for n in &self.shape {
            out.extend_from_slice(&n.to_be_bytes());
        }
        out
    }

    pub(crate) fn data_offset(&self) -> usize {
        Self::encoded_len(self.shape.len())
    }

    /// Length of a header describing `ndim` dimensions.
    pub(crate) fn encoded_len(ndim: usize) -> usize {
        size_of::<u16>()  // mode discriminator
            + size_of::<u16>() // ndim
            + ndim * size_of::<u32>() // shape
    }

    /// Number of elements described by the header, `None` on overflow.
    pub(crate) fn num_elements(&self) -> Option<usize> {
        self.shape
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(usize::try_from(n).ok()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = ChunkHeader::new(vec![3, 2]);
        let bytes = header.to_bytes();
        assert_eq!(bytes, vec![0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0, 2]);
        assert_eq!(header.data_offset(), bytes.len());
        assert_eq!(ChunkHeader::from_bytes(&bytes).unwrap(), header);
        assert_eq!(header.num_elements(), Some(6));
    }

    #[test]
    fn test_num_elements_overflow() {
        let header = ChunkHeader::new(vec![u32::MAX; 3]);
        assert_eq!(header.num_elements(), None);
        let bytes = header.to_bytes();
        assert_eq!(
            ChunkHeader::from_bytes(&bytes).unwrap().num_elements(),
            None
        );
    }

    #[test]
    fn test_truncated_header() {
        assert!(ChunkHeader::from_bytes(&[0, 0, 0, 2, 0, 0]).is_err());
        assert!(ChunkHeader::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_unknown_mode() {
        assert!(ChunkHeader::from_bytes(&[0, 1, 0, 0]).is_err());
    }
}
