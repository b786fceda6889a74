//! Reader and writer for LEGEND Hierarchical Data (LH5) files.
//!
//! LH5 maps a typed tree of objects ([`Scalar`], [`Array`], [`VectorOfVectors`],
//! [`EncodedArray`], [`Struct`] and [`Table`]) onto a chunked, compressed key-value store
//! provided by [`zarrs::storage`].
//!
//! ```no_run
//! use lh5::{Array, FileMode, Lh5File, ReadOptions, Table, WriteOptions};
//!
//! # fn main() -> lh5::Result<()> {
//! let mut file = Lh5File::open("run0.lh5", FileMode::Create)?;
//! let table = Table::from_fields([
//!     ("energy", Array::new(vec![1.0f64, 2.0, 3.0])),
//!     ("flag", Array::new(vec![0u8, 1, 0])),
//! ])?;
//! file.write(&table.into(), "hit", &WriteOptions::default())?;
//!
//! let rows = file.read("hit", &ReadOptions::default().with_rows(1..3))?;
//! assert_eq!(rows.num_rows(), Some(2));
//! # Ok(())
//! # }
//! ```
pub mod chunk;
pub mod chunk_key_encoding;
pub mod codec;
pub mod datatype;
pub mod dtype;
mod error;
pub mod file;
pub mod inspect;
pub mod metadata;
pub mod object;
pub mod read;
pub mod storage;
pub mod truncate;
pub mod waveform;
pub mod write;

pub use zarrs;

pub use datatype::{Datatype, ElementKind, decode_datatype, encode_datatype};
pub use dtype::{ArrayData, DType, Element, ScalarValue};
pub use error::{Error, Result};
pub use file::{FileMode, Lh5File};
pub use inspect::{NodeSummary, inspect};
pub use metadata::{Attributes, Compression};
pub use object::{
    Array, ArrayLayout, DecodedSize, EncodedArray, Lh5Object, Scalar, Struct, Table,
    VectorOfVectors,
};
pub use read::{Lh5Iterator, ReadOptions};
pub use truncate::{TruncateOptions, truncate};
pub use waveform::WaveformCodec;
pub use write::{WriteMode, WriteOptions};
