//! Block descriptors and the process-wide block palette.
#![forbid(unsafe_code)]

pub mod palette;
pub mod types;

pub use palette::{BlockPalette, base_key};
pub use types::{Block, BlockId};
