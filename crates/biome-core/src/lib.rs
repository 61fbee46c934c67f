pub mod chunk;
pub mod parse;

pub use chunk::{ChunkSet, RECORD_SEPARATOR, chunk_blocks, encode_block};
pub use parse::{Block, ParseError, parse_blocks};
