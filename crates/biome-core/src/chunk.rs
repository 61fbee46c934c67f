use std::collections::BTreeMap;

use crate::parse::Block;

/// Separator between encoded records within one chunk.
pub const RECORD_SEPARATOR: char = '|';

/// Ordered mapping from 1-based chunk index to chunk text.
pub type ChunkSet = BTreeMap<u32, String>;

/// Encodes one block as a single-line transport record.
pub fn encode_block(block: &Block) -> String {
    format!("{},{},{};{}", block.x, block.y, block.z, block.block)
}

/// Packs blocks into size-bounded chunks, greedy and order-preserving.
///
/// The budget counts characters, not bytes, so multibyte block labels are not
/// penalized. A chunk never exceeds `max_chars` except when a single encoded
/// record is itself larger than the budget; such a record becomes a chunk of
/// its own rather than being split. Indices are contiguous from 1, and
/// rejoining the chunks with [`RECORD_SEPARATOR`] reproduces the full encoded
/// sequence.
pub fn chunk_blocks(blocks: &[Block], max_chars: usize) -> ChunkSet {
    let mut chunks = ChunkSet::new();
    let mut current = String::new();
    let mut current_chars = 0usize;
    let mut piece_index = 1u32;

    for block in blocks {
        let line = encode_block(block);
        let line_chars = line.chars().count();
        if current.is_empty() {
            current = line;
            current_chars = line_chars;
            continue;
        }

        // +1 for the separator.
        if current_chars + 1 + line_chars > max_chars {
            chunks.insert(piece_index, std::mem::replace(&mut current, line));
            current_chars = line_chars;
            piece_index += 1;
        } else {
            current.push(RECORD_SEPARATOR);
            current.push_str(&line);
            current_chars += 1 + line_chars;
        }
    }

    if !current.is_empty() {
        chunks.insert(piece_index, current);
    }

    chunks
}
