//! Adaptive Huffman coding for sector payloads.
//!
//! The stream starts with a one-byte table selector, then a bit stream
//! (least-significant bit first). Two pseudo-symbols extend the byte
//! alphabet: one terminates the stream, the other escapes into eight raw
//! bits that introduce a byte not yet present in the tree. Both sides
//! bump a symbol's weight after coding it and rebuild the tree, so the
//! encoder and decoder stay in lockstep.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::error::{Error, Result};

const SYMBOL_COUNT: usize = 258;
const END_OF_STREAM: u16 = 256;
const ESCAPE: u16 = 257;

struct Node {
    children: Option<(usize, usize)>,
    symbol: Option<u16>,
    parent: Option<(usize, u8)>,
}

struct Tree {
    weights: [u32; SYMBOL_COUNT],
    nodes: Vec<Node>,
    root: usize,
    leaf_of: [usize; SYMBOL_COUNT],
}

impl Tree {
    fn new() -> Self {
        let mut tree = Self {
            weights: [0; SYMBOL_COUNT],
            nodes: Vec::new(),
            root: 0,
            leaf_of: [usize::MAX; SYMBOL_COUNT],
        };
        tree.weights[END_OF_STREAM as usize] = 1;
        tree.weights[ESCAPE as usize] = 1;
        tree.rebuild();
        tree
    }

    fn contains(&self, symbol: u16) -> bool {
        self.weights[symbol as usize] > 0
    }

    fn bump(&mut self, symbol: u16) {
        self.weights[symbol as usize] += 1;
        self.rebuild();
    }

    /// Rebuild the code tree from the current weights.
    ///
    /// Ties break on node creation order (leaves enter in symbol order),
    /// which keeps the shape identical on both sides of the codec.
    fn rebuild(&mut self) {
        self.nodes.clear();
        let mut heap: BinaryHeap<Reverse<(u64, usize)>> = BinaryHeap::new();

        for symbol in 0..SYMBOL_COUNT {
            if self.weights[symbol] > 0 {
                let index = self.nodes.len();
                self.nodes.push(Node {
                    children: None,
                    symbol: Some(symbol as u16),
                    parent: None,
                });
                self.leaf_of[symbol] = index;
                heap.push(Reverse((u64::from(self.weights[symbol]), index)));
            }
        }

        while heap.len() > 1 {
            let Reverse((weight_a, a)) = heap.pop().unwrap();
            let Reverse((weight_b, b)) = heap.pop().unwrap();
            let index = self.nodes.len();
            self.nodes.push(Node {
                children: Some((a, b)),
                symbol: None,
                parent: None,
            });
            self.nodes[a].parent = Some((index, 0));
            self.nodes[b].parent = Some((index, 1));
            heap.push(Reverse((weight_a + weight_b, index)));
        }

        self.root = heap.pop().map(|Reverse((_, i))| i).unwrap_or(0);
    }

    fn write_code(&self, symbol: u16, writer: &mut BitWriter) {
        let mut bits = Vec::new();
        let mut index = self.leaf_of[symbol as usize];
        while let Some((parent, bit)) = self.nodes[index].parent {
            bits.push(bit);
            index = parent;
        }
        for &bit in bits.iter().rev() {
            writer.write_bit(bit);
        }
    }

    fn read_symbol(&self, reader: &mut BitReader<'_>) -> Result<u16> {
        let mut index = self.root;
        while let Some((left, right)) = self.nodes[index].children {
            index = if reader.read_bit()? == 0 { left } else { right };
        }
        self.nodes[index]
            .symbol
            .ok_or_else(|| Error::CorruptData("huffman tree walk ended off a leaf".into()))
    }
}

struct BitWriter {
    bytes: Vec<u8>,
    current: u8,
    used: u8,
}

impl BitWriter {
    fn new() -> Self {
        Self {
            bytes: Vec::new(),
            current: 0,
            used: 0,
        }
    }

    fn write_bit(&mut self, bit: u8) {
        self.current |= (bit & 1) << self.used;
        self.used += 1;
        if self.used == 8 {
            self.bytes.push(self.current);
            self.current = 0;
            self.used = 0;
        }
    }

    fn write_bits(&mut self, value: u16, count: u8) {
        for i in 0..count {
            self.write_bit(((value >> i) & 1) as u8);
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.used > 0 {
            self.bytes.push(self.current);
        }
        self.bytes
    }
}

struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    fn read_bit(&mut self) -> Result<u8> {
        let byte = self.position / 8;
        if byte >= self.data.len() {
            return Err(Error::CorruptData("huffman stream ended early".into()));
        }
        let bit = (self.data[byte] >> (self.position % 8)) & 1;
        self.position += 1;
        Ok(bit)
    }

    fn read_bits(&mut self, count: u8) -> Result<u16> {
        let mut value = 0u16;
        for i in 0..count {
            value |= u16::from(self.read_bit()?) << i;
        }
        Ok(value)
    }
}

/// Compress a buffer; `selector` becomes the leading table byte.
pub fn compress(data: &[u8], selector: u8) -> Result<Vec<u8>> {
    let mut tree = Tree::new();
    let mut writer = BitWriter::new();

    for &byte in data {
        let symbol = u16::from(byte);
        if tree.contains(symbol) {
            tree.write_code(symbol, &mut writer);
        } else {
            tree.write_code(ESCAPE, &mut writer);
            writer.write_bits(symbol, 8);
        }
        tree.bump(symbol);
    }
    tree.write_code(END_OF_STREAM, &mut writer);

    let mut output = vec![selector];
    output.extend_from_slice(&writer.finish());
    Ok(output)
}

/// Decompress a buffer produced by [`compress`].
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Err(Error::TruncatedData {
            expected: 1,
            actual: 0,
        });
    }

    let mut tree = Tree::new();
    let mut reader = BitReader::new(&data[1..]);
    let mut output = Vec::new();

    loop {
        let symbol = tree.read_symbol(&mut reader)?;
        match symbol {
            END_OF_STREAM => break,
            ESCAPE => {
                let byte = reader.read_bits(8)?;
                output.push(byte as u8);
                tree.bump(byte);
            }
            literal => {
                output.push(literal as u8);
                tree.bump(literal);
            }
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_text() {
        let data = b"so much wood as a woodchuck would, if a woodchuck could chuck wood";
        let compressed = compress(data, 0).unwrap();
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn test_round_trip_empty() {
        let compressed = compress(&[], 0).unwrap();
        assert_eq!(decompress(&compressed).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_round_trip_all_bytes() {
        let data: Vec<u8> = (0u8..=255).collect();
        let compressed = compress(&data, 7).unwrap();
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn test_repetitive_data_shrinks() {
        let data = vec![0x42u8; 4096];
        let compressed = compress(&data, 0).unwrap();
        assert!(compressed.len() < data.len() / 4);
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn test_truncated_stream_fails() {
        let data = b"truncate me truncate me truncate me";
        let mut compressed = compress(data, 0).unwrap();
        compressed.truncate(compressed.len() / 2);
        assert!(decompress(&compressed).is_err());
    }

    #[test]
    fn test_empty_input_fails() {
        assert!(decompress(&[]).is_err());
    }
}
