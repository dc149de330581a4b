// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Decoder for the guest's bounding-box result layout.
//!
//! ```text
//! header (12 bytes)              record (48 bytes, stride fixed for both variants)
//! +0  u32  record count          +0   i32 left      +16 u32 word ptr   +32 i32 block
//! +4  u64  record array ptr      +4   i32 top       +20 (padding)      +36 i32 paragraph
//!                                +8   i32 right     +24 f64 confidence +40 i32 line
//!                                +12  i32 bottom                       +44 i32 word
//! ```
//!
//! Bytes 32..48 are only meaningful in the verbose variant. Decoding never
//! writes to guest memory; releasing the header and array is the caller's job.

use crate::errors::{BridgeError, BridgeResult};
use crate::guest::memory::{read_f64, read_i32, read_string, read_u32, read_u64};
use crate::guest::GuestPtr;
use serde::Serialize;

pub const HEADER_SIZE: usize = 12;
pub const RECORD_STRIDE: usize = 48;

/// Pixel rectangle, right and bottom exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// A recognized region with its text and confidence (0-100).
///
/// The block, paragraph, line and word indices are zero unless the result
/// came from the verbose variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundingBox {
    pub rect: Rect,
    pub word: String,
    pub confidence: f64,
    pub block_num: i32,
    pub par_num: i32,
    pub line_num: i32,
    pub word_num: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detail {
    Basic,
    Verbose,
}

/// The fixed-size result header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    pub count: u32,
    pub records: GuestPtr,
}

impl BoxHeader {
    pub fn read(memory: &[u8], header: GuestPtr) -> BridgeResult<Self> {
        if (header.offset() as usize).saturating_add(HEADER_SIZE) > memory.len() {
            return Err(BridgeError::MemoryFault(format!(
                "bounding box header 0x{:08x} is outside guest memory",
                header.offset()
            )));
        }
        let count = read_u32(memory, header, 0)?;
        let records = GuestPtr::from_raw(read_u64(memory, header, 4)?);
        Ok(Self { count, records })
    }
}

/// Decode every record described by `header`.
pub fn decode_records(memory: &[u8], header: &BoxHeader, detail: Detail) -> BridgeResult<Vec<BoundingBox>> {
    let count = header.count as usize;
    if count == 0 {
        return Ok(Vec::new());
    }
    // Reject impossible counts before allocating for them
    let table_len = count
        .checked_mul(RECORD_STRIDE)
        .filter(|&len| len <= memory.len())
        .ok_or_else(|| {
            BridgeError::MemoryFault(format!(
                "bounding box count {} exceeds guest memory",
                count
            ))
        })?;
    if header.records.is_null() {
        return Err(BridgeError::MemoryFault(format!(
            "bounding box header reports {} records but no array ({} bytes)",
            count, table_len
        )));
    }

    (0..count)
        .map(|index| decode_record(memory, header.records, index * RECORD_STRIDE, detail))
        .collect()
}

fn decode_record(memory: &[u8], base: GuestPtr, at: usize, detail: Detail) -> BridgeResult<BoundingBox> {
    let rect = Rect {
        left: read_i32(memory, base, at)?,
        top: read_i32(memory, base, at + 4)?,
        right: read_i32(memory, base, at + 8)?,
        bottom: read_i32(memory, base, at + 12)?,
    };
    let word = read_string(memory, GuestPtr::from_raw(u64::from(read_u32(memory, base, at + 16)?)))?;
    let confidence = read_f64(memory, base, at + 24)?;

    let (block_num, par_num, line_num, word_num) = match detail {
        Detail::Basic => (0, 0, 0, 0),
        Detail::Verbose => (
            read_i32(memory, base, at + 32)?,
            read_i32(memory, base, at + 36)?,
            read_i32(memory, base, at + 40)?,
            read_i32(memory, base, at + 44)?,
        ),
    };

    Ok(BoundingBox {
        rect,
        word,
        confidence,
        block_num,
        par_num,
        line_num,
        word_num,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(memory: &mut [u8], at: usize, bytes: &[u8]) {
        memory[at..at + bytes.len()].copy_from_slice(bytes);
    }

    /// Header at 0, records at 64, words at 512.
    fn fixture() -> Vec<u8> {
        let mut memory = vec![0u8; 1024];
        put(&mut memory, 0, &2u32.to_le_bytes());
        put(&mut memory, 4, &64u64.to_le_bytes());

        put(&mut memory, 512, b"Hello\0");
        put(&mut memory, 520, b"World\0");

        let records: [([i32; 4], u32, f64, [i32; 4]); 2] = [
            ([36, 92, 140, 130], 512, 96.25, [1, 1, 1, 1]),
            ([150, 92, 260, 131], 520, 88.5, [1, 1, 1, 2]),
        ];
        for (i, (rect, word, confidence, indices)) in records.iter().enumerate() {
            let at = 64 + i * RECORD_STRIDE;
            for (k, value) in rect.iter().enumerate() {
                put(&mut memory, at + 4 * k, &value.to_le_bytes());
            }
            put(&mut memory, at + 16, &word.to_le_bytes());
            // Padding bytes must be ignored
            put(&mut memory, at + 20, &[0xAB; 4]);
            put(&mut memory, at + 24, &confidence.to_le_bytes());
            for (k, value) in indices.iter().enumerate() {
                put(&mut memory, at + 32 + 4 * k, &value.to_le_bytes());
            }
        }
        memory
    }

    #[test]
    fn test_header_layout() {
        let memory = fixture();
        let header = BoxHeader::read(&memory, GuestPtr::NULL).unwrap();
        assert_eq!(header.count, 2);
        assert_eq!(header.records, GuestPtr::from_raw(64));
    }

    #[test]
    fn test_basic_records_ignore_index_fields() {
        let memory = fixture();
        let header = BoxHeader::read(&memory, GuestPtr::NULL).unwrap();
        let boxes = decode_records(&memory, &header, Detail::Basic).unwrap();

        assert_eq!(boxes.len(), 2);
        assert_eq!(
            boxes[0].rect,
            Rect {
                left: 36,
                top: 92,
                right: 140,
                bottom: 130
            }
        );
        assert_eq!(boxes[0].word, "Hello");
        assert_eq!(boxes[0].confidence, 96.25);
        assert_eq!(boxes[0].word_num, 0);
        assert_eq!(boxes[1].word, "World");
        assert_eq!(boxes[1].rect.width(), 110);
        assert_eq!(boxes[1].rect.height(), 39);
    }

    #[test]
    fn test_verbose_records_carry_indices() {
        let memory = fixture();
        let header = BoxHeader::read(&memory, GuestPtr::NULL).unwrap();
        let boxes = decode_records(&memory, &header, Detail::Verbose).unwrap();

        assert_eq!(
            (boxes[1].block_num, boxes[1].par_num, boxes[1].line_num, boxes[1].word_num),
            (1, 1, 1, 2)
        );
        assert_eq!(boxes[1].confidence, 88.5);
    }

    #[test]
    fn test_empty_result() {
        let mut memory = vec![0u8; 64];
        put(&mut memory, 4, &u64::MAX.to_le_bytes());
        let header = BoxHeader::read(&memory, GuestPtr::NULL).unwrap();
        assert!(decode_records(&memory, &header, Detail::Verbose).unwrap().is_empty());
    }

    #[test]
    fn test_null_word_pointer_decodes_as_empty() {
        let mut memory = fixture();
        put(&mut memory, 64 + 16, &0xffff_ffffu32.to_le_bytes());
        let header = BoxHeader::read(&memory, GuestPtr::NULL).unwrap();
        let boxes = decode_records(&memory, &header, Detail::Basic).unwrap();
        assert_eq!(boxes[0].word, "");
    }

    #[test]
    fn test_corrupt_count_is_rejected() {
        let mut memory = fixture();
        put(&mut memory, 0, &u32::MAX.to_le_bytes());
        let header = BoxHeader::read(&memory, GuestPtr::NULL).unwrap();
        let result = decode_records(&memory, &header, Detail::Basic);
        assert!(matches!(result, Err(BridgeError::MemoryFault(_))));
    }

    #[test]
    fn test_serializes_for_hosts() {
        let memory = fixture();
        let header = BoxHeader::read(&memory, GuestPtr::NULL).unwrap();
        let boxes = decode_records(&memory, &header, Detail::Basic).unwrap();
        let yaml = serde_yaml::to_string(&boxes[0]).unwrap();
        assert!(yaml.contains("word: Hello"));
        assert!(yaml.contains("left: 36"));
    }
}
