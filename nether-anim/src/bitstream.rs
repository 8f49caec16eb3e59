//! LSB-first bit packing for the animated sample payload

use crate::error::{AnimError, Result};

/// Packs values of arbitrary width (1..=32 bits) into bytes, least significant bit first
#[derive(Debug, Default)]
pub struct BitWriter {
    data: Vec<u8>,
    current_byte: u8,
    bit_pos: u8,
    bits_written: u64,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the low `count` bits of `value`
    pub fn write_bits(&mut self, value: u32, count: u8) {
        debug_assert!(count <= 32);
        let mut value = value as u64;
        let mut remaining = count as u32;

        while remaining > 0 {
            let bits_left = 8 - self.bit_pos as u32;
            let bits_to_write = remaining.min(bits_left);

            let mask = (1u64 << bits_to_write) - 1;
            self.current_byte |= ((value & mask) as u8) << self.bit_pos;

            value >>= bits_to_write;
            remaining -= bits_to_write;
            self.bit_pos += bits_to_write as u8;

            if self.bit_pos >= 8 {
                self.data.push(self.current_byte);
                self.current_byte = 0;
                self.bit_pos = 0;
            }
        }
        self.bits_written += count as u64;
    }

    pub fn bits_written(&self) -> u64 {
        self.bits_written
    }

    /// Flush the partial byte and return the packed data
    pub fn finish(mut self) -> Vec<u8> {
        if self.bit_pos > 0 {
            self.data.push(self.current_byte);
        }
        self.data
    }
}

/// Reads values written by [`BitWriter`], starting at any bit offset
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_offset: u64,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::at(data, 0)
    }

    /// Reader positioned `bit_offset` bits into `data`
    pub fn at(data: &'a [u8], bit_offset: u64) -> Self {
        Self { data, bit_offset }
    }

    pub fn bit_offset(&self) -> u64 {
        self.bit_offset
    }

    /// Read `count` bits (at most 32)
    ///
    /// Running off the end of the payload is a [`AnimError::CorruptBuffer`].
    pub fn read_bits(&mut self, count: u8) -> Result<u32> {
        debug_assert!(count <= 32);
        let end = self.bit_offset + count as u64;
        if end > self.data.len() as u64 * 8 {
            return Err(AnimError::corrupt(format!(
                "payload truncated: need bit {} of {}",
                end,
                self.data.len() as u64 * 8
            )));
        }

        let mut result = 0u64;
        let mut bits_read = 0u32;
        let count = count as u32;

        while bits_read < count {
            let byte_pos = (self.bit_offset / 8) as usize;
            let bit_pos = (self.bit_offset % 8) as u32;
            let bits_left_in_byte = 8 - bit_pos;
            let bits_to_read = (count - bits_read).min(bits_left_in_byte);

            let mask = (1u32 << bits_to_read) - 1;
            let bits = (self.data[byte_pos] as u32 >> bit_pos) & mask;

            result |= (bits as u64) << bits_read;
            bits_read += bits_to_read;
            self.bit_offset += bits_to_read as u64;
        }

        Ok(result as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_reader_basic() {
        let data = [0b10101010, 0b11001100];
        let mut reader = BitReader::new(&data);

        assert_eq!(reader.read_bits(4).unwrap(), 0b1010);
        assert_eq!(reader.read_bits(4).unwrap(), 0b1010);
        assert_eq!(reader.read_bits(8).unwrap(), 0b11001100);
    }

    #[test]
    fn test_mixed_widths() {
        let values: [(u32, u8); 6] = [
            (5, 3),
            (0x1ffff, 17),
            (0, 1),
            (0xdead_beef, 32),
            (0x7fffff, 23),
            (1, 1),
        ];

        let mut writer = BitWriter::new();
        for (value, bits) in values {
            writer.write_bits(value, bits);
        }
        assert_eq!(writer.bits_written(), 77);
        let data = writer.finish();
        assert_eq!(data.len(), 10);

        let mut reader = BitReader::new(&data);
        for (value, bits) in values {
            assert_eq!(reader.read_bits(bits).unwrap(), value, "width {}", bits);
        }
    }

    #[test]
    fn test_random_access() {
        let mut writer = BitWriter::new();
        for i in 0..20u32 {
            writer.write_bits(i, 5);
        }
        let data = writer.finish();

        let mut reader = BitReader::at(&data, 13 * 5);
        assert_eq!(reader.read_bits(5).unwrap(), 13);
        assert_eq!(reader.bit_offset(), 70);
    }

    #[test]
    fn test_read_past_end_is_corrupt() {
        let data = [0xff];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(6).unwrap(), 0b111111);
        assert!(matches!(
            reader.read_bits(3),
            Err(AnimError::CorruptBuffer(_))
        ));
    }
}
