//! Bounds-checked primitives for framed binary decoding (C1). Stateless:
//! every read takes an explicit offset rather than advancing a cursor, so
//! a decoder can freely re-read or skip around a frame.

use canon_protocol::DecodeError;

pub struct FrameReader<'a> {
    data: &'a [u8],
}

impl<'a> FrameReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn check(&self, offset: usize, needed: usize) -> Result<(), DecodeError> {
        let end = offset
            .checked_add(needed)
            .filter(|&end| end <= self.data.len());
        if end.is_none() {
            return Err(DecodeError::FrameTruncated {
                offset,
                needed,
                len: self.data.len(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8, DecodeError> {
        self.check(offset, 1)?;
        Ok(self.data[offset])
    }

    pub fn read_u16_be(&self, offset: usize) -> Result<u16, DecodeError> {
        self.check(offset, 2)?;
        Ok(u16::from_be_bytes([self.data[offset], self.data[offset + 1]]))
    }

    pub fn read_u32_be(&self, offset: usize) -> Result<u32, DecodeError> {
        self.check(offset, 4)?;
        Ok(u32::from_be_bytes(self.data[offset..offset + 4].try_into().unwrap()))
    }

    pub fn read_bytes(&self, offset: usize, len: usize) -> Result<&'a [u8], DecodeError> {
        self.check(offset, len)?;
        Ok(&self.data[offset..offset + len])
    }

    /// Two bytes `a`, `b` read as `a + b/100` (spec §4.1) — used for the
    /// integer/fraction temperature and humidity fields in family-B frames.
    pub fn read_decimal_fixed2(&self, offset: usize) -> Result<f64, DecodeError> {
        self.check(offset, 2)?;
        let whole = f64::from(self.data[offset]);
        let frac = f64::from(self.data[offset + 1]);
        Ok(whole + frac / 100.0)
    }

    pub fn read_ipv4(&self, offset: usize) -> Result<String, DecodeError> {
        let b = self.read_bytes(offset, 4)?;
        Ok(format!("{}.{}.{}.{}", b[0], b[1], b[2], b[3]))
    }

    pub fn read_mac(&self, offset: usize) -> Result<String, DecodeError> {
        let b = self.read_bytes(offset, 6)?;
        Ok(b.iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<Vec<_>>()
            .join(":"))
    }

    /// Reads `len` bytes and renders them as a lowercase hex string, e.g.
    /// for the RFID tag id (`uRfid`, 4 bytes → 8 hex chars).
    pub fn read_hex(&self, offset: usize, len: usize) -> Result<String, DecodeError> {
        let b = self.read_bytes(offset, len)?;
        Ok(b.iter().map(|byte| format!("{byte:02x}")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_within_bounds() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        let r = FrameReader::new(&data);
        assert_eq!(r.read_u8(0).unwrap(), 0x01);
        assert_eq!(r.read_u16_be(0).unwrap(), 0x0102);
        assert_eq!(r.read_u32_be(0).unwrap(), 0x0102_0304);
        assert_eq!(r.read_bytes(2, 2).unwrap(), &[0x03, 0x04]);
    }

    #[test]
    fn truncation_is_reported_with_offset_and_needed() {
        let data = [0x01, 0x02];
        let r = FrameReader::new(&data);
        let err = r.read_u32_be(0).unwrap_err();
        match err {
            DecodeError::FrameTruncated { offset, needed, len } => {
                assert_eq!(offset, 0);
                assert_eq!(needed, 4);
                assert_eq!(len, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn decimal_fixed2_combines_whole_and_fraction() {
        let data = [0x1B, 0x29]; // 27.41
        let r = FrameReader::new(&data);
        assert!((r.read_decimal_fixed2(0).unwrap() - 27.41).abs() < 1e-9);
    }

    #[test]
    fn mac_and_ip_render_as_expected() {
        let data = [192, 168, 1, 1, 0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01];
        let r = FrameReader::new(&data);
        assert_eq!(r.read_ipv4(0).unwrap(), "192.168.1.1");
        assert_eq!(r.read_mac(4).unwrap(), "de:ad:be:ef:00:01");
    }

    #[test]
    fn offset_overflow_does_not_panic() {
        let data = [0x01];
        let r = FrameReader::new(&data);
        assert!(r.read_bytes(usize::MAX, 4).is_err());
    }
}
