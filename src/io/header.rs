use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Byte order of a binary header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Endian {
    /// Big endian.
    Msb,
    /// Little endian.
    Lsb,
}

impl Endian {
    /// Byte order of the running machine.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endian::Msb
        } else {
            Endian::Lsb
        }
    }
}

/// Bounds-checked field access into a fixed-size header block.
///
/// Out-of-range reads return zero / empty values instead of panicking; callers check the block
/// length up front and treat short files as open errors.
pub(crate) struct HeaderReader<'a> {
    buf: &'a [u8],
    endian: Endian,
}

impl<'a> HeaderReader<'a> {
    pub(crate) fn new(buf: &'a [u8], endian: Endian) -> Self {
        Self { buf, endian }
    }

    fn slice(&self, off: usize, len: usize) -> Option<&'a [u8]> {
        self.buf.get(off..off.checked_add(len)?)
    }

    pub(crate) fn u8_at(&self, off: usize) -> u8 {
        self.buf.get(off).copied().unwrap_or(0)
    }

    pub(crate) fn u16_at(&self, off: usize) -> u16 {
        self.slice(off, 2).map_or(0, |b| match self.endian {
            Endian::Msb => BigEndian::read_u16(b),
            Endian::Lsb => LittleEndian::read_u16(b),
        })
    }

    pub(crate) fn u32_at(&self, off: usize) -> u32 {
        self.slice(off, 4).map_or(0, |b| match self.endian {
            Endian::Msb => BigEndian::read_u32(b),
            Endian::Lsb => LittleEndian::read_u32(b),
        })
    }

    pub(crate) fn f32_at(&self, off: usize) -> f32 {
        f32::from_bits(self.u32_at(off))
    }

    /// NUL-terminated string field; `None` when empty or unset (0xFF fill).
    pub(crate) fn str_at(&self, off: usize, len: usize) -> Option<String> {
        let raw = self.slice(off, len)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let raw = &raw[..end];
        if raw.is_empty() || raw.iter().all(|&b| b == 0xff) {
            return None;
        }
        let s = String::from_utf8_lossy(raw).trim().to_string();
        (!s.is_empty()).then_some(s)
    }
}

/// Fixed-size header block under construction, pre-filled with the "unset" pattern.
pub(crate) struct HeaderWriter {
    buf: Vec<u8>,
    endian: Endian,
}

impl HeaderWriter {
    /// `len` bytes of `fill`.
    pub(crate) fn new(len: usize, fill: u8, endian: Endian) -> Self {
        Self {
            buf: vec![fill; len],
            endian,
        }
    }

    pub(crate) fn put_u8(&mut self, off: usize, v: u8) {
        self.buf[off] = v;
    }

    pub(crate) fn put_u16(&mut self, off: usize, v: u16) {
        let b = &mut self.buf[off..off + 2];
        match self.endian {
            Endian::Msb => BigEndian::write_u16(b, v),
            Endian::Lsb => LittleEndian::write_u16(b, v),
        }
    }

    pub(crate) fn put_u32(&mut self, off: usize, v: u32) {
        let b = &mut self.buf[off..off + 4];
        match self.endian {
            Endian::Msb => BigEndian::write_u32(b, v),
            Endian::Lsb => LittleEndian::write_u32(b, v),
        }
    }

    pub(crate) fn put_i32(&mut self, off: usize, v: i32) {
        self.put_u32(off, v as u32);
    }

    pub(crate) fn put_f32(&mut self, off: usize, v: f32) {
        self.put_u32(off, v.to_bits());
    }

    /// Zero-padded string field; a value filling the whole field has no terminator.
    pub(crate) fn put_str(&mut self, off: usize, len: usize, s: &str) {
        let field = &mut self.buf[off..off + len];
        field.fill(0);
        let bytes = s.as_bytes();
        let n = bytes.len().min(len);
        field[..n].copy_from_slice(&bytes[..n]);
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// DPX/Cineon "undefined" marker for 32-bit fields.
pub(crate) fn is_set_u32(v: u32) -> bool {
    v != u32::MAX
}

/// Finite and not the all-ones "undefined" pattern.
pub(crate) fn is_set_f32(v: f32) -> bool {
    v.to_bits() != u32::MAX && v.is_finite()
}
