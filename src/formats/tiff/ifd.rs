use std::collections::BTreeMap;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::io::Endian;

pub(crate) const IMAGE_WIDTH: u16 = 256;
pub(crate) const IMAGE_LENGTH: u16 = 257;
pub(crate) const BITS_PER_SAMPLE: u16 = 258;
pub(crate) const COMPRESSION: u16 = 259;
pub(crate) const PHOTOMETRIC: u16 = 262;
pub(crate) const IMAGE_DESCRIPTION: u16 = 270;
pub(crate) const STRIP_OFFSETS: u16 = 273;
pub(crate) const ORIENTATION: u16 = 274;
pub(crate) const SAMPLES_PER_PIXEL: u16 = 277;
pub(crate) const ROWS_PER_STRIP: u16 = 278;
pub(crate) const STRIP_BYTE_COUNTS: u16 = 279;
pub(crate) const PLANAR_CONFIG: u16 = 284;
pub(crate) const SOFTWARE: u16 = 305;
pub(crate) const DATE_TIME: u16 = 306;
pub(crate) const ARTIST: u16 = 315;
pub(crate) const PREDICTOR: u16 = 317;
pub(crate) const COLOR_MAP: u16 = 320;
pub(crate) const EXTRA_SAMPLES: u16 = 338;
pub(crate) const SAMPLE_FORMAT: u16 = 339;
pub(crate) const COPYRIGHT: u16 = 33432;

/// Field types this codec reads and writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FieldType {
    Byte,
    Ascii,
    Short,
    Long,
    Rational,
}

impl FieldType {
    fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            1 => FieldType::Byte,
            2 => FieldType::Ascii,
            3 => FieldType::Short,
            4 => FieldType::Long,
            5 => FieldType::Rational,
            _ => return None,
        })
    }

    fn code(self) -> u16 {
        match self {
            FieldType::Byte => 1,
            FieldType::Ascii => 2,
            FieldType::Short => 3,
            FieldType::Long => 4,
            FieldType::Rational => 5,
        }
    }

    fn size(self) -> usize {
        match self {
            FieldType::Byte | FieldType::Ascii => 1,
            FieldType::Short => 2,
            FieldType::Long => 4,
            FieldType::Rational => 8,
        }
    }
}

#[derive(Clone, Debug)]
struct Entry {
    kind: FieldType,
    count: usize,
    /// Raw value bytes in file byte order.
    data: Vec<u8>,
}

/// First image file directory of a TIFF file.
#[derive(Clone, Debug)]
pub(crate) struct Ifd {
    endian: Endian,
    entries: BTreeMap<u16, Entry>,
}

impl Ifd {
    /// Parse the file header and first IFD. Unknown field types are skipped.
    pub(crate) fn parse(buf: &[u8]) -> Result<Self, String> {
        if buf.len() < 8 {
            return Err("truncated header".into());
        }
        let endian = match &buf[..2] {
            b"II" => Endian::Lsb,
            b"MM" => Endian::Msb,
            _ => return Err("bad byte order mark".into()),
        };
        let r = Reader { buf, endian };
        if r.u16(2)? != 42 {
            return Err("bad magic number".into());
        }
        let ifd = r.u32(4)? as usize;
        let n = r.u16(ifd)? as usize;
        let mut entries = BTreeMap::new();
        for i in 0..n {
            let at = ifd + 2 + i * 12;
            let tag = r.u16(at)?;
            let Some(kind) = FieldType::from_u16(r.u16(at + 2)?) else {
                continue;
            };
            let count = r.u32(at + 4)? as usize;
            let len = count
                .checked_mul(kind.size())
                .ok_or_else(|| format!("tag {tag}: bad count"))?;
            let data = if len <= 4 {
                r.bytes(at + 8, len)?
            } else {
                r.bytes(r.u32(at + 8)? as usize, len)?
            };
            entries.insert(
                tag,
                Entry {
                    kind,
                    count,
                    data: data.to_vec(),
                },
            );
        }
        Ok(Self { endian, entries })
    }

    pub(crate) fn endian(&self) -> Endian {
        self.endian
    }

    /// Integer values of a BYTE / SHORT / LONG field.
    pub(crate) fn values(&self, tag: u16) -> Option<Vec<u32>> {
        let e = self.entries.get(&tag)?;
        let out = match e.kind {
            FieldType::Byte => e.data.iter().map(|&b| u32::from(b)).collect(),
            FieldType::Short => e
                .data
                .chunks_exact(2)
                .map(|c| u32::from(read_u16(self.endian, c)))
                .collect(),
            FieldType::Long => e
                .data
                .chunks_exact(4)
                .map(|c| read_u32(self.endian, c))
                .collect(),
            _ => return None,
        };
        Some(out)
    }

    /// First integer value of a field.
    pub(crate) fn value(&self, tag: u16) -> Option<u32> {
        self.values(tag)?.first().copied()
    }

    /// First integer value, or `default` when the field is absent.
    pub(crate) fn value_or(&self, tag: u16, default: u32) -> u32 {
        self.value(tag).unwrap_or(default)
    }

    /// ASCII field without its terminator.
    pub(crate) fn ascii(&self, tag: u16) -> Option<String> {
        let e = self.entries.get(&tag)?;
        if e.kind != FieldType::Ascii || e.count == 0 {
            return None;
        }
        let end = e.data.iter().position(|&b| b == 0).unwrap_or(e.data.len());
        let s = String::from_utf8_lossy(&e.data[..end]).trim().to_string();
        (!s.is_empty()).then_some(s)
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    endian: Endian,
}

impl<'a> Reader<'a> {
    fn bytes(&self, off: usize, len: usize) -> Result<&'a [u8], String> {
        off.checked_add(len)
            .and_then(|end| self.buf.get(off..end))
            .ok_or_else(|| format!("directory data at {off} runs past end of file"))
    }

    fn u16(&self, off: usize) -> Result<u16, String> {
        Ok(read_u16(self.endian, self.bytes(off, 2)?))
    }

    fn u32(&self, off: usize) -> Result<u32, String> {
        Ok(read_u32(self.endian, self.bytes(off, 4)?))
    }
}

fn read_u16(endian: Endian, b: &[u8]) -> u16 {
    match endian {
        Endian::Msb => BigEndian::read_u16(b),
        Endian::Lsb => LittleEndian::read_u16(b),
    }
}

fn read_u32(endian: Endian, b: &[u8]) -> u32 {
    match endian {
        Endian::Msb => BigEndian::read_u32(b),
        Endian::Lsb => LittleEndian::read_u32(b),
    }
}

/// Little-endian IFD under construction.
#[derive(Default)]
pub(crate) struct IfdBuilder {
    entries: BTreeMap<u16, Entry>,
}

impl IfdBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn shorts(&mut self, tag: u16, values: &[u16]) {
        let mut data = vec![0u8; values.len() * 2];
        LittleEndian::write_u16_into(values, &mut data);
        self.entries.insert(
            tag,
            Entry {
                kind: FieldType::Short,
                count: values.len(),
                data,
            },
        );
    }

    pub(crate) fn short(&mut self, tag: u16, value: u16) {
        self.shorts(tag, &[value]);
    }

    pub(crate) fn longs(&mut self, tag: u16, values: &[u32]) {
        let mut data = vec![0u8; values.len() * 4];
        LittleEndian::write_u32_into(values, &mut data);
        self.entries.insert(
            tag,
            Entry {
                kind: FieldType::Long,
                count: values.len(),
                data,
            },
        );
    }

    pub(crate) fn long(&mut self, tag: u16, value: u32) {
        self.longs(tag, &[value]);
    }

    pub(crate) fn ascii(&mut self, tag: u16, value: &str) {
        let mut data = value.as_bytes().to_vec();
        data.push(0);
        self.entries.insert(
            tag,
            Entry {
                kind: FieldType::Ascii,
                count: data.len(),
                data,
            },
        );
    }

    /// Encode the directory placed at `offset`, followed by the values that do not fit inline.
    pub(crate) fn encode(&self, offset: u32) -> Vec<u8> {
        let n = self.entries.len();
        let dir_len = 2 + n * 12 + 4;
        let mut out = vec![0u8; dir_len];
        let mut extra: Vec<u8> = Vec::new();
        LittleEndian::write_u16(&mut out[0..2], n as u16);
        for (i, (tag, e)) in self.entries.iter().enumerate() {
            let at = 2 + i * 12;
            LittleEndian::write_u16(&mut out[at..at + 2], *tag);
            LittleEndian::write_u16(&mut out[at + 2..at + 4], e.kind.code());
            LittleEndian::write_u32(&mut out[at + 4..at + 8], e.count as u32);
            if e.data.len() <= 4 {
                out[at + 8..at + 8 + e.data.len()].copy_from_slice(&e.data);
            } else {
                let pos = offset as usize + dir_len + extra.len();
                LittleEndian::write_u32(&mut out[at + 8..at + 12], pos as u32);
                extra.extend_from_slice(&e.data);
                if extra.len() % 2 == 1 {
                    extra.push(0);
                }
            }
        }
        out.extend_from_slice(&extra);
        out
    }
}
