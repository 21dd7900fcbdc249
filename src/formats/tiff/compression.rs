use std::collections::HashMap;

/// Strip compression schemes this codec reads and writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiffCompression {
    #[default]
    None,
    PackBits,
    Lzw,
}

impl TiffCompression {
    pub(crate) fn from_tag(value: u32) -> Option<Self> {
        match value {
            1 => Some(TiffCompression::None),
            5 => Some(TiffCompression::Lzw),
            32773 => Some(TiffCompression::PackBits),
            _ => None,
        }
    }

    pub(crate) fn tag(self) -> u16 {
        match self {
            TiffCompression::None => 1,
            TiffCompression::Lzw => 5,
            TiffCompression::PackBits => 32773,
        }
    }

    /// Upper bound on decoded bytes per stored byte.
    pub(crate) fn max_expansion(self) -> usize {
        match self {
            TiffCompression::None => 1,
            TiffCompression::PackBits => 128,
            TiffCompression::Lzw => 4096,
        }
    }
}

/// Decode one strip; output is cut or rejected at `expected` bytes.
pub(crate) fn decompress(
    scheme: TiffCompression,
    data: &[u8],
    expected: usize,
) -> Result<Vec<u8>, String> {
    let out = match scheme {
        TiffCompression::None => data.to_vec(),
        TiffCompression::PackBits => unpack_bits(data, expected)?,
        TiffCompression::Lzw => lzw_decode(data, expected)?,
    };
    if out.len() < expected {
        return Err(format!(
            "strip decoded to {} bytes, expected {expected}",
            out.len()
        ));
    }
    Ok(out)
}

/// Encode one strip made of rows of `row_len` bytes.
pub(crate) fn compress(scheme: TiffCompression, data: &[u8], row_len: usize) -> Vec<u8> {
    match scheme {
        TiffCompression::None => data.to_vec(),
        TiffCompression::PackBits => data
            .chunks(row_len.max(1))
            .flat_map(pack_bits)
            .collect(),
        TiffCompression::Lzw => lzw_encode(data),
    }
}

fn unpack_bits(data: &[u8], expected: usize) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(expected);
    let mut i = 0;
    while i < data.len() && out.len() < expected {
        let n = data[i] as i8;
        i += 1;
        if n >= 0 {
            let count = n as usize + 1;
            let lit = data
                .get(i..i + count)
                .ok_or("PackBits literal runs past end of strip")?;
            out.extend_from_slice(lit);
            i += count;
        } else if n != -128 {
            let count = (-(n as i16)) as usize + 1;
            let v = *data.get(i).ok_or("PackBits run runs past end of strip")?;
            out.resize(out.len() + count, v);
            i += 1;
        }
    }
    out.truncate(expected);
    Ok(out)
}

fn pack_bits(row: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(row.len() + row.len() / 128 + 1);
    let mut i = 0;
    while i < row.len() {
        let mut run = 1;
        while i + run < row.len() && run < 128 && row[i + run] == row[i] {
            run += 1;
        }
        if run > 1 {
            out.push((1 - run as i16) as i8 as u8);
            out.push(row[i]);
            i += run;
            continue;
        }
        let start = i;
        i += 1;
        while i < row.len() && i - start < 128 && !(i + 1 < row.len() && row[i] == row[i + 1]) {
            i += 1;
        }
        out.push((i - start - 1) as u8);
        out.extend_from_slice(&row[start..i]);
    }
    out
}

const CLEAR: u16 = 256;
const EOI: u16 = 257;
const FIRST: u16 = 258;
const MAX_CODE_BITS: u32 = 12;

/// Code width after the table reaches `next` entries ("early change").
fn grow(width: &mut u32, next: usize) {
    if next + 1 >= (1 << *width) && *width < MAX_CODE_BITS {
        *width += 1;
    }
}

fn lzw_decode(data: &[u8], expected: usize) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(expected);
    let mut table: Vec<Vec<u8>> = Vec::with_capacity(4096);
    let reset = |table: &mut Vec<Vec<u8>>| {
        table.clear();
        table.extend((0..=255u8).map(|b| vec![b]));
        table.push(Vec::new());
        table.push(Vec::new());
    };
    reset(&mut table);
    let mut width = 9u32;
    let mut pos = 0usize;
    let mut prev: Option<Vec<u8>> = None;

    while out.len() < expected {
        if pos + width as usize > data.len() * 8 {
            break;
        }
        let mut code = 0u16;
        for _ in 0..width {
            let bit = (data[pos / 8] >> (7 - pos % 8)) & 1;
            code = (code << 1) | u16::from(bit);
            pos += 1;
        }
        if code == EOI {
            break;
        }
        if code == CLEAR {
            reset(&mut table);
            width = 9;
            prev = None;
            continue;
        }
        let entry = match (usize::from(code), &prev) {
            (c, _) if c < table.len() && c != usize::from(CLEAR) && c != usize::from(EOI) => {
                table[c].clone()
            }
            (c, Some(p)) if c == table.len() => {
                let mut e = p.clone();
                e.push(p[0]);
                e
            }
            (c, _) => return Err(format!("LZW code {c} out of range")),
        };
        out.extend_from_slice(&entry);
        if let Some(mut p) = prev.take()
            && table.len() < 4096
        {
            p.push(entry[0]);
            table.push(p);
        }
        grow(&mut width, table.len());
        prev = Some(entry);
    }
    out.truncate(expected);
    Ok(out)
}

struct BitWriter {
    out: Vec<u8>,
    acc: u32,
    bits: u32,
}

impl BitWriter {
    fn put(&mut self, code: u16, width: u32) {
        self.acc = (self.acc << width) | u32::from(code);
        self.bits += width;
        while self.bits >= 8 {
            self.out.push((self.acc >> (self.bits - 8)) as u8);
            self.bits -= 8;
        }
        self.acc &= (1 << self.bits) - 1;
    }

    fn finish(mut self) -> Vec<u8> {
        if self.bits > 0 {
            self.out.push((self.acc << (8 - self.bits)) as u8);
        }
        self.out
    }
}

fn lzw_encode(data: &[u8]) -> Vec<u8> {
    let mut w = BitWriter {
        out: Vec::with_capacity(data.len() / 2 + 4),
        acc: 0,
        bits: 0,
    };
    let mut width = 9u32;
    let mut next = usize::from(FIRST);
    let mut dict: HashMap<Vec<u8>, u16> = HashMap::new();
    w.put(CLEAR, width);

    let mut cur: Vec<u8> = Vec::new();
    for &b in data {
        if cur.is_empty() {
            cur.push(b);
            continue;
        }
        let mut candidate = cur.clone();
        candidate.push(b);
        if dict.contains_key(&candidate) {
            cur = candidate;
            continue;
        }
        w.put(code_of(&dict, &cur), width);
        if next < 4093 {
            dict.insert(candidate, next as u16);
            next += 1;
            grow(&mut width, next - 1);
        } else {
            w.put(CLEAR, width);
            dict.clear();
            next = usize::from(FIRST);
            width = 9;
        }
        cur.clear();
        cur.push(b);
    }
    if !cur.is_empty() {
        w.put(code_of(&dict, &cur), width);
        next += 1;
        grow(&mut width, next - 1);
    }
    w.put(EOI, width);
    w.finish()
}

fn code_of(dict: &HashMap<Vec<u8>, u16>, s: &[u8]) -> u16 {
    if s.len() == 1 {
        return u16::from(s[0]);
    }
    dict.get(s).copied().unwrap_or(u16::from(s[0]))
}
