use super::{ChunkHeader, begin_chunk, finish_chunk, kind, read_u16, read_u32, to_u32};
use crate::error::{DedupError, Result};

pub const SORTED_FLAG: u32 = 1 << 0;
pub const UTF8_FLAG: u32 = 1 << 8;

/// chunk header + string_count, style_count, flags, strings_start, styles_start
const POOL_HEADER_LEN: usize = 28;

/// Ordered strings addressed by index from the rest of the table.
///
/// The number of strings never changes once parsed; only their content can
/// be rewritten. Style spans are opaque and travel with the pool unchanged
/// (their offsets are relative to `styles_start`, so re-encoding the strings
/// does not move them).
#[derive(Clone, Debug)]
pub struct StringPool {
    flags: u32,
    header_extra: Vec<u8>,
    strings: Vec<String>,
    style_offsets: Vec<u32>,
    style_data: Vec<u8>,
    /// Original chunk bytes while the pool is unmodified.
    pristine: Option<Vec<u8>>,
}

impl PartialEq for StringPool {
    fn eq(&self, other: &Self) -> bool {
        self.flags == other.flags
            && self.header_extra == other.header_extra
            && self.strings == other.strings
            && self.style_offsets == other.style_offsets
            && self.style_data == other.style_data
    }
}

impl Eq for StringPool {}

impl StringPool {
    pub fn new(strings: Vec<String>, utf8: bool) -> Self {
        Self {
            flags: if utf8 { UTF8_FLAG } else { 0 },
            header_extra: Vec::new(),
            strings,
            style_offsets: Vec::new(),
            style_data: Vec::new(),
            pristine: None,
        }
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.strings.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(String::as_str)
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn is_utf8(&self) -> bool {
        self.flags & UTF8_FLAG != 0
    }

    pub fn style_count(&self) -> usize {
        self.style_offsets.len()
    }

    pub fn is_modified(&self) -> bool {
        self.pristine.is_none()
    }

    /// Replaces, in place, every string for which `f` yields a different value.
    /// Returns how many strings changed.
    pub fn rewrite<'a>(&mut self, mut f: impl FnMut(&str) -> Option<&'a str>) -> usize {
        let mut changed = 0;
        for s in self.strings.iter_mut() {
            if let Some(new) = f(s) {
                if new != s {
                    *s = new.to_string();
                    changed += 1;
                }
            }
        }
        if changed > 0 {
            self.pristine = None;
            // content order no longer matches the sort the flag promised
            self.flags &= !SORTED_FLAG;
        }
        changed
    }

    pub(crate) fn parse(chunk: &[u8], header: ChunkHeader) -> Result<Self> {
        let hs = header.header_size as usize;
        if hs < POOL_HEADER_LEN {
            return Err(DedupError::malformed(format!(
                "STRING_POOL header_size {hs} below {POOL_HEADER_LEN}"
            )));
        }
        let size = chunk.len();
        let string_count = read_u32(chunk, 8)? as usize;
        let style_count = read_u32(chunk, 12)? as usize;
        let flags = read_u32(chunk, 16)?;
        let strings_start = read_u32(chunk, 20)? as usize;
        let styles_start = read_u32(chunk, 24)? as usize;

        let offsets_end = string_count
            .checked_add(style_count)
            .and_then(|n| n.checked_mul(4))
            .and_then(|n| n.checked_add(hs))
            .filter(|&end| end <= size)
            .ok_or_else(|| {
                DedupError::malformed(format!(
                    "STRING_POOL offsets for {string_count} strings and {style_count} styles overflow chunk of {size}"
                ))
            })?;

        let data_end = if style_count > 0 && styles_start != 0 {
            styles_start
        } else {
            size
        };
        if data_end > size
            || (string_count > 0 && (strings_start < offsets_end || strings_start > data_end))
        {
            return Err(DedupError::malformed(format!(
                "STRING_POOL data range {strings_start}..{data_end} invalid for chunk of {size}"
            )));
        }
        let data = &chunk[..data_end];
        let utf8 = flags & UTF8_FLAG != 0;

        let mut strings = Vec::with_capacity(string_count);
        for i in 0..string_count {
            let off = read_u32(chunk, hs + 4 * i)? as usize;
            let pos = strings_start
                .checked_add(off)
                .filter(|&p| p < data_end)
                .ok_or_else(|| {
                    DedupError::malformed(format!("string #{i} offset {off} outside pool data"))
                })?;
            let s = if utf8 {
                decode_utf8(data, pos)
            } else {
                decode_utf16(data, pos)
            }
            .map_err(|e| DedupError::malformed(format!("string #{i}: {e}")))?;
            strings.push(s);
        }

        let mut style_offsets = Vec::with_capacity(style_count);
        for i in 0..style_count {
            style_offsets.push(read_u32(chunk, hs + 4 * (string_count + i))?);
        }
        let style_data = if style_count > 0 {
            chunk
                .get(styles_start..)
                .filter(|_| styles_start >= offsets_end)
                .ok_or_else(|| {
                    DedupError::malformed(format!("styles_start {styles_start} outside chunk"))
                })?
                .to_vec()
        } else {
            Vec::new()
        };

        Ok(Self {
            flags,
            header_extra: chunk[POOL_HEADER_LEN..hs].to_vec(),
            strings,
            style_offsets,
            style_data,
            pristine: Some(chunk.to_vec()),
        })
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        if let Some(raw) = &self.pristine {
            out.extend_from_slice(raw);
            return Ok(());
        }

        let utf8 = self.is_utf8();
        let mut data = Vec::new();
        let mut offsets = Vec::with_capacity(self.strings.len());
        for s in &self.strings {
            offsets.push(to_u32(data.len(), "string offset")?);
            if utf8 {
                encode_utf8(s, &mut data)?;
            } else {
                encode_utf16(s, &mut data)?;
            }
        }
        while data.len() % 4 != 0 {
            data.push(0);
        }

        let header_size = POOL_HEADER_LEN + self.header_extra.len();
        let tables_end = header_size + 4 * (self.strings.len() + self.style_offsets.len());
        let strings_start = if self.strings.is_empty() {
            0
        } else {
            tables_end
        };
        let styles_start = if self.style_offsets.is_empty() {
            0
        } else {
            tables_end + data.len()
        };

        let start = begin_chunk(out, kind::STRING_POOL, header_size)?;
        out.extend_from_slice(&to_u32(self.strings.len(), "string count")?.to_le_bytes());
        out.extend_from_slice(&to_u32(self.style_offsets.len(), "style count")?.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&to_u32(strings_start, "strings_start")?.to_le_bytes());
        out.extend_from_slice(&to_u32(styles_start, "styles_start")?.to_le_bytes());
        out.extend_from_slice(&self.header_extra);
        for off in &offsets {
            out.extend_from_slice(&off.to_le_bytes());
        }
        for off in &self.style_offsets {
            out.extend_from_slice(&off.to_le_bytes());
        }
        out.extend_from_slice(&data);
        out.extend_from_slice(&self.style_data);
        finish_chunk(out, start)
    }
}

fn read_len8(data: &[u8], pos: usize) -> std::result::Result<(usize, usize), String> {
    let b0 = *data.get(pos).ok_or("length prefix out of bounds")? as usize;
    if b0 & 0x80 == 0 {
        return Ok((b0, 1));
    }
    let b1 = *data.get(pos + 1).ok_or("length prefix out of bounds")? as usize;
    Ok((((b0 & 0x7f) << 8) | b1, 2))
}

fn decode_utf8(data: &[u8], pos: usize) -> std::result::Result<String, String> {
    let (_units, n1) = read_len8(data, pos)?;
    let (len, n2) = read_len8(data, pos + n1)?;
    let start = pos + n1 + n2;
    let raw = data
        .get(start..start + len)
        .ok_or_else(|| format!("{len} bytes at {start} out of bounds"))?;
    String::from_utf8(raw.to_vec()).map_err(|e| format!("invalid UTF-8: {e}"))
}

fn decode_utf16(data: &[u8], pos: usize) -> std::result::Result<String, String> {
    let unit = |at: usize| {
        read_u16(data, at)
            .map(usize::from)
            .map_err(|_| "length prefix out of bounds".to_string())
    };
    let u0 = unit(pos)?;
    let (len, prefix) = if u0 & 0x8000 == 0 {
        (u0, 2)
    } else {
        (((u0 & 0x7fff) << 16) | unit(pos + 2)?, 4)
    };
    let start = pos + prefix;
    let raw = data
        .get(start..start + len * 2)
        .ok_or_else(|| format!("{len} UTF-16 units at {start} out of bounds"))?;
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units).map_err(|e| format!("invalid UTF-16: {e}"))
}

fn write_len8(n: usize, out: &mut Vec<u8>) -> Result<()> {
    if n > 0x7fff {
        return Err(DedupError::malformed(format!(
            "string length {n} does not fit a UTF-8 pool prefix"
        )));
    }
    if n > 0x7f {
        out.push(0x80 | (n >> 8) as u8);
        out.push((n & 0xff) as u8);
    } else {
        out.push(n as u8);
    }
    Ok(())
}

fn encode_utf8(s: &str, out: &mut Vec<u8>) -> Result<()> {
    write_len8(s.encode_utf16().count(), out)?;
    write_len8(s.len(), out)?;
    out.extend_from_slice(s.as_bytes());
    out.push(0);
    Ok(())
}

fn encode_utf16(s: &str, out: &mut Vec<u8>) -> Result<()> {
    let units: Vec<u16> = s.encode_utf16().collect();
    let n = units.len();
    if n > 0x7fff_ffff {
        return Err(DedupError::malformed(format!(
            "string length {n} does not fit a UTF-16 pool prefix"
        )));
    }
    if n > 0x7fff {
        out.extend_from_slice(&(0x8000 | (n >> 16) as u16).to_le_bytes());
        out.extend_from_slice(&((n & 0xffff) as u16).to_le_bytes());
    } else {
        out.extend_from_slice(&(n as u16).to_le_bytes());
    }
    for u in units {
        out.extend_from_slice(&u.to_le_bytes());
    }
    out.extend_from_slice(&0u16.to_le_bytes());
    Ok(())
}
