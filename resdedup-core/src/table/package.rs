use super::{
    CHUNK_HEADER_LEN, Chunk, ChunkHeader, StringPool, begin_chunk, finish_chunk, kind,
    parse_children, patch_u32, read_u32, to_u32,
};
use crate::error::{DedupError, Result};

const NAME_UNITS: usize = 128;
// Offsets from the package chunk start.
const ID_AT: usize = 8;
const NAME_AT: usize = 12;
const TYPE_STRINGS_AT: usize = NAME_AT + NAME_UNITS * 2;
const LAST_PUBLIC_TYPE_AT: usize = TYPE_STRINGS_AT + 4;
const KEY_STRINGS_AT: usize = LAST_PUBLIC_TYPE_AT + 4;
const LAST_PUBLIC_KEY_AT: usize = KEY_STRINGS_AT + 4;
/// Oldest header layout: ends after `last_public_key`.
const PACKAGE_HEADER_MIN: usize = LAST_PUBLIC_KEY_AT + 4;
/// Current layout adds `type_id_offset`.
const PACKAGE_HEADER_LEN: usize = PACKAGE_HEADER_MIN + 4;

/// A package container. Its header points at the type and key string pools
/// by byte offset, so those offsets are re-derived from child positions
/// every time the package is written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageChunk {
    /// Header bytes after the common prefix, with both pool offsets zeroed.
    header: Vec<u8>,
    type_strings: Option<usize>,
    key_strings: Option<usize>,
    pub children: Vec<Chunk>,
    trailing: Vec<u8>,
}

impl PackageChunk {
    pub fn new(
        id: u32,
        name: &str,
        type_strings: StringPool,
        key_strings: StringPool,
        rest: Vec<Chunk>,
    ) -> Self {
        let mut header = vec![0u8; PACKAGE_HEADER_LEN - CHUNK_HEADER_LEN];
        let h = |at: usize| at - CHUNK_HEADER_LEN;
        header[h(ID_AT)..h(ID_AT) + 4].copy_from_slice(&id.to_le_bytes());
        for (i, u) in name.encode_utf16().take(NAME_UNITS - 1).enumerate() {
            let at = h(NAME_AT) + i * 2;
            header[at..at + 2].copy_from_slice(&u.to_le_bytes());
        }
        let last_type = type_strings.len() as u32;
        let last_key = key_strings.len() as u32;
        header[h(LAST_PUBLIC_TYPE_AT)..h(LAST_PUBLIC_TYPE_AT) + 4]
            .copy_from_slice(&last_type.to_le_bytes());
        header[h(LAST_PUBLIC_KEY_AT)..h(LAST_PUBLIC_KEY_AT) + 4]
            .copy_from_slice(&last_key.to_le_bytes());

        let mut children = vec![
            Chunk::StringPool(type_strings),
            Chunk::StringPool(key_strings),
        ];
        children.extend(rest);
        Self {
            header,
            type_strings: Some(0),
            key_strings: Some(1),
            children,
            trailing: Vec::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.header_u32(ID_AT)
    }

    pub fn name(&self) -> String {
        let start = NAME_AT - CHUNK_HEADER_LEN;
        let units: Vec<u16> = self.header[start..start + NAME_UNITS * 2]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .take_while(|&u| u != 0)
            .collect();
        String::from_utf16_lossy(&units)
    }

    pub fn type_strings(&self) -> Option<&StringPool> {
        self.pool_at(self.type_strings)
    }

    pub fn key_strings(&self) -> Option<&StringPool> {
        self.pool_at(self.key_strings)
    }

    fn pool_at(&self, idx: Option<usize>) -> Option<&StringPool> {
        match self.children.get(idx?) {
            Some(Chunk::StringPool(p)) => Some(p),
            _ => None,
        }
    }

    fn header_u32(&self, at: usize) -> u32 {
        let i = at - CHUNK_HEADER_LEN;
        u32::from_le_bytes([
            self.header[i],
            self.header[i + 1],
            self.header[i + 2],
            self.header[i + 3],
        ])
    }

    pub(crate) fn parse(chunk: &[u8], header: ChunkHeader) -> Result<Self> {
        let hs = header.header_size as usize;
        if hs < PACKAGE_HEADER_MIN {
            return Err(DedupError::malformed(format!(
                "PACKAGE header_size {hs} below {PACKAGE_HEADER_MIN}"
            )));
        }
        let type_off = read_u32(chunk, TYPE_STRINGS_AT)? as usize;
        let key_off = read_u32(chunk, KEY_STRINGS_AT)? as usize;
        let body = parse_children(&chunk[hs..])?;

        let locate = |off: usize, what: &str| -> Result<Option<usize>> {
            if off == 0 {
                return Ok(None);
            }
            let idx = body
                .offsets
                .iter()
                .position(|&o| hs + o == off)
                .filter(|&i| matches!(body.chunks[i], Chunk::StringPool(_)))
                .ok_or_else(|| {
                    DedupError::malformed(format!(
                        "PACKAGE {what} offset {off} does not start a string pool"
                    ))
                })?;
            Ok(Some(idx))
        };
        let type_strings = locate(type_off, "type_strings")?;
        let key_strings = locate(key_off, "key_strings")?;

        let mut raw_header = chunk[CHUNK_HEADER_LEN..hs].to_vec();
        patch_u32(&mut raw_header, TYPE_STRINGS_AT - CHUNK_HEADER_LEN, 0);
        patch_u32(&mut raw_header, KEY_STRINGS_AT - CHUNK_HEADER_LEN, 0);

        Ok(Self {
            header: raw_header,
            type_strings,
            key_strings,
            children: body.chunks,
            trailing: body.trailing,
        })
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        let start = begin_chunk(out, kind::PACKAGE, CHUNK_HEADER_LEN + self.header.len())?;
        out.extend_from_slice(&self.header);
        let mut offsets = Vec::with_capacity(self.children.len());
        for c in &self.children {
            offsets.push(out.len() - start);
            c.write_to(out)?;
        }
        out.extend_from_slice(&self.trailing);

        if let Some(i) = self.type_strings {
            let off = to_u32(offsets[i], "type_strings offset")?;
            patch_u32(out, start + TYPE_STRINGS_AT, off);
        }
        if let Some(i) = self.key_strings {
            let off = to_u32(offsets[i], "key_strings offset")?;
            patch_u32(out, start + KEY_STRINGS_AT, off);
        }
        finish_chunk(out, start)
    }
}
