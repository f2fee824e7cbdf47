//! Packed resource table (`resources.arsc`) codec.
//!
//! The table is a tree of little-endian chunks. Every chunk starts with
//! `{type: u16, header_size: u16, size: u32}`; containers (the table itself
//! and each package) hold further chunks after their header. Only the kinds
//! the merge needs to understand are decoded: string pools and the two
//! containers. Everything else is kept as opaque bytes and written back
//! untouched, so indices held by type/entry chunks stay valid as long as
//! string pool arity is preserved.

pub mod package;
pub mod string_pool;

pub use package::PackageChunk;
pub use string_pool::StringPool;

use crate::error::{DedupError, Result};

pub const CHUNK_HEADER_LEN: usize = 8;

pub mod kind {
    pub const NULL: u16 = 0x0000;
    pub const STRING_POOL: u16 = 0x0001;
    pub const TABLE: u16 = 0x0002;
    pub const XML: u16 = 0x0003;
    pub const PACKAGE: u16 = 0x0200;
    pub const TYPE: u16 = 0x0201;
    pub const TYPE_SPEC: u16 = 0x0202;
    pub const LIBRARY: u16 = 0x0203;
    pub const OVERLAYABLE: u16 = 0x0204;
    pub const OVERLAYABLE_POLICY: u16 = 0x0205;
    pub const STAGED_ALIAS: u16 = 0x0206;
}

pub fn kind_name(k: u16) -> &'static str {
    match k {
        kind::NULL => "NULL",
        kind::STRING_POOL => "STRING_POOL",
        kind::TABLE => "TABLE",
        kind::XML => "XML",
        kind::PACKAGE => "PACKAGE",
        kind::TYPE => "TYPE",
        kind::TYPE_SPEC => "TYPE_SPEC",
        kind::LIBRARY => "LIBRARY",
        kind::OVERLAYABLE => "OVERLAYABLE",
        kind::OVERLAYABLE_POLICY => "OVERLAYABLE_POLICY",
        kind::STAGED_ALIAS => "STAGED_ALIAS",
        _ => "UNKNOWN",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub kind: u16,
    pub header_size: u16,
    pub size: u32,
}

impl ChunkHeader {
    /// Reads and bounds-checks the header at the start of `buf`.
    pub fn read_from(buf: &[u8]) -> Result<Self> {
        let kind = read_u16(buf, 0)?;
        let header_size = read_u16(buf, 2)?;
        let size = read_u32(buf, 4)?;
        if (header_size as usize) < CHUNK_HEADER_LEN {
            return Err(DedupError::malformed(format!(
                "{} chunk header_size {header_size} below minimum",
                kind_name(kind)
            )));
        }
        if size < header_size as u32 || size as usize > buf.len() {
            return Err(DedupError::malformed(format!(
                "{} chunk size {size} out of range (header {header_size}, available {})",
                kind_name(kind),
                buf.len()
            )));
        }
        Ok(Self {
            kind,
            header_size,
            size,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Chunk {
    Table(TableChunk),
    StringPool(StringPool),
    Package(PackageChunk),
    Opaque(OpaqueChunk),
}

/// Any chunk kind the merge never looks inside.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpaqueChunk {
    pub kind: u16,
    /// Header bytes after the common 8-byte prefix.
    pub header: Vec<u8>,
    pub body: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableChunk {
    pub package_count: u32,
    header_extra: Vec<u8>,
    pub children: Vec<Chunk>,
    trailing: Vec<u8>,
}

const TABLE_HEADER_LEN: usize = 12;

impl TableChunk {
    pub fn new(package_count: u32, children: Vec<Chunk>) -> Self {
        Self {
            package_count,
            header_extra: Vec::new(),
            children,
            trailing: Vec::new(),
        }
    }

    fn parse(chunk: &[u8], header: ChunkHeader) -> Result<Self> {
        let hs = header.header_size as usize;
        if hs < TABLE_HEADER_LEN {
            return Err(DedupError::malformed(format!(
                "TABLE header_size {hs} below {TABLE_HEADER_LEN}"
            )));
        }
        let package_count = read_u32(chunk, 8)?;
        let body = parse_children(&chunk[hs..])?;
        Ok(Self {
            package_count,
            header_extra: chunk[TABLE_HEADER_LEN..hs].to_vec(),
            children: body.chunks,
            trailing: body.trailing,
        })
    }

    fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        let start = begin_chunk(out, kind::TABLE, TABLE_HEADER_LEN + self.header_extra.len())?;
        out.extend_from_slice(&self.package_count.to_le_bytes());
        out.extend_from_slice(&self.header_extra);
        for c in &self.children {
            c.write_to(out)?;
        }
        out.extend_from_slice(&self.trailing);
        finish_chunk(out, start)
    }
}

impl Chunk {
    /// Parses one chunk from the start of `buf`; returns it with its byte length.
    pub fn parse(buf: &[u8]) -> Result<(Chunk, usize)> {
        let header = ChunkHeader::read_from(buf)?;
        let size = header.size as usize;
        let bytes = &buf[..size];
        let chunk = match header.kind {
            kind::TABLE => Chunk::Table(TableChunk::parse(bytes, header)?),
            kind::STRING_POOL => Chunk::StringPool(StringPool::parse(bytes, header)?),
            kind::PACKAGE => Chunk::Package(PackageChunk::parse(bytes, header)?),
            k => {
                let hs = header.header_size as usize;
                Chunk::Opaque(OpaqueChunk {
                    kind: k,
                    header: bytes[CHUNK_HEADER_LEN..hs].to_vec(),
                    body: bytes[hs..].to_vec(),
                })
            }
        };
        Ok((chunk, size))
    }

    pub fn kind(&self) -> u16 {
        match self {
            Chunk::Table(_) => kind::TABLE,
            Chunk::StringPool(_) => kind::STRING_POOL,
            Chunk::Package(_) => kind::PACKAGE,
            Chunk::Opaque(o) => o.kind,
        }
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Chunk::Table(t) => t.write_to(out),
            Chunk::StringPool(p) => p.write_to(out),
            Chunk::Package(p) => p.write_to(out),
            Chunk::Opaque(o) => {
                let start = begin_chunk(out, o.kind, CHUNK_HEADER_LEN + o.header.len())?;
                out.extend_from_slice(&o.header);
                out.extend_from_slice(&o.body);
                finish_chunk(out, start)
            }
        }
    }

    pub fn encoded_len(&self) -> Result<usize> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf.len())
    }

    fn children(&self) -> &[Chunk] {
        match self {
            Chunk::Table(t) => &t.children,
            Chunk::Package(p) => &p.children,
            _ => &[],
        }
    }

    fn describe_into(&self, depth: usize, out: &mut Vec<String>) -> Result<()> {
        let pad = "  ".repeat(depth);
        let size = self.encoded_len()?;
        let line = match self {
            Chunk::Table(t) => format!("{pad}TABLE size={size} packages={}", t.package_count),
            Chunk::StringPool(p) => format!(
                "{pad}STRING_POOL size={size} strings={} styles={} {}",
                p.len(),
                p.style_count(),
                if p.is_utf8() { "utf8" } else { "utf16" }
            ),
            Chunk::Package(p) => format!(
                "{pad}PACKAGE size={size} id=0x{:02x} name={}",
                p.id(),
                p.name()
            ),
            Chunk::Opaque(o) => format!("{pad}{} size={size}", kind_name(o.kind)),
        };
        out.push(line);
        for c in self.children() {
            c.describe_into(depth + 1, out)?;
        }
        Ok(())
    }
}

pub(crate) struct Children {
    pub chunks: Vec<Chunk>,
    /// Start of each chunk relative to the parsed region.
    pub offsets: Vec<usize>,
    pub trailing: Vec<u8>,
}

/// Parses back-to-back chunks. A tail too short for a chunk header is kept verbatim.
pub(crate) fn parse_children(buf: &[u8]) -> Result<Children> {
    let mut chunks = Vec::new();
    let mut offsets = Vec::new();
    let mut off = 0usize;
    while buf.len() - off >= CHUNK_HEADER_LEN {
        let (chunk, n) = Chunk::parse(&buf[off..])?;
        offsets.push(off);
        chunks.push(chunk);
        off += n;
    }
    Ok(Children {
        chunks,
        offsets,
        trailing: buf[off..].to_vec(),
    })
}

/// In-memory resource table: the ordered top-level chunks of one table file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceTable {
    pub chunks: Vec<Chunk>,
    trailing: Vec<u8>,
}

impl ResourceTable {
    pub fn new(table: TableChunk) -> Self {
        Self {
            chunks: vec![Chunk::Table(table)],
            trailing: Vec::new(),
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let body = parse_children(bytes)?;
        match body.chunks.first() {
            Some(Chunk::Table(_)) => {}
            Some(other) => {
                return Err(DedupError::malformed(format!(
                    "expected TABLE chunk first, found {}",
                    kind_name(other.kind())
                )));
            }
            None => return Err(DedupError::malformed("no chunks in resource table")),
        }
        Ok(Self {
            chunks: body.chunks,
            trailing: body.trailing,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for c in &self.chunks {
            c.write_to(&mut out)?;
        }
        out.extend_from_slice(&self.trailing);
        Ok(out)
    }

    /// Every string pool in the tree, depth first.
    pub fn string_pools(&self) -> Vec<&StringPool> {
        fn walk<'a>(chunks: &'a [Chunk], out: &mut Vec<&'a StringPool>) {
            for c in chunks {
                match c {
                    Chunk::StringPool(p) => out.push(p),
                    Chunk::Table(t) => walk(&t.children, out),
                    Chunk::Package(p) => walk(&p.children, out),
                    Chunk::Opaque(_) => {}
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.chunks, &mut out);
        out
    }

    pub fn string_pools_mut(&mut self) -> Vec<&mut StringPool> {
        fn walk<'a>(chunks: &'a mut [Chunk], out: &mut Vec<&'a mut StringPool>) {
            for c in chunks.iter_mut() {
                match c {
                    Chunk::StringPool(p) => out.push(p),
                    Chunk::Table(t) => walk(&mut t.children, out),
                    Chunk::Package(p) => walk(&mut p.children, out),
                    Chunk::Opaque(_) => {}
                }
            }
        }
        let mut out = Vec::new();
        walk(&mut self.chunks, &mut out);
        out
    }

    /// One indented line per chunk.
    pub fn describe(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for c in &self.chunks {
            c.describe_into(0, &mut out)?;
        }
        Ok(out)
    }
}

pub(crate) fn read_u16(buf: &[u8], off: usize) -> Result<u16> {
    buf.get(off..off + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| DedupError::malformed(format!("u16 at offset {off} out of bounds")))
}

pub(crate) fn read_u32(buf: &[u8], off: usize) -> Result<u32> {
    buf.get(off..off + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| DedupError::malformed(format!("u32 at offset {off} out of bounds")))
}

pub(crate) fn patch_u32(out: &mut [u8], at: usize, v: u32) {
    out[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

pub(crate) fn to_u32(v: usize, what: &str) -> Result<u32> {
    u32::try_from(v).map_err(|_| DedupError::malformed(format!("{what} {v} exceeds u32")))
}

/// Writes a chunk header with a zero size; returns the chunk start for [`finish_chunk`].
pub(crate) fn begin_chunk(out: &mut Vec<u8>, kind: u16, header_size: usize) -> Result<usize> {
    let hs = u16::try_from(header_size).map_err(|_| {
        DedupError::malformed(format!("{} header of {header_size} bytes", kind_name(kind)))
    })?;
    let start = out.len();
    out.extend_from_slice(&kind.to_le_bytes());
    out.extend_from_slice(&hs.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    Ok(start)
}

pub(crate) fn finish_chunk(out: &mut [u8], start: usize) -> Result<()> {
    let size = to_u32(out.len() - start, "chunk size")?;
    patch_u32(out, start + 4, size);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResourceTable {
        let global = StringPool::new(
            vec!["res/drawable/a.png".into(), "res/drawable/b.png".into()],
            true,
        );
        let types = StringPool::new(vec!["drawable".into()], false);
        let keys = StringPool::new(vec!["a".into(), "b".into()], true);
        let spec = Chunk::Opaque(OpaqueChunk {
            kind: kind::TYPE_SPEC,
            header: vec![1, 0, 0, 0, 2, 0, 0, 0],
            body: vec![0; 8],
        });
        let pkg = PackageChunk::new(0x7f, "com.example", types, keys, vec![spec]);
        ResourceTable::new(TableChunk::new(
            1,
            vec![Chunk::StringPool(global), Chunk::Package(pkg)],
        ))
    }

    #[test]
    fn table_roundtrip_is_byte_identical() {
        let bytes = sample().to_bytes().unwrap();
        let parsed = ResourceTable::parse(&bytes).unwrap();
        assert_eq!(parsed.to_bytes().unwrap(), bytes);
        assert_eq!(parsed, sample());
    }

    #[test]
    fn finds_every_pool() {
        let table = sample();
        let pools = table.string_pools();
        assert_eq!(pools.len(), 3);
        assert_eq!(pools[0].get(1), Some("res/drawable/b.png"));
        assert_eq!(pools[1].get(0), Some("drawable"));
    }

    #[test]
    fn rejects_non_table_root() {
        let mut bytes = Vec::new();
        Chunk::StringPool(StringPool::new(vec!["x".into()], true))
            .write_to(&mut bytes)
            .unwrap();
        let err = ResourceTable::parse(&bytes).unwrap_err();
        assert!(err.is_table_error());
    }

    #[test]
    fn rejects_truncated_chunk() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes.truncate(bytes.len() - 4);
        assert!(matches!(
            ResourceTable::parse(&bytes),
            Err(DedupError::MalformedTable(_))
        ));
    }

    #[test]
    fn rejects_bad_header_size() {
        let mut bytes = sample().to_bytes().unwrap();
        // TABLE header_size below the common prefix
        bytes[2..4].copy_from_slice(&4u16.to_le_bytes());
        assert!(ResourceTable::parse(&bytes).is_err());
    }

    #[test]
    fn keeps_short_trailer() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        let parsed = ResourceTable::parse(&bytes).unwrap();
        assert_eq!(parsed.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn describe_lists_chunks() {
        let lines = sample().describe().unwrap();
        assert!(lines[0].starts_with("TABLE"));
        assert!(lines[1].contains("strings=2"));
        assert!(lines[2].contains("name=com.example"));
        assert!(lines.last().unwrap().trim_start().starts_with("TYPE_SPEC"));
    }
}
