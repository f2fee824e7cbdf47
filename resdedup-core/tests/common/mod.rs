//! Shared helpers for the integration tests: real zip archives on disk and
//! synthetic resource tables built through the public table constructors.
//!
//! Each test file compiles as its own crate and uses a subset of these.

#![allow(dead_code)]

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use resdedup_core::table::{Chunk, PackageChunk, ResourceTable, StringPool, TableChunk};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

pub const DEFLATED: CompressionMethod = CompressionMethod::Deflated;
pub const STORED: CompressionMethod = CompressionMethod::Stored;

/// Writes a zip with the given entries, in order.
pub fn write_archive(path: &Path, entries: &[(&str, &[u8], CompressionMethod)]) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, data, method) in entries {
        let opts = SimpleFileOptions::default().compression_method(*method);
        zip.start_file(*name, opts).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

/// (name, content, method) of every entry, in archive order.
pub fn read_archive(path: &Path) -> Vec<(String, Vec<u8>, CompressionMethod)> {
    let mut zip = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut out = Vec::new();
    for i in 0..zip.len() {
        let mut f = zip.by_index(i).unwrap();
        let mut buf = Vec::new();
        f.read_to_end(&mut buf).unwrap();
        out.push((f.name().to_string(), buf, f.compression()));
    }
    out
}

pub fn names(path: &Path) -> Vec<String> {
    read_archive(path).into_iter().map(|(n, _, _)| n).collect()
}

pub fn entry_bytes(path: &Path, name: &str) -> Vec<u8> {
    read_archive(path)
        .into_iter()
        .find(|(n, _, _)| n == name)
        .map(|(_, b, _)| b)
        .unwrap_or_else(|| panic!("{name} not in archive"))
}

/// A one-package table whose global pool holds `values`.
pub fn table_bytes(values: &[&str]) -> Vec<u8> {
    let globals = StringPool::new(values.iter().map(|s| s.to_string()).collect(), true);
    let types = StringPool::new(vec!["drawable".into(), "string".into()], false);
    let keys = StringPool::new(
        (0..values.len()).map(|i| format!("res_{i}")).collect(),
        false,
    );
    let pkg = PackageChunk::new(0x7f, "com.example.app", types, keys, Vec::new());
    ResourceTable::new(TableChunk::new(
        1,
        vec![Chunk::StringPool(globals), Chunk::Package(pkg)],
    ))
    .to_bytes()
    .unwrap()
}

/// Strings of the global (first) pool of the table inside `archive`.
pub fn global_strings(archive: &Path) -> Vec<String> {
    let table = resdedup_core::read_table(archive, resdedup_core::DEFAULT_TABLE_NAME).unwrap();
    table.string_pools()[0].iter().map(str::to_string).collect()
}
