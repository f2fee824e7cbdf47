//! End-to-end runs of the merge pipeline on real archives.

mod common;

use common::*;
use resdedup_core::{
    DEFAULT_TABLE_NAME, FingerprintPolicy, MergeOptions, analyze_archive, process_archive,
    process_archive_with,
};
use std::path::PathBuf;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    archive: PathBuf,
    scratch: PathBuf,
    report: PathBuf,
}

fn fixture(entries: &[(&str, &[u8], zip::CompressionMethod)]) -> Fixture {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("resources-debug.ap_");
    write_archive(&archive, entries);
    Fixture {
        scratch: dir.path().join("resources-debug-unpacked"),
        report: dir.path().join("reports/resources-debug-duplicated.txt"),
        archive,
        _dir: dir,
    }
}

fn three_images() -> Fixture {
    let x = vec![0xABu8; 2048];
    let y = vec![0x11u8; 512];
    let table = table_bytes(&["img/a.png", "img/b.png", "img/c.png", "app_name"]);
    fixture(&[
        ("AndroidManifest.xml", b"<manifest/>", DEFLATED),
        ("img/a.png", &x, DEFLATED),
        ("img/b.png", &x, DEFLATED),
        ("img/c.png", &y, DEFLATED),
        (DEFAULT_TABLE_NAME, &table, DEFLATED),
    ])
}

#[test]
fn merges_duplicate_image() {
    let f = three_images();
    let report =
        process_archive(&f.archive, &f.scratch, &f.report, Vec::<String>::new()).unwrap();

    assert_eq!(report.removed_count, 1);
    assert_eq!(report.removed_bytes, 2048);
    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].canonical, "img/a.png");
    assert_eq!(report.groups[0].duplicates, ["img/b.png"]);

    assert_eq!(
        names(&f.archive),
        [
            "AndroidManifest.xml",
            "img/a.png",
            "img/c.png",
            DEFAULT_TABLE_NAME
        ]
    );
    assert_eq!(
        global_strings(&f.archive),
        ["img/a.png", "img/a.png", "img/c.png", "app_name"]
    );

    let text = std::fs::read_to_string(&f.report).unwrap();
    assert!(text.starts_with("img/a.png <--- img/a.png\n          <--- img/b.png\n"));
    assert!(text.contains("removed count:1\n"));
    assert!(text.contains("removed size:2.0 KiB\n"));

    assert!(!f.scratch.exists());
}

#[test]
fn table_is_stored_with_matching_crc() {
    let f = three_images();
    process_archive(&f.archive, &f.scratch, &f.report, Vec::<String>::new()).unwrap();

    let mut zip = zip::ZipArchive::new(std::fs::File::open(&f.archive).unwrap()).unwrap();
    let t = zip.by_name(DEFAULT_TABLE_NAME).unwrap();
    assert_eq!(t.compression(), zip::CompressionMethod::Stored);
    assert_eq!(t.compressed_size(), t.size());
    let crc = t.crc32();
    drop(t);
    assert_eq!(crc, crc32fast::hash(&entry_bytes(&f.archive, DEFAULT_TABLE_NAME)));
}

#[test]
fn untouched_entries_keep_their_bytes() {
    let f = three_images();
    let before = read_archive(&f.archive);
    process_archive(&f.archive, &f.scratch, &f.report, Vec::<String>::new()).unwrap();
    let after = read_archive(&f.archive);

    for name in ["AndroidManifest.xml", "img/a.png", "img/c.png"] {
        let b = before.iter().find(|e| e.0 == name).unwrap();
        let a = after.iter().find(|e| e.0 == name).unwrap();
        assert_eq!(a.1, b.1, "{name} content changed");
        assert_eq!(a.2, b.2, "{name} method changed");
    }
}

#[test]
fn second_run_is_a_no_op() {
    let f = three_images();
    process_archive(&f.archive, &f.scratch, &f.report, Vec::<String>::new()).unwrap();
    let first = read_archive(&f.archive);

    let again = process_archive(&f.archive, &f.scratch, &f.report, Vec::<String>::new()).unwrap();
    assert_eq!(again.removed_count, 0);
    assert_eq!(again.removed_bytes, 0);
    assert!(again.groups.is_empty());
    assert_eq!(read_archive(&f.archive), first);

    let text = std::fs::read_to_string(&f.report).unwrap();
    assert_eq!(text, "removed count:0\nremoved size:0 B\n");
}

#[test]
fn verbatim_names_end_up_stored() {
    let payload = vec![7u8; 4096];
    let table = table_bytes(&["assets/model.bin"]);
    let f = fixture(&[
        ("assets/model.bin", &payload, DEFLATED),
        ("assets/other.bin", &payload[..100], DEFLATED),
        (DEFAULT_TABLE_NAME, &table, DEFLATED),
    ]);
    process_archive(&f.archive, &f.scratch, &f.report, ["model.bin"]).unwrap();

    let after = read_archive(&f.archive);
    let method = |name: &str| after.iter().find(|e| e.0 == name).unwrap().2;
    assert_eq!(method("assets/model.bin"), STORED);
    assert_eq!(method("assets/other.bin"), DEFLATED);
    assert_eq!(method(DEFAULT_TABLE_NAME), STORED);
    assert_eq!(entry_bytes(&f.archive, "assets/model.bin"), payload);
}

#[test]
fn directory_policy_keeps_cross_directory_copies() {
    let x = vec![3u8; 700];
    let table = table_bytes(&["res/drawable/a.png", "res/drawable-v21/a.png", "res/drawable/b.png"]);
    let f = fixture(&[
        ("res/drawable/a.png", &x, STORED),
        ("res/drawable-v21/a.png", &x, STORED),
        ("res/drawable/b.png", &x, STORED),
        (DEFAULT_TABLE_NAME, &table, STORED),
    ]);
    let opts = MergeOptions {
        fingerprint: FingerprintPolicy::SameDirectory,
        ..MergeOptions::default()
    };
    let report = process_archive_with(&f.archive, &f.scratch, &f.report, &opts).unwrap();

    assert_eq!(report.removed_count, 1);
    assert_eq!(report.groups[0].canonical, "res/drawable/a.png");
    assert_eq!(report.groups[0].duplicates, ["res/drawable/b.png"]);
    assert_eq!(
        global_strings(&f.archive),
        ["res/drawable/a.png", "res/drawable-v21/a.png", "res/drawable/a.png"]
    );
}

#[test]
fn malformed_table_leaves_archive_untouched() {
    let x = vec![9u8; 64];
    let f = fixture(&[
        ("img/a.png", &x, DEFLATED),
        ("img/b.png", &x, DEFLATED),
        (DEFAULT_TABLE_NAME, b"\x02\x00\x0c\x00\xff\xff\x00\x00", DEFLATED),
    ]);
    let before = std::fs::read(&f.archive).unwrap();

    let err = process_archive(&f.archive, &f.scratch, &f.report, Vec::<String>::new())
        .unwrap_err();
    assert!(err.is_table_error(), "{err}");
    assert_eq!(std::fs::read(&f.archive).unwrap(), before);
    assert!(!f.report.exists());
    assert!(!f.scratch.exists());
}

#[test]
fn missing_table_is_an_error() {
    let f = fixture(&[("img/a.png", b"abc", DEFLATED)]);
    let before = std::fs::read(&f.archive).unwrap();
    let err = process_archive(&f.archive, &f.scratch, &f.report, Vec::<String>::new())
        .unwrap_err();
    assert!(!err.is_table_error());
    assert_eq!(std::fs::read(&f.archive).unwrap(), before);
}

#[test]
fn stale_scratch_dir_is_cleared() {
    let f = three_images();
    std::fs::create_dir_all(f.scratch.join("leftover")).unwrap();
    std::fs::write(f.scratch.join("leftover/junk.txt"), b"junk").unwrap();

    process_archive(&f.archive, &f.scratch, &f.report, Vec::<String>::new()).unwrap();
    assert!(!names(&f.archive).iter().any(|n| n.contains("junk")));
}

#[test]
fn analyze_matches_merge_without_writing() {
    let f = three_images();
    let before = std::fs::read(&f.archive).unwrap();

    let dry = analyze_archive(&f.archive, &MergeOptions::default()).unwrap();
    assert_eq!(std::fs::read(&f.archive).unwrap(), before);
    assert!(!f.scratch.exists());

    let real = process_archive(&f.archive, &f.scratch, &f.report, Vec::<String>::new()).unwrap();
    assert_eq!(dry, real);
}

#[test]
fn scratch_dir_around_the_archive_is_refused() {
    let f = three_images();
    let before = std::fs::read(&f.archive).unwrap();
    let parent = f.archive.parent().unwrap().to_path_buf();

    let err = process_archive(&f.archive, &parent, &f.report, Vec::<String>::new()).unwrap_err();
    assert!(err.to_string().contains("would contain"), "{err}");
    assert_eq!(std::fs::read(&f.archive).unwrap(), before);
    assert!(!f.report.exists());
}
