//! Unit tests for archive extraction.

use super::*;
use crate::test_utils::{ArchiveEntry, tar_gz_bytes, zip_bytes};
use nvup_common::Cancelled;
use rstest::rstest;
use std::io::Cursor;
use std::path::PathBuf;

fn release_entries() -> Vec<ArchiveEntry> {
    vec![
        ArchiveEntry::dir("nvim-linux-x86_64/"),
        ArchiveEntry::dir("nvim-linux-x86_64/bin/"),
        ArchiveEntry::file("nvim-linux-x86_64/bin/nvim", b"#!/bin/sh\necho nvim\n", 0o755),
        ArchiveEntry::file("nvim-linux-x86_64/share/doc/README", b"docs", 0o644),
        ArchiveEntry::symlink("nvim-linux-x86_64/bin/vi", "nvim"),
    ]
}

#[rstest]
#[case::tar_gz(ArchiveFormat::TarGz)]
#[case::zip(ArchiveFormat::Zip)]
fn materialises_files_directories_and_symlinks(#[case] format: ArchiveFormat) {
    let bytes = match format {
        ArchiveFormat::TarGz => tar_gz_bytes(&release_entries()),
        ArchiveFormat::Zip => zip_bytes(&release_entries()),
    };
    let temp = tempfile::tempdir().expect("temp dir");
    let dest = temp.path().join("staging");

    let summary = extract(Cursor::new(bytes), &dest, &CancelToken::new()).expect("extract");

    assert_eq!(summary.format, format);
    assert_eq!(summary.entries, 5);
    let root = dest.join("nvim-linux-x86_64");
    assert!(root.join("bin").is_dir());
    assert_eq!(
        fs::read(root.join("bin/nvim")).expect("binary"),
        b"#!/bin/sh\necho nvim\n"
    );
    assert_eq!(fs::read(root.join("share/doc/README")).expect("doc"), b"docs");
    #[cfg(unix)]
    assert_eq!(
        fs::read_link(root.join("bin/vi")).expect("symlink"),
        PathBuf::from("nvim")
    );
}

#[cfg(unix)]
#[rstest]
#[case::tar_gz(ArchiveFormat::TarGz)]
#[case::zip(ArchiveFormat::Zip)]
fn preserves_executable_permission_bits(#[case] format: ArchiveFormat) {
    use std::os::unix::fs::PermissionsExt;

    let entries = [
        ArchiveEntry::file("bin/nvim", b"elf", 0o755),
        ArchiveEntry::file("README.md", b"text", 0o644),
    ];
    let bytes = match format {
        ArchiveFormat::TarGz => tar_gz_bytes(&entries),
        ArchiveFormat::Zip => zip_bytes(&entries),
    };
    let temp = tempfile::tempdir().expect("temp dir");

    extract(Cursor::new(bytes), temp.path(), &CancelToken::new()).expect("extract");

    let mode = |path: &str| {
        fs::metadata(temp.path().join(path))
            .expect("metadata")
            .permissions()
            .mode()
            & 0o777
    };
    assert_eq!(mode("bin/nvim"), 0o755);
    assert_eq!(mode("README.md"), 0o644);
}

#[test]
fn symlink_targets_are_copied_verbatim() {
    let entries = [ArchiveEntry::symlink("share/runtime", "../../lib/runtime")];
    let temp = tempfile::tempdir().expect("temp dir");

    extract(
        Cursor::new(tar_gz_bytes(&entries)),
        temp.path(),
        &CancelToken::new(),
    )
    .expect("extract");

    #[cfg(unix)]
    assert_eq!(
        fs::read_link(temp.path().join("share/runtime")).expect("symlink"),
        PathBuf::from("../../lib/runtime")
    );
}

#[test]
fn archive_codec_reads_from_disk() {
    let temp = tempfile::tempdir().expect("temp dir");
    let archive_path = temp.path().join("nvim-win64.zip");
    fs::write(
        &archive_path,
        zip_bytes(&[ArchiveEntry::file("nvim-win64/bin/nvim.exe", b"MZ", 0o755)]),
    )
    .expect("write archive");

    let summary = ArchiveCodec
        .extract(&archive_path, &temp.path().join("out"), &CancelToken::new())
        .expect("extract");

    assert_eq!(summary.format, ArchiveFormat::Zip);
    assert!(temp.path().join("out/nvim-win64/bin/nvim.exe").is_file());
}

#[test]
fn empty_file_is_empty_input() {
    let temp = tempfile::tempdir().expect("temp dir");
    let err = extract(Cursor::new(Vec::new()), temp.path(), &CancelToken::new())
        .expect_err("empty input");
    assert!(matches!(err, ArchiveError::EmptyInput));
}

#[test]
fn truncated_gzip_is_an_error() {
    let mut bytes = tar_gz_bytes(&release_entries());
    bytes.truncate(bytes.len() / 2);
    let temp = tempfile::tempdir().expect("temp dir");

    let result = extract(Cursor::new(bytes), temp.path(), &CancelToken::new());

    assert!(result.is_err(), "truncated archive must not extract cleanly");
}

#[test]
fn tar_entry_climbing_out_is_rejected() {
    let temp = tempfile::tempdir().expect("temp dir");
    let dest = temp.path().join("staging");

    let err = extract(
        Cursor::new(crate::test_utils::tar_gz_with_raw_path("../escape.txt", b"owned")),
        &dest,
        &CancelToken::new(),
    )
    .expect_err("traversal");

    assert!(matches!(err, ArchiveError::PathTraversal { .. }), "got {err}");
    assert!(!temp.path().join("escape.txt").exists());
}

#[test]
fn cancelled_token_stops_before_first_entry() {
    let temp = tempfile::tempdir().expect("temp dir");
    let token = CancelToken::new();
    token.cancel();

    let err = extract(
        Cursor::new(tar_gz_bytes(&release_entries())),
        temp.path(),
        &token,
    )
    .expect_err("cancelled");

    assert!(matches!(err, ArchiveError::Cancelled(Cancelled::Requested)));
    assert!(!temp.path().join("nvim-linux-x86_64").exists());
}

#[rstest]
#[case::parent_dir("../escape.txt")]
#[case::nested_parent("nvim/../../escape.txt")]
#[case::absolute("/etc/passwd")]
fn rejects_escaping_paths(#[case] bad_path: &str) {
    let result = validate_entry_path(Path::new(bad_path));
    assert!(
        matches!(result, Err(ArchiveError::PathTraversal { .. })),
        "expected PathTraversal for {bad_path}"
    );
}

#[test]
fn accepts_nested_relative_paths() {
    assert!(validate_entry_path(Path::new("nvim-macos-arm64/lib/nvim/parser/c.so")).is_ok());
}
