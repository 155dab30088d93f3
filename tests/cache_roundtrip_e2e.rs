use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::tempdir;
use wordvec::core::format::{FormatError, HEADER_SIZE};
use wordvec::core::parse::ParseError;
use wordvec::core::store::CacheSet;
use wordvec::{CachePaths, LookupStrategy, TableError, TableOptions, VectorTable};

fn write_source(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).expect("write source");
    path
}

fn sample_text() -> String {
    let mut text = String::new();
    for i in 0..250 {
        text.push_str(&format!("tok{} {} {} {}\n", i, i as f32, i as f32 * 0.5, -(i as f32)));
    }
    text.push_str("naïve 0.1 0.2 0.3\n");
    text.push_str("日本 0.4 0.5 0.6\n");
    text.push_str("a\u{a0}b 0.7 0.8 0.9\n");
    text
}

#[test]
fn test_build_persist_reload_matches() {
    let dir = tempdir().expect("tempdir");
    let source = write_source(dir.path(), "sample.txt", &sample_text());
    let options = TableOptions::default().with_cache_dir(dir.path().join("cache"));

    let built = VectorTable::open(&source, &options).expect("build");
    assert!(!built.is_mapped());
    assert_eq!(built.len(), 253);
    assert_eq!(built.dim(), 3);

    let loaded = VectorTable::open(&source, &options).expect("load");
    assert!(loaded.is_mapped());
    assert_eq!(loaded.len(), built.len());
    assert_eq!(loaded.index().buckets(), built.index().buckets());
    assert_eq!(loaded.keys().collect::<Vec<_>>(), built.keys().collect::<Vec<_>>());

    for key in built.keys() {
        let hit = loaded.lookup(&key);
        assert!(matches!(hit, Cow::Borrowed(_)), "{:?} should be a stored row", key);
        assert_eq!(hit, built.lookup(&key));
    }
    assert_eq!(&*loaded.lookup("日本"), &[0.4, 0.5, 0.6]);
    assert_eq!(&*loaded.lookup("a\u{a0}b"), &[0.7, 0.8, 0.9]);
    assert_eq!(&*loaded.lookup("missing"), &[0.0, 0.0, 0.0]);
}

#[test]
fn test_cache_payloads_are_reproducible() {
    let dir = tempdir().expect("tempdir");
    let source = write_source(dir.path(), "repro.txt", &sample_text());

    let first = TableOptions::default().with_cache_dir(dir.path().join("one"));
    let second = TableOptions::default().with_cache_dir(dir.path().join("two"));
    VectorTable::build(&source, &first).expect("first build");
    VectorTable::build(&source, &second).expect("second build");

    let a = first.cache_paths(&source).expect("paths");
    let b = second.cache_paths(&source).expect("paths");
    for (x, y) in [(&a.vectors, &b.vectors), (&a.keys, &b.keys), (&a.table, &b.table)] {
        let x = fs::read(x).expect("read");
        let y = fs::read(y).expect("read");
        // Build ids differ; rows, cols and payload do not
        assert_eq!(x[..16], y[..16]);
        assert_eq!(x[24..], y[24..]);
    }
}

#[test]
fn test_torn_cache_is_rebuilt() {
    let dir = tempdir().expect("tempdir");
    let source = write_source(dir.path(), "torn.txt", "x 1 2\ny 3 4\nz 5 6\n");
    let cache = dir.path().join("cache");
    let options = TableOptions::default().with_cache_dir(&cache);
    VectorTable::build(&source, &options).expect("build");
    let paths = options.cache_paths(&source).expect("paths");

    // A .table from a different build, as if a writer died between renames
    let other = TableOptions::default().with_cache_dir(dir.path().join("other"));
    VectorTable::build(&source, &other).expect("second build");
    fs::copy(&other.cache_paths(&source).expect("paths").table, &paths.table).expect("copy");

    assert!(matches!(
        CacheSet::open(&paths),
        Err(FormatError::BuildIdMismatch { .. })
    ));

    let table = VectorTable::open(&source, &options).expect("rebuild");
    assert!(!table.is_mapped());
    assert_eq!(&*table.lookup("z"), &[5.0, 6.0]);

    let reloaded = VectorTable::open(&source, &options).expect("reload");
    assert!(reloaded.is_mapped());
    assert_eq!(reloaded.build_id(), table.build_id());
}

#[test]
fn test_shrunk_cols_header_is_rebuilt() {
    let dir = tempdir().expect("tempdir");
    let source = write_source(dir.path(), "cols.txt", "a 1 2\nb 3 4\n");
    let options = TableOptions::default().with_cache_dir(dir.path().join("cache"));

    for (section, cols) in [(0usize, 1u64), (1, 0), (2, 0)] {
        VectorTable::build(&source, &options).expect("build");
        let paths = options.cache_paths(&source).expect("paths");
        let target = [&paths.vectors, &paths.keys, &paths.table][section];
        let mut bytes = fs::read(target).expect("read");
        bytes[32..40].copy_from_slice(&cols.to_le_bytes());
        fs::write(target, bytes).expect("rewrite header");

        assert!(CacheSet::open(&paths).is_err(), "section {} accepted", section);

        let table = VectorTable::open(&source, &options).expect("rebuild");
        assert!(!table.is_mapped());
        assert_eq!(table.dim(), 2);
        assert_eq!(&*table.lookup("b"), &[3.0, 4.0]);

        let reloaded = VectorTable::open(&source, &options).expect("reload");
        assert!(reloaded.is_mapped());
        assert_eq!(&*reloaded.lookup("a"), &[1.0, 2.0]);
    }
}

#[test]
fn test_truncated_vectors_file_is_rebuilt() {
    let dir = tempdir().expect("tempdir");
    let source = write_source(dir.path(), "short.txt", "x 1 2\ny 3 4\n");
    let options = TableOptions::default().with_cache_dir(dir.path().join("cache"));
    VectorTable::build(&source, &options).expect("build");

    let paths = options.cache_paths(&source).expect("paths");
    let bytes = fs::read(&paths.vectors).expect("read");
    fs::write(&paths.vectors, &bytes[..HEADER_SIZE + 4]).expect("truncate");

    assert!(matches!(
        CacheSet::open(&paths),
        Err(FormatError::Truncated { .. })
    ));
    let table = VectorTable::open(&source, &options).expect("rebuild");
    assert_eq!(&*table.lookup("y"), &[3.0, 4.0]);
}

#[test]
fn test_orphan_cache_file_alone_is_ignored() {
    let dir = tempdir().expect("tempdir");
    let cache = dir.path().join("cache");
    fs::create_dir_all(&cache).expect("mkdir");
    let paths = CachePaths::for_source(Path::new("lonely.txt"), &cache);
    fs::write(&paths.vectors, b"not a cache file").expect("write");

    let options = TableOptions::default().with_cache_dir(&cache);
    assert!(matches!(
        VectorTable::open("lonely.txt", &options),
        Err(TableError::SourceNotFound(_))
    ));
}

#[test]
fn test_two_keys_two_dims() {
    let dir = tempdir().expect("tempdir");
    let source = write_source(dir.path(), "pets.txt", "cat 1.0 2.0\ndog 3.0 4.0\n");
    let table = VectorTable::open(&source, &TableOptions::default().with_cache_dir(dir.path())).expect("open");

    assert_eq!(table.len(), 2);
    assert_eq!(table.dim(), 2);
    assert_eq!(&*table.lookup("cat"), &[1.0, 2.0]);
    assert_eq!(&*table.lookup("fish"), &[0.0, 0.0]);
}

#[test]
fn test_long_key_is_dropped() {
    let dir = tempdir().expect("tempdir");
    let long = "x".repeat(101);
    let limit = "y".repeat(100);
    let source = write_source(
        dir.path(),
        "long.txt",
        &format!("{} 1 1\n{} 2 2\nok 3 3\n", long, limit),
    );
    let table = VectorTable::open(&source, &TableOptions::default().without_cache()).expect("open");

    assert_eq!(table.len(), 2);
    assert!(!table.contains(&long));
    assert!(table.contains(&limit));
    assert_eq!(&*table.lookup(&long), &[0.0, 0.0]);
}

#[test]
fn test_single_component_after_dimension_is_fatal() {
    let dir = tempdir().expect("tempdir");
    let source = write_source(dir.path(), "bad.txt", "cat 1.0 2.0\nbadtoken 5.0\n");
    let result = VectorTable::open(&source, &TableOptions::default().with_cache_dir(dir.path().join("cache")));

    assert!(matches!(
        result,
        Err(TableError::Parse(ParseError::DimensionMismatch {
            line: 2,
            expected: 2,
            actual: 1,
            ..
        }))
    ));
    // A failed build leaves no cache behind
    assert!(!dir.path().join("cache").join("bad.txt.vectors").exists());
}

#[test]
fn test_header_line_is_skipped() {
    let dir = tempdir().expect("tempdir");
    let source = write_source(dir.path(), "fasttext.vec", "2 3\nthe 0.1 0.2 0.3\nof 0.4 0.5 0.6\n");
    let table = VectorTable::open(&source, &TableOptions::default().without_cache()).expect("open");

    assert_eq!(table.len(), 2);
    assert_eq!(table.dim(), 3);
    assert!(!table.contains("2"));
}

#[test]
fn test_non_utf8_keys_are_skipped() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("latin1.txt");
    let mut bytes = b"caf\xe9 1 2\n".to_vec();
    bytes.extend_from_slice(b"tea 3 4\n");
    fs::write(&path, &bytes).expect("write");

    let table = VectorTable::open(&path, &TableOptions::default().with_cache_dir(dir.path().join("cache")))
        .expect("open");
    assert_eq!(table.len(), 1);
    assert_eq!(&*table.lookup("tea"), &[3.0, 4.0]);
}

#[test]
fn test_charngram_table_round_trip() {
    let dir = tempdir().expect("tempdir");
    let source = write_source(
        dir.path(),
        "charNgram.txt",
        "2gram-#BEGIN#o 1 0\n2gram-ok 0 1\n2gram-k#END# 1 1\nok 9 9\n",
    );
    let options = TableOptions::default()
        .with_cache_dir(dir.path().join("cache"))
        .with_strategy(LookupStrategy::CharNGram);

    VectorTable::open(&source, &options).expect("build");
    let table = VectorTable::open(&source, &options).expect("load");
    assert!(table.is_mapped());

    assert_eq!(&*table.lookup("ok"), &[9.0, 9.0]);
    assert_eq!(&*table.lookup("<unk>"), &[0.0, 0.0]);
    // "ko" shares no windows with the stored grams
    assert_eq!(&*table.lookup("ko"), &[0.0, 0.0]);
    // "o" -> 2gram-#BEGIN#o and nothing else
    assert_eq!(&*table.lookup("o"), &[1.0, 0.0]);
}
