use std::fs::{self, File};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use datachat_ingest::IngestionError;
use datachat_ingest::ids::DatasetId;
use datachat_ingest::ingestion::sniff::{Delimiter, FileType, SniffResult, SourceExtension};
use datachat_ingest::storage::MetadataStore;
use datachat_ingest::types::{DatasetMetadata, Shape, ShapeSource};

fn metadata(columns: &[&str], rows: u64) -> DatasetMetadata {
    DatasetMetadata {
        sniff: SniffResult {
            filetype: FileType::DelimitedText,
            encoding: "utf-8".to_string(),
            delimiter: Delimiter::COMMA,
            ext: SourceExtension::Csv,
        },
        shape_sample: Shape::new(rows.min(100), columns.len() as u64),
        shape_total: Some(Shape::new(rows, columns.len() as u64)),
        shape_total_source: ShapeSource::Counted,
        columns: columns.iter().map(|c| c.to_string()).collect(),
        ext: SourceExtension::Csv,
        raw_path: PathBuf::from("/data/uploads/x/raw.csv"),
    }
}

fn id(raw: &str) -> DatasetId {
    DatasetId::parse(raw).unwrap()
}

fn set_mtime(path: &std::path::Path, t: SystemTime) {
    File::options().write(true).open(path).unwrap().set_modified(t).unwrap();
}

#[test]
fn write_then_read_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = MetadataStore::new(dir.path().join("meta"));
    let meta = metadata(&["region", "product", "amount"], 50);

    let path = store.write(&id("aaaa000011112222"), &meta).unwrap();
    assert_eq!(path, dir.path().join("meta").join("aaaa000011112222.json"));
    assert_eq!(store.read(&id("aaaa000011112222")).unwrap(), Some(meta));
}

#[test]
fn read_of_unknown_id_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = MetadataStore::new(dir.path());
    assert_eq!(store.read(&id("0123456789abcdef")).unwrap(), None);
}

#[test]
fn corrupt_record_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = MetadataStore::new(dir.path());
    fs::write(dir.path().join("deadbeefdeadbeef.json"), "{ not json").unwrap();

    let err = store.read(&id("deadbeefdeadbeef")).unwrap_err();
    assert!(matches!(err, IngestionError::Json(_)), "{err:?}");
}

#[test]
fn rewrite_replaces_record_and_leaves_no_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = MetadataStore::new(dir.path());
    let key = id("1111222233334444");
    store.write(&key, &metadata(&["a"], 1)).unwrap();
    store.write(&key, &metadata(&["a", "b"], 2)).unwrap();

    assert_eq!(store.read(&key).unwrap().unwrap().columns, vec!["a", "b"]);
    let names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["1111222233334444.json"]);
}

#[test]
fn find_most_recent_on_empty_or_missing_root_is_none() {
    let dir = tempfile::tempdir().unwrap();
    assert!(MetadataStore::new(dir.path()).find_most_recent().unwrap().is_none());
    assert!(
        MetadataStore::new(dir.path().join("never-created"))
            .find_most_recent()
            .unwrap()
            .is_none()
    );
}

#[test]
fn find_most_recent_picks_latest_modification_time() {
    let dir = tempfile::tempdir().unwrap();
    let store = MetadataStore::new(dir.path());
    let base = SystemTime::now() - Duration::from_secs(3_600);

    let ids = ["cccc000000000000", "aaaa000000000000", "bbbb000000000000"];
    for (offset, raw) in ids.into_iter().enumerate() {
        let path = store.write(&id(raw), &metadata(&[raw], offset as u64 + 1)).unwrap();
        set_mtime(&path, base + Duration::from_secs(60 * offset as u64));
    }

    let (latest, meta) = store.find_most_recent().unwrap().unwrap();
    assert_eq!(latest, id("bbbb000000000000"));
    assert_eq!(meta.columns, vec!["bbbb000000000000"]);

    // Touching an older record makes it the latest.
    set_mtime(&store.record_path(&id("cccc000000000000")), SystemTime::now());
    let (latest, _) = store.find_most_recent().unwrap().unwrap();
    assert_eq!(latest, id("cccc000000000000"));
}

#[test]
fn unrelated_files_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let store = MetadataStore::new(dir.path());
    fs::write(dir.path().join("notes.txt"), "hello").unwrap();
    fs::write(dir.path().join(".tmp.json.tmp"), "{}").unwrap();
    fs::write(dir.path().join("bad name.json"), "{}").unwrap();

    assert!(store.find_most_recent().unwrap().is_none());
    assert!(store.ids().unwrap().is_empty());
}

#[test]
fn non_ascii_is_written_unescaped() {
    let dir = tempfile::tempdir().unwrap();
    let store = MetadataStore::new(dir.path());
    let path = store.write(&id("00000000cafebabe"), &metadata(&["지역", "매출", "Zürich"], 3)).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"지역\""), "{text}");
    assert!(text.contains("Zürich"));
    assert!(!text.contains("\\u"));
    assert!(text.contains("\n  \"sniff\""), "expected 2-space indentation: {text}");
}

#[test]
fn record_layout_uses_stable_field_names() {
    let dir = tempfile::tempdir().unwrap();
    let store = MetadataStore::new(dir.path());
    let path = store.write(&id("feedface00000000"), &metadata(&["a", "b", "c"], 50)).unwrap();

    let v: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(v["sniff"]["filetype"], "csv");
    assert_eq!(v["sniff"]["encoding"], "utf-8");
    assert_eq!(v["sniff"]["delimiter"], ",");
    assert_eq!(v["sniff"]["ext"], "csv");
    assert_eq!(v["shape_sample"], serde_json::json!([50, 3]));
    assert_eq!(v["shape_total"], serde_json::json!([50, 3]));
    assert_eq!(v["shape_total_source"], "counted");
    assert_eq!(v["columns"], serde_json::json!(["a", "b", "c"]));
    assert_eq!(v["ext"], "csv");
    assert_eq!(v["raw_path"], "/data/uploads/x/raw.csv");
}

#[test]
fn older_records_without_total_source_still_load() {
    let dir = tempfile::tempdir().unwrap();
    let store = MetadataStore::new(dir.path());
    let record = r#"{
  "sniff": {"filetype": "csv", "encoding": "euc-kr", "delimiter": "\t", "ext": "tsv"},
  "shape_sample": [100, 4],
  "shape_total": null,
  "columns": ["a", "b", "c", "d"],
  "ext": "tsv",
  "raw_path": "/srv/uploads/abc/raw.tsv"
}"#;
    fs::write(dir.path().join("0000000000000abc.json"), record).unwrap();

    let meta = store.read(&id("0000000000000abc")).unwrap().unwrap();
    assert_eq!(meta.shape_total, None);
    assert_eq!(meta.shape_total_source, ShapeSource::Counted);
    assert_eq!(meta.sniff.delimiter, Delimiter::TAB);
    assert_eq!(meta.sniff.resolved_encoding(), encoding_rs::EUC_KR);
}

#[test]
fn clear_removes_every_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = MetadataStore::new(dir.path().join("meta"));
    store.write(&id("aaaa"), &metadata(&["a"], 1)).unwrap();
    store.write(&id("bbbb"), &metadata(&["a"], 1)).unwrap();
    assert_eq!(store.ids().unwrap().len(), 2);

    store.clear().unwrap();
    assert!(store.ids().unwrap().is_empty());
    assert!(store.root().is_dir());
}

#[test]
fn failed_write_leaves_no_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = MetadataStore::new(dir.path());
    let key = id("5555666677778888");
    // A directory squatting on the record path makes the final rename fail.
    fs::create_dir(store.record_path(&key)).unwrap();
    fs::write(store.record_path(&key).join("keep"), "x").unwrap();

    assert!(store.write(&key, &metadata(&["a"], 1)).is_err());
    assert!(!dir.path().join(".5555666677778888.json.tmp").exists());
}

#[test]
fn estimated_total_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = MetadataStore::new(dir.path());
    let key = id("eeee000000000001");
    let mut meta = metadata(&["a", "b"], 100);
    meta.shape_total_source = ShapeSource::Estimated;

    let path = store.write(&key, &meta).unwrap();
    let v: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(v["shape_total_source"], "estimated");
    assert_eq!(store.read(&key).unwrap(), Some(meta));
}
