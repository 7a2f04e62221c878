use std::fmt::Write as _;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use datachat_ingest::IngestionError;
use datachat_ingest::ingestion::csv::{
    SampleOptions, TotalRows, count_rows, load_sample, load_sample_with, reader_builder, sample_from_reader,
};
use datachat_ingest::ingestion::sniff::{Delimiter, SniffResult, sniff};
use datachat_ingest::types::{DataType, Shape, ShapeSource, Value};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn write_numbered_csv(path: &Path, rows: usize) {
    let mut text = String::with_capacity(rows * 16);
    text.push_str("id,value,label\n");
    for i in 0..rows {
        writeln!(text, "{i},{},row{i}", i * 2).unwrap();
    }
    fs::write(path, text).unwrap();
}

#[test]
fn sales_fixture_fits_in_sample() {
    let path = fixture("sales.csv");
    let hints = sniff(&path, "csv").unwrap();
    let sample = load_sample(&path, &hints, 100).unwrap();

    assert_eq!(sample.sample_shape(), Shape::new(50, 3));
    assert_eq!(sample.total_shape(), Shape::new(50, 3));
    assert_eq!(sample.total, TotalRows::Counted(50));
    assert_eq!(sample.data.columns(), vec!["region", "product", "amount"]);
    assert_eq!(sample.data.schema.fields[0].data_type, DataType::Utf8);
    assert_eq!(sample.data.schema.fields[2].data_type, DataType::Float64);
    assert_eq!(sample.skipped_rows, 0);
}

#[test]
fn sample_is_capped_but_total_is_counted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.csv");
    write_numbered_csv(&path, 200_000);
    let hints = sniff(&path, "csv").unwrap();

    let options = SampleOptions {
        max_rows: 100,
        count_chunk_rows: 7_000,
    };
    let sample = load_sample_with(&path, &hints, &options).unwrap();

    assert_eq!(sample.sample_shape(), Shape::new(100, 3));
    assert_eq!(sample.total, TotalRows::Counted(200_000));
    assert_eq!(sample.total.source(), ShapeSource::Counted);
    assert_eq!(sample.total_shape(), Shape::new(200_000, 3));
    assert_eq!(sample.data.rows[0][0], Value::Int64(0));
    assert_eq!(sample.data.rows[99][2], Value::Utf8("row99".to_string()));
}

#[cfg(feature = "deep_tests")]
#[test]
fn ten_million_rows_count_without_loading() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("huge.csv");
    write_numbered_csv(&path, 10_000_000);
    let hints = sniff(&path, "csv").unwrap();

    let sample = load_sample(&path, &hints, 100).unwrap();
    assert_eq!(sample.sample_shape(), Shape::new(100, 3));
    assert_eq!(sample.total, TotalRows::Counted(10_000_000));
}

#[test]
fn malformed_line_is_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.csv");
    let mut text = String::from("a,b,c\n");
    for i in 0..1_000 {
        if i == 500 {
            text.push_str("x,y,z,extra,fields\n");
        }
        writeln!(text, "{i},{i},{i}").unwrap();
    }
    fs::write(&path, text).unwrap();
    let hints = sniff(&path, "csv").unwrap();

    let sample = load_sample(&path, &hints, 5_000).unwrap();
    assert_eq!(sample.sample_shape(), Shape::new(1_000, 3));
    assert_eq!(sample.skipped_rows, 1);
    assert_eq!(sample.total, TotalRows::Counted(1_000));
    assert_eq!(sample.data.schema.fields[0].data_type, DataType::Int64);
}

fn csv_with_line_before(rows: usize, at: usize, line: &str) -> String {
    let mut text = String::from("a,b,c\n");
    for i in 0..rows {
        if i == at {
            text.push_str(line);
        }
        writeln!(text, "{i},{i},{i}").unwrap();
    }
    text
}

#[test]
fn unbalanced_quote_skips_only_its_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runaway.csv");
    fs::write(&path, csv_with_line_before(1_000, 500, "x,\"broken,z\n")).unwrap();
    let hints = sniff(&path, "csv").unwrap();

    let sample = load_sample(&path, &hints, 5_000).unwrap();
    assert_eq!(sample.sample_shape(), Shape::new(1_000, 3));
    assert_eq!(sample.skipped_rows, 1);
    assert_eq!(sample.total, TotalRows::Counted(1_000));
    assert_eq!(sample.data.rows[500], vec![Value::Int64(500); 3]);
    assert_eq!(sample.data.schema.fields[0].data_type, DataType::Int64);
    assert_eq!(count_rows(&path, &hints, 64).unwrap(), 1_000);
}

#[test]
fn unbalanced_quote_in_last_column_skips_only_its_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runaway_tail.csv");
    fs::write(&path, csv_with_line_before(300, 150, "x,y,\"z\n")).unwrap();
    let hints = sniff(&path, "csv").unwrap();

    let sample = load_sample(&path, &hints, 100).unwrap();
    assert_eq!(sample.sample_shape(), Shape::new(100, 3));
    assert_eq!(sample.total, TotalRows::Counted(300));
}

#[test]
fn quoted_multiline_cells_are_not_malformed() {
    let input = "id,note\n1,\"first\nsecond\"\n2,plain\n";
    let mut rdr = reader_builder(Delimiter::COMMA).from_reader(Cursor::new(input.as_bytes()));
    let (data, skipped) = sample_from_reader(&mut rdr, encoding_rs::UTF_8, 10).unwrap();
    assert_eq!(skipped, 0);
    assert_eq!(data.rows[0][1], Value::Utf8("first\nsecond".to_string()));
    assert_eq!(data.rows[1][1], Value::Utf8("plain".to_string()));
}

#[test]
fn short_rows_are_padded_with_nulls() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.csv");
    fs::write(&path, "a,b,c\n1,2,3\n4\n").unwrap();
    let hints = sniff(&path, "csv").unwrap();

    let sample = load_sample(&path, &hints, 10).unwrap();
    assert_eq!(sample.sample_shape(), Shape::new(2, 3));
    assert_eq!(sample.data.rows[1], vec![Value::Int64(4), Value::Null, Value::Null]);
}

#[test]
fn tsv_types_and_nulls() {
    let path = fixture("people.tsv");
    let hints = sniff(&path, "tsv").unwrap();
    let sample = load_sample(&path, &hints, 100).unwrap();

    let types: Vec<DataType> = sample.data.schema.fields.iter().map(|f| f.data_type).collect();
    assert_eq!(
        types,
        vec![DataType::Int64, DataType::Utf8, DataType::Float64, DataType::Bool]
    );
    assert_eq!(sample.data.rows[2][2], Value::Null);
    assert_eq!(sample.data.rows[2][3], Value::Bool(true));

    let profile = sample.data.column_profiles();
    assert_eq!(profile[2].column, "score");
    assert_eq!(profile[2].null_count, 1);
    assert_eq!(profile[2].null_ratio, 33.33);
}

#[test]
fn header_only_file_is_empty_result() {
    let path = fixture("header_only.csv");
    let hints = sniff(&path, "csv").unwrap();
    let err = load_sample(&path, &hints, 100).unwrap_err();
    assert!(matches!(err, IngestionError::EmptyResult { .. }), "{err:?}");
}

#[test]
fn empty_file_has_no_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.csv");
    fs::write(&path, b"").unwrap();
    let hints = sniff(&path, "csv").unwrap();

    let err = load_sample(&path, &hints, 100).unwrap_err();
    match err {
        IngestionError::LoadFailed { message } => assert!(message.contains("no columns")),
        other => panic!("expected LoadFailed, got {other:?}"),
    }
}

#[test]
fn missing_file_is_file_missing() {
    let hints = SniffResult {
        filetype: datachat_ingest::ingestion::sniff::FileType::DelimitedText,
        encoding: "utf-8".to_string(),
        delimiter: Delimiter::COMMA,
        ext: datachat_ingest::ingestion::sniff::SourceExtension::Csv,
    };
    let err = load_sample("/definitely/not/here.csv", &hints, 100).unwrap_err();
    assert!(matches!(err, IngestionError::FileMissing { .. }), "{err:?}");

    let err = count_rows(Path::new("/definitely/not/here.csv"), &hints, 10).unwrap_err();
    assert!(matches!(err, IngestionError::TotalCountFailed { .. }), "{err:?}");
}

#[test]
fn legacy_encoding_is_decoded_per_field() {
    let text = "stadt;wert\nMünchen;1\nKöln;2\nDüsseldorf;3\n";
    let (bytes, _, _) = encoding_rs::WINDOWS_1252.encode(text);

    let mut rdr = reader_builder(Delimiter::SEMICOLON).from_reader(Cursor::new(&bytes[..]));
    let (data, skipped) = sample_from_reader(&mut rdr, encoding_rs::WINDOWS_1252, 10).unwrap();
    assert_eq!(skipped, 0);
    assert_eq!(data.columns(), vec!["stadt", "wert"]);
    assert_eq!(data.rows[0][0], Value::Utf8("München".to_string()));
    assert_eq!(data.rows[2][0], Value::Utf8("Düsseldorf".to_string()));
}

#[test]
fn shift_jis_with_comma_keeps_trail_bytes_intact() {
    // "ポ" ends in a 0x7C trail byte in Shift_JIS.
    let text = "商品,数量\nポンプ,1\nソース,2\n";
    let (bytes, _, _) = encoding_rs::SHIFT_JIS.encode(text);
    assert!(bytes.contains(&b'|'));

    let mut rdr = reader_builder(Delimiter::COMMA).from_reader(Cursor::new(&bytes[..]));
    let (data, skipped) = sample_from_reader(&mut rdr, encoding_rs::SHIFT_JIS, 10).unwrap();
    assert_eq!(skipped, 0);
    assert_eq!(data.columns(), vec!["商品", "数量"]);
    assert_eq!(data.rows[0][0], Value::Utf8("ポンプ".to_string()));
    assert_eq!(data.rows[1][1], Value::Int64(2));
}

#[test]
fn blank_and_duplicate_headers_are_named() {
    let input = "id,,id\n1,2,3\n";
    let mut rdr = reader_builder(Delimiter::COMMA).from_reader(Cursor::new(input.as_bytes()));
    let (data, _) = sample_from_reader(&mut rdr, encoding_rs::UTF_8, 10).unwrap();
    assert_eq!(data.columns(), vec!["id", "Unnamed: 1", "id.1"]);
}

#[test]
fn bom_is_not_part_of_first_header() {
    let input = "\u{feff}name,age\nada,36\n";
    let mut rdr = reader_builder(Delimiter::COMMA).from_reader(Cursor::new(input.as_bytes()));
    let (data, _) = sample_from_reader(&mut rdr, encoding_rs::UTF_8, 10).unwrap();
    assert_eq!(data.columns(), vec!["name", "age"]);
}

#[test]
fn names_and_text_cells_keep_surrounding_spaces() {
    let input = "a, b,c\n 1, x,\n2 ,y , \n";
    let mut rdr = reader_builder(Delimiter::COMMA).from_reader(Cursor::new(input.as_bytes()));
    let (data, _) = sample_from_reader(&mut rdr, encoding_rs::UTF_8, 10).unwrap();

    assert_eq!(data.columns(), vec!["a", " b", "c"]);
    assert_eq!(data.schema.fields[0].data_type, DataType::Int64);
    assert_eq!(data.rows[0][0], Value::Int64(1));
    assert_eq!(data.rows[1][0], Value::Int64(2));
    assert_eq!(data.rows[0][1], Value::Utf8(" x".to_string()));
    assert_eq!(data.rows[1][1], Value::Utf8("y ".to_string()));
    assert_eq!(data.rows[1][2], Value::Null);
}
