use htmlsift::align::RowRecord;
use htmlsift::batch::{DocumentSource, extract_document, run_batch};
use htmlsift::export::{export_batch, export_extraction, export_rows};
use htmlsift::{Document, ExportFormat};
use htmlsift::selector::FieldDescriptor;
use spectral::prelude::*;

fn row(title: &str, price: &str) -> RowRecord {
    RowRecord::new(vec![
        ("Title".to_owned(), title.to_owned()),
        ("Price".to_owned(), price.to_owned()),
    ])
}

fn labels() -> Vec<String> {
    vec!["Title".to_owned(), "Price".to_owned()]
}

#[test]
fn rows_as_csv() {
    let rows = vec![row("A", "$1"), row("B, the second", "")];
    let csv = export_rows(&ExportFormat::Csv, &labels(), &rows).expect("csv");

    assert_that(&csv.as_str()).is_equal_to("Title,Price\nA,$1\n\"B, the second\",\n");
}

#[test]
fn rows_as_json_keep_field_order() {
    let rows = vec![row("A", "$1")];
    let json = export_rows(&ExportFormat::Json, &labels(), &rows).expect("json");
    let parsed: serde_json::Value = serde_json::from_str(&json).expect("valid json");

    assert_that(&parsed).is_equal_to(serde_json::json!([{ "Title": "A", "Price": "$1" }]));
    let title_at = json.find("Title").expect("title key");
    let price_at = json.find("Price").expect("price key");
    assert_that(&(title_at < price_at)).is_true();
}

#[test]
fn no_rows_is_header_only() {
    let csv = export_rows(&ExportFormat::Csv, &labels(), &[]).expect("csv");
    assert_that(&csv.as_str()).is_equal_to("Title,Price\n");
}

#[test]
fn batch_csv_marks_failed_documents() {
    let documents = vec![
        DocumentSource::loaded("a.html", "<h2>A</h2><b>$1</b>"),
        DocumentSource::failed("b.html", "timeout"),
    ];
    let fields = vec![
        FieldDescriptor::new("Title", "h2"),
        FieldDescriptor::new("Price", "b"),
    ];
    let csv = export_batch(&ExportFormat::Csv, &run_batch(&documents, &fields)).expect("csv");
    let lines: Vec<&str> = csv.lines().collect();

    assert_that(&lines).is_equal_to(vec![
        "source,Title,Price,error",
        "a.html,A,$1,",
        "b.html,,,ERROR: failed to load b.html: timeout",
    ]);
}

#[test]
fn batch_json_marks_field_errors() {
    let documents = vec![DocumentSource::loaded("a.html", "<h2>A</h2>")];
    let fields = vec![
        FieldDescriptor::new("Title", "h2"),
        FieldDescriptor::new("Broken", "h2["),
    ];
    let json = export_batch(&ExportFormat::Json, &run_batch(&documents, &fields)).expect("json");
    let parsed: serde_json::Value = serde_json::from_str(&json).expect("valid json");

    let record = parsed.get(0).expect("one record");
    assert_that(&record.get("source")).is_equal_to(Some(&serde_json::json!("a.html")));
    assert_that(&record.get("Title")).is_equal_to(Some(&serde_json::json!("A")));
    let error = record
        .get("error")
        .and_then(serde_json::Value::as_str)
        .expect("error column");
    assert_that(&error.starts_with("ERROR: Broken: invalid selector `h2[`")).is_true();
}

#[test]
fn batch_without_matches_has_no_lines() {
    let documents = vec![DocumentSource::loaded("a.html", "<p>nothing here</p>")];
    let fields = vec![FieldDescriptor::new("Title", "h2")];
    let csv = export_batch(&ExportFormat::Csv, &run_batch(&documents, &fields)).expect("csv");

    assert_that(&csv.as_str()).is_equal_to("source,Title,error\n");
}

#[test]
fn single_document_csv_marks_failed_fields() {
    let document = Document::parse("<h1>A</h1><h1>B</h1>");
    let fields = vec![
        FieldDescriptor::new("Broken", "div["),
        FieldDescriptor::new("Title", "h1"),
    ];
    let csv = export_extraction(&ExportFormat::Csv, &extract_document(&document, &fields))
        .expect("csv");

    let mut reader = csv::Reader::from_reader(csv.as_bytes());
    let header: Vec<String> = reader
        .headers()
        .expect("header")
        .iter()
        .map(str::to_owned)
        .collect();
    assert_that(&header).is_equal_to(vec![
        "Broken".to_owned(),
        "Title".to_owned(),
        "error".to_owned(),
    ]);

    let records: Vec<csv::StringRecord> = reader
        .records()
        .collect::<Result<_, _>>()
        .expect("records");
    assert_that(&records).has_length(2);
    for (record, title) in records.iter().zip(["A", "B"]) {
        assert_that(&record.get(0)).is_equal_to(Some(""));
        assert_that(&record.get(1)).is_equal_to(Some(title));
        let error = record.get(2).unwrap_or_default();
        assert_that(&error.starts_with("ERROR: Broken: ")).is_true();
    }
}

#[test]
fn single_document_json_marks_failed_fields() {
    let document = Document::parse("<p>no headings</p>");
    let fields = vec![
        FieldDescriptor::new("Title", "h1"),
        FieldDescriptor::new("Broken", "//p["),
    ];
    let json = export_extraction(&ExportFormat::Json, &extract_document(&document, &fields))
        .expect("json");
    let parsed: serde_json::Value = serde_json::from_str(&json).expect("valid json");

    let records = parsed.as_array().expect("array");
    assert_that(records).has_length(1);
    let record = records.first().expect("marker line");
    assert_that(&record.get("Title")).is_equal_to(Some(&serde_json::json!("")));
    let error = record
        .get("error")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    assert_that(&error.starts_with("ERROR: Broken: ")).is_true();
}

#[test]
fn single_document_without_errors_matches_plain_rows() {
    let document = Document::parse("<h2>A</h2><b>$1</b>");
    let fields = vec![
        FieldDescriptor::new("Title", "h2"),
        FieldDescriptor::new("Price", "b"),
    ];
    let extraction = extract_document(&document, &fields);

    for format in [ExportFormat::Csv, ExportFormat::Json] {
        let plain = export_rows(&format, &extraction.labels, &extraction.rows).expect("rows");
        assert_that(&export_extraction(&format, &extraction).expect("extraction"))
            .is_equal_to(plain);
    }
}

#[test]
fn fields_named_like_export_columns_are_renamed() {
    let documents = vec![DocumentSource::loaded(
        "a.html",
        r#"<span class="s">from-page</span>"#,
    )];
    let fields = vec![
        FieldDescriptor::new("source", "span.s"),
        FieldDescriptor::new("error", "span.s"),
    ];
    let batch = run_batch(&documents, &fields);

    let json = export_batch(&ExportFormat::Json, &batch).expect("json");
    let parsed: serde_json::Value = serde_json::from_str(&json).expect("valid json");
    assert_that(&parsed).is_equal_to(serde_json::json!([{
        "source": "a.html",
        "source (2)": "from-page",
        "error (2)": "from-page"
    }]));

    let csv = export_batch(&ExportFormat::Csv, &batch).expect("csv");
    assert_that(&csv.lines().next()).is_equal_to(Some("source,source (2),error (2),error"));
}

#[test]
fn format_names() {
    assert_that(&"JSON".parse::<ExportFormat>()).is_ok_containing(ExportFormat::Json);
    assert_that(&"xml".parse::<ExportFormat>()).is_err();
}
