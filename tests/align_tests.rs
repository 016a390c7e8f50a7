use htmlsift::align::{FieldValues, RowRecord, align_rows, column_labels};
use spectral::prelude::*;

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_owned()).collect()
}

#[test]
fn short_fields_are_padded() {
    let field_values: FieldValues = vec![
        ("Title", strings(&["A", "B"])),
        ("Price", strings(&["$1"])),
    ]
    .into_iter()
    .collect();

    let rows = align_rows(&field_values);

    assert_that(&rows).is_equal_to(vec![
        RowRecord::new(vec![
            ("Title".to_owned(), "A".to_owned()),
            ("Price".to_owned(), "$1".to_owned()),
        ]),
        RowRecord::new(vec![
            ("Title".to_owned(), "B".to_owned()),
            ("Price".to_owned(), String::new()),
        ]),
    ]);
}

#[test]
fn row_count_is_longest_field() {
    let field_values: FieldValues = vec![
        ("A", strings(&["1"])),
        ("B", strings(&["1", "2", "3", "4"])),
        ("C", Vec::new()),
    ]
    .into_iter()
    .collect();

    let rows = align_rows(&field_values);

    assert_that(&rows).has_length(4);
    for row in &rows {
        assert_that(&row.labels().collect::<Vec<_>>()).is_equal_to(vec!["A", "B", "C"]);
    }
}

#[test]
fn no_fields_no_rows() {
    assert_that(&align_rows(&FieldValues::new())).is_empty();
}

#[test]
fn fields_without_values_give_no_rows() {
    let field_values: FieldValues = vec![("A", Vec::new()), ("B", Vec::new())]
        .into_iter()
        .collect();
    assert_that(&align_rows(&field_values)).is_empty();
}

#[test]
fn reinserting_label_keeps_position() {
    let mut field_values = FieldValues::new();
    field_values.insert("First", strings(&["1"]));
    field_values.insert("Second", strings(&["2"]));
    field_values.insert("First", strings(&["one", "uno"]));

    assert_that(&field_values.labels().collect::<Vec<_>>()).is_equal_to(vec!["First", "Second"]);
    assert_that(&field_values.max_len()).is_equal_to(2);
}

#[test]
fn repeated_labels_are_numbered() {
    assert_that(&column_labels(["Name", "Price", "Name", "Name"])).is_equal_to(strings(&[
        "Name",
        "Price",
        "Name (2)",
        "Name (3)",
    ]));
}

#[test]
fn export_column_names_are_not_reused() {
    assert_that(&column_labels(["source", "Title", "error", "source"])).is_equal_to(strings(&[
        "source (2)",
        "Title",
        "error (2)",
        "source (3)",
    ]));
}

#[test]
fn row_json_starts_with_source() {
    let row = RowRecord::new(vec![
        ("Title".to_owned(), "A".to_owned()),
        ("Price".to_owned(), "$1".to_owned()),
    ])
    .with_source("page.html");

    let json = serde_json::to_string(&row).expect("serializable");
    assert_that(&json.as_str())
        .is_equal_to(r#"{"source":"page.html","Title":"A","Price":"$1"}"#);
}
