use chrono::{Duration, Utc};
use htmlsift::selector::FieldDescriptor;
use htmlsift::storage::{Storage, Task, TaskRun};
use spectral::prelude::*;
use url::Url;

fn storage() -> Storage {
    Storage::new(":memory:").expect("in-memory database")
}

fn task(name: &str, selectors: Option<Vec<FieldDescriptor>>) -> Task {
    Task::new(
        name,
        Url::parse("https://example.com/releases").expect("valid url"),
        vec!["Title".to_owned(), "Price".to_owned()],
        selectors,
    )
}

fn run(task_id: &str, minutes_ago: i64, success: bool) -> TaskRun {
    TaskRun {
        task_id: task_id.to_owned(),
        ran_at: Utc::now() - Duration::minutes(minutes_ago),
        success,
        total: usize::from(success),
        error: (!success).then(|| "timeout".to_owned()),
        rows: "[]".to_owned(),
    }
}

#[test]
fn new_task_has_short_hex_id() {
    let task = task("Weekly releases", None);

    assert_that(&task.id.len()).is_equal_to(8);
    assert_that(&task.id.chars().all(|c| c.is_ascii_hexdigit())).is_true();
    assert_that(&task.enabled).is_true();
}

#[test]
fn same_name_gets_distinct_ids() {
    let ids: std::collections::HashSet<String> = (0..50)
        .map(|_| task("Weekly releases", None).id)
        .collect();

    assert_that(&ids.len()).is_equal_to(50);
}

#[test]
fn task_round_trips_through_database() {
    let storage = storage();
    let pinned = vec![
        FieldDescriptor::new("Title", "h2.title"),
        FieldDescriptor::new("Link", "a.more@href"),
    ];
    let original = task("Weekly releases", Some(pinned.clone()));
    storage.add_task(&original).expect("stored");

    let loaded = storage
        .get_task(&original.id)
        .expect("query")
        .expect("task present");

    assert_that(&loaded.name.as_str()).is_equal_to("Weekly releases");
    assert_that(&loaded.source_url.as_str()).is_equal_to("https://example.com/releases");
    assert_that(&loaded.fields).is_equal_to(original.fields.clone());
    assert_that(&loaded.selectors).is_equal_to(Some(pinned));
    assert_that(&loaded.created_at.timestamp()).is_equal_to(original.created_at.timestamp());
    assert_that(&loaded.enabled).is_true();
}

#[test]
fn unknown_task_is_none() {
    assert_that(&storage().get_task("deadbeef").expect("query")).is_none();
}

#[test]
fn list_enable_and_remove() {
    let storage = storage();
    let first = task("First", None);
    let second = task("Second", None);
    storage.add_task(&first).expect("stored");
    storage.add_task(&second).expect("stored");

    assert_that(&storage.list_tasks().expect("list")).has_length(2);

    assert_that(&storage.set_task_enabled(&first.id, false).expect("update")).is_true();
    let disabled = storage
        .get_task(&first.id)
        .expect("query")
        .expect("task present");
    assert_that(&disabled.enabled).is_false();
    assert_that(&storage.set_task_enabled("missing", true).expect("update")).is_false();

    assert_that(&storage.remove_task(&second.id).expect("remove")).is_true();
    assert_that(&storage.remove_task(&second.id).expect("remove")).is_false();
    let remaining: Vec<String> = storage
        .list_tasks()
        .expect("list")
        .into_iter()
        .map(|task| task.id)
        .collect();
    assert_that(&remaining).is_equal_to(vec![first.id.clone()]);
}

#[test]
fn history_is_newest_first_and_filterable() {
    let storage = storage();
    storage.record_run(&run("aaaa0000", 30, true)).expect("recorded");
    storage.record_run(&run("bbbb0000", 20, false)).expect("recorded");
    storage.record_run(&run("aaaa0000", 10, false)).expect("recorded");

    let all = storage.list_runs(None, 10).expect("history");
    let order: Vec<(&str, bool)> = all
        .iter()
        .map(|run| (run.task_id.as_str(), run.success))
        .collect();
    assert_that(&order).is_equal_to(vec![
        ("aaaa0000", false),
        ("bbbb0000", false),
        ("aaaa0000", true),
    ]);

    let only_a = storage.list_runs(Some("aaaa0000"), 10).expect("history");
    assert_that(&only_a).has_length(2);
    assert_that(&only_a.first().and_then(|run| run.error.clone()))
        .is_equal_to(Some("timeout".to_owned()));

    assert_that(&storage.list_runs(None, 1).expect("history")).has_length(1);
}

#[test]
fn removing_task_drops_its_history() {
    let storage = storage();
    let task = task("Gone soon", None);
    storage.add_task(&task).expect("stored");
    storage.record_run(&run(&task.id, 5, true)).expect("recorded");

    storage.remove_task(&task.id).expect("remove");

    assert_that(&storage.list_runs(Some(&task.id), 10).expect("history")).is_empty();
}
