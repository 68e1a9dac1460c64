//! Runs in its own process so the XDG override cannot leak into other tests.

#![cfg(target_os = "linux")]

use tempfile::tempdir;

#[test]
fn test_log_paths_do_not_create_data_dir() {
    let base = tempdir().unwrap();
    std::env::set_var("XDG_DATA_HOME", base.path());

    let input = gridwatch_paths::get_input_log_path().unwrap();
    let events = gridwatch_paths::get_event_log_path().unwrap();
    let data_dir = gridwatch_paths::data_dir_path().unwrap();

    assert_eq!(data_dir, base.path().join("gridwatch"));
    assert_eq!(input, data_dir.join("input.jsonl"));
    assert_eq!(events, data_dir.join("events.jsonl"));
    assert!(!data_dir.exists());

    // Creating is still available on request
    assert_eq!(gridwatch_paths::get_data_dir().unwrap(), data_dir);
    assert!(data_dir.is_dir());
}
