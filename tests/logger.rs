use std::{
    fs,
    time::{Duration, SystemTime},
};

use safecache::{
    logger::{self, LogConfig, LogLevel},
    CacheError,
};

const MARKER: &str = "logger integration marker line";

// The global subscriber can be installed once per process, so every check
// that depends on it lives in this single test.
#[test]
fn test_init_writes_dated_file_and_refuses_second_install() {
    std::env::remove_var("RUST_LOG");

    let dir = tempfile::tempdir().unwrap();
    let stale = dir.path().join("default.2000-01-01.log");
    fs::write(&stale, b"old").unwrap();
    fs::File::options()
        .write(true)
        .open(&stale)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(3 * 24 * 60 * 60))
        .unwrap();

    let config = LogConfig {
        path: dir.path().to_path_buf(),
        level: LogLevel::Debug,
        ..LogConfig::default()
    };
    let guard = logger::init(&config).unwrap();
    tracing::info!("{MARKER}");
    drop(guard);

    assert!(!stale.exists());

    let logs: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            let name = p.file_name().unwrap().to_string_lossy().into_owned();
            let parts: Vec<&str> = name.split('.').collect();
            parts.len() == 3 && parts[0] == "default" && parts[1].len() == 10 && parts[2] == "log"
        })
        .collect();
    assert_eq!(logs.len(), 1);
    let contents = fs::read_to_string(&logs[0]).unwrap();
    assert!(contents.contains(MARKER));

    let other = tempfile::tempdir().unwrap();
    let second = logger::init(&LogConfig {
        path: other.path().to_path_buf(),
        ..LogConfig::default()
    });
    assert!(matches!(second.err(), Some(CacheError::LoggerInstall(_))));
}
