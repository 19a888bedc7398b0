use std::fs;
use std::sync::Arc;
use std::thread;

use nsrun_sched::{create_dir_tolerant, OutputAreaInitializer};

#[test]
fn concurrent_callers_create_once() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let base = temp.path().join("chains");
    let initializer = Arc::new(OutputAreaInitializer::new(&base, true));
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let initializer = Arc::clone(&initializer);
            thread::spawn(move || initializer.ensure())
        })
        .collect();
    for handle in handles {
        let area = handle.join().expect("join").expect("no error");
        assert_eq!(area.directories.len(), 2);
    }
    assert_eq!(initializer.creations(), 1);
    assert!(base.is_dir());
    assert!(base.join("clusters").is_dir());
}

#[test]
fn independent_initializers_tolerate_races() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let base = temp.path().join("shared").join("chains");
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let base = base.clone();
            thread::spawn(move || OutputAreaInitializer::new(base, false).ensure())
        })
        .collect();
    for handle in handles {
        assert!(handle.join().expect("join").is_ok());
    }
    assert!(!base.join("clusters").exists());
}

#[test]
fn existing_directory_is_not_an_error() {
    let temp = tempfile::tempdir().expect("tmp dir");
    assert!(!create_dir_tolerant(temp.path()).expect("exists"));
    let nested = temp.path().join("a");
    assert!(create_dir_tolerant(&nested).expect("created"));
    assert!(!create_dir_tolerant(&nested).expect("second call"));
}

#[test]
fn blocked_path_is_a_directory_error() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let blocker = temp.path().join("chains");
    fs::write(&blocker, b"not a directory").expect("write blocker");
    let initializer = OutputAreaInitializer::new(&blocker, false);
    let err = initializer.ensure().expect_err("blocked");
    assert_eq!(err.info().code, "output_dir_create");
    assert!(matches!(err, nsrun_core::NsError::Directory(_)));
    // the failed outcome is cached
    assert!(initializer.ensure().is_err());
    assert_eq!(initializer.creations(), 1);
}
