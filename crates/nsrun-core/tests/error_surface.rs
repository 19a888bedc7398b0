use nsrun_core::errors::{ErrorInfo, NsError, ABORT_EXIT_STATUS};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("file_root", "gauss_dgNone_001")
        .with_context("rank", "0")
}

#[test]
fn config_error_surface() {
    let err = NsError::Config(sample_info("empty_axis", "axis has no values"));
    assert_eq!(err.info().code, "empty_axis");
    assert!(err.info().context.contains_key("file_root"));
    assert_eq!(err.exit_status(), 1);
    assert!(!err.is_abort());
}

#[test]
fn sampler_error_surface() {
    let err = NsError::sampler("sampler_failed", "likelihood returned NaN");
    assert_eq!(err.info().code, "sampler_failed");
    assert!(err.to_string().starts_with("sampler error:"));
}

#[test]
fn coordination_errors_abort_the_batch() {
    let setup = NsError::Coordination(sample_info("setup_failed", "mkdir denied"));
    let aborted = NsError::Aborted(sample_info("global_abort", "rank 0 aborted"));
    assert!(setup.is_abort());
    assert!(aborted.is_abort());
    assert_eq!(setup.exit_status(), ABORT_EXIT_STATUS);
    assert_eq!(aborted.exit_status(), ABORT_EXIT_STATUS);
}

#[test]
fn display_includes_context_and_hint() {
    let err = NsError::Directory(
        ErrorInfo::new("mkdir", "permission denied")
            .with_context("path", "/chains")
            .with_hint("check base_dir"),
    );
    let rendered = err.to_string();
    assert!(rendered.contains("path=/chains"));
    assert!(rendered.contains("hint: check base_dir"));
}

#[test]
fn errors_roundtrip_through_json() {
    let err = NsError::Phase(sample_info("exploration_empty", "no dead points"));
    let json = serde_json::to_string(&err).expect("serialize");
    assert!(json.contains("\"family\":\"Phase\""));
    let back: NsError = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, err);
}

#[test]
fn dispatch_errors_are_not_aborts() {
    let err = NsError::Dispatch(ErrorInfo::new("thread_pool", "cannot spawn workers"));
    assert!(err.to_string().starts_with("dispatch error:"));
    assert!(!err.is_abort());
    assert_eq!(err.exit_status(), 1);
    let json = serde_json::to_string(&err).expect("serialize");
    assert!(json.contains("\"family\":\"Dispatch\""));
}
