use nsrun_core::errors::{ErrorInfo, NsError};

pub mod plan;
pub mod run;
pub mod summarize;

pub(crate) fn io_error(code: &str, err: impl ToString) -> NsError {
    NsError::Serde(ErrorInfo::new(code, err.to_string()))
}
