use nsrun_core::errors::{NsError, ABORT_EXIT_STATUS};
use serde::{de::DeserializeOwned, Serialize};

use crate::context::ExecutionContext;
use crate::serde::{from_json_slice, to_canonical_json_bytes};

/// Runs one-time setup on the coordinating rank and turns its failure into a
/// global abort instead of leaving the other ranks blocked.
#[derive(Debug)]
pub struct FailureCoordinator<'a> {
    ctx: &'a ExecutionContext,
}

impl<'a> FailureCoordinator<'a> {
    /// Coordinator bound to the calling process's context.
    pub fn new(ctx: &'a ExecutionContext) -> Self {
        Self { ctx }
    }

    /// Runs `setup` on the coordinating rank and hands its value to every rank.
    ///
    /// In a single-process context the setup error is returned unchanged. With
    /// several ranks a failure raises the global abort, the coordinator returns
    /// [`NsError::Coordination`] and every other rank returns
    /// [`NsError::Aborted`] from the broadcast.
    pub fn setup<T, F>(&self, setup: F) -> Result<T, NsError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, NsError>,
    {
        if !self.ctx.is_multi_process() {
            return setup();
        }
        if !self.ctx.is_coordinator() {
            let bytes = self.ctx.broadcast(None)?;
            return from_json_slice(&bytes);
        }
        match setup().and_then(|value| to_canonical_json_bytes(&value).map(|bytes| (value, bytes))) {
            Ok((value, bytes)) => {
                self.ctx.broadcast(Some(bytes))?;
                Ok(value)
            }
            Err(err) => {
                tracing::error!(
                    rank = self.ctx.rank(),
                    error = %err,
                    "setup failed on the coordinating process, forcing global abort"
                );
                self.ctx.abort(ABORT_EXIT_STATUS);
                let coordination = err
                    .info()
                    .clone()
                    .with_context("rank", self.ctx.rank().to_string())
                    .with_context("processes", self.ctx.size().to_string());
                Err(NsError::Coordination(coordination))
            }
        }
    }
}
