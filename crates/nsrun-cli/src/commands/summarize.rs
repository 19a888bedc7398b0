use std::path::PathBuf;

use clap::Args;
use nsrun_core::errors::NsError;
use nsrun_sched::BatchReport;

use super::io_error;

#[derive(Args, Debug)]
pub struct SummarizeArgs {
    /// Batch report written by `nsrun run`.
    #[arg(long)]
    pub report: PathBuf,
    /// Also write the summary to this file.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub fn run(args: &SummarizeArgs) -> Result<(), NsError> {
    let report = BatchReport::load(&args.report)?;
    let summary = report.render_summary();
    print!("{summary}");
    if let Some(out) = &args.out {
        std::fs::write(out, &summary).map_err(|err| io_error("summary_write", err))?;
    }
    Ok(())
}
