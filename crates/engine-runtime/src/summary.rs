use crate::scheduler::report::RunReport;
use tracing::info;

/// What a completed fetch or transform run did.
#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub dataset: String,
    pub previous_version: Option<String>,
    pub new_version: String,
    pub version_committed: bool,
    pub report: RunReport,
}

impl SyncSummary {
    pub fn log(&self) {
        info!(
            "Run for {} finished: version {} -> {} ({})",
            self.dataset,
            self.previous_version.as_deref().unwrap_or("<none>"),
            self.new_version,
            if self.version_committed {
                "committed"
            } else {
                "unchanged"
            }
        );
    }
}
