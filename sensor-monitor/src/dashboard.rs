//! Dashboard hand-off from the command line
//!
//! There is no viewer process to start on a headless host, so the request is
//! printed as JSON for whatever picks it up.

use std::io::Write;

use track_dashboard::{
    start_dashboard, DashboardConfig, DashboardError, DashboardRequest, TrackId, ViewerLauncher,
};
use tracing::info;

/// Writes each request as pretty JSON to a writer
pub struct PrintLauncher<W> {
    out: std::sync::Mutex<W>,
}

impl<W: Write> PrintLauncher<W> {
    /// Launcher writing to `out`
    pub fn new(out: W) -> Self {
        Self {
            out: std::sync::Mutex::new(out),
        }
    }

    /// Recover the writer
    pub fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<W: Write> ViewerLauncher for PrintLauncher<W> {
    fn launch(&self, request: &DashboardRequest) -> Result<(), DashboardError> {
        let json = serde_json::to_string_pretty(request)
            .map_err(|e| DashboardError::LaunchFailed(e.to_string()))?;

        let mut out = self
            .out
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        writeln!(out, "{}", json).map_err(|e| DashboardError::LaunchFailed(e.to_string()))
    }
}

/// Build and print the dashboard request for `ids`
pub fn run(config: &DashboardConfig, ids: &[i64]) -> anyhow::Result<()> {
    let ids: Vec<TrackId> = ids.iter().copied().map(TrackId).collect();
    let launcher = PrintLauncher::new(std::io::stdout());

    if !start_dashboard(&launcher, config, &ids)? {
        info!("No track ids given, nothing to show");
    }
    Ok(())
}
