//! FileReportSink - appends report records to a JSON-lines file

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use contracts::{ContractError, EmergencyReport, ReportSink};
use tracing::{debug, instrument};

/// Sink that appends one JSON object per report
pub struct FileReportSink {
    name: String,
    path: PathBuf,
    file: Mutex<File>,
}

impl FileReportSink {
    /// Open `path` for appending, creating parent directories as needed
    pub fn new(name: impl Into<String>, path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            name: name.into(),
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportSink for FileReportSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "file_report_sink_submit", skip(self, report), fields(sink = %self.name))]
    async fn submit_report(&self, report: &EmergencyReport) -> Result<(), ContractError> {
        let mut line = serde_json::to_vec(report)
            .map_err(|e| ContractError::report_write(&self.name, e.to_string()))?;
        line.push(b'\n');

        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(&line)?;
        file.flush()?;

        debug!(path = %self.path.display(), "report appended");
        Ok(())
    }
}
