//! Collaborators wired into a CLI session.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use contracts::{AlertServices, ContractError, EmergencyReport, ReportSink};
use coordinator::{Collaborators, FileReportSink, LogAlertDispatcher, LogReportSink};
use mock_services::{
    DirectoryData, InMemoryDirectory, MockGeocoder, MockPositionService, PositionBehavior,
};
use tracing::info;

use crate::error::CliError;

/// Mock directory and location, logging delivery channel
pub struct CliServices;

impl AlertServices for CliServices {
    type Directory = InMemoryDirectory;
    type Position = MockPositionService;
    type Geocoder = MockGeocoder;
    type Dispatcher = LogAlertDispatcher;
    type Reports = SessionReportSink;
}

/// Where emergency reports go during a session
pub enum SessionReportSink {
    Log(LogReportSink),
    File(FileReportSink),
}

impl SessionReportSink {
    pub fn open(path: Option<&Path>) -> Result<Self, CliError> {
        match path {
            None => Ok(Self::Log(LogReportSink::new("log"))),
            Some(path) => FileReportSink::new("file", path)
                .map(Self::File)
                .map_err(|source| CliError::ReportFile {
                    path: path.to_path_buf(),
                    source,
                }),
        }
    }
}

impl ReportSink for SessionReportSink {
    fn name(&self) -> &str {
        match self {
            Self::Log(sink) => sink.name(),
            Self::File(sink) => sink.name(),
        }
    }

    async fn submit_report(&self, report: &EmergencyReport) -> Result<(), ContractError> {
        match self {
            Self::Log(sink) => sink.submit_report(report).await,
            Self::File(sink) => sink.submit_report(report).await,
        }
    }
}

/// Inputs for building the session collaborators
#[derive(Debug, Clone, Default)]
pub struct ServiceOptions {
    pub directory: Option<PathBuf>,
    pub reports: Option<PathBuf>,
    pub no_fix: bool,
}

pub fn build_services(options: &ServiceOptions) -> Result<Collaborators<CliServices>, CliError> {
    let data = match &options.directory {
        Some(path) => {
            info!(path = %path.display(), "Loading directory fixture");
            DirectoryData::from_json_file(path)?
        }
        None => DirectoryData::sample(),
    };

    let position = if options.no_fix {
        MockPositionService::new(PositionBehavior::Fail("location permission denied".into()))
    } else {
        MockPositionService::default()
    };

    Ok(Collaborators {
        directory: Arc::new(InMemoryDirectory::new(data)),
        position: Arc::new(position),
        geocoder: Arc::new(MockGeocoder::default()),
        dispatcher: Arc::new(LogAlertDispatcher::new("log")),
        reports: Arc::new(SessionReportSink::open(options.reports.as_deref())?),
    })
}
