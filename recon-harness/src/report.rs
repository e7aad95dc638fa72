//! Run report.

use crate::errors::HarnessError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Outcome of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// The output existed and matched its contract.
    Passed,
    /// The stage failed anywhere between its inputs and its contract.
    Failed,
}

/// Report for one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    /// Stage name.
    pub name: String,
    /// Outcome.
    pub status: StageStatus,
    /// Wall-clock time spent in the stage, in milliseconds.
    pub duration_ms: f64,
    /// Process exit code, if the process ran and exited normally.
    pub exit_code: Option<i32>,
    /// Error code on failure.
    pub error_code: Option<String>,
    /// Error message on failure.
    pub error_message: Option<String>,
    /// Structured error fields on failure, such as each contract mismatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<BTreeMap<String, serde_json::Value>>,
    /// Primary output file, if it was produced.
    pub output: Option<PathBuf>,
    /// SHA-256 of the primary output.
    pub output_sha256: Option<String>,
}

impl StageReport {
    /// A passing stage.
    #[must_use]
    pub fn passed(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Passed,
            duration_ms: duration.as_secs_f64() * 1000.0,
            exit_code: None,
            error_code: None,
            error_message: None,
            error_details: None,
            output: None,
            output_sha256: None,
        }
    }

    /// A failed stage.
    #[must_use]
    pub fn failed(name: impl Into<String>, duration: Duration, error: &HarnessError) -> Self {
        Self {
            status: StageStatus::Failed,
            error_code: Some(error.code().to_string()),
            error_message: Some(error.to_string()),
            error_details: Some(error.to_dict()),
            ..Self::passed(name, duration)
        }
    }

    /// Records the process exit code.
    #[must_use]
    pub fn with_exit_code(mut self, exit_code: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self
    }

    /// Records the primary output and its fingerprint.
    ///
    /// A file that cannot be hashed is recorded without a fingerprint.
    #[must_use]
    pub fn with_output(mut self, path: &Path) -> Self {
        self.output_sha256 = sha256_file(path).ok();
        self.output = Some(path.to_path_buf());
        self
    }

    /// Returns true if the stage passed.
    #[must_use]
    pub fn is_passed(&self) -> bool {
        self.status == StageStatus::Passed
    }
}

/// A file teardown could not remove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeardownFailure {
    /// The file.
    pub path: PathBuf,
    /// Why removal failed.
    pub error: String,
}

/// Report for a whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    /// Unique run identifier.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// Stage reports in execution order.
    pub stages: Vec<StageReport>,
    /// Files teardown could not remove.
    pub teardown_failures: Vec<TeardownFailure>,
}

impl Default for SuiteReport {
    fn default() -> Self {
        Self::new()
    }
}

impl SuiteReport {
    /// Starts a new report.
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            stages: Vec::new(),
            teardown_failures: Vec::new(),
        }
    }

    /// Appends a stage report.
    pub fn push(&mut self, stage: StageReport) {
        self.stages.push(stage);
    }

    /// Marks the run finished.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Looks up a stage report by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Returns true if every stage passed.
    ///
    /// Teardown failures are reported but do not fail the run.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.stages.iter().all(StageReport::is_passed)
    }

    /// Names of the failed stages.
    #[must_use]
    pub fn failed_stages(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|s| !s.is_passed())
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Process exit code: 0 iff every stage passed.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.all_passed())
    }

    /// Serializes the report as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns a serialization error.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Writes the report as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Io`] if the file cannot be written.
    pub fn write(&self, path: &Path) -> Result<(), HarnessError> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Hex SHA-256 of a file.
///
/// # Errors
///
/// Returns an IO error if the file cannot be read.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_exit_code() {
        let mut report = SuiteReport::new();
        report.push(StageReport::passed("image", Duration::from_millis(5)));
        assert_eq!(report.exit_code(), 0);

        let err = HarnessError::missing_file("rss", "unittest-recon.h5");
        report.push(StageReport::failed("rss", Duration::ZERO, &err));
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.failed_stages(), vec!["rss"]);

        let rss = report.stage("rss").unwrap();
        assert_eq!(rss.error_code.as_deref(), Some("HARNESS-MISSING-FILE"));
        let details = rss.error_details.as_ref().unwrap();
        assert_eq!(details["path"], "unittest-recon.h5");
        assert!(report.stage("image").unwrap().error_details.is_none());
    }

    #[test]
    fn test_teardown_failures_do_not_fail_run() {
        let mut report = SuiteReport::new();
        report.push(StageReport::passed("image", Duration::ZERO));
        report.teardown_failures.push(TeardownFailure {
            path: PathBuf::from("unittest.h5"),
            error: "permission denied".to_string(),
        });
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_fingerprint() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();

        assert_eq!(
            sha256_file(file.path()).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );

        let stage = StageReport::passed("image", Duration::ZERO).with_output(file.path());
        assert!(stage.output_sha256.is_some());

        let missing = StageReport::passed("image", Duration::ZERO)
            .with_output(Path::new("/nonexistent/unittest.h5"));
        assert!(missing.output_sha256.is_none());
    }

    #[test]
    fn test_json_round_trip() {
        let mut report = SuiteReport::new();
        report.push(StageReport::passed("image", Duration::from_millis(2)).with_exit_code(Some(0)));
        report.finish();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        report.write(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: SuiteReport = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.run_id, report.run_id);
        assert_eq!(parsed.stages[0].status, StageStatus::Passed);
        assert!(text.contains("\"status\": \"passed\""));
        assert!(!text.contains("error_details"));
    }

    #[test]
    fn test_contract_mismatches_in_json() {
        let violation = crate::errors::ContractViolation::new(
            "sense",
            vec![crate::errors::Mismatch::new("dims", "('channel')", "('x')")],
        );
        let mut report = SuiteReport::new();
        report.push(StageReport::failed("sense", Duration::ZERO, &violation.into()));

        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        let details = &value["stages"][0]["error_details"];
        assert_eq!(details["code"], "HARNESS-CONTRACT");
        assert_eq!(details["stage"], "sense");
        assert_eq!(details["mismatches"][0]["field"], "dims");
        assert_eq!(details["mismatches"][0]["actual"], "('x')");
    }
}
