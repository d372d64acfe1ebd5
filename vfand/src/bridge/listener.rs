//! Feedback listener: device → host
//!
//! Reads status lines from the firmware and mirrors each reported RPM into
//! the matching `fanN_input` file of the hwmon directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use vfan_core::{protocol, rpm_input_path, Result, StatusReport};
use vfan_hardware::StatusSource;

/// Mode of RPM files created by the bridge
const RPM_FILE_MODE: u32 = 0o644;

/// Write `rpm` as decimal text, replacing the previous content
pub async fn write_rpm(path: &Path, rpm: u32) -> Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(RPM_FILE_MODE);

    let mut file = options.open(path).await?;
    file.write_all(rpm.to_string().as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// Device feedback handler for one connection
///
/// Owns the last RPM seen per channel; nothing else reads or writes it.
pub struct FeedbackListener {
    hwmon_root: PathBuf,
    last_rpm: HashMap<String, u32>,
}

impl FeedbackListener {
    pub fn new(hwmon_root: impl Into<PathBuf>) -> Self {
        Self {
            hwmon_root: hwmon_root.into(),
            last_rpm: HashMap::new(),
        }
    }

    /// Last RPM reported for each channel during this connection
    pub fn into_last_rpm(self) -> HashMap<String, u32> {
        self.last_rpm
    }

    /// Process one raw line from the device
    ///
    /// Returns the number of RPM files written. Noise and undecodable lines
    /// are dropped.
    pub async fn handle_line(&mut self, line: &str) -> usize {
        let line = line.trim();
        if line.is_empty() {
            return 0;
        }

        if !protocol::is_status_frame(line) {
            debug!("Device: {}", line);
            return 0;
        }

        let reports = match protocol::decode_status(line) {
            Ok(reports) => reports,
            Err(e) => {
                debug!("Discarding undecodable status line {:?}: {}", line, e);
                return 0;
            }
        };

        let mut written = 0;
        for report in &reports {
            if self.apply_report(report).await {
                written += 1;
            }
        }
        written
    }

    async fn apply_report(&mut self, report: &StatusReport) -> bool {
        let Some(path) = rpm_input_path(&self.hwmon_root, &report.fan_id) else {
            warn!("Ignoring status for unnumbered channel {:?}", report.fan_id);
            return false;
        };

        if let Err(e) = write_rpm(&path, report.rpm).await {
            warn!("Failed to update {}: {}", path.display(), e);
            return false;
        }

        let previous = self.last_rpm.insert(report.fan_id.clone(), report.rpm);
        if previous != Some(report.rpm) {
            debug!(
                "{}: {} rpm at {}% duty (was {:?})",
                report.fan_id, report.rpm, report.duty, previous
            );
        }
        true
    }

    /// Read and apply lines until cancelled or until the stream fails
    pub async fn run(
        &mut self,
        source: &mut dyn StatusSource,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Feedback listener cancelled");
                    return Ok(());
                }
                line = source.read_line() => line,
            };

            match line {
                Ok(line) => {
                    self.handle_line(&line).await;
                }
                Err(e) => {
                    error!("Failed to read device feedback: {}", e);
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::fs;
    use tempfile::TempDir;
    use vfan_core::VfanError;

    /// Source replaying queued lines, then reporting a disconnect
    struct ScriptedSource {
        lines: VecDeque<String>,
    }

    impl ScriptedSource {
        fn new(lines: &[&str]) -> Self {
            Self {
                lines: lines.iter().map(|l| l.to_string()).collect(),
            }
        }
    }

    #[async_trait]
    impl StatusSource for ScriptedSource {
        async fn read_line(&mut self) -> Result<String> {
            self.lines
                .pop_front()
                .ok_or_else(|| VfanError::DeviceDisconnected("script exhausted".to_string()))
        }
    }

    /// Source that never produces a line
    struct SilentSource;

    #[async_trait]
    impl StatusSource for SilentSource {
        async fn read_line(&mut self) -> Result<String> {
            std::future::pending().await
        }
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_malformed_line_then_valid_line() {
        let tmp = TempDir::new().unwrap();
        let mut listener = FeedbackListener::new(tmp.path());
        let mut source = ScriptedSource::new(&[
            "not json",
            "[{\"id\":\"fan1\",\"rpm\":1200,\"duty\":50}]",
        ]);
        let cancel = CancellationToken::new();

        let result = listener.run(&mut source, &cancel).await;

        assert!(matches!(result, Err(VfanError::DeviceDisconnected(_))));
        assert_eq!(entries(tmp.path()), vec!["fan1_input"]);
        assert_eq!(
            fs::read_to_string(tmp.path().join("fan1_input")).unwrap(),
            "1200"
        );
        assert_eq!(listener.into_last_rpm().get("fan1"), Some(&1200));
    }

    #[tokio::test]
    async fn test_report_without_duty_still_writes_rpm() {
        let tmp = TempDir::new().unwrap();
        let mut listener = FeedbackListener::new(tmp.path());

        let written = listener.handle_line("[{\"id\":\"fan1\",\"rpm\":1200}]").await;

        assert_eq!(written, 1);
        assert_eq!(
            fs::read_to_string(tmp.path().join("fan1_input")).unwrap(),
            "1200"
        );
    }

    #[tokio::test]
    async fn test_broken_array_is_discarded() {
        let tmp = TempDir::new().unwrap();
        let mut listener = FeedbackListener::new(tmp.path());

        assert_eq!(listener.handle_line("[{\"id\":\"fan1\",\"rpm\":12").await, 0);
        assert!(entries(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn test_multi_channel_report() {
        let tmp = TempDir::new().unwrap();
        let mut listener = FeedbackListener::new(tmp.path());

        let written = listener
            .handle_line(
                "  [{\"id\":\"fan1\",\"rpm\":900,\"duty\":30},\
                 {\"id\":\"fan3\",\"rpm\":2400,\"duty\":100}]\r\n",
            )
            .await;

        assert_eq!(written, 2);
        assert_eq!(entries(tmp.path()), vec!["fan1_input", "fan3_input"]);
        assert_eq!(
            fs::read_to_string(tmp.path().join("fan3_input")).unwrap(),
            "2400"
        );
    }

    #[tokio::test]
    async fn test_rpm_file_is_overwritten() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("fan2_input"), "123456").unwrap();
        let mut listener = FeedbackListener::new(tmp.path());

        listener
            .handle_line("[{\"id\":\"fan2\",\"rpm\":80,\"duty\":5}]")
            .await;

        assert_eq!(
            fs::read_to_string(tmp.path().join("fan2_input")).unwrap(),
            "80"
        );
    }

    #[tokio::test]
    async fn test_unnumbered_channel_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let mut listener = FeedbackListener::new(tmp.path());

        let written = listener
            .handle_line("[{\"id\":\"pump\",\"rpm\":800,\"duty\":40}]")
            .await;

        assert_eq!(written, 0);
        assert!(entries(tmp.path()).is_empty());
        assert!(listener.into_last_rpm().is_empty());
    }

    #[tokio::test]
    async fn test_plain_text_is_ignored() {
        let tmp = TempDir::new().unwrap();
        let mut listener = FeedbackListener::new(tmp.path());

        assert_eq!(listener.handle_line("RPM:1234").await, 0);
        assert_eq!(listener.handle_line("").await, 0);
        assert!(entries(tmp.path()).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_rpm_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fan1_input");
        write_rpm(&path, 1500).await.unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        // The process umask can only clear bits
        assert_eq!(mode & !RPM_FILE_MODE, 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), "1500");
    }

    #[tokio::test]
    async fn test_unwritable_root_is_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let mut listener = FeedbackListener::new(tmp.path().join("gone"));
        let mut source = ScriptedSource::new(&["[{\"id\":\"fan1\",\"rpm\":1,\"duty\":1}]"]);
        let cancel = CancellationToken::new();

        // Only the exhausted script ends the run
        let result = listener.run(&mut source, &cancel).await;
        assert!(matches!(result, Err(VfanError::DeviceDisconnected(_))));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_read() {
        let tmp = TempDir::new().unwrap();
        let mut listener = FeedbackListener::new(tmp.path());
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move { canceller.cancel() });

        listener.run(&mut SilentSource, &cancel).await.unwrap();
    }
}
