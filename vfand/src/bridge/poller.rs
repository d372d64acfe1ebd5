//! PWM poller: host → device
//!
//! Reads every channel's `pwmN` file on a fixed period and forwards changed
//! values to the firmware as duty-set commands.

use std::path::Path;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use vfan_core::{duty_to_percent, protocol, FanChannel, Result, MAX_PWM};
use vfan_hardware::CommandSink;

/// Read a host PWM value, failing safe to full speed
///
/// A missing, unreadable or out-of-range file yields 255.
pub async fn read_duty(path: &Path) -> u8 {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => content.trim().parse().unwrap_or_else(|_| {
            debug!("Unparsable PWM value {:?} in {}", content.trim(), path.display());
            MAX_PWM
        }),
        Err(e) => {
            debug!("Cannot read {}: {}", path.display(), e);
            MAX_PWM
        }
    }
}

/// Owner of the per-channel `last_known_duty` state
pub struct PwmPoller {
    channels: Vec<FanChannel>,
    interval: Duration,
}

impl PwmPoller {
    pub fn new(channels: Vec<FanChannel>, interval: Duration) -> Self {
        Self { channels, interval }
    }

    #[cfg(test)]
    pub fn channels(&self) -> &[FanChannel] {
        &self.channels
    }

    /// Poll every channel once
    ///
    /// Returns the number of commands sent. A send error aborts the pass and
    /// leaves the failing channel's duty unknown.
    pub async fn poll_once(&mut self, sink: &mut dyn CommandSink) -> Result<usize> {
        let mut sent = 0;

        for channel in &mut self.channels {
            let duty = read_duty(&channel.pwm_path).await;
            if !channel.needs_update(duty) {
                continue;
            }

            let percent = duty_to_percent(duty);
            debug!(
                "Setting {} to {}% (pwm {}, was {:?})",
                channel.id, percent, duty, channel.last_known_duty
            );

            let line = protocol::encode_duty_command(&channel.id, percent)?;
            sink.send_line(&line).await?;
            channel.last_known_duty = Some(duty);
            sent += 1;
        }

        Ok(sent)
    }

    /// Poll until cancelled or until a command cannot be sent
    pub async fn run(
        &mut self,
        sink: &mut dyn CommandSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                debug!("PWM poller cancelled");
                return Ok(());
            }

            if let Err(e) = self.poll_once(sink).await {
                error!("Failed to send duty command: {}", e);
                return Err(e);
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("PWM poller cancelled");
                    return Ok(());
                }
                _ = sleep(self.interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use vfan_core::VfanError;

    /// Sink recording every line, optionally failing after `fail_after` sends
    #[derive(Clone, Default)]
    struct RecordingSink {
        lines: Arc<Mutex<Vec<String>>>,
        fail_after: Option<usize>,
    }

    impl RecordingSink {
        fn failing_after(n: usize) -> Self {
            Self {
                fail_after: Some(n),
                ..Self::default()
            }
        }

        fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandSink for RecordingSink {
        async fn send_line(&mut self, line: &str) -> Result<()> {
            let mut lines = self.lines.lock().unwrap();
            if self.fail_after.is_some_and(|n| lines.len() >= n) {
                return Err(VfanError::Serial("Write failed: Broken pipe".to_string()));
            }
            lines.push(line.to_string());
            Ok(())
        }
    }

    fn hwmon_with_pwm(values: &[&str]) -> (TempDir, Vec<FanChannel>) {
        let tmp = TempDir::new().unwrap();
        let ids: Vec<String> = (1..=values.len()).map(|n| format!("fan{}", n)).collect();
        for (i, value) in values.iter().enumerate() {
            fs::write(tmp.path().join(format!("pwm{}", i + 1)), value).unwrap();
        }
        let channels = FanChannel::from_ids(&ids, tmp.path());
        (tmp, channels)
    }

    #[tokio::test]
    async fn test_read_duty_parses_trimmed_value() {
        let (tmp, _) = hwmon_with_pwm(&["128\n"]);
        assert_eq!(read_duty(&tmp.path().join("pwm1")).await, 128);
    }

    #[tokio::test]
    async fn test_read_duty_fails_safe() {
        let (tmp, _) = hwmon_with_pwm(&["garbage", "300", "-1"]);
        assert_eq!(read_duty(&tmp.path().join("missing")).await, 255);
        assert_eq!(read_duty(&tmp.path().join("pwm1")).await, 255);
        assert_eq!(read_duty(&tmp.path().join("pwm2")).await, 255);
        assert_eq!(read_duty(&tmp.path().join("pwm3")).await, 255);
    }

    #[tokio::test]
    async fn test_unchanged_pwm_sends_nothing() {
        let (_tmp, channels) = hwmon_with_pwm(&["0", "128", "255"]);
        let mut poller = PwmPoller::new(channels, Duration::from_millis(200));
        let mut sink = RecordingSink::default();

        assert_eq!(poller.poll_once(&mut sink).await.unwrap(), 3);
        assert_eq!(poller.poll_once(&mut sink).await.unwrap(), 0);

        assert_eq!(
            sink.lines(),
            vec![
                "{\"fan\":\"fan1\",\"set_duty\":0}\n",
                "{\"fan\":\"fan2\",\"set_duty\":50}\n",
                "{\"fan\":\"fan3\",\"set_duty\":100}\n",
            ]
        );
    }

    #[tokio::test]
    async fn test_changed_pwm_sends_only_that_channel() {
        let (tmp, channels) = hwmon_with_pwm(&["100", "100"]);
        let mut poller = PwmPoller::new(channels, Duration::from_millis(200));
        let mut sink = RecordingSink::default();

        poller.poll_once(&mut sink).await.unwrap();
        fs::write(tmp.path().join("pwm2"), "200").unwrap();
        assert_eq!(poller.poll_once(&mut sink).await.unwrap(), 1);

        assert_eq!(
            sink.lines().last().unwrap(),
            "{\"fan\":\"fan2\",\"set_duty\":78}\n"
        );
        assert_eq!(poller.channels()[1].last_known_duty, Some(200));
    }

    #[tokio::test]
    async fn test_missing_pwm_file_drives_full_speed() {
        let (tmp, channels) = hwmon_with_pwm(&["64"]);
        fs::remove_file(tmp.path().join("pwm1")).unwrap();
        let mut poller = PwmPoller::new(channels, Duration::from_millis(200));
        let mut sink = RecordingSink::default();

        poller.poll_once(&mut sink).await.unwrap();

        assert_eq!(sink.lines(), vec!["{\"fan\":\"fan1\",\"set_duty\":100}\n"]);
        assert_eq!(poller.channels()[0].last_known_duty, Some(255));
    }

    #[tokio::test]
    async fn test_send_failure_keeps_duty_unknown() {
        let (_tmp, channels) = hwmon_with_pwm(&["10", "20"]);
        let mut poller = PwmPoller::new(channels, Duration::from_millis(200));
        let mut sink = RecordingSink::failing_after(1);

        assert!(poller.poll_once(&mut sink).await.is_err());
        assert_eq!(poller.channels()[0].last_known_duty, Some(10));
        assert_eq!(poller.channels()[1].last_known_duty, None);
    }

    #[tokio::test]
    async fn test_fresh_channels_resend_after_reconnect() {
        let (tmp, channels) = hwmon_with_pwm(&["90", "90", "90"]);
        let mut sink = RecordingSink::default();

        let mut first = PwmPoller::new(channels, Duration::from_millis(200));
        first.poll_once(&mut sink).await.unwrap();
        assert_eq!(first.poll_once(&mut sink).await.unwrap(), 0);

        let ids = ["fan1", "fan2", "fan3"];
        let mut second = PwmPoller::new(
            FanChannel::from_ids(&ids, tmp.path()),
            Duration::from_millis(200),
        );
        assert_eq!(second.poll_once(&mut sink).await.unwrap(), 3);
        assert_eq!(sink.lines().len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_send_failure() {
        let (_tmp, channels) = hwmon_with_pwm(&["10"]);
        let mut poller = PwmPoller::new(channels, Duration::from_millis(200));
        let mut sink = RecordingSink::failing_after(0);
        let cancel = CancellationToken::new();

        let result = poller.run(&mut sink, &cancel).await;
        assert!(matches!(result, Err(VfanError::Serial(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exits_when_cancelled() {
        let (_tmp, channels) = hwmon_with_pwm(&["10"]);
        let mut poller = PwmPoller::new(channels, Duration::from_millis(200));
        let mut sink = RecordingSink::default();
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(1000)).await;
            canceller.cancel();
        });

        poller.run(&mut sink, &cancel).await.unwrap();
        // PWM never changed: one command for the whole run
        assert_eq!(sink.lines().len(), 1);
    }

    #[tokio::test]
    async fn test_run_does_not_poll_when_already_cancelled() {
        let (_tmp, channels) = hwmon_with_pwm(&["10"]);
        let mut poller = PwmPoller::new(channels, Duration::from_millis(200));
        let mut sink = RecordingSink::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        poller.run(&mut sink, &cancel).await.unwrap();
        assert!(sink.lines().is_empty());
    }
}
