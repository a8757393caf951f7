//! Background console capture
//!
//! While a streaming command runs on the robot, a blocking task drains the
//! serial channel line by line into a [`LineSink`]. The task holds the
//! channel in streaming mode for its whole lifetime, so synchronous REPL
//! exchanges are rejected until it has exited.

use super::arbitration::ChannelMode;
use super::error::{Result, RobotError};
use super::logger::{LineSink, LogLine, PendingLines};
use super::transport::SerialChannel;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Summary of one reader run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderReport {
    /// Lines written to the sink
    pub lines_logged: usize,
}

enum ReaderState {
    Stopped,
    Running {
        running: Arc<AtomicBool>,
        handle: JoinHandle<Result<ReaderReport>>,
    },
}

/// Cancellable line logger on a [`SerialChannel`]
pub struct BackgroundLogReader {
    channel: SerialChannel,
    state: ReaderState,
}

impl std::fmt::Debug for BackgroundLogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundLogReader")
            .field("channel", &self.channel)
            .field("running", &self.is_running())
            .finish()
    }
}

impl BackgroundLogReader {
    /// Create a stopped reader
    pub fn new(channel: SerialChannel) -> Self {
        Self {
            channel,
            state: ReaderState::Stopped,
        }
    }

    /// True while the task is started and has not exited
    pub fn is_running(&self) -> bool {
        match &self.state {
            ReaderState::Stopped => false,
            ReaderState::Running { handle, .. } => !handle.is_finished(),
        }
    }

    /// Start draining the channel into `sink`
    ///
    /// Must be called within a Tokio runtime. Fails if the reader is still
    /// running or the channel is in command mode. A task that already exited
    /// on its own is discarded; its failure was logged when it ended and is
    /// no longer returned by [`stop`](Self::stop).
    pub fn start(&mut self, sink: Box<dyn LineSink>) -> Result<()> {
        if let ReaderState::Running { handle, .. } = &self.state {
            if !handle.is_finished() {
                return Err(RobotError::ReaderAlreadyRunning);
            }
            tracing::warn!(
                "Previous log reader on {} had exited, starting a new one",
                self.channel.name()
            );
            self.state = ReaderState::Stopped;
        }

        let lease = self.channel.lease(ChannelMode::Streaming)?;
        let running = Arc::new(AtomicBool::new(true));

        let channel = self.channel.clone();
        let flag = Arc::clone(&running);
        let handle = tokio::task::spawn_blocking(move || {
            let _lease = lease;
            drain_lines(&channel, &flag, sink)
        });

        tracing::debug!("Background log reader started on {}", self.channel.name());
        self.state = ReaderState::Running { running, handle };
        Ok(())
    }

    /// Stop the reader and wait for it to release the channel
    ///
    /// The read in flight completes or times out first; any line it returns
    /// is still written. Errors that ended the task early are returned here.
    /// Stopping a stopped reader does nothing.
    pub async fn stop(&mut self) -> Result<ReaderReport> {
        let ReaderState::Running { running, handle } =
            std::mem::replace(&mut self.state, ReaderState::Stopped)
        else {
            return Ok(ReaderReport::default());
        };

        running.store(false, Ordering::Release);
        let report = handle.await??;
        tracing::debug!(
            "Background log reader stopped after {} lines",
            report.lines_logged
        );
        Ok(report)
    }
}

impl Drop for BackgroundLogReader {
    fn drop(&mut self) {
        if let ReaderState::Running { running, .. } = &self.state {
            running.store(false, Ordering::Release);
        }
    }
}

fn drain_lines(
    channel: &SerialChannel,
    running: &AtomicBool,
    mut sink: Box<dyn LineSink>,
) -> Result<ReaderReport> {
    let mut pending = PendingLines::new();
    let mut report = ReaderReport::default();

    while running.load(Ordering::Acquire) {
        let text = channel.read_line().map_err(|e| {
            tracing::error!("Log reader on {} failed: {}", channel.name(), e);
            e
        })?;
        if text.is_empty() {
            continue;
        }

        tracing::info!(target: "cardbot::device", "{}", text);
        pending.push(LogLine::now(text));
        report.lines_logged += pending.flush(sink.as_mut())?;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::logger::MemorySink;
    use crate::core::repl::{Command, ReplClient};
    use crate::core::transport::MockLink;
    use std::time::{Duration, Instant};

    fn channel(mock: &MockLink) -> SerialChannel {
        SerialChannel::new("mock", Box::new(mock.clone()), Duration::from_millis(50))
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_logs_lines_in_order_and_skips_blank() {
        let mock = MockLink::new();
        mock.push_input(b"Slot 0 pressed\r\n\r\n   \r\nSlot 0 retracted\r\n");
        let sink = MemorySink::new();

        let mut reader = BackgroundLogReader::new(channel(&mock));
        reader.start(Box::new(sink.clone())).unwrap();
        assert!(reader.is_running());

        wait_for(|| sink.lines().len() == 2).await;
        let report = reader.stop().await.unwrap();
        assert!(!reader.is_running());

        assert_eq!(report.lines_logged, 2);
        let lines = sink.lines();
        assert_eq!(lines[0].text, "Slot 0 pressed");
        assert_eq!(lines[1].text, "Slot 0 retracted");
        assert!(lines[0].timestamp <= lines[1].timestamp);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_blank_reads_log_nothing() {
        let mock = MockLink::new();
        mock.push_input(b"\r\n  \r\n\n");
        let sink = MemorySink::new();

        let mut reader = BackgroundLogReader::new(channel(&mock));
        reader.start(Box::new(sink.clone())).unwrap();
        wait_for(|| mock.unread_input() == 0).await;
        let report = reader.stop().await.unwrap();

        assert_eq!(report.lines_logged, 0);
        assert_eq!(sink.appends(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_line_received_before_stop_is_kept() {
        let mock = MockLink::new();
        let sink = MemorySink::new();
        let mut reader = BackgroundLogReader::new(channel(&mock));
        reader.start(Box::new(sink.clone())).unwrap();

        mock.push_input(b"last words\r\n");
        wait_for(|| mock.unread_input() == 0).await;
        reader.stop().await.unwrap();

        let texts: Vec<_> = sink.lines().into_iter().map(|l| l.text).collect();
        assert_eq!(texts, vec!["last words"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_channel_exclusive_while_running() {
        let mock = MockLink::new();
        let channel = channel(&mock);
        let client = ReplClient::new(channel.clone());
        let mut reader = BackgroundLogReader::new(channel.clone());

        reader.start(Box::new(MemorySink::new())).unwrap();
        assert!(matches!(
            reader.start(Box::new(MemorySink::new())),
            Err(RobotError::ReaderAlreadyRunning)
        ));

        let cmd = Command::new("x = 1").unwrap();
        assert!(matches!(
            client.run_commands(&[cmd.clone()], true),
            Err(RobotError::ChannelBusy { .. })
        ));

        reader.stop().await.unwrap();
        assert_eq!(channel.arbiter().mode(), ChannelMode::Idle);

        mock.respond_to(b"x = 1\r", b"x = 1\r\n>>> ");
        client.run_commands(&[cmd], true).unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_rejected_in_command_mode() {
        let mock = MockLink::new();
        let channel = channel(&mock);
        let _command = channel.lease(ChannelMode::Command).unwrap();

        let mut reader = BackgroundLogReader::new(channel.clone());
        assert!(matches!(
            reader.start(Box::new(MemorySink::new())),
            Err(RobotError::ChannelBusy { .. })
        ));
        assert!(!reader.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_utf8_surfaces_on_stop() {
        let mock = MockLink::new();
        mock.push_input(b"ok\r\n\xff\xfe\r\n");
        let sink = MemorySink::new();
        let channel = channel(&mock);

        let mut reader = BackgroundLogReader::new(channel.clone());
        reader.start(Box::new(sink.clone())).unwrap();
        wait_for(|| !reader.is_running()).await;

        assert!(matches!(reader.stop().await, Err(RobotError::InvalidUtf8(_))));
        assert_eq!(sink.lines().len(), 1);
        assert_eq!(channel.arbiter().mode(), ChannelMode::Idle);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_restart_after_reader_exited() {
        let mock = MockLink::new();
        mock.push_input(b"\xff\n");
        let sink = MemorySink::new();

        let mut reader = BackgroundLogReader::new(channel(&mock));
        reader.start(Box::new(sink.clone())).unwrap();
        wait_for(|| !reader.is_running()).await;

        reader.start(Box::new(sink.clone())).unwrap();
        assert!(reader.is_running());

        mock.push_input(b"back online\r\n");
        wait_for(|| sink.lines().len() == 1).await;
        let report = reader.stop().await.unwrap();

        assert_eq!(report.lines_logged, 1);
        assert_eq!(sink.lines()[0].text, "back online");
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_noop() {
        let mock = MockLink::new();
        let mut reader = BackgroundLogReader::new(channel(&mock));
        assert_eq!(reader.stop().await.unwrap(), ReaderReport::default());
    }
}
