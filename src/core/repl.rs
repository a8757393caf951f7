//! REPL client for the robot's interpreter
//!
//! The remote interpreter echoes each submitted line followed by `\n`, prints
//! the statement's output and then the `>>> ` prompt. Commands are sent as
//! ASCII lines terminated with `\r`.

use super::arbitration::ChannelMode;
use super::error::{Result, RobotError};
use super::transport::SerialChannel;
use std::fmt;
use std::str::FromStr;

/// Interpreter prompt marker
pub const PROMPT: &[u8] = b">>> ";

/// Line terminator appended to submitted commands
pub const COMMAND_TERMINATOR: u8 = b'\r';

/// A single REPL statement, sent verbatim
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command(String);

impl Command {
    /// Validate `text` as one ASCII line
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if !text.is_ascii() || text.contains(['\r', '\n']) {
            return Err(RobotError::InvalidCommand(text));
        }
        Ok(Self(text))
    }

    pub(crate) fn new_unchecked(text: String) -> Self {
        Self(text)
    }

    /// Statement text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Bytes written to the device
    pub fn wire_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.0.len() + 1);
        bytes.extend_from_slice(self.0.as_bytes());
        bytes.push(COMMAND_TERMINATOR);
        bytes
    }

    /// Echo the device sends back once the line is accepted
    pub fn echo_bytes(&self) -> Vec<u8> {
        let mut bytes = self.wire_bytes();
        bytes.push(b'\n');
        bytes
    }
}

impl FromStr for Command {
    type Err = RobotError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Control bytes understood by the interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// Ctrl-C, stop the running statement
    Halt,
    /// Ctrl-D, soft reset and reimport
    SoftReset,
}

impl Interrupt {
    /// Raw byte on the wire
    pub fn byte(self) -> u8 {
        match self {
            Self::Halt => 0x03,
            Self::SoftReset => 0x04,
        }
    }
}

/// Decode one prompt-terminated block of output
///
/// The trailing prompt is dropped when present and `\r\n` becomes `\n`.
pub fn decode_prompt_output(raw: &[u8]) -> Result<String> {
    let body = raw.strip_suffix(PROMPT).unwrap_or(raw);
    let text = String::from_utf8(body.to_vec())?;
    Ok(text.replace("\r\n", "\n"))
}

/// Sends statements to the interpreter over a [`SerialChannel`]
#[derive(Debug, Clone)]
pub struct ReplClient {
    channel: SerialChannel,
}

impl ReplClient {
    /// Create a client on `channel`
    pub fn new(channel: SerialChannel) -> Self {
        Self { channel }
    }

    /// Underlying channel
    pub fn channel(&self) -> &SerialChannel {
        &self.channel
    }

    /// Submit `commands` in order
    ///
    /// With `await_echo`, each command's echo is consumed before continuing,
    /// and every command except the last has its output drained up to the
    /// next prompt; those outputs are returned. This takes the channel in
    /// command mode and fails while the background reader owns it.
    ///
    /// Without `await_echo` the lines are written and nothing is read. The
    /// caller drains the output (normally through the background reader) and
    /// waits out the statement's run time.
    pub fn run_commands(&self, commands: &[Command], await_echo: bool) -> Result<Vec<String>> {
        let _lease = if await_echo {
            Some(self.channel.lease(ChannelMode::Command)?)
        } else {
            None
        };

        let mut outputs = Vec::new();
        for (i, command) in commands.iter().enumerate() {
            tracing::debug!("Sending \"{}\"", command);
            self.channel.write(&command.wire_bytes())?;

            if !await_echo {
                continue;
            }

            let echo = command.echo_bytes();
            let received = self.channel.read_until(&echo)?;
            if !received.ends_with(&echo) {
                tracing::warn!("No echo for \"{}\" within {:?}", command, self.channel.read_timeout());
            }

            if i + 1 < commands.len() {
                outputs.push(self.drain_prompt()?);
            }
        }

        Ok(outputs)
    }

    /// Read one block of output up to the prompt
    pub fn read_prompt_output(&self) -> Result<String> {
        let _lease = self.channel.lease(ChannelMode::Command)?;
        self.drain_prompt()
    }

    /// Write a single control byte
    pub fn send_interrupt(&self, interrupt: Interrupt) -> Result<()> {
        tracing::debug!("Sending {:?} interrupt", interrupt);
        self.channel.write(&[interrupt.byte()])
    }

    fn drain_prompt(&self) -> Result<String> {
        let raw = self.channel.read_until(PROMPT)?;
        decode_prompt_output(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::MockLink;
    use std::time::Duration;

    fn client(mock: &MockLink) -> ReplClient {
        ReplClient::new(SerialChannel::new(
            "mock",
            Box::new(mock.clone()),
            Duration::from_millis(100),
        ))
    }

    #[test]
    fn test_decode_prompt_output() {
        assert_eq!(decode_prompt_output(b"ok\r\n>>> ").unwrap(), "ok\n");
        assert_eq!(decode_prompt_output(b"a\r\nb\r\n>>> ").unwrap(), "a\nb\n");
        assert_eq!(decode_prompt_output(b">>> ").unwrap(), "");
    }

    #[test]
    fn test_decode_keeps_data_without_prompt() {
        assert_eq!(decode_prompt_output(b"partial\r\n").unwrap(), "partial\n");
    }

    #[test]
    fn test_command_validation() {
        assert!(Command::new("rob.presentCard(0, 1, 1500, 2000)").is_ok());
        assert!(Command::new("print('a')\rprint('b')").is_err());
        assert!(Command::new("print('é')").is_err());
        assert!("import source.RobotTester".parse::<Command>().is_ok());
    }

    #[test]
    fn test_command_wire_format() {
        let cmd = Command::new("x = 1").unwrap();
        assert_eq!(cmd.wire_bytes(), b"x = 1\r");
        assert_eq!(cmd.echo_bytes(), b"x = 1\r\n");
    }

    #[test]
    fn test_interrupt_bytes() {
        assert_eq!(Interrupt::Halt.byte(), 0x03);
        assert_eq!(Interrupt::SoftReset.byte(), 0x04);
    }

    #[test]
    fn test_batched_output_stops_at_command_boundary() {
        let mock = MockLink::new();
        mock.respond_to(b"a = 1\r", b"a = 1\r\n>>> ");
        mock.respond_to(b"print(a)\r", b"print(a)\r\n1\r\n>>> ");
        mock.respond_to(b"print(a + 1)\r", b"print(a + 1)\r\n2\r\n>>> ");
        let client = client(&mock);

        let commands: Vec<Command> = ["a = 1", "print(a)", "print(a + 1)"]
            .iter()
            .map(|s| Command::new(*s).unwrap())
            .collect();
        let outputs = client.run_commands(&commands, true).unwrap();

        assert_eq!(outputs, vec!["".to_string(), "1\n".to_string()]);
        for output in &outputs {
            assert!(!output.contains("print"));
        }
        // The last command's output is left for the next reader.
        assert_eq!(client.read_prompt_output().unwrap(), "2\n");
        assert_eq!(mock.written_text(), "a = 1\rprint(a)\rprint(a + 1)\r");
    }

    #[test]
    fn test_fire_and_forget_reads_nothing() {
        let mock = MockLink::new();
        mock.respond_to(b"rob.presentCard(1, 1, 10, 10)\r", b"rob.presentCard(1, 1, 10, 10)\r\n");
        let client = client(&mock);

        let cmd = Command::new("rob.presentCard(1, 1, 10, 10)").unwrap();
        let outputs = client.run_commands(&[cmd], false).unwrap();
        assert!(outputs.is_empty());
        assert_eq!(mock.unread_input(), b"rob.presentCard(1, 1, 10, 10)\r\n".len());
    }

    #[test]
    fn test_echo_wait_rejected_while_streaming() {
        let mock = MockLink::new();
        let client = client(&mock);
        let _streaming = client.channel().lease(ChannelMode::Streaming).unwrap();

        let cmd = Command::new("x = 1").unwrap();
        assert!(matches!(
            client.run_commands(&[cmd.clone()], true),
            Err(RobotError::ChannelBusy { .. })
        ));
        assert!(mock.written().is_empty());

        // Fire-and-forget and interrupts do not read, so they are allowed.
        client.run_commands(&[cmd], false).unwrap();
        client.send_interrupt(Interrupt::Halt).unwrap();
        assert!(matches!(
            client.read_prompt_output(),
            Err(RobotError::ChannelBusy { .. })
        ));
    }
}
