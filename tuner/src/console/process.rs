use crate::workflow::config::ConsoleConfig;
use cleyecore::channel::{check_output, CommandChannel};
use cleyecore::prelude::{ChannelError, ChannelResult};
use log::{debug, warn};
use std::io::{Read, Write};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Console output gathered so far. The prompt is only looked for on stdout,
/// so diagnostics written to stderr cannot split it.
#[derive(Default)]
struct Pending {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl Pending {
    fn push(&mut self, stream: Stream, chunk: &[u8]) {
        match stream {
            Stream::Stdout => self.stdout.extend_from_slice(chunk),
            Stream::Stderr => self.stderr.extend_from_slice(chunk),
        }
    }

    /// Stdout up to the prompt, followed by whatever stderr arrived meanwhile.
    fn take_reply(&mut self, prompt: &[u8]) -> Option<String> {
        let position = find(&self.stdout, prompt)?;
        let mut text = String::from_utf8_lossy(&self.stdout[..position]).into_owned();
        self.stdout.drain(..position + prompt.len());
        if !self.stderr.is_empty() {
            text.push_str(&String::from_utf8_lossy(&self.stderr));
            self.stderr.clear();
        }
        Some(text)
    }
}

/// A console process driven over its standard streams. Output is collected
/// by reader threads and matched against the prompt sentinel.
pub struct ProcessChannel {
    label: String,
    prompt: Vec<u8>,
    child: Child,
    stdin: ChildStdin,
    output: Receiver<(Stream, Vec<u8>)>,
    pending: Pending,
    exit: Option<ExitStatus>,
}

impl ProcessChannel {
    pub fn spawn(config: &ConsoleConfig, label: &str) -> ChannelResult<Self> {
        let mut command = Command::new(&config.executable);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Keep operator interrupts away from the console; the tuner shuts it
        // down itself.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn()?;
        let stdin = child.stdin.take().ok_or(ChannelError::Terminated)?;
        let stdout = child.stdout.take().ok_or(ChannelError::Terminated)?;
        let stderr = child.stderr.take().ok_or(ChannelError::Terminated)?;

        let (sender, output) = mpsc::channel();
        forward(stdout, Stream::Stdout, sender.clone());
        forward(stderr, Stream::Stderr, sender);

        Ok(Self {
            label: label.to_string(),
            prompt: config.prompt.as_bytes().to_vec(),
            child,
            stdin,
            output,
            pending: Pending::default(),
            exit: None,
        })
    }

    /// Blocks until the first prompt, returning the startup banner.
    pub fn wait_startup(&mut self) -> ChannelResult<String> {
        let banner = self.read_until_prompt()?;
        debug!("[{}] {}", self.label, banner);
        Ok(banner)
    }

    fn read_until_prompt(&mut self) -> ChannelResult<String> {
        loop {
            if let Some(text) = self.pending.take_reply(&self.prompt) {
                return Ok(text);
            }
            match self.output.recv_timeout(POLL_INTERVAL) {
                Ok((stream, chunk)) => self.pending.push(stream, &chunk),
                Err(RecvTimeoutError::Timeout) => {
                    if self.is_terminated() {
                        return Err(ChannelError::Terminated);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Err(ChannelError::Terminated),
            }
        }
    }

    fn write_line(&mut self, line: &str) -> ChannelResult<()> {
        self.stdin.write_all(line.as_bytes())?;
        self.stdin.write_all(b"\n")?;
        self.stdin.flush()?;
        Ok(())
    }
}

fn forward<R: Read + Send + 'static>(
    mut stream: R,
    tag: Stream,
    sender: Sender<(Stream, Vec<u8>)>,
) {
    thread::spawn(move || {
        let mut buffer = [0u8; 4096];
        loop {
            match stream.read(&mut buffer) {
                Ok(0) | Err(_) => break,
                Ok(count) => {
                    if sender.send((tag, buffer[..count].to_vec())).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

impl CommandChannel for ProcessChannel {
    fn send_command(&mut self, command: &str, error_markers: &[&str]) -> ChannelResult<String> {
        if self.is_terminated() {
            return Err(ChannelError::Terminated);
        }
        self.write_line(command)?;
        let output = self.read_until_prompt()?;
        debug!("[{}] {}\n{}", self.label, command, output);
        check_output(command, &output, error_markers)?;
        Ok(output)
    }

    fn is_terminated(&mut self) -> bool {
        if self.exit.is_some() {
            return true;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit = Some(status);
                true
            }
            Ok(None) => false,
            Err(_) => true,
        }
    }

    fn shutdown(&mut self) -> ChannelResult<Option<i32>> {
        if self.is_terminated() {
            warn!("[{}] console has already terminated", self.label);
            return Ok(None);
        }
        self.write_line("exit")?;
        let status = self.child.wait()?;
        self.exit = Some(status);
        Ok(status.code())
    }
}

impl Drop for ProcessChannel {
    fn drop(&mut self) {
        if !self.is_terminated() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell() -> ConsoleConfig {
        ConsoleConfig {
            executable: "sh".into(),
            args: vec!["-c".into(), "echo ready; printf 'sh> '; while read line; do if [ \"$line\" = exit ]; then exit 3; fi; eval \"$line\"; printf 'sh> '; done".into()],
            prompt: "sh> ".into(),
            startup_script: None,
        }
    }

    #[test]
    fn commands_return_output_up_to_prompt() {
        let mut channel = ProcessChannel::spawn(&shell(), "TX").unwrap();
        assert!(channel.wait_startup().unwrap().contains("ready"));
        let output = channel.send_command("echo 1018 mV", &[]).unwrap();
        assert_eq!(output.trim(), "1018 mV");
        assert!(matches!(
            channel.send_command("echo ERROR: broken", &["ERROR: "]),
            Err(ChannelError::Command { .. })
        ));
        assert_eq!(channel.shutdown().unwrap(), Some(3));
        assert!(matches!(
            channel.send_command("echo late", &[]),
            Err(ChannelError::Terminated)
        ));
        assert_eq!(channel.shutdown().unwrap(), None);
    }

    #[test]
    fn stderr_between_prompt_halves_is_kept_apart() {
        let config = ConsoleConfig {
            executable: "sh".into(),
            args: vec!["-c".into(), "prompt() { printf 'sh'; printf 'WARNING: slow\\n' >&2; sleep 0.2; printf '> '; }; prompt; while read line; do eval \"$line\"; prompt; done".into()],
            prompt: "sh> ".into(),
            startup_script: None,
        };
        let mut channel = ProcessChannel::spawn(&config, "RX").unwrap();
        assert!(channel.wait_startup().unwrap().contains("WARNING: slow"));
        let output = channel.send_command("echo 1018 mV", &[]).unwrap();
        assert!(output.starts_with("1018 mV\n"));
        assert!(output.contains("WARNING: slow"));
    }

    #[test]
    fn prompt_is_matched_on_stdout_only() {
        let mut pending = Pending::default();
        pending.push(Stream::Stdout, b"42\nViva");
        pending.push(Stream::Stderr, b"ERROR: late\n");
        assert_eq!(pending.take_reply(b"Vivado% "), None);
        pending.push(Stream::Stdout, b"do% next");
        assert_eq!(
            pending.take_reply(b"Vivado% ").as_deref(),
            Some("42\nERROR: late\n")
        );
        assert_eq!(pending.stdout, b"next");
        assert!(pending.stderr.is_empty());
    }

    #[test]
    fn finding_prompt_in_bytes() {
        assert_eq!(find(b"abc Vivado% ", b"Vivado% "), Some(4));
        assert_eq!(find(b"abc", b"Vivado% "), None);
    }
}
