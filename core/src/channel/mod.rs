//! Request/response conversation with a device-control console.
//!
//! The transport (a spawned console process, a simulated link, a test
//! script) implements [`CommandChannel::send_command`] and
//! [`CommandChannel::shutdown`]; the property and variable helpers are
//! built on top of them.

pub mod device;

#[cfg(test)]
pub(crate) mod testing;

use crate::prelude::{ChannelError, ChannelResult};

pub use device::{Side, Transceiver};

pub trait CommandChannel {
    /// Sends one command line and blocks until the prompt reappears.
    ///
    /// Returns everything printed between the command and the prompt. Fails
    /// with [`ChannelError::Command`] when the output contains any of
    /// `error_markers` and with [`ChannelError::Terminated`] when the console
    /// has already exited.
    fn send_command(&mut self, command: &str, error_markers: &[&str]) -> ChannelResult<String>;

    fn is_terminated(&mut self) -> bool;

    /// Issues an orderly exit and waits for the console to stop. Returns
    /// `None` when it had already terminated.
    fn shutdown(&mut self) -> ChannelResult<Option<i32>>;

    fn get_property(&mut self, name: &str, target: &str) -> ChannelResult<String> {
        let command = format!("get_property {} {}", name, target);
        let output = self.send_command(&command, &[])?;
        output_lines(&output)
            .into_iter()
            .next()
            .ok_or(ChannelError::UnexpectedResponse { command, output })
    }

    fn set_property(&mut self, name: &str, value: &str, target: &str) -> ChannelResult<()> {
        let command = format!("set_property {} {} {}", name, value, target);
        self.send_command(&command, &[])?;
        Ok(())
    }

    /// Prints a console variable and returns its lines.
    fn read_variable(&mut self, name: &str) -> ChannelResult<Vec<String>> {
        let output = self.send_command(&format!("puts ${}", name), &[])?;
        let lines = output_lines(&output);
        let missing = format!("can't read \"{}\": no such variable", name);
        match lines.first() {
            Some(first) if *first == missing => Err(ChannelError::UndefinedVariable(name.into())),
            _ => Ok(lines),
        }
    }
}

impl<C: CommandChannel + ?Sized> CommandChannel for Box<C> {
    fn send_command(&mut self, command: &str, error_markers: &[&str]) -> ChannelResult<String> {
        (**self).send_command(command, error_markers)
    }

    fn is_terminated(&mut self) -> bool {
        (**self).is_terminated()
    }

    fn shutdown(&mut self) -> ChannelResult<Option<i32>> {
        (**self).shutdown()
    }
}

/// Checks console output against caller-supplied error substrings.
pub fn check_output(command: &str, output: &str, error_markers: &[&str]) -> ChannelResult<()> {
    if error_markers.iter().any(|marker| output.contains(marker)) {
        return Err(ChannelError::Command {
            command: command.to_string(),
            output: output.to_string(),
        });
    }
    Ok(())
}

/// Non-empty output lines with line endings stripped.
pub fn output_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}
