use crate::channel::{check_output, CommandChannel};
use crate::prelude::{ChannelError, ChannelResult};
use std::collections::HashMap;

/// In-memory console that remembers `set_property` values and records
/// every command it receives.
#[derive(Default)]
pub(crate) struct ScriptedChannel {
    replies: HashMap<String, String>,
    properties: HashMap<String, String>,
    readback: Option<String>,
    fail_prefix: Option<String>,
    terminated: bool,
    pub sent: Vec<String>,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, command: &str, output: &str) -> Self {
        self.replies.insert(command.to_string(), output.to_string());
        self
    }

    pub fn property(mut self, name: &str, value: &str) -> Self {
        self.properties.insert(name.to_string(), value.to_string());
        self
    }

    /// Every `get_property` answers `value` regardless of what was set.
    pub fn readback(mut self, value: &str) -> Self {
        self.readback = Some(value.to_string());
        self
    }

    /// Commands starting with `prefix` print a console error.
    pub fn fail_on(mut self, prefix: &str) -> Self {
        self.fail_prefix = Some(prefix.to_string());
        self
    }

    pub fn sent_matching(&self, prefix: &str) -> Vec<&str> {
        self.sent
            .iter()
            .filter(|command| command.starts_with(prefix))
            .map(String::as_str)
            .collect()
    }

    fn respond(&mut self, command: &str) -> String {
        if let Some(output) = self.replies.get(command) {
            return output.clone();
        }
        if let Some(prefix) = &self.fail_prefix {
            if command.starts_with(prefix.as_str()) {
                return "ERROR: [Labtoolstcl 44-156] scripted failure\n".into();
            }
        }
        if let Some(rest) = command.strip_prefix("set_property ") {
            if let Some((name, rest)) = rest.split_once(' ') {
                let value = rest.rsplit_once(" [").map_or(rest, |(value, _)| value);
                self.properties.insert(
                    name.to_string(),
                    value.trim_matches(|c| c == '{' || c == '}').to_string(),
                );
            }
            return String::new();
        }
        if let Some(rest) = command.strip_prefix("get_property ") {
            let name = rest.split(' ').next().unwrap_or_default();
            let value = self
                .readback
                .clone()
                .or_else(|| self.properties.get(name).cloned())
                .unwrap_or_default();
            return format!("{}\n", value);
        }
        String::new()
    }
}

impl CommandChannel for ScriptedChannel {
    fn send_command(&mut self, command: &str, error_markers: &[&str]) -> ChannelResult<String> {
        if self.terminated {
            return Err(ChannelError::Terminated);
        }
        self.sent.push(command.to_string());
        let output = self.respond(command);
        check_output(command, &output, error_markers)?;
        Ok(output)
    }

    fn is_terminated(&mut self) -> bool {
        self.terminated
    }

    fn shutdown(&mut self) -> ChannelResult<Option<i32>> {
        if self.terminated {
            return Ok(None);
        }
        self.sent.push("exit".into());
        self.terminated = true;
        Ok(Some(0))
    }
}
