use crate::channel::CommandChannel;
use crate::prelude::{ChannelError, ChannelResult, ScanSettings};
use log::{info, warn};
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Which end of the link a console drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Side {
    Tx,
    Rx,
}

impl Side {
    pub fn label(&self) -> &'static str {
        match self {
            Side::Tx => "TX",
            Side::Rx => "RX",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One console session bound to a transceiver channel (SIO).
pub struct Transceiver<C> {
    channel: C,
    side: Side,
    sio: Option<String>,
}

impl<C: CommandChannel> Transceiver<C> {
    pub fn new(channel: C, side: Side) -> Self {
        Self {
            channel,
            side,
            sio: None,
        }
    }

    pub fn linked(channel: C, side: Side, sio: &str) -> Self {
        Self {
            channel,
            side,
            sio: Some(sio.to_string()),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn sio(&self) -> Option<&str> {
        self.sio.as_deref()
    }

    pub fn set_sio(&mut self, sio: &str) {
        self.sio = Some(sio.to_string());
    }

    pub fn channel(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn into_channel(self) -> C {
        self.channel
    }

    /// Tcl expression selecting this side's SIO object.
    pub fn sio_target(&self) -> ChannelResult<String> {
        self.sio
            .as_ref()
            .map(|sio| format!("[get_hw_sio_gts {{{}}}]", sio))
            .ok_or_else(|| ChannelError::NotLinked(self.side.label().into()))
    }

    pub fn get_parameter(&mut self, name: &str) -> ChannelResult<String> {
        let target = self.sio_target()?;
        self.channel.get_property(name, &target)
    }

    pub fn set_parameter(&mut self, name: &str, value: &str) -> ChannelResult<()> {
        let target = self.sio_target()?;
        self.channel.set_property(name, value, &target)
    }

    pub fn commit(&mut self) -> ChannelResult<()> {
        let command = format!("commit_hw_sio {}", self.sio_target()?);
        self.channel.send_command(&command, &[])?;
        Ok(())
    }

    /// Pulses `PORT.GT{TX,RX}RESET` with a commit after each edge.
    pub fn reset_gt(&mut self) -> ChannelResult<()> {
        let reset = format!("PORT.GT{}RESET", self.side.label());
        self.set_parameter(&reset, "1")?;
        self.commit()?;
        self.set_parameter(&reset, "0")?;
        self.commit()
    }

    /// Runs an eye scan writing into `file`; returns once the console
    /// prompt is back, i.e. once the file is complete.
    pub fn run_scan(&mut self, file: &Path, settings: &ScanSettings) -> ChannelResult<String> {
        let command = format!(
            "run_scan \"{}\" {} {} {} {}",
            file.to_string_lossy().replace('\\', "/"),
            settings.horizontal_increment,
            settings.vertical_increment,
            settings.scan_type,
            settings.link_name
        );
        self.channel.send_command(&command, &["ERROR: "])
    }

    pub fn source(&mut self, script: &str) -> ChannelResult<()> {
        self.channel.send_command(&format!("source {}", script), &[])?;
        Ok(())
    }

    pub fn shutdown(&mut self) -> ChannelResult<Option<i32>> {
        if self.channel.is_terminated() {
            warn!("{} console has already terminated", self.side);
            return Ok(None);
        }
        info!("Exiting {} console", self.side);
        self.channel.shutdown()
    }
}
