use crate::workflow::config::LinkSelection;
use anyhow::{bail, Context};
use cleyecore::channel::{output_lines, CommandChannel, Side, Transceiver};
use cleyecore::prelude::ChannelError;
use cleyecore::sweep::CancelToken;
use log::info;
use regex::Regex;
use std::io::{BufRead, Write};
use std::sync::OnceLock;

const SET_DEVICE_ERRORS: &[&str] = &["DONE status = 0", "The debug hub core was not detected."];
const NO_SIO_ERROR: &str = "No matching hw_sio_gts were found.";

/// Picks one entry out of a numbered list.
pub trait Selector {
    fn select(&mut self, title: &str, options: &[String]) -> anyhow::Result<usize>;
}

/// Prints the options and reads an index, asking again until it is valid.
pub struct MenuSelector<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> MenuSelector<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> Selector for MenuSelector<R, W> {
    fn select(&mut self, title: &str, options: &[String]) -> anyhow::Result<usize> {
        if options.is_empty() {
            bail!("nothing to choose from for {}", title);
        }
        for (index, option) in options.iter().enumerate() {
            writeln!(self.output, "{} {}", index, option)?;
        }
        loop {
            write!(self.output, "{}: ", title)?;
            self.output.flush()?;
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                bail!("input closed while choosing {}", title);
            }
            match line.trim().parse::<usize>() {
                Ok(index) if index < options.len() => return Ok(index),
                _ => writeln!(self.output, "Enter a number between 0 and {}", options.len() - 1)?,
            }
        }
    }
}

/// Answers from preset indexes, falling back to another selector for the
/// ones left unset.
pub struct PresetSelector<S> {
    presets: Vec<(String, usize)>,
    fallback: S,
}

impl<S: Selector> PresetSelector<S> {
    pub fn new(selection: &LinkSelection, fallback: S) -> Self {
        let presets = [
            (device_title(Side::Tx), selection.tx_device),
            (device_title(Side::Rx), selection.rx_device),
            (sio_title(Side::Tx), selection.tx_sio),
            (sio_title(Side::Rx), selection.rx_sio),
        ]
        .into_iter()
        .filter_map(|(title, index)| index.map(|index| (title, index)))
        .collect();
        Self { presets, fallback }
    }
}

impl<S: Selector> Selector for PresetSelector<S> {
    fn select(&mut self, title: &str, options: &[String]) -> anyhow::Result<usize> {
        match self.presets.iter().find(|(preset, _)| preset == title) {
            Some((_, index)) if *index < options.len() => Ok(*index),
            Some((_, index)) => bail!(
                "{} index {} is out of range ({} available)",
                title,
                index,
                options.len()
            ),
            None => self.fallback.select(title, options),
        }
    }
}

/// Refuses every question; used when no operator is available.
pub struct NoOperator;

impl Selector for NoOperator {
    fn select(&mut self, title: &str, _options: &[String]) -> anyhow::Result<usize> {
        bail!("{} was not preset and no operator input is available", title)
    }
}

pub fn device_title(side: Side) -> String {
    format!("Choose device for {}", side)
}

pub fn sio_title(side: Side) -> String {
    format!("Choose a SIO for {} side", side)
}

/// Items of a Tcl list whose elements are brace-quoted.
pub fn parse_device_list(line: &str) -> Vec<String> {
    static BRACED: OnceLock<Regex> = OnceLock::new();
    let braced = BRACED.get_or_init(|| Regex::new(r"\{(.+?)\}").expect("valid pattern"));
    braced
        .captures_iter(line)
        .map(|captures| captures[1].to_string())
        .collect()
}

pub fn fetch_devices<C: CommandChannel>(session: &mut Transceiver<C>) -> anyhow::Result<Vec<String>> {
    info!("Exploring target devices (fetch_devices: this can take a while)");
    session
        .channel()
        .send_command("set devices [fetch_devices]", &[])
        .context("fetching devices")?;
    let lines = match session.channel().read_variable("devices") {
        Ok(lines) => lines,
        Err(ChannelError::UndefinedVariable(_)) => {
            bail!("No target device found. Please connect and power up your device(s)")
        }
        Err(err) => return Err(err).context("reading the device list"),
    };
    let devices = lines
        .first()
        .map(|line| parse_device_list(line))
        .unwrap_or_default();
    if devices.is_empty() {
        bail!("No target device found. Please connect and power up your device(s)");
    }
    Ok(devices)
}

pub fn choose_device<C: CommandChannel>(
    session: &mut Transceiver<C>,
    devices: &[String],
    selector: &mut dyn Selector,
) -> anyhow::Result<String> {
    let side = session.side();
    let index = selector.select(&device_title(side), devices)?;
    let device = devices[index].clone();
    info!("{} device: {}", side, device);
    session
        .channel()
        .send_command(&format!("set_device {}", device), SET_DEVICE_ERRORS)
        .with_context(|| format!("opening {} device {}", side, device))?;
    Ok(device)
}

/// Selects the transceiver channel; the receiving side also creates the link.
pub fn choose_sio<C: CommandChannel>(
    session: &mut Transceiver<C>,
    selector: &mut dyn Selector,
) -> anyhow::Result<String> {
    let side = session.side();
    session.channel().send_command("", &[])?;
    let output = session
        .channel()
        .send_command("get_hw_sio_gts", &[NO_SIO_ERROR])
        .with_context(|| format!("listing transceivers on {}", side))?;
    let sios: Vec<String> = output_lines(&output)
        .first()
        .map(|line| line.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    if sios.is_empty() {
        bail!("{} console listed no transceivers", side);
    }

    let index = selector.select(&sio_title(side), &sios)?;
    let sio = sios[index].clone();
    session.set_sio(&sio);
    info!("{} SIO: {}", side, sio);

    if side == Side::Rx {
        session
            .channel()
            .send_command(&format!("create_link {}", sio), &[])
            .context("creating the link")?;
    }
    Ok(sio)
}

/// Devices are enumerated once on the receiver and offered to both sides.
/// An interrupt stops the setup between console steps.
pub fn establish_link<T: CommandChannel, R: CommandChannel>(
    tx: &mut Transceiver<T>,
    rx: &mut Transceiver<R>,
    selector: &mut dyn Selector,
    cancel: &CancelToken,
) -> anyhow::Result<()> {
    cancel.check()?;
    let devices = fetch_devices(rx)?;
    cancel.check()?;
    choose_device(tx, &devices, selector)?;
    cancel.check()?;
    choose_device(rx, &devices, selector)?;
    cancel.check()?;
    choose_sio(tx, selector)?;
    cancel.check()?;
    choose_sio(rx, selector)?;
    Ok(())
}
