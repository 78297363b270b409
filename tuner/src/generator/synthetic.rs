use cleyecore::channel::{check_output, CommandChannel, Side};
use cleyecore::prelude::{ChannelError, ChannelResult};
use rand::{rngs::StdRng, Rng, SeedableRng};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::rc::Rc;
use std::sync::OnceLock;

/// Value of one transmitter parameter at which the synthetic eye is widest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticOptimum {
    pub name: String,
    pub value: f64,
    pub width: f64,
}

/// Configuration for the offline link used by `--offline` runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub seed: u64,
    pub noise: f64,
    pub optimum: Vec<SyntheticOptimum>,
    /// Values the transmitter reports before anything is set.
    pub initial: HashMap<String, String>,
    pub devices: Vec<String>,
    pub sios: Vec<String>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        let optimum = |name: &str, value: f64, width: f64| SyntheticOptimum {
            name: name.into(),
            value,
            width,
        };
        let initial = [
            ("TXDIFFSWING", "1018 mV (1100)"),
            ("TXPRE", "0.00 dB (00000)"),
            ("TXPOST", "0.45 dB (00010)"),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();

        Self {
            seed: 0,
            noise: 0.005,
            optimum: vec![
                optimum("TXDIFFSWING", 1056.0, 80.0),
                optimum("TXPRE", 0.45, 0.5),
                optimum("TXPOST", 0.92, 0.6),
            ],
            initial,
            devices: vec![
                "localhost:3121/xilinx_tcf/Digilent/210203A2513BA/xc7k325t_0".into(),
                "localhost:3121/xilinx_tcf/Digilent/210203A2513BB/xc7k325t_0".into(),
            ],
            sios: vec![
                "localhost:3121/xilinx_tcf/Digilent/210203A2513BA/0_1_0/IBERT/Quad_113/MGT_X1Y0".into(),
                "localhost:3121/xilinx_tcf/Digilent/210203A2513BA/0_1_0/IBERT/Quad_113/MGT_X1Y1".into(),
            ],
        }
    }
}

struct LinkState {
    config: SyntheticConfig,
    tx_properties: HashMap<String, String>,
    rng: StdRng,
    scans: usize,
}

impl LinkState {
    /// Eye quality in `[0, 1]`, peaking when every parameter sits at its optimum.
    fn quality(&self) -> f64 {
        self.config
            .optimum
            .iter()
            .map(|optimum| {
                let current = self
                    .tx_properties
                    .get(&optimum.name)
                    .and_then(|value| leading_number(value));
                match current {
                    Some(value) => {
                        let distance = (value - optimum.value) / optimum.width.max(f64::EPSILON);
                        (-distance * distance).exp()
                    }
                    None => 0.5,
                }
            })
            .product()
    }

    fn jitter(&mut self) -> f64 {
        let noise = self.config.noise;
        if noise > 0.0 {
            self.rng.gen_range(-noise..noise)
        } else {
            0.0
        }
    }

    fn render_scan(&mut self, request: &ScanRequest) -> String {
        self.scans += 1;
        let quality = self.quality();
        let step = request.horizontal_increment.max(1) as i64;
        let xs: Vec<i64> = (-32..=32).step_by(step as usize).collect();
        let bathtub = request.scan_type.contains("1d");
        let ys: Vec<i64> = if bathtub {
            vec![0]
        } else {
            let vstep = (request.vertical_increment.max(1) * 8) as usize;
            (-120..=120).step_by(vstep).collect()
        };

        let open_area = if quality > 0.6 { quality * 4000.0 } else { 0.0 };
        let mut contents = format!(
            "SW Version,synthetic\nScan Name,synthetic_{}\nHorizontal Increment,{}\nVertical Increment,{}\nOpen Area,{:.1}\nDwell,BER\nScan Start\n{}",
            self.scans,
            request.horizontal_increment,
            request.vertical_increment,
            open_area,
            if bathtub { "1d bathtub" } else { "2d statistical" }
        );
        for x in &xs {
            contents.push_str(&format!(",{}", x));
        }
        contents.push('\n');

        for y in &ys {
            let vertical = 1.0 - (*y as f64).abs() / 240.0;
            contents.push_str(&y.to_string());
            for x in &xs {
                let offset = (*x as f64 / 64.0).abs();
                let value = if quality < 0.05 {
                    // no eye captured: the sweep is clean everywhere
                    1e-7
                } else if offset > 0.45 {
                    0.5
                } else {
                    let opening = quality * 0.4 * (1.0 - offset / 0.45) * vertical;
                    (opening + self.jitter()).max(0.0)
                };
                contents.push_str(&format!(",{:.6}", value));
            }
            contents.push('\n');
        }
        contents.push_str("Scan End\n");
        contents
    }
}

fn leading_number(value: &str) -> Option<f64> {
    value
        .trim_matches(|c| c == '{' || c == '}')
        .split_whitespace()
        .next()
        .and_then(|token| token.parse().ok())
}

struct ScanRequest {
    file: String,
    horizontal_increment: u32,
    vertical_increment: u32,
    scan_type: String,
}

impl ScanRequest {
    fn parse(command: &str) -> Option<Self> {
        static RUN_SCAN: OnceLock<Regex> = OnceLock::new();
        let pattern = RUN_SCAN.get_or_init(|| {
            Regex::new(r#"^run_scan "([^"]*)" (\d+) (\d+) (\S+) (\S+)$"#).expect("valid pattern")
        });
        let captures = pattern.captures(command.trim())?;
        Some(Self {
            file: captures[1].to_string(),
            horizontal_increment: captures[2].parse().ok()?,
            vertical_increment: captures[3].parse().ok()?,
            scan_type: captures[4].to_string(),
        })
    }
}

/// Both ends of an offline link. The consoles share one state so scans on
/// the receiver reflect what was committed on the transmitter.
#[derive(Clone)]
pub struct SimulatedLink {
    state: Rc<RefCell<LinkState>>,
}

impl SimulatedLink {
    pub fn new(config: SyntheticConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        let tx_properties = config.initial.clone();
        Self {
            state: Rc::new(RefCell::new(LinkState {
                config,
                tx_properties,
                rng,
                scans: 0,
            })),
        }
    }

    pub fn console(&self, side: Side) -> SimulatedConsole {
        SimulatedConsole {
            state: self.state.clone(),
            side,
            variables: HashMap::new(),
            properties: HashMap::new(),
            terminated: false,
        }
    }

    pub fn scans_taken(&self) -> usize {
        self.state.borrow().scans
    }
}

/// One console of a [`SimulatedLink`], answering the subset of hardware
/// manager commands the tuner issues.
pub struct SimulatedConsole {
    state: Rc<RefCell<LinkState>>,
    side: Side,
    variables: HashMap<String, String>,
    properties: HashMap<String, String>,
    terminated: bool,
}

impl SimulatedConsole {
    fn respond(&mut self, command: &str) -> ChannelResult<String> {
        let command = command.trim();
        let (verb, rest) = command.split_once(' ').unwrap_or((command, ""));
        let output = match verb {
            "" | "source" | "set_device" | "create_link" | "commit_hw_sio" => String::new(),
            "set" if rest == "devices [fetch_devices]" => {
                let devices = self.state.borrow().config.devices.clone();
                let list = devices
                    .iter()
                    .map(|device| format!("{{{}}}", device))
                    .collect::<Vec<_>>()
                    .join(" ");
                self.variables.insert("devices".into(), list);
                String::new()
            }
            "puts" => {
                let name = rest.trim_start_matches('$');
                match self.variables.get(name) {
                    Some(value) => format!("{}\n", value),
                    None => format!("can't read \"{}\": no such variable\n", name),
                }
            }
            "get_hw_sio_gts" => format!("{}\n", self.state.borrow().config.sios.join(" ")),
            "set_property" => {
                let (name, value) = split_property(rest);
                let value = value.trim_matches(|c| c == '{' || c == '}').to_string();
                match self.side {
                    Side::Tx => {
                        self.state.borrow_mut().tx_properties.insert(name, value);
                    }
                    Side::Rx => {
                        self.properties.insert(name, value);
                    }
                }
                String::new()
            }
            "get_property" => {
                let name = rest.split(' ').next().unwrap_or_default();
                let value = match self.side {
                    Side::Tx => self.state.borrow().tx_properties.get(name).cloned(),
                    Side::Rx => self.properties.get(name).cloned(),
                };
                format!("{}\n", value.unwrap_or_else(|| "0".into()))
            }
            "run_scan" if self.side == Side::Rx => match ScanRequest::parse(command) {
                Some(request) => {
                    let contents = self.state.borrow_mut().render_scan(&request);
                    fs::write(&request.file, contents)?;
                    format!("INFO: scan written to {}\n", request.file)
                }
                None => "ERROR: [Labtoolstcl 44-1] malformed run_scan arguments\n".into(),
            },
            "run_scan" => "ERROR: [Labtoolstcl 44-2] no link found on this console\n".into(),
            _ => format!("invalid command name \"{}\"\n", verb),
        };
        Ok(output)
    }
}

/// `NAME VALUE [TARGET]`, where VALUE may be a braced list with spaces.
fn split_property(rest: &str) -> (String, String) {
    let (name, remainder) = rest.split_once(' ').unwrap_or((rest, ""));
    let value = remainder
        .rsplit_once(" [")
        .map_or(remainder, |(value, _)| value);
    (name.to_string(), value.to_string())
}

impl CommandChannel for SimulatedConsole {
    fn send_command(&mut self, command: &str, error_markers: &[&str]) -> ChannelResult<String> {
        if self.terminated {
            return Err(ChannelError::Terminated);
        }
        let output = self.respond(command)?;
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
        self.terminated = true;
        Ok(Some(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cleyecore::eye::EyeEvaluator;
    use cleyecore::scan::parse_scan_file;
    use tempfile::TempDir;

    fn quiet() -> SyntheticConfig {
        SyntheticConfig {
            noise: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn tx_properties_are_visible_to_scans() {
        let link = SimulatedLink::new(quiet());
        let mut tx = link.console(Side::Tx);
        tx.send_command("set_property TXPRE {0.45 dB (00010)} [get_hw_sio_gts {gt0}]", &[])
            .unwrap();
        let readback = tx.get_property("TXPRE", "[get_hw_sio_gts {gt0}]").unwrap();
        assert_eq!(readback, "0.45 dB (00010)");
    }

    #[test]
    fn scans_open_wider_near_the_optimum() {
        let dir = TempDir::new().unwrap();
        let link = SimulatedLink::new(quiet());
        let mut tx = link.console(Side::Tx);
        let mut rx = link.console(Side::Rx);
        let evaluator = EyeEvaluator::default();

        let mut score = |swing: &str, name: &str| {
            tx.set_property("TXDIFFSWING", swing, "[get_hw_sio_gts {gt0}]")
                .unwrap();
            let file = dir.path().join(name);
            rx.send_command(
                &format!("run_scan \"{}\" 4 4 2d_full_eye *", file.display()),
                &["ERROR: "],
            )
            .unwrap();
            evaluator.open_area(&parse_scan_file(&file).unwrap()).unwrap()
        };

        let far = score("{741 mV (0111)}", "far.csv");
        let near = score("{1056 mV (1101)}", "near.csv");
        assert!(near > far, "near {} far {}", near, far);
        assert_eq!(link.scans_taken(), 2);
    }

    #[test]
    fn scan_requests_are_parsed_from_commands() {
        for _ in 0..2 {
            let request = ScanRequest::parse("run_scan \"a b.csv\" 8 2 2d_full_eye *").unwrap();
            assert_eq!(request.file, "a b.csv");
            assert_eq!(request.horizontal_increment, 8);
            assert_eq!(request.vertical_increment, 2);
            assert_eq!(request.scan_type, "2d_full_eye");
        }
        assert!(ScanRequest::parse("run_scan x.csv 8 2 2d_full_eye *").is_none());
        assert!(ScanRequest::parse("run_scan \"x.csv\" -1 2 2d_full_eye *").is_none());
    }

    #[test]
    fn transmitter_console_cannot_scan() {
        let link = SimulatedLink::new(quiet());
        let mut tx = link.console(Side::Tx);
        assert!(tx
            .send_command("run_scan \"x.csv\" 4 4 2d_full_eye *", &["ERROR: "])
            .is_err());
    }

    #[test]
    fn devices_variable_needs_fetch_first() {
        let link = SimulatedLink::new(quiet());
        let mut rx = link.console(Side::Rx);
        assert!(matches!(
            rx.read_variable("devices"),
            Err(ChannelError::UndefinedVariable(_))
        ));
        rx.send_command("set devices [fetch_devices]", &[]).unwrap();
        let lines = rx.read_variable("devices").unwrap();
        assert!(lines[0].starts_with('{'));
    }
}
