use crate::workflow::runner::shutdown_both;
use anyhow::Context;
use cleyecore::channel::{CommandChannel, Side, Transceiver};
use std::io::{BufRead, Write};

enum Directive<'a> {
    Switch(Side),
    Quit,
    Unknown(&'a str),
    Forward(&'a str),
}

fn parse(line: &str) -> Directive<'_> {
    match line.strip_prefix('!') {
        Some(word) => match word.trim().to_lowercase().as_str() {
            "tx" => Directive::Switch(Side::Tx),
            "rx" => Directive::Switch(Side::Rx),
            "q" | "quit" | "exit" => Directive::Quit,
            _ => Directive::Unknown(word),
        },
        None => Directive::Forward(line),
    }
}

/// Hands both consoles to the operator. `!tx` and `!rx` pick the console
/// that receives the following lines, `!q` shuts both down. End of input
/// counts as `!q`.
pub fn run_interactive<T, R, I, O>(
    tx: &mut Transceiver<T>,
    rx: &mut Transceiver<R>,
    input: I,
    output: O,
) -> anyhow::Result<()>
where
    T: CommandChannel,
    R: CommandChannel,
    I: BufRead,
    O: Write,
{
    let result = pass_through(tx, rx, input, output);
    shutdown_both(tx, rx);
    result
}

fn pass_through<T, R, I, O>(
    tx: &mut Transceiver<T>,
    rx: &mut Transceiver<R>,
    mut input: I,
    mut output: O,
) -> anyhow::Result<()>
where
    T: CommandChannel,
    R: CommandChannel,
    I: BufRead,
    O: Write,
{
    let mut active = Side::Rx;
    writeln!(output, "Switching to {} console", active)?;
    loop {
        write!(output, "{}% ", active)?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            return Ok(());
        }
        let line = line.trim_end_matches(&['\r', '\n'][..]);

        match parse(line) {
            Directive::Switch(side) => {
                active = side;
                writeln!(output, "Switching to {} console", active)?;
            }
            Directive::Quit => return Ok(()),
            Directive::Unknown(word) => writeln!(output, "unknown command !{}", word)?,
            Directive::Forward(command) => {
                let reply = match active {
                    Side::Tx => tx.channel().send_command(command, &[]),
                    Side::Rx => rx.channel().send_command(command, &[]),
                }
                .with_context(|| format!("{} console", active))?;
                write!(output, "{}", reply)?;
            }
        }
    }
}
