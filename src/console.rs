//! Console input handling
//!
//! Translates typed command lines into console commands.

use crate::error::CodecError;
use crate::link::Outbound;
use crate::registry::{
    Arming, MessageType, MotorThrust, Payload, Setpoint, SpecialCommand, SpecialCommandKind,
};
use std::fmt;

/// Help text printed by `help`
pub const HELP: &str = "\
commands:
  thrust <m1> <m2> <m3> <m4>   set all four motor thrusts
  arming <0|1>                 disarm / arm
  pitch <v> | roll <v> | yaw <v>
  motor <1-4> <v>              single motor setpoint
  beep <1-4>                   beep a motor
  reverse <1-4>                toggle spin direction of a motor
  magcal                       start magnetometer calibration
  raw <text>                   send a plain text line
  stats                        show link counters
  help                         show this text
  quit                         exit";

/// Command to execute in the console loop
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Send(Outbound),
    Stats,
    Help,
    Quit,
}

/// Rejected command line
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleError {
    UnknownCommand(String),
    /// Wrong number of arguments; carries the usage line
    Usage(&'static str),
    InvalidNumber(String),
    Payload(CodecError),
}

impl std::error::Error for ConsoleError {}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCommand(cmd) => write!(f, "unknown command '{}' (try 'help')", cmd),
            Self::Usage(usage) => write!(f, "usage: {}", usage),
            Self::InvalidNumber(arg) => write!(f, "not a number: '{}'", arg),
            Self::Payload(e) => write!(f, "{}", e),
        }
    }
}

impl From<CodecError> for ConsoleError {
    fn from(e: CodecError) -> Self {
        Self::Payload(e)
    }
}

/// Parse one input line; blank lines yield `None`
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, ConsoleError> {
    let line = line.trim();
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };
    if cmd.is_empty() {
        return Ok(None);
    }
    let args: Vec<&str> = rest.split_whitespace().collect();

    let command = match cmd.to_ascii_lowercase().as_str() {
        "quit" | "exit" | "q" => ConsoleCommand::Quit,
        "help" | "?" => ConsoleCommand::Help,
        "stats" => ConsoleCommand::Stats,

        "thrust" => {
            let [m1, m2, m3, m4] = floats::<4>(&args, "thrust <m1> <m2> <m3> <m4>")?;
            send(Payload::Thrust(MotorThrust::new(m1, m2, m3, m4)))
        }
        "arming" => {
            let [arg] = exact::<1>(&args, "arming <0|1>")?;
            let armed = match arg {
                "0" => false,
                "1" => true,
                _ => return Err(ConsoleError::Usage("arming <0|1>")),
            };
            send(Payload::Arming(Arming { armed }))
        }
        "pitch" => {
            let [value] = floats::<1>(&args, "pitch <v>")?;
            send(Payload::Pitch(Setpoint { value }))
        }
        "roll" => {
            let [value] = floats::<1>(&args, "roll <v>")?;
            send(Payload::Roll(Setpoint { value }))
        }
        "yaw" => {
            let [value] = floats::<1>(&args, "yaw <v>")?;
            send(Payload::Yaw(Setpoint { value }))
        }
        "motor" => {
            let [index, value] = exact::<2>(&args, "motor <1-4> <v>")?;
            let index = motor_index(index)?;
            let value = float(value)?;
            MessageType::motor(index)?;
            send(Payload::Motor {
                index,
                setpoint: Setpoint { value },
            })
        }
        "beep" => {
            let [index] = exact::<1>(&args, "beep <1-4>")?;
            let command = SpecialCommandKind::beep(motor_index(index)?)?;
            send(Payload::SpecialCommand(SpecialCommand { command }))
        }
        "reverse" => {
            let [index] = exact::<1>(&args, "reverse <1-4>")?;
            let command = SpecialCommandKind::reverse_spin(motor_index(index)?)?;
            send(Payload::SpecialCommand(SpecialCommand { command }))
        }
        "magcal" => {
            exact::<0>(&args, "magcal")?;
            send(Payload::MagCalibrate)
        }
        "raw" => {
            if rest.is_empty() {
                return Err(ConsoleError::Usage("raw <text>"));
            }
            ConsoleCommand::Send(Outbound::Text(rest.to_string()))
        }

        other => return Err(ConsoleError::UnknownCommand(other.to_string())),
    };
    Ok(Some(command))
}

fn send(payload: Payload) -> ConsoleCommand {
    ConsoleCommand::Send(Outbound::Payload(payload))
}

fn exact<'a, const N: usize>(
    args: &[&'a str],
    usage: &'static str,
) -> Result<[&'a str; N], ConsoleError> {
    <[&str; N]>::try_from(args).map_err(|_| ConsoleError::Usage(usage))
}

fn floats<const N: usize>(args: &[&str], usage: &'static str) -> Result<[f32; N], ConsoleError> {
    let args = exact::<N>(args, usage)?;
    let mut out = [0.0; N];
    for (slot, arg) in out.iter_mut().zip(args) {
        *slot = float(arg)?;
    }
    Ok(out)
}

fn float(arg: &str) -> Result<f32, ConsoleError> {
    arg.parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ConsoleError::InvalidNumber(arg.to_string()))
}

fn motor_index(arg: &str) -> Result<u8, ConsoleError> {
    arg.parse::<u8>()
        .map_err(|_| ConsoleError::InvalidNumber(arg.to_string()))
}
