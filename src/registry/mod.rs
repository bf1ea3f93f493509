//! Message-type registry
//!
//! Fixed mapping from message-type id to payload structure. The table is
//! immutable and must match the firmware exactly; there is no negotiation.
//!
//! | id  | message        | payload          |
//! |-----|----------------|------------------|
//! | 0   | Arming         | `Arming`         |
//! | 1   | Thrust         | `MotorThrust`    |
//! | 2-4 | Pitch/Roll/Yaw | `Setpoint`       |
//! | 5-8 | Motor1..4      | `Setpoint`       |
//! | 10  | SampleUpdate   | `LogData`        |
//! | 50  | MagCalibrate   | empty            |
//! | 100 | SpecialCommand | `SpecialCommand` |

pub mod layout;
pub mod types;

pub use layout::{Field, FieldKind, Packed, StructLayout, Value, Values};
pub use types::{
    Arming, ControlOutputs, ControllerInputs, EstimationState, LogData, Motor, MotorThrust,
    PidGains, SensorsData, Setpoint, SpecialCommand, SpecialCommandKind, Vec3, Waypoint,
};

use crate::codec::frame::{self, Frame};
use crate::error::CodecError;
use std::fmt;

/// Message-type identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Arming = 0,
    Thrust = 1,
    Pitch = 2,
    Roll = 3,
    Yaw = 4,
    Motor1 = 5,
    Motor2 = 6,
    Motor3 = 7,
    Motor4 = 8,
    SampleUpdate = 10,
    MagCalibrate = 50,
    SpecialCommand = 100,
}

impl MessageType {
    pub const ALL: [Self; 12] = [
        Self::Arming,
        Self::Thrust,
        Self::Pitch,
        Self::Roll,
        Self::Yaw,
        Self::Motor1,
        Self::Motor2,
        Self::Motor3,
        Self::Motor4,
        Self::SampleUpdate,
        Self::MagCalibrate,
        Self::SpecialCommand,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Arming => "Arming",
            Self::Thrust => "Thrust",
            Self::Pitch => "Pitch",
            Self::Roll => "Roll",
            Self::Yaw => "Yaw",
            Self::Motor1 => "Motor1",
            Self::Motor2 => "Motor2",
            Self::Motor3 => "Motor3",
            Self::Motor4 => "Motor4",
            Self::SampleUpdate => "SampleUpdate",
            Self::MagCalibrate => "MagCalibrate",
            Self::SpecialCommand => "SpecialCommand",
        }
    }

    /// Payload layout, `None` for messages without payload
    pub fn layout(self) -> Option<&'static StructLayout> {
        match self {
            Self::Arming => Some(&types::ARMING),
            Self::Thrust => Some(&types::MOTOR_THRUST),
            Self::Pitch
            | Self::Roll
            | Self::Yaw
            | Self::Motor1
            | Self::Motor2
            | Self::Motor3
            | Self::Motor4 => Some(&types::SETPOINT),
            Self::SampleUpdate => Some(&types::LOG_DATA),
            Self::MagCalibrate => None,
            Self::SpecialCommand => Some(&types::SPECIAL_COMMAND),
        }
    }

    /// Single-motor setpoint message for motor 1..=4
    pub fn motor(index: u8) -> Result<Self, CodecError> {
        match index {
            1 => Ok(Self::Motor1),
            2 => Ok(Self::Motor2),
            3 => Ok(Self::Motor3),
            4 => Ok(Self::Motor4),
            other => Err(CodecError::InvalidValue {
                field: "motor",
                value: other as u32,
            }),
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = CodecError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|t| t.id() == id)
            .ok_or(CodecError::UnknownMessageType(id))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Name of a message-type id, for logs
pub fn message_name(id: u8) -> String {
    MessageType::try_from(id)
        .map(|t| t.name().to_string())
        .unwrap_or_else(|_| format!("Unknown({})", id))
}

/// Typed payload of one message
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Arming(Arming),
    Thrust(MotorThrust),
    Pitch(Setpoint),
    Roll(Setpoint),
    Yaw(Setpoint),
    /// Single-motor setpoint, motor 1..=4
    Motor { index: u8, setpoint: Setpoint },
    SampleUpdate(LogData),
    MagCalibrate,
    SpecialCommand(SpecialCommand),
}

impl Payload {
    pub fn message_type(&self) -> Result<MessageType, CodecError> {
        Ok(match self {
            Self::Arming(_) => MessageType::Arming,
            Self::Thrust(_) => MessageType::Thrust,
            Self::Pitch(_) => MessageType::Pitch,
            Self::Roll(_) => MessageType::Roll,
            Self::Yaw(_) => MessageType::Yaw,
            Self::Motor { index, .. } => MessageType::motor(*index)?,
            Self::SampleUpdate(_) => MessageType::SampleUpdate,
            Self::MagCalibrate => MessageType::MagCalibrate,
            Self::SpecialCommand(_) => MessageType::SpecialCommand,
        })
    }

    /// Interpret payload bytes according to the message-type id
    pub fn decode(message_type: u8, bytes: &[u8]) -> Result<Self, CodecError> {
        let kind = MessageType::try_from(message_type)?;
        Ok(match kind {
            MessageType::Arming => Self::Arming(Arming::from_bytes(bytes)?),
            MessageType::Thrust => Self::Thrust(MotorThrust::from_bytes(bytes)?),
            MessageType::Pitch => Self::Pitch(Setpoint::from_bytes(bytes)?),
            MessageType::Roll => Self::Roll(Setpoint::from_bytes(bytes)?),
            MessageType::Yaw => Self::Yaw(Setpoint::from_bytes(bytes)?),
            MessageType::Motor1
            | MessageType::Motor2
            | MessageType::Motor3
            | MessageType::Motor4 => Self::Motor {
                index: kind.id() - MessageType::Motor1.id() + 1,
                setpoint: Setpoint::from_bytes(bytes)?,
            },
            MessageType::SampleUpdate => Self::SampleUpdate(LogData::from_bytes(bytes)?),
            MessageType::MagCalibrate => Self::MagCalibrate,
            MessageType::SpecialCommand => {
                Self::SpecialCommand(SpecialCommand::from_bytes(bytes)?)
            }
        })
    }

    /// Serialize to (message_type, payload bytes)
    pub fn encode(&self) -> Result<(u8, Vec<u8>), CodecError> {
        let bytes = match self {
            Self::Arming(v) => v.to_bytes()?,
            Self::Thrust(v) => v.to_bytes()?,
            Self::Pitch(v) | Self::Roll(v) | Self::Yaw(v) => v.to_bytes()?,
            Self::Motor { setpoint, .. } => setpoint.to_bytes()?,
            Self::SampleUpdate(v) => v.to_bytes()?,
            Self::MagCalibrate => Vec::new(),
            Self::SpecialCommand(v) => v.to_bytes()?,
        };
        Ok((self.message_type()?.id(), bytes))
    }

    /// Serialize into a complete serial frame
    pub fn to_frame(&self) -> Result<Vec<u8>, CodecError> {
        let (message_type, bytes) = self.encode()?;
        frame::encode(message_type, &bytes)
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, CodecError> {
        Self::decode(frame.message_type, &frame.payload)
    }
}

/// Decode a payload generically into `(field path, value)` pairs
pub fn describe(message_type: u8, bytes: &[u8]) -> Result<Vec<(String, Value)>, CodecError> {
    let kind = MessageType::try_from(message_type)?;
    let Some(layout) = kind.layout() else {
        return Ok(Vec::new());
    };
    let values = layout.decode(bytes)?;
    Ok(layout.field_paths().into_iter().zip(values).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_match_firmware() {
        assert_eq!(MessageType::Arming.id(), 0);
        assert_eq!(MessageType::Thrust.id(), 1);
        assert_eq!(MessageType::Yaw.id(), 4);
        assert_eq!(MessageType::Motor4.id(), 8);
        assert_eq!(MessageType::SampleUpdate.id(), 10);
        assert_eq!(MessageType::MagCalibrate.id(), 50);
        assert_eq!(MessageType::SpecialCommand.id(), 100);
    }

    #[test]
    fn test_try_from_roundtrip() {
        for kind in MessageType::ALL {
            assert_eq!(MessageType::try_from(kind.id()).unwrap(), kind);
        }
        assert_eq!(
            MessageType::try_from(9),
            Err(CodecError::UnknownMessageType(9))
        );
    }

    #[test]
    fn test_thrust_end_to_end() {
        let payload = Payload::Thrust(MotorThrust::new(10.0, 20.0, 30.0, 40.0));
        let bytes = payload.to_frame().unwrap();

        assert_eq!(bytes.len(), 104);
        assert_eq!(bytes[1], 1);
        assert_eq!(bytes[2], 16);
        assert_eq!(f32::from_le_bytes([bytes[3], bytes[4], bytes[5], bytes[6]]), 10.0);

        let frame = frame::decode(&bytes).unwrap();
        assert_eq!(Payload::from_frame(&frame).unwrap(), payload);
    }

    #[test]
    fn test_arming_frame() {
        let bytes = Payload::Arming(Arming { armed: true }).to_frame().unwrap();
        assert_eq!(bytes[2], 1);
        assert_eq!(bytes[3], 0x01);
        assert!(bytes[4..103].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_motor_payload_index() {
        let payload = Payload::Motor {
            index: 3,
            setpoint: Setpoint { value: 0.4 },
        };
        let (id, bytes) = payload.encode().unwrap();
        assert_eq!(id, 7);
        assert_eq!(Payload::decode(id, &bytes).unwrap(), payload);

        let bad = Payload::Motor {
            index: 5,
            setpoint: Setpoint { value: 0.4 },
        };
        assert!(bad.encode().is_err());
    }

    #[test]
    fn test_mag_calibrate_is_empty() {
        let (id, bytes) = Payload::MagCalibrate.encode().unwrap();
        assert_eq!(id, 50);
        assert!(bytes.is_empty());
        assert_eq!(Payload::decode(50, &[]).unwrap(), Payload::MagCalibrate);
    }

    #[test]
    fn test_special_command_frame() {
        let payload = Payload::SpecialCommand(SpecialCommand {
            command: SpecialCommandKind::reverse_spin(2).unwrap(),
        });
        let bytes = payload.to_frame().unwrap();
        assert_eq!(bytes[1], 100);
        assert_eq!(bytes[3], 6);
    }

    #[test]
    fn test_decode_unknown_type() {
        assert_eq!(
            Payload::decode(42, &[0; 4]),
            Err(CodecError::UnknownMessageType(42))
        );
    }

    #[test]
    fn test_decode_truncated_sample() {
        assert!(matches!(
            Payload::decode(10, &[0; 83]),
            Err(CodecError::TruncatedPayload {
                needed: 84,
                available: 83,
                ..
            })
        ));
    }

    #[test]
    fn test_describe_setpoint() {
        let fields = describe(2, &1.25f32.to_le_bytes()).unwrap();
        assert_eq!(fields, vec![("value".to_string(), Value::F32(1.25))]);
        assert!(describe(50, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_message_name() {
        assert_eq!(message_name(1), "Thrust");
        assert_eq!(message_name(200), "Unknown(200)");
    }
}
