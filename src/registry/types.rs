//! Payload structures shared with the flight controller firmware
//!
//! Field order and widths must match the firmware's packed C structs.

use super::layout::{Field, Packed, StructLayout, Value, Values};
use crate::error::CodecError;

// =============================================================================
// Layouts
// =============================================================================

pub const VEC3: StructLayout = StructLayout {
    name: "Vec3",
    fields: &[Field::f32("x"), Field::f32("y"), Field::f32("z")],
};

pub const MOTOR_THRUST: StructLayout = StructLayout {
    name: "MotorThrust",
    fields: &[
        Field::f32("motor1"),
        Field::f32("motor2"),
        Field::f32("motor3"),
        Field::f32("motor4"),
    ],
};

pub const ARMING: StructLayout = StructLayout {
    name: "Arming",
    fields: &[Field::u8("armed")],
};

pub const SETPOINT: StructLayout = StructLayout {
    name: "Setpoint",
    fields: &[Field::f32("value")],
};

pub const SPECIAL_COMMAND: StructLayout = StructLayout {
    name: "SpecialCommand",
    fields: &[Field::u8("command")],
};

pub const SENSORS_DATA: StructLayout = StructLayout {
    name: "SensorsData",
    fields: &[
        Field::nested("acc", &VEC3),
        Field::nested("gyr", &VEC3),
        Field::nested("mag", &VEC3),
        Field::f32("ultrasonic"),
    ],
};

pub const ESTIMATION_STATE: StructLayout = StructLayout {
    name: "EstimationState",
    fields: &[
        Field::f32("roll"),
        Field::f32("pitch"),
        Field::f32("yaw"),
        Field::f32("roll_dot"),
        Field::f32("pitch_dot"),
        Field::f32("yaw_dot"),
    ],
};

pub const CONTROL_OUTPUTS: StructLayout = StructLayout {
    name: "ControlOutputs",
    fields: &[
        Field::u16("thrust1"),
        Field::u16("thrust2"),
        Field::u16("thrust3"),
        Field::u16("thrust4"),
    ],
};

pub const CONTROLLER_INPUTS: StructLayout = StructLayout {
    name: "ControllerInputs",
    fields: &[Field::f32("roll"), Field::f32("pitch"), Field::f32("yaw")],
};

pub const LOG_DATA: StructLayout = StructLayout {
    name: "LogData",
    fields: &[
        Field::nested("sensors", &SENSORS_DATA),
        Field::nested("estimation", &ESTIMATION_STATE),
        Field::nested("control_outputs", &CONTROL_OUTPUTS),
        Field::nested("controller_inputs", &CONTROLLER_INPUTS),
    ],
};

pub const PID_GAINS: StructLayout = StructLayout {
    name: "PidGains",
    fields: &[Field::f32("kp"), Field::f32("ki"), Field::f32("kd")],
};

pub const WAYPOINT: StructLayout = StructLayout {
    name: "Waypoint",
    fields: &[Field::f32("x"), Field::f32("y"), Field::f32("z")],
};

// =============================================================================
// Typed structs
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Packed for Vec3 {
    const LAYOUT: &'static StructLayout = &VEC3;

    fn push_values(&self, out: &mut Vec<Value>) {
        out.extend([Value::F32(self.x), Value::F32(self.y), Value::F32(self.z)]);
    }

    fn from_values(values: &mut Values<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            x: values.f32()?,
            y: values.f32()?,
            z: values.f32()?,
        })
    }
}

/// Thrust command for all four motors
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotorThrust {
    pub motor1: f32,
    pub motor2: f32,
    pub motor3: f32,
    pub motor4: f32,
}

impl MotorThrust {
    pub fn new(motor1: f32, motor2: f32, motor3: f32, motor4: f32) -> Self {
        Self {
            motor1,
            motor2,
            motor3,
            motor4,
        }
    }
}

impl Packed for MotorThrust {
    const LAYOUT: &'static StructLayout = &MOTOR_THRUST;

    fn push_values(&self, out: &mut Vec<Value>) {
        out.extend([
            Value::F32(self.motor1),
            Value::F32(self.motor2),
            Value::F32(self.motor3),
            Value::F32(self.motor4),
        ]);
    }

    fn from_values(values: &mut Values<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            motor1: values.f32()?,
            motor2: values.f32()?,
            motor3: values.f32()?,
            motor4: values.f32()?,
        })
    }
}

/// Arm/disarm; the firmware only accepts 0 and 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Arming {
    pub armed: bool,
}

impl Packed for Arming {
    const LAYOUT: &'static StructLayout = &ARMING;

    fn push_values(&self, out: &mut Vec<Value>) {
        out.push(Value::U8(self.armed as u8));
    }

    fn from_values(values: &mut Values<'_>) -> Result<Self, CodecError> {
        match values.u8()? {
            0 => Ok(Self { armed: false }),
            1 => Ok(Self { armed: true }),
            other => Err(CodecError::InvalidValue {
                field: "armed",
                value: other as u32,
            }),
        }
    }
}

/// Single float setpoint (pitch, roll, yaw, single motor)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Setpoint {
    pub value: f32,
}

impl Packed for Setpoint {
    const LAYOUT: &'static StructLayout = &SETPOINT;

    fn push_values(&self, out: &mut Vec<Value>) {
        out.push(Value::F32(self.value));
    }

    fn from_values(values: &mut Values<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            value: values.f32()?,
        })
    }
}

/// Motor index 1..=4, checked on construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Motor(u8);

impl Motor {
    pub fn new(index: u8) -> Result<Self, CodecError> {
        if (1..=4).contains(&index) {
            Ok(Self(index))
        } else {
            Err(CodecError::InvalidValue {
                field: "motor",
                value: index as u32,
            })
        }
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Motor {
    type Error = CodecError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Self::new(index)
    }
}

/// Motor-level maintenance command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialCommandKind {
    /// Beep a motor (sub-ids 1..4)
    Beep(Motor),
    /// Toggle spin direction of a motor (sub-ids 5..8)
    ReverseSpin(Motor),
}

impl SpecialCommandKind {
    pub fn id(self) -> u8 {
        match self {
            Self::Beep(motor) => motor.index(),
            Self::ReverseSpin(motor) => motor.index() + 4,
        }
    }

    pub fn from_id(id: u8) -> Result<Self, CodecError> {
        match id {
            1..=4 => Ok(Self::Beep(Motor(id))),
            5..=8 => Ok(Self::ReverseSpin(Motor(id - 4))),
            other => Err(CodecError::InvalidValue {
                field: "special command",
                value: other as u32,
            }),
        }
    }

    pub fn beep(motor: u8) -> Result<Self, CodecError> {
        Motor::new(motor).map(Self::Beep)
    }

    pub fn reverse_spin(motor: u8) -> Result<Self, CodecError> {
        Motor::new(motor).map(Self::ReverseSpin)
    }

    pub fn motor(self) -> Motor {
        match self {
            Self::Beep(motor) | Self::ReverseSpin(motor) => motor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialCommand {
    pub command: SpecialCommandKind,
}

impl Packed for SpecialCommand {
    const LAYOUT: &'static StructLayout = &SPECIAL_COMMAND;

    fn push_values(&self, out: &mut Vec<Value>) {
        out.push(Value::U8(self.command.id()));
    }

    fn from_values(values: &mut Values<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            command: SpecialCommandKind::from_id(values.u8()?)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorsData {
    pub acc: Vec3,
    pub gyr: Vec3,
    pub mag: Vec3,
    pub ultrasonic: f32,
}

impl Packed for SensorsData {
    const LAYOUT: &'static StructLayout = &SENSORS_DATA;

    fn push_values(&self, out: &mut Vec<Value>) {
        self.acc.push_values(out);
        self.gyr.push_values(out);
        self.mag.push_values(out);
        out.push(Value::F32(self.ultrasonic));
    }

    fn from_values(values: &mut Values<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            acc: Vec3::from_values(values)?,
            gyr: Vec3::from_values(values)?,
            mag: Vec3::from_values(values)?,
            ultrasonic: values.f32()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EstimationState {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub roll_dot: f32,
    pub pitch_dot: f32,
    pub yaw_dot: f32,
}

impl Packed for EstimationState {
    const LAYOUT: &'static StructLayout = &ESTIMATION_STATE;

    fn push_values(&self, out: &mut Vec<Value>) {
        out.extend(
            [
                self.roll,
                self.pitch,
                self.yaw,
                self.roll_dot,
                self.pitch_dot,
                self.yaw_dot,
            ]
            .map(Value::F32),
        );
    }

    fn from_values(values: &mut Values<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            roll: values.f32()?,
            pitch: values.f32()?,
            yaw: values.f32()?,
            roll_dot: values.f32()?,
            pitch_dot: values.f32()?,
            yaw_dot: values.f32()?,
        })
    }
}

/// Motor commands computed by the on-board controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlOutputs {
    pub thrust1: u16,
    pub thrust2: u16,
    pub thrust3: u16,
    pub thrust4: u16,
}

impl Packed for ControlOutputs {
    const LAYOUT: &'static StructLayout = &CONTROL_OUTPUTS;

    fn push_values(&self, out: &mut Vec<Value>) {
        out.extend([self.thrust1, self.thrust2, self.thrust3, self.thrust4].map(Value::U16));
    }

    fn from_values(values: &mut Values<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            thrust1: values.u16()?,
            thrust2: values.u16()?,
            thrust3: values.u16()?,
            thrust4: values.u16()?,
        })
    }
}

/// Setpoints received from the external controller
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControllerInputs {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

impl Packed for ControllerInputs {
    const LAYOUT: &'static StructLayout = &CONTROLLER_INPUTS;

    fn push_values(&self, out: &mut Vec<Value>) {
        out.extend([self.roll, self.pitch, self.yaw].map(Value::F32));
    }

    fn from_values(values: &mut Values<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            roll: values.f32()?,
            pitch: values.f32()?,
            yaw: values.f32()?,
        })
    }
}

/// Telemetry sample sent with `SampleUpdate`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LogData {
    pub sensors: SensorsData,
    pub estimation: EstimationState,
    pub control_outputs: ControlOutputs,
    pub controller_inputs: ControllerInputs,
}

impl Packed for LogData {
    const LAYOUT: &'static StructLayout = &LOG_DATA;

    fn push_values(&self, out: &mut Vec<Value>) {
        self.sensors.push_values(out);
        self.estimation.push_values(out);
        self.control_outputs.push_values(out);
        self.controller_inputs.push_values(out);
    }

    fn from_values(values: &mut Values<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            sensors: SensorsData::from_values(values)?,
            estimation: EstimationState::from_values(values)?,
            control_outputs: ControlOutputs::from_values(values)?,
            controller_inputs: ControllerInputs::from_values(values)?,
        })
    }
}

/// PID gains of one axis
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl Packed for PidGains {
    const LAYOUT: &'static StructLayout = &PID_GAINS;

    fn push_values(&self, out: &mut Vec<Value>) {
        out.extend([self.kp, self.ki, self.kd].map(Value::F32));
    }

    fn from_values(values: &mut Values<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            kp: values.f32()?,
            ki: values.f32()?,
            kd: values.f32()?,
        })
    }
}

/// Position target
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Waypoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Packed for Waypoint {
    const LAYOUT: &'static StructLayout = &WAYPOINT;

    fn push_values(&self, out: &mut Vec<Value>) {
        out.extend([self.x, self.y, self.z].map(Value::F32));
    }

    fn from_values(values: &mut Values<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            x: values.f32()?,
            y: values.f32()?,
            z: values.f32()?,
        })
    }
}
