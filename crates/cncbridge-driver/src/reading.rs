// ── Reading catalogue ──
//
// Closed set of reading identifiers. Each identifier owns a fixed accessor
// built from driver primitives, so tag packs can be checked against the
// catalogue when configuration is loaded rather than at poll time.

use std::collections::BTreeMap;
use std::str::FromStr;

use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

use crate::driver::{
    AxisDataClass, AxisDataKind, AxisValue, Driver, PositionKind, SpindleMeter, StatInfo,
};
use crate::error::Error;
use crate::handle::Handle;
use crate::status::Status;
use crate::value::Reading;

/// Tag name that asks for the per-identifier status map instead of a reading.
pub const ERRORS_TAG: &str = "errors";

const PARTS_COUNT_PARAM: u16 = 6711;
const POWER_ON_TIME_PARAM: u16 = 6750;
const OPERATION_TIME_PARAMS: (u16, u16) = (6751, 6752);
const CUTTING_TIME_PARAMS: (u16, u16) = (6753, 6754);
const CYCLE_TIME_PARAMS: (u16, u16) = (6757, 6758);
const SERIAL_NUMBER_PARAM: u16 = 13151;

const SHUTDOWN_CODES: [&str; 3] = ["M00", "M01", "G04"];
const EXEC_SHORT: usize = 256;
const EXEC_LONG: usize = 1024;
const OVERLOAD_PERCENT: f64 = 100.0;

/// Produces one reading from a live handle.
pub type Accessor = fn(&dyn Driver, Handle) -> Result<Reading, Status>;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ReadingId {
    Aut,
    Run,
    Edit,
    Motion,
    Mstb,
    #[strum(serialize = "g00")]
    G00,
    Shutdowns,
    LoadExcess,
    Emergency,
    Alarm,
    Frame,
    MainProgNumber,
    SubProgNumber,
    PartsCount,
    ToolNumber,
    FrameNumber,
    Feedrate,
    FeedOverride,
    JogOverride,
    SpindleOverride,
    JogSpeed,
    CurrentLoad,
    CurrentLoadPercent,
    ServoLoads,
    AbsolutePositions,
    MachinePositions,
    RelativePositions,
    SpindleSpeed,
    SpindleParamSpeed,
    SpindleMotorSpeed,
    SpindleLoad,
    AxesNumber,
    SpindlesNumber,
    ChannelsNumber,
    PowerOnTime,
    OperationTime,
    CuttingTime,
    CycleTime,
    SeriesNumber,
    VersionNumber,
    SerialNumber,
    CncId,
}

impl ReadingId {
    /// Parse a catalogue identifier, reporting unknown names as [`Error`].
    pub fn parse(name: &str) -> Result<Self, Error> {
        Self::from_str(name).map_err(|_| Error::UnknownReading {
            name: name.to_owned(),
        })
    }

    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Whether the reading yields a name → number map.
    pub const fn is_map(self) -> bool {
        matches!(
            self,
            Self::JogSpeed
                | Self::CurrentLoad
                | Self::CurrentLoadPercent
                | Self::ServoLoads
                | Self::AbsolutePositions
                | Self::MachinePositions
                | Self::RelativePositions
                | Self::SpindleParamSpeed
                | Self::SpindleMotorSpeed
                | Self::SpindleLoad
        )
    }

    pub fn accessor(self) -> Accessor {
        match self {
            Self::Aut => |d, h| stat(d, h, |s| s.aut),
            Self::Run => |d, h| stat(d, h, |s| s.run),
            Self::Edit => |d, h| stat(d, h, |s| s.edit),
            Self::Motion => |d, h| stat(d, h, |s| s.motion),
            Self::Mstb => |d, h| stat(d, h, |s| s.mstb),
            Self::Emergency => |d, h| stat(d, h, |s| s.emergency),
            Self::Alarm => |d, h| stat(d, h, |s| s.alarm),
            Self::G00 => |d, h| {
                let code = d.modal_code(h, 0)?;
                Ok(Reading::Int16(i16::from(code == 0)))
            },
            Self::Shutdowns => read_shutdowns,
            Self::LoadExcess => read_load_excess,
            Self::Frame => read_frame,
            Self::MainProgNumber => |d, h| Ok(Reading::Int32(d.program_numbers(h)?.main)),
            Self::SubProgNumber => |d, h| Ok(Reading::Int32(d.program_numbers(h)?.running)),
            Self::PartsCount => |d, h| param(d, h, PARTS_COUNT_PARAM),
            Self::PowerOnTime => |d, h| param(d, h, POWER_ON_TIME_PARAM),
            Self::SerialNumber => |d, h| param(d, h, SERIAL_NUMBER_PARAM),
            Self::ToolNumber => |d, h| Ok(Reading::Int64(i64::from(d.tool_number(h)?))),
            Self::FrameNumber => |d, h| Ok(Reading::Int64(i64::from(d.sequence_number(h)?))),
            Self::Feedrate => |d, h| Ok(Reading::Int64(i64::from(d.actual_feed(h)?))),
            Self::FeedOverride => |d, h| Ok(Reading::Int16(d.panel_signals(h)?.feed_override)),
            Self::JogOverride => |d, h| Ok(Reading::Int16(d.panel_signals(h)?.jog_override)),
            Self::SpindleOverride => {
                |d, h| Ok(Reading::Int16(d.panel_signals(h)?.spindle_override))
            }
            Self::JogSpeed => read_jog_speed,
            Self::CurrentLoad => |d, h| {
                let axes = d.axis_data(h, AxisDataClass::ServoCurrent, AxisDataKind::Value)?;
                Ok(scaled_map(&axes))
            },
            Self::CurrentLoadPercent => |d, h| {
                let axes = d.axis_data(h, AxisDataClass::ServoCurrent, AxisDataKind::Percent)?;
                Ok(raw_map(&axes))
            },
            Self::SpindleParamSpeed => |d, h| {
                let spindles = d.axis_data(h, AxisDataClass::Spindle, AxisDataKind::Value)?;
                Ok(raw_map(&spindles))
            },
            Self::ServoLoads => |d, h| Ok(raw_map(&d.servo_meters(h)?)),
            Self::AbsolutePositions => {
                |d, h| Ok(scaled_map(&d.positions(h, PositionKind::Absolute)?))
            }
            Self::MachinePositions => |d, h| Ok(scaled_map(&d.positions(h, PositionKind::Machine)?)),
            Self::RelativePositions => {
                |d, h| Ok(scaled_map(&d.positions(h, PositionKind::Relative)?))
            }
            Self::SpindleSpeed => |d, h| Ok(Reading::Float64(d.spindle_speed(h)?.value())),
            Self::SpindleMotorSpeed => {
                |d, h| Ok(raw_map(&d.spindle_meters(h, SpindleMeter::MotorSpeed)?))
            }
            Self::SpindleLoad => |d, h| Ok(raw_map(&d.spindle_meters(h, SpindleMeter::Load)?)),
            Self::AxesNumber => |d, h| Ok(Reading::Int16(d.sys_info_ex(h)?.axes)),
            Self::SpindlesNumber => |d, h| Ok(Reading::Int16(d.sys_info_ex(h)?.spindles)),
            Self::ChannelsNumber => |d, h| Ok(Reading::Int16(d.sys_info_ex(h)?.paths)),
            Self::OperationTime => |d, h| elapsed(d, h, OPERATION_TIME_PARAMS),
            Self::CuttingTime => |d, h| elapsed(d, h, CUTTING_TIME_PARAMS),
            Self::CycleTime => |d, h| elapsed(d, h, CYCLE_TIME_PARAMS),
            Self::SeriesNumber => |d, h| Ok(Reading::String(d.sys_info(h)?.series)),
            Self::VersionNumber => |d, h| Ok(Reading::String(d.sys_info(h)?.version)),
            Self::CncId => |d, h| {
                let [a, b, c, e] = d.cnc_id(h)?;
                Ok(Reading::String(format!("{a:08x}-{b:08x}-{c:08x}-{e:08x}")))
            },
        }
    }
}

// ── Accessor helpers ─────────────────────────────────────────────────

fn stat(d: &dyn Driver, h: Handle, field: fn(&StatInfo) -> i16) -> Result<Reading, Status> {
    Ok(Reading::Int16(field(&d.stat_info(h)?)))
}

fn param(d: &dyn Driver, h: Handle, number: u16) -> Result<Reading, Status> {
    Ok(Reading::Int64(i64::from(d.parameter(h, number)?)))
}

/// Seconds from a (milliseconds, minutes) parameter pair.
fn elapsed(d: &dyn Driver, h: Handle, (ms, min): (u16, u16)) -> Result<Reading, Status> {
    let millis = d.parameter(h, ms)?;
    let minutes = d.parameter(h, min)?;
    Ok(Reading::Float64(
        f64::from(minutes) * 60.0 + f64::from(millis) / 1000.0,
    ))
}

fn scaled_map(axes: &[AxisValue]) -> Reading {
    Reading::MapFloat(axes.iter().map(|a| (a.name.clone(), a.value())).collect())
}

fn raw_map(axes: &[AxisValue]) -> Reading {
    Reading::MapInt(
        axes.iter()
            .map(|a| (a.name.clone(), i64::from(a.data)))
            .collect(),
    )
}

fn read_shutdowns(d: &dyn Driver, h: Handle) -> Result<Reading, Status> {
    let text = d.executing_program(h, EXEC_SHORT)?;
    let index = SHUTDOWN_CODES
        .iter()
        .position(|code| text.lines().any(|line| line.contains(code)))
        .unwrap_or(SHUTDOWN_CODES.len());
    Ok(Reading::Int16(i16::try_from(index).unwrap_or(i16::MAX)))
}

fn read_frame(d: &dyn Driver, h: Handle) -> Result<Reading, Status> {
    let text = d.executing_program(h, EXEC_LONG)?;
    let frame = text
        .split('\n')
        .find(|line| line.contains('N'))
        .or_else(|| text.split('\n').next())
        .unwrap_or_default();
    Ok(Reading::String(frame.to_owned()))
}

/// 0 = no overload, 1 = servo, 2 = spindle, 3 = both.
fn read_load_excess(d: &dyn Driver, h: Handle) -> Result<Reading, Status> {
    let servo = d
        .servo_meters(h)?
        .iter()
        .any(|a| a.value() > OVERLOAD_PERCENT);
    let spindle = d
        .spindle_meters(h, SpindleMeter::Load)?
        .iter()
        .any(|a| a.value() > OVERLOAD_PERCENT);
    let level = match (servo, spindle) {
        (false, false) => 0,
        (true, false) => 1,
        (false, true) => 2,
        (true, true) => 3,
    };
    Ok(Reading::Int16(level))
}

fn read_jog_speed(d: &dyn Driver, h: Handle) -> Result<Reading, Status> {
    let axes = d.axis_data(h, AxisDataClass::Jog, AxisDataKind::Value)?;
    let speeds: BTreeMap<String, f64> = axes
        .iter()
        .filter(|a| (a.flag >> 1) & 1 == 0)
        .map(|a| (a.name.clone(), a.value()))
        .collect();
    Ok(Reading::MapFloat(speeds))
}
