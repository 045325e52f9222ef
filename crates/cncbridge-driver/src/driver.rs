// ── Driver trait and controller primitives ──
//
// The vendor library is blocking and not async-aware. Implementations of
// `Driver` are plain synchronous calls; `BlockingCall` moves them onto the
// blocking pool under a deadline.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::error::Error;
use crate::handle::Handle;
use crate::reading::ReadingId;
use crate::status::Status;

// ── Primitive result shapes ──────────────────────────────────────────

/// Controller status word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatInfo {
    pub aut: i16,
    pub run: i16,
    pub edit: i16,
    pub motion: i16,
    pub mstb: i16,
    pub emergency: i16,
    pub alarm: i16,
}

/// One axis or spindle entry: a fixed-point value with its decimal shift.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisValue {
    pub name: String,
    pub data: i32,
    pub dec: i16,
    pub flag: u16,
}

impl AxisValue {
    pub fn new(name: impl Into<String>, data: i32, dec: i16) -> Self {
        Self {
            name: name.into(),
            data,
            dec,
            flag: 0,
        }
    }

    #[must_use]
    pub fn with_flag(mut self, flag: u16) -> Self {
        self.flag = flag;
        self
    }

    /// Scaled value: `data × 10^-dec`.
    pub fn value(&self) -> f64 {
        f64::from(self.data) * 10f64.powi(-i32::from(self.dec))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionKind {
    Absolute,
    Relative,
    Machine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpindleMeter {
    Load,
    MotorSpeed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisDataClass {
    ServoCurrent,
    Spindle,
    Jog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisDataKind {
    Percent,
    Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgramNumbers {
    pub main: i32,
    pub running: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PanelSignals {
    pub feed_override: i16,
    pub jog_override: i16,
    pub spindle_override: i16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SysInfo {
    pub series: String,
    pub version: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SysInfoEx {
    pub axes: i16,
    pub spindles: i16,
    pub paths: i16,
}

// ── Driver ───────────────────────────────────────────────────────────

/// Blocking surface of the vendor device-control library.
///
/// Every call returns `Err(status)` for a non-zero vendor status. The
/// controller primitives default to `EW_FUNC` so a partial implementation
/// only has to cover what it can serve; [`Driver::supports`] is how tag-pack
/// resolution finds out up front.
pub trait Driver: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    fn acquire(&self, address: &str, port: u16, timeout: Duration) -> Result<Handle, Status>;

    fn release(&self, handle: Handle) -> Result<(), Status>;

    fn supports(&self, reading: ReadingId) -> bool {
        let _ = reading;
        true
    }

    fn stat_info(&self, handle: Handle) -> Result<StatInfo, Status> {
        let _ = handle;
        Err(Status::FUNC)
    }

    /// First code byte of the given modal group.
    fn modal_code(&self, handle: Handle, group: i16) -> Result<u8, Status> {
        let _ = (handle, group);
        Err(Status::FUNC)
    }

    /// Text of the blocks currently being executed, at most `max_len` bytes.
    fn executing_program(&self, handle: Handle, max_len: usize) -> Result<String, Status> {
        let _ = (handle, max_len);
        Err(Status::FUNC)
    }

    fn program_numbers(&self, handle: Handle) -> Result<ProgramNumbers, Status> {
        let _ = handle;
        Err(Status::FUNC)
    }

    fn sequence_number(&self, handle: Handle) -> Result<i32, Status> {
        let _ = handle;
        Err(Status::FUNC)
    }

    fn tool_number(&self, handle: Handle) -> Result<i32, Status> {
        let _ = handle;
        Err(Status::FUNC)
    }

    fn parameter(&self, handle: Handle, number: u16) -> Result<i32, Status> {
        let _ = (handle, number);
        Err(Status::FUNC)
    }

    fn positions(&self, handle: Handle, kind: PositionKind) -> Result<Vec<AxisValue>, Status> {
        let _ = (handle, kind);
        Err(Status::FUNC)
    }

    fn actual_feed(&self, handle: Handle) -> Result<i32, Status> {
        let _ = handle;
        Err(Status::FUNC)
    }

    fn panel_signals(&self, handle: Handle) -> Result<PanelSignals, Status> {
        let _ = handle;
        Err(Status::FUNC)
    }

    fn axis_data(
        &self,
        handle: Handle,
        class: AxisDataClass,
        kind: AxisDataKind,
    ) -> Result<Vec<AxisValue>, Status> {
        let _ = (handle, class, kind);
        Err(Status::FUNC)
    }

    fn servo_meters(&self, handle: Handle) -> Result<Vec<AxisValue>, Status> {
        let _ = handle;
        Err(Status::FUNC)
    }

    /// Spindle meters; names already carry the spindle suffix (`"S1"`).
    fn spindle_meters(&self, handle: Handle, meter: SpindleMeter) -> Result<Vec<AxisValue>, Status> {
        let _ = (handle, meter);
        Err(Status::FUNC)
    }

    fn spindle_speed(&self, handle: Handle) -> Result<AxisValue, Status> {
        let _ = handle;
        Err(Status::FUNC)
    }

    fn sys_info(&self, handle: Handle) -> Result<SysInfo, Status> {
        let _ = handle;
        Err(Status::FUNC)
    }

    fn sys_info_ex(&self, handle: Handle) -> Result<SysInfoEx, Status> {
        let _ = handle;
        Err(Status::FUNC)
    }

    fn cnc_id(&self, handle: Handle) -> Result<[u32; 4], Status> {
        let _ = handle;
        Err(Status::FUNC)
    }
}

// ── Blocking calls ───────────────────────────────────────────────────

/// A driver call running on the blocking pool.
///
/// The vendor library cannot interrupt a call, so a deadline only stops the
/// caller from waiting. Whoever owns the call owns its eventual result:
/// dropping it detaches the thread and loses whatever it returns.
#[must_use = "a dropped call keeps running and its result is lost"]
#[derive(Debug)]
pub struct BlockingCall<T> {
    operation: &'static str,
    task: JoinHandle<T>,
}

/// Result of waiting on a [`BlockingCall`] with a deadline.
#[derive(Debug)]
pub enum Waited<T> {
    /// The call returned (or its thread failed) in time.
    Done(Result<T, Error>),
    /// The deadline passed. The call is still running and is handed back.
    TimedOut { error: Error, call: BlockingCall<T> },
}

impl<T: Send + 'static> BlockingCall<T> {
    pub fn spawn<F>(driver: &Arc<dyn Driver>, operation: &'static str, f: F) -> Self
    where
        F: FnOnce(&dyn Driver) -> T + Send + 'static,
    {
        let driver = Arc::clone(driver);
        Self {
            operation,
            task: tokio::task::spawn_blocking(move || f(driver.as_ref())),
        }
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait up to `timeout` for the call to return.
    pub async fn wait(mut self, timeout: Duration) -> Waited<T> {
        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(joined) => Waited::Done(joined.map_err(|e| join_error(self.operation, &e))),
            Err(_) => Waited::TimedOut {
                error: Error::Timeout {
                    operation: self.operation,
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                },
                call: self,
            },
        }
    }

    /// Wait for the call to return, however long that takes.
    ///
    /// Cancel-safe: dropping the future before it completes leaves the call
    /// intact. Once it has completed the call is spent and must be dropped.
    pub async fn join(&mut self) -> Result<T, Error> {
        (&mut self.task)
            .await
            .map_err(|e| join_error(self.operation, &e))
    }
}

fn join_error(operation: &'static str, err: &tokio::task::JoinError) -> Error {
    Error::Join {
        operation,
        reason: err.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct SlowDriver;

    impl Driver for SlowDriver {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn acquire(&self, _: &str, _: u16, _: Duration) -> Result<Handle, Status> {
            std::thread::sleep(Duration::from_millis(200));
            Handle::new(1).ok_or(Status::HANDLE)
        }

        fn release(&self, _: Handle) -> Result<(), Status> {
            Ok(())
        }
    }

    #[test]
    fn axis_value_scales_by_decimal_shift() {
        assert!((AxisValue::new("X", 12_345, 3).value() - 12.345).abs() < 1e-9);
        assert!((AxisValue::new("S", 800, 0).value() - 800.0).abs() < 1e-9);
    }

    #[test]
    fn primitives_default_to_unsupported_function() {
        let h = Handle::new(1).unwrap();
        assert_eq!(SlowDriver.stat_info(h), Err(Status::FUNC));
        assert_eq!(SlowDriver.cnc_id(h), Err(Status::FUNC));
    }

    #[tokio::test]
    async fn timed_out_call_is_handed_back_and_still_yields_its_result() {
        let driver: Arc<dyn Driver> = Arc::new(SlowDriver);
        let call = BlockingCall::spawn(&driver, "acquire", |d| {
            d.acquire("h", 1, Duration::ZERO)
        });

        let Waited::TimedOut { error, mut call } = call.wait(Duration::from_millis(10)).await
        else {
            panic!("slow acquire returned within 10ms");
        };
        assert!(matches!(error, Error::Timeout { operation: "acquire", timeout_ms: 10 }));
        assert!(!call.is_finished());

        assert_eq!(call.join().await.unwrap(), Handle::new(1).ok_or(Status::HANDLE));
    }

    #[tokio::test]
    async fn fast_call_completes_within_deadline() {
        let driver: Arc<dyn Driver> = Arc::new(SlowDriver);
        let call = BlockingCall::spawn(&driver, "release", |d| d.release(Handle::new(1).unwrap()));
        assert_eq!(call.operation(), "release");

        let Waited::Done(result) = call.wait(Duration::from_secs(1)).await else {
            panic!("release timed out");
        };
        assert_eq!(result.unwrap(), Ok(()));
    }
}
