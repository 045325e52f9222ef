// ── Simulated controller ──
//
// In-process stand-in for the vendor library. Handles are tracked so the
// release and invalid-handle paths behave like the real library; readings
// move with an internal tick so consecutive cycles differ.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::driver::{
    AxisDataClass, AxisDataKind, AxisValue, Driver, PanelSignals, PositionKind, ProgramNumbers,
    SpindleMeter, StatInfo, SysInfo, SysInfoEx,
};
use crate::handle::Handle;
use crate::status::Status;

const AXES: [&str; 3] = ["X", "Y", "Z"];
const PROGRAM: &str = "N100 G90 G54\nN110 G01 X12.5 Y4.0 F800\nN120 M01\n";

/// Deterministic simulated controller.
#[derive(Debug)]
pub struct SimDriver {
    next_handle: AtomicU16,
    open: Mutex<HashSet<Handle>>,
    tick: AtomicU32,
}

impl Default for SimDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDriver {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU16::new(1),
            open: Mutex::new(HashSet::new()),
            tick: AtomicU32::new(0),
        }
    }

    /// Number of handles currently open.
    pub fn open_handles(&self) -> usize {
        self.open.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn check(&self, handle: Handle) -> Result<i32, Status> {
        let open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        if !open.contains(&handle) {
            return Err(Status::HANDLE);
        }
        let tick = self.tick.fetch_add(1, Ordering::Relaxed) % 1000;
        Ok(i32::try_from(tick).unwrap_or_default())
    }

    fn axes(&self, handle: Handle, base: i32, dec: i16) -> Result<Vec<AxisValue>, Status> {
        let tick = self.check(handle)?;
        Ok(AXES
            .iter()
            .zip(0..)
            .map(|(name, i)| AxisValue::new(*name, base * (i + 1) + tick, dec))
            .collect())
    }
}

impl Driver for SimDriver {
    fn name(&self) -> &'static str {
        "sim"
    }

    fn acquire(&self, address: &str, port: u16, _timeout: Duration) -> Result<Handle, Status> {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = loop {
            let raw = self.next_handle.fetch_add(1, Ordering::Relaxed);
            if let Some(h) = Handle::new(raw).filter(|h| !open.contains(h)) {
                break h;
            }
        };
        open.insert(handle);
        debug!(address, port, %handle, "sim handle opened");
        Ok(handle)
    }

    fn release(&self, handle: Handle) -> Result<(), Status> {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        if open.remove(&handle) {
            Ok(())
        } else {
            Err(Status::HANDLE)
        }
    }

    fn stat_info(&self, handle: Handle) -> Result<StatInfo, Status> {
        let tick = self.check(handle)?;
        Ok(StatInfo {
            aut: 1,
            run: if tick % 10 < 7 { 3 } else { 0 },
            edit: 0,
            motion: i16::from(tick % 10 < 7),
            mstb: 0,
            emergency: 0,
            alarm: 0,
        })
    }

    fn modal_code(&self, handle: Handle, _group: i16) -> Result<u8, Status> {
        let tick = self.check(handle)?;
        Ok(u8::from(tick % 4 != 0))
    }

    fn executing_program(&self, handle: Handle, max_len: usize) -> Result<String, Status> {
        self.check(handle)?;
        let end = PROGRAM.len().min(max_len);
        Ok(PROGRAM.get(..end).unwrap_or(PROGRAM).to_owned())
    }

    fn program_numbers(&self, handle: Handle) -> Result<ProgramNumbers, Status> {
        self.check(handle)?;
        Ok(ProgramNumbers {
            main: 1000,
            running: 1010,
        })
    }

    fn sequence_number(&self, handle: Handle) -> Result<i32, Status> {
        Ok(100 + (self.check(handle)? % 3) * 10)
    }

    fn tool_number(&self, handle: Handle) -> Result<i32, Status> {
        self.check(handle)?;
        Ok(7)
    }

    fn parameter(&self, handle: Handle, number: u16) -> Result<i32, Status> {
        let tick = self.check(handle)?;
        match number {
            6711 => Ok(420 + tick / 10),
            6750 => Ok(86_400),
            6751 | 6753 | 6757 => Ok(tick * 60),
            6752 | 6754 | 6758 => Ok(1200),
            13151 => Ok(31_415_926),
            _ => Err(Status::NUMBER),
        }
    }

    fn positions(&self, handle: Handle, kind: PositionKind) -> Result<Vec<AxisValue>, Status> {
        let base = match kind {
            PositionKind::Absolute => 10_000,
            PositionKind::Relative => 5_000,
            PositionKind::Machine => 20_000,
        };
        self.axes(handle, base, 3)
    }

    fn actual_feed(&self, handle: Handle) -> Result<i32, Status> {
        Ok(800 + self.check(handle)? % 50)
    }

    fn panel_signals(&self, handle: Handle) -> Result<PanelSignals, Status> {
        self.check(handle)?;
        Ok(PanelSignals {
            feed_override: 100,
            jog_override: 50,
            spindle_override: 100,
        })
    }

    fn axis_data(
        &self,
        handle: Handle,
        class: AxisDataClass,
        kind: AxisDataKind,
    ) -> Result<Vec<AxisValue>, Status> {
        match (class, kind) {
            (AxisDataClass::Spindle, _) => {
                let tick = self.check(handle)?;
                Ok(vec![AxisValue::new("S1", 3000 + tick, 0)])
            }
            (AxisDataClass::ServoCurrent, AxisDataKind::Percent) => self.axes(handle, 10, 0),
            (AxisDataClass::ServoCurrent, AxisDataKind::Value) => self.axes(handle, 150, 2),
            (AxisDataClass::Jog, _) => self.axes(handle, 1000, 1),
        }
    }

    fn servo_meters(&self, handle: Handle) -> Result<Vec<AxisValue>, Status> {
        self.axes(handle, 12, 0)
    }

    fn spindle_meters(&self, handle: Handle, meter: SpindleMeter) -> Result<Vec<AxisValue>, Status> {
        let tick = self.check(handle)?;
        let data = match meter {
            SpindleMeter::Load => 35 + tick % 20,
            SpindleMeter::MotorSpeed => 2950 + tick,
        };
        Ok(vec![AxisValue::new("S1", data, 0)])
    }

    fn spindle_speed(&self, handle: Handle) -> Result<AxisValue, Status> {
        let tick = self.check(handle)?;
        Ok(AxisValue::new("S", 3000 + tick, 0))
    }

    fn sys_info(&self, handle: Handle) -> Result<SysInfo, Status> {
        self.check(handle)?;
        Ok(SysInfo {
            series: "D6G1".to_owned(),
            version: "30.0".to_owned(),
        })
    }

    fn sys_info_ex(&self, handle: Handle) -> Result<SysInfoEx, Status> {
        self.check(handle)?;
        Ok(SysInfoEx {
            axes: 3,
            spindles: 1,
            paths: 1,
        })
    }

    fn cnc_id(&self, handle: Handle) -> Result<[u32; 4], Status> {
        self.check(handle)?;
        Ok([0x0a1b_2c3d, 0x0000_0001, 0x00c0_ffee, 0x1234_5678])
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;
    use crate::reading::ReadingId;

    #[test]
    fn handles_are_unique_and_release_once() {
        let sim = SimDriver::new();
        let a = sim.acquire("10.0.0.5", 8193, Duration::ZERO).unwrap();
        let b = sim.acquire("10.0.0.6", 8193, Duration::ZERO).unwrap();
        assert_ne!(a, b);
        assert_eq!(sim.open_handles(), 2);

        assert_eq!(sim.release(a), Ok(()));
        assert_eq!(sim.release(a), Err(Status::HANDLE));
        assert_eq!(sim.open_handles(), 1);
    }

    #[test]
    fn reads_on_closed_handle_report_handle_status() {
        let sim = SimDriver::new();
        let h = sim.acquire("10.0.0.5", 8193, Duration::ZERO).unwrap();
        sim.release(h).unwrap();
        assert_eq!(sim.stat_info(h), Err(Status::HANDLE));
    }

    #[test]
    fn every_reading_is_served() {
        let sim = SimDriver::new();
        let h = sim.acquire("10.0.0.5", 8193, Duration::ZERO).unwrap();
        for id in ReadingId::iter() {
            assert!(
                (id.accessor())(&sim, h).is_ok(),
                "sim should serve {id}"
            );
        }
    }
}
