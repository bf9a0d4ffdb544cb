//! Drivers used from both the protocol loop and the step task
//!
//! The probe is sampled on every step tick and checked before a probe
//! cycle; the spindle is programmed from the loop and rate-adjusted per
//! segment in laser mode. Each lives in a critical-section mutex and is
//! reached through a `&'static Shared<T>`, which implements the same
//! motion-core trait as `T`.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use kerf_core::traits::{DoorSwitch, ProbeInput, Spindle, SpindleState};

pub struct Shared<T> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Option<T>>>,
}

impl<T> Shared<T> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    /// Install the driver. Until then every access is a no-op.
    pub fn init(&self, value: T) {
        self.inner.lock(|cell| *cell.borrow_mut() = Some(value));
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.inner.lock(|cell| cell.borrow_mut().as_mut().map(f))
    }
}

impl<T: ProbeInput> ProbeInput for &Shared<T> {
    fn is_triggered(&mut self) -> bool {
        self.with(|probe| probe.is_triggered()).unwrap_or(false)
    }
}

impl<T: DoorSwitch> DoorSwitch for &Shared<T> {
    fn is_ajar(&mut self) -> bool {
        self.with(|door| door.is_ajar()).unwrap_or(false)
    }
}

impl<T: Spindle> Spindle for &Shared<T> {
    fn set_rpm(&mut self, rpm: f32) {
        self.with(|spindle| spindle.set_rpm(rpm));
    }

    fn set_state(&mut self, state: SpindleState, rpm: f32) {
        self.with(|spindle| spindle.set_state(state, rpm));
    }

    fn sync(&mut self, state: SpindleState, rpm: f32) {
        self.with(|spindle| spindle.sync(state, rpm));
    }

    fn is_laser_mode(&self) -> bool {
        self.with(|spindle| spindle.is_laser_mode()).unwrap_or(false)
    }

    fn stop(&mut self) {
        self.with(|spindle| spindle.stop());
    }
}
