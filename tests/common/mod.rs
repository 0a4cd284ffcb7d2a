//! Simulated collaborators for the scheduler integration tests.
#![allow(dead_code)]

use core::cell::{Cell, RefCell};

use embassy_sync::blocking_mutex::Mutex;
use embedded_hal::delay::DelayNs;
use t12_core::config::records::{ConfigRecord, TipRecord};
use t12_core::config::storage::{CONFIG_ADDR, MemStorage, Storage, StorageError};
use t12_core::config::tips::TIPS;
use t12_core::iron::{Iron, IronMutex};
use t12_core::{Buzzer, Monotonic, Panel, TiltSensor};

/// Records every diagnostic shown.
#[derive(Default)]
pub struct SimPanel {
    pub errors: Vec<String>,
}

impl Panel for SimPanel {
    fn show_error(&mut self, message: &str) {
        self.errors.push(message.to_owned());
    }
}

/// Counts beeps instead of making noise.
#[derive(Default)]
pub struct SimBuzzer {
    pub enabled: bool,
    pub short_beeps: u32,
    pub failure_beeps: u32,
}

impl Buzzer for SimBuzzer {
    fn enable(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn short_beep(&mut self) {
        self.short_beeps += 1;
    }

    fn failure_beep(&mut self) {
        self.failure_beeps += 1;
    }
}

/// A tilt switch whose state the test scripts directly.
#[derive(Default)]
pub struct SimSensor {
    pub active: Cell<bool>,
}

impl TiltSensor for SimSensor {
    fn is_active(&self) -> bool {
        self.active.get()
    }
}

/// A clock the test advances by hand.
#[derive(Default)]
pub struct FakeClock {
    now_ms: Cell<u32>,
}

impl FakeClock {
    pub fn advance(&self, ms: u32) {
        self.now_ms.set(self.now_ms.get() + ms);
    }

    pub fn set(&self, ms: u32) {
        self.now_ms.set(ms);
    }
}

impl Monotonic for FakeClock {
    fn now_ms(&self) -> u32 {
        self.now_ms.get()
    }
}

/// A delay that completes immediately but records the total requested time.
#[derive(Default)]
pub struct NoopDelay {
    pub slept_ns: u64,
}

impl DelayNs for NoopDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.slept_ns += ns as u64;
    }
}

/// A backend whose every access fails, for boot-error scenarios.
pub struct FailStorage;

impl Storage for FailStorage {
    fn read(&mut self, _addr: u32, _buf: &mut [u8]) -> Result<(), StorageError> {
        Err(StorageError::Bus)
    }

    fn write(&mut self, _addr: u32, _data: &[u8]) -> Result<(), StorageError> {
        Err(StorageError::Bus)
    }
}

/// Storage holding a valid configuration record and nothing else.
pub fn formatted_storage(record: ConfigRecord) -> MemStorage {
    let mut storage = MemStorage::new();
    storage.write(CONFIG_ADDR, &record.encode()).unwrap();
    storage
}

/// Storage holding a valid configuration and a calibrated first tip.
pub fn calibrated_storage(record: ConfigRecord) -> MemStorage {
    let mut storage = formatted_storage(record);
    let tip = TipRecord::calibrated(TIPS[0], [1600, 2100, 2650, 3200], 22);
    storage.write(0, &tip.encode()).unwrap();
    storage
}

/// A fresh iron behind its mutex.
pub fn iron_mutex() -> IronMutex {
    Mutex::new(RefCell::new(Iron::new()))
}
