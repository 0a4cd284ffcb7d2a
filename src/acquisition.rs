//! The interrupt-driven measurement cycle.
//!
//! Two timer events drive acquisition: a mid-period tick while the element
//! is driven (current measurement) and an end-of-period tick while it is
//! not (temperature and ambient measurement). Completion of the converter
//! feeds the averaged readings into the iron and commands the next duty
//! value. A phase word guards against overlapping acquisitions; losing the
//! race drops power rather than mixing readings.

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::iron::{IronMutex, with_iron};
use crate::power::{CHECK_PERIOD, DutyCell, MAX_DUTY, PROBE_DUTY};

/// Conversions per sensor per loop.
pub const ADC_CONV: usize = 2;

/// Scan loops per acquisition.
pub const ADC_LOOPS: usize = 2;

/// Length of one completed sample buffer.
///
/// Samples arrive interleaved, one group of `current, temp, ambient, temp`
/// per loop.
pub const SAMPLE_BUF_LEN: usize = ADC_LOOPS * ADC_CONV * 2;

/// The acquisition phase guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AdcPhase {
    /// No conversion in flight.
    Idle = 0,
    /// A current measurement is in flight.
    SamplingCurrent = 1,
    /// A temperature measurement is in flight.
    SamplingTemperature = 2,
}

impl AdcPhase {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::SamplingCurrent,
            2 => Self::SamplingTemperature,
            _ => Self::Idle,
        }
    }
}

/// Starts a conversion run on the hardware (or a test double).
pub trait Sampler {
    /// Kick off one conversion run; completion is reported back through
    /// [`Acquisition::on_conversion_complete`].
    fn start(&self);
}

impl<T: Sampler> Sampler for &T {
    fn start(&self) {
        (**self).start();
    }
}

/// The acquisition state machine, shared between the timer and conversion
/// interrupt contexts.
pub struct Acquisition<'d, S: Sampler> {
    /// Phase guard, see [`AdcPhase`].
    phase: AtomicU8,
    /// Temperature cycles left until the next connectivity probe.
    check_count: AtomicU8,
    /// Whether the element was driven when the current sampling began.
    powered_at_start: AtomicBool,
    sampler: S,
    iron: &'d IronMutex,
    duty: &'d DutyCell,
}

impl<'d, S: Sampler> Acquisition<'d, S> {
    /// An idle state machine.
    ///
    /// The probe counter starts at one so the first temperature cycle
    /// already checks element connectivity.
    pub fn new(sampler: S, iron: &'d IronMutex, duty: &'d DutyCell) -> Self {
        Self {
            phase: AtomicU8::new(AdcPhase::Idle as u8),
            check_count: AtomicU8::new(1),
            powered_at_start: AtomicBool::new(false),
            sampler,
            iron,
            duty,
        }
    }

    /// The current acquisition phase.
    pub fn phase(&self) -> AdcPhase {
        AdcPhase::from_raw(self.phase.load(Ordering::Relaxed))
    }

    /// Mid-period tick: sample the element current while it is driven.
    ///
    /// Skipped entirely at zero duty; there is no current to measure.
    pub fn on_power_check_tick(&self) {
        if !self.duty.is_powered() {
            return;
        }
        if self.try_begin(AdcPhase::SamplingCurrent) {
            self.powered_at_start.store(true, Ordering::Relaxed);
        }
    }

    /// End-of-period tick: sample temperature and ambient while the element
    /// is not driven.
    pub fn on_temperature_tick(&self) {
        self.try_begin(AdcPhase::SamplingTemperature);
    }

    /// Claim the converter for `next`. A lost claim means the previous
    /// conversion overran its slot; power is dropped and the phase left
    /// untouched.
    fn try_begin(&self, next: AdcPhase) -> bool {
        let claimed = self
            .phase
            .compare_exchange(
                AdcPhase::Idle as u8,
                next as u8,
                Ordering::Relaxed,
                Ordering::Relaxed,
            )
            .is_ok();
        if claimed {
            self.sampler.start();
        } else {
            warn!("conversion overrun, dropping power");
            self.duty.clear();
        }
        claimed
    }

    /// Conversion-complete handler: fold the sample buffer into the iron
    /// and command the next duty value.
    pub fn on_conversion_complete(&self, samples: &[u16; SAMPLE_BUF_LEN]) {
        match self.phase() {
            AdcPhase::SamplingCurrent => self.complete_current(samples),
            AdcPhase::SamplingTemperature => self.complete_temperature(samples),
            AdcPhase::Idle => {
                warn!("spurious conversion completion");
                return;
            }
        }
        self.phase.store(AdcPhase::Idle as u8, Ordering::Relaxed);
    }

    fn complete_current(&self, samples: &[u16; SAMPLE_BUF_LEN]) {
        let sum: u32 = samples
            .chunks_exact(ADC_CONV * 2)
            .map(|group| group[0] as u32)
            .sum();
        let current = ((sum + ADC_LOOPS as u32 / 2) / ADC_LOOPS as u32) as u16;

        // A reading taken after power was dropped mid-cycle would report a
        // false disconnect.
        if self.powered_at_start.swap(false, Ordering::Relaxed) {
            with_iron(self.iron, |iron| iron.update_current(current));
        }
    }

    fn complete_temperature(&self, samples: &[u16; SAMPLE_BUF_LEN]) {
        let mut temp_sum: u32 = 0;
        let mut ambient_sum: u32 = 0;
        for group in samples.chunks_exact(ADC_CONV * 2) {
            temp_sum += group[1] as u32 + group[3] as u32;
            ambient_sum += group[2] as u32;
        }
        let temp = ((temp_sum + ADC_LOOPS as u32) / (ADC_LOOPS as u32 * 2)) as u16;
        let ambient = ((ambient_sum + ADC_LOOPS as u32 / 2) / ADC_LOOPS as u32) as u16;

        let (power, connected) = with_iron(self.iron, |iron| {
            iron.update_ambient(ambient);
            iron.record_temperature(temp);
            (iron.power(temp), iron.is_connected())
        });

        let remaining = self.check_count.load(Ordering::Relaxed).saturating_sub(1);
        let min_duty = if remaining == 0 {
            self.check_count.store(CHECK_PERIOD, Ordering::Relaxed);
            PROBE_DUTY
        } else {
            self.check_count.store(remaining, Ordering::Relaxed);
            0
        };

        if connected {
            self.duty.set(power.clamp(min_duty, MAX_DUTY));
        } else {
            // No regulation power into a missing element, probe pulses only.
            self.duty.set(min_duty);
        }
        trace!("temp {} ambient {} duty {}", temp, ambient, self.duty.get());
    }
}

#[cfg(test)]
mod tests {
    use core::cell::RefCell;
    use core::sync::atomic::AtomicU32;

    use embassy_sync::blocking_mutex::Mutex;

    use super::*;
    use crate::iron::Iron;

    struct MockSampler {
        starts: AtomicU32,
    }

    impl MockSampler {
        fn new() -> Self {
            Self {
                starts: AtomicU32::new(0),
            }
        }

        fn starts(&self) -> u32 {
            self.starts.load(Ordering::Relaxed)
        }
    }

    impl Sampler for MockSampler {
        fn start(&self) {
            self.starts.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn connected_iron() -> IronMutex {
        let mut iron = Iron::new();
        iron.update_current(500);
        Mutex::new(RefCell::new(iron))
    }

    fn complete_temperature(acq: &Acquisition<'_, &MockSampler>, samples: [u16; SAMPLE_BUF_LEN]) {
        acq.on_temperature_tick();
        acq.on_conversion_complete(&samples);
    }

    #[test]
    fn temperature_averages_with_rounding() {
        let sampler = MockSampler::new();
        let iron = connected_iron();
        let duty = DutyCell::new();
        let acq = Acquisition::new(&sampler, &iron, &duty);

        complete_temperature(&acq, [100, 200, 50, 202, 120, 204, 52, 206]);

        with_iron(&iron, |iron| {
            assert_eq!(iron.last_temp(), 203);
            assert_eq!(iron.ambient_raw(), 51);
        });
        assert_eq!(acq.phase(), AdcPhase::Idle);
    }

    #[test]
    fn overrun_drops_power_and_keeps_the_phase() {
        let sampler = MockSampler::new();
        let iron = connected_iron();
        let duty = DutyCell::new();
        let acq = Acquisition::new(&sampler, &iron, &duty);

        acq.on_temperature_tick();
        assert_eq!(sampler.starts(), 1);
        duty.set(800);

        // The conversion never completed; the next tick must lose the claim.
        acq.on_power_check_tick();
        assert_eq!(sampler.starts(), 1);
        assert_eq!(duty.get(), 0);
        assert_eq!(acq.phase(), AdcPhase::SamplingTemperature);
    }

    #[test]
    fn probe_pulses_follow_the_check_period() {
        let sampler = MockSampler::new();
        let iron = connected_iron();
        let duty = DutyCell::new();
        let acq = Acquisition::new(&sampler, &iron, &duty);
        let quiet = [0u16; SAMPLE_BUF_LEN];

        // The very first temperature cycle probes.
        complete_temperature(&acq, quiet);
        assert_eq!(duty.get(), PROBE_DUTY);

        for _ in 1..CHECK_PERIOD {
            complete_temperature(&acq, quiet);
            assert_eq!(duty.get(), 0);
        }
        complete_temperature(&acq, quiet);
        assert_eq!(duty.get(), PROBE_DUTY);
    }

    #[test]
    fn disconnected_element_gets_no_regulation_power() {
        let sampler = MockSampler::new();
        let iron = Mutex::new(RefCell::new(Iron::new()));
        with_iron(&iron, |iron| {
            iron.load(crate::iron::RegulationParams {
                kp: 3000,
                ki: 60,
                kd: 500,
            });
            iron.set_target(3000);
            iron.switch_power(true);
        });
        let duty = DutyCell::new();
        let acq = Acquisition::new(&sampler, &iron, &duty);

        // Probe cycle first, then a plain cycle: neither may exceed the
        // probe duty while no element is detected.
        complete_temperature(&acq, [0u16; SAMPLE_BUF_LEN]);
        assert_eq!(duty.get(), PROBE_DUTY);
        complete_temperature(&acq, [0u16; SAMPLE_BUF_LEN]);
        assert_eq!(duty.get(), 0);
    }

    #[test]
    fn regulation_output_is_clamped_to_the_duty_limit() {
        let sampler = MockSampler::new();
        let iron = connected_iron();
        with_iron(&iron, |iron| {
            iron.load(crate::iron::RegulationParams {
                kp: 30_000,
                ki: 0,
                kd: 0,
            });
            iron.set_target(4000);
            iron.switch_power(true);
        });
        let duty = DutyCell::new();
        let acq = Acquisition::new(&sampler, &iron, &duty);

        complete_temperature(&acq, [0u16; SAMPLE_BUF_LEN]);
        assert!(duty.get() > 0);
        assert!(duty.get() <= MAX_DUTY);
    }

    #[test]
    fn current_is_forwarded_only_when_sampled_under_power() {
        let sampler = MockSampler::new();
        let iron = Mutex::new(RefCell::new(Iron::new()));
        let duty = DutyCell::new();
        let acq = Acquisition::new(&sampler, &iron, &duty);

        // Unpowered: the tick does not even start a conversion.
        acq.on_power_check_tick();
        assert_eq!(sampler.starts(), 0);

        duty.set(PROBE_DUTY);
        acq.on_power_check_tick();
        assert_eq!(sampler.starts(), 1);
        acq.on_conversion_complete(&[500, 0, 0, 0, 500, 0, 0, 0]);

        with_iron(&iron, |iron| assert!(iron.is_connected()));
        assert_eq!(acq.phase(), AdcPhase::Idle);
    }
}
