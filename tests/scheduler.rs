//! End-to-end scheduler scenarios with simulated collaborators.

mod common;

use t12_core::config::records::{CFG_BUZZER, CFG_CELSIUS, CFG_SWITCH, BoostSettings, ConfigRecord};
use t12_core::config::{CfgStatus, Config};
use t12_core::iron::with_iron;
use t12_core::mode::ModeId;
use t12_core::power::DutyCell;
use t12_core::scheduler::Scheduler;
use t12_core::{Core, Event};

macro_rules! harness {
    ($core:ident, $iron:ident, $duty:ident, $panel:ident, $buzzer:ident,
     $sensor:ident, $clock:ident, $delay:ident, $storage:expr) => {
        let $iron = common::iron_mutex();
        let $duty = DutyCell::new();
        let mut $panel = common::SimPanel::default();
        let mut $buzzer = common::SimBuzzer::default();
        let $sensor = common::SimSensor::default();
        let $clock = common::FakeClock::default();
        let mut $delay = common::NoopDelay::default();
        let mut $core = Core {
            cfg: Config::new($storage),
            iron: &$iron,
            duty: &$duty,
            panel: &mut $panel,
            buzzer: &mut $buzzer,
            sensor: &$sensor,
            clock: &$clock,
            delay: &mut $delay,
        };
    };
}

#[test]
fn boot_ok_starts_in_standby_after_the_settle_delay() {
    harness!(
        core,
        iron,
        duty,
        panel,
        buzzer,
        sensor,
        clock,
        delay,
        common::calibrated_storage(ConfigRecord::default())
    );
    let status = core.init();
    assert_eq!(status, CfgStatus::Ok);

    let mut sched = Scheduler::new();
    sched.start(&mut core, status);
    assert_eq!(sched.active(), ModeId::Standby);
    assert_eq!(duty.get(), 0);
    with_iron(&iron, |iron| assert!(!iron.is_powered()));

    drop(core);
    assert_eq!(delay.slept_ns, 500_000_000);
    assert!(buzzer.enabled);
}

#[test]
fn boot_without_tips_starts_in_tip_activation() {
    harness!(
        core,
        iron,
        duty,
        panel,
        buzzer,
        sensor,
        clock,
        delay,
        common::formatted_storage(ConfigRecord::default())
    );
    let status = core.init();
    assert_eq!(status, CfgStatus::NoTip);

    let mut sched = Scheduler::new();
    sched.start(&mut core, status);
    assert_eq!(sched.active(), ModeId::TipActivate);
}

#[test]
fn boot_read_error_shows_the_diagnostic_and_locks_fail() {
    harness!(
        core,
        iron,
        duty,
        panel,
        buzzer,
        sensor,
        clock,
        delay,
        common::FailStorage
    );
    let status = core.init();
    assert_eq!(status, CfgStatus::ReadError);

    let mut sched = Scheduler::new();
    sched.start(&mut core, status);
    assert_eq!(sched.active(), ModeId::Fail);
    let fail = sched.graph().targets(ModeId::Fail);
    assert_eq!(fail.on_short, ModeId::Fail);

    // No gesture sequence leads back out.
    for event in [
        Some(Event::ShortPress),
        Some(Event::LongPress),
        Some(Event::Rotate(3)),
        None,
        Some(Event::ShortPress),
    ] {
        sched.tick(&mut core, event);
        assert_eq!(sched.active(), ModeId::Fail);
        assert_eq!(duty.get(), 0);
    }

    drop(core);
    assert_eq!(panel.errors, ["EEPROM read error"]);
    // Entered once, so exactly one failure tone.
    assert_eq!(buzzer.failure_beeps, 1);
}

#[test]
fn short_press_cycles_between_standby_and_work() {
    harness!(
        core,
        iron,
        duty,
        panel,
        buzzer,
        sensor,
        clock,
        delay,
        common::calibrated_storage(ConfigRecord::default())
    );
    let status = core.init();
    let mut sched = Scheduler::new();
    sched.start(&mut core, status);

    sched.tick(&mut core, Some(Event::ShortPress));
    assert_eq!(sched.active(), ModeId::Work);
    with_iron(&iron, |iron| {
        assert!(iron.is_powered());
        assert_eq!(iron.target(), core.cfg.internal_for(320));
    });

    // Pretend the acquisition loop drives the element.
    duty.set(700);
    sched.tick(&mut core, Some(Event::ShortPress));
    assert_eq!(sched.active(), ModeId::Standby);
    assert_eq!(duty.get(), 0);
    with_iron(&iron, |iron| assert!(!iron.is_powered()));
}

#[test]
fn boost_raises_the_setpoint_until_the_deadline() {
    let record = ConfigRecord {
        boost: BoostSettings::new(2, 0), // +10 degC for 5 s
        ..ConfigRecord::default()
    };
    harness!(
        core,
        iron,
        duty,
        panel,
        buzzer,
        sensor,
        clock,
        delay,
        common::calibrated_storage(record)
    );
    let status = core.init();
    let mut sched = Scheduler::new();
    sched.start(&mut core, status);

    sched.tick(&mut core, Some(Event::ShortPress));
    sched.tick(&mut core, Some(Event::LongPress));
    assert_eq!(sched.active(), ModeId::Boost);
    with_iron(&iron, |iron| {
        assert_eq!(iron.target(), core.cfg.internal_for(330));
    });

    clock.advance(5_001);
    sched.tick(&mut core, None);
    assert_eq!(sched.active(), ModeId::Work);
    with_iron(&iron, |iron| {
        assert_eq!(iron.target(), core.cfg.internal_for(320));
    });
}

#[test]
fn any_press_ends_the_boost_early() {
    harness!(
        core,
        iron,
        duty,
        panel,
        buzzer,
        sensor,
        clock,
        delay,
        common::calibrated_storage(ConfigRecord::default())
    );
    let status = core.init();
    let mut sched = Scheduler::new();
    sched.start(&mut core, status);

    sched.tick(&mut core, Some(Event::ShortPress));
    sched.tick(&mut core, Some(Event::LongPress));
    assert_eq!(sched.active(), ModeId::Boost);

    sched.tick(&mut core, Some(Event::ShortPress));
    assert_eq!(sched.active(), ModeId::Work);
}

#[test]
fn low_power_drops_and_restores_the_setpoint() {
    let record = ConfigRecord {
        low_temp: 200,
        low_to: 5,
        bit_mask: CFG_CELSIUS | CFG_BUZZER | CFG_SWITCH,
        ..ConfigRecord::default()
    };
    harness!(
        core,
        iron,
        duty,
        panel,
        buzzer,
        sensor,
        clock,
        delay,
        common::calibrated_storage(record)
    );
    let status = core.init();
    let mut sched = Scheduler::new();
    sched.start(&mut core, status);

    sched.tick(&mut core, Some(Event::ShortPress));
    assert_eq!(sched.active(), ModeId::Work);

    // Motion at 1 s, then the handle sits still past the 5 s timeout.
    clock.set(1_000);
    sensor.active.set(true);
    sched.tick(&mut core, None);

    sensor.active.set(false);
    clock.set(6_100);
    sched.tick(&mut core, None);
    with_iron(&iron, |iron| {
        assert_eq!(iron.target(), core.cfg.internal_for(200));
    });

    // Motion restores the working setpoint.
    sensor.active.set(true);
    clock.set(6_200);
    sched.tick(&mut core, None);
    with_iron(&iron, |iron| {
        assert_eq!(iron.target(), core.cfg.internal_for(320));
    });
}

#[test]
fn auto_off_forces_the_return_to_standby() {
    harness!(
        core,
        iron,
        duty,
        panel,
        buzzer,
        sensor,
        clock,
        delay,
        common::calibrated_storage(ConfigRecord::default())
    );
    let status = core.init();
    let mut sched = Scheduler::new();
    sched.start(&mut core, status);

    sched.tick(&mut core, Some(Event::ShortPress));
    assert_eq!(sched.active(), ModeId::Work);

    // Default auto-off timeout is 10 minutes.
    clock.set(600_000);
    sched.tick(&mut core, None);
    assert_eq!(sched.active(), ModeId::Standby);
    with_iron(&iron, |iron| assert!(!iron.is_powered()));
}

#[test]
fn menus_time_out_back_to_standby() {
    harness!(
        core,
        iron,
        duty,
        panel,
        buzzer,
        sensor,
        clock,
        delay,
        common::calibrated_storage(ConfigRecord::default())
    );
    let status = core.init();
    let mut sched = Scheduler::new();
    sched.start(&mut core, status);

    sched.tick(&mut core, Some(Event::LongPress));
    assert_eq!(sched.active(), ModeId::MainMenu);

    clock.advance(30_000);
    sched.tick(&mut core, None);
    assert_eq!(sched.active(), ModeId::Standby);
}

#[test]
fn empty_tip_selection_diverts_to_activation() {
    harness!(
        core,
        iron,
        duty,
        panel,
        buzzer,
        sensor,
        clock,
        delay,
        common::formatted_storage(ConfigRecord::default())
    );
    let status = core.init();
    let mut sched = Scheduler::new();
    sched.start(&mut core, status);
    assert_eq!(sched.active(), ModeId::TipActivate);

    sched.tick(&mut core, Some(Event::LongPress));
    assert_eq!(sched.active(), ModeId::MainMenu);
    // First menu entry is tip selection.
    sched.tick(&mut core, Some(Event::ShortPress));
    assert_eq!(sched.active(), ModeId::TipSelect);

    sched.tick(&mut core, None);
    assert_eq!(sched.active(), ModeId::TipActivate);
}

#[test]
fn automatic_calibration_walks_all_four_points() {
    harness!(
        core,
        iron,
        duty,
        panel,
        buzzer,
        sensor,
        clock,
        delay,
        common::calibrated_storage(ConfigRecord::default())
    );
    let status = core.init();
    let mut sched = Scheduler::new();
    sched.start(&mut core, status);

    // Standby -> main menu -> calibration menu -> automatic.
    sched.tick(&mut core, Some(Event::LongPress));
    sched.tick(&mut core, Some(Event::Rotate(2)));
    sched.tick(&mut core, Some(Event::ShortPress));
    assert_eq!(sched.active(), ModeId::CalibMenu);
    sched.tick(&mut core, Some(Event::ShortPress));
    assert_eq!(sched.active(), ModeId::CalibAuto);
    with_iron(&iron, |iron| assert!(iron.is_powered()));

    // The plant follows each setpoint exactly and holds.
    for _ in 0..4 {
        let target = with_iron(&iron, |iron| {
            let target = iron.target();
            iron.record_temperature(target);
            target
        });
        assert!(target > 0);
        sched.tick(&mut core, None);
        clock.advance(3_000);
        sched.tick(&mut core, None);
    }

    assert_eq!(sched.active(), ModeId::Standby);
    let record = core.cfg.active_tip_record();
    assert!(record.is_calibrated());
    assert_eq!(record.points(), [1600, 2100, 2650, 3200]);

    drop(core);
    // One capture beep per reference point.
    assert_eq!(buzzer.short_beeps, 4);
}
