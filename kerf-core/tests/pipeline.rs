//! Lines through the parser, planner, segment preparer and step interrupt

mod common;

use common::{settings, with_machine, Rig};
use kerf_core::gcode::modal::{CoordIndex, Distance, Motion};
use kerf_core::gcode::GcodeError;
use kerf_core::motion::position::AxisMask;
use kerf_core::motion::RealtimeCommand;
use kerf_core::planner::Planner;
use kerf_core::system::{Alarm, MachineState, SquaringMode};
use kerf_core::traits::{CoolantState, Feedback, SpindleState};

#[test]
fn test_linear_move_reaches_target() {
    let rig = Rig::new();
    with_machine::<16, _>(&settings(), &rig, |bench| {
        bench.line("G1 X10 Y-5 F600").unwrap();
        bench.settle();

        assert_eq!(bench.steps(), [1000, -500, 0]);
        assert_eq!(bench.physical(), bench.steps());
        assert_eq!(bench.sys.state(), MachineState::Idle);
        assert!(rig.saw_state(MachineState::Cycle));
        assert_eq!(bench.parser.state().position[0], 10.0);
    });
}

#[test]
fn test_incremental_moves_accumulate() {
    let rig = Rig::new();
    with_machine::<16, _>(&settings(), &rig, |bench| {
        bench.line("G91 G0 X2").unwrap();
        bench.line("X3").unwrap();
        bench.line("G90").unwrap();
        bench.settle();

        assert_eq!(bench.steps(), [500, 0, 0]);
        assert_eq!(bench.parser.state().modal.distance, Distance::Absolute);
    });
}

#[test]
fn test_full_planner_blocks_until_motion_drains() {
    let rig = Rig::new();
    with_machine::<4, _>(&settings(), &rig, |bench| {
        for x in 1..=12 {
            bench.line(&format!("G1 X{x} F2000")).unwrap();
        }
        // Submitting past the queue depth had to start the cycle
        assert!(rig.ticks.get() > 0);
        bench.settle();

        assert_eq!(bench.steps(), [1200, 0, 0]);
        assert_eq!(bench.physical(), [1200, 0, 0]);
    });
}

#[test]
fn test_work_coordinates_offset_motion() {
    let rig = Rig::new();
    with_machine::<16, _>(&settings(), &rig, |bench| {
        bench.line("G10 L2 P2 X5 Y-1").unwrap();
        bench.line("G55 G0 X0 Y0").unwrap();
        bench.settle();
        assert_eq!(bench.steps(), [500, -100, 0]);
        assert_eq!(bench.parser.state().modal.coord_select, CoordIndex::G55);

        bench.line("G92 X0").unwrap();
        bench.line("G0 X1").unwrap();
        bench.settle();
        assert_eq!(bench.steps(), [600, -100, 0]);
    });
}

#[test]
fn test_arc_ends_on_target() {
    let rig = Rig::new();
    with_machine::<16, _>(&settings(), &rig, |bench| {
        bench.line("G2 X10 Y0 I5 J0 F600").unwrap();
        bench.settle();

        assert_eq!(bench.steps(), [1000, 0, 0]);
        assert_eq!(bench.physical(), [1000, 0, 0]);
    });
}

#[test]
fn test_feed_hold_then_resume() {
    let rig = Rig::new();
    with_machine::<16, _>(&settings(), &rig, |bench| {
        bench.line("G1 X20 F600").unwrap();
        bench.mc.auto_cycle_start();
        rig.after(30, b'!');
        rig.after(600, b'~');
        bench.settle();

        assert!(rig.saw_state(MachineState::Hold));
        assert_eq!(bench.steps(), [2000, 0, 0]);
        assert_eq!(bench.sys.state(), MachineState::Idle);
    });
}

#[test]
fn test_feed_hold_inside_long_block_resumes_to_target() {
    let rig = Rig::new();
    with_machine::<16, _>(&settings(), &rig, |bench| {
        bench.line("G1 X200 F600").unwrap();
        bench.mc.auto_cycle_start();
        rig.after(300, b'!');
        rig.after(3000, b'~');
        bench.settle();

        assert!(rig.saw_state(MachineState::Hold));
        assert_eq!(bench.steps(), [20000, 0, 0]);
        assert_eq!(bench.physical(), bench.steps());
        assert_eq!(bench.sys.state(), MachineState::Idle);
    });
}

#[test]
fn test_feed_override_slows_running_block() {
    let rig = Rig::new();
    with_machine::<16, _>(&settings(), &rig, |bench| {
        bench.line("G1 X200 F3000").unwrap();
        bench.mc.auto_cycle_start();
        for _ in 0..200_000 {
            if bench.steps()[0] >= 3000 {
                break;
            }
            bench.mc.execute_realtime();
        }
        assert!(bench.steps()[0] >= 3000);
        let entry = bench.mc.planner().current_block().map(|block| block.entry_speed_sqr);
        assert_eq!(entry, Some(0.0));

        for _ in 0..9 {
            rig.after(0, 0x92);
        }
        for _ in 0..5 {
            bench.mc.execute_realtime();
        }
        assert_eq!(bench.sys.feed_override(), 10);

        let planner = bench.mc.planner();
        let block = planner.current_block().copied().unwrap();
        let nominal = planner.profile_nominal_speed(&block);
        assert!((nominal - 300.0).abs() < 0.01);
        // Re-entered at the cruising speed, above the new nominal
        assert!(block.entry_speed_sqr > 900.0 * 900.0);
        assert!(block.entry_speed_sqr > nominal * nominal);

        bench.settle();
        assert_eq!(bench.steps(), [20000, 0, 0]);
        assert_eq!(bench.physical(), bench.steps());
    });
}

#[test]
fn test_safety_door_parks_spindle_and_restores_it() {
    let rig = Rig::new();
    with_machine::<16, _>(&settings(), &rig, |bench| {
        bench.line("M3 S800").unwrap();
        assert_eq!(rig.spindle.get(), (SpindleState::Cw, 800.0));
        bench.line("G1 X20 F600").unwrap();
        bench.mc.auto_cycle_start();

        rig.door_open_until.set(Some(rig.services.get() + 400));
        rig.after(30, 0x84);
        rig.after(700, b'~');
        bench.settle();

        assert!(rig.saw_state(MachineState::SafetyDoor));
        assert!(rig.feedback.borrow().contains(&Feedback::SafetyDoorAjar));
        let log = rig.spindle_log.borrow();
        assert!(log.ends_with(&[SpindleState::Cw, SpindleState::Disable, SpindleState::Cw]));
        assert_eq!(rig.spindle.get(), (SpindleState::Cw, 800.0));
        assert_eq!(bench.steps(), [2000, 0, 0]);
    });
}

#[test]
fn test_jog_cancel_stops_short_and_resyncs_parser() {
    let rig = Rig::new();
    with_machine::<16, _>(&settings(), &rig, |bench| {
        bench.line("$J=G91 X50 F1000").unwrap();
        assert_eq!(bench.sys.state(), MachineState::Jog);
        rig.after(40, 0x85);
        bench.settle();

        assert_eq!(bench.sys.state(), MachineState::Idle);
        let x = bench.steps()[0];
        assert!(x > 0 && x < 5000, "jog stopped at {x}");
        assert_eq!(bench.physical()[0], x);

        // The next line picks up where the jog actually stopped
        bench.line("").unwrap();
        assert_eq!(bench.parser.state().position[0], x as f32 / 100.0);
        // Modal state is not touched by a jog
        assert_eq!(bench.parser.state().modal.distance, Distance::Absolute);
    });
}

#[test]
fn test_jog_requires_idle() {
    let rig = Rig::new();
    with_machine::<16, _>(&settings(), &rig, |bench| {
        bench.line("$C").unwrap();
        assert_eq!(bench.line("$J=X1 F100"), Err(GcodeError::IdleError));
    });
}

#[test]
fn test_probe_stops_at_contact() {
    let rig = Rig::new();
    rig.probe_at.set(Some((2, -300)));
    with_machine::<16, _>(&settings(), &rig, |bench| {
        bench.line("G38.2 Z-10 F100").unwrap();
        bench.settle();

        assert!(bench.sys.probe_succeeded());
        let contact = bench.sys.probe_position()[2];
        assert!((-302..=-299).contains(&contact), "contact at {contact}");
        // Stopped right after contact, well short of the target
        let z = bench.steps()[2];
        assert!((-320..=-299).contains(&z), "stopped at {z}");
        assert_eq!(bench.parser.state().position[2], z as f32 / 100.0);
        assert_eq!(bench.sys.state(), MachineState::Idle);
        assert!(rig.alarms.borrow().is_empty());
    });
}

#[test]
fn test_probe_without_contact_alarms() {
    let rig = Rig::new();
    with_machine::<16, _>(&settings(), &rig, |bench| {
        bench.line("G38.2 Z-1 F100").unwrap();
        bench.settle();

        assert!(!bench.sys.probe_succeeded());
        assert_eq!(rig.alarms.borrow().as_slice(), [Alarm::ProbeFailContact]);
        assert_eq!(bench.sys.state(), MachineState::Alarm);
    });
}

#[test]
fn test_probe_no_error_variant_stays_idle() {
    let rig = Rig::new();
    with_machine::<16, _>(&settings(), &rig, |bench| {
        bench.line("G38.3 Z-1 F100").unwrap();
        bench.settle();

        assert!(!bench.sys.probe_succeeded());
        assert!(rig.alarms.borrow().is_empty());
        assert_eq!(bench.steps(), [0, 0, -100]);
        assert_eq!(bench.sys.state(), MachineState::Idle);
    });
}

#[test]
fn test_soft_limit_locks_machine() {
    let rig = Rig::new();
    let mut settings = settings();
    settings.soft_limits = true;
    settings.homing.enabled = true;
    with_machine::<16, _>(&settings, &rig, |bench| {
        let _ = bench.line("G0 X10");
        assert!(bench.sys.is_aborted());
        assert!(rig.alarms.borrow().contains(&Alarm::SoftLimit));
        assert!(rig.feedback.borrow().contains(&Feedback::CriticalEvent));
        assert_eq!(bench.steps(), [0, 0, 0]);

        bench.recover();
        assert_eq!(bench.sys.state(), MachineState::Alarm);
        assert!(rig.feedback.borrow().contains(&Feedback::AlarmLock));
        assert_eq!(bench.line("G0 X-1"), Err(GcodeError::SystemLocked));

        bench.line("$X").unwrap();
        assert_eq!(bench.sys.state(), MachineState::Idle);
        bench.line("G0 X-1").unwrap();
        bench.settle();
        assert_eq!(bench.steps(), [-100, 0, 0]);
    });
}

#[test]
fn test_reset_during_motion_aborts_cycle() {
    let rig = Rig::new();
    with_machine::<16, _>(&settings(), &rig, |bench| {
        bench.line("G1 X20 F600").unwrap();
        bench.mc.auto_cycle_start();
        rig.after(40, 0x18);
        bench.settle();

        assert!(bench.sys.is_aborted());
        assert!(rig.alarms.borrow().contains(&Alarm::AbortCycle));
        let x = bench.steps()[0];
        assert!(x > 0 && x < 2000);

        bench.recover();
        assert_eq!(bench.sys.state(), MachineState::Alarm);
        assert!(!rig.timer_running.get());
        assert_eq!(bench.parser.state().position[0], x as f32 / 100.0);
    });
}

#[test]
fn test_check_mode_parses_without_moving() {
    let rig = Rig::new();
    with_machine::<16, _>(&settings(), &rig, |bench| {
        bench.line("$C").unwrap();
        assert_eq!(bench.sys.state(), MachineState::CheckMode);
        bench.line("G1 X10 F100 M3 S100").unwrap();
        assert_eq!(bench.line("G1 X10"), Ok(()));
        assert_eq!(bench.line("G2 X1"), Err(GcodeError::NoOffsetsInPlane));
        bench.settle();
        assert_eq!(bench.steps(), [0, 0, 0]);
        assert_eq!(rig.spindle.get().0, SpindleState::Disable);

        // Leaving check mode resets everything it parsed
        bench.line("$C").unwrap();
        bench.settle();
        assert!(bench.sys.is_aborted());
        bench.recover();
        assert_eq!(bench.sys.state(), MachineState::Idle);
        assert_eq!(bench.parser.state().position[0], 0.0);

        let feedback = rig.feedback.borrow();
        assert!(feedback.contains(&Feedback::Enabled));
        assert!(feedback.contains(&Feedback::Disabled));
    });
}

#[test]
fn test_program_end_restores_defaults() {
    let rig = Rig::new();
    with_machine::<16, _>(&settings(), &rig, |bench| {
        bench.line("G91 G0 X1").unwrap();
        bench.line("M8").unwrap();
        assert!(rig.coolant.get().flood);
        bench.line("M30").unwrap();

        let modal = bench.parser.state().modal;
        assert_eq!(modal.distance, Distance::Absolute);
        assert_eq!(modal.motion, Motion::Linear);
        assert_eq!(modal.coolant, CoolantState::OFF);
        assert_eq!(rig.coolant.get(), CoolantState::OFF);
        assert_eq!(bench.steps(), [100, 0, 0]);
        assert!(rig.feedback.borrow().contains(&Feedback::ProgramEnd));
    });
}

#[test]
fn test_dwell_waits_in_slices() {
    let rig = Rig::new();
    with_machine::<16, _>(&settings(), &rig, |bench| {
        bench.line("G4 P0.2").unwrap();
        assert_eq!(rig.clock_ms.get(), 200);
        bench.line("G4 P0").unwrap();
        assert_eq!(rig.clock_ms.get(), 200);
    });
}

#[test]
fn test_user_outputs() {
    let rig = Rig::new();
    with_machine::<16, _>(&settings(), &rig, |bench| {
        bench.line("M62 P1").unwrap();
        assert!(rig.digital.borrow()[1]);
        bench.line("M65 P1").unwrap();
        assert!(!rig.digital.borrow()[1]);

        bench.line("M67 E2 Q150").unwrap();
        assert_eq!(rig.analog.borrow()[2], 100.0);

        assert_eq!(bench.line("M64 P9"), Err(GcodeError::PParamMaxExceeded));
        assert_eq!(bench.line("M62"), Err(GcodeError::ValueWordMissing));
    });
}

#[test]
fn test_spindle_override_scales_running_spindle() {
    let rig = Rig::new();
    with_machine::<16, _>(&settings(), &rig, |bench| {
        bench.line("M3 S500").unwrap();
        RealtimeCommand::SpindleOverrideCoarseMinus.apply(bench.sys);
        bench.mc.execute_realtime();

        assert_eq!(bench.sys.spindle_override(), 90);
        assert_eq!(rig.spindle_rpm.get(), 450.0);
    });
}

#[test]
fn test_feed_override_applied_during_motion() {
    let rig = Rig::new();
    with_machine::<16, _>(&settings(), &rig, |bench| {
        bench.line("G1 X5 F300").unwrap();
        bench.mc.auto_cycle_start();
        rig.after(10, 0x91);
        bench.settle();

        assert_eq!(bench.sys.feed_override(), 110);
        assert_eq!(bench.steps(), [500, 0, 0]);
    });
}

#[test]
fn test_homing_single_axis() {
    let rig = Rig::new();
    rig.limit_at[0].set(Some(5000));
    let mut settings = settings();
    settings.homing.enabled = true;
    with_machine::<16, _>(&settings, &rig, |bench| {
        bench.line("$HX").unwrap();

        assert_eq!(bench.sys.state(), MachineState::Idle);
        assert!(rig.alarms.borrow().is_empty());
        // Pulled off one millimeter below the switch
        assert_eq!(bench.steps()[0], -100);
        let x = bench.physical()[0];
        assert!((4898..=4904).contains(&x), "parked at {x}");
        assert_eq!(bench.parser.state().position[0], -1.0);
    });
}

#[test]
fn test_homing_without_switch_fails() {
    let rig = Rig::new();
    let mut settings = settings();
    settings.homing.enabled = true;
    settings.axes[2].max_travel = 2.0;
    with_machine::<16, _>(&settings, &rig, |bench| {
        bench.line("$HZ").unwrap();

        assert!(bench.sys.is_aborted());
        assert!(rig.alarms.borrow().contains(&Alarm::HomingFailApproach));
    });
}

#[test]
fn test_homing_squares_ganged_axis() {
    let rig = Rig::new();
    rig.limit_at[1].set(Some(2000));
    let mut settings = settings();
    settings.homing.enabled = true;
    settings.homing.squared_axes = AxisMask::from_bits(0b010);
    with_machine::<16, _>(&settings, &rig, |bench| {
        bench.line("$HY").unwrap();

        assert_eq!(
            rig.ganged_modes.borrow().as_slice(),
            [SquaringMode::Dual, SquaringMode::A, SquaringMode::B]
        );
        assert_eq!(bench.sys.ganged_mode(), SquaringMode::Dual);
        assert_eq!(bench.steps()[1], -100);
    });
}

#[test]
fn test_homing_disabled_rejected() {
    let rig = Rig::new();
    with_machine::<16, _>(&settings(), &rig, |bench| {
        assert_eq!(bench.line("$H"), Err(GcodeError::SettingDisabled));
        assert_eq!(bench.line("$Q"), Err(GcodeError::InvalidStatement));
    });
}

#[test]
fn test_build_info() {
    let rig = Rig::new();
    with_machine::<16, _>(&settings(), &rig, |bench| {
        bench.line("$I").unwrap();
        assert!(rig.messages.borrow()[0].starts_with("[VER:kerf "));
    });
}
