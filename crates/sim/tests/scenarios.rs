//! End-to-end scenarios against the virtual-time harness.

use chroma_firmware::dispatch::ACK_OK;
use chroma_proto::commands::Command;
use fluidics::{DeviceMode, DeviceState, ProgramStep, ValveState};
use sim::SimDevice;

fn valve_active(state: &DeviceState) -> bool {
    matches!(state.reagent_valve, ValveState::Homing | ValveState::Moving)
        || matches!(state.column_valve, ValveState::Homing | ValveState::Moving)
}

fn upload_program(dev: &mut SimDevice, steps: &[ProgramStep]) {
    assert_eq!(&dev.send(Command::InitProgramWrite)[..], [ACK_OK]);
    let mut block = Vec::new();
    for step in steps {
        block.extend_from_slice(&step.to_wire());
    }
    assert_eq!(&dev.send(Command::WriteProgramBlock { data: &block })[..], [ACK_OK]);
}

/// Scenario: a ping frame is answered by the byte-identical ack frame.
#[test]
fn ping_roundtrip_on_the_wire() {
    let mut dev = SimDevice::new();
    let ping = [0x21, 0x37, 0x05, 0x00, 0xD2, 0x02, 0xEF, 0x8D];
    let replies = dev.send_frame(&ping);
    assert_eq!(replies, vec![ping.to_vec()]);
}

/// Scenario: pump ramp. At 1 mL/min/s toward 3 mL/min the speed settles
/// after 3 s and the delivered volume matches the integrated ramp curve.
#[test]
fn pump_ramp_delivers_the_integrated_volume() {
    let mut dev = SimDevice::new();
    assert_eq!(
        &dev.send(Command::SetPump {
            flow_ml_min: 3.0,
            accel_ml_min_s: 1.0,
        })[..],
        [ACK_OK]
    );

    dev.advance_ms(5_000);
    let state = dev.state();
    assert!(
        (state.speed_ml_min - 3.0).abs() < 0.01,
        "speed at 5 s: {}",
        state.speed_ml_min
    );

    dev.advance_ms(5_000);
    let state = dev.state();
    // Ramp area (1.5 mL/min avg over 3 s) plus 7 s of steady 3 mL/min:
    // 75 µL + 350 µL.
    let expected_ul = 425.0;
    let error = (state.volume_ul - expected_ul).abs() / expected_ul;
    assert!(
        error < 0.02,
        "volume {} µL, expected {} µL ({:.1}% off)",
        state.volume_ul,
        expected_ul,
        error * 100.0
    );
}

/// Scenario: valve switch during flow. The FSM stops the pump, moves both
/// valves, and resumes the previous setpoint; the pump never steps while a
/// valve is active.
#[test]
fn valve_switch_during_flow_stops_and_resumes() {
    let mut dev = SimDevice::new();
    dev.send(Command::SetPump {
        flow_ml_min: 3.0,
        accel_ml_min_s: 5.0,
    });
    dev.advance_ms(2_000);
    assert_eq!(dev.state().mode, DeviceMode::Pumping);
    assert!((dev.state().speed_ml_min - 3.0).abs() < 0.01);

    dev.send(Command::SetValves {
        reagent_port: 2,
        column_port: 3,
    });

    let mut saw_stopping = false;
    let mut saw_setting = false;
    let mut pump_edges_while_valves_active = 0u64;
    let mut last_edges = dev.pump_motor.state().rising_edges;
    let mut was_active = false;

    // 20 s is ample for decel (0.3 s), homing, and both moves.
    for _ in 0..2_000 {
        dev.advance_ms(10);
        let state = dev.state();
        let edges = dev.pump_motor.state().rising_edges;
        match state.mode {
            DeviceMode::Stopping => saw_stopping = true,
            DeviceMode::SettingValves => saw_setting = true,
            _ => {}
        }
        let active = valve_active(&state);
        if active {
            assert!(state.speed_ml_min.abs() < 1e-6);
        }
        // Count edges over windows that lie fully inside the active
        // phase; the transition window may still carry final decel edges.
        if active && was_active {
            pump_edges_while_valves_active += edges - last_edges;
        }
        was_active = active;
        last_edges = edges;
        if saw_setting && state.mode == DeviceMode::Pumping {
            break;
        }
    }

    assert!(saw_stopping);
    assert!(saw_setting);
    assert_eq!(pump_edges_while_valves_active, 0);

    let state = dev.state();
    assert_eq!(state.mode, DeviceMode::Pumping);
    assert_eq!(state.reagent_port, 2);
    assert_eq!(state.column_port, 3);

    // The latched 3 mL/min setpoint ramps back in.
    dev.advance_ms(2_000);
    assert!((dev.state().speed_ml_min - 3.0).abs() < 0.01);
}

/// Scenario: a two-step program (30 s flush, 5 s wait) advances on time
/// and finishes with the pump commanded to zero.
#[test]
fn two_step_program_runs_to_completion() {
    let mut dev = SimDevice::new();
    upload_program(
        &mut dev,
        &[
            ProgramStep::flush(1, 0, 2.0, 30.0),
            ProgramStep::wait(5.0),
        ],
    );
    assert_eq!(&dev.send(Command::ExecuteProgram)[..], [ACK_OK]);

    dev.advance_ms(15_000);
    let state = dev.state();
    assert!(state.running);
    assert_eq!(state.step_idx, 0);
    // Half the flush elapsed; the progress byte tracks time linearly.
    assert!((120..=135).contains(&state.progress), "{}", state.progress);

    dev.advance_ms(14_000);
    assert_eq!(dev.state().step_idx, 0);

    dev.advance_ms(2_000);
    let state = dev.state();
    assert!(state.running);
    assert_eq!(state.step_idx, 1);
    // The wait step leaves the valves where the flush put them.
    assert_eq!(state.reagent_port, 1);
    assert_eq!(state.column_port, 0);

    dev.advance_ms(6_000);
    let state = dev.state();
    assert!(!state.running);
    assert_eq!(state.step_idx, 2);
    assert!(state.speed_ml_min.abs() < 1e-6);
}

/// Scenario: abort mid-step. Execution stops within a tick, the pump
/// ramps down at the default acceleration, and the valves stay put.
#[test]
fn abort_mid_step_ramps_down_and_keeps_valves() {
    let mut dev = SimDevice::new();
    upload_program(&mut dev, &[ProgramStep::flush(1, 0, 2.0, 30.0)]);
    dev.send(Command::ExecuteProgram);

    dev.advance_ms(10_000);
    let state = dev.state();
    assert!(state.running);
    assert_eq!(state.reagent_port, 1);
    let speed_before = state.speed_ml_min;
    assert!(speed_before > 1.9);

    assert_eq!(&dev.send(Command::AbortProgram)[..], [ACK_OK]);
    dev.advance_ms(20);
    let state = dev.state();
    assert!(!state.running);

    // 2 mL/min at the default 5 mL/min/s stops within 0.4 s.
    dev.advance_ms(500);
    let state = dev.state();
    assert!(state.speed_ml_min.abs() < 1e-6);
    assert_eq!(state.reagent_port, 1);
    assert_eq!(state.column_port, 0);
}

/// Scenario: a corrupted CRC yields no reply, and the link keeps working.
#[test]
fn crc_corruption_is_silent_and_recoverable() {
    let mut dev = SimDevice::new();
    let ping = [0x21, 0x37, 0x05, 0x00, 0xD2, 0x02, 0xEF, 0x8D];
    let mut corrupt = ping;
    corrupt[7] ^= 0xFF;

    assert!(dev.send_frame(&corrupt).is_empty());
    assert_eq!(dev.send_frame(&ping), vec![ping.to_vec()]);
}

/// Program transfer over the link: write in blocks, read back, check
/// length accounting.
#[test]
fn program_uploads_readback_over_the_link() {
    let mut dev = SimDevice::new();
    dev.send(Command::InitProgramWrite);

    let steps: Vec<ProgramStep> = (0..20)
        .map(|i| ProgramStep::flush(i % 6, (i + 1) % 6, 1.0, 10.0))
        .collect();
    // 15 steps per frame, so two blocks.
    for chunk in steps.chunks(15) {
        let mut block = Vec::new();
        for step in chunk {
            block.extend_from_slice(&step.to_wire());
        }
        assert_eq!(&dev.send(Command::WriteProgramBlock { data: &block })[..], [ACK_OK]);
    }

    let reply = dev.send(Command::GetProgramLength);
    assert_eq!(&reply[..2], &[0, 20]);

    let reply = dev.send(Command::ReadProgramBlock { start: 15, count: 15 });
    assert_eq!(reply.len(), 5 * 16);
    assert_eq!(reply[0], 15 % 6);
}
