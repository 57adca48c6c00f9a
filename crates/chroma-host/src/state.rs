//! HTTP-facing data transfer types.
//!
//! The wire snapshot and binary program steps are converted into the JSON
//! shapes the browser UI consumes, and operator-authored JSON programs are
//! converted back into binary steps for transfer.

use fluidics::{DeviceMode, DeviceState, ProgramStep, ValveState, PORT_KEEP_CURRENT, PORT_UNKNOWN};
use serde::{Deserialize, Serialize};

/// `GET /api/status` response body.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub mode: &'static str,
    pub pump_speed_ml_min: f32,
    pub volume_ul: f32,
    pub running: bool,
    pub step_index: u16,
    pub progress: u8,
    /// `null` while the valve position is unknown (unhomed or moving).
    pub reagent_port: Option<u8>,
    pub column_port: Option<u8>,
    pub reagent_valve_state: &'static str,
    pub column_valve_state: &'static str,
}

fn mode_name(mode: DeviceMode) -> &'static str {
    match mode {
        DeviceMode::Initializing => "initializing",
        DeviceMode::Pumping => "pumping",
        DeviceMode::Stopping => "stopping",
        DeviceMode::SettingValves => "setting_valves",
    }
}

fn valve_state_name(state: ValveState) -> &'static str {
    match state {
        ValveState::Reset => "idle",
        ValveState::Homing => "homing",
        ValveState::Stopped => "stopped",
        ValveState::Moving => "moving",
    }
}

fn port_or_none(port: u8) -> Option<u8> {
    (port != PORT_UNKNOWN).then_some(port)
}

impl From<DeviceState> for StatusResponse {
    fn from(s: DeviceState) -> Self {
        Self {
            mode: mode_name(s.mode),
            pump_speed_ml_min: s.speed_ml_min,
            volume_ul: s.volume_ul,
            running: s.running,
            step_index: s.step_idx,
            progress: s.progress,
            reagent_port: port_or_none(s.reagent_port),
            column_port: port_or_none(s.column_port),
            reagent_valve_state: valve_state_name(s.reagent_valve),
            column_valve_state: valve_state_name(s.column_valve),
        }
    }
}

/// One step of an operator-authored program, as uploaded by the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepJson {
    #[serde(rename = "type")]
    pub kind: StepKind,
    #[serde(default)]
    pub reagent: u8,
    #[serde(default)]
    pub column: u8,
    #[serde(default)]
    pub pump_speed: f32,
    pub duration_ms: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Flush,
    Wait,
}

impl StepJson {
    /// Encodes the JSON step into its binary form. Programs authored over
    /// HTTP are always time-terminated, so the volume limit is infinite.
    pub fn to_step(&self) -> ProgramStep {
        let duration_s = self.duration_ms as f32 / 1000.0;
        match self.kind {
            StepKind::Flush => ProgramStep::flush(self.reagent, self.column, self.pump_speed, duration_s),
            StepKind::Wait => ProgramStep::wait(duration_s),
        }
    }

    /// Decodes a binary step for `GET /api/program/get`.
    pub fn from_step(step: &ProgramStep) -> Self {
        let duration_ms = if step.duration_s.is_finite() {
            (step.duration_s * 1000.0) as u32
        } else {
            u32::MAX
        };
        if step.reagent_port == PORT_KEEP_CURRENT || step.column_port == PORT_KEEP_CURRENT {
            Self {
                kind: StepKind::Wait,
                reagent: 0,
                column: 0,
                pump_speed: 0.0,
                duration_ms,
            }
        } else {
            Self {
                kind: StepKind::Flush,
                reagent: step.reagent_port,
                column: step.column_port,
                pump_speed: step.flow_ml_min,
                duration_ms,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_steps_encode_with_keep_current_ports() {
        let json = StepJson {
            kind: StepKind::Wait,
            reagent: 0,
            column: 0,
            pump_speed: 0.0,
            duration_ms: 5_000,
        };
        let step = json.to_step();
        assert_eq!(step.reagent_port, PORT_KEEP_CURRENT);
        assert_eq!(step.column_port, PORT_KEEP_CURRENT);
        assert_eq!(step.flow_ml_min, 0.0);
        assert!(step.volume_ml.is_infinite());
        assert_eq!(step.duration_s, 5.0);
    }

    #[test]
    fn flush_steps_keep_the_chosen_ports() {
        let json = StepJson {
            kind: StepKind::Flush,
            reagent: 2,
            column: 4,
            pump_speed: 1.5,
            duration_ms: 30_000,
        };
        let step = json.to_step();
        assert_eq!(step.reagent_port, 2);
        assert_eq!(step.column_port, 4);
        assert_eq!(step.flow_ml_min, 1.5);
        // The HTTP path always produces time-terminated steps.
        assert!(step.volume_ml.is_infinite());
        assert_eq!(step.duration_s, 30.0);
    }

    #[test]
    fn binary_steps_roundtrip_to_json_shapes() {
        let flush = ProgramStep::flush(1, 3, 2.0, 10.0);
        let json = StepJson::from_step(&flush);
        assert_eq!(json.kind, StepKind::Flush);
        assert_eq!(json.to_step(), flush);

        let wait = ProgramStep::wait(2.5);
        let json = StepJson::from_step(&wait);
        assert_eq!(json.kind, StepKind::Wait);
        assert_eq!(json.to_step(), wait);
    }

    #[test]
    fn json_wire_shape_matches_the_ui() {
        let parsed: Vec<StepJson> = serde_json::from_str(
            r#"[
                {"type": "flush", "reagent": 1, "column": 0, "pump_speed": 2.0, "duration_ms": 30000},
                {"type": "wait", "duration_ms": 5000}
            ]"#,
        )
        .unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].kind, StepKind::Flush);
        assert_eq!(parsed[1].kind, StepKind::Wait);
        assert_eq!(parsed[1].reagent, 0);
    }

    #[test]
    fn status_response_maps_unknown_ports_to_null() {
        let mut state = DeviceState::default();
        state.reagent_port = 3;
        let status = StatusResponse::from(state);
        assert_eq!(status.reagent_port, Some(3));
        assert_eq!(status.column_port, None);
        assert_eq!(status.mode, "initializing");
        assert_eq!(status.reagent_valve_state, "idle");
    }
}
