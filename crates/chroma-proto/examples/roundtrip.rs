//! Encodes a few commands, frames them, and feeds the frames back through
//! the receiver. Run with `cargo run --example roundtrip`.

use chroma_proto::commands::Command;
use chroma_proto::frame::{encode_frame, FrameReceiver, MAX_FRAME_LEN};

fn main() {
    let cmds = [
        Command::Ping,
        Command::SetValves {
            reagent_port: 2,
            column_port: 3,
        },
        Command::SetPump {
            flow_ml_min: 3.0,
            accel_ml_min_s: 5.0,
        },
        Command::GetDeviceState,
    ];

    let mut rx = FrameReceiver::new();
    for cmd in cmds {
        let mut payload = [0u8; 255];
        let n = cmd.write_payload(&mut payload).expect("payload");
        let mut frame = [0u8; MAX_FRAME_LEN];
        let frame_len = encode_frame(&payload[..n], &mut frame).expect("frame");
        println!("{:?} -> {} bytes on the wire", cmd, frame_len);

        for &b in &frame[..frame_len] {
            if let Some(Ok(decoded)) = rx.push(b) {
                println!("  received back: {:?}", Command::parse(decoded));
            }
        }
    }
}
