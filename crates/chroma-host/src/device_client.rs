//! Device Client
//!
//! Owns the command link to the controller, over a serial port or the
//! emulator's Unix socket, and exposes typed request methods. The link is
//! strict request/response: every command produces exactly one reply
//! frame, so one in-flight request at a time is the natural discipline.

use anyhow::{anyhow, bail, Context, Result};
use chroma_proto::codec::FrameCodec;
use chroma_proto::commands::Command;
use fluidics::program::STEP_WIRE_LEN;
use fluidics::{DeviceState, ProgramStep};
use futures_util::{SinkExt, StreamExt};
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::UnixStream;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::codec::Framed;
use tracing::debug;

/// How long to wait for a reply frame before declaring the link dead.
const REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// Steps per transfer block, bounded by the frame payload size.
const STEPS_PER_BLOCK: usize = 15;

/// The transport under the framed link.
pub enum DeviceTransport {
    Serial(tokio_serial::SerialStream),
    Unix(UnixStream),
}

impl AsyncRead for DeviceTransport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            DeviceTransport::Serial(s) => Pin::new(s).poll_read(cx, buf),
            DeviceTransport::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for DeviceTransport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            DeviceTransport::Serial(s) => Pin::new(s).poll_write(cx, buf),
            DeviceTransport::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            DeviceTransport::Serial(s) => Pin::new(s).poll_flush(cx),
            DeviceTransport::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            DeviceTransport::Serial(s) => Pin::new(s).poll_shutdown(cx),
            DeviceTransport::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// A connected controller.
pub struct DeviceClient {
    framed: Framed<DeviceTransport, FrameCodec>,
}

impl DeviceClient {
    /// Connects over a serial port, or over a Unix socket when the port is
    /// given as `unix:<path>`.
    pub async fn connect(port: &str, baud: u32) -> Result<Self> {
        let transport = if let Some(path) = port.strip_prefix("unix:") {
            let stream = UnixStream::connect(path)
                .await
                .with_context(|| format!("connecting to emulator socket {}", path))?;
            DeviceTransport::Unix(stream)
        } else {
            let stream = tokio_serial::new(port, baud)
                .open_native_async()
                .with_context(|| format!("opening serial port {}", port))?;
            DeviceTransport::Serial(stream)
        };
        Ok(Self {
            framed: Framed::new(transport, FrameCodec::new()),
        })
    }

    /// Sends one command and awaits its reply payload.
    async fn request(&mut self, cmd: Command<'_>) -> Result<Vec<u8>> {
        let mut payload = [0u8; 255];
        let n = cmd
            .write_payload(&mut payload)
            .map_err(|e| anyhow!("could not encode command: {:?}", e))?;
        debug!(id = cmd.id(), len = n, "sending command");
        self.framed.send(payload[..n].to_vec()).await?;

        let reply = tokio::time::timeout(REPLY_TIMEOUT, self.framed.next())
            .await
            .context("controller did not respond")?
            .context("controller connection closed")??;
        Ok(reply)
    }

    /// Sends a command that must be acknowledged with code 0.
    async fn expect_ack(&mut self, cmd: Command<'_>) -> Result<()> {
        let id = cmd.id();
        let reply = self.request(cmd).await?;
        match reply.as_slice() {
            [0] => Ok(()),
            [code] => bail!("command {} refused by controller (ack {})", id, code),
            other => bail!("unexpected reply to command {}: {:?}", id, other),
        }
    }

    pub async fn ping(&mut self) -> Result<()> {
        self.expect_ack(Command::Ping).await
    }

    pub async fn set_pump(&mut self, flow_ml_min: f32, accel_ml_min_s: f32) -> Result<()> {
        self.expect_ack(Command::SetPump {
            flow_ml_min,
            accel_ml_min_s,
        })
        .await
    }

    pub async fn set_valves(&mut self, reagent_port: u8, column_port: u8) -> Result<()> {
        self.expect_ack(Command::SetValves {
            reagent_port,
            column_port,
        })
        .await
    }

    pub async fn device_state(&mut self) -> Result<DeviceState> {
        let reply = self.request(Command::GetDeviceState).await?;
        DeviceState::from_wire(&reply).map_err(|e| anyhow!("bad device state reply: {:?}", e))
    }

    /// Clears the stored program and transfers the steps in frame-sized
    /// blocks. The device persists once it is idle.
    pub async fn upload_program(&mut self, steps: &[ProgramStep]) -> Result<()> {
        self.expect_ack(Command::InitProgramWrite).await?;
        for chunk in steps.chunks(STEPS_PER_BLOCK) {
            let mut block = Vec::with_capacity(chunk.len() * STEP_WIRE_LEN);
            for step in chunk {
                block.extend_from_slice(&step.to_wire());
            }
            self.expect_ack(Command::WriteProgramBlock { data: &block })
                .await?;
        }
        Ok(())
    }

    pub async fn execute_program(&mut self) -> Result<()> {
        self.expect_ack(Command::ExecuteProgram).await
    }

    pub async fn abort_program(&mut self) -> Result<()> {
        self.expect_ack(Command::AbortProgram).await
    }

    /// Reads the whole stored program back, block by block.
    pub async fn program(&mut self) -> Result<Vec<ProgramStep>> {
        let reply = self.request(Command::GetProgramLength).await?;
        if reply.len() < 4 {
            bail!("short program length reply");
        }
        let len = u16::from_be_bytes([reply[0], reply[1]]);

        let mut steps = Vec::with_capacity(len as usize);
        let mut start = 0u16;
        while start < len {
            let count = (len - start).min(STEPS_PER_BLOCK as u16);
            let data = self
                .request(Command::ReadProgramBlock { start, count })
                .await?;
            if data.len() != count as usize * STEP_WIRE_LEN {
                bail!("program block reply has {} bytes", data.len());
            }
            for chunk in data.chunks_exact(STEP_WIRE_LEN) {
                let bytes: &[u8; STEP_WIRE_LEN] =
                    chunk.try_into().context("short step in block")?;
                steps.push(ProgramStep::from_wire(bytes));
            }
            start += count;
        }
        Ok(steps)
    }
}
