//! Streaming acquisition.
//!
//! A [`Stream`] is configured once, then started and stopped. While running,
//! a spawned task reads fixed-size packets from the stream pipe and pushes
//! one [`StreamResponse`] per packet onto a bounded queue. Bad packets turn
//! into error entries; they never end the stream.

mod config;
mod packet;

pub use self::config::{ChannelConfig, ClockSpeed, ScanClock, ScanConfigByte, StreamConfig};
pub use self::packet::{ChannelData, PacketDecoder, StreamResponse};

use crate::calibration::CalibrationInfo;
use crate::checksum::verify_normal;
use crate::constants::{
    ERROR_STREAM_NOT_RUNNING, EXTENDED_COMMAND, STREAM_CONFIG_RESPONSE_SIZE, STREAM_CONFIG_TAG,
    STREAM_HANDSHAKE_RESPONSE_SIZE, STREAM_QUEUE_CAPACITY, STREAM_START_COMMAND, STREAM_START_RESPONSE,
    STREAM_STOP_COMMAND, STREAM_STOP_RESPONSE,
};
use crate::device::Control;
use crate::error::{Result, U6Error};
use crate::response::validate_response;
use crate::transport::{Pipe, Transport};
use std::sync::Arc;
use strum_macros::Display;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

const STREAM_CONFIG_RESPONSE_HEADER: [u8; 3] = [EXTENDED_COMMAND, 0x01, STREAM_CONFIG_TAG];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum StreamState {
    Idle,
    Configuring,
    Running,
    Stopping,
    Failed,
}

struct DecodeTask {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<Result<()>>,
}

/// Continuous acquisition on one device.
pub struct Stream<T: Transport> {
    control: Arc<Control<T>>,
    calibration: Arc<CalibrationInfo>,
    config: Arc<StreamConfig>,
    state: StreamState,
    task: Option<DecodeTask>,
}

impl<T: Transport> Stream<T> {
    pub(crate) fn new(
        control: Arc<Control<T>>,
        calibration: Arc<CalibrationInfo>,
        config: StreamConfig,
    ) -> Result<Self> {
        Ok(Self {
            control,
            calibration,
            config: Arc::new(config.normalize()?),
            state: StreamState::Idle,
            task: None,
        })
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Sends the stream configuration to the device.
    pub async fn configure(&mut self) -> Result<()> {
        if self.state != StreamState::Idle {
            return Err(U6Error::InvalidStreamState(self.state));
        }
        self.state = StreamState::Configuring;
        let result = self.send_config().await;
        self.state = if result.is_ok() {
            StreamState::Idle
        } else {
            StreamState::Failed
        };
        result
    }

    async fn send_config(&self) -> Result<()> {
        let request = self.config.encode()?;
        let response = self
            .control
            .transact(&request, STREAM_CONFIG_RESPONSE_SIZE)
            .await?;
        validate_response(&response, STREAM_CONFIG_RESPONSE_SIZE, STREAM_CONFIG_RESPONSE_HEADER)?;
        debug!(
            channels = self.config.num_channels(),
            samples_per_packet = self.config.samples_per_packet,
            scan_interval = self.config.clock.scan_interval,
            "Stream configured"
        );
        Ok(())
    }

    /// Starts streaming and returns the queue packets arrive on.
    ///
    /// Dropping the receiver ends the stream the same way [`stop`](Self::stop)
    /// does, minus the result.
    pub async fn start(&mut self) -> Result<mpsc::Receiver<StreamResponse>> {
        if self.state != StreamState::Idle {
            return Err(U6Error::InvalidStreamState(self.state));
        }
        match self.spawn_decoder().await {
            Ok(data_rx) => {
                self.state = StreamState::Running;
                info!("Stream started");
                Ok(data_rx)
            }
            Err(e) => {
                self.state = StreamState::Failed;
                Err(e)
            }
        }
    }

    async fn spawn_decoder(&mut self) -> Result<mpsc::Receiver<StreamResponse>> {
        // A stream left running by an earlier session would reject the start.
        stop_handshake(&self.control).await?;
        start_handshake(&self.control).await?;
        if let Err(e) = self.control.transport().open_stream(self.config.packet_size()).await {
            if let Err(stop_err) = stop_handshake(&self.control).await {
                error!("Stream stop handshake failed: {stop_err}");
            }
            return Err(e.into());
        }

        let (data_tx, data_rx) = mpsc::channel(STREAM_QUEUE_CAPACITY);
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let decoder = PacketDecoder::new(Arc::clone(&self.config), Arc::clone(&self.calibration));
        let handle = tokio::spawn(decode_loop(Arc::clone(&self.control), decoder, data_tx, stop_rx));
        self.task = Some(DecodeTask { stop_tx, handle });
        Ok(data_rx)
    }

    /// Stops the stream and waits for the decode task to finish its stop
    /// handshake.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            return Err(U6Error::InvalidStreamState(self.state));
        };
        self.state = StreamState::Stopping;
        // Fails only if the task already exited on its own.
        let _ = task.stop_tx.try_send(());

        let result = match task.handle.await {
            Ok(result) => result,
            Err(e) => Err(U6Error::StreamTask(e)),
        };
        self.state = match result {
            Ok(()) => StreamState::Idle,
            Err(_) => StreamState::Failed,
        };
        info!(state = %self.state, "Stream stopped");
        result
    }
}

impl<T: Transport> Drop for Stream<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.stop_tx.try_send(());
        }
    }
}

async fn decode_loop<T: Transport>(
    control: Arc<Control<T>>,
    mut decoder: PacketDecoder,
    data_tx: mpsc::Sender<StreamResponse>,
    mut stop_rx: mpsc::Receiver<()>,
) -> Result<()> {
    let mut buf = vec![0u8; decoder.packet_size()];
    loop {
        match stop_rx.try_recv() {
            Err(TryRecvError::Empty) => {}
            Ok(()) | Err(TryRecvError::Disconnected) => break,
        }

        let response = match control.transport().read(Pipe::StreamIn, &mut buf).await {
            Ok(n) => decoder.decode(&buf[..n]),
            Err(e) => decoder.error(e.into()),
        };

        // A packet already read is delivered even if a stop came in meanwhile;
        // only a full queue races the stop signal.
        match data_tx.try_send(response) {
            Ok(()) => {}
            Err(TrySendError::Closed(_)) => {
                debug!("Stream receiver dropped");
                break;
            }
            Err(TrySendError::Full(response)) => {
                tokio::select! {
                    biased;
                    _ = stop_rx.recv() => break,
                    sent = data_tx.send(response) => {
                        if sent.is_err() {
                            debug!("Stream receiver dropped");
                            break;
                        }
                    }
                }
            }
        }
    }

    let stopped = stop_handshake(&control).await;
    if let Err(e) = &stopped {
        error!("Stream stop handshake failed: {e}");
    }
    control.transport().close_stream().await?;
    stopped
}

async fn start_handshake<T: Transport>(control: &Control<T>) -> Result<()> {
    let response = control
        .transact(&STREAM_START_COMMAND, STREAM_HANDSHAKE_RESPONSE_SIZE)
        .await?;
    match check_handshake(&response, STREAM_START_RESPONSE)? {
        0 => Ok(()),
        code => Err(U6Error::DeviceErrorCode { code, frame: None }),
    }
}

async fn stop_handshake<T: Transport>(control: &Control<T>) -> Result<()> {
    let response = control
        .transact(&STREAM_STOP_COMMAND, STREAM_HANDSHAKE_RESPONSE_SIZE)
        .await?;
    match check_handshake(&response, STREAM_STOP_RESPONSE)? {
        0 => Ok(()),
        ERROR_STREAM_NOT_RUNNING => {
            debug!("Stream was not running");
            Ok(())
        }
        code => Err(U6Error::DeviceErrorCode { code, frame: None }),
    }
}

/// Validates a start/stop handshake response, returning its error code.
fn check_handshake(response: &[u8], command: u8) -> Result<u8> {
    if response.len() < STREAM_HANDSHAKE_RESPONSE_SIZE {
        return Err(U6Error::ResponseTooShort {
            expected: STREAM_HANDSHAKE_RESPONSE_SIZE,
            actual: response.len(),
        });
    }
    let response = &response[..STREAM_HANDSHAKE_RESPONSE_SIZE];
    verify_normal(response)?;
    for (offset, expected) in [(1, command), (3, 0)] {
        if response[offset] != expected {
            return Err(U6Error::InvalidResponseHeader {
                offset,
                expected,
                actual: response[offset],
            });
        }
    }
    Ok(response[2])
}
