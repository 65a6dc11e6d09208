use super::{Pipe, Transport, TransportError};
use crate::constants::{ENDPOINT_IN, ENDPOINT_OUT, ENDPOINT_STREAM_IN};
use nusb::Interface;
use nusb::transfer::{Completion, Queue, RequestBuffer};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

// Default timeout for USB operations
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

// Stream transfers kept in flight while streaming
const DEFAULT_STREAM_TRANSFERS: usize = 20;

/// Settings for [`NusbTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Deadline applied to every transfer; `None` waits forever.
    pub timeout: Option<Duration>,
    /// Number of stream IN transfers queued ahead of the reader.
    pub stream_transfers: usize,
    pub endpoint_out: u8,
    pub endpoint_in: u8,
    pub endpoint_stream_in: u8,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            stream_transfers: DEFAULT_STREAM_TRANSFERS,
            endpoint_out: ENDPOINT_OUT,
            endpoint_in: ENDPOINT_IN,
            endpoint_stream_in: ENDPOINT_STREAM_IN,
        }
    }
}

impl TransportConfig {
    /// Same as the default but with no transfer deadline.
    pub fn without_timeout() -> Self {
        Self {
            timeout: None,
            ..Self::default()
        }
    }
}

struct StreamQueue {
    queue: Queue<RequestBuffer>,
    transfer_size: usize,
}

/// [`Transport`] over a claimed nusb interface.
///
/// Finding and claiming the interface is left to the caller.
pub struct NusbTransport {
    interface: Interface,
    config: TransportConfig,
    stream: Mutex<Option<StreamQueue>>,
}

impl NusbTransport {
    pub fn new(interface: Interface) -> Self {
        Self::with_config(interface, TransportConfig::default())
    }

    pub fn with_config(interface: Interface, config: TransportConfig) -> Self {
        Self {
            interface,
            config,
            stream: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    async fn with_deadline<F: Future>(&self, future: F) -> Result<F::Output, TransportError> {
        match self.config.timeout {
            Some(timeout) => Ok(tokio::time::timeout(timeout, future).await?),
            None => Ok(future.await),
        }
    }

    async fn read_stream(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(TransportError::StreamNotOpen)?;

        while stream.queue.pending() < self.config.stream_transfers {
            stream.queue.submit(RequestBuffer::new(stream.transfer_size));
        }

        let Completion { data, status } = self.with_deadline(stream.queue.next_complete()).await?;
        let copied = status.map(|()| copy_into(buf, &data));
        stream
            .queue
            .submit(RequestBuffer::reuse(data, stream.transfer_size));
        Ok(copied?)
    }
}

fn copy_into(buf: &mut [u8], data: &[u8]) -> usize {
    let n = data.len().min(buf.len());
    buf[..n].copy_from_slice(&data[..n]);
    n
}

impl Transport for NusbTransport {
    async fn write(&self, pipe: Pipe, data: &[u8]) -> Result<usize, TransportError> {
        if pipe != Pipe::ControlOut {
            return Err(TransportError::WrongDirection {
                pipe,
                operation: "write",
            });
        }
        let transfer = self.interface.bulk_out(self.config.endpoint_out, data.to_vec());
        let completion = self.with_deadline(transfer).await?;
        Ok(completion.into_result()?.actual_length())
    }

    async fn read(&self, pipe: Pipe, buf: &mut [u8]) -> Result<usize, TransportError> {
        match pipe {
            Pipe::ControlOut => Err(TransportError::WrongDirection {
                pipe,
                operation: "read",
            }),
            Pipe::ControlIn => {
                let transfer = self
                    .interface
                    .bulk_in(self.config.endpoint_in, RequestBuffer::new(buf.len()));
                let completion = self.with_deadline(transfer).await?;
                let data = completion.into_result()?;
                Ok(copy_into(buf, &data))
            }
            Pipe::StreamIn => self.read_stream(buf).await,
        }
    }

    async fn open_stream(&self, packet_size: usize) -> Result<(), TransportError> {
        let mut guard = self.stream.lock().await;
        if guard.is_some() {
            debug!("Stream pipe already open");
            return Ok(());
        }
        let mut queue = self.interface.bulk_in_queue(self.config.endpoint_stream_in);
        for _ in 0..self.config.stream_transfers {
            queue.submit(RequestBuffer::new(packet_size));
        }
        *guard = Some(StreamQueue {
            queue,
            transfer_size: packet_size,
        });
        info!(
            endpoint = self.config.endpoint_stream_in,
            packet_size, "Stream pipe opened"
        );
        Ok(())
    }

    async fn close_stream(&self) -> Result<(), TransportError> {
        let Some(mut stream) = self.stream.lock().await.take() else {
            return Ok(());
        };
        stream.queue.cancel_all();
        while stream.queue.pending() > 0 {
            // cancelled transfers still complete; their status is irrelevant here
            let _ = stream.queue.next_complete().await;
        }
        info!("Stream pipe closed");
        Ok(())
    }
}
