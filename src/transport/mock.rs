use super::{Pipe, Transport, TransportError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

// Pause before reporting an empty stream pipe, so a reader spinning on
// errors does not starve the runtime.
const EMPTY_STREAM_DELAY: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
struct MockState {
    written: Vec<Vec<u8>>,
    control_responses: VecDeque<Vec<u8>>,
    stream_packets: VecDeque<Vec<u8>>,
    stream_open: bool,
    stream_packet_size: Option<usize>,
    write_limit: Option<usize>,
    stream_read_delay: Option<Duration>,
    fail_open_stream: bool,
}

/// Scripted in-memory [`Transport`].
///
/// Responses queued with [`push_response`](Self::push_response) are handed
/// out one per control read, in order; stream packets likewise. Every
/// write is recorded. Clones share the same script, so a test can keep one
/// handle while the session owns another.
#[derive(Debug, Default, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues the next control response.
    pub fn push_response(&self, bytes: impl Into<Vec<u8>>) {
        self.state().control_responses.push_back(bytes.into());
    }

    /// Queues the next stream packet.
    pub fn push_stream_packet(&self, bytes: impl Into<Vec<u8>>) {
        self.state().stream_packets.push_back(bytes.into());
    }

    /// Makes the next write accept at most `limit` bytes.
    pub fn limit_next_write(&self, limit: usize) {
        self.state().write_limit = Some(limit);
    }

    /// Makes every stream read wait `delay` before handing out a packet.
    pub fn delay_stream_reads(&self, delay: Duration) {
        self.state().stream_read_delay = Some(delay);
    }

    /// Makes the next `open_stream` fail.
    pub fn fail_next_open_stream(&self) {
        self.state().fail_open_stream = true;
    }

    /// Every frame written so far.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state().written.clone()
    }

    pub fn pending_responses(&self) -> usize {
        self.state().control_responses.len()
    }

    pub fn is_stream_open(&self) -> bool {
        self.state().stream_open
    }

    /// Packet size the stream pipe was last opened with.
    pub fn stream_packet_size(&self) -> Option<usize> {
        self.state().stream_packet_size
    }
}

impl Transport for MockTransport {
    async fn write(&self, pipe: Pipe, data: &[u8]) -> Result<usize, TransportError> {
        if pipe != Pipe::ControlOut {
            return Err(TransportError::WrongDirection {
                pipe,
                operation: "write",
            });
        }
        let mut state = self.state();
        let accepted = state
            .write_limit
            .take()
            .map_or(data.len(), |limit| limit.min(data.len()));
        state.written.push(data[..accepted].to_vec());
        Ok(accepted)
    }

    async fn read(&self, pipe: Pipe, buf: &mut [u8]) -> Result<usize, TransportError> {
        let next = match pipe {
            Pipe::ControlOut => {
                return Err(TransportError::WrongDirection {
                    pipe,
                    operation: "read",
                });
            }
            Pipe::ControlIn => self.state().control_responses.pop_front(),
            Pipe::StreamIn => {
                let delay = self.state().stream_read_delay;
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                let packet = {
                    let mut state = self.state();
                    if !state.stream_open {
                        return Err(TransportError::StreamNotOpen);
                    }
                    state.stream_packets.pop_front()
                };
                if packet.is_none() {
                    tokio::time::sleep(EMPTY_STREAM_DELAY).await;
                }
                packet
            }
        };

        let data = next.ok_or(TransportError::Closed)?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    async fn open_stream(&self, packet_size: usize) -> Result<(), TransportError> {
        let mut state = self.state();
        if std::mem::take(&mut state.fail_open_stream) {
            return Err(TransportError::Closed);
        }
        state.stream_open = true;
        state.stream_packet_size = Some(packet_size);
        Ok(())
    }

    async fn close_stream(&self) -> Result<(), TransportError> {
        self.state().stream_open = false;
        Ok(())
    }
}
