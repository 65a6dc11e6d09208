use crate::calibration::{CalibrationBuilder, CalibrationInfo};
use crate::checksum::set_checksum;
use crate::command::{FeedbackCommand, FeedbackIo};
use crate::constants::{
    CALIBRATION_BLOCKS, CONFIG_U6_RESPONSE_SIZE, EXTENDED_COMMAND, READ_MEM_COMMAND_SIZE, READ_MEM_RESPONSE_SIZE,
    READ_MEM_TAG,
};
use crate::device_info::{DeviceDesc, config_read_command};
use crate::error::{Result, U6Error};
use crate::feedback;
use crate::response::validate_response;
use crate::stream::{Stream, StreamConfig};
use crate::transport::{Pipe, Transport};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// ReadMem response header: 17 words follow the checksum.
const READ_MEM_RESPONSE_HEADER: [u8; 3] = [EXTENDED_COMMAND, 0x11, READ_MEM_TAG];

/// Offset of the block data in a ReadMem response.
const READ_MEM_DATA_OFFSET: usize = 8;

/// Serialized access to the command pipes.
///
/// Every exchange on the control pipes goes through [`transact`](Self::transact),
/// which holds the lock from the write until the response is read. The
/// stream pipe is read directly through [`transport`](Self::transport).
pub(crate) struct Control<T> {
    transport: T,
    lock: Mutex<()>,
}

impl<T: Transport> Control<T> {
    pub(crate) fn new(transport: T) -> Self {
        Self {
            transport,
            lock: Mutex::new(()),
        }
    }

    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends `request` and reads a response of at most `response_len` bytes.
    pub(crate) async fn transact(&self, request: &[u8], response_len: usize) -> Result<Vec<u8>> {
        let _guard = self.lock.lock().await;
        self.send(request).await?;
        self.receive(response_len).await
    }

    async fn send(&self, data: &[u8]) -> Result<()> {
        debug!(bytes = hex::encode(data), "USB Write");
        let written = self.transport.write(Pipe::ControlOut, data).await?;
        if written < data.len() {
            return Err(U6Error::SendIncomplete {
                expected: data.len(),
                actual: written,
            });
        }
        Ok(())
    }

    async fn receive(&self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let n = self.transport.read(Pipe::ControlIn, &mut buf).await?;
        buf.truncate(n);
        debug!(bytes = hex::encode(&buf), "USB Read");
        Ok(buf)
    }
}

/// A session with one U6.
pub struct U6<T: Transport> {
    control: Arc<Control<T>>,
    desc: DeviceDesc,
    calibration: Arc<CalibrationInfo>,
    echo: u8,
}

impl<T: Transport> U6<T> {
    /// Reads the device configuration and calibration over `transport`.
    pub async fn open(transport: T) -> Result<Self> {
        let control = Arc::new(Control::new(transport));
        let desc = Self::read_config(&control).await?;
        info!(device = %desc, "U6 connected");

        let mut u6 = Self {
            control,
            desc,
            calibration: Arc::new(CalibrationInfo::default()),
            echo: 0,
        };
        u6.read_calibration().await?;
        Ok(u6)
    }

    async fn read_config(control: &Control<T>) -> Result<DeviceDesc> {
        let command = config_read_command()?;
        let response = control.transact(&command, CONFIG_U6_RESPONSE_SIZE).await?;
        DeviceDesc::from_config_response(&response)
    }

    /// Re-reads the device configuration.
    pub async fn init(&mut self) -> Result<&DeviceDesc> {
        self.desc = Self::read_config(&self.control).await?;
        Ok(&self.desc)
    }

    /// Reads the ten calibration memory blocks and replaces the session's
    /// calibration with them.
    pub async fn read_calibration(&mut self) -> Result<Arc<CalibrationInfo>> {
        let mut builder = CalibrationBuilder::new(self.desc.high_resolution());
        for block in 0..CALIBRATION_BLOCKS {
            let mut command = [0u8; READ_MEM_COMMAND_SIZE];
            command[1] = EXTENDED_COMMAND;
            command[2] = 0x01;
            command[3] = READ_MEM_TAG;
            command[7] = block as u8;
            set_checksum(&mut command)?;

            let response = self.control.transact(&command, READ_MEM_RESPONSE_SIZE).await?;
            validate_response(&response, READ_MEM_RESPONSE_SIZE, READ_MEM_RESPONSE_HEADER)?;
            let mut data = [0u8; 32];
            data.copy_from_slice(&response[READ_MEM_DATA_OFFSET..READ_MEM_RESPONSE_SIZE]);
            builder.set_block(block, &data);
        }
        self.calibration = builder.build();
        info!(
            high_resolution = self.calibration.high_resolution(),
            "Calibration read"
        );
        Ok(Arc::clone(&self.calibration))
    }

    pub fn device_desc(&self) -> &DeviceDesc {
        &self.desc
    }

    pub fn calibration(&self) -> Arc<CalibrationInfo> {
        Arc::clone(&self.calibration)
    }

    fn next_echo(&mut self) -> u8 {
        self.echo = self.echo.wrapping_add(1);
        self.echo
    }

    /// Sends `commands` as one request and decodes each command's response
    /// in place.
    pub async fn feedback(&mut self, commands: &mut [FeedbackCommand]) -> Result<()> {
        for command in commands.iter_mut() {
            command.attach_calibration(&self.calibration);
        }
        let echo = self.next_echo();
        let request = feedback::encode_request(commands, echo)?;
        let response = self
            .control
            .transact(&request, feedback::response_len(commands))
            .await?;
        feedback::decode_response(commands, &response, echo)
    }

    /// Validates `config` and sends it to the device, returning an idle
    /// stream ready to start.
    pub async fn new_stream(&self, config: StreamConfig) -> Result<Stream<T>> {
        let mut stream = Stream::new(Arc::clone(&self.control), Arc::clone(&self.calibration), config)?;
        stream.configure().await?;
        Ok(stream)
    }
}
