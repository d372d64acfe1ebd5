//! Serial driver for low-level hardware communication
//!
//! The link is split into two independently owned halves: a [`CommandSink`]
//! that only writes duty commands and a [`StatusSource`] that only reads
//! status lines. The bridge hands each half to a different worker.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
    WriteHalf,
};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, info, warn};
use vfan_core::{Result, SerialConfig, VfanError};

/// Write half of the link
///
/// This trait enables testing the bridge without real hardware by allowing
/// mock implementations.
#[async_trait]
pub trait CommandSink: Send {
    /// Write one complete line (terminator included) and flush it
    async fn send_line(&mut self, line: &str) -> Result<()>;
}

/// Read half of the link
#[async_trait]
pub trait StatusSource: Send {
    /// Read the next line, without its terminator
    ///
    /// End of stream is reported as [`VfanError::DeviceDisconnected`].
    async fn read_line(&mut self) -> Result<String>;
}

/// Line writer over any async byte sink
pub struct LineWriter<W> {
    inner: W,
    debug_uart: bool,
}

impl<W: AsyncWrite + Unpin + Send> LineWriter<W> {
    pub fn new(inner: W, debug_uart: bool) -> Self {
        Self { inner, debug_uart }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> CommandSink for LineWriter<W> {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        if self.debug_uart {
            debug!("TX: {:?}", line);
        }

        self.inner.write_all(line.as_bytes()).await.map_err(|e| {
            error!("Write failed: {}", e);
            VfanError::Serial(format!("Write failed: {}", e))
        })?;

        self.inner
            .flush()
            .await
            .map_err(|e| VfanError::Serial(format!("Flush failed: {}", e)))
    }
}

/// Longest line accepted from the device; status lines are far shorter
pub const MAX_LINE_LEN: usize = 4096;

/// Line reader over any async byte source
///
/// Bytes past [`MAX_LINE_LEN`] without a newline are dropped up to the next
/// newline, so a babbling device cannot grow the buffer without bound.
pub struct LineReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
    /// Inside an overlong line, skipping to its end
    discarding: bool,
    debug_uart: bool,
}

impl<R: AsyncRead + Unpin + Send> LineReader<R> {
    pub fn new(inner: R, debug_uart: bool) -> Self {
        Self {
            inner: BufReader::new(inner),
            buf: Vec::with_capacity(256),
            discarding: false,
            debug_uart,
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> StatusSource for LineReader<R> {
    async fn read_line(&mut self) -> Result<String> {
        loop {
            self.buf.clear();
            let read = (&mut self.inner)
                .take(MAX_LINE_LEN as u64)
                .read_until(b'\n', &mut self.buf)
                .await;

            if let Ok(n) = read {
                let complete = self.buf.last() == Some(&b'\n');
                if n > 0 && !complete && self.buf.len() >= MAX_LINE_LEN {
                    if !self.discarding {
                        warn!("Dropping line longer than {} bytes", MAX_LINE_LEN);
                        self.discarding = true;
                    }
                    continue;
                }
                if n > 0 && self.discarding {
                    // Tail of the overlong line
                    self.discarding = false;
                    continue;
                }
            }

            return self.finish_line(read);
        }
    }
}

impl<R: AsyncRead + Unpin + Send> LineReader<R> {
    fn finish_line(&self, read: std::io::Result<usize>) -> Result<String> {
        match read {
            Ok(0) => {
                // EOF indicates device disconnection (USB unplugged, power loss, etc.)
                warn!("Serial port returned EOF - device may have been disconnected");
                Err(VfanError::DeviceDisconnected(
                    "Serial port returned EOF - device may have been unplugged".to_string(),
                ))
            }
            Ok(_) => {
                // Line noise is not worth a read failure; let the decoder reject it.
                let line = String::from_utf8_lossy(&self.buf);
                let line = line.trim_end_matches(['\r', '\n']).to_string();
                if self.debug_uart {
                    debug!("RX: {:?}", line);
                }
                Ok(line)
            }
            Err(e) => {
                error!("Read error: {}", e);
                Err(VfanError::Serial(format!("Read error: {}", e)))
            }
        }
    }
}

/// An open connection to the device, split by direction
pub struct SerialLink {
    port_path: String,
    pub sink: Box<dyn CommandSink>,
    pub source: Box<dyn StatusSource>,
}

impl SerialLink {
    /// Assemble a link from already split halves
    pub fn new(
        port_path: impl Into<String>,
        sink: Box<dyn CommandSink>,
        source: Box<dyn StatusSource>,
    ) -> Self {
        Self {
            port_path: port_path.into(),
            sink,
            source,
        }
    }

    /// Split a bidirectional stream into a line sink and a line source
    pub fn from_stream<S>(port_path: impl Into<String>, stream: S, debug_uart: bool) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half): (ReadHalf<S>, WriteHalf<S>) = tokio::io::split(stream);
        Self::new(
            port_path,
            Box::new(LineWriter::new(write_half, debug_uart)),
            Box::new(LineReader::new(read_half, debug_uart)),
        )
    }

    /// Path the link was opened from
    pub fn port_path(&self) -> &str {
        &self.port_path
    }

    /// Close the device by dropping both halves
    pub fn close(self) {
        info!("Closing serial port {}", self.port_path);
        drop(self.sink);
        drop(self.source);
    }
}

/// Serial driver for hardware communication
pub struct SerialDriver {
    port: SerialStream,
    port_path: String,
    debug_uart: bool,
}

impl SerialDriver {
    /// Open the serial device at 8N1 with the configured baud rate
    ///
    /// # Arguments
    /// * `port_path` - Path to the serial device (e.g., "/dev/ttyACM0")
    /// * `config` - Baud rate and timeout
    /// * `debug_uart` - Log every line sent and received
    pub fn new(port_path: &str, config: &SerialConfig, debug_uart: bool) -> Result<Self> {
        debug!("Opening serial port: {}", port_path);

        let port = tokio_serial::new(port_path, config.baud_rate)
            .timeout(Duration::from_millis(config.timeout_ms))
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                error!("Failed to open serial port {}: {}", port_path, e);
                VfanError::Serial(format!("Failed to open serial port: {}", e))
            })?;

        // Drop whatever the firmware printed before we attached
        if let Err(e) = port.clear(tokio_serial::ClearBuffer::Input) {
            warn!("Failed to clear input buffer: {}", e);
        }

        debug!("Serial port opened successfully");

        Ok(Self {
            port,
            port_path: port_path.to_string(),
            debug_uart,
        })
    }

    /// Hand the port over as a split link
    pub fn into_link(self) -> SerialLink {
        SerialLink::from_stream(self.port_path, self.port, self.debug_uart)
    }
}

/// Determine if an error indicates device disconnection
///
/// Returns `true` if the error suggests the device has been disconnected
/// (USB unplugged, power loss, etc.) rather than a transient error.
pub fn is_disconnect_error(err: &VfanError) -> bool {
    match err {
        VfanError::DeviceDisconnected(_) => true,
        VfanError::Serial(msg) | VfanError::Hardware(msg) => {
            let msg_lower = msg.to_lowercase();
            msg_lower.contains("broken pipe")
                || msg_lower.contains("no such device")
                || msg_lower.contains("device disconnected")
                || msg_lower.contains("device not configured")
                || msg_lower.contains("input/output error")
        }
        _ => false,
    }
}
