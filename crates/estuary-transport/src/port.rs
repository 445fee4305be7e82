//! Serial port abstraction
//!
//! The bridge works against split reader/writer halves so the reader loop
//! and transmit path run independently. The real UART implementation sits
//! behind the `serial` feature; the mock implementation is always
//! available for host tests.

use async_trait::async_trait;

use estuary_core::Result;

/// Read half of a serial port
#[async_trait]
pub trait SerialReader: Send {
    /// Read whatever bytes are available into `buf`
    ///
    /// Returns the number of bytes read; `Ok(0)` means nothing arrived
    /// within the driver's own window, not end of stream.
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// Write half of a serial port
#[async_trait]
pub trait SerialWriter: Send {
    /// Write the whole buffer, returning the number of bytes accepted
    ///
    /// An accepted count below `data.len()` is reported as-is; the caller
    /// decides whether that is a failure.
    async fn write_all_bytes(&mut self, data: &[u8]) -> Result<usize>;
}

/// An unopened or whole serial port that can be split into halves
pub trait SerialPort: Send {
    /// Split into independent read and write halves
    fn split(self: Box<Self>) -> (Box<dyn SerialReader>, Box<dyn SerialWriter>);
}

#[cfg(feature = "serial")]
pub use uart::UartPort;

#[cfg(feature = "serial")]
mod uart {
    use super::*;
    use estuary_core::EstuaryError;
    use std::io::ErrorKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
    use tokio_serial::{SerialPortBuilderExt, SerialStream};

    /// A UART device
    pub struct UartPort {
        stream: SerialStream,
    }

    impl UartPort {
        /// Open the device at `path` with the given line rate
        pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
            let stream = tokio_serial::new(path, baud_rate)
                .open_native_async()
                .map_err(|e| EstuaryError::PortOpen {
                    port: path.to_string(),
                    reason: e.to_string(),
                })?;
            Ok(Self { stream })
        }
    }

    impl SerialPort for UartPort {
        fn split(self: Box<Self>) -> (Box<dyn SerialReader>, Box<dyn SerialWriter>) {
            let (reader, writer) = tokio::io::split(self.stream);
            (
                Box::new(UartReader { inner: reader }),
                Box::new(UartWriter { inner: writer }),
            )
        }
    }

    struct UartReader {
        inner: ReadHalf<SerialStream>,
    }

    #[async_trait]
    impl SerialReader for UartReader {
        async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
            match self.inner.read(buf).await {
                Ok(n) => Ok(n),
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(0),
                Err(e) => Err(EstuaryError::ReadFailed(e.to_string())),
            }
        }
    }

    struct UartWriter {
        inner: WriteHalf<SerialStream>,
    }

    #[async_trait]
    impl SerialWriter for UartWriter {
        async fn write_all_bytes(&mut self, data: &[u8]) -> Result<usize> {
            self.inner
                .write_all(data)
                .await
                .map_err(|e| EstuaryError::WriteFailed(e.to_string()))?;
            self.inner
                .flush()
                .await
                .map_err(|e| EstuaryError::WriteFailed(e.to_string()))?;
            Ok(data.len())
        }
    }
}

pub mod mock {
    //! Scripted port for host tests

    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// In-memory port with scripted inbound chunks
    ///
    /// Reads pop scripted chunks; once the script is exhausted the reader
    /// pends forever, like an idle line. Writes append into a shared buffer
    /// observable through [`MockPortHandle`], yielding mid-write so that
    /// unserialized concurrent writers would visibly interleave.
    pub struct MockPort {
        incoming: VecDeque<Vec<u8>>,
        written: Arc<Mutex<Vec<u8>>>,
        accept_limit: Option<usize>,
    }

    /// Test-side view of everything written to a [`MockPort`]
    #[derive(Clone)]
    pub struct MockPortHandle {
        written: Arc<Mutex<Vec<u8>>>,
    }

    impl MockPort {
        /// Create a port with no scripted input
        pub fn new() -> (Self, MockPortHandle) {
            Self::with_incoming(Vec::new())
        }

        /// Create a port that will deliver the given chunks in order
        pub fn with_incoming(chunks: Vec<Vec<u8>>) -> (Self, MockPortHandle) {
            let written = Arc::new(Mutex::new(Vec::new()));
            let handle = MockPortHandle {
                written: written.clone(),
            };
            (
                Self {
                    incoming: chunks.into(),
                    written,
                    accept_limit: None,
                },
                handle,
            )
        }

        /// Cap how many bytes a single write accepts
        pub fn with_accept_limit(mut self, limit: usize) -> Self {
            self.accept_limit = Some(limit);
            self
        }
    }

    impl MockPortHandle {
        /// Everything written so far
        pub fn written(&self) -> Vec<u8> {
            self.written.lock().clone()
        }
    }

    impl SerialPort for MockPort {
        fn split(self: Box<Self>) -> (Box<dyn SerialReader>, Box<dyn SerialWriter>) {
            (
                Box::new(MockReader {
                    incoming: self.incoming,
                }),
                Box::new(MockWriter {
                    written: self.written,
                    accept_limit: self.accept_limit,
                }),
            )
        }
    }

    struct MockReader {
        incoming: VecDeque<Vec<u8>>,
    }

    #[async_trait]
    impl SerialReader for MockReader {
        async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
            match self.incoming.pop_front() {
                Some(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
                None => std::future::pending().await,
            }
        }
    }

    struct MockWriter {
        written: Arc<Mutex<Vec<u8>>>,
        accept_limit: Option<usize>,
    }

    #[async_trait]
    impl SerialWriter for MockWriter {
        async fn write_all_bytes(&mut self, data: &[u8]) -> Result<usize> {
            let accepted = match self.accept_limit {
                Some(limit) => data.len().min(limit),
                None => data.len(),
            };
            let mid = accepted / 2;
            self.written.lock().extend_from_slice(&data[..mid]);
            // Yield between halves so overlapping writers would interleave
            tokio::task::yield_now().await;
            self.written.lock().extend_from_slice(&data[mid..accepted]);
            Ok(accepted)
        }
    }
}
