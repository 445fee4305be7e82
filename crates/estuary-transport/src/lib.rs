//! Serial transport bridging
//!
//! The third of the gateway's three lifecycles: a serial port split into a
//! reader loop delivering raw chunks to a
//! [`FrameObserver`](estuary_core::FrameObserver) and a transmit path that
//! serializes concurrent frames and refuses partial writes. No framing is
//! applied; chunk boundaries follow the port's own read timing.
//!
//! The real UART backend requires the `serial` feature (on by default);
//! [`port::mock::MockPort`] serves host tests.

pub mod bridge;
pub mod config;
pub mod port;

pub use bridge::TransportBridge;
pub use config::{TransportConfig, DEFAULT_BAUD_RATE, DEFAULT_READ_BUFFER_SIZE};
pub use port::{SerialPort, SerialReader, SerialWriter};

#[cfg(feature = "serial")]
pub use port::UartPort;
