//! Message and frame payload types
//!
//! Broker messages carry a topic, quality of service and retain flag;
//! serial frames are raw byte chunks. Payloads use [`Bytes`] so clones are
//! cheap reference-count bumps.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EstuaryError, Result};

/// Quality of service for broker messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum QoS {
    /// Fire and forget
    #[default]
    AtMostOnce = 0,
    /// Acknowledged delivery
    AtLeastOnce = 1,
    /// Exactly-once handshake
    ExactlyOnce = 2,
}

impl QoS {
    /// Numeric wire value (0..=2)
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for QoS {
    type Error = EstuaryError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(EstuaryError::InvalidQos { value }),
        }
    }
}

/// Validate a topic for publish/subscribe/unsubscribe
///
/// Topics must be non-empty and free of NUL bytes. Wildcard validity is
/// left to the broker, which rejects them per operation.
pub fn validate_topic(topic: &str) -> Result<()> {
    if topic.is_empty() {
        return Err(EstuaryError::InvalidTopic("topic is empty".to_string()));
    }
    if topic.contains('\0') {
        return Err(EstuaryError::InvalidTopic(
            "topic contains a NUL byte".to_string(),
        ));
    }
    Ok(())
}

/// A message bound for the broker
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    /// Destination topic
    pub topic: String,
    /// Message payload
    pub payload: Bytes,
    /// Quality of service
    pub qos: QoS,
    /// Retain flag
    pub retain: bool,
}

impl OutboundMessage {
    /// Create a message with default QoS and no retain
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::default(),
            retain: false,
        }
    }

    /// Set the quality of service
    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    /// Set the retain flag
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }
}

/// A message received from the broker
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Topic the message arrived on
    pub topic: String,
    /// Message payload
    pub payload: Bytes,
    /// Arrival time
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Create an inbound message stamped with the current time
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }

    /// Borrow the payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// A raw chunk received from the serial transport
///
/// No framing is applied; message-boundary logic belongs to the router.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    /// Raw bytes as read from the port
    pub data: Bytes,
    /// Arrival time
    pub received_at: DateTime<Utc>,
}

impl InboundFrame {
    /// Create a frame stamped with the current time
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            received_at: Utc::now(),
        }
    }

    /// Chunk length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the chunk is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}
