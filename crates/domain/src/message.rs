//! Platform and protocol messages.
//!
//! A [`PlatformMessage`] is exchanged with the platform (apps, services,
//! other drivers): requests that expect a correlated response, responses,
//! and broadcast events. A [`ProtocolMessage`] is raw device traffic relayed
//! by a hub or bridge for a specific radio protocol.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::ValidationError;
use crate::id::{MessageId, PlaceId};
use crate::time::{self, Timestamp};

/// Message type of an error response.
pub const ERROR_MESSAGE_TYPE: &str = "Error";
/// Error code sent to a requester whose request was dropped during shutdown.
pub const REQUEST_CANCELLED: &str = "request.cancelled";
/// Error code sent to a requester whose request was never answered in time.
pub const REQUEST_TIMEOUT: &str = "request.timeout";

/// Typed payload of a platform message: a message type plus attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageBody {
    pub message_type: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl MessageBody {
    /// Body with the given type and no attributes.
    #[must_use]
    pub fn new(message_type: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            attributes: serde_json::Map::new(),
        }
    }

    /// Add an attribute, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Empty acknowledgement.
    #[must_use]
    pub fn empty() -> Self {
        Self::new("EmptyMessage")
    }

    /// Liveness probe.
    #[must_use]
    pub fn ping() -> Self {
        Self::new("base:Ping")
    }

    /// Error response with a machine-readable code.
    #[must_use]
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::new(ERROR_MESSAGE_TYPE)
            .with("code", code)
            .with("message", message)
    }

    /// Error sent when a queued request is discarded because its driver stopped.
    #[must_use]
    pub fn request_cancelled() -> Self {
        Self::error(REQUEST_CANCELLED, "request cancelled")
    }

    /// Error sent when a request received no response before its deadline.
    #[must_use]
    pub fn request_timeout() -> Self {
        Self::error(REQUEST_TIMEOUT, "request timed out")
    }

    /// Whether this body is an error response.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.message_type == ERROR_MESSAGE_TYPE
    }

    /// Error code, when this is an error response.
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        if !self.is_error() {
            return None;
        }
        self.attributes.get("code").and_then(serde_json::Value::as_str)
    }

    /// Look up an attribute by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }
}

/// A message exchanged with the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformMessage {
    pub id: MessageId,
    pub source: Address,
    pub destination: Address,
    pub correlation_id: Option<String>,
    pub place_id: Option<PlaceId>,
    pub timestamp: Timestamp,
    /// How long the requester waits for a response, in milliseconds.
    pub time_to_live_ms: Option<u64>,
    /// Whether the sender expects a correlated response.
    pub request: bool,
    pub payload: MessageBody,
}

impl PlatformMessage {
    /// Create a builder for constructing a [`PlatformMessage`].
    #[must_use]
    pub fn builder() -> PlatformMessageBuilder {
        PlatformMessageBuilder::default()
    }

    /// Build the correlated response to this message, sent from `from`.
    #[must_use]
    pub fn response(&self, from: Address, payload: MessageBody) -> Self {
        Self {
            id: MessageId::new(),
            source: from,
            destination: self.source.clone(),
            correlation_id: self.correlation_id.clone(),
            place_id: self.place_id,
            timestamp: time::now(),
            time_to_live_ms: None,
            request: false,
            payload,
        }
    }

    /// Build an event broadcast from `from` to every listener.
    #[must_use]
    pub fn broadcast(from: Address, place_id: Option<PlaceId>, payload: MessageBody) -> Self {
        Self {
            id: MessageId::new(),
            source: from,
            destination: Address::Broadcast,
            correlation_id: None,
            place_id,
            timestamp: time::now(),
            time_to_live_ms: None,
            request: false,
            payload,
        }
    }

    /// Message type of the payload.
    #[must_use]
    pub fn message_type(&self) -> &str {
        &self.payload.message_type
    }

    /// Point in time after which the requester no longer waits, if bounded.
    #[must_use]
    pub fn deadline(&self) -> Option<Timestamp> {
        self.time_to_live_ms
            .filter(|ttl| *ttl > 0)
            .map(|ttl| time::after(self.timestamp, Duration::from_millis(ttl)))
    }
}

/// Step-by-step builder for [`PlatformMessage`].
#[derive(Debug, Default)]
pub struct PlatformMessageBuilder {
    source: Option<Address>,
    destination: Option<Address>,
    correlation_id: Option<String>,
    place_id: Option<PlaceId>,
    timestamp: Option<Timestamp>,
    time_to_live_ms: Option<u64>,
    request: bool,
    payload: Option<MessageBody>,
}

impl PlatformMessageBuilder {
    #[must_use]
    pub fn from(mut self, source: Address) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn to(mut self, destination: Address) -> Self {
        self.destination = Some(destination);
        self
    }

    #[must_use]
    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    #[must_use]
    pub fn place_id(mut self, place_id: PlaceId) -> Self {
        self.place_id = Some(place_id);
        self
    }

    #[must_use]
    pub fn timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    #[must_use]
    pub fn time_to_live_ms(mut self, ttl: u64) -> Self {
        self.time_to_live_ms = Some(ttl);
        self
    }

    /// Mark the message as a request expecting a correlated response.
    #[must_use]
    pub fn request(mut self) -> Self {
        self.request = true;
        self
    }

    #[must_use]
    pub fn payload(mut self, payload: MessageBody) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Consume the builder, validate, and return a [`PlatformMessage`].
    ///
    /// Requests without an explicit correlation id get the message id.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingField`] when source, destination or
    /// payload is missing, and [`ValidationError::EmptyMessageType`] when the
    /// payload has no type.
    pub fn build(self) -> Result<PlatformMessage, ValidationError> {
        let source = self.source.ok_or(ValidationError::MissingField("source"))?;
        let destination = self
            .destination
            .ok_or(ValidationError::MissingField("destination"))?;
        let payload = self.payload.ok_or(ValidationError::MissingField("payload"))?;
        if payload.message_type.is_empty() {
            return Err(ValidationError::EmptyMessageType);
        }

        let id = MessageId::new();
        let correlation_id = match (self.correlation_id, self.request) {
            (Some(correlation_id), _) => Some(correlation_id),
            (None, true) => Some(id.to_string()),
            (None, false) => None,
        };

        Ok(PlatformMessage {
            id,
            source,
            destination,
            correlation_id,
            place_id: self.place_id,
            timestamp: self.timestamp.unwrap_or_else(time::now),
            time_to_live_ms: self.time_to_live_ms,
            request: self.request,
            payload,
        })
    }
}

/// Raw device traffic for a given radio protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolMessage {
    pub source: Address,
    pub destination: Address,
    /// Protocol namespace, e.g. `ZIGB`, `ZWAV`, `IPCD`.
    pub protocol: String,
    pub payload: Vec<u8>,
    pub timestamp: Timestamp,
}

impl ProtocolMessage {
    /// Create a protocol message stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyProtocol`] when `protocol` is empty.
    pub fn new(
        source: Address,
        destination: Address,
        protocol: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Result<Self, ValidationError> {
        let protocol = protocol.into();
        if protocol.is_empty() {
            return Err(ValidationError::EmptyProtocol);
        }
        Ok(Self {
            source,
            destination,
            protocol,
            payload: payload.into(),
            timestamp: time::now(),
        })
    }
}
