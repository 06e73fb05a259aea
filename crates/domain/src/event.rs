//! Events queued on a device executor.
//!
//! [`ExecutorEvent`] is the closed set of things a device executor accepts:
//! platform messages, protocol messages, request timeouts, driver events,
//! explicit errors, and anything else (unclassified). Dispatch matches on it
//! exhaustively, so adding a variant is a compile-time change for every
//! consumer.

use serde::{Deserialize, Serialize};

use crate::driver::DriverId;
use crate::message::{PlatformMessage, ProtocolMessage};

/// Events raised by the runtime about a driver, rather than received from
/// the platform or the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DriverEvent {
    /// The driver was started (or restored after a restart).
    Started,
    /// The driver replaced a previous driver for the same device.
    Upgraded { previous: Option<DriverId> },
    /// The driver is being shut down.
    Stopped,
    /// Attributes were changed outside of the driver.
    AttributesUpdated {
        attributes: serde_json::Map<String, serde_json::Value>,
        from_device: bool,
    },
    /// The device came online.
    Connected,
    /// The device went offline.
    Disconnected,
    /// A driver-defined event, typically scheduled by the driver itself.
    Scheduled {
        name: String,
        #[serde(default)]
        data: serde_json::Value,
    },
}

impl DriverEvent {
    /// Whether the event is a lifecycle transition.
    #[must_use]
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::Started | Self::Upgraded { .. } | Self::Stopped | Self::AttributesUpdated { .. }
        )
    }

    /// Whether the event partitions the executor queue: everything queued
    /// before it is delivered before it, everything queued after it after.
    #[must_use]
    pub fn is_barrier(&self) -> bool {
        matches!(self, Self::Started | Self::Upgraded { .. } | Self::Stopped)
    }

    /// Build a [`DriverEvent::Scheduled`] with no data.
    #[must_use]
    pub fn scheduled(name: impl Into<String>) -> Self {
        Self::Scheduled {
            name: name.into(),
            data: serde_json::Value::Null,
        }
    }
}

/// An error reported to a driver, e.g. a failed send to the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub code: String,
    pub message: String,
}

impl ErrorEvent {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Category an [`ExecutorEvent`] is routed and ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Platform,
    Protocol,
    RequestTimeout,
    Lifecycle,
    Driver,
    Error,
    Unclassified,
}

/// Payload of a queued executor event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", content = "event", rename_all = "snake_case")]
pub enum ExecutorEvent {
    /// A message from the platform; requests expect a correlated response.
    Platform(PlatformMessage),
    /// Raw traffic from the device.
    Protocol(ProtocolMessage),
    /// The response window for the carried request elapsed.
    RequestTimeout(PlatformMessage),
    /// Lifecycle transition or other driver-level event.
    Driver(DriverEvent),
    /// An explicit error reported to the driver.
    Error(ErrorEvent),
    /// Anything else; routed to the handler's fallback.
    Unclassified {
        kind: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
}

impl ExecutorEvent {
    /// Category used for routing and ordering.
    #[must_use]
    pub fn category(&self) -> EventCategory {
        match self {
            Self::Platform(_) => EventCategory::Platform,
            Self::Protocol(_) => EventCategory::Protocol,
            Self::RequestTimeout(_) => EventCategory::RequestTimeout,
            Self::Driver(event) if event.is_lifecycle() => EventCategory::Lifecycle,
            Self::Driver(_) => EventCategory::Driver,
            Self::Error(_) => EventCategory::Error,
            Self::Unclassified { .. } => EventCategory::Unclassified,
        }
    }

    /// Whether this event is a queue barrier (see [`DriverEvent::is_barrier`]).
    #[must_use]
    pub fn is_barrier(&self) -> bool {
        matches!(self, Self::Driver(event) if event.is_barrier())
    }

    /// Short description for logs.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Platform(message) | Self::RequestTimeout(message) => format!(
                "{:?}({} from {})",
                self.category(),
                message.message_type(),
                message.source
            ),
            Self::Protocol(message) => format!(
                "Protocol({} from {}, {} bytes)",
                message.protocol,
                message.source,
                message.payload.len()
            ),
            Self::Driver(event) => format!("{event:?}"),
            Self::Error(error) => format!("Error({})", error.code),
            Self::Unclassified { kind, .. } => format!("Unclassified({kind})"),
        }
    }
}

impl From<PlatformMessage> for ExecutorEvent {
    fn from(message: PlatformMessage) -> Self {
        Self::Platform(message)
    }
}

impl From<ProtocolMessage> for ExecutorEvent {
    fn from(message: ProtocolMessage) -> Self {
        Self::Protocol(message)
    }
}

impl From<DriverEvent> for ExecutorEvent {
    fn from(event: DriverEvent) -> Self {
        Self::Driver(event)
    }
}

impl From<ErrorEvent> for ExecutorEvent {
    fn from(error: ErrorEvent) -> Self {
        Self::Error(error)
    }
}
