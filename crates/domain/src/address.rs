//! Address: the endpoint a message is sent from or to.
//!
//! Addresses have a compact textual form `NAMESPACE:group:id` used in logs
//! and on the wire:
//!
//! | Kind | Example |
//! |------|---------|
//! | Driver | `DRIV:dev:6f1c…` |
//! | Protocol | `PROT:ZIGB:00124b0001` |
//! | Service | `SERV:dev:` |
//! | Client | `CLNT:web:session-1` |
//! | Broadcast | `BCST::` |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AddressError;
use crate::id::DeviceId;

/// Endpoint of a platform or protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Address {
    /// The driver instance bound to a device.
    Driver(DeviceId),
    /// A device as seen by its radio protocol (`protocol` is e.g. `ZIGB`).
    Protocol { protocol: String, id: String },
    /// A platform service (e.g. `dev` for the device service).
    Service(String),
    /// A client connection (app, web, bridge).
    Client { group: String, id: String },
    /// Every listener.
    Broadcast,
}

impl Address {
    /// Address of the driver bound to `device_id`.
    #[must_use]
    pub fn driver(device_id: DeviceId) -> Self {
        Self::Driver(device_id)
    }

    /// Address of a platform service.
    #[must_use]
    pub fn service(name: impl Into<String>) -> Self {
        Self::Service(name.into())
    }

    /// Address of a device on the given protocol.
    #[must_use]
    pub fn protocol(protocol: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Protocol {
            protocol: protocol.into(),
            id: id.into(),
        }
    }

    /// Address of a client connection.
    #[must_use]
    pub fn client(group: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Client {
            group: group.into(),
            id: id.into(),
        }
    }

    /// Device id when this is a driver address.
    #[must_use]
    pub fn device_id(&self) -> Option<DeviceId> {
        match self {
            Self::Driver(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driver(id) => write!(f, "DRIV:dev:{id}"),
            Self::Protocol { protocol, id } => write!(f, "PROT:{protocol}:{id}"),
            Self::Service(name) => write!(f, "SERV:{name}:"),
            Self::Client { group, id } => write!(f, "CLNT:{group}:{id}"),
            Self::Broadcast => f.write_str("BCST::"),
        }
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, rest) = s
            .split_once(':')
            .ok_or_else(|| AddressError::MissingNamespace(s.to_string()))?;
        let (group, id) = rest.split_once(':').unwrap_or((rest, ""));

        match namespace {
            "DRIV" => {
                let device_id = id.parse().map_err(AddressError::InvalidDeviceId)?;
                Ok(Self::Driver(device_id))
            }
            "PROT" if !group.is_empty() && !id.is_empty() => Ok(Self::protocol(group, id)),
            "SERV" if !group.is_empty() => Ok(Self::service(group)),
            "CLNT" if !group.is_empty() && !id.is_empty() => Ok(Self::client(group, id)),
            "BCST" => Ok(Self::Broadcast),
            "PROT" | "SERV" | "CLNT" => Err(AddressError::Incomplete(s.to_string())),
            other => Err(AddressError::UnknownNamespace(other.to_string())),
        }
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
