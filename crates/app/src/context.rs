//! In-memory [`DriverContext`] for one device.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use driverhub_domain::address::Address;
use driverhub_domain::id::{DeviceId, PlaceId};
use driverhub_domain::message::{MessageBody, PlatformMessage};
use driverhub_domain::time::{self, Timestamp};

use crate::config::ContextConfig;
use crate::ports::{DriverContext, PlatformBus};

/// Message type broadcast when attributes change.
pub const VALUE_CHANGE: &str = "base:ValueChange";

struct InFlight {
    request: PlatformMessage,
    deadline: Timestamp,
}

#[derive(Default)]
struct DeviceState {
    in_flight: Option<InFlight>,
    tombstoned: bool,
    connected: bool,
    attributes: serde_json::Map<String, serde_json::Value>,
}

/// [`DriverContext`] holding device state in memory and sending through a
/// [`PlatformBus`].
///
/// Tracks at most one platform request in flight. A request whose deadline
/// has passed is expired the next time anyone asks whether a request is in
/// flight, and its sender gets a `request.timeout` error.
pub struct DeviceDriverContext<B> {
    address: Address,
    place_id: Option<PlaceId>,
    request_timeout: Duration,
    bus: B,
    state: Mutex<DeviceState>,
}

impl<B: PlatformBus> DeviceDriverContext<B> {
    #[must_use]
    pub fn new(device_id: DeviceId, place_id: Option<PlaceId>, bus: B, config: &ContextConfig) -> Self {
        Self {
            address: Address::driver(device_id),
            place_id,
            request_timeout: config.request_timeout(),
            bus,
            state: Mutex::new(DeviceState::default()),
        }
    }

    /// Seed attributes, e.g. restored from storage, without notifying anyone.
    #[must_use]
    pub fn with_attributes(self, attributes: serde_json::Map<String, serde_json::Value>) -> Self {
        self.state().attributes = attributes;
        self
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark the device for removal. A tombstoned device is never started.
    pub fn tombstone(&self) {
        self.state().tombstoned = true;
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    pub fn set_connected(&self, connected: bool) {
        self.state().connected = connected;
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<serde_json::Value> {
        self.state().attributes.get(name).cloned()
    }

    #[must_use]
    pub fn attributes(&self) -> serde_json::Map<String, serde_json::Value> {
        self.state().attributes.clone()
    }

    /// Merge `changes` into the attributes and broadcast the ones that
    /// actually changed. Returns whether anything changed.
    pub fn update_attributes(&self, changes: serde_json::Map<String, serde_json::Value>) -> bool {
        let mut changed = serde_json::Map::new();
        {
            let mut state = self.state();
            for (name, value) in changes {
                if state.attributes.get(&name) != Some(&value) {
                    state.attributes.insert(name.clone(), value.clone());
                    changed.insert(name, value);
                }
            }
        }
        if changed.is_empty() {
            return false;
        }
        let body = MessageBody {
            message_type: VALUE_CHANGE.to_string(),
            attributes: changed,
        };
        self.bus
            .send(PlatformMessage::broadcast(self.address.clone(), self.place_id, body));
        true
    }

    fn time_out(&self, request: &PlatformMessage) {
        tracing::debug!(
            correlation_id = ?request.correlation_id,
            address = %self.address,
            "request timed out"
        );
        self.bus.send(request.response(self.address.clone(), MessageBody::request_timeout()));
    }
}

impl<B: PlatformBus + 'static> DriverContext for DeviceDriverContext<B> {
    fn address(&self) -> &Address {
        &self.address
    }

    fn place_id(&self) -> Option<PlaceId> {
        self.place_id
    }

    fn is_tombstoned(&self) -> bool {
        self.state().tombstoned
    }

    fn has_request_in_flight(&self) -> bool {
        let expired = {
            let mut state = self.state();
            let Some(deadline) = state.in_flight.as_ref().map(|in_flight| in_flight.deadline) else {
                return false;
            };
            if deadline > time::now() {
                return true;
            }
            state.in_flight.take()
        };
        if let Some(expired) = expired {
            self.time_out(&expired.request);
        }
        false
    }

    fn correlation_id(&self) -> Option<String> {
        self.state()
            .in_flight
            .as_ref()
            .and_then(|in_flight| in_flight.request.correlation_id.clone())
    }

    fn begin_request(&self, request: &PlatformMessage) -> Timestamp {
        let deadline = request
            .deadline()
            .unwrap_or_else(|| time::after(time::now(), self.request_timeout));
        let replaced = self.state().in_flight.replace(InFlight {
            request: request.clone(),
            deadline,
        });
        if let Some(replaced) = replaced {
            tracing::warn!(
                correlation_id = ?replaced.request.correlation_id,
                "request replaced while still in flight"
            );
        }
        deadline
    }

    fn send_to_platform(&self, message: PlatformMessage) {
        self.bus.send(message);
    }

    fn respond_to_platform(&self, response: MessageBody) {
        let in_flight = self.state().in_flight.take();
        let message = match in_flight {
            Some(in_flight) => in_flight.request.response(self.address.clone(), response),
            None => PlatformMessage::broadcast(self.address.clone(), self.place_id, response),
        };
        self.bus.send(message);
    }

    fn cancel_request(&self, request: &PlatformMessage) {
        let cancelled = {
            let mut state = self.state();
            let matches = state
                .in_flight
                .as_ref()
                .is_some_and(|in_flight| in_flight.request.id == request.id);
            if matches { state.in_flight.take() } else { None }
        };
        if let Some(cancelled) = cancelled {
            self.time_out(&cancelled.request);
        }
    }
}
