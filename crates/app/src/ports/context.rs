//! Driver context port: the device-side state a driver works against.

use driverhub_domain::address::Address;
use driverhub_domain::id::PlaceId;
use driverhub_domain::message::{MessageBody, PlatformMessage};
use driverhub_domain::time::Timestamp;

/// Per-device state and platform access handed to a driver on every dispatch.
///
/// The executor reads [`has_request_in_flight`](Self::has_request_in_flight)
/// to decide whether a platform message may be delivered, and uses
/// [`send_to_platform`](Self::send_to_platform) to answer requests it drops
/// during shutdown. Everything else is for driver code.
///
/// Implementations must be `Sync`: the context is shared across the pool
/// threads that take turns owning the device's executor.
pub trait DriverContext: Send + Sync + 'static {
    /// Driver address of the device.
    fn address(&self) -> &Address;

    /// Place the device belongs to, if known.
    fn place_id(&self) -> Option<PlaceId>;

    /// Whether the device is marked for removal.
    fn is_tombstoned(&self) -> bool;

    /// Whether a platform request is awaiting its correlated response.
    fn has_request_in_flight(&self) -> bool;

    /// Correlation id of the request in flight.
    fn correlation_id(&self) -> Option<String>;

    /// Mark `request` as in flight and return the point in time after which
    /// it is considered timed out.
    fn begin_request(&self, request: &PlatformMessage) -> Timestamp;

    /// Send a message to the platform as-is.
    fn send_to_platform(&self, message: PlatformMessage);

    /// Answer the request in flight with `response`, clearing it.
    ///
    /// With no request in flight the response is broadcast instead.
    fn respond_to_platform(&self, response: MessageBody);

    /// Time out `request` if it is still the request in flight.
    fn cancel_request(&self, request: &PlatformMessage);

    /// Span entered around every dispatch for this device.
    fn span(&self) -> tracing::Span {
        tracing::debug_span!("driver", address = %self.address())
    }
}
