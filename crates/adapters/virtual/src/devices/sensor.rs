//! Virtual temperature sensor, polled on a named schedule.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use driverhub_app::context::DeviceDriverContext;
use driverhub_app::executor::DispatchScope;
use driverhub_app::ports::{DriverHandler, HandlerResult, PlatformBus};
use driverhub_domain::driver::DriverId;
use driverhub_domain::error::ValidationError;
use driverhub_domain::event::DriverEvent;
use driverhub_domain::message::{PlatformMessage, ProtocolMessage};
use driverhub_domain::time;

use super::{GET_ATTRIBUTES, reply_attributes, reply_unsupported};

/// Named event key (and scheduled event name) of the next reading.
pub const POLL: &str = "poll";

/// Attribute holding the last reading, in degrees Celsius.
pub const TEMPERATURE: &str = "temp:temperature";

/// A simulated temperature sensor. Readings sweep between 20.0 and 22.5
/// degrees in half-degree steps.
pub struct VirtualSensor {
    id: DriverId,
    interval: Duration,
    polls: AtomicU32,
}

impl VirtualSensor {
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyName`] if the driver name is empty.
    pub fn new(interval: Duration) -> Result<Self, ValidationError> {
        Ok(Self {
            id: DriverId::new("VirtualSensor", "1.0")?,
            interval,
            polls: AtomicU32::new(0),
        })
    }

    fn next_reading(&self) -> f64 {
        let step = self.polls.fetch_add(1, Ordering::Relaxed) % 10;
        let offset = if step < 5 { step } else { 10 - step };
        20.0 + f64::from(offset) * 0.5
    }

    fn schedule_poll<B: PlatformBus + 'static>(&self, scope: &DispatchScope<'_, DeviceDriverContext<B>>) {
        scope.defer_named(
            POLL,
            DriverEvent::scheduled(POLL),
            time::after(time::now(), self.interval),
        );
    }

    fn poll<B: PlatformBus + 'static>(&self, scope: &DispatchScope<'_, DeviceDriverContext<B>>) {
        let reading = self.next_reading();
        tracing::trace!(reading, "temperature polled");
        let mut changes = serde_json::Map::new();
        changes.insert(TEMPERATURE.to_string(), reading.into());
        scope.context().update_attributes(changes);
        self.schedule_poll(scope);
    }
}

impl<B: PlatformBus + 'static> DriverHandler<DeviceDriverContext<B>> for VirtualSensor {
    fn driver_id(&self) -> DriverId {
        self.id.clone()
    }

    fn handle_platform_message(
        &self,
        message: &PlatformMessage,
        scope: &DispatchScope<'_, DeviceDriverContext<B>>,
    ) -> HandlerResult {
        if message.message_type() == GET_ATTRIBUTES {
            reply_attributes(message, scope);
        } else {
            reply_unsupported(message, scope);
        }
        Ok(())
    }

    fn handle_protocol_message(
        &self,
        message: &ProtocolMessage,
        _scope: &DispatchScope<'_, DeviceDriverContext<B>>,
    ) -> HandlerResult {
        anyhow::bail!("sensor does not accept device traffic ({} bytes)", message.payload.len())
    }

    fn on_started(&self, scope: &DispatchScope<'_, DeviceDriverContext<B>>) -> HandlerResult {
        scope.context().set_connected(true);
        self.poll(scope);
        Ok(())
    }

    fn on_stopped(&self, scope: &DispatchScope<'_, DeviceDriverContext<B>>) -> HandlerResult {
        scope.context().set_connected(false);
        Ok(())
    }

    fn handle_driver_event(
        &self,
        event: &DriverEvent,
        scope: &DispatchScope<'_, DeviceDriverContext<B>>,
    ) -> HandlerResult {
        match event {
            DriverEvent::Scheduled { name, .. } if name == POLL => self.poll(scope),
            DriverEvent::Connected => scope.context().set_connected(true),
            DriverEvent::Disconnected => scope.context().set_connected(false),
            other => tracing::debug!(event = ?other, "ignoring driver event"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use driverhub_app::platform_bus::InProcessPlatformBus;

    use super::*;
    use crate::devices::testing::{ParkedScheduler, executor};

    const INTERVAL: Duration = Duration::from_secs(60);

    #[test]
    fn should_sweep_readings_up_and_down() {
        let sensor = VirtualSensor::new(INTERVAL).unwrap();
        let readings: Vec<f64> = (0..11).map(|_| sensor.next_reading()).collect();
        assert_eq!(
            readings,
            vec![20.0, 20.5, 21.0, 21.5, 22.0, 22.5, 22.0, 21.5, 21.0, 20.5, 20.0]
        );
    }

    #[test]
    fn should_read_on_start_and_schedule_next_poll() {
        let bus = InProcessPlatformBus::new(16);
        let scheduler = Arc::new(ParkedScheduler::default());
        let executor = executor(VirtualSensor::new(INTERVAL).unwrap(), &bus, &scheduler);

        executor.start().unwrap().wait().unwrap();

        assert_eq!(executor.context().attribute(TEMPERATURE), Some(20.0.into()));
        let delays = scheduler.delays();
        assert_eq!(delays.len(), 1);
        assert!(delays[0] > Duration::from_secs(55) && delays[0] <= INTERVAL);
    }

    #[test]
    fn should_update_reading_on_each_poll() {
        let bus = InProcessPlatformBus::new(16);
        let mut rx = bus.subscribe();
        let scheduler = Arc::new(ParkedScheduler::default());
        let executor = executor(VirtualSensor::new(INTERVAL).unwrap(), &bus, &scheduler);
        executor.start();

        scheduler.run_parked();
        scheduler.run_parked();

        assert_eq!(executor.context().attribute(TEMPERATURE), Some(21.0.into()));
        assert_eq!(std::iter::from_fn(|| rx.try_recv().ok()).count(), 3);
        assert_eq!(scheduler.delays().len(), 1);
    }

    #[test]
    fn should_stop_polling_once_stopped() {
        let bus = InProcessPlatformBus::new(16);
        let scheduler = Arc::new(ParkedScheduler::default());
        let executor = executor(VirtualSensor::new(INTERVAL).unwrap(), &bus, &scheduler);
        executor.start();

        executor.stop().wait().unwrap();
        scheduler.run_parked();

        assert_eq!(executor.context().attribute(TEMPERATURE), Some(20.0.into()));
        assert!(scheduler.delays().is_empty());
        assert!(!executor.context().is_connected());
    }

    #[test]
    fn should_track_connection_events() {
        let bus = InProcessPlatformBus::new(16);
        let scheduler = Arc::new(ParkedScheduler::default());
        let executor = executor(VirtualSensor::new(INTERVAL).unwrap(), &bus, &scheduler);

        executor.fire(DriverEvent::Connected).unwrap();
        assert!(executor.context().is_connected());

        executor.fire(DriverEvent::Disconnected).unwrap();
        assert!(!executor.context().is_connected());
    }
}
