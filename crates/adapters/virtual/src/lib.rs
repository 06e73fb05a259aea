//! # driverhub-adapter-virtual
//!
//! Virtual/demo integration providing simulated devices and their drivers,
//! for testing and demonstration.
//!
//! ## Provided devices
//!
//! | Device | Driver | Behaviour |
//! |--------|--------|-----------|
//! | Virtual Light | `VirtualLight 1.0` | `swit:SetState` (`ON` / `OFF`), acknowledged by the device before the response is sent |
//! | Virtual Sensor | `VirtualSensor 1.0` | `temp:temperature` reading refreshed on a named poll schedule |
//!
//! Both answer `base:GetAttributes`.
//!
//! ## Dependency rule
//!
//! Depends on `driverhub-app` (ports, executor, registry) and
//! `driverhub-domain` only.

mod devices;

use std::sync::Arc;
use std::time::Duration;

use driverhub_app::config::ContextConfig;
use driverhub_app::context::DeviceDriverContext;
use driverhub_app::ports::PlatformBus;
use driverhub_app::registry::{ExecutorRegistry, RegistryError, SharedHandler};
use driverhub_domain::address::Address;
use driverhub_domain::error::ValidationError;
use driverhub_domain::id::DeviceId;

pub use devices::{
    GET_ATTRIBUTES, GET_ATTRIBUTES_RESPONSE, INVALID_ARGUMENT, PROTOCOL, UNSUPPORTED_MESSAGE,
    VirtualLight, VirtualSensor,
};

/// Default interval between two sensor readings.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Errors raised while binding virtual devices.
#[derive(Debug, thiserror::Error)]
pub enum VirtualError {
    #[error("invalid virtual driver: {0}")]
    Driver(#[from] ValidationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Kind of simulated device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualKind {
    Light,
    Sensor,
}

/// A virtual device bound by [`VirtualIntegration::setup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualDevice {
    pub kind: VirtualKind,
    pub name: &'static str,
    pub address: Address,
}

/// Virtual integration: one light and one temperature sensor, each bound to
/// its own executor.
pub struct VirtualIntegration<B> {
    bus: B,
    context_config: ContextConfig,
    poll_interval: Duration,
    light_id: DeviceId,
    sensor_id: DeviceId,
}

impl<B: PlatformBus + Clone + 'static> VirtualIntegration<B> {
    #[must_use]
    pub fn new(bus: B, context_config: ContextConfig) -> Self {
        Self {
            bus,
            context_config,
            poll_interval: DEFAULT_POLL_INTERVAL,
            light_id: DeviceId::new(),
            sensor_id: DeviceId::new(),
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        "virtual"
    }

    /// Addresses of the simulated devices, bound or not.
    #[must_use]
    pub fn devices(&self) -> Vec<VirtualDevice> {
        vec![
            VirtualDevice {
                kind: VirtualKind::Light,
                name: "Virtual Light",
                address: Address::driver(self.light_id),
            },
            VirtualDevice {
                kind: VirtualKind::Sensor,
                name: "Virtual Sensor",
                address: Address::driver(self.sensor_id),
            },
        ]
    }

    /// Bind a driver to every simulated device. Calling it again replaces
    /// the drivers, which then see an upgrade from their previous instance.
    ///
    /// # Errors
    ///
    /// Returns [`VirtualError`] if a driver cannot be created or bound.
    #[tracing::instrument(skip_all, fields(integration = self.name()))]
    pub fn setup(
        &self,
        registry: &ExecutorRegistry<DeviceDriverContext<B>>,
    ) -> Result<Vec<VirtualDevice>, VirtualError> {
        let light: SharedHandler<DeviceDriverContext<B>> = Arc::new(VirtualLight::new()?);
        let sensor: SharedHandler<DeviceDriverContext<B>> =
            Arc::new(VirtualSensor::new(self.poll_interval)?);

        registry.associate(self.context(self.light_id), light)?;
        registry.associate(self.context(self.sensor_id), sensor)?;

        let devices = self.devices();
        tracing::info!(count = devices.len(), "virtual devices bound");
        Ok(devices)
    }

    /// Unbind every simulated device still present in `registry`.
    #[tracing::instrument(skip_all, fields(integration = self.name()))]
    pub fn teardown(&self, registry: &ExecutorRegistry<DeviceDriverContext<B>>) {
        for device in self.devices() {
            if let Err(error) = registry.remove(&device.address) {
                tracing::debug!(address = %device.address, %error, "virtual device already unbound");
            }
        }
    }

    fn context(&self, device_id: DeviceId) -> Arc<DeviceDriverContext<B>> {
        Arc::new(DeviceDriverContext::new(
            device_id,
            None,
            self.bus.clone(),
            &self.context_config,
        ))
    }
}

#[cfg(test)]
mod tests {
    use driverhub_app::config::ExecutorConfig;
    use driverhub_app::platform_bus::InProcessPlatformBus;
    use driverhub_app::ports::{DriverHandler, Scheduler};
    use driverhub_domain::driver::DriverId;
    use driverhub_domain::message::{MessageBody, PlatformMessage};

    use super::*;
    use crate::devices::testing::ParkedScheduler;

    type Registry = ExecutorRegistry<DeviceDriverContext<InProcessPlatformBus>>;

    fn registry(scheduler: &Arc<ParkedScheduler>) -> Registry {
        ExecutorRegistry::new(
            Arc::clone(scheduler) as Arc<dyn Scheduler>,
            ExecutorConfig::default(),
        )
    }

    #[test]
    fn should_return_virtual_as_name() {
        let integration = VirtualIntegration::new(InProcessPlatformBus::new(4), ContextConfig::default());
        assert_eq!(integration.name(), "virtual");
    }

    #[test]
    fn should_bind_light_and_sensor_on_setup() {
        let scheduler = Arc::new(ParkedScheduler::default());
        let registry = registry(&scheduler);
        let integration = VirtualIntegration::new(InProcessPlatformBus::new(16), ContextConfig::default());

        let devices = integration.setup(&registry).unwrap();

        assert_eq!(devices.len(), 2);
        assert_eq!(registry.len(), 2);
        for device in &devices {
            let executor = registry.get(&device.address).unwrap();
            assert!(!executor.is_stopped());
        }
    }

    #[test]
    fn should_bind_expected_drivers() {
        let scheduler = Arc::new(ParkedScheduler::default());
        let registry = registry(&scheduler);
        let integration = VirtualIntegration::new(InProcessPlatformBus::new(16), ContextConfig::default());

        let devices = integration.setup(&registry).unwrap();

        let driver_of = |kind: VirtualKind| {
            let device = devices.iter().find(|device| device.kind == kind).unwrap();
            registry.get(&device.address).unwrap().handler().driver_id()
        };
        assert_eq!(driver_of(VirtualKind::Light), DriverId::new("VirtualLight", "1.0").unwrap());
        assert_eq!(driver_of(VirtualKind::Sensor), DriverId::new("VirtualSensor", "1.0").unwrap());
    }

    #[test]
    fn should_replace_drivers_on_second_setup() {
        let scheduler = Arc::new(ParkedScheduler::default());
        let registry = registry(&scheduler);
        let integration = VirtualIntegration::new(InProcessPlatformBus::new(16), ContextConfig::default());
        let first = integration.setup(&registry).unwrap();
        let old = registry.get(&first[0].address).unwrap();

        integration.setup(&registry).unwrap();

        assert!(old.is_stopped());
        assert_eq!(registry.len(), 2);
        assert!(!registry.get(&first[0].address).unwrap().is_stopped());
    }

    #[test]
    fn should_answer_attribute_queries_through_registry() {
        let scheduler = Arc::new(ParkedScheduler::default());
        let registry = registry(&scheduler);
        let bus = InProcessPlatformBus::new(16);
        let integration = VirtualIntegration::new(bus.clone(), ContextConfig::default());
        let devices = integration.setup(&registry).unwrap();
        let sensor = devices
            .iter()
            .find(|device| device.kind == VirtualKind::Sensor)
            .unwrap();
        let mut rx = bus.subscribe();

        let query = PlatformMessage::builder()
            .from(Address::client("web", "tester"))
            .to(sensor.address.clone())
            .payload(MessageBody::new(GET_ATTRIBUTES))
            .request()
            .build()
            .unwrap();
        registry.fire(&sensor.address, query).unwrap();

        let response = rx.try_recv().unwrap();
        assert_eq!(response.message_type(), GET_ATTRIBUTES_RESPONSE);
        assert!(response.payload.attribute("temp:temperature").is_some());
    }

    #[test]
    fn should_unbind_devices_on_teardown() {
        let scheduler = Arc::new(ParkedScheduler::default());
        let registry = registry(&scheduler);
        let integration = VirtualIntegration::new(InProcessPlatformBus::new(16), ContextConfig::default());
        let devices = integration.setup(&registry).unwrap();
        let light = registry.get(&devices[0].address).unwrap();

        integration.teardown(&registry);
        scheduler.run_parked();

        assert!(registry.is_empty());
        assert!(light.is_stopped());
    }
}
