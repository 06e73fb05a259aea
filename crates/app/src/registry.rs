//! Address → executor mapping and the lifecycle calls around it.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use driverhub_domain::address::Address;
use driverhub_domain::event::ExecutorEvent;

use crate::config::ExecutorConfig;
use crate::executor::{DriverExecutor, EventFuture, ExecutorError};
use crate::ports::{DriverContext, DriverHandler, Scheduler};

/// Driver handler shared between the registry and its executor.
pub type SharedHandler<C> = Arc<dyn DriverHandler<C>>;

/// Executor type managed by the registry.
pub type RegisteredExecutor<C> = DriverExecutor<SharedHandler<C>, C>;

/// Errors from [`ExecutorRegistry`] operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no driver bound to {0}")]
    NotFound(Address),

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// Owns one executor per bound device.
pub struct ExecutorRegistry<C: DriverContext> {
    executors: RwLock<HashMap<Address, RegisteredExecutor<C>>>,
    scheduler: Arc<dyn Scheduler>,
    config: ExecutorConfig,
}

impl<C: DriverContext> ExecutorRegistry<C> {
    #[must_use]
    pub fn new(scheduler: Arc<dyn Scheduler>, config: ExecutorConfig) -> Self {
        Self {
            executors: RwLock::new(HashMap::new()),
            scheduler,
            config,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Address, RegisteredExecutor<C>>> {
        self.executors.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Address, RegisteredExecutor<C>>> {
        self.executors.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind `handler` to the device behind `context`.
    ///
    /// A driver already bound to the device is stopped first, and the call
    /// waits until its stopped event has been delivered. The new executor is
    /// then started, told which driver it replaced, and registered.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Executor`] when waiting on the previous
    /// driver fails, e.g. because this is called from its executor thread.
    #[tracing::instrument(skip_all, fields(address = %context.address(), driver = %handler.driver_id()))]
    pub fn associate(
        &self,
        context: Arc<C>,
        handler: SharedHandler<C>,
    ) -> Result<RegisteredExecutor<C>, RegistryError> {
        let address = context.address().clone();
        let previous_driver = match self.get(&address) {
            Some(previous) => {
                let driver = previous.handler().driver_id();
                tracing::info!(previous = %driver, "replacing driver");
                previous.stop().wait()?;
                Some(driver)
            }
            None => None,
        };

        let executor = DriverExecutor::new(
            handler,
            context,
            Arc::clone(&self.scheduler),
            &self.config,
        );
        executor.start();
        executor.upgraded(previous_driver);
        self.write().insert(address, executor.clone());
        Ok(executor)
    }

    #[must_use]
    pub fn get(&self, address: &Address) -> Option<RegisteredExecutor<C>> {
        self.read().get(address).cloned()
    }

    /// Submit `event` to the executor bound at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when no driver is bound there, or
    /// [`RegistryError::Executor`] when the executor refuses the event.
    pub fn fire(
        &self,
        address: &Address,
        event: impl Into<ExecutorEvent>,
    ) -> Result<EventFuture, RegistryError> {
        let executor = self
            .get(address)
            .ok_or_else(|| RegistryError::NotFound(address.clone()))?;
        Ok(executor.fire(event)?)
    }

    /// Unbind the device and stop its executor on a pool thread.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when no driver is bound there.
    #[tracing::instrument(skip(self))]
    pub fn remove(&self, address: &Address) -> Result<(), RegistryError> {
        let executor = self
            .write()
            .remove(address)
            .ok_or_else(|| RegistryError::NotFound(address.clone()))?;
        tracing::debug!("executor removed");
        self.scheduler.schedule_delayed(
            Box::new(move || {
                executor.stop();
            }),
            Duration::ZERO,
        );
        Ok(())
    }

    /// Stop every executor and wait for their stopped events. Executors stay
    /// registered.
    #[tracing::instrument(skip(self))]
    pub fn stop_all(&self) {
        let executors: Vec<_> = self.read().values().cloned().collect();
        let stopping: Vec<_> = executors
            .iter()
            .map(|executor| (executor.address().clone(), executor.stop()))
            .collect();
        for (address, stopped) in stopping {
            if let Err(error) = stopped.wait() {
                tracing::warn!(%address, %error, "driver did not stop cleanly");
            }
        }
        tracing::info!(count = executors.len(), "all drivers stopped");
    }

    #[must_use]
    pub fn addresses(&self) -> Vec<Address> {
        self.read().keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
