mod common;

use std::sync::Arc;

use common::{ManualScheduler, RecordingBus, RecordingHandler, Seen, TestContext, protocol_to, test_context};
use driverhub_app::config::ExecutorConfig;
use driverhub_app::ports::{DriverContext, Scheduler};
use driverhub_app::registry::{ExecutorRegistry, RegistryError, SharedHandler};
use driverhub_domain::address::Address;
use driverhub_domain::driver::DriverId;
use driverhub_domain::event::DriverEvent;
use driverhub_domain::id::DeviceId;

struct Fixture {
    bus: Arc<RecordingBus>,
    scheduler: Arc<ManualScheduler>,
    registry: ExecutorRegistry<TestContext>,
}

fn fixture() -> Fixture {
    let bus = Arc::new(RecordingBus::default());
    let scheduler = Arc::new(ManualScheduler::default());
    let registry = ExecutorRegistry::new(
        Arc::clone(&scheduler) as Arc<dyn Scheduler>,
        ExecutorConfig::default(),
    );
    Fixture {
        bus,
        scheduler,
        registry,
    }
}

fn shared(handler: &Arc<RecordingHandler>) -> SharedHandler<TestContext> {
    Arc::clone(handler) as SharedHandler<TestContext>
}

#[test]
fn should_start_driver_on_first_association() {
    let fixture = fixture();
    let context = Arc::new(test_context(&fixture.bus));
    let address = context.address().clone();
    let handler = Arc::new(RecordingHandler::new("Light"));

    fixture
        .registry
        .associate(context, shared(&handler))
        .unwrap();

    assert_eq!(handler.seen(), vec![Seen::Started, Seen::Upgraded(None)]);
    assert_eq!(fixture.registry.len(), 1);
    assert_eq!(fixture.registry.addresses(), vec![address]);
}

#[test]
fn should_stop_previous_driver_before_starting_replacement() {
    let fixture = fixture();
    let context = Arc::new(test_context(&fixture.bus));
    let old = Arc::new(RecordingHandler::new("OldLight"));
    let new = Arc::new(RecordingHandler::new("NewLight"));

    fixture
        .registry
        .associate(Arc::clone(&context), shared(&old))
        .unwrap();
    let executor = fixture
        .registry
        .associate(Arc::clone(&context), shared(&new))
        .unwrap();

    assert_eq!(old.seen().last(), Some(&Seen::Stopped));
    assert_eq!(
        new.seen(),
        vec![
            Seen::Started,
            Seen::Upgraded(Some(DriverId::new("OldLight", "1.0").unwrap()))
        ]
    );
    assert_eq!(fixture.registry.len(), 1);
    assert!(!executor.is_stopped());
}

#[test]
fn should_route_fired_events_to_bound_driver() {
    let fixture = fixture();
    let context = Arc::new(test_context(&fixture.bus));
    let address = context.address().clone();
    let handler = Arc::new(RecordingHandler::new("Light"));
    fixture
        .registry
        .associate(context, shared(&handler))
        .unwrap();

    fixture
        .registry
        .fire(&address, protocol_to(&address, b"on"))
        .unwrap()
        .wait()
        .unwrap();

    assert_eq!(handler.seen().last(), Some(&Seen::Protocol(b"on".to_vec())));
}

#[test]
fn should_return_not_found_for_unbound_address() {
    let fixture = fixture();
    let address = Address::driver(DeviceId::new());

    let fired = fixture
        .registry
        .fire(&address, DriverEvent::Connected);
    let removed = fixture.registry.remove(&address);

    assert!(matches!(fired, Err(RegistryError::NotFound(ref missing)) if *missing == address));
    assert!(matches!(removed, Err(RegistryError::NotFound(_))));
    assert!(fixture.registry.get(&address).is_none());
}

#[test]
fn should_stop_removed_driver_on_scheduler() {
    let fixture = fixture();
    let context = Arc::new(test_context(&fixture.bus));
    let address = context.address().clone();
    let handler = Arc::new(RecordingHandler::new("Light"));
    fixture
        .registry
        .associate(context, shared(&handler))
        .unwrap();

    fixture.registry.remove(&address).unwrap();

    assert!(fixture.registry.is_empty());
    assert_ne!(handler.seen().last(), Some(&Seen::Stopped));

    fixture.scheduler.run_all();

    assert_eq!(handler.seen().last(), Some(&Seen::Stopped));
}

#[test]
fn should_stop_every_driver_on_stop_all() {
    let fixture = fixture();
    let handlers: Vec<_> = (0..3)
        .map(|n| Arc::new(RecordingHandler::new(&format!("Light{n}"))))
        .collect();
    for handler in &handlers {
        fixture
            .registry
            .associate(Arc::new(test_context(&fixture.bus)), shared(handler))
            .unwrap();
    }

    fixture.registry.stop_all();

    for handler in &handlers {
        assert_eq!(handler.seen().last(), Some(&Seen::Stopped));
    }
    assert_eq!(fixture.registry.len(), 3);
    assert!(
        fixture
            .registry
            .addresses()
            .iter()
            .all(|address| fixture.registry.get(address).is_some_and(|executor| executor.is_stopped()))
    );
}
