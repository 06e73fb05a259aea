//! Shared fakes for executor and registry tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use driverhub_app::config::{ContextConfig, ExecutorConfig};
use driverhub_app::context::DeviceDriverContext;
use driverhub_app::executor::{DispatchScope, DriverExecutor, ExecutorError};
use driverhub_app::ports::{DriverContext, DriverHandler, HandlerResult, PlatformBus, Scheduler, Task};
use driverhub_domain::address::Address;
use driverhub_domain::driver::DriverId;
use driverhub_domain::event::{DriverEvent, ErrorEvent};
use driverhub_domain::id::DeviceId;
use driverhub_domain::message::{MessageBody, PlatformMessage, ProtocolMessage};

pub type TestContext = DeviceDriverContext<Arc<RecordingBus>>;
pub type TestExecutor = DriverExecutor<Arc<RecordingHandler>, TestContext>;

// ---------------------------------------------------------------------------
// Platform bus
// ---------------------------------------------------------------------------

/// Keeps every message sent to the platform.
#[derive(Default)]
pub struct RecordingBus {
    messages: Mutex<Vec<PlatformMessage>>,
}

impl RecordingBus {
    pub fn messages(&self) -> Vec<PlatformMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn with_error_code(&self, code: &str) -> Vec<PlatformMessage> {
        self.messages()
            .into_iter()
            .filter(|message| message.payload.error_code() == Some(code))
            .collect()
    }
}

impl PlatformBus for RecordingBus {
    fn send(&self, message: PlatformMessage) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Holds scheduled tasks until the test runs them.
#[derive(Default)]
pub struct ManualScheduler {
    tasks: Mutex<Vec<(Duration, Task)>>,
}

impl ManualScheduler {
    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Delays of the pending tasks, in submission order.
    pub fn delays(&self) -> Vec<Duration> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(delay, _)| *delay)
            .collect()
    }

    /// Run pending tasks, shortest delay first, until none are left.
    pub fn run_all(&self) {
        loop {
            let mut batch = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
            if batch.is_empty() {
                return;
            }
            batch.sort_by_key(|(delay, _)| *delay);
            for (_, task) in batch {
                task();
            }
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_delayed(&self, task: Task, delay: Duration) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((delay, task));
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// What the handler saw, in delivery order.
#[derive(Debug, Clone, PartialEq)]
pub enum Seen {
    Platform(String),
    Protocol(Vec<u8>),
    Timeout(String),
    Started,
    Upgraded(Option<DriverId>),
    Stopped,
    Attributes,
    Scheduled(String),
    Connected,
    Disconnected,
    Error(String),
    Unclassified(String),
}

/// Records deliveries and flags overlapping ones.
///
/// Platform messages whose type is `test:Fail` make the handler return an
/// error, `test:Panic` makes it panic. With request tracking on, platform
/// requests are marked in flight and a protocol payload of `done` answers
/// them.
pub struct RecordingHandler {
    id: DriverId,
    seen: Mutex<Vec<Seen>>,
    active: AtomicBool,
    overlaps: AtomicUsize,
    hold: Duration,
    track_requests: bool,
    self_waits: Mutex<Vec<Result<(), ExecutorError>>>,
}

impl RecordingHandler {
    pub fn new(name: &str) -> Self {
        Self {
            id: DriverId::new(name, "1.0").expect("valid driver id"),
            seen: Mutex::new(Vec::new()),
            active: AtomicBool::new(false),
            overlaps: AtomicUsize::new(0),
            hold: Duration::ZERO,
            track_requests: false,
            self_waits: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn holding(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    #[must_use]
    pub fn tracking_requests(mut self) -> Self {
        self.track_requests = true;
        self
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    pub fn self_waits(&self) -> Vec<Result<(), ExecutorError>> {
        self.self_waits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, seen: Seen) {
        if self.active.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        if !self.hold.is_zero() {
            thread::sleep(self.hold);
        }
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(seen);
        self.active.store(false, Ordering::SeqCst);
    }
}

impl<C: DriverContext> DriverHandler<C> for RecordingHandler {
    fn driver_id(&self) -> DriverId {
        self.id.clone()
    }

    fn handle_platform_message(
        &self,
        message: &PlatformMessage,
        scope: &DispatchScope<'_, C>,
    ) -> HandlerResult {
        self.record(Seen::Platform(message.message_type().to_string()));
        match message.message_type() {
            "test:Fail" => anyhow::bail!("handler failed on purpose"),
            "test:Panic" => panic!("handler panicked on purpose"),
            _ => {}
        }
        if self.track_requests && message.request {
            scope.track_request(message);
        }
        Ok(())
    }

    fn handle_protocol_message(
        &self,
        message: &ProtocolMessage,
        scope: &DispatchScope<'_, C>,
    ) -> HandlerResult {
        self.record(Seen::Protocol(message.payload.clone()));
        if self.track_requests && message.payload == b"done" {
            scope.respond(MessageBody::empty());
        }
        Ok(())
    }

    fn handle_request_timeout(
        &self,
        request: &PlatformMessage,
        scope: &DispatchScope<'_, C>,
    ) -> HandlerResult {
        self.record(Seen::Timeout(request.message_type().to_string()));
        scope.context().cancel_request(request);
        Ok(())
    }

    fn on_started(&self, _scope: &DispatchScope<'_, C>) -> HandlerResult {
        self.record(Seen::Started);
        Ok(())
    }

    fn on_upgraded(
        &self,
        previous: Option<&DriverId>,
        _scope: &DispatchScope<'_, C>,
    ) -> HandlerResult {
        self.record(Seen::Upgraded(previous.cloned()));
        Ok(())
    }

    fn on_stopped(&self, _scope: &DispatchScope<'_, C>) -> HandlerResult {
        self.record(Seen::Stopped);
        Ok(())
    }

    fn on_attributes_updated(
        &self,
        _attributes: &serde_json::Map<String, serde_json::Value>,
        _from_device: bool,
        _scope: &DispatchScope<'_, C>,
    ) -> HandlerResult {
        self.record(Seen::Attributes);
        Ok(())
    }

    fn handle_driver_event(
        &self,
        event: &DriverEvent,
        scope: &DispatchScope<'_, C>,
    ) -> HandlerResult {
        match event {
            DriverEvent::Scheduled { name, .. } => {
                self.record(Seen::Scheduled(name.clone()));
                match name.as_str() {
                    "wait-on-self" => {
                        let inner = scope.defer(DriverEvent::scheduled("inner"))?;
                        self.self_waits
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(inner.wait());
                    }
                    "chain" => {
                        scope.defer(DriverEvent::scheduled("chained"))?;
                    }
                    _ => {}
                }
            }
            DriverEvent::Connected => self.record(Seen::Connected),
            DriverEvent::Disconnected => self.record(Seen::Disconnected),
            other => anyhow::bail!("unexpected driver event {other:?}"),
        }
        Ok(())
    }

    fn handle_error(&self, error: &ErrorEvent, _scope: &DispatchScope<'_, C>) -> HandlerResult {
        self.record(Seen::Error(error.code.clone()));
        Ok(())
    }

    fn handle_unclassified(
        &self,
        kind: &str,
        _payload: &serde_json::Value,
        _scope: &DispatchScope<'_, C>,
    ) -> HandlerResult {
        self.record(Seen::Unclassified(kind.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub handler: Arc<RecordingHandler>,
    pub bus: Arc<RecordingBus>,
    pub scheduler: Arc<ManualScheduler>,
    pub executor: TestExecutor,
}

impl Harness {
    pub fn new(handler: RecordingHandler) -> Self {
        Self::with_config(handler, &ExecutorConfig::default())
    }

    pub fn with_config(handler: RecordingHandler, config: &ExecutorConfig) -> Self {
        let handler = Arc::new(handler);
        let bus = Arc::new(RecordingBus::default());
        let scheduler = Arc::new(ManualScheduler::default());
        let context = Arc::new(test_context(&bus));
        let executor = DriverExecutor::new(
            Arc::clone(&handler),
            context,
            Arc::clone(&scheduler) as Arc<dyn Scheduler>,
            config,
        );
        Self {
            handler,
            bus,
            scheduler,
            executor,
        }
    }

    pub fn context(&self) -> &TestContext {
        self.executor.context()
    }

    pub fn address(&self) -> Address {
        self.executor.address().clone()
    }

    /// Mark an unrelated request as in flight so platform messages block.
    pub fn block(&self) -> PlatformMessage {
        let request = request_to(&self.address(), "test:Busy", "blocker");
        self.context().begin_request(&request);
        request
    }

    /// Clear the in-flight request.
    pub fn unblock(&self) {
        self.context().respond_to_platform(MessageBody::empty());
    }
}

pub fn test_context(bus: &Arc<RecordingBus>) -> TestContext {
    DeviceDriverContext::new(DeviceId::new(), None, Arc::clone(bus), &ContextConfig::default())
}

pub fn request_to(to: &Address, message_type: &str, client: &str) -> PlatformMessage {
    PlatformMessage::builder()
        .from(Address::client("web", client))
        .to(to.clone())
        .payload(MessageBody::new(message_type))
        .request()
        .build()
        .expect("valid request")
}

pub fn protocol_to(to: &Address, payload: &[u8]) -> ProtocolMessage {
    ProtocolMessage::new(Address::protocol("ZIGB", "0001"), to.clone(), "ZIGB", payload.to_vec())
        .expect("valid protocol message")
}
