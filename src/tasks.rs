//! Cooperative gateway runtime.
//!
//! The three duties run as local tasks on one `edge-executor`, driven by
//! `futures-lite`, sleeping on `async-io-mini` timers. Nothing runs in
//! parallel; each duty yields only while sleeping out its cadence, while
//! waiting for the bus lock, or (flush) while waiting for the batch-ready
//! signal.
//!
//! ```text
//!  ┌──────────────────────────────────────────────────────────────┐
//!  │  futures_lite::block_on                                      │
//!  │  ┌────────────────────────────────────────────────────────┐  │
//!  │  │  edge_executor::LocalExecutor                          │  │
//!  │  │  ┌───────────────┐  ┌─────────────┐  ┌──────────────┐  │  │
//!  │  │  │ frequent poll │  │  long poll  │  │    flush     │  │  │
//!  │  │  │ door · alerts │  │ temps → buf │  │ ready ⏳ pub  │  │  │
//!  │  │  │ commands      │  │ signal ───────────▶           │  │  │
//!  │  │  └───────┬───────┘  └──────┬──────┘  └──────┬───────┘  │  │
//!  │  │          └──── bus lock (controller + broker) ┘         │  │
//!  │  └────────────────────────────────────────────────────────┘  │
//!  └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The bus lock guard owns both the controller service and the telemetry
//! bus, so a Modbus exchange and a broker publish can never interleave.
//! The `*_once` step functions do one iteration each and are what the
//! tests drive.

use core::cell::{Cell, RefCell};
use core::time::Duration;
use std::rc::Rc;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embedded_hal::delay::DelayNs;
use log::{error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::{Clock, EventSink, NetworkLink, QoS, ResetPort, SerialPort, TelemetryBus};
use crate::app::service::{CommandOutcome, GatewayService};
use crate::channels;
use crate::config::GatewayConfig;
use crate::controller::ControllerService;
use crate::drivers::watchdog::Watchdog;
use crate::error::LinkFault;
use crate::scheduler::{Cadence, SchedulePlan};
use crate::supervisor::{self, LinkSupervisor};

/// Everything behind the bus lock.
pub struct Peripherals<S, D, B> {
    pub controller: ControllerService<S, D>,
    pub bus: B,
}

/// Platform services the duties use outside the lock.
pub struct Platform<C, E> {
    pub clock: C,
    pub link: Box<dyn NetworkLink>,
    pub reset: Box<dyn ResetPort>,
    pub sink: E,
    pub watchdog: Watchdog,
}

pub struct Gateway<S, D, B, C, E> {
    bus_lock: Mutex<NoopRawMutex, Peripherals<S, D, B>>,
    service: RefCell<GatewayService>,
    ready: Signal<NoopRawMutex, ()>,
    clock: RefCell<C>,
    link: RefCell<Box<dyn NetworkLink>>,
    reset: RefCell<Box<dyn ResetPort>>,
    sink: RefCell<E>,
    watchdog: Watchdog,
    supervisor: RefCell<LinkSupervisor>,
    plan: SchedulePlan,
    post_poll_hold_ms: u32,
    restart_settle_secs: u32,
    restarting: Cell<bool>,
}

impl<S, D, B, C, E> Gateway<S, D, B, C, E>
where
    S: SerialPort,
    D: DelayNs,
    B: TelemetryBus,
    C: Clock + DelayNs,
    E: EventSink,
{
    pub fn new(
        config: &GatewayConfig,
        service: GatewayService,
        peripherals: Peripherals<S, D, B>,
        platform: Platform<C, E>,
    ) -> Self {
        Self {
            bus_lock: Mutex::new(peripherals),
            service: RefCell::new(service),
            ready: Signal::new(),
            clock: RefCell::new(platform.clock),
            link: RefCell::new(platform.link),
            reset: RefCell::new(platform.reset),
            sink: RefCell::new(platform.sink),
            watchdog: platform.watchdog,
            supervisor: RefCell::new(LinkSupervisor::new(config)),
            plan: SchedulePlan::new(config),
            post_poll_hold_ms: config.post_poll_hold_ms,
            restart_settle_secs: config.restart_settle_secs,
            restarting: Cell::new(false),
        }
    }

    /// `true` once the restart sequence has run; the duties stop.
    pub fn is_restarting(&self) -> bool {
        self.restarting.get()
    }

    pub fn service(&self) -> core::cell::Ref<'_, GatewayService> {
        self.service.borrow()
    }

    pub fn sink(&self) -> core::cell::Ref<'_, E> {
        self.sink.borrow()
    }

    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    /// Lock the bus outside a duty (tests inspect the mocks this way).
    pub async fn peripherals(&self) -> embassy_sync::mutex::MutexGuard<'_, NoopRawMutex, Peripherals<S, D, B>> {
        self.bus_lock.lock().await
    }

    fn now_ms(&self) -> u64 {
        self.clock.borrow().now_ms()
    }

    // ── Frequent poll ─────────────────────────────────────────

    /// Door, alerts, compressor, queued commands, link check.
    pub async fn frequent_poll_once(&self) {
        let mut restart = false;
        {
            let mut guard = self.bus_lock.lock().await;
            let Peripherals { controller, bus } = &mut *guard;

            let poll = controller.poll_frequent();
            let compressor = if self.service.borrow().tracks_compressor() {
                controller.read_compressor()
            } else {
                None
            };
            controller.hold_bus(self.post_poll_hold_ms);

            let wall = self.clock.borrow().wall_time();
            let now_secs = self.now_ms() / 1_000;
            let door_event = {
                let mut service = self.service.borrow_mut();
                let mut sink = self.sink.borrow_mut();
                service.on_compressor(compressor, now_secs, &mut *sink);
                service.on_frequent_poll(poll, wall, &mut *sink)
            };
            if let Some(event) = door_event {
                restart |= self.publish(bus, &event, QoS::AtMostOnce);
            }

            while let Some(command) = channels::try_next() {
                let outcome = self.service.borrow_mut().handle_command(
                    &command.payload,
                    controller,
                    &**self.link.borrow(),
                    &mut *self.sink.borrow_mut(),
                );
                match outcome {
                    CommandOutcome::Reply(text) => {
                        restart |= self.publish(bus, &text, QoS::AtMostOnce);
                    }
                    CommandOutcome::Restart => {
                        info!("Tasks: restart requested remotely");
                        drop(guard);
                        self.restart(None);
                        return;
                    }
                }
            }
        }

        if self.watchdog.is_overdue(self.now_ms()) {
            warn!("Tasks: long poll overdue");
        }
        if !self.link.borrow().is_up() {
            restart |= self.supervisor.borrow_mut().record(LinkFault::LinkDown);
        }
        if restart {
            self.escalate();
        }
    }

    // ── Long poll ─────────────────────────────────────────────

    /// Read both temperatures into the batch and signal when it is full.
    pub async fn long_poll_once(&self) {
        let temps = {
            let mut guard = self.bus_lock.lock().await;
            let temps = guard.controller.read_temperatures();
            guard.controller.hold_bus(self.post_poll_hold_ms);
            temps
        };

        let now_secs = self.now_ms() / 1_000;
        let ready = {
            let mut service = self.service.borrow_mut();
            service.mark_long_poll_start(now_secs);
            service.append_temperatures(temps, &mut *self.sink.borrow_mut())
        };
        if ready {
            self.ready.signal(());
        }
        self.watchdog.feed(self.now_ms());
    }

    // ── Flush ─────────────────────────────────────────────────

    /// Publish the buffered batch; the buffer is cleared only once the
    /// bus accepted it.
    pub async fn flush_once(&self) {
        let restart = {
            let mut guard = self.bus_lock.lock().await;
            let wall = self.clock.borrow().wall_time();
            let Some(payload) = self.service.borrow().pending_payload(wall) else {
                return;
            };
            let topic = self.service.borrow().topic().to_owned();

            match guard.bus.publish(&topic, payload.as_bytes(), QoS::AtLeastOnce) {
                Ok(()) => {
                    info!("Tasks: published {payload}");
                    self.supervisor.borrow_mut().clear(LinkFault::Publish);
                    self.service
                        .borrow_mut()
                        .commit_flush(payload.len(), &mut *self.sink.borrow_mut());
                    false
                }
                Err(e) => {
                    warn!("Tasks: batch publish failed: {e}, keeping buffer");
                    self.sink.borrow_mut().emit(&AppEvent::PublishFailed(e));
                    self.supervisor.borrow_mut().record(LinkFault::Publish)
                }
            }
        };
        if restart {
            self.escalate();
        }
    }

    /// Wait for a full batch, then flush it. Returns when the flush started.
    pub async fn flush_when_ready(&self) -> u64 {
        self.ready.wait().await;
        let started = self.now_ms();
        self.flush_once().await;
        started
    }

    /// Publish on the uplink topic. Returns `true` when the failure
    /// escalated to a restart.
    fn publish(&self, bus: &mut B, text: &str, qos: QoS) -> bool {
        let topic = self.service.borrow().topic().to_owned();
        match bus.publish(&topic, text.as_bytes(), qos) {
            Ok(()) => {
                self.supervisor.borrow_mut().clear(LinkFault::Publish);
                false
            }
            Err(e) => {
                warn!("Tasks: publish of {text:?} failed: {e}");
                self.sink.borrow_mut().emit(&AppEvent::PublishFailed(e));
                self.supervisor.borrow_mut().record(LinkFault::Publish)
            }
        }
    }

    // ── Restart ───────────────────────────────────────────────

    fn escalate(&self) {
        let fault = self.supervisor.borrow().escalated();
        self.restart(fault);
    }

    fn restart(&self, fault: Option<LinkFault>) {
        if self.restarting.replace(true) {
            return;
        }
        match fault {
            Some(fault) => error!("Tasks: restarting on {fault}"),
            None => error!("Tasks: restarting on request"),
        }
        self.sink.borrow_mut().emit(&AppEvent::RestartRequested(fault));
        supervisor::restart_device(
            &mut **self.link.borrow_mut(),
            &mut **self.reset.borrow_mut(),
            self.restart_settle_secs,
            &mut *self.clock.borrow_mut(),
        );
    }

    // ── Duty loops ────────────────────────────────────────────

    async fn sleep_out(&self, cadence: &Cadence) {
        async_io_mini::Timer::after(cadence.remaining(self.now_ms())).await;
    }

    async fn frequent_loop(self: Rc<Self>) {
        let mut cadence = self.plan.frequent;
        while !self.is_restarting() {
            cadence.begin(self.now_ms());
            self.frequent_poll_once().await;
            self.sleep_out(&cadence).await;
        }
    }

    async fn long_loop(self: Rc<Self>) {
        let mut cadence = self.plan.long;
        while !self.is_restarting() {
            cadence.begin(self.now_ms());
            self.long_poll_once().await;
            self.sleep_out(&cadence).await;
        }
    }

    async fn flush_loop(self: Rc<Self>) {
        let mut cadence = self.plan.flush;
        cadence.begin(self.now_ms());
        while !self.is_restarting() {
            self.sleep_out(&cadence).await;
            let started = self.flush_when_ready().await;
            cadence.begin(started);
        }
    }

    /// Run the three duties until a restart.
    pub fn run(self: Rc<Self>) {
        let executor: edge_executor::LocalExecutor<'_, 4> = edge_executor::LocalExecutor::new();

        self.service.borrow().start(&mut *self.sink.borrow_mut());

        executor.spawn(self.clone().frequent_loop()).detach();
        executor.spawn(self.clone().long_loop()).detach();
        executor.spawn(self.clone().flush_loop()).detach();

        info!("Tasks: gateway running");

        let gateway = self.clone();
        futures_lite::future::block_on(executor.run(async move {
            while !gateway.is_restarting() {
                async_io_mini::Timer::after(Duration::from_secs(1)).await;
            }
        }));
    }
}
