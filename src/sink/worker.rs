//! The single consumer of the dispatcher queue.
use crossbeam_channel::Receiver;
use slog::Logger;
use std::panic;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::SinkConfiguration;
use crate::event::{LogEvent, Tags};
use crate::handler::{Handler, HandlerFactory, HandlerList, SinkServices};
use crate::identity::{IdentityCard, TAG_IDENTITY_CARD_FULL, TAG_IDENTITY_CARD_UPDATE};
use crate::sink::queue::QueueMessage;
use crate::sink::{ExternalTimer, SinkShared};
use crate::types::Severity;
use crate::{ErrorKind, Result};

const CONFIG_POLL_INTERVAL: Duration = Duration::from_millis(5);

pub(crate) fn run(
    shared: Arc<SinkShared>,
    receiver: Receiver<QueueMessage>,
    factory: HandlerFactory,
    external_timer: Option<ExternalTimer>,
) {
    let logger = shared.logger.new(o!("component" => "sink-worker"));
    let services = SinkServices {
        logger: shared.logger.clone(),
        identity_card: Arc::clone(&shared.identity_card),
    };
    let list = HandlerList::new(logger.clone());
    let now = Instant::now();
    let mut worker = Worker {
        identity_update_tags: Tags::from_names(&[TAG_IDENTITY_CARD_UPDATE]),
        shared,
        receiver,
        logger,
        list,
        factory,
        services,
        minimal_filter: Severity::Trace,
        timer_duration: Duration::from_millis(500),
        next_tick: now,
        external_timer,
        next_external_tick: now,
        panic_hook_installed: false,
    };
    worker.startup();
    worker.main_loop();
    worker.shutdown();
}

struct Worker {
    shared: Arc<SinkShared>,
    receiver: Receiver<QueueMessage>,
    logger: Logger,
    list: HandlerList,
    factory: HandlerFactory,
    services: SinkServices,
    minimal_filter: Severity,
    timer_duration: Duration,
    next_tick: Instant,
    external_timer: Option<ExternalTimer>,
    next_external_tick: Instant,
    panic_hook_installed: bool,
    identity_update_tags: Tags,
}

impl Worker {
    // Waits for the first configuration batch, applies it, and broadcasts
    // the identity card.
    fn startup(&mut self) {
        loop {
            let batch = self.shared.take_pending_configurations();
            if !batch.is_empty() {
                for config in batch {
                    self.apply_configuration(config);
                }
                break;
            }
            if self.shared.stopping.load(Ordering::SeqCst) {
                break;
            }
            thread::sleep(CONFIG_POLL_INTERVAL);
        }
        self.emit_identity_card();
        let now = Instant::now();
        self.next_tick = now + self.timer_duration;
        if let Some(external) = &self.external_timer {
            self.next_external_tick = now + external.period;
        }
    }

    fn main_loop(&mut self) {
        loop {
            let message = match self.receiver.recv() {
                Ok(message) => message,
                Err(_) => break,
            };
            let batch = self.shared.take_pending_configurations();
            for config in batch {
                self.apply_configuration(config);
            }
            if self.dispatch(message) {
                break;
            }
            if !self.shared.stopping.load(Ordering::SeqCst) {
                self.run_periodic();
            }
        }
    }

    // Returns `true` when the close sentinel has been dispatched.
    fn dispatch(&mut self, message: QueueMessage) -> bool {
        match message {
            QueueMessage::Tick => false,
            QueueMessage::Event(event) => {
                self.handle_event(event);
                false
            }
            QueueMessage::AddHandler(handler) => {
                self.list.add(handler);
                false
            }
            QueueMessage::RemoveHandler(identity) => {
                self.list.remove(&identity);
                false
            }
            QueueMessage::Action(action) => {
                let result = (action.run)(&self.logger, &mut self.list);
                action.done.complete(result);
                false
            }
            QueueMessage::AsyncWait(handle) => {
                handle.complete();
                false
            }
            QueueMessage::SyncWait(handle) => {
                handle.complete();
                false
            }
            QueueMessage::Close(event) => {
                self.list.dispatch(&event);
                true
            }
        }
    }

    fn handle_event(&mut self, event: LogEvent) {
        if event.tags().overlaps(&self.identity_update_tags) {
            match IdentityCard::parse_payload(event.text()) {
                Ok(pairs) => {
                    let changed = match self.shared.identity_card.lock() {
                        Ok(mut card) => card.merge(pairs),
                        Err(_) => false,
                    };
                    if changed {
                        self.list.dispatch(&event);
                    }
                }
                Err(e) => {
                    error!(self.logger, "unparseable identity-card update, suppressing the event";
                           "error" => %e);
                }
            }
        } else if event.level() >= self.minimal_filter {
            self.list.dispatch(&event);
        }
        event.release();
    }

    fn run_periodic(&mut self) {
        let now = Instant::now();
        if now < self.next_tick {
            return;
        }
        self.list.on_timer(self.timer_duration);
        self.next_tick = now + self.timer_duration;
        if let Some(external) = self.external_timer.as_mut() {
            if now >= self.next_external_tick {
                (external.callback)();
                self.next_external_tick = now + external.period;
            }
        }
    }

    // Reconciles the handler list against `config`, preserving handlers
    // whose configuration is unchanged.
    fn apply_configuration(&mut self, config: SinkConfiguration) {
        self.minimal_filter = config.minimal_filter;
        if config.timer_duration_ms > 0 {
            self.timer_duration = Duration::from_millis(config.timer_duration_ms);
        }
        if config.track_panics {
            self.install_panic_hook();
        }

        let mut live: Vec<Option<Box<dyn Handler>>> =
            self.list.take_all().into_iter().map(Some).collect();
        let mut keep = Vec::new();
        let mut unclaimed = Vec::new();
        for handler_config in config.handlers {
            let mut claimed = false;
            for slot in live.iter_mut() {
                let mut handler = match slot.take() {
                    Some(handler) => handler,
                    None => continue,
                };
                match handler.apply_configuration(&handler_config) {
                    Ok(true) => {
                        keep.push(handler);
                        claimed = true;
                        break;
                    }
                    Ok(false) => *slot = Some(handler),
                    Err(e) => {
                        crit!(self.logger, "handler failed while applying a configuration, removing it";
                              "handler" => handler.identity(), "error" => %e);
                        if let Err(e) = handler.deactivate() {
                            warn!(self.logger, "deactivation of a compromised handler failed";
                                  "handler" => handler.identity(), "error" => %e);
                        }
                    }
                }
            }
            if !claimed {
                unclaimed.push(handler_config);
            }
        }
        for slot in live {
            if let Some(mut handler) = slot {
                if let Err(e) = handler.deactivate() {
                    warn!(self.logger, "handler deactivation failed";
                          "handler" => handler.identity(), "error" => %e);
                }
            }
        }
        self.list.set_all(keep);
        for handler_config in unclaimed {
            match (self.factory)(&handler_config, &self.services) {
                Ok(handler) => self.list.add(handler),
                Err(e) => {
                    error!(self.logger, "cannot create a handler from its configuration";
                           "error" => %e);
                }
            }
        }
    }

    fn emit_identity_card(&mut self) {
        let payload = match self.shared.identity_card.lock() {
            Ok(card) => card.to_payload(),
            Err(_) => return,
        };
        let event = self.shared.monitor.create_event(
            Severity::Info,
            Tags::from_names(&[TAG_IDENTITY_CARD_FULL]),
            &payload,
            None,
        );
        self.list.dispatch(&event);
        event.release();
    }

    fn install_panic_hook(&mut self) {
        if self.panic_hook_installed {
            return;
        }
        self.panic_hook_installed = true;
        let shared = Arc::clone(&self.shared);
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if shared.open.load(Ordering::SeqCst) {
                let text = info.to_string();
                let event = shared.monitor.create_event(
                    Severity::Error,
                    Tags::from_names(&["UnhandledPanic"]),
                    "unhandled panic",
                    Some(&text),
                );
                if let Err(event) = shared.try_submit_event(event) {
                    event.release();
                }
            }
            previous(info);
        }));
    }

    // Runs after the close sentinel: remaining queue items are released,
    // pending waits are signaled, pending actions are cancelled, and every
    // handler is deactivated.
    fn shutdown(&mut self) {
        self.shared.awaker_stop.store(true, Ordering::SeqCst);
        while let Ok(message) = self.receiver.try_recv() {
            match message {
                QueueMessage::Event(event) | QueueMessage::Close(event) => event.release(),
                QueueMessage::Action(action) => {
                    action.done.complete(cancelled_action());
                }
                QueueMessage::AsyncWait(handle) | QueueMessage::SyncWait(handle) => {
                    handle.complete();
                }
                QueueMessage::AddHandler(_) | QueueMessage::RemoveHandler(_) | QueueMessage::Tick => {}
            }
        }
        self.list.deactivate_all();
    }
}

fn cancelled_action() -> Result<()> {
    track_panic!(ErrorKind::Full, "The sink was stopped before the action could run");
}
