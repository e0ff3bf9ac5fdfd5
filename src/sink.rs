//! The dispatcher sink: one worker, many producers.
mod queue;
mod worker;

pub use self::queue::{ActionHandle, WaitHandle};

use crossbeam_channel::Sender;
use slog::{Discard, Logger};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use self::queue::{HandlerAction, QueueMessage};
use crate::config::SinkConfiguration;
use crate::event::{EventPool, LogEvent, Monitor, Tags};
use crate::handler::{default_handler_factory, Handler, HandlerFactory, HandlerList};
use crate::identity::IdentityCard;
use crate::types::Severity;
use crate::{ErrorKind, Result};

/// Tag carried by the close sentinel, the last event handlers ever see.
pub const TAG_CLOSE_SENTINEL: &str = "CloseSentinel";

const DEFAULT_AWAKER_PERIOD: Duration = Duration::from_millis(100);

/// A callback invoked by the worker on its own periodic schedule.
pub struct ExternalTimer {
    pub period: Duration,
    pub callback: Box<dyn FnMut() + Send>,
}

pub(crate) struct SinkShared {
    pub(crate) logger: Logger,
    pub(crate) sender: Sender<QueueMessage>,
    pub(crate) open: AtomicBool,
    pub(crate) stopping: AtomicBool,
    pub(crate) awaker_stop: AtomicBool,
    pub(crate) pending_configurations: Mutex<Vec<SinkConfiguration>>,
    pub(crate) identity_card: Arc<Mutex<IdentityCard>>,
    pub(crate) monitor: Monitor,
    pub(crate) pool: Arc<EventPool>,
}

impl SinkShared {
    pub(crate) fn take_pending_configurations(&self) -> Vec<SinkConfiguration> {
        match self.pending_configurations.lock() {
            Ok(mut slot) => std::mem::take(&mut *slot),
            Err(_) => Vec::new(),
        }
    }

    pub(crate) fn try_submit_event(&self, event: LogEvent) -> std::result::Result<(), LogEvent> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(event);
        }
        match self.sender.send(QueueMessage::Event(event)) {
            Ok(()) => Ok(()),
            Err(err) => match err.into_inner() {
                QueueMessage::Event(event) => Err(event),
                _ => unreachable!(),
            },
        }
    }
}

/// Builds a [`DispatcherSink`].
pub struct DispatcherSinkBuilder {
    logger: Option<Logger>,
    factory: HandlerFactory,
    awaker_period: Duration,
    external_timer: Option<ExternalTimer>,
}

impl DispatcherSinkBuilder {
    /// Makes a new builder with default settings.
    pub fn new() -> Self {
        DispatcherSinkBuilder {
            logger: None,
            factory: default_handler_factory,
            awaker_period: DEFAULT_AWAKER_PERIOD,
            external_timer: None,
        }
    }

    /// Sets the diagnostics logger of the sink.
    pub fn logger(&mut self, logger: Logger) -> &mut Self {
        self.logger = Some(logger);
        self
    }

    /// Replaces the handler factory used to instantiate configured handlers.
    pub fn handler_factory(&mut self, factory: HandlerFactory) -> &mut Self {
        self.factory = factory;
        self
    }

    /// Sets the period of the awaker keeping the worker's timers running
    /// while the queue is idle.
    pub fn awaker_period(&mut self, period: Duration) -> &mut Self {
        self.awaker_period = period;
        self
    }

    /// Installs a callback the worker invokes every `period`.
    pub fn external_timer(
        &mut self,
        period: Duration,
        callback: Box<dyn FnMut() + Send>,
    ) -> &mut Self {
        self.external_timer = Some(ExternalTimer { period, callback });
        self
    }

    /// Spawns the worker and awaker threads and delivers `config` as the
    /// first configuration.
    pub fn start(&mut self, pool: Arc<EventPool>, config: SinkConfiguration) -> DispatcherSink {
        let logger = self
            .logger
            .take()
            .unwrap_or_else(|| Logger::root(Discard, o!()));
        let (sender, receiver) = crossbeam_channel::unbounded();
        let shared = Arc::new(SinkShared {
            logger,
            sender,
            open: AtomicBool::new(true),
            stopping: AtomicBool::new(false),
            awaker_stop: AtomicBool::new(false),
            pending_configurations: Mutex::new(vec![config]),
            identity_card: Arc::new(Mutex::new(IdentityCard::with_process_info())),
            monitor: Monitor::new(Arc::clone(&pool)),
            pool,
        });
        let worker = {
            let shared = Arc::clone(&shared);
            let factory = self.factory;
            let external_timer = self.external_timer.take();
            thread::spawn(move || worker::run(shared, receiver, factory, external_timer))
        };
        let awaker = {
            let shared = Arc::clone(&shared);
            let period = self.awaker_period;
            thread::spawn(move || loop {
                thread::sleep(period);
                if shared.awaker_stop.load(Ordering::SeqCst) {
                    break;
                }
                if shared.sender.send(QueueMessage::Tick).is_err() {
                    break;
                }
            })
        };
        DispatcherSink {
            shared,
            worker: Some(worker),
            awaker: Some(awaker),
        }
    }
}

impl Default for DispatcherSinkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The single-worker dispatcher fanning events out to all handlers.
///
/// Dropping the sink stops it and joins the worker.
pub struct DispatcherSink {
    shared: Arc<SinkShared>,
    worker: Option<JoinHandle<()>>,
    awaker: Option<JoinHandle<()>>,
}

impl DispatcherSink {
    /// Hands `event` to the worker.
    ///
    /// Never blocks. Ownership of the event transfers to the sink on
    /// success; on failure (the sink has been stopped) the event is handed
    /// back and the caller must release it.
    pub fn try_submit(&self, event: LogEvent) -> std::result::Result<(), LogEvent> {
        self.shared.try_submit_event(event)
    }

    /// Queues `config`; the worker applies it between two queue items.
    pub fn apply_configuration(&self, config: SinkConfiguration) {
        if let Ok(mut slot) = self.shared.pending_configurations.lock() {
            slot.push(config);
        }
    }

    /// Activates `handler` and adds it to the dispatch list.
    pub fn add_handler(&self, handler: Box<dyn Handler>) -> Result<()> {
        self.send_control(QueueMessage::AddHandler(handler))
    }

    /// Deactivates and removes the handlers with the given identity.
    pub fn remove_handler(&self, identity: &str) -> Result<()> {
        self.send_control(QueueMessage::RemoveHandler(identity.to_owned()))
    }

    /// Runs `action` on the worker thread against the handler list.
    pub fn run_action<F>(&self, action: F) -> Result<ActionHandle>
    where
        F: FnOnce(&Logger, &mut HandlerList) -> Result<()> + Send + 'static,
    {
        let handle = ActionHandle::new();
        track!(self.send_control(QueueMessage::Action(HandlerAction {
            run: Box::new(action),
            done: handle.clone(),
        })))?;
        Ok(handle)
    }

    /// Blocks until every event enqueued before this call has been
    /// dispatched.
    pub fn sync_wait(&self) -> Result<()> {
        let handle = WaitHandle::new();
        track!(self.send_control(QueueMessage::SyncWait(handle.clone())))?;
        handle.wait();
        Ok(())
    }

    /// Like [`sync_wait`](Self::sync_wait), but returns a handle instead of
    /// blocking.
    pub fn async_wait(&self) -> Result<WaitHandle> {
        let handle = WaitHandle::new();
        track!(self.send_control(QueueMessage::AsyncWait(handle.clone())))?;
        Ok(handle)
    }

    /// Stops the sink.
    ///
    /// Idempotent. The first call writes the close sentinel and completes
    /// the queue; the worker dispatches the sentinel to every handler,
    /// drains and releases whatever remains in the queue, and deactivates
    /// all handlers.
    pub fn stop(&self) {
        if self.shared.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        let event = self.shared.monitor.create_event(
            Severity::Info,
            Tags::from_names(&[TAG_CLOSE_SENTINEL]),
            "sink is closing",
            None,
        );
        let _ = self.shared.sender.send(QueueMessage::Close(event));
        self.shared.open.store(false, Ordering::SeqCst);
    }

    /// Returns `true` once [`stop`](Self::stop) has been called.
    pub fn stopping(&self) -> bool {
        self.shared.stopping.load(Ordering::SeqCst)
    }

    /// The identity card maintained by the worker.
    pub fn identity_card(&self) -> Arc<Mutex<IdentityCard>> {
        Arc::clone(&self.shared.identity_card)
    }

    /// The pool events are drawn from.
    pub fn pool(&self) -> Arc<EventPool> {
        Arc::clone(&self.shared.pool)
    }

    fn send_control(&self, message: QueueMessage) -> Result<()> {
        track_assert!(self.shared.open.load(Ordering::SeqCst), ErrorKind::Full);
        if self.shared.sender.send(message).is_err() {
            track_panic!(ErrorKind::Full, "The sink worker is gone");
        }
        Ok(())
    }
}

impl Drop for DispatcherSink {
    fn drop(&mut self) {
        self.stop();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        if let Some(awaker) = self.awaker.take() {
            let _ = awaker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConsoleConfig, HandlerConfig, TextFileConfig};
    use crate::identity::TAG_IDENTITY_CARD_UPDATE;
    use crate::stamp::try_match;
    use std::fs;
    use std::path::Path;
    use tempfile::{Builder as TempDirBuilder, TempDir};

    struct RecordingHandler {
        identity: String,
        log: Arc<Mutex<Vec<String>>>,
        fail_on_handle: bool,
    }

    impl RecordingHandler {
        fn new(identity: &str) -> (Self, Arc<Mutex<Vec<String>>>) {
            let log = Arc::new(Mutex::new(Vec::new()));
            (
                RecordingHandler {
                    identity: identity.to_owned(),
                    log: Arc::clone(&log),
                    fail_on_handle: false,
                },
                log,
            )
        }

        fn record(&self, entry: String) {
            self.log.lock().unwrap().push(entry);
        }
    }

    impl Handler for RecordingHandler {
        fn identity(&self) -> &str {
            &self.identity
        }
        fn activate(&mut self) -> Result<()> {
            self.record("activate".to_owned());
            Ok(())
        }
        fn deactivate(&mut self) -> Result<()> {
            self.record("deactivate".to_owned());
            Ok(())
        }
        fn handle(&mut self, event: &LogEvent) -> Result<()> {
            self.record(format!("event:{}", event.text()));
            if self.fail_on_handle {
                track_panic!(ErrorKind::Other, "Simulated handler failure");
            }
            Ok(())
        }
        fn on_timer(&mut self, _elapsed: Duration) -> Result<()> {
            Ok(())
        }
        fn apply_configuration(&mut self, config: &crate::config::HandlerConfig) -> Result<bool> {
            // Poses as the console handler so reconciliation can claim it.
            let claimed = matches!(config, HandlerConfig::Console(_)) && self.identity == "console";
            if claimed {
                self.record("reconfigure".to_owned());
            }
            Ok(claimed)
        }
    }

    fn test_logger() -> Logger {
        use slog::Drain;

        let decorator = slog_term::PlainSyncDecorator::new(std::io::sink());
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        Logger::root(drain, o!())
    }

    fn start_sink(config: SinkConfiguration) -> (DispatcherSink, Arc<EventPool>, Monitor) {
        let pool = EventPool::new();
        let sink = DispatcherSinkBuilder::new()
            .logger(test_logger())
            .start(Arc::clone(&pool), config);
        let monitor = Monitor::new(Arc::clone(&pool));
        (sink, pool, monitor)
    }

    fn submit(sink: &DispatcherSink, monitor: &Monitor, level: Severity, text: &str) {
        let event = monitor.create_event(level, Tags::new(), text, None);
        if let Err(event) = sink.try_submit(event) {
            event.release();
        }
    }

    fn events_of(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.starts_with("event:"))
            .cloned()
            .collect()
    }

    #[test]
    fn events_are_dispatched_in_order_and_released() {
        let (sink, pool, monitor) = start_sink(SinkConfiguration::default());
        let (handler, log) = RecordingHandler::new("recorder");
        sink.add_handler(Box::new(handler)).unwrap();
        for i in 0..50 {
            submit(&sink, &monitor, Severity::Info, &format!("event {}", i));
        }
        sink.sync_wait().unwrap();

        let seen = events_of(&log);
        assert_eq!(seen.len(), 50);
        for (i, entry) in seen.iter().enumerate() {
            assert_eq!(entry, &format!("event:event {}", i));
        }
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn stop_drains_and_dispatches_the_sentinel_last() {
        let (sink, pool, monitor) = start_sink(SinkConfiguration::default());
        let (handler, log) = RecordingHandler::new("recorder");
        sink.add_handler(Box::new(handler)).unwrap();
        for i in 0..20 {
            submit(&sink, &monitor, Severity::Info, &format!("event {}", i));
        }
        sink.stop();
        sink.stop();
        drop(sink);

        let entries = log.lock().unwrap().clone();
        let last_event = entries
            .iter()
            .filter(|e| e.starts_with("event:"))
            .last()
            .cloned()
            .unwrap();
        assert_eq!(last_event, "event:sink is closing");
        assert_eq!(entries.last().unwrap(), "deactivate");
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn submissions_after_stop_hand_the_event_back() {
        let (sink, pool, monitor) = start_sink(SinkConfiguration::default());
        sink.stop();
        let event = monitor.create_event(Severity::Info, Tags::new(), "late", None);
        let rejected = sink.try_submit(event);
        assert!(rejected.is_err());
        if let Err(event) = rejected {
            event.release();
        }
        assert!(sink.sync_wait().is_err());
        drop(sink);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn minimal_filter_releases_low_severities_without_dispatch() {
        let mut config = SinkConfiguration::default();
        config.minimal_filter = Severity::Warning;
        let (sink, pool, monitor) = start_sink(config);
        let (handler, log) = RecordingHandler::new("recorder");
        sink.add_handler(Box::new(handler)).unwrap();
        submit(&sink, &monitor, Severity::Info, "quiet");
        submit(&sink, &monitor, Severity::Error, "loud");
        sink.sync_wait().unwrap();

        assert_eq!(events_of(&log), vec!["event:loud".to_owned()]);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn faulty_handlers_are_removed_after_the_current_item() {
        let (sink, _pool, monitor) = start_sink(SinkConfiguration::default());
        let (mut faulty, faulty_log) = RecordingHandler::new("faulty");
        faulty.fail_on_handle = true;
        let (good, good_log) = RecordingHandler::new("good");
        sink.add_handler(Box::new(faulty)).unwrap();
        sink.add_handler(Box::new(good)).unwrap();

        submit(&sink, &monitor, Severity::Info, "one");
        submit(&sink, &monitor, Severity::Info, "two");
        sink.sync_wait().unwrap();

        assert_eq!(events_of(&faulty_log).len(), 1);
        assert!(faulty_log.lock().unwrap().contains(&"deactivate".to_owned()));
        assert_eq!(events_of(&good_log).len(), 2);
    }

    #[test]
    fn reconciliation_keeps_claimed_handlers_without_stutter() {
        let (sink, _pool, monitor) = start_sink(SinkConfiguration::default());
        let (handler, log) = RecordingHandler::new("console");
        sink.add_handler(Box::new(handler)).unwrap();
        sink.sync_wait().unwrap();

        // The recorder claims the console configuration: no deactivation, no
        // second activation.
        let mut config = SinkConfiguration::default();
        config.handlers.push(HandlerConfig::Console(ConsoleConfig::default()));
        sink.apply_configuration(config);
        sink.sync_wait().unwrap();
        submit(&sink, &monitor, Severity::Info, "after");
        sink.sync_wait().unwrap();

        let entries = log.lock().unwrap().clone();
        assert_eq!(
            entries.iter().filter(|e| *e == "activate").count(),
            1
        );
        assert_eq!(
            entries.iter().filter(|e| *e == "deactivate").count(),
            0
        );
        assert!(entries.contains(&"reconfigure".to_owned()));
        assert!(entries.contains(&"event:after".to_owned()));

        // An empty configuration claims nothing: the handler is deactivated.
        sink.apply_configuration(SinkConfiguration::default());
        sink.sync_wait().unwrap();
        assert!(log.lock().unwrap().contains(&"deactivate".to_owned()));
        drop(sink);
    }

    #[test]
    fn unclaimed_configurations_create_new_handlers() {
        let dir = tempdir();
        let (sink, _pool, monitor) = start_sink(SinkConfiguration::default());
        sink.sync_wait().unwrap();

        let mut file_config = TextFileConfig::new(dir.path());
        file_config.max_count_per_file = 1;
        let mut config = SinkConfiguration::default();
        config.handlers.push(HandlerConfig::TextFile(file_config));
        sink.apply_configuration(config);
        sink.sync_wait().unwrap();
        submit(&sink, &monitor, Severity::Info, "persisted");
        sink.sync_wait().unwrap();

        let found = finalized_files(dir.path());
        assert!(!found.is_empty());
        let combined: String = found
            .iter()
            .map(|p| fs::read_to_string(p).unwrap())
            .collect();
        assert!(combined.contains("persisted"));
        drop(sink);
    }

    #[test]
    fn rotation_through_the_sink_produces_one_file_per_event() {
        let dir = tempdir();
        let mut file_config = TextFileConfig::new(dir.path());
        file_config.max_count_per_file = 1;
        let mut config = SinkConfiguration::default();
        config.handlers.push(HandlerConfig::TextFile(file_config));
        let (sink, pool, monitor) = start_sink(config);
        for i in 0..5 {
            submit(&sink, &monitor, Severity::Info, &format!("line {}", i));
        }
        sink.stop();
        drop(sink);

        // 5 events, the identity-card event and the close sentinel, one
        // file each.
        let files = finalized_files(dir.path());
        assert!(files.len() >= 6, "only {} files", files.len());
        let mut names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_owned())
            .collect();
        let sorted = {
            let mut sorted = names.clone();
            sorted.sort();
            sorted
        };
        names.sort_by_key(|name| try_match(name).unwrap().0);
        assert_eq!(names, sorted);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn identity_updates_merge_and_repeated_updates_are_suppressed() {
        let (sink, _pool, monitor) = start_sink(SinkConfiguration::default());
        let (handler, log) = RecordingHandler::new("recorder");
        sink.add_handler(Box::new(handler)).unwrap();
        sink.sync_wait().unwrap();

        let update = |payload: &str| {
            let event = monitor.create_event(
                Severity::Info,
                Tags::from_names(&[TAG_IDENTITY_CARD_UPDATE]),
                payload,
                None,
            );
            if let Err(event) = sink.try_submit(event) {
                event.release();
            }
        };
        update("deployment=blue");
        update("deployment=blue");
        update("not a payload");
        sink.sync_wait().unwrap();

        // Only the first update changed the card and was fanned out.
        assert_eq!(events_of(&log), vec!["event:deployment=blue".to_owned()]);
        let card = sink.identity_card();
        assert_eq!(card.lock().unwrap().get("deployment"), Some("blue"));
    }

    #[test]
    fn actions_run_on_the_worker_and_see_the_list() {
        let (sink, _pool, _monitor) = start_sink(SinkConfiguration::default());
        let (handler, _log) = RecordingHandler::new("recorder");
        sink.add_handler(Box::new(handler)).unwrap();
        let handle = sink
            .run_action(|_logger, list| {
                track_assert_eq!(list.identities(), vec!["recorder".to_owned()], ErrorKind::Other);
                Ok(())
            })
            .unwrap();
        assert!(handle.wait().is_ok());

        sink.remove_handler("recorder").unwrap();
        let handle = sink
            .run_action(|_logger, list| {
                track_assert!(list.is_empty(), ErrorKind::Other);
                Ok(())
            })
            .unwrap();
        assert!(handle.wait().is_ok());
    }

    #[test]
    fn idle_queues_still_run_the_periodic_timers() {
        use std::sync::atomic::AtomicUsize;

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_in_callback = Arc::clone(&fired);
        let pool = EventPool::new();
        let mut config = SinkConfiguration::default();
        config.timer_duration_ms = 20;
        let sink = DispatcherSinkBuilder::new()
            .awaker_period(Duration::from_millis(10))
            .external_timer(
                Duration::from_millis(30),
                Box::new(move || {
                    fired_in_callback.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .start(pool, config);

        // No events are submitted; only the awaker keeps the worker moving.
        std::thread::sleep(Duration::from_millis(300));
        drop(sink);
        assert!(fired.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn async_wait_completes_without_blocking_the_producer() {
        let (sink, _pool, monitor) = start_sink(SinkConfiguration::default());
        submit(&sink, &monitor, Severity::Info, "before");
        let handle = sink.async_wait().unwrap();
        handle.wait();
        assert!(handle.is_complete());
    }

    fn finalized_files(dir: &Path) -> Vec<std::path::PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| {
                p.is_file()
                    && try_match(p.file_name().unwrap().to_str().unwrap()).is_some()
            })
            .collect()
    }

    fn tempdir() -> TempDir {
        TempDirBuilder::new()
            .prefix("logmux_test")
            .tempdir()
            .expect("Cannot create a temporary directory")
    }
}
