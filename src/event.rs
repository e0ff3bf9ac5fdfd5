//! Pooled log events and their producer-side facade.
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::types::Severity;

/// A set of named tags attached to a log event.
///
/// # Examples
///
/// ```
/// use logmux::Tags;
///
/// let a = Tags::from_names(&["sql", "slow"]);
/// let b = Tags::from_names(&["slow"]);
/// assert!(a.overlaps(&b));
/// assert!(!b.overlaps(&Tags::new()));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags(BTreeSet<String>);

impl Tags {
    /// Makes an empty tag set.
    pub fn new() -> Self {
        Tags(BTreeSet::new())
    }

    /// Makes a tag set from the given names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Tags(names.into_iter().map(|s| s.as_ref().to_owned()).collect())
    }

    /// Adds a tag to this set.
    pub fn insert(&mut self, name: &str) {
        self.0.insert(name.to_owned());
    }

    /// Returns `true` if this set contains `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    /// Returns `true` if this set and `other` share at least one tag.
    pub fn overlaps(&self, other: &Tags) -> bool {
        if self.0.len() <= other.0.len() {
            self.0.iter().any(|t| other.0.contains(t))
        } else {
            other.0.iter().any(|t| self.0.contains(t))
        }
    }

    /// Returns `true` if this set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for tag in &self.0 {
            if !first {
                write!(f, "|")?;
            }
            write!(f, "{}", tag)?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct EventData {
    monitor_id: Uuid,
    log_time: DateTime<Utc>,
    previous_log_time: DateTime<Utc>,
    level: Severity,
    tags: Tags,
    text: String,
    exception_text: Option<String>,
}

impl Default for EventData {
    fn default() -> Self {
        let origin = epoch();
        EventData {
            monitor_id: Uuid::nil(),
            log_time: origin,
            previous_log_time: origin,
            level: Severity::default(),
            tags: Tags::new(),
            text: String::new(),
            exception_text: None,
        }
    }
}

fn epoch() -> DateTime<Utc> {
    Utc.timestamp_millis_opt(0).single().unwrap_or_else(Utc::now)
}

/// A pool of reusable event allocations.
///
/// Producers acquire events through a [`Monitor`]; the sink gives each event
/// back to its pool exactly once when the event is released. The
/// [`outstanding`](EventPool::outstanding) counter tracks events that have
/// been acquired but not yet released.
#[derive(Debug)]
pub struct EventPool {
    free: Mutex<Vec<Box<EventData>>>,
    outstanding: AtomicUsize,
}

impl EventPool {
    /// Makes a new, empty pool.
    pub fn new() -> Arc<Self> {
        Arc::new(EventPool {
            free: Mutex::new(Vec::new()),
            outstanding: AtomicUsize::new(0),
        })
    }

    /// The number of events currently acquired and not yet released.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    fn acquire(self: &Arc<Self>) -> Box<EventData> {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let recycled = match self.free.lock() {
            Ok(mut free) => free.pop(),
            Err(_) => None,
        };
        recycled.unwrap_or_default()
    }

    fn put_back(&self, mut data: Box<EventData>) {
        data.text.clear();
        data.exception_text = None;
        data.tags = Tags::new();
        if let Ok(mut free) = self.free.lock() {
            free.push(data);
        }
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A log event.
///
/// Opaque to the dispatch core: the sink only reads the attributes and
/// releases the event after handling. Releasing happens exactly once, either
/// through [`release`](LogEvent::release) or by dropping the event.
#[derive(Debug)]
pub struct LogEvent {
    data: Option<Box<EventData>>,
    pool: Arc<EventPool>,
}

impl LogEvent {
    /// The stable identifier of the producing monitor.
    pub fn monitor_id(&self) -> Uuid {
        self.data().monitor_id
    }

    /// The time this event was created, strictly monotonic per monitor.
    pub fn log_time(&self) -> DateTime<Utc> {
        self.data().log_time
    }

    /// The log time of the previous event from the same monitor.
    pub fn previous_log_time(&self) -> DateTime<Utc> {
        self.data().previous_log_time
    }

    /// The severity of this event.
    pub fn level(&self) -> Severity {
        self.data().level
    }

    /// The tags attached to this event.
    pub fn tags(&self) -> &Tags {
        &self.data().tags
    }

    /// The event text.
    pub fn text(&self) -> &str {
        &self.data().text
    }

    /// The textual rendering of an attached error, if any.
    pub fn exception_text(&self) -> Option<&str> {
        self.data().exception_text.as_deref()
    }

    /// Gives this event back to its pool.
    ///
    /// Dropping the event has the same effect; this method only makes the
    /// hand-off explicit at call sites that reject or discard events.
    pub fn release(self) {}

    fn data(&self) -> &EventData {
        match &self.data {
            Some(data) => data,
            None => unreachable!(),
        }
    }
}

impl Drop for LogEvent {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            self.pool.put_back(data);
        }
    }
}

/// A producer-side facade that originates log events.
///
/// Each monitor stamps its events with a strictly increasing `log_time` and
/// chains `previous_log_time`, regardless of wall-clock behavior.
#[derive(Debug)]
pub struct Monitor {
    id: Uuid,
    pool: Arc<EventPool>,
    clock: Mutex<MonitorClock>,
}

#[derive(Debug)]
struct MonitorClock {
    previous: DateTime<Utc>,
    last: DateTime<Utc>,
}

impl Monitor {
    /// Makes a new monitor drawing events from `pool`.
    pub fn new(pool: Arc<EventPool>) -> Self {
        let origin = epoch();
        Monitor {
            id: Uuid::new_v4(),
            pool,
            clock: Mutex::new(MonitorClock {
                previous: origin,
                last: origin,
            }),
        }
    }

    /// The stable identifier of this monitor.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Creates a new event stamped with the next monotonic log time.
    pub fn create_event(
        &self,
        level: Severity,
        tags: Tags,
        text: &str,
        exception_text: Option<&str>,
    ) -> LogEvent {
        let (previous, log_time) = self.next_times();
        let mut data = self.pool.acquire();
        data.monitor_id = self.id;
        data.log_time = log_time;
        data.previous_log_time = previous;
        data.level = level;
        data.tags = tags;
        data.text.push_str(text);
        data.exception_text = exception_text.map(|s| s.to_owned());
        LogEvent {
            data: Some(data),
            pool: Arc::clone(&self.pool),
        }
    }

    // Maintains the strictly increasing (previous, current) pair under a
    // small critical section.
    fn next_times(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let mut now = Utc::now();
        match self.clock.lock() {
            Ok(mut clock) => {
                if now <= clock.last {
                    now = clock.last + Duration::milliseconds(1);
                }
                clock.previous = clock.last;
                clock.last = now;
                (clock.previous, clock.last)
            }
            Err(_) => (now, now),
        }
    }
}
