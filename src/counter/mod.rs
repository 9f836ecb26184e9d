//! Counter synchronization
//!
//! One authoritative public-pledge count, mirrored into every bound display
//! slot. Displays are plain callbacks invoked synchronously, under the cell's
//! lock, whenever the value changes, so no display can ever show a value the
//! others do not.
//!
//! Values arrive from three places:
//! - the live subscription on the remote store
//! - a one-time fetch at load (and after each submission)
//! - the local fallback's record count, used only while no remote value
//!   has been seen
//!
//! The subscription and the initial fetch race; whichever lands last wins.

pub mod animation;

pub use animation::{CounterAnimation, RevealLatch, FAMILY_ANIMATION, HERO_ANIMATION};

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::fallback::LocalPledgeLog;
use crate::store::PledgeStore;

/// Display slots on the pledge page
pub const COUNTER_SLOTS: [&str; 5] = [
    "hero-count",
    "nav-count",
    "family-count",
    "updated-count",
    "success-count",
];

/// Handle returned by [`CounterCell::bind`]
pub type DisplayId = u64;

type Render = Box<dyn Fn(u64) + Send + Sync>;

/// Where the current value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountSource {
    Subscription,
    Fetch,
    LocalFallback,
}

impl CountSource {
    fn is_remote(self) -> bool {
        !matches!(self, CountSource::LocalFallback)
    }
}

struct Display {
    id: DisplayId,
    slot: String,
    render: Render,
}

#[derive(Default)]
struct Inner {
    value: Option<u64>,
    source: Option<CountSource>,
    displays: Vec<Display>,
    next_id: DisplayId,
}

/// Observable count cell
#[derive(Default)]
pub struct CounterCell {
    inner: Mutex<Inner>,
}

impl CounterCell {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking display must not take the counter down with it
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Bind a display slot. It is rendered at once if a value is known.
    ///
    /// Callbacks run under the cell's lock and must not call back into it.
    pub fn bind<F>(&self, slot: impl Into<String>, render: F) -> DisplayId
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;

        if let Some(value) = inner.value {
            render(value);
        }
        inner.displays.push(Display {
            id,
            slot: slot.into(),
            render: Box::new(render),
        });
        id
    }

    /// Returns false if the display was not bound
    pub fn unbind(&self, id: DisplayId) -> bool {
        let mut inner = self.lock();
        let before = inner.displays.len();
        inner.displays.retain(|d| d.id != id);
        inner.displays.len() != before
    }

    /// Store a new value and render it into every bound display.
    ///
    /// A local-fallback value never replaces a remote one. Returns whether
    /// the value was applied.
    pub fn set(&self, value: u64, source: CountSource) -> bool {
        let mut inner = self.lock();

        if source == CountSource::LocalFallback
            && inner.source.map(CountSource::is_remote).unwrap_or(false)
        {
            return false;
        }

        inner.value = Some(value);
        inner.source = Some(source);
        for display in &inner.displays {
            (display.render)(value);
        }
        true
    }

    pub fn get(&self) -> Option<u64> {
        self.lock().value
    }

    pub fn source(&self) -> Option<CountSource> {
        self.lock().source
    }

    /// Bound slot names, in bind order
    pub fn slots(&self) -> Vec<String> {
        self.lock().displays.iter().map(|d| d.slot.clone()).collect()
    }

    pub fn display_count(&self) -> usize {
        self.lock().displays.len()
    }
}

/// Fetch the public count once and publish it. When the remote store is
/// unreachable the local fallback's record count is used instead.
pub async fn refresh(cell: &CounterCell, store: &dyn PledgeStore, fallback: &LocalPledgeLog) -> u64 {
    match store.fetch_public_count().await {
        Ok(count) => {
            cell.set(count, CountSource::Fetch);
            count
        }
        Err(e) => {
            warn!("Remote count unavailable, using local fallback: {}", e);
            let local = match fallback.count().await {
                Ok(n) => n as u64,
                Err(e) => {
                    warn!("Local fallback count unavailable: {}", e);
                    0
                }
            };
            cell.set(local, CountSource::LocalFallback);
            cell.get().unwrap_or(local)
        }
    }
}

/// Drive a counter cell from the store: one initial fetch racing the live
/// subscription. Runs until the store drops its publisher.
pub fn spawn_counter_sync(
    cell: Arc<CounterCell>,
    store: Arc<dyn PledgeStore>,
    fallback: Arc<LocalPledgeLog>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut subscription = store.subscribe_public_count();

        let initial = async {
            let count = refresh(&cell, store.as_ref(), &fallback).await;
            info!("Initial public count: {}", count);
        };
        let live = async {
            while let Some(count) = subscription.next().await {
                debug!("Live count update: {}", count);
                cell.set(count, CountSource::Subscription);
            }
        };

        tokio::join!(initial, live);
        info!("Live count subscription ended");
    })
}

/// Headless page model: every counter slot bound to one cell
pub struct CounterBoard {
    shown: Arc<Mutex<BTreeMap<&'static str, u64>>>,
}

impl CounterBoard {
    pub fn bind_all(cell: &CounterCell) -> Self {
        let shown = Arc::new(Mutex::new(BTreeMap::new()));
        for slot in COUNTER_SLOTS {
            let shown = shown.clone();
            cell.bind(slot, move |value| {
                let mut shown = shown.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                shown.insert(slot, value);
            });
        }
        Self { shown }
    }

    /// Value currently shown in a slot
    pub fn shown(&self, slot: &str) -> Option<u64> {
        self.snapshot().get(slot).copied()
    }

    pub fn snapshot(&self) -> BTreeMap<&'static str, u64> {
        self.shown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// True when every slot shows the same value
    pub fn consistent(&self) -> bool {
        let snapshot = self.snapshot();
        let mut values = snapshot.values();
        match values.next() {
            Some(first) => snapshot.len() == COUNTER_SLOTS.len() && values.all(|v| v == first),
            None => true,
        }
    }
}

/// A counter slot that counts up from zero the first time it is revealed.
///
/// Each slot carries its own latch: a second reveal, or a later change of
/// the count, never replays the animation.
#[derive(Debug)]
pub struct RevealedDisplay {
    slot: &'static str,
    duration: Duration,
    latch: RevealLatch,
}

impl RevealedDisplay {
    pub fn new(slot: &'static str, duration: Duration) -> Self {
        Self {
            slot,
            duration,
            latch: RevealLatch::new(),
        }
    }

    pub fn hero() -> Self {
        Self::new("hero-count", HERO_ANIMATION)
    }

    pub fn family() -> Self {
        Self::new("family-count", FAMILY_ANIMATION)
    }

    pub fn slot(&self) -> &'static str {
        self.slot
    }

    /// Report the slot's visible ratio.
    ///
    /// Returns the count-up to play, to the cell's current value, on the
    /// first reveal of at least half the element; None ever after.
    pub fn reveal(&mut self, ratio: f64, cell: &CounterCell) -> Option<CounterAnimation> {
        if !self.latch.observe(ratio) {
            return None;
        }
        let end = cell.get().unwrap_or(0);
        debug!("Counter {} revealed, counting up to {}", self.slot, end);
        Some(CounterAnimation::new(0, end, self.duration))
    }

    pub fn animated(&self) -> bool {
        self.latch.fired()
    }
}
