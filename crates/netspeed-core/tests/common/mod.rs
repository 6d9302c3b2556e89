#![allow(clippy::unwrap_used, dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use netspeed_core::{
    Configuration, CounterError, CounterFactory, CounterSource, IndicatorContent, MemoryStore,
    PreferenceStore, Renderer, ServiceHost, ThroughputSample,
};
use tokio::time::Instant;

// ── Counter fixture ──────────────────────────────────────────────

#[derive(Debug, Default)]
struct LinkState {
    rx_per_sec: u64,
    tx_per_sec: u64,
    rx_total: u64,
    tx_total: u64,
    last: Option<Instant>,
    failing: bool,
    reads: usize,
}

/// Simulated link: counters grow at a settable rate in tokio time.
#[derive(Debug, Clone, Default)]
pub struct FakeLink {
    state: Arc<Mutex<LinkState>>,
}

impl FakeLink {
    pub fn new(rx_per_sec: u64, tx_per_sec: u64) -> Self {
        let link = Self::default();
        link.set_rate(rx_per_sec, tx_per_sec);
        link
    }

    pub fn set_rate(&self, rx_per_sec: u64, tx_per_sec: u64) {
        let mut state = self.state.lock().unwrap();
        advance(&mut state);
        state.rx_per_sec = rx_per_sec;
        state.tx_per_sec = tx_per_sec;
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    pub fn reads(&self) -> usize {
        self.state.lock().unwrap().reads
    }

    pub fn factory(&self) -> CounterFactory {
        let link = self.clone();
        Arc::new(move || Box::new(link.clone()) as Box<dyn CounterSource>)
    }
}

fn advance(state: &mut LinkState) {
    let now = Instant::now();
    if let Some(last) = state.last {
        let ms = u64::try_from(now.duration_since(last).as_millis()).unwrap();
        state.rx_total += state.rx_per_sec * ms / 1000;
        state.tx_total += state.tx_per_sec * ms / 1000;
    }
    state.last = Some(now);
}

impl CounterSource for FakeLink {
    fn read(&mut self) -> Result<ThroughputSample, CounterError> {
        let mut state = self.state.lock().unwrap();
        advance(&mut state);
        if state.failing {
            return Err(CounterError::Unavailable("link down".into()));
        }
        state.reads += 1;
        Ok(ThroughputSample::new(
            state.rx_total,
            state.tx_total,
            state.last.unwrap(),
        ))
    }
}

// ── Renderer fixture ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Publish(IndicatorContent),
    Cancel,
    Foreground(IndicatorContent),
}

impl Call {
    pub fn content(&self) -> Option<&IndicatorContent> {
        match self {
            Call::Publish(c) | Call::Foreground(c) => Some(c),
            Call::Cancel => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingRenderer {
    calls: Mutex<Vec<Call>>,
}

impl RecordingRenderer {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<Call> {
        self.calls.lock().unwrap().last().cloned()
    }

    pub fn cancels(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Cancel))
            .count()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl Renderer for RecordingRenderer {
    fn publish(&self, _id: u32, content: &IndicatorContent) {
        self.calls.lock().unwrap().push(Call::Publish(content.clone()));
    }

    fn cancel(&self, _id: u32) {
        self.calls.lock().unwrap().push(Call::Cancel);
    }

    fn publish_foreground(&self, _id: u32, content: &IndicatorContent) {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Foreground(content.clone()));
    }
}

// ── Harness ──────────────────────────────────────────────────────

pub struct Harness {
    pub host: ServiceHost,
    pub link: FakeLink,
    pub renderer: Arc<RecordingRenderer>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    pub fn new(configuration: Configuration, link: FakeLink) -> Self {
        let renderer = Arc::new(RecordingRenderer::default());
        let store = Arc::new(MemoryStore::new(true, configuration));
        let host = ServiceHost::new(
            store.clone() as Arc<dyn PreferenceStore>,
            link.factory(),
            renderer.clone(),
        );
        Self {
            host,
            link,
            renderer,
            store,
        }
    }
}

/// Let spawned tasks run to quiescence without moving the clock much.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn with_threshold(hide_threshold: u64) -> Configuration {
    Configuration {
        hide_threshold,
        ..Configuration::default()
    }
}
