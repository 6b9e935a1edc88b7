//! Shared fixtures for strategy and orchestrator tests

use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::sync::{Arc, Mutex};

use super::{StrategyContext, SyncLogRecorder};
use crate::adapter::{ChannelAdapter, FetchResult};
use crate::clock::{Clock, ManualClock};
use crate::config::SyncConfig;
use crate::models::{Channel, RawMessage, SyncRun};
use crate::storage::{InMemorySyncStore, SyncStore};

pub(crate) fn message(id: &str) -> RawMessage {
    RawMessage::new(id, json!({ "id": id, "body": format!("Body for {id}") }))
}

/// What a scripted adapter call does
#[derive(Clone)]
enum Script {
    Respond(FetchResult),
    Fault(String),
}

impl Script {
    fn run(&self) -> Result<FetchResult> {
        match self {
            Self::Respond(result) => Ok(result.clone()),
            Self::Fault(message) => Err(anyhow!(message.clone())),
        }
    }
}

/// Adapter answering every call with a fixed response
///
/// Unscripted calls fail. Optionally advances a manual clock on each call to
/// simulate a slow provider.
pub(crate) struct ScriptedAdapter {
    receive: Option<Script>,
    history: Option<Script>,
    latency: Option<(Arc<ManualClock>, Duration)>,
    since_calls: Mutex<Vec<Option<DateTime<Utc>>>>,
    cursor_calls: Mutex<Vec<String>>,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self {
            receive: None,
            history: None,
            latency: None,
            since_calls: Mutex::new(Vec::new()),
            cursor_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on_receive(mut self, result: FetchResult) -> Self {
        self.receive = Some(Script::Respond(result));
        self
    }

    pub fn on_history(mut self, result: FetchResult) -> Self {
        self.history = Some(Script::Respond(result));
        self
    }

    pub fn history_fault(mut self, message: &str) -> Self {
        self.history = Some(Script::Fault(message.to_string()));
        self
    }

    pub fn taking(mut self, clock: Arc<ManualClock>, latency: Duration) -> Self {
        self.latency = Some((clock, latency));
        self
    }

    pub fn since_calls(&self) -> Vec<Option<DateTime<Utc>>> {
        self.since_calls.lock().unwrap().clone()
    }

    pub fn cursor_calls(&self) -> Vec<String> {
        self.cursor_calls.lock().unwrap().clone()
    }

    fn respond(&self, script: &Option<Script>) -> Result<FetchResult> {
        if let Some((clock, latency)) = &self.latency {
            clock.advance(*latency);
        }
        match script {
            Some(script) => script.run(),
            None => Ok(FetchResult::failure("not scripted")),
        }
    }
}

impl ChannelAdapter for ScriptedAdapter {
    fn receive_messages(&self, since: Option<DateTime<Utc>>) -> Result<FetchResult> {
        self.since_calls.lock().unwrap().push(since);
        self.respond(&self.receive)
    }

    fn receive_messages_via_history(&self, cursor: &str) -> Result<FetchResult> {
        self.cursor_calls.lock().unwrap().push(cursor.to_string());
        self.respond(&self.history)
    }
}

/// In-memory store, manual clock and recorder wired together
pub(crate) struct Harness {
    pub store: Arc<InMemorySyncStore>,
    pub clock: Arc<ManualClock>,
    pub recorder: SyncLogRecorder,
    pub config: SyncConfig,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemorySyncStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let recorder = SyncLogRecorder::new(store.clone(), clock.clone());
        Self {
            store,
            clock,
            recorder,
            config: SyncConfig::default(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Insert a channel and return it as stored
    pub fn channel(&self, channel: Channel) -> Channel {
        let id = self.store.insert_channel(channel).unwrap();
        self.store.get_channel(id).unwrap().unwrap()
    }

    pub fn open_run(&self, channel: &Channel) -> SyncRun {
        self.recorder.start(channel.id).unwrap()
    }

    pub fn ctx(&self) -> StrategyContext<'_> {
        StrategyContext {
            store: self.store.as_ref(),
            gateway: self.store.as_ref(),
            recorder: &self.recorder,
            clock: self.clock.as_ref(),
            config: &self.config,
        }
    }
}
