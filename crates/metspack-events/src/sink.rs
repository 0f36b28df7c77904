use std::{
    path::PathBuf,
    sync::{
        mpsc::{self, Receiver, Sender},
        Mutex,
    },
};

use crate::{PackEvent, SkipReason};

/// Consumer of packaging events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PackEvent);
}

/// Forwards events over an mpsc channel; a dropped receiver is ignored.
pub struct ChannelSink {
    sender: Sender<PackEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<PackEvent>) {
        let (sender, receiver) = mpsc::channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: PackEvent) {
        let _ = self.sender.send(event);
    }
}

pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: PackEvent) {}
}

/// Records a run's events so callers can report on it afterwards.
#[derive(Default)]
pub struct CollectorSink {
    events: Mutex<Vec<PackEvent>>,
}

impl CollectorSink {
    pub fn events(&self) -> Vec<PackEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every skipped package with its reason, in emission order.
    pub fn skips(&self) -> Vec<(PathBuf, SkipReason)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                PackEvent::Skipped { package, reason } => Some((package.clone(), reason.clone())),
                _ => None,
            })
            .collect()
    }

    /// Last reported `(completed, skipped)` counters of a recursive run.
    pub fn progress(&self) -> Option<(u32, u32)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|event| match event {
                PackEvent::BatchProgress { completed, skipped } => Some((*completed, *skipped)),
                _ => None,
            })
    }
}

impl EventSink for CollectorSink {
    fn emit(&self, event: PackEvent) {
        self.events.lock().unwrap().push(event);
    }
}
