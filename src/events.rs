// Copyright 2026 The jitopt developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

//! Change tracking and diagnostics for optimization passes.
//!
//! Passes record structured [`Event`]s into an [`EventLog`] instead of
//! printing. Callers inspect the log to learn what a pass did, assert on it
//! in tests, or merge per-method logs into a pipeline-wide one.

/// The kind of change or decision an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The pass was disabled by configuration and did nothing.
    PassDisabled,
    /// No duplicated eligible expression was found; nothing to do.
    NoCandidates,
    /// Promotion was abandoned because no temporary could be allocated.
    OutOfTemps,
    /// A candidate was promoted into a temporary.
    CandidatePromoted,
    /// A candidate was evaluated and rejected as unprofitable.
    CandidateRejected,
    /// A candidate was skipped (zero surviving uses or filtered out).
    CandidateSkipped,
}

/// A single recorded event.
#[derive(Debug, Clone)]
pub struct Event {
    kind: EventKind,
    message: Option<String>,
}

impl Event {
    /// The kind of this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// The optional human-readable detail attached to this event.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// An append-only log of events recorded by a pass.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new event and returns a builder for attaching detail.
    pub fn record(&mut self, kind: EventKind) -> EventBuilder<'_> {
        self.events.push(Event {
            kind,
            message: None,
        });
        EventBuilder { log: self }
    }

    /// Returns `true` if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns all recorded events in order.
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Returns the number of events of the given kind.
    #[must_use]
    pub fn count_of(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    /// Appends all events from `other`.
    pub fn merge(&mut self, other: EventLog) {
        self.events.extend(other.events);
    }
}

/// Builder returned by [`EventLog::record`] for attaching detail to the
/// just-recorded event.
pub struct EventBuilder<'a> {
    log: &'a mut EventLog,
}

impl EventBuilder<'_> {
    /// Attaches a human-readable message to the event.
    pub fn message(self, message: impl Into<String>) -> Self {
        if let Some(event) = self.log.events.last_mut() {
            event.message = Some(message.into());
        }
        self
    }
}
