// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory event log.

use crate::{EventLog, EventLogError, EventStream};
use std::collections::HashMap;
use std::sync::Mutex;
use tp_core::{ArtifactEvent, InputEvent, Revision};

#[derive(Debug, Default)]
struct MovieEvents {
    inputs: Vec<InputEvent>,
    artefacts: Vec<ArtifactEvent>,
}

/// Mutex-serialized event log. Test backend.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    movies: Mutex<HashMap<String, MovieEvents>>,
}

impl MemoryEventLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of input events recorded for a movie.
    #[must_use]
    pub fn input_count(&self, movie: &str) -> usize {
        self.movies
            .lock()
            .expect("event map lock poisoned")
            .get(movie)
            .map_or(0, |m| m.inputs.len())
    }

    /// Number of artefact events recorded for a movie.
    #[must_use]
    pub fn artefact_count(&self, movie: &str) -> usize {
        self.movies
            .lock()
            .expect("event map lock poisoned")
            .get(movie)
            .map_or(0, |m| m.artefacts.len())
    }
}

impl EventLog for MemoryEventLog {
    fn append_input(&self, movie: &str, event: &InputEvent) -> Result<(), EventLogError> {
        self.movies
            .lock()
            .expect("event map lock poisoned")
            .entry(movie.to_string())
            .or_default()
            .inputs
            .push(event.clone());
        Ok(())
    }

    fn append_artefact(&self, movie: &str, event: &ArtifactEvent) -> Result<(), EventLogError> {
        self.movies
            .lock()
            .expect("event map lock poisoned")
            .entry(movie.to_string())
            .or_default()
            .artefacts
            .push(event.clone());
        Ok(())
    }

    fn stream_inputs(
        &self,
        movie: &str,
        after: Option<Revision>,
    ) -> Result<EventStream<InputEvent>, EventLogError> {
        let snapshot: Vec<InputEvent> = self
            .movies
            .lock()
            .expect("event map lock poisoned")
            .get(movie)
            .map(|m| m.inputs.clone())
            .unwrap_or_default();
        Ok(Box::new(
            snapshot
                .into_iter()
                .filter(move |e| after.is_none_or(|a| e.revision > a))
                .map(Ok),
        ))
    }

    fn stream_artefacts(
        &self,
        movie: &str,
        after: Option<Revision>,
    ) -> Result<EventStream<ArtifactEvent>, EventLogError> {
        let snapshot: Vec<ArtifactEvent> = self
            .movies
            .lock()
            .expect("event map lock poisoned")
            .get(movie)
            .map(|m| m.artefacts.clone())
            .unwrap_or_default();
        Ok(Box::new(
            snapshot
                .into_iter()
                .filter(move |e| after.is_none_or(|a| e.revision > a))
                .map(Ok),
        ))
    }
}
