use std::collections::BTreeSet;

use takt_types::{ImportSignal, ScenarioId};

use super::events::DispatchEvent;
use crate::error::TransmissionError;

/// Tracks one in-flight import run.
///
/// Completion is published only once every scenario named in `Started` has
/// acknowledged and the source has sent `Completed`, in whichever order those
/// arrive.
#[derive(Debug, Default)]
pub struct ImportTracker {
    in_progress: bool,
    pending: BTreeSet<ScenarioId>,
    source_completed: bool,
}

impl ImportTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    /// Scenarios that have not acknowledged the current run.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn try_complete(&mut self, effects: &mut Vec<DispatchEvent>) {
        if self.in_progress && self.source_completed && self.pending.is_empty() {
            log::info!(target: "dispatch", "import completed");
            self.reset();
            effects.push(DispatchEvent::ImportCompleted);
        }
    }
}

pub(super) fn dispatch_import_signal(
    signal: &ImportSignal,
    tracker: &mut ImportTracker,
    effects: &mut Vec<DispatchEvent>,
) -> Result<(), TransmissionError> {
    match signal {
        ImportSignal::Started { scenarios } => {
            if tracker.in_progress {
                log::warn!(
                    target: "dispatch",
                    "import started while another was in flight ({} scenarios pending); restarting",
                    tracker.pending.len()
                );
            }
            tracker.reset();
            tracker.in_progress = true;
            tracker.pending = scenarios.iter().copied().collect();
            log::info!(target: "dispatch", "import started for {} scenarios", tracker.pending.len());
        }
        ImportSignal::ScenarioFinished(id) => {
            if !tracker.in_progress {
                return Err(TransmissionError::Validation(format!(
                    "scenario {} finished an import but none is in progress",
                    id
                )));
            }
            if !tracker.pending.remove(id) {
                log::debug!(target: "dispatch", "scenario {} acknowledged import twice or was not listed", id);
            }
        }
        ImportSignal::Completed => {
            if !tracker.in_progress {
                return Err(TransmissionError::Validation(
                    "import completed but none is in progress".into(),
                ));
            }
            tracker.source_completed = true;
        }
    }
    tracker.try_complete(effects);
    Ok(())
}
