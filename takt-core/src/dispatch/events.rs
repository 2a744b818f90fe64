//! Synchronous, ordered fan-out of dispatch events.
//!
//! Listeners run on the dispatching thread, after the mutation that produced
//! the event and before the next transmission is applied. Consumers that need
//! async delivery subscribe a channel instead.

use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;

use takt_types::{DispatchOutcome, LicenseStatus, ScenarioId};

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    /// Published last for every transmission that reached classification.
    TransmissionProcessed {
        number: u64,
        unique_id: u16,
        outcome: DispatchOutcome,
    },
    ScenarioChanged { scenario: ScenarioId },
    ScenarioDeleted { scenario: ScenarioId },
    UsersChanged,
    SettingsChanged,
    /// Every scenario acknowledged the import and the source signalled
    /// completion.
    ImportCompleted,
    SystemStateSwitched {
        read_only: bool,
        status: LicenseStatus,
        reason: String,
    },
    /// Non-fatal license drift. Broadcast once until the condition clears.
    LicenseWarning { message: String },
}

type Listener = Box<dyn Fn(&DispatchEvent) + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Listener>>,
    channels: RwLock<Vec<Sender<DispatchEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. It must not subscribe from inside a callback.
    pub fn subscribe(&self, listener: impl Fn(&DispatchEvent) + Send + Sync + 'static) {
        self.listeners.write().push(Box::new(listener));
    }

    /// Fire-and-forget subscription: events are queued on an unbounded
    /// channel. Dropping the receiver unsubscribes.
    pub fn subscribe_channel(&self) -> Receiver<DispatchEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.channels.write().push(tx);
        rx
    }

    pub fn publish(&self, event: &DispatchEvent) {
        log::trace!(target: "dispatch", "event {:?}", event);
        for listener in self.listeners.read().iter() {
            listener(event);
        }
        self.channels
            .write()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len() + self.channels.read().len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
