//=========================================================================
// Mode Event Queue
//=========================================================================
//
// Queue for mode activation/deactivation requests.
//
// Scopes queue events here during a frame. The scheduler drains the
// queue at tick boundaries and applies events in FIFO order against its
// registered/active sets.
//
//=========================================================================

//=== Internal Dependencies ===============================================

use crate::core::context::PropertyBag;

//=== Mode Event ==========================================================

/// A deferred activation or deactivation request.
#[derive(Debug)]
pub enum ModeEvent {
    /// Bring `target` into the active set, constructing it.
    Activate {
        target: String,
        sender: Option<String>,
        args: PropertyBag,
    },

    /// Remove `target` from the active set, deconstructing it.
    Deactivate { target: String },
}

impl ModeEvent {
    /// The mode name this event applies to.
    pub fn target(&self) -> &str {
        match self {
            ModeEvent::Activate { target, .. } => target,
            ModeEvent::Deactivate { target } => target,
        }
    }
}

//=== Mode Event Queue ====================================================

/// FIFO queue of mode events.
///
/// Scopes queue events here during updates. The scheduler processes the
/// queue at tick boundaries.
pub struct ModeEventQueue {
    queue: Vec<ModeEvent>,
}

impl ModeEventQueue {
    /// Creates a new empty event queue.
    pub fn new() -> Self {
        Self { queue: Vec::new() }
    }

    /// Queues an event to be processed at the next tick boundary.
    pub fn push(&mut self, event: ModeEvent) {
        self.queue.push(event);
    }

    /// Queues an activation request.
    pub fn push_activate(&mut self, sender: Option<String>, target: &str, args: PropertyBag) {
        self.queue.push(ModeEvent::Activate {
            target: target.to_string(),
            sender,
            args,
        });
    }

    /// Queues a deactivation request.
    pub fn push_deactivate(&mut self, target: &str) {
        self.queue.push(ModeEvent::Deactivate {
            target: target.to_string(),
        });
    }

    /// Returns an iterator over the queued events.
    pub fn iter(&self) -> impl Iterator<Item = &ModeEvent> {
        self.queue.iter()
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns the number of queued events.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Clears all queued events.
    pub fn clear(&mut self) {
        self.queue.clear()
    }

    /// Takes all events from the queue, leaving it empty.
    pub fn take(&mut self) -> Vec<ModeEvent> {
        std::mem::take(&mut self.queue)
    }
}

impl Default for ModeEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

//=========================================================================
// Tests
//=========================================================================
