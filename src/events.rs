//! Per-category event buses
//!
//! Each category of notification (previews, completed bundles, server
//! errors, pose changes, playback) gets its own `EventBus`. Subscribing
//! returns a `Subscription` token that removes the listener again.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};

use crate::aggregator::CompleteBundle;
use crate::avatar::PoseState;
use crate::protocol::{FastPreview, ServerError};

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Listeners<E> {
    next_id: u64,
    entries: Vec<(u64, Listener<E>)>,
}

/// Synchronous fan-out of events of one type to registered callbacks
pub struct EventBus<E> {
    inner: Arc<Mutex<Listeners<E>>>,
}

impl<E: 'static> EventBus<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Listeners {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register a callback. Keep the returned token to unsubscribe later.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.entries.push((id, Arc::new(callback)));
            id
        };

        let weak: Weak<Mutex<Listeners<E>>> = Arc::downgrade(&self.inner);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.lock().entries.retain(|(entry_id, _)| *entry_id != id);
                }
            })),
        }
    }

    /// Deliver an event to every current listener.
    ///
    /// Listeners are called outside the lock, so a callback may subscribe or
    /// unsubscribe without deadlocking.
    pub fn emit(&self, event: &E) {
        let listeners: Vec<Listener<E>> = {
            let inner = self.inner.lock();
            inner.entries.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }
}

impl<E: 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Unsubscribe token returned by `EventBus::subscribe`
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

/// Pose change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoseChange {
    pub from: PoseState,
    pub to: PoseState,
}

/// Timeline playback notifications
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Started {
        correlation_id: Option<String>,
    },
    Progress {
        elapsed_secs: f64,
        duration_secs: Option<f64>,
    },
    Ended {
        correlation_id: Option<String>,
    },
    Failed {
        correlation_id: Option<String>,
        message: String,
    },
}

/// All buses exposed by one avatar session
#[derive(Default)]
pub struct AvatarEvents {
    pub fast_preview: EventBus<FastPreview>,
    pub bundle_complete: EventBus<CompleteBundle>,
    pub server_error: EventBus<ServerError>,
    pub pose: EventBus<PoseChange>,
    pub playback: EventBus<PlaybackEvent>,
}
