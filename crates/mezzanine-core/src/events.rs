//! Typed event kinds per component and a multicast observer list.
//!
//! Instead of a DOM-style `EventTarget`, each component exposes a typed sum
//! of its event kinds and a subscriber list per component. Events are
//! dispatched as tasks on the shared [`TaskQueue`](crate::task::TaskQueue),
//! so observers always see them after the state change that caused them.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::task::TaskQueue;

/// Events fired by a media source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSourceEvent {
    SourceOpen,
    SourceEnded,
    SourceClose,
}

/// Events fired by a source buffer's update lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceBufferEvent {
    UpdateStart,
    Update,
    UpdateEnd,
    Error,
    Abort,
}

/// Events fired by the media element, named after their HTML counterparts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaElementEvent {
    Emptied,
    LoadedMetadata,
    LoadedData,
    CanPlay,
    CanPlayThrough,
    Play,
    Playing,
    Waiting,
    Pause,
    RateChange,
    VolumeChange,
    Seeking,
    Seeked,
    TimeUpdate,
    DurationChange,
    Progress,
    Resize,
    Ended,
    Error,
}

type Handler<E> = Box<dyn FnMut(E) + Send>;

/// A multicast list of observers for one component's events.
pub struct Observers<E> {
    handlers: Mutex<Vec<Handler<E>>>,
}

impl<E: Copy> Observers<E> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handlers: Mutex::new(Vec::new()),
        })
    }

    /// Registers an observer for every event of this component.
    pub fn subscribe(&self, handler: impl FnMut(E) + Send + 'static) {
        self.handlers.lock().push(Box::new(handler));
    }

    /// Invokes every observer with `event`.
    ///
    /// Handlers are taken out of the list while they run so an observer may
    /// subscribe further observers; those start receiving the next event.
    pub fn notify(&self, event: E) {
        let mut handlers = std::mem::take(&mut *self.handlers.lock());
        for handler in handlers.iter_mut() {
            handler(event);
        }
        let mut guard = self.handlers.lock();
        let added = std::mem::take(&mut *guard);
        *guard = handlers;
        guard.extend(added);
    }
}

/// Queues `event` for dispatch to `observers` as a task.
pub fn queue_event<E: Copy + Send + 'static>(
    tasks: &TaskQueue,
    observers: &Arc<Observers<E>>,
    event: E,
) {
    let observers = Arc::clone(observers);
    tasks.queue(move || observers.notify(event));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multicast_notify() {
        let observers: Arc<Observers<SourceBufferEvent>> = Observers::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..2 {
            let seen = Arc::clone(&seen);
            observers.subscribe(move |e| seen.lock().push(e));
        }
        observers.notify(SourceBufferEvent::UpdateStart);
        assert_eq!(
            *seen.lock(),
            vec![
                SourceBufferEvent::UpdateStart,
                SourceBufferEvent::UpdateStart
            ]
        );
    }

    #[test]
    fn test_queued_events_dispatch_in_order() {
        let tasks = TaskQueue::new();
        let observers: Arc<Observers<SourceBufferEvent>> = Observers::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        observers.subscribe(move |e| sink.lock().push(e));

        queue_event(&tasks, &observers, SourceBufferEvent::UpdateStart);
        queue_event(&tasks, &observers, SourceBufferEvent::Update);
        queue_event(&tasks, &observers, SourceBufferEvent::UpdateEnd);
        assert!(seen.lock().is_empty());

        tasks.run();
        assert_eq!(
            *seen.lock(),
            vec![
                SourceBufferEvent::UpdateStart,
                SourceBufferEvent::Update,
                SourceBufferEvent::UpdateEnd
            ]
        );
    }
}
