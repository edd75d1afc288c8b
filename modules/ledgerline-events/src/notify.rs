//! In-process "event appended" fan-out.
//!
//! Best-effort and synchronous: listeners run in registration order after the
//! write is durable. A failing or panicking listener is logged and skipped.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::warn;

use crate::types::EventAppended;

pub type EventAppendedListener<E> =
    Arc<dyn Fn(&EventAppended<E>) -> anyhow::Result<()> + Send + Sync>;

pub struct EventAppendedNotifier<E> {
    listeners: RwLock<Vec<EventAppendedListener<E>>>,
}

impl<E> EventAppendedNotifier<E> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, listener: EventAppendedListener<E>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn notify(&self, notification: &EventAppended<E>) {
        // Snapshot the list so a listener may subscribe without deadlocking.
        let listeners: Vec<EventAppendedListener<E>> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(notification))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    error = %e,
                    entity_name = %notification.entity_name,
                    entity_id = %notification.entity_id,
                    "EventAppended listener failed (non-fatal)"
                ),
                Err(_) => warn!(
                    entity_name = %notification.entity_name,
                    entity_id = %notification.entity_id,
                    "EventAppended listener panicked (non-fatal)"
                ),
            }
        }
    }
}

impl<E> Default for EventAppendedNotifier<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn appended() -> EventAppended<u32> {
        EventAppended {
            entity_name: "Probe".into(),
            entity_id: "p-1".into(),
            events: vec![1, 2],
        }
    }

    #[test]
    fn every_listener_sees_the_notification() {
        let notifier = EventAppendedNotifier::new();
        let seen = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let seen = seen.clone();
            notifier.subscribe(Arc::new(move |n: &EventAppended<u32>| -> anyhow::Result<()> {
                seen.fetch_add(n.events.len(), Ordering::SeqCst);
                Ok(())
            }));
        }

        notifier.notify(&appended());
        assert_eq!(seen.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn failing_listeners_do_not_block_the_rest() {
        let notifier = EventAppendedNotifier::new();
        let seen = Arc::new(AtomicUsize::new(0));

        notifier.subscribe(Arc::new(|_: &EventAppended<u32>| -> anyhow::Result<()> {
            Err(anyhow::anyhow!("projection offline"))
        }));
        notifier.subscribe(Arc::new(|_: &EventAppended<u32>| -> anyhow::Result<()> {
            panic!("listener bug")
        }));
        let counter = seen.clone();
        notifier.subscribe(Arc::new(move |_: &EventAppended<u32>| -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        notifier.notify(&appended());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.listener_count(), 3);
    }
}
