use std::sync::{Arc, Mutex};

use super::models::PortEvent;
use crate::util::lock;

/// Something that wants to hear about a [`PortEvent`]
pub trait Notifier: Send + Sync {
    fn notify(&self);
}

impl<F> Notifier for F
where
    F: Fn() + Send + Sync,
{
    fn notify(&self) {
        self()
    }
}

/// Subscription handle. Two handles are the same subscription only when they
/// share one allocation; equal closures are still distinct.
pub type Callback = Arc<dyn Notifier>;

/// Wrap a closure into a [`Callback`]
pub fn callback<F>(f: F) -> Callback
where
    F: Fn() + Send + Sync + 'static,
{
    Arc::new(f)
}

fn same_handle(a: &Callback, b: &Callback) -> bool {
    // Compare data pointers only; vtable pointers are not guaranteed unique.
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

#[derive(Default)]
struct Subscribers {
    rx_data: Vec<Callback>,
    shutdown: Vec<Callback>,
}

impl Subscribers {
    fn for_event(&mut self, event: PortEvent) -> &mut Vec<Callback> {
        match event {
            PortEvent::RxData => &mut self.rx_data,
            PortEvent::Shutdown => &mut self.shutdown,
        }
    }
}

/// Per-event subscriber sets behind a single lock.
///
/// Callbacks run with the lock held, so a callback must not subscribe or
/// unsubscribe on the registry that is invoking it.
#[derive(Default)]
pub struct CallbackRegistry {
    subscribers: Mutex<Subscribers>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `callback` unless that exact handle is already subscribed.
    /// Returns whether it was added.
    pub fn subscribe(&self, event: PortEvent, callback: Callback) -> bool {
        let mut subscribers = lock(&self.subscribers);
        let list = subscribers.for_event(event);
        if list.iter().any(|existing| same_handle(existing, &callback)) {
            return false;
        }
        list.push(callback);
        true
    }

    /// Remove one subscription matching `callback`. Returns whether one was found.
    pub fn unsubscribe(&self, event: PortEvent, callback: &Callback) -> bool {
        let mut subscribers = lock(&self.subscribers);
        let list = subscribers.for_event(event);
        match list.iter().position(|existing| same_handle(existing, callback)) {
            Some(index) => {
                list.remove(index);
                true
            }
            None => false,
        }
    }

    /// Invoke every subscriber of `event` in subscription order
    pub fn notify(&self, event: PortEvent) {
        let mut subscribers = lock(&self.subscribers);
        for callback in subscribers.for_event(event).iter() {
            callback.notify();
        }
    }

    pub fn count(&self, event: PortEvent) -> usize {
        lock(&self.subscribers).for_event(event).len()
    }
}
