use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// A single-threaded signal/slot fan-out list.
///
/// Every reactor-confined object (observable collections, nodes) exposes one
/// or more of these instead of a single callback, so an arbitrary number of
/// RPC subscriptions can listen to the same source without the source
/// knowing how many listeners it has. Subscriptions own a [`Connection`] and
/// disconnect deterministically on drop rather than relying on the emitter
/// to notice a dead listener.
pub struct Signal<Args> {
    listeners: Rc<RefCell<Vec<(u64, Box<dyn FnMut(&Args)>)>>>,
    next_id: RefCell<u64>,
}

impl<Args> Default for Signal<Args> {
    fn default() -> Self {
        Self {
            listeners: Rc::new(RefCell::new(Vec::new())),
            next_id: RefCell::new(0),
        }
    }
}

impl<Args> Signal<Args> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a slot, returning a guard that removes it again on drop.
    pub fn connect(&self, slot: impl FnMut(&Args) + 'static) -> Connection {
        let id = {
            let mut next = self.next_id.borrow_mut();
            let id = *next;
            *next += 1;
            id
        };
        self.listeners.borrow_mut().push((id, Box::new(slot)));
        let target: Weak<dyn Disconnect> = Rc::downgrade(&self.listeners);
        Connection { id, target }
    }

    /// Invoke every connected slot with `args`.
    ///
    /// Slots may connect new slots or drop their own `Connection` during
    /// emission without panicking: we pull the listener list out of the
    /// `RefCell` for the duration of the call (so a slot is free to borrow
    /// the signal again, e.g. to `connect` another listener) and merge
    /// anything added meanwhile back in afterward. A disconnect requested
    /// from inside a slot callback takes effect starting with the next
    /// `emit`, not the one in progress.
    pub fn emit(&self, args: Args) {
        let mut firing = std::mem::take(&mut *self.listeners.borrow_mut());
        for (_, slot) in firing.iter_mut() {
            slot(&args);
        }
        let mut added = self.listeners.borrow_mut();
        firing.append(&mut added);
        *added = firing;
    }

    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Type-erased disconnect target so [`Connection`] doesn't need to be
/// generic over a `Signal`'s `Args`.
trait Disconnect {
    fn disconnect(&self, id: u64);
}

impl<Args> Disconnect for RefCell<Vec<(u64, Box<dyn FnMut(&Args)>)>> {
    fn disconnect(&self, id: u64) {
        self.borrow_mut().retain(|(i, _)| *i != id);
    }
}

/// RAII handle for a [`Signal`] subscription. Dropping it disconnects the
/// slot; there is no other way to disconnect.
pub struct Connection {
    id: u64,
    target: Weak<dyn Disconnect>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(target) = self.target.upgrade() {
            target.disconnect(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_to_all_connected_slots() {
        let signal: Signal<i32> = Signal::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let a = seen.clone();
        let _c1 = signal.connect(move |v| a.borrow_mut().push(*v));
        let b = seen.clone();
        let _c2 = signal.connect(move |v| b.borrow_mut().push(*v * 10));

        signal.emit(3);
        assert_eq!(*seen.borrow(), vec![3, 30]);
    }

    #[test]
    fn drop_disconnects() {
        let signal: Signal<i32> = Signal::new();
        let seen = Rc::new(RefCell::new(0));
        let a = seen.clone();
        let conn = signal.connect(move |v| *a.borrow_mut() += v);
        signal.emit(1);
        drop(conn);
        signal.emit(1);
        assert_eq!(*seen.borrow(), 1);
    }
}
