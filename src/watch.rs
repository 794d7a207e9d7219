//! Change notification for state that renderers need to redraw from.

use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
};
use hashbrown::HashMap;
use std::rc::{Rc, Weak};

type Callback<T> = Rc<dyn Fn(&T)>;

struct Slots<T: ?Sized> {
	next_key: Cell<u64>,
	callbacks: RefCell<HashMap<u64, Callback<T>>>,
}

/// A set of callbacks invoked whenever a value changes.
///
/// Callbacks are called outside of any internal borrow, so they may register or drop watches
/// (including their own) while being notified.
pub struct Watchers<T: ?Sized>(Rc<Slots<T>>);
impl<T: ?Sized + 'static> Watchers<T> {
	#[must_use]
	pub fn new() -> Self {
		Self(Rc::new(Slots {
			next_key: Cell::new(0),
			callbacks: RefCell::new(HashMap::new()),
		}))
	}

	/// Registers `callback` until the returned [`Watch`] is dropped.
	#[must_use = "The callback is unregistered as soon as the `Watch` is dropped."]
	pub fn watch(&self, callback: impl Fn(&T) + 'static) -> Watch {
		let key = self.0.next_key.get();
		self.0.next_key.set(key + 1);
		self.0.callbacks.borrow_mut().insert(key, Rc::new(callback));

		let slots: Weak<Slots<T>> = Rc::downgrade(&self.0);
		Watch(Some(Box::new(move || {
			if let Some(slots) = slots.upgrade() {
				slots.callbacks.borrow_mut().remove(&key);
			}
		})))
	}

	pub fn notify(&self, value: &T) {
		let callbacks: Vec<Callback<T>> = self.0.callbacks.borrow().values().cloned().collect();
		for callback in callbacks {
			callback(value);
		}
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.callbacks.borrow().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn clear(&self) {
		self.0.callbacks.borrow_mut().clear();
	}
}
impl<T: ?Sized + 'static> Default for Watchers<T> {
	fn default() -> Self {
		Self::new()
	}
}
impl<T: ?Sized> Debug for Watchers<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Watchers").field("len", &self.0.callbacks.borrow().len()).finish()
	}
}

/// Unregisters its callback when dropped.
pub struct Watch(Option<Box<dyn FnOnce()>>);
impl Watch {
	/// Keeps the callback registered for as long as the watched value lives.
	pub fn forget(mut self) {
		self.0 = None;
	}
}
impl Drop for Watch {
	fn drop(&mut self) {
		if let Some(unregister) = self.0.take() {
			unregister()
		}
	}
}
impl Debug for Watch {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Watch").field(&self.0.is_some()).finish()
	}
}
