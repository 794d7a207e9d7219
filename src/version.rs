//! The version clock and the single merge rule through which every write to an island's state goes.
//!
//! # Ordering
//!
//! Remote candidates (stream pushes and request responses) are only accepted if their version is
//! **strictly** greater than the current one. Equal versions are discarded even if their props
//! differ, so a form response and a live update racing at the same version never overwrite each
//! other's accepted data.

use crate::{
	describe,
	watch::{Watch, Watchers},
	Props,
};
use core::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, trace};

/// An island state's version tag. Higher always wins.
pub type Version = u64;

/// Computes the accepted props of a live update from `(candidate, previous)`.
pub type Reconcile = Rc<dyn Fn(Props, &Props) -> Props>;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct IslandState {
	pub props: Props,
	pub version: Version,
}
impl IslandState {
	#[must_use]
	pub fn new(props: Props, version: Version) -> Self {
		Self { props, version }
	}

	/// The version a pushed candidate is treated as carrying.
	///
	/// Unversioned (legacy or partial) pushes always count as newer.
	#[must_use]
	pub fn stream_version(&self, candidate: Option<Version>) -> Version {
		candidate.unwrap_or_else(|| self.version.saturating_add(1))
	}

	/// Whether a candidate carrying `version` is no newer than this state.
	#[must_use]
	pub fn is_stale(&self, version: Version) -> bool {
		version <= self.version
	}
}

/// The outcome of offering a candidate to a [`StateCell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
	Accepted { version: Version },
	/// The candidate's version was not strictly greater than the current one.
	Stale { current: Version, candidate: Version },
	/// The owning island was torn down.
	Released,
}
impl Merge {
	#[must_use]
	pub fn is_accepted(self) -> bool {
		matches!(self, Merge::Accepted { .. })
	}
}

struct Inner {
	state: RefCell<IslandState>,
	released: Cell<bool>,
	watchers: Watchers<IslandState>,
}

/// An island's single shared `{props, version}` cell.
///
/// Cloning the cell yields another handle to the same state.
/// All writers go through the merge methods here, so [`IslandState::version`] never decreases.
///
/// Once [released](`StateCell::release`), every write is ignored.
#[derive(Clone)]
pub struct StateCell(Rc<Inner>);
impl StateCell {
	#[must_use]
	pub fn new(initial: IslandState) -> Self {
		Self(Rc::new(Inner {
			state: RefCell::new(initial),
			released: Cell::new(false),
			watchers: Watchers::new(),
		}))
	}

	#[must_use]
	pub fn get(&self) -> IslandState {
		self.0.state.borrow().clone()
	}

	#[must_use]
	pub fn props(&self) -> Props {
		self.0.state.borrow().props.clone()
	}

	#[must_use]
	pub fn version(&self) -> Version {
		self.0.state.borrow().version
	}

	/// Reads the current state without cloning it.
	pub fn with<R>(&self, f: impl FnOnce(&IslandState) -> R) -> R {
		f(&self.0.state.borrow())
	}

	/// Local, user-initiated edit: replaces the props without a version check and keeps the version.
	///
	/// Returns `false` if the cell was released.
	pub fn set_props(&self, next: Props) -> bool {
		if self.is_released() {
			return false;
		}
		let version = self.version();
		self.replace(IslandState::new(next, version));
		true
	}

	/// Merges a pushed live update.
	///
	/// A missing `version` counts as `current + 1`.
	/// If `reconcile` is given, it computes the accepted props from `(candidate, previous)`.
	/// It is only consulted once the version test has passed.
	pub fn merge_stream(&self, props: Props, version: Option<Version>, reconcile: Option<&Reconcile>) -> Merge {
		if self.is_released() {
			return Merge::Released;
		}

		let (candidate, current, stale) = self.with(|state| {
			let candidate = state.stream_version(version);
			(candidate, state.version, state.is_stale(candidate))
		});
		if stale {
			trace!(current, candidate, "Discarded stale live update.");
			return Merge::Stale { current, candidate };
		}

		let props = match reconcile {
			Some(reconcile) => {
				let previous = self.props();
				reconcile(props, &previous)
			}
			None => props,
		};
		debug!(version = candidate, props = %describe(&props), "Accepted live update.");
		self.replace(IslandState::new(props, candidate));
		Merge::Accepted { version: candidate }
	}

	/// Merges the props of an authoritative request response.
	///
	/// Unlike pushed updates, a response without `version` replaces the props but leaves the version unchanged.
	pub fn merge_response(&self, props: Props, version: Option<Version>) -> Merge {
		if self.is_released() {
			return Merge::Released;
		}

		let current = self.version();
		let next = match version {
			Some(candidate) if self.with(|state| state.is_stale(candidate)) => {
				trace!(current, candidate, "Discarded stale response.");
				return Merge::Stale { current, candidate };
			}
			Some(candidate) => candidate,
			None => current,
		};
		debug!(version = next, props = %describe(&props), "Accepted response.");
		self.replace(IslandState::new(props, next));
		Merge::Accepted { version: next }
	}

	/// Calls `callback` with the new state after every accepted write.
	#[must_use = "The callback is unregistered as soon as the `Watch` is dropped."]
	pub fn watch(&self, callback: impl Fn(&IslandState) + 'static) -> Watch {
		self.0.watchers.watch(callback)
	}

	/// Stops all further writes and drops all watchers.
	pub fn release(&self) {
		self.0.released.set(true);
		self.0.watchers.clear();
	}

	#[must_use]
	pub fn is_released(&self) -> bool {
		self.0.released.get()
	}

	fn replace(&self, next: IslandState) {
		*self.0.state.borrow_mut() = next.clone();
		self.0.watchers.notify(&next);
	}
}
impl core::fmt::Debug for StateCell {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("StateCell")
			.field("version", &self.version())
			.field("released", &self.is_released())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::{IslandState, Merge, Reconcile, StateCell};
	use crate::Props;
	use core::cell::Cell;
	use serde_json::json;
	use std::rc::Rc;

	fn props(value: serde_json::Value) -> Props {
		match value {
			serde_json::Value::Object(map) => map,
			_ => unreachable!(),
		}
	}

	fn cell(count: u64, version: u64) -> StateCell {
		StateCell::new(IslandState::new(props(json!({ "count": count })), version))
	}

	#[test]
	fn newer_live_update_wins_and_equal_version_is_stale() {
		let cell = cell(1, 1);

		assert_eq!(cell.merge_stream(props(json!({"count": 2})), Some(2), None), Merge::Accepted { version: 2 });
		assert_eq!(cell.merge_stream(props(json!({"count": 3})), Some(2), None), Merge::Stale { current: 2, candidate: 2 });

		assert_eq!(cell.props()["count"], 2);
		assert_eq!(cell.version(), 2);
	}

	#[test]
	fn older_candidates_never_change_props() {
		let cell = cell(5, 5);

		for version in 0..=5 {
			assert!(!cell.merge_stream(props(json!({"count": 0})), Some(version), None).is_accepted());
			assert!(!cell.merge_response(props(json!({"count": 0})), Some(version)).is_accepted());
		}

		assert_eq!(cell.get(), IslandState::new(props(json!({"count": 5})), 5));
	}

	#[test]
	fn version_is_non_decreasing_over_mixed_writes() {
		let cell = cell(0, 0);
		let mut last = cell.version();

		let writes: [(bool, Option<u64>); 8] = [(true, Some(3)), (false, Some(2)), (true, None), (false, None), (true, Some(1)), (false, Some(9)), (true, Some(9)), (true, None)];
		for (i, (from_stream, version)) in writes.iter().copied().enumerate() {
			let candidate = props(json!({ "count": i }));
			if from_stream {
				let _ = cell.merge_stream(candidate, version, None);
			} else {
				let _ = cell.merge_response(candidate, version);
			}
			assert!(cell.version() >= last);
			last = cell.version();
		}

		assert_eq!(cell.version(), 10);
	}

	#[test]
	fn unversioned_live_update_counts_as_next_version() {
		let cell = cell(1, 4);

		assert_eq!(cell.merge_stream(props(json!({"count": 2})), None, None), Merge::Accepted { version: 5 });
	}

	#[test]
	fn unversioned_response_keeps_version() {
		let cell = cell(1, 4);

		assert_eq!(cell.merge_response(props(json!({"count": 2})), None), Merge::Accepted { version: 4 });
		assert_eq!(cell.props()["count"], 2);
	}

	#[test]
	fn set_props_bypasses_the_clock() {
		let cell = cell(1, 7);

		assert!(cell.set_props(props(json!({"count": 0}))));

		assert_eq!(cell.get(), IslandState::new(props(json!({"count": 0})), 7));
	}

	#[test]
	fn reconcile_sees_previous_props_only_for_accepted_candidates() {
		let cell = cell(1, 1);
		let calls = Rc::new(Cell::new(0));
		let reconcile: Reconcile = Rc::new({
			let calls = Rc::clone(&calls);
			move |mut next: Props, previous: &Props| {
				calls.set(calls.get() + 1);
				next.insert("previous".to_owned(), previous["count"].clone());
				next
			}
		});

		let _ = cell.merge_stream(props(json!({"count": 2})), Some(2), Some(&reconcile));
		let _ = cell.merge_stream(props(json!({"count": 3})), Some(1), Some(&reconcile));

		assert_eq!(calls.get(), 1);
		assert_eq!(cell.props(), props(json!({"count": 2, "previous": 1})));
	}

	#[test]
	fn released_cell_ignores_writes() {
		let cell = cell(1, 1);
		let notified = Rc::new(Cell::new(false));
		let _watch = cell.watch({
			let notified = Rc::clone(&notified);
			move |_| notified.set(true)
		});

		cell.release();

		assert_eq!(cell.merge_stream(props(json!({"count": 2})), Some(2), None), Merge::Released);
		assert_eq!(cell.merge_response(props(json!({"count": 2})), Some(2)), Merge::Released);
		assert!(!cell.set_props(props(json!({"count": 2}))));
		assert_eq!(cell.version(), 1);
		assert!(!notified.get());
	}
}
