//! Live updates: the transport seam and the reconciler that merges pushed messages into island state.

use crate::{
	response::IslandResponse,
	version::{Merge, Reconcile, StateCell},
};
use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter},
};
use serde_json::Value;
use std::rc::Rc;
use tracing::{debug, instrument, trace};

/// A publish/subscribe transport delivering raw messages of unspecified shape.
///
/// No ordering or uniqueness guarantees are expected from implementations.
pub trait StreamTransport {
	/// Subscribes `on_message` to `channel` until the returned [`Subscription`] is dropped.
	fn subscribe(&self, channel: &str, on_message: Box<dyn FnMut(Value)>) -> Subscription;
}

/// Unsubscribes when dropped or explicitly [unsubscribed](`Subscription::unsubscribe`).
#[must_use = "Dropping a `Subscription` unsubscribes it immediately."]
pub struct Subscription(Option<Box<dyn FnOnce()>>);
impl Subscription {
	pub fn new(unsubscribe: impl FnOnce() + 'static) -> Self {
		Self(Some(Box::new(unsubscribe)))
	}

	/// A subscription to nothing.
	pub fn noop() -> Self {
		Self(None)
	}

	pub fn unsubscribe(mut self) {
		self.release();
	}

	fn release(&mut self) {
		if let Some(unsubscribe) = self.0.take() {
			unsubscribe()
		}
	}
}
impl Drop for Subscription {
	fn drop(&mut self) {
		self.release();
	}
}
impl Debug for Subscription {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Subscription").field(&self.0.is_some()).finish()
	}
}

/// The replaceable hook used to compute accepted props from `(candidate, previous)`.
pub type ReconcileSlot = Rc<RefCell<Option<Reconcile>>>;

/// Keeps one island's state in step with its live-update channel.
///
/// The subscription lives exactly as long as this value.
#[derive(Debug)]
pub struct StreamReconciler {
	channel: String,
	_subscription: Subscription,
}
impl StreamReconciler {
	#[instrument(skip(transport, state, reconcile))]
	pub fn subscribe(transport: &dyn StreamTransport, channel: &str, state: StateCell, reconcile: ReconcileSlot) -> Self {
		let subscription = transport.subscribe(
			channel,
			Box::new({
				let channel = channel.to_owned();
				move |message| {
					let reconcile = reconcile.borrow().clone();
					receive(&channel, &state, reconcile.as_ref(), message);
				}
			}),
		);
		Self {
			channel: channel.to_owned(),
			_subscription: subscription,
		}
	}

	#[must_use]
	pub fn channel(&self) -> &str {
		&self.channel
	}
}

/// Applies one raw pushed message to `state`.
///
/// Anything that isn't an `ok` [`IslandResponse`] is dropped without changing anything, yielding [`None`].
pub fn receive(channel: &str, state: &StateCell, reconcile: Option<&Reconcile>, message: Value) -> Option<Merge> {
	match IslandResponse::parse(message) {
		Ok(IslandResponse::Ok { props, version }) => {
			let merge = state.merge_stream(props, version, reconcile);
			if let Merge::Stale { current, candidate } = merge {
				trace!(channel, current, candidate, "Dropped stale live update.");
			}
			Some(merge)
		}
		Ok(response) => {
			trace!(channel, status = response.status(), "Dropped non-data live update.");
			None
		}
		Err(error) => {
			debug!(channel, %error, "Dropped malformed live update.");
			None
		}
	}
}
