//! A mounted island instance: its immutable identity and params, its shared state cell and everything that
//! has to be cancelled when it is torn down.

use crate::{
	config::IslandConfig,
	document::NodeId,
	load::IslandMarker,
	request::{FormInner, FormOptions, IslandForm, RequestExecutor},
	stream::{ReconcileSlot, StreamReconciler, StreamTransport},
	version::{IslandState, Reconcile, StateCell, Version},
	Props,
};
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
};
use std::rc::{Rc, Weak};
use tracing::trace;

/// The collaborators every island of one [`Archipelago`](`crate::Archipelago`) shares.
#[derive(Clone)]
pub struct IslandServices {
	pub executor: Rc<dyn RequestExecutor>,
	pub transport: Rc<dyn StreamTransport>,
	pub config: Rc<IslandConfig>,
}
impl Debug for IslandServices {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("IslandServices").field("config", &self.config).finish_non_exhaustive()
	}
}

struct Inner {
	node: NodeId,
	component: String,
	params: Props,
	instance: Option<String>,
	stream: Option<String>,
	state: StateCell,
	live_props: ReconcileSlot,
	services: IslandServices,
	released: Cell<bool>,
	forms: RefCell<Vec<Weak<FormInner>>>,
}

/// A shared handle to one mounted island.
///
/// Renderers receive this when they are attached and use it to read and watch the island's state,
/// to create [forms](`Island::form`) and to customise how live updates are merged.
#[derive(Clone)]
pub struct Island(Rc<Inner>);
impl Island {
	#[must_use]
	pub fn new(node: NodeId, marker: IslandMarker, services: IslandServices) -> Self {
		Self(Rc::new(Inner {
			node,
			component: marker.component,
			params: marker.params,
			instance: marker.instance,
			stream: marker.stream,
			state: StateCell::new(IslandState::new(marker.props, marker.version)),
			live_props: Rc::new(RefCell::new(None)),
			services,
			released: Cell::new(false),
			forms: RefCell::new(Vec::new()),
		}))
	}

	#[must_use]
	pub fn node(&self) -> NodeId {
		self.0.node
	}

	#[must_use]
	pub fn component(&self) -> &str {
		&self.0.component
	}

	#[must_use]
	pub fn params(&self) -> &Props {
		&self.0.params
	}

	#[must_use]
	pub fn instance(&self) -> Option<&str> {
		self.0.instance.as_deref()
	}

	#[must_use]
	pub fn stream(&self) -> Option<&str> {
		self.0.stream.as_deref()
	}

	#[must_use]
	pub fn state(&self) -> &StateCell {
		&self.0.state
	}

	#[must_use]
	pub fn props(&self) -> Props {
		self.0.state.props()
	}

	#[must_use]
	pub fn version(&self) -> Version {
		self.0.state.version()
	}

	/// A local, optimistic edit. See [`StateCell::set_props`].
	pub fn set_props(&self, next: Props) -> bool {
		self.0.state.set_props(next)
	}

	/// Computes the props of accepted live updates from `(candidate, previous)` instead of replacing them wholesale.
	pub fn set_live_props(&self, reconcile: impl Fn(Props, &Props) -> Props + 'static) {
		let reconcile: Reconcile = Rc::new(reconcile);
		*self.0.live_props.borrow_mut() = Some(reconcile);
	}

	pub fn clear_live_props(&self) {
		self.0.live_props.borrow_mut().take();
	}

	/// Creates a form whose submissions write into this island's state.
	#[must_use]
	pub fn form(&self, options: FormOptions) -> IslandForm {
		let form = IslandForm::new(self.clone(), options);
		let mut forms = self.0.forms.borrow_mut();
		forms.retain(|form| form.strong_count() > 0);
		forms.push(form.downgrade());
		form
	}

	#[must_use]
	pub fn is_released(&self) -> bool {
		self.0.released.get()
	}

	pub(crate) fn executor(&self) -> &Rc<dyn RequestExecutor> {
		&self.0.services.executor
	}

	pub(crate) fn config(&self) -> &IslandConfig {
		&self.0.services.config
	}

	/// Subscribes to this island's stream for as long as the returned reconciler lives, if it has one.
	pub(crate) fn subscribe_stream(&self) -> Option<StreamReconciler> {
		let stream = self.stream()?;
		Some(StreamReconciler::subscribe(
			&*self.0.services.transport,
			stream,
			self.0.state.clone(),
			Rc::clone(&self.0.live_props),
		))
	}

	/// Cancels in-flight requests of every form, drops the reconcile hook and stops all further state writes.
	pub(crate) fn release(&self) {
		if self.0.released.replace(true) {
			return;
		}
		self.0.state.release();
		let live_props = self.0.live_props.borrow_mut().take();
		drop(live_props);
		let forms: Vec<Weak<FormInner>> = self.0.forms.borrow_mut().drain(..).collect();
		for form in forms.iter().filter_map(Weak::upgrade) {
			form.cancel_pending();
		}
		trace!(node = ?self.0.node, component = %self.0.component, "Released island.");
	}
}
impl Debug for Island {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Island")
			.field("node", &self.0.node)
			.field("component", &self.0.component)
			.field("instance", &self.0.instance)
			.field("stream", &self.0.stream)
			.field("state", &self.0.state)
			.field("released", &self.0.released.get())
			.finish()
	}
}
