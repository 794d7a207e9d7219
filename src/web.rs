//! Browser bindings: the live DOM as a [`Document`], host lifecycle events and a `MutationObserver`,
//! a microtask-backed spawner and an action-cable [`StreamTransport`].

use crate::{
	config::IslandConfig,
	discovery::Archipelago,
	document::{Document, HostEvent, MarkerNode, NodeId},
	registry::RendererRegistry,
	request::RequestExecutor,
	stream::{StreamTransport, Subscription},
};
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
};
use futures::task::{LocalFutureObj, LocalSpawn, SpawnError};
use js_sys::{Array, Function, Object, Reflect};
use serde_json::Value;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, error, instrument, trace};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use web_sys::{Element, MutationObserver, MutationObserverInit, MutationRecord};

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HostError(pub String);
impl From<JsValue> for HostError {
	fn from(value: JsValue) -> Self {
		Self(format!("{:?}", value))
	}
}

/// Expando property caching a [`NodeId`] on its element.
const NODE_ID_KEY: &str = "__islandDomNodeId";

thread_local! {
	static NEXT_NODE_ID: Cell<u64> = Cell::new(1);
}

fn key(name: &str) -> JsValue {
	JsValue::from_str(name)
}

/// A DOM element as island marker.
#[derive(Debug, Clone, PartialEq)]
pub struct WebNode(pub Element);
impl MarkerNode for WebNode {
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
	fn id(&self) -> NodeId {
		if let Some(id) = Reflect::get(&self.0, &key(NODE_ID_KEY)).ok().and_then(|id| id.as_f64()) {
			return NodeId(id as u64);
		}

		let id = NEXT_NODE_ID.with(|next| {
			let id = next.get();
			next.set(id + 1);
			id
		});
		if let Err(error) = Reflect::set(&self.0, &key(NODE_ID_KEY), &JsValue::from_f64(id as f64)) {
			error!(?error, "Failed to tag element with its node id.");
		}
		NodeId(id)
	}

	fn attribute(&self, name: &str) -> Option<String> {
		self.0.get_attribute(name)
	}

	fn set_attribute(&self, name: &str, value: &str) {
		if let Err(error) = self.0.set_attribute(name, value) {
			error!(?error, name, "Failed to set attribute.");
		}
	}

	fn remove_attribute(&self, name: &str) {
		if let Err(error) = self.0.remove_attribute(name) {
			error!(?error, name, "Failed to remove attribute.");
		}
	}

	fn contains_marker(&self, marker: &str) -> bool {
		self.0.has_attribute(marker) || matches!(self.0.query_selector(&format!("[{}]", marker)), Ok(Some(_)))
	}
}

type EventClosure = Closure<dyn FnMut(web_sys::Event)>;
type ObserverClosure = Closure<dyn FnMut(Array, MutationObserver)>;

/// The live browser document.
///
/// Dropping it removes every event listener and disconnects the mutation observer it registered.
pub struct WebDocument {
	document: web_sys::Document,
	config: IslandConfig,
	listeners: RefCell<Vec<(String, EventClosure)>>,
	observer: RefCell<Option<(MutationObserver, ObserverClosure)>>,
}
impl WebDocument {
	#[must_use]
	pub fn new(document: web_sys::Document, config: &IslandConfig) -> Self {
		Self {
			document,
			config: config.clone(),
			listeners: RefCell::new(Vec::new()),
			observer: RefCell::new(None),
		}
	}

	fn listen_lifecycle(&self, handler: &Rc<dyn Fn(HostEvent<WebNode>)>) -> Result<(), HostError> {
		for name in self.config.lifecycle_events().iter().copied() {
			let event = match self.config.host_event::<WebNode>(name) {
				Some(event) => event,
				None => continue,
			};
			let handler = Rc::clone(handler);
			let closure = Closure::wrap(Box::new(move |_: web_sys::Event| handler(event.clone())) as Box<dyn FnMut(web_sys::Event)>);
			self.document.add_event_listener_with_callback(name, closure.as_ref().unchecked_ref())?;
			self.listeners.borrow_mut().push((name.to_owned(), closure));
		}
		Ok(())
	}

	fn observe(&self, handler: &Rc<dyn Fn(HostEvent<WebNode>)>) -> Result<(), HostError> {
		let target: web_sys::Node = match (self.document.body(), self.document.document_element()) {
			(Some(body), _) => body.into(),
			(None, Some(root)) => root.into(),
			(None, None) => {
				debug!("No document root to observe.");
				return Ok(());
			}
		};

		let handler = Rc::clone(handler);
		let closure = Closure::wrap(Box::new(move |records: Array, _: MutationObserver| {
			let mut added = Vec::new();
			for record in records.iter() {
				let record = match record.dyn_into::<MutationRecord>() {
					Ok(record) => record,
					Err(_) => continue,
				};
				let nodes = record.added_nodes();
				for i in 0..nodes.length() {
					if let Some(element) = nodes.item(i).and_then(|node| node.dyn_into::<Element>().ok()) {
						added.push(WebNode(element));
					}
				}
			}
			if !added.is_empty() {
				trace!(count = added.len(), "Observed added elements.");
				handler(HostEvent::NodesAdded(added));
			}
		}) as Box<dyn FnMut(Array, MutationObserver)>);

		let observer = MutationObserver::new(closure.as_ref().unchecked_ref())?;
		let init = MutationObserverInit::new();
		init.set_child_list(true);
		init.set_subtree(true);
		observer.observe_with_options(&target, &init)?;
		*self.observer.borrow_mut() = Some((observer, closure));
		Ok(())
	}
}
impl Document for WebDocument {
	type Node = WebNode;

	fn markers(&self, marker: &str) -> Vec<WebNode> {
		let nodes = match self.document.query_selector_all(&format!("[{}]", marker)) {
			Ok(nodes) => nodes,
			Err(error) => {
				error!(?error, marker, "Failed to query island markers.");
				return Vec::new();
			}
		};
		(0..nodes.length())
			.filter_map(|i| nodes.item(i))
			.filter_map(|node| node.dyn_into::<Element>().ok())
			.map(WebNode)
			.collect()
	}

	#[instrument(skip(self, handler))]
	fn listen(&self, handler: Rc<dyn Fn(HostEvent<WebNode>)>) {
		if let Err(error) = self.listen_lifecycle(&handler) {
			error!(%error, "Failed to listen for lifecycle events.");
		}
		if let Err(error) = self.observe(&handler) {
			error!(%error, "Failed to observe the document.");
		}
	}
}
impl Drop for WebDocument {
	fn drop(&mut self) {
		for (name, closure) in self.listeners.get_mut().drain(..) {
			if let Err(error) = self.document.remove_event_listener_with_callback(&name, closure.as_ref().unchecked_ref()) {
				error!(?error, name = %name, "Failed to remove event listener.");
			}
		}
		if let Some((observer, _closure)) = self.observer.get_mut().take() {
			observer.disconnect();
		}
	}
}
impl Debug for WebDocument {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("WebDocument")
			.field("listeners", &self.listeners.borrow().len())
			.field("observing", &self.observer.borrow().is_some())
			.finish()
	}
}

/// Runs spawned futures on the browser's microtask queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct MicrotaskSpawner;
impl LocalSpawn for MicrotaskSpawner {
	fn spawn_local_obj(&self, future: LocalFutureObj<'static, ()>) -> Result<(), SpawnError> {
		wasm_bindgen_futures::spawn_local(future);
		Ok(())
	}
}

/// Subscribes through an action-cable consumer as `{channel, stream_name}`.
///
/// Without a consumer, subscribing does nothing.
pub struct CableTransport {
	consumer: Option<JsValue>,
	channel: String,
}
impl CableTransport {
	#[must_use]
	pub fn new(consumer: JsValue, channel: &str) -> Self {
		Self {
			consumer: Some(consumer),
			channel: channel.to_owned(),
		}
	}

	/// Uses `globalThis.Archipelago.cable`, or else `globalThis.App.cable`.
	#[must_use]
	pub fn from_global(channel: &str) -> Self {
		let global = js_sys::global();
		let consumer = ["Archipelago", "App"]
			.iter()
			.filter_map(|namespace| Reflect::get(&global, &key(namespace)).ok())
			.filter(JsValue::is_object)
			.filter_map(|namespace| Reflect::get(&namespace, &key("cable")).ok())
			.find(JsValue::is_object);
		if consumer.is_none() {
			debug!("No global cable consumer. Live updates are disabled.");
		}
		Self {
			consumer,
			channel: channel.to_owned(),
		}
	}

	fn try_subscribe(&self, consumer: &JsValue, stream: &str, mut on_message: Box<dyn FnMut(Value)>) -> Result<Subscription, HostError> {
		let subscriptions = Reflect::get(consumer, &key("subscriptions"))?;
		let create = Reflect::get(&subscriptions, &key("create"))?.dyn_into::<Function>()?;

		let params = Object::new();
		Reflect::set(&params, &key("channel"), &key(&self.channel))?;
		Reflect::set(&params, &key("stream_name"), &key(stream))?;

		let channel = stream.to_owned();
		let received = Closure::wrap(Box::new(move |data: JsValue| match serde_wasm_bindgen::from_value::<Value>(data) {
			Ok(message) => on_message(message),
			Err(error) => debug!(channel = %channel, %error, "Dropped unconvertible live update."),
		}) as Box<dyn FnMut(JsValue)>);
		let callbacks = Object::new();
		Reflect::set(&callbacks, &key("received"), received.as_ref())?;

		let subscription = create.call2(&subscriptions, &params, &callbacks)?;
		Ok(Subscription::new(move || {
			let unsubscribe = Reflect::get(&subscription, &key("unsubscribe")).ok().and_then(|f| f.dyn_into::<Function>().ok());
			match unsubscribe {
				Some(unsubscribe) => {
					if let Err(error) = unsubscribe.call0(&subscription) {
						error!(?error, "Failed to unsubscribe.");
					}
				}
				None => error!("Cable subscription has no `unsubscribe` method."),
			}
			drop(received);
		}))
	}
}
impl StreamTransport for CableTransport {
	fn subscribe(&self, stream: &str, on_message: Box<dyn FnMut(Value)>) -> Subscription {
		let consumer = match &self.consumer {
			Some(consumer) if !stream.is_empty() => consumer,
			_ => return Subscription::noop(),
		};
		match self.try_subscribe(consumer, stream, on_message) {
			Ok(subscription) => subscription,
			Err(error) => {
				error!(%error, stream, "Failed to subscribe.");
				Subscription::noop()
			}
		}
	}
}
impl Debug for CableTransport {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("CableTransport")
			.field("consumer", &self.consumer.is_some())
			.field("channel", &self.channel)
			.finish()
	}
}

/// Mounts every island in the current page and keeps discovering new ones.
///
/// Everything stays attached for as long as the returned handle lives.
/// Call [`Archipelago::forget`] on it to keep the islands for the rest of the page's lifetime.
///
/// # Errors
///
/// Iff there is no `window.document`.
#[must_use = "dropping the archipelago tears down its islands"]
pub fn boot_islands(registry: RendererRegistry<WebNode>, executor: Rc<dyn RequestExecutor>, config: IslandConfig) -> Result<Rc<Archipelago<WebDocument>>, HostError> {
	let document = web_sys::window()
		.and_then(|window| window.document())
		.ok_or_else(|| HostError("No `window.document` to boot islands in.".to_owned()))?;
	let document = WebDocument::new(document, &config);
	let transport = Rc::new(CableTransport::from_global(&config.channel));

	let archipelago = Archipelago::new(document, registry, executor, transport, Rc::new(MicrotaskSpawner), config);
	archipelago.start();
	Ok(archipelago)
}
