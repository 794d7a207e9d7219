//! An in-memory host: a document tree and a pub/sub stream transport.
//!
//! Useful for headless hosts and for exercising islands without a browser.

use crate::{
	document::{Document, HostEvent, MarkerNode, NodeId},
	stream::{StreamTransport, Subscription},
};
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
	sync::atomic::{AtomicU64, Ordering},
};
use hashbrown::HashMap;
use serde_json::Value;
use std::rc::{Rc, Weak};
use tracing::trace;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

struct NodeData {
	id: NodeId,
	attributes: RefCell<HashMap<String, String>>,
	children: RefCell<Vec<MemoryNode>>,
}

/// A shared handle to an element in a [`MemoryDocument`] (or a detached one).
#[derive(Clone)]
pub struct MemoryNode(Rc<NodeData>);
impl MemoryNode {
	#[must_use]
	pub fn element() -> Self {
		Self(Rc::new(NodeData {
			id: NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)),
			attributes: RefCell::new(HashMap::new()),
			children: RefCell::new(Vec::new()),
		}))
	}

	#[must_use]
	pub fn with_attribute(self, name: &str, value: &str) -> Self {
		MarkerNode::set_attribute(&self, name, value);
		self
	}

	#[must_use]
	pub fn with_child(self, child: MemoryNode) -> Self {
		self.0.children.borrow_mut().push(child);
		self
	}

	#[must_use]
	pub fn has_attribute(&self, name: &str) -> bool {
		self.0.attributes.borrow().contains_key(name)
	}

	#[must_use]
	pub fn children(&self) -> Vec<MemoryNode> {
		self.0.children.borrow().clone()
	}

	fn collect_markers(&self, marker: &str, into: &mut Vec<MemoryNode>) {
		if self.has_attribute(marker) {
			into.push(self.clone());
		}
		for child in self.children() {
			child.collect_markers(marker, into);
		}
	}
}
impl MarkerNode for MemoryNode {
	fn id(&self) -> NodeId {
		self.0.id
	}

	fn attribute(&self, name: &str) -> Option<String> {
		self.0.attributes.borrow().get(name).cloned()
	}

	fn set_attribute(&self, name: &str, value: &str) {
		self.0.attributes.borrow_mut().insert(name.to_owned(), value.to_owned());
	}

	fn remove_attribute(&self, name: &str) {
		self.0.attributes.borrow_mut().remove(name);
	}

	fn contains_marker(&self, marker: &str) -> bool {
		self.has_attribute(marker) || self.0.children.borrow().iter().any(|child| child.contains_marker(marker))
	}
}
impl PartialEq for MemoryNode {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}
impl Eq for MemoryNode {}
impl Debug for MemoryNode {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("MemoryNode")
			.field("id", &self.0.id)
			.field("attributes", &self.0.attributes.borrow())
			.field("children", &self.0.children.borrow().len())
			.finish()
	}
}

type Handler = Rc<dyn Fn(HostEvent<MemoryNode>)>;

/// A document whose structure and lifecycle events are driven by hand.
pub struct MemoryDocument {
	body: MemoryNode,
	handlers: RefCell<Vec<Handler>>,
}
impl MemoryDocument {
	#[must_use]
	pub fn new() -> Self {
		Self {
			body: MemoryNode::element(),
			handlers: RefCell::new(Vec::new()),
		}
	}

	#[must_use]
	pub fn body(&self) -> &MemoryNode {
		&self.body
	}

	/// Appends `node` to the body and reports it to listeners like a mutation observer would.
	pub fn append(&self, node: MemoryNode) {
		self.body.0.children.borrow_mut().push(node.clone());
		self.emit(HostEvent::NodesAdded(vec![node]));
	}

	/// Removes `node` from the body without notifying anyone.
	pub fn remove(&self, node: &MemoryNode) {
		self.body.0.children.borrow_mut().retain(|child| child != node);
	}

	pub fn emit(&self, event: HostEvent<MemoryNode>) {
		let handlers = self.handlers.borrow().clone();
		for handler in handlers {
			handler(event.clone());
		}
	}

	#[must_use]
	pub fn listener_count(&self) -> usize {
		self.handlers.borrow().len()
	}
}
impl Default for MemoryDocument {
	fn default() -> Self {
		Self::new()
	}
}
impl Document for MemoryDocument {
	type Node = MemoryNode;

	fn markers(&self, marker: &str) -> Vec<MemoryNode> {
		let mut markers = Vec::new();
		for child in self.body.children() {
			child.collect_markers(marker, &mut markers);
		}
		markers
	}

	fn listen(&self, handler: Rc<dyn Fn(HostEvent<MemoryNode>)>) {
		self.handlers.borrow_mut().push(handler);
	}
}
impl Debug for MemoryDocument {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("MemoryDocument")
			.field("body", &self.body)
			.field("listeners", &self.listener_count())
			.finish()
	}
}

type OnMessage = Rc<RefCell<Box<dyn FnMut(Value)>>>;

#[derive(Default)]
struct Channels {
	next_key: Cell<u64>,
	subscribers: RefCell<HashMap<String, Vec<(u64, OnMessage)>>>,
}

/// Delivers pushed messages synchronously, in push order, to every subscriber of a channel.
#[derive(Clone, Default)]
pub struct MemoryTransport(Rc<Channels>);
impl MemoryTransport {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns how many subscribers received the message.
	///
	/// A subscriber that pushes to a channel it is subscribed to doesn't receive that nested message.
	pub fn push(&self, channel: &str, message: Value) -> usize {
		let subscribers: Vec<OnMessage> = self
			.0
			.subscribers
			.borrow()
			.get(channel)
			.map(|subscribers| subscribers.iter().map(|(_, on_message)| Rc::clone(on_message)).collect())
			.unwrap_or_default();
		let mut delivered = 0;
		for on_message in &subscribers {
			match on_message.try_borrow_mut() {
				Ok(mut on_message) => {
					on_message(message.clone());
					delivered += 1;
				}
				Err(_) => trace!(channel, "Dropped re-entrant delivery."),
			}
		}
		delivered
	}

	#[must_use]
	pub fn subscriber_count(&self, channel: &str) -> usize {
		self.0.subscribers.borrow().get(channel).map_or(0, Vec::len)
	}
}
impl StreamTransport for MemoryTransport {
	fn subscribe(&self, channel: &str, on_message: Box<dyn FnMut(Value)>) -> Subscription {
		let key = self.0.next_key.get();
		self.0.next_key.set(key + 1);
		self.0
			.subscribers
			.borrow_mut()
			.entry(channel.to_owned())
			.or_default()
			.push((key, Rc::new(RefCell::new(on_message))));

		let channels: Weak<Channels> = Rc::downgrade(&self.0);
		let channel = channel.to_owned();
		Subscription::new(move || {
			if let Some(channels) = channels.upgrade() {
				let mut subscribers = channels.subscribers.borrow_mut();
				if let Some(channel_subscribers) = subscribers.get_mut(&channel) {
					channel_subscribers.retain(|(k, _)| *k != key);
					if channel_subscribers.is_empty() {
						subscribers.remove(&channel);
					}
				}
			}
		})
	}
}
impl Debug for MemoryTransport {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let subscribers = self.0.subscribers.borrow();
		f.debug_map().entries(subscribers.iter().map(|(channel, list)| (channel, list.len()))).finish()
	}
}
