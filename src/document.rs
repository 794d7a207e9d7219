//! The narrow view of a host document that island discovery and mounting need.

use core::fmt::Debug;
use std::rc::Rc;

/// Stable identity of a document node for as long as the node exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// A document element that may carry island metadata in its attributes.
pub trait MarkerNode: Clone + Debug + 'static {
	fn id(&self) -> NodeId;
	fn attribute(&self, name: &str) -> Option<String>;
	fn set_attribute(&self, name: &str, value: &str);
	fn remove_attribute(&self, name: &str);

	/// Whether this node, or any of its descendants, has the `marker` attribute.
	fn contains_marker(&self, marker: &str) -> bool;
}

/// Named host events the discovery scheduler reacts to.
#[derive(Debug, Clone)]
pub enum HostEvent<N> {
	/// A page navigation completed.
	NavigationCompleted,
	/// The page body was (re-)rendered.
	Rendered,
	/// A sub-frame finished loading.
	FrameLoaded,
	/// The page is about to be frozen into a client-side cache.
	BeforeCache,
	/// Structural observation reported new nodes.
	NodesAdded(Vec<N>),
}

pub trait Document {
	type Node: MarkerNode;

	/// All nodes currently in the document that carry the `marker` attribute, in document order.
	fn markers(&self, marker: &str) -> Vec<Self::Node>;

	/// Starts delivering [`HostEvent`]s to `handler` for the document's remaining lifetime.
	fn listen(&self, handler: Rc<dyn Fn(HostEvent<Self::Node>)>);
}
