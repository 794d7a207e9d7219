//! Component name → renderer, either ready to use or loaded on first mount.

use crate::{document::MarkerNode, island::Island};
use core::fmt::{self, Debug, Formatter};
use futures::future::{FutureExt, LocalBoxFuture};
use hashbrown::HashMap;
use std::rc::Rc;
use thiserror::Error;

/// Attaches an island's UI to its marker node.
///
/// Rendering, and isolating render-time crashes behind `fallback`, are entirely up to the implementation.
pub trait Renderer<N: MarkerNode> {
	fn attach(&self, node: &N, island: &Island, fallback: Option<&Rc<dyn Renderer<N>>>) -> Box<dyn Mounted>;
}

/// A live, attached island UI.
pub trait Mounted {
	/// Detaches the UI. Called exactly once, during teardown.
	fn unmount(self: Box<Self>);
}
impl<F: FnOnce()> Mounted for F {
	fn unmount(self: Box<Self>) {
		(*self)()
	}
}

#[derive(Debug, Clone, Error)]
#[error("Failed to load renderer: {0}")]
pub struct LoadError(pub String);

pub type Loader<N> = Rc<dyn Fn() -> LocalBoxFuture<'static, Result<Rc<dyn Renderer<N>>, LoadError>>>;

pub enum RendererEntry<N: MarkerNode> {
	Ready(Rc<dyn Renderer<N>>),
	Lazy {
		load: Loader<N>,
		fallback: Option<Rc<dyn Renderer<N>>>,
	},
}
impl<N: MarkerNode> RendererEntry<N> {
	pub fn ready(renderer: impl Renderer<N> + 'static) -> Self {
		Self::Ready(Rc::new(renderer))
	}

	/// A renderer that's only loaded once an island needs it.
	pub fn lazy<F, Fut>(load: F) -> Self
	where
		F: Fn() -> Fut + 'static,
		Fut: core::future::Future<Output = Result<Rc<dyn Renderer<N>>, LoadError>> + 'static,
	{
		Self::Lazy {
			load: Rc::new(move || load().boxed_local()),
			fallback: None,
		}
	}

	/// Sets the view to show if the loaded renderer crashes. No-op for ready entries.
	#[must_use]
	pub fn with_fallback(self, renderer: impl Renderer<N> + 'static) -> Self {
		match self {
			Self::Lazy { load, .. } => Self::Lazy {
				load,
				fallback: Some(Rc::new(renderer)),
			},
			ready @ Self::Ready(_) => ready,
		}
	}

	#[must_use]
	pub fn fallback(&self) -> Option<&Rc<dyn Renderer<N>>> {
		match self {
			Self::Ready(_) => None,
			Self::Lazy { fallback, .. } => fallback.as_ref(),
		}
	}

	/// A future resolving to the renderer. Doesn't borrow the entry.
	pub fn resolve(&self) -> LocalBoxFuture<'static, Result<Rc<dyn Renderer<N>>, LoadError>> {
		match self {
			Self::Ready(renderer) => futures::future::ready(Ok(Rc::clone(renderer))).boxed_local(),
			Self::Lazy { load, .. } => load(),
		}
	}
}
impl<N: MarkerNode> Clone for RendererEntry<N> {
	fn clone(&self) -> Self {
		match self {
			Self::Ready(renderer) => Self::Ready(Rc::clone(renderer)),
			Self::Lazy { load, fallback } => Self::Lazy {
				load: Rc::clone(load),
				fallback: fallback.clone(),
			},
		}
	}
}
impl<N: MarkerNode> Debug for RendererEntry<N> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Self::Ready(_) => f.write_str("Ready"),
			Self::Lazy { fallback, .. } => f.debug_struct("Lazy").field("fallback", &fallback.is_some()).finish(),
		}
	}
}

pub struct RendererRegistry<N: MarkerNode>(HashMap<String, RendererEntry<N>>);
impl<N: MarkerNode> RendererRegistry<N> {
	#[must_use]
	pub fn new() -> Self {
		Self(HashMap::new())
	}

	#[must_use]
	pub fn with(mut self, component: &str, entry: RendererEntry<N>) -> Self {
		self.register(component, entry);
		self
	}

	/// Returns the entry previously registered under `component`, if any.
	pub fn register(&mut self, component: &str, entry: RendererEntry<N>) -> Option<RendererEntry<N>> {
		self.0.insert(component.to_owned(), entry)
	}

	#[must_use]
	pub fn get(&self, component: &str) -> Option<&RendererEntry<N>> {
		self.0.get(component)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl<N: MarkerNode> Default for RendererRegistry<N> {
	fn default() -> Self {
		Self::new()
	}
}
impl<N: MarkerNode> Debug for RendererRegistry<N> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_map().entries(self.0.iter()).finish()
	}
}
