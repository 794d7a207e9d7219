//! Bookkeeping of mounted and mounting marker nodes.
//!
//! A node is in at most one of {mounting, mounted} at a time. Mount attempts on a node that is already in
//! either state are skipped, never queued, so concurrent scans racing an asynchronous renderer load can't
//! attach the same island twice.

use crate::{
	describe,
	document::{MarkerNode, NodeId},
	island::{Island, IslandServices},
	load::{IslandMarker, MarkerError},
	registry::{LoadError, Mounted, RendererEntry},
	stream::StreamReconciler,
};
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
};
use hashbrown::HashMap;
use tracing::{debug, instrument, trace, warn};

struct MountRecord<N> {
	node: N,
	island: Island,
	view: Option<Box<dyn Mounted>>,
	stream: Option<StreamReconciler>,
}

#[derive(Debug)]
pub enum MountOutcome {
	Mounted(Island),
	Skipped(SkipReason),
}
impl MountOutcome {
	#[must_use]
	pub fn island(&self) -> Option<&Island> {
		match self {
			MountOutcome::Mounted(island) => Some(island),
			MountOutcome::Skipped(_) => None,
		}
	}
}

#[derive(Debug)]
pub enum SkipReason {
	AlreadyMounted,
	MissingComponent,
	UnknownComponent(String),
	/// The marker's params or props aren't JSON objects.
	Malformed(MarkerError),
	/// Another mount of this node is still resolving its renderer.
	Mounting,
	/// Everything was torn down while the renderer was resolving.
	TornDown,
	LoadFailed(LoadError),
}

/// Removes the node from the mounting set when the mount attempt ends, unless a teardown already did.
struct MountingGuard<'a, N> {
	registry: &'a MountRegistry<N>,
	node: NodeId,
	epoch: u64,
}
impl<N> Drop for MountingGuard<'_, N> {
	fn drop(&mut self) {
		let mut mounting = self.registry.mounting.borrow_mut();
		if mounting.get(&self.node) == Some(&self.epoch) {
			mounting.remove(&self.node);
		}
	}
}

pub struct MountRegistry<N> {
	mounted: RefCell<HashMap<NodeId, MountRecord<N>>>,
	/// Node → epoch in which its mount started.
	mounting: RefCell<HashMap<NodeId, u64>>,
	/// Incremented by every teardown.
	epoch: Cell<u64>,
	mounted_attribute: String,
}
impl<N: MarkerNode> MountRegistry<N> {
	#[must_use]
	pub fn new(mounted_attribute: &str) -> Self {
		Self {
			mounted: RefCell::new(HashMap::new()),
			mounting: RefCell::new(HashMap::new()),
			epoch: Cell::new(0),
			mounted_attribute: mounted_attribute.to_owned(),
		}
	}

	#[must_use]
	pub fn is_mounted(&self, node: &N) -> bool {
		self.mounted.borrow().contains_key(&node.id())
	}

	#[must_use]
	pub fn is_mounting(&self, node: &N) -> bool {
		self.mounting.borrow().contains_key(&node.id())
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.mounted.borrow().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	#[must_use]
	pub fn island(&self, node: &N) -> Option<Island> {
		self.mounted.borrow().get(&node.id()).map(|record| record.island.clone())
	}

	#[must_use]
	pub fn islands(&self) -> Vec<Island> {
		self.mounted.borrow().values().map(|record| record.island.clone()).collect()
	}

	/// Resolves `entry`'s renderer and attaches a new island to `node`.
	///
	/// The node is only flagged as mounted once the renderer is attached.
	#[instrument(skip(self, marker, entry, services), fields(component = %marker.component, params = %describe(&marker.params)))]
	pub async fn mount(&self, node: &N, marker: IslandMarker, entry: &RendererEntry<N>, services: &IslandServices) -> MountOutcome {
		let id = node.id();
		if self.is_mounted(node) {
			return MountOutcome::Skipped(SkipReason::AlreadyMounted);
		}
		if self.is_mounting(node) {
			trace!("Skipped node that is already mounting.");
			return MountOutcome::Skipped(SkipReason::Mounting);
		}

		let epoch = self.epoch.get();
		self.mounting.borrow_mut().insert(id, epoch);
		let _guard = MountingGuard { registry: self, node: id, epoch };

		let fallback = entry.fallback().cloned();
		let renderer = match entry.resolve().await {
			Ok(renderer) => renderer,
			Err(error) => {
				warn!(%error, "Skipped island whose renderer failed to load.");
				return MountOutcome::Skipped(SkipReason::LoadFailed(error));
			}
		};

		if self.epoch.get() != epoch {
			debug!("Abandoned mount that resolved after teardown.");
			return MountOutcome::Skipped(SkipReason::TornDown);
		}
		if self.is_mounted(node) {
			return MountOutcome::Skipped(SkipReason::AlreadyMounted);
		}

		let island = Island::new(id, marker, services.clone());
		let stream = island.subscribe_stream();
		let view = renderer.attach(node, &island, fallback.as_ref());
		self.mounted.borrow_mut().insert(
			id,
			MountRecord {
				node: node.clone(),
				island: island.clone(),
				view: Some(view),
				stream,
			},
		);
		node.set_attribute(&self.mounted_attribute, "true");
		debug!(?id, version = island.version(), "Mounted island.");
		MountOutcome::Mounted(island)
	}

	/// Tears down every island and forgets all pending mounts. Idempotent.
	///
	/// Islands are released before their views are unmounted, so nothing a view does while unmounting can
	/// write to their state anymore.
	#[instrument(skip(self))]
	pub fn unmount_all(&self) {
		self.epoch.set(self.epoch.get() + 1);
		self.mounting.borrow_mut().clear();

		let records: Vec<MountRecord<N>> = self.mounted.borrow_mut().drain().map(|(_, record)| record).collect();
		let count = records.len();
		for mut record in records {
			record.island.release();
			drop(record.stream.take());
			if let Some(view) = record.view.take() {
				view.unmount();
			}
			record.node.remove_attribute(&self.mounted_attribute);
		}
		if count > 0 {
			debug!(count, "Unmounted islands.");
		}
	}
}
impl<N> Debug for MountRegistry<N> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("MountRegistry")
			.field("mounted", &self.mounted.borrow().keys().collect::<Vec<_>>())
			.field("mounting", &self.mounting.borrow())
			.field("epoch", &self.epoch.get())
			.finish()
	}
}
