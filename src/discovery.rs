//! Island discovery, and the process-scoped context that owns every island of one document.

use crate::{
	config::IslandConfig,
	document::{Document, HostEvent, MarkerNode},
	island::{Island, IslandServices},
	load::{load_component_name, load_marker},
	mount::{MountOutcome, MountRegistry, SkipReason},
	registry::RendererRegistry,
	request::RequestExecutor,
	stream::StreamTransport,
};
use core::{
	cell::Cell,
	fmt::{self, Debug, Formatter},
};
use futures::task::{LocalSpawn, LocalSpawnExt};
use std::rc::{Rc, Weak};
use tracing::{debug, error, instrument, trace, warn};

/// Owns the renderer registry, the mount registry and the discovery state of one document.
///
/// Create one per document and hand it to whatever boots the page. Booting it again only scans again:
/// host event listeners are attached once per [`Archipelago`].
///
/// Re-scans triggered by host events are coalesced: any number of triggers before the spawned scan task
/// runs produce exactly one scan. With a microtask-backed `spawner` (as in the browser), that's at most one
/// scan per microtask batch.
///
/// Dropping the last handle tears down every island it mounted, as [`Archipelago::unmount_all`] does.
/// Use [`Archipelago::forget`] to keep the islands alive for the rest of the page's lifetime instead.
pub struct Archipelago<D: Document + 'static> {
	this: Weak<Self>,
	document: D,
	registry: RendererRegistry<D::Node>,
	mounts: MountRegistry<D::Node>,
	services: IslandServices,
	spawner: Rc<dyn LocalSpawn>,
	scan_scheduled: Cell<bool>,
	listening: Cell<bool>,
	scans: Cell<u64>,
}
impl<D: Document + 'static> Archipelago<D> {
	#[must_use = "dropping the archipelago tears down its islands"]
	pub fn new(
		document: D,
		registry: RendererRegistry<D::Node>,
		executor: Rc<dyn RequestExecutor>,
		transport: Rc<dyn StreamTransport>,
		spawner: Rc<dyn LocalSpawn>,
		config: IslandConfig,
	) -> Rc<Self> {
		Rc::new_cyclic(|this| Self {
			this: this.clone(),
			mounts: MountRegistry::new(&config.mounted_attribute),
			document,
			registry,
			services: IslandServices {
				executor,
				transport,
				config: Rc::new(config),
			},
			spawner,
			scan_scheduled: Cell::new(false),
			listening: Cell::new(false),
			scans: Cell::new(0),
		})
	}

	#[must_use]
	pub fn document(&self) -> &D {
		&self.document
	}

	#[must_use]
	pub fn config(&self) -> &IslandConfig {
		&self.services.config
	}

	#[must_use]
	pub fn mounts(&self) -> &MountRegistry<D::Node> {
		&self.mounts
	}

	#[must_use]
	pub fn island(&self, node: &D::Node) -> Option<Island> {
		self.mounts.island(node)
	}

	#[must_use]
	pub fn islands(&self) -> Vec<Island> {
		self.mounts.islands()
	}

	/// How many scans have completed so far.
	#[must_use]
	pub fn scan_count(&self) -> u64 {
		self.scans.get()
	}

	#[must_use]
	pub fn is_scan_scheduled(&self) -> bool {
		self.scan_scheduled.get()
	}

	/// Mounts every island marker currently in the document, then starts listening for host events
	/// (only the first time).
	///
	/// Returns how many islands this scan mounted.
	#[instrument(skip(self))]
	pub async fn boot(&self) -> usize {
		let markers = self.document.markers(&self.services.config.marker_attribute);
		trace!(markers = markers.len(), "Scanning.");

		let mut mounted = 0;
		for node in &markers {
			if let MountOutcome::Mounted(_) = self.mount(node).await {
				mounted += 1;
			}
		}
		self.scans.set(self.scans.get() + 1);

		self.listen();
		debug!(mounted, total = self.mounts.len(), "Scan complete.");
		mounted
	}

	/// Spawns [`Archipelago::boot`] without awaiting it.
	///
	/// The spawned scan doesn't keep the archipelago alive.
	pub fn start(&self) {
		let this = self.this.clone();
		let task = async move {
			if let Some(this) = this.upgrade() {
				this.boot().await;
			}
		};
		if let Err(error) = self.spawner.spawn_local(task) {
			error!(%error, "Failed to spawn initial scan.");
		}
	}

	/// Mounts a single marker node, unless it is already mounted or mounting.
	///
	/// Markers without a registered component or with malformed params or props are skipped.
	pub async fn mount(&self, node: &D::Node) -> MountOutcome {
		if self.mounts.is_mounted(node) {
			return MountOutcome::Skipped(SkipReason::AlreadyMounted);
		}
		if self.mounts.is_mounting(node) {
			return MountOutcome::Skipped(SkipReason::Mounting);
		}

		let config = &self.services.config;
		let component = match load_component_name(node, config) {
			Some(component) => component,
			None => {
				debug!(?node, "Skipped marker without component name.");
				return MountOutcome::Skipped(SkipReason::MissingComponent);
			}
		};
		let entry = match self.registry.get(&component) {
			Some(entry) => entry,
			None => {
				debug!(component = %component, "Skipped marker of unregistered component.");
				return MountOutcome::Skipped(SkipReason::UnknownComponent(component));
			}
		};
		let marker = match load_marker(node, config) {
			Ok(marker) => marker,
			Err(error) => {
				warn!(component = %component, %error, "Skipped malformed island marker.");
				return MountOutcome::Skipped(SkipReason::Malformed(error));
			}
		};

		self.mounts.mount(node, marker, entry, &self.services).await
	}

	/// Keeps the archipelago and its islands alive for as long as the process runs.
	pub fn forget(self: Rc<Self>) {
		trace!("Forgetting archipelago.");
		core::mem::forget(self);
	}

	/// Releases every island. See [`MountRegistry::unmount_all`].
	pub fn unmount_all(&self) {
		self.mounts.unmount_all();
	}

	/// Schedules a re-scan unless one is already scheduled.
	///
	/// Returns whether this call scheduled it.
	pub fn schedule_scan(&self) -> bool {
		if self.scan_scheduled.replace(true) {
			trace!("Coalesced scan trigger.");
			return false;
		}

		let this = self.this.clone();
		let task = async move {
			if let Some(this) = this.upgrade() {
				this.scan_scheduled.set(false);
				this.boot().await;
			}
		};
		if let Err(error) = self.spawner.spawn_local(task) {
			self.scan_scheduled.set(false);
			error!(%error, "Failed to spawn scan.");
			return false;
		}
		true
	}

	/// Reacts to one host event.
	pub fn handle(&self, event: HostEvent<D::Node>) {
		match event {
			HostEvent::NavigationCompleted | HostEvent::Rendered | HostEvent::FrameLoaded => {
				self.schedule_scan();
			}
			HostEvent::BeforeCache => self.unmount_all(),
			HostEvent::NodesAdded(nodes) => {
				let marker = &self.services.config.marker_attribute;
				if nodes.iter().any(|node| node.contains_marker(marker)) {
					self.schedule_scan();
				}
			}
		}
	}

	fn listen(&self) {
		if self.listening.replace(true) {
			return;
		}

		let this = self.this.clone();
		self.document.listen(Rc::new(move |event: HostEvent<D::Node>| {
			if let Some(this) = this.upgrade() {
				this.handle(event)
			}
		}));
		trace!("Listening for host events.");
	}
}
impl<D: Document + 'static> Drop for Archipelago<D> {
	fn drop(&mut self) {
		if !self.mounts.is_empty() {
			debug!(islands = self.mounts.len(), "Dropped archipelago with mounted islands.");
		}
		self.mounts.unmount_all();
	}
}
impl<D: Document + Debug + 'static> Debug for Archipelago<D> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Archipelago")
			.field("document", &self.document)
			.field("registry", &self.registry)
			.field("mounts", &self.mounts)
			.field("scan_scheduled", &self.scan_scheduled.get())
			.field("listening", &self.listening.get())
			.field("scans", &self.scans.get())
			.finish()
	}
}
