mod memory_harness_;

use futures::executor::LocalPool;
use island_dom::{
	document::{HostEvent, MarkerNode},
	memory::{MemoryNode, MemoryTransport},
	registry::{RendererEntry, RendererRegistry},
	request::{FormOptions, Method, SubmitOutcome},
};
use memory_harness_::{archipelago, init_logging, marker, props, spawn_submit, RecordingRenderer, ScriptedExecutor};
use serde_json::json;
use std::rc::Rc;

fn registry(renderer: &RecordingRenderer) -> RendererRegistry<MemoryNode> {
	RendererRegistry::new().with("TeamMembers", RendererEntry::ready(renderer.clone()))
}

#[test]
fn booting_again_listens_only_once() {
	let mut pool = LocalPool::new();
	let archipelago = archipelago(registry(&RecordingRenderer::default()), &ScriptedExecutor::new(), &MemoryTransport::new(), &pool);

	assert_eq!(pool.run_until(archipelago.boot()), 0);
	assert_eq!(pool.run_until(archipelago.boot()), 0);

	assert_eq!(archipelago.document().listener_count(), 1);
	assert_eq!(archipelago.scan_count(), 2);
}

#[test]
fn start_scans_on_the_spawner() {
	let mut pool = LocalPool::new();
	let renderer = RecordingRenderer::default();
	let archipelago = archipelago(registry(&renderer), &ScriptedExecutor::new(), &MemoryTransport::new(), &pool);
	archipelago.document().append(marker("TeamMembers"));

	archipelago.start();
	assert_eq!(archipelago.scan_count(), 0);
	pool.run_until_stalled();

	assert_eq!(archipelago.scan_count(), 1);
	assert_eq!(renderer.attached.get(), 1);
	assert_eq!(archipelago.document().listener_count(), 1);
}

#[test]
fn lifecycle_events_coalesce_into_one_scan() {
	init_logging();
	let mut pool = LocalPool::new();
	let renderer = RecordingRenderer::default();
	let archipelago = archipelago(registry(&renderer), &ScriptedExecutor::new(), &MemoryTransport::new(), &pool);
	pool.run_until(archipelago.boot());
	assert_eq!(archipelago.scan_count(), 1);

	let document = archipelago.document();
	document.emit(HostEvent::NavigationCompleted);
	document.emit(HostEvent::Rendered);
	document.emit(HostEvent::FrameLoaded);
	document.append(marker("TeamMembers"));
	assert!(archipelago.is_scan_scheduled());

	pool.run_until_stalled();

	assert_eq!(archipelago.scan_count(), 2);
	assert!(!archipelago.is_scan_scheduled());
	assert_eq!(renderer.attached.get(), 1);

	// A trigger after the scan ran schedules a new one.
	assert!(archipelago.schedule_scan());
	assert!(!archipelago.schedule_scan());
	pool.run_until_stalled();
	assert_eq!(archipelago.scan_count(), 3);
}

#[test]
fn only_added_markers_trigger_a_scan() {
	let mut pool = LocalPool::new();
	let renderer = RecordingRenderer::default();
	let archipelago = archipelago(registry(&renderer), &ScriptedExecutor::new(), &MemoryTransport::new(), &pool);
	pool.run_until(archipelago.boot());

	archipelago.document().append(MemoryNode::element().with_attribute("class", "flash"));
	assert!(!archipelago.is_scan_scheduled());

	let nested = marker("TeamMembers");
	archipelago.document().append(MemoryNode::element().with_child(nested.clone()));
	assert!(archipelago.is_scan_scheduled());
	pool.run_until_stalled();

	assert!(archipelago.mounts().is_mounted(&nested));
	assert_eq!(nested.attribute("data-mounted").as_deref(), Some("true"));
	assert_eq!(renderer.attached.get(), 1);
}

#[test]
fn before_cache_tears_down_synchronously() {
	let mut pool = LocalPool::new();
	let renderer = RecordingRenderer::default();
	let archipelago = archipelago(registry(&renderer), &ScriptedExecutor::new(), &MemoryTransport::new(), &pool);
	let node = marker("TeamMembers");
	archipelago.document().append(node.clone());
	assert_eq!(pool.run_until(archipelago.boot()), 1);

	archipelago.document().emit(HostEvent::BeforeCache);

	assert_eq!(renderer.unmounted.get(), 1);
	assert!(archipelago.mounts().is_empty());
	assert!(node.attribute("data-mounted").is_none());
	assert!(!archipelago.is_scan_scheduled());

	// Restoring the cached page brings the island back.
	archipelago.document().emit(HostEvent::Rendered);
	pool.run_until_stalled();
	assert_eq!(renderer.attached.get(), 2);
	assert_eq!(archipelago.island(&node).map(|island| island.version()), Some(1));
}

#[test]
fn teardown_cancels_requests_in_flight() {
	init_logging();
	let mut pool = LocalPool::new();
	let renderer = RecordingRenderer::default();
	let executor = ScriptedExecutor::new();
	let archipelago = archipelago(registry(&renderer), &executor, &MemoryTransport::new(), &pool);
	archipelago.document().append(marker("TeamMembers"));
	pool.run_until(archipelago.boot());

	let island = renderer.islands.borrow()[0].clone();
	let form = island.form(FormOptions::new(props(json!({ "count": 2 }))));
	let submission = spawn_submit(&pool, &form, Method::Post, "increment");
	pool.run_until_stalled();
	assert_eq!(executor.calls(), 1);

	archipelago.document().emit(HostEvent::BeforeCache);
	assert!(executor.request(0, |request| request.cancel.is_cancelled()));
	assert_eq!(pool.run_until(submission).unwrap(), SubmitOutcome::Cancelled);

	assert!(!executor.respond(0, json!({ "status": "ok", "props": { "count": 2 }, "version": 2 })));
	assert_eq!(island.props(), props(json!({ "count": 1 })));
	assert_eq!(island.version(), 1);

	// Released islands don't submit anymore.
	assert_eq!(pool.run_until(form.post("increment")).unwrap(), SubmitOutcome::Cancelled);
	assert_eq!(executor.calls(), 1);
}

#[test]
fn dropping_the_archipelago_tears_down_its_islands() {
	init_logging();
	let mut pool = LocalPool::new();
	let renderer = RecordingRenderer::default();
	let archipelago = archipelago(registry(&renderer), &ScriptedExecutor::new(), &MemoryTransport::new(), &pool);
	let node = marker("TeamMembers");
	archipelago.document().append(node.clone());
	assert_eq!(pool.run_until(archipelago.boot()), 1);
	let island = archipelago.island(&node).unwrap();

	drop(archipelago);

	assert_eq!(renderer.attached.get(), 1);
	assert_eq!(renderer.unmounted.get(), renderer.attached.get());
	assert!(island.is_released());
	assert!(node.attribute("data-mounted").is_none());
	assert!(!island.set_props(props(json!({ "count": 9 }))));
}

#[test]
fn a_dropped_archipelago_never_starts() {
	let mut pool = LocalPool::new();
	let renderer = RecordingRenderer::default();
	let archipelago = archipelago(registry(&renderer), &ScriptedExecutor::new(), &MemoryTransport::new(), &pool);
	let node = marker("TeamMembers");
	archipelago.document().append(node.clone());

	archipelago.start();
	drop(archipelago);
	pool.run_until_stalled();

	assert_eq!(renderer.attached.get(), 0);
	assert!(node.attribute("data-mounted").is_none());
}

#[test]
fn forgotten_archipelagos_keep_their_islands() {
	let mut pool = LocalPool::new();
	let renderer = RecordingRenderer::default();
	let archipelago = archipelago(registry(&renderer), &ScriptedExecutor::new(), &MemoryTransport::new(), &pool);
	archipelago.document().append(marker("TeamMembers"));
	let handle = Rc::downgrade(&archipelago);

	archipelago.start();
	archipelago.forget();
	pool.run_until_stalled();

	assert_eq!(renderer.attached.get(), 1);
	assert_eq!(renderer.unmounted.get(), 0);

	// Still listening.
	let archipelago = handle.upgrade().unwrap();
	let later = marker("TeamMembers");
	archipelago.document().append(later.clone());
	drop(archipelago);
	pool.run_until_stalled();

	assert_eq!(renderer.attached.get(), 2);
	assert_eq!(renderer.unmounted.get(), 0);
	assert_eq!(later.attribute("data-mounted").as_deref(), Some("true"));
}
