#![allow(dead_code)]

use futures::{
	channel::oneshot,
	executor::LocalPool,
	future::{FutureExt, LocalBoxFuture, RemoteHandle},
	task::LocalSpawnExt,
};
use island_dom::{
	memory::{MemoryDocument, MemoryNode, MemoryTransport},
	registry::{Mounted, Renderer, RendererRegistry},
	request::{IslandForm, IslandRequest, Method, RequestError, RequestExecutor, SubmitOutcome, SubmitOverrides},
	Archipelago, Island, IslandConfig, IslandResponse, Props,
};
use serde_json::Value;
use std::{
	cell::{Cell, RefCell},
	rc::Rc,
};

pub fn init_logging() {
	let _ = tracing_subscriber::fmt().with_test_writer().with_max_level(tracing::Level::TRACE).try_init();
}

pub fn props(value: Value) -> Props {
	match value {
		Value::Object(props) => props,
		other => panic!("not an object: {}", other),
	}
}

/// A marker for `component` at version 1 with `{"team_id": 1}` params and `{"count": 1}` props.
pub fn marker(component: &str) -> MemoryNode {
	MemoryNode::element()
		.with_attribute("data-island", "")
		.with_attribute("data-component", component)
		.with_attribute("data-params", r#"{"team_id": 1}"#)
		.with_attribute("data-props", r#"{"count": 1}"#)
		.with_attribute("data-version", "1")
}

/// Counts attachments and unmounts.
#[derive(Clone, Default)]
pub struct RecordingRenderer {
	pub attached: Rc<Cell<usize>>,
	pub unmounted: Rc<Cell<usize>>,
	pub with_fallback: Rc<Cell<usize>>,
	pub islands: Rc<RefCell<Vec<Island>>>,
}
impl Renderer<MemoryNode> for RecordingRenderer {
	fn attach(&self, _node: &MemoryNode, island: &Island, fallback: Option<&Rc<dyn Renderer<MemoryNode>>>) -> Box<dyn Mounted> {
		self.attached.set(self.attached.get() + 1);
		if fallback.is_some() {
			self.with_fallback.set(self.with_fallback.get() + 1);
		}
		self.islands.borrow_mut().push(island.clone());

		let unmounted = Rc::clone(&self.unmounted);
		Box::new(move || unmounted.set(unmounted.get() + 1))
	}
}

struct Call {
	request: IslandRequest,
	respond: Option<oneshot::Sender<Result<IslandResponse, RequestError>>>,
}

/// Records every request and leaves it pending until the test responds to it.
#[derive(Clone, Default)]
pub struct ScriptedExecutor(Rc<RefCell<Vec<Call>>>);
impl ScriptedExecutor {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn calls(&self) -> usize {
		self.0.borrow().len()
	}

	pub fn request<R>(&self, index: usize, f: impl FnOnce(&IslandRequest) -> R) -> R {
		f(&self.0.borrow()[index].request)
	}

	/// Returns whether the request was still listening.
	pub fn respond(&self, index: usize, response: Value) -> bool {
		let response = IslandResponse::parse(response).expect("scripted response");
		self.settle(index, Ok(response))
	}

	pub fn fail(&self, index: usize, error: RequestError) -> bool {
		self.settle(index, Err(error))
	}

	fn settle(&self, index: usize, result: Result<IslandResponse, RequestError>) -> bool {
		let sender = self.0.borrow_mut()[index].respond.take().expect("responded twice");
		sender.send(result).is_ok()
	}
}
impl RequestExecutor for ScriptedExecutor {
	fn execute(&self, request: IslandRequest) -> LocalBoxFuture<'static, Result<IslandResponse, RequestError>> {
		let (sender, receiver) = oneshot::channel();
		self.0.borrow_mut().push(Call {
			request,
			respond: Some(sender),
		});
		async move { receiver.await.unwrap_or(Err(RequestError::Aborted)) }.boxed_local()
	}
}

pub fn archipelago(registry: RendererRegistry<MemoryNode>, executor: &ScriptedExecutor, transport: &MemoryTransport, pool: &LocalPool) -> Rc<Archipelago<MemoryDocument>> {
	Archipelago::new(
		MemoryDocument::new(),
		registry,
		Rc::new(executor.clone()),
		Rc::new(transport.clone()),
		Rc::new(pool.spawner()),
		IslandConfig::default(),
	)
}

/// Starts a submission on `pool`. Dropping the handle abandons it.
pub fn spawn_submit(pool: &LocalPool, form: &IslandForm, method: Method, operation: &'static str) -> RemoteHandle<Result<SubmitOutcome, RequestError>> {
	let form = form.clone();
	pool.spawner()
		.spawn_local_with_handle(async move { form.submit(method, operation, SubmitOverrides::default()).await })
		.expect("spawn submission")
}
