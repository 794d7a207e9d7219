//! Form submissions: at most one request in flight per form, and only the latest one's result is applied.
//!
//! Submitting cancels the form's previous request through its [`CancelToken`]. The executor future is
//! additionally wrapped in [`Abortable`], so a cancelled request resolves to [`SubmitOutcome::Cancelled`]
//! even if the transport ignores the token.

use crate::{
	describe,
	island::Island,
	response::{FieldErrors, IslandResponse, ResponseError},
	watch::{Watch, Watchers},
	Props,
};
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
};
use futures::future::{AbortHandle, AbortRegistration, Abortable, Aborted, LocalBoxFuture};
use serde_json::Value;
use std::rc::{Rc, Weak};
use thiserror::Error;
use tracing::{debug, instrument, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
	Post,
	Put,
	Patch,
	Delete,
}
impl Method {
	#[must_use]
	pub fn as_str(self) -> &'static str {
		match self {
			Method::Post => "post",
			Method::Put => "put",
			Method::Patch => "patch",
			Method::Delete => "delete",
		}
	}
}

/// Cooperative cancellation of one request.
#[derive(Debug, Clone)]
pub struct CancelToken(AbortHandle);
impl CancelToken {
	/// A fresh token and the registration that makes a future [`Abortable`] by it.
	#[must_use]
	pub fn new_pair() -> (Self, AbortRegistration) {
		let (handle, registration) = AbortHandle::new_pair();
		(Self(handle), registration)
	}

	pub fn cancel(&self) {
		self.0.abort()
	}

	#[must_use]
	pub fn is_cancelled(&self) -> bool {
		self.0.is_aborted()
	}
}

pub type Navigate = Rc<dyn Fn(&str)>;

/// Everything the request-execution collaborator needs to perform one island operation.
pub struct IslandRequest {
	pub component: String,
	pub operation: String,
	pub method: Method,
	/// The form's data, plus the method override for non-POST submissions.
	pub payload: Props,
	/// Island params, the form's fixed params and the island's stream name, in increasing precedence.
	pub fixed_params: Props,
	pub payload_override: Option<Props>,
	pub navigate: Option<Navigate>,
	pub cancel: CancelToken,
}
impl Debug for IslandRequest {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("IslandRequest")
			.field("component", &self.component)
			.field("operation", &self.operation)
			.field("method", &self.method)
			.field("payload", &describe(&self.payload))
			.field("fixed_params", &describe(&self.fixed_params))
			.field("payload_override", &self.payload_override.as_ref().map(describe))
			.field("navigate", &self.navigate.is_some())
			.field("cancel", &self.cancel)
			.finish()
	}
}

#[derive(Debug, Error)]
pub enum RequestError {
	/// The transport gave up because of cancellation. Never surfaced by [`IslandForm::submit`].
	#[error("Request aborted")]
	Aborted,
	#[error("Request failed: {0}")]
	Transport(String),
	#[error(transparent)]
	Response(#[from] ResponseError),
}

/// Performs island operations, e.g. over HTTP.
pub trait RequestExecutor {
	/// Implementations should stop work once `request.cancel` [is cancelled](`CancelToken::is_cancelled`)
	/// and may then resolve to [`RequestError::Aborted`].
	fn execute(&self, request: IslandRequest) -> LocalBoxFuture<'static, Result<IslandResponse, RequestError>>;
}
impl<F> RequestExecutor for F
where
	F: Fn(IslandRequest) -> LocalBoxFuture<'static, Result<IslandResponse, RequestError>>,
{
	fn execute(&self, request: IslandRequest) -> LocalBoxFuture<'static, Result<IslandResponse, RequestError>> {
		self(request)
	}
}

#[derive(Debug, Clone)]
pub struct FormOptions {
	pub initial_data: Props,
	/// Whether [`IslandForm::set_data`] removes the changed field's errors. `true` by default.
	pub clear_field_errors_on_change: bool,
	pub fixed_params: Props,
}
impl FormOptions {
	#[must_use]
	pub fn new(initial_data: Props) -> Self {
		Self {
			initial_data,
			clear_field_errors_on_change: true,
			fixed_params: Props::new(),
		}
	}

	#[must_use]
	pub fn with_fixed_params(mut self, fixed_params: Props) -> Self {
		self.fixed_params = fixed_params;
		self
	}

	#[must_use]
	pub fn keep_field_errors_on_change(mut self) -> Self {
		self.clear_field_errors_on_change = false;
		self
	}
}
impl Default for FormOptions {
	fn default() -> Self {
		Self::new(Props::new())
	}
}

#[derive(Clone, Default)]
pub struct SubmitOverrides {
	/// Sent instead of the form's data.
	pub payload: Option<Props>,
	pub navigate: Option<Navigate>,
}
impl Debug for SubmitOverrides {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("SubmitOverrides")
			.field("payload", &self.payload.as_ref().map(describe))
			.field("navigate", &self.navigate.is_some())
			.finish()
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
	/// The response was the latest one and has been applied.
	Applied(IslandResponse),
	/// A newer submission started before this response arrived. Nothing was applied.
	Superseded(IslandResponse),
	/// The request was cancelled by a newer submission or by teardown, or failed after either. Nothing was applied.
	Cancelled,
}

#[derive(Debug)]
enum Settlement {
	Apply(IslandResponse),
	Return(Result<SubmitOutcome, RequestError>),
}

/// Only the latest request of a live island applies its response or reports its failure.
fn settle(outcome: Result<Result<IslandResponse, RequestError>, Aborted>, released: bool, authoritative: bool) -> Settlement {
	match outcome {
		Err(Aborted) | Ok(Err(RequestError::Aborted)) => Settlement::Return(Ok(SubmitOutcome::Cancelled)),
		Ok(Err(error)) if authoritative => Settlement::Return(Err(error)),
		Ok(Ok(response)) if authoritative => Settlement::Apply(response),
		Ok(Ok(response)) if !released => Settlement::Return(Ok(SubmitOutcome::Superseded(response))),
		Ok(_) => Settlement::Return(Ok(SubmitOutcome::Cancelled)),
	}
}

struct PendingRequest {
	id: u64,
	cancel: CancelToken,
}

pub(crate) struct FormInner {
	island: Island,
	initial_data: Props,
	fixed_params: Props,
	clear_field_errors_on_change: bool,
	data: RefCell<Props>,
	errors: RefCell<FieldErrors>,
	processing: Cell<bool>,
	last_request_id: Cell<u64>,
	pending: RefCell<Option<PendingRequest>>,
	watchers: Watchers<()>,
}
impl FormInner {
	pub(crate) fn cancel_pending(&self) {
		let pending = self.pending.borrow_mut().take();
		if let Some(pending) = pending {
			trace!(request = pending.id, "Cancelled in-flight request.");
			pending.cancel.cancel();
		}
	}

	fn begin(&self) -> (u64, CancelToken, AbortRegistration) {
		let previous = self.pending.borrow_mut().take();
		if let Some(previous) = previous {
			debug!(request = previous.id, "Superseding in-flight request.");
			previous.cancel.cancel();
		}

		let id = self.last_request_id.get() + 1;
		self.last_request_id.set(id);
		let (cancel, registration) = CancelToken::new_pair();
		*self.pending.borrow_mut() = Some(PendingRequest { id, cancel: cancel.clone() });
		(id, cancel, registration)
	}

	fn request(&self, method: Method, operation: &str, overrides: SubmitOverrides, cancel: CancelToken) -> IslandRequest {
		let config = self.island.config();

		let mut payload = self.data.borrow().clone();
		if method != Method::Post {
			payload.insert(config.method_param.clone(), Value::from(method.as_str()));
		}

		let mut fixed_params = self.island.params().clone();
		fixed_params.extend(self.fixed_params.clone());
		if let Some(stream) = self.island.stream() {
			fixed_params.insert(config.stream_param.clone(), Value::from(stream));
		}

		IslandRequest {
			component: self.island.component().to_owned(),
			operation: operation.to_owned(),
			method,
			payload,
			fixed_params,
			payload_override: overrides.payload,
			navigate: overrides.navigate,
			cancel,
		}
	}

	fn apply(&self, response: &IslandResponse) {
		match response {
			IslandResponse::Ok { props, version } => {
				self.errors.borrow_mut().clear();
				let _ = self.island.state().merge_response(props.clone(), *version);
			}
			IslandResponse::ValidationError { errors } => {
				*self.errors.borrow_mut() = errors.clone();
			}
			IslandResponse::Forbidden => {
				let config = self.island.config();
				let mut errors = FieldErrors::new();
				errors.insert(config.base_error_key.clone(), vec![config.forbidden_message.clone()]);
				*self.errors.borrow_mut() = errors;
			}
		}
	}
}

/// Form state bound to one island: field data, per-field errors and the `processing` (submitting) flag.
///
/// Cloning yields another handle to the same form.
#[derive(Clone)]
pub struct IslandForm(Rc<FormInner>);
impl IslandForm {
	pub(crate) fn new(island: Island, options: FormOptions) -> Self {
		Self(Rc::new(FormInner {
			island,
			data: RefCell::new(options.initial_data.clone()),
			initial_data: options.initial_data,
			fixed_params: options.fixed_params,
			clear_field_errors_on_change: options.clear_field_errors_on_change,
			errors: RefCell::new(FieldErrors::new()),
			processing: Cell::new(false),
			last_request_id: Cell::new(0),
			pending: RefCell::new(None),
			watchers: Watchers::new(),
		}))
	}

	pub(crate) fn downgrade(&self) -> Weak<FormInner> {
		Rc::downgrade(&self.0)
	}

	#[must_use]
	pub fn island(&self) -> &Island {
		&self.0.island
	}

	#[must_use]
	pub fn data(&self) -> Props {
		self.0.data.borrow().clone()
	}

	#[must_use]
	pub fn errors(&self) -> FieldErrors {
		self.0.errors.borrow().clone()
	}

	/// Whether a submission is in flight.
	#[must_use]
	pub fn is_processing(&self) -> bool {
		self.0.processing.get()
	}

	/// Updates one field. Unless configured otherwise, this also clears that field's errors.
	///
	/// Never touches the island's props.
	pub fn set_data(&self, field: &str, value: Value) {
		self.0.data.borrow_mut().insert(field.to_owned(), value);
		if self.0.clear_field_errors_on_change {
			self.0.errors.borrow_mut().remove(field);
		}
		self.0.watchers.notify(&());
	}

	/// Restores the initial data and clears errors.
	///
	/// In-flight requests and the island's state are unaffected.
	pub fn reset(&self) {
		*self.0.data.borrow_mut() = self.0.initial_data.clone();
		self.0.errors.borrow_mut().clear();
		self.0.watchers.notify(&());
	}

	/// Calls `callback` whenever data, errors or `processing` change.
	#[must_use = "The callback is unregistered as soon as the `Watch` is dropped."]
	pub fn watch(&self, callback: impl Fn() + 'static) -> Watch {
		self.0.watchers.watch(move |_: &()| callback())
	}

	/// # Errors
	///
	/// See [`IslandForm::submit`].
	pub async fn post(&self, operation: &str) -> Result<SubmitOutcome, RequestError> {
		self.submit(Method::Post, operation, SubmitOverrides::default()).await
	}

	/// # Errors
	///
	/// See [`IslandForm::submit`].
	pub async fn put(&self, operation: &str) -> Result<SubmitOutcome, RequestError> {
		self.submit(Method::Put, operation, SubmitOverrides::default()).await
	}

	/// # Errors
	///
	/// See [`IslandForm::submit`].
	pub async fn patch(&self, operation: &str) -> Result<SubmitOutcome, RequestError> {
		self.submit(Method::Patch, operation, SubmitOverrides::default()).await
	}

	/// # Errors
	///
	/// See [`IslandForm::submit`].
	pub async fn delete(&self, operation: &str) -> Result<SubmitOutcome, RequestError> {
		self.submit(Method::Delete, operation, SubmitOverrides::default()).await
	}

	/// Submits the form's data, cancelling any request this form still has in flight.
	///
	/// Only the most recent submission's response is applied:
	///
	/// - `ok` merges the response's props into the island's state and clears all errors,
	/// - `validation-error` replaces the errors,
	/// - `forbidden` replaces the errors with a single base error.
	///
	/// The `processing` flag is only cleared by the most recent submission.
	///
	/// # Errors
	///
	/// Iff the executor failed for a reason other than cancellation.
	/// Stale and cancelled results are not errors.
	#[instrument(skip(self, overrides), fields(component = %self.0.island.component()))]
	pub async fn submit(&self, method: Method, operation: &str, overrides: SubmitOverrides) -> Result<SubmitOutcome, RequestError> {
		let inner = &self.0;
		if inner.island.is_released() {
			debug!("Not submitting for a released island.");
			return Ok(SubmitOutcome::Cancelled);
		}

		let (request_id, cancel, registration) = inner.begin();
		inner.processing.set(true);
		inner.watchers.notify(&());

		let request = inner.request(method, operation, overrides, cancel);
		debug!(request = request_id, payload = %describe(&request.payload), "Dispatching request.");
		let execution = inner.island.executor().execute(request);
		let outcome = Abortable::new(execution, registration).await;

		let released = inner.island.is_released();
		let authoritative = !released && inner.last_request_id.get() == request_id;
		let result = match settle(outcome, released, authoritative) {
			Settlement::Apply(response) => {
				debug!(request = request_id, status = response.status(), "Applying response.");
				inner.apply(&response);
				Ok(SubmitOutcome::Applied(response))
			}
			Settlement::Return(result) => {
				trace!(request = request_id, latest = inner.last_request_id.get(), released, ?result, "Settled without applying.");
				result
			}
		};

		if authoritative {
			inner.pending.borrow_mut().take();
			inner.processing.set(false);
			inner.watchers.notify(&());
		}
		result
	}
}
impl Debug for IslandForm {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("IslandForm")
			.field("island", &self.0.island)
			.field("data", &describe(&self.0.data.borrow()))
			.field("errors", &self.0.errors.borrow())
			.field("processing", &self.0.processing.get())
			.field("last_request_id", &self.0.last_request_id.get())
			.finish()
	}
}
