//! Single-use builders for one JSON-RPC call.
//!
//! A [`RequestBuilder`] accumulates a method name, named parameters and the
//! expected result type locally. Nothing is sent until
//! [`RequestBuilder::execute`] hands the call to the [`RpcClient`], after
//! which the builder is spent: executing it again fails with
//! [`RpcError::InvalidRequestState`].

use std::marker::PhantomData;

use kiota_serialization::{JSON_CONTENT_TYPE, Serializable, SerializationWriterFactory};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::client::{ResponseHandle, RpcClient};
use crate::error::RpcError;

/// Accumulates one call's method, parameters and result type.
///
/// Parameters are sent as a JSON object keyed by parameter name. Encoding
/// failures are remembered and reported by [`RequestBuilder::execute`], so
/// the fluent chain itself never fails.
///
/// # Example
///
/// ```no_run
/// use kiota_rpc::{ProcessConfig, RpcClient};
///
/// let client = RpcClient::new(ProcessConfig::kiota_default())?;
/// let mut request = client
///     .create_request()
///     .method("Search")
///     .param("searchTerm", "github")
///     .param("clearCache", false)
///     .return_as::<serde_json::Value>();
/// let handle = request.execute()?;
/// let results = handle.wait()?;
/// # drop(results);
/// # Ok::<(), kiota_rpc::RpcError>(())
/// ```
#[must_use = "a request builder does nothing until executed"]
pub struct RequestBuilder<'c, R = Value> {
    client: &'c RpcClient,
    method: Option<String>,
    params: Map<String, Value>,
    deferred_error: Option<String>,
    executed: bool,
    returns: PhantomData<fn() -> R>,
}

impl<'c> RequestBuilder<'c, Value> {
    pub(crate) fn new(client: &'c RpcClient) -> Self {
        Self {
            client,
            method: None,
            params: Map::new(),
            deferred_error: None,
            executed: false,
            returns: PhantomData,
        }
    }
}

impl<'c, R> RequestBuilder<'c, R> {
    /// Sets the remote method name.
    pub fn method(mut self, name: impl Into<String>) -> Self {
        self.method = Some(name.into());
        self
    }

    /// Adds or replaces a named parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(value) => {
                self.params.insert(key, value);
            }
            Err(e) => self.defer(format!("parameter '{key}' could not be encoded: {e}")),
        }
        self
    }

    /// Adds a structured parameter serialised through `factory`.
    ///
    /// The factory must produce `application/json`; any other content type
    /// cannot be embedded in a JSON-RPC message.
    pub fn param_object(
        mut self,
        key: impl Into<String>,
        value: &dyn Serializable,
        factory: &dyn SerializationWriterFactory,
    ) -> Self {
        let key = key.into();
        match encode_object(value, factory) {
            Ok(value) => {
                self.params.insert(key, value);
            }
            Err(message) => self.defer(format!("parameter '{key}' could not be encoded: {message}")),
        }
        self
    }

    /// Declares the type the result is decoded into.
    pub fn return_as<T>(self) -> RequestBuilder<'c, T> {
        RequestBuilder {
            client: self.client,
            method: self.method,
            params: self.params,
            deferred_error: self.deferred_error,
            executed: self.executed,
            returns: PhantomData,
        }
    }

    /// The method name set so far.
    #[must_use]
    pub fn method_name(&self) -> Option<&str> {
        self.method.as_deref()
    }

    /// The parameters collected so far.
    #[must_use]
    pub const fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    /// Returns `true` once the builder has been executed.
    #[must_use]
    pub const fn is_executed(&self) -> bool {
        self.executed
    }

    fn defer(&mut self, message: String) {
        if self.deferred_error.is_none() {
            self.deferred_error = Some(message);
        }
    }
}

impl<R: DeserializeOwned> RequestBuilder<'_, R> {
    /// Dispatches the call and returns a handle for its result.
    ///
    /// The builder is spent by the first call, whether or not dispatch
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::InvalidRequestState`] when the builder was already
    /// executed or has no method, [`RpcError::Codec`] when a parameter
    /// failed to encode, or the dispatch error from the client.
    pub fn execute(&mut self) -> Result<ResponseHandle<R>, RpcError> {
        if std::mem::replace(&mut self.executed, true) {
            return Err(RpcError::invalid_state(
                "request builder was already executed",
            ));
        }
        let method = match self.method.take() {
            Some(method) if !method.trim().is_empty() => method,
            _ => return Err(RpcError::invalid_state("no method name was set")),
        };
        if let Some(message) = self.deferred_error.take() {
            return Err(RpcError::Codec { message });
        }
        let params = Value::Object(std::mem::take(&mut self.params));
        self.client.dispatch(&method, params)
    }

    /// Executes the call and blocks for its result.
    ///
    /// # Errors
    ///
    /// As for [`RequestBuilder::execute`] and [`ResponseHandle::wait`].
    pub fn call(&mut self) -> Result<R, RpcError> {
        self.execute()?.wait()
    }
}

impl<R> std::fmt::Debug for RequestBuilder<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("method", &self.method)
            .field("params", &self.params)
            .field("executed", &self.executed)
            .finish_non_exhaustive()
    }
}

fn encode_object(
    value: &dyn Serializable,
    factory: &dyn SerializationWriterFactory,
) -> Result<Value, String> {
    let mut writer = factory.writer(JSON_CONTENT_TYPE).map_err(|e| e.to_string())?;
    value.serialize(writer.as_mut()).map_err(|e| e.to_string())?;
    let content = writer.serialized_content().map_err(|e| e.to_string())?;
    serde_json::from_slice(&content).map_err(|e| e.to_string())
}
