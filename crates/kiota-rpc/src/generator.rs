//! Convenience client for the Kiota generator's RPC mode.

use serde_json::Value;

use crate::client::RpcClient;
use crate::config::ProcessConfig;
use crate::error::RpcError;
use crate::request::RequestBuilder;

/// An [`RpcClient`] bound to `kiota rpc`.
///
/// Methods are addressed by name; no generator method is modelled here.
///
/// ```no_run
/// use kiota_rpc::GeneratorClient;
///
/// let generator = GeneratorClient::new()?;
/// let version: String = generator.create_request("GetVersion").call()?;
/// println!("kiota {version}");
/// # Ok::<(), kiota_rpc::RpcError>(())
/// ```
#[derive(Debug)]
pub struct GeneratorClient {
    client: RpcClient,
}

impl GeneratorClient {
    /// Starts `kiota rpc` from `PATH`.
    ///
    /// # Errors
    ///
    /// Returns a launch error when the generator cannot be started.
    pub fn new() -> Result<Self, RpcError> {
        Self::with_config(ProcessConfig::kiota_default())
    }

    /// Starts the generator described by `config`.
    ///
    /// # Errors
    ///
    /// Returns a launch error when the generator cannot be started.
    pub fn with_config(config: ProcessConfig) -> Result<Self, RpcError> {
        Ok(Self {
            client: RpcClient::new(config)?,
        })
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn from_client(client: RpcClient) -> Self {
        Self { client }
    }

    /// Returns a builder with `method` and the result type already set.
    pub fn create_request<R>(&self, method: &str) -> RequestBuilder<'_, R> {
        self.client.create_request().method(method).return_as::<R>()
    }

    /// Returns a builder for a call whose result stays untyped.
    pub fn create_untyped_request(&self, method: &str) -> RequestBuilder<'_, Value> {
        self.create_request(method)
    }

    /// The underlying client.
    #[must_use]
    pub const fn client(&self) -> &RpcClient {
        &self.client
    }

    /// Stops the generator and fails any pending call.
    pub fn close(&self) {
        self.client.close();
    }
}
