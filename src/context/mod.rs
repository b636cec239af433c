//! Context construction
//!
//! A [`ContextBuilder`] resolves the layered properties for one provider or
//! api, then wires the HTTP client, the request processor and the
//! authentication filter into a [`Context`]. Portable views are handed out
//! from the context for providers with an in-process implementation.

pub mod registry;

use std::fmt;
use std::sync::Arc;
use url::Url;

use crate::blobstore::{transient, BlobStore, TransientBlobStore};
use crate::compute::{
    stub, ComputeService, ComputeServiceAdapter, Hardware, IdentityTransform, Image, Location, NodeMetadata,
    NodeTimeouts, StubComputeServiceAdapter,
};
use crate::config::{default_properties, keys, Config, Properties};
use crate::error::{Error, Result};
use crate::http::filters::{BasicAuthentication, BearerToken, RequestFilter};
use crate::http::handlers::{BackoffLimitedRetryHandler, DelegatingRetryHandler, RedirectionRetryHandler};
use crate::http::{HttpClient, HttpClientConfig, HttpResponse};
use crate::providers::{error_handler_for, RetryOnOverLimit};
use crate::rest::{ApiDescriptor, Invocation, ResponseParser, RestProcessor};

pub use registry::{AuthScheme, ProviderMetadata, View};

/// Adapter already speaking the portable types, behind a trait object
pub type PortableAdapter =
    dyn ComputeServiceAdapter<Node = NodeMetadata, Hardware = Hardware, Image = Image, Location = Location>;

/// Compute view handed out by a [`Context`]
pub type PortableComputeService = ComputeService<PortableAdapter, IdentityTransform>;

// =============================================================================
// Builder
// =============================================================================

#[derive(Debug, Clone)]
pub struct ContextBuilder {
    metadata: ProviderMetadata,
    name: Option<String>,
    identity: Option<String>,
    credential: Option<String>,
    endpoint: Option<String>,
    api_version: Option<String>,
    build_version: Option<String>,
    config: Option<Config>,
    overrides: Properties,
}

impl ContextBuilder {
    /// Start from a provider id, or an api id when no provider matches.
    pub fn new(provider_or_api: &str) -> Result<Self> {
        Ok(Self::from_metadata(ProviderMetadata::lookup(provider_or_api)?))
    }

    pub fn from_metadata(metadata: ProviderMetadata) -> Self {
        Self {
            metadata,
            name: None,
            identity: None,
            credential: None,
            endpoint: None,
            api_version: None,
            build_version: None,
            config: None,
            overrides: Properties::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn credentials(mut self, identity: impl Into<String>, credential: Option<&str>) -> Self {
        self.identity = Some(identity.into());
        self.credential = credential.map(str::to_string);
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    pub fn build_version(mut self, version: impl Into<String>) -> Self {
        self.build_version = Some(version.into());
        self
    }

    /// Settings remembered in the user config; overrides still win.
    pub fn config(mut self, config: &Config) -> Self {
        self.config = Some(config.clone());
        self
    }

    pub fn overrides(mut self, overrides: Properties) -> Self {
        self.overrides.extend(&overrides);
        self
    }

    pub fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    /// Properties before resolution, lowest layer first: built-in defaults,
    /// registry defaults, user config, overrides, then the values set on
    /// this builder.
    pub fn unresolved_properties(&self) -> Properties {
        let id = &self.metadata.id;
        let mut props = default_properties();
        props.extend(&self.metadata.default_properties());
        if let Some(config) = &self.config {
            props.extend(&config.to_properties(id));
        }
        props.extend(&self.overrides);

        let explicit = [
            (keys::ENDPOINT, &self.endpoint),
            (keys::API_VERSION, &self.api_version),
            (keys::BUILD_VERSION, &self.build_version),
            (keys::IDENTITY, &self.identity),
            (keys::CREDENTIAL, &self.credential),
        ];
        for (key, value) in explicit {
            if let Some(value) = value {
                props.set(format!("{}.{}", id, key), value.clone());
            }
        }
        props
    }

    pub fn build(self) -> Result<Context> {
        let id = self.metadata.id.clone();
        let mut props = self.unresolved_properties();

        let endpoint = props.require_scoped(&id, keys::ENDPOINT)?;
        let api = props.require_scoped(&id, keys::API)?;
        let api_version = props.require_scoped(&id, keys::API_VERSION)?;
        let build_version = props.take_scoped(&id, keys::BUILD_VERSION);
        let identity = if self.metadata.identity_name.is_some() {
            Some(props.require_scoped(&id, keys::IDENTITY)?)
        } else {
            props.take_scoped(&id, keys::IDENTITY)
        };
        let credential = if self.metadata.credential_name.is_some() {
            Some(props.require_scoped(&id, keys::CREDENTIAL)?)
        } else {
            props.take_scoped(&id, keys::CREDENTIAL)
        };

        let endpoint = Url::parse(&endpoint)?;
        let http_client = build_http_client(&id, &api, &props)?;

        let mut processor = RestProcessor::new(Some(endpoint.clone()))
            .with_api_version(api_version.clone())
            .with_strip_expect_header(props.get_bool(&id, keys::STRIP_EXPECT_HEADER)?.unwrap_or(false));
        if let Some(build) = &build_version {
            processor = processor.with_build_version(build.clone());
        }

        let auth_filter: Option<Arc<dyn RequestFilter>> = match self.metadata.auth {
            AuthScheme::None => None,
            AuthScheme::Basic => Some(Arc::new(BasicAuthentication::new(
                identity.as_deref().unwrap_or_default(),
                credential.as_deref().unwrap_or_default(),
            ))),
            AuthScheme::Bearer => credential
                .clone()
                .map(|token| Arc::new(BearerToken::new(token)) as Arc<dyn RequestFilter>),
        };

        let compute = if api == stub::PROVIDER {
            let adapter: Arc<PortableAdapter> = Arc::new(StubComputeServiceAdapter::new());
            Some(
                ComputeService::from_arc(adapter, IdentityTransform)
                    .with_timeouts(NodeTimeouts::from_properties(&id, &props)?),
            )
        } else {
            None
        };
        let blobstore: Option<Arc<dyn BlobStore>> = if api == transient::PROVIDER {
            Some(Arc::new(TransientBlobStore::new()))
        } else {
            None
        };

        let name = self.name.unwrap_or_else(|| id.clone());
        tracing::info!("Built context {} for api {} {} at {}", name, api, api_version, endpoint);

        Ok(Context {
            name,
            metadata: self.metadata,
            api,
            api_version,
            endpoint,
            identity,
            properties: props,
            http_client,
            processor,
            auth_filter,
            compute,
            blobstore,
        })
    }
}

fn build_http_client(id: &str, api: &str, props: &Properties) -> Result<HttpClient> {
    let config = HttpClientConfig::from_properties(id, props)?;
    let client = HttpClient::new(&config)?.with_error_handler(error_handler_for(api));
    Ok(match api {
        "openstack-nova" | "swift" => {
            let retry = DelegatingRetryHandler::new(
                BackoffLimitedRetryHandler::new(config.max_retries, config.retry_delay_start),
                RedirectionRetryHandler::new(config.max_redirects),
            )
            .with_client(Arc::new(RetryOnOverLimit::default()));
            client.with_retry_handler(Arc::new(retry))
        }
        _ => client,
    })
}

// =============================================================================
// Context
// =============================================================================

/// A configured connection to one provider
pub struct Context {
    name: String,
    metadata: ProviderMetadata,
    api: String,
    api_version: String,
    endpoint: Url,
    identity: Option<String>,
    properties: Properties,
    http_client: HttpClient,
    processor: RestProcessor,
    auth_filter: Option<Arc<dyn RequestFilter>>,
    compute: Option<PortableComputeService>,
    blobstore: Option<Arc<dyn BlobStore>>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name)
            .field("id", &self.metadata.id)
            .field("api", &self.api)
            .field("endpoint", &self.endpoint.as_str())
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    /// Api id after property resolution
    pub fn api(&self) -> &str {
        &self.api
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Properties left after the connection keys were resolved
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn http_client(&self) -> &HttpClient {
        &self.http_client
    }

    pub fn processor(&self) -> &RestProcessor {
        &self.processor
    }

    pub fn auth_filter(&self) -> Option<&Arc<dyn RequestFilter>> {
        self.auth_filter.as_ref()
    }

    /// An api descriptor that signs its calls with this context's credentials.
    pub fn api_descriptor(&self, name: impl Into<String>) -> ApiDescriptor {
        let api = ApiDescriptor::new(name);
        match &self.auth_filter {
            Some(filter) => api.filter(Arc::clone(filter)),
            None => api,
        }
    }

    /// Build the request for `invocation` and send it.
    pub async fn invoke(&self, invocation: &Invocation<'_>) -> Result<HttpResponse> {
        let request = self.processor.create_request(invocation)?;
        self.http_client.invoke(request).await
    }

    pub async fn invoke_and_parse<T>(
        &self,
        invocation: &Invocation<'_>,
        parser: &dyn ResponseParser<T>,
    ) -> Result<T> {
        let request = self.processor.create_request(invocation)?;
        self.http_client.invoke_and_parse(request, parser).await
    }

    pub fn compute(&self) -> Result<&PortableComputeService> {
        self.check_view(View::Compute)?;
        self.compute.as_ref().ok_or_else(|| self.no_in_process_view(View::Compute))
    }

    pub fn blobstore(&self) -> Result<Arc<dyn BlobStore>> {
        self.check_view(View::BlobStore)?;
        self.blobstore
            .clone()
            .ok_or_else(|| self.no_in_process_view(View::BlobStore))
    }

    fn check_view(&self, view: View) -> Result<()> {
        if self.metadata.supports(view) {
            Ok(())
        } else {
            Err(Error::UnsupportedOperation(format!(
                "{} does not provide a {} view",
                self.metadata.id, view
            )))
        }
    }

    fn no_in_process_view(&self, view: View) -> Error {
        Error::UnsupportedOperation(format!(
            "{} view of api {} has no in-process implementation",
            view, self.api
        ))
    }
}
