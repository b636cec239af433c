//! Per-provider error translation
//!
//! Each provider reports failures its own way: XML attributes, SOAP faults,
//! JSON envelopes or plain text. The handlers here parse the vendor error out
//! of the response body and pick a portable [`Error`] through a small
//! decision table. The vendor error stays attached as the source.

pub mod aws;
pub mod cloudstack;
pub mod elasticstack;
pub mod openstack;
pub mod terremark;
pub mod ultradns;
pub mod vcloud;
pub mod xml;

use std::sync::Arc;

use crate::error::{Error, ProviderError};
use crate::http::handlers::{http_response_error, HttpErrorHandler, MapHttp4xxCodesToErrors};
use crate::http::request::{HttpCommand, HttpResponse};

pub use aws::AwsErrorHandler;
pub use cloudstack::CloudStackErrorHandler;
pub use elasticstack::ElasticStackErrorHandler;
pub use openstack::{OpenStackErrorHandler, RetryOnOverLimit};
pub use terremark::TerremarkErrorHandler;
pub use ultradns::UltraDnsWsErrorHandler;
pub use vcloud::VCloudErrorHandler;

/// Error handler for an api id from the provider registry.
pub fn error_handler_for(api_id: &str) -> Arc<dyn HttpErrorHandler> {
    match api_id {
        "vcloud" => Arc::new(VCloudErrorHandler),
        "trmk-vcloudexpress" | "trmk-ecloud" => Arc::new(TerremarkErrorHandler),
        "elasticstack" | "cloudsigma" => Arc::new(ElasticStackErrorHandler),
        "ultradns-ws" => Arc::new(UltraDnsWsErrorHandler),
        "cloudstack" => Arc::new(CloudStackErrorHandler),
        "openstack-nova" | "swift" => Arc::new(OpenStackErrorHandler),
        "ec2" | "s3" => Arc::new(AwsErrorHandler),
        _ => Arc::new(MapHttp4xxCodesToErrors),
    }
}

/// Portable error kinds a decision table can pick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Portable {
    NotFound,
    Authorization,
    IllegalState,
    IllegalArgument,
    Insufficient,
    AlreadyExists,
}

impl Portable {
    pub(crate) fn error(self, message: String, vendor: Option<ProviderError>) -> Error {
        let error = match self {
            Portable::NotFound => Error::not_found(message),
            Portable::Authorization => Error::authorization(message),
            Portable::IllegalState => Error::illegal_state(message),
            Portable::IllegalArgument => Error::illegal_argument(message),
            Portable::Insufficient => Error::insufficient_resources(message),
            Portable::AlreadyExists => Error::already_exists(message),
        };
        match vendor {
            Some(v) => error.caused_by(v),
            None => error,
        }
    }
}

/// Status-only fallback shared by the tables: the vendor error when one was
/// parsed, otherwise the generic response error.
pub(crate) fn unmapped(
    command: &HttpCommand,
    response: &HttpResponse,
    vendor: Option<ProviderError>,
) -> Error {
    match vendor {
        Some(v) => Error::Provider(v),
        None => http_response_error(command, response),
    }
}

/// Message to report: the vendor's when present, else the generic one.
pub(crate) fn message_or_default(
    command: &HttpCommand,
    response: &HttpResponse,
    vendor: Option<&ProviderError>,
) -> String {
    match vendor {
        Some(v) => v.message.clone(),
        None => http_response_error(command, response).to_string(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::http::request::{HttpCommand, HttpRequest, HttpResponse, Method, Payload};
    use url::Url;

    pub fn command(method: Method, url: &str) -> HttpCommand {
        HttpCommand::new(
            HttpRequest::builder()
                .method(method)
                .endpoint(Url::parse(url).unwrap())
                .build()
                .unwrap(),
        )
    }

    pub fn response(status: u16, message: &str, body: &str) -> HttpResponse {
        let response = HttpResponse::new(status, message);
        if body.is_empty() {
            response
        } else {
            response.with_payload(Payload::from_string(body))
        }
    }
}
