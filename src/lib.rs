//! multicloud - one portable facade over heterogeneous cloud provider APIs
//!
//! Build a [`Context`] for a provider or api id with [`ContextBuilder`], then
//! talk to the provider either through declarative REST calls
//! ([`rest`]) or through the portable [`compute`] and [`blobstore`] views.

pub mod blobstore;
pub mod compute;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod logging;
pub mod providers;
pub mod rest;

pub use config::{Config, Properties};
pub use context::{Context, ContextBuilder, ProviderMetadata, View};
pub use error::{Error, ProviderError, Result};
