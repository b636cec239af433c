//! Portable compute
//!
//! A provider supplies a [`ComputeServiceAdapter`] in its own types and a
//! [`PortableTransform`] into the portable domain; [`ComputeService`] builds
//! groups, templates and bulk operations on top.

pub mod adapter;
pub mod domain;
pub mod naming;
pub mod predicates;
pub mod service;
pub mod stub;
pub mod template;

pub use adapter::{ComputeServiceAdapter, IdentityTransform, NodeAndInitialCredentials, PortableTransform};
pub use domain::{
    Hardware, Image, ImageConstraint, ImageStatus, Location, LocationScope, LoginCredentials, NodeMetadata,
    NodeStatus, OperatingSystem, OsFamily, Processor, Template, TemplateOptions, Volume, VolumeType,
};
pub use naming::GroupNamingConvention;
pub use service::{ComputeService, NodeTimeouts, RunNodesError};
pub use stub::StubComputeServiceAdapter;
pub use template::{TemplateBuilder, TemplateBuilderSpec};
