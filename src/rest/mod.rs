//! Declarative REST calls
//!
//! Provider APIs describe their operations with [`ApiDescriptor`] and
//! [`CallDescriptor`]; the [`RestProcessor`] turns an [`Invocation`] into an
//! [`HttpRequest`](crate::http::HttpRequest), and parsers and fallbacks shape
//! the outcome.

pub mod binders;
pub mod descriptor;
pub mod fallbacks;
pub mod options;
pub mod parsers;
pub mod processor;

pub use binders::Binder;
pub use descriptor::{ApiDescriptor, CallDescriptor, Invocation, ParamBinding, ParamKind, ParamValue};
pub use fallbacks::{
    EmptyListOnNotFoundOr404, Fallback, FalseOnNotFoundOr404, NullOnNotFoundOr404,
    TrueOnNotFoundOr404, VoidOnNotFoundOr404,
};
pub use options::RequestOptions;
pub use parsers::{
    ParseETagHeader, ParseFirstJsonValueNamed, ParseJson, ParseJsonWrapped, ReleasePayloadAndReturn,
    ResponseParser, ReturnStringIf2xx, ReturnTrueIf2xx,
};
pub use processor::RestProcessor;
