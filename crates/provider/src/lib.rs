//! Generation provider adapters.
//!
//! A provider is opaque to the pipeline: given a prompt, a model, optional
//! reference images, and an output spec it returns one or more binary
//! artifacts or a typed [`ProviderError`]. Adapters are looked up by name
//! in a [`ProviderRegistry`].

pub mod adapter;
pub mod error;
pub mod http;
pub mod registry;

pub use adapter::{
    Artifact, GenerationProvider, NoopProgress, ProgressSink, ProviderRequest, ResolvedImage,
};
pub use error::ProviderError;
pub use http::HttpProvider;
pub use registry::ProviderRegistry;
