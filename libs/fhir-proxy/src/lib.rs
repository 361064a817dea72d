//! FHIR federation proxy.
//!
//! Routes FHIR interactions to registered external endpoints, fans searches
//! out across every endpoint supporting the resource type, and caches OAuth2
//! client-credentials tokens with single-flight refresh.

pub mod error;
pub mod service;
pub mod store;
pub mod token;
pub mod types;

pub use error::FhirProxyError;
pub use service::{FhirProxy, DEFAULT_FANOUT_TIMEOUT};
pub use store::{EndpointStore, MemoryEndpointStore};
pub use token::TokenCache;
pub use types::{
    extract_supported_resources, AuthType, EndpointStatus, FhirEndpointConfig, FhirOperation,
    FhirRequest, FhirResponse, HealthStatus, RegisterEndpoint,
};

pub type Result<T> = std::result::Result<T, FhirProxyError>;
