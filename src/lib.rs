//! fhir-rest-client - declarative REST client binding
//!
//! Client interfaces are declared once as operation tables and turned into
//! live clients by a [`ClientFactory`], which also checks that each server
//! speaks a compatible protocol version before it is trusted.

pub mod binding;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod factory;
pub mod generic;
pub mod interceptor;
pub mod output;
pub mod transport;
pub mod validation;
pub mod version;

pub use binding::{
    Arguments, BindingTable, InterfaceDeclaration, OperationBinding, OperationMeta, ParamRole,
    RestfulClient,
};
pub use codec::{Codec, JsonCodec, ResultShape};
pub use config::FactoryConfig;
pub use dispatch::ClientDispatcher;
pub use error::{ClientError, Result};
pub use factory::{ClientFactory, ClientFactoryBuilder};
pub use generic::GenericClient;
pub use interceptor::{BasicAuthInterceptor, BearerTokenInterceptor, ClientInterceptor};
pub use output::OutputEnvelope;
pub use transport::{
    Transport, TransportConfig, TransportFactory, TransportOptions, WireRequest, WireResponse,
};
pub use validation::{ValidationMode, ValidationState};
pub use version::{ProtocolVersion, VersionTag};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
