//! Operation declarations and their wire bindings
//!
//! A client interface is a plain struct implementing [`RestfulClient`]. Its
//! [`RestfulClient::declaration`] lists the operations it exposes; the factory
//! turns that list into a [`BindingTable`] once per type and hands every new
//! client a [`crate::ClientDispatcher`] bound to it.
//!
//! ```no_run
//! use fhir_rest_client::{
//!     Arguments, ClientDispatcher, InterfaceDeclaration, OperationMeta, ParamRole,
//!     RestfulClient, Result, ResultShape,
//! };
//! use serde_json::{json, Value};
//!
//! pub struct PatientClient {
//!     dispatcher: ClientDispatcher,
//! }
//!
//! impl RestfulClient for PatientClient {
//!     fn declaration() -> InterfaceDeclaration {
//!         InterfaceDeclaration::new("PatientClient").operation(
//!             OperationMeta::new("readPatient", "GET", "Patient/{id}")
//!                 .param("id", ParamRole::Path)
//!                 .returns(ResultShape::resource("Patient")),
//!         )
//!     }
//!
//!     fn from_dispatcher(dispatcher: ClientDispatcher) -> Self {
//!         Self { dispatcher }
//!     }
//! }
//!
//! impl PatientClient {
//!     pub async fn read_patient(&self, id: &str) -> Result<Value> {
//!         let mut args = Arguments::new();
//!         args.insert("id".to_string(), json!(id));
//!         self.dispatcher.invoke("readPatient", args).await
//!     }
//! }
//! ```

mod operation;
mod table;

pub use operation::OperationBinding;
pub use table::{BindingTable, BindingTableCache};

use crate::codec::ResultShape;
use crate::dispatch::ClientDispatcher;
use serde_json::Value;
use std::collections::HashMap;

/// Named call arguments
pub type Arguments = HashMap<String, Value>;

/// Where an argument goes on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamRole {
    /// Substituted into a `{name}` placeholder of the path template
    Path,
    /// Query string parameter; arrays repeat the parameter
    Query,
    /// Request header
    Header,
    /// Encoded with the codec as the request body
    Body,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamMeta {
    pub name: String,
    pub role: ParamRole,
}

/// Protocol metadata for one declared operation
#[derive(Debug, Clone)]
pub struct OperationMeta {
    pub name: String,
    pub method: String,
    pub path: String,
    pub params: Vec<ParamMeta>,
    pub result: ResultShape,
}

impl OperationMeta {
    pub fn new(name: impl Into<String>, method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method: method.into(),
            path: path.into(),
            params: Vec::new(),
            result: ResultShape::default(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, role: ParamRole) -> Self {
        self.params.push(ParamMeta {
            name: name.into(),
            role,
        });
        self
    }

    pub fn returns(mut self, result: ResultShape) -> Self {
        self.result = result;
        self
    }
}

/// The full operation list of one client interface
#[derive(Debug, Clone)]
pub struct InterfaceDeclaration {
    pub name: String,
    pub operations: Vec<OperationMeta>,
}

impl InterfaceDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operations: Vec::new(),
        }
    }

    pub fn operation(mut self, operation: OperationMeta) -> Self {
        self.operations.push(operation);
        self
    }
}

/// A typed client interface
///
/// `declaration` is consulted once per factory, the first time a client of
/// this type is requested.
pub trait RestfulClient: Sized + Send + Sync + 'static {
    fn declaration() -> InterfaceDeclaration;

    fn from_dispatcher(dispatcher: ClientDispatcher) -> Self;
}
