//! Resolution primitives: dynamically typed resource values, declared
//! signatures, and the errors surfaced by the wiring process.
//!
//! Resources are name-keyed, so their values are dynamically typed: a
//! provider produces a [Value] and consumers recover the concrete type
//! through [ResolvedArgs]. Signatures are declared explicitly at
//! registration time as an ordered list of parameter names, optional
//! defaults and a variadic marker, standing in for the parameter
//! introspection a dynamic language would perform.

use std::any::Any;
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;

/// A resolved resource value, shared between all of its consumers.
pub type Value = Arc<dyn Any + Send + Sync>;

/// The name → value map handed to interceptors and consumers.
pub type AttrMap = IndexMap<String, Value>;

/// Wrap a concrete value for storage in the injector.
pub fn to_value<T: Send + Sync + 'static>(value: T) -> Value {
    Arc::new(value)
}

/// Errors raised when a signature is invoked: malformed shapes, parameters
/// that no override, provider or default can satisfy, and failed downcasts
/// of resolved values.
#[derive(Error, Debug)]
pub enum InjectionError {
    #[error("signature of `{consumer}` mixes a variadic catch-all with keyword-only parameters")]
    IllegalSignature { consumer: String },
    #[error("no value for required parameter `{param}` of `{consumer}`")]
    Unresolved { consumer: String, param: String },
    #[error("no provider is registered for resource `{name}`")]
    UnknownResource { name: String },
    #[error("argument `{param}` is missing from the resolved set")]
    MissingArgument { param: String },
    #[error("argument `{param}` does not have the expected type")]
    TypeMismatch { param: String },
}

/// A cycle in the provider reference graph, detected once at injector
/// construction, before any resource is produced.
#[derive(Error, Debug)]
#[error("circular provider dependency: {}", .cycle.join(" -> "))]
pub struct CircularDependencyError {
    /// The offending resource names, in reference order; the first name is
    /// repeated at the end to close the loop.
    pub cycle: Vec<String>,
}

/// A resolved parameter set, as handed to a provider closure, constructor
/// or injection method after interception.
pub struct ResolvedArgs {
    values: AttrMap,
}

impl ResolvedArgs {
    pub(crate) fn new(values: AttrMap) -> Self {
        Self { values }
    }

    /// Clone the argument out of its shared cell.
    pub fn get<T>(&self, name: &str) -> Result<T, InjectionError>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.shared::<T>(name).map(|arc| (*arc).clone())
    }

    /// Borrow the argument as a shared handle, without cloning the value.
    pub fn shared<T>(&self, name: &str) -> Result<Arc<T>, InjectionError>
    where
        T: Send + Sync + 'static,
    {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| InjectionError::MissingArgument { param: name.to_owned() })?;
        value
            .clone()
            .downcast::<T>()
            .map_err(|_| InjectionError::TypeMismatch { param: name.to_owned() })
    }

    /// The raw value, if present.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Argument names, in signature order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// A declared formal parameter list.
///
/// Parameters added after [variadic](Signature::variadic) are keyword-only,
/// mirroring how a catch-all positional slot splits a parameter list. Such
/// a combination cannot be satisfied by name-based injection and is
/// rejected when the signature is invoked, not earlier: a malformed
/// provider that is never needed costs nothing.
#[derive(Clone, Default)]
pub struct Signature {
    params: Vec<Param>,
    variadic: bool,
}

#[derive(Clone)]
pub struct Param {
    name: String,
    default: Option<Value>,
    keyword_only: bool,
}

impl Param {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a required named parameter.
    pub fn param(mut self, name: &str) -> Self {
        self.params.push(Param {
            name: name.to_owned(),
            default: None,
            keyword_only: self.variadic,
        });
        self
    }

    /// Declare a named parameter with a default, used when no provider is
    /// registered under that name and no override is supplied.
    pub fn param_with_default<T: Send + Sync + 'static>(mut self, name: &str, default: T) -> Self {
        self.params.push(Param {
            name: name.to_owned(),
            default: Some(to_value(default)),
            keyword_only: self.variadic,
        });
        self
    }

    /// Declare a variadic catch-all positional slot. The slot itself is
    /// never injected; parameters declared after it become keyword-only.
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Declared parameter names, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name.as_str())
    }

    pub(crate) fn is_illegal(&self) -> bool {
        self.variadic && self.params.iter().any(|p| p.keyword_only)
    }
}
