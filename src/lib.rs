//! Experimental runtime dependency injection crate with named resource providers and modules.
//!
//! # Simple use case
//!
//! ```
//! use ikebana::{provide, Blueprint, Injectable, Injector, Module, Registry, Signature};
//!
//! // Define a module providing named resources
//! struct Greetings;
//!
//! impl Module for Greetings {
//!     fn providers(&self, registry: &mut Registry) {
//!         provide!(registry, name() -> String { "Lain".to_string() });
//!         provide!(registry, greeting(name: String) -> String {
//!             format!("hello, {name}")
//!         });
//!     }
//! }
//!
//! // Define an injectable target consuming a resource by name
//! struct Greeter {
//!     greeting: String,
//! }
//!
//! impl Injectable for Greeter {
//!     fn blueprint() -> Blueprint<Self> {
//!         Blueprint::with_constructor(Signature::new().param("greeting"), |args| {
//!             Ok(Greeter {
//!                 greeting: args.get("greeting")?,
//!             })
//!         })
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Create and use an injector over our module
//! let injector = Injector::new(&Greetings)?;
//! let greeter: Greeter = injector.create()?;
//! assert_eq!(greeter.greeting, "hello, Lain");
//! # Ok(())
//! # }
//! ```
//!
//! # Mechanism
//!
//! Resources are string-named values produced by provider closures that
//! modules register as deferred bindings. The injector is built once from
//! its modules and is immutable afterwards:
//!
//! * The [Module] trait registers [ProviderBinding]s into a [Registry];
//!   scanning walks each module's explicit base chain root-first, so
//!   derived declarations override inherited ones and later modules
//!   override earlier ones.
//! * The dependency graph derived from declared [Signature]s is checked
//!   for cycles inside [InjectorBuilder::build]; a cyclic graph fails
//!   construction with [CircularDependencyError] before any resource is
//!   produced.
//! * The [Injectable] trait describes targets through a [Blueprint]:
//!   a constructor signature plus the injection points run after
//!   construction, including points inherited along an ancestor chain.
//! * [Injector::create] resolves each declared parameter name by
//!   precedence (caller override, registered provider, declared default),
//!   memoizing every provider result for the injector's lifetime, and
//!   passes each resolved parameter map through the registered
//!   interceptors before its consumer sees it.
//!
//! The [shell] module is an unrelated convenience wrapper around
//! subprocess execution; it shares no state with the injection engine.

mod graph;
mod inject;
mod module;
mod resolve;
mod target;

#[cfg(feature = "shell")]
pub mod shell;

pub use inject::{ConsumerInfo, ConsumerKind, Injector, InjectorBuilder, Overrides};
pub use module::{BindingBuilder, Module, ProviderBinding, Registry};
pub use resolve::{
    to_value, AttrMap, CircularDependencyError, InjectionError, Param, ResolvedArgs, Signature,
    Value,
};
pub use target::{Blueprint, InjectPoint, Injectable};
