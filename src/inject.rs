//! The injector: scanning, cycle checking, resolution and interception.
//!
//! An [Injector] is built once from a set of modules. Scanning and the
//! cycle check happen inside [InjectorBuilder::build]; the provider map is
//! immutable afterwards. Each provider slot memoizes its value in a
//! [OnceCell], so a resource is produced at most once per injector and
//! shared by every consumer. Resolution is synchronous; concurrent calls
//! on one injector must be serialized by the caller.

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use tracing::{debug, trace};

use crate::graph::DependencyGraph;
use crate::module::{scan, Module, ProviderBinding};
use crate::resolve::{
    to_value, AttrMap, CircularDependencyError, InjectionError, ResolvedArgs, Signature, Value,
};
use crate::target::{Blueprint, Injectable};

use std::sync::Arc;

/// What kind of consumer a resolved parameter set is headed for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsumerKind {
    Constructor,
    Provider,
    InjectionMethod,
}

/// Identifies the consumer of a resolved parameter set; handed to every
/// interceptor together with the name → value map.
#[derive(Clone, Debug)]
pub struct ConsumerInfo {
    pub kind: ConsumerKind,
    pub name: String,
}

type Interceptor = Box<dyn Fn(&ConsumerInfo, AttrMap) -> AttrMap + Send + Sync>;

/// Caller-supplied values for [Injector::create_with]; they take
/// precedence over providers and defaults for the parameters they name.
#[derive(Default)]
pub struct Overrides {
    values: AttrMap,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Send + Sync + 'static>(mut self, name: &str, value: T) -> Self {
        self.values.insert(name.to_owned(), to_value(value));
        self
    }
}

struct Slot {
    binding: Arc<ProviderBinding>,
    cell: OnceCell<Value>,
}

/// Collects modules and performs the one-time scan and cycle check.
#[derive(Default)]
pub struct InjectorBuilder<'a> {
    modules: Vec<&'a dyn Module>,
}

impl<'a> InjectorBuilder<'a> {
    /// Add a module; later modules override earlier ones on name clashes.
    pub fn module(mut self, module: &'a dyn Module) -> Self {
        self.modules.push(module);
        self
    }

    /// Scan the modules and validate the dependency graph. Fails with
    /// [CircularDependencyError] before any resource is produced; no
    /// injector is usable on failure.
    pub fn build(self) -> Result<Injector, CircularDependencyError> {
        let providers = scan(&self.modules);
        if let Some(cycle) = DependencyGraph::from_providers(&providers).find_cycle() {
            return Err(CircularDependencyError { cycle });
        }
        debug!(providers = providers.len(), "injector constructed");
        let slots = providers
            .into_iter()
            .map(|(name, binding)| {
                (
                    name,
                    Slot {
                        binding,
                        cell: OnceCell::new(),
                    },
                )
            })
            .collect();
        Ok(Injector {
            slots,
            interceptors: Vec::new(),
        })
    }
}

/// Resolves named resources into constructors, providers and injection
/// methods.
pub struct Injector {
    slots: IndexMap<String, Slot>,
    interceptors: Vec<Interceptor>,
}

impl std::fmt::Debug for Injector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Injector")
            .field("providers", &self.slots.keys().collect::<Vec<_>>())
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

impl Injector {
    pub fn builder<'a>() -> InjectorBuilder<'a> {
        InjectorBuilder::default()
    }

    /// Construct an injector over a single module.
    pub fn new(module: &dyn Module) -> Result<Self, CircularDependencyError> {
        Self::builder().module(module).build()
    }

    /// Append an interceptor. Interceptors run in registration order on
    /// every resolved parameter map, each seeing the previous one's
    /// output; they cannot be removed.
    pub fn add_injection_interceptor<F>(&mut self, interceptor: F)
    where
        F: Fn(&ConsumerInfo, AttrMap) -> AttrMap + Send + Sync + 'static,
    {
        self.interceptors.push(Box::new(interceptor));
    }

    /// Resolve the target's constructor parameters, build it and run its
    /// injection methods.
    pub fn create<T: Injectable>(&self) -> Result<T, InjectionError> {
        self.create_with(Overrides::new())
    }

    /// Like [create](Injector::create), with caller-supplied values taking
    /// precedence over providers and defaults. Overrides reach the
    /// constructor and the instance's injection methods; nested provider
    /// resolution consults only providers and defaults.
    pub fn create_with<T: Injectable>(&self, overrides: Overrides) -> Result<T, InjectionError> {
        let blueprint = T::blueprint();
        let consumer = ConsumerInfo {
            kind: ConsumerKind::Constructor,
            name: std::any::type_name::<T>().to_owned(),
        };
        let args = self.resolve_args(&consumer, &blueprint.signature, &overrides.values)?;
        let mut instance = (blueprint.build)(&args)?;
        self.run_points(&blueprint, &mut instance, &overrides.values)?;
        Ok(instance)
    }

    /// Run injection methods against an existing instance; never invokes
    /// a constructor.
    pub fn inject<T: Injectable>(&self, target: &mut T) -> Result<(), InjectionError> {
        let blueprint = T::blueprint();
        self.run_points(&blueprint, target, &AttrMap::new())
    }

    /// Resolve a named resource, memoizing it for the lifetime of this
    /// injector.
    pub fn resource(&self, name: &str) -> Result<Value, InjectionError> {
        let slot = self
            .slots
            .get(name)
            .ok_or_else(|| InjectionError::UnknownResource { name: name.to_owned() })?;
        slot.cell
            .get_or_try_init(|| {
                trace!(resource = name, "resolving");
                let consumer = ConsumerInfo {
                    kind: ConsumerKind::Provider,
                    name: name.to_owned(),
                };
                let args = self.resolve_args(&consumer, slot.binding.signature(), &AttrMap::new())?;
                slot.binding.call(&args)
            })
            .map(Value::clone)
    }

    fn run_points<T>(
        &self,
        blueprint: &Blueprint<T>,
        target: &mut T,
        overrides: &AttrMap,
    ) -> Result<(), InjectionError> {
        for point in &blueprint.points {
            let consumer = ConsumerInfo {
                kind: ConsumerKind::InjectionMethod,
                name: point.name.clone(),
            };
            let args = self.resolve_args(&consumer, &point.signature, overrides)?;
            (point.apply)(target, &args)?;
        }
        Ok(())
    }

    /// Resolve each declared parameter by precedence (override, provider,
    /// default), then pass the map through the interceptor chain.
    fn resolve_args(
        &self,
        consumer: &ConsumerInfo,
        signature: &Signature,
        overrides: &AttrMap,
    ) -> Result<ResolvedArgs, InjectionError> {
        if signature.is_illegal() {
            return Err(InjectionError::IllegalSignature {
                consumer: consumer.name.clone(),
            });
        }
        let mut values = AttrMap::new();
        for param in signature.params() {
            let value = if let Some(value) = overrides.get(param.name()) {
                value.clone()
            } else if self.slots.contains_key(param.name()) {
                self.resource(param.name())?
            } else if let Some(default) = param.default() {
                default.clone()
            } else {
                return Err(InjectionError::Unresolved {
                    consumer: consumer.name.clone(),
                    param: param.name().to_owned(),
                });
            };
            values.insert(param.name().to_owned(), value);
        }
        for interceptor in &self.interceptors {
            values = interceptor(consumer, values);
        }
        Ok(ResolvedArgs::new(values))
    }
}
