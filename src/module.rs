//! Modules, provider bindings and scanning.
//!
//! A module declares named resource providers by registering
//! [ProviderBinding]s. Modules form explicit ancestor chains through
//! [Module::base]; scanning walks each chain root-first so a derived
//! module's binding overrides an inherited one under the same name, while
//! unrelated inherited bindings stay visible. Across distinct modules the
//! later-registered binding wins. No provider runs during scanning:
//! bindings are captured as deferred closures, not values.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::resolve::{InjectionError, ResolvedArgs, Signature, Value};

/// A set of named resource providers.
pub trait Module {
    /// The module this one extends, if any. Scanning walks the base chain
    /// before [providers](Module::providers), so declarations made here
    /// override same-named inherited ones.
    fn base(&self) -> Option<&dyn Module> {
        None
    }

    /// Register this module's own providers, excluding inherited ones.
    fn providers(&self, registry: &mut Registry);
}

pub(crate) type ProviderFn =
    Arc<dyn Fn(&ResolvedArgs) -> Result<Value, InjectionError> + Send + Sync>;

/// A named provider captured at scan time: the resource name, the declared
/// signature and the deferred closure that produces the value.
pub struct ProviderBinding {
    name: String,
    signature: Signature,
    call: ProviderFn,
}

impl ProviderBinding {
    /// Start declaring a provider for the named resource.
    pub fn new(name: &str) -> BindingBuilder {
        BindingBuilder {
            name: name.to_owned(),
            signature: Signature::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub(crate) fn call(&self, args: &ResolvedArgs) -> Result<Value, InjectionError> {
        (self.call)(args)
    }
}

/// Builder for a [ProviderBinding]; finish with [to](BindingBuilder::to)
/// or [to_const](BindingBuilder::to_const).
pub struct BindingBuilder {
    name: String,
    signature: Signature,
}

impl BindingBuilder {
    /// Declare a dependency on another named resource.
    pub fn param(mut self, name: &str) -> Self {
        self.signature = self.signature.param(name);
        self
    }

    /// Declare a dependency with a fallback default.
    pub fn param_with_default<T: Send + Sync + 'static>(mut self, name: &str, default: T) -> Self {
        self.signature = self.signature.param_with_default(name, default);
        self
    }

    /// Declare a variadic catch-all slot on the provider's signature.
    pub fn variadic(mut self) -> Self {
        self.signature = self.signature.variadic();
        self
    }

    /// Bind the provider closure.
    pub fn to<F>(self, call: F) -> ProviderBinding
    where
        F: Fn(&ResolvedArgs) -> Result<Value, InjectionError> + Send + Sync + 'static,
    {
        ProviderBinding {
            name: self.name,
            signature: self.signature,
            call: Arc::new(call),
        }
    }

    /// Bind a constant resource value.
    pub fn to_const<T: Send + Sync + 'static>(self, value: T) -> ProviderBinding {
        let value = crate::resolve::to_value(value);
        self.to(move |_| Ok(value.clone()))
    }
}

/// Collects a module's bindings in declaration order.
#[derive(Default)]
pub struct Registry {
    bindings: Vec<ProviderBinding>,
}

impl Registry {
    pub fn provide(&mut self, binding: ProviderBinding) {
        self.bindings.push(binding);
    }
}

/// Merged scan output: resource name to binding, insertion-ordered.
pub(crate) type ProviderMap = IndexMap<String, Arc<ProviderBinding>>;

/// Flatten the given modules into a single provider map, applying the
/// override rules: base chains root-first, modules in registration order,
/// later insertions replacing earlier ones under the same name.
pub(crate) fn scan(modules: &[&dyn Module]) -> ProviderMap {
    let mut map = ProviderMap::new();
    for module in modules {
        scan_chain(*module, &mut map);
    }
    map
}

fn scan_chain(module: &dyn Module, map: &mut ProviderMap) {
    if let Some(base) = module.base() {
        scan_chain(base, map);
    }
    let mut registry = Registry::default();
    module.providers(&mut registry);
    for binding in registry.bindings {
        map.insert(binding.name.clone(), Arc::new(binding));
    }
}

/// Register a provider with typed dependencies.
///
/// ```
/// use ikebana::{provide, Module, Registry};
///
/// struct Names;
///
/// impl Module for Names {
///     fn providers(&self, registry: &mut Registry) {
///         provide!(registry, name() -> String { "Lain".to_string() });
///         provide!(registry, greeting(name: String) -> String {
///             format!("hello, {name}")
///         });
///     }
/// }
/// ```
///
/// Each dependency is declared on the signature and extracted from the
/// resolved arguments before the body runs; the body's result is wrapped
/// as the resource value.
#[macro_export]
macro_rules! provide {
    ($registry:expr, $name:ident($($param:ident : $ptype:ty),*) -> $ret:ty $body:block) => {
        $registry.provide(
            $crate::ProviderBinding::new(stringify!($name))
                $(.param(stringify!($param)))*
                .to(move |args| {
                    let _ = args;
                    $(let $param: $ptype = args.get(stringify!($param))?;)*
                    let value: $ret = $body;
                    Ok($crate::to_value(value))
                }),
        )
    };
}
