//! Injection targets: construction recipes and injection points.
//!
//! A [Blueprint] is the declarative counterpart of constructor
//! introspection: it carries the constructor's declared [Signature] and
//! build closure, plus an ordered list of injection points invoked after
//! construction. Ancestor chains are modeled explicitly with
//! [Blueprint::inherit], which lifts a parent type's points through a
//! field projection and keeps them ahead of the child's own. Injection
//! points are plain list entries, not virtual methods: two levels may
//! declare a point under the same name and both run, each with its own
//! resolved parameters.

use crate::resolve::{InjectionError, ResolvedArgs, Signature};

/// A type the injector can construct and inject.
pub trait Injectable: Sized + 'static {
    fn blueprint() -> Blueprint<Self>;
}

type BuildFn<T> = Box<dyn Fn(&ResolvedArgs) -> Result<T, InjectionError> + Send + Sync>;
type ApplyFn<T> = Box<dyn Fn(&mut T, &ResolvedArgs) -> Result<(), InjectionError> + Send + Sync>;

/// A named post-construction injection method.
pub struct InjectPoint<T> {
    pub(crate) name: String,
    pub(crate) signature: Signature,
    pub(crate) apply: ApplyFn<T>,
}

impl<T: 'static> InjectPoint<T> {
    pub fn new<F>(name: &str, signature: Signature, apply: F) -> Self
    where
        F: Fn(&mut T, &ResolvedArgs) -> Result<(), InjectionError> + Send + Sync + 'static,
    {
        Self {
            name: name.to_owned(),
            signature,
            apply: Box::new(apply),
        }
    }

    /// Re-target this point at an embedding type through a field
    /// projection, preserving name and signature.
    pub fn lift<U, P>(self, project: P) -> InjectPoint<U>
    where
        U: 'static,
        P: Fn(&mut U) -> &mut T + Send + Sync + 'static,
    {
        let apply = self.apply;
        InjectPoint {
            name: self.name,
            signature: self.signature,
            apply: Box::new(move |target, args| apply(project(target), args)),
        }
    }
}

/// Construction recipe for an [Injectable] type.
pub struct Blueprint<T> {
    pub(crate) signature: Signature,
    pub(crate) build: BuildFn<T>,
    pub(crate) points: Vec<InjectPoint<T>>,
}

impl<T: 'static> Blueprint<T> {
    /// A blueprint whose constructor takes the declared parameters.
    pub fn with_constructor<F>(signature: Signature, build: F) -> Self
    where
        F: Fn(&ResolvedArgs) -> Result<T, InjectionError> + Send + Sync + 'static,
    {
        Self {
            signature,
            build: Box::new(build),
            points: Vec::new(),
        }
    }

    /// Declare an injection method. Points run in declaration order, after
    /// any inherited ones.
    pub fn inject<F>(mut self, name: &str, signature: Signature, apply: F) -> Self
    where
        F: Fn(&mut T, &ResolvedArgs) -> Result<(), InjectionError> + Send + Sync + 'static,
    {
        self.points.push(InjectPoint::new(name, signature, apply));
        self
    }

    /// Adopt a parent type's injection points, lifted through a field
    /// projection. The parent's points are kept ahead of any points
    /// already declared here, so chains run root-most ancestor first.
    /// The parent's constructor is discarded: construction belongs to the
    /// most-derived blueprint.
    pub fn inherit<P, F>(mut self, parent: Blueprint<P>, project: F) -> Self
    where
        P: 'static,
        F: Fn(&mut T) -> &mut P + Send + Sync + Clone + 'static,
    {
        let mut points: Vec<InjectPoint<T>> = parent
            .points
            .into_iter()
            .map(|point| point.lift(project.clone()))
            .collect();
        points.append(&mut self.points);
        self.points = points;
        self
    }
}

impl<T: Default + 'static> Blueprint<T> {
    /// A blueprint for a type with no declared constructor: no parameters
    /// are resolved and the instance is built from [Default].
    pub fn default_constructor() -> Self {
        Self::with_constructor(Signature::new(), |_| Ok(T::default()))
    }
}
