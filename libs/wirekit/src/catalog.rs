//! Registration API: the typed counterpart of class, property and method
//! decorators.
//!
//! A component describes itself once through a [`ClassBuilder`]; the builder
//! writes declarative metadata into the catalog's [`MetadataRegistry`] and
//! records the code (factory, slot projections, hooks) next to it.

use crate::decorator::{Decorator, CONFIGURATION_KEY, FRAMEWORK_KEY, PRELOAD_KEY, PROVIDE_KEY};
use crate::definition::{ClassCode, ConstructorArgs, FactoryFn, HookFn, Instance, ObjectDefinition};
use crate::error::{CatalogError, DefinitionError};
use crate::framework::{Framework, FrameworkType};
use crate::identifier::{ClassKey, Identifier, Scope, Target};
use crate::metadata::MetadataRegistry;
use crate::runtime::LifecycleConfiguration;
use crate::slot::{Handled, HandledField, Inject, InjectField};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// A type the container can provide.
pub trait Component: Send + Sync + Sized + 'static {
    fn describe(class: &mut ClassBuilder<'_, Self>);
}

/// Submitted through `inventory::submit!` to make a component discoverable.
pub struct Registrator(pub fn(&mut Catalog));

inventory::collect!(Registrator);

/// `inventory::submit!(Registrator(register_component::<MyService>));`
pub fn register_component<T: Component>(catalog: &mut Catalog) {
    catalog.register::<T>();
}

#[derive(Default)]
pub struct Catalog {
    metadata: MetadataRegistry,
    code: HashMap<ClassKey, ClassCode>,
    order: Vec<ClassKey>,
    errors: Vec<DefinitionError>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("classes", &self.order)
            .field("errors", &self.errors.len())
            .finish()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed every submitted registrator.
    pub fn discover() -> Self {
        let mut catalog = Self::new();
        for r in ::inventory::iter::<Registrator> {
            r.0(&mut catalog);
        }
        tracing::debug!(classes = ?catalog.order, "components discovered");
        catalog
    }

    /// Register a component. Registering the same type twice is a no-op.
    pub fn register<T: Component>(&mut self) -> &mut Self {
        let class = ClassKey::of::<T>();
        if self.order.contains(&class) {
            tracing::debug!(class = class.name(), "component already registered");
            return self;
        }
        let mut builder = self.class::<T>();
        T::describe(&mut builder);
        self
    }

    /// Builder for a class without implementing [`Component`].
    pub fn class<T: Send + Sync + 'static>(&mut self) -> ClassBuilder<'_, T> {
        let class = ClassKey::of::<T>();
        if !self.order.contains(&class) {
            self.order.push(class);
            self.code.entry(class).or_default();
        }
        ClassBuilder {
            catalog: self,
            class,
            _type: PhantomData,
        }
    }

    pub fn metadata(&self) -> &MetadataRegistry {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut MetadataRegistry {
        &mut self.metadata
    }

    /// Every class in registration order.
    pub fn classes(&self) -> &[ClassKey] {
        &self.order
    }

    pub fn contains(&self, class: &ClassKey) -> bool {
        self.code.contains_key(class)
    }

    /// Classes carrying `key`, restricted to this catalog, in registration order.
    pub fn classes_with(&self, key: &str) -> Vec<ClassKey> {
        self.metadata
            .list(key)
            .iter()
            .filter(|c| self.contains(c))
            .copied()
            .collect()
    }

    pub fn framework_classes(&self) -> Vec<ClassKey> {
        self.classes_with(FRAMEWORK_KEY)
    }

    pub fn preload_classes(&self) -> Vec<ClassKey> {
        self.classes_with(PRELOAD_KEY)
    }

    pub fn configuration_classes(&self) -> Vec<ClassKey> {
        self.classes_with(CONFIGURATION_KEY)
    }

    pub fn definition(&self, class: &ClassKey) -> Result<ObjectDefinition, DefinitionError> {
        let code = self
            .code
            .get(class)
            .ok_or(DefinitionError::UnknownClass(class.name()))?;
        ObjectDefinition::build(&self.metadata, *class, code)
    }

    /// Definitions of every provided class, or all collected errors.
    pub fn definitions(&self) -> Result<Vec<ObjectDefinition>, CatalogError> {
        let mut errors = self.errors.clone();
        let mut out = Vec::new();

        for class in self.classes_with(PROVIDE_KEY) {
            match self.definition(&class) {
                Ok(def) => out.push(def),
                Err(e) => errors.push(e),
            }
        }

        if errors.is_empty() {
            Ok(out)
        } else {
            Err(CatalogError::InvalidDefinitions { errors })
        }
    }

    /// Check definitions and reject constructor-argument cycles before anything is built.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let definitions = self.definitions()?;

        match constructor_cycle(&definitions) {
            Some(path) => Err(CatalogError::CycleDetected { path }),
            None => Ok(()),
        }
    }
}

/// First constructor-argument cycle, closed on the identifier it starts from.
/// Arguments without a definition are external instances and end the walk.
fn constructor_cycle(definitions: &[ObjectDefinition]) -> Option<Vec<Identifier>> {
    let args: HashMap<&Identifier, &[Identifier]> = definitions
        .iter()
        .map(|d| (&d.id, d.constructor_args.as_slice()))
        .collect();
    let mut settled: HashSet<&Identifier> = HashSet::new();

    for root in definitions.iter().map(|d| &d.id) {
        if settled.contains(root) {
            continue;
        }
        // the chain mirrors a resolution path; each entry keeps its next argument
        let mut chain: Vec<(&Identifier, usize)> = vec![(root, 0)];
        while let Some(top) = chain.last_mut() {
            let id = top.0;
            let Some(dep) = args.get(id).and_then(|deps| deps.get(top.1)) else {
                settled.insert(id);
                chain.pop();
                continue;
            };
            top.1 += 1;

            if settled.contains(dep) || !args.contains_key(dep) {
                continue;
            }
            if let Some(start) = chain.iter().position(|(on, _)| *on == dep) {
                let mut cycle: Vec<Identifier> =
                    chain[start..].iter().map(|(on, _)| (*on).clone()).collect();
                cycle.push(dep.clone());
                return Some(cycle);
            }
            chain.push((dep, 0));
        }
    }
    None
}

/// Typed decorator surface for one class.
pub struct ClassBuilder<'a, T> {
    catalog: &'a mut Catalog,
    class: ClassKey,
    _type: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> ClassBuilder<'_, T> {
    pub fn class_key(&self) -> ClassKey {
        self.class
    }

    fn decorate(&mut self, decorator: Decorator, target: Target) {
        if let Err(source) = decorator.apply(&mut self.catalog.metadata, &target) {
            self.catalog.errors.push(DefinitionError::Decorator {
                class: self.class.name(),
                source,
            });
        }
    }

    fn code(&mut self) -> &mut ClassCode {
        self.catalog.code.entry(self.class).or_default()
    }

    fn member(&self, name: &str) -> Target {
        Target::Property(self.class, name.to_string())
    }

    fn claim_property(&mut self, property: &str) -> bool {
        let code = self.catalog.code.entry(self.class).or_default();
        let taken = code.injects.iter().any(|(p, _)| p == property)
            || code.handled.iter().any(|(p, _)| p == property);
        if taken {
            self.catalog.errors.push(DefinitionError::DuplicateProperty {
                class: self.class.name(),
                property: property.to_string(),
            });
        }
        !taken
    }

    fn provide_if_absent(&mut self) {
        if self.catalog.metadata.get_own(&self.class, PROVIDE_KEY).is_none() {
            self.decorate(Decorator::Provide(None), Target::Class(self.class));
        }
    }

    /// Provide under the camelCase type name.
    pub fn provide(&mut self) -> &mut Self {
        self.decorate(Decorator::Provide(None), Target::Class(self.class));
        self
    }

    pub fn provide_as(&mut self, id: impl Into<Identifier>) -> &mut Self {
        self.decorate(Decorator::Provide(Some(id.into())), Target::Class(self.class));
        self
    }

    pub fn scope(&mut self, scope: Scope) -> &mut Self {
        self.decorate(Decorator::Scope(scope), Target::Class(self.class));
        self
    }

    /// Declare `P` as the parent class; replaces prototype-chain inheritance.
    pub fn extends<P: 'static>(&mut self) -> &mut Self {
        self.catalog
            .metadata
            .set_parent(self.class, ClassKey::of::<P>());
        self
    }

    pub fn preload(&mut self) -> &mut Self {
        self.decorate(Decorator::Preload, Target::Class(self.class));
        self
    }

    /// Constructor: `args` are resolved in order and handed to `factory`.
    pub fn factory<I, F>(&mut self, args: I, factory: F) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<Identifier>,
        F: Fn(&ConstructorArgs) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let args: Vec<Identifier> = args.into_iter().map(Into::into).collect();
        if !args.is_empty() {
            self.decorate(Decorator::Constructor(args), Target::Class(self.class));
        }
        let factory: FactoryFn =
            Arc::new(move |a: &ConstructorArgs| factory(a).map(|v| Arc::new(v) as Instance));
        self.code().factory = Some(factory);
        self
    }

    /// Inject the component provided under `D`'s default identifier.
    pub fn inject<D: Send + Sync + 'static>(
        &mut self,
        property: &str,
        field: fn(&T) -> &Inject<D>,
    ) -> &mut Self {
        self.inject_named(property, Identifier::of::<D>(), field)
    }

    pub fn inject_named<D: Send + Sync + 'static>(
        &mut self,
        property: &str,
        id: impl Into<Identifier>,
        field: fn(&T) -> &Inject<D>,
    ) -> &mut Self {
        if self.claim_property(property) {
            self.decorate(Decorator::Inject(Some(id.into())), self.member(property));
            self.code()
                .injects
                .push((property.to_string(), Arc::new(InjectField { field })));
        }
        self
    }

    /// `@Config(path)`; the property name is used when `path` is `None`.
    pub fn config<V: Send + Sync + 'static>(
        &mut self,
        property: &str,
        path: Option<&str>,
        field: fn(&T) -> &Handled<V>,
    ) -> &mut Self {
        self.bind_handled(Decorator::Config(path.map(str::to_string)), property, field)
    }

    pub fn logger<V: Send + Sync + 'static>(
        &mut self,
        property: &str,
        name: Option<&str>,
        field: fn(&T) -> &Handled<V>,
    ) -> &mut Self {
        self.bind_handled(Decorator::Logger(name.map(str::to_string)), property, field)
    }

    pub fn app<V: Send + Sync + 'static>(
        &mut self,
        property: &str,
        framework: Option<FrameworkType>,
        field: fn(&T) -> &Handled<V>,
    ) -> &mut Self {
        self.bind_handled(Decorator::App(framework), property, field)
    }

    /// A property resolved by a custom handler registered under `key`.
    pub fn handler<V: Send + Sync + 'static>(
        &mut self,
        property: &str,
        key: &str,
        identifier: Option<&str>,
        field: fn(&T) -> &Handled<V>,
    ) -> &mut Self {
        let decorator = Decorator::Handler {
            key: key.to_string(),
            identifier: identifier.map(str::to_string),
        };
        self.bind_handled(decorator, property, field)
    }

    fn bind_handled<V: Send + Sync + 'static>(
        &mut self,
        decorator: Decorator,
        property: &str,
        field: fn(&T) -> &Handled<V>,
    ) -> &mut Self {
        if self.claim_property(property) {
            self.decorate(decorator, self.member(property));
            self.code()
                .handled
                .push((property.to_string(), Arc::new(HandledField { field })));
        }
        self
    }

    /// Init hook, awaited before the instance is handed out.
    pub fn init<F, Fut>(&mut self, method: &str, hook: F) -> &mut Self
    where
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.decorate(Decorator::Init, Target::Method(self.class, method.to_string()));
        self.code().init = Some((method.to_string(), erase_hook(hook)));
        self
    }

    /// Destroy hook, run on teardown.
    pub fn destroy<F, Fut>(&mut self, method: &str, hook: F) -> &mut Self
    where
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.decorate(Decorator::Destroy, Target::Method(self.class, method.to_string()));
        self.code().destroy = Some((method.to_string(), erase_hook(hook)));
        self
    }
}

impl<T: Default + Send + Sync + 'static> ClassBuilder<'_, T> {
    pub fn default_factory(&mut self) -> &mut Self {
        self.factory(Vec::<Identifier>::new(), |_| Ok(T::default()))
    }
}

impl<T: Framework> ClassBuilder<'_, T> {
    /// Mark as a framework adapter, discovered and initialized at boot.
    /// Provides the class under its default identifier unless already provided.
    pub fn framework(&mut self) -> &mut Self {
        self.provide_if_absent();
        self.decorate(Decorator::Framework, Target::Class(self.class));
        self.code().framework = Some(cast_framework::<T>);
        self
    }
}

impl<T: LifecycleConfiguration> ClassBuilder<'_, T> {
    /// Mark as a lifecycle configuration (`on_ready`, `on_server_ready`, `on_stop`).
    pub fn configuration(&mut self, namespace: Option<&str>) -> &mut Self {
        self.provide_if_absent();
        self.decorate(
            Decorator::Configuration {
                namespace: namespace.map(str::to_string),
            },
            Target::Class(self.class),
        );
        self.code().configuration = Some(cast_configuration::<T>);
        self
    }
}

fn cast_framework<T: Framework>(instance: Instance) -> Option<Arc<dyn Framework>> {
    instance
        .downcast::<T>()
        .ok()
        .map(|f| f as Arc<dyn Framework>)
}

fn cast_configuration<T: LifecycleConfiguration>(
    instance: Instance,
) -> Option<Arc<dyn LifecycleConfiguration>> {
    instance
        .downcast::<T>()
        .ok()
        .map(|c| c as Arc<dyn LifecycleConfiguration>)
}

fn erase_hook<T, F, Fut>(hook: F) -> HookFn
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |instance: Instance| -> BoxFuture<'static, anyhow::Result<()>> {
        match instance.downcast::<T>() {
            Ok(typed) => Box::pin(hook(typed)),
            Err(_) => Box::pin(async {
                Err(anyhow::anyhow!(
                    "hook of {} called with a foreign instance",
                    std::any::type_name::<T>()
                ))
            }),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;

    #[derive(Default)]
    struct Repo;

    struct Service {
        repo: Inject<Repo>,
        port: Handled<serde_json::Value>,
    }

    impl Component for Repo {
        fn describe(c: &mut ClassBuilder<'_, Self>) {
            c.provide().default_factory();
        }
    }

    impl Component for Service {
        fn describe(c: &mut ClassBuilder<'_, Self>) {
            c.provide()
                .scope(Scope::Request)
                .factory(Vec::<Identifier>::new(), |_| {
                    Ok(Service {
                        repo: Inject::new(),
                        port: Handled::new(),
                    })
                })
                .inject("repo", |s| &s.repo)
                .config("port", Some("web.port"), |s| &s.port)
                .init("start", |_s: Arc<Service>| async { Ok(()) });
        }
    }

    #[test]
    fn builder_produces_a_complete_definition() {
        let mut catalog = Catalog::new();
        catalog.register::<Repo>().register::<Service>();

        let def = catalog.definition(&ClassKey::of::<Service>()).unwrap();
        assert_eq!(def.id.as_str(), "service");
        assert_eq!(def.scope, Scope::Request);
        assert_eq!(def.properties.len(), 1);
        assert_eq!(def.properties[0].identifier.as_str(), "repo");
        assert_eq!(def.handler_props[0].meta.key, "config");
        assert_eq!(def.handler_props[0].meta.identifier.as_deref(), Some("web.port"));
        assert_eq!(def.init_method.as_deref(), Some("start"));
        assert_eq!(catalog.definitions().unwrap().len(), 2);
    }

    #[test]
    fn duplicate_properties_are_reported() {
        let mut catalog = Catalog::new();
        catalog
            .class::<Service>()
            .provide()
            .inject("repo", |s| &s.repo)
            .inject("repo", |s| &s.repo);

        match catalog.definitions() {
            Err(CatalogError::InvalidDefinitions { errors }) => {
                assert!(errors
                    .iter()
                    .any(|e| matches!(e, DefinitionError::DuplicateProperty { .. })));
                assert!(errors
                    .iter()
                    .any(|e| matches!(e, DefinitionError::MissingFactory(_))));
            }
            other => panic!("expected InvalidDefinitions, got {other:?}"),
        }
    }

    #[test]
    fn constructor_cycles_are_rejected_with_their_path() {
        struct A;
        struct B;
        struct C;

        let mut catalog = Catalog::new();
        catalog.class::<A>().provide().factory(["b"], |_| Ok(A));
        catalog.class::<B>().provide().factory(["c"], |_| Ok(B));
        catalog.class::<C>().provide().factory(["a", "external"], |_| Ok(C));

        match catalog.validate() {
            Err(CatalogError::CycleDetected { path }) => {
                let names: Vec<&str> = path.iter().map(Identifier::as_str).collect();
                assert_eq!(names, vec!["a", "b", "c", "a"]);
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn registering_twice_is_a_no_op() {
        let mut catalog = Catalog::new();
        catalog.register::<Service>().register::<Service>();
        assert_eq!(catalog.classes().len(), 1);
        assert!(catalog.validate().is_ok());
    }
}
