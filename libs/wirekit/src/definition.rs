use crate::decorator::{
    CONSTRUCTOR_KEY, DESTROY_KEY, FRAMEWORK_KEY, HANDLER_KEY, INIT_KEY, INJECT_KEY, PRELOAD_KEY,
    PROVIDE_KEY, SCOPE_KEY,
};
use crate::error::{ContainerError, DefinitionError};
use crate::framework::Framework;
use crate::handler::HandlerMeta;
use crate::identifier::{ClassKey, Identifier, Scope};
use crate::metadata::MetadataRegistry;
use crate::runtime::LifecycleConfiguration;
use crate::slot::{HandledProjector, InjectProjector};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A resolved object as stored in container caches.
pub type Instance = Arc<dyn Any + Send + Sync>;

pub type FactoryFn = Arc<dyn Fn(&ConstructorArgs) -> anyhow::Result<Instance> + Send + Sync>;
pub type HookFn = Arc<dyn Fn(Instance) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
pub type FrameworkCaster = fn(Instance) -> Option<Arc<dyn Framework>>;
pub type ConfigurationCaster = fn(Instance) -> Option<Arc<dyn LifecycleConfiguration>>;

pub(crate) fn downcast<T: Send + Sync + 'static>(
    id: &Identifier,
    instance: Instance,
) -> Result<Arc<T>, ContainerError> {
    instance
        .downcast::<T>()
        .map_err(|_| ContainerError::TypeMismatch {
            id: id.clone(),
            expected: std::any::type_name::<T>(),
        })
}

/// Resolved constructor arguments, in declared order.
pub struct ConstructorArgs {
    ids: Vec<Identifier>,
    values: Vec<Instance>,
}

impl ConstructorArgs {
    pub(crate) fn new(ids: Vec<Identifier>, values: Vec<Instance>) -> Self {
        Self { ids, values }
    }

    pub fn get<T: Send + Sync + 'static>(&self, index: usize) -> Result<Arc<T>, ContainerError> {
        match (self.ids.get(index), self.values.get(index)) {
            (Some(id), Some(value)) => downcast::<T>(id, value.clone()),
            _ => Err(ContainerError::MissingArgument { index }),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub(crate) enum Creator {
    Factory(FactoryFn),
    Value(Instance),
}

pub struct PropertyInjection {
    pub property: String,
    pub identifier: Identifier,
    pub(crate) projector: Arc<dyn InjectProjector>,
}

pub struct HandlerProperty {
    pub property: String,
    pub meta: HandlerMeta,
    pub(crate) projector: Arc<dyn HandledProjector>,
}

/// Code recorded for a class next to its metadata.
#[derive(Default)]
pub(crate) struct ClassCode {
    pub(crate) factory: Option<FactoryFn>,
    pub(crate) injects: Vec<(String, Arc<dyn InjectProjector>)>,
    pub(crate) handled: Vec<(String, Arc<dyn HandledProjector>)>,
    pub(crate) init: Option<(String, HookFn)>,
    pub(crate) destroy: Option<(String, HookFn)>,
    pub(crate) framework: Option<FrameworkCaster>,
    pub(crate) configuration: Option<ConfigurationCaster>,
}

/// Immutable descriptor the container instantiates from.
pub struct ObjectDefinition {
    pub id: Identifier,
    pub class: Option<ClassKey>,
    pub scope: Scope,
    pub init_method: Option<String>,
    pub destroy_method: Option<String>,
    pub constructor_args: Vec<Identifier>,
    pub properties: Vec<PropertyInjection>,
    pub handler_props: Vec<HandlerProperty>,
    pub preload: bool,
    pub(crate) creator: Creator,
    pub(crate) init: Option<HookFn>,
    pub(crate) destroy: Option<HookFn>,
    pub(crate) framework: Option<FrameworkCaster>,
    pub(crate) configuration: Option<ConfigurationCaster>,
}

impl fmt::Debug for ObjectDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectDefinition")
            .field("id", &self.id)
            .field("class", &self.class)
            .field("scope", &self.scope)
            .field("init_method", &self.init_method)
            .field("destroy_method", &self.destroy_method)
            .field("constructor_args", &self.constructor_args)
            .field(
                "properties",
                &self.properties.iter().map(|p| &p.property).collect::<Vec<_>>(),
            )
            .field(
                "handler_props",
                &self.handler_props.iter().map(|p| &p.property).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[derive(Deserialize)]
struct ProvideMeta {
    identifier: Identifier,
}

#[derive(Deserialize)]
struct ScopeMeta {
    scope: Scope,
}

#[derive(Deserialize)]
struct HookMeta {
    method: String,
}

#[derive(Deserialize)]
struct ConstructorMeta {
    args: Vec<Identifier>,
}

#[derive(Deserialize)]
struct InjectMeta {
    identifier: Identifier,
}

fn parse<T: DeserializeOwned>(
    class: &ClassKey,
    key: &'static str,
    value: Option<&Value>,
) -> Result<Option<T>, DefinitionError> {
    value
        .map(|v| {
            serde_json::from_value(v.clone()).map_err(|e| DefinitionError::InvalidMetadata {
                class: class.name(),
                key,
                message: e.to_string(),
            })
        })
        .transpose()
}

fn hook(
    class: &ClassKey,
    kind: &'static str,
    declared: Option<HookMeta>,
    code: &Option<(String, HookFn)>,
) -> Result<(Option<String>, Option<HookFn>), DefinitionError> {
    match declared {
        None => Ok((None, None)),
        Some(HookMeta { method }) => match code {
            Some((name, f)) if *name == method => Ok((Some(method), Some(f.clone()))),
            _ => Err(DefinitionError::MissingHook {
                class: class.name(),
                hook: kind,
                method,
            }),
        },
    }
}

impl ObjectDefinition {
    /// Assemble a definition from a class's metadata and recorded code.
    pub(crate) fn build(
        registry: &MetadataRegistry,
        class: ClassKey,
        code: &ClassCode,
    ) -> Result<Self, DefinitionError> {
        let provide: ProvideMeta = parse(&class, PROVIDE_KEY, registry.get_own(&class, PROVIDE_KEY))?
            .ok_or(DefinitionError::NotProvided(class.name()))?;

        let scope = parse::<ScopeMeta>(&class, SCOPE_KEY, registry.get(&class, SCOPE_KEY))?
            .map(|s| s.scope)
            .unwrap_or_default();

        let constructor_args =
            parse::<ConstructorMeta>(&class, CONSTRUCTOR_KEY, registry.get_own(&class, CONSTRUCTOR_KEY))?
                .map(|c| c.args)
                .unwrap_or_default();

        let factory = code
            .factory
            .clone()
            .ok_or(DefinitionError::MissingFactory(class.name()))?;

        let mut properties = Vec::new();
        if let Some(Value::Object(map)) = registry.get_own(&class, INJECT_KEY) {
            for (property, meta) in map {
                let meta: InjectMeta = parse(&class, INJECT_KEY, Some(meta))?
                    .ok_or_else(|| missing_slot(&class, property))?;
                let projector = code
                    .injects
                    .iter()
                    .find(|(name, _)| name == property)
                    .map(|(_, p)| p.clone())
                    .ok_or_else(|| missing_slot(&class, property))?;
                properties.push(PropertyInjection {
                    property: property.clone(),
                    identifier: meta.identifier,
                    projector,
                });
            }
        }

        let mut handler_props = Vec::new();
        if let Some(Value::Object(map)) = registry.get_own(&class, HANDLER_KEY) {
            for (property, meta) in map {
                let meta: HandlerMeta = parse(&class, HANDLER_KEY, Some(meta))?
                    .ok_or_else(|| missing_slot(&class, property))?;
                let projector = code
                    .handled
                    .iter()
                    .find(|(name, _)| name == property)
                    .map(|(_, p)| p.clone())
                    .ok_or_else(|| missing_slot(&class, property))?;
                handler_props.push(HandlerProperty {
                    property: property.clone(),
                    meta,
                    projector,
                });
            }
        }

        let (init_method, init) = hook(
            &class,
            "init",
            parse(&class, INIT_KEY, registry.get_own(&class, INIT_KEY))?,
            &code.init,
        )?;
        let (destroy_method, destroy) = hook(
            &class,
            "destroy",
            parse(&class, DESTROY_KEY, registry.get_own(&class, DESTROY_KEY))?,
            &code.destroy,
        )?;

        let framework = registry
            .get_own(&class, FRAMEWORK_KEY)
            .and(code.framework);

        Ok(Self {
            id: provide.identifier,
            class: Some(class),
            scope,
            init_method,
            destroy_method,
            constructor_args,
            properties,
            handler_props,
            preload: registry.get_own(&class, PRELOAD_KEY).is_some(),
            creator: Creator::Factory(factory),
            init,
            destroy,
            framework,
            configuration: code.configuration,
        })
    }

    /// A singleton definition around an already built value.
    pub fn from_instance(id: impl Into<Identifier>, instance: Instance) -> Self {
        Self::bare(id.into(), Scope::Singleton, Creator::Value(instance))
    }

    /// A definition without dependencies or hooks, built by `factory`.
    pub fn from_factory<T, F>(id: impl Into<Identifier>, scope: Scope, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let factory: FactoryFn = Arc::new(move |_: &ConstructorArgs| {
            factory().map(|v| Arc::new(v) as Instance)
        });
        Self::bare(id.into(), scope, Creator::Factory(factory))
    }

    fn bare(id: Identifier, scope: Scope, creator: Creator) -> Self {
        Self {
            id,
            class: None,
            scope,
            init_method: None,
            destroy_method: None,
            constructor_args: Vec::new(),
            properties: Vec::new(),
            handler_props: Vec::new(),
            preload: false,
            creator,
            init: None,
            destroy: None,
            framework: None,
            configuration: None,
        }
    }

    pub fn is_framework(&self) -> bool {
        self.framework.is_some()
    }

    pub fn is_configuration(&self) -> bool {
        self.configuration.is_some()
    }

    pub(crate) fn as_framework(&self, instance: &Instance) -> Option<Arc<dyn Framework>> {
        self.framework.and_then(|cast| cast(instance.clone()))
    }

    pub(crate) fn as_configuration(
        &self,
        instance: &Instance,
    ) -> Option<Arc<dyn LifecycleConfiguration>> {
        self.configuration.and_then(|cast| cast(instance.clone()))
    }
}

fn missing_slot(class: &ClassKey, property: &str) -> DefinitionError {
    DefinitionError::MissingSlot {
        class: class.name(),
        property: property.to_string(),
    }
}
