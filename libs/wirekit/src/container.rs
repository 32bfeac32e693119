//! Scoped, async dependency-injection container.
//!
//! Each identifier owns a `tokio::sync::OnceCell` in the container that caches
//! it: singletons in the container that holds the definition, request objects
//! in the (child) container that resolved them. Concurrent callers for the
//! same identifier share one construction and one init-hook run.

use crate::catalog::Catalog;
use crate::definition::{downcast, ConstructorArgs, Creator, Instance, ObjectDefinition};
use crate::error::{CatalogError, ContainerError, DestroyError};
use crate::identifier::{Identifier, Scope};
use dashmap::DashMap;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tokio::sync::OnceCell;

/// Raised after properties are injected and before the init hook runs.
pub struct ObjectCreated<'a> {
    pub definition: &'a ObjectDefinition,
    pub instance: &'a Instance,
    pub container: &'a Container,
}

pub type ObjectCreatedListener = Arc<dyn Fn(&ObjectCreated<'_>) + Send + Sync>;

type Cell = Arc<OnceCell<Instance>>;

pub struct Container {
    self_ref: Weak<Container>,
    parent: Option<Arc<Container>>,
    definitions: DashMap<Identifier, Arc<ObjectDefinition>>,
    cache: DashMap<Identifier, Cell>,
    created: Mutex<Vec<(Identifier, Arc<ObjectDefinition>)>>,
    listeners: Arc<RwLock<Vec<ObjectCreatedListener>>>,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("definitions", &self.definitions.len())
            .field("cached", &self.cache.len())
            .field("is_child", &self.parent.is_some())
            .finish()
    }
}

impl Container {
    /// A new root container.
    pub fn new() -> Arc<Self> {
        Self::build(None)
    }

    fn build(parent: Option<Arc<Container>>) -> Arc<Self> {
        let listeners = parent
            .as_ref()
            .map(|p| p.listeners.clone())
            .unwrap_or_default();
        Arc::new_cyclic(|me| Self {
            self_ref: me.clone(),
            parent,
            definitions: DashMap::new(),
            cache: DashMap::new(),
            created: Mutex::new(Vec::new()),
            listeners,
        })
    }

    /// Request container: singletons stay in the owner, request objects are cached here.
    pub fn create_child(&self) -> Arc<Self> {
        Self::build(self.self_ref.upgrade())
    }

    pub fn parent(&self) -> Option<&Arc<Container>> {
        self.parent.as_ref()
    }

    /// Register (or replace) a definition. A cached instance under the same id is dropped.
    pub fn register(&self, definition: ObjectDefinition) {
        let id = definition.id.clone();
        tracing::trace!(id = %id, scope = ?definition.scope, "definition registered");
        self.cache.remove(&id);
        self.definitions.insert(id, Arc::new(definition));
    }

    /// Register a pre-built singleton value.
    pub fn register_instance<T: Send + Sync + 'static>(&self, id: impl Into<Identifier>, value: Arc<T>) {
        let id = id.into();
        let instance: Instance = value;
        self.definitions.insert(
            id.clone(),
            Arc::new(ObjectDefinition::from_instance(id.clone(), instance.clone())),
        );
        self.cache
            .insert(id, Arc::new(OnceCell::new_with(Some(instance))));
    }

    /// Register every provided class of `catalog`.
    pub fn load(&self, catalog: &Catalog) -> Result<usize, CatalogError> {
        let definitions = catalog.definitions()?;
        let n = definitions.len();
        for def in definitions {
            self.register(def);
        }
        tracing::debug!(count = n, "catalog loaded into container");
        Ok(n)
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.lookup(id).is_some()
    }

    pub fn definition(&self, id: &Identifier) -> Option<Arc<ObjectDefinition>> {
        self.lookup(id).map(|(_, def)| def)
    }

    pub fn identifiers(&self) -> Vec<Identifier> {
        let mut ids: Vec<_> = self.definitions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn on_object_created<F>(&self, listener: F)
    where
        F: Fn(&ObjectCreated<'_>) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Cached instance, own cache first then up the parent chain. Never constructs.
    pub fn peek(&self, id: &Identifier) -> Option<Instance> {
        if let Some(v) = self.cache.get(id).and_then(|c| c.get().cloned()) {
            return Some(v);
        }
        self.parent.as_ref().and_then(|p| p.peek(id))
    }

    pub async fn resolve(&self, id: impl Into<Identifier>) -> Result<Instance, ContainerError> {
        self.resolve_in(id.into(), Vec::new()).await
    }

    pub async fn resolve_as<T: Send + Sync + 'static>(
        &self,
        id: impl Into<Identifier>,
    ) -> Result<Arc<T>, ContainerError> {
        let id = id.into();
        let instance = self.resolve_in(id.clone(), Vec::new()).await?;
        downcast::<T>(&id, instance)
    }

    /// Resolve `T` under its default identifier.
    pub async fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ContainerError> {
        self.resolve_as::<T>(Identifier::of::<T>()).await
    }

    fn lookup(&self, id: &Identifier) -> Option<(&Container, Arc<ObjectDefinition>)> {
        match self.definitions.get(id) {
            Some(def) => Some((self, def.clone())),
            None => self.parent.as_deref().and_then(|p| p.lookup(id)),
        }
    }

    fn resolve_in(
        &self,
        id: Identifier,
        path: Vec<Identifier>,
    ) -> BoxFuture<'_, Result<Instance, ContainerError>> {
        Box::pin(async move {
            let (owner, def) = self
                .lookup(&id)
                .ok_or_else(|| ContainerError::UnregisteredIdentifier(id.clone()))?;

            let (builder, cell) = match def.scope {
                Scope::Singleton => (owner, Some(owner.cell(&id))),
                Scope::Request => (self, Some(self.cell(&id))),
                Scope::Prototype => (self, None),
            };

            if let Some(v) = cell.as_ref().and_then(|c| c.get()) {
                return Ok(v.clone());
            }

            if path.contains(&id) {
                let mut path = path;
                path.push(id);
                return Err(ContainerError::CyclicDependency { path });
            }

            match cell {
                Some(cell) => cell
                    .get_or_try_init(|| builder.construct(def.clone(), id.clone(), path))
                    .await
                    .cloned(),
                None => builder.construct(def, id, path).await,
            }
        })
    }

    fn cell(&self, id: &Identifier) -> Cell {
        self.cache
            .entry(id.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    async fn construct(
        &self,
        def: Arc<ObjectDefinition>,
        id: Identifier,
        mut path: Vec<Identifier>,
    ) -> Result<Instance, ContainerError> {
        path.push(id.clone());

        let instance = match &def.creator {
            Creator::Value(v) => v.clone(),
            Creator::Factory(factory) => {
                let mut values = Vec::with_capacity(def.constructor_args.len());
                for arg in &def.constructor_args {
                    values.push(self.resolve_in(arg.clone(), path.clone()).await?);
                }
                let args = ConstructorArgs::new(def.constructor_args.clone(), values);
                factory(&args).map_err(|source| ContainerError::Construction {
                    id: id.clone(),
                    source,
                })?
            }
        };

        for prop in &def.properties {
            let dep = &prop.identifier;
            let mismatch = || ContainerError::TypeMismatch {
                id: id.clone(),
                expected: prop.projector.owner_type(),
            };

            // only a cycle on this resolution path is deferred; anything else
            // waits on the dependency's cell
            if path.contains(dep) {
                if self.lookup(dep).is_some_and(|(_, d)| d.scope == Scope::Prototype) {
                    let mut path = path.clone();
                    path.push(dep.clone());
                    return Err(ContainerError::CyclicDependency { path });
                }
                tracing::debug!(id = %id, property = %prop.property, dependency = %dep, "deferring circular property");
                prop.projector
                    .project(instance.as_ref())
                    .ok_or_else(mismatch)?
                    .defer(self.self_ref.clone(), dep.clone());
            } else {
                let value = self.resolve_in(dep.clone(), path.clone()).await?;
                prop.projector
                    .project(instance.as_ref())
                    .ok_or_else(mismatch)?
                    .fill(dep, value)?;
            }
        }

        let listeners: Vec<ObjectCreatedListener> = self.listeners.read().clone();
        if !listeners.is_empty() {
            let event = ObjectCreated {
                definition: &def,
                instance: &instance,
                container: self,
            };
            for listener in &listeners {
                listener(&event);
            }
        }

        if let Some(init) = &def.init {
            init(instance.clone())
                .await
                .map_err(|source| ContainerError::Initialization {
                    id: id.clone(),
                    source,
                })?;
        }

        if def.scope != Scope::Prototype {
            self.created.lock().push((id.clone(), def.clone()));
        }
        tracing::trace!(id = %id, "object created");
        Ok(instance)
    }

    /// Run the destroy hook of a cached instance and evict it. Hook failures are logged.
    pub async fn destroy(&self, id: &Identifier) {
        let instance = self.cache.remove(id).and_then(|(_, cell)| cell.get().cloned());
        let def = {
            let mut created = self.created.lock();
            created
                .iter()
                .rposition(|(cid, _)| cid == id)
                .map(|i| created.remove(i).1)
        };
        if let (Some(instance), Some(def)) = (instance, def) {
            run_destroy(id, &def, instance).await;
        }
    }

    /// Destroy every instance this container created, newest first.
    pub async fn destroy_all(&self) {
        let created = std::mem::take(&mut *self.created.lock());
        tracing::debug!(count = created.len(), "destroying container instances");
        for (id, def) in created.into_iter().rev() {
            let instance = self.cache.remove(&id).and_then(|(_, cell)| cell.get().cloned());
            if let Some(instance) = instance {
                run_destroy(&id, &def, instance).await;
            }
        }
        self.cache.clear();
    }

    /// Close a request container.
    pub async fn close(&self) {
        self.destroy_all().await;
    }
}

async fn run_destroy(id: &Identifier, def: &ObjectDefinition, instance: Instance) {
    let Some(hook) = &def.destroy else {
        return;
    };
    if let Err(source) = hook(instance).await {
        let err = DestroyError {
            id: id.clone(),
            source,
        };
        tracing::warn!(id = %id, error = ?err, "{err}");
    }
}
