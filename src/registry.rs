// Service registry

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use bevy::log::{debug, warn};

use crate::error::FlowError;

struct Entry {
    name: &'static str,
    // Always an `Arc<T>` for the `T` whose `TypeId` keys this entry.
    instance: Box<dyn Any + Send + Sync>,
}

/// Maps a capability type to one shared instance.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<TypeId, Entry>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `instance` under capability `T`. Returns `true` when an earlier
    /// instance was replaced, which is logged as a possible stale reference.
    pub fn register<T>(&mut self, instance: Arc<T>) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let name = type_name::<T>();
        let previous = self.services.insert(
            TypeId::of::<T>(),
            Entry {
                name,
                instance: Box::new(instance),
            },
        );
        if previous.is_some() {
            warn!("{}", FlowError::DuplicateRegistration(name));
            true
        } else {
            debug!("registered capability `{name}`");
            false
        }
    }

    /// Resolves capability `T`, logging a warning when it is missing.
    pub fn get<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let found = self.try_get::<T>();
        if found.is_none() {
            warn!("{}", FlowError::MissingDependency(type_name::<T>()));
        }
        found
    }

    pub fn try_get<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.instance.downcast_ref::<Arc<T>>())
            .cloned()
    }

    pub fn contains<T>(&self) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.services.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn capabilities(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.services.values().map(|entry| entry.name).collect();
        names.sort_unstable();
        names
    }

    pub fn clear(&mut self) {
        self.services.clear();
    }
}

/// A capability-tagged object: something that knows how to put itself (or
/// the services it owns) into a scene's registry.
pub trait Provider: Send + Sync {
    fn provide(&self, registry: &mut ServiceRegistry);
}

impl<F> Provider for F
where
    F: Fn(&mut ServiceRegistry) + Send + Sync,
{
    fn provide(&self, registry: &mut ServiceRegistry) {
        self(registry)
    }
}

/// The registry of one scene together with the providers that fill it.
#[derive(Default)]
pub struct SceneServices {
    registry: ServiceRegistry,
    providers: Vec<Arc<dyn Provider>>,
    populated: bool,
}

impl SceneServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: impl Provider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn add_provider(&mut self, provider: Arc<dyn Provider>) {
        self.providers.push(provider);
    }

    pub fn absorb(&mut self, other: SceneServices) {
        self.providers.extend(other.providers);
    }

    /// Runs every provider once. Later calls are no-ops until `unload`.
    pub fn populate(&mut self) -> &ServiceRegistry {
        if !self.populated {
            for provider in &self.providers {
                provider.provide(&mut self.registry);
            }
            self.populated = true;
            debug!("scene services populated: {:?}", self.registry.capabilities());
        }
        &self.registry
    }

    pub fn is_populated(&self) -> bool {
        self.populated
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ServiceRegistry {
        &mut self.registry
    }

    pub fn unload(&mut self) {
        self.registry.clear();
        self.populated = false;
    }
}
