use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use auditable_core::{AnyEntity, Capability, Entity};

use crate::error::StoreError;

/// A predicate applied to every default read of an entity type.
///
/// Returns `true` for rows that should be visible.
pub type QueryFilter = Arc<dyn Fn(&dyn AnyEntity) -> bool + Send + Sync>;

/// Schema descriptor for a registered entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityType {
    name: &'static str,
    type_id: TypeId,
    base_type: Option<&'static str>,
    capabilities: &'static [&'static str],
}

impl EntityType {
    /// Describe the entity type `E`.
    #[must_use]
    pub fn of<E: Entity>() -> Self {
        Self {
            name: E::ENTITY_TYPE,
            type_id: TypeId::of::<E>(),
            base_type: E::BASE_TYPE,
            capabilities: E::CAPABILITIES,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn base_type(&self) -> Option<&'static str> {
        self.base_type
    }

    /// Whether this type has no declared base entity type.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.base_type.is_none()
    }

    #[must_use]
    pub fn capabilities(&self) -> &'static [&'static str] {
        self.capabilities
    }

    /// Whether this type declares the capability `C`.
    #[must_use]
    pub fn implements<C: Capability>(&self) -> bool {
        C::declared_by(self.capabilities)
    }
}

/// Mutable schema under construction.
///
/// Entity types are registered first; query filters are declared against
/// registered root types. [`ModelBuilder::build`] validates the hierarchy and
/// freezes it into a [`Model`].
pub struct ModelBuilder {
    types: Vec<EntityType>,
    filters: HashMap<&'static str, QueryFilter>,
    query_filters_supported: bool,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self {
            types: Vec::new(),
            filters: HashMap::new(),
            query_filters_supported: true,
        }
    }

    /// A builder for an engine that cannot apply per-type query filters.
    /// Declaring a filter on it fails with [`StoreError::QueryFiltersUnsupported`].
    pub fn without_query_filters() -> Self {
        Self {
            query_filters_supported: false,
            ..Self::new()
        }
    }

    /// Register the entity type `E`. Registering the same type twice is a no-op.
    pub fn entity<E: Entity>(&mut self) -> &mut Self {
        let descriptor = EntityType::of::<E>();
        if !self.types.contains(&descriptor) {
            self.types.push(descriptor);
        }
        self
    }

    /// Every registered entity type, in registration order.
    pub fn entity_types(&self) -> impl Iterator<Item = &EntityType> {
        self.types.iter()
    }

    /// Registered entity types declaring the capability `C`.
    pub fn entity_types_implementing<C: Capability>(&self) -> impl Iterator<Item = &EntityType> {
        self.types.iter().filter(|ty| ty.implements::<C>())
    }

    #[must_use]
    pub fn find_entity_type(&self, name: &str) -> Option<&EntityType> {
        self.types.iter().find(|ty| ty.name == name)
    }

    #[must_use]
    pub fn supports_query_filters(&self) -> bool {
        self.query_filters_supported
    }

    /// Declare the default read filter of a root entity type, replacing any
    /// filter declared before. Derived types inherit it.
    pub fn has_query_filter(
        &mut self,
        entity_type: &str,
        filter: QueryFilter,
    ) -> Result<&mut Self, StoreError> {
        if !self.query_filters_supported {
            return Err(StoreError::QueryFiltersUnsupported);
        }
        let descriptor = self
            .find_entity_type(entity_type)
            .ok_or_else(|| StoreError::UnknownEntityType(entity_type.to_owned()))?;
        if !descriptor.is_root() {
            return Err(StoreError::Model(format!(
                "query filter on {entity_type} must be declared on its root entity type"
            )));
        }
        let name = descriptor.name;
        self.filters.insert(name, filter);
        Ok(self)
    }

    /// Validate the schema and freeze it.
    pub fn build(self) -> Result<Model, StoreError> {
        let mut types = HashMap::with_capacity(self.types.len());
        for ty in self.types {
            if let Some(existing) = types.insert(ty.name, ty) {
                return Err(StoreError::Model(format!(
                    "entity type name {} registered by more than one type",
                    existing.name
                )));
            }
        }

        let model = Model {
            types,
            filters: self.filters,
        };
        for name in model.types.keys() {
            model.root_name(name)?;
        }
        Ok(model)
    }
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ModelBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBuilder")
            .field("types", &self.types)
            .field("filtered", &self.filters.keys().collect::<Vec<_>>())
            .field("query_filters_supported", &self.query_filters_supported)
            .finish()
    }
}

/// Frozen schema shared by every session.
pub struct Model {
    types: HashMap<&'static str, EntityType>,
    filters: HashMap<&'static str, QueryFilter>,
}

impl Model {
    #[must_use]
    pub fn entity_type(&self, name: &str) -> Option<&EntityType> {
        self.types.get(name)
    }

    /// The descriptor registered for `E`, checking it is the same Rust type.
    pub fn entity_type_of<E: Entity>(&self) -> Result<&EntityType, StoreError> {
        match self.types.get(E::ENTITY_TYPE) {
            Some(ty) if ty.type_id == TypeId::of::<E>() => Ok(ty),
            _ => Err(StoreError::UnknownEntityType(E::ENTITY_TYPE.to_owned())),
        }
    }

    /// The default read filter applying to `name`, inherited from its root.
    #[must_use]
    pub fn query_filter_for(&self, name: &str) -> Option<&QueryFilter> {
        let root = self.root_name(name).ok()?;
        self.filters.get(root)
    }

    /// Name of the hierarchy root of `name`.
    pub fn root_name(&self, name: &str) -> Result<&'static str, StoreError> {
        let mut current = self
            .types
            .get(name)
            .ok_or_else(|| StoreError::UnknownEntityType(name.to_owned()))?;
        // A chain longer than the number of types must contain a cycle.
        for _ in 0..=self.types.len() {
            let Some(base) = current.base_type else {
                return Ok(current.name);
            };
            current = self.types.get(base).ok_or_else(|| {
                StoreError::Model(format!(
                    "{} declares base type {base} which is not registered",
                    current.name
                ))
            })?;
        }
        Err(StoreError::Model(format!(
            "entity type hierarchy of {name} is cyclic"
        )))
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("types", &self.types)
            .field("filtered", &self.filters.keys().collect::<Vec<_>>())
            .finish()
    }
}
