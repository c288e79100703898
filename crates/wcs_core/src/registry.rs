//! Variant registry mapping station kinds to constructors.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::kind::StationKind;
use crate::variant::{CommissioningVariant, StationVariant, VariantContext};

/// Builds a variant bound to one station.
pub type VariantConstructor =
    Arc<dyn Fn(&VariantContext) -> anyhow::Result<Box<dyn StationVariant>> + Send + Sync>;

/// A registry of variant constructors.
///
/// Each [`StationKind`] maps to at most one constructor, and every
/// constructor is reachable from exactly one persisted key. Kinds without a
/// constructor resolve to "no match" just like unknown keys.
///
/// The registry is filled once at startup and shared read-only afterwards.
#[derive(Default, Clone)]
pub struct VariantRegistry {
    constructors: BTreeMap<StationKind, VariantConstructor>,
}

impl VariantRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Registry with a [`CommissioningVariant`] for every kind.
    pub fn commissioning() -> Self {
        let mut registry = Self::new();
        for kind in StationKind::ALL {
            registry
                .constructors
                .insert(kind, Arc::new(build_commissioning_variant));
        }
        registry
    }

    /// Register a constructor for a kind.
    ///
    /// Fails if the kind already has one.
    pub fn register<F>(&mut self, kind: StationKind, constructor: F) -> CoreResult<()>
    where
        F: Fn(&VariantContext) -> anyhow::Result<Box<dyn StationVariant>> + Send + Sync + 'static,
    {
        if self.constructors.contains_key(&kind) {
            return Err(CoreError::DuplicateVariant(kind.key().to_string()));
        }
        debug!("Registering variant: {}", kind);
        self.constructors.insert(kind, Arc::new(constructor));
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<F>(mut self, kind: StationKind, constructor: F) -> CoreResult<Self>
    where
        F: Fn(&VariantContext) -> anyhow::Result<Box<dyn StationVariant>> + Send + Sync + 'static,
    {
        self.register(kind, constructor)?;
        Ok(self)
    }

    /// Get the constructor for a kind.
    pub fn get(&self, kind: StationKind) -> Option<VariantConstructor> {
        self.constructors.get(&kind).cloned()
    }

    /// Resolve a persisted station-type key.
    ///
    /// Returns `None` for unknown keys and for kinds nobody registered.
    pub fn resolve(&self, key: &str) -> Option<(StationKind, VariantConstructor)> {
        let kind = StationKind::from_key(key)?;
        self.get(kind).map(|constructor| (kind, constructor))
    }

    /// Check if a kind has a constructor.
    pub fn contains(&self, kind: StationKind) -> bool {
        self.constructors.contains_key(&kind)
    }

    /// Registered kinds in registry order.
    pub fn kinds(&self) -> Vec<StationKind> {
        self.constructors.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

fn build_commissioning_variant(ctx: &VariantContext) -> anyhow::Result<Box<dyn StationVariant>> {
    Ok(Box::new(CommissioningVariant::new(ctx)))
}

impl std::fmt::Debug for VariantRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariantRegistry")
            .field("kinds", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}
