//! Recipe catalog seam.
//!
//! Recipes are owned by the settings layer; the engine only reads them.
//! [`InMemoryRecipeCatalog`] ships the two factory-default recipes.

use std::collections::BTreeMap;

use autoline_types::{Polarity, Recipe, RecipeId};

/// Read-only lookup of recipes.
pub trait RecipeCatalog: Send + Sync {
    /// Look up a recipe by id.
    fn recipe(&self, id: &RecipeId) -> Option<Recipe>;

    /// The default recipe for a polarity, if one is marked.
    fn default_recipe(&self, polarity: Polarity) -> Option<Recipe>;
}

/// A catalog held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecipeCatalog {
    recipes: BTreeMap<RecipeId, Recipe>,
}

impl InMemoryRecipeCatalog {
    /// Create an empty catalog.
    pub const fn new() -> Self {
        Self {
            recipes: BTreeMap::new(),
        }
    }

    /// Catalog holding the factory-default anode and cathode recipes.
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        catalog.insert(default_anode_recipe());
        catalog.insert(default_cathode_recipe());
        catalog
    }

    /// Add or replace a recipe.
    pub fn insert(&mut self, recipe: Recipe) {
        self.recipes.insert(recipe.id.clone(), recipe);
    }
}

impl RecipeCatalog for InMemoryRecipeCatalog {
    fn recipe(&self, id: &RecipeId) -> Option<Recipe> {
        self.recipes.get(id).cloned()
    }

    fn default_recipe(&self, polarity: Polarity) -> Option<Recipe> {
        self.recipes
            .values()
            .find(|r| r.is_default && r.target_polarity == polarity)
            .cloned()
    }
}

/// Factory-default anode recipe.
pub fn default_anode_recipe() -> Recipe {
    Recipe {
        id: RecipeId::new("rec-anode-default"),
        name: "Anode standard v1.0".to_owned(),
        version: "1.0".to_owned(),
        is_default: true,
        target_polarity: Polarity::Anode,
        bake_duration_h: 15.0,
        growth_duration_h: 0.0,
        e_gun_voltage: 5.0,
        e_gun_current: 300.0,
        indium_temp: 100.0,
        seal_pressure: 1200.0,
        cs_current: 0.0,
        o2_pressure: 0.0,
        photo_current: 0.0,
        bake_target_temp: 390.0,
        growth_target_temp: 0.0,
    }
}

/// Factory-default cathode recipe.
pub fn default_cathode_recipe() -> Recipe {
    Recipe {
        id: RecipeId::new("rec-cathode-default"),
        name: "Cathode standard v1.0".to_owned(),
        version: "1.0".to_owned(),
        is_default: true,
        target_polarity: Polarity::Cathode,
        bake_duration_h: 24.0,
        growth_duration_h: 12.0,
        e_gun_voltage: 0.0,
        e_gun_current: 0.0,
        indium_temp: 0.0,
        seal_pressure: 0.0,
        cs_current: 4.0,
        o2_pressure: 2e-5,
        photo_current: 550.0,
        bake_target_temp: 420.0,
        growth_target_temp: 110.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_by_polarity() {
        let catalog = InMemoryRecipeCatalog::with_defaults();
        let anode = catalog.default_recipe(Polarity::Anode);
        assert_eq!(
            anode.map(|r| r.id),
            Some(RecipeId::new("rec-anode-default"))
        );
        let cathode = catalog.recipe(&RecipeId::new("rec-cathode-default"));
        assert!(cathode.is_some_and(|r| r.growth_duration_h > 0.0));
    }

    #[test]
    fn empty_catalog_has_no_default() {
        let catalog = InMemoryRecipeCatalog::new();
        assert!(catalog.default_recipe(Polarity::Cathode).is_none());
        assert!(catalog.recipe(&RecipeId::new("missing")).is_none());
    }
}
