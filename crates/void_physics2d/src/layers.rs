//! Collision layers and filtering

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A collision layer identifier (bit index into a 32-bit mask)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollisionLayer(pub u32);

impl CollisionLayer {
    /// Default layer
    pub const DEFAULT: Self = Self(0);
    /// Immovable map geometry
    pub const WALLS: Self = Self(1);
    /// Moving actors
    pub const MOBS: Self = Self(2);
    /// Loose items
    pub const ITEMS: Self = Self(3);
    /// Fast-moving projectiles
    pub const PROJECTILES: Self = Self(4);
    /// Non-blocking trigger volumes
    pub const TRIGGERS: Self = Self(5);

    /// Create a custom layer
    pub const fn custom(id: u32) -> Self {
        Self(id)
    }

    /// Get the layer as a bitmask
    pub fn as_mask(&self) -> u32 {
        1u32.checked_shl(self.0).unwrap_or(0)
    }
}

impl Default for CollisionLayer {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Layer/mask filter pair carried by every fixture
///
/// `layer` is what the fixture is, `mask` is what it collides with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionGroups {
    pub layer: u32,
    pub mask: u32,
}

impl CollisionGroups {
    /// Collides with everything
    pub const ALL: Self = Self {
        layer: u32::MAX,
        mask: u32::MAX,
    };

    /// Collides with nothing
    pub const NONE: Self = Self { layer: 0, mask: 0 };

    pub fn new(layer: u32, mask: u32) -> Self {
        Self { layer, mask }
    }

    /// Create from a single layer that collides with specific layers
    pub fn from_layer(layer: CollisionLayer, collides_with: &[CollisionLayer]) -> Self {
        let mask = collides_with.iter().fold(0u32, |acc, l| acc | l.as_mask());
        Self {
            layer: layer.as_mask(),
            mask,
        }
    }

    /// Both sides must accept each other
    pub fn can_collide(&self, other: &CollisionGroups) -> bool {
        (self.layer & other.mask) != 0 && (other.layer & self.mask) != 0
    }

    pub fn with_layer(mut self, layer: CollisionLayer) -> Self {
        self.layer |= layer.as_mask();
        self
    }

    pub fn with_mask(mut self, layer: CollisionLayer) -> Self {
        self.mask |= layer.as_mask();
        self
    }

    pub fn without_mask(mut self, layer: CollisionLayer) -> Self {
        self.mask &= !layer.as_mask();
        self
    }
}

impl Default for CollisionGroups {
    fn default() -> Self {
        Self::ALL
    }
}

/// Named layers and the rules between them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollisionMatrix {
    layer_names: BTreeMap<String, CollisionLayer>,
    rules: BTreeMap<CollisionLayer, Vec<CollisionLayer>>,
}

impl Default for CollisionMatrix {
    fn default() -> Self {
        use CollisionLayer as L;

        let mut matrix = Self::new();
        matrix.register_layer("default", L::DEFAULT);
        matrix.register_layer("walls", L::WALLS);
        matrix.register_layer("mobs", L::MOBS);
        matrix.register_layer("items", L::ITEMS);
        matrix.register_layer("projectiles", L::PROJECTILES);
        matrix.register_layer("triggers", L::TRIGGERS);

        matrix.set_collides_with(L::WALLS, &[L::DEFAULT, L::MOBS, L::ITEMS, L::PROJECTILES]);
        matrix.set_collides_with(
            L::MOBS,
            &[L::DEFAULT, L::WALLS, L::MOBS, L::PROJECTILES, L::TRIGGERS],
        );
        matrix.set_collides_with(L::ITEMS, &[L::DEFAULT, L::WALLS, L::ITEMS]);
        matrix.set_collides_with(L::PROJECTILES, &[L::DEFAULT, L::WALLS, L::MOBS]);
        matrix.set_collides_with(L::TRIGGERS, &[L::MOBS]);

        matrix
    }
}

impl CollisionMatrix {
    /// Create an empty collision matrix
    pub fn new() -> Self {
        Self {
            layer_names: BTreeMap::new(),
            rules: BTreeMap::new(),
        }
    }

    /// Register a named layer
    pub fn register_layer(&mut self, name: &str, layer: CollisionLayer) {
        self.layer_names.insert(name.to_string(), layer);
    }

    /// Get a layer by name
    pub fn get_layer(&self, name: &str) -> Option<CollisionLayer> {
        self.layer_names.get(name).copied()
    }

    /// Set which layers a given layer collides with
    pub fn set_collides_with(&mut self, layer: CollisionLayer, collides_with: &[CollisionLayer]) {
        self.rules.insert(layer, collides_with.to_vec());
    }

    /// Filter groups for a fixture on `layer`; layers without rules collide with everything
    pub fn get_groups(&self, layer: CollisionLayer) -> CollisionGroups {
        let mask = self
            .rules
            .get(&layer)
            .map(|layers| layers.iter().fold(0u32, |acc, l| acc | l.as_mask()))
            .unwrap_or(u32::MAX);

        CollisionGroups {
            layer: layer.as_mask(),
            mask,
        }
    }

    /// Get collision groups by layer name
    pub fn get_groups_by_name(&self, name: &str) -> Option<CollisionGroups> {
        self.get_layer(name).map(|layer| self.get_groups(layer))
    }

    /// Check if two layers can collide
    pub fn can_collide(&self, a: CollisionLayer, b: CollisionLayer) -> bool {
        self.get_groups(a).can_collide(&self.get_groups(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_require_both_sides() {
        let a = CollisionGroups::new(0b01, 0b10);
        let b = CollisionGroups::new(0b10, 0b01);
        let c = CollisionGroups::new(0b10, 0b00);

        assert!(a.can_collide(&b));
        assert!(!a.can_collide(&c));
        assert!(!CollisionGroups::NONE.can_collide(&CollisionGroups::ALL));
    }

    #[test]
    fn test_default_matrix() {
        let matrix = CollisionMatrix::default();
        assert!(matrix.can_collide(CollisionLayer::MOBS, CollisionLayer::WALLS));
        assert!(!matrix.can_collide(CollisionLayer::TRIGGERS, CollisionLayer::WALLS));
        assert!(!matrix.can_collide(CollisionLayer::ITEMS, CollisionLayer::PROJECTILES));
        assert!(matrix.get_groups_by_name("items").is_some());
    }

    #[test]
    fn test_out_of_range_layer_has_empty_mask() {
        assert_eq!(CollisionLayer::custom(40).as_mask(), 0);
    }
}
