//! Broadphase: coarse overlap detection over fixture proxies

mod dynamic_tree;

pub use dynamic_tree::{DynamicTree, ProxyId, TreeMargins};

use crate::fixture::FixtureHandle;
use void_math2d::{RayCastInput, Vec2, AABB};

/// Fixture proxies in a dynamic AABB tree
#[derive(Debug, Default)]
pub struct BroadPhase {
    tree: DynamicTree<FixtureHandle>,
}

impl BroadPhase {
    pub fn new(margins: TreeMargins) -> Self {
        Self {
            tree: DynamicTree::new(margins),
        }
    }

    pub fn set_margins(&mut self, margins: TreeMargins) {
        self.tree.set_margins(margins);
    }

    /// Insert a proxy for a fixture's tight AABB
    pub fn insert(&mut self, aabb: AABB, fixture: FixtureHandle) -> ProxyId {
        self.tree.create_proxy(aabb, fixture)
    }

    pub fn remove(&mut self, proxy: ProxyId) {
        self.tree.destroy_proxy(proxy);
    }

    /// Returns whether the tree had to be restructured
    pub fn move_proxy(&mut self, proxy: ProxyId, aabb: AABB, displacement: Vec2) -> bool {
        self.tree.move_proxy(proxy, aabb, displacement)
    }

    pub fn fat_aabb(&self, proxy: ProxyId) -> Option<AABB> {
        self.tree.fat_aabb(proxy)
    }

    /// Whether the fat AABBs of two proxies overlap
    pub fn test_overlap(&self, a: ProxyId, b: ProxyId) -> bool {
        match (self.tree.fat_aabb(a), self.tree.fat_aabb(b)) {
            (Some(a), Some(b)) => a.intersects(&b),
            _ => false,
        }
    }

    /// Visit fixtures whose fat AABBs overlap `aabb`, in tree order
    pub fn query<F>(&self, aabb: &AABB, mut callback: F)
    where
        F: FnMut(FixtureHandle) -> bool,
    {
        self.tree.query(aabb, |_, fixture| callback(fixture));
    }

    /// Fixtures overlapping the fat AABB of `proxy`, excluding `proxy` itself
    pub fn query_proxy(&self, proxy: ProxyId, out: &mut Vec<FixtureHandle>) {
        let Some(aabb) = self.tree.fat_aabb(proxy) else {
            return;
        };
        self.tree.query(&aabb, |other, fixture| {
            if other != proxy {
                out.push(fixture);
            }
            true
        });
    }

    /// Segment cast; see [`DynamicTree::ray_cast`] for the callback contract
    pub fn ray_cast<F>(&self, input: &RayCastInput, mut callback: F)
    where
        F: FnMut(&RayCastInput, FixtureHandle) -> f32,
    {
        self.tree
            .ray_cast(input, |sub, _, fixture| callback(sub, fixture));
    }

    pub fn proxy_count(&self) -> usize {
        self.tree.proxy_count()
    }

    pub fn tree_height(&self) -> i32 {
        self.tree.height()
    }

    pub fn validate(&self) -> bool {
        self.tree.validate()
    }
}
