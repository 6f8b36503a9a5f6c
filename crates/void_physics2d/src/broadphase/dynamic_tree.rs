//! Dynamic AABB tree
//!
//! An incrementally balanced binary tree of fat AABBs. Leaves carry a copyable
//! payload; internal nodes bound their two children. Traversal is stack based
//! and depends only on the tree shape, so query order is reproducible.

use void_math2d::{RayCastInput, Vec2, AABB};

pub(crate) const NULL_NODE: usize = usize::MAX;

/// Leaf identifier inside a [`DynamicTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyId(pub(crate) usize);

#[derive(Debug, Clone)]
struct TreeNode<T: Copy> {
    /// Fat AABB for leaves, union of children for internal nodes
    aabb: AABB,
    user_data: Option<T>,
    /// Parent index, or next free node while on the free list
    parent: usize,
    children: [usize; 2],
    /// 0 for leaves
    height: i32,
    /// Leaf was re-inserted since the flag was last cleared
    moved: bool,
}

impl<T: Copy> TreeNode<T> {
    #[inline]
    fn is_leaf(&self) -> bool {
        self.children[0] == NULL_NODE
    }
}

/// Fattening parameters applied on insert and move
#[derive(Debug, Clone, Copy)]
pub struct TreeMargins {
    /// Fixed margin around each tight AABB
    pub extension: f32,
    /// Multiplier on the per-step displacement for predictive fattening
    pub displacement_multiplier: f32,
}

impl Default for TreeMargins {
    fn default() -> Self {
        Self {
            extension: 0.1,
            displacement_multiplier: 2.0,
        }
    }
}

/// A dynamic AABB tree for efficient spatial queries
#[derive(Debug, Clone)]
pub struct DynamicTree<T: Copy> {
    root: usize,
    nodes: Vec<TreeNode<T>>,
    free_list: usize,
    node_count: usize,
    leaf_count: usize,
    margins: TreeMargins,
}

impl<T: Copy> Default for DynamicTree<T> {
    fn default() -> Self {
        Self::new(TreeMargins::default())
    }
}

impl<T: Copy> DynamicTree<T> {
    /// Creates a new, empty dynamic tree
    pub fn new(margins: TreeMargins) -> Self {
        Self {
            root: NULL_NODE,
            nodes: Vec::new(),
            free_list: NULL_NODE,
            node_count: 0,
            leaf_count: 0,
            margins,
        }
    }

    pub fn set_margins(&mut self, margins: TreeMargins) {
        self.margins = margins;
    }

    /// Insert a leaf for a tight AABB; the stored box is fattened
    pub fn create_proxy(&mut self, aabb: AABB, user_data: T) -> ProxyId {
        let leaf = self.allocate_node();
        let node = &mut self.nodes[leaf];
        node.aabb = aabb.expand(self.margins.extension);
        node.user_data = Some(user_data);
        node.height = 0;
        node.moved = true;

        self.insert_leaf(leaf);
        self.leaf_count += 1;
        ProxyId(leaf)
    }

    /// Remove a leaf from the tree
    pub fn destroy_proxy(&mut self, proxy: ProxyId) {
        debug_assert!(self.is_live_leaf(proxy.0));
        if !self.is_live_leaf(proxy.0) {
            return;
        }

        self.remove_leaf(proxy.0);
        self.deallocate_node(proxy.0);
        self.leaf_count -= 1;
    }

    /// Move a leaf to a new tight AABB
    ///
    /// Returns `false` when the tight box is still inside the fat box (and the
    /// fat box is not grossly oversized), in which case the tree is untouched.
    pub fn move_proxy(&mut self, proxy: ProxyId, aabb: AABB, displacement: Vec2) -> bool {
        let leaf = proxy.0;
        debug_assert!(self.is_live_leaf(leaf));
        if !self.is_live_leaf(leaf) {
            return false;
        }

        let extension = self.margins.extension;
        let mut fat = aabb.expand(extension);
        let d = displacement * self.margins.displacement_multiplier;
        if d.x < 0.0 {
            fat.min.x += d.x;
        } else {
            fat.max.x += d.x;
        }
        if d.y < 0.0 {
            fat.min.y += d.y;
        } else {
            fat.max.y += d.y;
        }

        let tree_aabb = self.nodes[leaf].aabb;
        if tree_aabb.contains(&aabb) {
            // Re-insert anyway if the stored box has grown far too large
            let huge = fat.expand(4.0 * extension);
            if huge.contains(&tree_aabb) {
                return false;
            }
        }

        self.remove_leaf(leaf);
        self.nodes[leaf].aabb = fat;
        self.insert_leaf(leaf);
        self.nodes[leaf].moved = true;
        true
    }

    /// Payload stored on a leaf
    pub fn user_data(&self, proxy: ProxyId) -> Option<T> {
        self.nodes.get(proxy.0).and_then(|n| n.user_data)
    }

    /// Fat AABB stored on a leaf
    pub fn fat_aabb(&self, proxy: ProxyId) -> Option<AABB> {
        self.nodes
            .get(proxy.0)
            .filter(|n| n.user_data.is_some())
            .map(|n| n.aabb)
    }

    pub fn was_moved(&self, proxy: ProxyId) -> bool {
        self.nodes.get(proxy.0).map(|n| n.moved).unwrap_or(false)
    }

    pub fn clear_moved(&mut self, proxy: ProxyId) {
        if let Some(node) = self.nodes.get_mut(proxy.0) {
            node.moved = false;
        }
    }

    pub fn proxy_count(&self) -> usize {
        self.leaf_count
    }

    /// Height of the root; 0 for an empty tree or a single leaf
    pub fn height(&self) -> i32 {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root].height
        }
    }

    /// Visit every leaf whose fat AABB overlaps `aabb`
    ///
    /// The callback returns `false` to stop the query early.
    pub fn query<F>(&self, aabb: &AABB, mut callback: F)
    where
        F: FnMut(ProxyId, T) -> bool,
    {
        if self.root == NULL_NODE {
            return;
        }

        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(node_id) = stack.pop() {
            let node = &self.nodes[node_id];
            if !node.aabb.intersects(aabb) {
                continue;
            }
            if node.is_leaf() {
                if let Some(data) = node.user_data {
                    if !callback(ProxyId(node_id), data) {
                        return;
                    }
                }
            } else {
                // Right first so the left subtree is visited first
                stack.push(node.children[1]);
                stack.push(node.children[0]);
            }
        }
    }

    /// Cast a segment through the tree
    ///
    /// The callback receives the clipped input and the leaf, and returns the
    /// new max fraction: `0` stops, a negative value ignores the leaf, and a
    /// positive value clips the segment.
    pub fn ray_cast<F>(&self, input: &RayCastInput, mut callback: F)
    where
        F: FnMut(&RayCastInput, ProxyId, T) -> f32,
    {
        if self.root == NULL_NODE {
            return;
        }

        let p1 = input.origin;
        let (r, len) = input.translation.normalize_and_length();
        if len == 0.0 {
            return;
        }

        // Separating axis perpendicular to the segment
        let v = r.perpendicular();
        let abs_v = v.abs();

        let mut max_fraction = input.max_fraction;
        let segment_aabb = |max_fraction: f32| {
            let t = input.point_at(max_fraction);
            AABB::new(p1.min(t), p1.max(t))
        };
        let mut seg_aabb = segment_aabb(max_fraction);

        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(node_id) = stack.pop() {
            let node = &self.nodes[node_id];
            if !node.aabb.intersects(&seg_aabb) {
                continue;
            }

            let c = node.aabb.center();
            let h = node.aabb.half_extents();
            let separation = v.dot(p1 - c).abs() - abs_v.dot(h);
            if separation > 0.0 {
                continue;
            }

            if node.is_leaf() {
                let Some(data) = node.user_data else { continue };
                let sub_input = RayCastInput::new(p1, input.translation, max_fraction);
                let value = callback(&sub_input, ProxyId(node_id), data);

                if value == 0.0 {
                    return;
                }
                if value > 0.0 {
                    max_fraction = value;
                    seg_aabb = segment_aabb(max_fraction);
                }
            } else {
                stack.push(node.children[1]);
                stack.push(node.children[0]);
            }
        }
    }

    /// Check structural invariants; used by tests
    pub fn validate(&self) -> bool {
        if self.root == NULL_NODE {
            return self.leaf_count == 0;
        }
        if self.nodes[self.root].parent != NULL_NODE {
            return false;
        }
        let mut leaves = 0;
        let ok = self.validate_node(self.root, &mut leaves);
        ok && leaves == self.leaf_count
    }

    fn validate_node(&self, index: usize, leaves: &mut usize) -> bool {
        let node = &self.nodes[index];
        if node.is_leaf() {
            *leaves += 1;
            return node.height == 0 && node.user_data.is_some();
        }

        let [c1, c2] = node.children;
        let (n1, n2) = (&self.nodes[c1], &self.nodes[c2]);
        if n1.parent != index || n2.parent != index {
            return false;
        }
        if node.height != 1 + n1.height.max(n2.height) {
            return false;
        }
        if !node.aabb.contains(&n1.aabb) || !node.aabb.contains(&n2.aabb) {
            return false;
        }
        self.validate_node(c1, leaves) && self.validate_node(c2, leaves)
    }

    fn is_live_leaf(&self, index: usize) -> bool {
        self.nodes
            .get(index)
            .map(|n| n.is_leaf() && n.user_data.is_some())
            .unwrap_or(false)
    }

    // --- Internal Leaf Management ---

    fn insert_leaf(&mut self, leaf: usize) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf].parent = NULL_NODE;
            return;
        }

        // Find the best sibling by the surface area heuristic
        let leaf_aabb = self.nodes[leaf].aabb;
        let mut index = self.root;
        while !self.nodes[index].is_leaf() {
            let node = &self.nodes[index];
            let [child1, child2] = node.children;

            let area = node.aabb.perimeter();
            let combined_area = node.aabb.union(&leaf_aabb).perimeter();

            // Cost of creating a new parent for this node and the new leaf
            let cost = 2.0 * combined_area;

            // Minimum cost of pushing the leaf further down the tree
            let inheritance_cost = 2.0 * (combined_area - area);

            let descend_cost = |child: usize| {
                let child_node = &self.nodes[child];
                let new_area = child_node.aabb.union(&leaf_aabb).perimeter();
                if child_node.is_leaf() {
                    new_area + inheritance_cost
                } else {
                    new_area - child_node.aabb.perimeter() + inheritance_cost
                }
            };
            let cost1 = descend_cost(child1);
            let cost2 = descend_cost(child2);

            if cost < cost1 && cost < cost2 {
                break;
            }

            index = if cost1 < cost2 { child1 } else { child2 };
        }

        let sibling = index;

        let old_parent = self.nodes[sibling].parent;
        let new_parent = self.allocate_node();
        self.nodes[new_parent].parent = old_parent;
        self.nodes[new_parent].user_data = None;
        self.nodes[new_parent].aabb = leaf_aabb.union(&self.nodes[sibling].aabb);
        self.nodes[new_parent].height = self.nodes[sibling].height + 1;
        self.nodes[new_parent].children = [sibling, leaf];
        self.nodes[sibling].parent = new_parent;
        self.nodes[leaf].parent = new_parent;

        if old_parent != NULL_NODE {
            let siblings = &mut self.nodes[old_parent].children;
            if siblings[0] == sibling {
                siblings[0] = new_parent;
            } else {
                siblings[1] = new_parent;
            }
        } else {
            self.root = new_parent;
        }

        self.refit_ancestors(self.nodes[leaf].parent);
    }

    fn remove_leaf(&mut self, leaf: usize) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf].parent;
        let grand_parent = self.nodes[parent].parent;
        let sibling = if self.nodes[parent].children[0] == leaf {
            self.nodes[parent].children[1]
        } else {
            self.nodes[parent].children[0]
        };

        if grand_parent != NULL_NODE {
            let children = &mut self.nodes[grand_parent].children;
            if children[0] == parent {
                children[0] = sibling;
            } else {
                children[1] = sibling;
            }
            self.nodes[sibling].parent = grand_parent;
            self.deallocate_node(parent);
            self.refit_ancestors(grand_parent);
        } else {
            self.root = sibling;
            self.nodes[sibling].parent = NULL_NODE;
            self.deallocate_node(parent);
        }
    }

    /// Walk to the root rebalancing and fixing heights and bounds
    fn refit_ancestors(&mut self, start: usize) {
        let mut index = start;
        while index != NULL_NODE {
            index = self.balance(index);
            self.update_node_meta(index);
            index = self.nodes[index].parent;
        }
    }

    // --- Node Allocation ---

    fn allocate_node(&mut self) -> usize {
        self.node_count += 1;
        if self.free_list != NULL_NODE {
            let index = self.free_list;
            let node = &mut self.nodes[index];
            self.free_list = node.parent;
            node.parent = NULL_NODE;
            node.children = [NULL_NODE, NULL_NODE];
            node.height = 0;
            node.moved = false;
            index
        } else {
            self.nodes.push(TreeNode {
                aabb: AABB::default(),
                user_data: None,
                parent: NULL_NODE,
                children: [NULL_NODE, NULL_NODE],
                height: 0,
                moved: false,
            });
            self.nodes.len() - 1
        }
    }

    fn deallocate_node(&mut self, index: usize) {
        let node = &mut self.nodes[index];
        node.parent = self.free_list;
        node.user_data = None;
        node.height = -1;
        self.free_list = index;
        self.node_count -= 1;
    }

    // --- Balancing (Tree Rotations) ---

    fn balance(&mut self, i_a: usize) -> usize {
        let node_a = &self.nodes[i_a];
        if node_a.is_leaf() || node_a.height < 2 {
            return i_a;
        }

        let [i_b, i_c] = node_a.children;
        let balance = self.nodes[i_c].height - self.nodes[i_b].height;

        if balance > 1 {
            // Rotate C up
            let [i_f, i_g] = self.nodes[i_c].children;
            self.promote(i_a, i_c);

            if self.nodes[i_f].height > self.nodes[i_g].height {
                self.nodes[i_c].children[1] = i_f;
                self.nodes[i_a].children[1] = i_g;
                self.nodes[i_g].parent = i_a;
            } else {
                self.nodes[i_c].children[1] = i_g;
                self.nodes[i_a].children[1] = i_f;
                self.nodes[i_f].parent = i_a;
            }
            self.update_node_meta(i_a);
            self.update_node_meta(i_c);
            return i_c;
        }

        if balance < -1 {
            // Rotate B up
            let [i_d, i_e] = self.nodes[i_b].children;
            self.promote(i_a, i_b);

            if self.nodes[i_d].height > self.nodes[i_e].height {
                self.nodes[i_b].children[1] = i_d;
                self.nodes[i_a].children[0] = i_e;
                self.nodes[i_e].parent = i_a;
            } else {
                self.nodes[i_b].children[1] = i_e;
                self.nodes[i_a].children[0] = i_d;
                self.nodes[i_d].parent = i_a;
            }
            self.update_node_meta(i_a);
            self.update_node_meta(i_b);
            return i_b;
        }

        i_a
    }

    /// Swap `child` into `parent`'s place, making `parent` its first child
    fn promote(&mut self, parent: usize, child: usize) {
        let grand = self.nodes[parent].parent;
        self.nodes[child].children[0] = parent;
        self.nodes[child].parent = grand;
        self.nodes[parent].parent = child;

        if grand != NULL_NODE {
            let children = &mut self.nodes[grand].children;
            if children[0] == parent {
                children[0] = child;
            } else {
                children[1] = child;
            }
        } else {
            self.root = child;
        }
    }

    fn update_node_meta(&mut self, index: usize) {
        let [child1, child2] = self.nodes[index].children;
        if child1 == NULL_NODE {
            return;
        }
        let aabb = self.nodes[child1].aabb.union(&self.nodes[child2].aabb);
        let height = 1 + self.nodes[child1].height.max(self.nodes[child2].height);
        let node = &mut self.nodes[index];
        node.aabb = aabb;
        node.height = height;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box(x: f32, y: f32) -> AABB {
        AABB::from_center_half_extents(Vec2::new(x, y), Vec2::splat(0.5))
    }

    #[test]
    fn test_insert_and_query() {
        let mut tree: DynamicTree<u32> = DynamicTree::default();
        for i in 0..32 {
            tree.create_proxy(unit_box(i as f32 * 2.0, 0.0), i);
        }
        assert!(tree.validate());
        assert_eq!(tree.proxy_count(), 32);
        // Balanced: far below a degenerate list
        assert!(tree.height() < 12);

        let mut hits = Vec::new();
        tree.query(&unit_box(10.0, 0.0), |_, data| {
            hits.push(data);
            true
        });
        assert_eq!(hits, vec![5]);
    }

    #[test]
    fn test_query_order_is_stable() {
        let build = || {
            let mut tree: DynamicTree<u32> = DynamicTree::default();
            for i in 0..16 {
                tree.create_proxy(unit_box((i % 4) as f32 * 0.5, (i / 4) as f32 * 0.5), i);
            }
            tree
        };
        let collect = |tree: &DynamicTree<u32>| {
            let mut out = Vec::new();
            tree.query(&AABB::new(Vec2::splat(-1.0), Vec2::splat(3.0)), |_, d| {
                out.push(d);
                true
            });
            out
        };
        assert_eq!(collect(&build()), collect(&build()));
        assert_eq!(collect(&build()).len(), 16);
    }

    #[test]
    fn test_move_within_margin_keeps_leaf() {
        let mut tree: DynamicTree<u32> = DynamicTree::default();
        let proxy = tree.create_proxy(unit_box(0.0, 0.0), 7);

        // Small nudge stays inside the fat box
        assert!(!tree.move_proxy(proxy, unit_box(0.05, 0.0), Vec2::new(0.05, 0.0)));

        // Large jump re-inserts, fattened toward the motion
        assert!(tree.move_proxy(proxy, unit_box(3.0, 0.0), Vec2::new(3.0, 0.0)));
        let fat = tree.fat_aabb(proxy).unwrap();
        assert!(fat.max.x > 3.5 + 0.1 + 5.0);
        assert!(tree.validate());
    }

    #[test]
    fn test_destroy_proxy() {
        let mut tree: DynamicTree<u32> = DynamicTree::default();
        let ids: Vec<_> = (0..8).map(|i| tree.create_proxy(unit_box(i as f32, 0.0), i)).collect();
        for id in ids.iter().step_by(2) {
            tree.destroy_proxy(*id);
        }
        assert!(tree.validate());
        assert_eq!(tree.proxy_count(), 4);
        assert_eq!(tree.user_data(ids[0]), None);
        assert_eq!(tree.user_data(ids[1]), Some(1));
    }

    #[test]
    fn test_ray_cast_clips() {
        let mut tree: DynamicTree<u32> = DynamicTree::default();
        for i in 0..5 {
            tree.create_proxy(unit_box(2.0 + i as f32 * 2.0, 0.0), i);
        }

        let input = RayCastInput::new(Vec2::ZERO, Vec2::new(20.0, 0.0), 1.0);
        let mut closest = (f32::MAX, u32::MAX);
        tree.ray_cast(&input, |sub, proxy, data| {
            let aabb = tree.fat_aabb(proxy).unwrap();
            match aabb.ray_cast(sub) {
                Some(hit) => {
                    if hit.fraction < closest.0 {
                        closest = (hit.fraction, data);
                    }
                    hit.fraction
                }
                None => -1.0,
            }
        });
        assert_eq!(closest.1, 0);
        // Fat box of the first leaf starts at x = 1.4
        assert!((closest.0 - 1.4 / 20.0).abs() < 1e-5);
    }
}
