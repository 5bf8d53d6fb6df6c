//! STR packed R-tree over opaque item tokens.

use super::{Engine, ItemToken, TreeId};
use rstar::{AABB, RTree, RTreeObject};

#[derive(Debug, Clone, PartialEq)]
struct TreeEntry {
    envelope: AABB<[f64; 2]>,
    token: ItemToken,
}

impl RTreeObject for TreeEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

pub(crate) struct TreeNode {
    tree: RTree<TreeEntry>,
    /// Items whose geometry has no envelope. Iterated, never queried.
    empties: Vec<ItemToken>,
    node_capacity: usize,
}

fn aabb(bounds: [f64; 4]) -> AABB<[f64; 2]> {
    AABB::from_corners([bounds[0], bounds[1]], [bounds[2], bounds[3]])
}

fn envelope_distance(a: &AABB<[f64; 2]>, b: &AABB<[f64; 2]>) -> f64 {
    let dx = (b.lower()[0] - a.upper()[0]).max(a.lower()[0] - b.upper()[0]).max(0.0);
    let dy = (b.lower()[1] - a.upper()[1]).max(a.lower()[1] - b.upper()[1]).max(0.0);
    dx.hypot(dy)
}

impl Engine {
    pub(crate) fn create_strtree(&mut self, node_capacity: usize) -> Option<TreeId> {
        if node_capacity < 2 {
            return self.fail(format!(
                "IllegalArgumentException: Node capacity must be greater than 1, got {node_capacity}"
            ));
        }
        Some(TreeId(self.trees.insert(TreeNode {
            tree: RTree::new(),
            empties: Vec::new(),
            node_capacity,
        })))
    }

    pub(crate) fn destroy_strtree(&mut self, tree: TreeId) -> bool {
        if self.trees.remove(tree.0).is_some() {
            return true;
        }
        self.report("IllegalArgumentException: unknown STRtree handle");
        false
    }

    fn tree(&self, tree: TreeId) -> Option<&TreeNode> {
        match self.trees.get(tree.0) {
            Some(node) => Some(node),
            None => self.fail("IllegalArgumentException: unknown STRtree handle"),
        }
    }

    fn tree_mut(&mut self, tree: TreeId) -> Option<&mut TreeNode> {
        if self.trees.get(tree.0).is_none() {
            return self.fail("IllegalArgumentException: unknown STRtree handle");
        }
        self.trees.get_mut(tree.0)
    }

    pub(crate) fn strtree_node_capacity(&self, tree: TreeId) -> Option<usize> {
        self.tree(tree).map(|node| node.node_capacity)
    }

    /// Insert `token` under `bounds`; `None` bounds mark an empty geometry.
    pub(crate) fn strtree_insert(
        &mut self,
        tree: TreeId,
        bounds: Option<[f64; 4]>,
        token: ItemToken,
    ) -> bool {
        let Some(node) = self.tree_mut(tree) else {
            return false;
        };
        match bounds {
            Some(bounds) => node.tree.insert(TreeEntry {
                envelope: aabb(bounds),
                token,
            }),
            None => node.empties.push(token),
        }
        true
    }

    /// Remove the entry; `Some(false)` when it was not found.
    pub(crate) fn strtree_remove(
        &mut self,
        tree: TreeId,
        bounds: Option<[f64; 4]>,
        token: ItemToken,
    ) -> Option<bool> {
        let node = self.tree_mut(tree)?;
        Some(match bounds {
            Some(bounds) => node
                .tree
                .remove(&TreeEntry {
                    envelope: aabb(bounds),
                    token,
                })
                .is_some(),
            None => match node.empties.iter().position(|t| *t == token) {
                Some(index) => {
                    node.empties.swap_remove(index);
                    true
                }
                None => false,
            },
        })
    }

    /// Tokens whose envelope intersects `bounds`.
    pub(crate) fn strtree_query(&self, tree: TreeId, bounds: [f64; 4]) -> Option<Vec<ItemToken>> {
        let node = self.tree(tree)?;
        Some(
            node.tree
                .locate_in_envelope_intersecting(&aabb(bounds))
                .map(|entry| entry.token)
                .collect(),
        )
    }

    pub(crate) fn strtree_iterate(&self, tree: TreeId) -> Option<Vec<ItemToken>> {
        let node = self.tree(tree)?;
        Some(
            node.tree
                .iter()
                .map(|entry| entry.token)
                .chain(node.empties.iter().copied())
                .collect(),
        )
    }

    /// Every indexed token paired with the distance from its envelope to
    /// `bounds`, closest first.
    pub(crate) fn strtree_nearest_candidates(
        &self,
        tree: TreeId,
        bounds: [f64; 4],
    ) -> Option<Vec<(f64, ItemToken)>> {
        let node = self.tree(tree)?;
        let query = aabb(bounds);
        let mut candidates: Vec<(f64, ItemToken)> = node
            .tree
            .iter()
            .map(|entry| (envelope_distance(&entry.envelope, &query), entry.token))
            .collect();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        Some(candidates)
    }

    pub(crate) fn strtree_len(&self, tree: TreeId) -> Option<usize> {
        self.tree(tree)
            .map(|node| node.tree.size() + node.empties.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with_tree() -> (Engine, TreeId) {
        let mut engine = Engine::init();
        let tree = engine.create_strtree(10).unwrap();
        (engine, tree)
    }

    #[test]
    fn test_query_by_envelope() {
        let (mut engine, tree) = engine_with_tree();
        assert!(engine.strtree_insert(tree, Some([0.0, 0.0, 1.0, 1.0]), ItemToken(1)));
        assert!(engine.strtree_insert(tree, Some([5.0, 5.0, 6.0, 6.0]), ItemToken(2)));
        assert!(engine.strtree_insert(tree, None, ItemToken(3)));

        let hits = engine.strtree_query(tree, [0.5, 0.5, 2.0, 2.0]).unwrap();
        assert_eq!(hits, vec![ItemToken(1)]);

        let mut all = engine.strtree_iterate(tree).unwrap();
        all.sort();
        assert_eq!(all, vec![ItemToken(1), ItemToken(2), ItemToken(3)]);
        assert_eq!(engine.strtree_len(tree), Some(3));
    }

    #[test]
    fn test_remove_needs_matching_envelope() {
        let (mut engine, tree) = engine_with_tree();
        engine.strtree_insert(tree, Some([0.0, 0.0, 1.0, 1.0]), ItemToken(7));
        assert_eq!(
            engine.strtree_remove(tree, Some([0.0, 0.0, 2.0, 2.0]), ItemToken(7)),
            Some(false)
        );
        assert_eq!(
            engine.strtree_remove(tree, Some([0.0, 0.0, 1.0, 1.0]), ItemToken(7)),
            Some(true)
        );
        assert_eq!(engine.strtree_len(tree), Some(0));
    }

    #[test]
    fn test_nearest_candidates_are_ordered() {
        let (mut engine, tree) = engine_with_tree();
        engine.strtree_insert(tree, Some([10.0, 0.0, 11.0, 1.0]), ItemToken(1));
        engine.strtree_insert(tree, Some([3.0, 0.0, 4.0, 1.0]), ItemToken(2));
        engine.strtree_insert(tree, Some([0.0, 0.0, 1.0, 1.0]), ItemToken(3));
        let candidates = engine
            .strtree_nearest_candidates(tree, [0.5, 0.5, 0.5, 0.5])
            .unwrap();
        let order: Vec<ItemToken> = candidates.iter().map(|c| c.1).collect();
        assert_eq!(order, vec![ItemToken(3), ItemToken(2), ItemToken(1)]);
        assert_eq!(candidates[0].0, 0.0);
        assert_eq!(candidates[1].0, 2.5);
    }

    #[test]
    fn test_capacity_is_validated() {
        let mut engine = Engine::init();
        assert!(engine.create_strtree(1).is_none());
        let tree = engine.create_strtree(4).unwrap();
        assert_eq!(engine.strtree_node_capacity(tree), Some(4));
        assert!(engine.destroy_strtree(tree));
        assert_eq!(engine.stats().strtrees, 0);
    }
}
