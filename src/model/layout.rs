//! The binary layout tree describing how a window's panes are arranged
//! spatially (spec.md §3, §4.1.4).

use crate::ids::PaneId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SplitDirection {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum LayoutNode {
    Leaf(PaneId),
    Split {
        direction: SplitDirection,
        ratio: f64,
        children: Box<(LayoutNode, LayoutNode)>,
    },
}

impl LayoutNode {
    pub fn leaf_ids(&self) -> Vec<PaneId> {
        let mut out = Vec::new();
        self.collect_leaf_ids(&mut out);
        out
    }

    fn collect_leaf_ids(&self, out: &mut Vec<PaneId>) {
        match self {
            LayoutNode::Leaf(id) => out.push(*id),
            LayoutNode::Split { children, .. } => {
                children.0.collect_leaf_ids(out);
                children.1.collect_leaf_ids(out);
            }
        }
    }

    /// True iff the leaf-ID set equals `panes`, matching invariant 5.
    pub fn leaf_set_matches(&self, panes: &[PaneId]) -> bool {
        let mut leaves = self.leaf_ids();
        let mut expected: Vec<PaneId> = panes.to_vec();
        leaves.sort();
        expected.sort();
        leaves == expected
    }

    /// Replaces the leaf carrying `target` with a split node holding
    /// `target` and `new_pane` as children (spec.md §4.1.4 "Split").
    /// Returns `false` if `target` was not found.
    pub fn split_leaf(&mut self, target: PaneId, new_pane: PaneId, direction: SplitDirection) -> bool {
        match self {
            LayoutNode::Leaf(id) if *id == target => {
                *self = LayoutNode::Split {
                    direction,
                    ratio: 0.5,
                    children: Box::new((LayoutNode::Leaf(target), LayoutNode::Leaf(new_pane))),
                };
                true
            }
            LayoutNode::Leaf(_) => false,
            LayoutNode::Split { children, .. } => {
                children.0.split_leaf(target, new_pane, direction)
                    || children.1.split_leaf(target, new_pane, direction)
            }
        }
    }

    /// Removes the leaf carrying `target`, collapsing its parent split into
    /// the surviving sibling (spec.md §4.1.4 "Remove pane"). Returns
    /// `Some(true)` if removal happened at this node's children, `None` if
    /// `target` is this very leaf (caller must replace us with nothing —
    /// handled by the parent), or `Some(false)` if not found below.
    pub fn remove_leaf(&mut self, target: PaneId) -> bool {
        if let LayoutNode::Split { children, .. } = self {
            let (left, right) = (&mut children.0, &mut children.1);
            if matches!(left, LayoutNode::Leaf(id) if *id == target) {
                *self = right.clone();
                return true;
            }
            if matches!(right, LayoutNode::Leaf(id) if *id == target) {
                *self = left.clone();
                return true;
            }
            return left.remove_leaf(target) || right.remove_leaf(target);
        }
        false
    }

    /// Swaps two leaf pane IDs wherever they appear (spec.md §4.1.4
    /// "Swap").
    pub fn swap_leaves(&mut self, a: PaneId, b: PaneId) {
        match self {
            LayoutNode::Leaf(id) => {
                if *id == a {
                    *id = b;
                } else if *id == b {
                    *id = a;
                }
            }
            LayoutNode::Split { children, .. } => {
                children.0.swap_leaves(a, b);
                children.1.swap_leaves(a, b);
            }
        }
    }

    /// Rebuilds as a left-deep chain of horizontal splits in slice order,
    /// used as a fallback whenever the tree becomes inconsistent with the
    /// pane list (spec.md §4.1.4 "Fallback rebuild").
    pub fn rebuild_chain(panes: &[PaneId]) -> Option<LayoutNode> {
        let mut iter = panes.iter().rev();
        let mut node = LayoutNode::Leaf(*iter.next()?);
        for &id in iter {
            node = LayoutNode::Split {
                direction: SplitDirection::Horizontal,
                ratio: 0.5,
                children: Box::new((LayoutNode::Leaf(id), node)),
            };
        }
        Some(node)
    }

    fn even_split(panes: &[PaneId], direction: SplitDirection) -> Option<LayoutNode> {
        match panes.len() {
            0 => None,
            1 => Some(LayoutNode::Leaf(panes[0])),
            n => {
                let mid = n / 2;
                let left = Self::even_split(&panes[..mid], direction)?;
                let right = Self::even_split(&panes[mid..], direction)?;
                Some(LayoutNode::Split {
                    direction,
                    ratio: mid as f64 / n as f64,
                    children: Box::new((left, right)),
                })
            }
        }
    }

    pub fn even_horizontal(panes: &[PaneId]) -> Option<LayoutNode> {
        Self::even_split(panes, SplitDirection::Horizontal)
    }

    pub fn even_vertical(panes: &[PaneId]) -> Option<LayoutNode> {
        Self::even_split(panes, SplitDirection::Vertical)
    }

    /// `{ horizontal 0.6, left = leaf(panes[0]), right =
    /// even-vertical(panes[1:]) }`; falls back to an even split with ≤2
    /// panes (spec.md §4.1.4).
    pub fn main_vertical(panes: &[PaneId]) -> Option<LayoutNode> {
        if panes.len() <= 2 {
            return Self::even_horizontal(panes);
        }
        let right = Self::even_vertical(&panes[1..])?;
        Some(LayoutNode::Split {
            direction: SplitDirection::Horizontal,
            ratio: 0.6,
            children: Box::new((LayoutNode::Leaf(panes[0]), right)),
        })
    }

    /// Transpose of `main_vertical`.
    pub fn main_horizontal(panes: &[PaneId]) -> Option<LayoutNode> {
        if panes.len() <= 2 {
            return Self::even_vertical(panes);
        }
        let bottom = Self::even_horizontal(&panes[1..])?;
        Some(LayoutNode::Split {
            direction: SplitDirection::Vertical,
            ratio: 0.6,
            children: Box::new((LayoutNode::Leaf(panes[0]), bottom)),
        })
    }

    /// Partitions into rows (2 columns for n<=4, else 3), each row an
    /// even-horizontal split, rows joined by an even-vertical split
    /// (spec.md §4.1.4 "tiled").
    pub fn tiled(panes: &[PaneId]) -> Option<LayoutNode> {
        if panes.is_empty() {
            return None;
        }
        let cols = if panes.len() <= 4 { 2 } else { 3 };
        let rows: Vec<&[PaneId]> = panes.chunks(cols).collect();
        let mut row_nodes = Vec::with_capacity(rows.len());
        for row in &rows {
            row_nodes.push(Self::even_horizontal(row)?);
        }
        let mut iter = row_nodes.into_iter().rev();
        let mut node = iter.next()?;
        for next in iter {
            node = LayoutNode::Split {
                direction: SplitDirection::Vertical,
                ratio: 0.5,
                children: Box::new((next, node)),
            };
        }
        Some(node)
    }
}

/// Named layout presets (spec.md §4.1.2 `ApplyLayoutPreset…`, §4.1.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutPreset {
    EvenHorizontal,
    EvenVertical,
    MainVertical,
    MainHorizontal,
    Tiled,
}

impl LayoutPreset {
    /// Unknown preset names fall back to even-horizontal (spec.md §4.1.2).
    pub fn parse(name: &str) -> Self {
        match name {
            "even-vertical" => LayoutPreset::EvenVertical,
            "main-vertical" => LayoutPreset::MainVertical,
            "main-horizontal" => LayoutPreset::MainHorizontal,
            "tiled" => LayoutPreset::Tiled,
            _ => LayoutPreset::EvenHorizontal,
        }
    }

    pub fn build(self, panes: &[PaneId]) -> Option<LayoutNode> {
        match self {
            LayoutPreset::EvenHorizontal => LayoutNode::even_horizontal(panes),
            LayoutPreset::EvenVertical => LayoutNode::even_vertical(panes),
            LayoutPreset::MainVertical => LayoutNode::main_vertical(panes),
            LayoutPreset::MainHorizontal => LayoutNode::main_horizontal(panes),
            LayoutPreset::Tiled => LayoutNode::tiled(panes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: u64) -> Vec<PaneId> {
        (0..n).map(PaneId).collect()
    }

    #[test]
    fn split_then_leaf_set_matches() {
        let mut tree = LayoutNode::Leaf(PaneId(0));
        assert!(tree.split_leaf(PaneId(0), PaneId(1), SplitDirection::Horizontal));
        assert!(tree.leaf_set_matches(&[PaneId(0), PaneId(1)]));
    }

    #[test]
    fn remove_collapses_to_sibling_preserving_direction() {
        // (0 horiz (1 vert 2)) ; remove 1 -> survivor is the vertical split {1,2}... 2 alone
        let mut tree = LayoutNode::Leaf(PaneId(0));
        tree.split_leaf(PaneId(0), PaneId(1), SplitDirection::Horizontal);
        // split pane 1 vertically into 1,2
        tree.split_leaf(PaneId(1), PaneId(2), SplitDirection::Vertical);
        // kill pane 1: its split parent collapses to leaf(2)
        assert!(tree.remove_leaf(PaneId(1)));
        assert!(tree.leaf_set_matches(&[PaneId(0), PaneId(2)]));
    }

    #[test]
    fn swap_exchanges_leaves() {
        let mut tree = LayoutNode::Leaf(PaneId(0));
        tree.split_leaf(PaneId(0), PaneId(1), SplitDirection::Horizontal);
        tree.swap_leaves(PaneId(0), PaneId(1));
        assert_eq!(tree.leaf_ids(), vec![PaneId(1), PaneId(0)]);
    }

    #[test]
    fn even_horizontal_balanced() {
        let panes = ids(4);
        let tree = LayoutNode::even_horizontal(&panes).unwrap();
        assert!(tree.leaf_set_matches(&panes));
    }

    #[test]
    fn tiled_two_columns_for_small_n() {
        let panes = ids(4);
        let tree = LayoutNode::tiled(&panes).unwrap();
        assert!(tree.leaf_set_matches(&panes));
    }

    #[test]
    fn rebuild_chain_is_left_deep() {
        let panes = ids(3);
        let tree = LayoutNode::rebuild_chain(&panes).unwrap();
        assert_eq!(tree.leaf_ids(), panes);
    }
}
