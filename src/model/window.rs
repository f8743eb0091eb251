use crate::ids::{PaneId, WindowId};
use crate::model::layout::LayoutNode;
use crate::model::pane::Pane;

/// A container of one or more panes, owned by exactly one session
/// (spec.md §3).
pub struct Window {
    pub id: WindowId,
    pub name: String,
    pub panes: Vec<Pane>,
    /// 0-based index of the active pane within `panes`.
    pub active_pane_index: usize,
    pub layout: LayoutNode,
}

impl Window {
    pub fn new(id: WindowId, name: String, pane: Pane) -> Self {
        let layout = LayoutNode::Leaf(pane.id);
        Self {
            id,
            name,
            panes: vec![pane],
            active_pane_index: 0,
            layout,
        }
    }

    pub fn active_pane(&self) -> Option<&Pane> {
        self.panes.get(self.active_pane_index)
    }

    pub fn active_pane_mut(&mut self) -> Option<&mut Pane> {
        self.panes.get_mut(self.active_pane_index)
    }

    pub fn pane_ids(&self) -> Vec<PaneId> {
        self.panes.iter().map(|p| p.id).collect()
    }

    pub fn find_pane_index(&self, id: PaneId) -> Option<usize> {
        self.panes.iter().position(|p| p.id == id)
    }

    /// Re-establishes invariant 3: `panes[i].index == i`, exactly one pane
    /// active at `active_pane_index`.
    pub fn reindex(&mut self) {
        if self.active_pane_index >= self.panes.len() {
            self.active_pane_index = self.panes.len().saturating_sub(1);
        }
        for (i, pane) in self.panes.iter_mut().enumerate() {
            pane.index = i;
            pane.active = i == self.active_pane_index;
        }
    }

    pub fn set_active_by_id(&mut self, id: PaneId) -> bool {
        if let Some(idx) = self.find_pane_index(id) {
            self.active_pane_index = idx;
            self.reindex();
            true
        } else {
            false
        }
    }
}
