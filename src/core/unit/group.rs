//=========================================================================
// Scene Unit Group
//=========================================================================
//
// A namespace tree of scene units with ordered bulk update/render.
//
// Traversal order decides whether nested groups refresh before or after
// the local level's own units; the filter selects named units, anonymous
// units, or both. Callers choose based on whether parent state must be
// current before children read it, or the reverse.
//
//=========================================================================

//=== Internal Dependencies ===============================================

use super::{SceneUnit, UnitId};
use crate::core::backend::RenderBackend;
use crate::core::context::FrameContext;
use crate::core::namespace::{NamespaceError, NamespaceTree};

//=== Traversal Policy ====================================================

/// How a bulk pass walks nested subgroups relative to the local level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalOrder {
    /// Subgroups fully, then the local level's units.
    PreOrder,

    /// The local level's units, then subgroups.
    PostOrder,

    /// Only the local level's units; subgroups are ignored.
    TopOnly,
}

/// Which units at a level a bulk pass touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitFilter {
    NamedOnly,
    AnonymousOnly,
    Both,
}

impl UnitFilter {
    fn named(self) -> bool {
        matches!(self, UnitFilter::NamedOnly | UnitFilter::Both)
    }

    fn anonymous(self) -> bool {
        matches!(self, UnitFilter::AnonymousOnly | UnitFilter::Both)
    }
}

//=== Scene Unit Group ====================================================

/// Namespace-addressed collection of scene units owned by a mode (or
/// free-standing).
///
/// Named units are addressable by dotted path; anonymous units live in
/// per-group buckets and are found again by [`UnitId`]. Insertion stamps
/// the owning mode's name into each unit.
pub struct SceneUnitGroup {
    owner_mode: Option<String>,
    tree: NamespaceTree<SceneUnit>,
}

impl SceneUnitGroup {
    //--- Construction -----------------------------------------------------

    /// Creates an empty, free-standing group.
    pub fn new() -> Self {
        Self {
            owner_mode: None,
            tree: NamespaceTree::new("units"),
        }
    }

    pub(crate) fn with_owner(mode: impl Into<String>) -> Self {
        Self {
            owner_mode: Some(mode.into()),
            tree: NamespaceTree::new("units"),
        }
    }

    //--- Insertion & Removal ----------------------------------------------

    /// Inserts a named unit at `path`; the terminal segment becomes the
    /// unit's name. Fails with [`NamespaceError::DuplicateName`] if the
    /// terminal name is taken.
    pub fn insert(&mut self, path: &str, mut unit: SceneUnit) -> Result<(), NamespaceError> {
        let terminal = path.rsplit(crate::core::namespace::PATH_SEPARATOR).next().unwrap_or(path);
        unit.set_name(terminal);
        unit.set_parent_mode(self.owner_mode.clone());
        self.tree.insert_item(path, unit, true)
    }

    /// Adds an anonymous unit to the bucket at `group_path` (`""` for the
    /// top level).
    pub fn insert_anonymous(
        &mut self,
        group_path: &str,
        mut unit: SceneUnit,
    ) -> Result<(), NamespaceError> {
        unit.set_parent_mode(self.owner_mode.clone());
        self.tree.push_anonymous(group_path, unit)
    }

    /// Removes and returns the named unit at `path`.
    pub fn remove(&mut self, path: &str) -> Result<SceneUnit, NamespaceError> {
        let mut unit = self.tree.remove_item(path)?;
        unit.set_parent_mode(None);
        Ok(unit)
    }

    /// Removes an anonymous unit by id, optionally recursing into
    /// subgroups. Quiet no-op returning `None` when absent, so bulk
    /// cleanup stays idempotent.
    pub fn remove_anonymous(
        &mut self,
        group_path: &str,
        id: UnitId,
        recurse: bool,
    ) -> Option<SceneUnit> {
        let mut unit = self
            .tree
            .take_anonymous_where(group_path, |unit| unit.id() == id, recurse)?;
        unit.set_parent_mode(None);
        Some(unit)
    }

    /// Creates the group chain at `path` if missing.
    pub fn add_group(&mut self, path: &str) -> Result<(), NamespaceError> {
        self.tree.ensure_subgroup(path).map(|_| ())
    }

    //--- Lookup -----------------------------------------------------------

    /// The named unit at `path`.
    pub fn unit(&self, path: &str) -> Result<&SceneUnit, NamespaceError> {
        self.tree.item(path)
    }

    /// Mutable variant of [`SceneUnitGroup::unit`].
    pub fn unit_mut(&mut self, path: &str) -> Result<&mut SceneUnit, NamespaceError> {
        self.tree.item_mut(path)
    }

    /// Total unit count, named and anonymous, across all levels.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// True if the group holds no units anywhere.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    //--- Bulk Passes ------------------------------------------------------

    /// Runs the update phase of every selected unit in traversal order.
    pub fn update(&mut self, order: TraversalOrder, filter: UnitFilter, ctx: &mut FrameContext) {
        update_tree(&mut self.tree, order, filter, ctx);
    }

    /// Runs the render phase of every selected unit in traversal order.
    pub fn render(
        &mut self,
        order: TraversalOrder,
        filter: UnitFilter,
        ctx: &FrameContext,
        backend: &mut dyn RenderBackend,
    ) {
        render_tree(&mut self.tree, order, filter, ctx, backend);
    }
}

impl Default for SceneUnitGroup {
    fn default() -> Self {
        Self::new()
    }
}

//=== Traversal Helpers ===================================================

fn update_tree(
    tree: &mut NamespaceTree<SceneUnit>,
    order: TraversalOrder,
    filter: UnitFilter,
    ctx: &mut FrameContext,
) {
    let local = |tree: &mut NamespaceTree<SceneUnit>, ctx: &mut FrameContext| {
        if filter.named() {
            for (_, unit) in tree.items_mut() {
                unit.run_update_phase(ctx);
            }
        }
        if filter.anonymous() {
            for unit in tree.anonymous_mut() {
                unit.run_update_phase(ctx);
            }
        }
    };

    match order {
        TraversalOrder::PreOrder => {
            for subgroup in tree.subgroups_mut() {
                update_tree(subgroup, order, filter, ctx);
            }
            local(tree, ctx);
        }
        TraversalOrder::PostOrder => {
            local(tree, ctx);
            for subgroup in tree.subgroups_mut() {
                update_tree(subgroup, order, filter, ctx);
            }
        }
        TraversalOrder::TopOnly => local(tree, ctx),
    }
}

fn render_tree(
    tree: &mut NamespaceTree<SceneUnit>,
    order: TraversalOrder,
    filter: UnitFilter,
    ctx: &FrameContext,
    backend: &mut dyn RenderBackend,
) {
    let local = |tree: &mut NamespaceTree<SceneUnit>, backend: &mut dyn RenderBackend| {
        if filter.named() {
            for (_, unit) in tree.items_mut() {
                unit.run_render_phase(ctx, backend);
            }
        }
        if filter.anonymous() {
            for unit in tree.anonymous_mut() {
                unit.run_render_phase(ctx, backend);
            }
        }
    };

    match order {
        TraversalOrder::PreOrder => {
            for subgroup in tree.subgroups_mut() {
                render_tree(subgroup, order, filter, ctx, backend);
            }
            local(tree, backend);
        }
        TraversalOrder::PostOrder => {
            local(tree, backend);
            for subgroup in tree.subgroups_mut() {
                render_tree(subgroup, order, filter, ctx, backend);
            }
        }
        TraversalOrder::TopOnly => local(tree, backend),
    }
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Journal = Rc<RefCell<Vec<String>>>;

    fn tagged_unit(tag: &str, journal: &Journal) -> SceneUnit {
        let mut unit = SceneUnit::anonymous();
        let journal = Rc::clone(journal);
        let tag = tag.to_string();
        unit.add_update_callback(move |_| journal.borrow_mut().push(tag.clone()));
        unit
    }

    fn group_with_layout(journal: &Journal) -> SceneUnitGroup {
        // Layout: top-level named "root", subgroup "sub" with named "leaf"
        let mut group = SceneUnitGroup::new();
        group.insert("root", tagged_unit("root", journal)).unwrap();
        group.insert("sub.leaf", tagged_unit("leaf", journal)).unwrap();
        group
    }

    #[test]
    fn preorder_updates_subgroups_before_local_units() {
        let journal: Journal = Rc::new(RefCell::new(Vec::new()));
        let mut group = group_with_layout(&journal);
        let mut ctx = FrameContext::new();

        group.update(TraversalOrder::PreOrder, UnitFilter::Both, &mut ctx);
        assert_eq!(*journal.borrow(), vec!["leaf".to_string(), "root".to_string()]);
    }

    #[test]
    fn postorder_updates_local_units_before_subgroups() {
        let journal: Journal = Rc::new(RefCell::new(Vec::new()));
        let mut group = group_with_layout(&journal);
        let mut ctx = FrameContext::new();

        group.update(TraversalOrder::PostOrder, UnitFilter::Both, &mut ctx);
        assert_eq!(*journal.borrow(), vec!["root".to_string(), "leaf".to_string()]);
    }

    #[test]
    fn top_only_ignores_subgroups() {
        let journal: Journal = Rc::new(RefCell::new(Vec::new()));
        let mut group = group_with_layout(&journal);
        let mut ctx = FrameContext::new();

        group.update(TraversalOrder::TopOnly, UnitFilter::Both, &mut ctx);
        assert_eq!(*journal.borrow(), vec!["root".to_string()]);
    }

    #[test]
    fn filters_select_named_or_anonymous_units() {
        let journal: Journal = Rc::new(RefCell::new(Vec::new()));
        let mut group = SceneUnitGroup::new();
        group.insert("named", tagged_unit("named", &journal)).unwrap();
        group.insert_anonymous("", tagged_unit("anon", &journal)).unwrap();
        let mut ctx = FrameContext::new();

        group.update(TraversalOrder::TopOnly, UnitFilter::NamedOnly, &mut ctx);
        assert_eq!(*journal.borrow(), vec!["named".to_string()]);

        journal.borrow_mut().clear();
        group.update(TraversalOrder::TopOnly, UnitFilter::AnonymousOnly, &mut ctx);
        assert_eq!(*journal.borrow(), vec!["anon".to_string()]);
    }

    #[test]
    fn insertion_stamps_name_from_terminal_segment() {
        let mut group = SceneUnitGroup::new();
        group.insert("hud.meter", SceneUnit::anonymous()).unwrap();

        assert_eq!(group.unit("hud.meter").unwrap().name(), Some("meter"));
    }

    #[test]
    fn anonymous_removal_by_id_is_idempotent() {
        let mut group = SceneUnitGroup::new();
        let unit = SceneUnit::anonymous();
        let id = unit.id();
        group.insert_anonymous("pool", unit).unwrap();

        assert!(group.remove_anonymous("pool", id, false).is_some());
        assert!(group.remove_anonymous("pool", id, false).is_none());
    }

    #[test]
    fn anonymous_removal_can_search_nested_groups() {
        let mut group = SceneUnitGroup::new();
        let unit = SceneUnit::anonymous();
        let id = unit.id();
        group.insert_anonymous("pool.deep", unit).unwrap();

        assert!(group.remove_anonymous("", id, false).is_none());
        assert!(group.remove_anonymous("", id, true).is_some());
        assert!(group.is_empty());
    }
}
