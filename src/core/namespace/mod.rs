//=========================================================================
// Namespace Tree
//=========================================================================
//
// Hierarchical, dot-path-addressed container of named and anonymous
// items.
//
// Architecture:
//   NamespaceTree<T>
//     ├─ subgroups: BTreeMap<String, NamespaceTree<T>>
//     ├─ items:     BTreeMap<String, T>
//     └─ anonymous: Vec<T>
//
// Paths like "hud.meters.health" descend one segment at a time. Insertion
// creates missing intermediate groups; lookup and removal never do. Full
// paths are derived during traversal rather than stored, so they remain
// correct when a subtree is re-parented.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::BTreeMap;

use thiserror::Error;

//=== Path Separator ======================================================

/// Segment separator for namespace paths.
pub const PATH_SEPARATOR: char = '.';

//=== Namespace Error =====================================================

/// Path resolution and insertion failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NamespaceError {
    /// A path segment did not resolve to an existing group or item.
    #[error("nothing named `{0}` exists at this level")]
    NotFound(String),

    /// The terminal segment is already taken at its level.
    #[error("name `{0}` is already taken at this level")]
    DuplicateName(String),

    /// The path was empty or contained an empty segment.
    #[error("invalid path `{0}`")]
    InvalidPath(String),
}

//=== Traversal Order =====================================================

/// Visitation order for [`NamespaceTree::visit`] and friends.
///
/// `SubgroupsFirst` descends into subgroups before touching the local
/// level; `LocalFirst` does the reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitOrder {
    SubgroupsFirst,
    LocalFirst,
}

//=== Namespace Tree ======================================================

/// Recursive container mapping dotted paths to named items, anonymous
/// items, and nested subgroups.
///
/// Within one level, named items and subgroups each live in their own
/// name-ordered map, so traversal order is deterministic. Anonymous items
/// sit in an insertion-ordered bucket keyed only by their enclosing
/// group. Dropping a tree drops every child it owns.
pub struct NamespaceTree<T> {
    name: String,
    subgroups: BTreeMap<String, NamespaceTree<T>>,
    items: BTreeMap<String, T>,
    anonymous: Vec<T>,
}

impl<T> NamespaceTree<T> {
    //--- Construction -----------------------------------------------------

    /// Creates an empty tree with the given segment name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subgroups: BTreeMap::new(),
            items: BTreeMap::new(),
            anonymous: Vec::new(),
        }
    }

    /// This node's own segment name.
    pub fn name(&self) -> &str {
        &self.name
    }

    //--- Subgroups --------------------------------------------------------

    /// Resolves a subgroup by dotted path.
    ///
    /// Fails with [`NamespaceError::NotFound`] naming the first missing
    /// segment along the way.
    pub fn subgroup(&self, path: &str) -> Result<&Self, NamespaceError> {
        let segments = split_path(path)?;
        self.descend(&segments)
    }

    /// Mutable variant of [`NamespaceTree::subgroup`].
    pub fn subgroup_mut(&mut self, path: &str) -> Result<&mut Self, NamespaceError> {
        let segments = split_path(path)?;
        self.descend_mut(&segments)
    }

    /// Quiet variant of [`NamespaceTree::subgroup`]: returns `None`
    /// instead of an error when any segment is missing.
    pub fn try_subgroup(&self, path: &str) -> Option<&Self> {
        self.subgroup(path).ok()
    }

    /// Attaches `subtree` under the path's terminal segment, which
    /// becomes the subtree's name.
    ///
    /// Missing intermediate groups are created on demand. Fails with
    /// [`NamespaceError::DuplicateName`] if a subgroup with the terminal
    /// name already exists at the terminal level.
    pub fn add_subgroup(
        &mut self,
        path: &str,
        mut subtree: NamespaceTree<T>,
    ) -> Result<(), NamespaceError> {
        let segments = split_path(path)?;
        let (terminal, parents) = segments.split_last().expect("split_path yields >= 1 segment");
        let level = self.vivify(parents);

        if level.subgroups.contains_key(*terminal) {
            return Err(NamespaceError::DuplicateName((*terminal).to_string()));
        }

        subtree.name = (*terminal).to_string();
        level.subgroups.insert((*terminal).to_string(), subtree);
        Ok(())
    }

    /// Resolves a subgroup by path, creating every missing group along
    /// the way.
    pub fn ensure_subgroup(&mut self, path: &str) -> Result<&mut Self, NamespaceError> {
        let segments = split_path(path)?;
        Ok(self.vivify(&segments))
    }

    //--- Named Items ------------------------------------------------------

    /// Resolves a named item by dotted path.
    pub fn item(&self, path: &str) -> Result<&T, NamespaceError> {
        let segments = split_path(path)?;
        let (terminal, parents) = segments.split_last().expect("split_path yields >= 1 segment");
        let level = self.descend(parents)?;
        level
            .items
            .get(*terminal)
            .ok_or_else(|| NamespaceError::NotFound((*terminal).to_string()))
    }

    /// Mutable variant of [`NamespaceTree::item`].
    pub fn item_mut(&mut self, path: &str) -> Result<&mut T, NamespaceError> {
        let segments = split_path(path)?;
        let (terminal, parents) = segments.split_last().expect("split_path yields >= 1 segment");
        let level = self.descend_mut(parents)?;
        level
            .items
            .get_mut(*terminal)
            .ok_or_else(|| NamespaceError::NotFound((*terminal).to_string()))
    }

    /// Quiet variant of [`NamespaceTree::item`].
    pub fn try_item(&self, path: &str) -> Option<&T> {
        self.item(path).ok()
    }

    /// Inserts a named item at the path's terminal segment, creating
    /// missing intermediate groups.
    ///
    /// With `disallow_duplicates`, an occupied terminal name fails with
    /// [`NamespaceError::DuplicateName`]; otherwise the existing entry is
    /// replaced.
    pub fn insert_item(
        &mut self,
        path: &str,
        item: T,
        disallow_duplicates: bool,
    ) -> Result<(), NamespaceError> {
        let segments = split_path(path)?;
        let (terminal, parents) = segments.split_last().expect("split_path yields >= 1 segment");
        let level = self.vivify(parents);

        if disallow_duplicates && level.items.contains_key(*terminal) {
            return Err(NamespaceError::DuplicateName((*terminal).to_string()));
        }

        level.items.insert((*terminal).to_string(), item);
        Ok(())
    }

    /// Removes and returns the named item at the path.
    pub fn remove_item(&mut self, path: &str) -> Result<T, NamespaceError> {
        let segments = split_path(path)?;
        let (terminal, parents) = segments.split_last().expect("split_path yields >= 1 segment");
        let level = self.descend_mut(parents)?;
        level
            .items
            .remove(*terminal)
            .ok_or_else(|| NamespaceError::NotFound((*terminal).to_string()))
    }

    //--- Anonymous Items --------------------------------------------------

    /// Appends an item to the anonymous bucket of the group at
    /// `group_path` (`""` addresses this level), creating missing groups.
    pub fn push_anonymous(&mut self, group_path: &str, item: T) -> Result<(), NamespaceError> {
        let level = self.group_at_mut(group_path)?;
        level.anonymous.push(item);
        Ok(())
    }

    /// Removes and returns the first anonymous item matching `pred` in
    /// the group at `group_path`, optionally recursing into subgroups.
    ///
    /// Quiet by contract: a missing group or no matching item yields
    /// `None`, keeping bulk cleanup idempotent.
    pub fn take_anonymous_where<F>(&mut self, group_path: &str, pred: F, recurse: bool) -> Option<T>
    where
        F: Fn(&T) -> bool,
    {
        let level = match self.try_group_at_mut(group_path) {
            Some(level) => level,
            None => return None,
        };
        level.take_anonymous_inner(&pred, recurse)
    }

    fn take_anonymous_inner<F>(&mut self, pred: &F, recurse: bool) -> Option<T>
    where
        F: Fn(&T) -> bool,
    {
        if let Some(pos) = self.anonymous.iter().position(|item| pred(item)) {
            return Some(self.anonymous.remove(pos));
        }
        if recurse {
            for subgroup in self.subgroups.values_mut() {
                if let Some(item) = subgroup.take_anonymous_inner(pred, true) {
                    return Some(item);
                }
            }
        }
        None
    }

    /// This level's anonymous bucket, in insertion order.
    pub fn anonymous(&self) -> &[T] {
        &self.anonymous
    }

    /// Mutable access to this level's anonymous bucket.
    pub fn anonymous_mut(&mut self) -> &mut Vec<T> {
        &mut self.anonymous
    }

    //--- Iteration --------------------------------------------------------

    /// This level's named items in name order.
    pub fn items(&self) -> impl Iterator<Item = (&str, &T)> {
        self.items.iter().map(|(name, item)| (name.as_str(), item))
    }

    /// Mutable variant of [`NamespaceTree::items`].
    pub fn items_mut(&mut self) -> impl Iterator<Item = (&str, &mut T)> {
        self.items.iter_mut().map(|(name, item)| (name.as_str(), item))
    }

    /// This level's subgroups in name order.
    pub fn subgroups(&self) -> impl Iterator<Item = &NamespaceTree<T>> {
        self.subgroups.values()
    }

    /// Mutable variant of [`NamespaceTree::subgroups`].
    pub fn subgroups_mut(&mut self) -> impl Iterator<Item = &mut NamespaceTree<T>> {
        self.subgroups.values_mut()
    }

    /// Visits every item in the tree with its full path relative to this
    /// node, derived during descent.
    ///
    /// At each level: named items in name order, then anonymous items in
    /// insertion order (with the enclosing group path), then subgroups in
    /// name order per `order`.
    pub fn visit<F>(&self, order: VisitOrder, mut f: F)
    where
        F: FnMut(&str, &T),
    {
        self.visit_inner(order, "", &mut f);
    }

    fn visit_inner<F>(&self, order: VisitOrder, prefix: &str, f: &mut F)
    where
        F: FnMut(&str, &T),
    {
        let local = |node: &Self, f: &mut F| {
            for (name, item) in &node.items {
                f(&join_path(prefix, name), item);
            }
            for item in &node.anonymous {
                f(prefix, item);
            }
        };

        match order {
            VisitOrder::LocalFirst => {
                local(self, f);
                for (name, subgroup) in &self.subgroups {
                    subgroup.visit_inner(order, &join_path(prefix, name), f);
                }
            }
            VisitOrder::SubgroupsFirst => {
                for (name, subgroup) in &self.subgroups {
                    subgroup.visit_inner(order, &join_path(prefix, name), f);
                }
                local(self, f);
            }
        }
    }

    //--- Size & Cleanup ---------------------------------------------------

    /// Total item count (named and anonymous), including all subgroups.
    pub fn len(&self) -> usize {
        self.items.len()
            + self.anonymous.len()
            + self.subgroups.values().map(NamespaceTree::len).sum::<usize>()
    }

    /// True if no items exist anywhere in the tree.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every item and subgroup.
    pub fn clear(&mut self) {
        self.subgroups.clear();
        self.items.clear();
        self.anonymous.clear();
    }

    //--- Internal Helpers -------------------------------------------------

    fn descend(&self, segments: &[&str]) -> Result<&Self, NamespaceError> {
        let mut node = self;
        for segment in segments {
            node = node
                .subgroups
                .get(*segment)
                .ok_or_else(|| NamespaceError::NotFound((*segment).to_string()))?;
        }
        Ok(node)
    }

    fn descend_mut(&mut self, segments: &[&str]) -> Result<&mut Self, NamespaceError> {
        let mut node = self;
        for segment in segments {
            node = node
                .subgroups
                .get_mut(*segment)
                .ok_or_else(|| NamespaceError::NotFound((*segment).to_string()))?;
        }
        Ok(node)
    }

    fn vivify(&mut self, segments: &[&str]) -> &mut Self {
        let mut node = self;
        for segment in segments {
            node = node
                .subgroups
                .entry((*segment).to_string())
                .or_insert_with(|| NamespaceTree::new(*segment));
        }
        node
    }

    fn group_at_mut(&mut self, group_path: &str) -> Result<&mut Self, NamespaceError> {
        if group_path.is_empty() {
            return Ok(self);
        }
        self.ensure_subgroup(group_path)
    }

    fn try_group_at_mut(&mut self, group_path: &str) -> Option<&mut Self> {
        if group_path.is_empty() {
            return Some(self);
        }
        let segments = split_path(group_path).ok()?;
        self.descend_mut(&segments).ok()
    }
}

//=== Path Helpers ========================================================

fn split_path(path: &str) -> Result<Vec<&str>, NamespaceError> {
    if path.is_empty() {
        return Err(NamespaceError::InvalidPath(path.to_string()));
    }
    let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(NamespaceError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}{}{}", prefix, PATH_SEPARATOR, name)
    }
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get_round_trip() {
        let mut tree: NamespaceTree<i32> = NamespaceTree::new("root");
        tree.insert_item("x.y.z", 7, true).unwrap();

        assert_eq!(tree.item("x.y.z").unwrap(), &7);
    }

    #[test]
    fn duplicate_insert_fails_when_disallowed() {
        let mut tree: NamespaceTree<i32> = NamespaceTree::new("root");
        tree.insert_item("x.y.z", 7, true).unwrap();

        let err = tree.insert_item("x.y.z", 8, true).unwrap_err();
        assert_eq!(err, NamespaceError::DuplicateName("z".to_string()));

        // Original item untouched
        assert_eq!(tree.item("x.y.z").unwrap(), &7);
    }

    #[test]
    fn duplicate_insert_replaces_when_allowed() {
        let mut tree: NamespaceTree<i32> = NamespaceTree::new("root");
        tree.insert_item("a.b", 1, true).unwrap();
        tree.insert_item("a.b", 2, false).unwrap();

        assert_eq!(tree.item("a.b").unwrap(), &2);
    }

    #[test]
    fn missing_segment_reports_not_found() {
        let tree: NamespaceTree<i32> = NamespaceTree::new("root");
        let err = tree.item("no.such.path").unwrap_err();
        assert_eq!(err, NamespaceError::NotFound("no".to_string()));
    }

    #[test]
    fn quiet_lookup_returns_none() {
        let tree: NamespaceTree<i32> = NamespaceTree::new("root");
        assert!(tree.try_item("ghost").is_none());
        assert!(tree.try_subgroup("ghost").is_none());
    }

    #[test]
    fn empty_and_degenerate_paths_are_invalid() {
        let mut tree: NamespaceTree<i32> = NamespaceTree::new("root");
        assert!(matches!(
            tree.insert_item("", 1, true),
            Err(NamespaceError::InvalidPath(_))
        ));
        assert!(matches!(
            tree.insert_item("a..b", 1, true),
            Err(NamespaceError::InvalidPath(_))
        ));
    }

    #[test]
    fn add_subgroup_rejects_duplicates() {
        let mut tree: NamespaceTree<i32> = NamespaceTree::new("root");
        tree.add_subgroup("hud", NamespaceTree::new("ignored")).unwrap();

        let err = tree.add_subgroup("hud", NamespaceTree::new("other")).unwrap_err();
        assert_eq!(err, NamespaceError::DuplicateName("hud".to_string()));
    }

    #[test]
    fn add_subgroup_renames_to_terminal_segment() {
        let mut tree: NamespaceTree<i32> = NamespaceTree::new("root");
        tree.add_subgroup("hud.meters", NamespaceTree::new("scratch")).unwrap();

        assert_eq!(tree.subgroup("hud.meters").unwrap().name(), "meters");
    }

    #[test]
    fn removal_returns_the_item() {
        let mut tree: NamespaceTree<i32> = NamespaceTree::new("root");
        tree.insert_item("a.b", 5, true).unwrap();

        assert_eq!(tree.remove_item("a.b").unwrap(), 5);
        assert!(tree.try_item("a.b").is_none());
    }

    #[test]
    fn anonymous_removal_is_idempotent() {
        let mut tree: NamespaceTree<i32> = NamespaceTree::new("root");
        tree.push_anonymous("bucket", 3).unwrap();

        assert_eq!(tree.take_anonymous_where("bucket", |v| *v == 3, false), Some(3));
        assert_eq!(tree.take_anonymous_where("bucket", |v| *v == 3, false), None);
        // Missing group is also a quiet no-op
        assert_eq!(tree.take_anonymous_where("no.such.group", |_| true, false), None);
    }

    #[test]
    fn anonymous_removal_can_recurse() {
        let mut tree: NamespaceTree<i32> = NamespaceTree::new("root");
        tree.push_anonymous("a.b", 9).unwrap();

        assert_eq!(tree.take_anonymous_where("", |v| *v == 9, false), None);
        assert_eq!(tree.take_anonymous_where("", |v| *v == 9, true), Some(9));
    }

    #[test]
    fn visit_derives_full_paths() {
        let mut tree: NamespaceTree<i32> = NamespaceTree::new("root");
        tree.insert_item("top", 1, true).unwrap();
        tree.insert_item("a.mid", 2, true).unwrap();
        tree.insert_item("a.b.deep", 3, true).unwrap();
        tree.push_anonymous("a", 4).unwrap();

        let mut seen = Vec::new();
        tree.visit(VisitOrder::LocalFirst, |path, item| {
            seen.push((path.to_string(), *item));
        });

        assert_eq!(
            seen,
            vec![
                ("top".to_string(), 1),
                ("a.mid".to_string(), 2),
                ("a".to_string(), 4),
                ("a.b.deep".to_string(), 3),
            ]
        );
    }

    #[test]
    fn visit_can_descend_before_the_local_level() {
        let mut tree: NamespaceTree<i32> = NamespaceTree::new("root");
        tree.insert_item("top", 1, true).unwrap();
        tree.insert_item("a.deep", 2, true).unwrap();

        let mut seen = Vec::new();
        tree.visit(VisitOrder::SubgroupsFirst, |path, _| seen.push(path.to_string()));

        assert_eq!(seen, vec!["a.deep".to_string(), "top".to_string()]);
    }

    #[test]
    fn visit_paths_stay_correct_after_reparenting() {
        let mut tree: NamespaceTree<i32> = NamespaceTree::new("root");
        tree.insert_item("old.leaf", 1, true).unwrap();

        // Detach the subtree and re-attach it elsewhere
        let mut moved = NamespaceTree::new("scratch");
        std::mem::swap(tree.subgroup_mut("old").unwrap(), &mut moved);
        tree.add_subgroup("fresh.home", moved).unwrap();

        assert_eq!(tree.item("fresh.home.leaf").unwrap(), &1);

        let mut paths = Vec::new();
        tree.visit(VisitOrder::LocalFirst, |path, _| paths.push(path.to_string()));
        assert!(paths.contains(&"fresh.home.leaf".to_string()));
    }

    #[test]
    fn len_counts_all_levels() {
        let mut tree: NamespaceTree<i32> = NamespaceTree::new("root");
        assert!(tree.is_empty());

        tree.insert_item("one", 1, true).unwrap();
        tree.insert_item("deep.two", 2, true).unwrap();
        tree.push_anonymous("deep", 3).unwrap();

        assert_eq!(tree.len(), 3);

        tree.clear();
        assert!(tree.is_empty());
    }
}
