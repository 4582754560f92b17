//! Assemble the flat `categories` table into a forest.
//!
//! Rows whose parent is null, or points at a row that does not exist, are
//! roots. Siblings are ordered by `(position, name, id)`. Rows stuck in a
//! parent cycle can never be reached from a root; each such cycle surfaces
//! as an extra root entered at its lowest-ordered member, after the real roots.

use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::domain::categories::{CategoryNode, CategoryResponse};

struct Index<'a> {
    /// Children keyed by effective parent; `None` holds the roots
    children: HashMap<Option<Uuid>, Vec<&'a CategoryResponse>>,
}

fn sort_key(row: &CategoryResponse) -> (i32, String, Uuid) {
    (row.position, row.name.to_lowercase(), row.id)
}

impl<'a> Index<'a> {
    fn new(rows: &'a [CategoryResponse]) -> Self {
        let ids: HashSet<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut children: HashMap<Option<Uuid>, Vec<&CategoryResponse>> = HashMap::new();

        for row in rows {
            let parent = row.parent_id.filter(|p| ids.contains(p) && *p != row.id);
            children.entry(parent).or_default().push(row);
        }
        for siblings in children.values_mut() {
            siblings.sort_by_key(|r| sort_key(r));
        }

        Self { children }
    }

    fn children_of(&self, id: Option<Uuid>) -> &[&'a CategoryResponse] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn mark_reachable(&self, start: Uuid, seen: &mut HashSet<Uuid>) {
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            stack.extend(self.children_of(Some(id)).iter().map(|c| c.id));
        }
    }

    /// Real roots followed by one entry point per unreachable cycle.
    fn entry_points(&self, rows: &'a [CategoryResponse]) -> Vec<&'a CategoryResponse> {
        let mut seen = HashSet::new();
        let mut entries: Vec<&CategoryResponse> = self.children_of(None).to_vec();
        for root in &entries {
            self.mark_reachable(root.id, &mut seen);
        }

        let mut stranded: Vec<&CategoryResponse> =
            rows.iter().filter(|r| !seen.contains(&r.id)).collect();
        stranded.sort_by_key(|r| sort_key(r));

        for row in stranded {
            if seen.contains(&row.id) {
                continue;
            }
            self.mark_reachable(row.id, &mut seen);
            entries.push(row);
        }
        entries
    }

    fn build(
        &self,
        row: &CategoryResponse,
        parent_path: &[String],
        include_inactive: bool,
        placed: &mut HashSet<Uuid>,
    ) -> Option<CategoryNode> {
        if !include_inactive && !row.is_active {
            return None;
        }
        if !placed.insert(row.id) {
            return None;
        }

        let mut path = parent_path.to_vec();
        path.push(row.slug.clone());

        let children = self
            .children_of(Some(row.id))
            .iter()
            .filter_map(|child| self.build(child, &path, include_inactive, placed))
            .collect();

        Some(CategoryNode {
            id: row.id,
            parent_id: row.parent_id,
            name: row.name.clone(),
            slug: row.slug.clone(),
            position: row.position,
            is_active: row.is_active,
            depth: parent_path.len(),
            path,
            children,
        })
    }
}

/// Build the category forest. Inactive rows are dropped together with their
/// subtrees unless `include_inactive` is set.
pub fn build_tree(rows: &[CategoryResponse], include_inactive: bool) -> Vec<CategoryNode> {
    let index = Index::new(rows);
    let mut placed = HashSet::new();

    index
        .entry_points(rows)
        .into_iter()
        .filter_map(|entry| index.build(entry, &[], include_inactive, &mut placed))
        .collect()
}

/// Ids of every category below `id`, excluding `id` itself.
pub fn descendant_ids(rows: &[CategoryResponse], id: Uuid) -> Vec<Uuid> {
    let index = Index::new(rows);
    let mut seen = HashSet::from([id]);
    let mut out = Vec::new();
    let mut stack: Vec<Uuid> = index.children_of(Some(id)).iter().map(|c| c.id).collect();

    while let Some(next) = stack.pop() {
        if !seen.insert(next) {
            continue;
        }
        out.push(next);
        stack.extend(index.children_of(Some(next)).iter().map(|c| c.id));
    }
    out
}

/// Whether making `new_parent` the parent of `id` would close a loop.
pub fn would_create_cycle(rows: &[CategoryResponse], id: Uuid, new_parent: Uuid) -> bool {
    new_parent == id || descendant_ids(rows, id).contains(&new_parent)
}

/// Total number of nodes in a forest.
pub fn count_nodes(nodes: &[CategoryNode]) -> usize {
    nodes.iter().map(|n| 1 + count_nodes(&n.children)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(name: &str, parent: Option<Uuid>, position: i32) -> CategoryResponse {
        CategoryResponse {
            id: Uuid::new_v4(),
            parent_id: parent,
            name: name.to_string(),
            slug: crate::services::slug::slugify(name),
            description: None,
            position,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn names(nodes: &[CategoryNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.name.as_str()).collect()
    }

    fn assert_depth_matches_path(nodes: &[CategoryNode]) {
        for node in nodes {
            assert_eq!(node.depth + 1, node.path.len());
            assert_depth_matches_path(&node.children);
        }
    }

    #[test]
    fn nests_and_orders_children() {
        let kitchen = row("Kitchen", None, 0);
        let garden = row("Garden", None, 1);
        let mugs = row("Mugs", Some(kitchen.id), 2);
        let bowls = row("Bowls", Some(kitchen.id), 2);
        let plates = row("Plates", Some(kitchen.id), 1);
        let espresso = row("Espresso Cups", Some(mugs.id), 0);

        let rows = vec![mugs, garden, espresso, bowls, kitchen, plates];
        let tree = build_tree(&rows, false);

        assert_eq!(names(&tree), ["Kitchen", "Garden"]);
        assert_eq!(names(&tree[0].children), ["Plates", "Bowls", "Mugs"]);
        let espresso = &tree[0].children[2].children[0];
        assert_eq!(espresso.depth, 2);
        assert_eq!(espresso.path, ["kitchen", "mugs", "espresso-cups"]);
        assert_eq!(count_nodes(&tree), rows.len());
        assert_depth_matches_path(&tree);
    }

    #[test]
    fn missing_parent_becomes_root() {
        let orphan = row("Orphan", Some(Uuid::new_v4()), 0);
        let tree = build_tree(&[orphan], false);
        assert_eq!(names(&tree), ["Orphan"]);
        assert_eq!(tree[0].depth, 0);
    }

    #[test]
    fn inactive_subtree_is_hidden_unless_requested() {
        let root = row("Seasonal", None, 0);
        let mut hidden = row("Halloween", Some(root.id), 0);
        hidden.is_active = false;
        let child = row("Costumes", Some(hidden.id), 0);

        let rows = vec![root, hidden, child];
        let tree = build_tree(&rows, false);
        assert_eq!(count_nodes(&tree), 1);

        let full = build_tree(&rows, true);
        assert_eq!(count_nodes(&full), 3);
    }

    #[test]
    fn cycles_terminate_and_surface_as_roots() {
        let mut a = row("Alpha", None, 0);
        let mut b = row("Beta", None, 1);
        a.parent_id = Some(b.id);
        b.parent_id = Some(a.id);
        let normal = row("Normal", None, 0);
        let mut self_loop = row("Selfish", None, 5);
        self_loop.parent_id = Some(self_loop.id);

        let rows = vec![a, b, normal, self_loop];
        let tree = build_tree(&rows, true);

        assert_eq!(count_nodes(&tree), 4);
        // real roots come first, then the cycle entered at its lowest member
        assert_eq!(names(&tree), ["Normal", "Selfish", "Alpha"]);
        assert_eq!(names(&tree[2].children), ["Beta"]);
        assert!(tree[2].children[0].children.is_empty());
    }

    #[test]
    fn descendants_and_cycle_detection() {
        let root = row("Root", None, 0);
        let mid = row("Mid", Some(root.id), 0);
        let leaf = row("Leaf", Some(mid.id), 0);
        let other = row("Other", None, 1);
        let rows = vec![root.clone(), mid.clone(), leaf.clone(), other.clone()];

        let mut below = descendant_ids(&rows, root.id);
        below.sort();
        let mut expected = vec![mid.id, leaf.id];
        expected.sort();
        assert_eq!(below, expected);
        assert!(descendant_ids(&rows, leaf.id).is_empty());

        assert!(would_create_cycle(&rows, root.id, leaf.id));
        assert!(would_create_cycle(&rows, mid.id, mid.id));
        assert!(!would_create_cycle(&rows, leaf.id, other.id));
        assert!(!would_create_cycle(&rows, mid.id, other.id));
    }
}
