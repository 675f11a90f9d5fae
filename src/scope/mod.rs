//! Component B: Scope & Context Stack (§4.B).

pub mod frame;

pub use frame::{Frame, FrameKind, TraversalFlags};

use crate::error::Issue;
use crate::graph::{ColumnNode, GraphStore, IdGenerator, Node, TableNode, COLUMN_PREFIX};

/// The stack of active scope [`Frame`]s for one statement traversal. Owned by a single
/// traversal; never shared across threads (§5).
#[derive(Debug, Default)]
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl ScopeStack {
    pub fn new() -> Self {
        let mut stack = Self { frames: Vec::new() };
        stack.frames.push(Frame::new(FrameKind::Root));
        stack
    }

    /// Pushes a new frame and returns a guard that pops it when dropped — including on an early
    /// `?` return from inside a handler, which is how §4.B's "pop on exit (guaranteed on all
    /// exit paths including errors)" rule is actually enforced in Rust.
    pub fn push<'a>(&'a mut self, kind: FrameKind) -> PushedFrame<'a> {
        self.frames.push(Frame::new(kind));
        PushedFrame { stack: self }
    }

    /// Non-RAII push/pop pair for call sites where holding a [`PushedFrame`] guard would tie up
    /// a borrow of the whole `ScopeStack` field and block unrelated fields of an enclosing struct
    /// (e.g. `extractor::ExtractionContext`) from being borrowed at the same time. Paired
    /// `push_frame`/`pop_frame` calls are the extractor handlers' responsibility; any frame left
    /// unbalanced by a panicking handler is cleared by `reset_to_root` between top-level
    /// statements (§7 "traversal continues").
    pub fn push_frame(&mut self, kind: FrameKind) {
        self.frames.push(Frame::new(kind));
    }

    pub fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Drops every frame but the root. Called between top-level statements so a handler that
    /// panicked (and thus skipped its own `pop_frame` calls) can't leak scope into the next
    /// statement.
    pub fn reset_to_root(&mut self) {
        self.frames.truncate(1);
    }

    pub fn current(&self) -> &Frame {
        self.frames.last().expect("root frame is never popped")
    }

    pub fn current_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("root frame is never popped")
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Iterates frames innermost-first, for the "outer frames (for correlated subqueries)"
    /// fallback in the name-resolution algorithm.
    pub fn frames_innermost_first(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter().rev()
    }

    /// Resolves an alias by reading the stack top-to-bottom (innermost-wins), per §4.B "Alias
    /// resolution always reads top-to-bottom of the stack, first hit wins."
    pub fn resolve_alias(&self, alias: &str) -> Option<String> {
        self.frames_innermost_first()
            .find_map(|f| f.resolve_alias(alias).map(str::to_string))
    }

    /// Resolves a CTE name visible from the current position: registered in the current frame
    /// or any enclosing one (§4.B "CTEs registered in a frame are visible to ... all nested
    /// frames").
    pub fn resolve_cte(&self, name: &str) -> Option<String> {
        self.frames_innermost_first()
            .find_map(|f| f.lookup_cte(name).map(str::to_string))
    }

    /// Finds the visible table(s) named `name` across frames, innermost first. Used for
    /// unqualified resolution's "if multiple match, prefer the innermost" rule — callers only
    /// need the first (innermost) match for that, but `all_visible_tables_named` exposes every
    /// match for ambiguity diagnostics.
    pub fn resolve_table(&self, name: &str) -> Option<String> {
        self.frames_innermost_first()
            .find_map(|f| f.lookup_table(name).map(str::to_string))
    }

    pub fn resolve_variable(&self, name: &str) -> Option<String> {
        let key = name.trim_start_matches('@');
        self.frames_innermost_first()
            .find_map(|f| f.variables.get(key).cloned())
    }

    pub fn resolve_parameter(&self, name: &str) -> Option<String> {
        let key = name.trim_start_matches('@');
        self.frames_innermost_first()
            .find_map(|f| f.parameters.get(key).cloned())
    }

    pub fn current_procedure(&self) -> Option<String> {
        self.frames_innermost_first()
            .find_map(|f| f.current_procedure.clone())
    }
}

/// RAII scope guard returned by [`ScopeStack::push`]. Pops its frame on drop.
pub struct PushedFrame<'a> {
    stack: &'a mut ScopeStack,
}

impl std::ops::Deref for PushedFrame<'_> {
    type Target = ScopeStack;
    fn deref(&self) -> &ScopeStack {
        self.stack
    }
}

impl std::ops::DerefMut for PushedFrame<'_> {
    fn deref_mut(&mut self) -> &mut ScopeStack {
        self.stack
    }
}

impl Drop for PushedFrame<'_> {
    fn drop(&mut self) {
        self.stack.frames.pop();
    }
}

/// Outcome of resolving an unqualified or qualified column reference (§4.B name-resolution
/// algorithm).
pub enum ColumnResolution {
    Resolved(String),
    /// No table/alias qualifier and either zero or more than one candidate table; the caller
    /// logs a warning and skips edge creation (no edge, per §4.B step 3).
    Unresolved,
}

/// Resolves a (possibly qualified) column reference of 1-4 identifiers against the scope
/// stack, per §4.B:
///
/// 1. the last identifier is the column name; any preceding ones are `(server, database,
///    schema, table)` read right to left;
/// 2. if a table/alias is present, resolve it via the stack, then look up
///    `(resolvedTable, columnName)` in the graph, lazily creating the column if the table is
///    known but the specific column was not declared;
/// 3. if unqualified, try the current target-column context, then visible tables (innermost on
///    ambiguity), then outer frames, then variables, then parameters; with zero or multiple
///    visible-table matches, resolution fails and no edge is created.
pub fn resolve_column_reference(
    stack: &ScopeStack,
    graph: &mut GraphStore,
    ids: &mut dyn IdGenerator,
    parts: &[String],
    issues: &mut Vec<Issue>,
) -> ColumnResolution {
    let Some((column_name, qualifiers)) = parts.split_last() else {
        return ColumnResolution::Unresolved;
    };

    if let Some(table_part) = qualifiers.last() {
        // `resolve_alias` maps an alias to the canonical table *name*; a bare reference to a
        // table or CTE by its own declared name is already canonical, so it must not be routed
        // through `resolve_table`/`resolve_cte` (those return the node *id*, not the name, and
        // `get_column_node` is keyed by name).
        let canonical = stack
            .resolve_alias(table_part)
            .unwrap_or_else(|| table_part.clone());

        return match graph.get_column_node(&canonical, column_name) {
            Some(col) => ColumnResolution::Resolved(col.id.clone()),
            None => {
                if stack.resolve_table(&canonical).is_some() || stack.resolve_cte(&canonical).is_some() {
                    let id = ids.next_id(COLUMN_PREFIX);
                    let node = Node::Column(ColumnNode::new(id, canonical.clone(), column_name.clone()));
                    let inserted = graph.add_node(node, issues);
                    let owner_id = stack.resolve_table(&canonical).or_else(|| stack.resolve_cte(&canonical));
                    if let Some(table_id) = owner_id {
                        graph.attach_column_to_table(&table_id, inserted.id());
                    }
                    ColumnResolution::Resolved(inserted.id().to_string())
                } else {
                    issues.push(Issue::unresolved_reference(format!(
                        "cannot resolve table/alias '{table_part}' for column '{column_name}'"
                    )));
                    ColumnResolution::Unresolved
                }
            }
        };
    }

    // Unqualified: current target-column context takes precedence for self-reference cases
    // (rare, but matches §4.B ordering), then visible tables in the current frame only, then
    // outer frames for correlated subqueries, then variables, then parameters.
    for frame in stack.frames_innermost_first() {
        let visible: Vec<&TableNode> = frame
            .visible_tables
            .values()
            .filter_map(|id| graph.get_node_by_id(id).and_then(Node::as_table))
            .collect();

        if visible.is_empty() {
            continue;
        }

        // Exactly one table in scope: an unqualified reference to it is unambiguous even if the
        // column was never declared, so it lazily creates the column (mirrors the qualified
        // branch above) rather than requiring prior knowledge of the table's full column set.
        if visible.len() == 1 {
            let table_id = visible[0].id.clone();
            let table_name = visible[0].name.clone();
            return match graph.get_column_node(&table_name, column_name) {
                Some(col) => ColumnResolution::Resolved(col.id.clone()),
                None => {
                    let id = ids.next_id(COLUMN_PREFIX);
                    let node = Node::Column(ColumnNode::new(id, table_name, column_name.clone()));
                    let inserted = graph.add_node(node, issues);
                    graph.attach_column_to_table(&table_id, inserted.id());
                    ColumnResolution::Resolved(inserted.id().to_string())
                }
            };
        }

        // Multiple tables visible: only a table that already declares this column disambiguates.
        let declared: Vec<&TableNode> = visible
            .into_iter()
            .filter(|t| graph.get_column_node(&t.name, column_name).is_some())
            .collect();
        match declared.len() {
            0 => continue,
            _ => {
                // Prefer the innermost, i.e. the first non-empty frame scanned; ties within that
                // frame are resolved by taking the first declared match.
                let col = graph
                    .get_column_node(&declared[0].name, column_name)
                    .expect("just filtered for presence");
                return ColumnResolution::Resolved(col.id.clone());
            }
        }
    }

    if let Some(var_id) = stack.resolve_variable(column_name) {
        return ColumnResolution::Resolved(var_id);
    }
    if let Some(param_id) = stack.resolve_parameter(column_name) {
        return ColumnResolution::Resolved(param_id);
    }
    issues.push(Issue::unresolved_reference(format!(
        "cannot resolve unqualified column '{column_name}'"
    )));
    ColumnResolution::Unresolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{CounterIdGenerator, TableKind, TableNode};

    #[test]
    fn alias_is_not_resolvable_after_frame_pops() {
        let mut stack = ScopeStack::new();
        {
            let mut guard = stack.push(FrameKind::Select);
            guard.current_mut().register_alias("o", "orders");
            assert_eq!(guard.resolve_alias("o"), Some("orders".to_string()));
        }
        assert_eq!(stack.resolve_alias("o"), None, "alias must not leak out of its frame");
    }

    #[test]
    fn innermost_alias_shadows_outer() {
        let mut stack = ScopeStack::new();
        stack.current_mut().register_alias("t", "outer_table");
        let mut guard = stack.push(FrameKind::Select);
        guard.current_mut().register_alias("t", "inner_table");
        assert_eq!(guard.resolve_alias("t"), Some("inner_table".to_string()));
    }

    #[test]
    fn resolve_qualified_column_creates_it_lazily_when_table_known() {
        let mut graph = GraphStore::new();
        let mut issues = Vec::new();
        let mut ids = CounterIdGenerator::new();
        let table_id = ids.next_id(crate::graph::TABLE_PREFIX);
        graph.add_node(
            Node::Table(TableNode::new(table_id.clone(), "orders", TableKind::BaseTable)),
            &mut issues,
        );

        let mut stack = ScopeStack::new();
        stack.current_mut().register_table("orders", &table_id);

        let parts = vec!["orders".to_string(), "total".to_string()];
        let resolution = resolve_column_reference(&stack, &mut graph, &mut ids, &parts, &mut issues);
        assert!(matches!(resolution, ColumnResolution::Resolved(_)));
        assert!(graph.get_column_node("orders", "total").is_some());
        assert!(issues.is_empty());
    }

    #[test]
    fn unqualified_column_with_no_visible_table_is_unresolved() {
        let mut graph = GraphStore::new();
        let mut issues = Vec::new();
        let mut ids = CounterIdGenerator::new();
        let stack = ScopeStack::new();
        let parts = vec!["total".to_string()];
        let resolution = resolve_column_reference(&stack, &mut graph, &mut ids, &parts, &mut issues);
        assert!(matches!(resolution, ColumnResolution::Unresolved));
        assert_eq!(issues.len(), 1);
    }
}
