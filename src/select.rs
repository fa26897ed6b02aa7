//! The mutable SELECT statement the visitor accumulates clauses into.
//!
//! A statement is reused across as many tree nodes as its clause state
//! allows; [`SelectStatement::is_compatible`] is the gate.  When a node
//! cannot reuse the current statement the generator finalizes it and nests
//! it as a subquery instead.

use std::cell::RefCell;
use std::rc::Rc;

use crate::fragment::{SkipClause, SqlBuilder, SqlWriter, TopClause};
use crate::generate::SqlGenError;
use crate::symbol::{Naming, SymbolRef};
use crate::tree::NodeKind;

pub type SelectRef = Rc<RefCell<SelectStatement>>;

#[derive(Debug, Default)]
pub struct SelectStatement {
    pub select: SqlBuilder,
    pub from: SqlBuilder,
    pub where_clause: SqlBuilder,
    pub group_by: SqlBuilder,
    pub order_by: SqlBuilder,
    pub is_distinct: bool,
    pub top: Option<TopClause>,
    pub skip: Option<SkipClause>,
    /// Extents of the FROM clause.  A flattened join contributes one join
    /// symbol here rather than its parts.
    pub from_extents: Vec<SymbolRef>,
    /// Symbols referenced by this statement but owned by an enclosing one.
    /// Their aliases must not be shadowed by our own extents.
    pub outer_extents: Vec<SymbolRef>,
    /// For join statements, every extent in visit order before any
    /// collapsing into join symbols.
    pub all_join_extents: Option<Vec<SymbolRef>>,
    /// Set on the outermost statement only; gates ORDER BY emission.
    pub is_top_most: bool,
}

pub fn new_select() -> SelectRef {
    Rc::new(RefCell::new(SelectStatement::default()))
}

impl SelectStatement {
    /// Whether a relational node can fold into this statement instead of
    /// wrapping it in a subquery.
    pub fn is_compatible(&self, kind: NodeKind) -> bool {
        match kind {
            NodeKind::Distinct => self.top.is_none() && self.order_by.is_empty(),
            NodeKind::Filter => {
                self.select.is_empty()
                    && self.where_clause.is_empty()
                    && self.group_by.is_empty()
                    && self.top.is_none()
            }
            NodeKind::GroupBy => {
                self.select.is_empty()
                    && self.group_by.is_empty()
                    && self.order_by.is_empty()
                    && self.top.is_none()
            }
            NodeKind::Limit | NodeKind::Element => self.top.is_none(),
            NodeKind::Project => {
                self.select.is_empty() && self.group_by.is_empty() && !self.is_distinct
            }
            NodeKind::Skip => {
                self.select.is_empty()
                    && self.group_by.is_empty()
                    && self.order_by.is_empty()
                    && !self.is_distinct
                    && self.skip.is_none()
            }
            NodeKind::Sort => {
                self.select.is_empty()
                    && self.group_by.is_empty()
                    && self.order_by.is_empty()
                    && !self.is_distinct
            }
            _ => {
                debug_assert!(false, "no compatibility rule for {kind}");
                false
            }
        }
    }

    pub fn write_sql(&self, w: &mut SqlWriter, naming: &mut Naming) -> Result<(), SqlGenError> {
        // Aliases owned by enclosing statements, visible inside this one.
        let mut outer_aliases: Vec<String> = Vec::new();
        for outer in &self.outer_extents {
            let flattened = outer
                .borrow()
                .join
                .as_ref()
                .map(|j| j.flattened_extent_list.clone());
            match flattened {
                Some(list) => {
                    for extent in list {
                        outer_aliases.push(extent.borrow().new_name.clone());
                    }
                }
                None => outer_aliases.push(outer.borrow().new_name.clone()),
            }
        }

        // Any of our extents shadowing an outer alias is renamed before the
        // clauses mentioning it are written.
        let extent_list = self.all_join_extents.as_ref().unwrap_or(&self.from_extents);
        for from_alias in extent_list {
            let name = from_alias.borrow().name.clone();
            if outer_aliases.iter().any(|a| a.eq_ignore_ascii_case(&name)) {
                let new_name = naming.extent_names.rename(&name);
                from_alias.borrow_mut().new_name = new_name;
            }
        }

        w.indent();

        w.write("SELECT ");
        if self.is_distinct {
            w.write("DISTINCT ");
        }
        if let Some(top) = &self.top {
            top.write_sql(w);
        }
        if let Some(skip) = &self.skip {
            skip.write_sql(w);
        }

        if self.select.is_empty() {
            return Err(SqlGenError::Unwritable("a statement with no select list"));
        }
        self.select.write_sql(w, naming)?;

        w.new_line();
        w.write("FROM ");
        self.from.write_sql(w, naming)?;

        if !self.where_clause.is_empty() {
            w.new_line();
            w.write("WHERE ");
            self.where_clause.write_sql(w, naming)?;
        }

        if !self.group_by.is_empty() {
            w.new_line();
            w.write("GROUP BY ");
            self.group_by.write_sql(w, naming)?;
        }

        // An ORDER BY in a plain subquery is meaningless; keep it only at
        // the top or when a row restriction gives it effect.
        if !self.order_by.is_empty() && (self.is_top_most || self.top.is_some() || self.skip.is_some())
        {
            w.new_line();
            w.write("ORDER BY ");
            self.order_by.write_sql(w, naming)?;
        }

        w.unindent();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::RestrictionCount;
    use crate::symbol::Symbol;

    fn statement_with_select(text: &str) -> SelectStatement {
        let mut stmt = SelectStatement::default();
        stmt.select.push_str(text);
        stmt.from.push_str("[T] AS [t]");
        stmt
    }

    fn render(stmt: &SelectStatement, naming: &mut Naming) -> String {
        let mut w = SqlWriter::new();
        stmt.write_sql(&mut w, naming).unwrap();
        w.into_string()
    }

    #[test]
    fn fresh_statement_accepts_every_foldable_node() {
        let stmt = SelectStatement::default();
        for kind in [
            NodeKind::Distinct,
            NodeKind::Filter,
            NodeKind::GroupBy,
            NodeKind::Limit,
            NodeKind::Element,
            NodeKind::Project,
            NodeKind::Skip,
            NodeKind::Sort,
        ] {
            assert!(stmt.is_compatible(kind), "{kind} should fold into an empty statement");
        }
    }

    #[test]
    fn populated_select_blocks_projection_and_restriction() {
        let stmt = statement_with_select("[t].[A] AS [A]");
        assert!(!stmt.is_compatible(NodeKind::Project));
        assert!(!stmt.is_compatible(NodeKind::Filter));
        assert!(!stmt.is_compatible(NodeKind::GroupBy));
        // TOP does not read the select list
        assert!(stmt.is_compatible(NodeKind::Limit));
    }

    #[test]
    fn top_blocks_another_top_but_not_projection() {
        let mut stmt = statement_with_select("[t].[A] AS [A]");
        stmt.top = Some(TopClause { count: RestrictionCount::Rows(1) });
        assert!(!stmt.is_compatible(NodeKind::Limit));
        assert!(!stmt.is_compatible(NodeKind::Element));
        assert!(!stmt.is_compatible(NodeKind::Distinct));
    }

    #[test]
    fn distinct_blocks_sort_and_skip() {
        let mut stmt = SelectStatement::default();
        stmt.is_distinct = true;
        assert!(!stmt.is_compatible(NodeKind::Sort));
        assert!(!stmt.is_compatible(NodeKind::Skip));
        assert!(!stmt.is_compatible(NodeKind::Project));
        assert!(stmt.is_compatible(NodeKind::Filter));
    }

    #[test]
    fn skip_cannot_stack_on_skip() {
        let mut stmt = SelectStatement::default();
        stmt.skip = Some(SkipClause { count: RestrictionCount::Rows(4) });
        assert!(!stmt.is_compatible(NodeKind::Skip));
    }

    #[test]
    fn order_by_is_dropped_in_plain_subqueries() {
        let mut stmt = statement_with_select("[t].[A] AS [A]");
        stmt.order_by.push_str("[t].[A]");
        let mut naming = Naming::new();
        assert!(!render(&stmt, &mut naming).contains("ORDER BY"));

        stmt.is_top_most = true;
        assert!(render(&stmt, &mut naming).contains("ORDER BY"));

        stmt.is_top_most = false;
        stmt.top = Some(TopClause { count: RestrictionCount::Rows(3) });
        assert!(render(&stmt, &mut naming).contains("ORDER BY"));
    }

    #[test]
    fn extents_shadowing_outer_aliases_are_renamed() {
        let inner = Symbol::new("c", None);
        let outer = Symbol::new("c", None);
        let mut naming = Naming::new();
        naming.extent_names.register("c");

        let mut stmt = statement_with_select("[x]");
        stmt.from.push(crate::fragment::SqlFragment::Symbol(inner.clone()));
        stmt.from_extents.push(inner.clone());
        stmt.outer_extents.push(outer);

        let text = render(&stmt, &mut naming);
        assert_eq!(inner.borrow().new_name, "c1");
        assert!(text.contains("[c1]"));
    }
}
