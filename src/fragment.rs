//! SQL fragments and their serializer.
//!
//! Generation happens in two phases: the visitor assembles a tree of
//! [`SqlFragment`]s whose symbols are still mutable, then a single
//! [`SqlWriter`] pass renders the tree to text, fixing final alias names
//! along the way.

use std::rc::Rc;

use crate::generate::SqlGenError;
use crate::select::SelectRef;
use crate::symbol::{self, Naming, SymbolPair, SymbolRef};

/// One node of the assembled SQL tree.
#[derive(Debug, Clone)]
pub enum SqlFragment {
    /// Raw text, already quoted/escaped as needed.
    Sql(String),
    /// An ordered sequence of child fragments.
    Builder(SqlBuilder),
    /// A shared alias whose final spelling is decided at write time.
    Symbol(SymbolRef),
    /// An unresolved property chain through a nested join.
    SymbolPair(SymbolPair),
    /// A row-limit clause at the head of a select.
    Top(TopClause),
    /// A row-offset clause at the head of a select.
    Skip(SkipClause),
    /// A nested select statement.
    Select(SelectRef),
}

impl SqlFragment {
    pub fn write_sql(&self, w: &mut SqlWriter, naming: &mut Naming) -> Result<(), SqlGenError> {
        match self {
            SqlFragment::Sql(s) => w.write(s),
            SqlFragment::Builder(b) => return b.write_sql(w, naming),
            SqlFragment::Symbol(sym) => symbol::write_symbol(sym, w, naming),
            // property chains must be consumed during the visit
            SqlFragment::SymbolPair(_) => {
                return Err(SqlGenError::Unwritable("a row-valued property reference"));
            }
            SqlFragment::Top(top) => top.write_sql(w),
            SqlFragment::Skip(skip) => skip.write_sql(w),
            SqlFragment::Select(sel) => return sel.borrow().write_sql(w, naming),
        }
        Ok(())
    }

    /// Empty means "writes no text".  Builders are inspected recursively so
    /// that a builder holding only empty builders still counts as empty.
    pub fn is_empty(&self) -> bool {
        match self {
            SqlFragment::Sql(s) => s.is_empty(),
            SqlFragment::Builder(b) => b.is_empty(),
            _ => false,
        }
    }
}

impl From<&str> for SqlFragment {
    fn from(s: &str) -> Self {
        SqlFragment::Sql(s.to_string())
    }
}

impl From<String> for SqlFragment {
    fn from(s: String) -> Self {
        SqlFragment::Sql(s)
    }
}

/// An ordered list of fragments.  The unit all clauses are built from.
#[derive(Debug, Clone, Default)]
pub struct SqlBuilder {
    items: Vec<SqlFragment>,
}

impl SqlBuilder {
    pub fn new() -> Self {
        SqlBuilder::default()
    }

    pub fn push(&mut self, fragment: SqlFragment) {
        self.items.push(fragment);
    }

    pub fn push_str(&mut self, s: &str) {
        self.items.push(SqlFragment::Sql(s.to_string()));
    }

    pub fn new_line(&mut self) {
        self.items.push(SqlFragment::Sql("\n".to_string()));
    }

    pub fn is_empty(&self) -> bool {
        self.items.iter().all(SqlFragment::is_empty)
    }

    pub fn write_sql(&self, w: &mut SqlWriter, naming: &mut Naming) -> Result<(), SqlGenError> {
        for item in &self.items {
            item.write_sql(w, naming)?;
        }
        Ok(())
    }
}

/// Row count for TOP and SKIP: a constant or a parameter marker, nothing
/// else is representable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestrictionCount {
    Rows(u64),
    Parameter(String),
}

impl RestrictionCount {
    fn write_sql(&self, w: &mut SqlWriter) {
        match self {
            RestrictionCount::Rows(n) => w.write(&n.to_string()),
            RestrictionCount::Parameter(name) => {
                w.write("@");
                w.write(name);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopClause {
    pub count: RestrictionCount,
}

impl TopClause {
    pub fn write_sql(&self, w: &mut SqlWriter) {
        w.write("TOP ");
        self.count.write_sql(w);
        w.write(" ");
    }
}

/// The provider-extension offset clause.  It is written into the text right
/// after TOP and also surfaced out of band, since the engine itself does not
/// execute it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipClause {
    pub count: RestrictionCount,
}

impl SkipClause {
    pub fn write_sql(&self, w: &mut SqlWriter) {
        w.write("SKIP ");
        self.count.write_sql(w);
        w.write(" ");
    }
}

/// Text sink that indents nested select statements by one tab per level.
///
/// The indent starts at -1 so the outermost statement lands at level zero.
pub struct SqlWriter {
    text: String,
    indent: i32,
    at_line_start: bool,
}

impl SqlWriter {
    pub fn new() -> Self {
        SqlWriter { text: String::new(), indent: -1, at_line_start: false }
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn unindent(&mut self) {
        self.indent -= 1;
    }

    pub fn write(&mut self, s: &str) {
        for c in s.chars() {
            if c == '\n' {
                self.text.push('\n');
                self.at_line_start = true;
                continue;
            }
            if self.at_line_start {
                for _ in 0..self.indent.max(0) {
                    self.text.push('\t');
                }
                self.at_line_start = false;
            }
            self.text.push(c);
        }
    }

    pub fn new_line(&mut self) {
        self.write("\n");
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl Default for SqlWriter {
    fn default() -> Self {
        SqlWriter::new()
    }
}

/// Writes a finished fragment tree, discarding the naming state afterwards.
pub fn render(fragment: &SqlFragment, naming: &mut Naming) -> Result<String, SqlGenError> {
    let mut writer = SqlWriter::new();
    fragment.write_sql(&mut writer, naming)?;
    Ok(writer.into_string())
}

/// Identity comparison for fragments that wrap shared statements.
pub fn is_same_statement(fragment: &SqlFragment, statement: &SelectRef) -> bool {
    match fragment {
        SqlFragment::Select(sel) => Rc::ptr_eq(sel, statement),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_of_empty_builders_is_empty() {
        let mut inner = SqlBuilder::new();
        inner.push_str("");
        let mut outer = SqlBuilder::new();
        outer.push(SqlFragment::Builder(inner));
        outer.push_str("");
        assert!(outer.is_empty());

        outer.push_str("x");
        assert!(!outer.is_empty());
    }

    #[test]
    fn writer_indents_after_newlines_only() {
        let mut w = SqlWriter::new();
        w.indent();
        w.indent();
        w.write("SELECT 1");
        w.new_line();
        w.write("FROM T");
        assert_eq!(w.into_string(), "SELECT 1\n\tFROM T");
    }

    #[test]
    fn top_level_lines_carry_no_tabs() {
        let mut w = SqlWriter::new();
        w.indent();
        w.write("a");
        w.new_line();
        w.write("b");
        assert_eq!(w.into_string(), "a\nb");
    }

    #[test]
    fn restriction_counts_render_rows_and_parameters() {
        let mut w = SqlWriter::new();
        w.indent();
        TopClause { count: RestrictionCount::Rows(5) }.write_sql(&mut w);
        SkipClause { count: RestrictionCount::Parameter("p0".to_string()) }.write_sql(&mut w);
        assert_eq!(w.into_string(), "TOP 5 SKIP @p0 ");
    }
}
