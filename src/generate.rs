//! The single-pass visitor that turns a command tree into SQL text.
//!
//! Relational nodes fold into the current [`SelectStatement`] when the
//! compatibility rules allow and wrap it as a subquery otherwise.  Scalar
//! nodes build [`SqlFragment`]s.  Nothing is rendered until the tree is
//! complete; the writer pass settles alias names at the very end.

pub mod dml;
pub mod functions;

use std::collections::HashMap;
use std::rc::Rc;

use crate::dialect;
use crate::fragment::{
    self, RestrictionCount, SkipClause, SqlBuilder, SqlFragment, TopClause,
};
use crate::select::{new_select, SelectRef};
use crate::symbol::{Naming, Symbol, SymbolPair, SymbolRef, SymbolTable};
use crate::tree::{
    Aggregate, ApplyKind, ArithmeticOp, Binding, Command, ComparisonOp, Expr, GroupBinding,
    Literal, NodeKind, PrimitiveType, QuantifierKind, RowShape, SortKey, Table,
};

pub use dml::{ParameterDescriptor, ParameterDirection};

/// Column name given to the value of a scalar projection, so an enclosing
/// statement has something to select from it.
const SCALAR_COLUMN: &str = "Value";

/// Everything the generator can refuse to compile, by name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SqlGenError {
    #[error("unsupported expression kind: {0}")]
    UnsupportedExpression(NodeKind),
    #[error("unsupported function: {0}")]
    UnsupportedFunction(String),
    #[error("cast to {0} is not supported")]
    UnsupportedCast(PrimitiveType),
    #[error("unresolved reference: {0}")]
    UnresolvedReference(String),
    #[error("{0} is not supported by this dialect")]
    NotSupportedByJet(&'static str),
    #[error("a {0} node cannot restrict row counts; use a constant or a parameter")]
    InvalidRestrictionCount(NodeKind),
    #[error("{function} applied to {got} arguments")]
    WrongArgumentCount { function: String, got: usize },
    #[error("{0} cannot appear in a row-mutation tree")]
    UnsupportedInDml(NodeKind),
    #[error("{0} has no SQL rendering")]
    Unwritable(&'static str),
}

/// The output of [`generate`].
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedSql {
    /// The statement text.
    pub text: String,
    /// A row offset the execution layer must apply; it is also spelled in
    /// the text as the provider-extension SKIP clause.
    pub skip: Option<RestrictionCount>,
    /// Parameters bound by mutation statements, in order of appearance.
    pub parameters: Vec<ParameterDescriptor>,
}

/// Compiles one command tree.  Every call starts from fresh state, so equal
/// trees produce byte-identical SQL.
pub fn generate(command: &Command) -> Result<GeneratedSql, SqlGenError> {
    match command {
        Command::Query(query) => Generator::new().generate_query(query),
        Command::Insert(insert) => dml::generate_insert(insert),
        Command::Update(update) => dml::generate_update(update),
        Command::Delete(delete) => dml::generate_delete(delete),
    }
}

pub(crate) struct Generator {
    symbols: SymbolTable,
    /// Statements under construction, innermost last.
    statements: Vec<SelectRef>,
    /// Whether the node being visited is a direct input of a join.
    parent_join: Vec<bool>,
    naming: Naming,
    /// Set while a variable reference waits for its property access.
    is_var_ref_single: bool,
}

impl Generator {
    fn new() -> Self {
        Generator {
            symbols: SymbolTable::new(),
            statements: Vec::new(),
            parent_join: Vec::new(),
            naming: Naming::new(),
            is_var_ref_single: false,
        }
    }

    fn generate_query(mut self, query: &Expr) -> Result<GeneratedSql, SqlGenError> {
        let fragment;
        let mut skip = None;
        if query.returns_rows() {
            let statement = self.ensure_select(query, true)?;
            {
                let mut s = statement.borrow_mut();
                s.is_top_most = true;
                skip = s.skip.as_ref().map(|clause| clause.count.clone());
            }
            fragment = SqlFragment::Select(statement);
        } else {
            let mut b = SqlBuilder::new();
            b.push_str("SELECT ");
            b.push(self.visit_expr(query)?);
            fragment = SqlFragment::Builder(b);
        }
        let text = fragment::render(&fragment, &mut self.naming)?;
        log::debug!("generated query:\n{text}");
        Ok(GeneratedSql { text, skip, parameters: Vec::new() })
    }

    // ---- scope plumbing -------------------------------------------------

    fn scoped<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, SqlGenError>,
    ) -> Result<T, SqlGenError> {
        self.symbols.enter_scope();
        let out = f(self);
        self.symbols.exit_scope();
        out
    }

    fn with_statement<T>(
        &mut self,
        statement: &SelectRef,
        f: impl FnOnce(&mut Self) -> Result<T, SqlGenError>,
    ) -> Result<T, SqlGenError> {
        self.statements.push(statement.clone());
        let out = f(self);
        self.statements.pop();
        out
    }

    fn is_parent_a_join(&self) -> bool {
        self.parent_join.last().copied().unwrap_or(false)
    }

    // ---- expression dispatch --------------------------------------------

    fn visit_expr(&mut self, e: &Expr) -> Result<SqlFragment, SqlGenError> {
        match e {
            Expr::Scan(table) => self.visit_scan(table),
            Expr::Filter { input, predicate } => {
                Ok(SqlFragment::Select(self.visit_filter(input, predicate, false)?))
            }
            Expr::Project { input, projection } => {
                Ok(SqlFragment::Select(self.visit_project(input, projection)?))
            }
            Expr::Join { kind, left, right, condition } => Ok(SqlFragment::Select(
                self.visit_join(&[left, right], kind.sql(), Some(condition.as_ref()))?,
            )),
            Expr::CrossJoin { inputs } => {
                let bindings: Vec<&Binding> = inputs.iter().collect();
                Ok(SqlFragment::Select(self.visit_join(&bindings, ",", None)?))
            }
            Expr::Apply { kind, .. } => Err(SqlGenError::NotSupportedByJet(match kind {
                ApplyKind::Cross => "CROSS APPLY",
                ApplyKind::Outer => "OUTER APPLY",
            })),
            Expr::GroupBy { input, keys, aggregates, columns } => Ok(SqlFragment::Select(
                self.visit_group_by(input, keys, aggregates, columns)?,
            )),
            Expr::Sort { input, keys } => {
                Ok(SqlFragment::Select(self.visit_sort(input, keys)?))
            }
            Expr::Skip { input, keys, count } => {
                Ok(SqlFragment::Select(self.visit_skip(input, keys, count)?))
            }
            Expr::Limit { argument, count, with_ties } => Ok(SqlFragment::Select(
                self.visit_limit(argument, count, *with_ties)?,
            )),
            Expr::Distinct { argument } => {
                Ok(SqlFragment::Select(self.visit_distinct(argument)?))
            }
            Expr::Element { argument } => self.visit_element(argument),
            Expr::UnionAll { left, right } => self.visit_set_op(left, right, "UNION ALL"),
            Expr::Intersect { .. } => Err(SqlGenError::NotSupportedByJet("INTERSECT")),
            Expr::Except { .. } => Err(SqlGenError::NotSupportedByJet("EXCEPT")),

            Expr::Case { when, then, else_ } => self.visit_case(when, then, else_.as_deref()),
            Expr::Cast { target, arg } => self.visit_cast(*target, arg),
            Expr::Comparison { op, left, right } => self.visit_binary_infix(op.sql(), left, right),
            Expr::Arithmetic { op, args } => self.visit_arithmetic(*op, args),
            Expr::Like { arg, pattern, escape } => {
                self.visit_like(arg, pattern, escape.as_deref())
            }
            Expr::And { left, right } => self.visit_binary_infix(" AND ", left, right),
            Expr::Or { left, right } => self.visit_binary_infix(" OR ", left, right),
            Expr::Not { arg } => self.visit_not(arg),
            Expr::Function { function, args } => {
                functions::translate_function(self, function, args)
            }
            Expr::Constant(lit) => Ok(SqlFragment::Sql(dialect::write_literal(lit))),
            Expr::Null(_) => Ok(SqlFragment::from("NULL")),
            Expr::Parameter { name, .. } => {
                let mut b = SqlBuilder::new();
                b.push_str("@");
                b.push_str(name);
                Ok(SqlFragment::Builder(b))
            }
            Expr::VarRef { name } => self.visit_var_ref(name),
            Expr::Property { instance, name } => self.visit_property(instance, name),
            Expr::NewRow { .. } => Err(SqlGenError::UnsupportedExpression(NodeKind::NewRow)),
            Expr::IsNull { arg } => self.visit_is_null(arg, false),
            Expr::IsEmpty { argument } => self.visit_is_empty(argument, false),
            Expr::Quantifier { kind, input, predicate } => {
                self.visit_quantifier(*kind, input, predicate)
            }
            Expr::In { item, list } => self.visit_in(item, list),

            Expr::Ref
            | Expr::Deref
            | Expr::RefKey
            | Expr::EntityRef
            | Expr::RelationshipNavigation
            | Expr::Treat
            | Expr::OfType
            | Expr::IsOf
            | Expr::Lambda => Err(SqlGenError::UnsupportedExpression(e.kind())),
        }
    }

    // ---- relational nodes -----------------------------------------------

    fn visit_scan(&mut self, table: &Table) -> Result<SqlFragment, SqlGenError> {
        let target = dialect::quote_identifier(&table.name);
        if self.is_parent_a_join() {
            // under a join the bare name goes straight into the FROM list
            let mut b = SqlBuilder::new();
            b.push_str(&target);
            Ok(SqlFragment::Builder(b))
        } else {
            let statement = new_select();
            statement.borrow_mut().from.push_str(&target);
            Ok(SqlFragment::Select(statement))
        }
    }

    /// Visits a relational input and produces the statement to build on plus
    /// the symbol standing for the input rows.  A multi-extent FROM (a
    /// flattened join) collapses into a single join symbol here.
    fn visit_input(
        &mut self,
        input: &Expr,
        var: &str,
    ) -> Result<(SelectRef, SymbolRef), SqlGenError> {
        let fragment = self.visit_expr(input)?;
        let result = match fragment {
            SqlFragment::Select(statement) => statement,
            other => {
                let statement = new_select();
                wrap_non_query_extent(&statement, other);
                statement
            }
        };

        let extent_count = result.borrow().from_extents.len();
        let from_symbol = if extent_count == 0 {
            Symbol::new(var, Some(input.row_shape()))
        } else if extent_count == 1 {
            let only = result.borrow().from_extents[0].clone();
            only
        } else {
            let extents = result.borrow().from_extents.clone();
            let join_symbol = Symbol::new_join(var, Some(input.row_shape()), extents);
            if let Some(data) = join_symbol.borrow_mut().join.as_mut() {
                data.flattened_extent_list =
                    result.borrow().all_join_extents.clone().unwrap_or_default();
            }
            {
                let mut s = result.borrow_mut();
                s.from_extents.clear();
                s.from_extents.push(join_symbol.clone());
            }
            join_symbol
        };
        Ok((result, from_symbol))
    }

    /// Guarantees a full select statement for set operations, quantifiers
    /// and the query root.
    fn ensure_select(
        &mut self,
        e: &Expr,
        add_default_columns: bool,
    ) -> Result<SelectRef, SqlGenError> {
        let result = match e {
            Expr::Filter { input, predicate } => self.visit_filter(input, predicate, false)?,
            Expr::Project { input, projection } => self.visit_project(input, projection)?,
            Expr::GroupBy { input, keys, aggregates, columns } => {
                self.visit_group_by(input, keys, aggregates, columns)?
            }
            Expr::Sort { input, keys } => self.visit_sort(input, keys)?,
            _ => {
                // any other collection gets a synthetic binding
                let var = "c";
                self.scoped(|g| {
                    let (statement, from_symbol) = g.visit_input(e, var)?;
                    g.add_from_symbol(&statement, var, &from_symbol, true);
                    Ok(statement)
                })?
            }
        };
        if add_default_columns && result.borrow().select.is_empty() {
            self.add_default_columns(&result);
        }
        Ok(result)
    }

    fn visit_filter(
        &mut self,
        input: &Binding,
        predicate: &Expr,
        negate: bool,
    ) -> Result<SelectRef, SqlGenError> {
        let (mut result, mut from_symbol) = self.visit_input(&input.input, &input.var)?;
        if !result.borrow().is_compatible(NodeKind::Filter) {
            let (wrapped, symbol) =
                self.new_nested_statement(&result, &input.var, input.input.row_shape(), true);
            result = wrapped;
            from_symbol = symbol;
        }
        let statement = result.clone();
        self.with_statement(&statement, |g| {
            g.scoped(|g| {
                g.add_from_symbol(&statement, &input.var, &from_symbol, true);
                let predicate_sql = g.visit_expr(predicate)?;
                let mut s = statement.borrow_mut();
                if negate {
                    s.where_clause.push_str("NOT (");
                    s.where_clause.push(predicate_sql);
                    s.where_clause.push_str(")");
                } else {
                    s.where_clause.push(predicate_sql);
                }
                Ok(())
            })
        })?;
        Ok(result)
    }

    fn visit_project(
        &mut self,
        input: &Binding,
        projection: &Expr,
    ) -> Result<SelectRef, SqlGenError> {
        let (mut result, mut from_symbol) = self.visit_input(&input.input, &input.var)?;
        if !result.borrow().is_compatible(NodeKind::Project) {
            let (wrapped, symbol) =
                self.new_nested_statement(&result, &input.var, input.input.row_shape(), true);
            result = wrapped;
            from_symbol = symbol;
        }
        let statement = result.clone();
        self.with_statement(&statement, |g| {
            g.scoped(|g| {
                g.add_from_symbol(&statement, &input.var, &from_symbol, true);
                // only a projection may carry a record constructor
                let projection_sql = match projection {
                    Expr::NewRow { columns } => g.visit_new_row(columns)?,
                    other => {
                        // a bare value still needs a column name an enclosing
                        // statement can reference
                        let mut b = SqlBuilder::new();
                        b.push(g.visit_expr(other)?);
                        b.push_str(" AS ");
                        b.push_str(&dialect::quote_identifier(SCALAR_COLUMN));
                        SqlFragment::Builder(b)
                    }
                };
                statement.borrow_mut().select.push(projection_sql);
                Ok(())
            })
        })?;
        Ok(result)
    }

    fn visit_new_row(&mut self, columns: &[(String, Expr)]) -> Result<SqlFragment, SqlGenError> {
        let mut b = SqlBuilder::new();
        let mut separator = "";
        for (name, value) in columns {
            if matches!(value, Expr::NewRow { .. }) {
                // nested records cannot flatten into a select list
                return Err(SqlGenError::UnsupportedExpression(NodeKind::NewRow));
            }
            if value.returns_rows() {
                // a row set has no single-column rendering; Element is the
                // one sanctioned way to put a subquery in a select list
                return Err(SqlGenError::NotSupportedByJet("collection values in a select list"));
            }
            b.push_str(separator);
            b.new_line();
            b.push(self.visit_expr(value)?);
            b.push_str(" AS ");
            b.push_str(&dialect::quote_identifier(name));
            separator = ", ";
        }
        Ok(SqlFragment::Builder(b))
    }

    fn visit_sort(&mut self, input: &Binding, keys: &[SortKey]) -> Result<SelectRef, SqlGenError> {
        let (mut result, mut from_symbol) = self.visit_input(&input.input, &input.var)?;
        if !result.borrow().is_compatible(NodeKind::Sort) {
            let (wrapped, symbol) =
                self.new_nested_statement(&result, &input.var, input.input.row_shape(), true);
            result = wrapped;
            from_symbol = symbol;
        }
        let statement = result.clone();
        self.with_statement(&statement, |g| {
            g.scoped(|g| {
                g.add_from_symbol(&statement, &input.var, &from_symbol, true);
                g.add_sort_keys(&statement, keys)
            })
        })?;
        Ok(result)
    }

    fn visit_skip(
        &mut self,
        input: &Binding,
        keys: &[SortKey],
        count: &Expr,
    ) -> Result<SelectRef, SqlGenError> {
        let count = restriction_count(count)?;
        let (mut result, mut from_symbol) = self.visit_input(&input.input, &input.var)?;
        if !result.borrow().is_compatible(NodeKind::Skip) {
            let (wrapped, symbol) =
                self.new_nested_statement(&result, &input.var, input.input.row_shape(), true);
            result = wrapped;
            from_symbol = symbol;
        }
        let statement = result.clone();
        self.with_statement(&statement, |g| {
            g.scoped(|g| {
                g.add_from_symbol(&statement, &input.var, &from_symbol, true);
                statement.borrow_mut().skip = Some(SkipClause { count });
                g.add_sort_keys(&statement, keys)
            })
        })?;
        Ok(result)
    }

    fn visit_limit(
        &mut self,
        argument: &Expr,
        count: &Expr,
        with_ties: bool,
    ) -> Result<SelectRef, SqlGenError> {
        if with_ties {
            return Err(SqlGenError::NotSupportedByJet("TOP ... WITH TIES"));
        }
        let count = restriction_count(count)?;
        let mut result = self.ensure_select(argument, false)?;
        if !result.borrow().is_compatible(NodeKind::Limit) {
            let (wrapped, symbol) =
                self.new_nested_statement(&result, "top", argument.row_shape(), true);
            self.add_from_symbol(&wrapped, "top", &symbol, false);
            result = wrapped;
        }
        result.borrow_mut().top = Some(TopClause { count });
        Ok(result)
    }

    fn visit_distinct(&mut self, argument: &Expr) -> Result<SelectRef, SqlGenError> {
        let mut result = self.ensure_select(argument, true)?;
        if !result.borrow().is_compatible(NodeKind::Distinct) {
            let (wrapped, symbol) =
                self.new_nested_statement(&result, "distinct", argument.row_shape(), true);
            self.add_from_symbol(&wrapped, "distinct", &symbol, false);
            result = wrapped;
        }
        result.borrow_mut().is_distinct = true;
        Ok(result)
    }

    fn visit_element(&mut self, argument: &Expr) -> Result<SqlFragment, SqlGenError> {
        let mut statement = self.ensure_select(argument, true)?;
        if !statement.borrow().is_compatible(NodeKind::Element) {
            let (wrapped, symbol) =
                self.new_nested_statement(&statement, "element", argument.row_shape(), true);
            self.add_from_symbol(&wrapped, "element", &symbol, false);
            statement = wrapped;
        }
        // a single element is a TOP 1 scalar subquery
        statement.borrow_mut().top = Some(TopClause { count: RestrictionCount::Rows(1) });
        let mut b = SqlBuilder::new();
        b.push_str("(");
        b.push(SqlFragment::Select(statement));
        b.push_str(")");
        Ok(SqlFragment::Builder(b))
    }

    fn visit_set_op(
        &mut self,
        left: &Expr,
        right: &Expr,
        separator: &str,
    ) -> Result<SqlFragment, SqlGenError> {
        let left_statement = self.ensure_select(left, true)?;
        let right_statement = self.ensure_select(right, true)?;
        let mut b = SqlBuilder::new();
        b.push(SqlFragment::Select(left_statement));
        b.new_line();
        b.push_str(separator);
        b.new_line();
        b.push(SqlFragment::Select(right_statement));
        Ok(SqlFragment::Builder(b))
    }

    fn visit_group_by(
        &mut self,
        input: &GroupBinding,
        keys: &[Expr],
        aggregates: &[Aggregate],
        columns: &[String],
    ) -> Result<SelectRef, SqlGenError> {
        debug_assert_eq!(columns.len(), keys.len() + aggregates.len());

        let (mut inner_query, mut from_symbol) = self.visit_input(&input.input, &input.var)?;
        if !inner_query.borrow().is_compatible(NodeKind::GroupBy) {
            let (wrapped, symbol) =
                self.new_nested_statement(&inner_query, &input.var, input.input.row_shape(), true);
            inner_query = wrapped;
            from_symbol = symbol;
        }

        let inner = inner_query.clone();
        self.with_statement(&inner, |g| {
            g.scoped(|g| {
                g.add_from_symbol(&inner, &input.var, &from_symbol, true);
                // the group variable ranges over the same extent
                g.symbols.add(&input.group_var, from_symbol.clone());

                // keys or aggregate arguments beyond bare column references
                // must be named in a subquery first
                let needs_inner_query = aggregates
                    .iter()
                    .any(|a| group_by_needs_inner_query(&a.arg, &input.group_var, true))
                    || keys.iter().any(|k| group_by_needs_inner_query(k, &input.var, false));

                let (result, from_symbol) = if needs_inner_query {
                    let (wrapped, symbol) = g.new_nested_statement(
                        &inner,
                        &input.var,
                        input.input.row_shape(),
                        false,
                    );
                    g.add_from_symbol(&wrapped, &input.var, &symbol, false);
                    (wrapped, symbol)
                } else {
                    (inner.clone(), from_symbol.clone())
                };

                let mut separator = "";
                for (key, member) in keys.iter().zip(columns) {
                    let alias = dialect::quote_identifier(member);
                    result.borrow_mut().group_by.push_str(separator);
                    let key_sql = g.visit_expr(key)?;
                    if needs_inner_query {
                        {
                            let mut i = inner.borrow_mut();
                            i.select.push_str(separator);
                            i.select.new_line();
                            i.select.push(key_sql);
                            i.select.push_str(" AS ");
                            i.select.push_str(&alias);
                        }
                        let mut r = result.borrow_mut();
                        r.select.push_str(separator);
                        r.select.new_line();
                        r.select.push(SqlFragment::Symbol(from_symbol.clone()));
                        r.select.push_str(".");
                        r.select.push_str(&alias);
                        r.select.push_str(" AS ");
                        r.select.push_str(&alias);
                        r.group_by.push_str(&alias);
                    } else {
                        let mut r = result.borrow_mut();
                        r.select.push_str(separator);
                        r.select.new_line();
                        r.select.push(key_sql.clone());
                        r.select.push_str(" AS ");
                        r.select.push_str(&alias);
                        r.group_by.push(key_sql);
                    }
                    separator = ", ";
                }

                for (aggregate, member) in aggregates.iter().zip(&columns[keys.len()..]) {
                    let alias = dialect::quote_identifier(member);
                    let translated = g.visit_expr(&aggregate.arg)?;
                    let argument = if needs_inner_query {
                        {
                            let mut i = inner.borrow_mut();
                            i.select.push_str(separator);
                            i.select.new_line();
                            i.select.push(translated);
                            i.select.push_str(" AS ");
                            i.select.push_str(&alias);
                        }
                        let mut arg = SqlBuilder::new();
                        arg.push(SqlFragment::Symbol(from_symbol.clone()));
                        arg.push_str(".");
                        arg.push_str(&alias);
                        SqlFragment::Builder(arg)
                    } else {
                        translated
                    };
                    let aggregate_sql = build_aggregate(aggregate, argument);
                    let mut r = result.borrow_mut();
                    r.select.push_str(separator);
                    r.select.new_line();
                    r.select.push(aggregate_sql);
                    r.select.push_str(" AS ");
                    r.select.push_str(&alias);
                    separator = ", ";
                }

                Ok(result)
            })
        })
    }

    fn visit_join(
        &mut self,
        inputs: &[&Binding],
        join_string: &str,
        condition: Option<&Expr>,
    ) -> Result<SelectRef, SqlGenError> {
        // a join directly under another join folds into the parent statement
        let own_statement = !self.is_parent_a_join();
        let result = if own_statement {
            let statement = new_select();
            statement.borrow_mut().all_join_extents = Some(Vec::new());
            statement
        } else if let Some(statement) = self.statements.last().cloned() {
            statement
        } else {
            debug_assert!(false, "join context without an enclosing statement");
            new_select()
        };

        if own_statement {
            self.statements.push(result.clone());
        }
        self.symbols.enter_scope();

        let out = (|| -> Result<(), SqlGenError> {
            let mut separator: Option<&str> = None;
            let mut is_left_most = true;
            for input in inputs {
                {
                    let mut s = result.borrow_mut();
                    match separator {
                        Some(sep) => {
                            s.from.new_line();
                            s.from.push_str(sep);
                            s.from.push_str(" ");
                        }
                        None => s.from.push_str(" "),
                    }
                }

                // scans always merge; a leftmost join merges so chains
                // flatten instead of nesting to the left
                let needs_join_context = matches!(input.input.as_ref(), Expr::Scan(_))
                    || (is_left_most
                        && (is_join_expression(&input.input) || is_apply_expression(&input.input)));

                let from_extents_start = result.borrow().from_extents.len();
                self.parent_join.push(needs_join_context);
                let fragment = self.visit_expr(&input.input);
                self.parent_join.pop();

                self.process_join_input(fragment?, &result, input, from_extents_start)?;
                separator = Some(join_string);
                is_left_most = false;
            }

            if let Some(condition) = condition {
                result.borrow_mut().from.push_str(" ON ");
                self.parent_join.push(false);
                let condition_sql = self.visit_expr(condition);
                self.parent_join.pop();
                result.borrow_mut().from.push(condition_sql?);
            }
            Ok(())
        })();

        self.symbols.exit_scope();
        if own_statement {
            self.statements.pop();
        }
        out?;
        Ok(result)
    }

    fn process_join_input(
        &mut self,
        fragment: SqlFragment,
        result: &SelectRef,
        input: &Binding,
        from_extents_start: usize,
    ) -> Result<(), SqlGenError> {
        // the child may have folded its extents into our own statement
        if fragment::is_same_statement(&fragment, result) {
            let extents: Vec<SymbolRef> =
                result.borrow().from_extents[from_extents_start..].to_vec();
            let join_symbol = Symbol::new_join(&input.var, Some(input.input.row_shape()), extents);
            {
                let mut s = result.borrow_mut();
                s.from_extents.truncate(from_extents_start);
                s.from_extents.push(join_symbol.clone());
            }
            self.symbols.add(&input.var, join_symbol);
            return Ok(());
        }

        let mut from_symbol: Option<SymbolRef> = None;
        match fragment {
            SqlFragment::Select(child) => {
                if child.borrow().select.is_empty() {
                    let columns = self.add_default_columns(&child);
                    if is_join_expression(&input.input) || is_apply_expression(&input.input) {
                        // the nested subquery renames columns; keep its parts
                        // reachable through a blocking join symbol
                        let extents = child.borrow().from_extents.clone();
                        let nested =
                            Symbol::new_join(&input.var, Some(input.input.row_shape()), extents);
                        if let Some(data) = nested.borrow_mut().join.as_mut() {
                            data.is_nested_join = true;
                            data.column_list = columns;
                        }
                        from_symbol = Some(nested);
                    } else {
                        let first = child.borrow().from_extents.first().cloned();
                        if let Some(first) = first {
                            let parts = first
                                .borrow()
                                .join
                                .as_ref()
                                .map(|j| (j.extent_list.clone(), j.flattened_extent_list.clone()));
                            if let Some((extents, flattened)) = parts {
                                let nested = Symbol::new_join(
                                    &input.var,
                                    Some(input.input.row_shape()),
                                    extents,
                                );
                                if let Some(data) = nested.borrow_mut().join.as_mut() {
                                    data.is_nested_join = true;
                                    data.column_list = columns;
                                    data.flattened_extent_list = flattened;
                                }
                                from_symbol = Some(nested);
                            }
                        }
                    }
                }
                let mut s = result.borrow_mut();
                s.from.push_str(" (");
                s.from.push(SqlFragment::Select(child.clone()));
                s.from.push_str(" )");
            }
            other => {
                if matches!(input.input.as_ref(), Expr::Scan(_)) {
                    result.borrow_mut().from.push(other);
                } else {
                    wrap_non_query_extent(result, other);
                }
            }
        }

        let from_symbol = from_symbol
            .unwrap_or_else(|| Symbol::new(&input.var, Some(input.input.row_shape())));
        self.add_from_symbol(result, &input.var, &from_symbol, true);
        if let Some(all) = result.borrow_mut().all_join_extents.as_mut() {
            all.push(from_symbol.clone());
        }
        Ok(())
    }

    // ---- statement plumbing ---------------------------------------------

    fn add_from_symbol(
        &mut self,
        statement: &SelectRef,
        var: &str,
        from_symbol: &SymbolRef,
        add_to_symbol_table: bool,
    ) {
        // do not alias an extent the statement already starts with
        let already_first = statement
            .borrow()
            .from_extents
            .first()
            .is_some_and(|first| Rc::ptr_eq(first, from_symbol));
        if !already_first {
            {
                let mut s = statement.borrow_mut();
                s.from_extents.push(from_symbol.clone());
                s.from.push_str(" AS ");
                s.from.push(SqlFragment::Symbol(from_symbol.clone()));
            }
            self.naming.extent_names.register(&from_symbol.borrow().name);
        }
        if add_to_symbol_table {
            self.symbols.add(var, from_symbol.clone());
        }
    }

    /// Wraps `old` as the single FROM extent of a fresh statement.  With
    /// `finalize` the old statement first gets its explicit column list.
    fn new_nested_statement(
        &mut self,
        old: &SelectRef,
        var: &str,
        shape: RowShape,
        finalize: bool,
    ) -> (SelectRef, SymbolRef) {
        log::trace!("wrapping statement as a subquery bound to {var}");
        let mut from_symbol: Option<SymbolRef> = None;
        if finalize && old.borrow().select.is_empty() {
            let columns = self.add_default_columns(old);
            let first = old.borrow().from_extents.first().cloned();
            if let Some(first) = first {
                let parts = first
                    .borrow()
                    .join
                    .as_ref()
                    .map(|j| (j.extent_list.clone(), j.flattened_extent_list.clone()));
                if let Some((extents, flattened)) = parts {
                    // keep the join structure reachable: the subquery is a
                    // blocking scope whose columns were just named
                    let nested = Symbol::new_join(var, Some(shape.clone()), extents);
                    if let Some(data) = nested.borrow_mut().join.as_mut() {
                        data.is_nested_join = true;
                        data.column_list = columns;
                        data.flattened_extent_list = flattened;
                    }
                    from_symbol = Some(nested);
                }
            }
        }
        let from_symbol = from_symbol.unwrap_or_else(|| Symbol::new(var, Some(shape)));

        let statement = new_select();
        {
            let mut s = statement.borrow_mut();
            s.from.push_str("( ");
            s.from.push(SqlFragment::Select(old.clone()));
            s.from.new_line();
            s.from.push_str(") ");
        }
        (statement, from_symbol)
    }

    /// Synthesizes `extent.[col] AS [col]` for every member of every FROM
    /// extent, flagging both parties of any alias collision for renaming.
    fn add_default_columns(&mut self, statement: &SelectRef) -> Vec<SymbolRef> {
        let mut column_list = Vec::new();
        let mut column_dict: HashMap<String, SymbolRef> = HashMap::new();
        let mut separator =
            if statement.borrow().select.is_empty() { "" } else { ", " }.to_string();
        let extents = statement.borrow().from_extents.clone();
        for symbol in &extents {
            self.add_columns(statement, symbol, &mut column_list, &mut column_dict, &mut separator);
        }
        column_list
    }

    fn add_columns(
        &mut self,
        statement: &SelectRef,
        symbol: &SymbolRef,
        column_list: &mut Vec<SymbolRef>,
        column_dict: &mut HashMap<String, SymbolRef>,
        separator: &mut String,
    ) {
        let join_parts = symbol
            .borrow()
            .join
            .as_ref()
            .map(|j| (j.is_nested_join, j.extent_list.clone(), j.column_list.clone()));

        if let Some((is_nested, extents, columns)) = join_parts {
            if !is_nested {
                for extent in &extents {
                    self.add_columns(statement, extent, column_list, column_dict, separator);
                }
            } else {
                for column in &columns {
                    {
                        let mut s = statement.borrow_mut();
                        s.select.push_str(separator);
                        s.select.push(SqlFragment::Symbol(symbol.clone()));
                        s.select.push_str(".");
                        // no alias: nested join columns already carry fresh names
                        s.select.push(SqlFragment::Symbol(column.clone()));
                    }
                    flag_on_collision(column_dict, column);
                    column_list.push(column.clone());
                    *separator = ", ".to_string();
                }
            }
            return;
        }

        let members = match &symbol.borrow().shape {
            Some(RowShape::Row(names)) => names.clone(),
            // a scalar extent carries exactly the column its projection named
            Some(RowShape::Scalar) => vec![SCALAR_COLUMN.to_string()],
            None => Vec::new(),
        };
        for member in members {
            // renames resolve at write time; claiming the name is enough here
            self.naming.column_names.register(&member);

            let column_symbol = {
                let mut s = symbol.borrow_mut();
                match s.columns.get(&member.to_lowercase()) {
                    Some(existing) => existing.clone(),
                    None => {
                        let created = Symbol::new(&member, None);
                        s.columns.insert(member.to_lowercase(), created.clone());
                        created
                    }
                }
            };

            {
                let mut s = statement.borrow_mut();
                s.select.push_str(separator);
                s.select.push(SqlFragment::Symbol(symbol.clone()));
                s.select.push_str(".");
                // the stored name before AS, the alias symbol after
                s.select.push_str(&dialect::quote_identifier(&member));
                s.select.push_str(" AS ");
                s.select.push(SqlFragment::Symbol(column_symbol.clone()));
            }

            flag_on_collision(column_dict, &column_symbol);
            column_list.push(column_symbol);
            *separator = ", ".to_string();
        }
    }

    fn add_sort_keys(
        &mut self,
        statement: &SelectRef,
        keys: &[SortKey],
    ) -> Result<(), SqlGenError> {
        let mut separator = "";
        for key in keys {
            let key_sql = self.visit_expr(&key.key)?;
            let mut s = statement.borrow_mut();
            s.order_by.push_str(separator);
            s.order_by.push(key_sql);
            if !key.ascending {
                s.order_by.push_str(" DESC");
            }
            separator = ", ";
        }
        Ok(())
    }

    // ---- scalar nodes ---------------------------------------------------

    fn visit_var_ref(&mut self, name: &str) -> Result<SqlFragment, SqlGenError> {
        if self.is_var_ref_single {
            // a row variable is only meaningful under a property access
            return Err(SqlGenError::UnsupportedExpression(NodeKind::VarRef));
        }
        self.is_var_ref_single = true;
        let symbol = self
            .symbols
            .lookup(name)
            .ok_or_else(|| SqlGenError::UnresolvedReference(name.to_string()))?;
        if let Some(current) = self.statements.last() {
            let is_local =
                current.borrow().from_extents.iter().any(|s| Rc::ptr_eq(s, &symbol));
            if !is_local {
                let recorded =
                    current.borrow().outer_extents.iter().any(|s| Rc::ptr_eq(s, &symbol));
                if !recorded {
                    current.borrow_mut().outer_extents.push(symbol.clone());
                }
            }
        }
        Ok(SqlFragment::Symbol(symbol))
    }

    fn visit_property(&mut self, instance: &Expr, name: &str) -> Result<SqlFragment, SqlGenError> {
        let instance_sql = self.visit_expr(instance)?;
        // the variable reference was consumed by this property access
        if matches!(instance, Expr::VarRef { .. }) {
            self.is_var_ref_single = false;
        }

        if let SqlFragment::Symbol(symbol) = &instance_sql {
            let join_lookup = {
                let s = symbol.borrow();
                s.join.as_ref().map(|data| {
                    (data.is_nested_join, data.name_to_extent.get(&name.to_lowercase()).cloned())
                })
            };
            if let Some((is_nested, extent)) = join_lookup {
                let extent =
                    extent.ok_or_else(|| SqlGenError::UnresolvedReference(name.to_string()))?;
                return Ok(if is_nested {
                    SqlFragment::SymbolPair(SymbolPair { source: symbol.clone(), column: extent })
                } else {
                    SqlFragment::Symbol(extent)
                });
            }
        }

        if let SqlFragment::SymbolPair(pair) = instance_sql {
            let column_join = {
                let c = pair.column.borrow();
                c.join
                    .as_ref()
                    .map(|data| data.name_to_extent.get(&name.to_lowercase()).cloned())
            };
            return match column_join {
                Some(extent) => {
                    let extent =
                        extent.ok_or_else(|| SqlGenError::UnresolvedReference(name.to_string()))?;
                    Ok(SqlFragment::SymbolPair(SymbolPair { source: pair.source, column: extent }))
                }
                None => {
                    // the chain bottomed out on a base extent whose columns
                    // got their final symbols when the subquery was finalized
                    let column = pair.column.borrow().columns.get(&name.to_lowercase()).cloned();
                    let column = column
                        .ok_or_else(|| SqlGenError::UnresolvedReference(name.to_string()))?;
                    let mut b = SqlBuilder::new();
                    b.push(SqlFragment::Symbol(pair.source));
                    b.push_str(".");
                    b.push(SqlFragment::Symbol(column));
                    Ok(SqlFragment::Builder(b))
                }
            };
        }

        let mut b = SqlBuilder::new();
        b.push(instance_sql);
        b.push_str(".");
        // a plain extent cannot rename its columns; quote the name directly
        b.push_str(&dialect::quote_identifier(name));
        Ok(SqlFragment::Builder(b))
    }

    fn visit_binary_infix(
        &mut self,
        op: &str,
        left: &Expr,
        right: &Expr,
    ) -> Result<SqlFragment, SqlGenError> {
        let mut b = SqlBuilder::new();
        self.push_parenthesized(&mut b, left)?;
        b.push_str(op);
        self.push_parenthesized(&mut b, right)?;
        Ok(SqlFragment::Builder(b))
    }

    fn push_parenthesized(&mut self, b: &mut SqlBuilder, e: &Expr) -> Result<(), SqlGenError> {
        if is_complex_expression(e) {
            b.push_str("(");
            b.push(self.visit_expr(e)?);
            b.push_str(")");
        } else {
            b.push(self.visit_expr(e)?);
        }
        Ok(())
    }

    fn visit_arithmetic(
        &mut self,
        op: ArithmeticOp,
        args: &[Expr],
    ) -> Result<SqlFragment, SqlGenError> {
        if op == ArithmeticOp::UnaryMinus {
            let arg = match args {
                [only] => only,
                _ => {
                    return Err(SqlGenError::WrongArgumentCount {
                        function: "unary minus".to_string(),
                        got: args.len(),
                    });
                }
            };
            let mut b = SqlBuilder::new();
            b.push_str(" -(");
            b.push(self.visit_expr(arg)?);
            b.push_str(")");
            return Ok(SqlFragment::Builder(b));
        }
        let (left, right) = match args {
            [left, right] => (left, right),
            _ => {
                return Err(SqlGenError::WrongArgumentCount {
                    function: op.sql().trim().to_string(),
                    got: args.len(),
                });
            }
        };
        self.visit_binary_infix(op.sql(), left, right)
    }

    fn visit_not(&mut self, arg: &Expr) -> Result<SqlFragment, SqlGenError> {
        match arg {
            // double negation cancels out entirely
            Expr::Not { arg: inner } => self.visit_expr(inner),
            Expr::IsEmpty { argument } => self.visit_is_empty(argument, true),
            Expr::IsNull { arg: inner } => self.visit_is_null(inner, true),
            Expr::Comparison { op: ComparisonOp::Equals, left, right } => {
                self.visit_binary_infix(" <> ", left, right)
            }
            _ => {
                let mut b = SqlBuilder::new();
                b.push_str(" NOT (");
                b.push(self.visit_expr(arg)?);
                b.push_str(")");
                Ok(SqlFragment::Builder(b))
            }
        }
    }

    fn visit_is_null(&mut self, arg: &Expr, negate: bool) -> Result<SqlFragment, SqlGenError> {
        let mut b = SqlBuilder::new();
        b.push(self.visit_expr(arg)?);
        b.push_str(if negate { " IS NOT NULL" } else { " IS NULL" });
        Ok(SqlFragment::Builder(b))
    }

    fn visit_is_empty(
        &mut self,
        argument: &Expr,
        negate: bool,
    ) -> Result<SqlFragment, SqlGenError> {
        let mut b = SqlBuilder::new();
        if !negate {
            b.push_str(" NOT");
        }
        b.push_str(" EXISTS (");
        b.push(SqlFragment::Select(self.ensure_select(argument, true)?));
        b.new_line();
        b.push_str(")");
        Ok(SqlFragment::Builder(b))
    }

    fn visit_quantifier(
        &mut self,
        kind: QuantifierKind,
        input: &Binding,
        predicate: &Expr,
    ) -> Result<SqlFragment, SqlGenError> {
        let mut b = SqlBuilder::new();
        // ALL p  ==  NOT EXISTS (NOT p)
        let negate = matches!(kind, QuantifierKind::All);
        b.push_str(match kind {
            QuantifierKind::Any => "EXISTS (",
            QuantifierKind::All => "NOT EXISTS (",
        });
        let filter = self.visit_filter(input, predicate, negate)?;
        if filter.borrow().select.is_empty() {
            self.add_default_columns(&filter);
        }
        b.push(SqlFragment::Select(filter));
        b.new_line();
        b.push_str(")");
        Ok(SqlFragment::Builder(b))
    }

    fn visit_in(&mut self, item: &Expr, list: &[Expr]) -> Result<SqlFragment, SqlGenError> {
        if list.is_empty() {
            // an empty membership test never holds
            return Ok(SqlFragment::from("1 = 0"));
        }
        let mut b = SqlBuilder::new();
        b.push(self.visit_expr(item)?);
        b.push_str(" IN (");
        let mut separator = "";
        for value in list {
            b.push_str(separator);
            b.push(self.visit_expr(value)?);
            separator = ", ";
        }
        b.push_str(")");
        Ok(SqlFragment::Builder(b))
    }

    fn visit_case(
        &mut self,
        when: &[Expr],
        then: &[Expr],
        else_: Option<&Expr>,
    ) -> Result<SqlFragment, SqlGenError> {
        debug_assert_eq!(when.len(), then.len());
        if when.is_empty() {
            return Err(SqlGenError::UnsupportedExpression(NodeKind::Case));
        }
        let else_ = else_.filter(|e| !matches!(**e, Expr::Null(_)));
        let mut b = SqlBuilder::new();
        if when.len() == 1 {
            // IIf(cond, then, else)
            b.push_str("IIf(");
            b.push(self.visit_expr(&when[0])?);
            b.push_str(", ");
            b.push(self.visit_expr(&then[0])?);
            b.push_str(", ");
            match else_ {
                Some(e) => b.push(self.visit_expr(e)?),
                None => b.push_str("NULL"),
            }
            b.push_str(")");
        } else {
            // Switch(c1, v1, c2, v2, ..., True, else)
            b.push_str("Switch(");
            let mut separator = "";
            for (cond, value) in when.iter().zip(then) {
                b.push_str(separator);
                b.push(self.visit_expr(cond)?);
                b.push_str(", ");
                b.push(self.visit_expr(value)?);
                separator = ", ";
            }
            if let Some(e) = else_ {
                b.push_str(", True, ");
                b.push(self.visit_expr(e)?);
            }
            b.push_str(")");
        }
        Ok(SqlFragment::Builder(b))
    }

    fn visit_cast(
        &mut self,
        target: PrimitiveType,
        arg: &Expr,
    ) -> Result<SqlFragment, SqlGenError> {
        let arg_sql = self.visit_expr(arg)?;
        match dialect::cast_strategy(target) {
            dialect::CastStrategy::Function(name, zero) => {
                // the conversion functions reject NULL; feed them the zero
                // value instead
                let mut b = SqlBuilder::new();
                b.push_str(name);
                b.push_str("(IIf(");
                b.push(arg_sql.clone());
                b.push_str(" IS NULL, ");
                b.push_str(zero);
                b.push_str(", ");
                b.push(arg_sql);
                b.push_str("))");
                Ok(SqlFragment::Builder(b))
            }
            dialect::CastStrategy::Concat => {
                // string casts ride on &, which also maps NULL to ''
                let mut b = SqlBuilder::new();
                b.push_str("(");
                b.push(arg_sql);
                b.push_str(" & '')");
                Ok(SqlFragment::Builder(b))
            }
            dialect::CastStrategy::Unsupported => Err(SqlGenError::UnsupportedCast(target)),
        }
    }

    fn visit_like(
        &mut self,
        arg: &Expr,
        pattern: &Expr,
        escape: Option<&Expr>,
    ) -> Result<SqlFragment, SqlGenError> {
        if escape.is_some() {
            return Err(SqlGenError::NotSupportedByJet("LIKE with an ESCAPE clause"));
        }
        let mut b = SqlBuilder::new();
        b.push(self.visit_expr(arg)?);
        b.push_str(" LIKE ");
        b.push(self.visit_expr(pattern)?);
        Ok(SqlFragment::Builder(b))
    }
}

fn wrap_non_query_extent(statement: &SelectRef, fragment: SqlFragment) {
    let mut s = statement.borrow_mut();
    s.from.push_str(" (");
    s.from.push(fragment);
    s.from.push_str(")");
}

fn flag_on_collision(column_dict: &mut HashMap<String, SymbolRef>, column: &SymbolRef) {
    let key = column.borrow().name.to_lowercase();
    match column_dict.get(&key) {
        Some(existing) => {
            existing.borrow_mut().needs_renaming = true;
            if !Rc::ptr_eq(existing, column) {
                column.borrow_mut().needs_renaming = true;
            }
        }
        None => {
            column_dict.insert(key, column.clone());
        }
    }
}

fn build_aggregate(aggregate: &Aggregate, argument: SqlFragment) -> SqlFragment {
    let mut b = SqlBuilder::new();
    b.push_str(aggregate.function.sql_name());
    b.push_str("(");
    if aggregate.distinct {
        b.push_str("DISTINCT ");
    }
    b.push(argument);
    b.push_str(")");
    SqlFragment::Builder(b)
}

/// Whether a group-by key or aggregate argument is too rich to sit in the
/// grouping statement directly.  Bare column references over `var` (and,
/// for aggregate arguments, constants) stay; anything else moves into a
/// naming subquery.  Casts are transparent.
fn group_by_needs_inner_query(expr: &Expr, var: &str, allow_constants: bool) -> bool {
    if allow_constants && matches!(expr, Expr::Constant(_)) {
        return false;
    }
    if let Expr::Property { instance, .. } = expr {
        if let Expr::VarRef { name } = instance.as_ref() {
            return !name.eq_ignore_ascii_case(var);
        }
    }
    if let Expr::Cast { arg, .. } = expr {
        return group_by_needs_inner_query(arg, var, allow_constants);
    }
    true
}

fn is_join_expression(e: &Expr) -> bool {
    matches!(e, Expr::Join { .. } | Expr::CrossJoin { .. })
}

fn is_apply_expression(e: &Expr) -> bool {
    matches!(e, Expr::Apply { .. })
}

fn is_complex_expression(e: &Expr) -> bool {
    matches!(
        e,
        Expr::Case { .. } | Expr::And { .. } | Expr::Or { .. } | Expr::Not { .. }
            | Expr::Arithmetic { .. }
    )
}

fn restriction_count(e: &Expr) -> Result<RestrictionCount, SqlGenError> {
    match e {
        Expr::Constant(Literal::Byte(v)) => Ok(RestrictionCount::Rows(u64::from(*v))),
        Expr::Constant(Literal::Int16(v)) if *v >= 0 => Ok(RestrictionCount::Rows(*v as u64)),
        Expr::Constant(Literal::Int32(v)) if *v >= 0 => Ok(RestrictionCount::Rows(*v as u64)),
        Expr::Constant(Literal::Int64(v)) if *v >= 0 => Ok(RestrictionCount::Rows(*v as u64)),
        Expr::Parameter { name, .. } => Ok(RestrictionCount::Parameter(name.clone())),
        _ => Err(SqlGenError::InvalidRestrictionCount(e.kind())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restriction_counts_accept_integers_and_parameters() {
        assert_eq!(
            restriction_count(&Expr::from(5)),
            Ok(RestrictionCount::Rows(5))
        );
        assert_eq!(
            restriction_count(&Expr::Parameter { name: "n".to_string(), ty: PrimitiveType::Int32 }),
            Ok(RestrictionCount::Parameter("n".to_string()))
        );
    }

    #[test]
    fn restriction_counts_reject_everything_else() {
        assert_eq!(
            restriction_count(&Expr::from("five")),
            Err(SqlGenError::InvalidRestrictionCount(NodeKind::Constant))
        );
        assert_eq!(
            restriction_count(&Expr::from(-1)),
            Err(SqlGenError::InvalidRestrictionCount(NodeKind::Constant))
        );
        let sum = Expr::Arithmetic {
            op: ArithmeticOp::Plus,
            args: vec![Expr::from(1), Expr::from(2)],
        };
        assert_eq!(
            restriction_count(&sum),
            Err(SqlGenError::InvalidRestrictionCount(NodeKind::Arithmetic))
        );
    }

    #[test]
    fn bare_column_references_group_in_place() {
        let var_ref = Expr::VarRef { name: "g".to_string() };
        let column = Expr::Property { instance: Box::new(var_ref), name: "A".to_string() };
        assert!(!group_by_needs_inner_query(&column, "g", true));
        // referencing some other variable forces the naming subquery
        assert!(group_by_needs_inner_query(&column, "h", true));
    }

    #[test]
    fn computed_keys_and_constants_are_told_apart() {
        let var_ref = Expr::VarRef { name: "g".to_string() };
        let column = Expr::Property { instance: Box::new(var_ref), name: "A".to_string() };
        let computed = Expr::Arithmetic {
            op: ArithmeticOp::Plus,
            args: vec![column.clone(), Expr::from(1)],
        };
        assert!(group_by_needs_inner_query(&computed, "g", true));
        // constants are fine as aggregate arguments, not as keys
        assert!(!group_by_needs_inner_query(&Expr::from(1), "g", true));
        assert!(group_by_needs_inner_query(&Expr::from(1), "g", false));
        // casts see through to their argument
        let cast = Expr::Cast { target: PrimitiveType::Int64, arg: Box::new(column) };
        assert!(!group_by_needs_inner_query(&cast, "g", true));
    }
}
