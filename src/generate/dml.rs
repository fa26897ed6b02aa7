//! Row-mutation statements.
//!
//! Mutations do not go through the query visitor.  A small translator walks
//! the assignment values and the predicate, binds every constant as a
//! positional `@pN` parameter and types it from the target column's facets
//! when it has one.  Predicates are restricted to the shapes filters over a
//! single table can take; anything richer is refused.

use crate::dialect;
use crate::tree::{
    Column, DeleteCommand, Expr, InsertCommand, Literal, Table, UpdateCommand,
};

use super::{GeneratedSql, SqlGenError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterDirection {
    Input,
    Output,
}

/// What the execution layer needs to bind one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    pub name: String,
    /// The engine type name, `LONG` or `TEXT(50)` style.
    pub jet_type: String,
    pub size: Option<u32>,
    pub nullable: bool,
    pub direction: ParameterDirection,
    /// The literal this parameter was created for, when it came from one.
    pub value: Option<Literal>,
}

pub fn generate_insert(insert: &InsertCommand) -> Result<GeneratedSql, SqlGenError> {
    if insert.set.is_empty() {
        // there is no DEFAULT VALUES form to fall back on
        return Err(SqlGenError::NotSupportedByJet("INSERT without column values"));
    }
    let mut t = DmlTranslator::new(&insert.table);
    t.text.push_str("INSERT INTO ");
    t.text.push_str(&dialect::quote_identifier(&insert.table.name));
    t.text.push_str(" (");
    let mut separator = "";
    for clause in &insert.set {
        t.text.push_str(separator);
        t.text.push_str(&dialect::quote_identifier(&clause.column));
        separator = ", ";
    }
    t.text.push_str(")\nVALUES (");
    let mut separator = "";
    for clause in &insert.set {
        t.text.push_str(separator);
        t.assignment_value(&clause.column, &clause.value)?;
        separator = ", ";
    }
    t.text.push_str(")");
    if !insert.returning.is_empty() {
        // generated keys come back through a follow-up statement
        t.text.push_str(";\nSELECT @@Identity");
    }
    log::debug!("generated insert:\n{}", t.text);
    Ok(GeneratedSql { text: t.text, skip: None, parameters: t.parameters })
}

pub fn generate_update(update: &UpdateCommand) -> Result<GeneratedSql, SqlGenError> {
    let mut t = DmlTranslator::new(&update.table);
    t.text.push_str("UPDATE ");
    t.text.push_str(&dialect::quote_identifier(&update.table.name));
    t.text.push_str("\nSET ");
    if update.set.is_empty() {
        // the SET list cannot be empty; assign the first column to itself
        let first = update
            .table
            .columns
            .first()
            .ok_or(SqlGenError::NotSupportedByJet("UPDATE of a table without columns"))?;
        let quoted = dialect::quote_identifier(&first.name);
        t.text.push_str(&quoted);
        t.text.push_str(" = ");
        t.text.push_str(&quoted);
    } else {
        let mut separator = "";
        for clause in &update.set {
            t.text.push_str(separator);
            t.text.push_str(&dialect::quote_identifier(&clause.column));
            t.text.push_str(" = ");
            t.assignment_value(&clause.column, &clause.value)?;
            separator = ", ";
        }
    }
    t.text.push_str("\nWHERE ");
    let where_start = t.text.len();
    t.visit(&update.predicate)?;
    if !update.returning.is_empty() {
        // read the named columns back with the same predicate text; the
        // parameters are shared, not bound twice
        let predicate = t.text[where_start..].to_string();
        t.text.push_str(";\nSELECT ");
        let mut separator = "";
        for column in &update.returning {
            t.text.push_str(separator);
            t.text.push_str(&dialect::quote_identifier(column));
            separator = ", ";
        }
        t.text.push_str("\nFROM ");
        t.text.push_str(&dialect::quote_identifier(&update.table.name));
        t.text.push_str("\nWHERE ");
        t.text.push_str(&predicate);
    }
    log::debug!("generated update:\n{}", t.text);
    Ok(GeneratedSql { text: t.text, skip: None, parameters: t.parameters })
}

pub fn generate_delete(delete: &DeleteCommand) -> Result<GeneratedSql, SqlGenError> {
    let mut t = DmlTranslator::new(&delete.table);
    t.text.push_str("DELETE FROM ");
    t.text.push_str(&dialect::quote_identifier(&delete.table.name));
    t.text.push_str("\nWHERE ");
    t.visit(&delete.predicate)?;
    log::debug!("generated delete:\n{}", t.text);
    Ok(GeneratedSql { text: t.text, skip: None, parameters: t.parameters })
}

struct DmlTranslator<'a> {
    table: &'a Table,
    text: String,
    parameters: Vec<ParameterDescriptor>,
}

impl<'a> DmlTranslator<'a> {
    fn new(table: &'a Table) -> Self {
        DmlTranslator { table, text: String::new(), parameters: Vec::new() }
    }

    /// The right-hand side of `column = ...`; constants bind with the
    /// column's facets so the parameter is typed like its target.
    fn assignment_value(&mut self, column: &str, value: &Expr) -> Result<(), SqlGenError> {
        match value {
            Expr::Constant(lit) => {
                let column = self.table.column(column);
                let name = self.bind_parameter(column, lit);
                self.text.push_str(&name);
                Ok(())
            }
            _ => self.visit(value),
        }
    }

    fn visit(&mut self, e: &Expr) -> Result<(), SqlGenError> {
        match e {
            Expr::Comparison { op, left, right } => self.binary(op.sql(), left, right),
            Expr::And { left, right } => self.binary(" AND ", left, right),
            Expr::Or { left, right } => self.binary(" OR ", left, right),
            Expr::Not { arg } => {
                self.text.push_str("NOT (");
                self.visit(arg)?;
                self.text.push(')');
                Ok(())
            }
            Expr::IsNull { arg } => {
                self.visit(arg)?;
                self.text.push_str(" IS NULL");
                Ok(())
            }
            Expr::Property { instance, name } => {
                // rows can only come from the mutated table, so a property
                // is a bare quoted column
                match instance.as_ref() {
                    Expr::Scan(_) | Expr::VarRef { .. } => {
                        self.text.push_str(&dialect::quote_identifier(name));
                        Ok(())
                    }
                    other => Err(SqlGenError::UnsupportedInDml(other.kind())),
                }
            }
            Expr::Constant(lit) => {
                let name = self.bind_parameter(None, lit);
                self.text.push_str(&name);
                Ok(())
            }
            Expr::Parameter { name, .. } => {
                self.text.push('@');
                self.text.push_str(name);
                Ok(())
            }
            Expr::Null(_) => {
                self.text.push_str("NULL");
                Ok(())
            }
            other => Err(SqlGenError::UnsupportedInDml(other.kind())),
        }
    }

    fn binary(&mut self, op: &str, left: &Expr, right: &Expr) -> Result<(), SqlGenError> {
        self.text.push('(');
        self.visit(left)?;
        self.text.push_str(op);
        self.visit(right)?;
        self.text.push(')');
        Ok(())
    }

    fn bind_parameter(&mut self, column: Option<&Column>, value: &Literal) -> String {
        let name = format!("@p{}", self.parameters.len());
        let descriptor = match column {
            Some(column) => ParameterDescriptor {
                name: name.clone(),
                jet_type: dialect::store_type_for_column(column),
                size: column.max_length,
                nullable: column.nullable,
                direction: ParameterDirection::Input,
                value: Some(value.clone()),
            },
            None => ParameterDescriptor {
                name: name.clone(),
                jet_type: dialect::store_type(value.primitive_type(), None, None, None),
                size: None,
                nullable: true,
                direction: ParameterDirection::Input,
                value: Some(value.clone()),
            },
        };
        self.parameters.push(descriptor);
        name
    }
}
