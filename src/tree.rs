//! The abstract command tree handed to the SQL generator.
//!
//! A [`Command`] is either a query tree or one of the three row-mutation
//! trees.  Query trees are built from [`Expr`] nodes: relational operators
//! (scan, filter, project, join, ...) that produce row sets, and scalar
//! operators (comparisons, arithmetic, function calls, ...) that produce
//! single values.  The generator walks this structure exactly once.

use std::str::FromStr;

use chrono::{NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

/// A complete unit of work for the generator.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Query(Expr),
    Insert(InsertCommand),
    Update(UpdateCommand),
    Delete(DeleteCommand),
}

/// Row insertion into a single table.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertCommand {
    pub table: Table,
    pub set: Vec<SetClause>,
    /// Server-generated columns the caller wants echoed back.
    pub returning: Vec<String>,
}

/// In-place update of rows matching `predicate`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateCommand {
    pub table: Table,
    pub set: Vec<SetClause>,
    pub predicate: Expr,
    pub returning: Vec<String>,
}

/// Deletion of rows matching `predicate`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteCommand {
    pub table: Table,
    pub predicate: Expr,
}

/// One `column = value` pair of an insert or update.
#[derive(Debug, Clone, PartialEq)]
pub struct SetClause {
    pub column: String,
    pub value: Expr,
}

/// A physical table with enough column metadata to synthesize explicit
/// select lists and to infer parameter types for mutations.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Column metadata.  The facets mirror what a store manifest would carry:
/// text and binary columns have a maximum length, decimals a precision and
/// scale.  Absent facets fall back to dialect defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub ty: PrimitiveType,
    pub nullable: bool,
    pub max_length: Option<u32>,
    pub precision: Option<u8>,
    pub scale: Option<u8>,
}

impl Column {
    pub fn new(name: &str, ty: PrimitiveType) -> Self {
        Column {
            name: name.to_string(),
            ty,
            nullable: true,
            max_length: None,
            precision: None,
            scale: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_max_length(mut self, len: u32) -> Self {
        self.max_length = Some(len);
        self
    }

    pub fn with_precision(mut self, precision: u8, scale: u8) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }
}

/// A relational input bound to a variable name, as in `Filter(input AS c, ...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub input: Box<Expr>,
    pub var: String,
}

impl Binding {
    pub fn new(input: Expr, var: &str) -> Self {
        Binding { input: Box::new(input), var: var.to_string() }
    }
}

/// The binding form used by group-by: the input variable names a single row
/// while the group variable names the rows of one group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupBinding {
    pub input: Box<Expr>,
    pub var: String,
    pub group_var: String,
}

impl GroupBinding {
    pub fn new(input: Expr, var: &str, group_var: &str) -> Self {
        GroupBinding {
            input: Box::new(input),
            var: var.to_string(),
            group_var: group_var.to_string(),
        }
    }
}

/// One ordering key of a sort or skip node.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub key: Expr,
    pub ascending: bool,
}

impl SortKey {
    pub fn asc(key: Expr) -> Self {
        SortKey { key, ascending: true }
    }

    pub fn desc(key: Expr) -> Self {
        SortKey { key, ascending: false }
    }
}

/// One aggregate computed by a group-by node.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub function: AggregateFunction,
    pub arg: Expr,
    pub distinct: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Avg,
    Count,
    BigCount,
    Max,
    Min,
    Sum,
    StDev,
    StDevP,
    Var,
    VarP,
}

impl AggregateFunction {
    pub fn sql_name(self) -> &'static str {
        match self {
            AggregateFunction::Avg => "AVG",
            // the big variant only widens the result type
            AggregateFunction::Count | AggregateFunction::BigCount => "COUNT",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::StDev => "STDEV",
            AggregateFunction::StDevP => "STDEVP",
            AggregateFunction::Var => "VAR",
            AggregateFunction::VarP => "VARP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
    FullOuter,
}

impl JoinKind {
    pub fn sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::LeftOuter => "LEFT OUTER JOIN",
            JoinKind::FullOuter => "FULL OUTER JOIN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyKind {
    Cross,
    Outer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantifierKind {
    Any,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEquals,
    LessThan,
    LessThanOrEquals,
}

impl ComparisonOp {
    pub fn sql(self) -> &'static str {
        match self {
            ComparisonOp::Equals => " = ",
            ComparisonOp::NotEquals => " <> ",
            ComparisonOp::GreaterThan => " > ",
            ComparisonOp::GreaterThanOrEquals => " >= ",
            ComparisonOp::LessThan => " < ",
            ComparisonOp::LessThanOrEquals => " <= ",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    UnaryMinus,
}

impl ArithmeticOp {
    pub fn sql(self) -> &'static str {
        match self {
            ArithmeticOp::Plus => " + ",
            ArithmeticOp::Minus => " - ",
            ArithmeticOp::Multiply => " * ",
            ArithmeticOp::Divide => " / ",
            ArithmeticOp::Modulo => " MOD ",
            ArithmeticOp::UnaryMinus => " -",
        }
    }
}

/// The primitive value types the store understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum PrimitiveType {
    Boolean,
    Byte,
    Int16,
    Int32,
    Int64,
    Single,
    Double,
    Decimal,
    String,
    DateTime,
    Time,
    Binary,
    Guid,
}

/// A typed constant value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Boolean(bool),
    Byte(u8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Single(f32),
    Double(f64),
    Decimal(Decimal),
    String(String),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    Binary(Vec<u8>),
    Guid(Uuid),
}

impl Literal {
    pub fn primitive_type(&self) -> PrimitiveType {
        match self {
            Literal::Boolean(_) => PrimitiveType::Boolean,
            Literal::Byte(_) => PrimitiveType::Byte,
            Literal::Int16(_) => PrimitiveType::Int16,
            Literal::Int32(_) => PrimitiveType::Int32,
            Literal::Int64(_) => PrimitiveType::Int64,
            Literal::Single(_) => PrimitiveType::Single,
            Literal::Double(_) => PrimitiveType::Double,
            Literal::Decimal(_) => PrimitiveType::Decimal,
            Literal::String(_) => PrimitiveType::String,
            Literal::DateTime(_) => PrimitiveType::DateTime,
            Literal::Time(_) => PrimitiveType::Time,
            Literal::Binary(_) => PrimitiveType::Binary,
            Literal::Guid(_) => PrimitiveType::Guid,
        }
    }
}

/// The canonical function vocabulary of query trees.  Names that arrive
/// from outside the known set are preserved in `Unknown` so the generator
/// can report them verbatim.
#[derive(Debug, Clone, PartialEq, Eq, strum_macros::Display)]
pub enum CanonicalFunction {
    Abs,
    AddDays,
    AddHours,
    AddMilliseconds,
    AddMinutes,
    AddMonths,
    AddSeconds,
    AddYears,
    BitwiseAnd,
    BitwiseNot,
    BitwiseOr,
    BitwiseXor,
    Ceiling,
    Concat,
    Contains,
    CreateDateTime,
    CreateTime,
    CurrentDateTime,
    CurrentUtcDateTime,
    Day,
    DayOfYear,
    DiffDays,
    DiffHours,
    DiffMilliseconds,
    DiffMinutes,
    DiffMonths,
    DiffSeconds,
    DiffYears,
    EndsWith,
    Floor,
    Hour,
    IndexOf,
    Left,
    Length,
    LTrim,
    Millisecond,
    Minute,
    Month,
    NewGuid,
    Power,
    Replace,
    Reverse,
    Right,
    Round,
    RTrim,
    Second,
    StartsWith,
    Substring,
    ToLower,
    ToUpper,
    Trim,
    Truncate,
    TruncateTime,
    Year,
    Unknown(String),
}

impl FromStr for CanonicalFunction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use CanonicalFunction::*;
        Ok(match s {
            "Abs" => Abs,
            "AddDays" => AddDays,
            "AddHours" => AddHours,
            "AddMilliseconds" => AddMilliseconds,
            "AddMinutes" => AddMinutes,
            "AddMonths" => AddMonths,
            "AddSeconds" => AddSeconds,
            "AddYears" => AddYears,
            "BitwiseAnd" => BitwiseAnd,
            "BitwiseNot" => BitwiseNot,
            "BitwiseOr" => BitwiseOr,
            "BitwiseXor" => BitwiseXor,
            "Ceiling" => Ceiling,
            "Concat" => Concat,
            "Contains" => Contains,
            "CreateDateTime" => CreateDateTime,
            "CreateTime" => CreateTime,
            "CurrentDateTime" => CurrentDateTime,
            "CurrentUtcDateTime" => CurrentUtcDateTime,
            "Day" => Day,
            "DayOfYear" => DayOfYear,
            "DiffDays" => DiffDays,
            "DiffHours" => DiffHours,
            "DiffMilliseconds" => DiffMilliseconds,
            "DiffMinutes" => DiffMinutes,
            "DiffMonths" => DiffMonths,
            "DiffSeconds" => DiffSeconds,
            "DiffYears" => DiffYears,
            "EndsWith" => EndsWith,
            "Floor" => Floor,
            "Hour" => Hour,
            "IndexOf" => IndexOf,
            "Left" => Left,
            "Length" => Length,
            "LTrim" => LTrim,
            "Millisecond" => Millisecond,
            "Minute" => Minute,
            "Month" => Month,
            "NewGuid" => NewGuid,
            "Power" => Power,
            "Replace" => Replace,
            "Reverse" => Reverse,
            "Right" => Right,
            "Round" => Round,
            "RTrim" => RTrim,
            "Second" => Second,
            "StartsWith" => StartsWith,
            "Substring" => Substring,
            "ToLower" => ToLower,
            "ToUpper" => ToUpper,
            "Trim" => Trim,
            "Truncate" => Truncate,
            "TruncateTime" => TruncateTime,
            "Year" => Year,
            _ => return Err(()),
        })
    }
}

impl From<String> for CanonicalFunction {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(CanonicalFunction::Unknown(s))
    }
}

impl From<&str> for CanonicalFunction {
    fn from(s: &str) -> Self {
        CanonicalFunction::from(s.to_string())
    }
}

/// The shape of the rows a relational node produces: either a record with
/// named members or a bare scalar value per row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowShape {
    Row(Vec<String>),
    Scalar,
}

/// An expression node.  Relational variants produce row sets; the rest
/// produce scalar values.  Variants past `Lambda` in [`NodeKind`] order are
/// carried only so the generator can reject them by name.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    // relational
    Scan(Table),
    Filter { input: Binding, predicate: Box<Expr> },
    Project { input: Binding, projection: Box<Expr> },
    Join { kind: JoinKind, left: Binding, right: Binding, condition: Box<Expr> },
    CrossJoin { inputs: Vec<Binding> },
    Apply { kind: ApplyKind, input: Binding, apply: Binding },
    GroupBy { input: GroupBinding, keys: Vec<Expr>, aggregates: Vec<Aggregate>, columns: Vec<String> },
    Sort { input: Binding, keys: Vec<SortKey> },
    Skip { input: Binding, keys: Vec<SortKey>, count: Box<Expr> },
    Limit { argument: Box<Expr>, count: Box<Expr>, with_ties: bool },
    Distinct { argument: Box<Expr> },
    Element { argument: Box<Expr> },
    UnionAll { left: Box<Expr>, right: Box<Expr> },
    Intersect { left: Box<Expr>, right: Box<Expr> },
    Except { left: Box<Expr>, right: Box<Expr> },

    // scalar
    Case { when: Vec<Expr>, then: Vec<Expr>, else_: Option<Box<Expr>> },
    Cast { target: PrimitiveType, arg: Box<Expr> },
    Comparison { op: ComparisonOp, left: Box<Expr>, right: Box<Expr> },
    Arithmetic { op: ArithmeticOp, args: Vec<Expr> },
    Like { arg: Box<Expr>, pattern: Box<Expr>, escape: Option<Box<Expr>> },
    And { left: Box<Expr>, right: Box<Expr> },
    Or { left: Box<Expr>, right: Box<Expr> },
    Not { arg: Box<Expr> },
    Function { function: CanonicalFunction, args: Vec<Expr> },
    Constant(Literal),
    Null(PrimitiveType),
    Parameter { name: String, ty: PrimitiveType },
    VarRef { name: String },
    Property { instance: Box<Expr>, name: String },
    NewRow { columns: Vec<(String, Expr)> },
    IsNull { arg: Box<Expr> },
    IsEmpty { argument: Box<Expr> },
    Quantifier { kind: QuantifierKind, input: Binding, predicate: Box<Expr> },
    In { item: Box<Expr>, list: Vec<Expr> },

    // carried for diagnostics only
    Ref,
    Deref,
    RefKey,
    EntityRef,
    RelationshipNavigation,
    Treat,
    OfType,
    IsOf,
    Lambda,
}

/// A fieldless mirror of [`Expr`] used in diagnostics and compatibility
/// checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum NodeKind {
    Scan,
    Filter,
    Project,
    InnerJoin,
    LeftOuterJoin,
    FullOuterJoin,
    CrossJoin,
    CrossApply,
    OuterApply,
    GroupBy,
    Sort,
    Skip,
    Limit,
    Distinct,
    Element,
    UnionAll,
    Intersect,
    Except,
    Case,
    Cast,
    Comparison,
    Arithmetic,
    Like,
    And,
    Or,
    Not,
    Function,
    Constant,
    Null,
    Parameter,
    VarRef,
    Property,
    NewRow,
    IsNull,
    IsEmpty,
    Any,
    All,
    In,
    Ref,
    Deref,
    RefKey,
    EntityRef,
    RelationshipNavigation,
    Treat,
    OfType,
    IsOf,
    Lambda,
}

impl Expr {
    pub fn kind(&self) -> NodeKind {
        match self {
            Expr::Scan(_) => NodeKind::Scan,
            Expr::Filter { .. } => NodeKind::Filter,
            Expr::Project { .. } => NodeKind::Project,
            Expr::Join { kind: JoinKind::Inner, .. } => NodeKind::InnerJoin,
            Expr::Join { kind: JoinKind::LeftOuter, .. } => NodeKind::LeftOuterJoin,
            Expr::Join { kind: JoinKind::FullOuter, .. } => NodeKind::FullOuterJoin,
            Expr::CrossJoin { .. } => NodeKind::CrossJoin,
            Expr::Apply { kind: ApplyKind::Cross, .. } => NodeKind::CrossApply,
            Expr::Apply { kind: ApplyKind::Outer, .. } => NodeKind::OuterApply,
            Expr::GroupBy { .. } => NodeKind::GroupBy,
            Expr::Sort { .. } => NodeKind::Sort,
            Expr::Skip { .. } => NodeKind::Skip,
            Expr::Limit { .. } => NodeKind::Limit,
            Expr::Distinct { .. } => NodeKind::Distinct,
            Expr::Element { .. } => NodeKind::Element,
            Expr::UnionAll { .. } => NodeKind::UnionAll,
            Expr::Intersect { .. } => NodeKind::Intersect,
            Expr::Except { .. } => NodeKind::Except,
            Expr::Case { .. } => NodeKind::Case,
            Expr::Cast { .. } => NodeKind::Cast,
            Expr::Comparison { .. } => NodeKind::Comparison,
            Expr::Arithmetic { .. } => NodeKind::Arithmetic,
            Expr::Like { .. } => NodeKind::Like,
            Expr::And { .. } => NodeKind::And,
            Expr::Or { .. } => NodeKind::Or,
            Expr::Not { .. } => NodeKind::Not,
            Expr::Function { .. } => NodeKind::Function,
            Expr::Constant(_) => NodeKind::Constant,
            Expr::Null(_) => NodeKind::Null,
            Expr::Parameter { .. } => NodeKind::Parameter,
            Expr::VarRef { .. } => NodeKind::VarRef,
            Expr::Property { .. } => NodeKind::Property,
            Expr::NewRow { .. } => NodeKind::NewRow,
            Expr::IsNull { .. } => NodeKind::IsNull,
            Expr::IsEmpty { .. } => NodeKind::IsEmpty,
            Expr::Quantifier { kind: QuantifierKind::Any, .. } => NodeKind::Any,
            Expr::Quantifier { kind: QuantifierKind::All, .. } => NodeKind::All,
            Expr::In { .. } => NodeKind::In,
            Expr::Ref => NodeKind::Ref,
            Expr::Deref => NodeKind::Deref,
            Expr::RefKey => NodeKind::RefKey,
            Expr::EntityRef => NodeKind::EntityRef,
            Expr::RelationshipNavigation => NodeKind::RelationshipNavigation,
            Expr::Treat => NodeKind::Treat,
            Expr::OfType => NodeKind::OfType,
            Expr::IsOf => NodeKind::IsOf,
            Expr::Lambda => NodeKind::Lambda,
        }
    }

    /// Whether this node produces a row set rather than a scalar value.
    pub fn returns_rows(&self) -> bool {
        matches!(
            self,
            Expr::Scan(_)
                | Expr::Filter { .. }
                | Expr::Project { .. }
                | Expr::Join { .. }
                | Expr::CrossJoin { .. }
                | Expr::Apply { .. }
                | Expr::GroupBy { .. }
                | Expr::Sort { .. }
                | Expr::Skip { .. }
                | Expr::Limit { .. }
                | Expr::Distinct { .. }
                | Expr::UnionAll { .. }
                | Expr::Intersect { .. }
                | Expr::Except { .. }
        )
    }

    /// The member names of the rows this node produces.  Total over all
    /// variants: scalar nodes report [`RowShape::Scalar`].
    pub fn row_shape(&self) -> RowShape {
        match self {
            Expr::Scan(table) => RowShape::Row(table.column_names()),
            Expr::Filter { input, .. } | Expr::Sort { input, .. } | Expr::Skip { input, .. } => {
                input.input.row_shape()
            }
            Expr::Project { projection, .. } => match projection.as_ref() {
                Expr::NewRow { columns } => {
                    RowShape::Row(columns.iter().map(|(n, _)| n.clone()).collect())
                }
                _ => RowShape::Scalar,
            },
            Expr::Join { left, right, .. } => {
                RowShape::Row(vec![left.var.clone(), right.var.clone()])
            }
            Expr::CrossJoin { inputs } => {
                RowShape::Row(inputs.iter().map(|b| b.var.clone()).collect())
            }
            Expr::Apply { input, apply, .. } => {
                RowShape::Row(vec![input.var.clone(), apply.var.clone()])
            }
            Expr::GroupBy { columns, .. } => RowShape::Row(columns.clone()),
            Expr::Limit { argument, .. }
            | Expr::Distinct { argument }
            | Expr::Element { argument } => argument.row_shape(),
            Expr::UnionAll { left, .. }
            | Expr::Intersect { left, .. }
            | Expr::Except { left, .. } => left.row_shape(),
            _ => RowShape::Scalar,
        }
    }
}

impl From<bool> for Expr {
    fn from(v: bool) -> Self {
        Expr::Constant(Literal::Boolean(v))
    }
}

impl From<i32> for Expr {
    fn from(v: i32) -> Self {
        Expr::Constant(Literal::Int32(v))
    }
}

impl From<i64> for Expr {
    fn from(v: i64) -> Self {
        Expr::Constant(Literal::Int64(v))
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::Constant(Literal::Double(v))
    }
}

impl From<&str> for Expr {
    fn from(v: &str) -> Self {
        Expr::Constant(Literal::String(v.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_function_round_trips_known_names() {
        assert_eq!(CanonicalFunction::from("IndexOf"), CanonicalFunction::IndexOf);
        assert_eq!(CanonicalFunction::from("TruncateTime"), CanonicalFunction::TruncateTime);
    }

    #[test]
    fn canonical_function_preserves_unknown_names() {
        assert_eq!(
            CanonicalFunction::from("FooBar"),
            CanonicalFunction::Unknown("FooBar".to_string())
        );
    }

    #[test]
    fn projection_shape_follows_the_record_constructor() {
        let t = Table {
            name: "T".to_string(),
            columns: vec![Column::new("A", PrimitiveType::Int32)],
        };
        let project = Expr::Project {
            input: Binding::new(Expr::Scan(t), "c"),
            projection: Box::new(Expr::NewRow {
                columns: vec![("X".to_string(), Expr::from(1))],
            }),
        };
        assert_eq!(project.row_shape(), RowShape::Row(vec!["X".to_string()]));
    }

    #[test]
    fn scalar_projection_has_no_members() {
        let t = Table {
            name: "T".to_string(),
            columns: vec![Column::new("A", PrimitiveType::Int32)],
        };
        let project = Expr::Project {
            input: Binding::new(Expr::Scan(t), "c"),
            projection: Box::new(Expr::from(1)),
        };
        assert_eq!(project.row_shape(), RowShape::Scalar);
    }

    #[test]
    fn filters_and_sorts_are_shape_transparent() {
        let t = Table {
            name: "T".to_string(),
            columns: vec![
                Column::new("A", PrimitiveType::Int32),
                Column::new("B", PrimitiveType::String),
            ],
        };
        let filter = Expr::Filter {
            input: Binding::new(Expr::Scan(t), "c"),
            predicate: Box::new(Expr::from(true)),
        };
        assert_eq!(
            filter.row_shape(),
            RowShape::Row(vec!["A".to_string(), "B".to_string()])
        );
    }
}
