//! Canonical function translation.
//!
//! Each recognized function compiles to its VBA-flavored builtin, an infix
//! operator or a LIKE rewrite.  Functions the engine has no counterpart for
//! come back as typed errors instead of leaking into the SQL text.

use crate::dialect;
use crate::fragment::{SqlBuilder, SqlFragment};
use crate::tree::{CanonicalFunction, Expr, Literal};

use super::{Generator, SqlGenError};

pub(crate) fn translate_function(
    g: &mut Generator,
    function: &CanonicalFunction,
    args: &[Expr],
) -> Result<SqlFragment, SqlGenError> {
    use CanonicalFunction::*;
    match function {
        Concat | Power | BitwiseAnd | BitwiseOr | BitwiseXor => infix_operator(g, function, args),
        // BITWISENOT(x) => (BNOT x)
        BitwiseNot => {
            let arg = args1(function, args)?;
            let mut b = SqlBuilder::new();
            b.push_str("(BNOT ");
            b.push(g.visit_expr(arg)?);
            b.push_str(")");
            Ok(SqlFragment::Builder(b))
        }

        Year | Month | Day | DayOfYear | Hour | Minute | Second => date_part(g, function, args),
        AddYears | AddMonths | AddDays | AddHours | AddMinutes | AddSeconds => {
            date_add(g, function, args)
        }
        DiffYears | DiffMonths | DiffDays | DiffHours | DiffMinutes | DiffSeconds => {
            date_diff(g, function, args)
        }
        // timestamps only resolve to the second
        Millisecond | AddMilliseconds | DiffMilliseconds => {
            Err(SqlGenError::NotSupportedByJet("millisecond precision"))
        }
        // CURRENTDATETIME() => Now()
        CurrentDateTime => constant_call(function, args, "Now()"),
        CurrentUtcDateTime => Err(SqlGenError::NotSupportedByJet("UTC timestamps")),
        // CREATEDATETIME(y, mo, d, h, n, s) => (DateSerial(y, mo, d) + TimeSerial(h, n, s))
        CreateDateTime => {
            if args.len() != 6 {
                return Err(wrong_count(function, args.len()));
            }
            let mut b = SqlBuilder::new();
            b.push_str("(DateSerial(");
            b.push(g.visit_expr(&args[0])?);
            b.push_str(", ");
            b.push(g.visit_expr(&args[1])?);
            b.push_str(", ");
            b.push(g.visit_expr(&args[2])?);
            b.push_str(") + TimeSerial(");
            b.push(g.visit_expr(&args[3])?);
            b.push_str(", ");
            b.push(g.visit_expr(&args[4])?);
            b.push_str(", ");
            b.push(g.visit_expr(&args[5])?);
            b.push_str("))");
            Ok(SqlFragment::Builder(b))
        }
        // CREATETIME(h, n, s) => TimeSerial(h, n, s)
        CreateTime => named(g, function, "TimeSerial", args, 3),
        // TRUNCATETIME(d) => DateValue(d)
        TruncateTime => named(g, function, "DateValue", args, 1),

        // LENGTH(s) => Len(s)
        Length => named(g, function, "Len", args, 1),
        // TOUPPER(s) => UCase(s)
        ToUpper => named(g, function, "UCase", args, 1),
        // TOLOWER(s) => LCase(s)
        ToLower => named(g, function, "LCase", args, 1),
        Trim => named(g, function, "Trim", args, 1),
        LTrim => named(g, function, "LTrim", args, 1),
        RTrim => named(g, function, "RTrim", args, 1),
        // REVERSE(s) => StrReverse(s)
        Reverse => named(g, function, "StrReverse", args, 1),
        Left => named(g, function, "Left", args, 2),
        Right => named(g, function, "Right", args, 2),
        // SUBSTRING(s, start, count) => Mid(s, start, count); start is 1-based
        // on both sides
        Substring => named(g, function, "Mid", args, 3),
        Replace => named(g, function, "Replace", args, 3),
        // INDEXOF(find, s) => InStr(1, s, find)
        IndexOf => {
            let (find, s) = args2(function, args)?;
            let mut b = SqlBuilder::new();
            b.push_str("InStr(1, ");
            b.push(g.visit_expr(s)?);
            b.push_str(", ");
            b.push(g.visit_expr(find)?);
            b.push_str(")");
            Ok(SqlFragment::Builder(b))
        }
        StartsWith | EndsWith | Contains => pattern_match(g, function, args),

        Abs => named(g, function, "Abs", args, 1),
        Round => {
            if args.len() != 1 && args.len() != 2 {
                return Err(wrong_count(function, args.len()));
            }
            call(g, "Round", args)
        }
        // FLOOR(x) => Int(x)
        Floor => named(g, function, "Int", args, 1),
        // CEILING(x) => (-Int(-(x)))
        Ceiling => {
            let arg = args1(function, args)?;
            let mut b = SqlBuilder::new();
            b.push_str("(-Int(-(");
            b.push(g.visit_expr(arg)?);
            b.push_str(")))");
            Ok(SqlFragment::Builder(b))
        }
        // TRUNCATE(x, 0) => Fix(x); there is no builtin that truncates at
        // other scales
        Truncate => {
            let digits_are_zero = match args {
                [_] => true,
                [_, digits] => matches!(
                    digits,
                    Expr::Constant(Literal::Byte(0))
                        | Expr::Constant(Literal::Int16(0))
                        | Expr::Constant(Literal::Int32(0))
                        | Expr::Constant(Literal::Int64(0))
                ),
                _ => return Err(wrong_count(function, args.len())),
            };
            if !digits_are_zero {
                return Err(SqlGenError::NotSupportedByJet("Truncate at a nonzero scale"));
            }
            let mut b = SqlBuilder::new();
            b.push_str("Fix(");
            b.push(g.visit_expr(&args[0])?);
            b.push_str(")");
            Ok(SqlFragment::Builder(b))
        }

        // NEWGUID() => GenGUID()
        NewGuid => constant_call(function, args, "GenGUID()"),

        Unknown(name) => Err(SqlGenError::UnsupportedFunction(name.clone())),
    }
}

fn wrong_count(function: &CanonicalFunction, got: usize) -> SqlGenError {
    SqlGenError::WrongArgumentCount { function: function.to_string(), got }
}

fn args1<'a>(function: &CanonicalFunction, args: &'a [Expr]) -> Result<&'a Expr, SqlGenError> {
    match args {
        [arg] => Ok(arg),
        _ => Err(wrong_count(function, args.len())),
    }
}

fn args2<'a>(
    function: &CanonicalFunction,
    args: &'a [Expr],
) -> Result<(&'a Expr, &'a Expr), SqlGenError> {
    match args {
        [first, second] => Ok((first, second)),
        _ => Err(wrong_count(function, args.len())),
    }
}

/// A plain call that keeps its argument order, after an arity check.
fn named(
    g: &mut Generator,
    function: &CanonicalFunction,
    name: &str,
    args: &[Expr],
    arity: usize,
) -> Result<SqlFragment, SqlGenError> {
    if args.len() != arity {
        return Err(wrong_count(function, args.len()));
    }
    call(g, name, args)
}

fn call(g: &mut Generator, name: &str, args: &[Expr]) -> Result<SqlFragment, SqlGenError> {
    let mut b = SqlBuilder::new();
    b.push_str(name);
    b.push_str("(");
    let mut separator = "";
    for arg in args {
        b.push_str(separator);
        b.push(g.visit_expr(arg)?);
        separator = ", ";
    }
    b.push_str(")");
    Ok(SqlFragment::Builder(b))
}

fn constant_call(
    function: &CanonicalFunction,
    args: &[Expr],
    text: &'static str,
) -> Result<SqlFragment, SqlGenError> {
    if !args.is_empty() {
        return Err(wrong_count(function, args.len()));
    }
    Ok(SqlFragment::from(text))
}

// CONCAT(a, b) => (a & b), POWER(a, b) => (a ^ b), BITWISEAND(a, b) => (a BAND b)
fn infix_operator(
    g: &mut Generator,
    function: &CanonicalFunction,
    args: &[Expr],
) -> Result<SqlFragment, SqlGenError> {
    let op = dialect::operator(function)
        .ok_or_else(|| SqlGenError::UnsupportedFunction(function.to_string()))?;
    let (left, right) = args2(function, args)?;
    let mut b = SqlBuilder::new();
    b.push_str("(");
    b.push(g.visit_expr(left)?);
    b.push_str(" ");
    b.push_str(op);
    b.push_str(" ");
    b.push(g.visit_expr(right)?);
    b.push_str(")");
    Ok(SqlFragment::Builder(b))
}

// YEAR(d) => DatePart('yyyy', d)
fn date_part(
    g: &mut Generator,
    function: &CanonicalFunction,
    args: &[Expr],
) -> Result<SqlFragment, SqlGenError> {
    let keyword = dialect::extract_keyword(function)
        .ok_or_else(|| SqlGenError::UnsupportedFunction(function.to_string()))?;
    let date = args1(function, args)?;
    let mut b = SqlBuilder::new();
    b.push_str("DatePart('");
    b.push_str(keyword);
    b.push_str("', ");
    b.push(g.visit_expr(date)?);
    b.push_str(")");
    Ok(SqlFragment::Builder(b))
}

// ADDDAYS(d, n) => DateAdd('d', n, d); the interval count moves up front
fn date_add(
    g: &mut Generator,
    function: &CanonicalFunction,
    args: &[Expr],
) -> Result<SqlFragment, SqlGenError> {
    let keyword = dialect::date_add_keyword(function)
        .ok_or_else(|| SqlGenError::UnsupportedFunction(function.to_string()))?;
    let (date, number) = args2(function, args)?;
    let mut b = SqlBuilder::new();
    b.push_str("DateAdd('");
    b.push_str(keyword);
    b.push_str("', ");
    b.push(g.visit_expr(number)?);
    b.push_str(", ");
    b.push(g.visit_expr(date)?);
    b.push_str(")");
    Ok(SqlFragment::Builder(b))
}

// DIFFDAYS(a, b) => DateDiff('d', a, b)
fn date_diff(
    g: &mut Generator,
    function: &CanonicalFunction,
    args: &[Expr],
) -> Result<SqlFragment, SqlGenError> {
    let keyword = dialect::date_diff_keyword(function)
        .ok_or_else(|| SqlGenError::UnsupportedFunction(function.to_string()))?;
    let (from, to) = args2(function, args)?;
    let mut b = SqlBuilder::new();
    b.push_str("DateDiff('");
    b.push_str(keyword);
    b.push_str("', ");
    b.push(g.visit_expr(from)?);
    b.push_str(", ");
    b.push(g.visit_expr(to)?);
    b.push_str(")");
    Ok(SqlFragment::Builder(b))
}

/// StartsWith/EndsWith/Contains compile to LIKE when the needle is a
/// non-empty string literal (after escaping its wildcards) and to InStr
/// position arithmetic otherwise.
fn pattern_match(
    g: &mut Generator,
    function: &CanonicalFunction,
    args: &[Expr],
) -> Result<SqlFragment, SqlGenError> {
    let (haystack, needle) = args2(function, args)?;

    if let Expr::Constant(Literal::String(text)) = needle {
        if !text.is_empty() {
            let (escaped, _) = dialect::escape_like_pattern(text);
            let pattern = match function {
                CanonicalFunction::StartsWith => format!("{escaped}%"),
                CanonicalFunction::EndsWith => format!("%{escaped}"),
                _ => format!("%{escaped}%"),
            };
            let mut b = SqlBuilder::new();
            b.push(g.visit_expr(haystack)?);
            b.push_str(" LIKE ");
            b.push_str(&dialect::quote_string(&pattern));
            return Ok(SqlFragment::Builder(b));
        }
    }

    let mut b = SqlBuilder::new();
    match function {
        // STARTSWITH(s, find) => InStr(1, s, find) = 1
        CanonicalFunction::StartsWith => {
            b.push_str("InStr(1, ");
            b.push(g.visit_expr(haystack)?);
            b.push_str(", ");
            b.push(g.visit_expr(needle)?);
            b.push_str(") = 1");
        }
        // ENDSWITH(s, find) => InStr(1, StrReverse(s), StrReverse(find)) = 1
        CanonicalFunction::EndsWith => {
            b.push_str("InStr(1, StrReverse(");
            b.push(g.visit_expr(haystack)?);
            b.push_str("), StrReverse(");
            b.push(g.visit_expr(needle)?);
            b.push_str(")) = 1");
        }
        // CONTAINS(s, find) => InStr(s, find) > 0
        _ => {
            b.push_str("InStr(");
            b.push(g.visit_expr(haystack)?);
            b.push_str(", ");
            b.push(g.visit_expr(needle)?);
            b.push_str(") > 0");
        }
    }
    Ok(SqlFragment::Builder(b))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::generate::{generate, SqlGenError};
    use crate::tree::{CanonicalFunction, Command, Expr, PrimitiveType};

    fn call(function: CanonicalFunction, args: Vec<Expr>) -> Expr {
        Expr::Function { function, args }
    }

    fn param(name: &str) -> Expr {
        Expr::Parameter { name: name.to_string(), ty: PrimitiveType::DateTime }
    }

    fn sql(e: Expr) -> String {
        generate(&Command::Query(e)).unwrap().text
    }

    fn err(e: Expr) -> SqlGenError {
        generate(&Command::Query(e)).unwrap_err()
    }

    #[test]
    fn string_functions_use_the_vba_names() {
        use CanonicalFunction::*;
        assert_eq!(sql(call(Length, vec!["abc".into()])), "SELECT Len('abc')");
        assert_eq!(sql(call(ToUpper, vec!["abc".into()])), "SELECT UCase('abc')");
        assert_eq!(sql(call(ToLower, vec!["ABC".into()])), "SELECT LCase('ABC')");
        assert_eq!(sql(call(Reverse, vec!["abc".into()])), "SELECT StrReverse('abc')");
        assert_eq!(
            sql(call(Substring, vec!["abcdef".into(), 2.into(), 3.into()])),
            "SELECT Mid('abcdef', 2, 3)"
        );
    }

    #[test]
    fn index_of_swaps_its_arguments() {
        let e = call(CanonicalFunction::IndexOf, vec!["b".into(), "abc".into()]);
        assert_eq!(sql(e), "SELECT InStr(1, 'abc', 'b')");
    }

    #[test]
    fn literal_needles_become_like_patterns() {
        use CanonicalFunction::*;
        let starts = call(StartsWith, vec![param("s"), "ab".into()]);
        assert_eq!(sql(starts), "SELECT @s LIKE 'ab%'");
        let ends = call(EndsWith, vec![param("s"), "ab".into()]);
        assert_eq!(sql(ends), "SELECT @s LIKE '%ab'");
        let contains = call(Contains, vec![param("s"), "ab".into()]);
        assert_eq!(sql(contains), "SELECT @s LIKE '%ab%'");
    }

    #[test]
    fn needle_wildcards_are_escaped_in_like_patterns() {
        let e = call(CanonicalFunction::Contains, vec![param("s"), "50%_off".into()]);
        assert_eq!(sql(e), "SELECT @s LIKE '%50[%][_]off%'");
    }

    #[test]
    fn dynamic_needles_fall_back_to_instr() {
        use CanonicalFunction::*;
        let starts = call(StartsWith, vec![param("s"), param("find")]);
        assert_eq!(sql(starts), "SELECT InStr(1, @s, @find) = 1");
        let contains = call(Contains, vec![param("s"), param("find")]);
        assert_eq!(sql(contains), "SELECT InStr(@s, @find) > 0");
        let ends = call(EndsWith, vec![param("s"), param("find")]);
        assert_eq!(sql(ends), "SELECT InStr(1, StrReverse(@s), StrReverse(@find)) = 1");
        // an empty literal has nothing to escape either
        let empty = call(Contains, vec![param("s"), "".into()]);
        assert_eq!(sql(empty), "SELECT InStr(@s, '') > 0");
    }

    #[test]
    fn rounding_family() {
        use CanonicalFunction::*;
        assert_eq!(sql(call(Floor, vec![1.5.into()])), "SELECT Int(1.5)");
        assert_eq!(sql(call(Ceiling, vec![1.5.into()])), "SELECT (-Int(-(1.5)))");
        assert_eq!(sql(call(Round, vec![1.5.into()])), "SELECT Round(1.5)");
        assert_eq!(sql(call(Round, vec![1.55.into(), 1.into()])), "SELECT Round(1.55, 1)");
        assert_eq!(sql(call(Truncate, vec![1.5.into(), 0.into()])), "SELECT Fix(1.5)");
        assert_eq!(
            err(call(Truncate, vec![1.5.into(), 2.into()])),
            SqlGenError::NotSupportedByJet("Truncate at a nonzero scale")
        );
    }

    #[test]
    fn concat_power_and_bitwise_are_infix() {
        use CanonicalFunction::*;
        assert_eq!(sql(call(Concat, vec!["a".into(), "b".into()])), "SELECT ('a' & 'b')");
        assert_eq!(sql(call(Power, vec![2.into(), 10.into()])), "SELECT (2 ^ 10)");
        assert_eq!(sql(call(BitwiseAnd, vec![6.into(), 3.into()])), "SELECT (6 BAND 3)");
        assert_eq!(sql(call(BitwiseOr, vec![6.into(), 3.into()])), "SELECT (6 BOR 3)");
        assert_eq!(sql(call(BitwiseXor, vec![6.into(), 3.into()])), "SELECT (6 BXOR 3)");
        assert_eq!(sql(call(BitwiseNot, vec![6.into()])), "SELECT (BNOT 6)");
    }

    #[test]
    fn date_parts_use_date_part_keywords() {
        use CanonicalFunction::*;
        assert_eq!(sql(call(Year, vec![param("d")])), "SELECT DatePart('yyyy', @d)");
        assert_eq!(sql(call(Minute, vec![param("d")])), "SELECT DatePart('n', @d)");
        assert_eq!(sql(call(DayOfYear, vec![param("d")])), "SELECT DatePart('y', @d)");
    }

    #[test]
    fn date_arithmetic_uses_date_add_and_date_diff() {
        use CanonicalFunction::*;
        assert_eq!(
            sql(call(AddDays, vec![param("d"), 3.into()])),
            "SELECT DateAdd('d', 3, @d)"
        );
        assert_eq!(
            sql(call(DiffHours, vec![param("a"), param("b")])),
            "SELECT DateDiff('h', @a, @b)"
        );
        assert_eq!(
            sql(call(CreateTime, vec![12.into(), 30.into(), 0.into()])),
            "SELECT TimeSerial(12, 30, 0)"
        );
        assert_eq!(
            sql(call(CreateDateTime, vec![
                2024.into(), 5.into(), 17.into(), 12.into(), 30.into(), 0.into(),
            ])),
            "SELECT (DateSerial(2024, 5, 17) + TimeSerial(12, 30, 0))"
        );
        assert_eq!(sql(call(TruncateTime, vec![param("d")])), "SELECT DateValue(@d)");
        assert_eq!(sql(call(CurrentDateTime, vec![])), "SELECT Now()");
        assert_eq!(sql(call(NewGuid, vec![])), "SELECT GenGUID()");
    }

    #[test]
    fn capability_gaps_error_out() {
        use CanonicalFunction::*;
        assert_eq!(
            err(call(Millisecond, vec![param("d")])),
            SqlGenError::NotSupportedByJet("millisecond precision")
        );
        assert_eq!(
            err(call(AddMilliseconds, vec![param("d"), 5.into()])),
            SqlGenError::NotSupportedByJet("millisecond precision")
        );
        assert_eq!(
            err(call(CurrentUtcDateTime, vec![])),
            SqlGenError::NotSupportedByJet("UTC timestamps")
        );
        assert_eq!(
            err(call(Unknown("Soundex".to_string()), vec!["x".into()])),
            SqlGenError::UnsupportedFunction("Soundex".to_string())
        );
    }

    #[test]
    fn arity_is_checked_before_emitting() {
        assert_eq!(
            err(call(CanonicalFunction::Length, vec!["a".into(), "b".into()])),
            SqlGenError::WrongArgumentCount { function: "Length".to_string(), got: 2 }
        );
        assert_eq!(
            err(call(CanonicalFunction::Round, vec![])),
            SqlGenError::WrongArgumentCount { function: "Round".to_string(), got: 0 }
        );
    }
}
