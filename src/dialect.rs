//! Dialect facts: identifier quoting, literal rendering, LIKE escaping,
//! store type names, and the tables that map canonical functions onto the
//! operators and date-part keywords the engine actually has.

use chrono::{NaiveDateTime, NaiveTime};

use crate::tree::{CanonicalFunction, Column, Literal, PrimitiveType};

/// The engine caps identifiers at 64 characters.
pub const MAX_IDENTIFIER_LENGTH: usize = 64;

const NAME_HASH_LENGTH: usize = 8;

/// Quotes an identifier in brackets, doubling any closing bracket inside it.
/// Names longer than the engine limit are truncated and suffixed with a hash
/// of the full name so distinct long names stay distinct.
pub fn quote_identifier(name: &str) -> String {
    let name = shorten_name(name);
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('[');
    for c in name.chars() {
        if c == ']' {
            quoted.push(']');
        }
        quoted.push(c);
    }
    quoted.push(']');
    quoted
}

fn shorten_name(name: &str) -> String {
    if name.chars().count() <= MAX_IDENTIFIER_LENGTH {
        return name.to_string();
    }
    let digest = format!("{:x}", md5::compute(name.as_bytes()));
    let mut short: String = name
        .chars()
        .take(MAX_IDENTIFIER_LENGTH - NAME_HASH_LENGTH)
        .collect();
    short.push_str(&digest[..NAME_HASH_LENGTH]);
    short
}

/// Renders a string literal with doubled single quotes.
pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push('\'');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Renders a constant in the dialect's literal syntax.  Dates use the
/// `#..#` delimiters, booleans the TRUE/FALSE keywords, binary a `0x`
/// hex string and guids the brace form the OLE layer expects.
pub fn write_literal(lit: &Literal) -> String {
    match lit {
        Literal::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Literal::Byte(v) => v.to_string(),
        Literal::Int16(v) => v.to_string(),
        Literal::Int32(v) => v.to_string(),
        Literal::Int64(v) => v.to_string(),
        Literal::Single(v) => v.to_string(),
        Literal::Double(v) => v.to_string(),
        Literal::Decimal(d) => d.to_string(),
        Literal::String(s) => quote_string(s),
        Literal::DateTime(dt) => write_datetime(dt),
        Literal::Time(t) => write_time(t),
        Literal::Binary(bytes) => write_binary(bytes),
        Literal::Guid(u) => format!("{{guid {{{u}}}}}"),
    }
}

fn write_datetime(dt: &NaiveDateTime) -> String {
    format!("#{}#", dt.format("%m/%d/%Y %H:%M:%S"))
}

fn write_time(t: &NaiveTime) -> String {
    format!("#{}#", t.format("%H:%M:%S"))
}

fn write_binary(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        out.push_str(&format!("{b:02X}"));
    }
    out
}

/// Escapes the pattern metacharacters of a LIKE operand by wrapping each in
/// a single-element character class.  Returns the escaped text and whether
/// anything needed escaping.
pub fn escape_like_pattern(pattern: &str) -> (String, bool) {
    let mut out = String::with_capacity(pattern.len());
    let mut escaped = false;
    for c in pattern.chars() {
        match c {
            '%' | '_' | '[' | '*' | '?' | '#' => {
                out.push('[');
                out.push(c);
                out.push(']');
                escaped = true;
            }
            _ => out.push(c),
        }
    }
    (out, escaped)
}

/// How a cast to a given primitive type is spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastStrategy {
    /// A conversion function plus the zero literal substituted for NULL
    /// arguments, since the conversion functions reject NULL.
    Function(&'static str, &'static str),
    /// String casts concatenate with the empty string, which also maps
    /// NULL to ''.
    Concat,
    Unsupported,
}

pub fn cast_strategy(target: PrimitiveType) -> CastStrategy {
    match target {
        PrimitiveType::Boolean => CastStrategy::Function("CBool", "0"),
        PrimitiveType::Byte => CastStrategy::Function("CByte", "0"),
        PrimitiveType::Int16 => CastStrategy::Function("CInt", "0"),
        PrimitiveType::Int32 => CastStrategy::Function("CLng", "0"),
        // no 64-bit integer type; decimals are the widest exact numeric
        PrimitiveType::Int64 => CastStrategy::Function("CDec", "0"),
        PrimitiveType::Decimal => CastStrategy::Function("CDec", "0"),
        PrimitiveType::Single => CastStrategy::Function("CSng", "0"),
        PrimitiveType::Double => CastStrategy::Function("CDbl", "0"),
        PrimitiveType::DateTime | PrimitiveType::Time => CastStrategy::Function("CDate", "0"),
        PrimitiveType::String => CastStrategy::Concat,
        PrimitiveType::Binary | PrimitiveType::Guid => CastStrategy::Unsupported,
    }
}

/// Functions that compile to infix operators rather than function calls.
pub fn operator(function: &CanonicalFunction) -> Option<&'static str> {
    match function {
        CanonicalFunction::Concat => Some("&"),
        CanonicalFunction::Power => Some("^"),
        CanonicalFunction::BitwiseAnd => Some("BAND"),
        CanonicalFunction::BitwiseOr => Some("BOR"),
        CanonicalFunction::BitwiseXor => Some("BXOR"),
        _ => None,
    }
}

/// Date-part keyword for the extraction functions, `DatePart` style.
pub fn extract_keyword(function: &CanonicalFunction) -> Option<&'static str> {
    match function {
        CanonicalFunction::Year => Some("yyyy"),
        CanonicalFunction::Month => Some("m"),
        CanonicalFunction::Day => Some("d"),
        CanonicalFunction::DayOfYear => Some("y"),
        CanonicalFunction::Hour => Some("h"),
        // 'm' means month here; minutes are 'n'
        CanonicalFunction::Minute => Some("n"),
        CanonicalFunction::Second => Some("s"),
        _ => None,
    }
}

/// Date-part keyword for the `DateAdd` family.
pub fn date_add_keyword(function: &CanonicalFunction) -> Option<&'static str> {
    match function {
        CanonicalFunction::AddYears => Some("yyyy"),
        CanonicalFunction::AddMonths => Some("m"),
        CanonicalFunction::AddDays => Some("d"),
        CanonicalFunction::AddHours => Some("h"),
        CanonicalFunction::AddMinutes => Some("n"),
        CanonicalFunction::AddSeconds => Some("s"),
        _ => None,
    }
}

/// Date-part keyword for the `DateDiff` family.
pub fn date_diff_keyword(function: &CanonicalFunction) -> Option<&'static str> {
    match function {
        CanonicalFunction::DiffYears => Some("yyyy"),
        CanonicalFunction::DiffMonths => Some("m"),
        CanonicalFunction::DiffDays => Some("d"),
        CanonicalFunction::DiffHours => Some("h"),
        CanonicalFunction::DiffMinutes => Some("n"),
        CanonicalFunction::DiffSeconds => Some("s"),
        _ => None,
    }
}

const DEFAULT_TEXT_LENGTH: u32 = 255;
const MAX_TEXT_LENGTH: u32 = 255;
const DEFAULT_BINARY_LENGTH: u32 = 510;
const MAX_BINARY_LENGTH: u32 = 510;
const MAX_DECIMAL_PRECISION: u8 = 28;

/// The store type name for a column, used in parameter descriptors.
/// Text and binary columns flip to their unbounded forms past the inline
/// length limits.
pub fn store_type(ty: PrimitiveType, max_length: Option<u32>, precision: Option<u8>, scale: Option<u8>) -> String {
    match ty {
        PrimitiveType::Boolean => "BIT".to_string(),
        PrimitiveType::Byte => "BYTE".to_string(),
        PrimitiveType::Int16 => "SHORT".to_string(),
        PrimitiveType::Int32 => "LONG".to_string(),
        PrimitiveType::Int64 => "DECIMAL(20, 0)".to_string(),
        PrimitiveType::Single => "SINGLE".to_string(),
        PrimitiveType::Double => "DOUBLE".to_string(),
        PrimitiveType::Decimal => {
            let p = precision.unwrap_or(18).min(MAX_DECIMAL_PRECISION);
            let s = scale.unwrap_or(0).min(p);
            format!("DECIMAL({p}, {s})")
        }
        PrimitiveType::String => {
            let len = max_length.unwrap_or(DEFAULT_TEXT_LENGTH);
            if len > MAX_TEXT_LENGTH {
                "LONGTEXT".to_string()
            } else {
                format!("TEXT({len})")
            }
        }
        PrimitiveType::DateTime | PrimitiveType::Time => "DATETIME".to_string(),
        PrimitiveType::Binary => {
            let len = max_length.unwrap_or(DEFAULT_BINARY_LENGTH);
            if len > MAX_BINARY_LENGTH {
                "LONGBINARY".to_string()
            } else {
                format!("VARBINARY({len})")
            }
        }
        PrimitiveType::Guid => "GUID".to_string(),
    }
}

pub fn store_type_for_column(column: &Column) -> String {
    store_type(column.ty, column.max_length, column.precision, column.scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    #[test]
    fn quoting_doubles_closing_brackets() {
        assert_eq!(quote_identifier("Order Details"), "[Order Details]");
        assert_eq!(quote_identifier("a]b"), "[a]]b]");
    }

    #[test]
    fn long_identifiers_are_truncated_deterministically() {
        let name = "x".repeat(100);
        let first = quote_identifier(&name);
        let second = quote_identifier(&name);
        assert_eq!(first, second);
        // brackets excluded, the payload honours the length cap
        assert_eq!(first.len() - 2, MAX_IDENTIFIER_LENGTH);
        assert!(first.starts_with(&format!("[{}", "x".repeat(56))));
    }

    #[test]
    fn distinct_long_identifiers_stay_distinct() {
        let a = format!("{}{}", "x".repeat(80), "a");
        let b = format!("{}{}", "x".repeat(80), "b");
        assert_ne!(quote_identifier(&a), quote_identifier(&b));
    }

    #[test]
    fn datetime_literals_use_hash_delimiters() {
        let dt = NaiveDate::from_ymd_opt(2009, 3, 5)
            .unwrap()
            .and_hms_opt(13, 45, 30)
            .unwrap();
        assert_eq!(write_literal(&Literal::DateTime(dt)), "#03/05/2009 13:45:30#");
    }

    #[test]
    fn time_literals_drop_the_date() {
        let t = NaiveTime::from_hms_opt(8, 5, 0).unwrap();
        assert_eq!(write_literal(&Literal::Time(t)), "#08:05:00#");
    }

    #[test]
    fn string_literals_double_quotes() {
        assert_eq!(
            write_literal(&Literal::String("O'Brien".to_string())),
            "'O''Brien'"
        );
    }

    #[test]
    fn boolean_and_binary_literals() {
        assert_eq!(write_literal(&Literal::Boolean(true)), "TRUE");
        assert_eq!(write_literal(&Literal::Boolean(false)), "FALSE");
        assert_eq!(write_literal(&Literal::Binary(vec![0xDE, 0xAD, 0x01])), "0xDEAD01");
    }

    #[test]
    fn guid_literals_use_the_brace_form() {
        let u = Uuid::parse_str("0e984725-c51c-4bf4-9960-e1c80e27aba0").unwrap();
        assert_eq!(
            write_literal(&Literal::Guid(u)),
            "{guid {0e984725-c51c-4bf4-9960-e1c80e27aba0}}"
        );
    }

    #[test]
    fn decimal_literals_are_plain() {
        let d = Decimal::new(12345, 2);
        assert_eq!(write_literal(&Literal::Decimal(d)), "123.45");
    }

    #[test]
    fn like_escaping_brackets_every_metacharacter() {
        let (escaped, occurred) = escape_like_pattern("50%_off[*?#]");
        assert_eq!(escaped, "50[%][_]off[[][*][?][#]]");
        assert!(occurred);

        let (plain, occurred) = escape_like_pattern("plain");
        assert_eq!(plain, "plain");
        assert!(!occurred);
    }

    #[test]
    fn text_columns_flip_to_longtext_past_the_inline_limit() {
        assert_eq!(store_type(PrimitiveType::String, Some(50), None, None), "TEXT(50)");
        assert_eq!(store_type(PrimitiveType::String, None, None, None), "TEXT(255)");
        assert_eq!(store_type(PrimitiveType::String, Some(256), None, None), "LONGTEXT");
    }

    #[test]
    fn binary_columns_flip_to_longbinary_past_the_inline_limit() {
        assert_eq!(store_type(PrimitiveType::Binary, Some(8), None, None), "VARBINARY(8)");
        assert_eq!(store_type(PrimitiveType::Binary, None, None, None), "VARBINARY(510)");
        assert_eq!(store_type(PrimitiveType::Binary, Some(1024), None, None), "LONGBINARY");
    }

    #[test]
    fn decimal_precision_is_capped() {
        assert_eq!(
            store_type(PrimitiveType::Decimal, None, Some(38), Some(10)),
            "DECIMAL(28, 10)"
        );
        assert_eq!(store_type(PrimitiveType::Decimal, None, None, None), "DECIMAL(18, 0)");

        let price = Column::new("Price", PrimitiveType::Decimal).with_precision(12, 4);
        assert_eq!(store_type_for_column(&price), "DECIMAL(12, 4)");
    }
}
