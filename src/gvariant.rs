/// Parser for the textual GVariant replies printed by `gdbus call`
///
/// Only the shapes the host and the veto service return are understood:
/// tuples of booleans, integers and strings, and arrays of such tuples.
/// Anything else is kept verbatim as `Value::Other`.
///
/// Examples:
/// - `(true,)`
/// - `(250, 'ready for shutdown', 0, '')`
/// - `([(0, 1, true, true, 'softhddevice')],)`
use crate::error::{ArbiterError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
    Other(String),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Type annotations gdbus puts in front of non-default integer types
const TYPE_PREFIXES: &[&str] = &[
    "byte ", "int16 ", "uint16 ", "int32 ", "uint32 ", "int64 ", "uint64 ", "handle ",
    "objectpath ", "signature ",
];

/// Parse a top-level tuple into its elements
pub fn parse_tuple(text: &str) -> Result<Vec<Value>> {
    let inner = strip_delimiters(text.trim(), '(', ')')?;
    split_top_level(inner)?
        .into_iter()
        .map(|item| Ok(parse_value(item)))
        .collect()
}

/// Parse an array of tuples such as the device list
pub fn parse_tuple_array(text: &str) -> Result<Vec<Vec<Value>>> {
    let inner = strip_delimiters(text.trim(), '[', ']')?;
    split_top_level(inner)?
        .into_iter()
        .map(parse_tuple)
        .collect()
}

fn strip_delimiters(text: &str, open: char, close: char) -> Result<&str> {
    text.strip_prefix(open)
        .and_then(|rest| rest.strip_suffix(close))
        .ok_or_else(|| ArbiterError::Parse(format!("expected {}...{} in {:?}", open, close, text)))
}

/// Split on commas that are not nested in brackets or quoted strings
fn split_top_level(text: &str) -> Result<Vec<&str>> {
    let mut items = Vec::new();
    let mut depth: i32 = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (pos, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' | '<' => depth += 1,
            ')' | ']' | '}' | '>' => {
                depth -= 1;
                if depth < 0 {
                    return Err(ArbiterError::Parse(format!("unbalanced {:?}", text)));
                }
            }
            ',' if depth == 0 => {
                items.push(text[start..pos].trim());
                start = pos + 1;
            }
            _ => {}
        }
    }

    if quote.is_some() || depth != 0 {
        return Err(ArbiterError::Parse(format!("unterminated {:?}", text)));
    }

    let last = text[start..].trim();
    if !last.is_empty() {
        items.push(last);
    }
    Ok(items)
}

fn parse_value(item: &str) -> Value {
    let mut text = item.trim();
    for prefix in TYPE_PREFIXES {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest.trim();
            break;
        }
    }

    match text {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if let Ok(i) = text.parse::<i64>() {
        return Value::Int(i);
    }
    if let Some(hex) = text.strip_prefix("0x") {
        if let Ok(i) = i64::from_str_radix(hex, 16) {
            return Value::Int(i);
        }
    }

    for q in ['\'', '"'] {
        if text.len() >= 2 && text.starts_with(q) && text.ends_with(q) {
            return Value::Str(unescape(&text[1..text.len() - 1]));
        }
    }

    Value::Other(text.to_string())
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Quote a string as a GVariant text literal for `gdbus call` arguments
pub fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}
