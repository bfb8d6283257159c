//! Strict literal values for filter parameters.
//!
//! Only numbers, quoted strings and booleans are accepted. Nothing is
//! evaluated, so a specification string from an untrusted source can at
//! worst produce a parse error.

use std::fmt;

/// A parameter value as written in a filter specification.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl Literal {
    /// Parse a single literal. Surrounding whitespace is ignored.
    ///
    /// ```
    /// use pdf_optimizer::filters::Literal;
    ///
    /// assert_eq!(Literal::parse("3").unwrap(), Literal::Int(3));
    /// assert_eq!(Literal::parse(" 2.5 ").unwrap(), Literal::Float(2.5));
    /// assert_eq!(Literal::parse("'x'").unwrap(), Literal::Str("x".into()));
    /// assert!(Literal::parse("__import__('os')").is_err());
    /// ```
    pub fn parse(src: &str) -> Result<Self, String> {
        let s = src.trim();
        match s {
            "" => return Err("missing value".into()),
            "true" | "True" => return Ok(Literal::Bool(true)),
            "false" | "False" => return Ok(Literal::Bool(false)),
            _ => {}
        }

        if s.starts_with('\'') || s.starts_with('"') {
            return parse_quoted(s);
        }

        if let Ok(i) = s.parse::<i64>() {
            return Ok(Literal::Int(i));
        }

        // f64::from_str also takes "inf" and "NaN"; a literal may not.
        let numeric = s
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'));
        if numeric {
            if let Ok(f) = s.parse::<f64>() {
                if f.is_finite() {
                    return Ok(Literal::Float(f));
                }
            }
        }

        Err(format!(
            "`{s}` is not a number, quoted string or boolean"
        ))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Int(_) => "integer",
            Literal::Float(_) => "float",
            Literal::Str(_) => "string",
            Literal::Bool(_) => "boolean",
        }
    }

    /// Numeric view; integers widen to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Literal::Int(i) => Some(i as f64),
            Literal::Float(f) => Some(f),
            _ => None,
        }
    }

    /// Integer view; floats with no fractional part narrow to integers.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Literal::Int(i) => Some(i),
            Literal::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(f as i64),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Float(v) if v.fract() == 0.0 => write!(f, "{v:.1}"),
            Literal::Float(v) => write!(f, "{v}"),
            Literal::Str(s) => write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Literal::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
        }
    }
}

fn parse_quoted(s: &str) -> Result<Literal, String> {
    let mut chars = s.chars();
    let quote = chars.next().unwrap_or('\'');
    let mut out = String::new();

    loop {
        match chars.next() {
            None => return Err(format!("unterminated string {s}")),
            Some('\\') => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(c @ ('\\' | '\'' | '"')) => out.push(c),
                Some(c) => {
                    out.push('\\');
                    out.push(c);
                }
                None => return Err(format!("unterminated string {s}")),
            },
            Some(c) if c == quote => break,
            Some(c) => out.push(c),
        }
    }

    let rest = chars.as_str().trim();
    if !rest.is_empty() {
        return Err(format!("unexpected `{rest}` after string"));
    }
    Ok(Literal::Str(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers() {
        assert_eq!(Literal::parse("5").unwrap(), Literal::Int(5));
        assert_eq!(Literal::parse("-3").unwrap(), Literal::Int(-3));
        assert_eq!(Literal::parse("+7").unwrap(), Literal::Int(7));
        assert_eq!(Literal::parse("2.0").unwrap(), Literal::Float(2.0));
        assert_eq!(Literal::parse(".5").unwrap(), Literal::Float(0.5));
        assert_eq!(Literal::parse("1e2").unwrap(), Literal::Float(100.0));
    }

    #[test]
    fn booleans_in_both_spellings() {
        assert_eq!(Literal::parse("True").unwrap(), Literal::Bool(true));
        assert_eq!(Literal::parse("false").unwrap(), Literal::Bool(false));
    }

    #[test]
    fn quoted_strings_and_escapes() {
        assert_eq!(Literal::parse("\"abc\"").unwrap(), Literal::Str("abc".into()));
        assert_eq!(Literal::parse(r"'it\'s'").unwrap(), Literal::Str("it's".into()));
        assert_eq!(Literal::parse(r"'a,b'").unwrap(), Literal::Str("a,b".into()));
        assert!(Literal::parse("'open").is_err());
        assert!(Literal::parse("'a' + 'b'").is_err());
    }

    #[test]
    fn expressions_are_rejected() {
        for src in ["1+1", "inf", "nan", "os.system('ls')", "[1, 2]", "", "   "] {
            assert!(Literal::parse(src).is_err(), "{src:?} should be rejected");
        }
    }

    #[test]
    fn coercions() {
        assert_eq!(Literal::Float(3.0).as_i64(), Some(3));
        assert_eq!(Literal::Float(3.5).as_i64(), None);
        assert_eq!(Literal::Int(4).as_f64(), Some(4.0));
        assert_eq!(Literal::Bool(true).as_f64(), None);
        assert_eq!(Literal::Str("1".into()).as_i64(), None);
    }

    #[test]
    fn display_is_reparseable() {
        for lit in [
            Literal::Int(9),
            Literal::Float(2.0),
            Literal::Float(0.25),
            Literal::Str("it's".into()),
            Literal::Bool(false),
        ] {
            assert_eq!(Literal::parse(&lit.to_string()).unwrap(), lit);
        }
    }
}
