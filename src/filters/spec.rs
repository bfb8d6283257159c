//! Tokenising filter specification strings.
//!
//! `"enhance_text, sharpen(kernel=3), bilateral_filt(d=9, sigmaColor=50)"`
//! becomes three [`FilterStep`]s. Commas only split at parenthesis depth 0
//! and outside quotes, so parameter lists may hold several entries.

use super::literal::Literal;
use crate::error::OptimizerError;

/// One `name` or `name(key=value, ...)` entry, not yet type-checked.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterStep {
    pub name: String,
    pub params: Vec<(String, Literal)>,
}

/// Split a specification into steps, in textual order.
///
/// Blank entries (`"a,,b"`, trailing commas, an empty string) are dropped.
pub fn parse_steps(spec: &str) -> Result<Vec<FilterStep>, OptimizerError> {
    let invalid = |reason: String| OptimizerError::InvalidFilterSpec {
        spec: spec.to_string(),
        reason,
    };

    split_top_level(spec)
        .map_err(invalid)?
        .into_iter()
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| parse_step(token).map_err(invalid))
        .collect()
}

fn parse_step(token: &str) -> Result<FilterStep, String> {
    let Some((name, rest)) = token.split_once('(') else {
        check_identifier(token, "filter name")?;
        return Ok(FilterStep {
            name: token.to_string(),
            params: Vec::new(),
        });
    };

    let name = name.trim();
    check_identifier(name, "filter name")?;

    let inner = rest
        .trim_end()
        .strip_suffix(')')
        .ok_or_else(|| format!("`{token}` is missing its closing parenthesis"))?;

    let mut params: Vec<(String, Literal)> = Vec::new();
    for entry in split_top_level(inner)? {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| format!("`{entry}` in `{name}` is not key=value"))?;
        let key = key.trim();
        check_identifier(key, "parameter name")?;
        if params.iter().any(|(k, _)| k == key) {
            return Err(format!("`{key}` given twice for `{name}`"));
        }
        let value = Literal::parse(value).map_err(|e| format!("{name}({key}=…): {e}"))?;
        params.push((key.to_string(), value));
    }

    Ok(FilterStep {
        name: name.to_string(),
        params,
    })
}

fn check_identifier(s: &str, what: &str) -> Result<(), String> {
    let valid = !s.is_empty()
        && !s.starts_with(|c: char| c.is_ascii_digit())
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(format!("`{s}` is not a valid {what}"))
    }
}

/// Split on commas that sit outside parentheses and quotes.
fn split_top_level(s: &str) -> Result<Vec<&str>, String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                _ if c == q => quote = None,
                _ => {}
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| format!("unbalanced `)` at offset {i}"))?;
            }
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if quote.is_some() {
        return Err("unterminated string".into());
    }
    if depth != 0 {
        return Err("unbalanced `(`".into());
    }
    parts.push(&s[start..]);
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(spec: &str) -> Vec<String> {
        parse_steps(spec)
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect()
    }

    #[test]
    fn plain_names_in_order() {
        assert_eq!(
            names("enhance_text, median_filt ,sharpen"),
            vec!["enhance_text", "median_filt", "sharpen"]
        );
    }

    #[test]
    fn blank_entries_are_dropped() {
        assert!(parse_steps("").unwrap().is_empty());
        assert!(parse_steps("  ,  , ").unwrap().is_empty());
        assert_eq!(names("sharpen,,conv_filt,"), vec!["sharpen", "conv_filt"]);
    }

    #[test]
    fn multi_parameter_lists_stay_together() {
        let steps = parse_steps("bilateral_filt(d=5, sigmaColor=40, sigmaSpace=30.5), sharpen").unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(
            steps[0].params,
            vec![
                ("d".to_string(), Literal::Int(5)),
                ("sigmaColor".to_string(), Literal::Int(40)),
                ("sigmaSpace".to_string(), Literal::Float(30.5)),
            ]
        );
        assert_eq!(steps[1].name, "sharpen");
    }

    #[test]
    fn commas_inside_strings_do_not_split() {
        let steps = parse_steps("x(label='a, b'), y").unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].params[0].1, Literal::Str("a, b".into()));
    }

    #[test]
    fn empty_parentheses_mean_defaults() {
        let steps = parse_steps("sharpen()").unwrap();
        assert_eq!(steps[0].name, "sharpen");
        assert!(steps[0].params.is_empty());
    }

    #[test]
    fn malformed_specs_are_rejected() {
        for spec in [
            "sharpen(kernel=3",
            "sharpen kernel=3)",
            "sharpen(kernel)",
            "sharpen(kernel=3, kernel=4)",
            "sharpen(kernel=1+2)",
            "(kernel=3)",
            "sharp en",
        ] {
            let err = parse_steps(spec).unwrap_err();
            assert!(
                matches!(err, OptimizerError::InvalidFilterSpec { .. }),
                "{spec:?} gave {err:?}"
            );
        }
    }
}
