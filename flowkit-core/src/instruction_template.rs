use crate::state::render_value;
use crate::{FlowError, Result, StateView};
use regex::Regex;
use std::sync::OnceLock;

/// Matches template placeholders like {variable} or {variable?}.
/// Matches {+[^{}]*}+ to handle nested braces.
static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();

fn placeholder_regex() -> &'static Regex {
    PLACEHOLDER_REGEX
        .get_or_init(|| Regex::new(r"\{+[^{}]*\}+").expect("placeholder pattern is valid"))
}

/// Checks if a string is a valid identifier: a letter or underscore followed
/// by letters, digits, or underscores.
fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Supports prefixes: app:, user:, temp:
fn is_valid_state_name(var_name: &str) -> bool {
    match var_name.split_once(':') {
        None => is_identifier(var_name),
        Some((prefix, rest)) => {
            matches!(prefix, "app" | "user" | "temp") && is_identifier(rest)
        }
    }
}

/// Parses a placeholder into `(name, optional)`. `None` means the text is
/// not a state reference and stays literal.
fn parse_placeholder(match_str: &str) -> Option<(&str, bool)> {
    let inner = match_str.trim_matches(|c| c == '{' || c == '}').trim();
    let (name, optional) = match inner.strip_suffix('?') {
        Some(name) => (name, true),
        None => (inner, false),
    };
    is_valid_state_name(name).then_some((name, optional))
}

/// State keys referenced by `template`, split into required and optional.
pub fn template_keys(template: &str) -> (Vec<String>, Vec<String>) {
    let mut required = Vec::new();
    let mut optional = Vec::new();
    for found in placeholder_regex().find_iter(template) {
        if let Some((name, is_optional)) = parse_placeholder(found.as_str()) {
            let bucket = if is_optional { &mut optional } else { &mut required };
            if !bucket.iter().any(|k| k == name) {
                bucket.push(name.to_string());
            }
        }
    }
    optional.retain(|key| !required.contains(key));
    (required, optional)
}

/// Replaces `{key}` and `{key?}` placeholders with values from `view`.
///
/// Strings are inserted verbatim, other values as JSON. A missing `{key?}`
/// becomes the empty string.
///
/// # Errors
///
/// Returns [`FlowError::Template`] if a required key is absent from the view.
pub fn inject_state(template: &str, view: &StateView) -> Result<String> {
    let mut result = String::with_capacity(template.len());
    let mut last_end = 0;

    for found in placeholder_regex().find_iter(template) {
        let range = found.range();
        result.push_str(&template[last_end..range.start]);

        match parse_placeholder(found.as_str()) {
            Some((name, optional)) => match view.get(name) {
                Some(value) => result.push_str(&render_value(value)),
                None if optional => {}
                None => {
                    return Err(FlowError::Template(format!(
                        "State variable '{name}' not found"
                    )));
                }
            },
            None => result.push_str(found.as_str()),
        }

        last_end = range.end;
    }

    result.push_str(&template[last_end..]);
    Ok(result)
}
