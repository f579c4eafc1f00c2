//! Minimal `${name}` template substitution for alert titles, messages, and
//! workflow input templates.
//!
//! The grammar is deliberately small: `${name}` is replaced with the string
//! form of the context value at `name` (absent keys render empty), `$$`
//! escapes a literal `$`, and any other `$` passes through unchanged. An
//! unterminated `${` is an error; callers decide whether to fall back to
//! the raw template (alert titles) or fail closed (workflow input).

use serde_json::{Map, Value};

use orchestrix_common::{Error, Result};

/// Renders a template against the context map.
pub fn render(template: &str, context: &Map<String, Value>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                out.push('$');
            }
            Some('{') => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    return Err(Error::Template(format!(
                        "unterminated placeholder '${{{name}'"
                    )));
                }
                if let Some(value) = context.get(name.trim()) {
                    out.push_str(&value_to_string(value));
                }
            }
            _ => out.push('$'),
        }
    }

    Ok(out)
}

/// Renders every string leaf of a JSON value; non-string leaves pass
/// through unchanged. Errors propagate (workflow input fails closed).
pub fn render_value(value: &Value, context: &Map<String, Value>) -> Result<Value> {
    match value {
        Value::String(s) => Ok(Value::String(render(s, context)?)),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), render_value(v, context)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .iter()
            .map(|v| render_value(v, context))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

/// String form of a context value. Whole numbers print without a trailing
/// `.0` so `${value}` reads naturally in alert titles.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
                    return format!("{}", f as i64);
                }
            }
            n.to_string()
        }
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
