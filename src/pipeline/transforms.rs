// ABOUTME: Registry of named row transforms plus the built-in transform set
// ABOUTME: A transform maps one row to zero or more rows; zero rows drops the event

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::value::{FieldValue, Row, META_FIELDS};

/// Arguments configured for a stage.
pub type StageArgs = Map<String, Value>;

/// A named stage function.
pub type TransformFn =
    Arc<dyn Fn(&Row, &StageArgs) -> Result<Vec<Row>, TransformError> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("missing argument '{0}'")]
    MissingArgument(&'static str),
    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument { name: &'static str, reason: String },
    #[error("{0}")]
    Failed(String),
}

/// Stage name to function mapping, resolved once when the engine is built.
#[derive(Clone, Default)]
pub struct TransformRegistry {
    functions: HashMap<String, TransformFn>,
}

impl TransformRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in transforms.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register("pass", pass)
            .register("rename", rename)
            .register("retain", retain)
            .register("remove", remove)
            .register("set", set)
            .register("replace", replace)
            .register("filter", filter)
            .register("split", split)
            .register("concat", concat)
            .register("copy", copy);
        registry
    }

    /// Register (or replace) a transform under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, function: F) -> &mut Self
    where
        F: Fn(&Row, &StageArgs) -> Result<Vec<Row>, TransformError> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    pub fn get(&self, name: &str) -> Option<TransformFn> {
        self.functions.get(name).cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

/// Identity.
fn pass(row: &Row, _args: &StageArgs) -> Result<Vec<Row>, TransformError> {
    Ok(vec![row.clone()])
}

/// `{"fields": {"old": "new"}}`
fn rename(row: &Row, args: &StageArgs) -> Result<Vec<Row>, TransformError> {
    let fields = object_arg(args, "fields")?;
    let mut out = row.clone();
    for (from, to) in fields {
        let to = to.as_str().ok_or_else(|| TransformError::InvalidArgument {
            name: "fields",
            reason: format!("target name for '{}' must be a string", from),
        })?;
        if let Some(value) = out.remove(from) {
            out.insert(to.to_string(), value);
        }
    }
    Ok(vec![out])
}

/// `{"fields": ["a", "b"]}` keeps only the listed fields (metadata is kept).
fn retain(row: &Row, args: &StageArgs) -> Result<Vec<Row>, TransformError> {
    let fields = str_list_arg(args, "fields")?;
    let out = row
        .iter()
        .filter(|(k, _)| fields.contains(&k.as_str()) || META_FIELDS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Ok(vec![out])
}

/// `{"fields": ["a", "b"]}`
fn remove(row: &Row, args: &StageArgs) -> Result<Vec<Row>, TransformError> {
    let fields = str_list_arg(args, "fields")?;
    let mut out = row.clone();
    for field in fields {
        out.remove(field);
    }
    Ok(vec![out])
}

/// `{"values": {"field": <scalar>}}`
fn set(row: &Row, args: &StageArgs) -> Result<Vec<Row>, TransformError> {
    let values = object_arg(args, "values")?;
    let mut out = row.clone();
    for (field, value) in values {
        out.insert(field.clone(), scalar("values", value)?);
    }
    Ok(vec![out])
}

/// `{"field": "status", "values": {"0": "off", "1": "on"}, "default": "unknown"}`
///
/// Values are matched on their text form. Without `default`, unmatched
/// values are left as they are.
fn replace(row: &Row, args: &StageArgs) -> Result<Vec<Row>, TransformError> {
    let field = str_arg(args, "field")?;
    let values = object_arg(args, "values")?;
    let default = match args.get("default") {
        Some(value) => Some(scalar("default", value)?),
        None => None,
    };

    let mut out = row.clone();
    if let Some(current) = out.get(field) {
        let key = current.to_string();
        let replacement = match values.get(&key) {
            Some(value) => Some(scalar("values", value)?),
            None => default,
        };
        if let Some(replacement) = replacement {
            out.insert(field.to_string(), replacement);
        }
    }
    Ok(vec![out])
}

/// Keeps the row only when the field matches:
/// `{"field": "f", "equals": v}`, `{"field": "f", "not_equals": v}` or
/// `{"field": "f", "in": [v, ...]}`. A missing field compares as empty.
fn filter(row: &Row, args: &StageArgs) -> Result<Vec<Row>, TransformError> {
    let field = str_arg(args, "field")?;
    let actual = row.get(field).map(|v| v.to_string()).unwrap_or_default();

    let keep = if let Some(expected) = args.get("equals") {
        actual == scalar("equals", expected)?.to_string()
    } else if let Some(expected) = args.get("not_equals") {
        actual != scalar("not_equals", expected)?.to_string()
    } else if let Some(candidates) = args.get("in") {
        let candidates = candidates
            .as_array()
            .ok_or_else(|| TransformError::InvalidArgument {
                name: "in",
                reason: "expected an array".to_string(),
            })?;
        let mut found = false;
        for candidate in candidates {
            if actual == scalar("in", candidate)?.to_string() {
                found = true;
                break;
            }
        }
        found
    } else {
        return Err(TransformError::MissingArgument("equals"));
    };

    Ok(if keep { vec![row.clone()] } else { Vec::new() })
}

/// `{"field": "tags", "separator": ","}` emits one row per non-empty piece.
fn split(row: &Row, args: &StageArgs) -> Result<Vec<Row>, TransformError> {
    let field = str_arg(args, "field")?;
    let separator = opt_str_arg(args, "separator")?.unwrap_or(",");
    if separator.is_empty() {
        return Err(TransformError::InvalidArgument {
            name: "separator",
            reason: "must not be empty".to_string(),
        });
    }

    let Some(value) = row.get(field) else {
        return Ok(vec![row.clone()]);
    };

    let text = value.to_string();
    Ok(text
        .split(separator)
        .filter(|piece| !piece.is_empty())
        .map(|piece| {
            let mut out = row.clone();
            out.insert(field.to_string(), FieldValue::from(piece));
            out
        })
        .collect())
}

/// `{"fields": ["a", "b"], "separator": "_", "to": "id"}`
fn concat(row: &Row, args: &StageArgs) -> Result<Vec<Row>, TransformError> {
    let fields = str_list_arg(args, "fields")?;
    let separator = opt_str_arg(args, "separator")?.unwrap_or("");
    let to = str_arg(args, "to")?;

    let mut parts = Vec::with_capacity(fields.len());
    for field in fields {
        let value = row
            .get(field)
            .ok_or_else(|| TransformError::Failed(format!("field '{}' is missing", field)))?;
        parts.push(value.to_string());
    }

    let mut out = row.clone();
    out.insert(to.to_string(), FieldValue::String(parts.join(separator)));
    Ok(vec![out])
}

/// `{"from": "uid", "to": "id"}`
fn copy(row: &Row, args: &StageArgs) -> Result<Vec<Row>, TransformError> {
    let from = str_arg(args, "from")?;
    let to = str_arg(args, "to")?;
    let value = row
        .get(from)
        .cloned()
        .ok_or_else(|| TransformError::Failed(format!("field '{}' is missing", from)))?;

    let mut out = row.clone();
    out.insert(to.to_string(), value);
    Ok(vec![out])
}

fn str_arg<'a>(args: &'a StageArgs, name: &'static str) -> Result<&'a str, TransformError> {
    opt_str_arg(args, name)?.ok_or(TransformError::MissingArgument(name))
}

fn opt_str_arg<'a>(
    args: &'a StageArgs,
    name: &'static str,
) -> Result<Option<&'a str>, TransformError> {
    match args.get(name) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(TransformError::InvalidArgument {
            name,
            reason: "expected a string".to_string(),
        }),
    }
}

fn str_list_arg<'a>(
    args: &'a StageArgs,
    name: &'static str,
) -> Result<Vec<&'a str>, TransformError> {
    let items = args
        .get(name)
        .ok_or(TransformError::MissingArgument(name))?
        .as_array()
        .ok_or_else(|| TransformError::InvalidArgument {
            name,
            reason: "expected an array of strings".to_string(),
        })?;
    items
        .iter()
        .map(|item| {
            item.as_str().ok_or_else(|| TransformError::InvalidArgument {
                name,
                reason: "expected an array of strings".to_string(),
            })
        })
        .collect()
}

fn object_arg<'a>(
    args: &'a StageArgs,
    name: &'static str,
) -> Result<&'a Map<String, Value>, TransformError> {
    args.get(name)
        .ok_or(TransformError::MissingArgument(name))?
        .as_object()
        .ok_or_else(|| TransformError::InvalidArgument {
            name,
            reason: "expected an object".to_string(),
        })
}

fn scalar(name: &'static str, value: &Value) -> Result<FieldValue, TransformError> {
    FieldValue::from_json(value).ok_or_else(|| TransformError::InvalidArgument {
        name,
        reason: format!("expected a scalar, got {}", value),
    })
}
