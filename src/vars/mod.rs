//! Variable resolution for playrun.
//!
//! - [`Scope`]: the lookup/bind capability every environment implements
//! - [`NestedScope`]: child-over-parent chaining
//! - [`PriorityScope`]: a read-only override table over another scope
//! - [`FutureScope`]: a nested scope that can also bind names to [`Future`]s

pub mod future;
pub mod scope;

pub use future::{Future, FutureScope, FutureState};
pub use scope::{NestedScope, PriorityScope, Scope};

use std::path::Path;

use crate::error::{Error, Result};
use crate::expr::{Value, Vars};

/// Loads a YAML or JSON mapping of variables from a file.
pub fn load_vars_file(path: &Path) -> Result<Vars> {
    let content = std::fs::read_to_string(path)?;
    let json: serde_json::Value = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content)?,
        _ => serde_yaml::from_str(&content)?,
    };
    match Value::from(json) {
        Value::Map(vars) => Ok(vars),
        Value::Nil => Ok(Vars::new()),
        other => Err(Error::playbook_parse(
            path,
            format!("vars file must be a mapping, found {}", other.type_name()),
        )),
    }
}

/// Parses `key=value` override strings, inferring scalar types.
pub fn parse_overrides<I, S>(pairs: I) -> Result<Vars>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut vars = Vars::new();
    for pair in pairs {
        let pair = pair.as_ref();
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| Error::Config(format!("expected key=value, got '{}'", pair)))?;
        vars.insert(key.trim().to_string(), Value::infer(value));
    }
    Ok(vars)
}
