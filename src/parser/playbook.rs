//! YAML shapes of playbook files and their conversion into the
//! [`crate::executor::playbook`] model.
//!
//! A task is a mapping. Reserved keys (`name`, `when`, `with_items`,
//! `notify`, ...) configure it; the single remaining key names the command.
//!
//! ```yaml
//! - name: install {{ item }}
//!   shell: echo {{ item }}      # string value: raw argument text
//!   with_items: [a, b]
//! - name: greet
//!   debug: { msg: hello }       # mapping value: structured vars
//! - include: other.yml          # splices the tasks of another file
//!   vars: { x: 1 }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use serde_yaml::{Mapping, Value as YamlValue};

use crate::executor::task::Task;
use crate::expr::{Value, Vars};

/// Task keys that are not the command
pub const TASK_KEYS: &[&str] = &[
    "name",
    "when",
    "with_items",
    "items",
    "notify",
    "register",
    "future",
    "async",
    "vars",
    "include",
];

/// Helper function to deserialize booleans written as `yes`/`no`, `1`/`0`
/// or `true`/`false`
pub fn deserialize_flexible_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value = JsonValue::deserialize(deserializer)?;
    match &value {
        JsonValue::Bool(b) => Ok(*b),
        JsonValue::String(s) => match s.to_lowercase().as_str() {
            "yes" | "true" | "on" | "1" => Ok(true),
            "no" | "false" | "off" | "0" | "" => Ok(false),
            _ => Err(D::Error::custom(format!("invalid boolean string: {}", s))),
        },
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Ok(i != 0),
            None => Err(D::Error::custom("invalid boolean number")),
        },
        JsonValue::Null => Ok(false),
        _ => Err(D::Error::custom(format!(
            "invalid boolean value: {:?}",
            value
        ))),
    }
}

/// A play as written in YAML
#[derive(Debug, Default, Deserialize)]
pub struct RawPlay {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub vars: Option<YamlValue>,
    #[serde(default)]
    pub vars_files: Vec<String>,
    #[serde(default)]
    pub tasks: Vec<YamlValue>,
    #[serde(default)]
    pub handlers: Vec<YamlValue>,
    #[serde(default)]
    pub modules: IndexMap<String, RawModule>,
}

/// A module body: either a bare task list or `{ tasks: [...] }`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawModule {
    Tasks(Vec<YamlValue>),
    Block {
        #[serde(default)]
        tasks: Vec<YamlValue>,
    },
}

impl RawModule {
    pub fn into_tasks(self) -> Vec<YamlValue> {
        match self {
            RawModule::Tasks(tasks) | RawModule::Block { tasks } => tasks,
        }
    }
}

/// One entry of a task list.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEntry {
    Task(Task),
    /// Tasks of another file, with vars that take priority in them
    Include { file: String, vars: Vars },
}

/// Converts a YAML value into a [`Value`].
pub fn yaml_to_value(yaml: &YamlValue) -> Value {
    match yaml {
        YamlValue::Null => Value::Nil,
        YamlValue::Bool(b) => Value::Bool(*b),
        YamlValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        YamlValue::String(s) => Value::String(s.clone()),
        YamlValue::Sequence(seq) => Value::List(seq.iter().map(yaml_to_value).collect()),
        YamlValue::Mapping(map) => Value::Map(mapping_to_vars(map)),
        YamlValue::Tagged(tagged) => yaml_to_value(&tagged.value),
    }
}

/// Converts a mapping into vars, rendering scalar keys as strings.
pub fn mapping_to_vars(map: &Mapping) -> Vars {
    map.iter()
        .map(|(k, v)| (scalar_string(k), yaml_to_value(v)))
        .collect()
}

fn scalar_string(yaml: &YamlValue) -> String {
    match yaml {
        YamlValue::String(s) => s.clone(),
        YamlValue::Null => String::new(),
        other => yaml_to_value(other).to_string(),
    }
}

/// Vars from an optional `vars:` value, which must be a mapping.
pub fn vars_of(yaml: Option<&YamlValue>) -> Result<Vars, String> {
    match yaml {
        None | Some(YamlValue::Null) => Ok(Vars::new()),
        Some(YamlValue::Mapping(map)) => Ok(mapping_to_vars(map)),
        Some(other) => Err(format!("vars must be a mapping, found {}", kind(other))),
    }
}

fn kind(yaml: &YamlValue) -> &'static str {
    match yaml {
        YamlValue::Null => "null",
        YamlValue::Bool(_) => "a boolean",
        YamlValue::Number(_) => "a number",
        YamlValue::String(_) => "a string",
        YamlValue::Sequence(_) => "a list",
        YamlValue::Mapping(_) => "a mapping",
        YamlValue::Tagged(_) => "a tagged value",
    }
}

fn string_list(key: &str, yaml: &YamlValue) -> Result<Vec<String>, String> {
    match yaml {
        YamlValue::Null => Ok(Vec::new()),
        YamlValue::Sequence(seq) => seq
            .iter()
            .map(|v| match v {
                YamlValue::Sequence(_) | YamlValue::Mapping(_) => {
                    Err(format!("'{}' entries must be scalars", key))
                }
                other => Ok(scalar_string(other)),
            })
            .collect(),
        YamlValue::Mapping(_) => Err(format!("'{}' must be a string or a list", key)),
        other => Ok(vec![scalar_string(other)]),
    }
}

fn opt_string(key: &str, yaml: &YamlValue) -> Result<Option<String>, String> {
    match yaml {
        YamlValue::Null => Ok(None),
        YamlValue::Sequence(_) | YamlValue::Mapping(_) => {
            Err(format!("'{}' must be a scalar, found {}", key, kind(yaml)))
        }
        other => Ok(Some(scalar_string(other))),
    }
}

/// Converts one task mapping.
pub fn task_entry(yaml: &YamlValue) -> Result<TaskEntry, String> {
    let YamlValue::Mapping(map) = yaml else {
        return Err(format!("a task must be a mapping, found {}", kind(yaml)));
    };
    let get = |key: &str| map.get(key);

    let vars = vars_of(get("vars"))?;

    if let Some(include) = get("include") {
        let file = opt_string("include", include)?
            .ok_or_else(|| "'include' needs a file name".to_string())?;
        return Ok(TaskEntry::Include { file, vars });
    }

    let mut commands = map.iter().filter_map(|(k, v)| match k {
        YamlValue::String(key) if !TASK_KEYS.contains(&key.as_str()) => Some((key, v)),
        _ => None,
    });
    let (command, body) = commands
        .next()
        .ok_or_else(|| "task has no command".to_string())?;
    if let Some((extra, _)) = commands.next() {
        return Err(format!(
            "task names more than one command: '{}' and '{}'",
            command, extra
        ));
    }

    let name = match get("name") {
        Some(name) => opt_string("name", name)?.unwrap_or_default(),
        None => String::new(),
    };
    let mut task = Task::new(name, command.as_str());
    if task.name.is_empty() {
        task.name = command.clone();
    }
    task.vars = vars;

    match body {
        YamlValue::Null => {}
        YamlValue::Mapping(args) => task.vars.extend(mapping_to_vars(args)),
        YamlValue::Sequence(_) => {
            return Err(format!("arguments of '{}' must be a string or a mapping", command));
        }
        other => task.args = scalar_string(other),
    }

    if let Some(when) = get("when") {
        task.when = opt_string("when", when)?;
    }
    if let Some(items) = get("with_items").or_else(|| get("items")) {
        task.items = match yaml_to_value(items) {
            Value::List(list) => Some(list),
            Value::Nil => None,
            other => Some(vec![other]),
        };
    }
    if let Some(notify) = get("notify") {
        task.notify = string_list("notify", notify)?;
    }
    if let Some(register) = get("register") {
        task.register = opt_string("register", register)?;
    }
    if let Some(future) = get("future") {
        task.future = opt_string("future", future)?;
    }
    if let Some(is_async) = get("async") {
        task.is_async = deserialize_flexible_bool(is_async.clone()).map_err(|e| e.to_string())?;
    }

    Ok(TaskEntry::Task(task))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(text: &str) -> Result<TaskEntry, String> {
        task_entry(&serde_yaml::from_str(text).unwrap())
    }

    fn task(text: &str) -> Task {
        match entry(text).unwrap() {
            TaskEntry::Task(task) => task,
            other => panic!("expected a task, got {other:?}"),
        }
    }

    #[test]
    fn test_string_args() {
        let t = task(
            r#"
name: install {{ item }}
shell: echo {{ item }}
with_items: [a, b]
notify: restart
register: out
"#,
        );
        assert_eq!(t.command, "shell");
        assert_eq!(t.args, "echo {{ item }}");
        assert_eq!(t.items, Some(vec![Value::from("a"), Value::from("b")]));
        assert_eq!(t.notify, vec!["restart".to_string()]);
        assert_eq!(t.register.as_deref(), Some("out"));
    }

    #[test]
    fn test_mapping_args_become_vars() {
        let t = task("debug: { msg: hello, count: 2 }\nasync: yes");
        assert_eq!(t.name, "debug");
        assert_eq!(t.vars["msg"], Value::from("hello"));
        assert_eq!(t.vars["count"], Value::Int(2));
        assert!(t.is_async);
    }

    #[test]
    fn test_include_entry() {
        let e = entry("include: more.yml\nvars: { x: 1 }").unwrap();
        let mut vars = Vars::new();
        vars.insert("x".into(), Value::Int(1));
        assert_eq!(
            e,
            TaskEntry::Include {
                file: "more.yml".into(),
                vars
            }
        );
    }

    #[test]
    fn test_command_errors() {
        assert!(entry("name: nothing").unwrap_err().contains("no command"));
        assert!(entry("shell: a\ncommand: b").unwrap_err().contains("more than one"));
        assert!(entry("- not a mapping").is_err());
    }

    #[test]
    fn test_flexible_bool() {
        let yes: YamlValue = serde_yaml::from_str("\"on\"").unwrap();
        assert!(deserialize_flexible_bool(yes).unwrap());
        let bad: YamlValue = serde_yaml::from_str("maybe").unwrap();
        assert!(deserialize_flexible_bool(bad).is_err());
    }
}
