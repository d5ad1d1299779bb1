//! YAML playbook loading for playrun.
//!
//! This module provides:
//! - Playbook parsing into [`Playbook`]
//! - `include` expansion and `vars_files` loading, relative to the
//!   including file's directory
//!
//! Every failure is reported as [`Error::PlaybookParse`] naming the file.

pub mod playbook;

pub use playbook::{deserialize_flexible_bool, yaml_to_value, RawModule, RawPlay, TaskEntry};

use std::path::{Path, PathBuf};

use serde_yaml::Value as YamlValue;
use tracing::debug;

use crate::error::{Error, Result};
use crate::executor::playbook::{Module, Play, Playbook};
use crate::executor::task::Task;
use crate::vars::load_vars_file;

/// Deepest include chain followed before giving up
const MAX_INCLUDE_DEPTH: usize = 32;

/// Loads playbooks from YAML.
#[derive(Debug, Clone, Default)]
pub struct Parser {
    /// Base directory for relative includes of string sources
    base_dir: Option<PathBuf>,
}

impl Parser {
    /// Create a new parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory relative references in a string source resolve against.
    pub fn with_base_dir<P: AsRef<Path>>(mut self, base_dir: P) -> Self {
        self.base_dir = Some(base_dir.as_ref().to_path_buf());
        self
    }

    /// Parse a playbook from a file
    pub fn parse_playbook<P: AsRef<Path>>(&self, path: P) -> Result<Playbook> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::playbook_parse(path, e.to_string()))?;
        let base_dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        self.parse_source(&content, path, &base_dir)
    }

    /// Parse a playbook from a string
    pub fn parse_playbook_str(&self, content: &str) -> Result<Playbook> {
        let base_dir = self.base_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        self.parse_source(content, Path::new("<string>"), &base_dir)
    }

    fn parse_source(&self, content: &str, path: &Path, base_dir: &Path) -> Result<Playbook> {
        let doc: YamlValue = serde_yaml::from_str(content)
            .map_err(|e| Error::playbook_parse(path, e.to_string()))?;

        let raw_plays = match doc {
            YamlValue::Null => Vec::new(),
            YamlValue::Sequence(plays) => plays,
            YamlValue::Mapping(_) => vec![doc],
            _ => {
                return Err(Error::playbook_parse(
                    path,
                    "a playbook must be a list of plays",
                ))
            }
        };

        let mut playbook = Playbook::new(base_dir);
        for (idx, value) in raw_plays.into_iter().enumerate() {
            let raw: RawPlay = serde_yaml::from_value(value)
                .map_err(|e| Error::playbook_parse(path, format!("play {}: {}", idx + 1, e)))?;
            playbook.add_play(self.build_play(raw, path, base_dir)?);
        }

        debug!(
            path = %path.display(),
            plays = playbook.plays.len(),
            tasks = playbook.task_count(),
            "Parsed playbook"
        );
        Ok(playbook)
    }

    fn build_play(&self, raw: RawPlay, path: &Path, base_dir: &Path) -> Result<Play> {
        let mut play = Play::new(raw.name.unwrap_or_default());

        play.vars = playbook::vars_of(raw.vars.as_ref())
            .map_err(|msg| Error::playbook_parse(path, msg))?;
        for file in &raw.vars_files {
            let vars = load_vars_file(&base_dir.join(file))?;
            play.vars.extend(vars);
        }

        play.tasks = self.build_tasks(&raw.tasks, path, base_dir, 0)?;
        play.handlers = self.build_tasks(&raw.handlers, path, base_dir, 0)?;

        for (name, body) in raw.modules {
            let mut module = Module::new(name);
            module.tasks = self.build_tasks(&body.into_tasks(), path, base_dir, 0)?;
            play.add_module(module);
        }

        Ok(play)
    }

    fn build_tasks(
        &self,
        entries: &[YamlValue],
        path: &Path,
        base_dir: &Path,
        depth: usize,
    ) -> Result<Vec<Task>> {
        let mut tasks = Vec::with_capacity(entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            let entry = playbook::task_entry(entry)
                .map_err(|msg| Error::playbook_parse(path, format!("task {}: {}", idx + 1, msg)))?;
            match entry {
                TaskEntry::Task(task) => tasks.push(task),
                TaskEntry::Include { file, vars } => {
                    for mut task in self.load_include(&base_dir.join(&file), depth + 1)? {
                        let mut include_vars = vars.clone();
                        include_vars.extend(task.include_vars);
                        task.include_vars = include_vars;
                        tasks.push(task);
                    }
                }
            }
        }
        Ok(tasks)
    }

    /// Loads the task list of an included file.
    fn load_include(&self, path: &Path, depth: usize) -> Result<Vec<Task>> {
        if depth > MAX_INCLUDE_DEPTH {
            return Err(Error::playbook_parse(
                path,
                format!("includes nested deeper than {}", MAX_INCLUDE_DEPTH),
            ));
        }
        debug!(path = %path.display(), depth, "Including tasks");

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::playbook_parse(path, e.to_string()))?;
        let doc: YamlValue = serde_yaml::from_str(&content)
            .map_err(|e| Error::playbook_parse(path, e.to_string()))?;
        let entries = match doc {
            YamlValue::Null => Vec::new(),
            YamlValue::Sequence(entries) => entries,
            _ => return Err(Error::playbook_parse(path, "an included file must be a list of tasks")),
        };

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        self.build_tasks(&entries, path, base_dir, depth)
    }
}

/// Loads a playbook file.
pub fn load_playbook<P: AsRef<Path>>(path: P) -> Result<Playbook> {
    Parser::new().parse_playbook(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Value;

    #[test]
    fn test_parse_playbook_str() {
        let yaml = r#"
- name: web
  vars: { port: 80 }
  modules:
    greet:
      tasks:
        - name: say hi
          debug: msg="hi {{ who }}"
  tasks:
    - name: install {{ item }}
      shell: echo {{ item }}
      with_items: [a, b]
      when: "{{ (= port 80) }}"
      notify: [restart]
  handlers:
    - name: restart
      shell: echo restart
"#;
        let playbook = Parser::new().parse_playbook_str(yaml).unwrap();
        let play = &playbook.plays[0];

        assert_eq!(play.name, "web");
        assert_eq!(play.vars["port"], Value::Int(80));
        assert_eq!(play.tasks.len(), 1);
        assert_eq!(play.tasks[0].when.as_deref(), Some("{{ (= port 80) }}"));
        assert_eq!(play.handlers[0].name, "restart");
        assert_eq!(play.module("greet").map(|m| m.tasks.len()), Some(1));
    }

    #[test]
    fn test_malformed_playbook() {
        let err = Parser::new().parse_playbook_str("- tasks: 3").unwrap_err();
        assert!(matches!(err, Error::PlaybookParse { .. }));

        let err = Parser::new()
            .parse_playbook_str("- tasks: [{ name: x }]")
            .unwrap_err();
        assert!(err.to_string().contains("no command"));
    }
}
