// plugin.rs — Host plugin registry
//
// A plugin is a function whose signature and cost are declared in tally's
// plugin DSL and whose body is supplied by the host:
//
//     plugin total<#N>(xs: List<Int, N>): Int cost N
//
// Declarations are parsed with the same front end as source units. Every
// declaration must be paired with exactly one host body.
//
// Preconditions: none.
// Postconditions: every registered plugin has both a declaration and a body.
// Failure modes: syntax errors, duplicates, or unpaired declarations/bodies
//   → `PluginError`.
// Side effects: `load_file` reads from the filesystem.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;

use crate::ast::PluginDecl;
use crate::parser::parse_plugin_decls;
use crate::value::{RuntimeError, Value};

/// Host-supplied plugin body.
pub type HostFn = Rc<dyn Fn(&[Value]) -> Result<Value, RuntimeError>>;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("plugin declaration syntax error: {0}")]
    Syntax(String),
    #[error("duplicate plugin '{0}'")]
    Duplicate(String),
    #[error("plugin '{0}' is declared but has no host body")]
    MissingBody(String),
    #[error("host body '{0}' has no matching declaration")]
    UnusedBody(String),
    #[error("plugin '{name}' has an invalid signature: {message}")]
    Signature { name: String, message: String },
}

// ── Registry ────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PluginEntry {
    pub decl: PluginDecl,
    pub body: HostFn,
}

impl fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginEntry")
            .field("name", &self.decl.name.name)
            .finish_non_exhaustive()
    }
}

/// Plugins keyed by name. Iteration is in name order, so the platform
/// table assigns plugin IDs deterministically.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    entries: BTreeMap<String, PluginEntry>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every declaration in `text`, taking bodies from `bodies` by
    /// name. Returns the number of plugins added.
    pub fn declare(
        &mut self,
        text: &str,
        mut bodies: BTreeMap<String, HostFn>,
    ) -> Result<usize, PluginError> {
        let parsed = parse_plugin_decls(text);
        if let Some(first) = parsed.errors.first() {
            return Err(PluginError::Syntax(first.to_string()));
        }
        let count = parsed.decls.len();
        for decl in parsed.decls {
            let name = decl.name.name.clone();
            if self.entries.contains_key(&name) {
                return Err(PluginError::Duplicate(name));
            }
            let body = bodies
                .remove(&name)
                .ok_or_else(|| PluginError::MissingBody(name.clone()))?;
            self.entries.insert(name, PluginEntry { decl, body });
        }
        if let Some(extra) = bodies.into_keys().next() {
            return Err(PluginError::UnusedBody(extra));
        }
        tracing::debug!(count, total = self.entries.len(), "registered plugins");
        Ok(count)
    }

    /// Read declarations from a file and pair them with `bodies`.
    pub fn load_file(
        &mut self,
        path: &Path,
        bodies: BTreeMap<String, HostFn>,
    ) -> Result<usize, PluginError> {
        let text = std::fs::read_to_string(path).map_err(|source| PluginError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.declare(&text, bodies)
    }

    /// The registry shipped with the CLI: `abs`, `max`, `min`, `total`.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        let mut bodies: BTreeMap<String, HostFn> = BTreeMap::new();
        bodies.insert(
            "abs".into(),
            Rc::new(|args: &[Value]| {
                let n = int_arg("abs", args, 0)?;
                n.checked_abs().map(Value::Int).ok_or(RuntimeError::IntegerOverflow("abs"))
            }),
        );
        bodies.insert(
            "max".into(),
            Rc::new(|args: &[Value]| {
                Ok(Value::Int(int_arg("max", args, 0)?.max(int_arg("max", args, 1)?)))
            }),
        );
        bodies.insert(
            "min".into(),
            Rc::new(|args: &[Value]| {
                Ok(Value::Int(int_arg("min", args, 0)?.min(int_arg("min", args, 1)?)))
            }),
        );
        bodies.insert(
            "total".into(),
            Rc::new(|args: &[Value]| {
                let xs = args.first().ok_or_else(|| missing("total", 0))?;
                let mut acc: i64 = 0;
                for x in xs.elements()? {
                    acc = acc
                        .checked_add(x.as_int()?)
                        .ok_or(RuntimeError::IntegerOverflow("total"))?;
                }
                Ok(Value::Int(acc))
            }),
        );
        let decls = "\
            plugin abs(x: Int): Int cost 1
            plugin max(a: Int, b: Int): Int cost 1
            plugin min(a: Int, b: Int): Int cost 1
            plugin total<#N>(xs: List<Int, N>): Int cost N
        ";
        if let Err(e) = registry.declare(decls, bodies) {
            tracing::error!(error = %e, "standard plugin declarations rejected");
        }
        registry
    }

    pub fn get(&self, name: &str) -> Option<&PluginEntry> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn missing(name: &str, index: usize) -> RuntimeError {
    RuntimeError::Plugin {
        name: name.to_string(),
        message: format!("missing argument {}", index),
    }
}

fn int_arg(name: &str, args: &[Value], index: usize) -> Result<i64, RuntimeError> {
    args.get(index).ok_or_else(|| missing(name, index))?.as_int()
}
