// ABOUTME: Placeholder substitution and conditional block elision for resource templates.
// ABOUTME: Refuses to render anything with an unbound placeholder instead of leaving it empty.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Start of a placeholder token: `${NAME}`.
const OPEN: &str = "${";
const IF_MARKER: &str = "@if";
const ENDIF_MARKER: &str = "@endif";

/// Errors from loading or rendering templates.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("{template}: unresolved placeholder(s): {}", .names.join(", "))]
    UnresolvedPlaceholder { template: String, names: Vec<String> },

    #[error("binding {name} contains a placeholder token and would be substituted again")]
    PlaceholderInValue { name: String },

    #[error("{template}: line {line}: {reason}")]
    Malformed {
        template: String,
        line: usize,
        reason: String,
    },

    #[error("failed to read template {path}: {reason}")]
    Read { path: PathBuf, reason: String },
}

/// A value a placeholder can be bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Value(String),
    Flag(bool),
}

impl Binding {
    /// Whether a conditional block keyed on this binding is kept.
    pub fn is_truthy(&self) -> bool {
        match self {
            Binding::Value(v) => !v.is_empty(),
            Binding::Flag(f) => *f,
        }
    }

    fn as_text(&self) -> String {
        match self {
            Binding::Value(v) => v.clone(),
            Binding::Flag(f) => f.to_string(),
        }
    }
}

/// Placeholder name to value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    entries: BTreeMap<String, Binding>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.insert(name.into(), Binding::Value(value.into()));
        self
    }

    pub fn set_flag(&mut self, name: impl Into<String>, enabled: bool) -> &mut Self {
        self.entries.insert(name.into(), Binding::Flag(enabled));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Add every entry of `other`, overwriting on conflict.
    pub fn extend(&mut self, other: &Bindings) {
        for (k, v) in &other.entries {
            self.entries.insert(k.clone(), v.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A named template source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub name: String,
    pub source: String,
}

impl Template {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let source = std::fs::read_to_string(path).map_err(|e| TemplateError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(path.display().to_string(), source))
    }

    /// Load every `*.yaml`/`*.yml` file in a directory, in filename order.
    ///
    /// A missing directory yields no templates.
    pub fn load_dir(dir: &Path) -> Result<Vec<Self>, TemplateError> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let read_err = |e: std::io::Error| TemplateError::Read {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        };
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yaml" || e == "yml");
            if is_yaml && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        paths.iter().map(|p| Self::load(p)).collect()
    }

    /// Placeholder names this template references outside elided blocks, given `bindings`.
    pub fn placeholders(&self, bindings: &Bindings) -> Result<BTreeSet<String>, TemplateError> {
        let kept = elide_blocks(&self.name, &self.source, bindings)?;
        Ok(scan(&kept).into_iter().map(str::to_string).collect())
    }
}

/// Render a template against bindings.
///
/// Conditional blocks are resolved first, then every `${NAME}` is replaced in a
/// single pass. Fails if any referenced placeholder is unbound or any bound
/// value itself contains a placeholder token.
pub fn render(template: &Template, bindings: &Bindings) -> Result<String, TemplateError> {
    let kept = elide_blocks(&template.name, &template.source, bindings)?;

    let referenced: BTreeSet<&str> = scan(&kept).into_iter().collect();
    let missing: Vec<String> = referenced
        .iter()
        .filter(|name| !bindings.contains(name))
        .map(|name| name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(TemplateError::UnresolvedPlaceholder {
            template: template.name.clone(),
            names: missing,
        });
    }

    for name in &referenced {
        if let Some(binding) = bindings.get(name)
            && binding.as_text().contains(OPEN)
        {
            return Err(TemplateError::PlaceholderInValue {
                name: name.to_string(),
            });
        }
    }

    let mut out = String::with_capacity(kept.len());
    let mut rest = kept.as_str();
    while let Some((before, name, after)) = next_placeholder(rest) {
        out.push_str(before);
        // Presence was checked above.
        if let Some(binding) = bindings.get(name) {
            out.push_str(&binding.as_text());
        }
        rest = after;
    }
    out.push_str(rest);
    Ok(out)
}

/// Find the next well-formed placeholder: (text before, name, text after).
fn next_placeholder(input: &str) -> Option<(&str, &str, &str)> {
    let mut offset = 0;
    while let Some(pos) = input[offset..].find(OPEN) {
        let start = offset + pos;
        let name_start = start + OPEN.len();
        if let Some(len) = input[name_start..].find('}') {
            let name = &input[name_start..name_start + len];
            if is_placeholder_name(name) {
                return Some((&input[..start], name, &input[name_start + len + 1..]));
            }
        }
        offset = name_start;
    }
    None
}

fn scan(input: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = input;
    while let Some((_, name, after)) = next_placeholder(rest) {
        names.push(name);
        rest = after;
    }
    names
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// If `line` is a block marker, its directive and argument.
fn marker(line: &str) -> Option<(&str, &str)> {
    let body = line.trim().strip_prefix('#')?.trim();
    if let Some(arg) = body.strip_prefix(IF_MARKER)
        && (arg.is_empty() || arg.starts_with(char::is_whitespace))
    {
        return Some((IF_MARKER, arg.trim()));
    }
    if body == ENDIF_MARKER {
        return Some((ENDIF_MARKER, ""));
    }
    None
}

/// Drop `# @if NAME` ... `# @endif` blocks whose binding is absent or falsy.
fn elide_blocks(name: &str, source: &str, bindings: &Bindings) -> Result<String, TemplateError> {
    let malformed = |line: usize, reason: &str| TemplateError::Malformed {
        template: name.to_string(),
        line,
        reason: reason.to_string(),
    };

    // One entry per open block: whether that block is kept.
    let mut stack: Vec<bool> = Vec::new();
    let mut out = String::with_capacity(source.len());

    for (idx, line) in source.split_inclusive('\n').enumerate() {
        match marker(line) {
            Some((IF_MARKER, flag)) => {
                if !is_placeholder_name(flag) {
                    return Err(malformed(idx + 1, "@if needs an upper-case binding name"));
                }
                let enabled = bindings.get(flag).is_some_and(Binding::is_truthy);
                stack.push(enabled);
            }
            Some(_) => {
                if stack.pop().is_none() {
                    return Err(malformed(idx + 1, "@endif without matching @if"));
                }
            }
            None => {
                if stack.iter().all(|kept| *kept) {
                    out.push_str(line);
                }
            }
        }
    }

    if !stack.is_empty() {
        let lines = source.lines().count();
        return Err(malformed(lines, "unterminated @if block"));
    }
    Ok(out)
}
