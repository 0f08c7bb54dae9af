use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

use super::{Element, effective_ns};
use crate::error::NetconfError;

static STEP: Lazy<Regex> = Lazy::new(|| {
    match Regex::new(r"^(?:([A-Za-z_][\w.\-]*):)?([A-Za-z_][\w.\-]*)((?:\[.*\])*)$") {
        Ok(re) => re,
        Err(err) => panic!("invalid STEP regex: {err}"),
    }
});

static PREDICATE: Lazy<Regex> = Lazy::new(|| {
    match Regex::new(
        r#"^\[\s*(?:[A-Za-z_][\w.\-]*:)?([A-Za-z_][\w.\-]*|\.)\s*=\s*(?:'([^']*)'|"([^"]*)")\s*\]"#,
    ) {
        Ok(re) => re,
        Err(err) => panic!("invalid PREDICATE regex: {err}"),
    }
});

/// One step of a [`Path`]: a name plus optional key predicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    pub prefix: Option<String>,
    pub name: String,
    /// `(key, value)` pairs; the key `.` matches the node's own text.
    pub predicates: Vec<(String, String)>,
}

impl PathStep {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            prefix: None,
            name: name.into(),
            predicates: Vec::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.predicates.push((key.into(), value.into()));
        self
    }

    /// Whether `element` is selected by this step's name and predicates.
    /// The prefix is not checked here; see [`Path::with_prefix`].
    pub fn matches(&self, element: &Element) -> bool {
        element.name() == self.name
            && self.predicates.iter().all(|(key, value)| {
                if key == "." {
                    element.text() == Some(value.as_str())
                } else {
                    element.child_text(key) == Some(value.as_str())
                }
            })
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, "{prefix}:")?;
        }
        f.write_str(&self.name)?;
        for (key, value) in &self.predicates {
            if value.contains('\'') {
                write!(f, "[{key}=\"{value}\"]")?;
            } else {
                write!(f, "[{key}='{value}']")?;
            }
        }
        Ok(())
    }
}

/// Location of a node inside an element tree.
///
/// Relative paths start at the children of the node they are applied to;
/// absolute paths (leading `/`) match the node itself with their first
/// step. Example: `interfaces/interface[name='eth0']/mtu`.
///
/// A step prefix only restricts matching once it is bound with
/// [`Path::with_prefix`]; unbound prefixes are carried for display and
/// otherwise ignored, so `if:mtu` and `mtu` select the same nodes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Path {
    pub absolute: bool,
    pub steps: Vec<PathStep>,
    /// Prefix to namespace URI bindings.
    pub namespaces: Vec<(String, String)>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: PathStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn child(self, name: impl Into<String>) -> Self {
        self.step(PathStep::new(name))
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Binds `prefix`: steps using it then only match nodes whose
    /// effective namespace is `namespace`.
    pub fn with_prefix(mut self, prefix: impl Into<String>, namespace: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.namespaces.retain(|(p, _)| *p != prefix);
        self.namespaces.push((prefix, namespace.into()));
        self
    }

    pub fn namespace_of(&self, prefix: &str) -> Option<&str> {
        self.namespaces
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, ns)| ns.as_str())
    }

    fn step_matches(&self, step: &PathStep, element: &Element, ns: Option<&str>) -> bool {
        if !step.matches(element) {
            return false;
        }
        match step.prefix.as_deref().and_then(|p| self.namespace_of(p)) {
            Some(bound) => ns == Some(bound),
            None => true,
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            f.write_str("/")?;
        }
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{step}")?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = NetconfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let absolute = trimmed.starts_with('/');
        let body = trimmed.trim_start_matches('/');
        if body.is_empty() {
            return Err(NetconfError::InvalidRequest(format!("empty path '{s}'")));
        }
        let steps = split_steps(body)?
            .into_iter()
            .map(parse_step)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Path {
            absolute,
            steps,
            namespaces: Vec::new(),
        })
    }
}

/// Splits on `/` outside of predicates, so key values may contain slashes.
fn split_steps(body: &str) -> Result<Vec<&str>, NetconfError> {
    let mut steps = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, '/') if depth == 0 => {
                steps.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if quote.is_some() || depth != 0 {
        return Err(NetconfError::InvalidRequest(format!(
            "unterminated predicate in path '{body}'"
        )));
    }
    steps.push(&body[start..]);
    Ok(steps)
}

fn parse_step(raw: &str) -> Result<PathStep, NetconfError> {
    let caps = STEP
        .captures(raw.trim())
        .ok_or_else(|| NetconfError::InvalidRequest(format!("invalid path step '{raw}'")))?;
    let mut step = PathStep {
        prefix: caps.get(1).map(|m| m.as_str().to_string()),
        name: caps[2].to_string(),
        predicates: Vec::new(),
    };
    let mut rest = caps.get(3).map(|m| m.as_str()).unwrap_or("");
    while !rest.is_empty() {
        let pred = PREDICATE.captures(rest).ok_or_else(|| {
            NetconfError::InvalidRequest(format!("invalid predicate in step '{raw}'"))
        })?;
        let value = pred
            .get(2)
            .or_else(|| pred.get(3))
            .map(|m| m.as_str())
            .unwrap_or("");
        step.predicates.push((pred[1].to_string(), value.to_string()));
        rest = &rest[pred[0].len()..];
    }
    Ok(step)
}

fn find<'a>(
    path: &Path,
    candidates: &'a [Element],
    steps: &[PathStep],
    parent_ns: Option<&'a str>,
) -> Option<&'a Element> {
    let (step, rest) = steps.split_first()?;
    candidates.iter().find_map(|c| {
        let ns = effective_ns(c, parent_ns);
        if !path.step_matches(step, c, ns) {
            None
        } else if rest.is_empty() {
            Some(c)
        } else {
            find(path, c.children(), rest, ns)
        }
    })
}

fn find_mut<'a>(
    path: &Path,
    candidates: &'a mut [Element],
    steps: &[PathStep],
    parent_ns: Option<&str>,
) -> Option<&'a mut Element> {
    let (step, rest) = steps.split_first()?;
    candidates.iter_mut().find_map(|c| {
        let ns = effective_ns(c, parent_ns).map(str::to_owned);
        if !path.step_matches(step, c, ns.as_deref()) {
            None
        } else if rest.is_empty() {
            Some(c)
        } else {
            find_mut(path, c.children_slice_mut(), rest, ns.as_deref())
        }
    })
}

fn collect<'a>(
    path: &Path,
    candidates: &'a [Element],
    steps: &[PathStep],
    parent_ns: Option<&'a str>,
    out: &mut Vec<&'a Element>,
) {
    let Some((step, rest)) = steps.split_first() else {
        return;
    };
    for candidate in candidates {
        let ns = effective_ns(candidate, parent_ns);
        if !path.step_matches(step, candidate, ns) {
            continue;
        }
        if rest.is_empty() {
            out.push(candidate);
        } else {
            collect(path, candidate.children(), rest, ns, out);
        }
    }
}

impl Element {
    /// Looks up the node at `path`; the first match in document order wins.
    pub fn get(&self, path: &Path) -> Option<&Element> {
        let ns = effective_ns(self, None);
        if path.absolute {
            let (first, rest) = path.steps.split_first()?;
            if !path.step_matches(first, self, ns) {
                return None;
            }
            if rest.is_empty() {
                return Some(self);
            }
            return find(path, self.children(), rest, ns);
        }
        find(path, self.children(), &path.steps, ns)
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut Element> {
        let ns = effective_ns(self, None).map(str::to_owned);
        if path.absolute {
            let (first, rest) = path.steps.split_first()?;
            if !path.step_matches(first, self, ns.as_deref()) {
                return None;
            }
            if rest.is_empty() {
                return Some(self);
            }
            return find_mut(path, self.children_slice_mut(), rest, ns.as_deref());
        }
        find_mut(path, self.children_slice_mut(), &path.steps, ns.as_deref())
    }

    /// Like [`Element::get`], failing with `PathNotFound` when absent.
    pub fn require(&self, path: &Path) -> Result<&Element, NetconfError> {
        self.get(path)
            .ok_or_else(|| NetconfError::PathNotFound(path.to_string()))
    }

    /// Every node matched by `path`, in document order.
    pub fn select(&self, path: &Path) -> Vec<&Element> {
        let ns = effective_ns(self, None);
        let mut out = Vec::new();
        if path.absolute {
            if let Some((first, rest)) = path.steps.split_first()
                && path.step_matches(first, self, ns)
            {
                if rest.is_empty() {
                    out.push(self);
                } else {
                    collect(path, self.children(), rest, ns, &mut out);
                }
            }
            return out;
        }
        collect(path, self.children(), &path.steps, ns, &mut out);
        out
    }
}
