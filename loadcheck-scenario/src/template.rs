//! `{{placeholder}}` templates expanded once per attempt

use crate::error::{ScenarioError, ScenarioResult};
use loadcheck_core::{BenchError, BenchResult, Credentials};
use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::HashMap;
use std::fmt;

/// Longest string `{{random:N}}` may produce
pub const MAX_RANDOM_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    UserName,
    UserSecret,
    Var(String),
    Random(usize),
}

/// Values a template is rendered against
#[derive(Debug, Clone, Copy)]
pub struct Bindings<'a> {
    pub credentials: &'a Credentials,
    pub vars: &'a HashMap<String, String>,
    /// Source of `{{random:N}}`; seeded per worker for reproducible runs
    pub rng: &'a Mutex<StdRng>,
}

/// A parsed template string.
///
/// Placeholders: `{{user.name}}`, `{{user.secret}}`, `{{random:N}}` (N
/// alphanumeric characters) and `{{var}}` for scenario and extracted
/// variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> ScenarioResult<Self> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let inner = &rest[start + 2..];
            let end = inner
                .find("}}")
                .ok_or_else(|| ScenarioError::template(source, "unterminated '{{'"))?;
            segments.push(placeholder(source, inner[..end].trim())?);
            rest = &inner[end + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names of the scenario variables this template reads
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Var(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Expand every placeholder.
    ///
    /// A variable missing from `bindings` is a contract violation: scenario
    /// files are checked for this at load time, so reaching it means the
    /// caller built the bindings wrong.
    pub fn render(&self, bindings: &Bindings<'_>) -> BenchResult<String> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::UserName => out.push_str(&bindings.credentials.name),
                Segment::UserSecret => out.push_str(&bindings.credentials.secret),
                Segment::Var(name) => {
                    let value = bindings.vars.get(name).ok_or_else(|| {
                        BenchError::contract(format!(
                            "template '{}' refers to unknown variable '{}'",
                            self.source, name
                        ))
                    })?;
                    out.push_str(value);
                }
                Segment::Random(len) => {
                    let mut rng = bindings.rng.lock();
                    out.extend((0..*len).map(|_| char::from(rng.sample(Alphanumeric))));
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn placeholder(source: &str, name: &str) -> ScenarioResult<Segment> {
    match name {
        "user.name" => return Ok(Segment::UserName),
        "user.secret" => return Ok(Segment::UserSecret),
        "" => return Err(ScenarioError::template(source, "empty placeholder")),
        _ => {}
    }

    if let Some(len) = name.strip_prefix("random:") {
        let len: usize = len.trim().parse().map_err(|_| {
            ScenarioError::template(source, format!("'{}' is not a length", len.trim()))
        })?;
        if len == 0 || len > MAX_RANDOM_LEN {
            return Err(ScenarioError::template(
                source,
                format!("random length must be between 1 and {}", MAX_RANDOM_LEN),
            ));
        }
        return Ok(Segment::Random(len));
    }

    if is_variable_name(name) {
        Ok(Segment::Var(name.to_string()))
    } else {
        Err(ScenarioError::template(
            source,
            format!("'{}' is not a variable name", name),
        ))
    }
}

/// `[A-Za-z_][A-Za-z0-9_-]*`
pub(crate) fn is_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
