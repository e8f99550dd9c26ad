//! On-disk scenario file format

use loadcheck_core::HttpMethod;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level scenario document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    /// Load mix; workers pick from these by weight
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scenarios: Vec<ScenarioDef>,

    /// Pre-test scenarios, each run once before the load phase
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<ScenarioDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioDef {
    pub name: String,

    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Per-attempt variables; values may use `user.*` and `random:N`
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "deserialize_values"
    )]
    pub vars: BTreeMap<String, String>,

    pub steps: Vec<StepDef>,
}

fn default_weight() -> u32 {
    1
}

/// One entry of `steps`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepDef {
    Register(RegisterStep),
    ClearSession(ClearSessionStep),
    Action(Box<ActionStep>),
}

/// `register: {name, secret}` adds an account to the user pool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterStep {
    pub register: RegisterDef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterDef {
    pub name: String,
    pub secret: String,
}

/// `clear_session: true` drops the leased user's cookies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClearSessionStep {
    pub clear_session: bool,
}

/// An HTTP action with its expectations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionStep {
    #[serde(default)]
    pub method: HttpMethod,

    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "deserialize_values"
    )]
    pub headers: BTreeMap<String, String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_values"
    )]
    pub form: Option<BTreeMap<String, String>>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_values"
    )]
    pub query: Option<BTreeMap<String, String>>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_values"
    )]
    pub multipart: Option<BTreeMap<String, String>>,

    /// File part of a multipart body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileDef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_status: Option<StatusDef>,

    /// Regex matched against the redirect target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_location: Option<String>,

    #[serde(default)]
    pub enable_cache: bool,

    #[serde(default)]
    pub skip_if_cache_available: bool,

    /// Variable name to `selector` or `selector@attribute`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extract: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assert: Vec<AssertDef>,

    /// Store the redirect target in this variable instead of validating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_redirect: Option<String>,

    /// Treat a failed check of this step as fatal to the run
    #[serde(default)]
    pub fatal: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusDef {
    One(u16),
    Many(Vec<u16>),
}

impl StatusDef {
    pub fn codes(&self) -> Vec<u16> {
        match self {
            StatusDef::One(code) => vec![*code],
            StatusDef::Many(codes) => codes.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileDef {
    /// Form field name
    pub field: String,
    /// File name sent to the target
    pub name: String,
    /// Inline content, templated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Content read from disk, relative to the scenario file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Structural assertion on an HTML response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssertDef {
    pub selector: String,
    /// Exact number of matching elements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    /// Exact text of the first match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Text some match must contain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
}

/// Accept scalars of any type as string values
fn deserialize_values<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_yaml::Value>::deserialize(deserializer)?;
    let mut out = BTreeMap::new();

    for (k, v) in raw {
        let s = match v {
            serde_yaml::Value::Null => String::new(),
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::String(s) => s,
            _ => {
                return Err(serde::de::Error::custom(format!(
                    "value of '{}' must be a scalar",
                    k
                )))
            }
        };
        out.insert(k, s);
    }

    Ok(out)
}

fn deserialize_optional_values<'de, D>(
    deserializer: D,
) -> Result<Option<BTreeMap<String, String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_values(deserializer).map(Some)
}
