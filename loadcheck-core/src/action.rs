//! Declarative description of one HTTP interaction

use crate::error::{BenchError, BenchResult};
use crate::response::{Assertion, ResponseView, Validator};
use crate::types::HttpMethod;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;

/// Request body encoding
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ActionBody {
    #[default]
    Empty,
    /// `application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
    /// `multipart/form-data` with an optional file part
    Multipart {
        fields: Vec<(String, String)>,
        file: Option<FilePart>,
    },
    /// Fields appended to the URL query string
    Query(Vec<(String, String)>),
}

/// File attached to a multipart body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl FilePart {
    pub fn new(field: impl Into<String>, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            field: field.into(),
            file_name: file_name.into(),
            content_type: "application/octet-stream".to_string(),
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

/// Set of acceptable status codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedStatus(Vec<u16>);

impl ExpectedStatus {
    pub fn one(code: u16) -> Self {
        Self(vec![code])
    }

    pub fn any_of(codes: impl IntoIterator<Item = u16>) -> Self {
        Self(codes.into_iter().collect())
    }

    /// 302 Found or 303 See Other
    pub fn redirect() -> Self {
        Self(vec![302, 303])
    }

    pub fn matches(&self, status: u16) -> bool {
        self.0.contains(&status)
    }

    pub fn codes(&self) -> &[u16] {
        &self.0
    }
}

impl fmt::Display for ExpectedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        f.write_str(&codes.join(" or "))
    }
}

/// One declared HTTP action and its pass/fail expectations.
///
/// Built through [`ActionSpec::builder`]; immutable afterwards and consumed
/// by value when played.
pub struct ActionSpec {
    method: HttpMethod,
    path: String,
    body: ActionBody,
    headers: Vec<(String, String)>,
    expected_status: Option<ExpectedStatus>,
    expected_location: Option<Regex>,
    validator: Option<Box<dyn Validator>>,
    enable_cache: bool,
    skip_if_cache_available: bool,
    label: String,
    metric: Option<String>,
}

impl ActionSpec {
    pub fn builder(method: HttpMethod, path: impl Into<String>) -> ActionSpecBuilder {
        ActionSpecBuilder::new(method, path)
    }

    pub fn get(path: impl Into<String>) -> ActionSpecBuilder {
        Self::builder(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> ActionSpecBuilder {
        Self::builder(HttpMethod::Post, path)
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> &ActionBody {
        &self.body
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn expected_status(&self) -> Option<&ExpectedStatus> {
        self.expected_status.as_ref()
    }

    pub fn expected_location(&self) -> Option<&Regex> {
        self.expected_location.as_ref()
    }

    pub fn validator(&self) -> Option<&dyn Validator> {
        self.validator.as_deref()
    }

    pub fn enable_cache(&self) -> bool {
        self.enable_cache
    }

    pub fn skip_if_cache_available(&self) -> bool {
        self.skip_if_cache_available
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Resource class used in metric keys.
    ///
    /// Falls back to the first path segment (`root` for `/`).
    pub fn metric_class(&self) -> String {
        if let Some(metric) = &self.metric {
            return metric.clone();
        }
        let path = match self.path.find("://") {
            Some(idx) => {
                let rest = &self.path[idx + 3..];
                rest.find('/').map(|i| &rest[i..]).unwrap_or("/")
            }
            None => self.path.as_str(),
        };
        let path = path.split(&['?', '#'][..]).next().unwrap_or_default();
        path.split('/')
            .find(|segment| !segment.is_empty())
            .map(|segment| segment.to_ascii_lowercase())
            .unwrap_or_else(|| "root".to_string())
    }
}

impl fmt::Debug for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSpec")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("body", &self.body)
            .field("expected_status", &self.expected_status)
            .field("expected_location", &self.expected_location.as_ref().map(|r| r.as_str()))
            .field("has_validator", &self.validator.is_some())
            .field("enable_cache", &self.enable_cache)
            .field("skip_if_cache_available", &self.skip_if_cache_available)
            .field("label", &self.label)
            .finish()
    }
}

/// Builder for [`ActionSpec`].
///
/// Contract violations found while building (bad path, mismatched multipart
/// fields, invalid location pattern) are reported by [`build`](Self::build).
pub struct ActionSpecBuilder {
    spec: ActionSpec,
    error: Option<BenchError>,
}

impl ActionSpecBuilder {
    fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            spec: ActionSpec {
                method,
                label: format!("{} {}", method, path),
                path,
                body: ActionBody::Empty,
                headers: Vec::new(),
                expected_status: None,
                expected_location: None,
                validator: None,
                enable_cache: false,
                skip_if_cache_available: false,
                metric: None,
            },
            error: None,
        }
    }

    fn fail(&mut self, message: String) {
        if self.error.is_none() {
            self.error = Some(BenchError::contract(message));
        }
    }

    /// Human-readable description used in failure messages
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.spec.label = label.into();
        self
    }

    /// Resource class for metric keys
    pub fn metric(mut self, metric: impl Into<String>) -> Self {
        self.spec.metric = Some(metric.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.headers.push((name.into(), value.into()));
        self
    }

    pub fn form<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.spec.body = ActionBody::Form(collect_fields(fields));
        self
    }

    pub fn query<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.spec.body = ActionBody::Query(collect_fields(fields));
        self
    }

    /// Multipart body from an ordered field list and its values.
    ///
    /// Every name must have exactly one value and vice versa; a mismatch is
    /// a contract violation rather than a silently truncated body.
    pub fn multipart(
        mut self,
        names: &[&str],
        values: &HashMap<String, String>,
        file: Option<FilePart>,
    ) -> Self {
        if names.len() != values.len() {
            self.fail(format!(
                "{}: multipart body declares {} fields but {} values",
                self.spec.label,
                names.len(),
                values.len()
            ));
            return self;
        }

        let mut fields = Vec::with_capacity(names.len());
        for name in names {
            match values.get(*name) {
                Some(value) => fields.push((name.to_string(), value.clone())),
                None => {
                    self.fail(format!(
                        "{}: multipart field '{}' has no value",
                        self.spec.label, name
                    ));
                    return self;
                }
            }
        }
        self.spec.body = ActionBody::Multipart { fields, file };
        self
    }

    pub fn expect_status(mut self, code: u16) -> Self {
        self.spec.expected_status = Some(ExpectedStatus::one(code));
        self
    }

    pub fn expect_any_status(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.spec.expected_status = Some(ExpectedStatus::any_of(codes));
        self
    }

    /// Expect 302 or 303
    pub fn expect_redirect(mut self) -> Self {
        self.spec.expected_status = Some(ExpectedStatus::redirect());
        self
    }

    /// Expect a redirect whose `Location` matches `pattern`
    pub fn expect_location(mut self, pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(regex) => self.spec.expected_location = Some(regex),
            Err(e) => self.fail(format!("invalid location pattern '{}': {}", pattern, e)),
        }
        self
    }

    /// Attach a closure validator
    pub fn validate<F>(mut self, f: F) -> Self
    where
        F: Fn(&ResponseView<'_>) -> Result<(), Assertion> + Send + Sync + 'static,
    {
        self.spec.validator = Some(Box::new(f));
        self
    }

    /// Attach a boxed validator
    pub fn validator(mut self, validator: Box<dyn Validator>) -> Self {
        self.spec.validator = Some(validator);
        self
    }

    /// Send conditional headers and remember validators for this path
    pub fn enable_cache(mut self) -> Self {
        self.spec.enable_cache = true;
        self
    }

    /// Skip heavy validation once this path's cache behaviour was verified
    pub fn skip_if_cache_available(mut self) -> Self {
        self.spec.skip_if_cache_available = true;
        self
    }

    pub fn build(self) -> BenchResult<ActionSpec> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let path = &self.spec.path;
        let absolute = path.starts_with("http://") || path.starts_with("https://");
        if !absolute && !path.starts_with('/') {
            return Err(BenchError::contract(format!(
                "{}: path '{}' must start with '/' or be an absolute http(s) URL",
                self.spec.label, path
            )));
        }
        if self.spec.label.trim().is_empty() {
            return Err(BenchError::contract(format!(
                "action for '{}' has an empty label",
                path
            )));
        }
        if !self.spec.method.has_body()
            && matches!(self.spec.body, ActionBody::Form(_) | ActionBody::Multipart { .. })
        {
            return Err(BenchError::contract(format!(
                "{}: {} requests cannot carry a form body",
                self.spec.label, self.spec.method
            )));
        }

        Ok(self.spec)
    }
}

fn collect_fields<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Vec<(String, String)>
where
    K: Into<String>,
    V: Into<String>,
{
    fields
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_builder_defaults() {
        let spec = ActionSpec::get("/bulletins").build().unwrap();
        assert_eq!(spec.method(), HttpMethod::Get);
        assert_eq!(spec.label(), "GET /bulletins");
        assert!(spec.expected_status().is_none());
        assert!(spec.validator().is_none());
        assert!(!spec.enable_cache());
    }

    #[test]
    fn test_expected_status_display() {
        assert_eq!(ExpectedStatus::redirect().to_string(), "302 or 303");
        assert_eq!(ExpectedStatus::one(403).to_string(), "403");
        assert!(ExpectedStatus::any_of([200, 304]).matches(304));
    }

    #[test]
    fn test_metric_class() {
        let class = |path: &str| ActionSpec::get(path).build().unwrap().metric_class();
        assert_eq!(class("/"), "root");
        assert_eq!(class("/bulletins/view/10"), "bulletins");
        assert_eq!(class("/Static/app.css?v=2"), "static");
        assert_eq!(class("http://target:8080/users/add"), "users");

        let spec = ActionSpec::get("/css/app.css").metric("staticfile").build().unwrap();
        assert_eq!(spec.metric_class(), "staticfile");
    }

    #[test]
    fn test_relative_path_is_contract_violation() {
        let err = ActionSpec::get("bulletins").build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Contract);
    }

    #[test]
    fn test_multipart_count_mismatch_is_rejected() {
        let mut values = HashMap::new();
        values.insert("username".to_string(), "bob".to_string());

        let err = ActionSpec::post("/users/add")
            .multipart(&["username", "password"], &values, None)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Contract);
        assert!(err.to_string().contains("2 fields but 1 values"));
    }

    #[test]
    fn test_multipart_missing_value_is_rejected() {
        let mut values = HashMap::new();
        values.insert("username".to_string(), "bob".to_string());
        values.insert("nickname".to_string(), "bob-san".to_string());

        let err = ActionSpec::post("/users/add")
            .multipart(&["username", "password"], &values, None)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("'password' has no value"));
    }

    #[test]
    fn test_multipart_keeps_declared_order() {
        let mut values = HashMap::new();
        values.insert("b".to_string(), "2".to_string());
        values.insert("a".to_string(), "1".to_string());

        let spec = ActionSpec::post("/upload")
            .multipart(&["b", "a"], &values, Some(FilePart::new("icon", "x.png", vec![1])))
            .build()
            .unwrap();
        match spec.body() {
            ActionBody::Multipart { fields, file } => {
                assert_eq!(fields[0], ("b".to_string(), "2".to_string()));
                assert_eq!(fields[1], ("a".to_string(), "1".to_string()));
                assert_eq!(file.as_ref().unwrap().field, "icon");
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_invalid_location_pattern() {
        let err = ActionSpec::get("/").expect_location("(").build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Contract);
    }

    #[test]
    fn test_form_on_get_is_rejected() {
        let err = ActionSpec::get("/login")
            .form([("name", "alice")])
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Contract);
    }
}
