//! Compiled scenario steps

use crate::model::{ActionStep, AssertDef, FileDef, RegisterDef};
use crate::template::{is_variable_name, Bindings, Template};
use loadcheck_core::{
    Assertion, ActionSpec, BenchError, BenchResult, FilePart, HttpMethod, ResponseView, Validator,
};
use loadcheck_pool::VirtualUser;
use loadcheck_runner::ScenarioContext;
use parking_lot::Mutex;
use regex::Regex;
use scraper::Selector;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// A step ready to be played
#[derive(Debug)]
pub(crate) enum Step {
    Register { name: Template, secret: Template },
    ClearSession,
    Action(Box<ActionPlan>),
}

impl Step {
    pub(crate) fn register(def: RegisterDef, known: &HashSet<String>) -> Result<Self, String> {
        let name = compile(&def.name, known)?;
        let secret = compile(&def.secret, known)?;
        Ok(Step::Register { name, secret })
    }
}

#[derive(Debug)]
enum BodyPlan {
    Empty,
    Form(Vec<(String, Template)>),
    Query(Vec<(String, Template)>),
    Multipart {
        fields: Vec<(String, Template)>,
        file: Option<FilePlan>,
    },
}

#[derive(Debug)]
struct FilePlan {
    field: String,
    name: String,
    content: FileContent,
    content_type: Option<String>,
}

#[derive(Debug)]
enum FileContent {
    Inline(Template),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone)]
struct Extraction {
    var: String,
    selector: String,
    attr: Option<String>,
}

#[derive(Debug)]
struct AssertPlan {
    selector: String,
    count: Option<usize>,
    text: Option<Template>,
    contains: Option<Template>,
}

/// One HTTP action of a declarative scenario
#[derive(Debug)]
pub(crate) struct ActionPlan {
    method: HttpMethod,
    path: Template,
    label: String,
    metric: Option<String>,
    headers: Vec<(String, Template)>,
    body: BodyPlan,
    expect_status: Option<Vec<u16>>,
    expect_location: Option<Template>,
    enable_cache: bool,
    skip_if_cache_available: bool,
    extract: Vec<Extraction>,
    asserts: Vec<AssertPlan>,
    capture_redirect: Option<String>,
    fatal: bool,
}

impl ActionPlan {
    /// Check `def` and compile its templates.
    ///
    /// `known` holds the variables set by earlier steps; the ones this step
    /// sets are added on success.
    pub(crate) fn compile(
        def: ActionStep,
        base_dir: Option<&Path>,
        known: &mut HashSet<String>,
    ) -> Result<Self, String> {
        let bodies = [def.form.is_some(), def.query.is_some(), def.multipart.is_some()];
        if bodies.iter().filter(|set| **set).count() > 1 {
            return Err("only one of form, query and multipart may be set".to_string());
        }
        if def.file.is_some() && def.multipart.is_none() {
            return Err("file requires a multipart body".to_string());
        }
        if (def.form.is_some() || def.multipart.is_some()) && !def.method.has_body() {
            return Err(format!("{} requests cannot carry a form body", def.method));
        }
        if let Some(status) = &def.expect_status {
            let codes = status.codes();
            if codes.is_empty() {
                return Err("expect_status lists no status codes".to_string());
            }
            if let Some(code) = codes.iter().find(|c| !(100..=599).contains(*c)) {
                return Err(format!("{} is not an HTTP status code", code));
            }
        }
        if def.capture_redirect.is_some()
            && (def.expect_location.is_some() || !def.extract.is_empty() || !def.assert.is_empty())
        {
            return Err(
                "capture_redirect cannot be combined with expect_location, extract or assert"
                    .to_string(),
            );
        }
        if def.skip_if_cache_available && !def.extract.is_empty() {
            return Err("extract cannot be combined with skip_if_cache_available".to_string());
        }

        let path = compile(&def.path, known)?;
        if path.source().trim().is_empty() {
            return Err("path is empty".to_string());
        }

        let expect_location = match &def.expect_location {
            Some(pattern) => {
                let template = compile(pattern, known)?;
                if template.variables().next().is_none() {
                    Regex::new(pattern)
                        .map_err(|e| format!("invalid expect_location '{}': {}", pattern, e))?;
                }
                Some(template)
            }
            None => None,
        };

        let headers = compile_fields(def.headers.into_iter(), known)?;
        let body = if let Some(form) = def.form {
            BodyPlan::Form(compile_fields(form.into_iter(), known)?)
        } else if let Some(query) = def.query {
            BodyPlan::Query(compile_fields(query.into_iter(), known)?)
        } else if let Some(fields) = def.multipart {
            let file = match def.file {
                Some(file) => Some(FilePlan::compile(file, base_dir, known)?),
                None => None,
            };
            BodyPlan::Multipart {
                fields: compile_fields(fields.into_iter(), known)?,
                file,
            }
        } else {
            BodyPlan::Empty
        };

        let asserts = def
            .assert
            .into_iter()
            .map(|a| AssertPlan::compile(a, known))
            .collect::<Result<Vec<_>, _>>()?;

        let mut extract = Vec::with_capacity(def.extract.len());
        for (var, target) in def.extract {
            check_variable_name(&var)?;
            let (selector, attr) = split_extract_target(&target);
            check_selector(selector)?;
            extract.push(Extraction {
                var,
                selector: selector.to_string(),
                attr: attr.map(str::to_string),
            });
        }
        if let Some(var) = &def.capture_redirect {
            check_variable_name(var)?;
        }

        known.extend(extract.iter().map(|e| e.var.clone()));
        known.extend(def.capture_redirect.iter().cloned());

        Ok(Self {
            label: def
                .label
                .unwrap_or_else(|| format!("{} {}", def.method, def.path)),
            method: def.method,
            path,
            metric: def.metric,
            headers,
            body,
            expect_status: def.expect_status.map(|s| s.codes()),
            expect_location,
            enable_cache: def.enable_cache,
            skip_if_cache_available: def.skip_if_cache_available,
            extract,
            asserts,
            capture_redirect: def.capture_redirect,
            fatal: def.fatal,
        })
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    /// Render the action for one attempt
    fn spec(
        &self,
        bindings: &Bindings<'_>,
        captured: &Arc<Mutex<Vec<(String, String)>>>,
    ) -> BenchResult<ActionSpec> {
        let mut builder =
            ActionSpec::builder(self.method, self.path.render(bindings)?).label(&self.label);

        if let Some(metric) = &self.metric {
            builder = builder.metric(metric);
        }
        for (name, value) in &self.headers {
            builder = builder.header(name, value.render(bindings)?);
        }

        builder = match &self.body {
            BodyPlan::Empty => builder,
            BodyPlan::Form(fields) => builder.form(render_fields(fields, bindings)?),
            BodyPlan::Query(fields) => builder.query(render_fields(fields, bindings)?),
            BodyPlan::Multipart { fields, file } => {
                let names: Vec<&str> = fields.iter().map(|(name, _)| name.as_str()).collect();
                let values: HashMap<String, String> =
                    render_fields(fields, bindings)?.into_iter().collect();
                let file = match file {
                    Some(file) => Some(file.render(bindings)?),
                    None => None,
                };
                builder.multipart(&names, &values, file)
            }
        };

        builder = match self.expect_status.as_deref() {
            Some([code]) => builder.expect_status(*code),
            Some(codes) => builder.expect_any_status(codes.iter().copied()),
            None => builder,
        };
        if let Some(location) = &self.expect_location {
            builder = builder.expect_location(&location.render(bindings)?);
        }
        if self.enable_cache {
            builder = builder.enable_cache();
        }
        if self.skip_if_cache_available {
            builder = builder.skip_if_cache_available();
        }

        if !self.asserts.is_empty() || !self.extract.is_empty() {
            let checks = self
                .asserts
                .iter()
                .map(|a| a.render(bindings))
                .collect::<BenchResult<Vec<_>>>()?;
            builder = builder.validator(Box::new(StepValidator {
                checks,
                extract: self.extract.clone(),
                captured: Arc::clone(captured),
            }));
        }

        builder.build()
    }

    /// Play the action as `user`, storing extracted values in `vars`
    pub(crate) async fn play(
        &self,
        ctx: &ScenarioContext,
        user: &mut VirtualUser,
        vars: &mut HashMap<String, String>,
    ) -> BenchResult<()> {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let spec = {
            let credentials = user.credentials().clone();
            let bindings = Bindings {
                credentials: &credentials,
                vars: &*vars,
                rng: ctx.rng(),
            };
            self.spec(&bindings, &captured)?
        };

        let mut player = ctx.player(user);
        let outcome = match &self.capture_redirect {
            Some(var) => player
                .play_capturing_redirect(ctx.run(), spec)
                .await
                .map(|target| {
                    vars.insert(var.clone(), target);
                }),
            None => player.play(ctx.run(), spec).await,
        };

        match outcome {
            Ok(()) => {
                vars.extend(captured.lock().drain(..));
                Ok(())
            }
            Err(err @ BenchError::Check { .. }) if self.fatal => Err(err.escalate()),
            Err(err) => Err(err),
        }
    }
}

impl FilePlan {
    fn compile(def: FileDef, base_dir: Option<&Path>, known: &HashSet<String>) -> Result<Self, String> {
        let content = match (def.content, def.source) {
            (Some(inline), None) => FileContent::Inline(compile(&inline, known)?),
            (None, Some(source)) => {
                let path = match base_dir {
                    Some(dir) => dir.join(&source),
                    None => source.clone().into(),
                };
                let bytes = std::fs::read(&path)
                    .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
                FileContent::Bytes(bytes)
            }
            _ => return Err("file needs exactly one of content and source".to_string()),
        };
        Ok(Self {
            field: def.field,
            name: def.name,
            content,
            content_type: def.content_type,
        })
    }

    fn render(&self, bindings: &Bindings<'_>) -> BenchResult<FilePart> {
        let bytes = match &self.content {
            FileContent::Inline(template) => template.render(bindings)?.into_bytes(),
            FileContent::Bytes(bytes) => bytes.clone(),
        };
        let part = FilePart::new(&self.field, &self.name, bytes);
        Ok(match &self.content_type {
            Some(content_type) => part.with_content_type(content_type),
            None => part,
        })
    }
}

impl AssertPlan {
    fn compile(def: AssertDef, known: &HashSet<String>) -> Result<Self, String> {
        check_selector(&def.selector)?;
        if def.count.is_none() && def.text.is_none() && def.contains.is_none() {
            return Err(format!(
                "assertion on '{}' needs count, text or contains",
                def.selector
            ));
        }
        Ok(Self {
            text: def.text.as_deref().map(|t| compile(t, known)).transpose()?,
            contains: def.contains.as_deref().map(|t| compile(t, known)).transpose()?,
            selector: def.selector,
            count: def.count,
        })
    }

    fn render(&self, bindings: &Bindings<'_>) -> BenchResult<StructuralCheck> {
        Ok(StructuralCheck {
            selector: self.selector.clone(),
            count: self.count,
            text: self.text.as_ref().map(|t| t.render(bindings)).transpose()?,
            contains: self.contains.as_ref().map(|t| t.render(bindings)).transpose()?,
        })
    }
}

/// Assertion with its templates expanded
#[derive(Debug)]
struct StructuralCheck {
    selector: String,
    count: Option<usize>,
    text: Option<String>,
    contains: Option<String>,
}

impl StructuralCheck {
    fn verify(&self, response: &ResponseView<'_>) -> Result<(), Assertion> {
        let selector = &self.selector;
        if let Some(expected) = self.count {
            let found = response.count(selector)?;
            if found != expected {
                return Err(Assertion::new(format!(
                    "expected {} elements matching '{}', found {}",
                    expected, selector, found
                )));
            }
        }
        if let Some(expected) = &self.text {
            match response.first_text(selector)? {
                Some(actual) if &actual == expected => {}
                Some(actual) => {
                    return Err(Assertion::new(format!(
                        "'{}' reads '{}', expected '{}'",
                        selector, actual, expected
                    )))
                }
                None => return Err(Assertion::new(format!("nothing matches '{}'", selector))),
            }
        }
        if let Some(needle) = &self.contains {
            let texts = response.select_texts(selector)?;
            if !texts.iter().any(|text| text.contains(needle.as_str())) {
                return Err(Assertion::new(format!(
                    "no element matching '{}' contains '{}'",
                    selector, needle
                )));
            }
        }
        Ok(())
    }
}

/// Runs the structural checks of a step, then records its extractions.
///
/// Values are handed back through `captured` because the player owns the
/// parsed document only for the duration of validation.
struct StepValidator {
    checks: Vec<StructuralCheck>,
    extract: Vec<Extraction>,
    captured: Arc<Mutex<Vec<(String, String)>>>,
}

impl Validator for StepValidator {
    fn validate(&self, response: &ResponseView<'_>) -> Result<(), Assertion> {
        for check in &self.checks {
            check.verify(response)?;
        }

        let mut values = Vec::with_capacity(self.extract.len());
        for extraction in &self.extract {
            let value = match &extraction.attr {
                Some(attr) => response.first_attr(&extraction.selector, attr)?,
                None => response.first_text(&extraction.selector)?,
            };
            let value = value.ok_or_else(|| {
                Assertion::new(format!(
                    "nothing matches '{}' to extract {}",
                    extraction.selector, extraction.var
                ))
            })?;
            values.push((extraction.var.clone(), value));
        }

        *self.captured.lock() = values;
        Ok(())
    }
}

/// Parse `source` and require every variable it reads to be set already
pub(crate) fn compile(source: &str, known: &HashSet<String>) -> Result<Template, String> {
    let template = Template::parse(source).map_err(|e| e.to_string())?;
    if let Some(unknown) = template.variables().find(|v| !known.contains(*v)) {
        return Err(format!(
            "template '{}' refers to unknown variable '{}'",
            source, unknown
        ));
    }
    Ok(template)
}

fn compile_fields(
    fields: impl Iterator<Item = (String, String)>,
    known: &HashSet<String>,
) -> Result<Vec<(String, Template)>, String> {
    fields
        .map(|(name, value)| Ok((name, compile(&value, known)?)))
        .collect()
}

fn render_fields(
    fields: &[(String, Template)],
    bindings: &Bindings<'_>,
) -> BenchResult<Vec<(String, String)>> {
    fields
        .iter()
        .map(|(name, value)| Ok((name.clone(), value.render(bindings)?)))
        .collect()
}

pub(crate) fn check_variable_name(name: &str) -> Result<(), String> {
    if name == "user" || !is_variable_name(name) {
        return Err(format!("'{}' is not a usable variable name", name));
    }
    Ok(())
}

fn check_selector(selector: &str) -> Result<(), String> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|_| format!("invalid selector '{}'", selector))
}

/// Split `selector@attr`; a trailing part that is not an attribute name
/// stays in the selector
fn split_extract_target(target: &str) -> (&str, Option<&str>) {
    match target.rsplit_once('@') {
        Some((selector, attr))
            if !selector.trim().is_empty()
                && !attr.is_empty()
                && attr
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':') =>
        {
            (selector.trim(), Some(attr))
        }
        _ => (target.trim(), None),
    }
}
