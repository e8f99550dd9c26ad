//! Action player

use crate::config::HttpSettings;
use crate::errors::HttpError;
use loadcheck_core::{
    ActionBody, ActionSpec, BenchError, BenchResult, Document, FilePart, ResponseView, RunContext,
    Validator,
};
use loadcheck_metrics::Counters;
use loadcheck_pool::{CacheRecord, VirtualUser};
use reqwest::header::{HeaderMap, CONTENT_TYPE, ETAG, LAST_MODIFIED, LOCATION};
use reqwest::multipart;
use reqwest::RequestBuilder;
use tracing::{debug, warn};
use url::Url;

/// A received response, fully buffered
struct Exchange {
    url: Url,
    status: u16,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Exchange {
    fn header(&self, name: reqwest::header::HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Plays actions for one leased user.
///
/// The player borrows the user mutably, so every action of a lease runs
/// strictly in sequence.
pub struct ActionPlayer<'a> {
    user: &'a mut VirtualUser,
    counters: &'a Counters,
    settings: &'a HttpSettings,
}

impl<'a> ActionPlayer<'a> {
    pub fn new(user: &'a mut VirtualUser, counters: &'a Counters, settings: &'a HttpSettings) -> Self {
        Self {
            user,
            counters,
            settings,
        }
    }

    pub fn user(&self) -> &VirtualUser {
        self.user
    }

    pub fn counters(&self) -> &Counters {
        self.counters
    }

    /// Issue the request described by `spec` and evaluate its expectations.
    ///
    /// Redirects are never followed. Status and location mismatches and
    /// validator assertions are soft failures; a body that cannot be decoded
    /// as its declared content type is fatal.
    pub async fn play(&mut self, ctx: &RunContext, spec: ActionSpec) -> BenchResult<()> {
        let exchange = self.send(ctx, &spec).await?;
        self.evaluate(&spec, &exchange)
    }

    /// Issue the request and return its redirect target instead of
    /// validating it.
    ///
    /// The target is resolved against the request URL and returned as path
    /// and query when it stays on the target service.
    pub async fn play_capturing_redirect(
        &mut self,
        ctx: &RunContext,
        spec: ActionSpec,
    ) -> BenchResult<String> {
        let exchange = self.send(ctx, &spec).await?;
        let label = spec.label();

        match spec.expected_status() {
            Some(expected) if !expected.matches(exchange.status) => {
                return Err(BenchError::check(
                    label,
                    format!("expected {}, got {}", expected, exchange.status),
                ));
            }
            None if !(300..400).contains(&exchange.status) => {
                return Err(BenchError::check(
                    label,
                    format!("expected a redirect, got {}", exchange.status),
                ));
            }
            _ => {}
        }

        self.location(label, &exchange)?.ok_or_else(|| {
            BenchError::check(
                label,
                format!("status {} without a Location header", exchange.status),
            )
        })
    }

    /// Drop the bound user's cookies; the pool is not involved
    pub fn clear_session(&mut self) {
        self.user.reset_session();
    }

    async fn send(&mut self, ctx: &RunContext, spec: &ActionSpec) -> BenchResult<Exchange> {
        if ctx.is_cancelled() {
            return Err(BenchError::Cancelled);
        }

        let label = spec.label();
        let url = self.settings.resolve(spec.path())?;
        let request = self.build_request(spec, url.clone())?;

        debug!(
            user = %self.user.name(),
            method = %spec.method(),
            %url,
            "Playing {}", label
        );

        let result = tokio::select! {
            _ = ctx.cancelled() => {
                debug!("Run cancelled while {} was in flight", label);
                return Err(BenchError::Cancelled);
            }
            result = receive(request) => result,
        };

        match result {
            Ok(exchange) => {
                self.counters
                    .increment(&format!("{}-{}", spec.metric_class(), exchange.status));
                Ok(exchange)
            }
            Err(err) => Err(self.transport_failure(spec, err)),
        }
    }

    fn build_request(&self, spec: &ActionSpec, url: Url) -> BenchResult<RequestBuilder> {
        let session = self.user.session();
        let mut request = session.client().request(spec.method().into(), url);

        for (name, value) in spec.headers() {
            request = request.header(name.as_str(), value.as_str());
        }

        if spec.enable_cache() {
            if let Some(record) = session.cache_record(spec.path()) {
                for (name, value) in record.conditional_headers() {
                    request = request.header(name, value);
                }
            }
        }

        let request = match spec.body() {
            ActionBody::Empty => request,
            ActionBody::Form(fields) => request.form(fields),
            ActionBody::Query(fields) => request.query(fields),
            ActionBody::Multipart { fields, file } => {
                request.multipart(multipart_form(fields, file.as_ref())?)
            }
        };
        Ok(request)
    }

    /// Ordered evaluation of a received response
    fn evaluate(&mut self, spec: &ActionSpec, exchange: &Exchange) -> BenchResult<()> {
        let label = spec.label();
        let cached = spec.skip_if_cache_available()
            && self
                .user
                .session()
                .cache_record(spec.path())
                .is_some_and(|record| record.verified);

        // Decoded up front: a malformed body is fatal whatever else is declared
        let document = match spec.validator() {
            Some(_) if !cached => Some(decode(label, exchange)?),
            _ => None,
        };

        // A verified cache entry turns the status set into 200 or 304
        if cached {
            if exchange.status != 200 && exchange.status != 304 {
                return Err(BenchError::check(
                    label,
                    format!("expected 200 or 304, got {}", exchange.status),
                ));
            }
        } else if let Some(expected) = spec.expected_status() {
            if !expected.matches(exchange.status) {
                return Err(BenchError::check(
                    label,
                    format!("expected {}, got {}", expected, exchange.status),
                ));
            }
        }

        if let Some(pattern) = spec.expected_location() {
            match self.location(label, exchange)? {
                Some(location) if pattern.is_match(&location) => {}
                Some(location) => {
                    return Err(BenchError::check(
                        label,
                        format!("expected redirect to {}, got {}", pattern, location),
                    ));
                }
                None => {
                    return Err(BenchError::check(
                        label,
                        format!(
                            "expected redirect to {}, got status {} without a Location header",
                            pattern, exchange.status
                        ),
                    ));
                }
            }
        }

        if let (Some(validator), Some(document)) = (spec.validator(), document.as_ref()) {
            validate(label, validator, exchange, document)?;
        }

        if spec.enable_cache() {
            self.remember(spec.path(), exchange);
        }

        Ok(())
    }

    fn remember(&mut self, key: &str, exchange: &Exchange) {
        let session = self.user.session_mut();
        match exchange.status {
            304 => {
                let mut record = session.cache_record(key).cloned().unwrap_or_default();
                record.verified = true;
                session.store_cache_record(key, record);
            }
            200..=299 => {
                let record = CacheRecord {
                    etag: exchange.header(ETAG).map(str::to_string),
                    last_modified: exchange.header(LAST_MODIFIED).map(str::to_string),
                    verified: true,
                };
                session.store_cache_record(key, record);
            }
            _ => {}
        }
    }

    /// `Location` resolved against the request URL, in display form
    fn location(&self, label: &str, exchange: &Exchange) -> BenchResult<Option<String>> {
        let Some(raw) = exchange.header(LOCATION) else {
            return Ok(None);
        };
        let resolved = exchange.url.join(raw).map_err(|e| {
            BenchError::check(label, format!("unparsable Location '{}': {}", raw, e))
        })?;
        Ok(Some(self.settings.display_url(&resolved)))
    }

    fn transport_failure(&self, spec: &ActionSpec, err: reqwest::Error) -> BenchError {
        let label = spec.label();
        if err.is_builder() {
            return BenchError::contract(format!("{}: {}", label, err));
        }

        if err.is_timeout() {
            warn!("{} timed out", label);
            self.counters
                .increment(&format!("{}-timeout", spec.metric_class()));
            BenchError::timeout(label)
        } else {
            warn!("{} failed: {}", label, err);
            self.counters
                .increment(&format!("{}-transport-error", spec.metric_class()));
            BenchError::transport(label, err.to_string())
        }
    }
}

async fn receive(request: RequestBuilder) -> Result<Exchange, reqwest::Error> {
    let response = request.send().await?;
    let url = response.url().clone();
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();
    Ok(Exchange {
        url,
        status,
        headers,
        body,
    })
}

fn multipart_form(
    fields: &[(String, String)],
    file: Option<&FilePart>,
) -> Result<multipart::Form, HttpError> {
    let mut form = multipart::Form::new();
    for (name, value) in fields {
        form = form.text(name.clone(), value.clone());
    }
    if let Some(file) = file {
        let part = multipart::Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type)
            .map_err(HttpError::InvalidFilePart)?;
        form = form.part(file.field.clone(), part);
    }
    Ok(form)
}

fn decode(label: &str, exchange: &Exchange) -> BenchResult<Document> {
    Document::decode(exchange.header(CONTENT_TYPE), &exchange.body)
        .map_err(|e| BenchError::fatal(label, e.to_string()))
}

fn validate(
    label: &str,
    validator: &dyn Validator,
    exchange: &Exchange,
    document: &Document,
) -> BenchResult<()> {
    let view = ResponseView {
        status: exchange.status,
        url: exchange.url.as_str(),
        headers: &exchange.headers,
        body: &exchange.body,
        document,
    };
    validator
        .validate(&view)
        .map_err(|assertion| BenchError::check(label, assertion.reason))
}
