//! Response views handed to structural validators

use http::HeaderMap;
use scraper::{Html, Selector};
use serde_json::Value as JsonValue;
use std::borrow::Cow;
use thiserror::Error;

/// A structural assertion that did not hold.
///
/// Validators return this to report a soft failure; the player attaches the
/// action label before surfacing it as a [`crate::BenchError::Check`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct Assertion {
    pub reason: String,
}

impl Assertion {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<String> for Assertion {
    fn from(reason: String) -> Self {
        Self { reason }
    }
}

impl From<&str> for Assertion {
    fn from(reason: &str) -> Self {
        Self::new(reason)
    }
}

/// Fail with `reason` unless `condition` holds
pub fn ensure(condition: bool, reason: impl Into<String>) -> Result<(), Assertion> {
    if condition {
        Ok(())
    } else {
        Err(Assertion::new(reason))
    }
}

/// Structural validation capability attached to an action
pub trait Validator: Send + Sync {
    fn validate(&self, response: &ResponseView<'_>) -> Result<(), Assertion>;
}

impl<F> Validator for F
where
    F: Fn(&ResponseView<'_>) -> Result<(), Assertion> + Send + Sync,
{
    fn validate(&self, response: &ResponseView<'_>) -> Result<(), Assertion> {
        self(response)
    }
}

/// Body decoding failures; the player treats these as fatal
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("response declared as {content_type} is not valid UTF-8")]
    NotUtf8 { content_type: String },

    #[error("response declared as {content_type} is not valid JSON: {source}")]
    Json {
        content_type: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Decoded response body
#[derive(Debug)]
pub enum Document {
    /// `text/html` or `application/xhtml+xml`
    Markup(Html),
    /// `application/json` and `+json` media types
    Json(JsonValue),
    /// Any other `text/*` body
    Text(String),
    /// Everything else, including bodiless 304 responses
    Binary,
}

impl Document {
    /// Decode `body` according to its declared content type
    pub fn decode(content_type: Option<&str>, body: &[u8]) -> Result<Self, DecodeError> {
        let media_type = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .unwrap_or_default();

        if media_type == "text/html" || media_type == "application/xhtml+xml" {
            let text = std::str::from_utf8(body).map_err(|_| DecodeError::NotUtf8 {
                content_type: media_type.clone(),
            })?;
            return Ok(Document::Markup(Html::parse_document(text)));
        }

        if media_type == "application/json" || media_type.ends_with("+json") {
            let value = serde_json::from_slice(body).map_err(|source| DecodeError::Json {
                content_type: media_type.clone(),
                source,
            })?;
            return Ok(Document::Json(value));
        }

        if media_type.starts_with("text/") {
            return Ok(Document::Text(String::from_utf8_lossy(body).into_owned()));
        }

        Ok(Document::Binary)
    }
}

/// What a validator sees of a played action
#[derive(Debug)]
pub struct ResponseView<'a> {
    /// HTTP status code
    pub status: u16,
    /// Request URL the response belongs to
    pub url: &'a str,
    /// Response headers
    pub headers: &'a HeaderMap,
    /// Raw body bytes
    pub body: &'a [u8],
    /// Decoded body
    pub document: &'a Document,
}

impl<'a> ResponseView<'a> {
    /// Header value as a string, if present and valid ASCII
    pub fn header(&self, name: &str) -> Option<&'a str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Body as text, replacing invalid UTF-8
    pub fn text(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.body)
    }

    pub fn html(&self) -> Result<&'a Html, Assertion> {
        match self.document {
            Document::Markup(html) => Ok(html),
            _ => Err(Assertion::new("response is not an HTML document")),
        }
    }

    pub fn json(&self) -> Result<&'a JsonValue, Assertion> {
        match self.document {
            Document::Json(value) => Ok(value),
            _ => Err(Assertion::new("response is not a JSON document")),
        }
    }

    /// Trimmed text content of every element matching `css`
    pub fn select_texts(&self, css: &str) -> Result<Vec<String>, Assertion> {
        let selector = parse_selector(css)?;
        Ok(self
            .html()?
            .select(&selector)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .collect())
    }

    /// Trimmed text content of the first element matching `css`
    pub fn first_text(&self, css: &str) -> Result<Option<String>, Assertion> {
        Ok(self.select_texts(css)?.into_iter().next())
    }

    /// Attribute `attr` of the first element matching `css`
    pub fn first_attr(&self, css: &str, attr: &str) -> Result<Option<String>, Assertion> {
        let selector = parse_selector(css)?;
        Ok(self
            .html()?
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr(attr))
            .map(str::to_string))
    }

    /// Number of elements matching `css`
    pub fn count(&self, css: &str) -> Result<usize, Assertion> {
        let selector = parse_selector(css)?;
        Ok(self.html()?.select(&selector).count())
    }
}

fn parse_selector(css: &str) -> Result<Selector, Assertion> {
    Selector::parse(css).map_err(|_| Assertion::new(format!("invalid selector '{}'", css)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <nav><a id="menu01">alice</a></nav>
        <form><input name="csrf_token" value="tok-123"></form>
        <ul><li>one</li><li> two </li></ul>
    </body></html>"#;

    fn view<'a>(headers: &'a HeaderMap, document: &'a Document, body: &'a [u8]) -> ResponseView<'a> {
        ResponseView {
            status: 200,
            url: "http://target/",
            headers,
            body,
            document,
        }
    }

    #[test]
    fn test_decode_markup() {
        let doc = Document::decode(Some("text/html; charset=utf-8"), PAGE.as_bytes()).unwrap();
        assert!(matches!(doc, Document::Markup(_)));
    }

    #[test]
    fn test_decode_markup_rejects_invalid_utf8() {
        let err = Document::decode(Some("text/html"), &[0x3c, 0xff, 0xfe, 0x3e]).unwrap_err();
        assert!(matches!(err, DecodeError::NotUtf8 { .. }));
    }

    #[test]
    fn test_decode_json() {
        let doc = Document::decode(Some("application/json"), br#"{"ok":true}"#).unwrap();
        assert!(matches!(doc, Document::Json(_)));

        let err = Document::decode(Some("application/problem+json"), b"{oops").unwrap_err();
        assert!(matches!(err, DecodeError::Json { .. }));
    }

    #[test]
    fn test_decode_other_types() {
        assert!(matches!(
            Document::decode(Some("text/css"), b"body{}").unwrap(),
            Document::Text(_)
        ));
        assert!(matches!(
            Document::decode(Some("image/png"), &[0x89, 0x50]).unwrap(),
            Document::Binary
        ));
        assert!(matches!(Document::decode(None, b"").unwrap(), Document::Binary));
    }

    #[test]
    fn test_selectors() {
        let headers = HeaderMap::new();
        let doc = Document::decode(Some("text/html"), PAGE.as_bytes()).unwrap();
        let view = view(&headers, &doc, PAGE.as_bytes());

        assert_eq!(view.first_text("#menu01").unwrap().as_deref(), Some("alice"));
        assert_eq!(
            view.first_attr("form > input", "value").unwrap().as_deref(),
            Some("tok-123")
        );
        assert_eq!(view.count("ul > li").unwrap(), 2);
        assert_eq!(view.select_texts("ul > li").unwrap(), vec!["one", "two"]);
        assert!(view.count("ul >>> li").is_err());
        assert!(view.json().is_err());
    }

    #[test]
    fn test_closure_validator() {
        let headers = HeaderMap::new();
        let doc = Document::decode(Some("text/html"), PAGE.as_bytes()).unwrap();
        let view = view(&headers, &doc, PAGE.as_bytes());

        let validator = |res: &ResponseView<'_>| {
            let name = res.first_text("#menu01")?;
            ensure(name.as_deref() == Some("bob"), "greeting does not name bob")
        };
        let err = Validator::validate(&validator, &view).unwrap_err();
        assert_eq!(err.reason, "greeting does not name bob");
    }
}
