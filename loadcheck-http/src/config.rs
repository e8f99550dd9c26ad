//! HTTP settings shared by every player of a run

use crate::errors::HttpError;
use loadcheck_config::LoadcheckConfig;
use loadcheck_pool::SessionSettings;
use url::Url;

/// Target base URL plus the client settings of every user session
#[derive(Debug, Clone)]
pub struct HttpSettings {
    base_url: Url,
    session: SessionSettings,
}

impl HttpSettings {
    /// Settings for `base_url` with default session settings
    pub fn new(base_url: &str) -> Result<Self, HttpError> {
        let base_url = Url::parse(base_url).map_err(|source| HttpError::InvalidUrl {
            url: base_url.to_string(),
            source,
        })?;
        match base_url.scheme() {
            "http" | "https" => {}
            other => return Err(HttpError::UnsupportedScheme(other.to_string())),
        }
        Ok(Self {
            base_url,
            session: SessionSettings::default(),
        })
    }

    pub fn with_session(mut self, session: SessionSettings) -> Self {
        self.session = session;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn session(&self) -> &SessionSettings {
        &self.session
    }

    /// Resolve an action path (absolute path or absolute URL) to a URL
    pub fn resolve(&self, path: &str) -> Result<Url, HttpError> {
        self.base_url
            .join(path)
            .map_err(|source| HttpError::InvalidUrl {
                url: path.to_string(),
                source,
            })
    }

    /// How a URL appears to scenarios: path and query when it points at the
    /// target, the full URL otherwise
    pub fn display_url(&self, url: &Url) -> String {
        if url.origin() != self.base_url.origin() {
            return url.to_string();
        }
        match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        }
    }
}

impl TryFrom<&LoadcheckConfig> for HttpSettings {
    type Error = HttpError;

    fn try_from(config: &LoadcheckConfig) -> Result<Self, Self::Error> {
        let session = SessionSettings {
            timeout: config.http.timeout,
            connect_timeout: config.http.connect_timeout,
            user_agent: config.http.user_agent.clone(),
            accept_invalid_certs: config.target.accept_invalid_certs,
            max_idle_per_host: config.http.max_idle_per_host,
        };
        Ok(Self::new(&config.target.url)?.with_session(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_resolve_and_display() {
        let settings = HttpSettings::new("http://target.test:8080").unwrap();

        let url = settings.resolve("/bulletins?page=2").unwrap();
        assert_eq!(url.as_str(), "http://target.test:8080/bulletins?page=2");
        assert_eq!(settings.display_url(&url), "/bulletins?page=2");

        let other = settings.resolve("https://cdn.test/app.css").unwrap();
        assert_eq!(settings.display_url(&other), "https://cdn.test/app.css");
    }

    #[test]
    fn test_rejects_non_http_base() {
        assert!(matches!(
            HttpSettings::new("ftp://target.test"),
            Err(HttpError::UnsupportedScheme(_))
        ));
        assert!(HttpSettings::new("target.test").is_err());
    }

    #[test]
    fn test_from_config() {
        let mut config = LoadcheckConfig::default();
        config.target.url = "http://bench:9000".to_string();
        config.http.timeout = Duration::from_secs(3);

        let settings = HttpSettings::try_from(&config).unwrap();
        assert_eq!(settings.base_url().as_str(), "http://bench:9000/");
        assert_eq!(settings.session().timeout, Duration::from_secs(3));
    }
}
