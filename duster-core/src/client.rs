use reqwest::header::{COOKIE, LAST_MODIFIED};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use thiserror::Error;
use time::OffsetDateTime;
use url::Url;

use crate::fetch::{Fetched, RemoteMeta, ResourceFetcher};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("{locator} returned {status}")]
    Status { status: StatusCode, locator: String },
    #[error("{0} did not report a Last-Modified date")]
    MissingLastModified(String),
    #[error("{locator} reported an unreadable Last-Modified date: {value}")]
    InvalidLastModified { locator: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

/// Fetches course files over HTTP, reusing the session cookie of whatever
/// discovered the content tree.
#[derive(Clone)]
pub struct HttpFetcher {
    http: Client,
    base_url: Url,
    cookie: Option<String>,
}

impl HttpFetcher {
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            cookie: None,
        })
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    /// Absolute locators are kept as they are; relative ones hang off the
    /// base url.
    pub fn resolve(&self, locator: &str) -> Result<Url, FetchError> {
        Ok(self.base_url.join(locator)?)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.http.request(method, url);
        match &self.cookie {
            Some(cookie) => request.header(COOKIE, cookie.as_str()),
            None => request,
        }
    }

    fn check_status(response: Response, locator: &str) -> Result<Response, FetchError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(FetchError::Status {
                status: response.status(),
                locator: locator.to_string(),
            })
        }
    }
}

impl ResourceFetcher for HttpFetcher {
    async fn head(&self, locator: &str) -> Result<RemoteMeta, FetchError> {
        let url = self.resolve(locator)?;
        let response = self.request(Method::HEAD, url).send().await?;
        let response = Self::check_status(response, locator)?;
        let value = response
            .headers()
            .get(LAST_MODIFIED)
            .ok_or_else(|| FetchError::MissingLastModified(locator.to_string()))?;
        let invalid = || FetchError::InvalidLastModified {
            locator: locator.to_string(),
            value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
        };
        let text = value.to_str().map_err(|_| invalid())?;
        let parsed = httpdate::parse_http_date(text.trim()).map_err(|_| invalid())?;
        Ok(RemoteMeta {
            last_modified: OffsetDateTime::from(parsed),
        })
    }

    async fn get(&self, locator: &str) -> Result<Fetched, FetchError> {
        let url = self.resolve(locator)?;
        let response = self.request(Method::GET, url).send().await?;
        let response = Self::check_status(response, locator)?;
        let resolved = response.url().clone();
        let bytes = response.bytes().await?.to_vec();
        Ok(Fetched { resolved, bytes })
    }
}

impl FetchError {
    pub fn classification(&self) -> Option<ErrorClass> {
        match self {
            FetchError::Status { status, .. } => Some(classify_status(*status)),
            FetchError::Request(err) if err.is_timeout() || err.is_connect() => {
                Some(ErrorClass::Transient)
            }
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            Some(ErrorClass::RateLimit | ErrorClass::Transient)
        )
    }
}

fn classify_status(status: StatusCode) -> ErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(status, StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_EARLY)
    {
        ErrorClass::Transient
    } else {
        ErrorClass::Permanent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_statuses() {
        assert_eq!(classify_status(StatusCode::FORBIDDEN), ErrorClass::Auth);
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            ErrorClass::RateLimit
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY),
            ErrorClass::Transient
        );
        assert_eq!(classify_status(StatusCode::NOT_FOUND), ErrorClass::Permanent);
    }

    #[test]
    fn missing_date_is_not_retryable() {
        let err = FetchError::MissingLastModified("/file".into());
        assert_eq!(err.classification(), None);
        assert!(!err.is_retryable());
    }

    #[test]
    fn resolves_relative_and_absolute_locators() {
        let fetcher = HttpFetcher::new("https://lms.example/webapps/").unwrap();
        assert_eq!(
            fetcher.resolve("/bbcswebdav/week1.pdf").unwrap().as_str(),
            "https://lms.example/bbcswebdav/week1.pdf"
        );
        assert_eq!(
            fetcher
                .resolve("https://cdn.example/week1.pdf")
                .unwrap()
                .as_str(),
            "https://cdn.example/week1.pdf"
        );
    }
}
