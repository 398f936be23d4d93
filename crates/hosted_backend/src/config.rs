//! Connection settings for the hosted service.

use url::Url;

use crate::{ClientError, ClientResult};

/// Protocol version sent when opening the realtime socket.
pub const REALTIME_PROTOCOL_VERSION: &str = "1.0.0";

/// Where the hosted service lives and how to authenticate with it.
#[derive(Debug, Clone)]
pub struct HostedConfig {
    base_url: Url,
    api_key: String,
    access_token: Option<String>,
}

impl HostedConfig {
    /// Creates a configuration authenticated with the project's API key.
    pub fn new(base_url: &str, api_key: impl Into<String>) -> ClientResult<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            api_key: api_key.into(),
            access_token: None,
        })
    }

    /// Uses a signed-in user's token instead of the API key as bearer.
    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = Some(access_token.into());
        self
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Token sent in the `Authorization` header.
    pub fn bearer_token(&self) -> &str {
        self.access_token.as_deref().unwrap_or(&self.api_key)
    }

    /// REST endpoint of `table`.
    pub fn rest_url(&self, table: &str) -> ClientResult<Url> {
        self.base_url
            .join(&format!("rest/v1/{}", table))
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))
    }

    /// Websocket endpoint of the realtime service.
    pub fn realtime_url(&self) -> ClientResult<Url> {
        let mut url = self
            .base_url
            .join("realtime/v1/websocket")
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::InvalidUrl(format!("cannot use {} for {}", scheme, url)))?;
        url.query_pairs_mut()
            .append_pair("apikey", &self.api_key)
            .append_pair("vsn", REALTIME_PROTOCOL_VERSION);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rest_url() {
        let config = HostedConfig::new("https://project.example.co", "anon").unwrap();
        assert_eq!(
            config.rest_url("todos").unwrap().as_str(),
            "https://project.example.co/rest/v1/todos"
        );
    }

    #[test]
    fn test_base_path_is_kept() {
        let config = HostedConfig::new("http://localhost:54321/proxy", "anon").unwrap();
        assert_eq!(
            config.rest_url("profiles").unwrap().as_str(),
            "http://localhost:54321/proxy/rest/v1/profiles"
        );
    }

    #[test]
    fn test_realtime_url() {
        let config = HostedConfig::new("https://project.example.co", "anon").unwrap();
        assert_eq!(
            config.realtime_url().unwrap().as_str(),
            "wss://project.example.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );

        let local = HostedConfig::new("http://localhost:54321", "anon").unwrap();
        assert!(local.realtime_url().unwrap().as_str().starts_with("ws://"));
    }

    #[test]
    fn test_bearer_token() {
        let config = HostedConfig::new("https://project.example.co", "anon").unwrap();
        assert_eq!(config.bearer_token(), "anon");
        assert_eq!(config.with_access_token("jwt").bearer_token(), "jwt");
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            HostedConfig::new("not a url", "anon"),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
