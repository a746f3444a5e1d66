//! The shared HTTP session of one run.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::config::SessionConfig;
use crate::error::FanoutError;

/// One connection-pooling client shared read-only by every worker.
///
/// The runner acquires it before spawning workers and drops its handle only
/// after every worker has stopped.
#[derive(Debug, Clone)]
pub struct Session {
    client: reqwest::Client,
}

impl Session {
    pub fn acquire(config: &SessionConfig) -> Result<Self, FanoutError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout()? {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = config.connect_timeout()? {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(agent) = &config.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        if config.no_proxy {
            builder = builder.no_proxy();
        }
        if !config.default_headers.is_empty() {
            builder = builder.default_headers(header_map(&config.default_headers)?);
        }

        let client = builder.build().map_err(FanoutError::Session)?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

fn header_map<'a, I>(headers: I) -> Result<HeaderMap, FanoutError>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| FanoutError::Config(format!("header name `{name}`: {e}")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| FanoutError::Config(format!("header `{name}` value: {e}")))?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}
