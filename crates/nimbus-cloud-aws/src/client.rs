//! Signed EC2 query-protocol transport

use crate::endpoint::ec2_host;
use crate::error::{AwsError, Result};
use crate::signing::{HttpMethod, UnsignedRequest, sign};
use chrono::Utc;
use nimbus_cloud::{Credentials, ProviderError, RegionContext};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Query API version sent with every call
pub const API_VERSION: &str = "2013-02-01";

pub const SERVICE: &str = "ec2";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Connection settings for an [`Ec2Client`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub region: String,
    pub credentials: Credentials,

    /// Base URL replacing `https://ec2.<region>.<suffix>`
    pub endpoint: Option<String>,

    /// Tunnel every request through this proxy
    pub proxy: Option<String>,

    pub method: HttpMethod,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(region: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            region: region.into(),
            credentials,
            endpoint: None,
            proxy: None,
            method: HttpMethod::Post,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_region(region: &RegionContext) -> Self {
        Self::new(region.region.clone(), region.credentials.clone())
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// EC2 client issuing signed `Action` calls
pub struct Ec2Client {
    client: reqwest::Client,
    region: String,
    credentials: Credentials,
    base_url: String,
    host: String,
    method: HttpMethod,
}

impl Ec2Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let (base_url, host) = match &config.endpoint {
            Some(endpoint) => {
                let url = reqwest::Url::parse(endpoint)
                    .map_err(|e| AwsError::InvalidConfig(format!("endpoint {}: {}", endpoint, e)))?;
                let host = url.host_str().ok_or_else(|| {
                    AwsError::InvalidConfig(format!("endpoint {} has no host", endpoint))
                })?;
                let host = match url.port() {
                    Some(port) => format!("{}:{}", host, port),
                    None => host.to_string(),
                };
                (format!("{}://{}", url.scheme(), host), host)
            }
            None => {
                let host = ec2_host(&config.region);
                (format!("https://{}", host), host)
            }
        };

        let mut builder = reqwest::Client::builder().timeout(config.timeout);
        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
            region: config.region,
            credentials: config.credentials,
            base_url,
            host,
            method: config.method,
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Call `action` and return the raw XML body of a 2xx response
    ///
    /// Non-2xx responses come back as [`AwsError::Provider`] with the
    /// native error already normalized.
    #[tracing::instrument(skip(self, params), fields(region = %self.region))]
    pub async fn call<I, K, V>(&self, action: &str, params: I) -> Result<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut request = UnsignedRequest::new(self.method, self.host.clone())
            .param("Action", action)
            .param("Version", API_VERSION);
        for (key, value) in params {
            request = request.param(key, value);
        }

        let signed = sign(&request, &self.credentials, &self.region, SERVICE, Utc::now())?;
        let url = format!("{}{}", self.base_url, signed.path_and_query);

        let mut builder = match signed.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url).body(signed.body.clone()),
        };
        for (name, value) in &signed.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        if status < 300 {
            tracing::debug!(status, "request succeeded");
            Ok(body)
        } else {
            let error = crate::error::normalize_error_body(&body, status);
            tracing::warn!(
                status,
                code = error.provider_code.as_deref().unwrap_or("-"),
                fatal = error.fatal,
                "request rejected"
            );
            Err(AwsError::Provider(error))
        }
    }

    /// Call `action` and deserialize the XML body into `T`
    pub async fn call_xml<T, I, K, V>(&self, action: &str, params: I) -> Result<T>
    where
        T: DeserializeOwned,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let body = self.call(action, params).await?;
        Ok(quick_xml::de::from_str(&body)?)
    }

    /// [`call`](Self::call) with failures mapped onto the adapter error model
    pub async fn call_normalized<I, K, V>(
        &self,
        action: &str,
        params: I,
    ) -> std::result::Result<String, ProviderError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.call(action, params).await.map_err(ProviderError::from)
    }
}
