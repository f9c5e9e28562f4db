//! AWS Signature Version 4 request signing
//!
//! Signing is pure: the same request, credentials, region, service and
//! timestamp always produce the same signature.

use crate::error::{AwsError, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use nimbus_cloud::Credentials;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Headers covered by the signature, in canonical order
pub const SIGNED_HEADERS: &str = "host;x-amz-date";

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const SCOPE_DATE_FORMAT: &str = "%Y%m%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A query-protocol request before signing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedRequest {
    pub method: HttpMethod,
    pub host: String,
    pub path: String,

    /// Query parameters, in any order
    pub params: Vec<(String, String)>,
}

impl UnsignedRequest {
    pub fn new(method: HttpMethod, host: impl Into<String>) -> Self {
        Self {
            method,
            host: host.into(),
            path: "/".to_string(),
            params: Vec::new(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Body sent with the request: the encoded parameters for POST, nothing for GET
    pub fn body(&self) -> String {
        match self.method {
            HttpMethod::Get => String::new(),
            HttpMethod::Post => canonical_query_string(&self.params),
        }
    }
}

/// A request ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub method: HttpMethod,
    pub host: String,

    /// Path plus the encoded query string for GET requests
    pub path_and_query: String,

    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl SignedRequest {
    pub fn url(&self) -> String {
        format!("https://{}{}", self.host, self.path_and_query)
    }

    pub fn authorization(&self) -> Option<&str> {
        self.headers.get("Authorization").map(String::as_str)
    }
}

/// Percent-encode everything except `A-Z a-z 0-9 - _ . ~`
///
/// `*` is always encoded (`%2A`) and hex digits are upper case.
pub fn uri_escape(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Encoded `key=value` pairs sorted byte-wise by encoded key, then value
pub fn canonical_query_string(params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (uri_escape(k), uri_escape(v)))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| AwsError::Signing(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

pub fn canonical_request(request: &UnsignedRequest, amz_date: &str) -> String {
    let query = match request.method {
        HttpMethod::Get => canonical_query_string(&request.params),
        HttpMethod::Post => String::new(),
    };
    let payload_hash = sha256_hex(request.body().as_bytes());

    format!(
        "{}\n{}\n{}\nhost:{}\nx-amz-date:{}\n\n{}\n{}",
        request.method, request.path, query, request.host, amz_date, SIGNED_HEADERS, payload_hash
    )
}

pub fn credential_scope(date: &str, region: &str, service: &str) -> String {
    format!("{}/{}/{}/aws4_request", date, region, service)
}

pub fn string_to_sign(amz_date: &str, scope: &str, canonical_request: &str) -> String {
    format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        sha256_hex(canonical_request.as_bytes())
    )
}

/// Derive the signing key by chained HMAC over date, region, service
pub fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Result<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// Sign `request` for `service` in `region` at `timestamp`
pub fn sign(
    request: &UnsignedRequest,
    credentials: &Credentials,
    region: &str,
    service: &str,
    timestamp: DateTime<Utc>,
) -> Result<SignedRequest> {
    let amz_date = timestamp.format(AMZ_DATE_FORMAT).to_string();
    let date = timestamp.format(SCOPE_DATE_FORMAT).to_string();
    let scope = credential_scope(&date, region, service);

    let canonical = canonical_request(request, &amz_date);
    let to_sign = string_to_sign(&amz_date, &scope, &canonical);
    let key = signing_key(&credentials.secret_key, &date, region, service)?;
    let signature = hex::encode(hmac_sha256(&key, to_sign.as_bytes())?);

    let authorization = format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, credentials.access_key, scope, SIGNED_HEADERS, signature
    );

    let mut headers = BTreeMap::new();
    headers.insert("Authorization".to_string(), authorization);
    if request.method == HttpMethod::Post {
        headers.insert("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string());
    }
    headers.insert("Host".to_string(), request.host.clone());
    headers.insert("x-amz-date".to_string(), amz_date);

    let path_and_query = match request.method {
        HttpMethod::Get if !request.params.is_empty() => {
            format!("{}?{}", request.path, canonical_query_string(&request.params))
        }
        _ => request.path.clone(),
    };

    Ok(SignedRequest {
        method: request.method,
        host: request.host.clone(),
        path_and_query,
        headers,
        body: request.body(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SECRET: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

    fn vanilla_credentials() -> Credentials {
        Credentials::new("AKIDEXAMPLE", SECRET)
    }

    fn vanilla_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap()
    }

    fn vanilla_request() -> UnsignedRequest {
        UnsignedRequest::new(HttpMethod::Get, "example.amazonaws.com")
    }

    #[test]
    fn test_empty_payload_hash() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_signing_key_derivation() {
        let key = signing_key(SECRET, "20120215", "us-east-1", "iam").unwrap();
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_get_vanilla_canonical_request() {
        let canonical = canonical_request(&vanilla_request(), "20150830T123600Z");
        assert_eq!(
            canonical,
            "GET\n/\n\nhost:example.amazonaws.com\nx-amz-date:20150830T123600Z\n\nhost;x-amz-date\n\
             e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            sha256_hex(canonical.as_bytes()),
            "bb579772317eb040ac9ed261061d46c1f17a8133879d6129b6e1c25292927e63"
        );
    }

    #[test]
    fn test_get_vanilla_signature() {
        let signed = sign(
            &vanilla_request(),
            &vanilla_credentials(),
            "us-east-1",
            "service",
            vanilla_time(),
        )
        .unwrap();

        assert_eq!(
            signed.authorization(),
            Some(
                "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, \
                 SignedHeaders=host;x-amz-date, \
                 Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
            )
        );
        assert_eq!(
            signed.headers.get("x-amz-date").map(String::as_str),
            Some("20150830T123600Z")
        );
        assert_eq!(signed.url(), "https://example.amazonaws.com/");
        assert!(signed.body.is_empty());
    }

    #[test]
    fn test_any_input_change_changes_signature() {
        let base = sign(
            &vanilla_request(),
            &vanilla_credentials(),
            "us-east-1",
            "service",
            vanilla_time(),
        )
        .unwrap();
        let base = base.authorization().unwrap().to_string();

        let variants = [
            sign(
                &vanilla_request().param("a", "1"),
                &vanilla_credentials(),
                "us-east-1",
                "service",
                vanilla_time(),
            ),
            sign(
                &vanilla_request(),
                &Credentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEZ"),
                "us-east-1",
                "service",
                vanilla_time(),
            ),
            sign(
                &vanilla_request(),
                &vanilla_credentials(),
                "us-east-2",
                "service",
                vanilla_time(),
            ),
            sign(
                &vanilla_request(),
                &vanilla_credentials(),
                "us-east-1",
                "service",
                vanilla_time() + chrono::Duration::seconds(1),
            ),
            sign(
                &vanilla_request().with_path("/x"),
                &vanilla_credentials(),
                "us-east-1",
                "service",
                vanilla_time(),
            ),
        ];

        for variant in variants {
            let variant = variant.unwrap();
            assert_ne!(variant.authorization().unwrap(), base);
        }
    }

    #[test]
    fn test_uri_escape() {
        assert_eq!(uri_escape("a-b_c.d~e"), "a-b_c.d~e");
        assert_eq!(uri_escape("a b"), "a%20b");
        assert_eq!(uri_escape("*"), "%2A");
        assert_eq!(uri_escape("it's(ok)!"), "it%27s%28ok%29%21");
        assert_eq!(uri_escape("a/b=c"), "a%2Fb%3Dc");
    }

    #[test]
    fn test_canonical_query_sorts_keys() {
        let params = vec![
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
            ("Action".to_string(), "DescribeInstances".to_string()),
        ];
        assert_eq!(
            canonical_query_string(&params),
            "Action=DescribeInstances&a=1&b=2"
        );
    }

    #[test]
    fn test_post_hashes_body_and_omits_query() {
        let request = UnsignedRequest::new(HttpMethod::Post, "ec2.us-east-1.amazonaws.com")
            .param("Version", "2013-02-01")
            .param("Action", "DescribeInstances");
        let canonical = canonical_request(&request, "20150830T123600Z");
        let lines: Vec<&str> = canonical.lines().collect();

        assert_eq!(lines[0], "POST");
        assert_eq!(lines[2], "");
        assert_eq!(
            lines.last().copied(),
            Some(sha256_hex(b"Action=DescribeInstances&Version=2013-02-01").as_str())
        );

        let signed = sign(
            &request,
            &vanilla_credentials(),
            "us-east-1",
            "ec2",
            vanilla_time(),
        )
        .unwrap();
        assert_eq!(signed.url(), "https://ec2.us-east-1.amazonaws.com/");
        assert_eq!(signed.body, "Action=DescribeInstances&Version=2013-02-01");
        assert_eq!(
            signed.headers.get("Content-Type").map(String::as_str),
            Some(FORM_CONTENT_TYPE)
        );
    }

    #[test]
    fn test_get_places_sorted_query_in_url() {
        let request = UnsignedRequest::new(HttpMethod::Get, "ec2.us-east-1.amazonaws.com")
            .param("Version", "2013-02-01")
            .param("Action", "DescribeImages");
        let signed = sign(
            &request,
            &vanilla_credentials(),
            "us-east-1",
            "ec2",
            vanilla_time(),
        )
        .unwrap();
        assert_eq!(
            signed.url(),
            "https://ec2.us-east-1.amazonaws.com/?Action=DescribeImages&Version=2013-02-01"
        );
        assert!(signed.headers.get("Content-Type").is_none());
    }
}
