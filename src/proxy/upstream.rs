//! Upstream connection and request forwarding
//!
//! Sends an [`UpstreamRequest`] descriptor over HTTP or HTTPS and hands back the
//! upstream response unchanged apart from hop-by-hop headers. Failures are returned
//! to the caller; nothing here retries or times out on its own.

use crate::proxy::rule_table::UpstreamRequest;
use crate::utils::path::encode_request_target;
use anyhow::{Context, Result};
use hyper::client::HttpConnector;
use hyper::header::{CONNECTION, HeaderMap, HeaderName, HeaderValue};
use hyper::{Body, Client, Method, Request, Response, Uri, Version};
use hyper_tls::HttpsConnector;
use log::{debug, trace};
use std::net::IpAddr;

pub type HttpsClient = Client<HttpsConnector<HttpConnector>, Body>;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

// RFC 7230 section 6.1
const HOP_BY_HOP_HEADERS: [&str; 8] =
    ["connection", "keep-alive", "proxy-authenticate", "proxy-authorization", "te", "trailer", "transfer-encoding", "upgrade"];

/// Pair of hyper clients, one that validates upstream certificates and one that does not
#[derive(Clone)]
pub struct UpstreamClient {
    verified: HttpsClient,
    unverified: HttpsClient,
}

impl UpstreamClient {
    pub fn new() -> Result<Self> {
        Ok(Self { verified: build_client(false)?, unverified: build_client(true)? })
    }

    /// Forward one request.
    ///
    /// `client_ip` is only used for `X-Forwarded-For` when the matched rule asks for it.
    /// The other `X-Forwarded-*` headers are already on the descriptor.
    pub async fn send(
        &self,
        upstream: UpstreamRequest,
        method: Method,
        version: Version,
        body: Body,
        client_ip: IpAddr,
    ) -> Result<Response<Body>> {
        let uri = upstream_uri(&upstream)?;
        let mut headers = upstream.headers;
        strip_hop_by_hop(&mut headers);
        if upstream.xfwd {
            add_forwarded_for(&mut headers, client_ip)?;
        }

        let mut request = Request::builder().method(method).uri(uri).version(downgrade(version)).body(body)?;
        *request.headers_mut() = headers;

        trace!("Upstream request: {} {}", request.method(), request.uri());
        let client = if upstream.verify_tls { &self.verified } else { &self.unverified };
        let mut response = client.request(request).await.with_context(|| format!("Upstream request to {} failed", upstream.origin))?;

        debug!("Upstream {} answered {}", upstream.origin, response.status());
        strip_hop_by_hop(response.headers_mut());
        Ok(response)
    }
}

fn build_client(accept_invalid_certs: bool) -> Result<HttpsClient> {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    let tls = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(accept_invalid_certs)
        .danger_accept_invalid_hostnames(accept_invalid_certs)
        .build()
        .context("Failed to build TLS connector")?;
    let https = HttpsConnector::from((http, tokio_native_tls::TlsConnector::from(tls)));
    Ok(Client::builder().build::<_, Body>(https))
}

/// Absolute URI for the upstream, with non-ASCII path bytes percent-encoded
pub fn upstream_uri(upstream: &UpstreamRequest) -> Result<Uri> {
    let target = format!("{}{}", upstream.origin, encode_request_target(&upstream.path));
    target.parse::<Uri>().with_context(|| format!("Invalid upstream URI: {}", target))
}

/// Remove hop-by-hop headers, including any named in the `Connection` header
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

fn add_forwarded_for(headers: &mut HeaderMap, client_ip: IpAddr) -> Result<()> {
    let forwarded_for = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{}, {}", existing, client_ip),
        None => client_ip.to_string(),
    };
    headers.insert(X_FORWARDED_FOR, HeaderValue::from_str(&forwarded_for)?);
    Ok(())
}

// Upstream connections are always HTTP/1.x, only an HTTP/1.0 caller is passed through as-is.
fn downgrade(version: Version) -> Version {
    if version == Version::HTTP_10 { Version::HTTP_10 } else { Version::HTTP_11 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(origin: &str, path: &str) -> UpstreamRequest {
        UpstreamRequest {
            prefix: "/x".to_string(),
            origin: origin.to_string(),
            path: path.to_string(),
            headers: HeaderMap::new(),
            verify_tls: true,
            xfwd: false,
        }
    }

    #[test]
    fn test_upstream_uri_encodes_non_ascii() {
        let uri = upstream_uri(&descriptor("https://naveropenapi.apigw.ntruss.com", "/geocode?query=서울")).unwrap();
        assert_eq!(uri.to_string(), "https://naveropenapi.apigw.ntruss.com/geocode?query=%EC%84%9C%EC%9A%B8");
        assert_eq!(uri.host(), Some("naveropenapi.apigw.ntruss.com"));
    }

    #[test]
    fn test_upstream_uri_plain() {
        let uri = upstream_uri(&descriptor("http://127.0.0.1:9000", "/festival/list?page=1")).unwrap();
        assert_eq!(uri.port_u16(), Some(9000));
        assert_eq!(uri.path(), "/festival/list");
        assert_eq!(uri.query(), Some("page=1"));
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive, x-session-hint"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-session-hint", HeaderValue::from_static("abc"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("accept", HeaderValue::from_static("application/json"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("accept").unwrap(), "application/json");
    }

    #[test]
    fn test_add_forwarded_for() {
        let mut headers = HeaderMap::new();
        add_forwarded_for(&mut headers, "127.0.0.1".parse().unwrap()).unwrap();
        assert_eq!(headers.get("x-forwarded-for").unwrap(), "127.0.0.1");
    }

    #[test]
    fn test_add_forwarded_for_appends_chain() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));
        add_forwarded_for(&mut headers, "127.0.0.1".parse().unwrap()).unwrap();
        assert_eq!(headers.get("x-forwarded-for").unwrap(), "10.0.0.1, 127.0.0.1");
    }

    #[test]
    fn test_downgrade() {
        assert_eq!(downgrade(Version::HTTP_2), Version::HTTP_11);
        assert_eq!(downgrade(Version::HTTP_10), Version::HTTP_10);
    }

    #[tokio::test]
    async fn test_client_builds() {
        assert!(UpstreamClient::new().is_ok());
    }
}
