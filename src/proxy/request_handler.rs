use crate::proxy::rule_table::{Forward, ProxyRuleTable};
use crate::proxy::static_files::StaticFiles;
use crate::proxy::upstream::UpstreamClient;
use anyhow::Result;
use hyper::{Body, Request, Response, StatusCode};
use log::{error, info};
use std::net::IpAddr;
use std::sync::Arc;

/// Everything a request needs, shared read-only between connections
pub struct ProxyState {
    pub table: ProxyRuleTable,
    pub client: UpstreamClient,
    pub assets: StaticFiles,
}

impl ProxyState {
    pub fn new(table: ProxyRuleTable, client: UpstreamClient, assets: StaticFiles) -> Arc<Self> {
        Arc::new(Self { table, client, assets })
    }
}

/// Extract the request target (path and query) as received
pub fn request_target(req: &Request<Body>) -> String {
    req.uri().path_and_query().map(|pq| pq.as_str().to_string()).unwrap_or_else(|| "/".to_string())
}

/// Forward the request when a rule matches, otherwise serve it from the static directory
pub async fn handle_request(state: Arc<ProxyState>, client_ip: IpAddr, req: Request<Body>) -> Result<Response<Body>> {
    let target = request_target(&req);

    let upstream = match state.table.forward(&target, req.headers()) {
        Forward::Upstream(upstream) => upstream,
        Forward::NoMatch => return Ok(state.assets.serve(req.method(), &target).await),
    };

    let url = upstream.url();
    let method = req.method().clone();
    let version = req.version();
    let body = req.into_body();

    match state.client.send(upstream, method.clone(), version, body, client_ip).await {
        Ok(response) => {
            info!(
                "{ip} {method} {path} -> {url} [{status}]",
                ip = client_ip,
                method = method,
                path = target,
                url = url,
                status = response.status().as_u16()
            );
            Ok(response)
        }
        Err(error) => {
            error!("HTTP proxy error for {path} -> {url}: {err:#}", path = target, url = url, err = error);
            Ok(Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .header("Content-Type", "text/plain")
                .body(Body::from("Internal Server Error"))?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ProxyRule;
    use std::collections::HashMap;

    fn state_with(rules: Vec<ProxyRule>, root: &std::path::Path) -> Arc<ProxyState> {
        let table = ProxyRuleTable::new(rules, &HashMap::<String, String>::new()).unwrap();
        ProxyState::new(table, UpstreamClient::new().unwrap(), StaticFiles::new(root, "index.html", true))
    }

    #[test]
    fn test_request_target_keeps_query() {
        let req = Request::builder().uri("/api/festival/list?page=1").body(Body::empty()).unwrap();
        assert_eq!(request_target(&req), "/api/festival/list?page=1");
    }

    #[test]
    fn test_request_target_from_absolute_uri() {
        let req = Request::builder().uri("http://localhost:5173/kepco/data").body(Body::empty()).unwrap();
        assert_eq!(request_target(&req), "/kepco/data");
    }

    #[tokio::test]
    async fn test_unmatched_request_served_statically() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "home").unwrap();
        let state = state_with(vec![ProxyRule::new("/api", "http://127.0.0.1:9")], dir.path());

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = handle_request(state, "127.0.0.1".parse().unwrap(), req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&body[..], b"home");
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        // Reserve a port, then free it so nothing is listening there
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let state = state_with(vec![ProxyRule::new("/api", format!("http://127.0.0.1:{}", port))], dir.path());

        let req = Request::builder().uri("/api/list").body(Body::empty()).unwrap();
        let response = handle_request(state, "127.0.0.1".parse().unwrap(), req).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
