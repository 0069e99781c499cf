use crate::proxy::request_handler::{ProxyState, handle_request};
use anyhow::{Context, Result};
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, StatusCode};
use log::{error, info};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

/// Bind the dev server and return the bound address together with the serving future.
///
/// Binding to port 0 picks a free port. The future resolves once `shutdown` completes
/// and in-flight requests have drained.
pub fn serve(
    addr: SocketAddr,
    state: Arc<ProxyState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, impl Future<Output = Result<()>> + Send)> {
    let make_svc = make_service_fn(move |conn: &AddrStream| {
        let remote_addr = conn.remote_addr().ip();
        let state = state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let client_ip = remote_addr;
                let state = state.clone();
                async move {
                    match handle_request(state, client_ip, req).await {
                        Ok(resp) => Ok::<_, Infallible>(resp),
                        Err(e) => {
                            error!("handle_request error from {}: {}", client_ip, e);
                            let mut resp = Response::new(Body::empty());
                            *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                            Ok::<_, Infallible>(resp)
                        }
                    }
                }
            }))
        }
    });

    let builder = hyper::Server::try_bind(&addr).with_context(|| format!("Failed to bind dev server on {}", addr))?;
    let server = builder.serve(make_svc);
    let local_addr = server.local_addr();

    let running = async move {
        server.with_graceful_shutdown(shutdown).await.context("Server error")?;
        info!("Dev server on {} stopped", local_addr);
        Ok(())
    };
    Ok((local_addr, running))
}

/// Run the dev server until Ctrl+C
pub async fn start_dev_server(addr: SocketAddr, state: Arc<ProxyState>) -> Result<()> {
    let (local_addr, running) = serve(addr, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    })?;
    info!("Dev server running on http://{}", local_addr);
    running.await
}
