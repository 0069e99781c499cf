// Proxy module
//
// This module contains all dev server functionality split into focused submodules:
// - rule_table: Ordered prefix rules and the forwarding decision
// - upstream: HTTP/HTTPS client that sends forwarded requests
// - static_files: Fall-through serving for requests no rule matched
// - request_handler: Per-request dispatch
// - http_server: HTTP server setup and shutdown

pub mod http_server;
pub mod request_handler;
pub mod rule_table;
pub mod static_files;
pub mod upstream;

pub use http_server::{serve, start_dev_server};
pub use request_handler::ProxyState;
pub use rule_table::{Forward, ProxyRuleTable, UpstreamRequest};
