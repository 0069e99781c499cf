//! devpx - development reverse proxy
//!
//! Forwards configured URL prefixes to upstream APIs and serves everything else
//! from a static asset directory.

pub mod config;
pub mod proxy;
pub mod utils;
