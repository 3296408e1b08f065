//! OddsHarvest: identity pool
//!
//! Supplies the apparent client identity of every outbound request:
//! a rotating proxy endpoint (with failure bookkeeping) and a browser
//! fingerprint drawn from a pre-generated pool.

pub mod fingerprint;
pub mod proxy;

pub use fingerprint::{BrowserFamily, FingerprintPool, NetworkIdentity, Viewport};
pub use proxy::{
    parse_proxy_list, PoolPolicy, PoolStats, ProxyCredentials, ProxyEndpoint, ProxyParseError,
    ProxyPool, ProxyProtocol,
};
