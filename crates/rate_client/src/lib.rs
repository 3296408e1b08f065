//! OddsHarvest: rate-governed request client
//!
//! Every call passes a shared pacing gate, carries the active network
//! identity and is retried by an explicit bounded loop that reacts to
//! blocking signals (403/429/5xx) by backing off and rotating identity.

pub mod error;
pub mod headers;
pub mod pacing;
pub mod retry;
pub mod session;
pub mod transport;

pub use error::{ClientError, ErrorKind};
pub use headers::SiteProfile;
pub use pacing::{PacingConfig, RateGate};
pub use retry::{Decision, Failure, RetryPolicy};
pub use session::{ClientSession, RequestOptions, SessionConfig};
pub use transport::{ReqwestTransport, Transport, TransportError, TransportRequest, TransportResponse};
