//! HTTP probing.
//!
//! This module performs the request for one test and turns whatever comes
//! back (a response, an error status, a transport failure) into a
//! [`WatchdogResult`].

mod request;
mod result;

pub use request::{DEFAULT_TIMEOUT, ProbeExecutor, TransportFailure, is_error_status};
pub use result::WatchdogResult;
