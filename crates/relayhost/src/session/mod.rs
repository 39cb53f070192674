//! Session hosting and teardown.

mod error;
mod models;
mod service;

pub use error::{SessionError, SessionResult};
pub use models::{HostRequest, HostResult, STUB_HOST_PREFIX, TeardownRequest};
pub use service::SessionService;
