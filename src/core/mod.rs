// Core modules implementing the device bridge, app control, and error modeling.
pub mod app;
pub mod bridge;
pub mod error;
#[cfg(test)]
pub(crate) mod fake;
pub mod integrity;
pub mod poller;
pub mod pose;
pub mod remote_fs;
pub mod request;
pub mod retry;
pub mod session;
pub mod shell;
