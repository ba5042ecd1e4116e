//! Library crate for webhelper-rs: find the local web helper on whatever port
//! it picked, bootstrap an authenticated session, and poll or control it.
pub mod config;
pub mod error;
pub mod fanout;
pub mod logging;
pub mod ports;
pub mod process;
pub mod scan;
pub mod scanner;
pub mod session;
pub mod status;
pub mod transport;
pub mod types;
pub mod validator;

pub use config::{ClientConfig, ScanConfig, DEFAULT_PORT};
pub use error::{Error, Result};
pub use scan::PortScanner;
pub use session::{BootstrapState, Credentials, Session};
pub use status::{Status, StatusEvent, StatusQuery};
pub use types::{PortError, PortResult};
