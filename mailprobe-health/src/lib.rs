//! Health reporting for mail transports
//!
//! [`MailHealthIndicator`] checks that a mail server is reachable by
//! connecting and immediately disconnecting, and reports the outcome as a
//! [`Health`]: a [`Status`] plus string details. The `location` detail
//! (`<host>:<port>`) is always set; DOWN results also carry `error`.
//!
//! # Usage
//!
//! ```rust,no_run
//! use mailprobe_health::{HealthIndicator, MailHealthIndicator, Status};
//! use mailprobe_transport::TransportConfig;
//!
//! # async fn example() {
//! let indicator = MailHealthIndicator::smtp(TransportConfig::new("smtp.example.com", 25));
//! let health = indicator.health().await;
//!
//! if health.status() == Status::Down {
//!     eprintln!("{:?}", health.details());
//! }
//! # }
//! ```

mod error;
mod health;
mod indicator;
mod mail;
mod status;

pub use error::ProbeError;
pub use health::{ERROR, Health, LOCATION};
pub use indicator::HealthIndicator;
pub use mail::MailHealthIndicator;
pub use status::Status;
