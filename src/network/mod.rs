//! Network topology discovery
//!
//! - `cidr`: address/prefix parsing and reduction
//! - `status`: network-status annotation and `ip` output parsing
//! - `canary`: the one-shot job that observes a pod's attached networks
//! - `discovery`: runs canaries and applies `<role>_network` settings

pub mod canary;
pub mod cidr;
pub mod discovery;
pub mod status;

pub use canary::*;
pub use cidr::*;
pub use discovery::*;
pub use status::*;
