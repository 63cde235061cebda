//! Services layer (ports + adapters).
//!
//! - `ports`: pure contracts/types used by the kernel.
//! - `adapters`: OS/runtime specific implementations (IO/async).

pub mod adapters;
pub mod ports;
