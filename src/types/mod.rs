pub mod anomaly;
pub mod frame;
pub mod gps;
pub mod header;
pub mod log;

pub use anomaly::*;
pub use frame::*;
pub use gps::*;
pub use header::*;
pub use log::*;
