mod controller;
mod scheduler;
mod shared;
mod transport;
mod watchdog;
mod worker;

pub use controller::{ControllerLocks, InMemoryNodeTable, JobNodeWriteGuard, NodeTable};
pub use scheduler::{dispatch, DispatchConfig};
pub use transport::{test_server, RpcTransport, TcpJsonTransport};
pub use watchdog::DispatchOutcome;
