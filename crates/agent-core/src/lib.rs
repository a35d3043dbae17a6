pub mod error;
pub mod subprocess;
pub mod types;

pub use error::SubprocessError;
pub use types::{AgentRequest, ControlReply, MessageType, Target, WorkerRecord, WorkerState, MAX_NAME_LEN};
