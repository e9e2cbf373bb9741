pub mod ipc;
pub mod session;

pub use ipc::{Command, IpcError, Response, StatusInfo};
pub use session::{SessionState, UnknownStateError};
