//! SSH sessions to the cluster login node

mod session;

pub use session::{close, connect, ClientHandler, SshHandle};
