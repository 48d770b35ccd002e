pub mod cli;
pub mod config;
pub mod logging;
pub mod node_id;
pub mod probe;
pub mod session;
pub mod shutdown;
pub mod test_util;
