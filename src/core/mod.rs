//! Process-wide state shared by the server and the watch loop.

mod state;

pub use state::{is_shutdown, register_server, register_watcher, setup_shutdown_handler};
