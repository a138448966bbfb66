mod handlers;
mod images;
mod models;
mod state;

pub use handlers::{router, run_server};
pub use state::ServerState;
