mod handlers;
mod routes;
mod state;

pub use handlers::*;
pub use routes::*;
pub use state::*;
