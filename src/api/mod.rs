//! HTTP API: the transport boundary around the engine

pub mod callback;
pub mod handlers;
pub mod server;

pub use callback::CallbackAction;
pub use handlers::AppState;
pub use server::ApiServer;
