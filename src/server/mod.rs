mod acquisition_routes;
pub mod config;
mod http_layers;
mod requester;
pub mod server;
pub mod state;

pub use acquisition_routes::ApiError;
pub use config::ServerConfig;
pub use http_layers::*;
pub use requester::{RequesterExtractionError, USER_ID_HEADER, USER_PERMISSIONS_HEADER};
pub(self) use acquisition_routes::make_acquisition_routes;
pub use server::{make_app, run_server};
pub use state::ServerState;
