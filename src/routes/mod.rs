pub mod api;
pub mod auth_middleware;
pub mod collab;

pub use api::create_api_routes;
pub use collab::create_collab_routes;
