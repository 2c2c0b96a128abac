pub mod doc;
pub mod handlers;
pub mod routes;
pub mod snapshot_handlers;
pub mod state;
