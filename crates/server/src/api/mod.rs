pub mod documents;
pub mod handlers;
pub mod ingestion;
pub mod middleware;
pub mod routes;

pub use routes::create_router;
