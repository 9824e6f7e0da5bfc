pub mod audit;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod objects;
pub mod reports;
pub mod routes;
pub mod worker;

pub use routes::create_router;
