/// API error types and handling
pub mod errors;
/// HTTP handlers for the query pipeline and task catalog
pub mod handlers;
/// Routes configuration and setup
pub mod routes;
/// HTTP server implementation
pub mod server;
