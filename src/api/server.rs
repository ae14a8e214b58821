use crate::api::routes;
use crate::app::App;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Starts and runs the HTTP server using Axum web framework
///
/// # Arguments
/// * `app` - Shared service state
/// * `port` - Port number to listen on for incoming HTTP connections
///
/// # Returns
/// * `Result<(), std::io::Error>` - Ok when the server shuts down, Error if binding or serving fails
pub async fn launch_server(app: Arc<App>, port: u16) -> Result<(), std::io::Error> {
    let router = routes::app(app);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, router).await
}
