use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, instrument};
use tracing_subscriber::EnvFilter;

use crate::codec::ProtocolError;
use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::executor::Executor;
use crate::frame::Frame;
use crate::snapshot;
use crate::store::Store;
use crate::Error;

/// Loads the snapshot, binds the listening socket and serves clients until the process exits.
pub async fn run(config: ServerConfig) -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let store = snapshot::load(&config);

    let listener = TcpListener::bind(config.listen_addr())
        .await
        .map_err(|e| {
            error!("Failed to bind {}: {}", config.listen_addr(), e);
            e
        })?;

    serve(listener, store, Arc::new(config)).await
}

/// Accepts connections on `listener`, one task per client, all sharing `store`.
pub async fn serve(
    listener: TcpListener,
    store: Store,
    config: Arc<ServerConfig>,
) -> Result<(), Error> {
    info!("Redis server listening on {}", listener.local_addr()?);

    let executor = Executor::new(store, config);

    loop {
        let (socket, client_address) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Failed to accept connection: {}", e);
                continue;
            }
        };
        let executor = executor.clone();
        info!("Accepted connection from {:?}", client_address);

        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, client_address, executor).await {
                error!("Connection error: {}", e);
            }
        });
    }
}

#[instrument(
    name = "connection",
    skip(stream, executor),
    fields(connection_id, client_address)
)]
async fn handle_connection(
    stream: TcpStream,
    client_address: SocketAddr,
    executor: Executor,
) -> Result<(), Error> {
    let mut conn = Connection::new(stream, client_address);

    tracing::Span::current()
        .record("connection_id", conn.id.to_string())
        .record("client_address", client_address.to_string());

    loop {
        let frame = match conn.read_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => match e.downcast::<ProtocolError>() {
                // The stream cannot be resynchronized after a malformed request.
                Ok(e) => {
                    info!("Protocol error, closing connection: {}", e);
                    let res = Frame::Error(format!("ERR Protocol error: {}", e));
                    conn.write_frame(res).await?;
                    return Ok(());
                }
                Err(e) => return Err(e),
            },
        };

        // An empty request is skipped without a reply.
        if frame == Frame::Array(vec![]) {
            continue;
        }

        debug!("Received frame from client: {}", frame);
        let res = executor.execute(frame);
        debug!("Sending response to client: {}", res);

        conn.write_frame(res).await?;
    }

    info!("Connection closed");
    Ok(())
}
