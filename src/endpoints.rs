//! Endpoint server for exposing metrics

use anyhow::Result;
use prometheus::{Encoder, TextEncoder};
use tokio::net::TcpListener;

use crate::metrics;

/// Start the metrics endpoint server
pub async fn endpoint_server(port: u16) -> Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("Metrics endpoint listening on {}", addr);

    loop {
        match listener.accept().await {
            Ok((mut socket, _addr)) => {
                tokio::spawn(async move {
                    use tokio::io::{AsyncReadExt, AsyncWriteExt};

                    let mut buf = [0; 1024];
                    match socket.read(&mut buf).await {
                        Ok(_) => {
                            let response = render_metrics_response();
                            let _ = socket.write_all(&response).await;
                        }
                        Err(e) => {
                            tracing::error!("Failed to read from socket: {}", e);
                        }
                    }
                });
            }
            Err(e) => {
                tracing::error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Encode the registry into a full HTTP response
fn render_metrics_response() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let mut body = Vec::new();
    if let Err(e) = encoder.encode(&metrics::metrics().registry().gather(), &mut body) {
        tracing::error!("Failed to encode metrics: {}", e);
        return b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\n\r\n".to_vec();
    }

    let mut response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
        encoder.format_type(),
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(&body);
    response
}
