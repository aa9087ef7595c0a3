//! WebSocket connector backed by tokio-tungstenite.
//!
//! The daemon serves `wss://` with a self-signed certificate and expects the
//! client to present the certificate/key pair from the Chia root, so when
//! credentials are configured the TLS connector carries that identity and skips
//! server verification.

use super::{Connection, Connector};
use crate::config::{ClientConfig, ClientDefaults};
use crate::{ChiaError, Result};
use futures::{SinkExt, StreamExt};
use std::path::Path;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as Frame;
use tokio_tungstenite::{connect_async, connect_async_tls_with_config};
use tracing::{debug, info, warn};

/// Opens the daemon connection over a WebSocket.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

#[async_trait::async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, config: &ClientConfig) -> Result<Connection> {
        config.validate()?;

        let tls = match (&config.cert, &config.key) {
            (Some(cert), Some(key)) => Some(load_tls_connector(cert, key).await?),
            _ => None,
        };

        let (stream, _response) = match tls {
            Some(tls) => {
                connect_async_tls_with_config(
                    config.url.as_str(),
                    None,
                    false,
                    Some(tokio_tungstenite::Connector::NativeTls(tls)),
                )
                .await?
            }
            None => connect_async(config.url.as_str()).await?,
        };

        info!("Connected to daemon at {}", config.url);

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) =
            mpsc::channel::<String>(ClientDefaults::CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel::<String>(ClientDefaults::CHANNEL_CAPACITY);

        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = sink.send(Frame::Text(text)).await {
                    warn!("WebSocket send failed: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
            debug!("WebSocket writer stopped");
        });

        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                let text = match frame {
                    Ok(Frame::Text(text)) => text,
                    Ok(Frame::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(_) => {
                            warn!("Dropping non UTF-8 binary frame from daemon");
                            continue;
                        }
                    },
                    Ok(Frame::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("WebSocket receive failed: {}", e);
                        break;
                    }
                };

                if inbound_tx.send(text).await.is_err() {
                    break;
                }
            }
            debug!("WebSocket reader stopped");
        });

        Ok(Connection {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

async fn load_tls_connector(cert: &Path, key: &Path) -> Result<native_tls::TlsConnector> {
    let cert_pem = tokio::fs::read(cert)
        .await
        .map_err(|e| ChiaError::io_with_path(e, cert))?;
    let key_pem = tokio::fs::read(key)
        .await
        .map_err(|e| ChiaError::io_with_path(e, key))?;

    let identity = native_tls::Identity::from_pkcs8(&cert_pem, &key_pem)?;

    let connector = native_tls::TlsConnector::builder()
        .identity(identity)
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()?;

    Ok(connector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_connect_rejects_non_websocket_url() {
        let config = ClientConfig::new("http://127.0.0.1:1");
        let result = WebSocketConnector.connect(&config).await;
        assert!(matches!(result, Err(ChiaError::Config { .. })));
    }

    #[tokio::test]
    async fn test_connect_missing_credentials_reports_path() {
        let temp_dir = TempDir::new().unwrap();
        let cert = temp_dir.path().join("missing.crt");
        let key = temp_dir.path().join("missing.key");
        let config = ClientConfig::new("wss://127.0.0.1:1").with_credentials(&cert, &key);

        match WebSocketConnector.connect(&config).await {
            Err(ChiaError::Io { path, .. }) => assert_eq!(path, Some(cert)),
            other => panic!("Expected Io error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let config = ClientConfig::new("ws://127.0.0.1:1");
        let result = WebSocketConnector.connect(&config).await;
        assert!(matches!(result, Err(ChiaError::Connection { .. })));
    }
}
