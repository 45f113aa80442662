pub mod api;

use axum_server::tls_rustls::RustlsConfig;
use log::{ error, info, warn };
use std::error::Error;
use std::net::SocketAddr;

use crate::analysis::DocumentAnalyzer;
use crate::cli::Args;
use crate::llm::ModelClient;
use self::api::AppState;

pub struct Server {
    addr: String,
    state: AppState,
    tls: Option<(String, String)>,
}

impl Server {
    /// `assistant` serves the streaming chat; it may share the analyzer's client.
    pub fn new(
        args: &Args,
        analyzer: DocumentAnalyzer,
        assistant: ModelClient
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let api_key = args.server_api_key.clone().filter(|k| !k.trim().is_empty());
        if api_key.is_some() {
            info!("Server configured with API Key authentication.");
        } else {
            warn!("Server configured WITHOUT API Key authentication. Connections are open.");
        }

        info!("Assistant chat served by {} model {}", assistant.provider(), assistant.model());

        let tls = if args.enable_tls {
            match (&args.tls_cert_path, &args.tls_key_path) {
                (Some(cert_path), Some(key_path)) => Some((cert_path.clone(), key_path.clone())),
                (Some(_), None) | (None, Some(_)) => {
                    error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
                    return Err("Missing TLS certificate or key path".into());
                }
                (None, None) => {
                    error!("--enable-tls was set but no certificate/key paths provided.");
                    return Err("TLS enabled without cert/key".into());
                }
            }
        } else {
            None
        };

        Ok(Self {
            addr: args.server_addr.clone(),
            state: AppState { analyzer, assistant, api_key },
            tls,
        })
    }

    pub async fn run(self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr: SocketAddr = self.addr.parse()?;
        let app = api::router(self.state);

        match self.tls {
            Some((cert_path, key_path)) => {
                info!("TLS enabled. Loading certificate from '{}' and key from '{}'", cert_path, key_path);
                let tls_config = RustlsConfig::from_pem_file(cert_path, key_path).await?;
                info!("HTTPS server listening on: https://{}", addr);
                axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
            }
            None => {
                let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
                    format!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e)
                })?;
                info!("HTTP server listening on: http://{}", addr);
                axum::serve(listener, app).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::prompt::PromptConfig;
    use crate::config::ModelConfig;
    use clap::Parser;
    use std::sync::Arc;

    fn analyzer() -> DocumentAnalyzer {
        let client = ModelClient::new(&ModelConfig::default()).unwrap();
        DocumentAnalyzer::new(client, Arc::new(PromptConfig::default()))
    }

    fn assistant() -> ModelClient {
        ModelClient::new(&ModelConfig::default()).unwrap()
    }

    #[test]
    fn tls_requires_both_paths() {
        let args = Args::try_parse_from(["docshield", "--enable-tls", "--tls-cert-path", "cert.pem"]).unwrap();
        assert!(Server::new(&args, analyzer(), assistant()).is_err());
    }

    #[test]
    fn blank_api_key_disables_authentication() {
        let args = Args::try_parse_from(["docshield", "--server-api-key", "  "]).unwrap();
        let server = Server::new(&args, analyzer(), assistant()).unwrap();
        assert!(server.state.api_key.is_none());
        assert!(server.tls.is_none());
    }
}
