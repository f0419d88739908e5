//! The biogit server
//!
//! A TCP acceptor hands each connection to a session task; sessions parse
//! frames and forward complete messages to a single dispatcher task whose
//! handlers mutate the targeted repository and queue response frames back
//! onto the session's serialized write queue.
//!
//! Process-wide services (user table, token minting, the session registry)
//! live in one [`ServerContext`] value built at startup and passed by
//! handle. Teardown order: acceptor, sessions, dispatcher, runtime.

pub mod dispatcher;
pub mod handlers;
pub mod session;
pub mod tokens;
pub mod users;

use crate::server::dispatcher::DispatchItem;
use crate::server::session::Session;
use crate::server::tokens::TokenManager;
use crate::server::users::UserManager;
use anyhow::Context;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tracing::{error, info};
use uuid::Uuid;

/// Session token lifetime handed out by login
pub const TOKEN_TTL_SECONDS: i64 = 24 * 3600;

/// Startup parameters for `server start`
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub repo_root: PathBuf,
    pub token_secret: String,
    pub log_dir: Option<PathBuf>,
    pub log_name: Option<String>,
}

/// Shared services owned by the running server
pub struct ServerContext {
    pub repo_root: PathBuf,
    pub users: UserManager,
    pub tokens: TokenManager,
    sessions: Mutex<HashMap<Uuid, Arc<Session>>>,
}

impl ServerContext {
    pub fn new(repo_root: PathBuf, token_secret: &str) -> anyhow::Result<Self> {
        if !repo_root.is_dir() {
            anyhow::bail!(
                "repository root does not exist: {}",
                repo_root.display()
            );
        }
        let users = UserManager::new(repo_root.join("user"))?;
        let tokens = TokenManager::new(token_secret)?;

        Ok(ServerContext {
            repo_root,
            users,
            tokens,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn register_session(&self, session: Arc<Session>) {
        self.sessions
            .lock()
            .expect("session registry poisoned")
            .insert(session.id, session);
    }

    pub fn remove_session(&self, id: &Uuid) {
        self.sessions
            .lock()
            .expect("session registry poisoned")
            .remove(id);
    }
}

/// Accept connections forever, one session task per connection
pub async fn serve(listener: TcpListener, context: Arc<ServerContext>) -> anyhow::Result<()> {
    let (dispatch_tx, dispatch_rx) = tokio::sync::mpsc::unbounded_channel::<DispatchItem>();
    let dispatcher = dispatcher::spawn(context.clone(), dispatch_rx);

    info!(address = %listener.local_addr()?, "biogit server listening");

    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                let context = context.clone();
                let dispatch_tx = dispatch_tx.clone();
                tokio::spawn(async move {
                    session::run_session(socket, peer, context, dispatch_tx).await;
                });
            }
            Err(error) => {
                error!(%error, "accept failed");
                break;
            }
        }
    }

    drop(dispatch_tx);
    dispatcher.await.ok();
    Ok(())
}

/// Build the runtime, install logging, and run the server until interrupted
pub fn start(config: ServerConfig) -> anyhow::Result<()> {
    // keep the non-blocking writer guard alive for the server's lifetime
    let _log_guard = match &config.log_dir {
        Some(log_dir) => {
            std::fs::create_dir_all(log_dir)
                .with_context(|| format!("unable to create log directory {}", log_dir.display()))?;
            let log_name = config.log_name.clone().unwrap_or_else(|| "biogit_server".into());
            let appender = tracing_appender::rolling::daily(log_dir, format!("{}.log", log_name));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                )
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                )
                .init();
            None
        }
    };

    let context = Arc::new(ServerContext::new(
        config.repo_root.clone(),
        &config.token_secret,
    )?);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let listener = TcpListener::bind(("0.0.0.0", config.port))
            .await
            .with_context(|| format!("unable to bind port {}", config.port))?;

        tokio::select! {
            result = serve(listener, context) => result,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received; shutting down");
                Ok(())
            }
        }
    })
}

/// Spawn a server on an ephemeral port in a background thread
///
/// Used by integration tests and embedders; returns the bound address once
/// the listener is live.
pub fn spawn_ephemeral(
    repo_root: PathBuf,
    token_secret: &str,
) -> anyhow::Result<std::net::SocketAddr> {
    let context = Arc::new(ServerContext::new(repo_root, token_secret)?);
    let (addr_tx, addr_rx) = std::sync::mpsc::channel();

    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Runtime::new() {
            Ok(runtime) => runtime,
            Err(error) => {
                error!(%error, "unable to build server runtime");
                return;
            }
        };
        runtime.block_on(async move {
            match TcpListener::bind(("127.0.0.1", 0)).await {
                Ok(listener) => {
                    let addr = listener.local_addr().expect("listener has a local address");
                    addr_tx.send(addr).ok();
                    if let Err(error) = serve(listener, context).await {
                        error!(%error, "server stopped");
                    }
                }
                Err(error) => error!(%error, "unable to bind ephemeral port"),
            }
        });
    });

    addr_rx
        .recv_timeout(std::time::Duration::from_secs(5))
        .context("server did not start in time")
}
