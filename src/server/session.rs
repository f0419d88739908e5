//! Per-connection session
//!
//! Each session owns a framing decoder fed by the socket's read half and a
//! write queue drained by a dedicated writer task, so outbound frames are
//! serialized per connection no matter which task produced them.
//!
//! Repository selection (`TARGET_REPO`) is handled inline on the session:
//! the payload is normalized, confined to the server's repository root and
//! loaded; every other repository-touching message is forwarded to the
//! dispatcher only once a repository is attached.

use crate::areas::repository::Repository;
use crate::protocol::{self, Frame, FrameDecoder, message};
use crate::server::ServerContext;
use crate::server::dispatcher::DispatchItem;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct Session {
    pub id: Uuid,
    /// Write-queue sender; dropped on close so the writer task drains and
    /// exits
    outbound: std::sync::Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    /// Repository this session selected via TARGET_REPO, if any
    pub repository: tokio::sync::Mutex<Option<Repository>>,
    closed: AtomicBool,
}

impl Session {
    fn new(outbound: mpsc::UnboundedSender<Frame>) -> Self {
        Session {
            id: Uuid::new_v4(),
            outbound: std::sync::Mutex::new(Some(outbound)),
            repository: tokio::sync::Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Queue a frame for sending; silently dropped after close
    pub fn send(&self, frame: Frame) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if let Some(sender) = self.outbound.lock().expect("write queue poisoned").as_ref() {
            sender.send(frame).ok();
        }
    }

    pub fn send_error(&self, message_text: &str) {
        self.send(Frame::new(
            message::RESP_ERROR,
            format!("{}\0", message_text).into_bytes(),
        ));
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        // dropping the sender lets the writer flush queued frames and stop
        self.outbound.lock().expect("write queue poisoned").take();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Drive one connection to completion
pub async fn run_session(
    socket: TcpStream,
    peer: std::net::SocketAddr,
    context: Arc<ServerContext>,
    dispatch_tx: mpsc::UnboundedSender<DispatchItem>,
) {
    socket.set_nodelay(true).ok();
    let (mut read_half, mut write_half) = socket.into_split();

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();
    let session = Arc::new(Session::new(outbound_tx));
    context.register_session(session.clone());
    debug!(session = %session.id, %peer, "session opened");

    // writer task: the only place that touches the socket's write half
    let writer_session = session.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if write_half.write_all(&frame.encode()).await.is_err() {
                writer_session.close();
                break;
            }
        }
    });

    // read loop: bytes into the decoder, complete frames out
    let mut decoder = FrameDecoder::new();
    let mut buffer = [0u8; 8192];
    let mut frames = Vec::new();

    loop {
        let read = match read_half.read(&mut buffer).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };

        if let Err(error) = decoder.feed(&buffer[..read], &mut frames) {
            // framing cannot resync after a refused body length
            warn!(session = %session.id, %error, "protocol fault");
            session.send_error(&error.to_string());
            break;
        }

        for frame in frames.drain(..) {
            handle_frame(&session, &context, &dispatch_tx, frame).await;
            if session.is_closed() {
                break;
            }
        }
        if session.is_closed() {
            break;
        }
    }

    session.close();
    context.remove_session(&session.id);
    writer.await.ok();
    debug!(session = %session.id, "session closed");
}

async fn handle_frame(
    session: &Arc<Session>,
    context: &Arc<ServerContext>,
    dispatch_tx: &mpsc::UnboundedSender<DispatchItem>,
    frame: Frame,
) {
    // a client must never send ids from the response range
    if message::is_response_id(frame.id) {
        session.send_error("response message id received from client");
        return;
    }

    if frame.body.is_empty() && message::body_required(frame.id) {
        session.send_error("message body required");
        return;
    }

    if frame.id == message::REQ_TARGET_REPO {
        select_repository(session, context, &frame).await;
        return;
    }

    if !message::repository_free(frame.id) {
        let selected = session.repository.lock().await.is_some();
        if !selected {
            session.send_error("no repository selected; send TARGET_REPO first");
            return;
        }
    }

    dispatch_tx
        .send(DispatchItem {
            session: session.clone(),
            frame,
        })
        .ok();
}

/// Inline TARGET_REPO handling: confine the path and attach the repository
async fn select_repository(session: &Arc<Session>, context: &Arc<ServerContext>, frame: &Frame) {
    let Some((raw_path, _)) = protocol::take_cstr(&frame.body) else {
        session.send(Frame::new(
            message::RESP_TARGET_REPO_ERROR,
            &b"malformed repository path\0"[..],
        ));
        return;
    };

    let Some(relative) = normalize_repo_path(raw_path) else {
        session.send(Frame::new(
            message::RESP_TARGET_REPO_ERROR,
            format!("invalid repository path: {}\0", raw_path).into_bytes(),
        ));
        return;
    };

    let full_path = context.repo_root.join(&relative);
    if !full_path.starts_with(&context.repo_root) || !full_path.is_dir() {
        session.send(Frame::new(
            message::RESP_TARGET_REPO_ERROR,
            format!("no such repository: {}\0", raw_path).into_bytes(),
        ));
        return;
    }

    match Repository::load(&full_path) {
        Ok(repository) => {
            *session.repository.lock().await = Some(repository);
            session.send(Frame::new(
                message::RESP_TARGET_REPO_ACK,
                format!("repository selected: {}\0", raw_path).into_bytes(),
            ));
        }
        Err(error) => {
            session.send(Frame::new(
                message::RESP_TARGET_REPO_ERROR,
                format!("unable to load repository: {}\0", error).into_bytes(),
            ));
        }
    }
}

/// Reject absolute paths and any `..` traversal, yield a clean relative path
fn normalize_repo_path(raw: &str) -> Option<PathBuf> {
    if raw.is_empty() {
        return None;
    }
    let path = Path::new(raw);
    if path.is_absolute() {
        return None;
    }

    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }

    if normalized.as_os_str().is_empty() {
        None
    } else {
        Some(normalized)
    }
}
