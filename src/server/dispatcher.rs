//! Single-worker message dispatcher
//!
//! One task drains the queue of `(session, frame)` pairs and runs the
//! handler for each message to completion before taking the next. Because
//! there is exactly one consumer, every repository handled here sees
//! strictly serialized access and handler faults never propagate past the
//! worker; they become `ERROR` replies on the offending session.

use crate::protocol::Frame;
use crate::server::ServerContext;
use crate::server::handlers;
use crate::server::session::Session;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One unit of work for the dispatcher
pub struct DispatchItem {
    pub session: Arc<Session>,
    pub frame: Frame,
}

/// Spawn the dispatcher worker; it exits when every sender is dropped
pub fn spawn(
    context: Arc<ServerContext>,
    mut queue: mpsc::UnboundedReceiver<DispatchItem>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(item) = queue.recv().await {
            let DispatchItem { session, frame } = item;
            let id = frame.id;

            if session.is_closed() {
                continue;
            }

            if let Err(error) = handlers::dispatch(&context, &session, frame).await {
                warn!(session = %session.id, message_id = id, %error, "handler failed");
                if !session.is_closed() {
                    session.send_error(&format!("internal error handling message {}", id));
                }
            }
        }
        debug!("dispatcher drained and stopped");
    })
}
