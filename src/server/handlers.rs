//! Protocol message handlers
//!
//! Run on the dispatcher worker. Authenticated handlers first strip and
//! validate the token prefix; a bad token answers `AUTH_REQUIRED` and stops
//! there. Handlers reply by queueing frames on the session's write queue.

use crate::artifacts::objects::object::hash_bytes;
use crate::artifacts::objects::object_id::ObjectId;
use crate::protocol::{self, Frame, message};
use crate::server::{ServerContext, TOKEN_TTL_SECONDS};
use crate::server::session::Session;
use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info};

/// Route one message to its handler
pub async fn dispatch(
    context: &Arc<ServerContext>,
    session: &Arc<Session>,
    frame: Frame,
) -> anyhow::Result<()> {
    match frame.id {
        message::TEST_PING_REQ => {
            session.send(Frame::empty(message::TEST_PONG_RESP));
            Ok(())
        }
        message::TEST_ECHO_REQ => {
            session.send(Frame::new(message::TEST_ECHO_RESP, frame.body.clone()));
            Ok(())
        }
        message::REQ_REGISTER_USER => handle_register(context, session, &frame),
        message::REQ_LOGIN_USER => handle_login(context, session, &frame),
        message::REQ_LIST_REFS => handle_list_refs(context, session, &frame).await,
        message::REQ_GET_OBJECT => handle_get_object(context, session, &frame).await,
        message::REQ_CHECK_OBJECTS => handle_check_objects(context, session, &frame).await,
        message::REQ_PUT_OBJECT => handle_put_object(context, session, &frame).await,
        message::REQ_UPDATE_REF => handle_update_ref(context, session, &frame).await,
        other => {
            session.send_error(&format!("unknown message id {}", other));
            Ok(())
        }
    }
}

/// Strip and validate the token prefix of an authenticated body
///
/// On failure the `AUTH_REQUIRED` reply is already queued and `None` is
/// returned.
fn authenticate<'b>(
    context: &ServerContext,
    session: &Session,
    body: &'b [u8],
) -> Option<(String, &'b [u8])> {
    let Some((token, payload)) = protocol::split_token(body) else {
        session.send(Frame::new(
            message::RESP_AUTH_REQUIRED,
            &b"missing token\0"[..],
        ));
        return None;
    };

    match context.tokens.validate(token) {
        Some(username) => Some((username, payload)),
        None => {
            session.send(Frame::new(
                message::RESP_AUTH_REQUIRED,
                &b"invalid or expired token\0"[..],
            ));
            None
        }
    }
}

fn handle_register(
    context: &Arc<ServerContext>,
    session: &Arc<Session>,
    frame: &Frame,
) -> anyhow::Result<()> {
    let Some((username, rest)) = protocol::take_cstr(&frame.body) else {
        session.send(Frame::new(
            message::RESP_REGISTER_FAILURE,
            &b"malformed register request\0"[..],
        ));
        return Ok(());
    };
    let Some((password, _)) = protocol::take_cstr(rest) else {
        session.send(Frame::new(
            message::RESP_REGISTER_FAILURE,
            &b"malformed register request\0"[..],
        ));
        return Ok(());
    };

    match context.users.register(username, password) {
        Ok(()) => {
            info!(username, "user registered");
            session.send(Frame::new(
                message::RESP_REGISTER_SUCCESS,
                format!("user '{}' registered\0", username).into_bytes(),
            ));
        }
        Err(error) => {
            session.send(Frame::new(
                message::RESP_REGISTER_FAILURE,
                format!("{}\0", error).into_bytes(),
            ));
        }
    }
    Ok(())
}

fn handle_login(
    context: &Arc<ServerContext>,
    session: &Arc<Session>,
    frame: &Frame,
) -> anyhow::Result<()> {
    let credentials = protocol::take_cstr(&frame.body)
        .and_then(|(username, rest)| protocol::take_cstr(rest).map(|(password, _)| (username, password)));
    let Some((username, password)) = credentials else {
        session.send(Frame::new(
            message::RESP_LOGIN_FAILURE,
            &b"malformed login request\0"[..],
        ));
        return Ok(());
    };

    if context.users.verify(username, password) {
        let token = context.tokens.generate(username, TOKEN_TTL_SECONDS);
        debug!(username, "login succeeded");
        session.send(Frame::new(
            message::RESP_LOGIN_SUCCESS,
            format!("{}\0", token).into_bytes(),
        ));
    } else {
        session.send(Frame::new(
            message::RESP_LOGIN_FAILURE,
            &b"invalid username or password\0"[..],
        ));
    }
    Ok(())
}

async fn handle_list_refs(
    context: &Arc<ServerContext>,
    session: &Arc<Session>,
    frame: &Frame,
) -> anyhow::Result<()> {
    let Some((_user, _payload)) = authenticate(context, session, &frame.body) else {
        return Ok(());
    };

    let repository = session.repository.lock().await;
    let repository = repository
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("no repository selected"))?;

    let refs = repository.refs().all_local_refs()?;

    session.send(Frame::empty(message::RESP_REFS_LIST_BEGIN));
    for (name, value) in refs {
        session.send(Frame::new(
            message::RESP_REFS_ENTRY,
            format!("{}\0{}\0", name, value).into_bytes(),
        ));
    }
    session.send(Frame::empty(message::RESP_REFS_LIST_END));
    Ok(())
}

async fn handle_get_object(
    context: &Arc<ServerContext>,
    session: &Arc<Session>,
    frame: &Frame,
) -> anyhow::Result<()> {
    let Some((_user, payload)) = authenticate(context, session, &frame.body) else {
        return Ok(());
    };

    let requested = std::str::from_utf8(payload)
        .map_err(|_| anyhow::anyhow!("object hash is not valid UTF-8"))?
        .trim()
        .to_string();

    let repository = session.repository.lock().await;
    let repository = repository
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("no repository selected"))?;

    match repository.database().raw_object(&requested) {
        Ok(Some(raw)) => {
            // answer with the full hash, then the raw object bytes
            let full_hash = hash_bytes(&raw);
            let mut body = Vec::with_capacity(40 + raw.len());
            body.extend_from_slice(full_hash.as_str().as_bytes());
            body.extend_from_slice(&raw);
            session.send(Frame::new(message::RESP_OBJECT_CONTENT, body));
        }
        Ok(None) | Err(_) => {
            session.send(Frame::new(
                message::RESP_OBJECT_NOT_FOUND,
                Bytes::copy_from_slice(requested.as_bytes()),
            ));
        }
    }
    Ok(())
}

async fn handle_check_objects(
    context: &Arc<ServerContext>,
    session: &Arc<Session>,
    frame: &Frame,
) -> anyhow::Result<()> {
    let Some((_user, payload)) = authenticate(context, session, &frame.body) else {
        return Ok(());
    };

    if payload.len() < 4 {
        session.send_error("malformed check-objects request");
        return Ok(());
    }
    let count = BigEndian::read_u32(&payload[..4]) as usize;
    let hashes = &payload[4..];
    if hashes.len() != count * 40 {
        session.send_error("check-objects count does not match payload");
        return Ok(());
    }

    let repository = session.repository.lock().await;
    let repository = repository
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("no repository selected"))?;

    let mut body = Vec::with_capacity(4 + count);
    body.extend_from_slice(&payload[..4]);
    for chunk in hashes.chunks_exact(40) {
        let hash = std::str::from_utf8(chunk).unwrap_or("");
        let present = repository.database().contains(hash);
        body.push(if present { 0x01 } else { 0x00 });
    }

    session.send(Frame::new(message::RESP_CHECK_OBJECTS_RESULT, body));
    Ok(())
}

async fn handle_put_object(
    context: &Arc<ServerContext>,
    session: &Arc<Session>,
    frame: &Frame,
) -> anyhow::Result<()> {
    let Some((user, payload)) = authenticate(context, session, &frame.body) else {
        return Ok(());
    };

    if payload.len() < 40 {
        session.send_error("put-object payload is too short");
        return Ok(());
    }
    let claimed = std::str::from_utf8(&payload[..40])
        .map_err(|_| anyhow::anyhow!("object hash is not valid UTF-8"))?;
    let claimed_oid = ObjectId::try_parse(claimed)?;
    let raw = &payload[40..];

    // never trust the client's hash
    if hash_bytes(raw) != claimed_oid {
        session.send_error(&format!("object data does not hash to {}", claimed_oid));
        return Ok(());
    }

    let repository = session.repository.lock().await;
    let repository = repository
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("no repository selected"))?;

    repository.database().write_raw(&claimed_oid, raw)?;
    debug!(session = %session.id, user = %user, object = %claimed_oid, "object stored");

    session.send(Frame::new(
        message::RESP_ACK_OK,
        Bytes::copy_from_slice(claimed_oid.as_str().as_bytes()),
    ));
    Ok(())
}

async fn handle_update_ref(
    context: &Arc<ServerContext>,
    session: &Arc<Session>,
    frame: &Frame,
) -> anyhow::Result<()> {
    let Some((user, payload)) = authenticate(context, session, &frame.body) else {
        return Ok(());
    };

    // [force: u8][ref-name\0][new 40][old 40]?
    if payload.is_empty() {
        session.send_error("malformed update-ref request");
        return Ok(());
    }
    let force = payload[0] == 0x01;
    let Some((ref_name, rest)) = protocol::take_cstr(&payload[1..]) else {
        session.send_error("malformed update-ref request");
        return Ok(());
    };
    if rest.len() != 40 && rest.len() != 80 {
        session.send_error("malformed update-ref hashes");
        return Ok(());
    }
    let new_hash = std::str::from_utf8(&rest[..40])
        .map_err(|_| anyhow::anyhow!("new hash is not valid UTF-8"))?;
    let expected_old = if rest.len() == 80 {
        Some(
            std::str::from_utf8(&rest[40..])
                .map_err(|_| anyhow::anyhow!("old hash is not valid UTF-8"))?,
        )
    } else {
        None
    };

    let ref_name = ref_name.to_string();
    let new_hash = new_hash.to_string();
    let expected_old = expected_old.map(str::to_string);

    let repository = session.repository.lock().await;
    let repository = repository
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("no repository selected"))?;

    use crate::areas::refs::UpdateRefOutcome;
    let outcome = repository.refs().update_ref(
        repository.database(),
        &ref_name,
        &new_hash,
        expected_old.as_deref(),
        force,
    );

    match outcome {
        UpdateRefOutcome::Success => {
            info!(session = %session.id, user = %user, ref_name = %ref_name, new_hash = %new_hash, "ref updated");
            let mut body = format!("{}\0{}", ref_name, new_hash).into_bytes();
            if let Some(old) = &expected_old {
                body.extend_from_slice(format!("\0{}", old).as_bytes());
            }
            body.push(0);
            session.send(Frame::new(message::RESP_REF_UPDATED, body));
        }
        denied => {
            debug!(session = %session.id, user = %user, ref_name = %ref_name, outcome = ?denied, "ref update denied");
            session.send(Frame::new(
                message::RESP_REF_UPDATE_DENIED,
                format!("{}\0", denied.reason()).into_bytes(),
            ));
        }
    }
    Ok(())
}
