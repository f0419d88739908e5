//! Synchronous transfer client
//!
//! One blocking TCP connection per remote operation, driven from the CLI
//! process. Requests and responses are strict pairs except for the refs
//! listing, which streams `REFS_LIST_BEGIN` / `REFS_ENTRY`* /
//! `REFS_LIST_END`.

use crate::protocol::{self, Frame, HEADER_LEN, MAX_BODY_LEN, message};
use anyhow::Context;
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use bytes::Bytes;
use std::io::{Read, Write};
use std::net::TcpStream;

/// Parsed remote URL: `host:port/server-repo-path`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUrl {
    pub host: String,
    pub port: u16,
    pub repo_path: String,
}

impl RemoteUrl {
    pub fn parse(url: &str) -> anyhow::Result<Self> {
        let (host, rest) = url
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("remote url must look like host:port/path: {}", url))?;
        let (port, repo_path) = rest
            .split_once('/')
            .ok_or_else(|| anyhow::anyhow!("remote url is missing the repository path: {}", url))?;

        if host.is_empty() || repo_path.is_empty() {
            anyhow::bail!("remote url must look like host:port/path: {}", url);
        }
        let port: u16 = port
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid port in remote url: {}", url))?;

        Ok(RemoteUrl {
            host: host.to_string(),
            port,
            repo_path: repo_path.to_string(),
        })
    }
}

/// Parse a bare `host:port` server address
pub fn parse_host_port(address: &str) -> anyhow::Result<(String, u16)> {
    let (host, port) = address
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("server address must look like host:port: {}", address))?;
    if host.is_empty() {
        anyhow::bail!("server address must look like host:port: {}", address);
    }
    let port: u16 = port
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid port in server address: {}", address))?;
    Ok((host.to_string(), port))
}

pub struct RemoteClient {
    stream: TcpStream,
}

impl RemoteClient {
    pub fn connect(host: &str, port: u16) -> anyhow::Result<Self> {
        let stream = TcpStream::connect((host, port))
            .with_context(|| format!("unable to connect to {}:{}", host, port))?;
        stream.set_nodelay(true).ok();
        Ok(RemoteClient { stream })
    }

    fn send(&mut self, frame: &Frame) -> anyhow::Result<()> {
        self.stream
            .write_all(&frame.encode())
            .context("failed to send request frame")
    }

    fn recv(&mut self) -> anyhow::Result<Frame> {
        let mut header = [0u8; HEADER_LEN];
        self.stream
            .read_exact(&mut header)
            .context("connection closed while reading frame header")?;
        let (id, body_len) = protocol::unpack_header(&header);

        if body_len > MAX_BODY_LEN {
            anyhow::bail!("server sent an oversized frame body ({} bytes)", body_len);
        }

        let mut body = vec![0u8; body_len as usize];
        self.stream
            .read_exact(&mut body)
            .context("connection closed while reading frame body")?;

        Ok(Frame::new(id, body))
    }

    fn request(&mut self, frame: &Frame) -> anyhow::Result<Frame> {
        self.send(frame)?;
        self.recv()
    }

    fn body_text(frame: &Frame) -> String {
        protocol::take_cstr(&frame.body)
            .map(|(text, _)| text.to_string())
            .unwrap_or_else(|| String::from_utf8_lossy(&frame.body).to_string())
    }

    // ---- authentication ----

    /// Register a user; returns `(succeeded, server message)`
    pub fn register_user(
        &mut self,
        username: &str,
        password: &str,
    ) -> anyhow::Result<(bool, String)> {
        let body = format!("{}\0{}\0", username, password);
        let response = self.request(&Frame::new(message::REQ_REGISTER_USER, body.into_bytes()))?;

        match response.id {
            message::RESP_REGISTER_SUCCESS => Ok((true, Self::body_text(&response))),
            message::RESP_REGISTER_FAILURE | message::RESP_ERROR => {
                Ok((false, Self::body_text(&response)))
            }
            other => anyhow::bail!("unexpected response {} to register", other),
        }
    }

    /// Log in; returns the session token on success, the failure message
    /// otherwise
    pub fn login_user(
        &mut self,
        username: &str,
        password: &str,
    ) -> anyhow::Result<Result<String, String>> {
        let body = format!("{}\0{}\0", username, password);
        let response = self.request(&Frame::new(message::REQ_LOGIN_USER, body.into_bytes()))?;

        match response.id {
            message::RESP_LOGIN_SUCCESS => {
                let (token, _) = protocol::take_cstr(&response.body)
                    .ok_or_else(|| anyhow::anyhow!("login response is missing the token"))?;
                Ok(Ok(token.to_string()))
            }
            message::RESP_LOGIN_FAILURE | message::RESP_ERROR => {
                Ok(Err(Self::body_text(&response)))
            }
            other => anyhow::bail!("unexpected response {} to login", other),
        }
    }

    // ---- repository operations ----

    /// Select the repository this session operates on
    ///
    /// TARGET_REPO is the one repository message that carries no token
    /// prefix; the body is just the NUL-terminated relative path.
    pub fn target_repository(&mut self, repo_path: &str) -> anyhow::Result<()> {
        let body = format!("{}\0", repo_path);
        let response = self.request(&Frame::new(message::REQ_TARGET_REPO, body.into_bytes()))?;

        match response.id {
            message::RESP_TARGET_REPO_ACK => Ok(()),
            message::RESP_TARGET_REPO_ERROR => anyhow::bail!(
                "server rejected repository '{}': {}",
                repo_path,
                Self::body_text(&response)
            ),
            message::RESP_AUTH_REQUIRED => anyhow::bail!("authentication required"),
            other => anyhow::bail!("unexpected response {} to target-repo", other),
        }
    }

    /// List the remote's refs as ordered `(name, value)` pairs
    pub fn list_refs(&mut self, token: &str) -> anyhow::Result<Vec<(String, String)>> {
        let body = protocol::wrap_with_token(token, b"");
        self.send(&Frame::new(message::REQ_LIST_REFS, body))?;

        let first = self.recv()?;
        match first.id {
            message::RESP_REFS_LIST_BEGIN => {}
            message::RESP_AUTH_REQUIRED => anyhow::bail!("authentication required"),
            message::RESP_ERROR => anyhow::bail!("server error: {}", Self::body_text(&first)),
            other => anyhow::bail!("unexpected response {} to list-refs", other),
        }

        let mut refs = Vec::new();
        loop {
            let frame = self.recv()?;
            match frame.id {
                message::RESP_REFS_ENTRY => {
                    let (name, rest) = protocol::take_cstr(&frame.body)
                        .ok_or_else(|| anyhow::anyhow!("malformed refs entry"))?;
                    let (value, _) = protocol::take_cstr(rest)
                        .ok_or_else(|| anyhow::anyhow!("malformed refs entry value"))?;
                    refs.push((name.to_string(), value.to_string()));
                }
                message::RESP_REFS_LIST_END => break,
                other => anyhow::bail!("unexpected frame {} inside refs listing", other),
            }
        }

        Ok(refs)
    }

    /// Download one object; `None` when the server does not have it
    pub fn get_object(
        &mut self,
        token: &str,
        object_hash: &str,
    ) -> anyhow::Result<Option<(String, Bytes)>> {
        let body = protocol::wrap_with_token(token, object_hash.as_bytes());
        let response = self.request(&Frame::new(message::REQ_GET_OBJECT, body))?;

        match response.id {
            message::RESP_OBJECT_CONTENT => {
                if response.body.len() < 40 {
                    anyhow::bail!("object content response is too short");
                }
                let hash = std::str::from_utf8(&response.body[..40])?.to_string();
                let raw = response.body.slice(40..);
                Ok(Some((hash, raw)))
            }
            message::RESP_OBJECT_NOT_FOUND => Ok(None),
            message::RESP_AUTH_REQUIRED => anyhow::bail!("authentication required"),
            message::RESP_ERROR => anyhow::bail!("server error: {}", Self::body_text(&response)),
            other => anyhow::bail!("unexpected response {} to get-object", other),
        }
    }

    /// Ask the server which of `hashes` it already has
    pub fn check_objects(&mut self, token: &str, hashes: &[String]) -> anyhow::Result<Vec<bool>> {
        let mut payload = Vec::with_capacity(4 + hashes.len() * 40);
        payload.write_u32::<BigEndian>(hashes.len() as u32)?;
        for hash in hashes {
            payload.extend_from_slice(hash.as_bytes());
        }

        let body = protocol::wrap_with_token(token, &payload);
        let response = self.request(&Frame::new(message::REQ_CHECK_OBJECTS, body))?;

        match response.id {
            message::RESP_CHECK_OBJECTS_RESULT => {
                if response.body.len() < 4 {
                    anyhow::bail!("check-objects response is too short");
                }
                let count = BigEndian::read_u32(&response.body[..4]) as usize;
                if count != hashes.len() || response.body.len() < 4 + count {
                    anyhow::bail!("check-objects response count mismatch");
                }
                Ok(response.body[4..4 + count]
                    .iter()
                    .map(|&status| status == 0x01)
                    .collect())
            }
            message::RESP_AUTH_REQUIRED => anyhow::bail!("authentication required"),
            message::RESP_ERROR => anyhow::bail!("server error: {}", Self::body_text(&response)),
            other => anyhow::bail!("unexpected response {} to check-objects", other),
        }
    }

    /// Upload one raw object (header included)
    pub fn put_object(&mut self, token: &str, object_hash: &str, raw: &[u8]) -> anyhow::Result<()> {
        let mut payload = Vec::with_capacity(40 + raw.len());
        payload.extend_from_slice(object_hash.as_bytes());
        payload.extend_from_slice(raw);

        let body = protocol::wrap_with_token(token, &payload);
        let response = self.request(&Frame::new(message::REQ_PUT_OBJECT, body))?;

        match response.id {
            message::RESP_ACK_OK => Ok(()),
            message::RESP_AUTH_REQUIRED => anyhow::bail!("authentication required"),
            message::RESP_ERROR => anyhow::bail!(
                "server rejected object {}: {}",
                object_hash,
                Self::body_text(&response)
            ),
            other => anyhow::bail!("unexpected response {} to put-object", other),
        }
    }

    /// Ask the server to move a ref; returns `(updated, server message)`
    pub fn update_ref(
        &mut self,
        token: &str,
        ref_full_name: &str,
        new_hash: &str,
        expected_old_hash: Option<&str>,
        force: bool,
    ) -> anyhow::Result<(bool, String)> {
        let mut payload = Vec::new();
        payload.push(if force { 0x01 } else { 0x00 });
        payload.extend_from_slice(ref_full_name.as_bytes());
        payload.push(0);
        payload.extend_from_slice(new_hash.as_bytes());
        if let Some(old) = expected_old_hash {
            payload.extend_from_slice(old.as_bytes());
        }

        let body = protocol::wrap_with_token(token, &payload);
        let response = self.request(&Frame::new(message::REQ_UPDATE_REF, body))?;

        match response.id {
            message::RESP_REF_UPDATED => Ok((true, Self::body_text(&response))),
            message::RESP_REF_UPDATE_DENIED => Ok((false, Self::body_text(&response))),
            message::RESP_AUTH_REQUIRED => anyhow::bail!("authentication required"),
            message::RESP_ERROR => anyhow::bail!("server error: {}", Self::body_text(&response)),
            other => anyhow::bail!("unexpected response {} to update-ref", other),
        }
    }
}
