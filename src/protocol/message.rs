//! Message identifier catalog
//!
//! Client-to-server requests live in the 2000 range, server-to-client
//! responses in the 3000 range, and the 1–4 block is a ping/echo pair kept
//! for connectivity checks.
//!
//! Body conventions per message:
//!
//! | id | body |
//! |---|---|
//! | `REQ_LIST_REFS`     | auth; empty original payload |
//! | `REQ_GET_OBJECT`    | auth; 40-hex hash |
//! | `REQ_CHECK_OBJECTS` | auth; `[count: u32 BE][count × 40-hex]` |
//! | `REQ_PUT_OBJECT`    | auth; `[40-hex][raw object bytes incl. header]` |
//! | `REQ_UPDATE_REF`    | auth; `[force: u8][ref-name\0][new 40][old 40]?` |
//! | `REQ_TARGET_REPO`   | not auth-wrapped; `<repo-rel-path>\0` |
//! | `REQ_REGISTER_USER` / `REQ_LOGIN_USER` | `<user>\0<password>\0` |
//! | `RESP_REFS_ENTRY`   | `<name>\0<value>\0` |
//! | `RESP_OBJECT_CONTENT` | `[40-hex][raw object bytes]` |
//! | `RESP_CHECK_OBJECTS_RESULT` | `[count: u32 BE][count × status byte]` |
//! | `RESP_LOGIN_SUCCESS` | `<token>\0` |

// test / connectivity block
pub const TEST_ECHO_REQ: u16 = 1;
pub const TEST_ECHO_RESP: u16 = 2;
pub const TEST_PING_REQ: u16 = 3;
pub const TEST_PONG_RESP: u16 = 4;

// client -> server requests
pub const REQ_LIST_REFS: u16 = 2001;
pub const REQ_GET_OBJECT: u16 = 2002;
pub const REQ_CHECK_OBJECTS: u16 = 2003;
pub const REQ_PUT_OBJECT: u16 = 2004;
pub const REQ_UPDATE_REF: u16 = 2005;
pub const REQ_TARGET_REPO: u16 = 2010;
pub const REQ_REGISTER_USER: u16 = 2020;
pub const REQ_LOGIN_USER: u16 = 2021;

// server -> client responses
pub const RESP_ACK_OK: u16 = 3001;
pub const RESP_ERROR: u16 = 3002;
pub const RESP_REFS_LIST_BEGIN: u16 = 3003;
pub const RESP_REFS_ENTRY: u16 = 3004;
pub const RESP_REFS_LIST_END: u16 = 3005;
pub const RESP_OBJECT_CONTENT: u16 = 3006;
pub const RESP_OBJECT_NOT_FOUND: u16 = 3007;
pub const RESP_CHECK_OBJECTS_RESULT: u16 = 3008;
pub const RESP_REF_UPDATED: u16 = 3009;
pub const RESP_REF_UPDATE_DENIED: u16 = 3010;
pub const RESP_TARGET_REPO_ACK: u16 = 3020;
pub const RESP_TARGET_REPO_ERROR: u16 = 3021;
pub const RESP_REGISTER_SUCCESS: u16 = 3030;
pub const RESP_REGISTER_FAILURE: u16 = 3031;
pub const RESP_LOGIN_SUCCESS: u16 = 3032;
pub const RESP_LOGIN_FAILURE: u16 = 3033;
pub const RESP_AUTH_REQUIRED: u16 = 3034;

/// Whether an id belongs to the server-to-client response range
pub fn is_response_id(id: u16) -> bool {
    (3001..=3034).contains(&id) || id == TEST_ECHO_RESP || id == TEST_PONG_RESP
}

/// Whether the message carries a token prefix and requires authentication
pub fn requires_auth(id: u16) -> bool {
    matches!(
        id,
        REQ_LIST_REFS | REQ_GET_OBJECT | REQ_CHECK_OBJECTS | REQ_PUT_OBJECT | REQ_UPDATE_REF
    )
}

/// Whether the message can be dispatched without a selected repository
pub fn repository_free(id: u16) -> bool {
    matches!(
        id,
        REQ_REGISTER_USER | REQ_LOGIN_USER | TEST_ECHO_REQ | TEST_PING_REQ
    )
}

/// Whether a zero-length body is answered with an immediate error
///
/// Authenticated messages are not listed: their empty body is a missing
/// token, which the dispatcher answers with `AUTH_REQUIRED`.
pub fn body_required(id: u16) -> bool {
    matches!(id, REQ_TARGET_REPO | REQ_REGISTER_USER | REQ_LOGIN_USER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges() {
        assert!(is_response_id(RESP_ACK_OK));
        assert!(is_response_id(RESP_AUTH_REQUIRED));
        assert!(!is_response_id(REQ_LIST_REFS));
        assert!(requires_auth(REQ_PUT_OBJECT));
        assert!(!requires_auth(REQ_TARGET_REPO));
        assert!(repository_free(REQ_LOGIN_USER));
        assert!(!repository_free(REQ_GET_OBJECT));
    }
}
