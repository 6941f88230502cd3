//! Adobe connect authentication.
//!
//! Flash Media Server and its descendants reject the first connect of a
//! protected application with `authmod=adobe` in the status description and
//! expect the client to reconnect with query parameters attached to the URL.
//! The second rejection carries `reason=needauth` plus a salt and either an
//! opaque token or a server challenge, from which the client derives the
//! response digest. This is commonly called the San Jose variant.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// True when the rejection leaves no retry the client could make.
pub(crate) fn is_terminal_rejection(description: &str) -> bool {
    description.contains("reason=nosuchuser") || description.contains("reason=authfailed")
}

/// True when the server asks for the challenge response round.
pub(crate) fn needs_challenge(description: &str) -> bool {
    description.contains("reason=needauth")
}

/// True when the server asks for authentication at all.
pub(crate) fn wants_adobe_auth(description: &str) -> bool {
    description.contains("authmod=adobe")
}

/// URL for the first retry: announce the auth mode and user.
pub(crate) fn initial_auth_url(url: &str, username: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}authmod=adobe&user={}", url, separator, username)
}

/// URL for the second retry, carrying the response to the server challenge
/// found in `description`. Returns `None` when the description has no query
/// part to answer.
pub(crate) fn challenge_response_url(
    url: &str,
    username: &str,
    password: &str,
    description: &str,
) -> Option<String> {
    let (_, query) = description.split_once('?')?;
    let params = query_pairs(query);
    let salt = params.get("salt").copied().unwrap_or_default();
    let opaque = params.get("opaque").copied();
    let server_challenge = params.get("challenge").copied();
    let challenge = format!("{:08x}", random_u32());

    let mixin = opaque.or(server_challenge);
    let response = auth_response(username, password, salt, mixin, &challenge);

    let mut command = String::from(url);
    if let Some(opaque) = opaque {
        command.push_str("&opaque=");
        command.push_str(opaque);
    }
    command.push_str("&challenge=");
    command.push_str(&challenge);
    command.push_str("&response=");
    command.push_str(&response);
    Some(command)
}

/// The response digest: md5(md5(user + salt + password) + opaque-or-challenge
/// + client challenge), both digests base64 encoded.
fn auth_response(
    username: &str,
    password: &str,
    salt: &str,
    mixin: Option<&str>,
    challenge: &str,
) -> String {
    let mut response = md5_base64(&format!("{}{}{}", username, salt, password));
    if let Some(mixin) = mixin {
        response.push_str(mixin);
    }
    md5_base64(&format!("{}{}", response, challenge))
}

fn md5_base64(input: &str) -> String {
    STANDARD.encode(md5::compute(input).0)
}

fn query_pairs(query: &str) -> HashMap<&str, &str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .collect()
}

fn random_u32() -> u32 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let mixed = (nanos | 1)
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    (mixed >> 32) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_base64_known_value() {
        // md5("") = d41d8cd98f00b204e9800998ecf8427e
        assert_eq!(md5_base64(""), "1B2M2Y8AsgTpgAmY7PhCfg==");
    }

    #[test]
    fn test_rejection_classification() {
        assert!(is_terminal_rejection("code=403 need auth; ?reason=nosuchuser"));
        assert!(is_terminal_rejection("?reason=authfailed&opaque=abc"));
        assert!(!is_terminal_rejection("authmod=adobe"));
        assert!(needs_challenge("authmod=adobe ?reason=needauth&user=u&salt=s"));
        assert!(wants_adobe_auth("[ AccessManager.Reject ] : [ authmod=adobe ] : ?reason=needauth"));
    }

    #[test]
    fn test_initial_auth_url_separator() {
        assert_eq!(
            initial_auth_url("rtmp://host/live/key", "alice"),
            "rtmp://host/live/key?authmod=adobe&user=alice"
        );
        assert_eq!(
            initial_auth_url("rtmp://host/live/key?token=1", "alice"),
            "rtmp://host/live/key?token=1&authmod=adobe&user=alice"
        );
    }

    #[test]
    fn test_challenge_response_with_opaque() {
        let url = "rtmp://host/live/key?authmod=adobe&user=alice";
        let description = "[ AccessManager.Reject ] : [ authmod=adobe ] : \
                           ?reason=needauth&user=alice&salt=abc&opaque=xyz";
        let command = challenge_response_url(url, "alice", "secret", description).unwrap();
        assert!(command.starts_with(url));
        assert!(command.contains("&opaque=xyz"));
        let (_, challenge) = command.split_once("&challenge=").unwrap();
        let (challenge, response) = challenge.split_once("&response=").unwrap();
        assert_eq!(challenge.len(), 8);
        assert!(challenge.chars().all(|c| c.is_ascii_hexdigit()));
        // A base64 encoded MD5 digest is always 24 characters.
        assert_eq!(response.len(), 24);
    }

    #[test]
    fn test_challenge_response_prefers_opaque_over_challenge() {
        let url = "rtmp://host/live/key?authmod=adobe&user=u";
        let with_opaque = "?reason=needauth&salt=s&opaque=op&challenge=ch";
        let command = challenge_response_url(url, "u", "p", with_opaque).unwrap();
        assert!(command.contains("&opaque=op"));

        let with_challenge = "?reason=needauth&salt=s&challenge=ch";
        let command = challenge_response_url(url, "u", "p", with_challenge).unwrap();
        assert!(!command.contains("&opaque="));
    }

    #[test]
    fn test_challenge_response_requires_query() {
        assert!(challenge_response_url("rtmp://host/app", "u", "p", "no query here").is_none());
    }

    #[test]
    fn test_auth_response_is_deterministic() {
        let a = auth_response("alice", "secret", "salt", Some("op"), "00c0ffee");
        let b = auth_response("alice", "secret", "salt", Some("op"), "00c0ffee");
        assert_eq!(a, b);
        assert_eq!(a.len(), 24);
    }

    #[test]
    fn test_auth_response_depends_on_every_input() {
        let base = auth_response("alice", "secret", "salt", Some("op"), "00c0ffee");
        assert_ne!(base, auth_response("bob", "secret", "salt", Some("op"), "00c0ffee"));
        assert_ne!(base, auth_response("alice", "other", "salt", Some("op"), "00c0ffee"));
        assert_ne!(base, auth_response("alice", "secret", "pepper", Some("op"), "00c0ffee"));
        assert_ne!(base, auth_response("alice", "secret", "salt", None, "00c0ffee"));
        assert_ne!(base, auth_response("alice", "secret", "salt", Some("op"), "deadbeef"));
    }
}
