//! RFC 2617 digest authentication
//!
//! Challenge parsing and response computation for HTTP Digest. MD5 is
//! mandated by the scheme; devices reject anything else. Only `qop=auth`
//! and the legacy no-qop variant are supported, `auth-int` is not.

use crate::error::{OnvifError, Result};
use std::sync::{Mutex, PoisonError};

/// A parsed `WWW-Authenticate: Digest` challenge, scoped to one retry attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub qop: Option<String>,
    pub opaque: Option<String>,
}

impl DigestChallenge {
    /// Parse a `WWW-Authenticate` header value.
    ///
    /// Fails when the scheme is not Digest, when realm or nonce are missing,
    /// or when the server only offers an unsupported qop.
    pub fn parse(header: &str) -> Result<Self> {
        let params = header
            .trim()
            .strip_prefix("Digest")
            .ok_or_else(|| {
                OnvifError::authentication(format!(
                    "unsupported authentication scheme in challenge: {header:?}"
                ))
            })?;

        let mut realm = None;
        let mut nonce = None;
        let mut qop = None;
        let mut opaque = None;

        for param in split_params(params) {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').to_string();
            match key.trim().to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "nonce" => nonce = Some(value),
                "qop" => qop = Some(value),
                "opaque" => opaque = Some(value),
                _ => {}
            }
        }

        let realm =
            realm.ok_or_else(|| OnvifError::authentication("digest challenge missing realm"))?;
        let nonce =
            nonce.ok_or_else(|| OnvifError::authentication("digest challenge missing nonce"))?;

        // The server may offer a list ("auth,auth-int"); pick auth or bail
        let qop = match qop {
            Some(offered) => {
                if offered.split(',').any(|v| v.trim() == "auth") {
                    Some("auth".to_string())
                } else {
                    return Err(OnvifError::authentication(format!(
                        "no supported qop in digest challenge: {offered:?}"
                    )));
                }
            }
            None => None,
        };

        Ok(Self {
            realm,
            nonce,
            qop,
            opaque,
        })
    }
}

/// Split challenge parameters on commas, honoring quoted values
fn split_params(s: &str) -> Vec<String> {
    let mut params = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in s.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            ',' if !quoted => {
                if !current.trim().is_empty() {
                    params.push(current.trim().to_string());
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        params.push(current.trim().to_string());
    }
    params
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input))
}

/// Compute the RFC 2617 response value.
///
/// Pure: `cnonce` and `nc` are inputs so the computation is deterministic
/// and directly testable against reference vectors. `cnonce` is only used
/// for the `qop=auth` variant.
pub fn digest_response(
    challenge: &DigestChallenge,
    method: &str,
    uri: &str,
    username: &str,
    password: &str,
    cnonce: Option<&str>,
    nc: u64,
) -> String {
    let ha1 = md5_hex(&format!("{username}:{}:{password}", challenge.realm));
    let ha2 = md5_hex(&format!("{method}:{uri}"));
    match (challenge.qop.as_deref(), cnonce) {
        (Some("auth"), Some(cnonce)) => md5_hex(&format!(
            "{ha1}:{}:{nc:08x}:{cnonce}:auth:{ha2}",
            challenge.nonce
        )),
        _ => md5_hex(&format!("{ha1}:{}:{ha2}", challenge.nonce)),
    }
}

/// Per-transport digest state: credentials plus the replay-protection
/// counter. The counter is owned by the transport instance and incremented
/// through a synchronized accessor so concurrent requests never emit the
/// same nc value.
#[derive(Debug)]
pub struct DigestState {
    username: String,
    password: String,
    counter: Mutex<u64>,
}

impl DigestState {
    pub fn new<S: Into<String>>(username: S, password: S) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            counter: Mutex::new(0),
        }
    }

    /// Increment and read the nonce counter. The counter is per-instance,
    /// not per-(realm, nonce); servers tolerate a monotonically increasing
    /// nc across nonces.
    fn next_nonce_count(&self) -> u64 {
        let mut guard = self
            .counter
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *guard += 1;
        *guard
    }

    /// Produce the `Authorization` header value answering `challenge` for
    /// one request, drawing a fresh nc and client nonce when qop is in play.
    pub fn authorization(&self, challenge: &DigestChallenge, method: &str, uri: &str) -> String {
        match challenge.qop.as_deref() {
            Some("auth") => {
                let nc = self.next_nonce_count();
                let cnonce = format!("{:016x}", rand::random::<u64>());
                let response = digest_response(
                    challenge,
                    method,
                    uri,
                    &self.username,
                    &self.password,
                    Some(&cnonce),
                    nc,
                );
                let mut header = format!(
                    "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{uri}\", response=\"{response}\"",
                    self.username, challenge.realm, challenge.nonce
                );
                if let Some(opaque) = &challenge.opaque {
                    header.push_str(&format!(", opaque=\"{opaque}\""));
                }
                header.push_str(&format!(", qop=auth, nc={nc:08x}, cnonce=\"{cnonce}\""));
                header
            }
            _ => {
                let response = digest_response(
                    challenge,
                    method,
                    uri,
                    &self.username,
                    &self.password,
                    None,
                    0,
                );
                let mut header = format!(
                    "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{uri}\", response=\"{response}\"",
                    self.username, challenge.realm, challenge.nonce
                );
                if let Some(opaque) = &challenge.opaque {
                    header.push_str(&format!(", opaque=\"{opaque}\""));
                }
                header
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn challenge(qop: Option<&str>) -> DigestChallenge {
        DigestChallenge {
            realm: "test".to_string(),
            nonce: "abc123".to_string(),
            qop: qop.map(str::to_string),
            opaque: None,
        }
    }

    #[test]
    fn test_parse_full_challenge() {
        let parsed = DigestChallenge::parse(
            r#"Digest realm="test", nonce="abc123", qop="auth,auth-int", opaque="secret""#,
        )
        .unwrap();
        assert_eq!(parsed.realm, "test");
        assert_eq!(parsed.nonce, "abc123");
        assert_eq!(parsed.qop.as_deref(), Some("auth"));
        assert_eq!(parsed.opaque.as_deref(), Some("secret"));
    }

    #[test]
    fn test_parse_quoted_commas_and_unquoted_values() {
        let parsed =
            DigestChallenge::parse(r#"Digest realm="a, b", nonce=xyz, qop=auth"#).unwrap();
        assert_eq!(parsed.realm, "a, b");
        assert_eq!(parsed.nonce, "xyz");
        assert_eq!(parsed.qop.as_deref(), Some("auth"));
    }

    #[test]
    fn test_parse_rejects_basic_and_incomplete() {
        assert!(DigestChallenge::parse(r#"Basic realm="test""#).is_err());
        assert!(DigestChallenge::parse(r#"Digest nonce="abc123""#).is_err());
        assert!(DigestChallenge::parse(r#"Digest realm="test""#).is_err());
        // auth-int only: unsupported
        assert!(DigestChallenge::parse(r#"Digest realm="r", nonce="n", qop="auth-int""#).is_err());
    }

    #[test]
    fn test_digest_vector_qop_auth() {
        // MD5("u:test:p") = 5c8157fd8ef5f6b56629b7399d83ce25
        // MD5("GET:/x")   = 39703b9244f1eabf92f738ac2f185993
        let response = digest_response(
            &challenge(Some("auth")),
            "GET",
            "/x",
            "u",
            "p",
            Some("0a4f113b"),
            1,
        );
        assert_eq!(response, "d0f93b3509de1f02871856f6d2ca5073");
    }

    #[test]
    fn test_digest_vector_no_qop() {
        let response = digest_response(&challenge(None), "GET", "/x", "u", "p", None, 0);
        assert_eq!(response, "116291de481c248b7dcdcf67be5715ca");
    }

    #[test]
    fn test_header_fields_qop_auth() {
        let state = DigestState::new("u", "p");
        let header = state.authorization(&challenge(Some("auth")), "GET", "/x");
        assert!(header.starts_with("Digest "));
        assert!(header.contains(r#"username="u""#));
        assert!(header.contains(r#"realm="test""#));
        assert!(header.contains(r#"uri="/x""#));
        assert!(header.contains("qop=auth"));
        assert!(header.contains("nc=00000001"));
        assert!(header.contains("cnonce="));

        let second = state.authorization(&challenge(Some("auth")), "GET", "/x");
        assert!(second.contains("nc=00000002"));
    }

    #[test]
    fn test_header_fields_no_qop() {
        let state = DigestState::new("u", "p");
        let header = state.authorization(&challenge(None), "GET", "/x");
        assert!(!header.contains("qop"));
        assert!(!header.contains("nc="));
        assert!(!header.contains("cnonce"));
        assert!(header.contains("response=\"116291de481c248b7dcdcf67be5715ca\""));
    }

    #[test]
    fn test_concurrent_nonce_counts_are_distinct() {
        let state = Arc::new(DigestState::new("u", "p"));
        let mut handles = Vec::new();
        for _ in 0..32 {
            let state = Arc::clone(&state);
            handles.push(std::thread::spawn(move || {
                state.authorization(&challenge(Some("auth")), "GET", "/x")
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            let header = handle.join().unwrap();
            let nc_start = header.find("nc=").unwrap() + 3;
            let nc = header[nc_start..nc_start + 8].to_string();
            assert!(seen.insert(nc), "duplicate nc value observed");
        }
        assert_eq!(seen.len(), 32);
    }
}
