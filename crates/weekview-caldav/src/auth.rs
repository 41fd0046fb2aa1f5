//! HTTP authentication for CalDAV requests.
//!
//! Implements Basic (RFC 7617) and Digest (RFC 7616) authentication.
//! Apple's CalDAV endpoints accept Basic over TLS; several self-hosted
//! servers (Radicale, Baikal) challenge with Digest.

use base64::Engine;
use rand::Rng;
use std::collections::HashMap;

/// HTTP Digest authentication state, kept across requests so the nonce
/// counter stays monotonic.
#[derive(Debug, Clone)]
pub struct DigestAuth {
    /// Realm from the server challenge.
    pub realm: String,
    /// Nonce from the server challenge.
    pub nonce: String,
    /// Opaque value from the server challenge, echoed back if present.
    pub opaque: Option<String>,
    /// Quality-of-protection options offered by the server.
    pub qop: Option<String>,
    /// Digest algorithm, MD5 unless the server says otherwise.
    pub algorithm: String,
    nc: u32,
}

impl DigestAuth {
    /// Parses a `WWW-Authenticate` header into digest state.
    ///
    /// Returns `None` unless the header is a Digest challenge carrying at
    /// least a realm and a nonce.
    pub fn parse(header: &str) -> Option<Self> {
        let content = header.strip_prefix("Digest ")?.trim();
        let params = parse_challenge_params(content);

        Some(Self {
            realm: params.get("realm")?.clone(),
            nonce: params.get("nonce")?.clone(),
            opaque: params.get("opaque").cloned(),
            qop: params.get("qop").cloned(),
            algorithm: params
                .get("algorithm")
                .cloned()
                .unwrap_or_else(|| "MD5".to_string()),
            nc: 0,
        })
    }

    /// Builds the `Authorization` header value for one request.
    pub fn authorize(&mut self, method: &str, uri: &str, username: &str, password: &str) -> String {
        self.nc += 1;
        let nc = format!("{:08x}", self.nc);
        let cnonce = generate_cnonce();

        let ha1 = md5_hex(&format!("{}:{}:{}", username, self.realm, password));
        let ha2 = md5_hex(&format!("{}:{}", method, uri));

        let use_qop = self.qop.as_deref().is_some_and(|q| q.contains("auth"));
        let response = if use_qop {
            md5_hex(&format!(
                "{}:{}:{}:{}:auth:{}",
                ha1, self.nonce, nc, cnonce, ha2
            ))
        } else {
            // RFC 2069 compatibility.
            md5_hex(&format!("{}:{}:{}", ha1, self.nonce, ha2))
        };

        let mut parts = vec![
            format!("username=\"{}\"", username),
            format!("realm=\"{}\"", self.realm),
            format!("nonce=\"{}\"", self.nonce),
            format!("uri=\"{}\"", uri),
            format!("response=\"{}\"", response),
            format!("algorithm={}", self.algorithm),
        ];

        if use_qop {
            parts.push("qop=auth".to_string());
            parts.push(format!("nc={}", nc));
            parts.push(format!("cnonce=\"{}\"", cnonce));
        }

        if let Some(ref opaque) = self.opaque {
            parts.push(format!("opaque=\"{}\"", opaque));
        }

        format!("Digest {}", parts.join(", "))
    }
}

/// Builds a Basic `Authorization` header value.
pub fn basic_auth(username: &str, password: &str) -> String {
    let credentials = format!("{}:{}", username, password);
    let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
    format!("Basic {}", encoded)
}

/// Parses `key=value` / `key="quoted value"` pairs from a challenge.
fn parse_challenge_params(content: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut chars = content.chars().peekable();

    while chars.peek().is_some() {
        while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
            chars.next();
        }

        let key: String = chars
            .by_ref()
            .take_while(|c| *c != '=')
            .collect::<String>()
            .trim()
            .to_lowercase();
        if key.is_empty() {
            break;
        }

        let value = if chars.peek() == Some(&'"') {
            chars.next();
            let mut val = String::new();
            let mut escaped = false;
            for c in chars.by_ref() {
                if escaped {
                    val.push(c);
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    break;
                } else {
                    val.push(c);
                }
            }
            val
        } else {
            chars
                .by_ref()
                .take_while(|c| *c != ',' && !c.is_whitespace())
                .collect()
        };

        params.insert(key, value);
    }

    params
}

fn generate_cnonce() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 8] = rng.random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_digest_challenge() {
        let header =
            r#"Digest realm="caldav@example.com", nonce="abc123", qop="auth", algorithm=MD5"#;
        let auth = DigestAuth::parse(header).unwrap();

        assert_eq!(auth.realm, "caldav@example.com");
        assert_eq!(auth.nonce, "abc123");
        assert_eq!(auth.qop, Some("auth".to_string()));
        assert_eq!(auth.algorithm, "MD5");
    }

    #[test]
    fn parse_digest_challenge_with_opaque() {
        let header = r#"Digest realm="example", nonce="xyz", opaque="opaque123""#;
        let auth = DigestAuth::parse(header).unwrap();
        assert_eq!(auth.opaque, Some("opaque123".to_string()));
    }

    #[test]
    fn parse_rejects_non_digest() {
        assert!(DigestAuth::parse(r#"Basic realm="example""#).is_none());
        assert!(DigestAuth::parse("Digest realm=\"no-nonce\"").is_none());
    }

    #[test]
    fn authorize_produces_header() {
        let mut auth = DigestAuth {
            realm: "test".to_string(),
            nonce: "abc123".to_string(),
            opaque: None,
            qop: Some("auth".to_string()),
            algorithm: "MD5".to_string(),
            nc: 0,
        };

        let header = auth.authorize("REPORT", "/calendars/home/", "user", "pass");

        assert!(header.starts_with("Digest "));
        assert!(header.contains("username=\"user\""));
        assert!(header.contains("realm=\"test\""));
        assert!(header.contains("uri=\"/calendars/home/\""));
        assert!(header.contains("response=\""));
        assert!(header.contains("qop=auth"));
        assert!(header.contains("nc=00000001"));
    }

    #[test]
    fn nonce_counter_increments() {
        let mut auth = DigestAuth {
            realm: "r".to_string(),
            nonce: "n".to_string(),
            opaque: None,
            qop: Some("auth".to_string()),
            algorithm: "MD5".to_string(),
            nc: 0,
        };

        auth.authorize("GET", "/", "u", "p");
        let second = auth.authorize("GET", "/", "u", "p");
        assert!(second.contains("nc=00000002"));
    }

    #[test]
    fn basic_auth_encoding() {
        // base64("user:password")
        assert_eq!(basic_auth("user", "password"), "Basic dXNlcjpwYXNzd29yZA==");
    }

    #[test]
    fn md5_hex_computation() {
        assert_eq!(md5_hex("hello"), "5d41402abc4b2a76b9719d911017c592");
    }
}
