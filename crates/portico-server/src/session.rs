/* crates/portico-server/src/session.rs */

// Signed session cookies. The cookie value is `payload.sig` where sig is the
// hex HMAC-SHA256 of the payload under the manager's secret key. The CSRF
// token is a second MAC derived from the same payload, so it is bound to the
// session without being the session signature itself.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "portico_session";
pub const CSRF_HEADER: &str = "x-csrf-token";

fn mac(secret: &str, data: &[u8]) -> HmacSha256 {
  let mut mac =
    HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts keys of any size");
  mac.update(data);
  mac
}

/// Sign a session payload into a cookie value.
pub fn sign(secret: &str, payload: &str) -> String {
  let sig = hex::encode(mac(secret, payload.as_bytes()).finalize().into_bytes());
  format!("{payload}.{sig}")
}

/// Verify a cookie value, returning the payload when the signature holds.
/// Tampered, truncated or malformed cookies return `None`.
pub fn verify<'a>(secret: &str, cookie: &'a str) -> Option<&'a str> {
  let (payload, sig_hex) = cookie.rsplit_once('.')?;
  let sig = hex::decode(sig_hex).ok()?;
  mac(secret, payload.as_bytes()).verify_slice(&sig).ok()?;
  Some(payload)
}

/// Derive the CSRF token for a session payload.
pub fn csrf_token(secret: &str, payload: &str) -> String {
  let mut mac = mac(secret, payload.as_bytes());
  mac.update(b".csrf");
  hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
  use super::*;

  const SECRET: &str = "unit-test-secret";

  #[test]
  fn sign_verify_roundtrip() {
    let cookie = sign(SECRET, "user-42");
    assert_eq!(verify(SECRET, &cookie), Some("user-42"));
  }

  #[test]
  fn payload_may_contain_dots() {
    let cookie = sign(SECRET, "user.42.session");
    assert_eq!(verify(SECRET, &cookie), Some("user.42.session"));
  }

  #[test]
  fn tampered_payload_is_rejected() {
    let cookie = sign(SECRET, "user-42");
    let tampered = cookie.replacen("user-42", "user-43", 1);
    assert_eq!(verify(SECRET, &tampered), None);
  }

  #[test]
  fn wrong_secret_is_rejected() {
    let cookie = sign(SECRET, "user-42");
    assert_eq!(verify("other-secret", &cookie), None);
  }

  #[test]
  fn malformed_cookie_is_rejected() {
    assert_eq!(verify(SECRET, "no-signature"), None);
    assert_eq!(verify(SECRET, "payload.not-hex"), None);
    assert_eq!(verify(SECRET, ""), None);
  }

  #[test]
  fn csrf_token_is_stable_and_distinct() {
    let token = csrf_token(SECRET, "user-42");
    assert_eq!(token, csrf_token(SECRET, "user-42"));
    assert_ne!(token, csrf_token(SECRET, "user-43"));

    let cookie = sign(SECRET, "user-42");
    let sig = cookie.rsplit_once('.').map(|(_, s)| s.to_string()).unwrap();
    assert_ne!(token, sig);
  }
}
