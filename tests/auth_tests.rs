use hmac::{Hmac, Mac};
use sha2::Sha256;
use speech_relay::auth::{TokenError, TokenSigner};

/// Reference signature computed independently of the signer, over the
/// canonical "{ts}.{nonce}" payload.
fn reference_sig(secret: &str, ts: u64, nonce: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(format!("{ts}.{nonce}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[test]
fn issuer_signature_is_accepted_within_ttl() {
    let signer = TokenSigner::new("s3cret", 30_000);
    let ts: u64 = 1_700_000_000_000;
    let sig = reference_sig("s3cret", ts, "abc");

    // Arriving exactly at issue time.
    assert!(signer
        .verify(Some(&ts.to_string()), Some("abc"), Some(&sig), ts)
        .is_ok());
    // Arriving at the edge of the window, either direction.
    assert!(signer
        .verify(Some(&ts.to_string()), Some("abc"), Some(&sig), ts + 30_000)
        .is_ok());
    assert!(signer
        .verify(Some(&ts.to_string()), Some("abc"), Some(&sig), ts - 30_000)
        .is_ok());
}

#[test]
fn zero_ttl_accepts_exact_arrival_only() {
    let signer = TokenSigner::new("s3cret", 0);
    let ts: u64 = 1_700_000_000_000;
    let sig = reference_sig("s3cret", ts, "abc");

    assert!(signer
        .verify(Some(&ts.to_string()), Some("abc"), Some(&sig), ts)
        .is_ok());
    assert!(matches!(
        signer.verify(Some(&ts.to_string()), Some("abc"), Some(&sig), ts + 1),
        Err(TokenError::Expired { .. })
    ));
}

#[test]
fn any_altered_signature_character_is_rejected() {
    let signer = TokenSigner::new("s3cret", 30_000);
    let ts: u64 = 1_700_000_000_000;
    let sig = reference_sig("s3cret", ts, "abc");

    for position in [0, sig.len() / 2, sig.len() - 1] {
        let mut mutated: Vec<u8> = sig.clone().into_bytes();
        mutated[position] = if mutated[position] == b'0' { b'1' } else { b'0' };
        let mutated = String::from_utf8(mutated).unwrap();
        assert_eq!(
            signer.verify(Some(&ts.to_string()), Some("abc"), Some(&mutated), ts),
            Err(TokenError::BadSignature),
            "mutation at position {position} must be rejected"
        );
    }
}

#[test]
fn expired_timestamp_rejected_regardless_of_signature() {
    let signer = TokenSigner::new("s3cret", 30_000);
    let ts: u64 = 1_700_000_000_000;
    let sig = reference_sig("s3cret", ts, "abc");

    let late = ts + 30_001;
    assert!(matches!(
        signer.verify(Some(&ts.to_string()), Some("abc"), Some(&sig), late),
        Err(TokenError::Expired { .. })
    ));

    // Clock skew in the other direction counts too.
    let early = ts - 30_001;
    assert!(matches!(
        signer.verify(Some(&ts.to_string()), Some("abc"), Some(&sig), early),
        Err(TokenError::Expired { .. })
    ));
}

/// There is no nonce cache: replaying the exact same valid parameters inside
/// the TTL window is accepted. This pins the documented behavior (a known
/// hardening opportunity) so a change to it is a conscious one.
#[test]
fn replay_within_ttl_is_accepted() {
    let signer = TokenSigner::new("s3cret", 30_000);
    let token = signer.mint();

    for _ in 0..2 {
        assert!(signer
            .verify(
                Some(&token.ts.to_string()),
                Some(&token.nonce),
                Some(&token.sig),
                token.ts + 10,
            )
            .is_ok());
    }
}

#[test]
fn minted_tokens_carry_unique_nonces() {
    let signer = TokenSigner::new("s3cret", 30_000);
    let a = signer.mint();
    let b = signer.mint();
    assert_ne!(a.nonce, b.nonce);
    assert_ne!(a.sig, b.sig);
}

#[test]
fn signature_bound_to_nonce_and_timestamp() {
    let signer = TokenSigner::new("s3cret", 30_000);
    let ts: u64 = 1_700_000_000_000;
    let sig = reference_sig("s3cret", ts, "abc");

    // Same sig presented with a different nonce or ts fails.
    assert_eq!(
        signer.verify(Some(&ts.to_string()), Some("abd"), Some(&sig), ts),
        Err(TokenError::BadSignature)
    );
    assert_eq!(
        signer.verify(Some(&(ts + 1).to_string()), Some("abc"), Some(&sig), ts),
        Err(TokenError::BadSignature)
    );
}

#[test]
fn wrong_secret_fails_validation() {
    let issuer = TokenSigner::new("s3cret", 30_000);
    let relay = TokenSigner::new("different", 30_000);
    let token = issuer.mint();
    assert_eq!(
        relay.verify(
            Some(&token.ts.to_string()),
            Some(&token.nonce),
            Some(&token.sig),
            token.ts,
        ),
        Err(TokenError::BadSignature)
    );
}
