use super::*;

fn cfg() -> AuthConfig {
    AuthConfig {
        jwt_secret: "secret".into(),
        ttl_seconds: 60,
    }
}

#[test]
fn minted_token_round_trips_claims() {
    let minted = mint_session_token(&cfg(), UserId(7), "reader@vspress.org").expect("mint");
    let claims = verify_session_token(&cfg(), &minted.token).expect("verify");
    assert_eq!(claims.user_id(), Some(UserId(7)));
    assert_eq!(claims.email, "reader@vspress.org");
    assert_eq!(claims.sid, minted.session_id);
    assert_eq!(claims.exp, minted.expires_at.timestamp());
}

#[test]
fn token_signed_with_other_secret_is_rejected() {
    let minted = mint_session_token(&cfg(), UserId(7), "reader@vspress.org").expect("mint");
    let other = AuthConfig {
        jwt_secret: "other".into(),
        ttl_seconds: 60,
    };
    assert!(verify_session_token(&other, &minted.token).is_err());
}

#[test]
fn expired_token_is_rejected() {
    let expired = AuthConfig {
        jwt_secret: "secret".into(),
        ttl_seconds: -120,
    };
    let minted = mint_session_token(&expired, UserId(7), "reader@vspress.org").expect("mint");
    assert!(verify_session_token(&cfg(), &minted.token).is_err());
}

#[test]
fn password_hash_is_salted_phc_string() {
    let a = hash_password("hunter22").expect("hash");
    let b = hash_password("hunter22").expect("hash");
    assert!(a.starts_with("$argon2id$"), "{a}");
    assert!(!a.contains("hunter22"));
    assert_ne!(a, b);
}

#[test]
fn verify_accepts_only_the_original_password() {
    let stored = hash_password("hunter22").expect("hash");
    assert!(verify_password("hunter22", &stored));
    assert!(!verify_password("hunter23", &stored));
    assert!(!verify_password("hunter22", "not-a-phc-string"));
}
