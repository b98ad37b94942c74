use super::*;

fn config() -> AdminAuthConfig {
    AdminAuthConfig {
        password: "hunter2".into(),
        token_secret: "token-secret".into(),
        ttl_seconds: 60,
    }
}

#[test]
fn password_requires_exact_match() {
    let cfg = config();
    assert!(password_matches(&cfg, "hunter2"));
    assert!(!password_matches(&cfg, "Hunter2"));
    assert!(!password_matches(&cfg, ""));
}

#[test]
fn empty_configured_password_never_matches() {
    let cfg = AdminAuthConfig {
        password: String::new(),
        ..config()
    };
    assert!(!password_matches(&cfg, ""));
}

#[test]
fn minted_token_verifies_and_carries_expiry() {
    let cfg = config();
    let now = Utc::now();
    let session = mint_admin_token(&cfg, now).expect("token");

    assert_eq!(session.expires_at, now + Duration::seconds(60));
    verify_admin_token(&cfg, &session.token).expect("valid token");
}

#[test]
fn expired_token_is_rejected() {
    let cfg = config();
    let session = mint_admin_token(&cfg, Utc::now() - Duration::seconds(600)).expect("token");
    assert!(verify_admin_token(&cfg, &session.token).is_err());
}

#[test]
fn token_signed_with_other_secret_is_rejected() {
    let cfg = config();
    let other = AdminAuthConfig {
        token_secret: "another-secret".into(),
        ..config()
    };
    let session = mint_admin_token(&other, Utc::now()).expect("token");
    assert!(verify_admin_token(&cfg, &session.token).is_err());
}

#[test]
fn unusable_token_lifetimes_are_errors() {
    let now = Utc::now();
    for ttl_seconds in [0, -5, i64::MAX] {
        let cfg = AdminAuthConfig {
            ttl_seconds,
            ..config()
        };
        let err = mint_admin_token(&cfg, now).expect_err("ttl out of range");
        assert!(matches!(err, AuthError::TtlOutOfRange(t) if t == ttl_seconds));
    }
}
