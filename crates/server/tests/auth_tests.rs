//! Account workflows against an in-memory SQLite store.

mod common;

use axum::http::StatusCode;
use common::*;
use identity_provider::{
    auth::{IpLogin, SocialLogin},
    config::IpLoginRule,
    error::{AuthError, ErrorKey, messages},
    identity::{SocialProfile, SocialProvider},
    model::{NewUser, UserType},
    notify::Notification,
    session::{MemorySession, Session, SessionKey},
    store::{AccessStore, IdentityStore, UserPatch, UserStore},
};
use sea_orm::{ConnectionTrait, DbBackend, Statement};
use serde_json::json;
use std::net::IpAddr;

fn new_user(username: &str, password: &str) -> NewUser {
    NewUser {
        username: username.into(),
        password: password.into(),
        first_name: Some("Ada".into()),
        last_name: Some("Lovelace".into()),
        organisation: None,
    }
}

fn orcid_profile(subject: &str, email: &str) -> SocialProfile {
    SocialProfile {
        provider: SocialProvider::Orcid,
        subject: subject.into(),
        email: email.into(),
        first_name: Some("Grace".into()),
        last_name: Some("Hopper".into()),
        organisation: Some("Navy".into()),
    }
}

fn assert_rejected(err: AuthError, status: StatusCode, key: ErrorKey) {
    let rejection = err
        .rejection()
        .unwrap_or_else(|| panic!("expected a rejection, got {err:?}"));
    assert_eq!(rejection.status, status, "{rejection}");
    assert_eq!(rejection.key, key, "{rejection}");
}

#[tokio::test]
async fn test_register_user_strips_secrets_and_sends_one_mail() {
    let h = harness().await;

    let user = h
        .auth
        .register_user(new_user("ada@example.com", STRONG_PASSWORD))
        .await
        .unwrap();

    let body = serde_json::to_value(&user).unwrap();
    assert!(body.get("credential").is_none());
    assert!(body.get("access_token").is_none());
    assert_eq!(body["username"], "ada@example.com");
    assert!(!user.is_validated);

    assert_eq!(h.notifier.wait_for("registration", 1).await, 1);
    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "ada@example.com");

    let stored = h.user("ada@example.com").await;
    assert_eq!(stored.user_type, UserType::Basic);
    assert!(stored.registration_verification_token.is_some());
    assert_ne!(
        stored.credential.password_hash.as_deref(),
        Some(STRONG_PASSWORD)
    );
    match &sent[0].1 {
        Notification::Registration { token } => {
            assert_eq!(stored.registration_verification_token.as_ref(), Some(token))
        }
        other => panic!("unexpected notification {other:?}"),
    }
}

#[tokio::test]
async fn test_register_user_rejections() {
    let h = harness().await;
    h.seed_user("taken@example.com", true).await;

    let err = h
        .auth
        .register_user(new_user("not-an-email", STRONG_PASSWORD))
        .await
        .unwrap_err();
    assert_rejected(err, StatusCode::CONFLICT, ErrorKey::EmailAddress);

    let err = h
        .auth
        .register_user(new_user("taken@example.com", STRONG_PASSWORD))
        .await
        .unwrap_err();
    assert_rejected(err, StatusCode::CONFLICT, ErrorKey::EmailAddress);

    let err = h
        .auth
        .register_user(new_user("weak@example.com", "pass"))
        .await
        .unwrap_err();
    assert_eq!(err.public_message(), messages::PASSWORD_RULE);
    assert_rejected(err, StatusCode::CONFLICT, ErrorKey::Password);

    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_verify_registration_with_bad_token_is_409() {
    let h = harness().await;
    h.auth
        .register_user(new_user("ada@example.com", STRONG_PASSWORD))
        .await
        .unwrap();

    let err = h
        .auth
        .verify_registration(Some("ada@example.com"), Some("badtoken"))
        .await
        .unwrap_err();
    assert_eq!(err.public_message(), messages::VERIFICATION_CODE_INCORRECT);
    assert_rejected(err, StatusCode::CONFLICT, ErrorKey::VerificationCode);

    let err = h
        .auth
        .verify_registration(Some("nobody@example.com"), Some("badtoken"))
        .await
        .unwrap_err();
    assert_rejected(err, StatusCode::CONFLICT, ErrorKey::VerificationCode);
}

#[tokio::test]
async fn test_verify_registration_expired_token_is_409() {
    let h = harness().await;
    h.auth
        .register_user(new_user("ada@example.com", STRONG_PASSWORD))
        .await
        .unwrap();
    let stored = h.user("ada@example.com").await;
    let token = stored.registration_verification_token.clone().unwrap();
    h.store
        .update_user(
            &stored.id,
            UserPatch {
                registration_verification_token_expiry: Some(Some(0)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = h
        .auth
        .verify_registration(Some("ada@example.com"), Some(&token))
        .await
        .unwrap_err();
    assert_eq!(err.public_message(), messages::VERIFICATION_CODE_EXPIRED);
    assert_rejected(err, StatusCode::CONFLICT, ErrorKey::VerificationCode);

    let err = h
        .auth
        .verify_registration(Some("ada@example.com"), Some("badtoken"))
        .await
        .unwrap_err();
    assert_rejected(err, StatusCode::CONFLICT, ErrorKey::VerificationCode);
}

#[tokio::test]
async fn test_verify_registration_requires_both_params() {
    let h = harness().await;

    for (username, token) in [
        (None, Some("t")),
        (Some("ada@example.com"), None),
        (Some(""), Some("t")),
    ] {
        let err = h
            .auth
            .verify_registration(username, token)
            .await
            .unwrap_err();
        assert_rejected(err, StatusCode::BAD_REQUEST, ErrorKey::UnexpectedError);
    }
}

#[tokio::test]
async fn test_verify_registration_validates_and_logs_in() {
    let h = harness().await;
    h.auth
        .register_user(new_user("ada@example.com", STRONG_PASSWORD))
        .await
        .unwrap();
    let token = h
        .user("ada@example.com")
        .await
        .registration_verification_token
        .unwrap();

    let user = h
        .auth
        .verify_registration(Some("ada@example.com"), Some(&token))
        .await
        .unwrap();
    assert!(user.is_validated);
    assert_eq!(user.access_token.len(), 1);
    assert_eq!(h.notifier.count("registration_confirmed"), 1);

    let stored = h.user("ada@example.com").await;
    assert!(stored.is_validated);
    assert!(stored.registration_verification_token.is_none());

    // The code is gone once used.
    let err = h
        .auth
        .verify_registration(Some("ada@example.com"), Some(&token))
        .await
        .unwrap_err();
    assert_rejected(err, StatusCode::CONFLICT, ErrorKey::VerificationCode);
}

#[tokio::test]
async fn test_login_basic() {
    let h = harness().await;
    h.seed_user("ada@example.com", true).await;
    h.seed_user("pending@example.com", false).await;

    let user = h
        .auth
        .login_basic("ada@example.com", STRONG_PASSWORD, None)
        .await
        .unwrap();
    assert_eq!(user.access_token.len(), 1);

    let err = h
        .auth
        .login_basic("ada@example.com", "Wrong123!", None)
        .await
        .unwrap_err();
    assert_rejected(err, StatusCode::UNAUTHORIZED, ErrorKey::Credential);

    let err = h
        .auth
        .login_basic("ghost@example.com", STRONG_PASSWORD, None)
        .await
        .unwrap_err();
    assert_rejected(err, StatusCode::UNAUTHORIZED, ErrorKey::Credential);

    let err = h
        .auth
        .login_basic("pending@example.com", STRONG_PASSWORD, None)
        .await
        .unwrap_err();
    assert_rejected(err, StatusCode::UNAUTHORIZED, ErrorKey::User);
}

#[tokio::test]
async fn test_login_basic_for_client() {
    let h = harness().await;
    h.seed_default_client().await;
    h.seed_user("ada@example.com", true).await;

    let user = h
        .auth
        .login_basic("ada@example.com", STRONG_PASSWORD, Some(CLIENT_ID))
        .await
        .unwrap();
    let access = h
        .auth
        .validate_access_token(&user.access_token[0].id_token)
        .await
        .unwrap();
    assert_eq!(access.client_id.as_deref(), Some(CLIENT_ID));

    let err = h
        .auth
        .login_basic("ada@example.com", STRONG_PASSWORD, Some("unknown"))
        .await
        .unwrap_err();
    assert_rejected(err, StatusCode::NOT_FOUND, ErrorKey::Client);
}

#[tokio::test]
async fn test_login_basic_requires_credentials_flow_client() {
    let h = harness().await;
    h.seed_client("browser-app", "browser-secret-value", REDIRECT_URI).await;
    let user = h.seed_user("ada@example.com", true).await;

    let err = h
        .auth
        .login_basic("ada@example.com", STRONG_PASSWORD, Some("browser-app"))
        .await
        .unwrap_err();
    assert_eq!(err.public_message(), messages::CREDENTIALS_FLOW_DISABLED);
    assert_rejected(err, StatusCode::FORBIDDEN, ErrorKey::Client);

    let issued = h.store.find_access_for_user(&user.id).await.unwrap();
    assert!(issued.is_empty());
}

#[tokio::test]
async fn test_login_by_ip() {
    let h = harness_with_ip_rules(vec![
        IpLoginRule {
            net: "10.0.0.0/8".parse().unwrap(),
            username: "campus@example.com".into(),
            user_type: UserType::Ip,
            validated: true,
        },
        IpLoginRule {
            net: "192.168.0.0/16".parse().unwrap(),
            username: "lab@example.com".into(),
            user_type: UserType::Ip,
            validated: false,
        },
    ])
    .await;

    let outside: IpAddr = "8.8.8.8".parse().unwrap();
    assert!(matches!(
        h.auth.login_by_ip(outside, None).await.unwrap(),
        IpLogin::Anonymous
    ));

    let campus: IpAddr = "10.1.2.3".parse().unwrap();
    let IpLogin::User(first) = h.auth.login_by_ip(campus, None).await.unwrap() else {
        panic!("expected a user");
    };
    assert_eq!(first.username, "campus@example.com");
    assert_eq!(first.user_type, UserType::Ip);
    assert_eq!(first.access_token.len(), 1);

    // Same account on the next visit.
    let IpLogin::User(second) = h.auth.login_by_ip(campus, None).await.unwrap() else {
        panic!("expected a user");
    };
    assert_eq!(second.id, first.id);

    let lab: IpAddr = "192.168.1.1".parse().unwrap();
    let err = h.auth.login_by_ip(lab, None).await.unwrap_err();
    assert_rejected(err, StatusCode::UNAUTHORIZED, ErrorKey::User);
}

#[tokio::test]
async fn test_social_login_creates_and_reuses_account() {
    let h = harness().await;
    let session = MemorySession::new();

    let SocialLogin::User(user) = h
        .auth
        .login_social(orcid_profile("0000-0001", "grace@example.com"), None, &session)
        .await
        .unwrap()
    else {
        panic!("expected the programmatic path");
    };
    assert_eq!(user.user_type, UserType::Social);
    assert!(user.is_validated);
    assert_eq!(user.profile.organisation.as_deref(), Some("Navy"));
    assert_eq!(user.access_token.len(), 1);

    let SocialLogin::User(again) = h
        .auth
        .login_social(orcid_profile("0000-0001", "changed@example.com"), None, &session)
        .await
        .unwrap()
    else {
        panic!("expected the programmatic path");
    };
    assert_eq!(again.id, user.id);

    let links = h.auth.identity().linked_identities(&user.id).await.unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].provider, "orcid");
    assert_eq!(links[0].subject, "0000-0001");
}

#[tokio::test]
async fn test_social_login_links_existing_account_by_email() {
    let h = harness().await;
    let existing = h.seed_user("grace@example.com", true).await;
    let session = MemorySession::new();

    let profile = SocialProfile {
        provider: SocialProvider::GitHub,
        ..orcid_profile("gh-42", "grace@example.com")
    };
    let user = h
        .auth
        .register_or_login_social(profile, None, &session)
        .await
        .unwrap();
    assert_eq!(user.id, existing.id);
    assert_eq!(user.user_type, UserType::Basic);
}

#[tokio::test]
async fn test_social_login_rejects_invalid_email() {
    let h = harness().await;
    let session = MemorySession::new();

    for email in ["", "not-an-email"] {
        let err = h
            .auth
            .register_or_login_social(orcid_profile("0000-0005", email), None, &session)
            .await
            .unwrap_err();
        assert_eq!(err.public_message(), messages::EMAIL_INVALID);
        assert_rejected(err, StatusCode::CONFLICT, ErrorKey::EmailAddress);
    }

    // A second person without an email must not land on anyone's account.
    let err = h
        .auth
        .register_or_login_social(orcid_profile("0000-0006", ""), None, &session)
        .await
        .unwrap_err();
    assert_rejected(err, StatusCode::CONFLICT, ErrorKey::EmailAddress);

    assert!(h.store.find_user_by_username("").await.unwrap().is_none());
    assert!(
        h.store
            .find_identity("orcid", "0000-0005")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_social_login_does_not_link_unvalidated_account() {
    let h = harness().await;
    let pending = h.seed_user("grace@example.com", false).await;
    let session = MemorySession::new();

    let err = h
        .auth
        .register_or_login_social(orcid_profile("0000-0007", "grace@example.com"), None, &session)
        .await
        .unwrap_err();
    assert_rejected(err, StatusCode::UNAUTHORIZED, ErrorKey::User);

    assert!(
        h.store
            .find_identity("orcid", "0000-0007")
            .await
            .unwrap()
            .is_none()
    );
    assert!(h.store.find_access_for_user(&pending.id).await.unwrap().is_empty());
    assert!(!h.user("grace@example.com").await.is_validated);
}

#[tokio::test]
async fn test_social_login_skips_tokens_during_authorization_flow() {
    let h = harness().await;
    let session = MemorySession::new();
    session.set(SessionKey::AuthorizationFlow, json!(true)).await;

    let user = h
        .auth
        .register_or_login_social(orcid_profile("0000-0002", "grace@example.com"), None, &session)
        .await
        .unwrap();
    assert!(user.access_token.is_empty());
}

#[tokio::test]
async fn test_social_login_callback() {
    let h = harness().await;
    h.seed_default_client().await;
    let session = MemorySession::new();

    let SocialLogin::Callback(url) = h
        .auth
        .login_social(
            orcid_profile("0000-0003", "grace@example.com"),
            Some(CLIENT_ID),
            &session,
        )
        .await
        .unwrap()
    else {
        panic!("expected a callback");
    };
    let prefix = format!("{REDIRECT_URI}?success=true&token=");
    assert!(url.starts_with(&prefix), "{url}");
    let id_token = &url[prefix.len()..];
    let access = h.auth.validate_access_token(id_token).await.unwrap();
    assert_eq!(access.client_id.as_deref(), Some(CLIENT_ID));

    session.set(SessionKey::AuthorizationFlow, json!(true)).await;
    let SocialLogin::Callback(url) = h
        .auth
        .login_social(
            orcid_profile("0000-0003", "grace@example.com"),
            Some(CLIENT_ID),
            &session,
        )
        .await
        .unwrap()
    else {
        panic!("expected a callback");
    };
    assert_eq!(url, format!("{REDIRECT_URI}?success=true"));

    let err = h
        .auth
        .login_social(
            orcid_profile("0000-0003", "grace@example.com"),
            Some("unknown"),
            &session,
        )
        .await
        .unwrap_err();
    assert_rejected(err, StatusCode::NOT_FOUND, ErrorKey::Client);
}

#[tokio::test]
async fn test_social_login_failure_is_encoded_into_callback() {
    let h = harness().await;
    h.seed_default_client().await;
    // A dangling link: the subject is taken but its user is gone, so linking
    // the fresh account violates the (provider, subject) uniqueness.
    h.db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"INSERT INTO idp_identity (id, user_id, provider, subject, created_at)
           VALUES ('link-1', 'deleted-user', 'orcid', '0000-0004', '2026-01-01T00:00:00Z')"#,
    ))
    .await
    .unwrap();
    let session = MemorySession::new();

    let SocialLogin::Callback(url) = h
        .auth
        .login_social(
            orcid_profile("0000-0004", "grace@example.com"),
            Some(CLIENT_ID),
            &session,
        )
        .await
        .unwrap()
    else {
        panic!("expected a callback");
    };
    assert_eq!(
        url,
        format!("{REDIRECT_URI}?success=false&reason=An%20unexpected%20error%20occurred.")
    );

    let err = h
        .auth
        .login_social(orcid_profile("0000-0004", "hopper@example.com"), None, &session)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Store(_)));
}

#[tokio::test]
async fn test_forgot_password_flow() {
    let h = harness().await;
    h.seed_user("ada@example.com", true).await;

    let err = h
        .auth
        .forgot_password("ghost@example.com")
        .await
        .unwrap_err();
    assert_rejected(err, StatusCode::NOT_FOUND, ErrorKey::EmailAddress);

    h.auth.forgot_password("ada@example.com").await.unwrap();
    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    let Notification::PasswordReset { token } = &sent[0].1 else {
        panic!("unexpected notification {:?}", sent[0].1);
    };

    assert!(
        h.auth
            .verify_forgot_password_token("ada@example.com", token)
            .await
            .unwrap()
    );
    assert!(
        !h.auth
            .verify_forgot_password_token("ada@example.com", "nope")
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_reset_password() {
    let h = harness().await;
    h.seed_user("ada@example.com", true).await;
    h.auth.forgot_password("ada@example.com").await.unwrap();
    let token = h
        .user("ada@example.com")
        .await
        .credential
        .reset_password_token
        .unwrap();

    let err = h
        .auth
        .reset_password("ada@example.com", "NewPassword1!", "wrong")
        .await
        .unwrap_err();
    assert_rejected(err, StatusCode::UNAUTHORIZED, ErrorKey::ResetPasswordToken);

    let err = h
        .auth
        .reset_password("ada@example.com", "pass", &token)
        .await
        .unwrap_err();
    assert_eq!(
        err.public_message(),
        "Password must be at least 8 characters long and contain at least one number, one lowercase letter, one uppercase letter and one special character."
    );
    assert_rejected(err, StatusCode::CONFLICT, ErrorKey::NewPassword);
    assert_eq!(h.notifier.count("password_changed"), 0);

    assert!(
        h.auth
            .reset_password("ada@example.com", "Password2@", &token)
            .await
            .unwrap()
    );
    assert_eq!(h.notifier.count("password_changed"), 1);

    h.auth
        .login_basic("ada@example.com", "Password2@", None)
        .await
        .unwrap();

    // Single use.
    let err = h
        .auth
        .reset_password("ada@example.com", "Password3#", &token)
        .await
        .unwrap_err();
    assert_rejected(err, StatusCode::UNAUTHORIZED, ErrorKey::ResetPasswordToken);
}

#[tokio::test]
async fn test_update_password_same_value_fails_before_lookup() {
    let h = harness().await;

    // No such user: the check happens before the store is consulted.
    let err = h
        .auth
        .update_password("ghost@example.com", "samePwd", "samePwd")
        .await
        .unwrap_err();
    assert_eq!(err.public_message(), messages::PASSWORD_RECENTLY_USED);
    assert_rejected(err, StatusCode::CONFLICT, ErrorKey::NewPassword);
}

#[tokio::test]
async fn test_update_password() {
    let h = harness().await;
    h.seed_user("ada@example.com", true).await;

    let err = h
        .auth
        .update_password("ada@example.com", "Wrong123!", "Password2@")
        .await
        .unwrap_err();
    assert_rejected(err, StatusCode::CONFLICT, ErrorKey::OldPassword);

    let err = h
        .auth
        .update_password("ada@example.com", STRONG_PASSWORD, "weak")
        .await
        .unwrap_err();
    assert_rejected(err, StatusCode::CONFLICT, ErrorKey::NewPassword);

    assert!(
        h.auth
            .update_password("ada@example.com", STRONG_PASSWORD, "Password2@")
            .await
            .unwrap()
    );
    assert_eq!(h.notifier.count("password_changed"), 1);
    h.auth
        .login_basic("ada@example.com", "Password2@", None)
        .await
        .unwrap();
}
