use super::AuthService;
use crate::error::{AuthError, AuthResult, ErrorKey, messages};
use crate::model::User;
use crate::notify::{Notification, send_logged};
use crate::password::{hash_password, is_strong_password, verify_password};
use crate::store::UserPatch;
use crate::token::generate_random_token;
use axum::http::StatusCode;

impl AuthService {
    async fn registered_user(&self, username: &str) -> AuthResult<User> {
        self.store
            .find_user_by_username(username)
            .await?
            .ok_or_else(AuthError::email_not_registered)
    }

    /// Store a fresh reset token on the credential and mail it.
    #[tracing::instrument(skip(self))]
    pub async fn forgot_password(&self, username: &str) -> AuthResult<()> {
        let user = self.registered_user(username).await?;
        let token = generate_random_token();
        self.store
            .update_user(
                &user.id,
                UserPatch {
                    reset_password_token: Some(Some(token.clone())),
                    ..Default::default()
                },
            )
            .await?
            .ok_or_else(AuthError::email_not_registered)?;
        send_logged(
            self.notifier.as_ref(),
            &user.username,
            Notification::PasswordReset { token },
        )
        .await;
        Ok(())
    }

    #[tracing::instrument(skip(self, token))]
    pub async fn verify_forgot_password_token(
        &self,
        username: &str,
        token: &str,
    ) -> AuthResult<bool> {
        let user = self.registered_user(username).await?;
        Ok(user.credential.reset_password_token.as_deref() == Some(token))
    }

    /// Set a new password using a reset token. The token is single use.
    #[tracing::instrument(skip(self, new_password, token))]
    pub async fn reset_password(
        &self,
        username: &str,
        new_password: &str,
        token: &str,
    ) -> AuthResult<bool> {
        let user = self.registered_user(username).await?;
        if user.credential.reset_password_token.as_deref() != Some(token) {
            return Err(AuthError::rejected(
                StatusCode::UNAUTHORIZED,
                ErrorKey::ResetPasswordToken,
                messages::RESET_TOKEN_INVALID,
            ));
        }
        if !is_strong_password(new_password) {
            return Err(AuthError::weak_password(ErrorKey::NewPassword));
        }

        self.store_password(&user, new_password, true).await?;
        tracing::info!(user_id = %user.id, "Password reset");
        Ok(true)
    }

    /// Change the password of an authenticated user.
    #[tracing::instrument(skip(self, old_password, new_password))]
    pub async fn update_password(
        &self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> AuthResult<bool> {
        if old_password == new_password {
            return Err(AuthError::rejected(
                StatusCode::CONFLICT,
                ErrorKey::NewPassword,
                messages::PASSWORD_RECENTLY_USED,
            ));
        }

        let user = self.registered_user(username).await?;
        let old_matches = user
            .credential
            .password_hash
            .as_deref()
            .is_some_and(|hash| verify_password(old_password, hash));
        if !old_matches {
            return Err(AuthError::rejected(
                StatusCode::CONFLICT,
                ErrorKey::OldPassword,
                messages::OLD_PASSWORD_INCORRECT,
            ));
        }
        if !is_strong_password(new_password) {
            return Err(AuthError::weak_password(ErrorKey::NewPassword));
        }

        self.store_password(&user, new_password, false).await?;
        tracing::info!(user_id = %user.id, "Password updated");
        Ok(true)
    }

    async fn store_password(
        &self,
        user: &User,
        password: &str,
        clear_reset_token: bool,
    ) -> AuthResult<()> {
        let password_hash = hash_password(password)
            .map_err(|e| AuthError::Internal(format!("password hashing failed: {e}")))?;
        self.store
            .update_user(
                &user.id,
                UserPatch {
                    password_hash: Some(password_hash),
                    reset_password_token: clear_reset_token.then_some(None),
                    ..Default::default()
                },
            )
            .await?
            .ok_or_else(AuthError::email_not_registered)?;
        send_logged(
            self.notifier.as_ref(),
            &user.username,
            Notification::PasswordChanged,
        )
        .await;
        Ok(())
    }
}
