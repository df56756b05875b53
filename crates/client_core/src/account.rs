use std::sync::Arc;

use shared::protocol::{LoginRequest, UserProfile, VerifyOtpRequest};
use tracing::info;

use crate::{
    error::ClientResult,
    forms::{required, ResetPasswordForm, SignupForm},
    gateway::QuestionGateway,
    session::Session,
};

/// Sign-in, registration and password recovery flows.
pub struct Account {
    gateway: Arc<dyn QuestionGateway>,
    session: Session,
}

impl Account {
    pub fn new(gateway: Arc<dyn QuestionGateway>, session: Session) -> Self {
        Self { gateway, session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Exchanges credentials for a token and persists it. A rejected login
    /// leaves any existing session untouched.
    pub async fn login(&self, email: &str, password: &str) -> ClientResult<()> {
        let request = LoginRequest {
            email: required(email, "email")?,
            password: required(password, "password")?,
        };
        let response = self.gateway.login(&request).await?;
        self.session.sign_in(response.token).await?;
        info!(email = %request.email, "logged in");
        Ok(())
    }

    pub async fn logout(&self) -> ClientResult<()> {
        self.session.sign_out().await?;
        Ok(())
    }

    pub async fn signup(&self, form: &SignupForm) -> ClientResult<()> {
        let request = form.to_request()?;
        self.gateway.signup(&request).await?;
        info!(email = %request.email, "account registered");
        Ok(())
    }

    pub async fn request_otp(&self, email: &str) -> ClientResult<()> {
        let email = required(email, "email")?;
        self.gateway.request_otp(&email).await?;
        Ok(())
    }

    pub async fn verify_otp(&self, email: &str, otp: &str) -> ClientResult<()> {
        let request = VerifyOtpRequest {
            email: required(email, "email")?,
            otp: required(otp, "otp")?,
        };
        self.gateway.verify_otp(&request).await?;
        Ok(())
    }

    pub async fn request_password_reset_otp(&self, email: &str) -> ClientResult<()> {
        let email = required(email, "email")?;
        self.gateway.request_password_reset_otp(&email).await?;
        Ok(())
    }

    pub async fn reset_password(&self, form: &ResetPasswordForm) -> ClientResult<()> {
        let request = form.to_request()?;
        self.gateway.reset_password(&request).await?;
        info!(email = %request.email, "password reset");
        Ok(())
    }

    pub async fn profile(&self) -> ClientResult<UserProfile> {
        let issued_with = self.session.token().await;
        match self.gateway.profile().await {
            Ok(profile) => Ok(profile),
            Err(err) => Err(self
                .session
                .absorb_failure(err, issued_with.as_deref())
                .await),
        }
    }
}

#[cfg(test)]
#[path = "tests/account_tests.rs"]
mod tests;
