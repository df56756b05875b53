use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{Folder, FolderId, Question, QuestionId},
    error::ApiErrorBody,
    protocol::{
        CreateFolderRequest, EmailRequest, LoginRequest, LoginResponse, MessageResponse,
        MoveQuestionRequest, QuestionFields, QuestionListQuery, QuestionPage,
        ResetPasswordRequest, SignupRequest, UserProfile, VerifyOtpRequest,
    },
};
use tracing::debug;
use url::Url;

use crate::{
    error::{GatewayError, GatewayResult},
    gateway::{Access, QuestionGateway},
    session::Session,
};

/// [`QuestionGateway`] over the REST API.
pub struct HttpGateway {
    http: Client,
    base_url: Url,
    session: Session,
}

impl HttpGateway {
    pub fn new(base_url: Url, session: Session) -> GatewayResult<Self> {
        Self::new_with_client(Client::new(), base_url, session)
    }

    pub fn new_with_client(http: Client, mut base_url: Url, session: Session) -> GatewayResult<Self> {
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::InvalidBaseUrl(base_url.to_string()));
        }
        base_url.set_query(None);
        base_url.set_fragment(None);
        Ok(Self {
            http,
            base_url,
            session,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, segments: &[&str]) -> GatewayResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> GatewayResult<(String, RequestBuilder)> {
        let endpoint = format!("{method} {}", segments.join("/"));
        let url = self.url_for(segments)?;
        Ok((endpoint, self.http.request(method, url)))
    }

    async fn dispatch(
        &self,
        endpoint: &str,
        request: RequestBuilder,
        access: Access,
    ) -> GatewayResult<String> {
        let request = match access {
            Access::Owner => match self.session.token().await {
                Some(token) => request.bearer_auth(token),
                None => request,
            },
            Access::Public => request,
        };

        debug!(endpoint, ?access, "dispatching api request");
        let response = request
            .send()
            .await
            .map_err(|source| GatewayError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| GatewayError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        if status.is_success() {
            return Ok(body);
        }

        let error_body: ApiErrorBody = serde_json::from_str(&body).unwrap_or_default();
        debug!(endpoint, status = status.as_u16(), reason = ?error_body.reason(), "api request failed");

        // Public calls (login included) never carry a credential, so a 401
        // there is an ordinary rejection rather than an expired session.
        if access == Access::Owner
            && (status == StatusCode::UNAUTHORIZED || error_body.signals_invalid_token())
        {
            return Err(GatewayError::auth(
                endpoint,
                error_body.reason().unwrap_or("unauthorized"),
            ));
        }

        Err(GatewayError::api(
            endpoint,
            status.as_u16(),
            error_body.reason().map(str::to_string),
        ))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        access: Access,
    ) -> GatewayResult<T> {
        let (endpoint, request) = self.request(Method::GET, segments)?;
        let raw = self.dispatch(&endpoint, request, access).await?;
        decode(endpoint, &raw)
    }

    async fn send_json<B, T>(
        &self,
        method: Method,
        segments: &[&str],
        access: Access,
        body: &B,
    ) -> GatewayResult<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let (endpoint, request) = self.request(method, segments)?;
        let raw = self.dispatch(&endpoint, request.json(body), access).await?;
        decode(endpoint, &raw)
    }

    async fn send<B: Serialize + Sync>(
        &self,
        method: Method,
        segments: &[&str],
        access: Access,
        body: &B,
    ) -> GatewayResult<()> {
        let (endpoint, request) = self.request(method, segments)?;
        self.dispatch(&endpoint, request.json(body), access).await?;
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(endpoint: String, raw: &str) -> GatewayResult<T> {
    serde_json::from_str(raw).map_err(|source| GatewayError::Decode { endpoint, source })
}

fn questions_path(access: Access) -> &'static [&'static str] {
    match access {
        Access::Owner => &["api", "questions"],
        Access::Public => &["api", "noauth", "questions"],
    }
}

fn folders_path(access: Access) -> &'static [&'static str] {
    match access {
        Access::Owner => &["api", "folders"],
        Access::Public => &["api", "noauth", "folders"],
    }
}

#[async_trait]
impl QuestionGateway for HttpGateway {
    async fn list_questions(
        &self,
        query: &QuestionListQuery,
        access: Access,
    ) -> GatewayResult<QuestionPage> {
        let (endpoint, request) = self.request(Method::GET, questions_path(access))?;
        let raw = self.dispatch(&endpoint, request.query(query), access).await?;
        decode(endpoint, &raw)
    }

    async fn get_public_question(&self, id: &QuestionId) -> GatewayResult<Question> {
        self.get_json(&["api", "noauth", "questions", id.as_str()], Access::Public)
            .await
    }

    async fn create_question(&self, fields: &QuestionFields) -> GatewayResult<Question> {
        self.send_json(Method::POST, &["api", "questions"], Access::Owner, fields)
            .await
    }

    async fn update_question(
        &self,
        id: &QuestionId,
        fields: &QuestionFields,
    ) -> GatewayResult<Question> {
        self.send_json(
            Method::PUT,
            &["api", "questions", id.as_str()],
            Access::Owner,
            fields,
        )
        .await
    }

    async fn delete_question(&self, id: &QuestionId) -> GatewayResult<()> {
        let (endpoint, request) =
            self.request(Method::DELETE, &["api", "questions", id.as_str()])?;
        self.dispatch(&endpoint, request, Access::Owner).await?;
        Ok(())
    }

    async fn move_question(
        &self,
        id: &QuestionId,
        folder_id: Option<&FolderId>,
    ) -> GatewayResult<Question> {
        let body = MoveQuestionRequest {
            folder_id: folder_id.cloned(),
        };
        self.send_json(
            Method::PATCH,
            &["api", "questions", id.as_str(), "move"],
            Access::Owner,
            &body,
        )
        .await
    }

    async fn list_folders(&self, access: Access) -> GatewayResult<Vec<Folder>> {
        self.get_json(folders_path(access), access).await
    }

    async fn get_public_folder(&self, id: &FolderId) -> GatewayResult<Folder> {
        self.get_json(&["api", "noauth", "folders", id.as_str()], Access::Public)
            .await
    }

    async fn create_folder(&self, name: &str) -> GatewayResult<Folder> {
        let body = CreateFolderRequest {
            name: name.to_string(),
        };
        self.send_json(Method::POST, &["api", "folders"], Access::Owner, &body)
            .await
    }

    async fn delete_folder(&self, id: &FolderId) -> GatewayResult<MessageResponse> {
        let (endpoint, request) =
            self.request(Method::DELETE, &["api", "folders", id.as_str()])?;
        let raw = self.dispatch(&endpoint, request, Access::Owner).await?;
        if raw.trim().is_empty() {
            return Ok(MessageResponse::default());
        }
        decode(endpoint, &raw)
    }

    async fn login(&self, request: &LoginRequest) -> GatewayResult<LoginResponse> {
        let response: LoginResponse = self
            .send_json(Method::POST, &["api", "auth", "login"], Access::Public, request)
            .await?;
        if response.token.trim().is_empty() {
            return Err(GatewayError::MissingToken {
                endpoint: "POST api/auth/login".to_string(),
            });
        }
        Ok(response)
    }

    async fn signup(&self, request: &SignupRequest) -> GatewayResult<()> {
        self.send(
            Method::POST,
            &["api", "auth", "signup"],
            Access::Public,
            request,
        )
        .await
    }

    async fn request_otp(&self, email: &str) -> GatewayResult<()> {
        let body = EmailRequest {
            email: email.to_string(),
        };
        self.send(
            Method::POST,
            &["api", "auth", "request-otp"],
            Access::Public,
            &body,
        )
        .await
    }

    async fn verify_otp(&self, request: &VerifyOtpRequest) -> GatewayResult<()> {
        self.send(
            Method::POST,
            &["api", "auth", "verify-otp"],
            Access::Public,
            request,
        )
        .await
    }

    async fn request_password_reset_otp(&self, email: &str) -> GatewayResult<()> {
        let body = EmailRequest {
            email: email.to_string(),
        };
        self.send(
            Method::POST,
            &["api", "auth", "forgot-password"],
            Access::Public,
            &body,
        )
        .await
    }

    async fn reset_password(&self, request: &ResetPasswordRequest) -> GatewayResult<()> {
        self.send(
            Method::POST,
            &["api", "auth", "reset-password"],
            Access::Public,
            request,
        )
        .await
    }

    async fn profile(&self) -> GatewayResult<UserProfile> {
        self.get_json(&["api", "profile"], Access::Owner).await
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
