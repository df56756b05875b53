use async_trait::async_trait;
use shared::{
    domain::{Folder, FolderId, Question, QuestionId},
    protocol::{
        LoginRequest, LoginResponse, MessageResponse, QuestionFields, QuestionListQuery,
        QuestionPage, ResetPasswordRequest, SignupRequest, UserProfile, VerifyOtpRequest,
    },
};

use crate::error::GatewayResult;

/// Which read path a listing goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// The signed-in user's own questions and folders, bearer token attached.
    Owner,
    /// The unauthenticated public feed.
    Public,
}

/// Logical operations of the remote question API.
///
/// Implementations attach the session credential to owner calls and report
/// a rejected credential as [`crate::error::GatewayError::Auth`].
#[async_trait]
pub trait QuestionGateway: Send + Sync {
    async fn list_questions(
        &self,
        query: &QuestionListQuery,
        access: Access,
    ) -> GatewayResult<QuestionPage>;
    async fn get_public_question(&self, id: &QuestionId) -> GatewayResult<Question>;
    async fn create_question(&self, fields: &QuestionFields) -> GatewayResult<Question>;
    async fn update_question(
        &self,
        id: &QuestionId,
        fields: &QuestionFields,
    ) -> GatewayResult<Question>;
    async fn delete_question(&self, id: &QuestionId) -> GatewayResult<()>;
    async fn move_question(
        &self,
        id: &QuestionId,
        folder_id: Option<&FolderId>,
    ) -> GatewayResult<Question>;

    async fn list_folders(&self, access: Access) -> GatewayResult<Vec<Folder>>;
    async fn get_public_folder(&self, id: &FolderId) -> GatewayResult<Folder>;
    async fn create_folder(&self, name: &str) -> GatewayResult<Folder>;
    async fn delete_folder(&self, id: &FolderId) -> GatewayResult<MessageResponse>;

    async fn login(&self, request: &LoginRequest) -> GatewayResult<LoginResponse>;
    async fn signup(&self, request: &SignupRequest) -> GatewayResult<()>;
    async fn request_otp(&self, email: &str) -> GatewayResult<()>;
    async fn verify_otp(&self, request: &VerifyOtpRequest) -> GatewayResult<()>;
    async fn request_password_reset_otp(&self, email: &str) -> GatewayResult<()>;
    async fn reset_password(&self, request: &ResetPasswordRequest) -> GatewayResult<()>;
    async fn profile(&self) -> GatewayResult<UserProfile>;
}
