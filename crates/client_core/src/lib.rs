pub mod account;
pub mod config;
pub mod error;
pub mod forms;
pub mod gateway;
pub mod http;
pub mod session;
pub mod workspace;

pub use account::Account;
pub use config::{load_settings, Settings};
pub use error::{ClientError, ClientResult, GatewayError, ValidationError};
pub use forms::{QuestionDraft, ResetPasswordForm, SignupForm};
pub use gateway::{Access, QuestionGateway};
pub use http::HttpGateway;
pub use session::{CredentialStore, FileCredentialStore, MemoryCredentialStore, Session};
pub use workspace::{
    LoadOutcome, ViewState, VisibleQuestions, Workspace, WorkspaceEvent, WorkspaceSnapshot,
};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
