use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::NaiveDate;
use shared::{
    domain::{Difficulty, Folder, FolderId, Question, QuestionId, Visibility},
    protocol::{
        LoginRequest, LoginResponse, MessageResponse, QuestionFields, QuestionListQuery,
        QuestionPage, ResetPasswordRequest, SignupRequest, UserProfile, VerifyOtpRequest,
    },
};
use tokio::sync::{oneshot, Mutex};

use crate::{
    error::{GatewayError, GatewayResult},
    gateway::{Access, QuestionGateway},
    session::Session,
};

pub(crate) const VALID_EMAIL: &str = "ada@example.com";
pub(crate) const VALID_PASSWORD: &str = "correct-horse";
pub(crate) const ISSUED_TOKEN: &str = "token-ada";

pub(crate) fn question(id: &str, title: &str, folder: Option<&str>) -> Question {
    Question {
        id: QuestionId::new(id),
        title: title.to_string(),
        question: format!("<p>{title}</p>"),
        solution: "<p>solution</p>".to_string(),
        category: "Arrays".to_string(),
        difficulty: Difficulty::Medium,
        author: "ada".to_string(),
        published_date: NaiveDate::from_ymd_opt(2024, 3, 1),
        visibility: Visibility::Public,
        folder_id: folder.map(FolderId::new),
    }
}

pub(crate) fn folder(id: &str, name: &str) -> Folder {
    Folder {
        id: FolderId::new(id),
        name: name.to_string(),
    }
}

/// Parks one `list_questions` call until the test releases it.
pub(crate) struct HeldCall {
    pub(crate) entered: oneshot::Receiver<()>,
    pub(crate) release: oneshot::Sender<()>,
}

struct Hold {
    entered: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
    fail_with: Option<GatewayError>,
}

#[derive(Default)]
struct FakeState {
    questions: Vec<Question>,
    folders: Vec<Folder>,
    next_id: u64,
    list_queries: Vec<QuestionListQuery>,
    owner_tokens: Vec<Option<String>>,
    calls: Vec<String>,
    fail_next: Option<GatewayError>,
    failing_calls: HashMap<String, GatewayError>,
    cascade_on_folder_delete: bool,
    holds: VecDeque<Hold>,
}

/// In-memory question API with the same paging and search rules as the
/// real server.
pub(crate) struct FakeGateway {
    session: Session,
    state: Mutex<FakeState>,
}

impl FakeGateway {
    pub(crate) fn new(session: Session) -> Self {
        Self {
            session,
            state: Mutex::new(FakeState {
                cascade_on_folder_delete: true,
                ..FakeState::default()
            }),
        }
    }

    pub(crate) async fn seed(&self, questions: Vec<Question>, folders: Vec<Folder>) {
        let mut state = self.state.lock().await;
        state.questions = questions;
        state.folders = folders;
    }

    pub(crate) async fn seed_numbered(&self, count: usize) {
        let questions = (1..=count)
            .map(|n| question(&format!("q-{n}"), &format!("Question {n}"), None))
            .collect();
        self.seed(questions, Vec::new()).await;
    }

    pub(crate) async fn fail_next_with(&self, err: GatewayError) {
        self.state.lock().await.fail_next = Some(err);
    }

    /// When off, deleting a folder leaves its questions pointing at it, like a
    /// server whose cascade has not completed yet.
    pub(crate) async fn set_cascade_on_folder_delete(&self, cascade: bool) {
        self.state.lock().await.cascade_on_folder_delete = cascade;
    }

    /// Fails the next call named `call`, leaving other calls untouched.
    pub(crate) async fn fail_next_call(&self, call: &str, err: GatewayError) {
        self.state
            .lock()
            .await
            .failing_calls
            .insert(call.to_string(), err);
    }

    pub(crate) async fn hold_next_list(&self) -> HeldCall {
        self.push_hold(None).await
    }

    /// Like `hold_next_list`, but the call answers with `err` once released.
    pub(crate) async fn hold_next_list_failing(&self, err: GatewayError) -> HeldCall {
        self.push_hold(Some(err)).await
    }

    async fn push_hold(&self, fail_with: Option<GatewayError>) -> HeldCall {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        self.state.lock().await.holds.push_back(Hold {
            entered: entered_tx,
            release: release_rx,
            fail_with,
        });
        HeldCall {
            entered: entered_rx,
            release: release_tx,
        }
    }

    pub(crate) async fn stored_questions(&self) -> Vec<Question> {
        self.state.lock().await.questions.clone()
    }

    pub(crate) async fn list_queries(&self) -> Vec<QuestionListQuery> {
        self.state.lock().await.list_queries.clone()
    }

    pub(crate) async fn owner_tokens(&self) -> Vec<Option<String>> {
        self.state.lock().await.owner_tokens.clone()
    }

    pub(crate) async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    /// Records the call and returns the queued failure, if any.
    async fn enter(&self, call: &str, access: Access) -> GatewayResult<()> {
        let token = match access {
            Access::Owner => Some(self.session.token().await),
            Access::Public => None,
        };
        let mut state = self.state.lock().await;
        state.calls.push(call.to_string());
        if let Some(token) = token {
            state.owner_tokens.push(token);
        }
        match state
            .fail_next
            .take()
            .or_else(|| state.failing_calls.remove(call))
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn next_id(state: &mut FakeState, prefix: &str) -> String {
        state.next_id += 1;
        format!("{prefix}-new-{}", state.next_id)
    }
}

fn not_found(endpoint: &str, what: &str) -> GatewayError {
    GatewayError::api(endpoint, 404, Some(format!("{what} not found")))
}

fn matches_term(question: &Question, term: &str) -> bool {
    let term = term.to_lowercase();
    term.is_empty()
        || question.title.to_lowercase().contains(&term)
        || question.question.to_lowercase().contains(&term)
}

fn apply_fields(question: &mut Question, fields: &QuestionFields) {
    question.title = fields.title.clone();
    question.question = fields.question.clone();
    question.solution = fields.solution.clone();
    question.category = fields.category.clone();
    question.difficulty = fields.difficulty;
    question.author = fields.author.clone();
    question.published_date = Some(fields.published_date);
    question.visibility = fields.visibility;
    question.folder_id = fields.folder_id.clone();
}

#[async_trait]
impl QuestionGateway for FakeGateway {
    async fn list_questions(
        &self,
        query: &QuestionListQuery,
        access: Access,
    ) -> GatewayResult<QuestionPage> {
        self.enter("list_questions", access).await?;
        let (page, hold) = {
            let mut state = self.state.lock().await;
            state.list_queries.push(query.clone());
            let matching: Vec<&Question> = state
                .questions
                .iter()
                .filter(|q| access == Access::Owner || !q.visibility.is_private())
                .filter(|q| matches_term(q, &query.query))
                .collect();
            let limit = query.limit.max(1) as usize;
            let total_pages = matching.len().div_ceil(limit) as u32;
            let questions = matching
                .into_iter()
                .skip((query.page.saturating_sub(1) as usize) * limit)
                .take(limit)
                .cloned()
                .collect();
            let page = QuestionPage {
                questions,
                total_pages,
                current_page: Some(query.page),
            };
            (page, state.holds.pop_front())
        };

        if let Some(hold) = hold {
            let _ = hold.entered.send(());
            let _ = hold.release.await;
            if let Some(err) = hold.fail_with {
                return Err(err);
            }
        }
        Ok(page)
    }

    async fn get_public_question(&self, id: &QuestionId) -> GatewayResult<Question> {
        self.enter("get_public_question", Access::Public).await?;
        self.state
            .lock()
            .await
            .questions
            .iter()
            .find(|q| &q.id == id && !q.visibility.is_private())
            .cloned()
            .ok_or_else(|| not_found("GET api/noauth/questions", "Question"))
    }

    async fn create_question(&self, fields: &QuestionFields) -> GatewayResult<Question> {
        self.enter("create_question", Access::Owner).await?;
        let mut state = self.state.lock().await;
        let id = Self::next_id(&mut state, "q");
        let mut created = question(&id, "", None);
        apply_fields(&mut created, fields);
        state.questions.insert(0, created.clone());
        Ok(created)
    }

    async fn update_question(
        &self,
        id: &QuestionId,
        fields: &QuestionFields,
    ) -> GatewayResult<Question> {
        self.enter("update_question", Access::Owner).await?;
        let mut state = self.state.lock().await;
        let stored = state
            .questions
            .iter_mut()
            .find(|q| &q.id == id)
            .ok_or_else(|| not_found("PUT api/questions", "Question"))?;
        apply_fields(stored, fields);
        Ok(stored.clone())
    }

    async fn delete_question(&self, id: &QuestionId) -> GatewayResult<()> {
        self.enter("delete_question", Access::Owner).await?;
        let mut state = self.state.lock().await;
        let before = state.questions.len();
        state.questions.retain(|q| &q.id != id);
        if state.questions.len() == before {
            return Err(not_found("DELETE api/questions", "Question"));
        }
        Ok(())
    }

    async fn move_question(
        &self,
        id: &QuestionId,
        folder_id: Option<&FolderId>,
    ) -> GatewayResult<Question> {
        self.enter("move_question", Access::Owner).await?;
        let mut state = self.state.lock().await;
        let stored = state
            .questions
            .iter_mut()
            .find(|q| &q.id == id)
            .ok_or_else(|| not_found("PATCH api/questions/move", "Question"))?;
        stored.folder_id = folder_id.cloned();
        Ok(stored.clone())
    }

    async fn list_folders(&self, access: Access) -> GatewayResult<Vec<Folder>> {
        self.enter("list_folders", access).await?;
        Ok(self.state.lock().await.folders.clone())
    }

    async fn get_public_folder(&self, id: &FolderId) -> GatewayResult<Folder> {
        self.enter("get_public_folder", Access::Public).await?;
        self.state
            .lock()
            .await
            .folders
            .iter()
            .find(|f| &f.id == id)
            .cloned()
            .ok_or_else(|| not_found("GET api/noauth/folders", "Folder"))
    }

    async fn create_folder(&self, name: &str) -> GatewayResult<Folder> {
        self.enter("create_folder", Access::Owner).await?;
        let mut state = self.state.lock().await;
        let id = Self::next_id(&mut state, "f");
        let created = folder(&id, name);
        state.folders.push(created.clone());
        Ok(created)
    }

    async fn delete_folder(&self, id: &FolderId) -> GatewayResult<MessageResponse> {
        self.enter("delete_folder", Access::Owner).await?;
        let mut state = self.state.lock().await;
        state.folders.retain(|f| &f.id != id);
        if state.cascade_on_folder_delete {
            for q in state.questions.iter_mut() {
                if q.in_folder(id) {
                    q.folder_id = None;
                }
            }
        }
        Ok(MessageResponse {
            message: Some("Folder deleted".to_string()),
        })
    }

    async fn login(&self, request: &LoginRequest) -> GatewayResult<LoginResponse> {
        self.enter("login", Access::Public).await?;
        if request.email == VALID_EMAIL && request.password == VALID_PASSWORD {
            Ok(LoginResponse {
                token: ISSUED_TOKEN.to_string(),
            })
        } else {
            Err(GatewayError::api(
                "POST api/auth/login",
                401,
                Some("Invalid email or password".to_string()),
            ))
        }
    }

    async fn signup(&self, _request: &SignupRequest) -> GatewayResult<()> {
        self.enter("signup", Access::Public).await
    }

    async fn request_otp(&self, _email: &str) -> GatewayResult<()> {
        self.enter("request_otp", Access::Public).await
    }

    async fn verify_otp(&self, request: &VerifyOtpRequest) -> GatewayResult<()> {
        self.enter("verify_otp", Access::Public).await?;
        if request.otp == "123456" {
            Ok(())
        } else {
            Err(GatewayError::api(
                "POST api/auth/verify-otp",
                400,
                Some("Invalid OTP".to_string()),
            ))
        }
    }

    async fn request_password_reset_otp(&self, _email: &str) -> GatewayResult<()> {
        self.enter("request_password_reset_otp", Access::Public).await
    }

    async fn reset_password(&self, _request: &ResetPasswordRequest) -> GatewayResult<()> {
        self.enter("reset_password", Access::Public).await
    }

    async fn profile(&self) -> GatewayResult<UserProfile> {
        self.enter("profile", Access::Owner).await?;
        Ok(UserProfile {
            full_name: Some("Ada Lovelace".to_string()),
            email: Some(VALID_EMAIL.to_string()),
            ..UserProfile::default()
        })
    }
}
