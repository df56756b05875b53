//! Keeps the loaded question page and folder list consistent with the API.
//!
//! Every mutation is followed by a full refetch of the current page and the
//! folder list instead of patching local copies, so client ordering and page
//! membership always match the server after a write.

use std::{
    collections::HashSet,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use chrono::{Local, NaiveDate};
use shared::{
    domain::{Folder, FolderFilter, FolderId, Question, QuestionId},
    protocol::{QuestionListQuery, QuestionPage},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    error::{ClientError, ClientResult, GatewayError, GatewayResult, ValidationError},
    forms::{validate_folder_name, QuestionDraft},
    gateway::{Access, QuestionGateway},
    session::Session,
};

pub const DEFAULT_PAGE_SIZE: u32 = 12;

/// A page whose server-reported count is lower than the requested page is
/// refetched at the last page this many times at most.
const MAX_PAGE_CLAMP_REFETCHES: usize = 1;

#[derive(Debug, Clone)]
pub enum WorkspaceEvent {
    QuestionsUpdated {
        page: u32,
        total_pages: u32,
        count: usize,
    },
    FoldersUpdated {
        count: usize,
    },
    SessionExpired {
        message: String,
    },
    Error(String),
}

/// Result of a fetch that may have been overtaken by a newer one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome<T> {
    Applied(T),
    /// A newer fetch was initiated while this one was in flight; its response
    /// was discarded.
    Superseded,
}

impl<T> LoadOutcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, LoadOutcome::Applied(_))
    }

    pub fn applied(self) -> Option<T> {
        match self {
            LoadOutcome::Applied(value) => Some(value),
            LoadOutcome::Superseded => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    pub page: u32,
    pub page_size: u32,
    pub search_term: String,
    /// `None` shows the whole page.
    pub folder_filter: Option<FolderFilter>,
    pub total_pages: u32,
}

impl ViewState {
    fn new(page_size: u32) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
            search_term: String::new(),
            folder_filter: None,
            total_pages: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceSnapshot {
    pub view: ViewState,
    pub questions: Vec<Question>,
    pub folders: Vec<Folder>,
}

impl WorkspaceSnapshot {
    /// Loaded questions matching the active folder filter. Restartable: clone
    /// the iterator or call again.
    pub fn visible_questions(&self) -> VisibleQuestions<'_> {
        VisibleQuestions {
            iter: self.questions.iter(),
            filter: self.view.folder_filter.as_ref(),
        }
    }

    pub fn folder_name(&self, id: &FolderId) -> Option<&str> {
        self.folders
            .iter()
            .find(|folder| &folder.id == id)
            .map(|folder| folder.name.as_str())
    }

    /// Groups the loaded page into the unfiled bucket and one bucket per
    /// loaded folder, in folder-list order.
    pub fn questions_by_folder(&self) -> FolderBuckets<'_> {
        let unfiled = self.questions.iter().filter(|q| q.is_unfiled()).collect();
        let folders = self
            .folders
            .iter()
            .map(|folder| {
                let questions = self
                    .questions
                    .iter()
                    .filter(|q| q.in_folder(&folder.id))
                    .collect();
                (folder, questions)
            })
            .collect();
        FolderBuckets { unfiled, folders }
    }
}

#[derive(Debug, Clone)]
pub struct FolderBuckets<'a> {
    pub unfiled: Vec<&'a Question>,
    pub folders: Vec<(&'a Folder, Vec<&'a Question>)>,
}

#[derive(Debug, Clone)]
pub struct VisibleQuestions<'a> {
    iter: std::slice::Iter<'a, Question>,
    filter: Option<&'a FolderFilter>,
}

impl<'a> Iterator for VisibleQuestions<'a> {
    type Item = &'a Question;

    fn next(&mut self) -> Option<Self::Item> {
        let filter = self.filter;
        self.iter
            .find(|question| filter.map_or(true, |f| f.matches(question.folder_id.as_ref())))
    }
}

struct WorkspaceState {
    view: ViewState,
    questions: Vec<Question>,
    folders: Vec<Folder>,
    /// Folders deleted through this workspace; references to them are cleared
    /// from every page applied afterwards, whether or not the server has
    /// caught up with the cascade.
    deleted_folders: HashSet<FolderId>,
}

impl WorkspaceState {
    fn unassign_deleted_folders(&mut self) {
        let deleted = &self.deleted_folders;
        if deleted.is_empty() {
            return;
        }
        for question in &mut self.questions {
            if question
                .folder_id
                .as_ref()
                .is_some_and(|id| deleted.contains(id))
            {
                question.folder_id = None;
            }
        }
        self.folders.retain(|folder| !deleted.contains(&folder.id));
        let filter_deleted = matches!(
            &self.view.folder_filter,
            Some(FolderFilter::Folder(id)) if deleted.contains(id)
        );
        if filter_deleted {
            self.view.folder_filter = Some(FolderFilter::Unfiled);
        }
    }
}

/// Workspace controller: owns the loaded page, the folder list and the
/// paging/search/filter state, and orchestrates gateway calls.
pub struct Workspace {
    gateway: Arc<dyn QuestionGateway>,
    session: Session,
    access: Access,
    state: Mutex<WorkspaceState>,
    question_generation: AtomicU64,
    folder_generation: AtomicU64,
    events: broadcast::Sender<WorkspaceEvent>,
}

impl Workspace {
    pub fn new(gateway: Arc<dyn QuestionGateway>, session: Session, access: Access) -> Arc<Self> {
        Self::new_with_page_size(gateway, session, access, DEFAULT_PAGE_SIZE)
    }

    pub fn new_with_page_size(
        gateway: Arc<dyn QuestionGateway>,
        session: Session,
        access: Access,
        page_size: u32,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            gateway,
            session,
            access,
            state: Mutex::new(WorkspaceState {
                view: ViewState::new(page_size),
                questions: Vec::new(),
                folders: Vec::new(),
                deleted_folders: HashSet::new(),
            }),
            question_generation: AtomicU64::new(0),
            folder_generation: AtomicU64::new(0),
            events,
        })
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<WorkspaceEvent> {
        self.events.subscribe()
    }

    pub async fn view(&self) -> ViewState {
        self.state.lock().await.view.clone()
    }

    pub async fn questions(&self) -> Vec<Question> {
        self.state.lock().await.questions.clone()
    }

    pub async fn folders(&self) -> Vec<Folder> {
        self.state.lock().await.folders.clone()
    }

    pub async fn snapshot(&self) -> WorkspaceSnapshot {
        let guard = self.state.lock().await;
        WorkspaceSnapshot {
            view: guard.view.clone(),
            questions: guard.questions.clone(),
            folders: guard.folders.clone(),
        }
    }

    pub async fn visible_questions(&self) -> Vec<Question> {
        self.snapshot().await.visible_questions().cloned().collect()
    }

    /// Fetches one page and, unless a newer fetch was initiated meanwhile,
    /// replaces the loaded question list with it.
    pub async fn load_page(
        &self,
        page: u32,
        page_size: u32,
        search_term: &str,
    ) -> ClientResult<LoadOutcome<QuestionPage>> {
        if page < 1 {
            return Err(ValidationError::InvalidPage.into());
        }
        if page_size < 1 {
            return Err(ValidationError::InvalidPageSize.into());
        }

        let search_term = search_term.trim().to_string();
        let mut page = page;
        let mut clamp_refetches = 0;

        loop {
            let ticket = self.question_generation.fetch_add(1, Ordering::SeqCst) + 1;
            let query = QuestionListQuery {
                page,
                limit: page_size,
                query: search_term.clone(),
            };
            debug!(ticket, page, page_size, query = %search_term, "loading question page");

            let issued_with = self.session.token().await;
            let result = self.gateway.list_questions(&query, self.access).await;
            let fetched = match result {
                Ok(fetched) => fetched,
                Err(err) if !err.is_auth() && !self.is_latest_question_ticket(ticket) => {
                    debug!(ticket, error = %err, "ignoring failure of superseded fetch");
                    return Ok(LoadOutcome::Superseded);
                }
                Err(err) => return Err(self.surface(err, issued_with.as_deref()).await),
            };

            let total_pages = fetched.total_pages.max(1);
            if page > total_pages && clamp_refetches < MAX_PAGE_CLAMP_REFETCHES {
                // The refetch would take a fresh ticket and outrank the newer fetch.
                if !self.is_latest_question_ticket(ticket) {
                    warn!(ticket, page, "discarding stale question page response");
                    return Ok(LoadOutcome::Superseded);
                }
                debug!(page, total_pages, "requested page no longer exists, refetching last page");
                page = total_pages;
                clamp_refetches += 1;
                continue;
            }
            let page = page.min(total_pages);

            let applied = {
                let mut guard = self.state.lock().await;
                if !self.is_latest_question_ticket(ticket) {
                    None
                } else {
                    guard.view.page = page;
                    guard.view.page_size = page_size;
                    guard.view.search_term = search_term.clone();
                    guard.view.total_pages = total_pages;
                    guard.questions = fetched.questions;
                    guard.unassign_deleted_folders();
                    Some(QuestionPage {
                        questions: guard.questions.clone(),
                        total_pages,
                        current_page: Some(page),
                    })
                }
            };

            return match applied {
                Some(applied) => {
                    info!(page, total_pages, count = applied.questions.len(), "question page applied");
                    let _ = self.events.send(WorkspaceEvent::QuestionsUpdated {
                        page,
                        total_pages,
                        count: applied.questions.len(),
                    });
                    Ok(LoadOutcome::Applied(applied))
                }
                None => {
                    warn!(ticket, page, "discarding stale question page response");
                    Ok(LoadOutcome::Superseded)
                }
            };
        }
    }

    /// Fetches the folder list; stale responses are discarded like pages.
    pub async fn load_folders(&self) -> ClientResult<LoadOutcome<Vec<Folder>>> {
        let ticket = self.folder_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let issued_with = self.session.token().await;
        let fetched = match self.gateway.list_folders(self.access).await {
            Ok(fetched) => fetched,
            Err(err) if !err.is_auth() && !self.is_latest_folder_ticket(ticket) => {
                return Ok(LoadOutcome::Superseded);
            }
            Err(err) => return Err(self.surface(err, issued_with.as_deref()).await),
        };

        let applied = {
            let mut guard = self.state.lock().await;
            if self.is_latest_folder_ticket(ticket) {
                guard.folders = fetched;
                guard.unassign_deleted_folders();
                Some(guard.folders.clone())
            } else {
                None
            }
        };

        match applied {
            Some(folders) => {
                debug!(count = folders.len(), "folder list applied");
                let _ = self.events.send(WorkspaceEvent::FoldersUpdated {
                    count: folders.len(),
                });
                Ok(LoadOutcome::Applied(folders))
            }
            None => {
                warn!(ticket, "discarding stale folder list response");
                Ok(LoadOutcome::Superseded)
            }
        }
    }

    /// Moves to another page of the current search; the page must lie within
    /// the last known page count.
    pub async fn go_to_page(&self, page: u32) -> ClientResult<LoadOutcome<QuestionPage>> {
        let view = self.view().await;
        if page < 1 || page > view.total_pages {
            return Err(ValidationError::PageOutOfRange {
                page,
                total_pages: view.total_pages,
            }
            .into());
        }
        self.load_page(page, view.page_size, &view.search_term).await
    }

    pub async fn set_page_size(&self, page_size: u32) -> ClientResult<LoadOutcome<QuestionPage>> {
        let view = self.view().await;
        self.load_page(1, page_size, &view.search_term).await
    }

    /// Runs a committed search term from page 1. The empty term lists
    /// everything in the server's default order.
    pub async fn search(&self, term: &str) -> ClientResult<LoadOutcome<QuestionPage>> {
        let view = self.view().await;
        self.load_page(1, view.page_size, term).await
    }

    /// Reloads the current page and the folder list together.
    pub async fn refresh(&self) -> ClientResult<()> {
        // Both halves run to completion so neither is dropped mid-report.
        let (page, folders) = futures::join!(self.reload_current_page(), self.load_folders());
        page?;
        folders?;
        Ok(())
    }

    async fn reload_current_page(&self) -> ClientResult<LoadOutcome<QuestionPage>> {
        let view = self.view().await;
        self.load_page(view.page, view.page_size, &view.search_term)
            .await
    }

    /// `None` selects the unfiled bucket.
    pub async fn select_folder(&self, folder_id: Option<FolderId>) {
        let filter = FolderFilter::from(folder_id);
        debug!(?filter, "folder filter selected");
        self.state.lock().await.view.folder_filter = Some(filter);
    }

    pub async fn clear_folder_filter(&self) {
        self.state.lock().await.view.folder_filter = None;
    }

    pub async fn create_question(&self, draft: &QuestionDraft) -> ClientResult<Question> {
        let fields = draft.to_fields(today())?;
        let created = self.guarded(self.gateway.create_question(&fields)).await?;
        info!(question_id = %created.id, "question created");
        self.refresh().await?;
        Ok(created)
    }

    pub async fn update_question(
        &self,
        id: &QuestionId,
        draft: &QuestionDraft,
    ) -> ClientResult<Question> {
        let fields = draft.to_fields(today())?;
        let updated = self
            .guarded(self.gateway.update_question(id, &fields))
            .await?;
        info!(question_id = %id, "question updated");
        self.refresh().await?;
        Ok(updated)
    }

    pub async fn delete_question(&self, id: &QuestionId) -> ClientResult<()> {
        self.guarded(self.gateway.delete_question(id)).await?;
        info!(question_id = %id, "question deleted");
        self.refresh().await
    }

    /// Reassigns one question; `None` moves it to the unfiled bucket.
    pub async fn move_question(
        &self,
        id: &QuestionId,
        folder_id: Option<FolderId>,
    ) -> ClientResult<Question> {
        let folder_id = folder_id.filter(|id| !id.is_empty());
        let moved = self
            .guarded(self.gateway.move_question(id, folder_id.as_ref()))
            .await?;
        info!(question_id = %id, folder_id = ?folder_id, "question moved");
        self.refresh().await?;
        Ok(moved)
    }

    pub async fn create_folder(&self, name: &str) -> ClientResult<Folder> {
        let name = validate_folder_name(name)?;
        let folder = self.guarded(self.gateway.create_folder(&name)).await?;
        info!(folder_id = %folder.id, name = %folder.name, "folder created");
        self.refresh().await?;
        Ok(folder)
    }

    /// Deletes a folder; its questions become unfiled locally right away and
    /// on every page applied afterwards. Returns the server's message, if any.
    pub async fn delete_folder(&self, id: &FolderId) -> ClientResult<Option<String>> {
        let response = self.guarded(self.gateway.delete_folder(id)).await?;
        {
            let mut guard = self.state.lock().await;
            guard.deleted_folders.insert(id.clone());
            guard.unassign_deleted_folders();
        }
        info!(folder_id = %id, "folder deleted");
        self.refresh().await?;
        Ok(response.message)
    }

    pub async fn get_public_question(&self, id: &QuestionId) -> ClientResult<Question> {
        self.guarded(self.gateway.get_public_question(id)).await
    }

    pub async fn get_public_folder(&self, id: &FolderId) -> ClientResult<Folder> {
        self.guarded(self.gateway.get_public_folder(id)).await
    }

    fn is_latest_question_ticket(&self, ticket: u64) -> bool {
        self.question_generation.load(Ordering::SeqCst) == ticket
    }

    fn is_latest_folder_ticket(&self, ticket: u64) -> bool {
        self.folder_generation.load(Ordering::SeqCst) == ticket
    }

    /// `call` must not have been polled yet: the credential it will carry is
    /// read first.
    async fn guarded<T>(&self, call: impl Future<Output = GatewayResult<T>>) -> ClientResult<T> {
        let issued_with = self.session.token().await;
        match call.await {
            Ok(value) => Ok(value),
            Err(err) => Err(self.surface(err, issued_with.as_deref()).await),
        }
    }

    /// Reports a gateway failure to subscribers. An auth failure ends the
    /// session only if it still holds the credential the call was sent with,
    /// and is announced once per ended session.
    async fn surface(&self, err: GatewayError, issued_with: Option<&str>) -> ClientError {
        let message = err.display_message();
        if !err.is_auth() {
            let _ = self.events.send(WorkspaceEvent::Error(message));
            return ClientError::Gateway(err);
        }

        if self.session.invalidate_if(issued_with).await {
            let _ = self
                .events
                .send(WorkspaceEvent::SessionExpired { message });
        } else {
            debug!(error = %err, "credential already replaced, keeping session");
        }
        ClientError::Gateway(err)
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
#[path = "tests/workspace_tests.rs"]
mod tests;
