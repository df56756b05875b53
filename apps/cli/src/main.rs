use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use client_core::{
    forms::parse_difficulty, load_settings, Access, Account, ClientError, FileCredentialStore,
    HttpGateway, QuestionDraft, QuestionGateway, ResetPasswordForm, Session, Settings,
    SignupForm, Workspace, WorkspaceSnapshot,
};
use shared::domain::{published_date, FolderId, Question, QuestionId, Visibility};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "qlog", about = "Interview question log client")]
struct Cli {
    /// Overrides `api_base_url` from qlog.toml / APP__API_BASE_URL.
    #[arg(long, global = true)]
    api_base_url: Option<String>,
    #[arg(long, global = true)]
    site_url: Option<String>,
    #[arg(long, global = true)]
    page_size: Option<u32>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    Signup(SignupArgs),
    RequestOtp {
        #[arg(long)]
        email: String,
    },
    VerifyOtp {
        #[arg(long)]
        email: String,
        #[arg(long)]
        otp: String,
    },
    ForgotPassword {
        #[arg(long)]
        email: String,
    },
    ResetPassword {
        #[arg(long)]
        email: String,
        #[arg(long)]
        otp: String,
        #[arg(long)]
        new_password: String,
        #[arg(long)]
        confirm_password: String,
    },
    Profile,
    /// Public questions, no sign-in needed.
    Feed(ListArgs),
    /// Your own questions and folders.
    Dashboard(DashboardArgs),
    Show {
        id: String,
    },
    Share {
        id: String,
    },
    Add(QuestionArgs),
    Edit {
        id: String,
        #[command(flatten)]
        fields: QuestionArgs,
    },
    Delete {
        id: String,
    },
    Move {
        id: String,
        /// Target folder; omit to unfile the question.
        #[arg(long)]
        folder: Option<String>,
    },
    Folders,
    FolderCreate {
        name: String,
    },
    FolderDelete {
        id: String,
    },
}

#[derive(Args, Debug)]
struct SignupArgs {
    #[arg(long)]
    full_name: String,
    #[arg(long)]
    gender: String,
    #[arg(long)]
    age: String,
    #[arg(long)]
    mobile_number: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
    #[arg(long)]
    confirm_password: String,
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long)]
    search: Option<String>,
}

#[derive(Args, Debug)]
struct DashboardArgs {
    #[command(flatten)]
    list: ListArgs,
    #[arg(long, conflicts_with = "unfiled")]
    folder: Option<String>,
    #[arg(long)]
    unfiled: bool,
}

/// Editable fields; on `edit`, omitted flags keep the stored value.
#[derive(Args, Debug, Default)]
struct QuestionArgs {
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    question: Option<String>,
    #[arg(long)]
    solution: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    difficulty: Option<String>,
    #[arg(long)]
    author: Option<String>,
    /// YYYY-MM-DD; defaults to today.
    #[arg(long)]
    date: Option<String>,
    #[arg(long, conflicts_with = "public")]
    private: bool,
    #[arg(long)]
    public: bool,
    #[arg(long)]
    folder: Option<String>,
}

impl QuestionArgs {
    fn apply_to(&self, draft: &mut QuestionDraft) -> Result<()> {
        if let Some(v) = &self.title {
            draft.title = v.clone();
        }
        if let Some(v) = &self.question {
            draft.question = v.clone();
        }
        if let Some(v) = &self.solution {
            draft.solution = v.clone();
        }
        if let Some(v) = &self.category {
            draft.category = v.clone();
        }
        if let Some(v) = &self.difficulty {
            draft.difficulty = Some(parse_difficulty(v)?);
        }
        if let Some(v) = &self.author {
            draft.author = v.clone();
        }
        if let Some(v) = &self.date {
            let date = published_date::parse(v)
                .with_context(|| format!("'{v}' is not a YYYY-MM-DD date"))?;
            draft.published_date = Some(date);
        }
        if self.private {
            draft.visibility = Visibility::Private;
        }
        if self.public {
            draft.visibility = Visibility::Public;
        }
        if let Some(v) = &self.folder {
            draft.folder_id = Some(FolderId::new(v)).filter(|id| !id.is_empty());
        }
        Ok(())
    }
}

struct App {
    settings: Settings,
    session: Session,
    gateway: Arc<dyn QuestionGateway>,
}

impl App {
    async fn connect(settings: Settings) -> Result<Self> {
        let store = Arc::new(FileCredentialStore::new(settings.credential_path.clone()));
        let session = Session::restore(store).await.with_context(|| {
            format!(
                "failed to read credential file '{}'",
                settings.credential_path.display()
            )
        })?;
        let gateway = HttpGateway::new(settings.api_base()?, session.clone())?;
        debug!(api = %gateway.base_url(), "api gateway ready");
        Ok(Self {
            settings,
            session,
            gateway: Arc::new(gateway),
        })
    }

    fn account(&self) -> Account {
        Account::new(self.gateway.clone(), self.session.clone())
    }

    fn workspace(&self, access: Access) -> Arc<Workspace> {
        Workspace::new_with_page_size(
            self.gateway.clone(),
            self.session.clone(),
            access,
            self.settings.page_size,
        )
    }

    async fn owner_workspace(&self) -> Result<Arc<Workspace>> {
        if !self.session.is_authenticated().await {
            bail!("not signed in; run `qlog login` first");
        }
        Ok(self.workspace(Access::Owner))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(Cli::parse()).await {
        eprintln!("error: {}", user_message(&err));
        std::process::exit(1);
    }
}

fn user_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<ClientError>() {
        Some(client) => client.display_message(),
        None => format!("{err:#}"),
    }
}

fn apply_overrides(mut settings: Settings, cli: &Cli) -> Settings {
    if let Some(v) = &cli.api_base_url {
        settings.api_base_url = v.clone();
    }
    if let Some(v) = &cli.site_url {
        settings.site_url = v.clone();
    }
    if let Some(v) = cli.page_size {
        settings.page_size = v.max(1);
    }
    settings
}

async fn run(cli: Cli) -> Result<()> {
    let settings = apply_overrides(load_settings()?, &cli);
    let app = App::connect(settings).await?;

    match cli.command {
        Command::Login { email, password } => {
            app.account().login(&email, &password).await?;
            println!("Signed in.");
        }
        Command::Logout => {
            app.account().logout().await?;
            println!("Signed out.");
        }
        Command::Signup(args) => {
            let form = SignupForm {
                full_name: args.full_name,
                gender: args.gender,
                age: args.age,
                mobile_number: args.mobile_number,
                email: args.email,
                password: args.password,
                confirm_password: args.confirm_password,
            };
            app.account().signup(&form).await?;
            println!("Account created. Request a verification code with `qlog request-otp`.");
        }
        Command::RequestOtp { email } => {
            app.account().request_otp(&email).await?;
            println!("Verification code sent to {email}.");
        }
        Command::VerifyOtp { email, otp } => {
            app.account().verify_otp(&email, &otp).await?;
            println!("Email verified.");
        }
        Command::ForgotPassword { email } => {
            app.account().request_password_reset_otp(&email).await?;
            println!("Reset code sent to {email}.");
        }
        Command::ResetPassword {
            email,
            otp,
            new_password,
            confirm_password,
        } => {
            let form = ResetPasswordForm {
                email,
                otp,
                new_password,
                confirm_password,
            };
            app.account().reset_password(&form).await?;
            println!("Password updated. You can sign in now.");
        }
        Command::Profile => {
            let profile = app.account().profile().await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Command::Feed(args) => {
            let workspace = app.workspace(Access::Public);
            load_listing(&workspace, &args).await?;
            print_listing(&workspace.snapshot().await);
        }
        Command::Dashboard(args) => {
            let workspace = app.owner_workspace().await?;
            load_listing(&workspace, &args.list).await?;
            workspace.load_folders().await?;
            if args.unfiled {
                workspace.select_folder(None).await;
            } else if let Some(folder) = args.folder {
                workspace.select_folder(Some(FolderId::new(folder))).await;
            }
            let snapshot = workspace.snapshot().await;
            print_folders(&snapshot);
            print_listing(&snapshot);
        }
        Command::Show { id } => {
            let question = app
                .workspace(Access::Public)
                .get_public_question(&QuestionId::new(id))
                .await?;
            print_question(&question);
        }
        Command::Share { id } => {
            println!("{}", app.settings.share_link(&QuestionId::new(id))?);
        }
        Command::Add(fields) => {
            let workspace = app.owner_workspace().await?;
            let mut draft = QuestionDraft::blank();
            fields.apply_to(&mut draft)?;
            let created = workspace.create_question(&draft).await?;
            println!("Created question {}.", created.id);
        }
        Command::Edit { id, fields } => {
            let workspace = app.owner_workspace().await?;
            let id = QuestionId::new(id);
            let stored = find_owned_question(&workspace, &id).await?;
            let mut draft = QuestionDraft::from_question(&stored);
            fields.apply_to(&mut draft)?;
            workspace.update_question(&id, &draft).await?;
            println!("Updated question {id}.");
        }
        Command::Delete { id } => {
            let workspace = app.owner_workspace().await?;
            workspace.delete_question(&QuestionId::new(&id)).await?;
            println!("Deleted question {id}.");
        }
        Command::Move { id, folder } => {
            let workspace = app.owner_workspace().await?;
            let moved = workspace
                .move_question(&QuestionId::new(id), folder.map(FolderId::new))
                .await?;
            match &moved.folder_id {
                Some(folder) => println!("Moved {} into folder {folder}.", moved.id),
                None => println!("Moved {} out of its folder.", moved.id),
            }
        }
        Command::Folders => {
            let workspace = app.owner_workspace().await?;
            workspace.load_folders().await?;
            print_folders(&workspace.snapshot().await);
        }
        Command::FolderCreate { name } => {
            let workspace = app.owner_workspace().await?;
            let folder = workspace.create_folder(&name).await?;
            println!("Created folder {} ({}).", folder.name, folder.id);
        }
        Command::FolderDelete { id } => {
            let workspace = app.owner_workspace().await?;
            let message = workspace.delete_folder(&FolderId::new(id)).await?;
            println!("{}", message.unwrap_or_else(|| "Folder deleted.".to_string()));
        }
    }

    Ok(())
}

async fn load_listing(workspace: &Workspace, args: &ListArgs) -> Result<()> {
    let view = workspace.view().await;
    let term = args.search.as_deref().unwrap_or_default();
    workspace.load_page(1, view.page_size, term).await?;
    if args.page > 1 {
        workspace.go_to_page(args.page).await?;
    }
    Ok(())
}

/// Pages through the owner's questions until `id` shows up.
async fn find_owned_question(workspace: &Workspace, id: &QuestionId) -> Result<Question> {
    let mut page = 1;
    loop {
        let view = workspace.view().await;
        workspace.load_page(page, view.page_size, "").await?;
        if let Some(found) = workspace.questions().await.into_iter().find(|q| &q.id == id) {
            return Ok(found);
        }
        if page >= workspace.view().await.total_pages {
            bail!("question {id} not found");
        }
        page += 1;
    }
}

fn print_listing(snapshot: &WorkspaceSnapshot) {
    let view = &snapshot.view;
    let mut shown = 0;
    for question in snapshot.visible_questions() {
        shown += 1;
        let folder = question
            .folder_id
            .as_ref()
            .and_then(|id| snapshot.folder_name(id))
            .map(|name| format!(" [{name}]"))
            .unwrap_or_default();
        let lock = if question.visibility.is_private() {
            " (private)"
        } else {
            ""
        };
        println!(
            "{}  {} · {} · {}{}{}",
            question.id, question.title, question.difficulty, question.category, folder, lock
        );
    }
    if shown == 0 {
        println!("No questions found.");
    }
    let search = if view.search_term.is_empty() {
        String::new()
    } else {
        format!(" for \"{}\"", view.search_term)
    };
    println!("Page {} of {}{search}", view.page, view.total_pages);
}

fn print_folders(snapshot: &WorkspaceSnapshot) {
    let buckets = snapshot.questions_by_folder();
    println!("Unfiled ({} on this page)", buckets.unfiled.len());
    for (folder, questions) in &buckets.folders {
        println!("{}  {} ({} on this page)", folder.id, folder.name, questions.len());
    }
}

fn print_question(question: &Question) {
    println!("{}", question.title);
    println!(
        "{} · {} · by {}{}",
        question.difficulty,
        question.category,
        question.author,
        question
            .published_date
            .map(|d| format!(" · {d}"))
            .unwrap_or_default()
    );
    println!();
    println!("{}", question.question);
    println!();
    println!("Solution:");
    println!("{}", question.solution);
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
