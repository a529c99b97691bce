mod commands;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use futures::StreamExt;
use press_core::{
    theme::{initial_theme, platform_hint},
    views::Themed,
    ClientConfig, FileThemeStore, MemoryThemeStore, NoticeKind, Orchestrator, SessionChange,
    SessionContext, ThemeStore,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio_stream::wrappers::BroadcastStream;
use tracing_subscriber::EnvFilter;

use crate::commands::{delete_prompt, Command, FormField, HELP};

#[derive(Parser, Debug)]
#[command(about = "Terminal reader for the VS Press site")]
struct Args {
    /// Client configuration file. Defaults to press.toml in the working directory.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Route to open first, e.g. "/articles?category=events".
    #[arg(default_value = "/")]
    route: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ClientConfig::load_from(path),
        None => ClientConfig::load(),
    };
    let theme_store: Arc<dyn ThemeStore> = match FileThemeStore::in_config_dir() {
        Some(store) => Arc::new(store),
        None => {
            tracing::warn!("no config directory, theme will not be remembered");
            Arc::new(MemoryThemeStore::default())
        }
    };
    let orchestrator = Orchestrator::over_http(&config)?.with_theme_store(theme_store);

    let theme = initial_theme(
        orchestrator.theme_store(),
        platform_hint(|name| std::env::var(name).ok()),
    );
    let mut ctx = SessionContext::new(theme);

    let mut changes = BroadcastStream::new(orchestrator.identity().subscribe_session_changes());
    tokio::spawn(async move {
        while let Some(change) = changes.next().await {
            match change {
                Ok(SessionChange::SignedIn { user_id, email }) => {
                    tracing::info!(%user_id, %email, "signed in");
                }
                Ok(SessionChange::SignedOut { user_id }) => {
                    tracing::info!(%user_id, "signed out");
                }
                Err(err) => tracing::debug!(error = %err, "session change stream lagged"),
            }
        }
    });

    let outcome = orchestrator.open(&mut ctx, &args.route).await;
    ctx.record(outcome);
    show(&mut ctx);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt(&ctx).await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }
        if command == Command::Help {
            println!("{HELP}");
            continue;
        }
        dispatch(&orchestrator, &mut ctx, command, &mut lines).await?;
        show(&mut ctx);
    }
    Ok(())
}

async fn dispatch(
    orchestrator: &Orchestrator,
    ctx: &mut SessionContext,
    command: Command,
    lines: &mut Lines<BufReader<Stdin>>,
) -> Result<()> {
    tracing::debug!(command = command.name(), "dispatching");

    match command {
        Command::Open(token) => {
            let outcome = orchestrator.open(ctx, &token).await;
            if let Some(None) = ctx.record(outcome) {
                ctx.failure(format!("no page at '{token}'"));
            }
        }
        Command::SignUp {
            email,
            password,
            display_name,
        } => {
            let outcome = orchestrator
                .sign_up(ctx, &email, &password, &display_name)
                .await;
            if ctx.record(outcome).is_some() {
                refresh_route(orchestrator, ctx).await;
            }
        }
        Command::LogIn { email, password } => {
            let outcome = orchestrator.log_in(ctx, &email, &password).await;
            if ctx.record(outcome).is_some() {
                refresh_route(orchestrator, ctx).await;
            }
        }
        Command::LogOut => {
            let outcome = orchestrator.log_out(ctx).await;
            ctx.record(outcome);
        }
        Command::Like(article_id) => {
            let outcome = orchestrator.toggle_like(ctx, article_id).await;
            ctx.record(outcome);
        }
        Command::Comment { article_id, text } => {
            let outcome = orchestrator.add_comment(ctx, article_id, &text).await;
            ctx.record(outcome);
        }
        Command::DeleteComment {
            article_id,
            comment_id,
        } => {
            let outcome = orchestrator
                .delete_comment(ctx, article_id, comment_id)
                .await;
            ctx.record(outcome);
        }
        Command::NewArticle => {
            ctx.article_form = Default::default();
        }
        Command::Set(field) => {
            let fields = &mut ctx.article_form.fields;
            match field {
                FormField::Title(value) => fields.title = value,
                FormField::Excerpt(value) => fields.excerpt = value,
                FormField::Content(value) => fields.content = value,
                FormField::Image(value) => fields.image_url = value,
                FormField::Category(category) => fields.category = category,
                FormField::Featured(featured) => fields.featured = featured,
            }
        }
        Command::Upload(path) => {
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    ctx.failure(format!("could not read {}: {err}", path.display()));
                    return Ok(());
                }
            };
            let content_type = mime_guess::from_path(&path)
                .first_or_octet_stream()
                .to_string();
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string());
            let outcome = orchestrator
                .upload_image(ctx, &file_name, &content_type, bytes)
                .await;
            ctx.record(outcome);
        }
        Command::Edit(article_id) => {
            let outcome = orchestrator.edit_article(ctx, article_id).await;
            ctx.record(outcome);
        }
        Command::Save => {
            let outcome = orchestrator.save_article(ctx).await;
            ctx.record(outcome);
        }
        Command::Delete(article_id) => {
            // Without the admin role the handler refuses before asking.
            let confirmed = match delete_prompt(ctx, article_id) {
                Some(question) => confirm(&question, lines).await?,
                None => false,
            };
            let outcome = orchestrator
                .delete_article(ctx, article_id, |_| confirmed)
                .await;
            ctx.record(outcome);
        }
        Command::Theme => {
            orchestrator.toggle_theme(ctx);
        }
        Command::Help | Command::Quit => {}
    }
    Ok(())
}

/// Reloads the current page after the signed-in user changed.
async fn refresh_route(orchestrator: &Orchestrator, ctx: &mut SessionContext) {
    if let Some(route) = ctx.route {
        let outcome = orchestrator.open(ctx, &route.to_string()).await;
        ctx.record(outcome);
    }
}

async fn confirm(question: &str, lines: &mut Lines<BufReader<Stdin>>) -> Result<bool> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(format!("{question} [y/N] ").as_bytes()).await?;
    stdout.flush().await?;
    let answer = lines.next_line().await?.unwrap_or_default();
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

async fn prompt(ctx: &SessionContext) -> Result<()> {
    let who = ctx.display_name().unwrap_or("guest");
    let mut stdout = tokio::io::stdout();
    stdout.write_all(format!("{who}> ").as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

fn show(ctx: &mut SessionContext) {
    for notice in ctx.take_notices() {
        let tag = match notice.kind {
            NoticeKind::Success => "ok",
            NoticeKind::Error => "error",
        };
        println!("[{tag}] {}", notice.message);
    }
    if let Some(view) = press_core::render(ctx) {
        println!(
            "{}",
            Themed {
                view: &view,
                theme: ctx.theme,
            }
        );
    }
}
