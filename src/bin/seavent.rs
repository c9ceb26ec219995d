//! seavent CLI: operator interface to the event authoring workflow.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use seavent::artifacts::{ArtifactStore, MemoryArtifactStore};
use seavent::config::{Config, WorkflowConfig};
use seavent::controls::{self, AttendanceAction, ControlAction, ReviewAction};
use seavent::db::Db;
use seavent::drafts::MemoryDraftStore;
use seavent::form::Field;
use seavent::model::{ChannelId, MessageId, User};
use seavent::platform::{Form, LocalPlatform, MessageView, Outbound};
use seavent::telemetry::{TelemetryConfig, init_telemetry};
use seavent::workflow::{Invocation, WorkflowController};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "seavent", about = "Author events through a chat workflow")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the resolved workflow configuration
    CheckConfig,
    /// Drive the workflow from stdin against the in-process platform
    Console {
        /// User id to act as
        #[arg(long, default_value = "console")]
        user: String,
        /// Display name for that user
        #[arg(long, default_value = "Console")]
        name: String,
        /// Roles the user holds
        #[arg(long)]
        role: Vec<String>,
        /// Channel the command is used in
        #[arg(long, default_value = "general")]
        channel: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::CheckConfig => cmd_check_config(&config),
        Command::Console {
            user,
            name,
            role,
            channel,
        } => {
            let _guard = init_telemetry(TelemetryConfig {
                endpoint: config.otel_endpoint.clone(),
                service_name: "seavent".to_string(),
                log_level: config.log_level.clone(),
            })?;
            let user = User::new(user, name).with_roles(role);
            cmd_console(&config, user, ChannelId::new(channel)).await
        }
    }
}

fn cmd_check_config(config: &Config) -> anyhow::Result<()> {
    let workflow = config.workflow()?;
    println!("Bot token:          set");
    println!(
        "Artifact store:     {}",
        if config.database_url.is_some() {
            "postgres"
        } else {
            "memory"
        }
    );
    println!(
        "OTLP endpoint:      {}",
        config.otel_endpoint.as_deref().unwrap_or("-")
    );
    println!("Log level:          {}", config.log_level);
    println!(
        "Workflow file:      {}",
        config.workflow_path.as_deref().unwrap_or("(defaults)")
    );
    print_workflow(&workflow);
    Ok(())
}

fn print_workflow(workflow: &WorkflowConfig) {
    println!("Command:            /{}", workflow.command_name);
    println!("Editing timeout:    {}s", workflow.editing_timeout.as_secs());
    println!("Attachment timeout: {}s", workflow.attachment_timeout.as_secs());
    println!("Categories:");
    for category in &workflow.categories {
        println!("  {:<16}  -> #{}", category.name, category.channel);
    }
    let list = |roles: &[String]| {
        if roles.is_empty() {
            "-".to_string()
        } else {
            roles.join(", ")
        }
    };
    println!("Allowed roles:      {}", list(&workflow.roles.allowed));
    println!("Denied roles:       {}", list(&workflow.roles.denied));
}

/// What the console has seen on screen, so short commands can be resolved
/// to the ids the workflow expects.
#[derive(Default)]
struct Screen {
    form: Option<Form>,
    review: Option<String>,
    prompt: Option<MessageId>,
    artifact: Option<String>,
}

async fn cmd_console(config: &Config, user: User, channel: ChannelId) -> anyhow::Result<()> {
    let workflow = config.workflow()?;
    let artifacts: Arc<dyn ArtifactStore> = match &config.database_url {
        Some(url) => {
            let db = Db::connect(url.expose_secret()).await?;
            db.migrate().await?;
            Arc::new(db)
        }
        None => Arc::new(MemoryArtifactStore::new()),
    };

    let platform = Arc::new(LocalPlatform::new("seavent"));
    let controller = WorkflowController::connect(
        platform.clone(),
        Arc::new(MemoryDraftStore::new()),
        artifacts,
        workflow,
    )
    .await;

    let screen = Arc::new(Mutex::new(Screen::default()));
    tokio::spawn(watch_outbound(platform.outbound(), Arc::clone(&screen)));

    println!("commands: create [category] | form key=value;... | press <action> | attach <url> | attend <user> | leave <user> | quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        let result = match verb {
            "" => Ok(()),
            "quit" | "exit" => break,
            "create" => {
                let mut invocation = Invocation::new(user.clone(), channel.clone());
                if !rest.is_empty() {
                    invocation = invocation.with_category(rest);
                }
                let controller = controller.clone();
                tokio::spawn(async move {
                    match controller.invoke(invocation).await {
                        Ok(outcome) => println!("< form step: {outcome:?}"),
                        Err(e) => println!("< error: {e}"),
                    }
                });
                Ok(())
            }
            "form" => submit_form(&platform, &screen, &user, rest),
            "press" => press_review(&platform, &screen, &user, &channel, rest),
            "attach" => {
                let prompt = lock(&screen).prompt.clone();
                prompt
                    .map(|prompt| {
                        platform.post_message(
                            user.id.clone(),
                            channel.clone(),
                            Some(prompt),
                            vec![rest.to_string()],
                        );
                    })
                    .context("no image prompt on screen")
            }
            "attend" | "leave" => {
                let action = if verb == "attend" {
                    AttendanceAction::Attending
                } else {
                    AttendanceAction::NotAttending
                };
                let namespace = lock(&screen).artifact.clone();
                namespace
                    .map(|ns| {
                        let who = if rest.is_empty() { user.clone() } else { User::new(rest, rest) };
                        platform.press(who, channel.clone(), controls::encode(&ns, action));
                    })
                    .context("no published event on screen")
            }
            other => Err(anyhow::anyhow!("unknown command '{other}'")),
        };
        if let Err(e) = result {
            println!("! {e}");
        }
    }

    controller.shutdown();
    Ok(())
}

fn lock(screen: &Mutex<Screen>) -> std::sync::MutexGuard<'_, Screen> {
    screen.lock().unwrap_or_else(PoisonError::into_inner)
}

fn submit_form(
    platform: &LocalPlatform,
    screen: &Mutex<Screen>,
    user: &User,
    rest: &str,
) -> anyhow::Result<()> {
    let form = lock(screen).form.clone().context("no form on screen")?;
    let mut values = HashMap::new();
    for pair in rest.split(';').filter(|p| !p.trim().is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("expected key=value, got '{pair}'"))?;
        let key = key.trim();
        let field = Field::ALL
            .into_iter()
            .find(|f| f.key() == key)
            .with_context(|| format!("unknown field '{key}'"))?;
        values.insert(
            controls::field_id(&form.id, field.key()),
            value.trim().to_string(),
        );
    }
    platform.submit_form(user.clone(), form.id, values);
    Ok(())
}

fn press_review(
    platform: &LocalPlatform,
    screen: &Mutex<Screen>,
    user: &User,
    channel: &ChannelId,
    rest: &str,
) -> anyhow::Result<()> {
    let namespace = lock(screen).review.clone().context("no review on screen")?;
    let action = ReviewAction::from_name(rest).with_context(|| {
        let names: Vec<_> = ReviewAction::ALL.iter().map(|a| a.name()).collect();
        format!("unknown action '{rest}', expected one of {}", names.join(", "))
    })?;
    platform.press(user.clone(), channel.clone(), controls::encode(&namespace, action));
    Ok(())
}

async fn watch_outbound(
    mut outbound: tokio::sync::broadcast::Receiver<Outbound>,
    screen: Arc<Mutex<Screen>>,
) {
    while let Ok(out) = outbound.recv().await {
        match &out {
            Outbound::FormShown { form, .. } => {
                println!("> form '{}':", form.title);
                for field in &form.fields {
                    println!("    {}: {}", field.label, field.value);
                }
                let mut screen = lock(&screen);
                screen.review = Some(form.id.clone());
                screen.form = Some(form.clone());
            }
            Outbound::MessageSent { id, channel, view } => {
                println!("> [{id} #{channel}] {}", describe(view));
                let mut screen = lock(&screen);
                match view {
                    MessageView::Text { .. } => screen.prompt = Some(id.clone()),
                    MessageView::Artifact { controls, .. } => {
                        screen.artifact = controls
                            .first()
                            .and_then(|c| c.id.rsplit_once("_button_"))
                            .map(|(ns, _)| ns.to_string());
                    }
                    MessageView::Review { .. } => {}
                }
            }
            Outbound::MessageEdited { id, view } => println!("> [{id} edited] {}", describe(view)),
            Outbound::MessageDeleted { id } => println!("> [{id} deleted]"),
            Outbound::Notice { user, text, .. } => println!("> (to {user}) {text}"),
        }
    }
}

fn describe(view: &MessageView) -> String {
    match view {
        MessageView::Text { content } => content.clone(),
        MessageView::Review {
            content,
            preview,
            controls,
            ..
        } => {
            let buttons: Vec<_> = controls.iter().map(|c| c.label.as_str()).collect();
            format!(
                "{content} | {} @ {} ({}) [{}]",
                preview.title,
                preview.location,
                preview.duration,
                buttons.join(" | ")
            )
        }
        MessageView::Artifact {
            preview,
            category,
            author,
            attendees,
            ..
        } => format!(
            "{category}: {} @ {} by {author}; attending: {}",
            preview.title,
            preview.location,
            attendees.join(", ")
        ),
    }
}
