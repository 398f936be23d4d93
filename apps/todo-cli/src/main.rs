//! Todo CLI binary.

use std::{collections::HashSet, sync::Arc};

use hosted_backend::{HostedBackend, HostedConfig};
use clap::Parser;
use todo_cli::{
    command::{Cli, Command},
    config::CliConfig,
    init_tracing, render,
};
use todo_store::{Backend, NotificationStore};
use todo_sync::{NotificationFeed, NotifyOutcome, SystemClock, TodoListController};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let command = Cli::parse().command;

    // Load configuration
    let config = CliConfig::load()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    tracing::info!(
        user_id = %config.user_id(),
        backend_url = %config.backend_url(),
        "Starting todo CLI"
    );

    let mut hosted = HostedConfig::new(config.backend_url(), config.api_key.clone())?;
    if let Some(token) = &config.access_token {
        hosted = hosted.with_access_token(token.clone());
    }
    let backend: Arc<dyn Backend> = Arc::new(HostedBackend::new(hosted));

    if command == Command::Watch {
        return watch(backend, config.user_id()).await;
    }

    let controller = TodoListController::new(backend, config.user_id(), Arc::new(SystemClock));
    run(command, &controller).await
}

async fn run(command: Command, controller: &TodoListController) -> anyhow::Result<()> {
    match command {
        Command::List { filter } => {
            let filter = filter.unwrap_or_default();
            // Emails are decoration; the listing works without them.
            let _ = controller.load_users().await;
            controller.set_filter(filter).await?;
            print_warning(controller.warning());

            let todos = controller.todos();
            if todos.is_empty() {
                println!("No todos ({}).", filter);
            }
            for todo in &todos {
                println!(
                    "{}",
                    render::todo_line(
                        todo,
                        controller.assignee_email(todo).as_deref(),
                        controller.due_status(todo)
                    )
                );
            }
        }
        Command::Add { task, assign, due } => {
            controller.edit_task(task.join(" "));
            controller.set_assignee(assign);
            controller.set_due_date(due);

            let outcome = controller.submit().await?;
            println!(
                "Created {}",
                render::todo_line(&outcome.todo, None, controller.due_status(&outcome.todo))
            );
            match &outcome.notification {
                NotifyOutcome::Sent(_) => println!("Assignee notified."),
                NotifyOutcome::Failed(_) => print_warning(controller.warning()),
                NotifyOutcome::NotRequired => {}
            }
        }
        Command::Toggle { id } => {
            let todo = controller.toggle(id).await?;
            println!(
                "{}",
                render::todo_line(&todo, None, controller.due_status(&todo))
            );
        }
        Command::Delete { id } => {
            controller.delete(id).await?;
            println!("Deleted #{}.", id);
        }
        Command::Users => {
            controller.load_users().await?;
            for user in controller.users() {
                println!("{}", render::user_line(&user));
            }
        }
        Command::Watch => {}
    }
    Ok(())
}

async fn watch(backend: Arc<dyn Backend>, user_id: &str) -> anyhow::Result<()> {
    let feed = NotificationFeed::new(NotificationStore::new(backend));
    let mut updates = feed.updates();

    let started = feed.start(user_id).await;
    print_warning(feed.warning());

    let mut seen = HashSet::new();
    for notification in feed.visible().iter().rev() {
        println!("{}", render::notification_line(notification));
    }
    seen.extend(feed.notifications().iter().map(|n| n.id));

    // Without a subscription there is nothing to follow.
    started?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                for notification in snapshot.iter().rev().filter(|n| seen.insert(n.id)) {
                    println!("{}", render::notification_line(notification));
                }
                if !feed.is_subscribed() {
                    print_warning(feed.warning());
                    anyhow::bail!("notification subscription closed by the server");
                }
            }
        }
    }

    feed.stop();
    Ok(())
}

fn print_warning(warning: Option<String>) {
    if let Some(warning) = warning {
        eprintln!("warning: {}", warning);
    }
}
