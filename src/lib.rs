pub mod commands;
pub mod config;
pub mod notifications;
pub mod providers;
pub mod reconciler;
pub mod scheduler;
pub mod session;
pub mod storage;
pub mod tray;
pub mod usage;
pub mod view;

use std::process::ExitCode;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};

use commands::{Command, CommandHandle};
use config::{Cli, Command as CliCommand, Config};
use providers::http::ReqwestConnector;
use session::{Session, WorkerMessage};
use storage::{credentials, Credentials};
use tray::TrayStatus;
use view::ViewModel;

const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

pub fn run() -> ExitCode {
    let cli = Cli::parse_args();
    init_logging(cli.debug);

    let mut config = Config::default();
    config.merge_cli(&cli);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let code = match cli.command.unwrap_or(CliCommand::Watch { compact: false }) {
        CliCommand::Watch { compact } => runtime.block_on(watch_usage(config, compact)),
        CliCommand::Once { json } => runtime.block_on(once(config, json)),
        CliCommand::Import { cookie, file } => import(&config, &cookie, file),
        CliCommand::Forget => forget(&config),
    };
    // The stdin reader sits on a blocking thread that never returns by itself
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    code
}

fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn new_session(config: Config) -> (Session, mpsc::UnboundedReceiver<WorkerMessage>) {
    let source = credentials::source_for(&config);
    let connector = Box::new(ReqwestConnector::new(config.clone()));
    Session::new(config, source, connector)
}

/// Compact mode prints the tray label; on error the tooltip follows it so the
/// message stays visible
fn render(view: &ViewModel) -> String {
    if !view.compact_mode {
        return format!("{}\n[{}]", view.detail, view.status);
    }
    let status = TrayStatus::from_view(view);
    match status {
        TrayStatus::Error { .. } => format!("{}\n{}", status.label(), status.tooltip()),
        _ => status.label(),
    }
}

/// Terminal observer: prints each distinct view and forwards typed commands
async fn watch_usage(config: Config, compact: bool) -> ExitCode {
    let (mut session, messages) = new_session(config);
    session.set_compact_mode(compact);

    let (handle, commands) = CommandHandle::channel();
    let (views_tx, mut views) = watch::channel(ViewModel::default());
    let session_task = tokio::spawn(session.run(messages, commands, views_tx));

    spawn_input(handle.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.shutdown().await;
        }
    });

    let mut last = String::new();
    while views.changed().await.is_ok() {
        let rendered = render(&views.borrow_and_update());
        if rendered != last {
            println!("{}", rendered);
            last = rendered;
        }
    }

    match session_task.await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Session task failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn spawn_input(handle: CommandHandle) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match Command::from_input(&line) {
                Some(command) => {
                    if !handle.send(command).await {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => eprintln!("commands: r (refresh), c (compact), restart, q (quit)"),
            }
        }
    });
}

async fn once(config: Config, json: bool) -> ExitCode {
    let (session, messages) = new_session(config);
    let view = session.run_once(messages).await;

    if json {
        match serde_json::to_string_pretty(&view) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                log::error!("Failed to serialize view: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("{}", render(&view));
    }

    if view.error.is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn import(config: &Config, header: &str, to_file: bool) -> ExitCode {
    let cookies = Credentials::from_cookie_header(&config.cookie_domain, header);
    if cookies.is_empty() {
        log::error!("No cookies found in the given header");
        return ExitCode::FAILURE;
    }

    let result = if to_file {
        credentials::save_to_file(&config.cookie_file, &cookies)
    } else {
        credentials::save_to_keyring(&cookies)
    };

    match result {
        Ok(()) => {
            let store = if to_file {
                config.cookie_file.display().to_string()
            } else {
                "OS keychain".to_string()
            };
            log::info!("Stored {} cookies in {}", cookies.len(), store);
            #[cfg(target_os = "linux")]
            if !to_file {
                log::warn!("{}", config::LINUX_KEYRING_NOTE);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Failed to store cookies: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn forget(config: &Config) -> ExitCode {
    match credentials::forget(&config.cookie_file) {
        Ok(()) => {
            log::info!("Stored cookies removed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Failed to remove cookies: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_render_keeps_error_visible() {
        let view = ViewModel {
            error: Some("No organizations found".into()),
            compact_mode: true,
            ..ViewModel::default()
        };
        assert_eq!(
            render(&view),
            "⚠️ Error\nClaude Usage\n❌ No organizations found"
        );

        let view = ViewModel {
            compact_mode: true,
            ..ViewModel::default()
        };
        assert_eq!(render(&view), "Loading...");
    }
}
