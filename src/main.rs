mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use cli::{Cli, Commands, OperatorCommand};
use uid_watch::audio::TerminalAudio;
use uid_watch::config::WatchConfig;
use uid_watch::controller::{self, ControllerHandle, Platform};
use uid_watch::notification::ConsoleNotifier;
use uid_watch::output::{StatusReport, describe_state, print_status};
use uid_watch::store::file_kv::state_path;
use uid_watch::store::{FileDocumentStore, FileKeyValueStore};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    uid_watch::telemetry::init(cli.verbose);

    match cli.command {
        Commands::Watch { path, no_sound } => run_watch(&path, !no_sound).await?,
        Commands::Status { path, json } => {
            let config = WatchConfig::load(&path);
            let document = config.document_path();
            let snapshot = FileDocumentStore::new(&path).read(&document)?;
            let report = StatusReport::new(
                document.to_string(),
                snapshot.identifiers(&config.field),
                &config.valid_marker,
            );
            print_status(&report, json);
        }
    }

    Ok(())
}

async fn run_watch(root: &Path, sound: bool) -> Result<()> {
    let config = WatchConfig::load(root);
    let documents = FileDocumentStore::new(root);
    let notifier = Arc::new(ConsoleNotifier::new(config.notifications));
    let platform = Platform {
        storage: Box::new(FileKeyValueStore::open(state_path(root))),
        notifier: notifier.clone(),
        audio: Box::new(TerminalAudio),
    };

    let (handle, task) = controller::spawn(&config, &documents, platform)?;
    if !sound {
        handle.toggle_sound_enabled()?;
    }
    println!(
        "Watching {} in {}",
        config.document_path(),
        documents.document_file(&config.document_path()).display()
    );

    let mut states = handle.subscribe_state();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match OperatorCommand::parse(&line) {
                    Some(OperatorCommand::Quit) => break,
                    Some(command) => dispatch(&handle, &notifier, &config, command).await?,
                    None => eprintln!("unknown command: {}", line.trim()),
                }
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                info!(state = %describe_state(&state, &config.valid_marker), "state changed");
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.shutdown();
    task.await?;
    Ok(())
}

async fn dispatch(
    handle: &ControllerHandle,
    notifier: &ConsoleNotifier,
    config: &WatchConfig,
    command: OperatorCommand,
) -> Result<()> {
    match command {
        OperatorCommand::TestSound => handle.test_sound()?,
        OperatorCommand::StopSound => handle.stop_sound()?,
        OperatorCommand::ToggleSound => handle.toggle_sound_enabled()?,
        OperatorCommand::ToggleBackground => match handle.toggle_background_mode().await {
            Ok(true) => println!("Background mode enabled"),
            Ok(false) => println!("Background mode disabled"),
            Err(err) => {
                warn!(%err, "background mode unchanged");
                println!("Background mode unavailable: {err}");
            }
        },
        OperatorCommand::Dismiss => handle.dismiss_alert()?,
        OperatorCommand::OpenDetail => handle.open_detail()?,
        OperatorCommand::CloseDetail => handle.close_detail()?,
        OperatorCommand::ClickNotification => {
            if !notifier.click_latest() {
                println!("No open notification");
            }
        }
        OperatorCommand::Status => {
            println!("{}", describe_state(&handle.state(), &config.valid_marker));
        }
        OperatorCommand::Quit => {}
    }
    Ok(())
}
