use color_eyre::Result;
use futures::StreamExt;
use sheetkeeper::auth::LocalVerifier;
use sheetkeeper::dice::ThreadDice;
use sheetkeeper::logging;
use sheetkeeper::preferences::FilePreferences;
use sheetkeeper::settings::Settings;
use sheetkeeper::shell::{Reply, Shell};
use sheetkeeper::store::{DocumentStore, FileStore, Snapshot, SnapshotStream};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

// Something the loop has to react to.
enum Event {
    Line(Option<String>),
    Snapshot(Option<Snapshot>),
}

// Next snapshot of the watched collection; never resolves while nothing is watched.
async fn next_snapshot(stream: &mut Option<SnapshotStream>) -> Option<Snapshot> {
    match stream {
        Some(stream) => stream.next().await,
        None => futures::future::pending().await,
    }
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let settings = Settings::load()?;
    logging::init(&settings.data_dir, settings.level_filter())?;
    log::info!("Starting with data in {}", settings.data_dir.display());

    let store: Arc<dyn DocumentStore> = Arc::new(FileStore::open(settings.store_dir())?);
    let prefs = FilePreferences::open(settings.preferences_file())?;
    let mut shell = Shell::new(
        store,
        Box::new(prefs),
        Box::new(LocalVerifier),
        settings,
        ThreadDice,
    );

    println!("sheetkeeper (theme: {}). Type `help` for commands.", shell.theme());
    run_shell(&mut shell).await?;
    log::info!("Shutting down");
    Ok(())
}

async fn run_shell(shell: &mut Shell) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut characters: Option<SnapshotStream> = None;
    prompt();

    loop {
        let event = tokio::select! {
            line = lines.next_line() => Event::Line(line?),
            snapshot = next_snapshot(&mut characters) => Event::Snapshot(snapshot),
        };

        match event {
            Event::Line(None) => break,
            Event::Line(Some(line)) => {
                if line.trim().is_empty() {
                    prompt();
                    continue;
                }
                match shell.handle_line(&line) {
                    Ok(Reply::Quit) => break,
                    Ok(Reply::Text(text)) => {
                        if !text.is_empty() {
                            println!("{text}");
                        }
                    }
                    Err(e) => {
                        log::warn!("Command failed: {e}");
                        println!("Error: {e}");
                    }
                }
                if let Some(stream) = shell.take_watch() {
                    characters = Some(stream);
                }
                if shell.session().is_none() {
                    characters = None;
                }
                prompt();
            }
            Event::Snapshot(Some(snapshot)) => shell.apply_snapshot(&snapshot),
            Event::Snapshot(None) => {
                log::warn!("Characters stream closed");
                characters = None;
            }
        }
    }
    Ok(())
}
