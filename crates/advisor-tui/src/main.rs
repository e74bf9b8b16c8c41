use std::future::Future;

use anyhow::Result;
use tracing::{error, info, warn};

mod app;
mod handler;
mod logging;
mod tui;
mod ui;

use advisor_core::{Collaborators, Config, CredentialStore, Session};
use app::App;
use tui::EventHandler;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = logging::init() {
        eprintln!("Logging disabled: {:#}", e);
    }
    info!("starting cyber advisor v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env();
    let store = CredentialStore::new(config.credential_path.clone());
    let collaborators = Collaborators::system(&config)?;

    let mut session = Session::new(&config, store, collaborators);
    session.greet();
    if !session.has_credential() {
        warn!("no API key configured");
    }

    let mut app = App::new(session);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run(&mut terminal, &mut app).await;
    let restored = tui::restore();

    if app.session.workers_in_flight() > 0 {
        eprintln!("Waiting for background tasks to finish...");
    }
    let result = close(result, restored, app.session.shutdown()).await;

    if let Err(e) = &result {
        error!("advisor stopped with an error: {:#}", e);
    }
    result
}

/// Run the session shutdown whatever happened to the event loop or the
/// terminal, then report the first error
async fn close(
    result: Result<()>,
    restored: Result<()>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    if let Err(e) = &restored {
        error!("could not restore the terminal: {:#}", e);
    }
    shutdown.await;
    result.and(restored)
}

async fn run(terminal: &mut tui::Tui, app: &mut App) -> Result<()> {
    let mut events = EventHandler::new(tui::TICK_RATE);

    // A missing key is the first thing to fix
    if !app.session.has_credential() {
        app.open_api_key_dialog();
    }

    loop {
        terminal.draw(|frame| ui::render(app, frame))?;

        tokio::select! {
            Some(event) = events.next() => handler::handle_event(app, event)?,
            Some(event) = app.session.next_event() => app.apply_worker_event(event),
            else => break,
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
