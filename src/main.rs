use std::cell::RefCell;
use std::io;
use std::path::PathBuf;
use std::process;
use std::rc::Rc;
use std::time::{Duration, SystemTime};

use anyhow::Context;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use dungeon::BasicZoneGenerator;
use error::handle_error;
use ratatui::backend::CrosstermBackend;
use save::FileStore;
use scopeguard::defer;
use tokio::task::LocalSet;

use tile_adventure::{
    actions::ActionManager,
    combat::BasicCombat,
    config::GameConfig,
    event_bus::GameEvent,
    input::{ConsoleInput, InputCoordinator, InputSource, KeyCommand},
    logging::setup_logging,
    renderer::TerminalRenderer,
    services::Services,
    state::GameStateManager,
    turn_system::TurnManager,
    world::GameWorld,
};

const FRAME: Duration = Duration::from_millis(16);

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("tile_adventure.json"));
    let config = GameConfig::load(&config_path).context("Failed to load configuration")?;
    setup_logging(&config.log_file)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("Failed to start runtime")?;
    LocalSet::new().block_on(&runtime, run(config))
}

async fn run(config: GameConfig) -> anyhow::Result<()> {
    let seed = config.seed.unwrap_or_else(|| {
        let time = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let pid = process::id();
        (time ^ (pid as u128)) as u64
    });

    let store = FileStore::new(&config.save.directory)?;
    let mut manager = GameStateManager::from_config(store, &config.save);
    let generator = BasicZoneGenerator::new(config.zone_width, config.zone_height);
    let (world, loaded) = manager.load_or_new(|| {
        tracing::info!(seed, "new game");
        GameWorld::new_game(seed, &generator)
    });
    let manager = Rc::new(RefCell::new(manager));

    enable_raw_mode().context("Failed to enable raw mode")?;
    defer! {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), DisableMouseCapture, LeaveAlternateScreen);
    }
    execute!(io::stdout(), EnterAlternateScreen, EnableMouseCapture)
        .context("Failed to enter alternate screen")?;

    let renderer = Rc::new(TerminalRenderer::new(CrosstermBackend::new(io::stdout()))?);
    let services = Services::builder(world)
        .config(config)
        .zones(Rc::new(generator))
        .combat(Rc::new(BasicCombat::new(seed)))
        .renderer(renderer.clone())
        .viewport(renderer)
        .build();
    let turns = TurnManager::new(services.clone());
    let input = InputCoordinator::new(ActionManager::new(services.clone(), turns));
    let _autosave = GameStateManager::attach_autosave(manager.clone(), &services);

    if loaded {
        let turn = services.world.borrow().turn;
        services.bus.publish(&GameEvent::GameLoaded { turn });
    }
    services.render();

    let mut console = ConsoleInput;
    loop {
        if let Some(event) = console.poll(Duration::ZERO)? {
            match input.handle_event(event) {
                Some(KeyCommand::Quit) => break,
                Some(KeyCommand::Save) => save_now(&manager, &services),
                _ => {}
            }
            services.render();
        }
        // lets queued enemy phases, paths and delayed taps run
        tokio::time::sleep(FRAME).await;
    }

    let alive = services.world.borrow().player.is_alive();
    if alive {
        save_now(&manager, &services);
    } else if let Err(err) = manager.borrow_mut().clear() {
        tracing::warn!(error = %err, "could not remove the save of a finished game");
    }
    Ok(())
}

fn save_now(manager: &RefCell<GameStateManager<FileStore>>, services: &Services) {
    let result = {
        let world = services.world.borrow();
        manager.borrow_mut().save(&world)
    };
    match result {
        Ok(last_saved) => {
            services.world.borrow_mut().log("Game saved.");
            services.bus.publish(&GameEvent::GameSaved { last_saved });
        }
        Err(err) => {
            tracing::error!(error = %err, "save failed");
            services
                .world
                .borrow_mut()
                .log(format!("Saving failed: {}", handle_error(&err)));
        }
    }
}
