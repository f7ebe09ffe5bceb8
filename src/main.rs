//! quickprompt demo - five button presses, answered by a simulated user
//!
//! # Overview
//!
//! Runs a headless session the way a real application would run a windowed
//! one:
//! - **Main thread**: the UI loop (initial layout, event processing)
//! - **Logic thread**: asks the same three-button prompt five times
//! - **User thread**: stands in for a person, pressing keys whenever the
//!   buttons become enabled
//!
//! # Execution Flow
//!
//! 1. Load `QuickPrompt Data/quickprompt.yaml` (plus `QUICKPROMPT_*` overrides)
//! 2. Initialize logging → logs/quickprompt.<date>
//! 3. Build the prompt in the initial layout
//! 4. Collect five answers with their reaction times
//! 5. Show a summary label on the UI thread and close the session

use anyhow::{Context, Result, anyhow};
use indexmap::IndexMap;
use quickprompt::ui::HeadlessProbe;
use quickprompt::{
    APP_NAME, ConfigManager, HeadlessToolkit, PlacementId, Prompt, PromptState, Session, VERSION,
    presets,
};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const ROUNDS: usize = 5;

fn main() -> Result<()> {
    let config_manager = ConfigManager::new("QuickPrompt Data")?;
    let config = config_manager.load()?;

    let _guard = quickprompt::logging::setup_logging(&config.logging)?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let toolkit = HeadlessToolkit::new();
    let probe = toolkit.probe();
    let session = Session::new(toolkit, config.session);

    // The layout runs on the UI thread; the prompt handle is handed to the
    // logic thread through this slot.
    let slot: Arc<Mutex<Option<Prompt<i32>>>> = Arc::new(Mutex::new(None));
    let layout_slot = Arc::clone(&slot);

    let responses = session.run(
        move |ui| {
            let buttons = IndexMap::from([
                ("1".to_string(), 1),
                ("2".to_string(), 2),
                ("3".to_string(), 3),
            ]);
            let keys = IndexMap::from([
                ('1', "1".to_string()),
                ('2', "2".to_string()),
                ('3', "3".to_string()),
            ]);
            let prompt = ui.add_prompt(presets::button_row("Press a button:", buttons, keys))?;
            if let Ok(mut slot) = layout_slot.lock() {
                *slot = Some(prompt);
            }
            Ok(())
        },
        move |handle| {
            let prompt = slot
                .lock()
                .map_err(|_| anyhow!("prompt slot poisoned"))?
                .take()
                .context("initial layout did not create the prompt")?;
            let user = spawn_simulated_user(probe, prompt.clone());

            let mut responses = Vec::with_capacity(ROUNDS);
            while responses.len() < ROUNDS {
                let response = prompt.ask()?;
                tracing::info!(
                    "User input: {} at {} ({:.3}s after presentation)",
                    response.value,
                    response.timestamp,
                    response.reaction_time()
                );
                responses.push(response);
            }

            let values: Vec<i32> = responses.iter().map(|r| r.value).collect();
            let summary = format!("Responses: {:?}", values);
            handle.run_on_ui_context(move |ui| {
                presets::label(ui, PlacementId::ROOT, summary)
            })??;

            if user.join().is_err() {
                tracing::warn!("Simulated user thread panicked");
            }
            handle.close()?;
            Ok(responses)
        },
    )?;

    for (round, response) in responses.iter().enumerate() {
        println!(
            "round {}: value={} reaction={:.3}s",
            round + 1,
            response.value,
            response.reaction_time()
        );
    }
    tracing::info!("Application shutdown complete");
    Ok(())
}

/// Press keys '1'..'3' in turn, once per round, whenever the prompt is
/// waiting for input.
fn spawn_simulated_user(probe: HeadlessProbe, prompt: Prompt<i32>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for (round, key) in ['1', '2', '3'].into_iter().cycle().take(ROUNDS).enumerate() {
            if !wait_for_open_round(&prompt, round as u64) {
                tracing::warn!("Simulated user gave up waiting for round {}", round);
                return;
            }
            thread::sleep(Duration::from_millis(50));
            if probe.press_key(key).is_err() {
                return;
            }
        }
    })
}

fn wait_for_open_round(prompt: &Prompt<i32>, round: u64) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if prompt.round() == round && prompt.state() == PromptState::Enabled {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}
