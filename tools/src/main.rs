//! save-tool: headless save inspector and switch runner.
//!
//! Usage:
//!   save-tool inspect  --db saves.db [--slot main] [--config data/save_config.json]
//!   save-tool slots    --db saves.db
//!   save-tool migrate  --input legacy.json
//!   save-tool import   --db saves.db --input legacy.json
//!   save-tool delete   --db saves.db [--slot main]
//!   save-tool switch   --db saves.db --to B

mod headless;

use anyhow::{bail, Result};
use duet_core::{
    autosave::AutosaveScheduler,
    clock::SystemClock,
    config::SaveConfig,
    diagnostics::TracedSaves,
    event::{EventQueue, GameEvent},
    facade::{SaveAccess, SaveFacade},
    invariant::InvariantChecker,
    migration::SchemaMigrator,
    orchestrator::CharacterSwitchOrchestrator,
    progression::AreaProgression,
    save_data::{SaveData, CURRENT_VERSION},
    store::SqliteSaveStore,
    subsystem::{Collaborators, TaskSystem},
    switch_context::SwitchContext,
    types::RoleId,
};
use headless::{HeadlessTasks, HeadlessWorld, NoInteraction};
use std::cell::RefCell;
use std::env;
use std::rc::Rc;

/// Printed as one JSON line after `switch`, for scripted test runs.
#[derive(serde::Serialize)]
struct SwitchReport {
    from:      RoleId,
    requested: RoleId,
    active:    RoleId,
    committed: bool,
    outcome:   String,
    events:    Vec<GameEvent>,
    save_calls_during_switch: Vec<(u64, &'static str)>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let Some(command) = args.get(1).map(String::as_str) else {
        bail!("usage: save-tool <inspect|slots|migrate|import|delete|switch> [options]");
    };
    let db = flag(&args, "--db").unwrap_or("saves.db");
    let config_path = flag(&args, "--config").unwrap_or("./data/save_config.json");

    let mut config = SaveConfig::load(config_path)?;
    if let Some(slot) = flag(&args, "--slot") {
        config.slot_id = slot.to_string();
    }

    log::info!("save-tool {command} slot='{}' db={db}", config.slot_id);
    match command {
        "migrate" => {
            let input = required(&args, "--input")?;
            let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(input)?)?;
            let save = SchemaMigrator::new(config.default_areas.clone()).migrate(&raw, CURRENT_VERSION);
            println!("{}", serde_json::to_string_pretty(&save)?);
        }
        "slots" => {
            let store = SqliteSaveStore::open(db)?;
            for slot in store.slots()? {
                println!("{slot}");
            }
        }
        "inspect" => {
            let saves = open_facade(db, &config)?;
            println!("{}", serde_json::to_string_pretty(&saves.try_load_main()?)?);
        }
        "import" => {
            let input = required(&args, "--input")?;
            let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(input)?)?;
            let save = import(&open_facade(db, &config)?, &config, &raw)?;
            println!(
                "imported slot '{}' at v{} (stamped {}, last selected: {})",
                config.slot_id,
                save.version,
                format_timestamp(save.timestamp),
                save.last_selected_role.map(|r| r.as_str()).unwrap_or("none")
            );
        }
        "delete" => {
            open_facade(db, &config)?.delete_slot();
            println!("deleted slot '{}'", config.slot_id);
        }
        "switch" => {
            let target = required(&args, "--to")?;
            let Some(target) = RoleId::parse(target) else {
                bail!("unknown role '{target}' (expected A or B)");
            };
            run_switch(db, &config, target)?;
        }
        other => bail!("unknown command '{other}'"),
    }
    Ok(())
}

fn open_facade(db: &str, config: &SaveConfig) -> Result<SaveFacade> {
    let store = SqliteSaveStore::open(db)?;
    Ok(SaveFacade::new(Box::new(store), config))
}

/// Migrate an exported blob and store it in the configured slot.
fn import(saves: &dyn SaveAccess, config: &SaveConfig, raw: &serde_json::Value) -> Result<SaveData> {
    let mut save = SchemaMigrator::new(config.default_areas.clone()).migrate(raw, CURRENT_VERSION);
    save.slot_id = config.slot_id.clone();
    if !saves.write_main(&save) {
        bail!("could not write slot '{}'", config.slot_id);
    }
    Ok(saves.try_load_main()?)
}

fn run_switch(db: &str, config: &SaveConfig, target: RoleId) -> Result<()> {
    let context = Rc::new(SwitchContext::new());
    let traced = Rc::new(TracedSaves::new(open_facade(db, config)?, context.clone()));
    let saves: Rc<dyn SaveAccess> = traced.clone();
    let start = saves.load_or_create().last_selected_role.unwrap_or(config.initial_role);

    let tasks = Rc::new(RefCell::new(HeadlessTasks::load(saves.as_ref(), start)));
    let autosave = {
        let saves = saves.clone();
        let tasks = tasks.clone();
        AutosaveScheduler::new(
            config.autosave.clone(),
            Rc::new(SystemClock),
            start,
            Box::new(move |role| saves.set_inventory(role, &tasks.borrow().inventory())),
        )
    };
    let events = Rc::new(RefCell::new(EventQueue::new()));

    let systems = Collaborators {
        tasks:       Box::new(tasks.clone()),
        progression: Box::new(AreaProgression::new(saves.clone(), config)),
        interaction: Box::new(NoInteraction),
        autosave:    Box::new(autosave),
        world:       Box::new(HeadlessWorld::new(start)),
        events:      Box::new(events.clone()),
    };
    let orchestrator = CharacterSwitchOrchestrator::new(
        saves.clone(),
        context,
        InvariantChecker::new(config.invariant_policy),
        systems,
    );

    let outcome = orchestrator.switch_to(target);
    log::info!("switch {start} -> {target}: {outcome:?}");

    let report = SwitchReport {
        from:      start,
        requested: target,
        active:    tasks.borrow().current_role(),
        committed: outcome.is_committed(),
        outcome:   format!("{outcome:?}"),
        events:    events.borrow_mut().drain(),
        save_calls_during_switch: traced.calls_during_switch(),
    };
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

fn format_timestamp(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == name)
        .map(|w| w[1].as_str())
}

fn required<'a>(args: &'a [String], name: &str) -> Result<&'a str> {
    flag(args, name).ok_or_else(|| anyhow::anyhow!("missing {name}"))
}
