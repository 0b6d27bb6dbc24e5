//! chartstate walkthrough binary.
//!
//! Builds two panes, attaches them to a replication hub, and prints each
//! pane's entry order after every step: sharing, editing through a mirror,
//! undo/redo, and detaching.
//!
//! Usage:
//!   cargo run -p chartstate-demo
//!   cargo run -p chartstate-demo -- --config chartstate.ron --json
//!   RUST_LOG=chartstate_engine=trace cargo run -p chartstate-demo

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use chartstate_engine::{ChangeBatch, Container, EngineConfig, ReplicationHub};
use chartstate_types::{
    ChangeReason, ContainerId, EntrySpec, OptionsPatch, Reference, VisibilityScope,
};

/// Walk two chart panes through shared edits and history.
#[derive(Parser, Debug)]
#[command(name = "chartstate-demo")]
#[command(about = "Walkthrough of chartstate containers sharing entries")]
struct Args {
    /// Engine config (RON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print full entries as JSON instead of reference lists
    #[arg(long)]
    json: bool,

    /// Log every change batch a pane receives
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    tracing::debug!(?config, "engine config");

    let ds1 = ContainerId::from("ds1");
    let ds2 = ContainerId::from("ds2");

    let mut left = Container::with_config(ds1.clone(), config.clone());
    left.load([
        EntrySpec::new("e").with_id("e0").with_visibility(VisibilityScope::All),
        EntrySpec::new("e").with_id("e1"),
        EntrySpec::new("e")
            .with_id("e2")
            .with_visibility(VisibilityScope::only(["ds3"])),
    ])?;

    let mut right = Container::with_config(ds2.clone(), config);
    right.load([
        EntrySpec::new("e").with_id("e2"),
        EntrySpec::new("e")
            .with_id("e3")
            .with_visibility(VisibilityScope::only(["ds1"])),
    ])?;

    if args.verbose {
        for pane in [&mut left, &mut right] {
            let id = pane.id().clone();
            pane.subscribe(move |batch: &ChangeBatch| log_batch(&id, batch));
        }
    }

    let mut hub = ReplicationHub::new();
    hub.attach(left)?;
    hub.attach(right)?;
    print_panes(&hub, "attached", args.json)?;

    let line = hub.transact(&ds1, "draw line", |c| {
        c.add(
            EntrySpec::new("trend_line")
                .with_visibility(VisibilityScope::All)
                .with_prop("color", "orange"),
        )
    })?;
    print_panes(&hub, &format!("ds1 drew {line}"), args.json)?;

    let mirror = line.address_from(&ds1, &ds2);
    hub.transact(&ds2, "recolor", |c| {
        c.update(&mirror, &OptionsPatch::new().set("color", "teal"))
    })?;
    print_panes(&hub, &format!("ds2 recolored {mirror}"), args.json)?;

    hub.process_content(
        &ds1,
        std::slice::from_ref(&line),
        |e| e.render_state = Some(serde_json::json!({ "points": [[0, 1.0], [10, 2.5]] })),
        ChangeReason::DataInvalid,
    )?;
    print_panes(&hub, "content refreshed", args.json)?;

    hub.undo(&ds1)?;
    print_panes(&hub, "ds1 undo", args.json)?;
    hub.redo(&ds1)?;
    print_panes(&hub, "ds1 redo", args.json)?;

    let detached = hub.detach(&ds2)?;
    print_panes(&hub, "ds2 detached", args.json)?;
    println!("detached ds2: {}", render_refs(&detached.references()));

    Ok(())
}

fn log_batch(id: &ContainerId, batch: &ChangeBatch) {
    for (reason, entries) in batch.by_reason() {
        let refs: Vec<Reference> = entries.iter().map(|e| e.reference.clone()).collect();
        tracing::info!(
            container = %id,
            origin = ?batch.origin(),
            %reason,
            entries = %render_refs(&refs),
            "change"
        );
    }
}

fn print_panes(hub: &ReplicationHub, step: &str, json: bool) -> Result<()> {
    println!("== {step}");
    for id in hub.ids() {
        let Some(pane) = hub.container(id) else {
            continue;
        };
        if json {
            let entries: Vec<_> = pane.entries().collect();
            println!("{id}: {}", serde_json::to_string_pretty(&entries)?);
        } else {
            println!("{id}: {}", render_refs(&pane.references()));
        }
    }
    Ok(())
}

fn render_refs(refs: &[Reference]) -> String {
    let parts: Vec<String> = refs.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}
