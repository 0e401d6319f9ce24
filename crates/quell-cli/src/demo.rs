//! # quell demo
//!
//! A small scripted level whose third step hits a soft fault. Run it under
//! `quell run` to watch the session end while the shell survives, or on its
//! own to watch the same fault abort the process.

use anyhow::Result;
use console::style;
use quell_config::log_session_info;
use quell_fault::{soft_fault, ScriptScheduler, SessionBoundary, SessionOutcome};

struct Actor {
    name: &'static str,
    hp: u32,
}

/// Compiled helper called from script steps.
fn apply_damage(target: Option<&mut Actor>, amount: u32) {
    let Some(target) = target else {
        soft_fault!("apply_damage called without a target (amount {})", amount);
    };
    target.hp = target.hp.saturating_sub(amount);
    println!("script: {} takes {} damage", target.name, amount);
}

fn play_level(native: bool) {
    if native {
        println!("native: validating level data");
        soft_fault!("level data has no spawn point");
    }

    let mut player = Actor {
        name: "player",
        hp: 100,
    };

    let report = ScriptScheduler::new("level-1")
        .step("spawn-player", || println!("script: spawn player"))
        .step("hit-player", || apply_damage(Some(&mut player), 10))
        .step("hit-nobody", || apply_damage(None, 25))
        .step("award-loot", || println!("script: award loot"))
        .run();

    // Only reached when the fault did not end the session.
    println!(
        "script: dispatched {}, skipped {}",
        report.dispatched.len(),
        report.skipped.len()
    );
}

pub fn run_demo(native: bool, in_process: bool) -> Result<()> {
    if !in_process {
        play_level(native);
        return Ok(());
    }

    log_session_info!("Hosting demo session in process");
    match SessionBoundary::run("demo", || play_level(native)) {
        SessionOutcome::Completed(()) => {
            println!("{} session 'demo' completed", style("[shell]").dim());
        }
        SessionOutcome::Terminated(ended) => {
            println!(
                "{} session '{}' {} at {}: {}",
                style("[shell]").dim(),
                ended.session,
                style("terminated after a soft fault").yellow().bold(),
                ended.origin,
                ended.message
            );
        }
    }
    println!("{} shell still running", style("[shell]").dim());
    Ok(())
}
