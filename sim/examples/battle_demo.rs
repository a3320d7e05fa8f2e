//! Small scripted battle on the streamed battlefield.
//!
//! Run with: cargo run --example battle_demo
//! Set RUST_LOG=vanguard_sim=debug for pool and streaming logs.

use tracing_subscriber::EnvFilter;
use vanguard_sim::{Faction, SimEvent, SimWorld, UnitKind};

const FRIENDLY_LINE: [UnitKind; 8] = [
    UnitKind::Knight,
    UnitKind::Knight,
    UnitKind::Militia,
    UnitKind::Militia,
    UnitKind::Archer,
    UnitKind::Pyromancer,
    UnitKind::Cryomancer,
    UnitKind::Stormcaller,
];

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vanguard_sim=info")))
        .init();

    println!("=== Vanguard - Battle Demo ===\n");

    let mut sim = SimWorld::new();
    let hostiles = sim.enter_region(0);
    println!("Entered region 0 with {} hostiles", hostiles);

    for (i, kind) in FRIENDLY_LINE.iter().enumerate() {
        let y = 40.0 + (i as f32) * 30.0;
        sim.spawn_unit(Faction::Friendly, *kind, 40.0, y, 1);
    }
    sim.spawn_unit(Faction::Friendly, UnitKind::Berserker, 60.0, 160.0, 2);

    let mut deaths = 0usize;
    let mut effects = 0usize;
    for second in 1..=20 {
        for _ in 0..30 {
            sim.step(1.0 / 30.0);
        }
        for event in sim.drain_events() {
            match event {
                SimEvent::UnitDied { .. } => deaths += 1,
                SimEvent::Explosion { .. }
                | SimEvent::Flash { .. }
                | SimEvent::Shockwave { .. }
                | SimEvent::Particles { .. } => effects += 1,
                _ => {}
            }
        }
        let summary = sim.summary();
        println!(
            "t={:>2}s tick={:>4} stage={} camera={:>7.1} friendly={:>2} hostile={:>2} deaths={} effects={}",
            second,
            summary.tick,
            summary.stage,
            summary.camera_x,
            summary.friendly,
            summary.hostile,
            deaths,
            effects,
        );
    }

    println!("\n=== Final summary ===\n");
    match vanguard_sim::systems::summary_to_json_string(&sim.summary()) {
        Ok(json) => println!("{}", json),
        Err(err) => eprintln!("failed to serialize summary: {}", err),
    }
}
