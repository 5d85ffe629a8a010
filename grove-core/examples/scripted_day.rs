//! A day in the grove, played against a scripted oracle.
//!
//! Run with: `RUST_LOG=grove_core=debug cargo run -p grove-core --example scripted_day`
//!
//! Set `GROVE_LIVE=1` (and `ANTHROPIC_API_KEY`) to ask Claude instead.

use grove_core::inventory::{ItemDescriptor, Rarity};
use grove_core::oracle::{MuseGift, MuseGiftKind, QuestDraft};
use grove_core::quests::{QuestType, TaskCategory};
use grove_core::stats::{StatDelta, Stats};
use grove_core::world::Archetype;
use grove_core::{GroveConfig, GroveSession, ScriptedOracle};
use tracing_subscriber::EnvFilter;

fn scripted() -> ScriptedOracle {
    let oracle = ScriptedOracle::new()
        .with_backstory("You woke beneath the glass canopy with solder on your fingers. The moss remembers your name.")
        .with_quests(vec![
            QuestDraft {
                difficulty: 7.0,
                urgency: 8.0,
                ..QuestDraft::new("Protocol: Quarterly Report", QuestType::Boss, TaskCategory::Neutral)
            },
            QuestDraft::new("Sketch the Cover Art", QuestType::Side, TaskCategory::Creative),
        ])
        .with_guidance("Even the tallest cedar grew one ring at a time.");
    oracle.queue_loot(ItemDescriptor {
        name: "Ledger of Quiet Numbers".to_string(),
        description: "Columns that balance themselves while you breathe.".to_string(),
        rarity: Rarity::Rare,
        slot: None,
        stats: StatDelta::default().efficiency(6.0),
    });
    oracle.queue_binding(Stats::new(22.0, 12.0, 8.0, 1.1));
    oracle.queue_muse_gift(MuseGift::new(MuseGiftKind::Fragment, "A moth carries one letter of your name."));
    oracle
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = GroveConfig::new().with_character_name("Ivy");
    let mut session = if std::env::var("GROVE_LIVE").is_ok() {
        GroveSession::new(config)?
    } else {
        GroveSession::with_oracle(config, scripted())
    };

    session.create_character("Ivy", Archetype::Weaver).await;
    println!("{}", session.world().character.backstory.as_deref().unwrap_or_default());

    session.check_streak();
    session.capture_thought("The quarterly report is due and I also want to draw again");
    session.settle().await;

    let ids: Vec<_> = session.world().tasks.iter().map(|t| t.id).collect();
    for id in ids {
        if let Some(completion) = session.complete_task(id, true) {
            println!(
                "+{} xp, +{} mana, +{} energy ({} level(s))",
                completion.rewards.experience,
                completion.rewards.mana,
                completion.rewards.energy,
                completion.ledger.levels_gained
            );
        }
    }
    session.settle().await;

    if let Some(harp) = session.world().inventory.find_by_name("Crystal Harp").map(|i| i.id) {
        session.bind(harp, "Mechanical keyboard");
    }
    session.summon_muse();
    session.refresh_guidance();
    session.settle().await;

    let world = session.world();
    let c = &world.character;
    println!(
        "{} - level {} ({}/{} xp), vibration {}, mana {}, energy {}, streak {}",
        c.name, c.level, c.xp, c.next_level_xp, c.vibration, c.mana, c.energy, c.streak
    );
    println!("Stats: {}", world.effective_stats());
    for item in world.inventory.items() {
        println!("  {} [{:?}]", item.name, item.rarity);
    }
    if let Some(gift) = &world.muse_gift {
        println!("Muse: {}", gift.content);
    }
    println!("Guidance: {}", world.guidance);
    Ok(())
}
