//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::EngineConfig;
use tracing::info;

use super::load_config;
use crate::cli::InfoArgs;

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let config = load_config(&args.config)?;

    if args.json {
        let json = config_loader::ConfigLoader::to_json(&config)
            .context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config);
    }

    Ok(())
}

fn print_config_info(config: &EngineConfig) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                SOS Engine Configuration                      ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let shake = &config.shake;
    println!("📳 Shake Detection");
    println!("   ├─ Threshold: {} m/s²", shake.threshold);
    println!("   ├─ Required shakes: {}", shake.required_shakes);
    println!("   ├─ Minimum gap: {}ms", shake.inter_shake_min_gap_ms);
    println!("   └─ Reset after: {}ms", shake.reset_timeout_ms);

    let countdown = &config.countdown;
    println!("\n⏱️  Countdown");
    println!("   ├─ Seconds: {}", countdown.seconds);
    println!("   └─ Tick: {}ms", countdown.tick_ms);

    let cache = &config.cache;
    println!("\n🗄️  Directory Cache");
    println!("   ├─ Classification TTL: {}s", cache.classification_ttl_secs);
    println!("   ├─ Contacts TTL: {}s", cache.contacts_ttl_secs);
    println!("   ├─ Profile TTL: {}s", cache.profile_ttl_secs);
    println!("   ├─ Capacity: {}", cache.capacity);
    println!("   └─ Lookup timeout: {}ms", cache.lookup_timeout_ms);

    let location = &config.location;
    println!("\n📍 Location");
    println!("   ├─ Timeout: {}ms", location.timeout_ms);
    println!("   ├─ Max fix age: {}ms", location.max_age_ms);
    println!("   ├─ High accuracy: {}", location.high_accuracy);
    println!(
        "   ├─ Geocode: {} attempt(s), {}ms each, {}ms back-off",
        location.geocode_retries, location.geocode_timeout_ms, location.geocode_backoff_ms
    );
    println!("   └─ Address cache TTL: {}s", location.geocode_cache_ttl_secs);

    println!("\n👤 Fallback identity: {}", config.fallback_identity);
    println!();
}
