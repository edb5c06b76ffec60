//! Groups command implementation.
//!
//! Lists the software groups a process can be classified into.

use crate::config::Config;

/// Lists targets and keyword groups, or classifies a single process.
pub fn command_groups(config: &Config, verbose: bool, classify: Option<String>) -> anyhow::Result<()> {
    let matcher = config.build_matcher()?;

    if let Some(input) = classify {
        // Anything containing a separator is treated as an executable path.
        let exe = (input.contains('\\') || input.contains('/')).then_some(input.as_str());
        let name = input.rsplit(['\\', '/']).next().unwrap_or(input.as_str());
        match matcher.classify(name, exe) {
            Some(m) => println!("✅ {} -> {} (key: {})", input, m.display_name, m.key),
            None => println!("➖ {} is not monitored", input),
        }
        return Ok(());
    }

    println!("📊 Herakles Software Monitor - Software Groups");
    println!("==============================================");

    println!("\n📂 Install directory targets (first prefix match wins)");
    println!("{}", "─".repeat(50));
    for target in matcher.targets() {
        println!("   ├─ {}", target);
    }

    println!("\n🏷️  Process name groups");
    println!("{}", "─".repeat(50));
    for group in matcher.name_groups() {
        if verbose {
            println!("   ├─ {}", group.name);
            for keyword in &group.keywords {
                println!("   │  ├─ 🔍 Matches: *{}*", keyword);
            }
        } else {
            println!("   ├─ {} ({} keywords)", group.name, group.keywords.len());
        }
    }

    println!(
        "\n📋 Total: {} targets, {} name groups",
        matcher.targets().len(),
        matcher.name_groups().len()
    );

    Ok(())
}
