//! Rules command - show routing rules

use std::path::Path;

use strongbox_core::{RoutingRulesConfig, RuleSetConfig, WILDCARD_GROUP};

use crate::commands::load_configuration;
use crate::display::format_rules;
use crate::error::Result;

pub fn run(config_path: Option<&Path>, group: Option<&str>) -> Result<()> {
    let config = load_configuration(config_path)?;
    let rules = match group {
        Some(group) => owned_by(&config.routing_rules, group),
        None => config.routing_rules,
    };
    print!("{}", format_rules(&rules));
    Ok(())
}

/// Rule sets that apply to `group`: its own, or the wildcard ones when it has none
fn owned_by(rules: &RoutingRulesConfig, group: &str) -> RoutingRulesConfig {
    let pick = |sets: &[RuleSetConfig]| -> Vec<RuleSetConfig> {
        let own: Vec<RuleSetConfig> = sets
            .iter()
            .filter(|s| s.group_repository == group)
            .cloned()
            .collect();
        if !own.is_empty() {
            return own;
        }
        sets.iter()
            .filter(|s| s.group_repository == WILDCARD_GROUP)
            .cloned()
            .collect()
    };

    RoutingRulesConfig {
        accepted: pick(&rules.accepted),
        denied: pick(&rules.denied),
    }
}
