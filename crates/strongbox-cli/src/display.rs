//! Display formatting for CLI output
//!
//! Provides structured display for:
//! - Routing rules grouped by partition and group repository
//! - Resolution paths and routing decisions
//! - Remote aliveness tables

use chrono::{DateTime, Utc};
use console::style;
use std::fmt::Write;

use strongbox_core::{RepositoryKey, RoutingRulesConfig};
use strongbox_repo::{AlivenessStatus, MemberDecision, ProbeOutcome, RoutingDecision};

/// Rules as an indented listing, accepted partition first
pub fn format_rules(rules: &RoutingRulesConfig) -> String {
    let mut out = String::new();
    for (title, rule_sets) in [("accepted", &rules.accepted), ("denied", &rules.denied)] {
        let _ = writeln!(out, "{}:", title);
        if rule_sets.is_empty() {
            let _ = writeln!(out, "  (none)");
            continue;
        }
        for rule_set in rule_sets {
            let _ = writeln!(out, "  {}:", rule_set.group_repository);
            for rule in &rule_set.rules {
                let _ = writeln!(out, "    {} -> {}", rule.pattern, rule.repositories.join(", "));
            }
        }
    }
    out
}

/// Numbered list of repositories in resolution order
pub fn format_resolution_path(path: &[RepositoryKey]) -> String {
    if path.is_empty() {
        return "  (no candidate repositories)\n".to_string();
    }
    path.iter()
        .enumerate()
        .map(|(i, key)| format!("  {}. {}\n", i + 1, key))
        .collect()
}

pub fn decision_label(decision: RoutingDecision) -> String {
    match decision {
        RoutingDecision::Denied => style("denied").red().to_string(),
        RoutingDecision::Accepted => style("accepted").green().to_string(),
        RoutingDecision::DefaultAccepted => style("accepted (default)").dim().to_string(),
    }
}

pub fn print_decisions(decisions: &[MemberDecision]) {
    for decision in decisions {
        println!("  {:<40} {}", decision.member.to_string(), decision_label(decision.decision));
    }
}

fn alive_label(alive: bool) -> String {
    if alive {
        style("UP").green().bold().to_string()
    } else {
        style("DOWN").red().bold().to_string()
    }
}

/// Results of a probe round
pub fn print_probe_outcomes(outcomes: &[ProbeOutcome]) {
    if outcomes.is_empty() {
        println!("No proxy repositories configured.");
        return;
    }

    println!("{:<30} {:<8} {:<6} URL", "REPOSITORY", "PROBE", "STATUS");
    println!("{}", "-".repeat(90));
    for outcome in outcomes {
        println!(
            "{:<30} {:<8} {:<6} {}",
            outcome.repository.to_string(),
            outcome.strategy,
            alive_label(outcome.alive),
            outcome.url
        );
    }
}

/// Current content of the aliveness cache
pub fn print_aliveness_table(statuses: &[AlivenessStatus]) {
    if statuses.is_empty() {
        println!("No remote repository has been checked yet.");
        return;
    }

    let now = Utc::now();
    println!("{:<6} {:<32} URL", "STATUS", "LAST CHECKED");
    println!("{}", "-".repeat(100));
    for status in statuses {
        println!(
            "{:<6} {:<32} {}",
            alive_label(status.alive),
            format_checked(status.last_checked, now),
            status.url
        );
    }
}

/// Timestamp with its age, e.g. `2026-10-18 09:30:00 (2m 5s ago)`
pub fn format_checked(checked: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - checked).num_seconds().max(0);
    let age = match secs {
        0..60 => format!("{}s", secs),
        60..3600 => format!("{}m {}s", secs / 60, secs % 60),
        _ => format!("{}h {}m", secs / 3600, (secs % 3600) / 60),
    };
    format!("{} ({} ago)", checked.format("%Y-%m-%d %H:%M:%S"), age)
}
