//! Accept/deny routing rules for group repositories
//!
//! Rules are kept in two partitions, each mapping a group repository id to
//! its `RuleSet`. The `*` key applies to every group that has no rule set of
//! its own in that partition.
//!
//! Evaluation order:
//! 1. Deny: the group's deny rule set (or the wildcard one). A match rejects
//!    the member whatever the accept rules say.
//! 2. Accept: the group's accept rule set (or the wildcard one).
//! 3. Nothing matched: the member is accepted.
//!
//! Patterns are regular expressions matched against the whole artifact path.

use parking_lot::RwLock;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use strongbox_core::{RoutingRuleConfig, RoutingRulesConfig, RuleSetConfig, WILDCARD_GROUP};

use crate::error::{RepoError, Result};

/// Compile `pattern` so that it only matches whole paths
///
/// The pattern must be a valid regex on its own before it is anchored, so
/// that text like `a)|(?:b` cannot break out of the anchoring group.
pub(crate) fn full_match_regex(pattern: &str) -> Result<Regex> {
    let invalid = |e: regex::Error| RepoError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    };
    Regex::new(pattern).map_err(invalid)?;
    Regex::new(&format!("^(?:{})$", pattern)).map_err(invalid)
}

/// A compiled pattern applying to a set of member repositories
#[derive(Debug, Clone)]
pub struct RoutingRule {
    pattern: String,
    regex: Regex,
    repositories: BTreeSet<String>,
}

impl RoutingRule {
    /// Compile a rule; invalid patterns are rejected here, never at evaluation
    pub fn new<I, S>(pattern: &str, repositories: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let regex = full_match_regex(pattern)?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            repositories: repositories.into_iter().map(Into::into).collect(),
        })
    }

    pub fn from_config(config: &RoutingRuleConfig) -> Result<Self> {
        Self::new(&config.pattern, config.repositories.iter().cloned())
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn repositories(&self) -> impl Iterator<Item = &str> {
        self.repositories.iter().map(String::as_str)
    }

    /// True when `candidate` is listed and `path` matches the pattern
    pub fn matches(&self, candidate: &str, path: &str) -> bool {
        self.repositories.contains(candidate) && self.regex.is_match(path)
    }

    fn to_config(&self) -> RoutingRuleConfig {
        RoutingRuleConfig::new(self.pattern.clone(), self.repositories.iter().cloned())
    }
}

impl PartialEq for RoutingRule {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && self.repositories == other.repositories
    }
}

impl Eq for RoutingRule {}

/// Rules owned by one group repository; matching is OR'ed across rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    group_repository: String,
    rules: Vec<RoutingRule>,
}

impl RuleSet {
    pub fn new(group_repository: impl Into<String>) -> Self {
        Self {
            group_repository: group_repository.into(),
            rules: Vec::new(),
        }
    }

    pub fn from_config(config: &RuleSetConfig) -> Result<Self> {
        let mut rule_set = Self::new(config.group_repository.clone());
        for rule in &config.rules {
            rule_set.push(RoutingRule::from_config(rule)?);
        }
        Ok(rule_set)
    }

    pub fn with_rule(mut self, rule: RoutingRule) -> Self {
        self.push(rule);
        self
    }

    pub fn group_repository(&self) -> &str {
        &self.group_repository
    }

    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Add a rule, ignoring exact duplicates
    pub fn push(&mut self, rule: RoutingRule) {
        if !self.rules.contains(&rule) {
            self.rules.push(rule);
        }
    }

    /// Remove every rule with this pattern, returning how many were removed
    pub fn remove_pattern(&mut self, pattern: &str) -> usize {
        let before = self.rules.len();
        self.rules.retain(|r| r.pattern != pattern);
        before - self.rules.len()
    }

    pub fn matches(&self, candidate: &str, path: &str) -> bool {
        self.rules.iter().any(|r| r.matches(candidate, path))
    }

    fn to_config(&self) -> RuleSetConfig {
        RuleSetConfig {
            group_repository: self.group_repository.clone(),
            rules: self.rules.iter().map(RoutingRule::to_config).collect(),
        }
    }
}

/// Accepted or denied partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RulePartition {
    Accepted,
    Denied,
}

impl std::fmt::Display for RulePartition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::Denied => write!(f, "denied"),
        }
    }
}

/// Immutable view of all rule sets
#[derive(Debug, Clone, Default)]
pub struct RoutingRules {
    accepted: HashMap<String, Arc<RuleSet>>,
    denied: HashMap<String, Arc<RuleSet>>,
}

impl RoutingRules {
    /// Compile the rules of a configuration file
    pub fn from_config(config: &RoutingRulesConfig) -> Result<Self> {
        let mut rules = Self::default();
        for (partition, rule_sets) in [
            (RulePartition::Accepted, &config.accepted),
            (RulePartition::Denied, &config.denied),
        ] {
            for rule_set in rule_sets {
                let compiled = RuleSet::from_config(rule_set)?;
                rules
                    .partition_mut(partition)
                    .insert(compiled.group_repository.clone(), Arc::new(compiled));
            }
        }
        Ok(rules)
    }

    fn partition(&self, partition: RulePartition) -> &HashMap<String, Arc<RuleSet>> {
        match partition {
            RulePartition::Accepted => &self.accepted,
            RulePartition::Denied => &self.denied,
        }
    }

    fn partition_mut(&mut self, partition: RulePartition) -> &mut HashMap<String, Arc<RuleSet>> {
        match partition {
            RulePartition::Accepted => &mut self.accepted,
            RulePartition::Denied => &mut self.denied,
        }
    }

    /// Rule set registered under exactly this key
    pub fn rule_set(&self, partition: RulePartition, group: &str) -> Option<&RuleSet> {
        self.partition(partition).get(group).map(AsRef::as_ref)
    }

    /// Rule set applying to `group`: its own, else the wildcard one
    pub fn effective(&self, partition: RulePartition, group: &str) -> Option<&RuleSet> {
        self.rule_set(partition, group)
            .or_else(|| self.rule_set(partition, WILDCARD_GROUP))
    }

    /// Serializable form, wildcard first then groups in name order
    pub fn to_config(&self) -> RoutingRulesConfig {
        let sorted = |map: &HashMap<String, Arc<RuleSet>>| {
            let mut sets: Vec<RuleSetConfig> = map.values().map(|s| s.to_config()).collect();
            sets.sort_by(|a, b| {
                (a.group_repository != WILDCARD_GROUP, &a.group_repository)
                    .cmp(&(b.group_repository != WILDCARD_GROUP, &b.group_repository))
            });
            sets
        };
        RoutingRulesConfig {
            accepted: sorted(&self.accepted),
            denied: sorted(&self.denied),
        }
    }
}

/// Outcome of evaluating one member for one path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingDecision {
    /// A deny rule matched
    Denied,
    /// An accept rule matched
    Accepted,
    /// No rule matched
    DefaultAccepted,
}

impl RoutingDecision {
    pub fn is_permitted(self) -> bool {
        !matches!(self, RoutingDecision::Denied)
    }
}

/// Shared routing rules with atomic administrative updates
///
/// Readers take an `Arc` snapshot; writers build a modified copy and swap it
/// in, so a reader never sees a half-updated rule set.
#[derive(Debug, Default)]
pub struct RoutingRulesEngine {
    rules: RwLock<Arc<RoutingRules>>,
}

impl RoutingRulesEngine {
    pub fn new(rules: RoutingRules) -> Self {
        Self {
            rules: RwLock::new(Arc::new(rules)),
        }
    }

    pub fn from_config(config: &RoutingRulesConfig) -> Result<Self> {
        Ok(Self::new(RoutingRules::from_config(config)?))
    }

    /// Current rules
    pub fn snapshot(&self) -> Arc<RoutingRules> {
        self.rules.read().clone()
    }

    pub fn is_denied(&self, group: &str, candidate: &str, path: &str) -> bool {
        self.snapshot()
            .effective(RulePartition::Denied, group)
            .is_some_and(|set| set.matches(candidate, path))
    }

    /// False only when a deny rule matches
    pub fn is_accepted(&self, group: &str, candidate: &str, path: &str) -> bool {
        self.evaluate(group, candidate, path).is_permitted()
    }

    pub fn evaluate(&self, group: &str, candidate: &str, path: &str) -> RoutingDecision {
        let rules = self.snapshot();

        let matches = |partition| {
            rules
                .effective(partition, group)
                .is_some_and(|set| set.matches(candidate, path))
        };

        if matches(RulePartition::Denied) {
            RoutingDecision::Denied
        } else if matches(RulePartition::Accepted) {
            RoutingDecision::Accepted
        } else {
            RoutingDecision::DefaultAccepted
        }
    }

    fn update<T>(&self, change: impl FnOnce(&mut RoutingRules) -> T) -> T {
        let mut guard = self.rules.write();
        let mut next = RoutingRules::clone(&guard);
        let result = change(&mut next);
        *guard = Arc::new(next);
        result
    }

    /// Add a rule to a group's rule set, creating the set if needed
    pub fn add_rule(&self, partition: RulePartition, group: &str, rule: RoutingRule) {
        tracing::info!(
            %partition,
            group,
            pattern = rule.pattern(),
            "Adding routing rule"
        );
        self.update(|rules| {
            let set = rules
                .partition_mut(partition)
                .entry(group.to_string())
                .or_insert_with(|| Arc::new(RuleSet::new(group)));
            Arc::make_mut(set).push(rule);
        });
    }

    pub fn add_accepted<I, S>(&self, group: &str, pattern: &str, repositories: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rule = RoutingRule::new(pattern, repositories)?;
        self.add_rule(RulePartition::Accepted, group, rule);
        Ok(())
    }

    pub fn add_denied<I, S>(&self, group: &str, pattern: &str, repositories: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rule = RoutingRule::new(pattern, repositories)?;
        self.add_rule(RulePartition::Denied, group, rule);
        Ok(())
    }

    /// Remove the rules with `pattern` from a group's rule set
    ///
    /// A rule set left empty is dropped so the wildcard applies again.
    pub fn remove_rule(&self, partition: RulePartition, group: &str, pattern: &str) -> bool {
        let removed = self.update(|rules| {
            let map = rules.partition_mut(partition);
            let Some(set) = map.get_mut(group) else {
                return 0;
            };
            let removed = Arc::make_mut(set).remove_pattern(pattern);
            if set.is_empty() {
                map.remove(group);
            }
            removed
        });
        if removed > 0 {
            tracing::info!(%partition, group, pattern, removed, "Removed routing rule");
        }
        removed > 0
    }

    pub fn remove_accepted(&self, group: &str, pattern: &str) -> bool {
        self.remove_rule(RulePartition::Accepted, group, pattern)
    }

    pub fn remove_denied(&self, group: &str, pattern: &str) -> bool {
        self.remove_rule(RulePartition::Denied, group, pattern)
    }

    /// Install a whole rule set, replacing any set for the same group
    pub fn set_rule_set(&self, partition: RulePartition, rule_set: RuleSet) {
        self.update(|rules| {
            rules
                .partition_mut(partition)
                .insert(rule_set.group_repository.clone(), Arc::new(rule_set));
        });
    }

    pub fn remove_rule_set(&self, partition: RulePartition, group: &str) -> Option<RuleSet> {
        self.update(|rules| rules.partition_mut(partition).remove(group))
            .map(Arc::unwrap_or_clone)
    }

    /// Swap in a freshly loaded set of rules
    pub fn replace_all(&self, rules: RoutingRules) {
        *self.rules.write() = Arc::new(rules);
    }
}
