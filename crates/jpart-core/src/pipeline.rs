//! Drives a record source through the configured rules.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::cache::{ResourceCache, SharedCache, DEFAULT_CAPACITY};
use crate::config::PartitionConfig;
use crate::error::{PartitionError, Result};
use crate::filter::{FilterMappings, FilterRegistry};
use crate::rule::{Evaluation, Rule, SkipReason};

/// A progress line is logged every this many records.
pub const PROGRESS_INTERVAL: u64 = 100;

/// Per-rule counters for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleSummary {
    pub written: u64,
    pub skipped_not_found: u64,
    pub skipped_not_qualified: u64,
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Records read from the source.
    pub records: u64,
    /// Counters keyed by rule name.
    pub rules: BTreeMap<String, RuleSummary>,
}

impl RunSummary {
    /// Total records written across all rules.
    pub fn written(&self) -> u64 {
        self.rules.values().map(|r| r.written).sum()
    }

    fn rule_mut(&mut self, name: &str) -> &mut RuleSummary {
        self.rules.entry(name.to_string()).or_default()
    }
}

/// Build rules from `config` in the order they are declared.
pub fn build_rules(filters: &FilterMappings, config: &PartitionConfig, cache: Option<SharedCache>) -> Result<Vec<Rule>> {
    config
        .rules
        .iter()
        .map(|(name, parts)| Rule::new(filters, name.clone(), parts, cache.clone()))
        .collect()
}

/// Apply every rule to every record, writing records under `output_root`.
///
/// The first error ends the run: a failed write, a rule yielding a value
/// that can't name a file, or a record the source failed to produce.
pub fn apply_rules<I>(output_root: &Path, rules: &[Rule], records: I) -> Result<RunSummary>
where
    I: IntoIterator<Item = Result<Value>>,
{
    let mut summary = RunSummary::default();
    for rule in rules {
        summary.rule_mut(rule.name());
    }

    for record in records {
        let record = record?;
        summary.records += 1;

        for rule in rules {
            let evaluation = rule.apply(&record).map_err(|e| {
                error!(rule = %rule, "Could not evaluate record via rule: {}", e);
                e
            })?;

            match evaluation {
                Evaluation::Partition(values) => {
                    if let Err(e) = rule.write_record(output_root, rule.name(), &record, &values) {
                        error!(rule = %rule, "Could not write record via rule: {}", e);
                        return Err(e);
                    }
                    summary.rule_mut(rule.name()).written += 1;
                }
                Evaluation::Skip(skip) => {
                    debug!(
                        rule = %rule,
                        field = %skip.field,
                        reason = %skip.reason,
                        "Skipping rule for record"
                    );
                    let counters = summary.rule_mut(rule.name());
                    match skip.reason {
                        SkipReason::NotFound => counters.skipped_not_found += 1,
                        SkipReason::NotQualified => counters.skipped_not_qualified += 1,
                    }
                }
            }
        }

        if summary.records % PROGRESS_INTERVAL == 0 {
            info!("Processed ({}) records.", summary.records);
        }
    }

    Ok(summary)
}

/// Build the rules described by `config` and run them over `records`.
///
/// A cache opening files under `output_root` is created when none is
/// given. When `dispose_on_exit` is set the cache is disposed whether or not
/// the run succeeded; a run error takes precedence over a dispose error.
pub fn load_and_apply<I>(
    registry: &FilterRegistry,
    output_root: &Path,
    config: &PartitionConfig,
    records: I,
    cache: Option<SharedCache>,
    dispose_on_exit: bool,
) -> Result<RunSummary>
where
    I: IntoIterator<Item = Result<Value>>,
{
    let cache = match cache {
        Some(cache) => cache,
        None => ResourceCache::for_output_root(output_root, DEFAULT_CAPACITY)?.into_shared(),
    };

    let outcome = registry
        .resolve_mappings(&config.filter_mappings)
        .and_then(|filters| build_rules(&filters, config, Some(cache.clone())))
        .and_then(|rules| {
            info!("Applying {} rules", rules.len());
            apply_rules(output_root, &rules, records)
        });

    if !dispose_on_exit {
        return outcome;
    }

    let disposed = cache
        .lock()
        .map_err(|_| PartitionError::CachePoisoned)
        .and_then(|mut cache| cache.dispose());

    match (outcome, disposed) {
        (Ok(summary), Ok(_)) => Ok(summary),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(_)) => Err(e),
        (Err(e), Err(dispose_err)) => {
            warn!("Dispose after failed run also failed: {}", dispose_err);
            Err(e)
        }
    }
}
