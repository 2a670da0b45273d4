//! Per-group result caps and cross-group deduplication.
//!
//! Candidates arrive in pipeline (score) order with their group already
//! assigned. Groups are visited in priority order (configured groups first,
//! then unconfigured ones by first appearance) and each accepts up to its cap
//! until the overall limit is reached. Accepted candidates keep their
//! original relative order.

use crate::settings::SuggestConfig;
use crate::tokenizer::normalize;
use crate::types::Suggestion;
use indexmap::IndexMap;
use std::collections::HashSet;

/// Candidate positions bucketed by group, in first-appearance order.
fn partition(candidates: &[Suggestion]) -> IndexMap<&str, Vec<usize>> {
    let mut groups: IndexMap<&str, Vec<usize>> = IndexMap::new();
    for (pos, s) in candidates.iter().enumerate() {
        groups.entry(s.group.as_str()).or_default().push(pos);
    }
    groups
}

/// Drops candidates whose normalized phrase was already accepted by a group
/// earlier in `order`. Groups not named in `order` come after, in
/// first-appearance order. Candidates within one group are never deduplicated
/// against each other here.
pub fn dedup_across_groups(
    candidates: Vec<Suggestion>,
    order: &[String],
    locale: &str,
) -> Vec<Suggestion> {
    let groups = partition(&candidates);
    let ranked = order
        .iter()
        .filter_map(|name| groups.get(name.as_str()))
        .chain(
            groups
                .iter()
                .filter(|(name, _)| !order.iter().any(|o| o == *name))
                .map(|(_, positions)| positions),
        );

    let mut seen: HashSet<String> = HashSet::new();
    let mut keep = vec![false; candidates.len()];
    for positions in ranked {
        let mut accepted_here = Vec::new();
        for &pos in positions {
            let key = normalize(locale, &candidates[pos].phrase);
            if !seen.contains(&key) {
                keep[pos] = true;
                accepted_here.push(key);
            }
        }
        seen.extend(accepted_here);
    }

    candidates
        .into_iter()
        .zip(keep)
        .filter_map(|(s, k)| k.then_some(s))
        .collect()
}

/// Group caps, absolute or relative to the requested result count.
#[derive(Debug, Clone)]
pub enum GroupLimiter {
    /// Configured groups take at most their `limit`, every other group at most
    /// `default_limit`.
    CutOff {
        limits: Vec<(String, usize)>,
        default_limit: usize,
    },
    /// Groups take `round(share * limit)` slots.
    Share { shares: Vec<(String, f64)> },
}

impl GroupLimiter {
    pub fn from_config(config: &SuggestConfig) -> Self {
        if config.use_relative_share_limit {
            GroupLimiter::Share {
                shares: config
                    .group_config
                    .iter()
                    .filter_map(|g| g.share.map(|s| (g.group_name.clone(), s)))
                    .collect(),
            }
        } else {
            GroupLimiter::CutOff {
                limits: config
                    .group_config
                    .iter()
                    .map(|g| (g.group_name.clone(), g.limit))
                    .collect(),
                default_limit: config.default_group_limit(),
            }
        }
    }

    /// Cap for every group present in `groups`, in visiting order.
    fn caps(&self, groups: &IndexMap<&str, Vec<usize>>, limit: usize) -> Vec<(String, usize)> {
        match self {
            GroupLimiter::CutOff {
                limits,
                default_limit,
            } => {
                let mut caps: Vec<(String, usize)> = limits
                    .iter()
                    .filter(|(name, _)| groups.contains_key(name.as_str()))
                    .cloned()
                    .collect();
                for name in groups.keys() {
                    if !limits.iter().any(|(n, _)| n == name) {
                        caps.push((name.to_string(), *default_limit));
                    }
                }
                caps
            }
            GroupLimiter::Share { shares } => share_caps(shares, groups, limit),
        }
    }

    pub fn limit(&self, candidates: Vec<Suggestion>, limit: usize) -> Vec<Suggestion> {
        let relative = matches!(self, GroupLimiter::Share { .. });
        if relative && candidates.len() <= limit {
            return candidates;
        }
        let groups = partition(&candidates);
        let caps = self.caps(&groups, limit);

        let mut keep = vec![false; candidates.len()];
        let mut total = 0usize;
        'groups: for (name, cap) in &caps {
            let Some(positions) = groups.get(name.as_str()) else {
                continue;
            };
            for &pos in positions.iter().take(*cap) {
                if total == limit {
                    break 'groups;
                }
                keep[pos] = true;
                total += 1;
            }
        }

        // rounded shares may leave slots open; fill them in group priority order
        if relative {
            'fill: for (name, cap) in &caps {
                let Some(positions) = groups.get(name.as_str()) else {
                    continue;
                };
                for &pos in positions.iter().skip(*cap) {
                    if total == limit {
                        break 'fill;
                    }
                    keep[pos] = true;
                    total += 1;
                }
            }
        }

        candidates
            .into_iter()
            .zip(keep)
            .filter_map(|(s, k)| k.then_some(s))
            .collect()
    }
}

/// Relative caps. Unconfigured groups split the share left over by the
/// configured ones, or get the smallest configured share when nothing remains.
/// Shares are then normalized over the groups actually present and caps round
/// half away from zero.
fn share_caps(
    shares: &[(String, f64)],
    groups: &IndexMap<&str, Vec<usize>>,
    limit: usize,
) -> Vec<(String, usize)> {
    let configured: f64 = shares.iter().map(|(_, s)| *s).sum();
    let unconfigured: Vec<&str> = groups
        .keys()
        .copied()
        .filter(|name| !shares.iter().any(|(n, _)| n == name))
        .collect();
    let fallback = if configured < 1.0 {
        (1.0 - configured) / unconfigured.len().max(1) as f64
    } else {
        shares.iter().map(|(_, s)| *s).fold(1.0, f64::min)
    };

    let mut present: Vec<(String, f64)> = shares
        .iter()
        .filter(|(name, _)| groups.contains_key(name.as_str()))
        .cloned()
        .collect();
    present.extend(unconfigured.into_iter().map(|name| (name.to_string(), fallback)));

    let sum: f64 = present.iter().map(|(_, s)| *s).sum();
    let count = present.len() as f64;
    present
        .into_iter()
        .map(|(name, share)| {
            let share = if sum > 0.0 { share / sum } else { 1.0 / count };
            (name, (share * limit as f64).round() as usize)
        })
        .collect()
}
