//! Deterministic conflict resolution for overlapping spans
//!
//! Spans are nodes of a conflict graph; each connected cluster keeps exactly
//! one winner. Losers are dropped, never merged.

use pii_types::{BlockAddress, Origin, Span};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::error::ConfigError;

/// Range relation that makes two spans conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapMode {
    /// Identical start and end
    Exact,
    /// One range contains the other
    Contain,
    #[default]
    AnyOverlap,
}

impl FromStr for OverlapMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(OverlapMode::Exact),
            "contain" => Ok(OverlapMode::Contain),
            "any_overlap" => Ok(OverlapMode::AnyOverlap),
            other => Err(ConfigError::UnknownToken {
                option: "overlap",
                token: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for OverlapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OverlapMode::Exact => "exact",
            OverlapMode::Contain => "contain",
            OverlapMode::AnyOverlap => "any_overlap",
        })
    }
}

/// Whether conflicts require the same entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityScope {
    #[default]
    Same,
    Any,
}

impl FromStr for EntityScope {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "same" => Ok(EntityScope::Same),
            "any" => Ok(EntityScope::Any),
            other => Err(ConfigError::UnknownToken {
                option: "entity overlap mode",
                token: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthPreference {
    #[default]
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionPreference {
    #[default]
    First,
    Last,
}

/// Tie-break chain and conflict definition for `duplicate-process`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DedupPolicy {
    /// Best first; origins not listed rank after listed ones
    pub origin_priority: Vec<Origin>,
    pub length: LengthPreference,
    /// Best first; entities not listed rank after listed ones
    pub entity_priority: Vec<String>,
    pub position: PositionPreference,
    pub overlap: OverlapMode,
    pub entity_scope: EntityScope,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self {
            origin_priority: vec![Origin::Manual, Origin::Added, Origin::Model],
            length: LengthPreference::default(),
            entity_priority: Vec::new(),
            position: PositionPreference::default(),
            overlap: OverlapMode::default(),
            entity_scope: EntityScope::default(),
        }
    }
}

impl DedupPolicy {
    /// Apply a `--keep` list such as `manual,added,model,long,first`
    ///
    /// Origin tokens set the origin priority in the order given (origins
    /// left out keep their default relative order after them). `long`/`short`
    /// and `first`/`last` set the length and position preferences.
    pub fn apply_keep(&mut self, keep: &str) -> Result<(), ConfigError> {
        let mut origins: Vec<Origin> = Vec::new();
        let mut length = None;
        let mut position = None;

        for token in keep.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token {
                "long" | "short" => {
                    let pref = if token == "long" {
                        LengthPreference::Long
                    } else {
                        LengthPreference::Short
                    };
                    if length.replace(pref).is_some_and(|prev| prev != pref) {
                        return Err(ConfigError::Invalid(
                            "--keep lists both long and short".into(),
                        ));
                    }
                }
                "first" | "last" => {
                    let pref = if token == "first" {
                        PositionPreference::First
                    } else {
                        PositionPreference::Last
                    };
                    if position.replace(pref).is_some_and(|prev| prev != pref) {
                        return Err(ConfigError::Invalid(
                            "--keep lists both first and last".into(),
                        ));
                    }
                }
                other => {
                    let origin: Origin = other.parse().map_err(|_| ConfigError::UnknownToken {
                        option: "keep",
                        token: other.to_string(),
                    })?;
                    if origins.contains(&origin) {
                        return Err(ConfigError::Invalid(format!(
                            "--keep lists origin '{}' twice",
                            origin
                        )));
                    }
                    origins.push(origin);
                }
            }
        }

        if !origins.is_empty() {
            for origin in Origin::ALL {
                if !origins.contains(&origin) {
                    origins.push(origin);
                }
            }
            self.origin_priority = origins;
        }
        if let Some(length) = length {
            self.length = length;
        }
        if let Some(position) = position {
            self.position = position;
        }
        Ok(())
    }

    /// Set the entity priority from a comma-separated list
    pub fn apply_entity_priority(&mut self, csv: &str) -> Result<(), ConfigError> {
        self.entity_priority = csv
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect();
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, origin) in self.origin_priority.iter().enumerate() {
            if self.origin_priority[..i].contains(origin) {
                return Err(ConfigError::Invalid(format!(
                    "origin '{}' appears twice in the origin priority",
                    origin
                )));
            }
        }
        for (i, entity) in self.entity_priority.iter().enumerate() {
            if self.entity_priority[..i].contains(entity) {
                return Err(ConfigError::Invalid(format!(
                    "entity '{}' appears twice in the entity priority",
                    entity
                )));
            }
        }
        Ok(())
    }
}

/// Prunes conflicting spans down to one winner per conflict cluster
pub struct DeduplicationEngine {
    policy: DedupPolicy,
}

impl DeduplicationEngine {
    pub fn new(policy: DedupPolicy) -> Result<Self, ConfigError> {
        policy.validate()?;
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &DedupPolicy {
        &self.policy
    }

    /// Whether two spans conflict under the policy
    pub fn conflicts(&self, a: &Span, b: &Span) -> bool {
        if a.block() != b.block() {
            return false;
        }
        if self.policy.entity_scope == EntityScope::Same && a.entity != b.entity {
            return false;
        }
        let (a0, a1) = (a.start.offset, a.end.offset);
        let (b0, b1) = (b.start.offset, b.end.offset);
        match self.policy.overlap {
            OverlapMode::Exact => a0 == b0 && a1 == b1,
            OverlapMode::Contain => (a0 <= b0 && b1 <= a1) || (b0 <= a0 && a1 <= b1),
            OverlapMode::AnyOverlap => a0 < b1 && b0 < a1,
        }
    }

    fn origin_rank(&self, origin: Origin) -> usize {
        self.policy
            .origin_priority
            .iter()
            .position(|o| *o == origin)
            .unwrap_or(self.policy.origin_priority.len())
    }

    fn entity_rank(&self, entity: &str) -> usize {
        self.policy
            .entity_priority
            .iter()
            .position(|e| e == entity)
            .unwrap_or(self.policy.entity_priority.len())
    }

    /// `Less` means `a` beats `b`
    fn compare(&self, (ia, a): (usize, &Span), (ib, b): (usize, &Span)) -> Ordering {
        self.origin_rank(a.origin)
            .cmp(&self.origin_rank(b.origin))
            .then_with(|| match self.policy.length {
                LengthPreference::Long => b.len().cmp(&a.len()),
                LengthPreference::Short => a.len().cmp(&b.len()),
            })
            .then_with(|| self.entity_rank(&a.entity).cmp(&self.entity_rank(&b.entity)))
            .then_with(|| match self.policy.position {
                PositionPreference::First => a.start.offset.cmp(&b.start.offset),
                PositionPreference::Last => b.start.offset.cmp(&a.start.offset),
            })
            .then_with(|| ia.cmp(&ib))
    }

    /// Keep one winner per conflict cluster, in input order
    pub fn run(&self, spans: Vec<Span>) -> Vec<Span> {
        let mut by_block: BTreeMap<BlockAddress, Vec<usize>> = BTreeMap::new();
        for (i, span) in spans.iter().enumerate() {
            by_block.entry(span.block()).or_default().push(i);
        }

        let mut clusters = UnionFind::new(spans.len());
        for members in by_block.values() {
            for (n, &i) in members.iter().enumerate() {
                for &j in &members[n + 1..] {
                    if self.conflicts(&spans[i], &spans[j]) {
                        clusters.union(i, j);
                    }
                }
            }
        }

        let mut winners: BTreeMap<usize, usize> = BTreeMap::new();
        for i in 0..spans.len() {
            let root = clusters.find(i);
            let best = winners.entry(root).or_insert(i);
            if self.compare((i, &spans[i]), (*best, &spans[*best])) == Ordering::Less {
                *best = i;
            }
        }

        let mut keep = vec![false; spans.len()];
        for &winner in winners.values() {
            keep[winner] = true;
        }
        let total = spans.len();
        let kept: Vec<Span> = spans
            .into_iter()
            .zip(keep)
            .filter_map(|(span, keep)| keep.then_some(span))
            .collect();
        debug!(
            input = total,
            kept = kept.len(),
            overlap = %self.policy.overlap,
            "deduplicated spans"
        );
        kept
    }
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Lower index as root keeps clusters stable
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[child] = root;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn span(block: u32, start: usize, end: usize, entity: &str, origin: Origin) -> Span {
        let word = "x".repeat(end - start);
        Span::new(BlockAddress::new(0, block), start, end, entity, &word, origin)
    }

    fn engine(policy: DedupPolicy) -> DeduplicationEngine {
        DeduplicationEngine::new(policy).unwrap()
    }

    #[test]
    fn test_manual_beats_model_on_identical_range() {
        let policy = DedupPolicy {
            overlap: OverlapMode::Exact,
            entity_scope: EntityScope::Same,
            ..Default::default()
        };
        let model = span(0, 0, 4, "PERSON", Origin::Model);
        let manual = span(0, 0, 4, "PERSON", Origin::Manual);
        let kept = engine(policy).run(vec![model, manual.clone()]);
        assert_eq!(kept, vec![manual]);
    }

    #[test]
    fn test_different_blocks_never_conflict() {
        let a = span(0, 0, 4, "PERSON", Origin::Model);
        let b = span(1, 0, 4, "PERSON", Origin::Model);
        let kept = engine(DedupPolicy::default()).run(vec![a, b]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_entity_scope() {
        let a = span(0, 0, 4, "PERSON", Origin::Model);
        let b = span(0, 2, 6, "LOCATION", Origin::Model);
        assert_eq!(engine(DedupPolicy::default()).run(vec![a.clone(), b.clone()]).len(), 2);

        let any = DedupPolicy {
            entity_scope: EntityScope::Any,
            ..Default::default()
        };
        assert_eq!(engine(any).run(vec![a.clone(), b]), vec![a]);
    }

    #[test]
    fn test_overlap_modes() {
        let outer = span(0, 0, 10, "X", Origin::Model);
        let inner = span(0, 2, 5, "X", Origin::Model);
        let crossing = span(0, 8, 12, "X", Origin::Model);
        let e = |overlap| engine(DedupPolicy { overlap, ..Default::default() });

        assert!(!e(OverlapMode::Exact).conflicts(&outer, &inner));
        assert!(e(OverlapMode::Contain).conflicts(&outer, &inner));
        assert!(!e(OverlapMode::Contain).conflicts(&outer, &crossing));
        assert!(e(OverlapMode::AnyOverlap).conflicts(&outer, &crossing));
        // Touching ranges do not overlap
        let touching = span(0, 10, 12, "X", Origin::Model);
        assert!(!e(OverlapMode::AnyOverlap).conflicts(&outer, &touching));
    }

    #[test]
    fn test_tie_break_chain() {
        let short = span(0, 0, 3, "X", Origin::Model);
        let long = span(0, 1, 6, "X", Origin::Model);
        assert_eq!(
            engine(DedupPolicy::default()).run(vec![short.clone(), long.clone()]),
            vec![long.clone()]
        );

        let mut prefer_short = DedupPolicy::default();
        prefer_short.apply_keep("short").unwrap();
        assert_eq!(
            engine(prefer_short).run(vec![short.clone(), long]),
            vec![short]
        );
    }

    #[test]
    fn test_entity_priority_then_position() {
        let policy_any = || DedupPolicy {
            entity_scope: EntityScope::Any,
            ..Default::default()
        };
        let a = span(0, 0, 4, "LOCATION", Origin::Model);
        let b = span(0, 2, 6, "PERSON", Origin::Model);

        let mut policy = policy_any();
        policy.apply_entity_priority("PERSON, LOCATION").unwrap();
        assert_eq!(engine(policy).run(vec![a.clone(), b.clone()]), vec![b.clone()]);

        // Same length, no entity priority: first start wins, then last
        assert_eq!(engine(policy_any()).run(vec![b.clone(), a.clone()]), vec![a.clone()]);
        let mut last = policy_any();
        last.apply_keep("last").unwrap();
        assert_eq!(engine(last).run(vec![a, b.clone()]), vec![b]);
    }

    #[test]
    fn test_input_order_is_final_tie_break() {
        let a = span(0, 0, 4, "X", Origin::Model);
        let mut b = a.clone();
        b.id = "second".into();
        let kept = engine(DedupPolicy::default()).run(vec![a.clone(), b]);
        assert_eq!(kept, vec![a]);
    }

    #[test]
    fn test_chained_cluster_keeps_one() {
        let a = span(0, 0, 4, "X", Origin::Model);
        let b = span(0, 3, 8, "X", Origin::Manual);
        let c = span(0, 7, 9, "X", Origin::Model);
        let kept = engine(DedupPolicy::default()).run(vec![a, b.clone(), c]);
        assert_eq!(kept, vec![b]);
    }

    #[test]
    fn test_keep_tokens() {
        let mut policy = DedupPolicy::default();
        policy.apply_keep("model,short,last").unwrap();
        assert_eq!(
            policy.origin_priority,
            vec![Origin::Model, Origin::Manual, Origin::Added]
        );
        assert_eq!(policy.length, LengthPreference::Short);
        assert_eq!(policy.position, PositionPreference::Last);

        let err = DedupPolicy::default().apply_keep("manual,newest").unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownToken {
                option: "keep",
                token: "newest".into()
            }
        );
        assert!(DedupPolicy::default().apply_keep("long,short").is_err());
        assert!(DedupPolicy::default().apply_keep("manual,manual").is_err());
    }

    #[test]
    fn test_mode_tokens() {
        assert_eq!("contain".parse::<OverlapMode>().unwrap(), OverlapMode::Contain);
        assert!("partial".parse::<OverlapMode>().is_err());
        assert_eq!("any".parse::<EntityScope>().unwrap(), EntityScope::Any);
        assert!("all".parse::<EntityScope>().is_err());
    }

    #[test]
    fn test_duplicate_priorities_rejected() {
        let policy = DedupPolicy {
            origin_priority: vec![Origin::Model, Origin::Model],
            ..Default::default()
        };
        assert!(DeduplicationEngine::new(policy).is_err());
        assert!(DedupPolicy::default().apply_entity_priority("A,B,A").is_err());
    }

    #[test]
    fn test_policy_from_toml_shaped_json() {
        let policy: DedupPolicy = serde_json::from_str(
            r#"{"overlap": "contain", "entity_scope": "any", "origin_priority": ["model", "manual", "added"]}"#,
        )
        .unwrap();
        assert_eq!(policy.overlap, OverlapMode::Contain);
        assert_eq!(policy.origin_priority[0], Origin::Model);
        assert_eq!(policy.length, LengthPreference::Long);
    }

    #[test]
    fn test_policy_rejects_misspelled_key() {
        assert!(serde_json::from_str::<DedupPolicy>(r#"{"entity_scop": "any"}"#).is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_span() -> impl Strategy<Value = Span> {
        (
            0u32..2,
            0usize..20,
            1usize..6,
            prop::sample::select(vec!["PERSON", "EMAIL"]),
            prop::sample::select(Origin::ALL.to_vec()),
        )
            .prop_map(|(block, start, len, entity, origin)| {
                Span::new(
                    BlockAddress::new(0, block),
                    start,
                    start + len,
                    entity,
                    &"x".repeat(len),
                    origin,
                )
            })
    }

    fn arb_policy() -> impl Strategy<Value = DedupPolicy> {
        (
            prop::sample::select(vec![
                OverlapMode::Exact,
                OverlapMode::Contain,
                OverlapMode::AnyOverlap,
            ]),
            prop::sample::select(vec![EntityScope::Same, EntityScope::Any]),
            prop::sample::select(vec!["long", "short,last", "model,first", "added,short"]),
        )
            .prop_map(|(overlap, entity_scope, keep)| {
                let mut policy = DedupPolicy {
                    overlap,
                    entity_scope,
                    ..Default::default()
                };
                policy.apply_keep(keep).unwrap();
                policy
            })
    }

    proptest! {
        /// A second pass removes nothing
        #[test]
        fn dedup_is_idempotent(spans in prop::collection::vec(arb_span(), 0..30), policy in arb_policy()) {
            let engine = DeduplicationEngine::new(policy).unwrap();
            let once = engine.run(spans);
            let twice = engine.run(once.clone());
            prop_assert_eq!(once, twice);
        }

        /// No surviving pair conflicts
        #[test]
        fn no_conflicts_survive(spans in prop::collection::vec(arb_span(), 0..30), policy in arb_policy()) {
            let engine = DeduplicationEngine::new(policy).unwrap();
            let kept = engine.run(spans);
            for (i, a) in kept.iter().enumerate() {
                for b in &kept[i + 1..] {
                    prop_assert!(!engine.conflicts(a, b));
                }
            }
        }
    }
}
