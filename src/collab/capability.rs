//! Data-driven capability profiles and tag-overlap matching.

use std::collections::BTreeSet;
use std::collections::HashMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Declared strengths of an actor, keyed by actor name in the registry.
/// Matching treats `strengths` and `best_for` as one tag set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityProfile {
    pub strengths: Vec<String>,
    pub best_for: Vec<String>,
}

impl CapabilityProfile {
    pub fn new(strengths: Vec<String>, best_for: Vec<String>) -> Self {
        Self { strengths, best_for }
    }

    pub fn tag_set(&self) -> BTreeSet<&str> {
        self.strengths
            .iter()
            .chain(self.best_for.iter())
            .map(String::as_str)
            .collect()
    }

    /// Jaccard overlap between this profile's tags and the requested tags:
    /// |intersection| / |union|, 0.0 when either side is empty.
    pub fn match_score(&self, requested: &[String]) -> f64 {
        let mine = self.tag_set();
        let wanted: BTreeSet<&str> = requested.iter().map(String::as_str).collect();
        if mine.is_empty() || wanted.is_empty() {
            return 0.0;
        }
        let intersection = mine.intersection(&wanted).count();
        let union = mine.union(&wanted).count();
        intersection as f64 / union as f64
    }
}

/// Registry mapping actor names to declared profiles. Loaded from config or
/// seeded with defaults; unknown actors resolve to an empty profile rather
/// than an error so new actors can check in before being catalogued.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    profiles: DashMap<String, CapabilityProfile>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_table(table: HashMap<String, CapabilityProfile>) -> Self {
        let registry = Self::new();
        for (name, profile) in table {
            registry.profiles.insert(name, profile);
        }
        registry
    }

    pub fn register(&self, actor_name: impl Into<String>, profile: CapabilityProfile) {
        self.profiles.insert(actor_name.into(), profile);
    }

    pub fn profile_for(&self, actor_name: &str) -> CapabilityProfile {
        self.profiles
            .get(actor_name)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn exact_tag_match_scores_one() {
        let profile = CapabilityProfile::new(tags(&["grpc", "testing"]), Vec::new());
        let score = profile.match_score(&tags(&["grpc", "testing"]));
        assert!((score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn disjoint_tags_score_zero() {
        let profile = CapabilityProfile::new(tags(&["python", "refactoring"]), Vec::new());
        assert_eq!(profile.match_score(&tags(&["grpc", "testing"])), 0.0);
    }

    #[test]
    fn partial_overlap_scores_between() {
        let profile = CapabilityProfile::new(tags(&["grpc", "python"]), tags(&["testing"]));
        let score = profile.match_score(&tags(&["grpc", "testing"]));
        // intersection {grpc, testing} = 2, union {grpc, python, testing} = 3
        assert!((score - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_actor_gets_empty_profile() {
        let registry = CapabilityRegistry::new();
        registry.register(
            "refactor-bot",
            CapabilityProfile::new(tags(&["refactoring"]), Vec::new()),
        );

        assert_eq!(registry.profile_for("someone-new"), CapabilityProfile::default());
        assert_eq!(
            registry.profile_for("refactor-bot").strengths,
            tags(&["refactoring"])
        );
    }
}
