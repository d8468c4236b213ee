//! Session configuration.
//!
//! Every section is `#[serde(default)]`, so a partial TOML/JSON document
//! deserializes into a complete config. The library never reads files; the
//! caller deserializes and hands the result to
//! [`crate::session::GameSession::build`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use selfgame_collab::CallPolicy;

use crate::domain::{CriticDimension, GameError, Result};
use crate::text;

/// Top-level configuration for one game session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub self_play: SelfPlayConfig,
    pub dispatch: DispatchConfig,
    pub routing: RoutingConfig,
    pub role_graph: RoleGraphConfig,
    /// Timeout and retry budget applied to every collaborator call.
    pub calls: CallPolicy,
    pub keywords: KeywordPolicy,
    /// Seed for every simulated fallback score.
    pub simulation_seed: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            self_play: SelfPlayConfig::default(),
            dispatch: DispatchConfig::default(),
            routing: RoutingConfig::default(),
            role_graph: RoleGraphConfig::default(),
            calls: CallPolicy::default(),
            keywords: KeywordPolicy::default(),
            simulation_seed: 42,
        }
    }
}

impl GameConfig {
    /// Reject configurations that would make the game ill-defined.
    pub fn validate(&self) -> Result<()> {
        let sp = &self.self_play;
        for (name, value) in [
            ("self_play.quality_threshold", sp.quality_threshold),
            ("self_play.convergence_threshold", sp.convergence_threshold),
            ("self_play.novelty_threshold", sp.novelty_threshold),
            (
                "routing.min_responsibility_similarity",
                self.routing.min_responsibility_similarity,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(GameError::InvalidConfig(format!(
                    "{name} must be within 0.0..=1.0, got {value}"
                )));
            }
        }
        if sp.max_rounds == 0 {
            return Err(GameError::InvalidConfig(
                "self_play.max_rounds must be at least 1".to_string(),
            ));
        }
        if sp.convergence_rounds == 0 {
            return Err(GameError::InvalidConfig(
                "self_play.convergence_rounds must be at least 1".to_string(),
            ));
        }
        if sp.chunk_tokens == 0 {
            return Err(GameError::InvalidConfig(
                "self_play.chunk_tokens must be at least 1".to_string(),
            ));
        }
        if sp.dimension_weights.values().any(|w| !w.is_finite() || *w < 0.0)
            || (!sp.dimension_weights.is_empty() && sp.dimension_weights.values().sum::<f64>() <= 0.0)
        {
            return Err(GameError::InvalidConfig(
                "self_play.dimension_weights must be non-negative with a positive sum".to_string(),
            ));
        }

        let d = &self.dispatch;
        if !d.skill_weight.is_finite()
            || !d.priority_weight.is_finite()
            || d.skill_weight < 0.0
            || d.priority_weight < 0.0
            || d.skill_weight + d.priority_weight <= 0.0
        {
            return Err(GameError::InvalidConfig(
                "dispatch weights must be finite, non-negative and have a positive sum"
                    .to_string(),
            ));
        }
        if self.calls.timeout_ms == 0 {
            return Err(GameError::InvalidConfig(
                "calls.timeout_ms must be at least 1; collaborator calls are always bounded"
                    .to_string(),
            ));
        }
        if self.role_graph.fallback_role_count == 0 || self.role_graph.default_agent_count == 0 {
            return Err(GameError::InvalidConfig(
                "role_graph agent counts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Self-play loop thresholds and bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfPlayConfig {
    /// Overall critique score (0..=1) that ends the game when satisfied.
    pub quality_threshold: f64,
    /// Maximum round-to-round change in overall score considered stable.
    pub convergence_threshold: f64,
    /// Consecutive stable rounds required to declare convergence.
    pub convergence_rounds: u32,
    /// Novelty score (0..=1) that ends the game.
    pub novelty_threshold: f64,
    pub max_rounds: u32,
    /// Tokens per novelty chunk.
    pub chunk_tokens: usize,
    /// Per-dimension weights for the overall score. Empty = equal weights.
    pub dimension_weights: BTreeMap<CriticDimension, f64>,
    /// When set, a failed collaborator is not replaced by its fallback and
    /// the game ends with `missing_stage`.
    pub strict_stages: bool,
    /// Upper bound on the history summary handed to the generator.
    pub history_summary_chars: usize,
    /// Ask every executor other than the author for a critique each round
    /// and average the ones that succeed. Off: one selected critic.
    pub multi_critic: bool,
}

impl Default for SelfPlayConfig {
    fn default() -> Self {
        Self {
            quality_threshold: 0.8,
            convergence_threshold: 0.02,
            convergence_rounds: 2,
            novelty_threshold: 0.9,
            max_rounds: 5,
            chunk_tokens: 100,
            dimension_weights: BTreeMap::new(),
            strict_stages: false,
            history_summary_chars: 800,
            multi_critic: false,
        }
    }
}

impl SelfPlayConfig {
    pub fn weight_for(&self, dimension: CriticDimension) -> f64 {
        if self.dimension_weights.is_empty() {
            1.0
        } else {
            self.dimension_weights.get(&dimension).copied().unwrap_or(0.0)
        }
    }
}

/// Which compatibility score the dispatcher uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerMode {
    #[default]
    Heuristic,
    /// Ask the configured `CompatibilityScorer`, falling back per candidate.
    Pluggable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub max_iterations: u32,
    pub compatibility_scorer: ScorerMode,
    /// Weight of the skill-overlap (or pluggable) score.
    pub skill_weight: f64,
    /// Weight of `priority_level / 10`.
    pub priority_weight: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            compatibility_scorer: ScorerMode::Heuristic,
            skill_weight: 0.5,
            priority_weight: 0.5,
        }
    }
}

/// Forbidden-edge strategy applied by the signal router.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForbiddenPathPolicy {
    #[default]
    Off,
    Heuristic,
    Proposed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub forbidden_path_policy: ForbiddenPathPolicy,
    /// Heuristic policy: forbid edges between agents less similar than this.
    pub min_responsibility_similarity: f64,
    /// Heuristic policy: forbid edges spanning more stages than this.
    pub max_stage_gap: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            forbidden_path_policy: ForbiddenPathPolicy::Off,
            min_responsibility_similarity: 0.05,
            max_stage_gap: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleGraphConfig {
    /// Executors requested when the domain config does not say.
    pub default_agent_count: usize,
    /// Hard cap on proposed executors.
    pub max_agent_count: usize,
    /// Size of the deterministic fallback role set.
    pub fallback_role_count: usize,
}

impl Default for RoleGraphConfig {
    fn default() -> Self {
        Self {
            default_agent_count: 4,
            max_agent_count: 10,
            fallback_role_count: 3,
        }
    }
}

/// A tag plus the keywords that select it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub tag: String,
    pub keywords: Vec<String>,
}

impl KeywordRule {
    pub fn new(tag: &str, keywords: &[&str]) -> Self {
        Self {
            tag: tag.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Keyword tables behind every "what kind of agent / output is this" decision.
///
/// These are data: extend them in configuration rather than code. Latin
/// keywords match whole words; end one with `*` to match word prefixes.
/// See [`text::keyword_matches`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordPolicy {
    /// Signals in task output that something needs a decision.
    pub escalation: Vec<String>,
    /// Name / role-type words of agents that can take escalations.
    pub coordinator: Vec<String>,
    /// Exact names / role types the role proposer must not emit.
    pub requester: Vec<String>,
    /// Name / role-type words preferred as critic persona.
    pub reviewer: Vec<String>,
    /// First matching rule tags the output type.
    pub output_types: Vec<KeywordRule>,
    /// First matching rule tags the collaboration type.
    pub collaboration_types: Vec<KeywordRule>,
    /// Ordered work stages; the index is the stage position.
    pub stages: Vec<KeywordRule>,
}

impl Default for KeywordPolicy {
    fn default() -> Self {
        Self {
            escalation: strings(&[
                "blocked",
                "unclear",
                "ambiguous",
                "escalate",
                "need a decision",
                "needs a decision",
                "需要决策",
                "不明确",
                "阻塞",
            ]),
            coordinator: strings(&[
                "manager",
                "lead",
                "leader",
                "coordinator",
                "architect",
                "owner",
                "负责人",
                "协调",
            ]),
            requester: strings(&["requester", "user", "client", "customer", "需求方", "用户", "客户"]),
            reviewer: strings(&[
                "review*", "critic*", "qa", "audit*", "evaluat*", "评审", "审核", "评估",
            ]),
            output_types: vec![
                KeywordRule::new("code", &["code", "implement*", "function*", "api", "代码", "实现"]),
                KeywordRule::new("plan", &["plan", "plans", "planning", "roadmap*", "milestone*", "schedul*", "计划", "规划"]),
                KeywordRule::new("design", &["design*", "architecture", "prototyp*", "设计", "架构"]),
                KeywordRule::new(
                    "analysis",
                    &["analy*", "evaluat*", "assess*", "research*", "分析", "评估", "调研"],
                ),
                KeywordRule::new("document", &["report*", "document*", "summary", "summar*", "文档", "报告"]),
            ],
            collaboration_types: vec![
                KeywordRule::new("review", &["review*", "feedback", "critique*", "评审", "反馈"]),
                KeywordRule::new("parallel", &["in parallel", "simultaneous", "并行", "同时"]),
                KeywordRule::new("handoff", &["hand off", "handoff", "deliver*", "交付", "移交"]),
            ],
            stages: vec![
                KeywordRule::new("research", &["research*", "investigat*", "analy*", "调研", "分析"]),
                KeywordRule::new("design", &["design*", "architect*", "plan", "plans", "planning", "设计", "规划"]),
                KeywordRule::new("build", &["implement*", "develop*", "build*", "code", "coding", "开发", "实现"]),
                KeywordRule::new("verify", &["test*", "review*", "verif*", "qa", "测试", "评审"]),
                KeywordRule::new("operate", &["deploy*", "releas*", "operat*", "maintain*", "部署", "运维"]),
            ],
        }
    }
}

impl KeywordPolicy {
    /// Tag of the first rule with a keyword occurring in `text`.
    pub fn classify<'r>(rules: &'r [KeywordRule], text: &str) -> Option<&'r str> {
        rules
            .iter()
            .find(|rule| text::find_keyword(text, &rule.keywords).is_some())
            .map(|rule| rule.tag.as_str())
    }

    /// Position of the first stage rule matching `text`.
    pub fn stage_of(&self, text: &str) -> Option<usize> {
        self.stages
            .iter()
            .position(|rule| text::find_keyword(text, &rule.keywords).is_some())
    }

    /// Exact (case-insensitive) match against the requester table.
    pub fn is_requester_like(&self, label: &str) -> bool {
        let label = label.trim().to_lowercase();
        self.requester.iter().any(|r| r.to_lowercase() == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(GameConfig::default().validate().is_ok());
    }

    #[test]
    fn test_threshold_out_of_range_is_rejected() {
        let mut config = GameConfig::default();
        config.self_play.quality_threshold = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("quality_threshold"));
    }

    #[test]
    fn test_zero_dispatch_weights_rejected() {
        let mut config = GameConfig::default();
        config.dispatch.skill_weight = 0.0;
        config.dispatch.priority_weight = 0.0;
        assert!(matches!(
            config.validate(),
            Err(GameError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_non_finite_dispatch_weights_rejected() {
        for bad in [f64::NAN, f64::INFINITY] {
            let mut config = GameConfig::default();
            config.dispatch.skill_weight = bad;
            assert!(matches!(
                config.validate(),
                Err(GameError::InvalidConfig(_))
            ));

            let mut config = GameConfig::default();
            config.dispatch.priority_weight = bad;
            assert!(matches!(
                config.validate(),
                Err(GameError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_zero_call_timeout_rejected() {
        let mut config = GameConfig::default();
        config.calls.timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("calls.timeout_ms"));
    }

    #[test]
    fn test_classify_returns_first_matching_rule() {
        let policy = KeywordPolicy::default();
        assert_eq!(
            KeywordPolicy::classify(&policy.output_types, "Implement the API client"),
            Some("code")
        );
        assert_eq!(KeywordPolicy::classify(&policy.output_types, "hello"), None);
    }

    #[test]
    fn test_stage_keywords_need_word_boundaries() {
        let policy = KeywordPolicy::default();
        assert_eq!(policy.stage_of("Run the test suite"), Some(3));
        assert_eq!(policy.stage_of("Investigation of the outage"), Some(0));
        // "planet" is not "plan", "latest" is not "test"
        assert_eq!(policy.stage_of("the latest planet"), None);
    }

    #[test]
    fn test_requester_match_is_exact() {
        let policy = KeywordPolicy::default();
        assert!(policy.is_requester_like("User"));
        assert!(!policy.is_requester_like("user researcher"));
    }

    #[test]
    fn test_equal_weights_when_map_empty() {
        let sp = SelfPlayConfig::default();
        assert_eq!(sp.weight_for(CriticDimension::Logic), 1.0);
    }
}
