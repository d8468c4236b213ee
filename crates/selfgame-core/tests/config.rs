//! Configuration loading: partial documents fill in defaults and the
//! validated config is what sessions run with.

use selfgame_core::{CriticDimension, ForbiddenPathPolicy, GameConfig, GameError, ScorerMode};

#[test]
fn test_partial_toml_fills_defaults() {
    let doc = r#"
        simulation_seed = 7

        [self_play]
        max_rounds = 3
        quality_threshold = 0.75

        [routing]
        forbidden_path_policy = "heuristic"

        [calls]
        timeout_ms = 5000
    "#;
    let config: GameConfig = toml::from_str(doc).unwrap();

    assert_eq!(config.simulation_seed, 7);
    assert_eq!(config.self_play.max_rounds, 3);
    assert_eq!(config.self_play.quality_threshold, 0.75);
    assert_eq!(config.self_play.convergence_rounds, 2);
    assert_eq!(config.self_play.chunk_tokens, 100);
    assert_eq!(
        config.routing.forbidden_path_policy,
        ForbiddenPathPolicy::Heuristic
    );
    assert_eq!(config.calls.timeout_ms, 5000);
    assert_eq!(config.calls.max_retries, 2);
    assert_eq!(config.dispatch.max_iterations, 20);
    assert_eq!(config.dispatch.compatibility_scorer, ScorerMode::Heuristic);
    assert!(!config.keywords.escalation.is_empty());
    assert!(config.validate().is_ok());
}

#[test]
fn test_empty_document_is_the_default_config() {
    let config: GameConfig = toml::from_str("").unwrap();
    assert_eq!(config, GameConfig::default());
}

#[test]
fn test_nested_sections_and_keyword_tables_load() {
    let doc = r#"
        [self_play]
        strict_stages = true
        history_summary_chars = 400
        multi_critic = true

        [dispatch]
        compatibility_scorer = "pluggable"

        [keywords]
        escalation = ["stuck"]
        stages = [
            { tag = "draft", keywords = ["draft"] },
            { tag = "publish", keywords = ["publish"] },
        ]
    "#;
    let config: GameConfig = toml::from_str(doc).unwrap();

    assert!(config.self_play.strict_stages);
    assert_eq!(config.self_play.history_summary_chars, 400);
    assert!(config.self_play.multi_critic);
    assert_eq!(config.self_play.weight_for(CriticDimension::Logic), 1.0);
    assert_eq!(config.dispatch.compatibility_scorer, ScorerMode::Pluggable);
    assert_eq!(config.keywords.escalation, vec!["stuck".to_string()]);
    assert_eq!(config.keywords.stage_of("publish the notes"), Some(1));
    // untouched tables keep their defaults
    assert!(!config.keywords.coordinator.is_empty());
}

#[test]
fn test_loaded_config_is_still_validated() {
    let doc = r#"
        [self_play]
        novelty_threshold = 1.5
    "#;
    let config: GameConfig = toml::from_str(doc).unwrap();
    assert!(matches!(config.validate(), Err(GameError::InvalidConfig(_))));
}

#[test]
fn test_config_round_trips_through_json() {
    let mut config = GameConfig::default();
    config.routing.forbidden_path_policy = ForbiddenPathPolicy::Proposed;
    config.self_play.strict_stages = true;

    let json = serde_json::to_string(&config).unwrap();
    let back: GameConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
}
