//! Dynamic dispatcher tests: iteration bound, scoring, coordinator override
//! and collaborator fallbacks.

use std::collections::BTreeSet;
use std::sync::Arc;

use selfgame_collab::fakes::Scripted;
use selfgame_collab::{CallPolicy, Collaborators, RequirementSignature};
use selfgame_core::{
    Agent, DynamicDispatcher, GameConfig, GameError, ScorerMode, SignalRouter,
};

fn team() -> Vec<Agent> {
    vec![
        Agent::executor("lead", "manager", 0)
            .with_skills(["planning"])
            .with_priority(9)
            .with_permissions(["tester", "writer"]),
        Agent::executor("tester", "qa engineer", 1)
            .with_skills(["testing"])
            .with_responsibilities(["testing"])
            .with_priority(4)
            .with_permissions(["lead", "writer"]),
        Agent::executor("writer", "writer", 2)
            .with_skills(["documentation"])
            .with_responsibilities(["documentation"])
            .with_priority(6)
            .with_permissions(["lead", "tester"]),
        Agent::requester("Ship the release", "lead", 3),
    ]
}

fn config() -> GameConfig {
    GameConfig {
        calls: CallPolicy {
            timeout_ms: 1_000,
            max_retries: 1,
        },
        ..GameConfig::default()
    }
}

fn dispatcher(config: &GameConfig, collaborators: &Collaborators) -> DynamicDispatcher {
    let agents = team();
    let matrix = SignalRouter::new(config, collaborators).build_matrix(&agents);
    DynamicDispatcher::new(agents, matrix, config, collaborators)
}

#[tokio::test]
async fn scenario_fourth_call_exceeds_iteration_limit() {
    let mut config = config();
    config.dispatch.max_iterations = 3;
    let mut dispatcher = dispatcher(&config, &Collaborators::none());

    let mut current = "requester".to_string();
    for expected in 1..=3 {
        let next = dispatcher.select_next(&current, "keep going").await.unwrap();
        assert_eq!(dispatcher.state().iteration_count, expected);
        current = next.name().to_string();
    }

    let err = dispatcher.select_next(&current, "keep going").await.unwrap_err();
    assert!(matches!(
        err,
        GameError::IterationLimitExceeded {
            iteration_count: 4,
            max_iterations: 3
        }
    ));
    assert_eq!(dispatcher.state().iteration_count, 4);

    let history = dispatcher.history();
    assert_eq!(history.len(), 4);
    let iterations: Vec<u32> = history.iter().map(|r| r.iteration).collect();
    assert_eq!(iterations, vec![1, 2, 3, 4]);
    assert!(history[..3].iter().all(|r| r.to.is_some()));
    assert_eq!(history[3].to, None);
}

#[tokio::test]
async fn requester_dispatches_to_its_single_target() {
    let mut dispatcher = dispatcher(&config(), &Collaborators::none());
    let next = dispatcher
        .select_next("requester", "Ship the release")
        .await
        .unwrap();
    assert_eq!(next.name(), "lead");
    assert_eq!(dispatcher.state().current_agent.as_deref(), Some("lead"));
}

#[tokio::test]
async fn skill_overlap_outweighs_priority() {
    let mut dispatcher = dispatcher(&config(), &Collaborators::none());
    let next = dispatcher
        .select_next("lead", "Please add testing coverage")
        .await
        .unwrap();
    assert_eq!(next.name(), "tester");

    let record = dispatcher.history().last().unwrap();
    assert_eq!(record.to.as_deref(), Some("tester"));
    assert!(record.score.is_some());
    let requirement = record.requirement.as_ref().unwrap();
    assert!(requirement.required_skills.contains("testing"));
}

#[tokio::test]
async fn escalation_prefers_a_reachable_coordinator() {
    let mut dispatcher = dispatcher(&config(), &Collaborators::none());
    let next = dispatcher
        .select_next("tester", "Blocked: testing scope is unclear, need a decision")
        .await
        .unwrap();
    assert_eq!(next.name(), "lead");
    let record = dispatcher.history().last().unwrap();
    assert!(record.reason.contains("coordinator override"));
}

#[tokio::test]
async fn escalation_words_inside_other_words_do_not_override() {
    let mut dispatcher = dispatcher(&config(), &Collaborators::none());
    for output in [
        "Testing is unblocked now; writer documentation next",
        "Testing the blockchain ledger export, documentation next",
    ] {
        let next = dispatcher.select_next("tester", output).await.unwrap();
        let record = dispatcher.history().last().unwrap();
        assert!(
            !record.reason.contains("coordinator override"),
            "{output}: {}",
            record.reason
        );
        assert_eq!(next.name(), "writer");
    }
}

#[tokio::test]
async fn judged_requirements_replace_the_heuristic() {
    let judge = Arc::new(Scripted::always(RequirementSignature {
        required_skills: BTreeSet::from(["documentation".to_string()]),
        output_type: "document".to_string(),
        collaboration_type: "handoff".to_string(),
    }));
    let collaborators = Collaborators::none().with_requirement_judge(judge.clone());
    let mut dispatcher = dispatcher(&config(), &collaborators);

    let next = dispatcher.select_next("lead", "anything").await.unwrap();
    assert_eq!(next.name(), "writer");
    assert_eq!(judge.calls(), 1);
    assert!(!dispatcher.history()[0].fallback_used);
}

#[tokio::test]
async fn failing_judge_falls_back_to_keywords() {
    let judge = Arc::new(Scripted::<RequirementSignature>::failing("judge offline"));
    let collaborators = Collaborators::none().with_requirement_judge(judge.clone());
    let mut dispatcher = dispatcher(&config(), &collaborators);

    let next = dispatcher
        .select_next("lead", "Please add testing coverage")
        .await
        .unwrap();
    assert_eq!(next.name(), "tester");
    assert_eq!(judge.strict_flags(), vec![false, true]);
    assert!(dispatcher.history()[0].fallback_used);
}

#[tokio::test]
async fn pluggable_scorer_replaces_overlap() {
    let mut config = config();
    config.dispatch.compatibility_scorer = ScorerMode::Pluggable;
    let scorer = Arc::new(Scripted::always(0.9_f64));
    let collaborators = Collaborators::none().with_compatibility_scorer(scorer.clone());
    let mut dispatcher = dispatcher(&config, &collaborators);

    // equal compatibility everywhere: priority decides
    let next = dispatcher
        .select_next("lead", "Please add testing coverage")
        .await
        .unwrap();
    assert_eq!(next.name(), "lead");
    assert_eq!(scorer.calls(), 3);
    assert!(!dispatcher.history()[0].fallback_used);
}

#[tokio::test]
async fn failing_scorer_falls_back_to_overlap() {
    let mut config = config();
    config.dispatch.compatibility_scorer = ScorerMode::Pluggable;
    let scorer = Arc::new(Scripted::<f64>::failing("scorer offline"));
    let collaborators = Collaborators::none().with_compatibility_scorer(scorer);
    let mut dispatcher = dispatcher(&config, &collaborators);

    let next = dispatcher
        .select_next("lead", "Please add testing coverage")
        .await
        .unwrap();
    assert_eq!(next.name(), "tester");
    assert!(dispatcher.history()[0].fallback_used);
}

#[tokio::test]
async fn unknown_current_agent_is_recorded_and_rejected() {
    let mut dispatcher = dispatcher(&config(), &Collaborators::none());
    let err = dispatcher.select_next("ghost", "hello").await.unwrap_err();
    assert!(matches!(err, GameError::UnknownAgent(name) if name == "ghost"));
    assert_eq!(dispatcher.state().iteration_count, 1);
    assert_eq!(dispatcher.history()[0].to, None);
}
