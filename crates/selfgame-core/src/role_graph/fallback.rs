//! Deterministic substitutes for the role-graph collaborators.

use std::collections::BTreeSet;

use selfgame_collab::{DomainConfig, PermissionMap, RoleDraft};

const TEMPLATES: &[(&str, &str, i64, &[&str], &[&str])] = &[
    (
        "lead-executor",
        "lead executor",
        8,
        &["break the problem into steps", "integrate partial results", "decide on open questions"],
        &["planning", "coordination"],
    ),
    (
        "domain-executor",
        "domain executor",
        6,
        &["produce the core solution content", "apply domain knowledge"],
        &["analysis", "problem solving"],
    ),
    (
        "review-executor",
        "review executor",
        5,
        &["review drafts for gaps and errors", "suggest concrete improvements"],
        &["review", "quality assurance"],
    ),
];

/// A small generic role set used when role proposal fails.
///
/// The first three roles are fixed; extra roles (when `count > 3`) are
/// generic executors with descending priority.
pub fn minimal_roles(domain: &DomainConfig, count: usize) -> Vec<RoleDraft> {
    let count = count.max(1);
    let domain_skill = domain.domain.trim().to_lowercase();

    (0..count)
        .map(|i| {
            let mut draft = match TEMPLATES.get(i) {
                Some((name, role_type, priority, duties, skills)) => RoleDraft {
                    name: name.to_string(),
                    role_type: role_type.to_string(),
                    responsibilities: duties.iter().map(|s| s.to_string()).collect(),
                    skills: skills.iter().map(|s| s.to_string()).collect(),
                    output_requirements: "a written contribution to the shared answer".to_string(),
                    priority_level: Some(*priority),
                },
                None => RoleDraft {
                    name: format!("executor-{}", i + 1),
                    role_type: "executor".to_string(),
                    responsibilities: vec!["contribute to the shared answer".to_string()],
                    skills: vec!["problem solving".to_string()],
                    output_requirements: "a written contribution to the shared answer".to_string(),
                    priority_level: Some((5 - (i as i64 - 2)).max(1)),
                },
            };
            if !domain_skill.is_empty() {
                draft.skills.push(domain_skill.clone());
            }
            draft
        })
        .collect()
}

/// Every executor may reach every other executor.
pub fn full_mesh(names: &[String]) -> PermissionMap {
    names
        .iter()
        .map(|from| {
            let targets: BTreeSet<String> =
                names.iter().filter(|to| *to != from).cloned().collect();
            (from.clone(), targets)
        })
        .collect()
}

/// System prompt assembled from the role's structured fields.
pub fn template_prompt(
    problem_statement: &str,
    role: &RoleDraft,
    priority: u8,
    reachable: &[String],
) -> String {
    let bullet = |items: &[String]| {
        if items.is_empty() {
            "- (none listed)".to_string()
        } else {
            items
                .iter()
                .map(|i| format!("- {i}"))
                .collect::<Vec<_>>()
                .join("\n")
        }
    };
    let reachable = if reachable.is_empty() {
        "nobody else; continue the work yourself".to_string()
    } else {
        reachable.join(", ")
    };
    let output = if role.output_requirements.is_empty() {
        "a written contribution to the shared answer"
    } else {
        role.output_requirements.as_str()
    };

    format!(
        "You are {name}, acting as {role_type} (priority {priority}/10).\n\n\
         Problem:\n{problem_statement}\n\n\
         Responsibilities:\n{duties}\n\n\
         Skills:\n{skills}\n\n\
         Collaboration: you may hand work to {reachable}. \
         Say explicitly when you are blocked or a decision is needed.\n\n\
         Output: {output}.\n\n\
         Boundaries: stay within your responsibilities and do not speak for the requester.",
        name = role.name,
        role_type = role.role_type,
        duties = bullet(&role.responsibilities),
        skills = bullet(&role.skills),
    )
}
