use crate::config::{Environment, TaskDefinition, TaskKind};
use serde::Serialize;

/// Outcome of an access check, the reason is always set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: String,
}

impl AccessDecision {
    fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Mutable policy switches read per request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyFlags {
    pub allow_corporate_in_dev: bool,
}

/// Decides whether a task may run in the given environment
pub fn decide(task: &TaskDefinition, environment: Environment, flags: PolicyFlags) -> AccessDecision {
    decide_kind(task.kind, environment, flags)
}

/// Access table keyed by task kind and environment
pub fn decide_kind(kind: TaskKind, environment: Environment, flags: PolicyFlags) -> AccessDecision {
    match (kind, environment) {
        (TaskKind::Demo, Environment::Dev | Environment::Test) => {
            AccessDecision::allow(format!("demo tasks are allowed in {}", environment))
        }
        (TaskKind::Demo, Environment::Prod) => {
            AccessDecision::deny("demo tasks are disabled in prod")
        }
        (TaskKind::Corporate, Environment::Dev) if flags.allow_corporate_in_dev => {
            AccessDecision::allow("corporate tasks are allowed in dev by policy flag")
        }
        (TaskKind::Corporate, Environment::Dev) => {
            AccessDecision::deny("corporate tasks are only allowed in prod")
        }
        (TaskKind::Corporate, Environment::Test) => AccessDecision::allow(
            "corporate tasks run in test on the debug path, generation is disabled",
        ),
        (TaskKind::Corporate, Environment::Prod) => {
            AccessDecision::allow("corporate tasks are allowed in prod")
        }
    }
}

/// Whether an allowed task must skip live generation
pub fn generation_disabled(kind: TaskKind, environment: Environment) -> bool {
    kind == TaskKind::Corporate && environment == Environment::Test
}

#[cfg(test)]
mod tests {
    use super::*;

    const KINDS: [TaskKind; 2] = [TaskKind::Demo, TaskKind::Corporate];
    const ENVS: [Environment; 3] = [Environment::Dev, Environment::Test, Environment::Prod];

    fn flags(allow: bool) -> PolicyFlags {
        PolicyFlags {
            allow_corporate_in_dev: allow,
        }
    }

    #[test]
    fn test_policy_table() {
        let cases = [
            (TaskKind::Demo, Environment::Dev, false, true),
            (TaskKind::Demo, Environment::Test, false, true),
            (TaskKind::Demo, Environment::Prod, false, false),
            (TaskKind::Corporate, Environment::Dev, false, false),
            (TaskKind::Corporate, Environment::Dev, true, true),
            (TaskKind::Corporate, Environment::Test, false, true),
            (TaskKind::Corporate, Environment::Prod, false, true),
        ];
        for (kind, env, allow, expected) in cases {
            let decision = decide_kind(kind, env, flags(allow));
            assert_eq!(decision.allowed, expected, "{} in {}", kind, env);
        }
    }

    #[test]
    fn test_reasons_are_always_populated() {
        for kind in KINDS {
            for env in ENVS {
                for allow in [false, true] {
                    assert!(!decide_kind(kind, env, flags(allow)).reason.is_empty());
                }
            }
        }
    }

    #[test]
    fn test_corporate_denial_mentions_prod() {
        let mut task = TaskDefinition::new("corp_rules");
        task.kind = TaskKind::Corporate;
        let decision = decide(&task, Environment::Dev, PolicyFlags::default());
        assert!(!decision.allowed);
        assert!(decision.reason.contains("prod"));
    }

    #[test]
    fn test_decide_is_pure() {
        for kind in KINDS {
            for env in ENVS {
                for allow in [false, true] {
                    assert_eq!(
                        decide_kind(kind, env, flags(allow)),
                        decide_kind(kind, env, flags(allow))
                    );
                }
            }
        }
    }

    #[test]
    fn test_generation_disabled_only_for_corporate_in_test() {
        for kind in KINDS {
            for env in ENVS {
                let expected = kind == TaskKind::Corporate && env == Environment::Test;
                assert_eq!(generation_disabled(kind, env), expected);
            }
        }
    }
}
