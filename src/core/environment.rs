use crate::config::{Environment, PolicyConfig};
use crate::core::policy::PolicyFlags;
use tracing::warn;

pub const ALLOW_CORPORATE_IN_DEV: &str = "allow_corporate_in_dev";

pub const ENVIRONMENT_VAR: &str = "RAGDESK_ENVIRONMENT";
pub const ALLOW_CORPORATE_IN_DEV_VAR: &str = "RAGDESK_ALLOW_CORPORATE_IN_DEV";

/// Source of the deployment environment and policy flags, consulted per request
pub trait EnvironmentSource: Send + Sync {
    fn current_environment(&self) -> Environment;

    fn policy_flag(&self, name: &str) -> bool;

    fn policy_flags(&self) -> PolicyFlags {
        PolicyFlags {
            allow_corporate_in_dev: self.policy_flag(ALLOW_CORPORATE_IN_DEV),
        }
    }
}

/// Environment taken from the system config, overridable through process
/// environment variables that are re-read on every call
#[derive(Debug, Clone)]
pub struct ConfigEnvironment {
    environment: Environment,
    policy: PolicyConfig,
    read_overrides: bool,
}

impl ConfigEnvironment {
    pub fn new(environment: Environment, policy: PolicyConfig) -> Self {
        Self {
            environment,
            policy,
            read_overrides: true,
        }
    }

    /// Ignores process environment overrides
    pub fn fixed(environment: Environment, policy: PolicyConfig) -> Self {
        Self {
            environment,
            policy,
            read_overrides: false,
        }
    }

    fn override_var(&self, name: &str) -> Option<String> {
        if !self.read_overrides {
            return None;
        }
        std::env::var(name).ok().filter(|v| !v.trim().is_empty())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl EnvironmentSource for ConfigEnvironment {
    fn current_environment(&self) -> Environment {
        match self.override_var(ENVIRONMENT_VAR) {
            Some(value) => value.parse().unwrap_or_else(|_| {
                warn!(
                    "Ignoring invalid {}={}, expected one of: {}",
                    ENVIRONMENT_VAR,
                    value,
                    Environment::EXPECTED
                );
                self.environment
            }),
            None => self.environment,
        }
    }

    fn policy_flag(&self, name: &str) -> bool {
        match name {
            ALLOW_CORPORATE_IN_DEV => self
                .override_var(ALLOW_CORPORATE_IN_DEV_VAR)
                .and_then(|v| parse_bool(&v))
                .unwrap_or(self.policy.allow_corporate_in_dev),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_environment_uses_config() {
        let env = ConfigEnvironment::fixed(
            Environment::Test,
            PolicyConfig {
                allow_corporate_in_dev: true,
            },
        );
        assert_eq!(env.current_environment(), Environment::Test);
        assert!(env.policy_flags().allow_corporate_in_dev);
        assert!(!env.policy_flag("unknown_flag"));
    }

    #[test]
    fn test_overrides_are_read_on_every_call() {
        let env = ConfigEnvironment::new(Environment::Dev, PolicyConfig::default());
        std::env::remove_var(ENVIRONMENT_VAR);
        std::env::remove_var(ALLOW_CORPORATE_IN_DEV_VAR);
        assert_eq!(env.current_environment(), Environment::Dev);
        assert!(!env.policy_flags().allow_corporate_in_dev);

        std::env::set_var(ENVIRONMENT_VAR, "prod");
        std::env::set_var(ALLOW_CORPORATE_IN_DEV_VAR, "yes");
        assert_eq!(env.current_environment(), Environment::Prod);
        assert!(env.policy_flags().allow_corporate_in_dev);

        std::env::set_var(ENVIRONMENT_VAR, "staging");
        std::env::set_var(ALLOW_CORPORATE_IN_DEV_VAR, "sometimes");
        assert_eq!(env.current_environment(), Environment::Dev);
        assert!(!env.policy_flags().allow_corporate_in_dev);

        let fixed = ConfigEnvironment::fixed(Environment::Test, PolicyConfig::default());
        std::env::set_var(ENVIRONMENT_VAR, "prod");
        assert_eq!(fixed.current_environment(), Environment::Test);

        std::env::remove_var(ENVIRONMENT_VAR);
        std::env::remove_var(ALLOW_CORPORATE_IN_DEV_VAR);
        assert_eq!(env.current_environment(), Environment::Dev);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" 0 "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
