//! Per-route limit rules.
//!
//! Routes are matched by path prefix; the longest matching prefix wins and
//! an optional default covers everything else.

use serde::{Deserialize, Serialize};

use super::limits::Limits;
use crate::error::{Result, SuperbanError};

/// Limits for every protected route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRules {
    /// Limits applied when no route rule matches
    #[serde(default)]
    pub default: Option<Limits>,
    /// Route-specific limits
    #[serde(default)]
    pub routes: Vec<RouteRule>,
}

/// Limits for requests whose path starts with `path_prefix`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    pub path_prefix: String,
    #[serde(flatten)]
    pub limits: Limits,
}

impl RouteRules {
    /// Load rules from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let rules: RouteRules = serde_yaml::from_str(yaml)
            .map_err(|e| SuperbanError::Config(format!("Failed to parse route rules: {}", e)))?;
        rules.validate()?;
        Ok(rules)
    }

    /// Check every rule's limits.
    pub fn validate(&self) -> Result<()> {
        if let Some(ref limits) = self.default {
            limits.validate()?;
        }
        for rule in &self.routes {
            if !rule.path_prefix.starts_with('/') {
                return Err(SuperbanError::Config(format!(
                    "route prefix {:?} must start with '/'",
                    rule.path_prefix
                )));
            }
            rule.limits.validate()?;
        }
        Ok(())
    }

    /// Find the limits that apply to `path`.
    pub fn find_limits(&self, path: &str) -> Option<&Limits> {
        self.routes
            .iter()
            .filter(|rule| prefix_matches(&rule.path_prefix, path))
            .max_by_key(|rule| rule.path_prefix.len())
            .map(|rule| &rule.limits)
            .or(self.default.as_ref())
    }
}

/// Prefix match on whole path segments, so `/api` covers `/api/x` but not `/apix`.
fn prefix_matches(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rules() {
        let yaml = r#"
default:
  max_attempts: 200
  decay_minutes: 2
  banned_minutes: 1440
routes:
  - path_prefix: /login
    max_attempts: 5
    decay_minutes: 1
    banned_minutes: 60
"#;
        let rules = RouteRules::from_yaml(yaml).unwrap();
        assert_eq!(rules.routes.len(), 1);
        assert_eq!(rules.default, Some(Limits::new(200, 2, 1440).unwrap()));
    }

    #[test]
    fn test_longest_prefix_wins() {
        let yaml = r#"
routes:
  - path_prefix: /api
    max_attempts: 100
    decay_minutes: 1
    banned_minutes: 10
  - path_prefix: /api/auth
    max_attempts: 5
    decay_minutes: 1
    banned_minutes: 60
"#;
        let rules = RouteRules::from_yaml(yaml).unwrap();

        assert_eq!(rules.find_limits("/api/auth/login").unwrap().max_attempts, 5);
        assert_eq!(rules.find_limits("/api/users").unwrap().max_attempts, 100);
        assert_eq!(rules.find_limits("/api").unwrap().max_attempts, 100);
    }

    #[test]
    fn test_prefix_matches_whole_segments() {
        assert!(prefix_matches("/api", "/api/x"));
        assert!(prefix_matches("/api/", "/api/x"));
        assert!(prefix_matches("/api", "/api?page=2"));
        assert!(!prefix_matches("/api", "/apix"));
        assert!(prefix_matches("/", "/anything"));
    }

    #[test]
    fn test_default_and_no_match() {
        let rules = RouteRules {
            default: None,
            routes: vec![RouteRule {
                path_prefix: "/login".to_string(),
                limits: Limits::new(5, 1, 60).unwrap(),
            }],
        };
        assert!(rules.find_limits("/home").is_none());

        let rules = RouteRules {
            default: Some(Limits::new(50, 1, 10).unwrap()),
            ..rules
        };
        assert_eq!(rules.find_limits("/home").unwrap().max_attempts, 50);
    }

    #[test]
    fn test_invalid_rules_rejected() {
        let yaml = r#"
routes:
  - path_prefix: /login
    max_attempts: 0
    decay_minutes: 1
    banned_minutes: 60
"#;
        assert!(matches!(
            RouteRules::from_yaml(yaml),
            Err(SuperbanError::InvalidLimits(_))
        ));

        let yaml = r#"
routes:
  - path_prefix: login
    max_attempts: 3
    decay_minutes: 1
    banned_minutes: 60
"#;
        assert!(matches!(RouteRules::from_yaml(yaml), Err(SuperbanError::Config(_))));
    }
}
