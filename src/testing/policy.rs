//! Scenario selection policy
//!
//! Whether a scenario runs is decided by the caller, never by the scenario
//! itself: a scenario only carries tags and the reason to report if it is
//! left out.

/// Caller-supplied rules for which scenarios run
#[derive(Debug, Clone, Default)]
pub struct SelectionPolicy {
    /// If non-empty, only these scenarios run. Naming a scenario here
    /// overrides tag-based skipping for it.
    pub only: Vec<String>,
    /// Scenarios carrying any of these tags are skipped
    pub skip_tags: Vec<String>,
    /// Ignore `skip_tags`
    pub run_all: bool,
}

impl SelectionPolicy {
    pub fn with_only<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_skip_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_run_all(mut self, run_all: bool) -> Self {
        self.run_all = run_all;
        self
    }

    /// Reason to skip the named scenario, or `None` if it should run
    ///
    /// `declared_reason` is the scenario's own explanation and is reported
    /// verbatim when a tag excludes it.
    pub fn skip_reason(
        &self,
        name: &str,
        tags: &[String],
        declared_reason: Option<&str>,
    ) -> Option<String> {
        if !self.only.is_empty() {
            if self.only.iter().any(|n| n == name) {
                return None;
            }
            return Some("not selected".to_string());
        }

        if self.run_all {
            return None;
        }

        let tag = tags.iter().find(|t| self.skip_tags.contains(*t))?;
        Some(
            declared_reason
                .map(str::to_string)
                .unwrap_or_else(|| format!("tagged '{}'", tag)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_untagged_scenarios_run() {
        let policy = SelectionPolicy::default().with_skip_tags(["expensive"]);
        assert_eq!(policy.skip_reason("networking", &[], None), None);
    }

    #[test]
    fn test_declared_reason_is_verbatim() {
        let policy = SelectionPolicy::default().with_skip_tags(["dependent"]);
        assert_eq!(
            policy.skip_reason(
                "aks",
                &tags(&["dependent"]),
                Some("requires pre-existing networking resources")
            ),
            Some("requires pre-existing networking resources".to_string())
        );
    }

    #[test]
    fn test_tag_reason_fallback() {
        let policy = SelectionPolicy::default().with_skip_tags(["expensive"]);
        assert_eq!(
            policy.skip_reason("complete", &tags(&["slow", "expensive"]), None),
            Some("tagged 'expensive'".to_string())
        );
    }

    #[test]
    fn test_run_all_ignores_tags() {
        let policy = SelectionPolicy::default()
            .with_skip_tags(["expensive"])
            .with_run_all(true);
        assert_eq!(policy.skip_reason("complete", &tags(&["expensive"]), None), None);
    }

    #[test]
    fn test_only_selects_and_overrides_tags() {
        let policy = SelectionPolicy::default()
            .with_skip_tags(["dependent"])
            .with_only(["aks"]);
        assert_eq!(policy.skip_reason("aks", &tags(&["dependent"]), None), None);
        assert_eq!(
            policy.skip_reason("networking", &[], None),
            Some("not selected".to_string())
        );
    }
}
