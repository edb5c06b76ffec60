//! Process classification into software groups.
//!
//! A process is matched first against the configured install-path targets and
//! then against a keyword table of known process names. The keyword table is
//! loaded from TOML (an embedded default plus an optional user file) and is
//! immutable once a `Matcher` has been built.

use anyhow::Context;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::collectors::ProcessRecord;

/// Prefix of keys produced by keyword matches.
pub const NAME_KEY_PREFIX: &str = "name";

/// Install directories watched when no targets are configured.
pub const DEFAULT_TARGETS: &[&str] = &[
    r"C:\Program Files (x86)\Splashtop",
    r"C:\Program Files (x86)\ATERA Networks",
    r"C:\Program Files\Splashtop",
    r"C:\Program Files\ATERA Networks",
];

/// A named group of process-name keywords.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameGroup {
    pub name: String,
    pub keywords: Vec<String>,
}

/// Root structure of a groups TOML file.
#[derive(Deserialize)]
struct GroupsConfig {
    groups: Vec<NameGroup>,
}

/// Parses a groups TOML document, preserving file order.
pub fn parse_name_groups(content: &str) -> Result<Vec<NameGroup>, toml::de::Error> {
    let parsed: GroupsConfig = toml::from_str(content)?;
    Ok(parsed
        .groups
        .into_iter()
        .map(|g| NameGroup {
            name: g.name,
            keywords: g
                .keywords
                .into_iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        })
        .collect())
}

/// Loads a groups TOML file from disk.
pub fn load_name_groups_from_file(path: &Path) -> anyhow::Result<Vec<NameGroup>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("cannot read groups file {}", path.display()))?;
    let groups = parse_name_groups(&content)
        .with_context(|| format!("invalid groups file {}", path.display()))?;
    info!("Loaded {} keyword groups from {}", groups.len(), path.display());
    Ok(groups)
}

/// Built-in keyword groups embedded at compile time.
pub static BUILTIN_NAME_GROUPS: Lazy<Vec<NameGroup>> = Lazy::new(|| {
    let content = include_str!("../../data/groups.toml");
    parse_name_groups(content).unwrap_or_else(|e| {
        eprintln!("Failed to parse built-in groups TOML: {}", e);
        Vec::new()
    })
});

/// Splits a semicolon-delimited target list, dropping blank entries.
///
/// Falls back to `DEFAULT_TARGETS` when nothing usable remains.
pub fn parse_targets(raw: &str) -> Vec<String> {
    let parts: Vec<String> = raw
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    if parts.is_empty() {
        default_targets()
    } else {
        parts
    }
}

/// Owned copy of `DEFAULT_TARGETS`.
pub fn default_targets() -> Vec<String> {
    DEFAULT_TARGETS.iter().map(|s| s.to_string()).collect()
}

/// Unifies separators to `\` and case-folds.
pub fn normalize_windows_path(path: &str) -> String {
    path.replace('/', "\\").to_lowercase()
}

/// Classification result: the group a process is aggregated under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupMatch {
    pub key: String,
    pub display_name: String,
}

#[derive(Debug, Clone)]
struct Target {
    normalized: String,
}

/// Classifies processes into software groups.
#[derive(Debug, Clone)]
pub struct Matcher {
    targets: Vec<Target>,
    raw_targets: Vec<String>,
    name_groups: Arc<[NameGroup]>,
}

impl Matcher {
    /// Builds a matcher over ordered path targets and keyword groups.
    pub fn new(targets: Vec<String>, name_groups: Vec<NameGroup>) -> Self {
        let normalized = targets
            .iter()
            .map(|t| Target {
                normalized: normalize_windows_path(t),
            })
            .filter(|t| !t.normalized.is_empty())
            .collect();
        let name_groups = name_groups
            .into_iter()
            .map(|g| NameGroup {
                name: g.name,
                keywords: g.keywords.iter().map(|k| k.to_lowercase()).collect(),
            })
            .collect::<Vec<_>>();
        Self {
            targets: normalized,
            raw_targets: targets,
            name_groups: name_groups.into(),
        }
    }

    /// Matcher over the given targets and the built-in keyword table.
    pub fn with_builtin_groups(targets: Vec<String>) -> Self {
        Self::new(targets, BUILTIN_NAME_GROUPS.clone())
    }

    /// Targets as configured, in match order.
    pub fn targets(&self) -> &[String] {
        &self.raw_targets
    }

    /// Keyword groups in match order.
    pub fn name_groups(&self) -> &[NameGroup] {
        &self.name_groups
    }

    /// Classifies a collected record.
    pub fn classify_record(&self, record: &ProcessRecord) -> Option<GroupMatch> {
        self.classify(&record.name, record.exe.as_deref())
    }

    /// Classifies by executable path first, process name second.
    pub fn classify(&self, name: &str, exe: Option<&str>) -> Option<GroupMatch> {
        exe.and_then(|e| self.match_path(e))
            .or_else(|| self.match_name(name))
    }

    /// Path-prefix match against the ordered targets.
    pub fn match_path(&self, exe: &str) -> Option<GroupMatch> {
        if exe.is_empty() {
            return None;
        }
        let exe_norm = normalize_windows_path(exe);
        let target = self
            .targets
            .iter()
            .find(|t| exe_norm.starts_with(&t.normalized))?;

        let rel = exe_norm[target.normalized.len()..].trim_start_matches(['\\', '/']);
        let display = match rel.split('\\').next() {
            Some(segment) if !segment.is_empty() => segment,
            _ => exe_norm.rsplit('\\').next().unwrap_or(exe_norm.as_str()),
        };

        Some(GroupMatch {
            key: format!("{}|{}", target.normalized, display),
            display_name: display.to_string(),
        })
    }

    /// Keyword match against the lowercased process name.
    pub fn match_name(&self, name: &str) -> Option<GroupMatch> {
        if name.is_empty() {
            return None;
        }
        let folded = name.to_lowercase();
        self.name_groups
            .iter()
            .find(|g| g.keywords.iter().any(|kw| folded.contains(kw.as_str())))
            .map(|g| GroupMatch {
                key: format!("{}|{}", NAME_KEY_PREFIX, g.name),
                display_name: g.name.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splashtop_matcher() -> Matcher {
        Matcher::with_builtin_groups(vec![r"C:\Program Files\Splashtop".to_string()])
    }

    #[test]
    fn test_builtin_groups_loaded_in_order() {
        let names: Vec<&str> = BUILTIN_NAME_GROUPS.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Splashtop", "Atera"]);
        assert!(BUILTIN_NAME_GROUPS[0].keywords.contains(&"srservice".to_string()));
    }

    #[test]
    fn test_path_match_uses_first_segment() {
        let m = splashtop_matcher().classify(
            "app.exe",
            Some(r"C:\Program Files\Splashtop\Remote\bin\app.exe"),
        );
        assert_eq!(
            m,
            Some(GroupMatch {
                key: r"c:\program files\splashtop|remote".to_string(),
                display_name: "remote".to_string(),
            })
        );
    }

    #[test]
    fn test_path_match_normalizes_forward_slashes() {
        let m = splashtop_matcher()
            .match_path("c:/program files/SPLASHTOP/Agent/x.exe")
            .expect("should match");
        assert_eq!(m.display_name, "agent");
    }

    #[test]
    fn test_path_match_file_directly_under_target() {
        let m = splashtop_matcher()
            .match_path(r"C:\Program Files\Splashtop\SRService.exe")
            .expect("should match");
        assert_eq!(m.display_name, "srservice.exe");
        assert_eq!(m.key, r"c:\program files\splashtop|srservice.exe");
    }

    #[test]
    fn test_path_equal_to_target_uses_base_name() {
        let m = splashtop_matcher()
            .match_path(r"C:\Program Files\Splashtop")
            .expect("should match");
        assert_eq!(m.display_name, "splashtop");
    }

    #[test]
    fn test_first_matching_target_wins() {
        let matcher = Matcher::with_builtin_groups(vec![
            r"C:\Program Files".to_string(),
            r"C:\Program Files\Splashtop".to_string(),
        ]);
        let m = matcher
            .match_path(r"C:\Program Files\Splashtop\Remote\app.exe")
            .expect("should match");
        assert_eq!(m.key, r"c:\program files|splashtop");
    }

    #[test]
    fn test_keyword_match() {
        let m = splashtop_matcher().classify("SRService.exe", None);
        assert_eq!(
            m,
            Some(GroupMatch {
                key: "name|Splashtop".to_string(),
                display_name: "Splashtop".to_string(),
            })
        );

        let m = splashtop_matcher().classify("AteraAgent.exe", Some(r"D:\tools\AteraAgent.exe"));
        assert_eq!(m.map(|g| g.key), Some("name|Atera".to_string()));
    }

    #[test]
    fn test_path_match_has_priority_over_keyword() {
        let m = splashtop_matcher()
            .classify(
                "AteraAgent.exe",
                Some(r"C:\Program Files\Splashtop\Remote\AteraAgent.exe"),
            )
            .expect("should match");
        assert_eq!(m.key, r"c:\program files\splashtop|remote");
    }

    #[test]
    fn test_unmatched_process_is_excluded() {
        assert!(splashtop_matcher()
            .classify("notepad.exe", Some(r"C:\Windows\notepad.exe"))
            .is_none());
        assert!(splashtop_matcher().classify("", None).is_none());
    }

    #[test]
    fn test_parse_targets() {
        assert_eq!(
            parse_targets(r" C:\A ;; C:\B ;"),
            vec![r"C:\A".to_string(), r"C:\B".to_string()]
        );
        assert_eq!(parse_targets(" ; "), default_targets());
    }

    #[test]
    fn test_parse_name_groups_lowercases_keywords() {
        let groups = parse_name_groups(
            r#"
            [[groups]]
            name = "Vendor"
            keywords = ["VendorSvc", " ", "agent"]
            "#,
        )
        .expect("valid TOML");
        assert_eq!(groups[0].keywords, vec!["vendorsvc", "agent"]);
    }
}
