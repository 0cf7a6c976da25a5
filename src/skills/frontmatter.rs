//! YAML front-matter parsing for `SKILL.md`, grounded on the same
//! regex-delimited extraction approach used for skill metadata elsewhere in
//! the corpus (match `---\n...\n---` then hand the inner block to
//! `serde_yaml`).

use std::collections::HashSet;
use std::fmt;

use regex::Regex;
use serde::Deserialize;

use crate::context::Channel;

#[derive(Debug)]
pub enum FrontMatterError {
    NoFrontMatter,
    InvalidYaml(serde_yaml::Error),
    InvalidName(String),
    EmptyDescription,
    UnknownChannel(String),
}

impl fmt::Display for FrontMatterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrontMatterError::NoFrontMatter => write!(f, "SKILL.md has no YAML front matter"),
            FrontMatterError::InvalidYaml(e) => write!(f, "invalid front-matter YAML: {e}"),
            FrontMatterError::InvalidName(n) => {
                write!(f, "skill name '{n}' must match ^[a-z0-9][a-z0-9-]*$")
            }
            FrontMatterError::EmptyDescription => write!(f, "skill description must be non-empty"),
            FrontMatterError::UnknownChannel(c) => write!(f, "unrecognized channel '{c}'"),
        }
    }
}

impl std::error::Error for FrontMatterError {}

#[derive(Debug, Deserialize, Default)]
struct RawFrontMatter {
    name: String,
    description: String,
    #[serde(default)]
    metadata: Option<RawMetadata>,
}

#[derive(Debug, Deserialize, Default)]
struct RawMetadata {
    #[serde(default)]
    hermes: Option<RawHermesMetadata>,
}

#[derive(Debug, Deserialize, Default)]
struct RawHermesMetadata {
    #[serde(default)]
    channels: Vec<String>,
    #[serde(default)]
    tools: Vec<String>,
    #[serde(default, rename = "match")]
    match_hints: Vec<String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default, rename = "delegateAgent")]
    delegate_agent: Option<String>,
}

fn default_enabled() -> bool {
    true
}

/// Validated, in-memory shape of `SKILL.md`'s front matter. Doesn't carry
/// filesystem paths or source precedence — [`crate::skills::SkillRegistry`]
/// attaches those.
pub struct ParsedFrontMatter {
    pub name: String,
    pub description: String,
    pub channels: HashSet<Channel>,
    pub tools: Vec<String>,
    pub match_hints: Vec<String>,
    pub enabled: bool,
    pub delegate_agent: Option<String>,
}

/// Returns the markdown body (content after the closing `---`).
pub fn split_body(content: &str) -> &str {
    let re = front_matter_re();
    match re.find(content) {
        Some(m) => content[m.end()..].trim_start_matches('\n'),
        None => content,
    }
}

/// Parse and validate the front matter of a `SKILL.md` file's raw content.
pub fn parse_front_matter(content: &str) -> Result<ParsedFrontMatter, FrontMatterError> {
    let re = front_matter_re();
    let captures = re.captures(content).ok_or(FrontMatterError::NoFrontMatter)?;
    let yaml_block = captures.get(1).ok_or(FrontMatterError::NoFrontMatter)?.as_str();

    let raw: RawFrontMatter = serde_yaml::from_str(yaml_block).map_err(FrontMatterError::InvalidYaml)?;

    validate_name(&raw.name)?;
    if raw.description.trim().is_empty() {
        return Err(FrontMatterError::EmptyDescription);
    }

    let hermes = raw.metadata.and_then(|m| m.hermes).unwrap_or_default();
    let mut channels = HashSet::new();
    for c in &hermes.channels {
        channels.insert(parse_channel(c)?);
    }

    Ok(ParsedFrontMatter {
        name: raw.name,
        description: raw.description,
        channels,
        tools: hermes.tools,
        match_hints: hermes.match_hints,
        enabled: hermes.enabled,
        delegate_agent: hermes.delegate_agent,
    })
}

fn front_matter_re() -> Regex {
    Regex::new(r"(?s)^---\s*\n(.*?)\n---").expect("SKILL.md front-matter regex is valid")
}

fn validate_name(name: &str) -> Result<(), FrontMatterError> {
    let re = Regex::new(r"^[a-z0-9][a-z0-9-]*$").expect("skill name regex is valid");
    if re.is_match(name) {
        Ok(())
    } else {
        Err(FrontMatterError::InvalidName(name.to_string()))
    }
}

fn parse_channel(s: &str) -> Result<Channel, FrontMatterError> {
    match s {
        "sms" => Ok(Channel::Sms),
        "whatsapp" => Ok(Channel::Whatsapp),
        "email" => Ok(Channel::Email),
        "scheduler" => Ok(Channel::Scheduler),
        other => Err(FrontMatterError::UnknownChannel(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"---
name: email-search
description: Search the user's mailbox
metadata:
  hermes:
    channels: [sms, whatsapp]
    tools: [search_email]
    match: ["find my email", "search inbox"]
    enabled: true
---

# Email Search

Search the mailbox for the requested terms.
"#;

    #[test]
    fn parses_valid_front_matter() {
        let parsed = parse_front_matter(SAMPLE).unwrap();
        assert_eq!(parsed.name, "email-search");
        assert!(parsed.channels.contains(&Channel::Sms));
        assert_eq!(parsed.tools, vec!["search_email".to_string()]);
        assert!(parsed.enabled);
    }

    #[test]
    fn splits_body_after_front_matter() {
        let body = split_body(SAMPLE);
        assert!(body.starts_with("# Email Search"));
        assert!(!body.contains("---"));
    }

    #[test]
    fn rejects_invalid_name() {
        let content = SAMPLE.replace("email-search", "Email_Search");
        let err = parse_front_matter(&content).unwrap_err();
        assert!(matches!(err, FrontMatterError::InvalidName(_)));
    }

    #[test]
    fn rejects_missing_front_matter() {
        let err = parse_front_matter("# just a heading").unwrap_err();
        assert!(matches!(err, FrontMatterError::NoFrontMatter));
    }

    #[test]
    fn rejects_unknown_channel() {
        let content = SAMPLE.replace("sms, whatsapp", "sms, carrier-pigeon");
        let err = parse_front_matter(&content).unwrap_err();
        assert!(matches!(err, FrontMatterError::UnknownChannel(_)));
    }

    #[test]
    fn delegate_agent_is_optional() {
        let content = SAMPLE.replace(
            "enabled: true",
            "enabled: true\n    delegateAgent: calendar-agent",
        );
        let parsed = parse_front_matter(&content).unwrap();
        assert_eq!(parsed.delegate_agent.as_deref(), Some("calendar-agent"));
    }
}
