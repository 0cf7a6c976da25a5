//! `matchSkillForMessage` (`spec.md` §4.3 "Matching").

use crate::context::Channel;

use super::types::LoadedSkill;

/// Highest-confidence enabled skill for `channel` whose match hints clear
/// `confidence_threshold`, or `None`. Ties broken by iteration order (first
/// wins), matching the spec's documented tie-break.
pub fn match_skill_for_message<'a>(
    text: &str,
    channel: Channel,
    skills: impl IntoIterator<Item = &'a LoadedSkill>,
    confidence_threshold: f64,
) -> Option<&'a LoadedSkill> {
    let lower_text = text.to_lowercase();
    let mut best: Option<(&LoadedSkill, f64)> = None;

    for skill in skills {
        if !skill.enabled || skill.match_hints.is_empty() || !skill.channels.contains(&channel) {
            continue;
        }
        let total = skill.match_hints.len() as f64;
        let matched = skill
            .match_hints
            .iter()
            .filter(|hint| lower_text.contains(&hint.to_lowercase()))
            .count() as f64;
        let confidence = matched / total;
        if confidence < confidence_threshold {
            continue;
        }
        match &best {
            Some((_, best_confidence)) if confidence <= *best_confidence => {}
            _ => best = Some((skill, confidence)),
        }
    }

    best.map(|(skill, _)| skill)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::path::PathBuf;

    use super::*;
    use crate::skills::SkillSource;

    fn skill(name: &str, hints: &[&str]) -> LoadedSkill {
        let mut channels = HashSet::new();
        channels.insert(Channel::Email);
        LoadedSkill {
            name: name.to_string(),
            description: "d".into(),
            markdown_path: PathBuf::from("/tmp/SKILL.md"),
            root_dir: PathBuf::from("/tmp"),
            channels,
            tools: vec![],
            match_hints: hints.iter().map(|s| s.to_string()).collect(),
            enabled: true,
            source: SkillSource::Bundled,
            delegate_agent: None,
        }
    }

    #[test]
    fn picks_highest_confidence_match() {
        let weak = skill("weak", &["hotel", "flight", "receipt", "refund"]);
        let strong = skill("strong", &["hotel", "confirmation"]);
        let skills = vec![weak, strong];
        let best = match_skill_for_message(
            "Please find my hotel confirmation email",
            Channel::Email,
            &skills,
            0.3,
        )
        .unwrap();
        assert_eq!(best.name, "strong");
    }

    #[test]
    fn below_threshold_returns_none() {
        let s = skill("s", &["alpha", "beta", "gamma", "delta"]);
        let skills = vec![s];
        let best = match_skill_for_message("gamma only", Channel::Email, &skills, 0.3);
        assert!(best.is_none());
    }

    #[test]
    fn disabled_skill_never_matches() {
        let mut s = skill("s", &["hotel"]);
        s.enabled = false;
        let skills = vec![s];
        assert!(match_skill_for_message("hotel", Channel::Email, &skills, 0.3).is_none());
    }

    #[test]
    fn wrong_channel_never_matches() {
        let s = skill("s", &["hotel"]);
        let skills = vec![s];
        assert!(match_skill_for_message("hotel", Channel::Sms, &skills, 0.3).is_none());
    }
}
