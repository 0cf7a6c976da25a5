use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use crate::context::Channel;

/// Where a [`LoadedSkill`] was discovered; imported overrides bundled on name
/// collision (`spec.md` §3 invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillSource {
    Bundled,
    Imported,
}

/// A filesystem-defined capability: `SKILL.md` front matter plus the paths
/// needed to read its body and resources on demand (`spec.md` §3).
#[derive(Debug, Clone)]
pub struct LoadedSkill {
    pub name: String,
    pub description: String,
    pub markdown_path: PathBuf,
    pub root_dir: PathBuf,
    pub channels: HashSet<Channel>,
    pub tools: Vec<String>,
    pub match_hints: Vec<String>,
    pub enabled: bool,
    pub source: SkillSource,
    pub delegate_agent: Option<String>,
}

/// A non-fatal failure while loading one skill directory (`spec.md` §4.3:
/// "failures accumulate ... but never abort startup").
#[derive(Debug, Clone)]
pub struct SkillLoadError {
    pub dir: PathBuf,
    pub message: String,
}

impl fmt::Display for SkillLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to load skill at {}: {}", self.dir.display(), self.message)
    }
}

impl std::error::Error for SkillLoadError {}
