//! Skill Registry (`spec.md` §4.3): filesystem-backed discovery, matching,
//! and execution of markdown-defined skills.

mod frontmatter;
mod matcher;
mod registry;
mod safe_read;
mod types;

pub use frontmatter::FrontMatterError;
pub use matcher::match_skill_for_message;
pub use registry::{SkillExecutionResult, SkillRegistry};
pub use safe_read::{safe_read, SafeReadError};
pub use types::{LoadedSkill, SkillLoadError, SkillSource};
