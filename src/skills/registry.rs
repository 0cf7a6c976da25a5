use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::agents::AgentRegistry;
use crate::context::{Channel, ExecutionContext};
use crate::llm::LlmChatClient;
use crate::tools::ToolExecutionSurface;
use crate::tools::ToolRegistry;

use super::frontmatter::{parse_front_matter, split_body};
use super::safe_read::safe_read;
use super::types::{LoadedSkill, SkillLoadError, SkillSource};

/// Conventional sub-directories whose contents are appended as resource
/// blocks when a skill is executed (`spec.md` §4.3 "Execution").
const RESOURCE_DIRS: &[&str] = &["references", "scripts", "assets"];

/// Outcome of `executeByName` (`spec.md` §4.3).
#[derive(Debug, Clone)]
pub struct SkillExecutionResult {
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl SkillExecutionResult {
    fn ok(output: String) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(message.into()),
        }
    }
}

/// Immutable-after-build registry of every discovered skill (`spec.md`
/// §4.3). Built once at startup via [`SkillRegistry::load`]; listing and
/// lookup are lock-free reads thereafter.
#[derive(Default)]
pub struct SkillRegistry {
    skills: HashMap<String, LoadedSkill>,
    pub load_errors: Vec<SkillLoadError>,
}

impl SkillRegistry {
    /// Scans `bundled_dir` then `imported_dir`; imported skills override
    /// bundled skills of the same name (`spec.md` §3 invariant). Load
    /// failures accumulate in `load_errors` and never abort the scan.
    pub fn load(bundled_dir: &Path, imported_dir: &Path) -> Self {
        let mut registry = SkillRegistry::default();
        registry.scan(bundled_dir, SkillSource::Bundled);
        registry.scan(imported_dir, SkillSource::Imported);
        registry
    }

    fn scan(&mut self, root: &Path, source: SkillSource) {
        let Ok(entries) = fs::read_dir(root) else {
            return;
        };
        for entry in entries.flatten() {
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let md_path = dir.join("SKILL.md");
            if !md_path.exists() {
                continue;
            }
            match self.load_one(&dir, &md_path, source) {
                Ok(skill) => {
                    info!(skill = %skill.name, ?source, "loaded skill");
                    self.skills.insert(skill.name.clone(), skill);
                }
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "failed to load skill");
                    self.load_errors.push(SkillLoadError {
                        dir: dir.clone(),
                        message: e,
                    });
                }
            }
        }
    }

    fn load_one(&self, dir: &Path, md_path: &Path, source: SkillSource) -> Result<LoadedSkill, String> {
        let content = fs::read_to_string(md_path).map_err(|e| e.to_string())?;
        let parsed = parse_front_matter(&content).map_err(|e| e.to_string())?;
        Ok(LoadedSkill {
            name: parsed.name,
            description: parsed.description,
            markdown_path: md_path.to_path_buf(),
            root_dir: dir.to_path_buf(),
            channels: parsed.channels,
            tools: parsed.tools,
            match_hints: parsed.match_hints,
            enabled: parsed.enabled,
            source,
            delegate_agent: parsed.delegate_agent,
        })
    }

    pub fn get(&self, name: &str) -> Option<&LoadedSkill> {
        self.skills.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &LoadedSkill> {
        self.skills.values()
    }

    /// Skills enabled and routable from `channel`, for use in the planner's
    /// prompt (`spec.md` §4.5).
    pub fn routable_from(&self, channel: Channel) -> Vec<&LoadedSkill> {
        self.skills
            .values()
            .filter(|s| s.enabled && s.channels.contains(&channel))
            .collect()
    }

    pub fn match_for_message(&self, text: &str, channel: Channel, confidence_threshold: f64) -> Option<&LoadedSkill> {
        super::matcher::match_skill_for_message(text, channel, self.skills.values(), confidence_threshold)
    }

    /// `executeByName(name, userMessage, ctx) → SkillExecutionResult`
    /// (`spec.md` §4.3 "Execution"). If the skill declares a
    /// `delegate_agent` that exists in `agent_registry`, the prompt is
    /// routed through that agent's tool allow-list instead of the skill's
    /// own `tools` list (`SPEC_FULL.md` §4.3 supplement).
    #[allow(clippy::too_many_arguments)]
    pub async fn execute_by_name(
        &self,
        name: &str,
        user_message: &str,
        ctx: &ExecutionContext,
        llm: &dyn LlmChatClient,
        tools: &ToolRegistry,
        agent_registry: &AgentRegistry,
        max_tool_iterations: usize,
    ) -> SkillExecutionResult {
        let Some(skill) = self.skills.get(name) else {
            return SkillExecutionResult::err(format!("skill not found: {name}"));
        };
        if !skill.enabled {
            return SkillExecutionResult::err(format!("skill disabled: {name}"));
        }

        let prompt = match self.build_prompt(skill, user_message) {
            Ok(p) => p,
            Err(e) => return SkillExecutionResult::err(e),
        };

        let (system_prompt, allowed_tools) = match skill
            .delegate_agent
            .as_deref()
            .and_then(|agent_name| agent_registry.get(agent_name))
        {
            Some(entry) => {
                let result = (entry.executor)(&prompt, ctx, llm, tools, max_tool_iterations).await;
                return step_result_to_skill_result(result);
            }
            None => (format!("You are executing the '{}' skill.", skill.name), skill.tools.clone()),
        };

        let surface = ToolExecutionSurface::new(llm, tools, max_tool_iterations);
        let result = surface.execute(&system_prompt, &prompt, &allowed_tools, ctx, &[]).await;
        step_result_to_skill_result(result)
    }

    fn build_prompt(&self, skill: &LoadedSkill, user_message: &str) -> Result<String, String> {
        let raw = safe_read(&skill.root_dir, &skill.markdown_path).map_err(|e| e.to_string())?;
        let body = split_body(&raw);

        let mut prompt = format!("# Skill: {}\n\n{}\n\n## User message\n\n{}", skill.name, body, user_message);

        for resource_dir in RESOURCE_DIRS {
            let dir = skill.root_dir.join(resource_dir);
            if !dir.is_dir() {
                continue;
            }
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            let mut files: Vec<PathBuf> = entries.flatten().map(|e| e.path()).filter(|p| p.is_file()).collect();
            files.sort();
            for file in files {
                if let Ok(content) = safe_read(&skill.root_dir, &file) {
                    let rel = file.strip_prefix(&skill.root_dir).unwrap_or(&file);
                    prompt.push_str(&format!("\n\n## Resource: {}\n\n{}", rel.display(), content));
                }
            }
        }

        Ok(prompt)
    }
}

fn step_result_to_skill_result(result: crate::context::StepResult) -> SkillExecutionResult {
    use crate::context::StepResult;
    match result {
        StepResult::Success { output, .. } => {
            SkillExecutionResult::ok(output.map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string())).unwrap_or_default())
        }
        StepResult::Failure { error, .. } => SkillExecutionResult::err(error),
        StepResult::AuthRequired { auth_url, .. } => {
            SkillExecutionResult::ok(format!("Authorization required: {auth_url}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_double::ScriptedLlmClient;

    fn write_skill(root: &Path, name: &str, front_matter_extra: &str, body: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        let content = format!(
            "---\nname: {name}\ndescription: a test skill\n{front_matter_extra}\n---\n\n{body}\n"
        );
        fs::write(dir.join("SKILL.md"), content).unwrap();
    }

    #[test]
    fn discovers_skills_in_both_roots() {
        let bundled = tempfile::tempdir().unwrap();
        let imported = tempfile::tempdir().unwrap();
        write_skill(bundled.path(), "alpha", "", "alpha body");
        write_skill(imported.path(), "beta", "", "beta body");

        let registry = SkillRegistry::load(bundled.path(), imported.path());
        assert!(registry.get("alpha").is_some());
        assert!(registry.get("beta").is_some());
        assert!(registry.load_errors.is_empty());
    }

    #[test]
    fn imported_overrides_bundled_on_name_collision() {
        let bundled = tempfile::tempdir().unwrap();
        let imported = tempfile::tempdir().unwrap();
        write_skill(bundled.path(), "dup", "", "bundled version");
        write_skill(imported.path(), "dup", "", "imported version");

        let registry = SkillRegistry::load(bundled.path(), imported.path());
        let skill = registry.get("dup").unwrap();
        assert_eq!(skill.source, SkillSource::Imported);
    }

    #[test]
    fn malformed_skill_is_logged_not_fatal() {
        let bundled = tempfile::tempdir().unwrap();
        let dir = bundled.path().join("broken");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("SKILL.md"), "not even front matter").unwrap();
        let imported = tempfile::tempdir().unwrap();

        let registry = SkillRegistry::load(bundled.path(), imported.path());
        assert!(registry.get("broken").is_none());
        assert_eq!(registry.load_errors.len(), 1);
    }

    #[tokio::test]
    async fn execute_by_name_builds_prompt_from_body_and_resources() {
        let bundled = tempfile::tempdir().unwrap();
        write_skill(
            bundled.path(),
            "email-search",
            "metadata:\n  hermes:\n    tools: [search_email]\n    enabled: true",
            "Search the mailbox.",
        );
        let references_dir = bundled.path().join("email-search").join("references");
        fs::create_dir_all(&references_dir).unwrap();
        fs::write(references_dir.join("tips.md"), "Use narrower queries first.").unwrap();

        let imported = tempfile::tempdir().unwrap();
        let registry = SkillRegistry::load(bundled.path(), imported.path());

        let llm = ScriptedLlmClient::text_once("found 3 emails");
        let tools = ToolRegistry::new();
        let agents = AgentRegistry::new();
        let ctx = ExecutionContext::new("u1", Channel::Sms, chrono::Utc::now());

        let result = registry
            .execute_by_name("email-search", "find my hotel receipt", &ctx, &llm, &tools, &agents, 10)
            .await;
        assert!(result.success);
        assert_eq!(result.output.as_deref(), Some("found 3 emails"));
    }

    #[tokio::test]
    async fn execute_by_name_rejects_unknown_skill() {
        let bundled = tempfile::tempdir().unwrap();
        let imported = tempfile::tempdir().unwrap();
        let registry = SkillRegistry::load(bundled.path(), imported.path());
        let llm = ScriptedLlmClient::text_once("unused");
        let tools = ToolRegistry::new();
        let agents = AgentRegistry::new();
        let ctx = ExecutionContext::new("u1", Channel::Sms, chrono::Utc::now());
        let result = registry
            .execute_by_name("nope", "msg", &ctx, &llm, &tools, &agents, 10)
            .await;
        assert!(!result.success);
    }
}
