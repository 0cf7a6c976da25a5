use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::tools::ToolExecutionSurface;

use super::registry::AgentExecutorFn;

/// Builds an [`AgentExecutorFn`] from a static system-prompt template (with
/// `{userContext}`/`{timeContext}` placeholders resolved from `ctx`) and a
/// fixed tool allow-list, per `spec.md` §4.2 ("Agents are single-purpose
/// shims: each builds a system prompt ... and calls the Tool-Execution
/// Surface with its tool allow-list").
pub fn template_agent_executor(system_prompt_template: &str, allowed_tools: Vec<String>) -> AgentExecutorFn {
    let template = system_prompt_template.to_string();
    Arc::new(move |task, ctx, llm, tools, max_tool_iterations| {
        let system_prompt = render_template(&template, ctx);
        let allowed = allowed_tools.clone();
        Box::pin(async move {
            let surface = ToolExecutionSurface::new(llm, tools, max_tool_iterations);
            surface.execute(&system_prompt, task, &allowed, ctx, &[]).await
        })
    })
}

fn render_template(template: &str, ctx: &ExecutionContext) -> String {
    let user_context = ctx
        .profile
        .as_ref()
        .and_then(|p| p.name.as_deref())
        .map(|n| format!("User: {n} (phone {})", ctx.user))
        .unwrap_or_else(|| format!("User: {}", ctx.user));
    let time_context = format!(
        "{} ({})",
        ctx.now.with_timezone(&ctx.timezone()).to_rfc3339(),
        ctx.timezone()
    );
    template
        .replace("{userContext}", &user_context)
        .replace("{timeContext}", &time_context)
}
