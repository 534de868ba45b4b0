use std::sync::Arc;
use std::time::{Duration, Instant};

use super::image::generate_images;
use super::parse::parse_response;
use super::prompt::build_request;
use super::TaskKind;
use crate::character::{
    BackstoryMotivation, CharacterId, KnowledgeBase, PhysicalDescription, Personality,
    Relationships, StoryArc, StructuredOutput, TaskOutput, VoiceDialogue,
};
use crate::generation::{complete_text, ImageGenerator, TextGenerator};
use crate::store::Store;
use crate::util::approx_tokens;
use crate::{wlog_debug, Error, Result};

/// Collaborators a task needs while it runs.
#[derive(Clone)]
pub struct TaskContext {
    pub character_id: CharacterId,
    pub text: Arc<dyn TextGenerator>,
    pub image: Arc<dyn ImageGenerator>,
    pub store: Arc<dyn Store>,
}

/// What a finished task hands back to the scheduler.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub output: TaskOutput,
    pub narrative: String,
    pub tokens_used: u64,
    pub elapsed: Duration,
    /// The structured section was replaced by the task's fallback.
    pub degraded: bool,
}

impl TaskOutcome {
    pub fn kind(&self) -> TaskKind {
        self.output.kind()
    }
}

async fn run_text<T: StructuredOutput>(
    kb: &KnowledgeBase,
    ctx: &TaskContext,
) -> Result<(TaskOutput, String, u64, bool)> {
    let request = build_request(T::KIND, kb)?;
    let raw = complete_text(ctx.text.as_ref(), &request).await?;
    let prompt_chars: String = request
        .turns
        .iter()
        .map(|t| t.content.as_str())
        .chain(std::iter::once(request.system.as_str()))
        .collect();
    let tokens = approx_tokens(&prompt_chars) + approx_tokens(&raw);
    let parsed = parse_response::<T>(&raw);
    Ok((
        parsed.structured.into_output(),
        parsed.narrative,
        tokens,
        parsed.degraded,
    ))
}

/// Run one task against a snapshot of the knowledge base.
///
/// Hard dependencies must already be present. Transport failures are
/// returned as errors; unparseable structured sections are not.
pub async fn run_task(kind: TaskKind, kb: &KnowledgeBase, ctx: &TaskContext) -> Result<TaskOutcome> {
    let missing = kb.missing(kind.dependencies());
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|k| k.name()).collect();
        return Err(Error::Precondition(format!(
            "{} requires {}",
            kind,
            names.join(", ")
        )));
    }

    let started = Instant::now();
    wlog_debug!("[tasks] {} starting {}", ctx.character_id.short(), kind);

    let (output, narrative, tokens_used, degraded) = match kind {
        TaskKind::ImageGeneration => {
            let (images, narrative, tokens) = generate_images(kb, ctx).await?;
            (images.into_output(), narrative, tokens, false)
        }
        TaskKind::Personality => run_text::<Personality>(kb, ctx).await?,
        TaskKind::BackstoryMotivation => run_text::<BackstoryMotivation>(kb, ctx).await?,
        TaskKind::VoiceDialogue => run_text::<VoiceDialogue>(kb, ctx).await?,
        TaskKind::PhysicalDescription => run_text::<PhysicalDescription>(kb, ctx).await?,
        TaskKind::StoryArc => run_text::<StoryArc>(kb, ctx).await?,
        TaskKind::Relationships => run_text::<Relationships>(kb, ctx).await?,
    };

    let elapsed = started.elapsed();
    wlog_debug!(
        "[tasks] {} finished {} in {:.2}s (~{} tokens{})",
        ctx.character_id.short(),
        kind,
        elapsed.as_secs_f64(),
        tokens_used,
        if degraded { ", degraded" } else { "" }
    );

    Ok(TaskOutcome {
        output,
        narrative,
        tokens_used,
        elapsed,
        degraded,
    })
}
