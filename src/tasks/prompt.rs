//! Instruction building for the text tasks.
//!
//! Every instruction carries the character overview, the mode directive,
//! whatever upstream knowledge-base context the task reads, and the
//! NARRATIVE / STRUCTURED output contract that `parse` expects.

use std::fmt::Write as _;

use super::TaskKind;
use crate::character::{CharacterSeed, KnowledgeBase};
use crate::generation::GenerationRequest;
use crate::Result;

struct TaskBrief {
    expert: &'static str,
    goal: &'static str,
    ask: &'static str,
    shape: &'static str,
}

fn brief(kind: TaskKind) -> TaskBrief {
    match kind {
        TaskKind::Personality => TaskBrief {
            expert: "a character psychology expert",
            goal: "Expand the character's personality into a psychological profile: \
                   4-6 core traits, 2-4 deep fears, 2-3 secrets, an emotional baseline \
                   and 3-5 triggers.",
            ask: "Analyze {name}'s personality in depth.",
            shape: r#"{"core_traits": ["..."], "fears": ["..."], "secrets": ["..."], "emotional_baseline": "...", "triggers": ["..."]}"#,
        },
        TaskKind::BackstoryMotivation => TaskBrief {
            expert: "a character backstory and motivation expert",
            goal: "Build a life timeline, the formative experiences behind it, surface \
                   and deep goals, and the internal conflicts they create.",
            ask: "Create a detailed backstory and motivation profile for {name}.",
            shape: r#"{"timeline": [{"age": 12, "event": "..."}], "formative_experiences": ["..."], "goals": {"surface": "...", "deep": "..."}, "internal_conflicts": ["..."]}"#,
        },
        TaskKind::VoiceDialogue => TaskBrief {
            expert: "a dialogue and voice expert",
            goal: "Define how the character speaks: speech pattern, verbal tics, \
                   vocabulary, and one sample line each for confident, vulnerable, \
                   stressed and sarcastic moments.",
            ask: "Create a detailed voice and dialogue profile for {name}.",
            shape: r#"{"speech_pattern": "...", "verbal_tics": ["..."], "vocabulary": "...", "sample_dialogue": {"confident": "...", "vulnerable": "...", "stressed": "...", "sarcastic": "..."}}"#,
        },
        TaskKind::PhysicalDescription => TaskBrief {
            expert: "a physical characterization expert",
            goal: "Describe how the character inhabits their body: mannerisms, body \
                   language, movement style and physical quirks that reveal who they are.",
            ask: "Create a detailed physical presence profile for {name}.",
            shape: r#"{"mannerisms": ["..."], "body_language": "...", "movement_style": "...", "physical_quirks": ["..."]}"#,
        },
        TaskKind::StoryArc => TaskBrief {
            expert: "a narrative structure expert",
            goal: "Chart the character's arc through the story: narrative role, arc type, \
                   starting point, key moments, transformation and ending point.",
            ask: "Design the story arc for {name}.",
            shape: r#"{"role": "...", "arc_type": "...", "starting_point": "...", "key_moments": ["..."], "transformation": "...", "ending_point": "..."}"#,
        },
        TaskKind::Relationships => TaskBrief {
            expert: "a relationship dynamics expert",
            goal: "Define the character's key relationships: who, what kind, how they \
                   interact and how each relationship evolves. Undeveloped characters may \
                   be placeholders such as \"The Mentor (TBD)\".",
            ask: "Create a detailed relationships profile for {name}.",
            shape: r#"{"relationships": [{"character": "...", "type": "...", "dynamic": "...", "evolution": "..."}]}"#,
        },
        TaskKind::ImageGeneration => TaskBrief {
            expert: "a character concept artist",
            goal: "Describe the character visually.",
            ask: "Render {name}.",
            shape: "{}",
        },
    }
}

fn overview(character: &CharacterSeed, kb: &KnowledgeBase) -> String {
    let storyline = &kb.input().storyline;
    let mut out = format!(
        "CHARACTER OVERVIEW:\n- Name: {}\n- Basic Personality: {}\n- Appearance: {}\n- Role: {}\n- Story Context: {}\n- Tone: {}",
        character.name,
        character.personality,
        character.appearance,
        character.role,
        storyline.overview,
        storyline.tone
    );
    if let Some(genre) = &storyline.genre {
        let _ = write!(out, "\n- Genre: {}", genre);
    }
    if let Some(setting) = &storyline.setting {
        let _ = write!(out, "\n- Setting: {}", setting);
    }
    out
}

/// Context block for one upstream field, if the knowledge base holds it.
fn context_block(kb: &KnowledgeBase, field: TaskKind) -> Option<String> {
    match field {
        TaskKind::Personality => kb.personality().map(|p| {
            format!(
                "PERSONALITY:\n- Core Traits: {}\n- Fears: {}\n- Secrets: {}\n- Emotional Baseline: {}\n- Triggers: {}",
                p.core_traits.join(", "),
                p.fears.join(", "),
                p.secrets.join(", "),
                p.emotional_baseline,
                p.triggers.join(", ")
            )
        }),
        TaskKind::BackstoryMotivation => kb.backstory_motivation().map(|b| {
            let events: Vec<&str> = b.timeline.iter().take(3).map(|e| e.event.as_str()).collect();
            format!(
                "BACKSTORY:\n- Key Events: {}\n- Formative Experiences: {}\n- Surface Goal: {}\n- Deep Goal: {}\n- Internal Conflicts: {}",
                events.join("; "),
                b.formative_experiences.join("; "),
                b.goals.surface,
                b.goals.deep,
                b.internal_conflicts.join(", ")
            )
        }),
        TaskKind::StoryArc => kb.story_arc().map(|a| {
            format!(
                "STORY ARC:\n- Role: {}\n- Arc Type: {}\n- Transformation: {}",
                a.role, a.arc_type, a.transformation
            )
        }),
        TaskKind::PhysicalDescription => kb.physical_description().map(|d| {
            format!(
                "PHYSICAL PRESENCE:\n- Mannerisms: {}\n- Body Language: {}\n- Movement: {}\n- Quirks: {}",
                d.mannerisms.join(", "),
                d.body_language,
                d.movement_style,
                d.physical_quirks.join(", ")
            )
        }),
        TaskKind::VoiceDialogue => kb
            .voice_dialogue()
            .map(|v| format!("VOICE:\n- Speech Pattern: {}\n- Vocabulary: {}", v.speech_pattern, v.vocabulary)),
        TaskKind::Relationships | TaskKind::ImageGeneration => None,
    }
}

/// Build the generation request for a text task.
pub fn build_request(kind: TaskKind, kb: &KnowledgeBase) -> Result<GenerationRequest> {
    let character = kb.primary_character()?;
    let brief = brief(kind);

    let mut system = format!(
        "You are {} working on a character for a {} story.\n\n{}\n\n{}\n\nDEPTH MODE: {}\n{}",
        brief.expert,
        kb.input().storyline.tone,
        brief.goal,
        overview(character, kb),
        kb.mode(),
        kb.mode().directive()
    );

    let context: Vec<String> = kind
        .dependencies()
        .iter()
        .chain(kind.optional_context())
        .filter_map(|field| context_block(kb, *field))
        .collect();
    if !context.is_empty() {
        let _ = write!(system, "\n\nESTABLISHED CONTEXT:\n{}", context.join("\n\n"));
    }

    let _ = write!(
        system,
        "\n\nMake it specific to this character, not generic.\n\
         First, provide a rich NARRATIVE description (2-3 paragraphs).\n\
         Then, provide the STRUCTURED data in JSON format.\n\n\
         Format:\nNARRATIVE:\n[Your narrative here]\n\nSTRUCTURED:\n{}",
        brief.shape
    );

    let user = format!(
        "{} Provide both narrative and structured output.",
        brief.ask.replace("{name}", &character.name)
    );

    Ok(GenerationRequest::new(system, user)
        .with_temperature(kind.temperature())
        .with_max_tokens(kind.max_tokens()))
}

/// Visual style shared by every image view of a character.
pub fn style_context(kb: &KnowledgeBase) -> String {
    let mut style = format!("{} tone", kb.input().storyline.tone);
    if let Some(genre) = &kb.input().storyline.genre {
        let _ = write!(style, ", {} genre", genre);
    }
    if let Some(p) = kb.personality() {
        let _ = write!(style, ", emotional baseline: {}", p.emotional_baseline);
    }
    style
}
