//! Test fixtures for integration tests.
//!
//! Provides:
//! - A scripted text generator that recognises each task from its instruction
//! - A mock image generator returning raw bytes
//! - Failure injection and per-task delays to scramble completion order

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::mpsc;

use weave::character::{CharacterSeed, ConceptInput, Storyline};
use weave::generation::{
    Generation, GenerationRequest, ImageArtifact, ImageData, ImageGenerator, ImageRequest,
    TextGenerator,
};
use weave::pipeline::{ApprovalPolicy, ProgressEvent};
use weave::store::{FsStore, MemoryStore, Store};
use weave::tasks::TaskKind;
use weave::{Backends, CharacterService, Error, Result};

/// Which task an instruction belongs to, from the expert it addresses.
pub fn detect_task(system: &str) -> Option<TaskKind> {
    const MARKERS: [(&str, TaskKind); 6] = [
        ("character psychology expert", TaskKind::Personality),
        ("backstory and motivation expert", TaskKind::BackstoryMotivation),
        ("dialogue and voice expert", TaskKind::VoiceDialogue),
        ("physical characterization expert", TaskKind::PhysicalDescription),
        ("narrative structure expert", TaskKind::StoryArc),
        ("relationship dynamics expert", TaskKind::Relationships),
    ];
    MARKERS
        .iter()
        .find(|(marker, _)| system.contains(marker))
        .map(|(_, kind)| *kind)
}

/// Canned well-formed response for each text task.
pub fn canned_response(kind: TaskKind) -> String {
    let structured = match kind {
        TaskKind::Personality => {
            r#"{"core_traits": ["wary", "loyal", "resourceful", "dry-witted"], "fears": ["being owed nothing"], "secrets": ["sold out her first crew"], "emotional_baseline": "watchful calm", "triggers": ["debts", "locked doors"]}"#
        }
        TaskKind::BackstoryMotivation => {
            r#"{"timeline": [{"age": 9, "event": "orphaned in the dock riots"}, {"age": 19, "event": "first solo run"}], "formative_experiences": ["the riots"], "goals": {"surface": "clear her ship's debt", "deep": "be trusted again"}, "internal_conflicts": ["freedom vs belonging"]}"#
        }
        TaskKind::VoiceDialogue => {
            r#"```json
{"speech_pattern": "clipped", "verbal_tics": ["right then"], "vocabulary": "dockside slang", "sample_dialogue": {"confident": "I know every tide in this harbour.", "vulnerable": "I didn't mean to leave them.", "stressed": "Move. Now.", "sarcastic": "Oh, a plan. How novel."}}
```"#
        }
        TaskKind::PhysicalDescription => {
            r#"{"mannerisms": ["taps her knife hilt"], "body_language": "coiled, back to the wall", "movement_style": "quick and economical", "physical_quirks": ["scar across the left palm"]}"#
        }
        TaskKind::StoryArc => {
            r#"{"role": "reluctant ally", "arc_type": "redemption", "starting_point": "owes everyone", "key_moments": ["betrays the guild", "returns for the crew"], "transformation": "learns to stay", "ending_point": "captain of her own crew"}"#
        }
        TaskKind::Relationships => {
            r#"{"relationships": [{"character": "Captain Oren", "type": "creditor", "dynamic": "mutual suspicion", "evolution": "grudging respect"}, {"character": "The Mentor (TBD)", "type": "mentor", "dynamic": "distant", "evolution": "reconciled"}]}"#
        }
        TaskKind::ImageGeneration => "{}",
    };
    format!(
        "NARRATIVE:\n{} narrative for Mara Voss.\n\nSTRUCTURED:\n{}",
        kind, structured
    )
}

/// Scripted text backend. Answers by task, with optional failures,
/// overrides and delays.
#[derive(Default)]
pub struct MockText {
    fail: HashSet<TaskKind>,
    overrides: HashMap<TaskKind, String>,
    delays: HashMap<TaskKind, Duration>,
    calls: Mutex<Vec<TaskKind>>,
}

impl MockText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, kind: TaskKind) -> Self {
        self.fail.insert(kind);
        self
    }

    pub fn replying(mut self, kind: TaskKind, raw: impl Into<String>) -> Self {
        self.overrides.insert(kind, raw.into());
        self
    }

    pub fn delayed(mut self, kind: TaskKind, delay: Duration) -> Self {
        self.delays.insert(kind, delay);
        self
    }

    /// Tasks in the order their calls finished.
    pub fn calls(&self) -> Vec<TaskKind> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for MockText {
    fn name(&self) -> &str {
        "mock-text"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        let kind = detect_task(&request.system)
            .ok_or_else(|| Error::Generation("unrecognised instruction".into()))?;
        if let Some(delay) = self.delays.get(&kind) {
            tokio::time::sleep(*delay).await;
        }
        self.calls.lock().unwrap().push(kind);
        if self.fail.contains(&kind) {
            return Err(Error::Generation(format!("{} backend unavailable", kind)));
        }
        Ok(Generation::Text(
            self.overrides
                .get(&kind)
                .cloned()
                .unwrap_or_else(|| canned_response(kind)),
        ))
    }
}

/// Image backend returning a few PNG-ish bytes per view.
#[derive(Default)]
pub struct MockImage {
    fail: bool,
    requests: Mutex<Vec<ImageRequest>>,
}

impl MockImage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<ImageRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageGenerator for MockImage {
    fn name(&self) -> &str {
        "mock-image"
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<ImageArtifact> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(Error::Generation("image backend unavailable".into()));
        }
        Ok(ImageArtifact {
            data: ImageData::Bytes {
                data: b"\x89PNG mock".to_vec(),
                extension: "png".into(),
            },
            narrative: "A rendered view.".into(),
        })
    }
}

pub fn concept() -> ConceptInput {
    ConceptInput {
        characters: vec![
            CharacterSeed {
                name: "Mara Voss".into(),
                personality: "guarded smuggler with a soft spot for strays".into(),
                appearance: "wiry, salt-bleached braid, oilskin coat".into(),
                role: "smuggler".into(),
            },
            CharacterSeed {
                name: "Captain Oren".into(),
                role: "creditor".into(),
                ..Default::default()
            },
        ],
        storyline: Storyline {
            overview: "A harbour city drowning in debt.".into(),
            tone: "gritty".into(),
            genre: Some("maritime fantasy".into()),
            setting: None,
        },
    }
}

/// A service over an in-memory store with mock backends.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub text: Arc<MockText>,
    pub image: Arc<MockImage>,
    pub service: CharacterService,
}

impl Harness {
    pub fn new(text: MockText) -> Self {
        Self::with_policy(text, ApprovalPolicy::Advisory)
    }

    pub fn with_policy(text: MockText, policy: ApprovalPolicy) -> Self {
        Self::build(text, MockImage::new(), policy)
    }

    pub fn build(text: MockText, image: MockImage, policy: ApprovalPolicy) -> Self {
        let store = Arc::new(MemoryStore::new());
        let text = Arc::new(text);
        let image = Arc::new(image);
        let service = CharacterService::new(store.clone())
            .with_backends(Backends::new(text.clone(), image.clone()))
            .with_policy(policy);
        Self {
            store,
            text,
            image,
            service,
        }
    }
}

/// A service over a filesystem store in a temporary directory.
pub fn fs_service(text: MockText) -> (TempDir, Arc<FsStore>, CharacterService) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let store = Arc::new(FsStore::new(temp_dir.path()));
    let service = CharacterService::new(store.clone() as Arc<dyn Store>)
        .with_backends(Backends::new(Arc::new(text), Arc::new(MockImage::new())));
    (temp_dir, store, service)
}

/// Collect every event still buffered on `rx`.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
