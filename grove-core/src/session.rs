//! GroveSession - the primary public API for playing the grove.
//!
//! The session owns the [`GameWorld`], the [`Collaborator`], a clock and the
//! patch queue. Synchronous operations run straight against the world.
//! Operations that need the oracle update the world right away and spawn
//! the call on tokio; each call sends exactly one [`Patch`] back, which is
//! only applied when the caller drains the queue with
//! [`apply_pending`](GroveSession::apply_pending) or
//! [`settle`](GroveSession::settle).
//!
//! Every clocked operation first runs the daily streak check, so missed days
//! are charged before anything else touches the character.
//!
//! Calls made outside a tokio runtime are held back and run by the next
//! `settle`, or spawned by an `apply_pending` made inside a runtime.

use crate::config::GroveConfig;
use crate::oracle::{ClaudeOracle, Collaborator, Oracle};
use crate::patch::{apply_patch, Applied, Patch, VisualRequest};
use crate::persist::{auto_save_path, PersistError, SavedGrove};
use crate::progression::StreakCheck;
use crate::quests::TaskDraft;
use crate::world::{
    Archetype, Character, Completion, FusionId, GameWorld, IdeaId, ItemId, LootOutcome, TaskId,
    WorryId,
};
use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from GroveSession operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No API key configured - set ANTHROPIC_API_KEY environment variable")]
    NoApiKey,

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A grove session.
pub struct GroveSession {
    world: GameWorld,
    collaborator: Collaborator,
    clock: Arc<dyn Clock>,
    /// `None` marks a call that died without answering.
    tx: mpsc::UnboundedSender<Option<Patch>>,
    rx: mpsc::UnboundedReceiver<Option<Patch>>,
    /// Calls made without a runtime, waiting to be run.
    deferred: Mutex<VecDeque<BoxFuture<'static, Patch>>>,
    /// Calls whose patch has not been applied yet, deferred ones included.
    in_flight: usize,
    save_dir: Option<PathBuf>,
}

impl GroveSession {
    /// Create a session backed by Claude.
    ///
    /// Requires `ANTHROPIC_API_KEY` environment variable to be set.
    pub fn new(config: GroveConfig) -> Result<Self, SessionError> {
        let oracle =
            ClaudeOracle::from_env(config.oracle.clone()).map_err(|_| SessionError::NoApiKey)?;
        Ok(Self::with_oracle(config, oracle))
    }

    /// Create a session with any oracle.
    pub fn with_oracle(config: GroveConfig, oracle: impl Oracle + 'static) -> Self {
        let mut character = Character::new(&config.character_name);
        character.forgiveness_buffer = config.rules.forgiveness_buffer;
        let world = GameWorld::new(character).with_rules(config.rules);
        Self::with_world(world, Collaborator::new(oracle), config.save_dir)
    }

    /// Create a session around an existing world.
    pub fn with_world(
        world: GameWorld,
        collaborator: Collaborator,
        save_dir: Option<PathBuf>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            world,
            collaborator,
            clock: Arc::new(SystemClock),
            tx,
            rx,
            deferred: Mutex::new(VecDeque::new()),
            in_flight: 0,
            save_dir,
        }
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Get the game world.
    pub fn world(&self) -> &GameWorld {
        &self.world
    }

    /// Get mutable access to the game world.
    pub fn world_mut(&mut self) -> &mut GameWorld {
        &mut self.world
    }

    pub fn collaborator(&self) -> &Collaborator {
        &self.collaborator
    }

    /// Number of oracle calls whose answer has not been applied.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Save the world to a JSON file.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let path = path.as_ref();
        SavedGrove::new(self.world.clone(), self.now())
            .save_json(path)
            .await?;
        tracing::info!(path = %path.display(), "grove saved");
        Ok(())
    }

    /// Replace the world with a saved one. Answers still in flight for the
    /// old world are applied to the loaded one: item and visual patches find
    /// nothing to change, while quests and generated loot are still added.
    pub async fn load(&mut self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let path = path.as_ref();
        let saved = SavedGrove::load_json(path).await?;
        self.world = saved.world;
        tracing::info!(path = %path.display(), name = %self.world.character.name, "grove loaded");
        Ok(())
    }

    /// Write the autosave when a save directory is configured.
    pub async fn checkpoint(&self) -> Result<Option<PathBuf>, SessionError> {
        let Some(dir) = &self.save_dir else {
            return Ok(None);
        };
        tokio::fs::create_dir_all(dir).await?;
        let path = auto_save_path(dir, &self.world.character.name);
        self.save(&path).await?;
        Ok(Some(path))
    }

    // ========================================================================
    // Clocked operations
    // ========================================================================

    /// Name the character and ask the oracle for a backstory.
    pub async fn create_character(&mut self, name: impl Into<String>, archetype: Archetype) {
        let name = name.into();
        let backstory = self.collaborator.generate_backstory(&name, archetype).await;
        self.world.create_character(name, archetype, backstory);
    }

    pub fn add_task(&mut self, draft: TaskDraft) -> TaskId {
        let now = self.touch();
        self.world.add_task(draft, now)
    }

    /// Complete a task. Missing loot is requested from the oracle and a new
    /// item gets a visual request.
    pub fn complete_task(&mut self, id: TaskId, in_flow: bool) -> Option<Completion> {
        let now = self.touch();
        let completion = self.world.complete_task(id, in_flow, now)?;
        match &completion.loot {
            LootOutcome::Requested(request) => {
                let collaborator = self.collaborator.clone();
                let request = request.clone();
                self.spawn(async move {
                    let item = collaborator
                        .generate_loot(&request.title, request.category, request.difficulty)
                        .await;
                    Patch::LootGenerated {
                        task_id: request.task_id,
                        item,
                    }
                });
            }
            LootOutcome::Item(item) => self.request_visual_for(*item),
            _ => {}
        }
        Some(completion)
    }

    /// Run the daily streak check. Clocked operations do this on their own;
    /// call it directly to learn what the check did.
    pub fn check_streak(&mut self) -> StreakCheck {
        let now = self.now();
        self.world.check_streak(now)
    }

    /// The current time, after the daily streak check.
    fn touch(&mut self) -> DateTime<Utc> {
        let now = self.now();
        match self.world.check_streak(now) {
            StreakCheck::SameDay => {}
            check => tracing::debug!(?check, "daily streak check"),
        }
        now
    }

    pub fn activate_potion(&mut self, task: impl Into<String>) -> bool {
        let now = self.touch();
        self.world.activate_potion(task, now)
    }

    pub fn micro_quest_remaining(&self) -> Option<Duration> {
        self.world.micro_quest_remaining(self.now())
    }

    pub fn add_idea(&mut self, text: impl Into<String>) -> IdeaId {
        let now = self.touch();
        self.world.add_idea(text, now)
    }

    pub fn harvest_idea(&mut self, id: IdeaId) -> Option<TaskId> {
        let now = self.touch();
        self.world.harvest_idea(id, now)
    }

    pub fn burn_worry(&mut self, text: impl Into<String>) -> WorryId {
        let now = self.touch();
        self.world.burn_worry(text, now)
    }

    // ========================================================================
    // Oracle-backed operations
    // ========================================================================

    /// Turn free text into quests once the oracle answers.
    pub fn capture_thought(&mut self, thought: impl Into<String>) {
        let thought = thought.into();
        self.touch();
        let collaborator = self.collaborator.clone();
        self.spawn(async move {
            Patch::ThoughtInterpreted {
                drafts: collaborator.interpret_thought(&thought).await,
            }
        });
    }

    /// Reserve mana for a fusion and ask the oracle for the result.
    pub fn fuse(&mut self, first: ItemId, second: ItemId) -> Option<FusionId> {
        let now = self.touch();
        let request = self.world.begin_fusion(first, second, now)?;
        let fusion = request.fusion;
        let collaborator = self.collaborator.clone();
        self.spawn(async move {
            Patch::FusionResolved {
                fusion: request.fusion,
                item: collaborator.fuse_items(&request.first, &request.second).await,
            }
        });
        Some(fusion)
    }

    /// Bind an item to a real-world object. The bound stats and the new
    /// visual are requested together.
    pub fn bind(&mut self, item: ItemId, real_name: &str) -> bool {
        self.touch();
        let Some(request) = self.world.begin_binding(item, real_name) else {
            return false;
        };
        let collaborator = self.collaborator.clone();
        self.spawn(async move {
            let (stats, image) = futures::join!(
                collaborator.bind_real_world_item(&request.artifact_name, &request.real_name),
                collaborator.generate_item_visual(&request.visual_name, &request.description),
            );
            Patch::ItemBound {
                item_id: request.item_id,
                real_name: request.real_name,
                stats,
                image,
            }
        });
        true
    }

    /// Request visuals for every item lacking one. Returns how many.
    pub fn request_visuals(&mut self) -> usize {
        let requests = self.world.visual_requests();
        let count = requests.len();
        for request in requests {
            self.spawn_visual(request);
        }
        count
    }

    /// Ask the grove spirit for fresh guidance.
    pub fn refresh_guidance(&mut self) {
        let status = self.world.status_summary();
        let collaborator = self.collaborator.clone();
        self.spawn(async move {
            Patch::Guidance {
                text: collaborator.guidance(&status).await,
            }
        });
    }

    /// Ask the muse for a gift. Refused while the muse hibernates.
    pub fn summon_muse(&mut self) -> bool {
        self.touch();
        if !self.world.muse_awake() {
            return false;
        }
        let energy = self.world.character.energy;
        let collaborator = self.collaborator.clone();
        self.spawn(async move {
            Patch::MuseGift {
                gift: collaborator.muse_gift(energy).await,
            }
        });
        true
    }

    // ========================================================================
    // Patch queue
    // ========================================================================

    /// Apply every patch that has already arrived. Inside a runtime, calls
    /// held back earlier are spawned now.
    pub fn apply_pending(&mut self) -> Vec<Applied> {
        self.launch_deferred();
        let mut applied = Vec::new();
        while let Ok(patch) = self.rx.try_recv() {
            applied.push(self.receive(patch));
        }
        applied
    }

    /// Wait until every call, including follow-ups such as visuals for new
    /// items, has been applied.
    pub async fn settle(&mut self) -> Vec<Applied> {
        let mut applied = Vec::new();
        loop {
            if let Some(call) = self.deferred().pop_front() {
                let patch = AssertUnwindSafe(call).catch_unwind().await.ok();
                applied.push(self.receive(patch));
                continue;
            }
            if self.in_flight == 0 {
                break;
            }
            match self.rx.recv().await {
                Some(patch) => applied.push(self.receive(patch)),
                None => break,
            }
        }
        applied
    }

    fn receive(&mut self, patch: Option<Patch>) -> Applied {
        match patch {
            Some(patch) => self.apply(patch),
            None => {
                tracing::warn!("oracle call died before answering");
                self.in_flight = self.in_flight.saturating_sub(1);
                Applied::Nothing
            }
        }
    }

    fn apply(&mut self, patch: Patch) -> Applied {
        self.in_flight = self.in_flight.saturating_sub(1);
        let now = self.now();
        let applied = apply_patch(&mut self.world, patch, now);
        if let Applied::ItemAdded(item) = applied {
            self.request_visual_for(item);
        }
        applied
    }

    fn request_visual_for(&mut self, item: ItemId) {
        if let Some(request) = self
            .world
            .inventory
            .get(item)
            .filter(|i| i.needs_visual())
            .map(VisualRequest::for_item)
        {
            self.spawn_visual(request);
        }
    }

    fn spawn_visual(&mut self, request: VisualRequest) {
        let collaborator = self.collaborator.clone();
        self.spawn(async move {
            Patch::ItemVisual {
                item_id: request.item_id,
                image: collaborator
                    .generate_item_visual(&request.name, &request.description)
                    .await,
            }
        });
    }

    fn spawn<F>(&mut self, call: F)
    where
        F: Future<Output = Patch> + Send + 'static,
    {
        self.in_flight += 1;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => self.spawn_on(&handle, call.boxed()),
            Err(_) => {
                tracing::debug!("no runtime, oracle call held until the next settle");
                self.deferred().push_back(call.boxed());
            }
        }
    }

    fn launch_deferred(&mut self) {
        if self.deferred().is_empty() {
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            for call in std::mem::take(self.deferred()) {
                self.spawn_on(&handle, call);
            }
        }
    }

    fn deferred(&mut self) -> &mut VecDeque<BoxFuture<'static, Patch>> {
        self.deferred.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_on(&self, handle: &tokio::runtime::Handle, call: BoxFuture<'static, Patch>) {
        let tx = self.tx.clone();
        let task = handle.spawn(call);
        handle.spawn(async move {
            // A panicked call still has to leave the in-flight count.
            let patch = task.await.ok();
            // The receiver lives as long as the session.
            let _ = tx.send(patch);
        });
    }
}

impl std::fmt::Debug for GroveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroveSession")
            .field("character", &self.world.character.name)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}
