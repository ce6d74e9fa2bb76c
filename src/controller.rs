use std::sync::Arc;

use parking_lot::Mutex;
use rand::RngCore;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::error::GenerateError;
use crate::events::StateEvent;
use crate::prompts::{build_prompt, Prompt};
use crate::providers::{ImageProvider, ImageResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Ready(ImageResult),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionState {
    pub selected_term: Option<String>,
    pub selected_style: String,
    pub phase: Phase,
}

/// Owns the one `SelectionState` and turns user actions into generation
/// cycles.
///
/// Overlapping cycles are not cancelled or ordered: each writes its outcome
/// when it resolves, so the last one to finish is what stays visible.
pub struct Controller {
    catalog: Arc<Catalog>,
    provider: Arc<dyn ImageProvider>,
    rng: Mutex<Box<dyn RngCore + Send>>,
    state: Mutex<SelectionState>,
    events: broadcast::Sender<StateEvent>,
}

impl Controller {
    pub fn new(
        catalog: Arc<Catalog>,
        provider: Arc<dyn ImageProvider>,
        rng: impl RngCore + Send + 'static,
    ) -> Arc<Self> {
        let (events, _rx) = broadcast::channel(256);
        let state = SelectionState {
            selected_term: None,
            selected_style: catalog.styles.default_style().to_string(),
            phase: Phase::Idle,
        };
        Arc::new(Self {
            catalog,
            provider,
            rng: Mutex::new(Box::new(rng)),
            state: Mutex::new(state),
            events,
        })
    }

    pub fn snapshot(&self) -> SelectionState {
        self.state.lock().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn select_term(self: &Arc<Self>, term: &str) -> GenerationCycle {
        let style = {
            let mut st = self.state.lock();
            st.selected_term = Some(term.to_string());
            st.selected_style.clone()
        };
        self.publish_selection(Some(term.to_string()), style.clone());
        self.start_cycle(Some(term.to_string()), style)
    }

    /// Returns `None` when no term has been picked yet; the style is still
    /// remembered for the next cycle.
    pub fn select_style(self: &Arc<Self>, style: &str) -> Option<GenerationCycle> {
        self.set_style(style).map(|t| self.start_cycle(Some(t), style.to_string()))
    }

    /// Records the style without starting a cycle. Returns the selected term.
    pub fn set_style(&self, style: &str) -> Option<String> {
        let term = {
            let mut st = self.state.lock();
            st.selected_style = style.to_string();
            st.selected_term.clone()
        };
        self.publish_selection(term.clone(), style.to_string());
        term
    }

    pub fn regenerate(self: &Arc<Self>) -> GenerationCycle {
        let (term, style) = {
            let st = self.state.lock();
            (st.selected_term.clone(), st.selected_style.clone())
        };
        self.start_cycle(term, style)
    }

    fn publish_selection(&self, term: Option<String>, style: String) {
        let _ = self.events.send(StateEvent::Selection { term, style });
    }

    /// Synchronous half of a cycle: resolve the prompt and move to `Loading`,
    /// or straight to `Failed` if there is nothing to send.
    fn start_cycle(self: &Arc<Self>, term: Option<String>, style: String) -> GenerationCycle {
        let id = Uuid::new_v4().to_string();
        let prompt = match &term {
            None => Err(GenerateError::NoTermSelected),
            Some(t) => {
                let mut rng = self.rng.lock();
                build_prompt(&self.catalog, t, &style, &mut *rng)
            }
        };

        match &prompt {
            Ok(p) => {
                tracing::info!(cycle_id = %id, term = %p.term, style = %p.style, "generation started");
                self.state.lock().phase = Phase::Loading;
                let _ = self.events.send(StateEvent::Loading { cycle_id: id.clone(), term, style });
            }
            Err(e) => self.fail(&id, e),
        }

        GenerationCycle { ctl: self.clone(), id, prompt }
    }

    fn fail(&self, id: &str, e: &GenerateError) {
        tracing::warn!(cycle_id = %id, code = e.code(), error = %e, "generation failed");
        self.state.lock().phase = Phase::Failed(e.to_string());
        let _ = self.events.send(StateEvent::Failed {
            cycle_id: id.to_string(),
            error: e.to_string(),
            code: e.code().to_string(),
        });
    }

    fn complete(&self, id: &str, res: &ImageResult) {
        tracing::info!(cycle_id = %id, bytes = res.bytes.len(), model = %res.model, "generation finished");
        self.state.lock().phase = Phase::Ready(res.clone());
        let _ = self.events.send(StateEvent::Ready {
            cycle_id: id.to_string(),
            prompt: res.prompt_used.clone(),
            model: res.model.clone(),
        });
    }
}

/// The asynchronous half of a generation cycle. Already in `Loading` (or
/// `Failed`) by the time this exists.
#[must_use = "a generation cycle does nothing until run"]
pub struct GenerationCycle {
    ctl: Arc<Controller>,
    id: String,
    prompt: Result<Prompt, GenerateError>,
}

impl GenerationCycle {
    /// Calls the provider and records the outcome. The error is also
    /// returned to the caller; the controller never treats it as fatal.
    pub async fn run(self) -> Result<ImageResult, GenerateError> {
        let prompt = self.prompt?;
        match self.ctl.provider.generate(&prompt.text).await {
            Ok(res) => {
                self.ctl.complete(&self.id, &res);
                Ok(res)
            }
            Err(e) => {
                self.ctl.fail(&self.id, &e);
                Err(e)
            }
        }
    }
}
