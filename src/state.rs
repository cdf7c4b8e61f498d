//! Upload → analyze → render lifecycle.
//!
//! The machine is synchronous; the network call happens outside of it.
//! `begin_analysis` hands out a ticket and the caller reports back through
//! `complete`. Every change of image bumps a generation so that a reply for
//! an image that has since been cleared or replaced is dropped.

use std::mem;

use crate::codec::UploadedImage;
use crate::error::{AnalysisError, CodecError, NoImageError};
use crate::gemini::AnalysisOutcome;

#[derive(Debug)]
pub enum ApplicationState {
    Empty,
    Ready(UploadedImage),
    Analyzing(UploadedImage),
    Succeeded(UploadedImage, AnalysisOutcome),
    Failed(Option<UploadedImage>, String),
}

impl ApplicationState {
    pub fn image(&self) -> Option<&UploadedImage> {
        match self {
            Self::Empty | Self::Failed(None, _) => None,
            Self::Ready(image)
            | Self::Analyzing(image)
            | Self::Succeeded(image, _)
            | Self::Failed(Some(image), _) => Some(image),
        }
    }

    fn into_image(self) -> Option<UploadedImage> {
        match self {
            Self::Empty | Self::Failed(None, _) => None,
            Self::Ready(image)
            | Self::Analyzing(image)
            | Self::Succeeded(image, _)
            | Self::Failed(Some(image), _) => Some(image),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Ready(_) => "ready",
            Self::Analyzing(_) => "analyzing",
            Self::Succeeded(..) => "succeeded",
            Self::Failed(..) => "failed",
        }
    }
}

/// What the caller needs to issue one analysis call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisTicket {
    pub generation: u64,
    pub payload: String,
    pub media_type: String,
}

#[derive(Debug)]
pub struct AnalysisStateMachine {
    state: ApplicationState,
    generation: u64,
}

impl Default for AnalysisStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisStateMachine {
    pub fn new() -> Self {
        Self {
            state: ApplicationState::Empty,
            generation: 0,
        }
    }

    pub fn state(&self) -> &ApplicationState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_analyzing(&self) -> bool {
        matches!(self.state, ApplicationState::Analyzing(_))
    }

    /// Whether the analyze button should be enabled.
    pub fn can_analyze(&self) -> bool {
        self.state.image().is_some() && !self.is_analyzing()
    }

    /// Loads a new image, dropping (and so releasing) any previous one.
    pub fn select_image(&mut self, image: UploadedImage) {
        self.generation += 1;
        let previous = mem::replace(&mut self.state, ApplicationState::Ready(image));
        tracing::debug!(from = previous.name(), generation = self.generation, "image selected");
    }

    /// Returns to `Empty`. Returns false if already empty.
    pub fn clear(&mut self) -> bool {
        if matches!(self.state, ApplicationState::Empty) {
            return false;
        }
        self.generation += 1;
        let previous = mem::replace(&mut self.state, ApplicationState::Empty);
        tracing::debug!(from = previous.name(), generation = self.generation, "cleared");
        true
    }

    /// A selected file could not be read. The loaded image, if any, is kept.
    ///
    /// The image does not change, so the generation stays put. While a call
    /// is in flight the error is only logged and the call keeps its slot.
    pub fn read_failed(&mut self, error: &CodecError) {
        tracing::warn!(%error, "upload could not be read");
        if self.is_analyzing() {
            return;
        }
        let previous = mem::replace(&mut self.state, ApplicationState::Empty);
        self.state = ApplicationState::Failed(previous.into_image(), error.to_string());
    }

    /// Moves to `Analyzing` and returns the ticket for the call.
    ///
    /// `Ok(None)` while a call is already in flight. With nothing loaded the
    /// state becomes `Failed(None, ..)` and no call must be made.
    pub fn begin_analysis(&mut self) -> Result<Option<AnalysisTicket>, NoImageError> {
        match mem::replace(&mut self.state, ApplicationState::Empty) {
            in_flight @ ApplicationState::Analyzing(_) => {
                self.state = in_flight;
                Ok(None)
            }
            previous => match previous.into_image() {
                Some(image) => {
                    let ticket = AnalysisTicket {
                        generation: self.generation,
                        payload: image.payload.clone(),
                        media_type: image.media_type.clone(),
                    };
                    self.state = ApplicationState::Analyzing(image);
                    Ok(Some(ticket))
                }
                None => {
                    self.state = ApplicationState::Failed(None, NoImageError.to_string());
                    Err(NoImageError)
                }
            },
        }
    }

    /// Applies a finished call. Returns false when the result is stale.
    pub fn complete(
        &mut self,
        generation: u64,
        result: Result<AnalysisOutcome, AnalysisError>,
    ) -> bool {
        if generation != self.generation || !self.is_analyzing() {
            tracing::info!(
                generation,
                current = self.generation,
                "discarding result for an image that is no longer loaded"
            );
            return false;
        }

        let ApplicationState::Analyzing(image) =
            mem::replace(&mut self.state, ApplicationState::Empty)
        else {
            return false;
        };

        self.state = match result {
            Ok(outcome) => ApplicationState::Succeeded(image, outcome),
            Err(error) => ApplicationState::Failed(Some(image), error.message().to_string()),
        };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode, PreviewStore};
    use crate::gemini::WebReference;
    use axum::body::Bytes;
    use std::time::Duration;

    fn image(store: &PreviewStore, media_type: &str) -> UploadedImage {
        encode(Bytes::from_static(b"pixels"), Some(media_type), store)
    }

    fn outcome(text: &str) -> AnalysisOutcome {
        AnalysisOutcome {
            description: text.to_string(),
            web_matches: vec![WebReference {
                uri: "https://example.com/bike".to_string(),
                title: Some("Bike Shop".to_string()),
            }],
            model: "gemini-2.5-flash".to_string(),
            processing_time: Duration::from_millis(12),
        }
    }

    #[test]
    fn analyze_without_image_fails_locally() {
        let mut machine = AnalysisStateMachine::new();
        assert!(!machine.can_analyze());
        assert_eq!(machine.begin_analysis(), Err(NoImageError));
        match machine.state() {
            ApplicationState::Failed(None, message) => {
                assert_eq!(message, "Please upload an image first.")
            }
            other => panic!("unexpected state {other:?}"),
        }
        // Still nothing to analyze.
        assert_eq!(machine.begin_analysis(), Err(NoImageError));
    }

    #[test]
    fn select_then_analyze_then_succeed() {
        let store = PreviewStore::new();
        let mut machine = AnalysisStateMachine::new();
        machine.select_image(image(&store, "image/jpeg"));
        assert!(matches!(machine.state(), ApplicationState::Ready(_)));
        assert!(machine.can_analyze());

        let ticket = machine.begin_analysis().unwrap().unwrap();
        assert_eq!(ticket.media_type, "image/jpeg");
        assert_eq!(ticket.payload, "cGl4ZWxz");
        assert!(machine.is_analyzing());
        assert!(!machine.can_analyze());

        assert!(machine.complete(ticket.generation, Ok(outcome("A red bicycle."))));
        match machine.state() {
            ApplicationState::Succeeded(_, outcome) => {
                assert_eq!(outcome.description, "A red bicycle.")
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn analyze_is_a_no_op_while_in_flight() {
        let store = PreviewStore::new();
        let mut machine = AnalysisStateMachine::new();
        machine.select_image(image(&store, "image/png"));
        let first = machine.begin_analysis().unwrap();
        assert!(first.is_some());
        assert_eq!(machine.begin_analysis(), Ok(None));
        assert_eq!(machine.begin_analysis(), Ok(None));
        assert!(machine.is_analyzing());
    }

    #[test]
    fn failure_keeps_image_and_allows_retry() {
        let store = PreviewStore::new();
        let mut machine = AnalysisStateMachine::new();
        machine.select_image(image(&store, "image/png"));
        let ticket = machine.begin_analysis().unwrap().unwrap();
        let error = AnalysisError::from_cause("503 Service Unavailable");
        assert!(machine.complete(ticket.generation, Err(error)));

        match machine.state() {
            ApplicationState::Failed(Some(_), message) => {
                assert!(message.contains("503 Service Unavailable"))
            }
            other => panic!("unexpected state {other:?}"),
        }
        assert!(machine.can_analyze());
        assert!(machine.begin_analysis().unwrap().is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn clear_releases_preview_once() {
        let store = PreviewStore::new();
        let mut machine = AnalysisStateMachine::new();
        machine.select_image(image(&store, "image/png"));
        assert_eq!(store.len(), 1);

        assert!(machine.clear());
        assert!(store.is_empty());
        assert!(matches!(machine.state(), ApplicationState::Empty));

        let generation = machine.generation();
        assert!(!machine.clear());
        assert_eq!(machine.generation(), generation);
    }

    #[test]
    fn replacing_image_releases_the_old_preview() {
        let store = PreviewStore::new();
        let mut machine = AnalysisStateMachine::new();
        machine.select_image(image(&store, "image/png"));
        let old_id = machine.state().image().unwrap().preview.id();

        machine.select_image(image(&store, "image/webp"));
        assert_eq!(store.len(), 1);
        assert!(store.get(old_id).is_none());
        assert_eq!(machine.state().image().unwrap().media_type, "image/webp");
    }

    #[test]
    fn stale_result_after_clear_is_discarded() {
        let store = PreviewStore::new();
        let mut machine = AnalysisStateMachine::new();
        machine.select_image(image(&store, "image/png"));
        let ticket = machine.begin_analysis().unwrap().unwrap();

        machine.clear();
        assert!(!machine.complete(ticket.generation, Ok(outcome("late"))));
        assert!(matches!(machine.state(), ApplicationState::Empty));
    }

    #[test]
    fn stale_result_after_replacement_is_discarded() {
        let store = PreviewStore::new();
        let mut machine = AnalysisStateMachine::new();
        machine.select_image(image(&store, "image/png"));
        let old = machine.begin_analysis().unwrap().unwrap();

        machine.select_image(image(&store, "image/jpeg"));
        let new = machine.begin_analysis().unwrap().unwrap();

        assert!(!machine.complete(old.generation, Ok(outcome("old"))));
        assert!(machine.is_analyzing());
        assert!(machine.complete(new.generation, Ok(outcome("new"))));
        assert!(matches!(machine.state(), ApplicationState::Succeeded(..)));
    }

    #[test]
    fn read_failure_keeps_loaded_image() {
        let store = PreviewStore::new();
        let mut machine = AnalysisStateMachine::new();
        machine.select_image(image(&store, "image/png"));
        machine.read_failed(&CodecError::Read("connection reset".to_string()));

        match machine.state() {
            ApplicationState::Failed(Some(image), message) => {
                assert_eq!(image.media_type, "image/png");
                assert_eq!(message, "Failed to read the selected file: connection reset");
            }
            other => panic!("unexpected state {other:?}"),
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn read_failure_during_analysis_keeps_the_call() {
        let store = PreviewStore::new();
        let mut machine = AnalysisStateMachine::new();
        machine.select_image(image(&store, "image/png"));
        let ticket = machine.begin_analysis().unwrap().unwrap();
        let generation = machine.generation();

        machine.read_failed(&CodecError::Read("length limit exceeded".to_string()));
        assert!(machine.is_analyzing());
        assert!(!machine.can_analyze());
        assert_eq!(machine.generation(), generation);
        assert_eq!(machine.begin_analysis(), Ok(None));

        assert!(machine.complete(ticket.generation, Ok(outcome("A red bicycle."))));
        assert!(matches!(machine.state(), ApplicationState::Succeeded(..)));
    }

    #[test]
    fn dropping_the_machine_releases_the_preview() {
        let store = PreviewStore::new();
        let mut machine = AnalysisStateMachine::new();
        machine.select_image(image(&store, "image/png"));
        drop(machine);
        assert!(store.is_empty());
    }
}
