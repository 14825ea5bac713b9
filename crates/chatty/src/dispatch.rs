//! Query and context-setup controls.
//!
//! Both controls accept the same two triggers: Enter on the input or a
//! click on the submit control. Either one ends up in the control's
//! `submit`.

use chatty_messages::OutboundPayload;
use log::warn;
use serde_json::Value;

use crate::builder::BuildError;
use crate::session::SessionContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Escape,
    Tab,
    Char(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    KeyDown(Key),
    SubmitClicked,
}

impl InputEvent {
    pub fn is_submit(&self) -> bool {
        matches!(self, InputEvent::KeyDown(Key::Enter) | InputEvent::SubmitClicked)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The event was not a submit trigger.
    Ignored,
    /// No kernel attached; nothing was sent.
    NoKernel,
    Sent { msg_id: String },
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("context info is not valid JSON: {0}")]
    InvalidContext(#[source] serde_json::Error),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("failed to send to kernel: {0}")]
    Transport(String),
}

/// Free-text query input.
#[derive(Debug, Default, Clone)]
pub struct QueryBox {
    value: String,
}

impl QueryBox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }

    pub fn handle(
        &mut self,
        event: InputEvent,
        session: &SessionContext,
    ) -> Result<DispatchOutcome, DispatchError> {
        if !event.is_submit() {
            return Ok(DispatchOutcome::Ignored);
        }
        self.submit(session)
    }

    /// Send the current text as an `llm_request`. The text is kept so the
    /// user can edit and resend.
    pub fn submit(&self, session: &SessionContext) -> Result<DispatchOutcome, DispatchError> {
        session.send(&OutboundPayload::query(self.value.clone()))
    }
}

/// Context name plus a JSON text area describing the context.
#[derive(Debug, Default, Clone)]
pub struct ContextForm {
    context: String,
    info_text: String,
    error: Option<String>,
}

impl ContextForm {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            ..Self::default()
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn set_context(&mut self, context: impl Into<String>) {
        self.context = context.into();
    }

    pub fn set_info_text(&mut self, text: impl Into<String>) {
        self.info_text = text.into();
    }

    /// Inline error from the last failed submit.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn handle(
        &mut self,
        event: InputEvent,
        session: &SessionContext,
    ) -> Result<DispatchOutcome, DispatchError> {
        if !event.is_submit() {
            return Ok(DispatchOutcome::Ignored);
        }
        self.submit(session)
    }

    pub fn submit(&mut self, session: &SessionContext) -> Result<DispatchOutcome, DispatchError> {
        let context_info: Value = match serde_json::from_str(&self.info_text) {
            Ok(value) => value,
            Err(e) => {
                let err = DispatchError::InvalidContext(e);
                warn!("[dispatch] {}", err);
                self.error = Some(err.to_string());
                return Err(err);
            }
        };
        self.error = None;
        session.send(&OutboundPayload::context_setup(
            self.context.clone(),
            context_info,
        ))
    }
}
