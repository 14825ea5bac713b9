//! chatty: an LLM side panel for a live Jupyter notebook.
//!
//! Queries typed into the panel go to an LLM-aware kernel as `llm_request`
//! messages. Replies stream back on iopub and are turned into notebook
//! cells or a dataset preview.

pub mod builder;
pub mod console;
pub mod dispatch;
pub mod dump;
pub mod kernel;
pub mod notebook_state;
pub mod preview;
pub mod router;
pub mod session;
pub mod settings;

pub use builder::{BuildError, MessageBuilder};
pub use dispatch::{ContextForm, DispatchError, DispatchOutcome, InputEvent, Key, QueryBox};
pub use notebook_state::{CellType, DocumentError, NotebookState};
pub use preview::{render_csv, PresentationNode, PreviewPane, TextNode};
pub use router::{classify, CellInsertion, MessageRouter, Reaction, RouteOutcome};
pub use session::{KernelHandle, KernelReady, SessionContext};
