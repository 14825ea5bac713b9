//! Dataset preview rendering.

use chatty_messages::PreviewPayload;

/// A node whose text content can be replaced wholesale.
pub trait PresentationNode: Send {
    fn set_text_content(&mut self, text: &str);
    fn text_content(&self) -> &str;
}

/// In-memory presentation node.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TextNode {
    text: String,
}

impl PresentationNode for TextNode {
    fn set_text_content(&mut self, text: &str) {
        self.text = text.to_string();
    }

    fn text_content(&self) -> &str {
        &self.text
    }
}

/// Join fields with `,` and rows with `\n`. Fields are not quoted.
pub fn render_csv(rows: &[Vec<String>]) -> String {
    rows.iter()
        .map(|row| row.join(","))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct PreviewPane {
    node: Box<dyn PresentationNode>,
    dataset_name: Option<String>,
}

impl Default for PreviewPane {
    fn default() -> Self {
        Self::new(Box::new(TextNode::default()))
    }
}

impl PreviewPane {
    pub fn new(node: Box<dyn PresentationNode>) -> Self {
        Self {
            node,
            dataset_name: None,
        }
    }

    /// Render `payload` into the node, replacing whatever was shown before.
    pub fn show(&mut self, payload: &PreviewPayload) {
        let text = render_csv(&payload.csv);
        self.node.set_text_content(&text);
        self.dataset_name = payload.name.clone();
    }

    pub fn text(&self) -> &str {
        self.node.text_content()
    }

    pub fn dataset_name(&self) -> Option<&str> {
        self.dataset_name.as_deref()
    }
}
