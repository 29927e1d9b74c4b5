use ego_tree::NodeRef;
use ego_tree::iter::Edge;
use scraper::{Html, Node};

/// Markup-to-plain-text capability used by the article extractor. Kept
/// narrow so the HTML parser can be replaced without touching extraction.
pub trait HtmlText {
    fn plain_text(&self, html: &str) -> String;
}

const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];
const LINE_BREAK_ELEMENTS: &[&str] = &[
    "br", "p", "div", "title", "h1", "h2", "h3", "h4", "h5", "h6", "li", "tr", "td", "table",
    "center",
];

/// Concatenates document text nodes in order, the way a soup `get_text()`
/// does, but drops script/style bodies and breaks the line where a block
/// element opens and where it closes, so minified paragraphs stay separate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScraperText;

impl HtmlText for ScraperText {
    fn plain_text(&self, html: &str) -> String {
        let document = Html::parse_document(html);
        let mut text = String::with_capacity(html.len() / 2);

        for edge in document.tree.root().traverse() {
            match edge {
                Edge::Open(node) => match node.value() {
                    Node::Text(chunk) if !inside_skipped(node) => text.push_str(chunk),
                    Node::Element(element) if breaks_line(element.name()) => text.push('\n'),
                    _ => {}
                },
                Edge::Close(node) => match node.value() {
                    Node::Element(element) if breaks_line(element.name()) => text.push('\n'),
                    _ => {}
                },
            }
        }

        text
    }
}

fn breaks_line(name: &str) -> bool {
    LINE_BREAK_ELEMENTS.contains(&name)
}

fn inside_skipped(node: NodeRef<'_, Node>) -> bool {
    node.ancestors().any(|ancestor| {
        ancestor
            .value()
            .as_element()
            .map(|element| SKIPPED_ELEMENTS.contains(&element.name()))
            .unwrap_or(false)
    })
}
