//! Markup reader for the native renderer.
//!
//! Parses the HTML produced by the template engine into a small DOM and
//! flattens it into printable [`Block`]s: headings, paragraphs, list items,
//! table rows and horizontal rules. Content of `head`, `style`, `script` and
//! `title` is never printed, and comments (including any stray billable
//! markers) are dropped.

use std::collections::HashMap;

// ---------------------------------------------------------------------------
// DOM
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    Html,
    Head,
    Body,
    Style,
    Script,
    Title,
    Div,
    P,
    Heading(u8),
    Ul,
    Ol,
    Li,
    Table,
    Tr,
    Td,
    Th,
    Br,
    Hr,
    Img,
    /// Inline or unknown element; its text flows into the surrounding block.
    Other(String),
}

impl Tag {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "html" => Tag::Html,
            "head" => Tag::Head,
            "body" => Tag::Body,
            "style" => Tag::Style,
            "script" => Tag::Script,
            "title" => Tag::Title,
            "div" | "section" | "header" | "footer" | "main" | "article" | "thead" | "tbody"
            | "tfoot" => Tag::Div,
            "p" | "pre" | "blockquote" => Tag::P,
            "h1" => Tag::Heading(1),
            "h2" => Tag::Heading(2),
            "h3" => Tag::Heading(3),
            "h4" => Tag::Heading(4),
            "h5" => Tag::Heading(5),
            "h6" => Tag::Heading(6),
            "ul" => Tag::Ul,
            "ol" => Tag::Ol,
            "li" => Tag::Li,
            "table" => Tag::Table,
            "tr" => Tag::Tr,
            "td" => Tag::Td,
            "th" => Tag::Th,
            "br" => Tag::Br,
            "hr" => Tag::Hr,
            "img" => Tag::Img,
            other => Tag::Other(other.to_string()),
        }
    }

    /// Elements that never have children.
    fn is_void(&self) -> bool {
        match self {
            Tag::Br | Tag::Hr | Tag::Img => true,
            Tag::Other(name) => matches!(name.as_str(), "meta" | "link" | "input" | "col" | "wbr"),
            _ => false,
        }
    }

    /// Elements whose content is raw text up to the matching end tag.
    fn raw_text_name(&self) -> Option<&'static str> {
        match self {
            Tag::Style => Some("style"),
            Tag::Script => Some("script"),
            Tag::Title => Some("title"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum DomNode {
    Element(ElementNode),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct ElementNode {
    pub tag: Tag,
    pub attributes: HashMap<String, String>,
    pub children: Vec<DomNode>,
}

impl ElementNode {
    fn new(tag: Tag) -> Self {
        Self {
            tag,
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }

    /// Background colour from `style="background[-color]: …"` or `bgcolor`.
    pub fn background(&self) -> Option<[f32; 3]> {
        if let Some(style) = self.attributes.get("style") {
            for decl in style.split(';') {
                if let Some((prop, value)) = decl.split_once(':') {
                    let prop = prop.trim().to_ascii_lowercase();
                    if prop == "background" || prop == "background-color" {
                        if let Some(color) = value.split_whitespace().find_map(parse_color) {
                            return Some(color);
                        }
                    }
                }
            }
        }
        self.attributes.get("bgcolor").and_then(|v| parse_color(v))
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse an HTML string into a list of DOM nodes.
///
/// Hand-written and forgiving: a closing tag always closes the innermost open
/// element, whatever its name, which is enough for generated invoice markup.
pub fn parse_html(html: &str) -> Vec<DomNode> {
    let mut parser = Parser { input: html, pos: 0 };
    parser.parse_nodes()
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn parse_nodes(&mut self) -> Vec<DomNode> {
        let mut nodes = Vec::new();
        while !self.eof() && !self.starts_with("</") {
            if let Some(node) = self.parse_node() {
                nodes.push(node);
            }
        }
        nodes
    }

    fn parse_node(&mut self) -> Option<DomNode> {
        if self.starts_with("<!--") {
            self.skip_past("-->");
            return None;
        }
        if self.starts_with("<!") || self.starts_with("<?") {
            self.skip_past(">");
            return None;
        }
        let opens_tag = self
            .rest()
            .strip_prefix('<')
            .is_some_and(|r| r.starts_with(|c: char| c.is_ascii_alphabetic()));
        if opens_tag {
            Some(self.parse_element())
        } else {
            Some(self.parse_text())
        }
    }

    fn parse_text(&mut self) -> DomNode {
        let start = self.pos;
        // Always consume at least one character so a stray '<' cannot stall.
        self.advance_char();
        while !self.eof() && !self.starts_with("<") {
            self.advance_char();
        }
        DomNode::Text(decode_entities(&self.input[start..self.pos]))
    }

    fn parse_element(&mut self) -> DomNode {
        self.pos += 1; // '<'
        let name = self.parse_name();
        let mut elem = ElementNode::new(Tag::from_name(&name));

        loop {
            self.skip_whitespace();
            if self.eof() || self.starts_with(">") || self.starts_with("/>") {
                break;
            }
            let key = self.parse_name();
            if key.is_empty() {
                // Unexpected character in the tag; skip it.
                self.advance_char();
                continue;
            }
            let value = self.parse_attr_value();
            elem.attributes.insert(key.to_ascii_lowercase(), value);
        }

        if self.starts_with("/>") {
            self.pos += 2;
            return DomNode::Element(elem);
        }
        if self.starts_with(">") {
            self.pos += 1;
        }
        if elem.tag.is_void() {
            return DomNode::Element(elem);
        }

        if let Some(raw) = elem.tag.raw_text_name() {
            let close = format!("</{raw}");
            let end = find_ignore_case(self.rest(), &close)
                .map_or(self.input.len(), |i| self.pos + i);
            elem.children.push(DomNode::Text(self.input[self.pos..end].to_string()));
            self.pos = end;
        } else {
            elem.children = self.parse_nodes();
        }

        if self.starts_with("</") {
            self.skip_past(">");
        }
        DomNode::Element(elem)
    }

    fn parse_name(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == ':' {
                self.advance_char();
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }

    fn parse_attr_value(&mut self) -> String {
        self.skip_whitespace();
        if !self.starts_with("=") {
            return String::new();
        }
        self.pos += 1;
        self.skip_whitespace();

        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => {
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if c.is_whitespace() || c == '>' {
                        break;
                    }
                    self.advance_char();
                }
                return decode_entities(&self.input[start..self.pos]);
            }
        };
        self.pos += 1;
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == quote {
                break;
            }
            self.advance_char();
        }
        let value = decode_entities(&self.input[start..self.pos]);
        if !self.eof() {
            self.pos += 1;
        }
        value
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance_char();
        }
    }

    fn skip_past(&mut self, needle: &str) {
        match self.rest().find(needle) {
            Some(i) => self.pos += i + needle.len(),
            None => self.pos = self.input.len(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn starts_with(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn advance_char(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&#123;", "{")
        .replace("&#125;", "}")
        .replace("&nbsp;", "\u{00A0}")
        .replace("&amp;", "&")
}

/// `#rgb`, `#rrggbb` or a handful of CSS colour names.
pub fn parse_color(value: &str) -> Option<[f32; 3]> {
    let value = value.trim().trim_end_matches("!important").trim();
    if let Some(hex) = value.strip_prefix('#') {
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return None,
        };
        let channel = |i: usize| {
            u8::from_str_radix(expanded.get(i..i + 2)?, 16)
                .ok()
                .map(|v| f32::from(v) / 255.0)
        };
        return Some([channel(0)?, channel(2)?, channel(4)?]);
    }
    let named = match value.to_ascii_lowercase().as_str() {
        "white" => [1.0, 1.0, 1.0],
        "black" => [0.0, 0.0, 0.0],
        "red" => [1.0, 0.0, 0.0],
        "green" => [0.0, 0.5, 0.0],
        "blue" => [0.0, 0.0, 1.0],
        "gray" | "grey" => [0.5, 0.5, 0.5],
        "lightgray" | "lightgrey" => [0.83, 0.83, 0.83],
        "whitesmoke" => [0.96, 0.96, 0.96],
        "yellow" => [1.0, 1.0, 0.0],
        _ => return None,
    };
    Some(named)
}

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Heading(u8),
    Paragraph,
    /// List entry with its marker (`•` becomes `-` in builtin fonts, so the
    /// marker is already ASCII: `-` or `3.`).
    ListItem(String),
    Row { header: bool },
    Rule,
}

/// A printable unit. Rows carry one entry per cell, every other kind
/// carries a single entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    pub cells: Vec<String>,
    pub background: Option<[f32; 3]>,
}

impl Block {
    pub fn text(&self) -> &str {
        self.cells.first().map(String::as_str).unwrap_or("")
    }
}

/// Text of the first `<title>` element, if any.
pub fn document_title(nodes: &[DomNode]) -> Option<String> {
    nodes.iter().find_map(|node| match node {
        DomNode::Element(e) if e.tag == Tag::Title => {
            let title = collect_text(&e.children);
            (!title.is_empty()).then_some(title)
        }
        DomNode::Element(e) => document_title(&e.children),
        DomNode::Text(_) => None,
    })
}

/// Flatten parsed markup into printable blocks, in document order.
pub fn extract_blocks(nodes: &[DomNode]) -> Vec<Block> {
    let mut walker = BlockWalker::default();
    walker.walk(nodes, None, None);
    walker.flush(None);
    walker.blocks
}

#[derive(Default)]
struct BlockWalker {
    blocks: Vec<Block>,
    inline: String,
}

impl BlockWalker {
    fn walk(
        &mut self,
        nodes: &[DomNode],
        background: Option<[f32; 3]>,
        ordered: Option<&mut usize>,
    ) {
        let mut ordered = ordered;
        for node in nodes {
            match node {
                DomNode::Text(text) => self.inline.push_str(text),
                DomNode::Element(e) => {
                    let bg = e.background().or(background);
                    match &e.tag {
                        Tag::Head | Tag::Style | Tag::Script | Tag::Title | Tag::Img => {}
                        Tag::Br => self.inline.push('\n'),
                        Tag::Other(_) => self.walk(&e.children, background, None),
                        Tag::Heading(level) => {
                            self.flush(background);
                            let text = collect_text(&e.children);
                            self.push(BlockKind::Heading(*level), vec![text], bg);
                        }
                        Tag::P => {
                            self.flush(background);
                            self.push(BlockKind::Paragraph, vec![collect_text(&e.children)], bg);
                        }
                        Tag::Li => {
                            self.flush(background);
                            let marker = match ordered.as_deref_mut() {
                                Some(n) => {
                                    *n += 1;
                                    format!("{n}.")
                                }
                                None => "-".to_string(),
                            };
                            let text = collect_text(&e.children);
                            self.push(BlockKind::ListItem(marker), vec![text], bg);
                        }
                        Tag::Tr => {
                            self.flush(background);
                            let mut header = false;
                            let cells: Vec<String> = e
                                .children
                                .iter()
                                .filter_map(|c| match c {
                                    DomNode::Element(cell)
                                        if matches!(cell.tag, Tag::Td | Tag::Th) =>
                                    {
                                        header |= cell.tag == Tag::Th;
                                        Some(collect_text(&cell.children))
                                    }
                                    _ => None,
                                })
                                .collect();
                            if !cells.is_empty() {
                                self.blocks.push(Block {
                                    kind: BlockKind::Row { header },
                                    cells,
                                    background: bg,
                                });
                            }
                        }
                        Tag::Hr => {
                            self.flush(background);
                            self.blocks.push(Block {
                                kind: BlockKind::Rule,
                                cells: Vec::new(),
                                background: None,
                            });
                        }
                        Tag::Ol => {
                            self.flush(background);
                            let mut counter = 0usize;
                            self.walk(&e.children, bg, Some(&mut counter));
                            self.flush(bg);
                        }
                        _ => {
                            self.flush(background);
                            self.walk(&e.children, bg, None);
                            self.flush(bg);
                        }
                    }
                }
            }
        }
    }

    fn flush(&mut self, background: Option<[f32; 3]>) {
        let text = normalize_whitespace(&std::mem::take(&mut self.inline));
        if !text.is_empty() {
            self.push(BlockKind::Paragraph, vec![text], background);
        }
    }

    fn push(&mut self, kind: BlockKind, cells: Vec<String>, background: Option<[f32; 3]>) {
        if cells.iter().all(|c| c.is_empty()) {
            return;
        }
        self.blocks.push(Block {
            kind,
            cells,
            background,
        });
    }
}

/// Visible text under `nodes`, whitespace-collapsed; `<br>` and nested block
/// elements become line breaks.
pub fn collect_text(nodes: &[DomNode]) -> String {
    fn gather(nodes: &[DomNode], out: &mut String) {
        for node in nodes {
            match node {
                DomNode::Text(t) => out.push_str(t),
                DomNode::Element(e) => match e.tag {
                    Tag::Head | Tag::Style | Tag::Script | Tag::Title | Tag::Img => {}
                    Tag::Br => out.push('\n'),
                    Tag::Other(_) => gather(&e.children, out),
                    _ => {
                        out.push('\n');
                        gather(&e.children, out);
                        out.push('\n');
                    }
                },
            }
        }
    }
    let mut raw = String::new();
    gather(nodes, &mut raw);
    normalize_whitespace(&raw)
}

fn normalize_whitespace(s: &str) -> String {
    s.split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
