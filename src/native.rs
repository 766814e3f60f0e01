//! In-process rendering engine built on `printpdf`.
//!
//! No browser is involved: the document is read by [`crate::markup`] into
//! printable blocks which are laid out top to bottom with the PDF builtin
//! Helvetica faces. Stylesheets are not interpreted, so the screen-media
//! switch has nothing to do here and the output is a plain, readable rendition
//! of the invoice rather than a pixel match of the browser engine.

use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use printpdf::*;

use crate::error::RenderError;
use crate::markup::{self, Block, BlockKind};
use crate::renderer::{RenderOptions, RenderSession, SessionLauncher};

/// Margin around the printable area on every side.
pub const PAGE_MARGIN_PT: f32 = 40.0;
const BODY_SIZE_PT: f32 = 11.0;
const HEADING_SIZES_PT: [f32; 6] = [24.0, 18.0, 14.0, 12.0, 11.0, 10.0];
const LINE_HEIGHT: f32 = 1.3;
const CELL_PADDING_PT: f32 = 4.0;
const LIST_INDENT_PT: f32 = 16.0;
const TEXT_COLOR: [f32; 3] = [0.1, 0.1, 0.1];
const RULE_COLOR: [f32; 3] = [0.75, 0.75, 0.75];
const HEADER_FILL: [f32; 3] = [0.93, 0.93, 0.93];
const DEFAULT_TITLE: &str = "Invoice";

/// Opens in-memory sessions and counts how many are alive.
#[derive(Debug, Clone, Default)]
pub struct NativeLauncher {
    active: Arc<AtomicUsize>,
}

impl NativeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions launched and not yet dropped.
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl SessionLauncher for NativeLauncher {
    type Session = NativeSession;

    fn name(&self) -> &'static str {
        "native"
    }

    fn launch(&self) -> Result<NativeSession, RenderError> {
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(NativeSession {
            active: Arc::clone(&self.active),
            title: None,
            blocks: None,
        })
    }
}

pub struct NativeSession {
    active: Arc<AtomicUsize>,
    title: Option<String>,
    blocks: Option<Vec<Block>>,
}

impl RenderSession for NativeSession {
    fn load(&mut self, html: &str, timeout: Duration) -> Result<(), RenderError> {
        let started = Instant::now();
        let nodes = markup::parse_html(html);
        let blocks = markup::extract_blocks(&nodes);
        if started.elapsed() > timeout {
            return Err(RenderError::Timeout(timeout));
        }
        log::debug!("native: loaded document with {} blocks", blocks.len());
        self.title = markup::document_title(&nodes);
        self.blocks = Some(blocks);
        Ok(())
    }

    fn emulate_screen_media(&mut self) -> Result<(), RenderError> {
        log::debug!("native: stylesheets are not interpreted, media emulation is a no-op");
        Ok(())
    }

    fn print_pdf(&mut self, options: &RenderOptions) -> Result<Vec<u8>, RenderError> {
        let blocks = self
            .blocks
            .as_deref()
            .ok_or_else(|| RenderError::Capture("no document loaded".to_string()))?;

        let (width_mm, height_mm) = options.page_format.size_mm();
        let pages: Vec<PdfPage> = layout_pages(blocks, options)
            .into_iter()
            .map(|ops| PdfPage::new(Mm(width_mm), Mm(height_mm), ops))
            .collect();

        let mut doc = PdfDocument::new(self.title.as_deref().unwrap_or(DEFAULT_TITLE));
        doc.with_pages(pages);
        Ok(doc.save(&PdfSaveOptions::default(), &mut Vec::new()))
    }

    fn close(self) -> Result<(), RenderError> {
        // Releasing happens in Drop.
        Ok(())
    }
}

impl Drop for NativeSession {
    fn drop(&mut self) {
        self.blocks = None;
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Lay `blocks` out on pages of the requested format. Always returns at
/// least one page.
pub fn layout_pages(blocks: &[Block], options: &RenderOptions) -> Vec<Vec<Op>> {
    let (width, height) = options.page_format.size_pt();
    let mut composer = PageComposer::new(width, height, options.print_background);
    let scale = options.scale as f32;

    for block in blocks {
        match &block.kind {
            BlockKind::Heading(level) => {
                let idx = usize::from(level.saturating_sub(1)).min(HEADING_SIZES_PT.len() - 1);
                let size = HEADING_SIZES_PT[idx] * scale;
                composer.advance(size * 0.4);
                composer.text_block(
                    PAGE_MARGIN_PT,
                    block.text(),
                    size,
                    BuiltinFont::HelveticaBold,
                    block.background,
                );
                composer.advance(size * 0.3);
            }
            BlockKind::Paragraph => {
                let size = BODY_SIZE_PT * scale;
                composer.text_block(
                    PAGE_MARGIN_PT,
                    block.text(),
                    size,
                    BuiltinFont::Helvetica,
                    block.background,
                );
                composer.advance(size * 0.5);
            }
            BlockKind::ListItem(marker) => {
                let size = BODY_SIZE_PT * scale;
                let indent = LIST_INDENT_PT * scale;
                composer.reserve(size * LINE_HEIGHT);
                let top = composer.y;
                composer.text(PAGE_MARGIN_PT, top, marker, size, BuiltinFont::Helvetica);
                composer.text_block(
                    PAGE_MARGIN_PT + indent,
                    block.text(),
                    size,
                    BuiltinFont::Helvetica,
                    block.background,
                );
                composer.advance(size * 0.25);
            }
            BlockKind::Row { header } => {
                composer.row(&block.cells, BODY_SIZE_PT * scale, *header, block.background);
            }
            BlockKind::Rule => {
                let gap = 6.0 * scale;
                composer.reserve(gap * 2.0);
                composer.advance(gap);
                let y = composer.y;
                composer.line(PAGE_MARGIN_PT, width - PAGE_MARGIN_PT, y, 0.75, RULE_COLOR);
                composer.advance(gap);
            }
        }
    }

    composer.finish()
}

/// Top-down cursor over a sequence of pages.
struct PageComposer {
    width: f32,
    height: f32,
    print_background: bool,
    /// Distance from the top edge of the current page.
    y: f32,
    ops: Vec<Op>,
    pages: Vec<Vec<Op>>,
}

impl PageComposer {
    fn new(width: f32, height: f32, print_background: bool) -> Self {
        Self {
            width,
            height,
            print_background,
            y: PAGE_MARGIN_PT,
            ops: Vec::new(),
            pages: Vec::new(),
        }
    }

    fn content_width(&self) -> f32 {
        self.width - 2.0 * PAGE_MARGIN_PT
    }

    fn bottom(&self) -> f32 {
        self.height - PAGE_MARGIN_PT
    }

    /// Start a new page unless `height` still fits. Content taller than a
    /// whole page is placed at the top of a fresh page and allowed to
    /// overflow.
    fn reserve(&mut self, height: f32) {
        if self.y + height > self.bottom() && self.y > PAGE_MARGIN_PT {
            self.pages.push(mem::take(&mut self.ops));
            self.y = PAGE_MARGIN_PT;
        }
    }

    fn advance(&mut self, dy: f32) {
        self.y = (self.y + dy).min(self.bottom());
    }

    /// Wrapped text starting at `x`; the background only covers blocks that
    /// fit on one page.
    fn text_block(
        &mut self,
        x: f32,
        text: &str,
        size: f32,
        font: BuiltinFont,
        background: Option<[f32; 3]>,
    ) {
        let bold = matches!(font, BuiltinFont::HelveticaBold);
        let available = self.width - PAGE_MARGIN_PT - x;
        let lines = wrap_text(text, size, bold, available);
        let line_height = size * LINE_HEIGHT;
        let total = line_height * lines.len() as f32;

        if total <= self.bottom() - PAGE_MARGIN_PT {
            self.reserve(total);
            if let Some(bg) = background {
                let y = self.y;
                self.fill(x, y, available, total, bg);
            }
        }
        for line in lines {
            self.reserve(line_height);
            let y = self.y;
            self.text(x, y, &line, size, font);
            self.y += line_height;
        }
    }

    fn row(&mut self, cells: &[String], size: f32, header: bool, background: Option<[f32; 3]>) {
        let font = if header {
            BuiltinFont::HelveticaBold
        } else {
            BuiltinFont::Helvetica
        };
        let col_width = self.content_width() / cells.len().max(1) as f32;
        let inner = col_width - 2.0 * CELL_PADDING_PT;
        let wrapped: Vec<Vec<String>> = cells
            .iter()
            .map(|c| wrap_text(c, size, header, inner))
            .collect();
        let line_height = size * LINE_HEIGHT;
        let rows = wrapped.iter().map(Vec::len).max().unwrap_or(1).max(1);
        let row_height = rows as f32 * line_height + 2.0 * CELL_PADDING_PT;

        self.reserve(row_height);
        let top = self.y;
        let fill = background.or(header.then_some(HEADER_FILL));
        if let Some(bg) = fill {
            self.fill(PAGE_MARGIN_PT, top, self.content_width(), row_height, bg);
        }
        for (col, lines) in wrapped.iter().enumerate() {
            let x = PAGE_MARGIN_PT + col as f32 * col_width + CELL_PADDING_PT;
            for (i, line) in lines.iter().enumerate() {
                let y = top + CELL_PADDING_PT + i as f32 * line_height;
                self.text(x, y, line, size, font);
            }
        }
        self.y = top + row_height;
        let y = self.y;
        self.line(PAGE_MARGIN_PT, self.width - PAGE_MARGIN_PT, y, 0.5, RULE_COLOR);
    }

    /// One line of text whose top edge sits at `top`.
    fn text(&mut self, x: f32, top: f32, text: &str, size: f32, font: BuiltinFont) {
        if text.is_empty() {
            return;
        }
        // Baseline ≈ top of line + ascender (approx 0.75 × font size).
        let baseline = self.height - top - size * 0.75;
        self.ops.push(Op::StartTextSection);
        self.ops.push(Op::SetTextCursor {
            pos: Point {
                x: Pt(x),
                y: Pt(baseline),
            },
        });
        self.ops.push(Op::SetFontSizeBuiltinFont { size: Pt(size), font });
        self.ops.push(Op::SetFillColor { col: rgb(TEXT_COLOR) });
        self.ops.push(Op::WriteTextBuiltinFont {
            items: vec![TextItem::Text(to_builtin_text(text))],
            font,
        });
        self.ops.push(Op::EndTextSection);
    }

    fn fill(&mut self, x: f32, top: f32, width: f32, height: f32, color: [f32; 3]) {
        if !self.print_background {
            return;
        }
        let y2 = self.height - top;
        let y1 = y2 - height;
        let corner = |x: f32, y: f32| LinePoint {
            p: Point { x: Pt(x), y: Pt(y) },
            bezier: false,
        };
        self.ops.push(Op::SetFillColor { col: rgb(color) });
        self.ops.push(Op::DrawPolygon {
            polygon: Polygon {
                rings: vec![PolygonRing {
                    points: vec![
                        corner(x, y1),
                        corner(x + width, y1),
                        corner(x + width, y2),
                        corner(x, y2),
                    ],
                }],
                mode: PaintMode::Fill,
                winding_order: WindingOrder::NonZero,
            },
        });
    }

    fn line(&mut self, x1: f32, x2: f32, top: f32, thickness: f32, color: [f32; 3]) {
        let y = self.height - top;
        self.ops.push(Op::SetOutlineThickness { pt: Pt(thickness) });
        self.ops.push(Op::SetOutlineColor { col: rgb(color) });
        self.ops.push(Op::DrawLine {
            line: Line {
                points: vec![
                    LinePoint {
                        p: Point { x: Pt(x1), y: Pt(y) },
                        bezier: false,
                    },
                    LinePoint {
                        p: Point { x: Pt(x2), y: Pt(y) },
                        bezier: false,
                    },
                ],
                is_closed: false,
            },
        });
    }

    fn finish(mut self) -> Vec<Vec<Op>> {
        if !self.ops.is_empty() || self.pages.is_empty() {
            self.pages.push(self.ops);
        }
        self.pages
    }
}

fn rgb(c: [f32; 3]) -> Color {
    Color::Rgb(Rgb {
        r: c[0],
        g: c[1],
        b: c[2],
        icc_profile: None,
    })
}

/// Approximate Helvetica advance: half the font size per character, a bit
/// more for the bold face.
pub fn text_width(text: &str, size: f32, bold: bool) -> f32 {
    let factor = if bold { 0.55 } else { 0.5 };
    text.chars().count() as f32 * size * factor
}

/// Greedy word wrap. Explicit newlines are kept; a single word wider than
/// `max_width` gets a line of its own.
pub fn wrap_text(text: &str, size: f32, bold: bool, max_width: f32) -> Vec<String> {
    if max_width <= 0.0 || text.is_empty() {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if text_width(&candidate, size, bold) > max_width && !current.is_empty() {
                lines.push(mem::replace(&mut current, word.to_string()));
            } else {
                current = candidate;
            }
        }
        lines.push(current);
    }
    lines
}

/// Builtin fonts only cover a single-byte encoding, so text is folded to
/// ASCII: typographic punctuation gets its plain counterpart, accented Latin
/// letters lose the accent and anything else becomes `?`.
pub fn to_builtin_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        let folded = match c {
            c if c.is_ascii() => {
                out.push(c);
                continue;
            }
            '\u{00A0}' => " ",
            '\u{2018}' | '\u{2019}' | '\u{201A}' => "'",
            '\u{201C}' | '\u{201D}' | '\u{201E}' => "\"",
            '\u{2013}' | '\u{2014}' => "-",
            '\u{2022}' => "*",
            '\u{2026}' => "...",
            '\u{20AC}' => "EUR",
            '\u{00A3}' => "GBP",
            'à'..='å' => "a",
            'À'..='Å' => "A",
            'è'..='ë' => "e",
            'È'..='Ë' => "E",
            'ì'..='ï' => "i",
            'Ì'..='Ï' => "I",
            'ò'..='ö' | 'ø' => "o",
            'Ò'..='Ö' | 'Ø' => "O",
            'ù'..='ü' => "u",
            'Ù'..='Ü' => "U",
            'ç' => "c",
            'Ç' => "C",
            'ñ' => "n",
            'Ñ' => "N",
            'ß' => "ss",
            _ => "?",
        };
        out.push_str(folded);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{DocumentRenderer, PageFormat, Renderer};

    fn paragraph(text: &str) -> Block {
        Block {
            kind: BlockKind::Paragraph,
            cells: vec![text.to_string()],
            background: None,
        }
    }

    #[test]
    fn renders_pdf_bytes() {
        let renderer = DocumentRenderer::new(NativeLauncher::new());
        let bytes = renderer
            .render("<h1>Invoice</h1><p>Hello</p>", &RenderOptions::default())
            .unwrap();
        assert!(bytes.len() > 100, "PDF should have content");
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn empty_document_still_has_a_page() {
        let pages = layout_pages(&[], &RenderOptions::default());
        assert_eq!(pages.len(), 1);
        assert!(pages[0].is_empty());
    }

    #[test]
    fn long_documents_paginate() {
        let blocks: Vec<Block> = (0..200).map(|i| paragraph(&format!("Line item {i}"))).collect();
        let pages = layout_pages(&blocks, &RenderOptions::default());
        assert!(pages.len() > 1, "expected several pages, got {}", pages.len());
    }

    #[test]
    fn larger_pages_hold_more() {
        let blocks: Vec<Block> = (0..200).map(|i| paragraph(&format!("Line item {i}"))).collect();
        let a4 = layout_pages(&blocks, &RenderOptions::default());
        let a3 = layout_pages(
            &blocks,
            &RenderOptions {
                page_format: PageFormat::A3,
                ..RenderOptions::default()
            },
        );
        assert!(a3.len() < a4.len());
    }

    #[test]
    fn backgrounds_follow_print_background() {
        let blocks = vec![Block {
            kind: BlockKind::Row { header: true },
            cells: vec!["Task".into(), "Total".into()],
            background: None,
        }];
        let count_fills = |options: &RenderOptions| {
            layout_pages(&blocks, options)[0]
                .iter()
                .filter(|op| matches!(op, Op::DrawPolygon { .. }))
                .count()
        };
        assert_eq!(count_fills(&RenderOptions::default()), 1);
        assert_eq!(
            count_fills(&RenderOptions {
                print_background: false,
                ..RenderOptions::default()
            }),
            0
        );
    }

    #[test]
    fn session_count_returns_to_zero() {
        let launcher = NativeLauncher::new();
        let renderer = DocumentRenderer::new(launcher.clone());
        renderer.render("<p>x</p>", &RenderOptions::default()).unwrap();
        assert_eq!(launcher.active_sessions(), 0);
    }

    #[test]
    fn print_before_load_fails() {
        let mut session = NativeLauncher::new().launch().unwrap();
        assert!(matches!(
            session.print_pdf(&RenderOptions::default()),
            Err(RenderError::Capture(_))
        ));
    }

    #[test]
    fn wrap_respects_width() {
        let lines = wrap_text("aaaa bbbb cccc", 10.0, false, 40.0);
        assert_eq!(lines, ["aaaa", "bbbb", "cccc"]);
        assert_eq!(wrap_text("one\ntwo", 10.0, false, 500.0), ["one", "two"]);
    }

    #[test]
    fn text_is_folded_for_builtin_fonts() {
        assert_eq!(to_builtin_text("Café – “x” €5"), "Cafe - \"x\" EUR5");
        assert_eq!(to_builtin_text("日"), "?");
    }
}
