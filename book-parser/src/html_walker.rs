//! Depth-first walk over one XHTML section, producing text and image segments in reading order.

use scraper::{ElementRef, Html, Selector};
use segment_model::Segment;

use crate::image_map::ImageMap;
use crate::text_segmenter::{flush_text, TextChunkParams};

const SKIPPED_TAGS: &[&str] = &["rt", "rp", "script", "style"];
const BLOCK_TAGS: &[&str] = &["p", "div", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "li"];
const HEADING_SELECTOR: &str = "h1, h2, h3, h4, h5, h6";

pub struct SectionWalker<'a> {
    images: &'a ImageMap,
    base_dir: &'a str,
    params: TextChunkParams,
    buffer: String,
    out: Vec<Segment>,
}

impl<'a> SectionWalker<'a> {
    /// `base_dir` is the archive directory of the section, used to resolve relative image refs.
    pub fn new(images: &'a ImageMap, base_dir: &'a str, params: TextChunkParams) -> Self {
        Self { images, base_dir, params, buffer: String::new(), out: Vec::new() }
    }

    pub fn walk(mut self, doc: &Html) -> Vec<Segment> {
        let root = match Selector::parse("body") {
            Ok(sel) => doc.select(&sel).next().unwrap_or_else(|| doc.root_element()),
            Err(_) => doc.root_element(),
        };
        self.walk_element(root);
        flush_text(&mut self.buffer, &mut self.out, &self.params);
        self.out
    }

    fn walk_element(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            if let Some(child_element) = ElementRef::wrap(child) {
                let tag = child_element.value().name();
                if SKIPPED_TAGS.contains(&tag) { continue; }
                match tag {
                    "img" | "image" => self.push_image(child_element),
                    "br" => self.buffer.push('\n'),
                    t if BLOCK_TAGS.contains(&t) => {
                        self.break_line();
                        self.walk_element(child_element);
                        self.break_line();
                    }
                    _ => self.walk_element(child_element),
                }
            } else if let Some(text_node) = child.value().as_text() {
                let text: &str = text_node;
                if !text.trim().is_empty() { self.buffer.push_str(text); }
            }
            // comments, doctypes and processing instructions fall through
        }
    }

    fn break_line(&mut self) {
        if !self.buffer.is_empty() && !self.buffer.ends_with('\n') { self.buffer.push('\n'); }
    }

    fn push_image(&mut self, element: ElementRef<'_>) {
        flush_text(&mut self.buffer, &mut self.out, &self.params);
        let el = element.value();
        // html5ever files svg `xlink:href` under the xlink namespace with local name `href`
        let src = el.attr("src")
            .or_else(|| el.attrs().find(|(k, _)| *k == "href" || *k == "xlink:href").map(|(_, v)| v));
        let Some(src) = src else { return; };
        match self.images.resolve(src, self.base_dir) {
            Some(web) => {
                let alt = el.attr("alt").unwrap_or("");
                self.out.push(Segment::image(web, alt));
            }
            None => log::debug!("dropping unresolved image reference {src:?} in {:?}", self.base_dir),
        }
    }
}

/// Text of the first non-empty heading element, with ruby glosses left out.
pub fn first_heading(doc: &Html) -> Option<String> {
    let sel = Selector::parse(HEADING_SELECTOR).ok()?;
    doc.select(&sel)
        .map(|h| { let mut s = String::new(); visible_text(h, &mut s); s.trim().to_string() })
        .find(|s| !s.is_empty())
}

fn visible_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            if SKIPPED_TAGS.contains(&child_element.value().name()) { continue; }
            visible_text(child_element, out);
        } else if let Some(text_node) = child.value().as_text() {
            out.push_str(text_node);
        }
    }
}
