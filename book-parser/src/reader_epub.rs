use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use scraper::{Html, Selector};

use crate::error::ParseError;
use crate::image_map::ImageItem;
use crate::paths::{join_archive_path, parent_dir, percent_decode, strip_fragment};

const CONTAINER_PATH: &str = "META-INF/container.xml";
const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

fn local_name<'a>(q: &'a [u8]) -> &'a [u8] {
    match q.iter().position(|&b| b == b':') { Some(i) => &q[i + 1..], None => q }
}

fn attr_val(e: &BytesStart<'_>, key_local: &[u8]) -> Option<String> {
    for a in e.attributes().with_checks(false) {
        if let Ok(attr) = a {
            if local_name(attr.key.as_ref()) == key_local {
                return Some(match attr.unescape_value() {
                    Ok(v) => v.into_owned(),
                    Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
                });
            }
        }
    }
    None
}

fn xml_error(file: &str, err: quick_xml::Error) -> ParseError {
    ParseError::Xml { file: file.to_string(), message: err.to_string() }
}

#[derive(Debug, Clone)]
pub struct ManifestItem {
    pub id: String,
    /// Archive path (resolved against the package directory, percent-decoded).
    pub path: String,
    pub media_type: String,
    pub properties: String,
}

impl ManifestItem {
    pub fn is_document(&self) -> bool {
        matches!(self.media_type.as_str(), "application/xhtml+xml" | "text/html")
            || [".xhtml", ".html", ".htm"].iter().any(|ext| self.path.to_ascii_lowercase().ends_with(ext))
    }

    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }
}

/// One spine document, decoded to text.
#[derive(Debug, Clone)]
pub struct SpineSection {
    pub id: String,
    pub path: String,
    pub content: String,
}

/// Everything the chapter driver needs from an EPUB container.
#[derive(Debug, Clone, Default)]
pub struct EpubPackage {
    pub title: Option<String>,
    pub author: Option<String>,
    pub sections: Vec<SpineSection>,
    /// Section archive path (no fragment) -> first TOC label pointing at it.
    pub toc: HashMap<String, String>,
    pub images: Vec<ImageItem>,
}

pub fn read_epub(path: &Path) -> Result<EpubPackage, ParseError> {
    let file = File::open(path)?;
    read_epub_from(file)
}

pub fn read_epub_from<R: Read + Seek>(reader: R) -> Result<EpubPackage, ParseError> {
    let mut zip = zip::ZipArchive::new(reader)?;

    let opf_path = match read_entry_string(&mut zip, CONTAINER_PATH) {
        Ok(xml) => rootfile_path(&xml)?,
        Err(ParseError::MissingFile(_)) => {
            let fallback = zip.file_names().find(|n| n.to_ascii_lowercase().ends_with(".opf")).map(str::to_string);
            fallback.ok_or_else(|| ParseError::MissingFile(CONTAINER_PATH.to_string()))?
        }
        Err(e) => return Err(e),
    };
    let opf_xml = read_entry_string(&mut zip, &opf_path)?;
    let opf = parse_opf(&opf_xml, &opf_path)?;

    let mut toc: HashMap<String, String> = HashMap::new();
    let ncx = opf.toc_id.as_ref()
        .and_then(|id| opf.manifest.iter().find(|m| &m.id == id))
        .or_else(|| opf.manifest.iter().find(|m| m.media_type == NCX_MEDIA_TYPE));
    if let Some(item) = ncx {
        match read_entry_string(&mut zip, &item.path) {
            Ok(xml) => parse_ncx(&xml, &item.path, &mut toc)?,
            Err(ParseError::MissingFile(p)) => log::warn!("toc file {p} listed but missing"),
            Err(e) => return Err(e),
        }
    }
    if let Some(item) = opf.manifest.iter().find(|m| m.properties.split_whitespace().any(|p| p == "nav")) {
        match read_entry_string(&mut zip, &item.path) {
            Ok(html) => parse_nav(&html, &item.path, &mut toc),
            Err(ParseError::MissingFile(p)) => log::warn!("nav document {p} listed but missing"),
            Err(e) => return Err(e),
        }
    }

    let by_id: HashMap<&str, &ManifestItem> = opf.manifest.iter().map(|m| (m.id.as_str(), m)).collect();
    let mut sections = Vec::new();
    for idref in &opf.spine {
        let Some(item) = by_id.get(idref.as_str()) else {
            log::warn!("spine references unknown manifest id {idref}");
            continue;
        };
        if !item.is_document() { continue; }
        let bytes = read_entry_bytes(&mut zip, &item.path)?;
        let content = decode_text(&bytes, &item.path)?;
        sections.push(SpineSection { id: item.id.clone(), path: item.path.clone(), content });
    }
    if sections.is_empty() {
        return Err(ParseError::InvalidStructure("spine has no readable documents".into()));
    }

    let mut images = Vec::new();
    for item in opf.manifest.iter().filter(|m| m.is_image()) {
        match read_entry_bytes(&mut zip, &item.path) {
            Ok(data) => images.push(ImageItem { path: item.path.clone(), data }),
            Err(ParseError::MissingFile(p)) => log::warn!("image {p} listed in manifest but missing"),
            Err(e) => return Err(e),
        }
    }

    Ok(EpubPackage { title: opf.title, author: opf.author, sections, toc, images })
}

fn read_entry_bytes<R: Read + Seek>(zip: &mut zip::ZipArchive<R>, name: &str) -> Result<Vec<u8>, ParseError> {
    let mut entry = match zip.by_name(name) {
        Ok(f) => f,
        Err(zip::result::ZipError::FileNotFound) => return Err(ParseError::MissingFile(name.to_string())),
        Err(e) => return Err(e.into()),
    };
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut buf)?;
    Ok(buf)
}

fn read_entry_string<R: Read + Seek>(zip: &mut zip::ZipArchive<R>, name: &str) -> Result<String, ParseError> {
    let bytes = read_entry_bytes(zip, name)?;
    decode_text(&bytes, name)
}

/// Decode markup bytes: BOM first, then UTF-8, then the encoding declared in the prolog or meta tag.
pub fn decode_text(bytes: &[u8], name: &str) -> Result<String, ParseError> {
    if let Some((enc, bom_len)) = encoding_rs::Encoding::for_bom(bytes) {
        return enc
            .decode_without_bom_handling_and_without_replacement(&bytes[bom_len..])
            .map(|c| c.into_owned())
            .ok_or_else(|| ParseError::Encoding(name.to_string()));
    }
    if let Ok(s) = std::str::from_utf8(bytes) {
        return Ok(s.to_string());
    }
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(1024)]).to_ascii_lowercase();
    let label = declared_encoding(&head).ok_or_else(|| ParseError::Encoding(name.to_string()))?;
    let enc = encoding_rs::Encoding::for_label(label.as_bytes()).ok_or_else(|| ParseError::Encoding(name.to_string()))?;
    enc.decode_without_bom_handling_and_without_replacement(bytes)
        .map(|c| c.into_owned())
        .ok_or_else(|| ParseError::Encoding(name.to_string()))
}

fn declared_encoding(head: &str) -> Option<String> {
    for key in ["encoding=", "charset="] {
        if let Some(pos) = head.find(key) {
            let rest = head[pos + key.len()..].trim_start_matches(['"', '\'']);
            let label: String = rest.chars().take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_')).collect();
            if !label.is_empty() { return Some(label); }
        }
    }
    None
}

fn rootfile_path(container_xml: &str) -> Result<String, ParseError> {
    let mut reader = Reader::from_str(container_xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if local_name(e.name().as_ref()) == b"rootfile" {
                    if let Some(p) = attr_val(&e, b"full-path") {
                        return Ok(percent_decode(&p));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(CONTAINER_PATH, e)),
            _ => {}
        }
    }
    Err(ParseError::InvalidStructure("container.xml has no rootfile".into()))
}

#[derive(Debug, Default)]
struct Opf {
    title: Option<String>,
    author: Option<String>,
    manifest: Vec<ManifestItem>,
    spine: Vec<String>,
    toc_id: Option<String>,
}

fn parse_opf(xml: &str, opf_path: &str) -> Result<Opf, ParseError> {
    let base = parent_dir(opf_path);
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);
    let mut buf = Vec::new();
    let mut opf = Opf::default();
    let mut in_meta: Option<&'static str> = None;
    let mut text = String::new();

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match local_name(e.name().as_ref()) {
                b"title" => { in_meta = Some("title"); text.clear(); }
                b"creator" => { in_meta = Some("creator"); text.clear(); }
                b"spine" => { opf.toc_id = attr_val(&e, b"toc"); }
                b"item" => push_manifest_item(&e, base, &mut opf),
                b"itemref" => { if let Some(id) = attr_val(&e, b"idref") { opf.spine.push(id); } }
                _ => {}
            },
            Ok(Event::Empty(e)) => match local_name(e.name().as_ref()) {
                b"item" => push_manifest_item(&e, base, &mut opf),
                b"itemref" => { if let Some(id) = attr_val(&e, b"idref") { opf.spine.push(id); } }
                b"spine" => { opf.toc_id = attr_val(&e, b"toc"); }
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if in_meta.is_some() {
                    if let Ok(cow) = t.unescape() { text.push_str(&cow); }
                }
            }
            Ok(Event::CData(t)) => {
                if in_meta.is_some() { text.push_str(&String::from_utf8_lossy(&t)); }
            }
            Ok(Event::End(e)) => {
                let qname = e.name();
                let name = local_name(qname.as_ref());
                if let Some(field) = in_meta {
                    if name == field.as_bytes() {
                        let value = text.trim().to_string();
                        let slot = if field == "title" { &mut opf.title } else { &mut opf.author };
                        if slot.is_none() && !value.is_empty() { *slot = Some(value); }
                        in_meta = None;
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(opf_path, e)),
            _ => {}
        }
    }
    Ok(opf)
}

fn push_manifest_item(e: &BytesStart<'_>, base: &str, opf: &mut Opf) {
    let (Some(id), Some(href)) = (attr_val(e, b"id"), attr_val(e, b"href")) else { return; };
    opf.manifest.push(ManifestItem {
        id,
        path: join_archive_path(base, &percent_decode(&href)),
        media_type: attr_val(e, b"media-type").unwrap_or_default(),
        properties: attr_val(e, b"properties").unwrap_or_default(),
    });
}

fn toc_key(toc_file: &str, href: &str) -> String {
    join_archive_path(parent_dir(toc_file), &percent_decode(strip_fragment(href)))
}

fn add_toc_entry(toc: &mut HashMap<String, String>, key: String, label: &str) {
    let label = label.trim();
    if key.is_empty() || label.is_empty() { return; }
    toc.entry(key).or_insert_with(|| label.to_string());
}

/// NCX navPoints, nested or flat; a navPoint's label precedes its `content` element.
fn parse_ncx(xml: &str, ncx_path: &str, toc: &mut HashMap<String, String>) -> Result<(), ParseError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);
    let mut buf = Vec::new();
    let mut labels: Vec<String> = Vec::new();
    let mut in_label = false;
    let mut in_text = false;

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match local_name(e.name().as_ref()) {
                b"navPoint" => labels.push(String::new()),
                b"navLabel" => in_label = true,
                b"text" => in_text = in_label,
                b"content" => {
                    if let (Some(src), Some(label)) = (attr_val(&e, b"src"), labels.last()) {
                        add_toc_entry(toc, toc_key(ncx_path, &src), label);
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if local_name(e.name().as_ref()) == b"content" {
                    if let (Some(src), Some(label)) = (attr_val(&e, b"src"), labels.last()) {
                        add_toc_entry(toc, toc_key(ncx_path, &src), label);
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if in_text {
                    if let (Ok(cow), Some(label)) = (t.unescape(), labels.last_mut()) { label.push_str(&cow); }
                }
            }
            Ok(Event::End(e)) => match local_name(e.name().as_ref()) {
                b"navPoint" => { labels.pop(); }
                b"navLabel" => in_label = false,
                b"text" => in_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(ncx_path, e)),
            _ => {}
        }
    }
    Ok(())
}

/// EPUB 3 navigation document: anchors inside `<nav epub:type="toc">`.
fn parse_nav(html: &str, nav_path: &str, toc: &mut HashMap<String, String>) {
    let doc = Html::parse_document(html);
    let (Ok(nav_sel), Ok(a_sel)) = (Selector::parse("nav"), Selector::parse("a[href]")) else { return; };
    for nav in doc.select(&nav_sel) {
        let is_toc = nav.value().attrs().any(|(k, v)| k.ends_with("type") && v.split_whitespace().any(|t| t == "toc"));
        if !is_toc { continue; }
        for a in nav.select(&a_sel) {
            if let Some(href) = a.value().attr("href") {
                let label: String = a.text().collect();
                add_toc_entry(toc, toc_key(nav_path, href), &label);
            }
        }
    }
}
