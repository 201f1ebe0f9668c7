use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use book_parser::image_map::copy_image_tree;

use crate::error::ArchiveError;

/// Lexically normalize an archive member name to a path relative to the extraction root.
///
/// Backslashes count as separators. Absolute names, drive letters and any `..` that climbs
/// above the root are refused.
pub fn safe_member_path(member: &str) -> Result<PathBuf, ArchiveError> {
    let unsafe_path = || ArchiveError::UnsafePath { member: member.to_string() };
    let name = member.replace('\\', "/");
    let bytes = name.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return Err(unsafe_path());
    }
    if name.starts_with('/') {
        return Err(unsafe_path());
    }
    let mut parts: Vec<&str> = Vec::new();
    for part in name.split('/') {
        match part {
            "" | "." => {}
            ".." => { if parts.pop().is_none() { return Err(unsafe_path()); } }
            p => parts.push(p),
        }
    }
    if parts.is_empty() {
        return Err(unsafe_path());
    }
    Ok(parts.iter().collect())
}

/// Unpack `zip_path` under `root`. Every member is validated before anything is written, and
/// each target's directory is checked again after symlinks are resolved. Returns the file count.
pub fn extract_archive(zip_path: &Path, root: &Path) -> Result<usize, ArchiveError> {
    let file = File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    fs::create_dir_all(root)?;
    let canonical_root = root.canonicalize()?;

    let mut members: Vec<(usize, String, PathBuf)> = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        if entry.is_dir() || name.ends_with('/') { continue; }
        let rel = safe_member_path(&name)?;
        members.push((i, name, rel));
    }

    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut duplicates = 0usize;
    for (i, name, rel) in &members {
        let target = canonical_root.join(rel);
        let parent = target.parent().unwrap_or(canonical_root.as_path());
        fs::create_dir_all(parent)?;
        // component-wise containment, not a string prefix test
        if !parent.canonicalize()?.starts_with(&canonical_root) {
            return Err(ArchiveError::UnsafePath { member: name.clone() });
        }
        if !seen.insert(target.clone()) {
            duplicates += 1;
            log::warn!("duplicate archive member {name}; later entry overwrites {}", target.display());
        }
        let mut entry = archive.by_index(*i)?;
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
    }
    if duplicates > 0 {
        log::warn!("{duplicates} duplicate member(s) overwritten while extracting {}", zip_path.display());
    }
    Ok(members.len())
}

#[derive(Debug, PartialEq, Eq)]
enum NaturalPart {
    Number(String),
    Text(String),
}

impl Ord for NaturalPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (NaturalPart::Number(a), NaturalPart::Number(b)) => {
                let (ta, tb) = (a.trim_start_matches('0'), b.trim_start_matches('0'));
                ta.len().cmp(&tb.len()).then_with(|| ta.cmp(tb)).then_with(|| a.cmp(b))
            }
            (NaturalPart::Number(_), NaturalPart::Text(_)) => Ordering::Less,
            (NaturalPart::Text(_), NaturalPart::Number(_)) => Ordering::Greater,
            (NaturalPart::Text(a), NaturalPart::Text(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for NaturalPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

/// Sort key that orders `page2` before `page10`; text runs compare case-insensitively.
fn natural_key(s: &str) -> Vec<NaturalPart> {
    let mut parts = Vec::new();
    let mut run = String::new();
    let mut digits = false;
    for ch in s.chars() {
        let is_digit = ch.is_ascii_digit();
        if !run.is_empty() && is_digit != digits {
            parts.push(finish_part(std::mem::take(&mut run), digits));
        }
        digits = is_digit;
        run.extend(ch.to_lowercase());
    }
    if !run.is_empty() {
        parts.push(finish_part(run, digits));
    }
    parts
}

fn finish_part(run: String, digits: bool) -> NaturalPart {
    if digits { NaturalPart::Number(run) } else { NaturalPart::Text(run) }
}

fn relative_slash_path(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c { Component::Normal(p) => Some(p.to_string_lossy().into_owned()), _ => None })
        .collect::<Vec<_>>()
        .join("/")
}

fn walk_files(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let ty = entry.file_type()?;
        if ty.is_dir() {
            walk_files(&entry.path(), out)?;
        } else if ty.is_file() {
            out.push(entry.path());
        }
    }
    Ok(())
}

/// All `.md` files under `root`, in natural order of their root-relative path.
pub fn markdown_files(root: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let mut files = Vec::new();
    walk_files(root, &mut files)?;
    let mut md: Vec<(Vec<NaturalPart>, PathBuf)> = files
        .into_iter()
        .filter(|p| p.extension().map(|e| e == "md").unwrap_or(false))
        .map(|p| (natural_key(&relative_slash_path(&p, root)), p))
        .collect();
    md.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(md.into_iter().map(|(_, p)| p).collect())
}

/// Concatenate every markdown file under `root`, each followed by a blank line.
/// Unreadable files are logged and skipped.
pub fn collect_markdown(root: &Path) -> Result<String, ArchiveError> {
    let files = markdown_files(root)?;
    if files.is_empty() {
        return Err(ArchiveError::NoMarkdown(format!("no .md files under {}", root.display())));
    }
    log::info!("found {} markdown file(s)", files.len());
    let mut content = String::new();
    let mut failed: Vec<String> = Vec::new();
    for path in &files {
        match fs::read_to_string(path) {
            Ok(text) => {
                content.push_str(&text);
                content.push_str("\n\n");
            }
            Err(e) => {
                log::warn!("cannot read {}: {e}", path.display());
                failed.push(path.display().to_string());
            }
        }
    }
    if !failed.is_empty() {
        log::error!("{}/{} markdown file(s) unreadable: {:?}", failed.len(), files.len(), failed);
    }
    if content.trim().is_empty() {
        return Err(ArchiveError::NoMarkdown("all markdown files are empty or unreadable".into()));
    }
    Ok(content)
}

/// Copy `<root>/images/**` into `dest`, keeping the directory layout. Hidden files and
/// non-image extensions are skipped. Returns how many files were copied.
pub fn copy_images(root: &Path, dest: &Path) -> Result<usize, ArchiveError> {
    let source = root.join("images");
    if !source.is_dir() {
        log::info!("no images/ directory in converted output");
        return Ok(0);
    }
    Ok(copy_image_tree(&source, dest)?)
}
