use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::paths::{file_name, join_archive_path, percent_decode};
use crate::error::ParseError;

/// Maps archive image references to web paths of the extracted copies.
#[derive(Debug, Clone, Default)]
pub struct ImageMap {
    entries: HashMap<String, String>,
}

impl ImageMap {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Register an archive path under its raw name, its file name, and its `/`-normalized form.
    pub fn insert(&mut self, archive_path: &str, web_path: &str) {
        self.entries.insert(archive_path.to_string(), web_path.to_string());
        self.entries.entry(file_name(archive_path).to_string()).or_insert_with(|| web_path.to_string());
        let normalized = archive_path.replace('\\', "/");
        if normalized != archive_path {
            self.entries.insert(normalized, web_path.to_string());
        }
    }

    /// Look up an image reference found in a section living in `base_dir`.
    /// Order: exact name, normalized path, relative-path fallback.
    pub fn resolve(&self, src: &str, base_dir: &str) -> Option<&str> {
        let src = percent_decode(src.trim());
        if src.is_empty() { return None; }

        if let Some(hit) = self.entries.get(src.as_str()) { return Some(hit); }

        let resolved = join_archive_path(base_dir, &src);
        if let Some(hit) = self.entries.get(resolved.as_str()) { return Some(hit); }
        let normalized = join_archive_path("", &src);
        if let Some(hit) = self.entries.get(normalized.as_str()) { return Some(hit); }

        let mut rel = src.replace('\\', "/");
        loop {
            if let Some(r) = rel.strip_prefix("./") { rel = r.to_string(); continue; }
            if let Some(r) = rel.strip_prefix("../") { rel = r.to_string(); continue; }
            break;
        }
        if let Some(hit) = self.entries.get(rel.as_str()) { return Some(hit); }
        self.entries.get(file_name(&rel)).map(String::as_str)
    }
}

/// Image bytes taken from an archive.
#[derive(Debug, Clone)]
pub struct ImageItem {
    pub path: String,
    pub data: Vec<u8>,
}

/// Write images into `out_dir` under their file names and map them to `web_prefix/<name>`.
/// A name already taken by an earlier image gets a numeric suffix (`cover-2.png`).
pub fn extract_images(images: &[ImageItem], out_dir: &Path, web_prefix: &str) -> Result<ImageMap, ParseError> {
    fs::create_dir_all(out_dir)?;
    let prefix = web_prefix.trim_end_matches('/');
    let mut map = ImageMap::new();
    let mut taken: HashSet<String> = HashSet::new();
    for img in images {
        let name = file_name(&img.path);
        if name.is_empty() { continue; }
        let name = unique_name(name, &mut taken);
        if name != file_name(&img.path) {
            log::debug!("image name collision: {} stored as {name}", img.path);
        }
        fs::write(out_dir.join(&name), &img.data)?;
        map.insert(&img.path, &format!("{prefix}/{name}"));
    }
    log::debug!("extracted {} images into {}", images.len(), out_dir.display());
    Ok(map)
}

/// Compared case-insensitively so distinct names never share a file on case-folding filesystems.
fn unique_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_lowercase()) {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name, ""),
    };
    let mut n = 2usize;
    loop {
        let candidate = format!("{stem}-{n}{ext}");
        if taken.insert(candidate.to_lowercase()) {
            return candidate;
        }
        n += 1;
    }
}

/// Image types copied out of a book's image folder.
pub const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "webp", "gif", "svg", "bmp"];

pub fn is_image_file(path: &Path) -> bool {
    match path.extension() {
        Some(ext) => IMAGE_EXTENSIONS.contains(&ext.to_string_lossy().to_ascii_lowercase().as_str()),
        None => false,
    }
}

fn image_files(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let ty = entry.file_type()?;
        if ty.is_dir() {
            image_files(&entry.path(), out)?;
        } else if ty.is_file() {
            out.push(entry.path());
        }
    }
    Ok(())
}

/// Copy the images under `source` into `dest`, keeping the directory layout. Hidden files and
/// non-image extensions are skipped; a file that fails to copy is logged and skipped.
/// Returns how many files were copied.
pub fn copy_image_tree(source: &Path, dest: &Path) -> io::Result<usize> {
    let mut files = Vec::new();
    image_files(source, &mut files)?;
    let mut copied = 0usize;
    for src in files {
        let hidden = src.file_name().map(|n| n.to_string_lossy().starts_with('.')).unwrap_or(true);
        if hidden { continue; }
        if !is_image_file(&src) {
            log::debug!("skipping non-image file {}", src.display());
            continue;
        }
        let rel = src.strip_prefix(source).unwrap_or(&src);
        let dst = dest.join(rel);
        if let Some(dir) = dst.parent() { fs::create_dir_all(dir)?; }
        match fs::copy(&src, &dst) {
            Ok(_) => copied += 1,
            Err(e) => log::warn!("failed to copy image {}: {e}", src.display()),
        }
    }
    log::info!("copied {copied} image file(s) into {}", dest.display());
    Ok(copied)
}
