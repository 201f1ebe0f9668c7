//! Archive-internal path helpers. EPUB paths always use `/`, are relative to the zip root,
//! and may be percent-encoded in hrefs.

use percent_encoding::percent_decode_str;

pub fn percent_decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// Directory part of an archive path ("" for root-level entries).
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') { Some(i) => &path[..i], None => "" }
}

pub fn file_name(path: &str) -> &str {
    match path.rfind('/') { Some(i) => &path[i + 1..], None => path }
}

pub fn strip_fragment(href: &str) -> &str {
    match href.find('#') { Some(i) => &href[..i], None => href }
}

/// Resolve `href` against `base_dir`, collapsing `.` and `..`. Parent references that would
/// climb above the archive root are dropped.
pub fn join_archive_path(base_dir: &str, href: &str) -> String {
    let href = href.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    if !href.starts_with('/') {
        parts.extend(base_dir.split('/').filter(|p| !p.is_empty()));
    }
    for comp in href.split('/') {
        match comp {
            "" | "." => {}
            ".." => { parts.pop(); }
            c => parts.push(c),
        }
    }
    parts.join("/")
}
