use segment_model::{reindex, Chapter};

#[derive(Debug, Clone, Copy)]
pub struct MergeOptions {
    pub same_title: bool,
    pub consecutive_images: bool,
}

impl Default for MergeOptions {
    fn default() -> Self { Self { same_title: true, consecutive_images: true } }
}

/// Run the enabled passes in order: same title first, then image-only runs.
pub fn merge_chapters(chapters: Vec<Chapter>, opts: &MergeOptions) -> Vec<Chapter> {
    let before = chapters.len();
    let mut out = chapters;
    if opts.same_title { out = merge_same_title(out); }
    if opts.consecutive_images { out = merge_image_chapters(out); }
    if out.len() != before { log::debug!("merged {before} chapters into {}", out.len()); }
    out
}

/// Fold each run of consecutive chapters with identical titles into the run's first chapter.
pub fn merge_same_title(chapters: Vec<Chapter>) -> Vec<Chapter> {
    merge_runs(chapters, |head, next| head.title == next.title)
}

/// Fold each run of consecutive image-only chapters into the run's first chapter.
pub fn merge_image_chapters(chapters: Vec<Chapter>) -> Vec<Chapter> {
    merge_runs(chapters, |head, next| head.is_image_only() && next.is_image_only())
}

fn merge_runs(chapters: Vec<Chapter>, joins: impl Fn(&Chapter, &Chapter) -> bool) -> Vec<Chapter> {
    let mut out: Vec<Chapter> = Vec::with_capacity(chapters.len());
    for chapter in chapters {
        match out.last_mut() {
            Some(head) if joins(head, &chapter) => head.segments.extend(chapter.segments),
            _ => out.push(chapter),
        }
    }
    reindex(&mut out);
    out
}
