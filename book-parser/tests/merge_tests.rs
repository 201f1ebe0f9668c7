use book_parser::chapter_merge::{merge_chapters, merge_image_chapters, merge_same_title, MergeOptions};
use segment_model::{Chapter, Segment};

fn chapter(title: &str, segments: Vec<Segment>) -> Chapter {
    let mut c = Chapter::new(title, 99);
    c.segments = segments;
    c
}

fn text(s: &str) -> Segment { Segment::text(s) }
fn img(s: &str) -> Segment { Segment::image(s, "") }

fn titles(chapters: &[Chapter]) -> Vec<&str> {
    chapters.iter().map(|c| c.title.as_str()).collect()
}

#[test]
fn same_title_runs_fold_into_the_first_chapter() {
    let merged = merge_same_title(vec![
        chapter("一", vec![text("a")]),
        chapter("一", vec![text("b"), img("x.png")]),
        chapter("二", vec![text("c")]),
        chapter("一", vec![text("d")]),
    ]);
    assert_eq!(titles(&merged), vec!["一", "二", "一"]);
    assert_eq!(merged[0].segments, vec![text("a"), text("b"), img("x.png")]);
    assert_eq!(merged.iter().map(|c| c.index).collect::<Vec<_>>(), vec![0, 1, 2]);
}

#[test]
fn same_title_merge_is_idempotent() {
    let once = merge_same_title(vec![
        chapter("序", vec![text("a")]),
        chapter("序", vec![text("b")]),
        chapter("本", vec![text("c")]),
        chapter("本", vec![text("d")]),
        chapter("本", vec![text("e")]),
    ]);
    let twice = merge_same_title(once.clone());
    assert_eq!(once, twice);
    assert!(once.windows(2).all(|w| w[0].title != w[1].title));
}

#[test]
fn image_only_runs_merge_but_empty_and_mixed_chapters_break_them() {
    let merged = merge_image_chapters(vec![
        chapter("口絵1", vec![img("1.png")]),
        chapter("口絵2", vec![img("2.png"), img("3.png")]),
        chapter("空", vec![]),
        chapter("口絵3", vec![img("4.png")]),
        chapter("本文", vec![text("t"), img("5.png")]),
        chapter("口絵4", vec![img("6.png")]),
    ]);
    assert_eq!(titles(&merged), vec!["口絵1", "空", "口絵3", "本文", "口絵4"]);
    assert_eq!(merged[0].segments, vec![img("1.png"), img("2.png"), img("3.png")]);
}

#[test]
fn passes_run_in_order_and_respect_toggles() {
    let input = vec![
        chapter("A", vec![img("1.png")]),
        chapter("A", vec![img("2.png")]),
        chapter("B", vec![img("3.png")]),
        chapter("C", vec![text("t")]),
    ];

    let both = merge_chapters(input.clone(), &MergeOptions::default());
    assert_eq!(titles(&both), vec!["A", "C"]);
    assert_eq!(both[0].segments.len(), 3);

    let none = merge_chapters(input.clone(), &MergeOptions { same_title: false, consecutive_images: false });
    assert_eq!(none.len(), 4);

    let titles_only = merge_chapters(input, &MergeOptions { same_title: true, consecutive_images: false });
    assert_eq!(titles(&titles_only), vec!["A", "B", "C"]);
    assert_eq!(titles_only[2].index, 2);
}
