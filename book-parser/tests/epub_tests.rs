use std::io::Write;
use std::path::Path;

use book_parser::chapter_merge::merge_same_title;
use book_parser::epub_parser::build_chapters;
use book_parser::image_map::ImageMap;
use book_parser::reader_epub::{read_epub, EpubPackage, SpineSection};
use book_parser::{book_id_for_file, parse_epub_file, BookAssets, EpubParams};
use segment_model::{Chapter, Segment};

const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;

const OPF: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>吾輩は猫である</dc:title>
    <dc:creator>夏目漱石</dc:creator>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="p-001" href="Text/p-001.xhtml" media-type="application/xhtml+xml"/>
    <item id="p-002" href="Text/p-002.xhtml" media-type="application/xhtml+xml"/>
    <item id="pic" href="Images/pic.png" media-type="image/png"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="p-001"/>
    <itemref idref="p-002"/>
  </spine>
</package>"#;

const NCX: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <docTitle><text>吾輩は猫である</text></docTitle>
  <navMap>
    <navPoint id="n1" playOrder="1">
      <navLabel><text>序章</text></navLabel>
      <content src="Text/p-001.xhtml#start"/>
    </navPoint>
  </navMap>
</ncx>"#;

const P001: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>p-001</title></head><body><p>吾輩は<ruby>猫<rt>ねこ</rt></ruby>である。</p><p><img src="../Images/pic.png" alt="挿絵"/></p><p>名前はまだ無い。</p></body></html>"#;

const P002: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>p-002</title></head><body><p>どこで生れたかとんと見当がつかぬ。</p></body></html>"#;

fn write_epub(path: &Path, files: &[(&str, &str)]) {
    let file = std::fs::File::create(path).expect("create epub");
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default();
    for (name, data) in files {
        zip.start_file(*name, options).expect("start entry");
        zip.write_all(data.as_bytes()).expect("write entry");
    }
    zip.finish().expect("finish zip");
}

fn sample_epub(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("neko.epub");
    write_epub(&path, &[
        ("mimetype", "application/epub+zip"),
        ("META-INF/container.xml", CONTAINER),
        ("OEBPS/content.opf", OPF),
        ("OEBPS/toc.ncx", NCX),
        ("OEBPS/Text/p-001.xhtml", P001),
        ("OEBPS/Text/p-002.xhtml", P002),
        ("OEBPS/Images/pic.png", "PNG fake"),
    ]);
    path
}

/// Text with images replaced by a marker, for reading-order comparisons.
fn flatten(chapter: &Chapter) -> String {
    chapter.segments.iter().map(|s| match s {
        Segment::Text(t) => t.surface_text(),
        Segment::Image(_) => "[IMG]".to_string(),
    }).collect()
}

fn section(id: &str, body: &str) -> SpineSection {
    SpineSection {
        id: id.to_string(),
        path: format!("OEBPS/Text/{id}.xhtml"),
        content: format!("<html><body>{body}</body></html>"),
    }
}

#[test]
fn reads_container_opf_and_ncx() {
    let dir = tempfile::tempdir().expect("tempdir");
    let package = read_epub(&sample_epub(dir.path())).expect("epub reads");

    assert_eq!(package.title.as_deref(), Some("吾輩は猫である"));
    assert_eq!(package.author.as_deref(), Some("夏目漱石"));
    let paths: Vec<&str> = package.sections.iter().map(|s| s.path.as_str()).collect();
    assert_eq!(paths, vec!["OEBPS/Text/p-001.xhtml", "OEBPS/Text/p-002.xhtml"]);
    assert_eq!(package.toc.get("OEBPS/Text/p-001.xhtml").map(String::as_str), Some("序章"));
    assert_eq!(package.toc.len(), 1);
    assert_eq!(package.images.len(), 1);
    assert_eq!(package.images[0].path, "OEBPS/Images/pic.png");
}

#[test]
fn continuation_section_inherits_toc_title_and_merges() {
    let dir = tempfile::tempdir().expect("tempdir");
    let epub = sample_epub(dir.path());
    let assets = BookAssets::new(dir.path().join("data"), "/static");

    let book = parse_epub_file(&epub, &assets, &EpubParams::default()).expect("parse succeeds");
    let book_id = book_id_for_file(&epub).expect("book id");
    assert_eq!(book.book_id, book_id);
    assert_eq!(book.book_id.len(), 12);

    assert_eq!(book.chapters.len(), 2);
    assert!(book.chapters.iter().all(|c| c.title == "序章"));

    let web = format!("/static/books/{book_id}/images/pic.png");
    assert_eq!(book.cover.as_deref(), Some(web.as_str()));
    assert!(assets.images_dir(&book_id).join("pic.png").is_file());

    let merged = merge_same_title(book.chapters.clone());
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].index, 0);
    assert_eq!(merged[0].segments.len(), book.chapters[0].segments.len() + book.chapters[1].segments.len());
    assert_eq!(
        flatten(&merged[0]),
        "吾輩は猫である。\n[IMG]名前はまだ無い。\nどこで生れたかとんと見当がつかぬ。\n"
    );
    match &merged[0].segments[1] {
        Segment::Image(img) => { assert_eq!(img.src, web); assert_eq!(img.alt, "挿絵"); }
        other => panic!("expected image, got {other:?}"),
    }
}

#[test]
fn ruby_glosses_scripts_and_comments_are_skipped() {
    let package = EpubPackage {
        sections: vec![section("s1", "<p>漢<ruby>字<rp>(</rp><rt>じ</rt><rp>)</rp></ruby></p><script>var x = 1;</script><!-- note --><style>p{}</style><p>終</p>")],
        ..Default::default()
    };
    let chapters = build_chapters(&package, &ImageMap::new(), &EpubParams::default());
    assert_eq!(chapters.len(), 1);
    assert_eq!(flatten(&chapters[0]), "漢字\n終\n");
}

#[test]
fn line_breaks_and_blocks_never_double_newlines() {
    let package = EpubPackage {
        sections: vec![section("s1", "<div><p>一行目<br/>二行目</p></div><blockquote><p>引用</p></blockquote><span>続き</span>")],
        ..Default::default()
    };
    let chapters = build_chapters(&package, &ImageMap::new(), &EpubParams::default());
    assert_eq!(flatten(&chapters[0]), "一行目\n二行目\n引用\n続き");
}

#[test]
fn unresolved_images_are_dropped_and_resolved_ones_keep_order() {
    let mut images = ImageMap::new();
    images.insert("OEBPS/Images/a.png", "/static/a.png");
    let package = EpubPackage {
        sections: vec![section("s1", r#"<p>前</p><img src="../Images/a.png"/><img src="missing.png"/><p>後</p><svg><image xlink:href="a.png"/></svg>"#)],
        ..Default::default()
    };
    let chapters = build_chapters(&package, &images, &EpubParams::default());
    assert_eq!(flatten(&chapters[0]), "前\n[IMG]後\n[IMG]");
}

#[test]
fn title_chain_falls_back_through_heading_heuristics_and_number() {
    let mut images = ImageMap::new();
    images.insert("OEBPS/Images/only.png", "/static/only.png");
    let long_line = "あ".repeat(40);
    let package = EpubPackage {
        sections: vec![
            section("s1", "<h2>第一章 <ruby>猫<rt>ねこ</rt></ruby></h2><p>本文。</p>"),
            section("s2", "<p>「約束の日」</p><p>朝が来た。</p>"),
            section("s3", "<p>雨の夜。</p><p>静かだった</p>"),
            section("s4", &format!("<p>{long_line}</p>")),
            section("s5", r#"<img src="../Images/only.png"/>"#),
            section("s6", "<p>   </p>"),
        ],
        ..Default::default()
    };
    let chapters = build_chapters(&package, &images, &EpubParams::default());
    let titles: Vec<&str> = chapters.iter().map(|c| c.title.as_str()).collect();
    let truncated: String = "あ".repeat(32);
    assert_eq!(titles, vec!["第一章 猫", "「約束の日」", "雨の夜。", truncated.as_str(), "Chapter 5"]);

    // bracketed titles are lifted out of the body
    assert_eq!(flatten(&chapters[1]), "朝が来た。\n");
    // other heuristics leave the body alone
    assert_eq!(flatten(&chapters[2]), "雨の夜。\n静かだった\n");
    assert_eq!(chapters.iter().map(|c| c.index).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn bracketed_title_alone_before_an_illustration_is_not_repeated() {
    let mut images = ImageMap::new();
    images.insert("OEBPS/Images/frontispiece.png", "/static/frontispiece.png");
    let package = EpubPackage {
        sections: vec![section("s1", r#"<p>「序章」</p><img src="../Images/frontispiece.png"/><p>本文です。</p>"#)],
        ..Default::default()
    };
    let chapters = build_chapters(&package, &images, &EpubParams::default());
    assert_eq!(chapters.len(), 1);
    assert_eq!(chapters[0].title, "「序章」");
    assert_eq!(flatten(&chapters[0]), "[IMG]本文です。\n");
    assert!(chapters[0].segments[0].is_image());
}

#[test]
fn toc_title_replaces_inherited_one() {
    let mut package = EpubPackage {
        sections: vec![section("a", "<p>一。</p>"), section("b", "<p>二。</p>"), section("c", "<p>三。</p>")],
        ..Default::default()
    };
    package.toc.insert("OEBPS/Text/a.xhtml".into(), "第一部".into());
    package.toc.insert("OEBPS/Text/c.xhtml".into(), "第二部".into());
    let chapters = build_chapters(&package, &ImageMap::new(), &EpubParams::default());
    let titles: Vec<&str> = chapters.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["第一部", "第一部", "第二部"]);
}

#[test]
fn nav_document_supplies_toc_for_epub3() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("v3.epub");
    let opf = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>三版</dc:title></metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="c1" href="c%201.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine><itemref idref="c1"/></spine>
</package>"#;
    let nav = r#"<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops"><body>
<nav epub:type="toc"><ol><li><a href="c%201.xhtml#top">第一章</a></li></ol></nav>
<nav epub:type="landmarks"><ol><li><a href="c%201.xhtml">本文</a></li></ol></nav>
</body></html>"#;
    write_epub(&path, &[
        ("META-INF/container.xml", CONTAINER.replace("OEBPS/content.opf", "content.opf").as_str()),
        ("content.opf", opf),
        ("nav.xhtml", nav),
        ("c 1.xhtml", "<html><body><p>はじまり。</p></body></html>"),
    ]);

    let package = read_epub(&path).expect("epub reads");
    assert_eq!(package.title.as_deref(), Some("三版"));
    assert_eq!(package.sections.len(), 1);
    assert_eq!(package.sections[0].path, "c 1.xhtml");
    assert_eq!(package.toc.get("c 1.xhtml").map(String::as_str), Some("第一章"));
}

#[test]
fn missing_spine_document_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("broken.epub");
    write_epub(&path, &[
        ("META-INF/container.xml", CONTAINER),
        ("OEBPS/content.opf", OPF),
        ("OEBPS/Text/p-001.xhtml", P001),
    ]);
    let err = read_epub(&path).expect_err("p-002 is missing");
    assert!(matches!(err, book_parser::ParseError::MissingFile(ref p) if p == "OEBPS/Text/p-002.xhtml"), "{err:?}");
}
