// Copyright 2023 Remi Bernotavicius

//! Renders a heading plus a list of lines as a downloadable document.
//!
//! The PDF output is small: A4 pages, the standard Helvetica fonts (so nothing
//! is embedded) and one text object per page. Text is encoded as WinAnsi;
//! characters outside it are replaced by `?`. Use the `txt` format for full
//! Unicode.

use crate::error::{AppError, AppResult};
use derive_more::Display;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};
use strum::EnumString;

#[derive(Debug, Display, EnumString, Default, Copy, Clone, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum DocumentFormat {
    #[default]
    #[display("pdf")]
    Pdf,
    #[display("txt")]
    Txt,
}

impl DocumentFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Txt => "text/plain; charset=utf-8",
        }
    }

    pub fn file_name(&self, stem: &str) -> String {
        format!("{stem}.{self}")
    }
}

pub fn render(
    format: DocumentFormat,
    heading: &str,
    date: chrono::NaiveDate,
    lines: &[String],
) -> AppResult<Vec<u8>> {
    let subheading = date.format("%e %B %Y").to_string();
    let subheading = subheading.trim();
    match format {
        DocumentFormat::Pdf => render_pdf(heading, subheading, lines),
        DocumentFormat::Txt => Ok(render_text(heading, subheading, lines).into_bytes()),
    }
}

fn render_text(heading: &str, subheading: &str, lines: &[String]) -> String {
    let mut text = format!("{heading}\n{subheading}\n\n");
    for line in lines {
        text += line;
        text += "\n";
    }
    text
}

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 56;
const FONT_SIZE: i64 = 12;
const HEADING_FONT_SIZE: i64 = 16;
const SUBHEADING_FONT_SIZE: i64 = 10;
const LEADING: i64 = 18;
const LINES_PER_PAGE: usize = ((PAGE_HEIGHT - 2 * MARGIN) / LEADING) as usize;
/// Heading, date and a blank line.
const HEADING_LINES: usize = 3;

fn paginate(lines: &[String]) -> Vec<&[String]> {
    let (first, rest) = lines.split_at(lines.len().min(LINES_PER_PAGE - HEADING_LINES));
    let mut pages = vec![first];
    pages.extend(rest.chunks(LINES_PER_PAGE));
    pages
}

fn win_ansi(c: char) -> u8 {
    match c {
        ' '..='~' => c as u8,
        '\u{a0}'..='\u{ff}' => c as u32 as u8,
        '€' => 0x80,
        '…' => 0x85,
        '‘' => 0x91,
        '’' => 0x92,
        '“' => 0x93,
        '”' => 0x94,
        '•' => 0x95,
        '–' => 0x96,
        '—' => 0x97,
        _ => b'?',
    }
}

fn pdf_text(text: &str) -> Object {
    Object::String(text.chars().map(win_ansi).collect(), StringFormat::Literal)
}

fn show(text: &str) -> [Operation; 2] {
    [
        Operation::new("Tj", vec![pdf_text(text)]),
        Operation::new("T*", vec![]),
    ]
}

fn page_content(heading: Option<(&str, &str)>, lines: &[String]) -> Content {
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Td", vec![MARGIN.into(), (PAGE_HEIGHT - MARGIN - FONT_SIZE).into()]),
        Operation::new("TL", vec![LEADING.into()]),
    ];

    if let Some((heading, subheading)) = heading {
        operations.push(Operation::new("Tf", vec!["F2".into(), HEADING_FONT_SIZE.into()]));
        operations.extend(show(heading));
        operations.push(Operation::new("Tf", vec!["F1".into(), SUBHEADING_FONT_SIZE.into()]));
        operations.extend(show(subheading));
        operations.push(Operation::new("T*", vec![]));
    }

    operations.push(Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]));
    for line in lines {
        operations.extend(show(line));
    }
    operations.push(Operation::new("ET", vec![]));
    Content { operations }
}

fn render_pdf(heading: &str, subheading: &str, lines: &[String]) -> AppResult<Vec<u8>> {
    let pdf_error = |e: lopdf::Error| AppError::Internal(format!("pdf: {e}").into());

    let mut doc = Document::with_version("1.4");
    let pages_id = doc.new_object_id();
    let body_font = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let heading_font = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => body_font,
            "F2" => heading_font,
        },
    });

    let mut kids = vec![];
    for (i, page_lines) in paginate(lines).into_iter().enumerate() {
        let heading = (i == 0).then_some((heading, subheading));
        let content = page_content(heading, page_lines).encode().map_err(pdf_error)?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::from(page_id));
    }

    let pages = dictionary! {
        "Type" => "Pages",
        "Count" => kids.len() as i64,
        "Kids" => kids,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .map_err(|e| AppError::Internal(format!("pdf: {e}").into()))?;
    Ok(buf)
}

#[cfg(test)]
fn numbered_lines(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("ingredient {i} (g) – {i}")).collect()
}

#[cfg(test)]
fn page_texts(pdf: &[u8]) -> Vec<Vec<Vec<u8>>> {
    let doc = Document::load_mem(pdf).unwrap();
    doc.get_pages()
        .into_values()
        .map(|page| {
            let content = Content::decode(&doc.get_page_content(page).unwrap()).unwrap();
            content
                .operations
                .into_iter()
                .filter(|op| op.operator == "Tj")
                .map(|op| match &op.operands[0] {
                    Object::String(bytes, _) => bytes.clone(),
                    other => panic!("unexpected operand {other:?}"),
                })
                .collect()
        })
        .collect()
}

#[test]
fn format_parsing() {
    use std::str::FromStr as _;

    assert_eq!(DocumentFormat::from_str("pdf").unwrap(), DocumentFormat::Pdf);
    assert_eq!(DocumentFormat::from_str("txt").unwrap(), DocumentFormat::Txt);
    assert!(DocumentFormat::from_str("docx").is_err());
    assert_eq!(DocumentFormat::default().file_name("shopping_list"), "shopping_list.pdf");
}

#[test]
fn pagination() {
    let first_page = LINES_PER_PAGE - HEADING_LINES;

    assert_eq!(paginate(&[]).len(), 1);
    let lines = numbered_lines(first_page);
    assert_eq!(paginate(&lines).len(), 1);
    let lines = numbered_lines(first_page + 1);
    assert_eq!(paginate(&lines).len(), 2);

    let lines = numbered_lines(first_page + LINES_PER_PAGE + 1);
    let pages = paginate(&lines);
    assert_eq!(
        pages.iter().map(|p| p.len()).collect::<Vec<_>>(),
        vec![first_page, LINES_PER_PAGE, 1]
    );
}

#[test]
fn win_ansi_encoding() {
    let encode = |text: &str| text.chars().map(win_ansi).collect::<Vec<_>>();
    assert_eq!(encode("flour – 5"), b"flour \x96 5".to_vec());
    assert_eq!(encode("crème"), b"cr\xe8me".to_vec());
    assert_eq!(encode("соль"), b"????".to_vec());
}

#[test]
fn pdf_pages_and_text() {
    let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
    let pdf = render(DocumentFormat::Pdf, "Shopping list", date, &numbered_lines(50)).unwrap();
    assert!(pdf.starts_with(b"%PDF-1.4"));

    let pages = page_texts(&pdf);
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0][0], b"Shopping list".to_vec());
    assert_eq!(pages[0][1], b"2 March 2024".to_vec());
    assert_eq!(pages[0].len() + pages[1].len(), 2 + 50);
    assert_eq!(
        pages[1].last().unwrap(),
        &b"ingredient 50 (g) \x96 50".to_vec()
    );
}

#[test]
fn empty_list_is_still_a_document() {
    let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
    let pdf = render(DocumentFormat::Pdf, "Shopping list", date, &[]).unwrap();
    let pages = page_texts(&pdf);
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].len(), 2);

    let text = render(DocumentFormat::Txt, "Shopping list", date, &[]).unwrap();
    assert_eq!(String::from_utf8(text).unwrap(), "Shopping list\n2 March 2024\n\n");
}

#[test]
fn text_keeps_unicode() {
    let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
    let lines = vec!["соль (г) – 5".to_string(), "flour (g) – 35".to_string()];
    let text = render(DocumentFormat::Txt, "Shopping list", date, &lines).unwrap();
    assert_eq!(
        String::from_utf8(text).unwrap(),
        "Shopping list\n2 March 2024\n\nсоль (г) – 5\nflour (g) – 35\n"
    );
}
