//! Plain text out of office documents for the company context.
//!
//! `.docx` is read from `word/document.xml` inside the zip container, one
//! line per paragraph. `.pdf` goes through `pdf-extract`.

use std::fs::File;
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use quick_xml::Reader as XmlReader;
use quick_xml::events::Event;
use zip::ZipArchive;

/// Extensions [`extract_text`] understands besides plain text.
pub const DOCUMENT_EXTENSIONS: &[&str] = &[".docx", ".pdf"];

pub fn is_document_extension(ext: &str) -> bool {
    DOCUMENT_EXTENSIONS.contains(&ext)
}

/// Text of the document at `path`, chosen by extension (`".docx"`, `".pdf"`).
pub fn extract_text(path: &Path, ext: &str) -> Result<String> {
    match ext {
        ".docx" => extract_docx(path),
        ".pdf" => extract_pdf(path),
        other => Err(anyhow!("no text extractor for '{other}'")),
    }
}

pub fn extract_docx(path: &Path) -> Result<String> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file).context("not a valid docx archive")?;
    let mut entry = archive.by_name("word/document.xml").context("docx has no word/document.xml")?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;
    docx_paragraphs(&xml)
}

/// Paragraph texts of a WordprocessingML body, joined by newlines.
fn docx_paragraphs(xml: &str) -> Result<String> {
    let mut reader = XmlReader::from_str(xml);
    reader.trim_text(false);
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let para = current.trim_end();
                    if !para.is_empty() {
                        paragraphs.push(para.to_owned());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let text = t.unescape().unwrap_or_else(|_| String::from_utf8_lossy(t.as_ref()));
                current.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(anyhow!("docx xml error at {}: {e}", reader.buffer_position())),
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs.join("\n"))
}

pub fn extract_pdf(path: &Path) -> Result<String> {
    // pdf-extract panics on some malformed files.
    match panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text(path))) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(anyhow!("pdf parse failed: {e}")),
        Err(_) => Err(anyhow!("pdf parser crashed")),
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    /// Minimal `.docx` holding `paragraphs` in `word/document.xml`.
    pub(crate) fn write_docx(path: &Path, paragraphs: &[&str]) {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t xml:space=\"preserve\">{p}</w:t></w:r></w:p>"))
            .collect();
        let xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
             <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
             <w:body>{body}</w:body></w:document>"
        );
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        zip.start_file("word/document.xml", options).unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handbook.docx");
        write_docx(&path, &["Opening hours", "Mon &amp; Tue 9-5"]);
        assert_eq!(extract_docx(&path).unwrap(), "Opening hours\nMon & Tue 9-5");
    }

    #[test]
    fn runs_tabs_and_breaks_are_kept() {
        let xml = "<w:document xmlns:w=\"w\"><w:body>\
                   <w:p><w:r><w:t>Name</w:t><w:tab/><w:t>Role</w:t></w:r></w:p>\
                   <w:p/>\
                   <w:p><w:r><w:t>a</w:t><w:br/><w:t>b</w:t></w:r><w:r><w:t>c</w:t></w:r></w:p>\
                   </w:body></w:document>";
        assert_eq!(docx_paragraphs(xml).unwrap(), "Name\tRole\na\nbc");
    }

    #[test]
    fn broken_documents_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let docx = dir.path().join("fake.docx");
        std::fs::write(&docx, b"not a zip").unwrap();
        assert!(extract_docx(&docx).is_err());

        let pdf = dir.path().join("fake.pdf");
        std::fs::write(&pdf, b"%PDF-1.4 garbage").unwrap();
        assert!(extract_pdf(&pdf).is_err());
        assert!(extract_text(&pdf, ".xls").is_err());
    }
}
