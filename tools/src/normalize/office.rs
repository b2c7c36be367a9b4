//! Office formats: spreadsheets to CSV, documents and decks to text or PDF.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use calamine::{Reader, open_workbook_auto_from_rs};
use quick_xml::Reader as XmlReader;
use quick_xml::events::Event;
use thiserror::Error;
use zip::ZipArchive;

const CONVERTER_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum OfficeError {
    #[error(transparent)]
    Spreadsheet(#[from] calamine::Error),
    #[error(transparent)]
    Archive(#[from] zip::result::ZipError),
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Every sheet as CSV, each preceded by `# Sheet: <name>` and followed by a
/// blank line.
pub fn spreadsheet_to_csv(path: &Path) -> Result<String, OfficeError> {
    let bytes = std::fs::read(path)?;
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;

    let mut out = String::new();
    for name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&name)?;
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());
        for row in range.rows() {
            writer.write_record(row.iter().map(ToString::to_string))?;
        }
        let body = writer.into_inner().map_err(|e| e.into_error())?;

        out.push_str(&format!("# Sheet: {name}\n"));
        out.push_str(&String::from_utf8_lossy(&body));
        out.push_str("\n\n");
    }
    Ok(out)
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<String, OfficeError> {
    let mut entry = archive.by_name(name)?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;
    Ok(xml)
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>, OfficeError> {
    Ok(ZipArchive::new(File::open(path)?)?)
}

/// Paragraph text of a `.docx`, in document order. Table rows are rendered
/// as `cell | cell`.
pub fn docx_text(path: &Path) -> Result<String, OfficeError> {
    let mut archive = open_archive(path)?;
    let xml = read_entry(&mut archive, "word/document.xml")?;
    wordprocessing_text(&xml)
}

fn wordprocessing_text(xml: &str) -> Result<String, OfficeError> {
    let mut reader = XmlReader::from_str(xml);
    let mut lines: Vec<String> = Vec::new();
    let mut paragraph = String::new();
    let mut in_text = false;
    let mut table_depth = 0usize;
    let mut cell = String::new();
    let mut row: Vec<String> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"p" => paragraph.clear(),
                b"tbl" => table_depth += 1,
                b"tr" => row.clear(),
                b"tc" => cell.clear(),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => paragraph.push('\t'),
                b"br" => paragraph.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => paragraph.push_str(&t.unescape()?),
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let text = paragraph.trim();
                    if table_depth > 0 {
                        if !text.is_empty() {
                            if !cell.is_empty() {
                                cell.push(' ');
                            }
                            cell.push_str(text);
                        }
                    } else if !text.is_empty() {
                        lines.push(text.to_string());
                    }
                    paragraph.clear();
                }
                b"tc" => row.push(std::mem::take(&mut cell)),
                b"tr" => {
                    if row.iter().any(|c| !c.is_empty()) {
                        lines.push(row.join(" | "));
                    }
                    row.clear();
                }
                b"tbl" => table_depth = table_depth.saturating_sub(1),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(lines.join("\n"))
}

fn slide_number(entry: &str) -> Option<u32> {
    entry
        .strip_prefix("ppt/slides/slide")?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}

/// Slide text of a `.pptx` under `## Slide N` headings.
pub fn pptx_text(path: &Path) -> Result<String, OfficeError> {
    let mut archive = open_archive(path)?;
    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| slide_number(name).map(|n| (n, name.to_string())))
        .collect();
    slides.sort_unstable_by_key(|(n, _)| *n);

    let mut out = String::new();
    for (number, entry) in slides {
        let xml = read_entry(&mut archive, &entry)?;
        out.push_str(&format!("## Slide {number}\n"));
        for paragraph in drawing_paragraphs(&xml)? {
            out.push_str(&paragraph);
            out.push('\n');
        }
        out.push('\n');
    }
    Ok(out.trim_end().to_string())
}

fn drawing_paragraphs(xml: &str) -> Result<Vec<String>, OfficeError> {
    let mut reader = XmlReader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"p" => current.clear(),
                _ => {}
            },
            Event::Text(t) if in_text => current.push_str(&t.unescape()?),
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let text = current.trim();
                    if !text.is_empty() {
                        paragraphs.push(text.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(paragraphs)
}

/// Paragraph and heading text of an OpenDocument text or presentation file.
pub fn odf_text(path: &Path) -> Result<String, OfficeError> {
    let mut archive = open_archive(path)?;
    let xml = read_entry(&mut archive, "content.xml")?;
    opendocument_text(&xml)
}

fn opendocument_text(xml: &str) -> Result<String, OfficeError> {
    let mut reader = XmlReader::from_str(xml);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) if matches!(e.local_name().as_ref(), b"p" | b"h") => {
                if depth == 0 {
                    current.clear();
                }
                depth += 1;
            }
            Event::Empty(e) if depth > 0 => match e.local_name().as_ref() {
                b"s" => current.push(' '),
                b"tab" => current.push('\t'),
                b"line-break" => current.push('\n'),
                _ => {}
            },
            Event::Text(t) if depth > 0 => current.push_str(&t.unescape()?),
            Event::End(e) if matches!(e.local_name().as_ref(), b"p" | b"h") => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let text = current.trim();
                    if !text.is_empty() {
                        lines.push(text.to_string());
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(lines.join("\n"))
}

/// Headless office suite used for `.docx`/`.pptx` to PDF conversion.
#[derive(Debug, Clone, Default)]
pub struct OfficeConverter {
    binary: Option<PathBuf>,
}

impl OfficeConverter {
    /// Looks for `soffice`, then `libreoffice`, on `PATH`.
    #[must_use]
    pub fn detect() -> Self {
        let binary = which::which("soffice")
            .or_else(|_| which::which("libreoffice"))
            .ok();
        match &binary {
            Some(path) => tracing::debug!(path = %path.display(), "Office converter found"),
            None => tracing::debug!("No office converter on PATH; using text extraction"),
        }
        Self { binary }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self { binary: None }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.binary.is_some()
    }

    /// PDF bytes, or `None` when no converter is installed or it fails.
    pub async fn to_pdf(&self, input: &Path) -> Option<Vec<u8>> {
        let binary = self.binary.as_ref()?;
        match self.run(binary, input).await {
            Ok(pdf) => Some(pdf),
            Err(e) => {
                tracing::warn!(input = %input.display(), "Office conversion failed: {e}");
                None
            }
        }
    }

    async fn run(&self, binary: &Path, input: &Path) -> Result<Vec<u8>, std::io::Error> {
        let outdir = tempfile::tempdir()?;
        let mut command = tokio::process::Command::new(binary);
        command
            .args(["--headless", "--convert-to", "pdf", "--outdir"])
            .arg(outdir.path())
            .arg(input)
            .kill_on_drop(true);

        let output = tokio::time::timeout(CONVERTER_TIMEOUT, command.output())
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "converter timed out"))??;
        if !output.status.success() {
            return Err(std::io::Error::other(format!(
                "converter exited with {}",
                output.status
            )));
        }

        let stem = input
            .file_stem()
            .ok_or_else(|| std::io::Error::other("input has no file name"))?;
        let pdf = outdir.path().join(stem).with_extension("pdf");
        tokio::fs::read(pdf).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write;

    use super::*;
    use zip::write::SimpleFileOptions;

    pub(crate) fn write_zip(entries: &[(&str, &str)]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut zip = zip::ZipWriter::new(file.reopen().unwrap());
        for (name, body) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
        file
    }

    fn sheet_xml(rows: &[&[&str]]) -> String {
        let mut xml = String::from(
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
        );
        for (r, row) in rows.iter().enumerate() {
            xml.push_str(&format!(r#"<row r="{}">"#, r + 1));
            for (c, value) in row.iter().enumerate() {
                let cell = format!("{}{}", char::from(b'A' + c as u8), r + 1);
                if value.parse::<f64>().is_ok() {
                    xml.push_str(&format!(r#"<c r="{cell}"><v>{value}</v></c>"#));
                } else {
                    xml.push_str(&format!(
                        r#"<c r="{cell}" t="inlineStr"><is><t>{value}</t></is></c>"#
                    ));
                }
            }
            xml.push_str("</row>");
        }
        xml.push_str("</sheetData></worksheet>");
        xml
    }

    /// Minimal two-sheet workbook.
    pub(crate) fn write_xlsx() -> tempfile::NamedTempFile {
        let workbook = r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="People" sheetId="1" r:id="rId1"/><sheet name="Cities" sheetId="2" r:id="rId2"/></sheets></workbook>"#;
        let rels = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/></Relationships>"#;
        let content_types = r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/></Types>"#;
        let people = sheet_xml(&[&["Name", "Age"], &["Ada", "36"]]);
        let cities = sheet_xml(&[&["City"], &["Paris"]]);
        write_zip(&[
            ("[Content_Types].xml", content_types),
            ("xl/workbook.xml", workbook),
            ("xl/_rels/workbook.xml.rels", rels),
            ("xl/worksheets/sheet1.xml", &people),
            ("xl/worksheets/sheet2.xml", &cities),
        ])
    }

    #[test]
    fn every_sheet_gets_a_marker() {
        let file = write_xlsx();
        let csv = spreadsheet_to_csv(file.path()).unwrap();
        assert_eq!(
            csv,
            "# Sheet: People\nName,Age\nAda,36\n\n\n# Sheet: Cities\nCity\nParis\n\n\n"
        );
    }

    #[test]
    fn docx_keeps_paragraph_order_and_table_rows() {
        let xml = r#"<w:document xmlns:w="w"><w:body>
            <w:p><w:r><w:t>Intro</w:t></w:r><w:r><w:t xml:space="preserve"> text</w:t></w:r></w:p>
            <w:tbl>
              <w:tr><w:tc><w:p><w:r><w:t>Name</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>Qty</w:t></w:r></w:p></w:tc></w:tr>
              <w:tr><w:tc><w:p><w:r><w:t>Bolts &amp; nuts</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>4</w:t></w:r></w:p></w:tc></w:tr>
            </w:tbl>
            <w:p><w:r><w:t>Outro</w:t></w:r></w:p>
            <w:p></w:p>
        </w:body></w:document>"#;
        let file = write_zip(&[("word/document.xml", xml)]);

        let text = docx_text(file.path()).unwrap();
        assert_eq!(text, "Intro text\nName | Qty\nBolts & nuts | 4\nOutro");
    }

    #[test]
    fn pptx_slides_are_numbered_in_order() {
        let slide = |text: &str| {
            format!(
                r#"<p:sld xmlns:p="p" xmlns:a="a"><p:txBody><a:p><a:r><a:t>{text}</a:t></a:r></a:p></p:txBody></p:sld>"#
            )
        };
        let file = write_zip(&[
            ("ppt/slides/slide10.xml", &slide("Ten")),
            ("ppt/slides/slide2.xml", &slide("Two")),
            ("ppt/slides/_rels/slide2.xml.rels", "<Relationships/>"),
        ]);

        let text = pptx_text(file.path()).unwrap();
        assert_eq!(text, "## Slide 2\nTwo\n\n## Slide 10\nTen");
    }

    #[test]
    fn opendocument_reads_paragraphs_and_headings() {
        let xml = r#"<office:document-content xmlns:office="o" xmlns:text="t"><office:body><office:text>
            <text:h>Title</text:h>
            <text:p>Hello<text:s/><text:span>world</text:span></text:p>
            <text:p/>
        </office:text></office:body></office:document-content>"#;
        let file = write_zip(&[("content.xml", xml)]);

        assert_eq!(odf_text(file.path()).unwrap(), "Title\nHello world");
    }

    #[test]
    fn missing_document_part_is_an_error() {
        let file = write_zip(&[("other.xml", "<x/>")]);
        assert!(matches!(docx_text(file.path()), Err(OfficeError::Archive(_))));
    }

    #[test]
    fn disabled_converter_is_unavailable() {
        assert!(!OfficeConverter::disabled().is_available());
    }
}
