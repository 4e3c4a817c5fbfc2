//! Format-specific content extraction: one file in, plain text plus
//! structural metadata out.

use crate::config::OcrConfig;
use crate::error::IngestError;
use crate::metadata::{encode_value, Metadata};
use base64::{engine::general_purpose::STANDARD, Engine};
use lopdf::Document;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

pub const SUPPORTED_EXTENSIONS: [&str; 12] = [
    "txt", "md", "pdf", "docx", "doc", "pptx", "xlsx", "xls", "csv", "json", "html", "xml",
];

#[derive(Debug, Clone)]
pub struct ExtractorOptions {
    /// Files larger than this fail validation before any parsing.
    pub max_file_size: u64,
    /// OCR fallback endpoint for image-only PDFs; `None` disables OCR.
    pub ocr: Option<OcrConfig>,
}

pub fn is_supported_extension(extension: &str) -> bool {
    SUPPORTED_EXTENSIONS.contains(&extension)
}

/// Extract plain text and metadata from `path`, dispatching on the file
/// extension. The returned metadata always carries a `format` key.
pub fn extract(path: &Path, options: &ExtractorOptions) -> Result<(String, Metadata), IngestError> {
    let file_size = fs::metadata(path)?.len();
    if file_size > options.max_file_size {
        return Err(IngestError::Validation(format!(
            "file too large: {file_size} bytes (max {})",
            options.max_file_size
        )));
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "txt" => extract_text_file(path),
        "md" => extract_markdown(path),
        "pdf" => extract_pdf(path, options.ocr.as_ref()),
        "docx" => extract_docx(path),
        "doc" => Ok(legacy_placeholder(
            "doc",
            "Legacy .doc files cannot be parsed; convert to .docx and re-upload.",
        )),
        "pptx" => extract_pptx(path),
        "xlsx" => extract_xlsx(path),
        "xls" => Ok(legacy_placeholder(
            "xls",
            "Legacy .xls files cannot be parsed; convert to .xlsx and re-upload.",
        )),
        "csv" => extract_csv(path),
        "json" => extract_json(path),
        "html" => extract_html(path),
        "xml" => extract_xml(path),
        other => Err(IngestError::Validation(format!(
            "unsupported file format: .{other}"
        ))),
    }
}

/// Legacy binary formats degrade softly: a placeholder explanation and an
/// `error` flag, because partial ingestion beats blocking an upload.
fn legacy_placeholder(format: &str, message: &str) -> (String, Metadata) {
    warn!(format, "legacy format without a parser, storing placeholder");
    let mut metadata = Metadata::new();
    metadata.insert("format".to_string(), format.into());
    metadata.insert("error".to_string(), "unsupported".into());
    (message.to_string(), metadata)
}

// ---------------------------------------------------------------------------
// Plain text and markdown

/// Decode raw bytes with auto-detected encoding: BOM sniff first, strict
/// UTF-8 next, then GB18030 and windows-1252 as lossy fallbacks.
fn decode_bytes(bytes: &[u8]) -> (String, &'static str) {
    if let Some((encoding, _bom_len)) = encoding_rs::Encoding::for_bom(bytes) {
        let (text, _, _) = encoding.decode(bytes);
        return (text.into_owned(), encoding.name());
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), "UTF-8"),
        Err(_) => {
            let (text, _, had_errors) = encoding_rs::GB18030.decode(bytes);
            if !had_errors {
                (text.into_owned(), "GB18030")
            } else {
                let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
                (text.into_owned(), "windows-1252")
            }
        }
    }
}

fn extract_text_file(path: &Path) -> Result<(String, Metadata), IngestError> {
    let bytes = fs::read(path)?;
    let (content, encoding) = decode_bytes(&bytes);

    let mut metadata = Metadata::new();
    metadata.insert("format".to_string(), "txt".into());
    metadata.insert("encoding".to_string(), encoding.into());
    metadata.insert(
        "line_count".to_string(),
        (content.matches('\n').count() + 1).into(),
    );
    Ok((content, metadata))
}

fn extract_markdown(path: &Path) -> Result<(String, Metadata), IngestError> {
    let bytes = fs::read(path)?;
    let (content, encoding) = decode_bytes(&bytes);

    let heading_re = Regex::new(r"(?m)^#{1,6}\s+(.+)$").map_err(regex_error)?;
    let headers: Vec<String> = heading_re
        .captures_iter(&content)
        .map(|capture| capture[1].trim().to_string())
        .collect();

    // Drop heading markers, code-fence lines, and emphasis markers; the
    // prose itself is the text.
    let fence_re = Regex::new(r"(?m)^```[^\n]*$").map_err(regex_error)?;
    let text = heading_re.replace_all(&content, "$1");
    let text = fence_re.replace_all(&text, "");
    let text = text.replace("**", "").replace("__", "").replace('`', "");

    let mut metadata = Metadata::new();
    metadata.insert("format".to_string(), "markdown".into());
    metadata.insert("encoding".to_string(), encoding.into());
    metadata.insert("headers".to_string(), encode_value(&json!(headers)));
    metadata.insert(
        "has_code_blocks".to_string(),
        content.contains("```").into(),
    );
    metadata.insert(
        "has_tables".to_string(),
        (content.contains('|') && content.contains("---")).into(),
    );
    Ok((text, metadata))
}

// ---------------------------------------------------------------------------
// PDF

fn extract_pdf(path: &Path, ocr: Option<&OcrConfig>) -> Result<(String, Metadata), IngestError> {
    let document =
        Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

    let pages = document.get_pages();
    let page_count = pages.len();
    let mut parts = Vec::new();

    for (page_no, _object_id) in pages {
        match document.extract_text(&[page_no]) {
            Ok(text) if !text.trim().is_empty() => parts.push(text),
            Ok(_) => {}
            Err(error) => {
                warn!(page = page_no, %error, "failed to extract text from page");
            }
        }
    }

    let mut metadata = Metadata::new();
    metadata.insert("format".to_string(), "pdf".into());
    metadata.insert("page_count".to_string(), page_count.into());

    let content = parts.join("\n\n");
    if !content.trim().is_empty() {
        return Ok((content, metadata));
    }

    match ocr {
        Some(config) => {
            info!(path = %path.display(), "no extractable pdf text, running OCR fallback");
            let content = ocr_pdf(path, config)?;
            metadata.insert("ocr_used".to_string(), true.into());
            Ok((content, metadata))
        }
        // OCR disabled: empty text is preferable to failing the upload.
        None => Ok((String::new(), metadata)),
    }
}

#[derive(Debug, Serialize)]
struct OcrRequest {
    pdf_base64: String,
    source_path: String,
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    pages: Option<Vec<OcrPage>>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OcrPage {
    #[serde(default)]
    text: Option<String>,
}

fn ocr_pdf(path: &Path, config: &OcrConfig) -> Result<String, IngestError> {
    tokio::task::block_in_place(|| ocr_pdf_blocking(path, config))
}

fn ocr_pdf_blocking(path: &Path, config: &OcrConfig) -> Result<String, IngestError> {
    let pdf = fs::read(path)?;
    let payload = OcrRequest {
        pdf_base64: STANDARD.encode(pdf),
        source_path: path.to_string_lossy().to_string(),
    };

    let mut request = reqwest::blocking::Client::new()
        .post(&config.endpoint)
        .header("content-type", "application/json")
        .json(&payload);
    if let Some(api_key) = &config.api_key {
        request = request.bearer_auth(api_key);
    }

    let response = request.send()?;
    if !response.status().is_success() {
        return Err(IngestError::OcrFailed(format!(
            "ocr endpoint {} returned {}",
            config.endpoint,
            response.status()
        )));
    }

    let parsed: OcrResponse = response.json()?;
    if let Some(pages) = parsed.pages {
        let texts: Vec<String> = pages
            .into_iter()
            .filter_map(|page| page.text)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .collect();
        if !texts.is_empty() {
            return Ok(texts.join("\n\n"));
        }
    }
    if let Some(text) = parsed.text {
        if !text.trim().is_empty() {
            return Ok(text.trim().to_string());
        }
    }

    Err(IngestError::OcrFailed(format!(
        "ocr response had no readable text for {}",
        path.display()
    )))
}

// ---------------------------------------------------------------------------
// Office Open XML containers (docx, pptx, xlsx)

fn open_archive(path: &Path) -> Result<zip::ZipArchive<fs::File>, IngestError> {
    let file = fs::File::open(path)?;
    zip::ZipArchive::new(file).map_err(|error| IngestError::Archive(error.to_string()))
}

fn read_archive_entry(
    archive: &mut zip::ZipArchive<fs::File>,
    name: &str,
) -> Result<String, IngestError> {
    let mut entry = archive
        .by_name(name)
        .map_err(|error| IngestError::Archive(format!("missing {name}: {error}")))?;
    let mut raw = String::new();
    entry.read_to_string(&mut raw)?;
    Ok(raw)
}

fn decode_text_event(text: &quick_xml::events::BytesText<'_>) -> String {
    text.unescape()
        .map(|cow| cow.into_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(text.as_ref()).into_owned())
}

fn xml_error(error: quick_xml::Error) -> IngestError {
    IngestError::Xml(error.to_string())
}

fn regex_error(error: regex::Error) -> IngestError {
    IngestError::Validation(format!("invalid pattern: {error}"))
}

fn extract_docx(path: &Path) -> Result<(String, Metadata), IngestError> {
    let mut archive = open_archive(path)?;
    let xml = read_archive_entry(&mut archive, "word/document.xml")?;

    let mut reader = Reader::from_str(&xml);
    let mut parts: Vec<String> = Vec::new();
    let mut paragraph = String::new();
    let mut cell = String::new();
    let mut row: Vec<String> = Vec::new();
    let mut in_text_run = false;
    let mut table_depth = 0usize;
    let mut paragraph_count = 0usize;
    let mut table_count = 0usize;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(element) => match element.name().as_ref() {
                b"w:t" => in_text_run = true,
                b"w:tbl" => {
                    table_depth += 1;
                    table_count += 1;
                }
                b"w:tr" => row.clear(),
                b"w:tc" => cell.clear(),
                _ => {}
            },
            Event::End(element) => match element.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:tbl" => table_depth = table_depth.saturating_sub(1),
                b"w:tr" => {
                    if row.iter().any(|value| !value.is_empty()) {
                        parts.push(row.join(" | "));
                    }
                    row.clear();
                }
                b"w:tc" => row.push(cell.trim().to_string()),
                b"w:p" => {
                    let text = paragraph.trim();
                    if table_depth > 0 {
                        if !text.is_empty() {
                            if !cell.is_empty() {
                                cell.push(' ');
                            }
                            cell.push_str(text);
                        }
                    } else {
                        if !text.is_empty() {
                            parts.push(text.to_string());
                        }
                        paragraph_count += 1;
                    }
                    paragraph.clear();
                }
                _ => {}
            },
            Event::Text(text) if in_text_run => paragraph.push_str(&decode_text_event(&text)),
            Event::Eof => break,
            _ => {}
        }
    }

    let mut metadata = Metadata::new();
    metadata.insert("format".to_string(), "docx".into());
    metadata.insert("paragraph_count".to_string(), paragraph_count.into());
    metadata.insert("table_count".to_string(), table_count.into());
    Ok((parts.join("\n\n"), metadata))
}

fn extract_pptx(path: &Path) -> Result<(String, Metadata), IngestError> {
    let mut archive = open_archive(path)?;

    let slide_re = Regex::new(r"^ppt/slides/slide(\d+)\.xml$").map_err(regex_error)?;
    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            slide_re
                .captures(name)
                .and_then(|capture| capture[1].parse::<u32>().ok())
                .map(|number| (number, name.to_string()))
        })
        .collect();
    slides.sort_by_key(|(number, _)| *number);

    let mut parts = Vec::new();
    let slide_count = slides.len();

    for (number, entry_name) in slides {
        let xml = read_archive_entry(&mut archive, &entry_name)?;
        let mut reader = Reader::from_str(&xml);
        let mut lines: Vec<String> = Vec::new();
        let mut line = String::new();
        let mut in_text_run = false;

        loop {
            match reader.read_event().map_err(xml_error)? {
                Event::Start(element) => {
                    if element.name().as_ref() == b"a:t" {
                        in_text_run = true;
                    }
                }
                Event::End(element) => match element.name().as_ref() {
                    b"a:t" => in_text_run = false,
                    b"a:p" => {
                        if !line.trim().is_empty() {
                            lines.push(line.trim().to_string());
                        }
                        line.clear();
                    }
                    _ => {}
                },
                Event::Text(text) if in_text_run => line.push_str(&decode_text_event(&text)),
                Event::Eof => break,
                _ => {}
            }
        }
        if !line.trim().is_empty() {
            lines.push(line.trim().to_string());
        }

        if !lines.is_empty() {
            parts.push(format!("Slide {number}:\n{}", lines.join("\n")));
        }
    }

    let mut metadata = Metadata::new();
    metadata.insert("format".to_string(), "pptx".into());
    metadata.insert("slide_count".to_string(), slide_count.into());
    Ok((parts.join("\n\n"), metadata))
}

fn extract_xlsx(path: &Path) -> Result<(String, Metadata), IngestError> {
    let mut archive = open_archive(path)?;

    let sheet_names = xlsx_sheet_names(&mut archive)?;
    let shared_strings = xlsx_shared_strings(&mut archive)?;

    let sheet_re = Regex::new(r"^xl/worksheets/sheet(\d+)\.xml$").map_err(regex_error)?;
    let mut worksheets: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            sheet_re
                .captures(name)
                .and_then(|capture| capture[1].parse::<u32>().ok())
                .map(|number| (number, name.to_string()))
        })
        .collect();
    worksheets.sort_by_key(|(number, _)| *number);

    let mut parts = Vec::new();
    for (position, (_, entry_name)) in worksheets.iter().enumerate() {
        let xml = read_archive_entry(&mut archive, entry_name)?;
        let rows = xlsx_sheet_rows(&xml, &shared_strings)?;
        if rows.is_empty() {
            continue;
        }
        let name = sheet_names
            .get(position)
            .cloned()
            .unwrap_or_else(|| format!("Sheet{}", position + 1));
        parts.push(format!("Sheet: {name}\n{}", rows.join("\n")));
    }

    let mut metadata = Metadata::new();
    metadata.insert("format".to_string(), "xlsx".into());
    metadata.insert("sheet_count".to_string(), sheet_names.len().into());
    metadata.insert("sheet_names".to_string(), encode_value(&json!(sheet_names)));
    Ok((parts.join("\n\n"), metadata))
}

fn xlsx_sheet_names(archive: &mut zip::ZipArchive<fs::File>) -> Result<Vec<String>, IngestError> {
    let xml = read_archive_entry(archive, "xl/workbook.xml")?;
    let mut reader = Reader::from_str(&xml);
    let mut names = Vec::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(element) | Event::Empty(element)
                if element.name().as_ref() == b"sheet" =>
            {
                for attribute in element.attributes().flatten() {
                    if attribute.key.as_ref() == b"name" {
                        names.push(String::from_utf8_lossy(&attribute.value).into_owned());
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(names)
}

fn xlsx_shared_strings(
    archive: &mut zip::ZipArchive<fs::File>,
) -> Result<Vec<String>, IngestError> {
    // Optional part: workbooks with no string cells simply omit it.
    let xml = match read_archive_entry(archive, "xl/sharedStrings.xml") {
        Ok(xml) => xml,
        Err(_) => return Ok(Vec::new()),
    };

    let mut reader = Reader::from_str(&xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(element) => match element.name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            Event::End(element) => match element.name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"t" => in_text = false,
                _ => {}
            },
            Event::Text(text) if in_text => current.push_str(&decode_text_event(&text)),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(strings)
}

fn xlsx_sheet_rows(xml: &str, shared_strings: &[String]) -> Result<Vec<String>, IngestError> {
    let mut reader = Reader::from_str(xml);
    let mut rows = Vec::new();
    let mut cells: Vec<String> = Vec::new();
    let mut cell_type = String::new();
    let mut value = String::new();
    let mut in_value = false;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(element) => match element.name().as_ref() {
                b"row" => cells.clear(),
                b"c" => {
                    cell_type.clear();
                    for attribute in element.attributes().flatten() {
                        if attribute.key.as_ref() == b"t" {
                            cell_type = String::from_utf8_lossy(&attribute.value).into_owned();
                        }
                    }
                }
                b"v" | b"t" => {
                    in_value = true;
                    value.clear();
                }
                _ => {}
            },
            Event::End(element) => match element.name().as_ref() {
                b"row" => {
                    if cells.iter().any(|cell| !cell.is_empty()) {
                        rows.push(cells.join("\t"));
                    }
                    cells.clear();
                }
                b"c" => {
                    let resolved = if cell_type == "s" {
                        value
                            .trim()
                            .parse::<usize>()
                            .ok()
                            .and_then(|index| shared_strings.get(index).cloned())
                            .unwrap_or_default()
                    } else {
                        value.clone()
                    };
                    cells.push(resolved);
                    value.clear();
                }
                b"v" | b"t" => in_value = false,
                _ => {}
            },
            Event::Text(text) if in_value => value.push_str(&decode_text_event(&text)),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// CSV, JSON, HTML, XML

fn extract_csv(path: &Path) -> Result<(String, Metadata), IngestError> {
    let bytes = fs::read(path)?;
    let (content, encoding) = decode_bytes(&bytes);

    let rows = parse_csv_rows(&content);
    let row_count = rows.len();
    let text = rows
        .into_iter()
        .map(|row| row.join("\t"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut metadata = Metadata::new();
    metadata.insert("format".to_string(), "csv".into());
    metadata.insert("encoding".to_string(), encoding.into());
    metadata.insert("row_count".to_string(), row_count.into());
    Ok((text, metadata))
}

/// Minimal quote-aware CSV row parser: doubled quotes escape, newlines
/// inside quoted fields are preserved.
fn parse_csv_rows(content: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(ch);
            }
        } else {
            match ch {
                '"' => in_quotes = true,
                ',' => row.push(std::mem::take(&mut field)),
                '\r' => {}
                '\n' => {
                    row.push(std::mem::take(&mut field));
                    rows.push(std::mem::take(&mut row));
                }
                _ => field.push(ch),
            }
        }
    }

    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}

fn extract_json(path: &Path) -> Result<(String, Metadata), IngestError> {
    let raw = fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|error| IngestError::Validation(format!("invalid json: {error}")))?;

    let keys: Vec<String> = value
        .as_object()
        .map(|object| object.keys().cloned().collect())
        .unwrap_or_default();
    let value_type = match &value {
        serde_json::Value::Object(_) => "object",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Null => "null",
    };

    let content = serde_json::to_string_pretty(&value)?;

    let mut metadata = Metadata::new();
    metadata.insert("format".to_string(), "json".into());
    metadata.insert("keys".to_string(), encode_value(&json!(keys)));
    metadata.insert("value_type".to_string(), value_type.into());
    Ok((content, metadata))
}

fn extract_html(path: &Path) -> Result<(String, Metadata), IngestError> {
    let bytes = fs::read(path)?;
    let (raw, _encoding) = decode_bytes(&bytes);

    let script_re =
        Regex::new(r"(?is)<script\b[^>]*>.*?</script>|<style\b[^>]*>.*?</style>")
            .map_err(regex_error)?;
    let without_code = script_re.replace_all(&raw, " ");

    let title_re = Regex::new(r"(?is)<title[^>]*>(.*?)</title>").map_err(regex_error)?;
    let title = title_re
        .captures(&without_code)
        .map(|capture| strip_tags(&capture[1]).trim().to_string())
        .unwrap_or_default();

    let header_re = Regex::new(r"(?is)<h[1-6][^>]*>(.*?)</h[1-6]>").map_err(regex_error)?;
    let headers: Vec<String> = header_re
        .captures_iter(&without_code)
        .map(|capture| strip_tags(&capture[1]).trim().to_string())
        .filter(|header| !header.is_empty())
        .collect();

    let text = strip_tags(&without_code);
    let text = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let mut metadata = Metadata::new();
    metadata.insert("format".to_string(), "html".into());
    metadata.insert("title".to_string(), title.into());
    metadata.insert("headers".to_string(), encode_value(&json!(headers)));
    Ok((text, metadata))
}

fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                text.push('\n');
            }
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    decode_entities(&text)
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn extract_xml(path: &Path) -> Result<(String, Metadata), IngestError> {
    let raw = fs::read_to_string(path)?;
    let mut reader = Reader::from_str(&raw);
    let mut parts: Vec<String> = Vec::new();
    let mut root_tag = String::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(element) => {
                if root_tag.is_empty() {
                    root_tag = String::from_utf8_lossy(element.name().as_ref()).into_owned();
                }
            }
            Event::Text(text) => {
                let value = decode_text_event(&text);
                let trimmed = value.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed.to_string());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let mut metadata = Metadata::new();
    metadata.insert("format".to_string(), "xml".into());
    metadata.insert("root_tag".to_string(), root_tag.into());
    Ok((parts.join("\n"), metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn options() -> ExtractorOptions {
        ExtractorOptions {
            max_file_size: 1024 * 1024,
            ocr: None,
        }
    }

    fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::File::create(&path)
            .and_then(|mut file| file.write_all(bytes))
            .expect("write fixture");
        path
    }

    #[test]
    fn unsupported_extension_fails_validation() {
        let dir = tempdir().expect("tempdir");
        let path = write_file(dir.path(), "notes.epub", b"irrelevant");
        let result = extract(&path, &options());
        assert!(matches!(result, Err(IngestError::Validation(_))));
    }

    #[test]
    fn oversized_file_fails_before_parsing() {
        let dir = tempdir().expect("tempdir");
        let path = write_file(dir.path(), "big.txt", &vec![b'a'; 64]);
        let opts = ExtractorOptions {
            max_file_size: 10,
            ocr: None,
        };
        let result = extract(&path, &opts);
        assert!(matches!(result, Err(IngestError::Validation(_))));
    }

    #[test]
    fn text_extraction_detects_utf8() {
        let dir = tempdir().expect("tempdir");
        let path = write_file(dir.path(), "notes.txt", "line one\nline two".as_bytes());
        let (text, metadata) = extract(&path, &options()).expect("extract");
        assert_eq!(text, "line one\nline two");
        assert_eq!(
            metadata.get("encoding").and_then(|v| v.as_str()),
            Some("UTF-8")
        );
        assert_eq!(metadata.get("line_count").and_then(|v| v.as_int()), Some(2));
    }

    #[test]
    fn text_extraction_falls_back_to_gb18030() {
        let dir = tempdir().expect("tempdir");
        let (encoded, _, _) = encoding_rs::GB18030.encode("课程介绍");
        let path = write_file(dir.path(), "intro.txt", &encoded);
        let (text, metadata) = extract(&path, &options()).expect("extract");
        assert_eq!(text, "课程介绍");
        assert_eq!(
            metadata.get("encoding").and_then(|v| v.as_str()),
            Some("GB18030")
        );
    }

    #[test]
    fn markdown_headers_are_collected() {
        let dir = tempdir().expect("tempdir");
        let source = "# Calculus\n\nIntro text.\n\n## Limits\n\n```\ncode here\n```\n";
        let path = write_file(dir.path(), "calc.md", source.as_bytes());
        let (text, metadata) = extract(&path, &options()).expect("extract");

        let headers = metadata
            .get("headers")
            .and_then(|v| v.as_json())
            .expect("headers json");
        assert_eq!(headers, serde_json::json!(["Calculus", "Limits"]));
        assert_eq!(
            metadata.get("has_code_blocks").and_then(|v| v.as_bool()),
            Some(true)
        );
        assert!(text.contains("Intro text."));
        assert!(!text.contains("```"));
    }

    #[test]
    fn legacy_doc_degrades_softly() {
        let dir = tempdir().expect("tempdir");
        let path = write_file(dir.path(), "old.doc", b"\xd0\xcf\x11\xe0binary");
        let (text, metadata) = extract(&path, &options()).expect("extract");
        assert!(!text.is_empty());
        assert_eq!(
            metadata.get("error").and_then(|v| v.as_str()),
            Some("unsupported")
        );
        assert_eq!(metadata.get("format").and_then(|v| v.as_str()), Some("doc"));
    }

    #[test]
    fn csv_rows_are_tab_joined() {
        let dir = tempdir().expect("tempdir");
        let source = "name,score\n\"Doe, Jane\",92\nBob,85\n";
        let path = write_file(dir.path(), "grades.csv", source.as_bytes());
        let (text, metadata) = extract(&path, &options()).expect("extract");
        assert_eq!(text, "name\tscore\nDoe, Jane\t92\nBob\t85");
        assert_eq!(metadata.get("row_count").and_then(|v| v.as_int()), Some(3));
    }

    #[test]
    fn json_keys_are_reported() {
        let dir = tempdir().expect("tempdir");
        let path = write_file(dir.path(), "data.json", br#"{"title": "T", "units": [1, 2]}"#);
        let (text, metadata) = extract(&path, &options()).expect("extract");
        assert!(text.contains("\"title\""));
        let keys = metadata
            .get("keys")
            .and_then(|v| v.as_json())
            .expect("keys json");
        assert_eq!(keys, serde_json::json!(["title", "units"]));
    }

    #[test]
    fn html_text_is_stripped_of_tags_and_scripts() {
        let dir = tempdir().expect("tempdir");
        let source = concat!(
            "<html><head><title>Syllabus</title>",
            "<script>var x = 1;</script></head>",
            "<body><h1>Week 1</h1><p>Reading &amp; problems</p></body></html>"
        );
        let path = write_file(dir.path(), "page.html", source.as_bytes());
        let (text, metadata) = extract(&path, &options()).expect("extract");

        assert!(text.contains("Reading & problems"));
        assert!(!text.contains("var x"));
        assert_eq!(
            metadata.get("title").and_then(|v| v.as_str()),
            Some("Syllabus")
        );
        let headers = metadata
            .get("headers")
            .and_then(|v| v.as_json())
            .expect("headers json");
        assert_eq!(headers, serde_json::json!(["Week 1"]));
    }

    #[test]
    fn xml_text_nodes_are_concatenated() {
        let dir = tempdir().expect("tempdir");
        let source = "<course><title>Physics</title><unit>Mechanics</unit></course>";
        let path = write_file(dir.path(), "course.xml", source.as_bytes());
        let (text, metadata) = extract(&path, &options()).expect("extract");
        assert_eq!(text, "Physics\nMechanics");
        assert_eq!(
            metadata.get("root_tag").and_then(|v| v.as_str()),
            Some("course")
        );
    }

    #[test]
    fn docx_paragraphs_and_tables_are_extracted() {
        let dir = tempdir().expect("tempdir");
        let document_xml = concat!(
            r#"<?xml version="1.0"?>"#,
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
            "<w:body>",
            "<w:p><w:r><w:t>First paragraph.</w:t></w:r></w:p>",
            "<w:tbl><w:tr>",
            "<w:tc><w:p><w:r><w:t>A1</w:t></w:r></w:p></w:tc>",
            "<w:tc><w:p><w:r><w:t>B1</w:t></w:r></w:p></w:tc>",
            "</w:tr></w:tbl>",
            "</w:body></w:document>"
        );
        let path = dir.path().join("notes.docx");
        let file = fs::File::create(&path).expect("create");
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file(
                "word/document.xml",
                zip::write::SimpleFileOptions::default(),
            )
            .expect("zip entry");
        writer.write_all(document_xml.as_bytes()).expect("write");
        writer.finish().expect("finish zip");

        let (text, metadata) = extract(&path, &options()).expect("extract");
        assert!(text.contains("First paragraph."));
        assert!(text.contains("A1 | B1"));
        assert_eq!(
            metadata.get("paragraph_count").and_then(|v| v.as_int()),
            Some(1)
        );
        assert_eq!(
            metadata.get("table_count").and_then(|v| v.as_int()),
            Some(1)
        );
    }

    #[test]
    fn csv_parser_handles_quoted_newlines() {
        let rows = parse_csv_rows("a,\"multi\nline\",c\n");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], vec!["a", "multi\nline", "c"]);
    }
}
