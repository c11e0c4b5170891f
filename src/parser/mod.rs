use crate::error::{Cause, ConversionError, ConvertResult};
use crate::types::{Row, Table, RECORD_TAG};
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;
use std::path::Path;
use tracing::debug;

/// Parse an XML file of `<transaction>` records into a [`Table`].
///
/// The whole file is read into memory first. Every immediate child of the root
/// named `transaction` becomes one row; each of its child elements becomes a
/// field whose value is the element's own text (text inside nested elements is
/// not collected). Other children of the root are skipped.
///
/// # Errors
/// Returns a [`ConversionError`] carrying `path` when the file cannot be read
/// or is not well-formed XML.
///
/// # Example
/// ```no_run
/// use xml2xlsx::parser::parse_file;
/// use std::path::Path;
///
/// let table = parse_file(Path::new("ledger.xml"))?;
/// println!("{} transactions, columns: {:?}", table.row_count(), table.columns());
/// # Ok::<(), xml2xlsx::error::ConversionError>(())
/// ```
pub fn parse_file(path: &Path) -> ConvertResult<Table> {
    let bytes = std::fs::read(path).map_err(|e| ConversionError::new(path, Cause::Read(e)))?;
    let table = parse_bytes(&bytes).map_err(|cause| ConversionError::new(path, cause))?;

    debug!(
        path = %path.display(),
        rows = table.row_count(),
        columns = table.column_count(),
        "parsed XML document"
    );
    Ok(table)
}

/// Parse raw document bytes in any encoding the document announces.
///
/// A byte-order mark decides first, then a UTF-16 `<?` prefix, then the
/// `encoding` of the XML declaration. Without any of these the input is UTF-8.
pub fn parse_bytes(bytes: &[u8]) -> Result<Table, Cause> {
    let xml = decode_document(bytes)?;
    parse_str(&xml)
}

fn decode_document(bytes: &[u8]) -> Result<Cow<'_, str>, Cause> {
    let (encoding, body) = match Encoding::for_bom(bytes) {
        Some((encoding, bom_len)) => (encoding, &bytes[bom_len..]),
        None if bytes.starts_with(b"<\0?\0") => (UTF_16LE, bytes),
        None if bytes.starts_with(b"\0<\0?") => (UTF_16BE, bytes),
        None => (declared_encoding(bytes)?, bytes),
    };

    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .ok_or_else(|| Cause::Xml(format!("document is not valid {}", encoding.name())))
}

/// Encoding named by the XML declaration of an ASCII-compatible document.
fn declared_encoding(bytes: &[u8]) -> Result<&'static Encoding, Cause> {
    let mut reader = Reader::from_reader(bytes);
    let label = match reader.read_event() {
        Ok(Event::Decl(decl)) => match decl.encoding() {
            Some(label) => label
                .map_err(|e| Cause::Xml(format!("malformed XML declaration: {}", e)))?
                .into_owned(),
            None => return Ok(UTF_8),
        },
        // Syntax errors surface again when the decoded text is parsed
        _ => return Ok(UTF_8),
    };

    // A UTF-16 label on bytes we could read as ASCII means the label is wrong
    Encoding::for_label(&label)
        .map(Encoding::output_encoding)
        .ok_or_else(|| {
            Cause::Xml(format!(
                "unsupported encoding \"{}\"",
                String::from_utf8_lossy(&label)
            ))
        })
}

/// Line breaks are normalized to `\n` before parsing, as XML requires.
fn normalize_newlines(xml: &str) -> Cow<'_, str> {
    if xml.contains('\r') {
        Cow::Owned(xml.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(xml)
    }
}

/// Parse an in-memory XML document.
pub fn parse_str(xml: &str) -> Result<Table, Cause> {
    let xml = normalize_newlines(xml);
    let mut reader = Reader::from_str(&xml);
    reader.config_mut().trim_text(false);

    let mut collector = RecordCollector::default();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| Cause::Xml(format!("{} at position {}", e, reader.buffer_position())))?;

        match event {
            Event::Start(e) => {
                check_attributes(&e)?;
                collector.open(e.name().as_ref())?;
            }
            Event::Empty(e) => {
                check_attributes(&e)?;
                collector.open(e.name().as_ref())?;
                collector.close(e.name().as_ref())?;
            }
            Event::End(e) => collector.close(e.name().as_ref())?,
            Event::Text(e) => {
                let text = e.unescape().map_err(|e| Cause::Xml(e.to_string()))?;
                collector.text(&text)?;
            }
            Event::CData(e) => {
                let raw = e.into_inner();
                let text = std::str::from_utf8(&raw)
                    .map_err(|e| Cause::Xml(format!("CDATA is not valid UTF-8: {}", e)))?;
                collector.text(text)?;
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions and DOCTYPE carry no data
            _ => {}
        }
    }

    collector.finish()
}

/// Attributes are not mapped, but a malformed one still makes the document invalid.
fn check_attributes(start: &BytesStart<'_>) -> Result<(), Cause> {
    for attr in start.attributes() {
        attr.map_err(|e| Cause::Xml(format!("malformed attribute: {}", e)))?;
    }
    Ok(())
}

fn element_name(raw: &[u8]) -> Result<String, Cause> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| Cause::Xml(format!("element name is not valid UTF-8: {}", e)))
}

/// A field element of the transaction currently being read.
struct OpenField {
    name: String,
    text: String,
    /// Set once a child element starts; later text belongs to that child's tail.
    nested: bool,
}

impl OpenField {
    /// An element without text has no value; whitespace is kept as written.
    fn into_entry(self) -> (String, Option<String>) {
        let value = if self.text.is_empty() {
            None
        } else {
            Some(self.text)
        };
        (self.name, value)
    }
}

/// Streaming state: depth 1 is the root, depth 2 a record, depth 3 a field.
#[derive(Default)]
struct RecordCollector {
    open: Vec<String>,
    root_seen: bool,
    root_closed: bool,
    record: Option<Row>,
    field: Option<OpenField>,
    table: Table,
}

impl RecordCollector {
    fn open(&mut self, raw: &[u8]) -> Result<(), Cause> {
        let name = element_name(raw)?;
        if self.root_closed {
            return Err(Cause::Xml(format!(
                "element <{}> found after the document root was closed",
                name
            )));
        }

        match self.open.len() {
            0 => self.root_seen = true,
            1 if name == RECORD_TAG => self.record = Some(Row::new()),
            2 if self.record.is_some() => {
                self.field = Some(OpenField {
                    name: name.clone(),
                    text: String::new(),
                    nested: false,
                });
            }
            _ => {
                if let Some(field) = self.field.as_mut() {
                    field.nested = true;
                }
            }
        }

        self.open.push(name);
        Ok(())
    }

    fn close(&mut self, raw: &[u8]) -> Result<(), Cause> {
        let name = element_name(raw)?;
        match self.open.pop() {
            Some(open) if open == name => {}
            Some(open) => {
                return Err(Cause::Xml(format!(
                    "expected </{}>, found </{}>",
                    open, name
                )))
            }
            None => return Err(Cause::Xml(format!("unmatched end tag </{}>", name))),
        }

        match self.open.len() {
            2 => {
                if let (Some(record), Some(field)) = (self.record.as_mut(), self.field.take()) {
                    let (name, value) = field.into_entry();
                    record.set(name, value);
                }
            }
            1 => {
                if let Some(record) = self.record.take() {
                    self.table.push_row(record);
                }
            }
            0 => self.root_closed = true,
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<(), Cause> {
        if self.open.is_empty() {
            if text.trim().is_empty() {
                return Ok(());
            }
            return Err(Cause::Xml(
                "text content found outside the document root".to_string(),
            ));
        }

        if self.open.len() == 3 {
            if let Some(field) = self.field.as_mut().filter(|f| !f.nested) {
                field.text.push_str(text);
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<Table, Cause> {
        if let Some(unclosed) = self.open.last() {
            return Err(Cause::Xml(format!(
                "unexpected end of document: <{}> is not closed",
                unclosed
            )));
        }
        if !self.root_seen {
            return Err(Cause::Xml("document has no root element".to_string()));
        }
        Ok(self.table)
    }
}
