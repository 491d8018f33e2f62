//! Minimal PDF 1.4 writer: text-only pages in Helvetica.

use std::fmt::Write as _;

const PAGE_WIDTH: u32 = 595;
const PAGE_HEIGHT: u32 = 842;
const MARGIN: u32 = 56;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TextLine {
    pub text: String,
    pub size: u32,
}

impl TextLine {
    pub fn heading(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            size: 18,
        }
    }

    pub fn body(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            size: 11,
        }
    }

    fn leading(&self) -> u32 {
        self.size + self.size / 2
    }
}

#[derive(Debug, Default)]
pub(crate) struct PdfDocument {
    pages: Vec<Vec<TextLine>>,
}

/// WinAnsiEncoding code for `c`, if the font can show it.
fn win_ansi(c: char) -> Option<u8> {
    let code = match c {
        ' '..='~' | '\u{a0}'..='\u{ff}' => return u8::try_from(u32::from(c)).ok(),
        '€' => 0x80,
        '‚' => 0x82,
        '„' => 0x84,
        '…' => 0x85,
        '‘' => 0x91,
        '’' => 0x92,
        '“' => 0x93,
        '”' => 0x94,
        '•' => 0x95,
        '–' => 0x96,
        '—' => 0x97,
        'Š' => 0x8a,
        'Œ' => 0x8c,
        'Ž' => 0x8e,
        'š' => 0x9a,
        'œ' => 0x9c,
        'ž' => 0x9e,
        'Ÿ' => 0x9f,
        _ => return None,
    };
    Some(code)
}

/// Literal-string escaping. Bytes above ASCII are written as octal escapes of
/// their WinAnsi code; characters outside WinAnsi become `?`.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match win_ansi(c) {
            Some(b'\\' | b'(' | b')') => {
                out.push('\\');
                out.push(c);
            }
            Some(code @ 0x20..=0x7e) => out.push(char::from(code)),
            Some(code) => {
                let _ = write!(out, "\\{code:03o}");
            }
            None => out.push('?'),
        }
    }
    out
}

/// Split lines into pages so that no line is placed below the bottom margin.
fn paginate(lines: Vec<TextLine>) -> Vec<Vec<TextLine>> {
    let mut pages = Vec::new();
    let mut page = Vec::new();
    let mut y = PAGE_HEIGHT - MARGIN;
    for line in lines {
        let leading = line.leading();
        if y < MARGIN + leading && !page.is_empty() {
            pages.push(std::mem::take(&mut page));
            y = PAGE_HEIGHT - MARGIN;
        }
        y = y.saturating_sub(leading);
        page.push(line);
    }
    if !page.is_empty() || pages.is_empty() {
        pages.push(page);
    }
    pages
}

fn content_stream(lines: &[TextLine]) -> String {
    let mut s = String::from("BT\n");
    let mut y = PAGE_HEIGHT - MARGIN;
    for line in lines {
        y = y.saturating_sub(line.leading());
        let _ = writeln!(
            s,
            "/F1 {} Tf 1 0 0 1 {MARGIN} {y} Tm ({}) Tj",
            line.size,
            escape(&line.text)
        );
    }
    s.push_str("ET\n");
    s
}

impl PdfDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new page; lines that do not fit continue on the pages after it.
    pub fn add_page(&mut self, lines: Vec<TextLine>) {
        self.pages.extend(paginate(lines));
    }

    /// Serialize with a correct cross-reference table.
    pub fn to_bytes(&self) -> Vec<u8> {
        // 1: catalog, 2: page tree, 3: font, then (page, contents) pairs.
        let page_obj = |i: usize| 4 + 2 * i;
        let mut objects: Vec<String> = Vec::with_capacity(3 + 2 * self.pages.len());

        objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
        let kids = (0..self.pages.len())
            .map(|i| format!("{} 0 R", page_obj(i)))
            .collect::<Vec<_>>()
            .join(" ");
        objects.push(format!(
            "<< /Type /Pages /Kids [{kids}] /Count {} >>",
            self.pages.len()
        ));
        objects.push(
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
                .to_string(),
        );
        for (i, lines) in self.pages.iter().enumerate() {
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
                 /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
                page_obj(i) + 1
            ));
            let stream = content_stream(lines);
            objects.push(format!(
                "<< /Length {} >>\nstream\n{stream}endstream",
                stream.len()
            ));
        }

        let mut out = String::from("%PDF-1.4\n");
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            let _ = write!(out, "{} 0 obj\n{body}\nendobj\n", i + 1);
        }

        let xref_at = out.len();
        let _ = write!(out, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        for offset in offsets {
            let _ = write!(out, "{offset:010} 00000 n \n");
        }
        let _ = write!(
            out,
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
            objects.len() + 1
        );
        out.into_bytes()
    }
}
