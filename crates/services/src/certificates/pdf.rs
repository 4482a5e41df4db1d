//! Single-page PDF 1.4 writer with the standard Helvetica faces.
//!
//! Text is encoded as `WinAnsiEncoding`; characters outside it become `?`.

/// Landscape A4 in points.
pub const A4_LANDSCAPE: (f32, f32) = (842.0, 595.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
    Oblique,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
            Font::Oblique => "F3",
        }
    }
}

/// Approximate advance width of one character, in thousandths of an em.
fn glyph_width(font: Font, c: char) -> u32 {
    let base = match c {
        'i' | 'j' | 'l' | '\'' | '|' => 222,
        ' ' | '.' | ',' | ':' | ';' | '!' | 'f' | 't' | 'I' | '/' | '(' | ')' | '[' | ']' => 278,
        'r' | '-' => 333,
        'm' | 'M' => 833,
        'w' => 722,
        'W' => 944,
        '0'..='9' | 'a'..='z' | '#' | '$' | '?' | '_' => 556,
        'A'..='Z' | '&' => 667,
        _ => 556,
    };
    if font == Font::Bold { base + base / 12 } else { base }
}

/// Rendered width of `text` at `size` points.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn text_width(font: Font, size: f32, text: &str) -> f32 {
    let units: u32 = text.chars().map(|c| glyph_width(font, c)).sum();
    units as f32 * size / 1000.0
}

fn win_ansi(c: char) -> u8 {
    match c {
        ' '..='~' => c as u8,
        '\u{a0}'..='\u{ff}' => u8::try_from(u32::from(c)).unwrap_or(b'?'),
        '€' => 0x80,
        '…' => 0x85,
        '‘' => 0x91,
        '’' => 0x92,
        '“' => 0x93,
        '”' => 0x94,
        '•' => 0x95,
        '–' => 0x96,
        '—' => 0x97,
        '\t' | '\n' | '\r' => b' ',
        _ => b'?',
    }
}

fn parse_hex(hex: &str) -> (f32, f32, f32) {
    let digits = hex.trim_start_matches('#');
    let channel = |range: std::ops::Range<usize>| {
        digits
            .get(range)
            .and_then(|h| u8::from_str_radix(h, 16).ok())
            .map_or(0.0, |v| f32::from(v) / 255.0)
    };
    if digits.len() == 6 {
        (channel(0..2), channel(2..4), channel(4..6))
    } else {
        (0.0, 0.0, 0.0)
    }
}

/// Encode `text` as a PDF literal string, parentheses included.
fn literal(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 2);
    out.push(b'(');
    for c in text.chars() {
        let byte = win_ansi(c);
        if matches!(byte, b'(' | b')' | b'\\') {
            out.push(b'\\');
        }
        out.push(byte);
    }
    out.push(b')');
    out
}

/// One page of drawing operations.
#[derive(Debug, Clone)]
pub struct PdfPage {
    width: f32,
    height: f32,
    content: Vec<u8>,
}

impl PdfPage {
    #[must_use]
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            content: Vec::new(),
        }
    }

    #[must_use]
    pub fn landscape_a4() -> Self {
        Self::new(A4_LANDSCAPE.0, A4_LANDSCAPE.1)
    }

    #[must_use]
    pub fn width(&self) -> f32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        self.height
    }

    fn op(&mut self, op: &str) {
        self.content.extend_from_slice(op.as_bytes());
        self.content.push(b'\n');
    }

    /// Fill color from a `#rrggbb` value; malformed input selects black.
    pub fn fill_color(&mut self, hex: &str) {
        let (r, g, b) = parse_hex(hex);
        self.op(&format!("{r:.3} {g:.3} {b:.3} rg"));
    }

    /// Stroke color from a `#rrggbb` value; malformed input selects black.
    pub fn stroke_color(&mut self, hex: &str) {
        let (r, g, b) = parse_hex(hex);
        self.op(&format!("{r:.3} {g:.3} {b:.3} RG"));
    }

    pub fn text(&mut self, font: Font, size: f32, x: f32, y: f32, text: &str) {
        self.op("BT");
        self.op(&format!("/{} {size:.1} Tf", font.resource()));
        self.op(&format!("{x:.2} {y:.2} Td"));
        self.content.extend_from_slice(&literal(text));
        self.op(" Tj");
        self.op("ET");
    }

    /// Draw `text` horizontally centered on the page.
    pub fn centered_text(&mut self, font: Font, size: f32, y: f32, text: &str) {
        self.text_centered_at(font, size, self.width / 2.0, y, text);
    }

    /// Draw `text` centered on the vertical line `cx`.
    pub fn text_centered_at(&mut self, font: Font, size: f32, cx: f32, y: f32, text: &str) {
        let x = cx - text_width(font, size, text) / 2.0;
        self.text(font, size, x.max(0.0), y, text);
    }

    pub fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, thickness: f32) {
        self.op(&format!(
            "{thickness:.2} w {x1:.2} {y1:.2} m {x2:.2} {y2:.2} l S"
        ));
    }

    pub fn rect(&mut self, x: f32, y: f32, w: f32, h: f32, thickness: f32) {
        self.op(&format!("{thickness:.2} w {x:.2} {y:.2} {w:.2} {h:.2} re S"));
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.op(&format!("{x:.2} {y:.2} {w:.2} {h:.2} re f"));
    }

    /// Serialize the page as a complete document.
    #[must_use]
    pub fn finish(self, title: &str) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::with_capacity(self.content.len() + 1024);
        let mut offsets: Vec<usize> = Vec::with_capacity(8);

        out.extend_from_slice(b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n");

        let mut object = |out: &mut Vec<u8>, body: &[u8]| {
            offsets.push(out.len());
            let number = offsets.len();
            out.extend_from_slice(format!("{number} 0 obj\n").as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\nendobj\n");
        };

        object(&mut out, b"<< /Type /Catalog /Pages 2 0 R >>");
        object(&mut out, b"<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
        object(
            &mut out,
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.0} {:.0}] \
                 /Resources << /Font << /F1 4 0 R /F2 5 0 R /F3 6 0 R >> >> /Contents 7 0 R >>",
                self.width, self.height
            )
            .as_bytes(),
        );
        for face in ["Helvetica", "Helvetica-Bold", "Helvetica-Oblique"] {
            object(
                &mut out,
                format!(
                    "<< /Type /Font /Subtype /Type1 /BaseFont /{face} /Encoding /WinAnsiEncoding >>"
                )
                .as_bytes(),
            );
        }

        let mut stream = format!("<< /Length {} >>\nstream\n", self.content.len()).into_bytes();
        stream.extend_from_slice(&self.content);
        stream.extend_from_slice(b"endstream");
        object(&mut out, &stream);

        let mut info = b"<< /Title ".to_vec();
        info.extend_from_slice(&literal(title));
        info.extend_from_slice(b" /Producer (course-services) >>");
        object(&mut out, &info);

        let xref_at = out.len();
        let count = offsets.len() + 1;
        out.extend_from_slice(format!("xref\n0 {count}\n0000000000 65535 f \n").as_bytes());
        for offset in &offsets {
            out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {count} /Root 1 0 R /Info {} 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
                count - 1
            )
            .as_bytes(),
        );
        out
    }
}
