//! Minimal FITS codec for single 2D images.
//!
//! Reads the first HDU that carries image data and writes a single primary
//! HDU. Only what patch extraction needs is implemented: 80-byte header
//! cards in 2880-byte blocks, and big-endian samples of every standard
//! `BITPIX`.
//!
//! Samples are kept exactly as stored. `BSCALE`/`BZERO` are ordinary header
//! cards here, so copying a header together with a slice of its samples
//! reproduces the physical values bit for bit.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

const BLOCK_LEN: usize = 2880;
const CARD_LEN: usize = 80;
const CARDS_PER_BLOCK: usize = BLOCK_LEN / CARD_LEN;
/// Longest escaped string that fits between quotes after `KEYWORD = `.
const MAX_INLINE_STRING: usize = CARD_LEN - 10 - 2;
/// Escaped characters per card of a continued string (room for quotes and `&`).
const LONG_STRING_CHUNK: usize = CARD_LEN - 10 - 3;

/// Keywords regenerated from the data on write and never copied from a source header.
const STRUCTURAL_KEYWORDS: &[&str] = &[
    "SIMPLE", "XTENSION", "BITPIX", "NAXIS", "EXTEND", "PCOUNT", "GCOUNT", "END",
];

/// Integrity keywords that are stale as soon as a header is modified.
const STALE_KEYWORDS: &[&str] = &["CHECKSUM", "DATASUM"];

/// Errors raised while reading or writing FITS files.
#[derive(Debug, Error)]
pub enum FitsError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid FITS format: {0}")]
    InvalidFormat(String),
    #[error("unsupported BITPIX: {0}")]
    UnsupportedBitpix(i64),
    #[error("missing required keyword: {0}")]
    MissingKeyword(String),
}

// ── Header model ────────────────────────────────────────────────────────────

/// A typed header value.
#[derive(Debug, Clone, PartialEq)]
pub enum FitsValue {
    Logical(bool),
    Integer(i64),
    Float(f64),
    Str(String),
}

impl FitsValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FitsValue::Float(f) => Some(*f),
            FitsValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FitsValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FitsValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Render the value field as it appears after `"= "`.
    fn render(&self) -> Option<String> {
        let s = match self {
            FitsValue::Logical(b) => format!("{:>20}", if *b { "T" } else { "F" }),
            FitsValue::Integer(i) => format!("{:>20}", i),
            FitsValue::Float(f) => {
                if !f.is_finite() {
                    return None;
                }
                // Shortest representation that parses back to the same f64
                format!("{:>20}", format!("{:E}", f))
            }
            FitsValue::Str(s) => {
                let escaped = s.replace('\'', "''");
                format!("'{:<8}'", escaped)
            }
        };
        Some(s)
    }
}

/// One 80-character header record.
///
/// Commentary records (`HISTORY`, `COMMENT`, blank keywords) and records this
/// codec does not interpret (`HIERARCH`, `CONTINUE`) have no `value`; their
/// text after column 8 is kept in `comment` and written back verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub keyword: String,
    pub value: Option<FitsValue>,
    pub comment: Option<String>,
}

impl Card {
    pub fn new(keyword: &str, value: FitsValue) -> Self {
        Self {
            keyword: keyword.to_uppercase(),
            value: Some(value),
            comment: None,
        }
    }

    pub fn commentary(keyword: &str, text: &str) -> Self {
        Self {
            keyword: keyword.to_uppercase(),
            value: None,
            comment: Some(text.to_string()),
        }
    }

    fn parse(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw).into_owned();
        let keyword = text.get(..8).unwrap_or(&text).trim_end().to_string();
        let rest = text.get(8..).unwrap_or("");

        if rest.starts_with("= ") && keyword != "HIERARCH" && keyword != "CONTINUE" {
            if let Some((value, comment)) = parse_value_field(&rest[2..]) {
                return Self {
                    keyword,
                    value: Some(value),
                    comment,
                };
            }
        }

        Self {
            keyword,
            value: None,
            comment: Some(rest.trim_end().to_string()),
        }
    }

    /// Encode as one or more 80-byte records.
    ///
    /// String values too long for a single card are split with the `CONTINUE`
    /// long-string convention: every chunk but the last ends in `&`.
    fn to_records(&self) -> Vec<[u8; CARD_LEN]> {
        if let Some(FitsValue::Str(s)) = &self.value {
            if s.replace('\'', "''").len() > MAX_INLINE_STRING {
                return self.long_string_records(s);
            }
        }
        vec![self.to_bytes()]
    }

    fn long_string_records(&self, value: &str) -> Vec<[u8; CARD_LEN]> {
        // Split on characters so an escaped quote pair never straddles two cards
        let mut chunks = Vec::new();
        let mut current = String::new();
        for ch in value.chars() {
            let piece = if ch == '\'' { "''".to_string() } else { ch.to_string() };
            if current.len() + piece.len() > LONG_STRING_CHUNK {
                chunks.push(std::mem::take(&mut current));
            }
            current.push_str(&piece);
        }
        chunks.push(current);

        let last = chunks.len() - 1;
        chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                let mut line = if i == 0 {
                    format!("{:<8}= '{}", self.keyword, chunk)
                } else {
                    format!("CONTINUE  '{}", chunk)
                };
                if i < last {
                    line.push_str("&'");
                } else {
                    line.push('\'');
                    if let Some(comment) = &self.comment {
                        line.push_str(" / ");
                        line.push_str(comment);
                    }
                }
                pack_record(&line)
            })
            .collect()
    }

    /// Fold a `CONTINUE` card into this card's `&`-terminated string value.
    ///
    /// Returns false, leaving both untouched, if this card is not a continued string.
    fn absorb_continue(&mut self, next: &Card) -> bool {
        let Some(FitsValue::Str(value)) = &mut self.value else {
            return false;
        };
        if !value.ends_with('&') {
            return false;
        }
        let Some((FitsValue::Str(more), comment)) =
            next.comment.as_deref().and_then(parse_value_field)
        else {
            return false;
        };
        value.pop();
        value.push_str(&more);
        if comment.is_some() {
            self.comment = comment;
        }
        true
    }

    fn to_bytes(&self) -> [u8; CARD_LEN] {
        let mut line = format!("{:<8}", self.keyword);
        match self.value.as_ref().and_then(FitsValue::render) {
            Some(value) => {
                line.push_str("= ");
                line.push_str(&value);
                if let Some(comment) = &self.comment {
                    line.push_str(" / ");
                    line.push_str(comment);
                }
            }
            None => {
                if let Some(text) = &self.comment {
                    line.push_str(text);
                }
            }
        }
        pack_record(&line)
    }
}

/// Lay `line` into a blank-padded 80-byte record, truncating past column 80.
fn pack_record(line: &str) -> [u8; CARD_LEN] {
    let mut record = [b' '; CARD_LEN];
    // Non-ASCII text is not legal in a header; replace it rather than split a code point
    for (slot, ch) in record.iter_mut().zip(line.chars()) {
        *slot = if ch.is_ascii() && !ch.is_ascii_control() {
            ch as u8
        } else {
            b'?'
        };
    }
    record
}

/// Split a value field into its value and optional trailing comment.
fn parse_value_field(field: &str) -> Option<(FitsValue, Option<String>)> {
    let trimmed = field.trim_start();

    if let Some(body) = trimmed.strip_prefix('\'') {
        // Quoted string; '' is an escaped quote
        let mut value = String::new();
        let mut chars = body.char_indices().peekable();
        let mut end = None;
        while let Some((i, c)) = chars.next() {
            if c == '\'' {
                if matches!(chars.peek(), Some((_, '\''))) {
                    value.push('\'');
                    chars.next();
                } else {
                    end = Some(i + 1);
                    break;
                }
            } else {
                value.push(c);
            }
        }
        let end = end?;
        let comment = body[end..]
            .trim()
            .strip_prefix('/')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        return Some((FitsValue::Str(value.trim_end().to_string()), comment));
    }

    let (value_str, comment) = match trimmed.find('/') {
        Some(slash) => (
            trimmed[..slash].trim(),
            Some(trimmed[slash + 1..].trim().to_string()).filter(|c| !c.is_empty()),
        ),
        None => (trimmed.trim(), None),
    };

    let value = match value_str {
        "" => return None,
        "T" => FitsValue::Logical(true),
        "F" => FitsValue::Logical(false),
        s => {
            if let Ok(i) = s.parse::<i64>() {
                FitsValue::Integer(i)
            } else if let Ok(f) = s.replace(['D', 'd'], "E").parse::<f64>() {
                FitsValue::Float(f)
            } else {
                return None;
            }
        }
    };
    Some((value, comment))
}

/// Ordered list of header cards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitsHeader {
    cards: Vec<Card>,
}

impl FitsHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// First valued card with this keyword.
    pub fn get(&self, keyword: &str) -> Option<&FitsValue> {
        self.cards
            .iter()
            .find(|c| c.keyword == keyword && c.value.is_some())
            .and_then(|c| c.value.as_ref())
    }

    pub fn get_f64(&self, keyword: &str) -> Option<f64> {
        self.get(keyword).and_then(FitsValue::as_f64)
    }

    pub fn get_i64(&self, keyword: &str) -> Option<i64> {
        self.get(keyword).and_then(FitsValue::as_i64)
    }

    pub fn get_str(&self, keyword: &str) -> Option<&str> {
        self.get(keyword).and_then(FitsValue::as_str)
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.get(keyword).is_some()
    }

    /// Set a keyword, replacing the first existing card in place or appending a new one.
    pub fn set(&mut self, keyword: &str, value: FitsValue) {
        let keyword = keyword.to_uppercase();
        if let Some(card) = self
            .cards
            .iter_mut()
            .find(|c| c.keyword == keyword && c.value.is_some())
        {
            card.value = Some(value);
        } else {
            self.cards.push(Card::new(&keyword, value));
        }
    }

    /// Remove every valued card with this keyword. Returns how many were removed.
    pub fn remove(&mut self, keyword: &str) -> usize {
        let before = self.cards.len();
        self.cards
            .retain(|c| !(c.keyword == keyword && c.value.is_some()));
        before - self.cards.len()
    }

    /// Append a HISTORY entry, wrapped over as many cards as needed.
    pub fn add_history(&mut self, text: &str) {
        let chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            self.cards.push(Card::commentary("HISTORY", ""));
            return;
        }
        for chunk in chars.chunks(CARD_LEN - 8) {
            let line: String = chunk.iter().collect();
            self.cards.push(Card::commentary("HISTORY", &line));
        }
    }

    /// Text of every HISTORY card, in order.
    pub fn history(&self) -> Vec<&str> {
        self.cards
            .iter()
            .filter(|c| c.keyword == "HISTORY")
            .map(|c| c.comment.as_deref().unwrap_or("").trim_end())
            .collect()
    }

    pub fn push(&mut self, card: Card) {
        self.cards.push(card);
    }
}

// ── Sample storage ──────────────────────────────────────────────────────────

/// Image samples in their stored numeric type, row-major.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    U8(Vec<u8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl Samples {
    pub fn bitpix(&self) -> i64 {
        match self {
            Samples::U8(_) => 8,
            Samples::I16(_) => 16,
            Samples::I32(_) => 32,
            Samples::I64(_) => 64,
            Samples::F32(_) => -32,
            Samples::F64(_) => -64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Samples::U8(v) => v.len(),
            Samples::I16(v) => v.len(),
            Samples::I32(v) => v.len(),
            Samples::I64(v) => v.len(),
            Samples::F32(v) => v.len(),
            Samples::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample at a flat index, widened to f64.
    pub fn get_f64(&self, idx: usize) -> Option<f64> {
        match self {
            Samples::U8(v) => v.get(idx).map(|&x| x as f64),
            Samples::I16(v) => v.get(idx).map(|&x| x as f64),
            Samples::I32(v) => v.get(idx).map(|&x| x as f64),
            Samples::I64(v) => v.get(idx).map(|&x| x as f64),
            Samples::F32(v) => v.get(idx).map(|&x| x as f64),
            Samples::F64(v) => v.get(idx).copied(),
        }
    }

    /// All samples widened to f64.
    pub fn to_f64(&self) -> Vec<f64> {
        match self {
            Samples::U8(v) => v.iter().map(|&x| x as f64).collect(),
            Samples::I16(v) => v.iter().map(|&x| x as f64).collect(),
            Samples::I32(v) => v.iter().map(|&x| x as f64).collect(),
            Samples::I64(v) => v.iter().map(|&x| x as f64).collect(),
            Samples::F32(v) => v.iter().map(|&x| x as f64).collect(),
            Samples::F64(v) => v.clone(),
        }
    }

    /// Copy a `w × h` window starting at `(x0, y0)` out of a row-major grid `stride` wide.
    pub(crate) fn window(&self, stride: usize, x0: usize, y0: usize, w: usize, h: usize) -> Samples {
        fn rows<T: Copy>(v: &[T], stride: usize, x0: usize, y0: usize, w: usize, h: usize) -> Vec<T> {
            let mut out = Vec::with_capacity(w * h);
            for row in y0..y0 + h {
                let start = row * stride + x0;
                out.extend_from_slice(&v[start..start + w]);
            }
            out
        }
        match self {
            Samples::U8(v) => Samples::U8(rows(v, stride, x0, y0, w, h)),
            Samples::I16(v) => Samples::I16(rows(v, stride, x0, y0, w, h)),
            Samples::I32(v) => Samples::I32(rows(v, stride, x0, y0, w, h)),
            Samples::I64(v) => Samples::I64(rows(v, stride, x0, y0, w, h)),
            Samples::F32(v) => Samples::F32(rows(v, stride, x0, y0, w, h)),
            Samples::F64(v) => Samples::F64(rows(v, stride, x0, y0, w, h)),
        }
    }

    fn from_be_bytes(bitpix: i64, bytes: &[u8]) -> Result<Samples, FitsError> {
        let samples = match bitpix {
            8 => Samples::U8(bytes.to_vec()),
            16 => Samples::I16(
                bytes
                    .chunks_exact(2)
                    .map(|c| i16::from_be_bytes([c[0], c[1]]))
                    .collect(),
            ),
            32 => Samples::I32(
                bytes
                    .chunks_exact(4)
                    .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            64 => Samples::I64(
                bytes
                    .chunks_exact(8)
                    .map(|c| i64::from_be_bytes(c.try_into().unwrap_or([0; 8])))
                    .collect(),
            ),
            -32 => Samples::F32(
                bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            -64 => Samples::F64(
                bytes
                    .chunks_exact(8)
                    .map(|c| f64::from_be_bytes(c.try_into().unwrap_or([0; 8])))
                    .collect(),
            ),
            other => return Err(FitsError::UnsupportedBitpix(other)),
        };
        Ok(samples)
    }

    fn to_be_bytes(&self) -> Vec<u8> {
        match self {
            Samples::U8(v) => v.clone(),
            Samples::I16(v) => v.iter().flat_map(|x| x.to_be_bytes()).collect(),
            Samples::I32(v) => v.iter().flat_map(|x| x.to_be_bytes()).collect(),
            Samples::I64(v) => v.iter().flat_map(|x| x.to_be_bytes()).collect(),
            Samples::F32(v) => v.iter().flat_map(|x| x.to_be_bytes()).collect(),
            Samples::F64(v) => v.iter().flat_map(|x| x.to_be_bytes()).collect(),
        }
    }
}

/// One image HDU: its header and its data axes.
#[derive(Debug, Clone, PartialEq)]
pub struct FitsImage {
    pub header: FitsHeader,
    /// Axis lengths in FITS order (`NAXIS1` first).
    pub axes: Vec<usize>,
    pub samples: Samples,
}

// ── Reading ─────────────────────────────────────────────────────────────────

/// Read the first HDU of `path` that carries image data.
///
/// An empty primary HDU is skipped in favour of the first `IMAGE` extension,
/// which is how compressed-free multi-extension camera files usually look.
pub fn read_fits(path: impl AsRef<Path>) -> Result<FitsImage, FitsError> {
    let path = path.as_ref();
    let io_err = |source| FitsError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let mut reader = BufReader::new(file);

    let mut hdu_index = 0usize;
    loop {
        let header = match read_header(&mut reader).map_err(io_err)? {
            Some(h) => h,
            None if hdu_index == 0 => {
                return Err(FitsError::InvalidFormat("file is empty".to_string()))
            }
            None => {
                return Err(FitsError::InvalidFormat(
                    "no HDU with image data".to_string(),
                ))
            }
        };

        if hdu_index == 0 && header.get("SIMPLE").is_none() {
            return Err(FitsError::InvalidFormat(
                "primary header does not start with SIMPLE".to_string(),
            ));
        }

        let bitpix = header
            .get_i64("BITPIX")
            .ok_or_else(|| FitsError::MissingKeyword("BITPIX".to_string()))?;
        let naxis = header
            .get_i64("NAXIS")
            .ok_or_else(|| FitsError::MissingKeyword("NAXIS".to_string()))?;
        let mut axes = Vec::with_capacity(naxis.max(0) as usize);
        for i in 1..=naxis {
            let key = format!("NAXIS{}", i);
            let n = header
                .get_i64(&key)
                .ok_or_else(|| FitsError::MissingKeyword(key.clone()))?;
            if n < 0 {
                return Err(FitsError::InvalidFormat(format!("{} is negative", key)));
            }
            axes.push(n as usize);
        }

        let bytes_per_sample = (bitpix.unsigned_abs() / 8) as usize;
        let npix: usize = if axes.is_empty() { 0 } else { axes.iter().product() };
        let pcount = header.get_i64("PCOUNT").unwrap_or(0).max(0) as usize;
        let data_len = npix * bytes_per_sample + pcount;
        let padded_len = data_len.div_ceil(BLOCK_LEN) * BLOCK_LEN;

        let is_image = hdu_index == 0 || header.get_str("XTENSION") == Some("IMAGE");
        if is_image && npix > 0 {
            let mut data = vec![0u8; npix * bytes_per_sample];
            reader
                .read_exact(&mut data)
                .map_err(|_| FitsError::InvalidFormat("truncated data unit".to_string()))?;
            let samples = Samples::from_be_bytes(bitpix, &data)?;
            return Ok(FitsImage {
                header,
                axes,
                samples,
            });
        }

        // Skip this HDU's data unit
        std::io::copy(&mut (&mut reader).take(padded_len as u64), &mut std::io::sink())
            .map_err(io_err)?;
        hdu_index += 1;
    }
}

/// Read header blocks up to and including the one containing `END`.
///
/// Returns `None` at a clean end of file.
fn read_header<R: Read>(reader: &mut R) -> std::io::Result<Option<FitsHeader>> {
    let mut header = FitsHeader::new();
    let mut first = true;
    loop {
        let mut block = [0u8; BLOCK_LEN];
        match reader.read_exact(&mut block) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof && first => return Ok(None),
            Err(e) => return Err(e),
        }
        first = false;

        for i in 0..CARDS_PER_BLOCK {
            let raw = &block[i * CARD_LEN..(i + 1) * CARD_LEN];
            let card = Card::parse(raw);
            if card.keyword == "END" {
                return Ok(Some(header));
            }
            // Blank padding cards carry nothing worth keeping
            if card.keyword.is_empty() && card.comment.as_deref().unwrap_or("").is_empty() {
                continue;
            }
            if card.keyword == "CONTINUE" {
                if let Some(prev) = header.cards.last_mut() {
                    if prev.absorb_continue(&card) {
                        continue;
                    }
                }
            }
            header.cards.push(card);
        }
    }
}

// ── Writing ─────────────────────────────────────────────────────────────────

/// Write `image` as a single primary HDU, overwriting `path`.
///
/// Structural keywords are regenerated from the samples; every other card of
/// `image.header` is copied in order.
pub fn write_fits(path: impl AsRef<Path>, image: &FitsImage) -> Result<(), FitsError> {
    let path = path.as_ref();
    let npix: usize = image.axes.iter().product();
    if npix != image.samples.len() {
        return Err(FitsError::InvalidFormat(format!(
            "axes {:?} describe {} samples but {} were given",
            image.axes,
            npix,
            image.samples.len()
        )));
    }

    let mut cards = vec![
        Card::new("SIMPLE", FitsValue::Logical(true)),
        Card::new("BITPIX", FitsValue::Integer(image.samples.bitpix())),
        Card::new("NAXIS", FitsValue::Integer(image.axes.len() as i64)),
    ];
    for (i, n) in image.axes.iter().enumerate() {
        cards.push(Card::new(
            &format!("NAXIS{}", i + 1),
            FitsValue::Integer(*n as i64),
        ));
    }
    cards.extend(
        image
            .header
            .cards
            .iter()
            .filter(|c| !is_structural(&c.keyword) && !STALE_KEYWORDS.contains(&c.keyword.as_str()))
            .cloned(),
    );
    cards.push(Card::commentary("END", ""));

    let mut header_bytes: Vec<u8> = cards.iter().flat_map(|c| c.to_records()).flatten().collect();
    pad_to_block(&mut header_bytes, b' ');

    let mut data = image.samples.to_be_bytes();
    pad_to_block(&mut data, 0);

    let io_err = |source| FitsError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&header_bytes).map_err(io_err)?;
    writer.write_all(&data).map_err(io_err)?;
    writer.flush().map_err(io_err)?;
    Ok(())
}

fn is_structural(keyword: &str) -> bool {
    STRUCTURAL_KEYWORDS.contains(&keyword)
        || keyword
            .strip_prefix("NAXIS")
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

fn pad_to_block(buf: &mut Vec<u8>, fill: u8) {
    let rem = buf.len() % BLOCK_LEN;
    if rem != 0 {
        buf.resize(buf.len() + BLOCK_LEN - rem, fill);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_cards() {
        let mut raw = [b' '; 80];
        let text = b"CRVAL1  =        83.8220833333 / [deg] reference RA";
        raw[..text.len()].copy_from_slice(text);
        let card = Card::parse(&raw);
        assert_eq!(card.keyword, "CRVAL1");
        assert_eq!(card.value, Some(FitsValue::Float(83.8220833333)));
        assert_eq!(card.comment.as_deref(), Some("[deg] reference RA"));

        let mut raw = [b' '; 80];
        let text = b"OBJECT  = 'O''Brien field'      / target";
        raw[..text.len()].copy_from_slice(text);
        let card = Card::parse(&raw);
        assert_eq!(card.value, Some(FitsValue::Str("O'Brien field".to_string())));
    }

    #[test]
    fn test_card_render_roundtrip() {
        let values = [
            FitsValue::Logical(true),
            FitsValue::Integer(-32768),
            FitsValue::Float(-2.7777777777777778e-4),
            FitsValue::Float(2000.0),
            FitsValue::Str("RA---TAN".to_string()),
            FitsValue::Str("it's".to_string()),
        ];
        for value in values {
            let card = Card::new("KEY", value.clone());
            let parsed = Card::parse(&card.to_bytes());
            match (&value, parsed.value.as_ref()) {
                (FitsValue::Float(a), Some(b)) => {
                    assert_eq!(Some(*a), b.as_f64(), "float did not round-trip")
                }
                (_, Some(b)) => assert_eq!(&value, b),
                (_, None) => panic!("value lost for {:?}", value),
            }
        }
    }

    #[test]
    fn test_header_set_replaces_in_place() {
        let mut header = FitsHeader::new();
        header.set("OBJECT", FitsValue::Str("M42".to_string()));
        header.set("EXPTIME", FitsValue::Float(30.0));
        header.set("object", FitsValue::Str("M43".to_string()));
        assert_eq!(header.len(), 2);
        assert_eq!(header.cards()[0].keyword, "OBJECT");
        assert_eq!(header.get_str("OBJECT"), Some("M43"));
    }

    #[test]
    fn test_history_wraps_long_text() {
        let mut header = FitsHeader::new();
        let text = "x".repeat(100);
        header.add_history(&text);
        let history = header.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].len() + history[1].len(), 100);
    }

    #[test]
    fn test_write_read_roundtrip_all_bitpix() {
        let dir = tempfile::tempdir().unwrap();
        let cases = [
            Samples::U8(vec![0, 1, 254, 255, 7, 9]),
            Samples::I16(vec![i16::MIN, -1, 0, 1, 300, i16::MAX]),
            Samples::I32(vec![i32::MIN, -5, 0, 5, 70000, i32::MAX]),
            Samples::I64(vec![i64::MIN, -5, 0, 5, 1 << 40, i64::MAX]),
            Samples::F32(vec![f32::NAN, -1.5, 0.0, 1.0e-30, 3.25, f32::MAX]),
            Samples::F64(vec![f64::NAN, -1.5, 0.0, 1.0e-300, 3.25, f64::MAX]),
        ];
        for samples in cases {
            let mut header = FitsHeader::new();
            header.set("OBJECT", FitsValue::Str("test".to_string()));
            header.add_history("written by test");
            let image = FitsImage {
                header,
                axes: vec![3, 2],
                samples,
            };
            let path = dir.path().join(format!("img_{}.fits", image.samples.bitpix()));
            write_fits(&path, &image).unwrap();

            let len = std::fs::metadata(&path).unwrap().len();
            assert_eq!(len % 2880, 0, "file not block aligned");

            let back = read_fits(&path).unwrap();
            assert_eq!(back.axes, vec![3, 2]);
            assert_eq!(back.header.get_str("OBJECT"), Some("test"));
            assert_eq!(back.header.history(), vec!["written by test"]);
            // Compare bit patterns so NaN compares equal to itself
            let a: Vec<u8> = image.samples.to_be_bytes();
            let b: Vec<u8> = back.samples.to_be_bytes();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_write_rejects_axis_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let image = FitsImage {
            header: FitsHeader::new(),
            axes: vec![4, 4],
            samples: Samples::U8(vec![0; 3]),
        };
        assert!(matches!(
            write_fits(dir.path().join("bad.fits"), &image),
            Err(FitsError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_structural_keywords_not_duplicated() {
        let dir = tempfile::tempdir().unwrap();
        let mut header = FitsHeader::new();
        header.set("SIMPLE", FitsValue::Logical(true));
        header.set("BITPIX", FitsValue::Integer(16));
        header.set("NAXIS", FitsValue::Integer(2));
        header.set("NAXIS1", FitsValue::Integer(100));
        header.set("CHECKSUM", FitsValue::Str("stale".to_string()));
        header.set("BZERO", FitsValue::Float(32768.0));
        let image = FitsImage {
            header,
            axes: vec![2, 2],
            samples: Samples::F32(vec![1.0, 2.0, 3.0, 4.0]),
        };
        let path = dir.path().join("copy.fits");
        write_fits(&path, &image).unwrap();
        let back = read_fits(&path).unwrap();
        assert_eq!(back.header.get_i64("BITPIX"), Some(-32));
        assert_eq!(back.header.get_i64("NAXIS1"), Some(2));
        assert_eq!(
            back.header.cards().iter().filter(|c| c.keyword == "NAXIS1").count(),
            1
        );
        assert!(!back.header.contains("CHECKSUM"));
        assert_eq!(back.header.get_f64("BZERO"), Some(32768.0));
    }

    #[test]
    fn test_long_string_uses_continue_cards() {
        let dir = tempfile::tempdir().unwrap();
        let long = format!("/archive/{}/o'neil/frame_0042.fits", "night".repeat(25));
        let mut card = Card::new("ORIGPATH", FitsValue::Str(long.clone()));
        card.comment = Some("source file".to_string());
        let records = card.to_records();
        assert!(records.len() > 1);
        assert!(records[1..].iter().all(|r| r.starts_with(b"CONTINUE  '")));

        let mut header = FitsHeader::new();
        header.push(card);
        header.set("OBJECT", FitsValue::Str("M42".to_string()));
        let image = FitsImage {
            header,
            axes: vec![2, 1],
            samples: Samples::U8(vec![1, 2]),
        };
        let path = dir.path().join("long.fits");
        write_fits(&path, &image).unwrap();

        let back = read_fits(&path).unwrap();
        assert_eq!(back.header.get_str("ORIGPATH"), Some(long.as_str()));
        let orig = back.header.cards().iter().find(|c| c.keyword == "ORIGPATH").unwrap();
        assert_eq!(orig.comment.as_deref(), Some("source file"));
        assert!(back.header.cards().iter().all(|c| c.keyword != "CONTINUE"));
        assert_eq!(back.header.get_str("OBJECT"), Some("M42"));
    }

    #[test]
    fn test_string_at_card_limit_stays_inline() {
        let value = "a".repeat(MAX_INLINE_STRING);
        let card = Card::new("ORIGPATH", FitsValue::Str(value.clone()));
        assert_eq!(card.to_records().len(), 1);
        let parsed = Card::parse(&card.to_bytes());
        assert_eq!(parsed.value, Some(FitsValue::Str(value)));

        let longer = Card::new("ORIGPATH", FitsValue::Str("a".repeat(MAX_INLINE_STRING + 1)));
        assert_eq!(longer.to_records().len(), 2);
    }
}
