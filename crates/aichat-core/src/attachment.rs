//! Loading files the user attaches to a message

use std::io::Cursor;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use encoding_rs::{Encoding, BIG5, GBK, SHIFT_JIS, WINDOWS_1252};
use image::{ImageFormat, ImageReader};

use crate::error::{ChatError, ChatResult};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp"];

const TEXT_EXTENSIONS: &[(&str, &str)] = &[
    ("txt", ""),
    ("py", "python"),
    ("js", "javascript"),
    ("html", "html"),
    ("css", "css"),
    ("json", "json"),
    ("xml", "xml"),
    ("md", "markdown"),
    ("rs", "rust"),
    ("toml", "toml"),
];

/// An image queued for sending, re-encoded as PNG and base64-encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub file_name: String,
    pub mime: String,
    pub data: String,
}

impl ImageAttachment {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    Image(ImageAttachment),
    /// Text file contents wrapped in a fenced block, ready to append to the input
    Text(String),
}

pub fn load_attachment(path: &Path) -> ChatResult<Attachment> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        let bytes = std::fs::read(path)?;
        if bytes.is_empty() {
            return Err(ChatError::Attachment(format!("{} is empty", file_name)));
        }
        let png = encode_png(&bytes).map_err(|e| {
            ChatError::Attachment(format!("cannot load image {}: {}", file_name, e))
        })?;
        return Ok(Attachment::Image(ImageAttachment {
            file_name,
            mime: "image/png".to_string(),
            data: STANDARD.encode(png),
        }));
    }

    if let Some((_, lang)) = TEXT_EXTENSIONS.iter().find(|(e, _)| *e == ext) {
        let bytes = std::fs::read(path)?;
        let text = decode_text(bytes);
        return Ok(Attachment::Text(wrap_text_file(&file_name, lang, &text)));
    }

    Err(ChatError::Attachment(format!(
        "unsupported file type: {}",
        file_name
    )))
}

/// Decode whatever the file holds (the extension is not trusted) and
/// re-encode it as PNG, which every vision endpoint accepts
fn encode_png(bytes: &[u8]) -> image::ImageResult<Vec<u8>> {
    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;
    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

fn decode_text(bytes: Vec<u8>) -> String {
    let bytes = match String::from_utf8(bytes) {
        Ok(text) => return text,
        Err(e) => e.into_bytes(),
    };
    // GB2312 is a subset of GBK; windows-1252 accepts any byte sequence
    let legacy: [&'static Encoding; 4] = [GBK, BIG5, SHIFT_JIS, WINDOWS_1252];
    for encoding in legacy {
        let (text, had_errors) = encoding.decode_without_bom_handling(&bytes);
        if !had_errors {
            return text.into_owned();
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Fence the file contents, neutralising fences inside the file so they
/// cannot close the block early
pub fn wrap_text_file(file_name: &str, lang: &str, text: &str) -> String {
    let safe = text.replace("```", "｀｀｀");
    format!("\n[File: {}]\n```{}\n{}\n```\n", file_name, lang, safe)
}
