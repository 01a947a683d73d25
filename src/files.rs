//! MIME detection and classification for files served from any source.

use std::path::Path;

use quick_xml::events::Event;
use quick_xml::{Reader, Writer};
use serde::Serialize;

use crate::exec::{SharedRunner, AUX_TIMEOUT};

const OCTET_STREAM: &str = "application/octet-stream";

/// MIME types rendered as text beyond `text/*`.
pub const TEXT_MIME_TYPES: &[&str] = &[
    "application/json",
    "application/xml",
    "application/javascript",
    "application/x-yaml",
    "application/yaml",
    "application/toml",
    "application/x-shellscript",
    "application/x-sh",
    "application/x-python",
    "application/x-perl",
    "application/x-ruby",
    "application/x-httpd-php",
    "application/xhtml+xml",
    "inode/x-empty",
];

/// How a caller should present a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Image,
    Pdf,
    Text,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Image => "image",
            FileCategory::Pdf => "pdf",
            FileCategory::Text => "text",
        }
    }
}

/// Map a MIME type to a category. `None` means the type is unsupported.
pub fn categorize(mime: &str) -> Option<FileCategory> {
    let mime = mime.split(';').next().unwrap_or_default().trim();
    if mime.starts_with("image/") {
        Some(FileCategory::Image)
    } else if mime == "application/pdf" {
        Some(FileCategory::Pdf)
    } else if mime.starts_with("text/") || TEXT_MIME_TYPES.contains(&mime) {
        Some(FileCategory::Text)
    } else {
        None
    }
}

/// Guess from the file extension alone.
pub fn mime_from_extension(path: &str) -> String {
    mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| OCTET_STREAM.to_string())
}

/// Ask `file --mime-type` (run behind `prefix`, e.g. `docker exec <id>`),
/// falling back to the extension when it is unavailable or unsure.
pub async fn detect_mime(runner: &SharedRunner, prefix: &[String], path: &str) -> String {
    let mut argv = prefix.to_vec();
    argv.extend(["file", "--mime-type", "-b", path].map(String::from));
    match runner.run(&argv, AUX_TIMEOUT).await {
        Ok(out) => {
            let mime = String::from_utf8_lossy(&out).trim().to_string();
            if mime.contains('/') && mime != OCTET_STREAM {
                return mime;
            }
        }
        Err(e) => tracing::debug!(path, error = %e, "mime sniffing failed"),
    }
    mime_from_extension(path)
}

/// Re-indent JSON and XML files. Anything else, or content that fails to
/// parse, is returned as is.
pub fn pretty_print(data: Vec<u8>, path: &str) -> Vec<u8> {
    let ext = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let formatted = match ext.as_deref() {
        Some("json") => serde_json::from_slice::<serde_json::Value>(&data)
            .ok()
            .and_then(|value| serde_json::to_vec_pretty(&value).ok()),
        Some("xml") => indent_xml(&data),
        _ => None,
    };
    formatted.unwrap_or(data)
}

fn indent_xml(data: &[u8]) -> Option<Vec<u8>> {
    let mut reader = Reader::from_reader(data);
    reader.config_mut().trim_text(true);
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).ok()? {
            Event::Eof => break,
            event => writer.write_event(event).ok()?,
        }
        buf.clear();
    }
    Some(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorizes_mime_types() {
        assert_eq!(categorize("image/png"), Some(FileCategory::Image));
        assert_eq!(categorize("application/pdf"), Some(FileCategory::Pdf));
        assert_eq!(categorize("text/x-rust"), Some(FileCategory::Text));
        assert_eq!(categorize("application/json"), Some(FileCategory::Text));
        assert_eq!(
            categorize("text/plain; charset=utf-8"),
            Some(FileCategory::Text)
        );
        assert_eq!(categorize("application/zip"), None);
        assert_eq!(categorize(OCTET_STREAM), None);
    }

    #[test]
    fn guesses_from_extension() {
        assert_eq!(mime_from_extension("/tmp/a.png"), "image/png");
        assert_eq!(mime_from_extension("/tmp/a.json"), "application/json");
        assert_eq!(mime_from_extension("/tmp/noext"), OCTET_STREAM);
    }

    #[test]
    fn pretty_prints_xml() {
        let out = pretty_print(b"<a><b>1</b><c/></a>".to_vec(), "/x/feed.XML");
        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with("<a>\n  <b>"));
        assert!(out.contains("\n  <c/>"));
        assert!(out.ends_with("\n</a>"));

        let broken = b"<a><b></a>".to_vec();
        assert_eq!(pretty_print(broken.clone(), "/x/feed.xml"), broken);
        let raw = b"<a><b/></a>".to_vec();
        assert_eq!(pretty_print(raw.clone(), "/x/page.html"), raw);
    }

    #[test]
    fn pretty_prints_json() {
        let out = pretty_print(br#"{"a":[1,2]}"#.to_vec(), "/x/data.json");
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\n  \"a\": [\n    1,\n    2\n  ]\n}"
        );
        let raw = br#"{"a":1}"#.to_vec();
        assert_eq!(pretty_print(raw.clone(), "/x/data.txt"), raw);
        let broken = b"{not json".to_vec();
        assert_eq!(pretty_print(broken.clone(), "/x/data.json"), broken);
    }
}
