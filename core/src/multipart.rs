//! `multipart/form-data` encoding for upload requests.
//!
//! The encoder works on in-memory bytes so a built `HttpRequest` owns its
//! whole body and holds no open file handles.

use uuid::Uuid;

#[derive(Debug, Clone)]
enum PartBody {
    Text(String),
    File {
        filename: String,
        content_type: &'static str,
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Clone)]
struct Part {
    name: String,
    body: PartBody,
}

#[derive(Debug, Clone)]
pub struct MultipartForm {
    boundary: String,
    parts: Vec<Part>,
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartForm {
    pub fn new() -> Self {
        Self {
            boundary: format!("----embedded-ai-{}", Uuid::new_v4().simple()),
            parts: Vec::new(),
        }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.parts.push(Part {
            name: name.to_string(),
            body: PartBody::Text(value.to_string()),
        });
        self
    }

    pub fn file(mut self, name: &str, filename: &str, bytes: Vec<u8>) -> Self {
        self.parts.push(Part {
            name: name.to_string(),
            body: PartBody::File {
                filename: filename.to_string(),
                content_type: content_type_for(filename),
                bytes,
            },
        });
        self
    }

    /// Value for the request's `content-type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for part in &self.parts {
            out.extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
            match &part.body {
                PartBody::Text(value) => {
                    out.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                            escape(&part.name)
                        )
                        .as_bytes(),
                    );
                    out.extend_from_slice(value.as_bytes());
                }
                PartBody::File {
                    filename,
                    content_type,
                    bytes,
                } => {
                    out.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                            escape(&part.name),
                            escape(filename),
                            content_type
                        )
                        .as_bytes(),
                    );
                    out.extend_from_slice(bytes);
                }
            }
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        out
    }
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(['\r', '\n'], " ")
}

fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_text_and_file_parts() {
        let form = MultipartForm::new()
            .file("datasheet", "ds.pdf", b"%PDF".to_vec())
            .text("instruction", "init GPIO");
        let boundary = form.boundary.clone();
        let body = String::from_utf8(form.encode()).unwrap();

        assert!(body.starts_with(&format!("--{boundary}\r\n")));
        assert!(body.contains(
            "Content-Disposition: form-data; name=\"datasheet\"; filename=\"ds.pdf\"\r\nContent-Type: application/pdf\r\n\r\n%PDF\r\n"
        ));
        assert!(body.contains("name=\"instruction\"\r\n\r\ninit GPIO\r\n"));
        assert!(body.ends_with(&format!("--{boundary}--\r\n")));
    }

    #[test]
    fn content_type_carries_boundary() {
        let form = MultipartForm::new();
        assert_eq!(
            form.content_type(),
            format!("multipart/form-data; boundary={}", form.boundary)
        );
    }

    #[test]
    fn boundaries_differ_between_forms() {
        assert_ne!(MultipartForm::new().boundary, MultipartForm::new().boundary);
    }

    #[test]
    fn guesses_content_type_from_extension() {
        assert_eq!(content_type_for("board.PNG"), "image/png");
        assert_eq!(content_type_for("board.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("notes"), "application/octet-stream");
    }

    #[test]
    fn quotes_in_filenames_are_escaped() {
        let form = MultipartForm::new().file("schematic", "a\"b.png", vec![]);
        let body = String::from_utf8(form.encode()).unwrap();
        assert!(body.contains("filename=\"a\\\"b.png\""));
    }
}
