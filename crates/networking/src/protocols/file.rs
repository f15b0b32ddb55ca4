use std::io;
use std::path::{Path, PathBuf};

use url::Url;

use super::{report, RequestTask};
use crate::error::NetworkError;
use crate::handler::{EventSink, ProtocolHandler};
use crate::location::Location;
use crate::request::{RequestOptions, RequestState};

/// Guess a media type from the file extension
pub fn mime_for_path(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "gmi" | "gemini" => "text/gemini",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

fn map_file_error(path: &Path, err: &io::Error) -> NetworkError {
    let reason = format!("{}: {}", path.display(), err);
    match err.kind() {
        io::ErrorKind::NotFound => NetworkError::ResourceNotFound(reason),
        io::ErrorKind::PermissionDenied => NetworkError::Unauthorized(reason),
        _ => NetworkError::UnknownError(reason),
    }
}

/// Render a directory as a gemtext link list, directories first
async fn directory_listing(path: &Path) -> io::Result<String> {
    let mut entries = tokio::fs::read_dir(path).await?;
    let mut dirs = Vec::new();
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let entry_path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().await?.is_dir() {
            if let Ok(url) = Url::from_directory_path(&entry_path) {
                dirs.push((name, url));
            }
        } else if let Ok(url) = Url::from_file_path(&entry_path) {
            files.push((name, url));
        }
    }
    dirs.sort();
    files.sort();

    let mut listing = format!("# Index of {}\n\n", path.display());
    if let Some(parent) = path.parent().and_then(|p| Url::from_directory_path(p).ok()) {
        listing.push_str(&format!("=> {} ..\n", parent));
    }
    for (name, url) in dirs {
        listing.push_str(&format!("=> {} {}/\n", url, name));
    }
    for (name, url) in files {
        listing.push_str(&format!("=> {} {}\n", url, name));
    }
    Ok(listing)
}

async fn read_local(path: PathBuf, sink: &EventSink) -> Result<(), NetworkError> {
    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|e| map_file_error(&path, &e))?;

    if metadata.is_dir() {
        let listing = directory_listing(&path)
            .await
            .map_err(|e| map_file_error(&path, &e))?;
        sink.complete(listing, "text/gemini");
    } else {
        let body = tokio::fs::read(&path)
            .await
            .map_err(|e| map_file_error(&path, &e))?;
        sink.progress(body.len() as u64);
        sink.complete(body, mime_for_path(&path));
    }
    Ok(())
}

/// Adapter for local `file:` locations
#[derive(Default)]
pub struct FileHandler {
    task: RequestTask,
}

impl FileHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProtocolHandler for FileHandler {
    fn name(&self) -> &'static str {
        "file"
    }

    fn supports_scheme(&self, scheme: &str) -> bool {
        scheme == "file"
    }

    fn start_request(&mut self, location: &Location, _options: RequestOptions, sink: EventSink) -> bool {
        let path = match location.url().to_file_path() {
            Ok(path) if location.scheme() == "file" => path,
            _ => return false,
        };

        sink.state(RequestState::Started);
        self.task.spawn("file", async move {
            let outcome = read_local(path, &sink).await;
            report("file", &sink, outcome);
        })
    }

    fn is_in_progress(&self) -> bool {
        self.task.is_running()
    }

    fn cancel_request(&mut self) -> bool {
        self.task.abort()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{event_channel, HandlerEvent, RequestId};

    async fn fetch(path: &Path) -> HandlerEvent {
        let (tx, mut rx) = event_channel();
        let mut handler = FileHandler::new();
        let location = Location::from_url(Url::from_file_path(path).unwrap());
        assert!(handler.start_request(&location, RequestOptions::default(), EventSink::new(RequestId(1), tx)));

        loop {
            let (_, event) = rx.recv().await.unwrap();
            if event.is_terminal() {
                return event;
            }
        }
    }

    #[test]
    fn test_mime_guessing() {
        assert_eq!(mime_for_path(Path::new("index.gmi")), "text/gemini");
        assert_eq!(mime_for_path(Path::new("README.MD")), "text/markdown");
        assert_eq!(mime_for_path(Path::new("photo.JPEG")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("binary")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.gmi");
        std::fs::write(&path, "# Hello\n").unwrap();

        match fetch(&path).await {
            HandlerEvent::Complete { body, mime } => {
                assert_eq!(&body[..], b"# Hello\n");
                assert_eq!(mime, "text/gemini");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lists_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();

        match fetch(dir.path()).await {
            HandlerEvent::Complete { body, mime } => {
                let listing = String::from_utf8(body.to_vec()).unwrap();
                assert_eq!(mime, "text/gemini");
                let dir_line = listing.find(" a/\n").unwrap();
                let file_line = listing.find(" b.txt\n").unwrap();
                assert!(dir_line < file_line);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let event = fetch(&dir.path().join("missing.gmi")).await;
        assert!(matches!(
            event,
            HandlerEvent::NetworkError(NetworkError::ResourceNotFound(_))
        ));
    }
}
