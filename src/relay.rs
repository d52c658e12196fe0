use crate::error::RelayError;
use crate::types::{DocumentType, ExtractionEnvelope, ExtractionRecord, Upload};
use reqwest::blocking::{multipart, Client};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Opaque extraction backend. One call per upload; no retries.
pub trait ExtractionRelay: Send + Sync {
    fn submit(&self, upload: &Upload, doc_type: DocumentType) -> Result<ExtractionEnvelope, RelayError>;
}

/// Multipart POST to `<base_url><endpoint>` with the file under `file`.
pub struct HttpRelay {
    base_url: String,
    client: Client,
}

impl HttpRelay {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Network(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn url_for(&self, doc_type: DocumentType) -> String {
        format!("{}{}", self.base_url, doc_type.endpoint())
    }
}

impl ExtractionRelay for HttpRelay {
    fn submit(&self, upload: &Upload, doc_type: DocumentType) -> Result<ExtractionEnvelope, RelayError> {
        let url = self.url_for(doc_type);
        let part = multipart::Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.mime_type)
            .map_err(|e| RelayError::Network(e.to_string()))?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("documentType", doc_type.as_str().to_string());

        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .map_err(|e| {
                warn!(url = %url, error = %e, "extraction request failed");
                if e.is_connect() || e.is_timeout() {
                    RelayError::Network(
                        "Could not reach the extraction service. Check that it is running and try again."
                            .to_string(),
                    )
                } else {
                    RelayError::Network("Network error.".to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| RelayError::Network(e.to_string()))?;
        if !status.is_success() {
            let detail = error_detail(&body);
            warn!(url = %url, status = status.as_u16(), detail = %detail, "extraction rejected");
            return Err(RelayError::Status {
                code: status.as_u16(),
                detail,
            });
        }

        let mut envelope = parse_envelope(&body)?;
        if envelope.execution_time.is_none() {
            envelope.execution_time = Some(started.elapsed().as_secs_f64());
        }
        info!(
            url = %url,
            fields = envelope.fields.len(),
            items = envelope.items.len(),
            "extraction finished"
        );
        Ok(envelope)
    }
}

/// Backend `error` member, else the raw body, else a fixed message.
fn error_detail(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(err) = value.get("error").and_then(|e| e.as_str()) {
            return err.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "Unknown error".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Normalize a backend response: `{execution_time, data: {...}}` or a bare object.
pub fn parse_envelope(body: &str) -> Result<ExtractionEnvelope, RelayError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| RelayError::Malformed(format!("Invalid JSON: {}", e)))?;
    let obj = value
        .as_object()
        .ok_or_else(|| RelayError::Malformed("expected a JSON object".to_string()))?;

    let (payload, execution_time) = match obj.get("data") {
        Some(data @ Value::Object(_)) => (data, obj.get("execution_time").and_then(Value::as_f64)),
        _ => (&value, None),
    };
    let ExtractionRecord { fields, items } = ExtractionRecord::from_json(payload)
        .ok_or_else(|| RelayError::Malformed("expected a JSON object".to_string()))?;
    Ok(ExtractionEnvelope {
        fields,
        items,
        execution_time,
    })
}

pub type JobResult = Result<ExtractionEnvelope, RelayError>;

/// Discards the running job's result.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Sender<JobResult>,
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(Err(RelayError::Cancelled));
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A submission running on a worker thread.
pub struct ExtractionJob {
    rx: Receiver<JobResult>,
    handle: CancelHandle,
}

impl ExtractionJob {
    pub fn spawn(relay: Arc<dyn ExtractionRelay>, upload: Upload, doc_type: DocumentType) -> Self {
        let (tx, rx) = mpsc::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let handle = CancelHandle {
            tx: tx.clone(),
            cancelled: Arc::clone(&cancelled),
        };
        std::thread::spawn(move || {
            let result = relay.submit(&upload, doc_type);
            if cancelled.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(result);
        });
        Self { rx, handle }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Block until the backend answers or the job is cancelled.
    pub fn wait(self) -> JobResult {
        let result = self
            .rx
            .recv()
            .unwrap_or_else(|_| Err(RelayError::Network("Extraction worker stopped.".to_string())));
        if self.handle.is_cancelled() {
            return Err(RelayError::Cancelled);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::Mutex;

    /// Serve one request and hand back the request line and body.
    fn stub_backend(status: &'static str, body: &'static str) -> (String, std::thread::JoinHandle<(String, Vec<u8>)>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                let lower = line.to_ascii_lowercase();
                if let Some(v) = lower.strip_prefix("content-length:") {
                    content_length = v.trim().parse().unwrap();
                }
            }
            let mut payload = vec![0u8; content_length];
            reader.read_exact(&mut payload).unwrap();
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let mut stream = reader.into_inner();
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();
            (request_line.trim().to_string(), payload)
        });
        (format!("http://{}", addr), handle)
    }

    fn upload() -> Upload {
        Upload::new("invoice.pdf", "application/pdf", b"%PDF-1.4 test".to_vec())
    }

    #[test]
    fn parses_wrapped_response() {
        let env = parse_envelope(
            r#"{"execution_time": 1.5, "data": {"invoice_number": "INV-1", "tax": null, "items": [{"description": "A"}]}}"#,
        )
        .unwrap();
        assert_eq!(env.execution_time, Some(1.5));
        assert_eq!(env.fields.len(), 2);
        assert_eq!(env.items.len(), 1);
    }

    #[test]
    fn parses_bare_object() {
        let env = parse_envelope(r#"{"merchant": "Toko", "totalAmount": 50000}"#).unwrap();
        assert_eq!(env.execution_time, None);
        assert_eq!(env.fields.keys().collect::<Vec<_>>(), vec!["merchant", "totalAmount"]);
        assert!(env.items.is_empty());
    }

    #[test]
    fn non_object_is_malformed() {
        assert!(matches!(parse_envelope("[1,2]"), Err(RelayError::Malformed(_))));
        assert!(matches!(parse_envelope("<html>"), Err(RelayError::Malformed(_))));
    }

    #[test]
    fn posts_multipart_to_mapped_endpoint() {
        let (base, server) = stub_backend(
            "200 OK",
            r#"{"execution_time": 0.8, "data": {"invoice_number": "INV-9", "items": []}}"#,
        );
        let relay = HttpRelay::new(&base, Duration::from_secs(10)).unwrap();
        let env = relay.submit(&upload(), DocumentType::Awb).unwrap();
        assert_eq!(env.execution_time, Some(0.8));

        let (request_line, payload) = server.join().unwrap();
        assert!(request_line.starts_with("POST /extract/awb "));
        let text = String::from_utf8_lossy(&payload);
        assert!(text.contains("name=\"file\"; filename=\"invoice.pdf\""));
        assert!(text.contains("%PDF-1.4 test"));
        assert!(text.contains("name=\"documentType\""));
    }

    #[test]
    fn status_error_carries_backend_message() {
        let (base, server) = stub_backend("500 Internal Server Error", r#"{"error": "model unavailable"}"#);
        let relay = HttpRelay::new(&base, Duration::from_secs(10)).unwrap();
        let err = relay.submit(&upload(), DocumentType::Invoice).unwrap_err();
        server.join().unwrap();
        assert_eq!(
            err,
            RelayError::Status {
                code: 500,
                detail: "model unavailable".into()
            }
        );
        assert!(err.to_string().starts_with("Extraction failed"));
        assert_eq!(err.detail(), "model unavailable");
    }

    #[test]
    fn unreachable_backend_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let relay = HttpRelay::new(&format!("http://{}", addr), Duration::from_secs(5)).unwrap();
        let err = relay.submit(&upload(), DocumentType::Invoice).unwrap_err();
        assert!(matches!(err, RelayError::Network(_)));
        assert!(err.to_string().starts_with("Extraction failed"));
    }

    struct GateRelay {
        gate: Mutex<Receiver<()>>,
    }

    impl ExtractionRelay for GateRelay {
        fn submit(&self, _: &Upload, _: DocumentType) -> Result<ExtractionEnvelope, RelayError> {
            let _ = self.gate.lock().unwrap().recv();
            Ok(ExtractionEnvelope::default())
        }
    }

    #[test]
    fn job_returns_result() {
        let (open, gate) = mpsc::channel();
        let job = ExtractionJob::spawn(
            Arc::new(GateRelay { gate: Mutex::new(gate) }),
            upload(),
            DocumentType::Invoice,
        );
        open.send(()).unwrap();
        assert!(job.wait().is_ok());
    }

    #[test]
    fn cancelled_job_discards_late_result() {
        let (open, gate) = mpsc::channel();
        let job = ExtractionJob::spawn(
            Arc::new(GateRelay { gate: Mutex::new(gate) }),
            upload(),
            DocumentType::Invoice,
        );
        let handle = job.cancel_handle();
        handle.cancel();
        handle.cancel();
        open.send(()).unwrap();
        assert_eq!(job.wait().unwrap_err(), RelayError::Cancelled);
    }
}
