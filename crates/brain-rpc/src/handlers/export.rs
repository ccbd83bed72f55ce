//! Snapshot download endpoint.

use crate::server::AppState;
use axum::{
    body::Body,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Chunks buffered between the export thread and the response body.
const EXPORT_CHANNEL_DEPTH: usize = 16;

#[derive(Debug, Default, Deserialize)]
pub struct ExportParams {
    #[serde(default)]
    pub gzip: bool,
}

/// `GET /export[?gzip=true]`: stream the raw backing file.
pub async fn handle_export(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ExportParams>,
) -> Response {
    let compress = params.gzip;
    let (tx, rx) = mpsc::channel::<io::Result<Vec<u8>>>(EXPORT_CHANNEL_DEPTH);

    tokio::task::spawn_blocking(move || {
        let writer = ChannelWriter { tx: tx.clone() };
        match state.brain.database().export_snapshot(writer, compress) {
            Ok(bytes) => info!("Streamed {} byte snapshot", bytes),
            Err(e) => {
                error!("Snapshot export failed: {}", e);
                let _ = tx.blocking_send(Err(io::Error::other(e.to_string())));
            }
        }
    });

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });

    let (content_type, filename) = if compress {
        ("application/gzip", "brain.sqlite.gz")
    } else {
        ("application/octet-stream", "brain.sqlite")
    };

    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

/// Forwards written bytes to the response body.
struct ChannelWriter {
    tx: mpsc::Sender<io::Result<Vec<u8>>>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .blocking_send(Ok(buf.to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "export client went away"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
