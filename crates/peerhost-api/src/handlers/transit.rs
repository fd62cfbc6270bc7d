//! Transit perimeter endpoints.
//!
//! An upload is one multipart request whose sections arrive in protocol order:
//! `transferkeyheader`, `metadata`, `payload`. The key header section carries the
//! encrypted instruction set, so it is buffered and used to initialize the transfer;
//! the remaining sections are streamed straight into the perimeter.
//!
//! A dropped request (client disconnect, timeout) drops the handler future and with
//! it the [`TransferGuard`](peerhost_transit::TransferGuard), which discards the
//! transfer's temp storage.

use axum::extract::multipart::{Field, Multipart};
use axum::extract::State;
use axum::Json;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::SinkExt;
use peerhost_core::models::{
    DeleteLinkedFileRequest, EncryptedRecipientTransferInstructionSet, FilterAction,
    HostTransitResponse, MarkFileAsReadRequest, MultipartPart,
};
use peerhost_core::AppError;
use peerhost_storage::PartReader;
use peerhost_transit::TransitPerimeterService;
use std::io;
use std::sync::Arc;
use tokio_util::io::StreamReader;
use uuid::Uuid;

use crate::error::{HttpAppError, ValidatedJson};
use crate::extract::CallerIdentity;
use crate::state::AppState;

/// Chunks buffered between the multipart reader and the temp file writer.
const PART_CHANNEL_DEPTH: usize = 8;

#[tracing::instrument(skip_all, fields(sender = %sender))]
pub async fn upload(
    State(state): State<Arc<AppState>>,
    CallerIdentity(sender): CallerIdentity,
    mut multipart: Multipart,
) -> Result<Json<HostTransitResponse>, HttpAppError> {
    let perimeter = &state.perimeter;

    let field = multipart
        .next_field()
        .await?
        .ok_or_else(|| AppError::Protocol("Transfer contains no sections".to_string()))?;
    if section_kind(&field)? != MultipartPart::TransferKeyHeader {
        return Err(AppError::Protocol(format!(
            "First section must be {}",
            MultipartPart::TransferKeyHeader
        ))
        .into());
    }

    let header_bytes = read_bounded(field, state.config.transit().max_key_header_bytes).await?;
    let instruction_set: EncryptedRecipientTransferInstructionSet =
        serde_json::from_slice(&header_bytes).map_err(|e| {
            AppError::InvalidInstructionSet(format!("Transfer key header could not be parsed: {}", e))
        })?;

    let transfer_id = perimeter
        .initialize_incoming_transfer(&sender, instruction_set)
        .await?;
    let guard = perimeter.guard(transfer_id);

    if let Err(e) = feed_sections(perimeter, transfer_id, header_bytes, &mut multipart).await {
        guard.discard().await;
        return Err(e.into());
    }

    let response = guard.finalize().await?;
    tracing::info!(transfer_id = %transfer_id, code = %response.code, "Upload finished");
    Ok(Json(response))
}

/// Queue a delete of a file this sender previously delivered.
#[tracing::instrument(skip_all, fields(sender = %sender))]
pub async fn delete_linked_file(
    State(state): State<Arc<AppState>>,
    CallerIdentity(sender): CallerIdentity,
    ValidatedJson(request): ValidatedJson<DeleteLinkedFileRequest>,
) -> Json<HostTransitResponse> {
    Json(
        state
            .perimeter
            .accept_delete_linked_file_request(&sender, request)
            .await,
    )
}

/// Queue a read receipt for a file this host sent to the caller.
#[tracing::instrument(skip_all, fields(sender = %sender))]
pub async fn mark_file_as_read(
    State(state): State<Arc<AppState>>,
    CallerIdentity(sender): CallerIdentity,
    ValidatedJson(request): ValidatedJson<MarkFileAsReadRequest>,
) -> Json<HostTransitResponse> {
    Json(
        state
            .perimeter
            .accept_mark_file_as_read_request(&sender, request)
            .await,
    )
}

fn section_kind(field: &Field<'_>) -> Result<MultipartPart, AppError> {
    let name = field
        .name()
        .ok_or_else(|| AppError::Protocol("Multipart section without a name".to_string()))?;
    name.parse()
        .map_err(|e: anyhow::Error| AppError::Protocol(e.to_string()))
}

/// Apply the key header, then stream the remaining sections in arrival order.
async fn feed_sections(
    perimeter: &TransitPerimeterService,
    transfer_id: Uuid,
    header_bytes: Bytes,
    multipart: &mut Multipart,
) -> Result<(), AppError> {
    let mut action = perimeter
        .apply_first_stage_filtering(
            transfer_id,
            MultipartPart::TransferKeyHeader,
            Box::pin(io::Cursor::new(header_bytes.to_vec())),
        )
        .await?;

    // A rejected transfer stops here; the remaining sections are never read.
    while action != FilterAction::Reject {
        let Some(field) = multipart.next_field().await.map_err(interrupted)? else {
            break;
        };
        let part = section_kind(&field)?;
        action = stream_part(perimeter, transfer_id, part, field).await?;
    }
    Ok(())
}

async fn read_bounded(mut field: Field<'_>, max_bytes: u64) -> Result<Bytes, AppError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(interrupted)? {
        if (buf.len() + chunk.len()) as u64 > max_bytes {
            return Err(AppError::InvalidInstructionSet(format!(
                "Transfer key header exceeds {} bytes",
                max_bytes
            )));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}

/// Feed one section into the perimeter while it is still arriving.
async fn stream_part(
    perimeter: &TransitPerimeterService,
    transfer_id: Uuid,
    part: MultipartPart,
    field: Field<'_>,
) -> Result<FilterAction, AppError> {
    let (tx, rx) = mpsc::channel::<Result<Bytes, io::Error>>(PART_CHANNEL_DEPTH);
    let reader: PartReader = Box::pin(StreamReader::new(rx));

    let (pumped, filtered) = tokio::join!(
        pump_field(field, tx),
        perimeter.apply_first_stage_filtering(transfer_id, part, reader)
    );

    let action = filtered?;
    pumped?;
    Ok(action)
}

async fn pump_field(
    mut field: Field<'_>,
    mut tx: mpsc::Sender<Result<Bytes, io::Error>>,
) -> Result<(), AppError> {
    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                // The perimeter stopped reading; its result explains why.
                if tx.send(Ok(chunk)).await.is_err() {
                    return Ok(());
                }
            }
            Ok(None) => return Ok(()),
            Err(e) => {
                let err = interrupted(e);
                // A truncated section must not look like a complete one to the reader.
                let _ = tx
                    .send(Err(io::Error::new(io::ErrorKind::UnexpectedEof, err.to_string())))
                    .await;
                return Err(err);
            }
        }
    }
}

fn interrupted(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::Protocol(format!("Multipart section interrupted: {}", err.body_text()))
}
