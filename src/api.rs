//! HTTP binding for the image store
//!
//! A thin actix-web layer: image ids in the URL are mapped to store locations,
//! store calls and image reads run on the blocking pool, and `StoreError`
//! becomes the response status through its `ResponseError` impl.

use actix_web::error::ErrorInternalServerError;
use actix_web::{web, Error, HttpResponse};
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use log::{debug, warn};
use serde::Serialize;
use std::io::{self, Cursor};

use crate::app_state::AppState;
use crate::error::StoreError;
use crate::location::Location;
use crate::metadata::MetadataDocument;
use crate::storage::{AddResult, ChunkStream};

/// Header carrying the size of an image on HEAD requests
pub const IMAGE_SIZE_HEADER: &str = "x-image-size";

/// Header carrying the store metadata document as JSON
pub const IMAGE_METADATA_HEADER: &str = "x-image-metadata";

/// MDC key read by the `{X(image_id)}` pattern in `server_log.yaml`
pub const IMAGE_ID_KEY: &str = "image_id";

/// Body returned after a successful upload
#[derive(Debug, Serialize)]
pub struct AddResponse {
    pub location: String,
    pub size: u64,
    pub checksum: String,
    pub metadata: MetadataDocument,
}

impl From<AddResult> for AddResponse {
    fn from(result: AddResult) -> Self {
        Self {
            location: result.location,
            size: result.bytes_written,
            checksum: result.checksum,
            metadata: result.metadata,
        }
    }
}

/// Register the image routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/images/{id}", web::put().to(put_image))
        .route("/images/{id}", web::get().to(get_image))
        .route("/images/{id}", web::head().to(head_image))
        .route("/images/{id}", web::delete().to(delete_image));
}

/// Image ids become file names, so they must stay a single path component.
fn validate_image_id(image_id: &str) -> Result<(), StoreError> {
    let invalid = image_id.trim().is_empty()
        || image_id == "."
        || image_id == ".."
        || image_id.contains(|c: char| c == '/' || c == '\\' || c == '\0');
    if invalid {
        return Err(StoreError::InvalidLocation(format!("invalid image id: {:?}", image_id)));
    }
    Ok(())
}

/// Tags log lines on the current thread with an image id until dropped.
///
/// The key is removed rather than restored on drop, so requests that
/// interleave on one worker never leave each other's id behind.
struct ImageLogContext;

impl ImageLogContext {
    fn enter(image_id: &str) -> Self {
        log_mdc::insert(IMAGE_ID_KEY, image_id);
        ImageLogContext
    }
}

impl Drop for ImageLogContext {
    fn drop(&mut self) {
        log_mdc::remove(IMAGE_ID_KEY);
    }
}

/// Resolve the store location for the id in the request path.
fn image_location(app_state: &AppState, image_id: &str) -> Result<Location, StoreError> {
    validate_image_id(image_id)?;
    app_state.store.location_for(image_id)
}

/// Run a blocking store call off the async workers, logging under `image_id`.
async fn blocking<T, F>(image_id: String, f: F) -> Result<T, Error>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(move || {
        let _log_context = ImageLogContext::enter(&image_id);
        f()
    })
    .await
    .map_err(ErrorInternalServerError)?;
    Ok(result?)
}

/// Pull image chunks on the blocking pool, one file read per step.
fn blocking_chunks(chunks: ChunkStream) -> impl Stream<Item = io::Result<Bytes>> {
    futures::stream::unfold(Some(chunks), |state| async move {
        let mut chunks: ChunkStream = match state {
            Some(chunks) => chunks,
            None => return None,
        };
        let step = tokio::task::spawn_blocking(move || {
            let next = chunks.next();
            (next, chunks)
        })
        .await;
        match step {
            Ok((Some(chunk), chunks)) => Some((chunk, Some(chunks))),
            Ok((None, _)) => None,
            Err(e) => Some((Err(io::Error::new(io::ErrorKind::Other, e)), None)),
        }
    })
}

fn metadata_header(metadata: &MetadataDocument) -> Option<String> {
    if metadata.is_empty() {
        return None;
    }
    // Header values have to stay ASCII.
    serde_json::to_string(metadata).ok().filter(|json| json.is_ascii())
}

pub async fn put_image(
    path: web::Path<String>,
    mut payload: web::Payload,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let image_id = path.into_inner();
    validate_image_id(&image_id)?;
    let _log_context = ImageLogContext::enter(&image_id);

    let mut body = BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| {
            warn!("Error reading payload chunk for image {}: {}", image_id, e);
            ErrorInternalServerError("Error reading payload")
        })?;
        body.extend_from_slice(&chunk);
    }
    debug!("PUT image {} with {} bytes", image_id, body.len());

    let store = app_state.store.clone();
    let image_size = body.len() as u64;
    let result = blocking(image_id.clone(), move || {
        let mut reader = Cursor::new(body.freeze());
        store.add(&image_id, &mut reader, image_size)
    })
    .await?;

    Ok(HttpResponse::Created().json(AddResponse::from(result)))
}

pub async fn get_image(
    path: web::Path<String>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let image_id = path.into_inner();
    let location = image_location(&app_state, &image_id)?;
    let _log_context = ImageLogContext::enter(&image_id);
    debug!("GET image at {}", location);

    let store = app_state.store.clone();
    let image = blocking(image_id, move || store.get(&location)).await?;

    let mut response = HttpResponse::Ok();
    response.content_type("application/octet-stream");
    if let Some(metadata) = metadata_header(&image.metadata) {
        response.insert_header((IMAGE_METADATA_HEADER, metadata));
    }
    Ok(response
        .no_chunking(image.size)
        .streaming(blocking_chunks(image.chunks)))
}

pub async fn head_image(
    path: web::Path<String>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let image_id = path.into_inner();
    let location = image_location(&app_state, &image_id)?;
    let _log_context = ImageLogContext::enter(&image_id);
    debug!("HEAD image at {}", location);

    let store = app_state.store.clone();
    let size = blocking(image_id, move || store.get_size(&location)).await?;

    // A sized empty stream keeps Content-Length at the image size; the
    // encoder sends no body for HEAD.
    Ok(HttpResponse::Ok()
        .insert_header((IMAGE_SIZE_HEADER, size.to_string()))
        .no_chunking(size)
        .streaming(futures::stream::empty::<io::Result<Bytes>>()))
}

pub async fn delete_image(
    path: web::Path<String>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let image_id = path.into_inner();
    let location = image_location(&app_state, &image_id)?;
    let _log_context = ImageLogContext::enter(&image_id);
    debug!("DELETE image at {}", location);

    let store = app_state.store.clone();
    blocking(image_id, move || store.delete(&location)).await?;

    Ok(HttpResponse::NoContent().finish())
}
