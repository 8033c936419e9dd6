//! Image upload and serving handlers.

use crate::error::{ApiError, ApiResult};
use crate::response::{Envelope, ExistingImage, PartHeaders, UploadedImage};
use crate::state::AppState;
use crate::upload::{Upload, UploadOutcome};
use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::PathRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use picstore_core::{Scope, UPLOAD_FIELD, object_key};
use picstore_storage::StorageError;

/// POST /upload - Store an image in the default scope.
pub async fn upload_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Response> {
    handle_upload(&state, None, multipart?).await
}

/// POST /upload/{scope} - Store an image in `scope`.
pub async fn upload_scoped_image(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Response> {
    let Path(scope) = path?;
    handle_upload(&state, Some(scope), multipart?).await
}

async fn handle_upload(
    state: &AppState,
    scope: Option<String>,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let upload = read_image_field(&mut multipart, scope).await?;
    let outcome = state.uploads.handle(upload).await?;

    let response = match outcome {
        UploadOutcome::Created {
            image,
            url,
            size,
            headers,
        } => Envelope::new(
            StatusCode::CREATED,
            "Image uploaded successfully",
            Some(UploadedImage {
                image_name: image.stored_name,
                image_url: url,
                header: headers,
                size,
            }),
        )
        .into_response(),
        UploadOutcome::AlreadyExists { url, .. } => {
            Envelope::ok("Image already exists", ExistingImage { image_url: url }).into_response()
        }
    };
    Ok(response)
}

/// Buffer the `image` file part. Other parts are skipped.
async fn read_image_field(multipart: &mut Multipart, scope: Option<String>) -> ApiResult<Upload> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(str::to_string).ok_or_else(|| {
            ApiError::BadRequest(format!("form field {UPLOAD_FIELD:?} must be a file"))
        })?;
        let content_type = field.content_type().map(str::to_string);
        let headers = collect_headers(field.headers());
        let data = field.bytes().await?;

        return Ok(Upload {
            scope,
            file_name,
            content_type,
            headers,
            data,
        });
    }

    Err(ApiError::BadRequest(format!("missing form field {UPLOAD_FIELD:?}")))
}

/// Group header values by their lowercase name.
pub(crate) fn collect_headers(headers: &HeaderMap) -> PartHeaders {
    let mut out = PartHeaders::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            out.entry(name.as_str().to_string())
                .or_default()
                .push(value.to_string());
        }
    }
    out
}

/// GET /images/{scope}/{file} - Stream a stored image.
pub async fn get_image(
    State(state): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
) -> ApiResult<Response> {
    let Path((scope, file)) = path?;
    let scope = Scope::parse(&scope)?;
    if file.is_empty() || file == "." || file == ".." || file.contains(['/', '\\']) {
        return Err(ApiError::BadRequest(format!("invalid file name: {file:?}")));
    }

    let key = object_key(&scope, &file);
    let meta = match state.storage.head(&key).await {
        Ok(meta) => meta,
        Err(StorageError::NotFound(_)) => {
            return Err(ApiError::NotFound(format!("image not found: {key}")));
        }
        Err(e) => return Err(e.into()),
    };

    let stream = state.storage.get_stream(&key).await?;
    let body_stream =
        stream.map(|result| result.map_err(|e| std::io::Error::other(e.to_string())));
    let content_type = mime_guess::from_path(&file).first_or_octet_stream();

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, content_type.essence_str().to_string()),
            (CONTENT_LENGTH, meta.size.to_string()),
        ],
        Body::from_stream(body_stream),
    )
        .into_response())
}

/// Fallback for unmatched routes.
pub async fn not_found() -> ApiError {
    ApiError::NotFound("route not found".to_string())
}

/// Fallback for known routes hit with the wrong method.
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}
