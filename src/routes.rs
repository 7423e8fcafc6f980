use std::sync::Arc;

use bytes::Bytes;
use poem::http::{header, StatusCode};
use poem::middleware::Tracing;
use poem::web::{Data, Multipart, Path, Query};
use poem::{get, handler, post, Endpoint, EndpointExt, Request, Response, Route};
use serde::Deserialize;

use crate::controller::Controller;
use crate::error::UploadError;
use crate::response::{image_response, json_response, status_response};
use crate::upload::UploadedFile;

#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    /// The requested width, validated by the pipeline rather than here so
    /// a malformed value still ends up with the fallback image.
    w: Option<String>,
}

/// Constructs all the routes for the server.
pub fn router(controller: Arc<Controller>) -> impl Endpoint {
    Route::new()
        .at("/", get(index))
        .at("/upload", post(upload).get(upload_rejected))
        .at("/:filename", get(get_file))
        .data(controller)
        .with(Tracing)
}

#[handler]
async fn index(Data(controller): Data<&Arc<Controller>>) -> Response {
    image_response(controller.pipeline().fallback())
}

#[handler]
async fn get_file(
    Path(filename): Path<String>,
    params: poem::Result<Query<ImageQuery>>,
    Data(controller): Data<&Arc<Controller>>,
) -> Response {
    let width = match params {
        Ok(Query(params)) => params.w,
        Err(e) => {
            debug!(error = %e, "unreadable query string");
            None
        },
    };

    let served = controller
        .pipeline()
        .serve(&filename, width.as_deref())
        .await;

    image_response(served)
}

#[handler]
async fn upload(
    req: &Request,
    multipart: poem::Result<Multipart>,
    Data(controller): Data<&Arc<Controller>>,
) -> Response {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let file = match multipart {
        Ok(multipart) => match read_file_field(multipart).await {
            Ok(file) => file,
            Err(e) => {
                debug!(error = %e, "malformed multipart body");
                None
            },
        },
        Err(e) => {
            debug!(error = %e, "upload is not a multipart body");
            None
        },
    };

    match controller.admitter().admit(file, token).await {
        Ok(descriptor) => json_response(descriptor),
        Err(e @ UploadError::Storage(_)) => {
            error!(error = %e, "failed to persist upload");
            status_response(e.status())
        },
        Err(e) => {
            debug!(error = %e, "upload rejected");
            status_response(e.status())
        },
    }
}

#[handler]
async fn upload_rejected() -> Response {
    status_response(StatusCode::BAD_REQUEST)
}

/// Pulls the `file` field out of the multipart body, ignoring any others.
async fn read_file_field(mut multipart: Multipart) -> anyhow::Result<Option<UploadedFile>> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().map(ToString::to_string);
        let data = field.bytes().await?;

        return Ok(Some(UploadedFile {
            file_name,
            data: Bytes::from(data),
        }));
    }

    Ok(None)
}
