use poem::http::StatusCode;
use poem::web::Json;
use poem::{IntoResponse, Response};
use serde::Serialize;

use crate::pipelines::Served;

pub fn image_response(served: Served) -> Response {
    Response::builder()
        .status(served.status)
        .content_type(served.content_type)
        .body(served.data)
}

/// A JSON body with the content type set to application/json.
pub fn json_response<T: Serialize + Send>(data: T) -> Response {
    Json(data).into_response()
}

/// A bare status response, the body is just the status code.
pub fn status_response(status: StatusCode) -> Response {
    Response::builder()
        .status(status)
        .content_type("text/plain; charset=utf-8")
        .body(status.as_u16().to_string())
}
