use axum::{extract::Multipart, response::Json, routing::post, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/upload-image", post(upload_image))
}

const IMGBB_UPLOAD_URL: &str = "https://api.imgbb.com/1/upload";

#[derive(Debug, Deserialize)]
struct ImgbbResponse {
    data: Option<ImgbbData>,
    success: bool,
}

#[derive(Debug, Deserialize)]
struct ImgbbData {
    url: String,
}

/// POST /upload-image - Forward a multipart image to the hosting provider and
/// return the hosted URL. The API key never leaves the server.
async fn upload_image(mut multipart: Multipart) -> Result<Json<Value>, AppError> {
    let api_key = std::env::var("IMGBB_API_KEY")
        .map_err(|_| AppError::Upstream("image host is not configured".to_string()))?;

    let mut image: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        if field.name() == Some("image") {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("failed to read upload: {e}")))?;
            image = Some((file_name, bytes.to_vec()));
            break;
        }
    }

    let (file_name, bytes) = image
        .ok_or_else(|| AppError::BadRequest("missing 'image' field".to_string()))?;

    if bytes.is_empty() {
        return Err(AppError::BadRequest("uploaded image is empty".to_string()));
    }

    let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
    let form = reqwest::multipart::Form::new().part("image", part);

    let client = reqwest::Client::new();
    let response = client
        .post(IMGBB_UPLOAD_URL)
        .query(&[("key", api_key.as_str())])
        .multipart(form)
        .send()
        .await
        .map_err(|e| AppError::Upstream(format!("image host unreachable: {e}")))?;

    if !response.status().is_success() {
        return Err(AppError::Upstream("image upload failed".to_string()));
    }

    let body: ImgbbResponse = response
        .json()
        .await
        .map_err(|e| AppError::Upstream(format!("invalid image host response: {e}")))?;

    match body.data {
        Some(data) if body.success => Ok(Json(json!({ "url": data.url }))),
        _ => Err(AppError::Upstream("image upload failed".to_string())),
    }
}
