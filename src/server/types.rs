use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SaveImageRequest {
    pub filename: String,
    pub image_content: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct SaveImageResponse {
    pub image_url: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
        }
    }
}
