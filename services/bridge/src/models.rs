//! Request and response bodies for the bridge endpoint, with their OpenAPI schemas.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Text for the robot to say.
#[derive(Deserialize, ToSchema, Debug)]
pub struct SpeakPayload {
    #[schema(example = "Hello, I am your robot")]
    pub text: String,
}

/// Acknowledges that speech was handed off. Delivery itself is not awaited.
#[derive(Serialize, Deserialize, ToSchema, Debug, PartialEq)]
pub struct SpeakResponse {
    pub success: bool,
}

/// Reply to a preflight probe.
#[derive(Serialize, Deserialize, ToSchema, Debug, PartialEq)]
pub struct StatusResponse {
    #[schema(example = "ok")]
    pub status: String,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}
