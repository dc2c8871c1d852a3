//! HTTP-boundary handlers for room creation and join checks.
//!
//! These are framework independent: the embedding HTTP server deserialises the
//! request body, calls a handler, and writes `status` plus the JSON of `body`.

use serde::{Deserialize, Serialize};

use easel_raster::Size;

use crate::registry::{RegistryError, RoomInfo, RoomRegistry};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub name: Option<String>,
    pub creator_name: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ApiBody<T> {
    Success(T),
    Failure { message: String },
}

/// A status code and the body to send with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse<T> {
    pub status: u16,
    pub body: ApiBody<T>,
}

impl<T> ApiResponse<T> {
    fn ok(status: u16, body: T) -> Self {
        Self { status, body: ApiBody::Success(body) }
    }

    fn fail(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiBody::Failure { message: message.into() },
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl<T: Serialize> ApiResponse<T> {
    /// JSON of the body only; the status travels separately.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.body)
            .unwrap_or_else(|e| format!(r#"{{"message":"serialization failed: {e}"}}"#))
    }
}

/// Empty JSON object returned by a successful join check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Empty {}

fn dimension(value: Option<i64>, field: &str) -> Result<u32, String> {
    match value {
        None => Err(format!("must provide a positive {field}")),
        Some(v) if v <= 0 => Err("width and height must be positive integers".to_string()),
        Some(v) => u32::try_from(v).map_err(|_| "width and height must be positive integers".to_string()),
    }
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(format!("must provide a {field}")),
    }
}

fn validate(request: &CreateRoomRequest) -> Result<(&str, &str, Size), String> {
    let name = required(&request.name, "name")?;
    let creator = required(&request.creator_name, "creatorName")?;
    let width = dimension(request.width, "width")?;
    let height = dimension(request.height, "height")?;
    Ok((name, creator, Size::new(width, height)))
}

pub async fn create_room(registry: &RoomRegistry, request: CreateRoomRequest) -> ApiResponse<RoomInfo> {
    let (name, creator, size) = match validate(&request) {
        Ok(parsed) => parsed,
        Err(message) => return ApiResponse::fail(400, message),
    };

    // The creator re-submitting the same room gets its credentials back.
    if let Some(room) = registry.get_room(name).await {
        if room.size() == size && room.is_moderator(creator).await {
            log::debug!("{creator:?} rejoined their room {name:?}");
            return ApiResponse::ok(
                200,
                RoomInfo {
                    room_id: room.name().to_string(),
                    moderator_secret: room.moderator_secret().to_string(),
                },
            );
        }
    }

    match registry.create_room(name, size, creator).await {
        Ok(info) => ApiResponse::ok(201, info),
        Err(RegistryError::Conflict(_)) => ApiResponse::fail(418, "room already exists"),
        Err(e @ RegistryError::Codec(_)) => {
            log::error!("Failed to create room {name:?}: {e}");
            ApiResponse::fail(500, e.to_string())
        }
        Err(e) => ApiResponse::fail(400, e.to_string()),
    }
}

pub async fn join_room(registry: &RoomRegistry, join_code: &str) -> ApiResponse<Empty> {
    let code = join_code.trim();
    if code.is_empty() {
        return ApiResponse::fail(400, "must provide a join code");
    }
    match registry.get_room(code).await {
        Some(_) => ApiResponse::ok(200, Empty {}),
        None => ApiResponse::fail(404, "that room does not exist"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::RoomConfig;
    use crate::storage::MemoryRoomStore;
    use easel_raster::PngDataUrlCodec;
    use std::sync::Arc;

    fn registry() -> RoomRegistry {
        RoomRegistry::new(
            Arc::new(MemoryRoomStore::new()),
            Arc::new(PngDataUrlCodec::default()),
            RoomConfig::default(),
        )
    }

    fn request(name: &str, creator: &str, width: i64, height: i64) -> CreateRoomRequest {
        CreateRoomRequest {
            name: Some(name.into()),
            creator_name: Some(creator.into()),
            width: Some(width),
            height: Some(height),
        }
    }

    fn message<T>(resp: &ApiResponse<T>) -> &str {
        match &resp.body {
            ApiBody::Failure { message } => message,
            ApiBody::Success(_) => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn test_create_room_created() {
        let reg = registry();
        let resp = create_room(&reg, request("lobby", "ann", 64, 48)).await;
        assert_eq!(resp.status, 201);
        assert!(resp.is_success());

        let json: serde_json::Value = serde_json::from_str(&resp.to_json()).unwrap();
        assert_eq!(json["roomId"], "lobby");
        assert_eq!(json["moderatorSecret"].as_str().unwrap().len(), 32);
        assert!(reg.get_room("lobby").await.is_some());
    }

    #[tokio::test]
    async fn test_create_room_validation_messages() {
        let reg = registry();
        let cases = [
            (CreateRoomRequest { name: None, ..request("x", "ann", 1, 1) }, "must provide a name"),
            (
                CreateRoomRequest { creator_name: Some(" ".into()), ..request("x", "ann", 1, 1) },
                "must provide a creatorName",
            ),
            (CreateRoomRequest { width: None, ..request("x", "ann", 1, 1) }, "must provide a positive width"),
            (CreateRoomRequest { height: None, ..request("x", "ann", 1, 1) }, "must provide a positive height"),
            (request("x", "ann", 0, 10), "width and height must be positive integers"),
            (request("x", "ann", 10, -3), "width and height must be positive integers"),
        ];
        for (req, expected) in cases {
            let resp = create_room(&reg, req).await;
            assert_eq!(resp.status, 400);
            assert_eq!(message(&resp), expected);
        }

        let resp = create_room(&reg, request("x", "ann", 5000, 10)).await;
        assert_eq!(resp.status, 400);
        assert_eq!(reg.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_create_room_conflict_and_rejoin() {
        let reg = registry();
        let first = create_room(&reg, request("lobby", "ann", 32, 32)).await;

        let again = create_room(&reg, request("lobby", "ann", 32, 32)).await;
        assert_eq!(again.status, 200);
        assert_eq!(again.body, first.body);

        let other = create_room(&reg, request("lobby", "bob", 32, 32)).await;
        assert_eq!(other.status, 418);
        assert_eq!(message(&other), "room already exists");
        assert_eq!(other.to_json(), r#"{"message":"room already exists"}"#);

        let resized = create_room(&reg, request("lobby", "ann", 16, 16)).await;
        assert_eq!(resized.status, 418);
    }

    #[tokio::test]
    async fn test_join_room() {
        let reg = registry();
        create_room(&reg, request("lobby", "ann", 8, 8)).await;

        let ok = join_room(&reg, "lobby").await;
        assert_eq!(ok.status, 200);
        assert_eq!(ok.to_json(), "{}");

        let missing = join_room(&reg, "nowhere").await;
        assert_eq!(missing.status, 404);
        assert_eq!(message(&missing), "that room does not exist");

        assert_eq!(join_room(&reg, "  ").await.status, 400);
    }

    #[test]
    fn test_request_deserializes_camel_case() {
        let req: CreateRoomRequest =
            serde_json::from_str(r#"{"name":"a","creatorName":"b","width":3,"height":4}"#).unwrap();
        assert_eq!(req, request("a", "b", 3, 4));
        let partial: CreateRoomRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(partial, CreateRoomRequest::default());
    }
}
