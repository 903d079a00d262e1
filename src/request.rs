//! The request record and command taxonomy the idle loop dispatches on.
//!
//! This sits between the wire-level `http::jsonrpc::Request` (what
//! `serde` decodes an HTTP body into) and the idle loop: it is what
//! actually travels through the API queue (C2), carrying
//! `connection-id`, `request-id`, `method`, `command`, `partition` and
//! `body`.
use serde_json::Value;

/// `connection-id == -1` marks an internally generated request (a timer
/// or trigger firing one), `-2` a script callback (out of this core's
/// scope, named here only so the discriminant exists).
pub const CONNECTION_ID_INTERNAL: i64 = -1;
pub const CONNECTION_ID_SCRIPT: i64 = -2;

/// The handful of JSON-RPC methods this core implements end to end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCommand {
    PlayerPlay,
    PlayerPause,
    PlayerStop,
    PlayerNext,
    PlayerPrev,
    PlayerState,
    QueueList,
    QueueClear,
    DatabaseAlbumList,
    DatabaseAlbumDetail,
    SessionLogin,
    SessionLogout,
    SessionValidate,
    SmartplsUpdateAll,
    CachesCreate,
    AlbumArtByUri,
    Unknown(String),
}

impl ApiCommand {
    pub fn from_method(method: &str) -> Self {
        match method {
            "MYMPD_API_PLAYER_PLAY" => ApiCommand::PlayerPlay,
            "MYMPD_API_PLAYER_PAUSE" => ApiCommand::PlayerPause,
            "MYMPD_API_PLAYER_STOP" => ApiCommand::PlayerStop,
            "MYMPD_API_PLAYER_NEXT" => ApiCommand::PlayerNext,
            "MYMPD_API_PLAYER_PREV" => ApiCommand::PlayerPrev,
            "MYMPD_API_PLAYER_STATE" => ApiCommand::PlayerState,
            "MYMPD_API_QUEUE_LIST" => ApiCommand::QueueList,
            "MYMPD_API_QUEUE_CLEAR" => ApiCommand::QueueClear,
            "MYMPD_API_DATABASE_ALBUM_LIST" => ApiCommand::DatabaseAlbumList,
            "MYMPD_API_DATABASE_ALBUM_DETAIL" => ApiCommand::DatabaseAlbumDetail,
            "MYMPD_API_SESSION_LOGIN" => ApiCommand::SessionLogin,
            "MYMPD_API_SESSION_LOGOUT" => ApiCommand::SessionLogout,
            "MYMPD_API_SESSION_VALIDATE" => ApiCommand::SessionValidate,
            "MYMPD_API_SMARTPLS_UPDATE_ALL" => ApiCommand::SmartplsUpdateAll,
            "MYMPD_API_CACHES_CREATE" => ApiCommand::CachesCreate,
            "MYMPD_API_ALBUMART_BY_URI" => ApiCommand::AlbumArtByUri,
            other => ApiCommand::Unknown(other.to_owned()),
        }
    }

    /// Commands dispatched to a detached worker (C9) instead of handled
    /// inline on the idle-loop thread.
    pub fn is_long(&self) -> bool {
        matches!(self, ApiCommand::SmartplsUpdateAll | ApiCommand::CachesCreate)
    }

    /// Commands serviceable while MPD is disconnected or in WAIT
    ///.
    pub fn is_mpd_independent(&self) -> bool {
        matches!(
            self,
            ApiCommand::SessionLogin | ApiCommand::SessionLogout | ApiCommand::SessionValidate
        )
    }
}

/// A request record, queued on the API queue between the HTTP frontend
/// and the idle loop.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub connection_id: i64,
    pub request_id: i64,
    pub method: String,
    pub command: ApiCommand,
    pub partition: String,
    pub body: Value,
}

impl ApiRequest {
    pub fn new(connection_id: i64, request_id: i64, method: String, body: Value) -> Self {
        let command = ApiCommand::from_method(&method);
        ApiRequest {
            connection_id,
            request_id,
            method,
            command,
            partition: "default".to_owned(),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_commands_classified() {
        assert!(ApiCommand::CachesCreate.is_long());
        assert!(ApiCommand::SmartplsUpdateAll.is_long());
        assert!(!ApiCommand::PlayerPlay.is_long());
    }

    #[test]
    fn mpd_independent_commands_classified() {
        assert!(ApiCommand::SessionLogin.is_mpd_independent());
        assert!(!ApiCommand::PlayerPlay.is_mpd_independent());
    }

    #[test]
    fn albumart_by_uri_is_sync_and_mpd_dependent() {
        let cmd = ApiCommand::from_method("MYMPD_API_ALBUMART_BY_URI");
        assert_eq!(cmd, ApiCommand::AlbumArtByUri);
        assert!(!cmd.is_long());
        assert!(!cmd.is_mpd_independent());
    }

    #[test]
    fn unknown_method_preserved() {
        let cmd = ApiCommand::from_method("MYMPD_API_BOGUS");
        assert_eq!(cmd, ApiCommand::Unknown("MYMPD_API_BOGUS".to_owned()));
    }
}
