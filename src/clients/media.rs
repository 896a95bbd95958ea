use std::{path::Path, sync::Arc};

use futures::future::BoxFuture;

use crate::{clients::SourceAdapter, data::MediaTrackState, error::AdapterError, exec::CommandRunner};

const OSASCRIPT: &str = "osascript";

const TRACK_SCRIPT: &str = r#"
if application "Spotify" is running then
  tell application "Spotify"
    if (player state as string) is "playing" then
      set currentArtist to artist of current track as string
      set currentTrack to name of current track as string
      return "{\"artist\":\"" & currentArtist & "\",\"title\":\"" & currentTrack & "\",\"isPlaying\":true}"
    end if
  end tell
end if
return "{\"isPlaying\":false}"
"#;

const FOCUS_SCRIPT: &str = r#"tell application "Spotify" to activate"#;

/// Now-playing information from Spotify via AppleScript.
///
/// Media status is best effort: a player that is closed, paused or broken
/// all read as [`MediaTrackState::NotPlaying`].
pub struct SpotifyClient {
    runner: Arc<dyn CommandRunner>,
}
impl SpotifyClient {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn run_script(&self, script: &str) -> Result<String, AdapterError> {
        let out = self
            .runner
            .run(Path::new(OSASCRIPT), &["-e", script])
            .await
            .map_err(|err| AdapterError::ScriptError(err.to_string()))?;
        if !out.status.success() {
            return Err(AdapterError::ScriptError(
                String::from_utf8_lossy(&out.stderr).trim().to_owned(),
            ));
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_owned())
    }

    pub async fn current_track(&self) -> MediaTrackState {
        match self.try_current_track().await {
            Ok(state) => state,
            Err(err) => {
                log::debug!("Spotify state unavailable: {err}");
                MediaTrackState::NotPlaying
            }
        }
    }

    async fn try_current_track(&self) -> Result<MediaTrackState, AdapterError> {
        let raw = self.run_script(TRACK_SCRIPT).await?;
        match serde_json::from_str(&raw) {
            // A "playing" answer without both fields is not something we can show.
            Ok(MediaTrackState::Unavailable) | Err(_) => Err(AdapterError::parse(raw)),
            Ok(state) => Ok(state),
        }
    }

    pub async fn focus(&self) -> Result<(), AdapterError> {
        self.run_script(FOCUS_SCRIPT).await.map(drop)
    }
}
impl SourceAdapter for SpotifyClient {
    type Output = MediaTrackState;
    fn name(&self) -> &'static str {
        "get-spotify-track"
    }
    fn fetch(&self) -> BoxFuture<'_, Result<MediaTrackState, AdapterError>> {
        Box::pin(async move { Ok(self.current_track().await) })
    }
}
