//! Dashboard request construction and launch

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::error::DashboardError;
use crate::locator::{format_id_list, track_ids_from_locator, ResourceLocators, TrackId};

/// Action the viewer registers for
pub const ACTION_DASHBOARD: &str = "Intent.OpenTracks-Dashboard";
/// Key of the ordered locator list
pub const ACTION_DASHBOARD_PAYLOAD: &str = "Intent.OpenTracks-Dashboard.Payload";
/// Extra: keep the screen on while the dashboard shows
pub const EXTRAS_SHOULD_KEEP_SCREEN_ON: &str = "EXTRAS_SHOULD_KEEP_SCREEN_ON";
/// Extra: show the dashboard over the lock screen
///
/// Viewers read this flag under the keep-screen-on key, so both preferences
/// share one wire name.
pub const EXTRAS_SHOW_WHEN_LOCKED: &str = EXTRAS_SHOULD_KEEP_SCREEN_ON;

/// Authority of the track content provider
pub const DEFAULT_AUTHORITY: &str = "de.dennisguse.opentracks";

/// Viewer preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Content authority the locators point into
    pub authority: String,
    /// Keep the screen on while the dashboard shows
    pub keep_screen_on: bool,
    /// Show the dashboard over the lock screen
    pub show_when_locked: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            authority: DEFAULT_AUTHORITY.to_string(),
            keep_screen_on: false,
            show_when_locked: false,
        }
    }
}

/// Temporary read access handed to the viewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    /// Viewer may read the locators
    pub read: bool,
    /// Viewer may modify the locators
    pub write: bool,
    /// Exactly the locators the grant covers
    pub locators: Vec<Url>,
}

impl AccessGrant {
    /// Read-only access to `locators`
    pub fn read_only(locators: Vec<Url>) -> Self {
        Self {
            read: true,
            write: false,
            locators,
        }
    }

    /// Whether the grant lets the viewer read `locator`
    pub fn allows_read(&self, locator: &Url) -> bool {
        self.read && self.locators.contains(locator)
    }

    /// Whether the grant lets the viewer modify `locator`
    pub fn allows_write(&self, locator: &Url) -> bool {
        self.write && self.locators.contains(locator)
    }
}

/// Everything the viewer receives when the dashboard is opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardRequest {
    /// Always [`ACTION_DASHBOARD`]
    pub action: String,
    /// Tracks, trackpoints and waypoints locators, in that order
    #[serde(rename = "Intent.OpenTracks-Dashboard.Payload")]
    pub payload: Vec<Url>,
    /// Value sent under [`EXTRAS_SHOULD_KEEP_SCREEN_ON`]
    ///
    /// Keep-screen-on is written first and show-when-locked second under the
    /// same key, so this carries the show-when-locked preference.
    #[serde(rename = "EXTRAS_SHOULD_KEEP_SCREEN_ON")]
    pub screen_extra: bool,
    /// Open the viewer as a new task
    pub new_task: bool,
    /// Access granted to the viewer
    pub grant: AccessGrant,
    /// Same locators, attached as data items
    pub attachments: Vec<Url>,
}

impl DashboardRequest {
    /// Track ids encoded in the request's tracks locator
    pub fn track_ids(&self) -> Result<Vec<TrackId>, DashboardError> {
        let tracks = self.payload.first().ok_or(DashboardError::MissingPayload)?;
        track_ids_from_locator(tracks)
    }

}

/// Build the request for `track_ids`
///
/// Returns `Ok(None)` when there are no tracks to show.
pub fn build_request(
    config: &DashboardConfig,
    track_ids: &[TrackId],
) -> Result<Option<DashboardRequest>, DashboardError> {
    if track_ids.is_empty() {
        debug!("No tracks to show, not building dashboard request");
        return Ok(None);
    }

    let locators = ResourceLocators::for_tracks(&config.authority, track_ids)?;
    let payload = locators.to_vec();

    if config.keep_screen_on != config.show_when_locked {
        debug!(
            "Screen preferences differ; viewer gets show-when-locked ({})",
            config.show_when_locked
        );
    }

    Ok(Some(DashboardRequest {
        action: ACTION_DASHBOARD.to_string(),
        grant: AccessGrant::read_only(payload.clone()),
        attachments: payload.clone(),
        payload,
        screen_extra: config.show_when_locked,
        new_task: true,
    }))
}

/// Starts the external viewer
pub trait ViewerLauncher {
    /// Hand `request` to the viewer
    fn launch(&self, request: &DashboardRequest) -> Result<(), DashboardError>;
}

/// Build and launch the dashboard for `track_ids`
///
/// Returns `false` without touching the launcher when `track_ids` is empty.
pub fn start_dashboard<L>(
    launcher: &L,
    config: &DashboardConfig,
    track_ids: &[TrackId],
) -> Result<bool, DashboardError>
where
    L: ViewerLauncher + ?Sized,
{
    let Some(request) = build_request(config, track_ids)? else {
        return Ok(false);
    };

    info!("Opening dashboard for tracks {}", format_id_list(track_ids));
    launcher.launch(&request)?;
    Ok(true)
}

/// Recover the track ids from a received request's extras
pub fn extract_track_ids(extras: &serde_json::Value) -> Result<Vec<TrackId>, DashboardError> {
    let first = extras
        .get(ACTION_DASHBOARD_PAYLOAD)
        .and_then(serde_json::Value::as_array)
        .and_then(|uris| uris.first())
        .and_then(serde_json::Value::as_str)
        .ok_or(DashboardError::MissingPayload)?;

    let tracks = Url::parse(first).map_err(|e| DashboardError::InvalidLocator {
        locator: first.to_string(),
        reason: e.to_string(),
    })?;
    track_ids_from_locator(&tracks)
}
