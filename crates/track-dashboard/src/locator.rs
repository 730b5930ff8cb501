//! Content locators for tracks, track points and waypoints

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::DashboardError;

/// Scheme of the content locators handed to the viewer
pub const CONTENT_SCHEME: &str = "content";

/// Path of the tracks collection
pub const TRACKS_PATH: &str = "tracks";
/// Path of track points, addressed by track id
pub const TRACKPOINTS_PATH: &str = "trackpoints/trackid";
/// Path of waypoints, addressed by track id
pub const WAYPOINTS_PATH: &str = "waypoints/trackid";

/// Identifier of a recorded track
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub i64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TrackId {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(TrackId)
            .map_err(|_| DashboardError::BadTrackId(s.to_string()))
    }
}

impl From<i64> for TrackId {
    fn from(id: i64) -> Self {
        TrackId(id)
    }
}

/// Join ids into the comma-separated form used in locator paths
pub fn format_id_list(ids: &[TrackId]) -> String {
    ids.iter()
        .map(TrackId::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a comma-separated id list
pub fn parse_id_list(list: &str) -> Result<Vec<TrackId>, DashboardError> {
    list.split(',').map(str::parse).collect()
}

/// The three locators granted to the viewer, in payload order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLocators {
    /// `content://{authority}/tracks/{ids}`
    pub tracks: Url,
    /// `content://{authority}/trackpoints/trackid/{ids}`
    pub trackpoints: Url,
    /// `content://{authority}/waypoints/trackid/{ids}`
    pub waypoints: Url,
}

impl ResourceLocators {
    /// Build the locators for `ids` under `authority`
    pub fn for_tracks(authority: &str, ids: &[TrackId]) -> Result<Self, DashboardError> {
        let authority = authority.trim();
        if authority.is_empty() || authority.contains(['/', '?', '#', ' ']) {
            return Err(DashboardError::InvalidAuthority(authority.to_string()));
        }

        let list = format_id_list(ids);
        Ok(Self {
            tracks: locator(authority, TRACKS_PATH, &list)?,
            trackpoints: locator(authority, TRACKPOINTS_PATH, &list)?,
            waypoints: locator(authority, WAYPOINTS_PATH, &list)?,
        })
    }

    /// Locators as an ordered list: tracks, trackpoints, waypoints
    pub fn to_vec(&self) -> Vec<Url> {
        vec![
            self.tracks.clone(),
            self.trackpoints.clone(),
            self.waypoints.clone(),
        ]
    }
}

fn locator(authority: &str, path: &str, list: &str) -> Result<Url, DashboardError> {
    let text = format!("{}://{}/{}/{}", CONTENT_SCHEME, authority, path, list);
    Url::parse(&text).map_err(|e| DashboardError::InvalidLocator {
        locator: text.clone(),
        reason: e.to_string(),
    })
}

/// Read the track ids back from a tracks locator's last path segment
pub fn track_ids_from_locator(locator: &Url) -> Result<Vec<TrackId>, DashboardError> {
    let invalid = |reason: &str| DashboardError::InvalidLocator {
        locator: locator.to_string(),
        reason: reason.to_string(),
    };

    let last = locator
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| invalid("no id segment"))?;
    parse_id_list(last)
}
