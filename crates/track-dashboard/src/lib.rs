//! Companion Dashboard Hand-off
//!
//! Opens recorded tracks in an external dashboard viewer. The viewer gets an
//! ordered list of three content locators (tracks, track points, waypoints
//! for the same ids), display preferences, and read-only access scoped to
//! exactly those locators.
//!
//! # Example
//!
//! ```rust
//! use track_dashboard::{build_request, extract_track_ids, DashboardConfig, TrackId};
//!
//! let request = build_request(&DashboardConfig::default(), &[TrackId(4), TrackId(2)])
//!     .unwrap()
//!     .expect("non-empty id list");
//! assert_eq!(
//!     request.payload[0].as_str(),
//!     "content://de.dennisguse.opentracks/tracks/4,2"
//! );
//!
//! // The receiving side reads the ids back
//! let extras = serde_json::to_value(&request).unwrap();
//! let ids = extract_track_ids(&extras).unwrap();
//! assert_eq!(ids, vec![TrackId(4), TrackId(2)]);
//! ```

pub mod error;
pub mod locator;
pub mod request;

pub use error::DashboardError;
pub use locator::{
    format_id_list, parse_id_list, track_ids_from_locator, ResourceLocators, TrackId,
};
pub use request::{
    build_request, extract_track_ids, start_dashboard, AccessGrant, DashboardConfig,
    DashboardRequest, ViewerLauncher, ACTION_DASHBOARD, ACTION_DASHBOARD_PAYLOAD,
    DEFAULT_AUTHORITY, EXTRAS_SHOULD_KEEP_SCREEN_ON, EXTRAS_SHOW_WHEN_LOCKED,
};
