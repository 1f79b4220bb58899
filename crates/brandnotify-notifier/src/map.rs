//! Location map attachment: one slippy-map tile around the report point.
//!
//! The zoom is the highest level at which a 1 km box centred on the report
//! fits within [`MAX_TILES`] tiles, so the tile shows the immediate
//! neighbourhood without being a single street corner.

use std::f64::consts::PI;
use std::time::Duration;

use reqwest::Client;

use crate::error::SendError;

pub const MAX_TILES: u32 = 16;
pub const MAX_ZOOM: u8 = 19;

const KM_PER_DEGREE: f64 = 111.32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCoord {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

/// Web-mercator tile containing `(lat, lon)` at `zoom`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn lat_lon_to_tile(lat: f64, lon: f64, zoom: u8) -> (u32, u32) {
    let n = f64::from(1u32 << zoom);
    let lat_rad = lat.clamp(-85.051_128, 85.051_128).to_radians();

    let x = ((lon + 180.0) / 360.0 * n).floor();
    let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n).floor();

    let max = n - 1.0;
    (x.clamp(0.0, max) as u32, y.clamp(0.0, max) as u32)
}

/// Highest zoom at which a 1 km box around the point spans at most [`MAX_TILES`] tiles.
#[must_use]
pub fn zoom_for_1km_box(lat: f64, lon: f64) -> u8 {
    let lat_degrees = 1.0 / KM_PER_DEGREE;
    let lon_degrees = 1.0 / (KM_PER_DEGREE * lat.to_radians().cos().abs().max(1e-6));
    let half = lat_degrees.max(lon_degrees) / 2.0;

    for zoom in (1..=MAX_ZOOM).rev() {
        let (x_min, y_max) = lat_lon_to_tile(lat - half, lon - half, zoom);
        let (x_max, y_min) = lat_lon_to_tile(lat + half, lon + half, zoom);
        let tiles = (x_max - x_min + 1) * (y_max - y_min + 1);
        if tiles <= MAX_TILES {
            return zoom;
        }
    }
    1
}

#[must_use]
pub fn tile_for_point(lat: f64, lon: f64) -> TileCoord {
    let zoom = zoom_for_1km_box(lat, lon);
    let (x, y) = lat_lon_to_tile(lat, lon, zoom);
    TileCoord { zoom, x, y }
}

/// Fetches map tiles from an OSM-compatible tile server.
#[derive(Debug, Clone)]
pub struct MapRenderer {
    client: Client,
    base_url: String,
}

impl MapRenderer {
    /// # Errors
    ///
    /// Returns [`SendError::Permanent`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SendError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("CleanApp/2.0")
            .build()
            .map_err(|e| SendError::Permanent(format!("map client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn tile_url(&self, tile: TileCoord) -> String {
        format!("{}/{}/{}/{}.png", self.base_url, tile.zoom, tile.x, tile.y)
    }

    /// PNG bytes of the tile containing the report point.
    ///
    /// # Errors
    ///
    /// [`SendError::Transient`] for network failures and 5xx/429 responses,
    /// [`SendError::Permanent`] for other non-2xx responses.
    pub async fn render(&self, lat: f64, lon: f64) -> Result<Vec<u8>, SendError> {
        let url = self.tile_url(tile_for_point(lat, lon));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SendError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::from_status(status, &body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SendError::from_reqwest(&e))?;
        Ok(bytes.to_vec())
    }
}
