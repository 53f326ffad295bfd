//! Camera targets for flying the map viewer to a search result.
//!
//! The renderer itself lives outside this crate; it is reached through the
//! [`MapViewer`] trait and only ever receives a fully computed [`CameraView`].
//! Terrain sampling is likewise external ([`TerrainSampler`]) and strictly
//! best-effort: a failed or slow sample downgrades the view to ground level
//! instead of failing the navigation.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{debug, warn};

/// Default view distance between the camera and its target, in meters.
pub const DEFAULT_MIN_VIEW_DISTANCE: f64 = 100.0;

/// Default pitch in degrees below the horizon. Straight down, so small
/// features are not occluded by taller neighbors.
pub const DEFAULT_PITCH_DEGREES: f64 = 90.0;

/// Default flight duration submitted alongside a camera view.
pub const DEFAULT_FLIGHT_DURATION: Duration = Duration::from_secs(2);

/// Default budget for a terrain-height sample before falling back to the
/// ground-level view.
pub const DEFAULT_TERRAIN_TIMEOUT: Duration = Duration::from_secs(3);

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLon {
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Knobs for camera-view construction.
#[derive(Debug, Clone, Copy)]
pub struct CameraOptions {
    /// Minimum distance kept between the camera and the target, in meters.
    pub min_view_distance: f64,
    /// Height of the feature being flown to, added on top of sampled terrain.
    pub feature_height: f64,
    /// Compass heading in degrees.
    pub heading_degrees: f64,
    /// Degrees below the horizon.
    pub pitch_degrees: f64,
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            min_view_distance: DEFAULT_MIN_VIEW_DISTANCE,
            feature_height: 0.0,
            heading_degrees: 0.0,
            pitch_degrees: DEFAULT_PITCH_DEGREES,
        }
    }
}

/// A computed navigation target for the external renderer.
///
/// Built fresh for every navigation request and never cached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    pub target: LatLon,
    /// Target height above the ellipsoid, in meters. Ground level when no
    /// terrain sample is available.
    pub height: f64,
    pub heading_degrees: f64,
    pub pitch_degrees: f64,
    /// Distance from the camera to the target, in meters.
    pub range: f64,
}

impl CameraView {
    /// A ground-level, top-down view of a coordinate with default options.
    #[must_use]
    pub fn from_lat_lon(latitude: f64, longitude: f64) -> Self {
        build_camera_view(LatLon::new(latitude, longitude), None, &CameraOptions::default())
    }
}

/// Compute the camera view for a coordinate.
///
/// With a terrain sample the target height is raised to
/// `terrain + feature height + minimum view distance` so the camera clears
/// the surface; without one the target stays at ground level and only the
/// minimum view distance separates camera and target.
#[must_use]
pub fn build_camera_view(
    target: LatLon,
    terrain_height: Option<f64>,
    options: &CameraOptions,
) -> CameraView {
    let height = terrain_height
        .map_or(0.0, |terrain| {
            terrain + options.feature_height + options.min_view_distance
        });
    CameraView {
        target,
        height,
        heading_degrees: options.heading_degrees,
        pitch_degrees: options.pitch_degrees,
        range: options.min_view_distance,
    }
}

#[derive(Error, Debug)]
#[error("terrain sampling failed: {0}")]
pub struct TerrainError(pub String);

/// External terrain-height service.
///
/// `sample_height` returns the surface elevation at a coordinate, in meters.
pub trait TerrainSampler: Send + Sync {
    fn sample_height(&self, target: LatLon) -> BoxFuture<'_, Result<f64, TerrainError>>;
}

/// External renderer entry point for camera flights.
pub trait MapViewer: Send + Sync {
    fn zoom_to(&self, view: &CameraView, flight_duration: Duration);
}

/// Everything a search result needs to replay its camera move.
///
/// Immutable once constructed; results share it by [`Arc`] and carry no
/// reference back to provider state.
pub struct NavigationContext {
    viewer: Arc<dyn MapViewer>,
    terrain: Option<Arc<dyn TerrainSampler>>,
    camera: CameraOptions,
    terrain_timeout: Duration,
    flight_duration: Duration,
}

impl NavigationContext {
    pub(crate) fn new(
        viewer: Arc<dyn MapViewer>,
        terrain: Option<Arc<dyn TerrainSampler>>,
        camera: CameraOptions,
        terrain_timeout: Duration,
        flight_duration: Duration,
    ) -> Self {
        Self {
            viewer,
            terrain,
            camera,
            terrain_timeout,
            flight_duration,
        }
    }

    /// Fly the viewer to `target`.
    ///
    /// Samples terrain height when a sampler is configured; a sampling error
    /// or timeout falls back to the ground-level view.
    pub async fn navigate_to(&self, target: LatLon) {
        let terrain_height = match &self.terrain {
            Some(sampler) => {
                match tokio::time::timeout(self.terrain_timeout, sampler.sample_height(target))
                    .await
                {
                    Ok(Ok(height)) => Some(height),
                    Ok(Err(error)) => {
                        warn!(%error, "terrain sampling failed, using ground-level view");
                        None
                    }
                    Err(_) => {
                        warn!(
                            timeout_ms = self.terrain_timeout.as_millis() as u64,
                            "terrain sampling timed out, using ground-level view"
                        );
                        None
                    }
                }
            }
            None => None,
        };
        let view = build_camera_view(target, terrain_height, &self.camera);
        debug!(
            latitude = target.latitude,
            longitude = target.longitude,
            height = view.height,
            "submitting camera flight"
        );
        self.viewer.zoom_to(&view, self.flight_duration);
    }
}

impl std::fmt::Debug for NavigationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationContext")
            .field("camera", &self.camera)
            .field("has_terrain_sampler", &self.terrain.is_some())
            .field("terrain_timeout", &self.terrain_timeout)
            .field("flight_duration", &self.flight_duration)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingViewer {
        flights: Mutex<Vec<(CameraView, Duration)>>,
    }

    impl MapViewer for RecordingViewer {
        fn zoom_to(&self, view: &CameraView, flight_duration: Duration) {
            self.flights
                .lock()
                .expect("flights lock")
                .push((*view, flight_duration));
        }
    }

    struct FixedTerrain(f64);

    impl TerrainSampler for FixedTerrain {
        fn sample_height(&self, _target: LatLon) -> BoxFuture<'_, Result<f64, TerrainError>> {
            Box::pin(async move { Ok(self.0) })
        }
    }

    struct FailingTerrain;

    impl TerrainSampler for FailingTerrain {
        fn sample_height(&self, _target: LatLon) -> BoxFuture<'_, Result<f64, TerrainError>> {
            Box::pin(async move { Err(TerrainError("service unavailable".into())) })
        }
    }

    struct SlowTerrain;

    impl TerrainSampler for SlowTerrain {
        fn sample_height(&self, _target: LatLon) -> BoxFuture<'_, Result<f64, TerrainError>> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(0.0)
            })
        }
    }

    #[test]
    fn default_view_is_top_down_at_ground_level() {
        let view = CameraView::from_lat_lon(-27.5, 153.0);
        assert_eq!(view.target, LatLon::new(-27.5, 153.0));
        assert_eq!(view.height, 0.0);
        assert_eq!(view.heading_degrees, 0.0);
        assert_eq!(view.pitch_degrees, DEFAULT_PITCH_DEGREES);
        assert_eq!(view.range, DEFAULT_MIN_VIEW_DISTANCE);
    }

    #[test]
    fn terrain_sample_raises_target_height() {
        let options = CameraOptions {
            feature_height: 12.0,
            ..CameraOptions::default()
        };
        let view = build_camera_view(LatLon::new(0.0, 0.0), Some(30.0), &options);
        assert_eq!(view.height, 30.0 + 12.0 + DEFAULT_MIN_VIEW_DISTANCE);
    }

    #[tokio::test]
    async fn navigation_uses_sampled_terrain() {
        let viewer = Arc::new(RecordingViewer::default());
        let nav = NavigationContext::new(
            viewer.clone(),
            Some(Arc::new(FixedTerrain(25.0))),
            CameraOptions::default(),
            DEFAULT_TERRAIN_TIMEOUT,
            DEFAULT_FLIGHT_DURATION,
        );
        nav.navigate_to(LatLon::new(1.0, 2.0)).await;

        let flights = viewer.flights.lock().expect("flights lock");
        assert_eq!(flights.len(), 1);
        let (view, duration) = flights[0];
        assert_eq!(view.height, 25.0 + DEFAULT_MIN_VIEW_DISTANCE);
        assert_eq!(duration, DEFAULT_FLIGHT_DURATION);
    }

    #[tokio::test]
    async fn failing_terrain_falls_back_to_ground_level() {
        let viewer = Arc::new(RecordingViewer::default());
        let nav = NavigationContext::new(
            viewer.clone(),
            Some(Arc::new(FailingTerrain)),
            CameraOptions::default(),
            DEFAULT_TERRAIN_TIMEOUT,
            DEFAULT_FLIGHT_DURATION,
        );
        nav.navigate_to(LatLon::new(1.0, 2.0)).await;

        let flights = viewer.flights.lock().expect("flights lock");
        assert_eq!(flights.len(), 1);
        assert_eq!(flights[0].0.height, 0.0);
        assert_eq!(flights[0].0.range, DEFAULT_MIN_VIEW_DISTANCE);
    }

    #[tokio::test]
    async fn slow_terrain_times_out_and_falls_back() {
        let viewer = Arc::new(RecordingViewer::default());
        let nav = NavigationContext::new(
            viewer.clone(),
            Some(Arc::new(SlowTerrain)),
            CameraOptions::default(),
            Duration::from_millis(10),
            DEFAULT_FLIGHT_DURATION,
        );
        nav.navigate_to(LatLon::new(1.0, 2.0)).await;

        let flights = viewer.flights.lock().expect("flights lock");
        assert_eq!(flights.len(), 1);
        assert_eq!(flights[0].0.height, 0.0);
    }
}
