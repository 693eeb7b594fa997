use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

/// 地理编码服务的外部协作者接口，HTTP 细节在实现里
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<Option<(f64, f64)>, GeocodeError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("geocoding request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("geocoding response malformed")]
    Malformed,
}

/// 单次保存内的地理编码结果。失败只是降级信号，
/// 不会阻止保存流程。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeocodeOutcome {
    NotAttempted,
    Resolved { latitude: f64, longitude: f64 },
    Degraded,
}

impl GeocodeOutcome {
    /// 返回给调用方的提示信号，未尝试时为 None
    pub fn signal(&self) -> Option<&'static str> {
        match self {
            GeocodeOutcome::NotAttempted => None,
            GeocodeOutcome::Resolved { .. } => Some("geocoded"),
            GeocodeOutcome::Degraded => Some("geocode_failed"),
        }
    }
}

/// 地址解析策略：空地址不请求；非空地址恰好请求一次，
/// 超时、出错或无结果都降级为 Degraded，由调用方清空坐标。
pub async fn resolve_address(
    geocoder: &dyn Geocoder,
    address: &str,
    timeout: Duration,
) -> GeocodeOutcome {
    if address.trim().is_empty() {
        return GeocodeOutcome::NotAttempted;
    }

    match tokio::time::timeout(timeout, geocoder.geocode(address)).await {
        Ok(Ok(Some((latitude, longitude)))) => GeocodeOutcome::Resolved {
            latitude,
            longitude,
        },
        Ok(Ok(None)) => {
            tracing::warn!("No geocoding result for address: {}", address);
            GeocodeOutcome::Degraded
        }
        Ok(Err(e)) => {
            tracing::warn!("Geocoding failed for address {}: {}", address, e);
            GeocodeOutcome::Degraded
        }
        Err(_) => {
            tracing::warn!("Geocoding timed out for address: {}", address);
            GeocodeOutcome::Degraded
        }
    }
}

/// Nominatim 风格的地理编码实现
pub struct NominatimGeocoder {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

impl NominatimGeocoder {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<(f64, f64)>, GeocodeError> {
        let places: Vec<Place> = self
            .client
            .get(&self.endpoint)
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .header("User-Agent", "agora-backend")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let Some(place) = places.into_iter().next() else {
            return Ok(None);
        };

        let latitude = place.lat.parse().map_err(|_| GeocodeError::Malformed)?;
        let longitude = place.lon.parse().map_err(|_| GeocodeError::Malformed)?;
        Ok(Some((latitude, longitude)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeGeocoder {
        result: Result<Option<(f64, f64)>, ()>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl FakeGeocoder {
        fn returning(result: Result<Option<(f64, f64)>, ()>) -> Self {
            Self {
                result,
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Geocoder for FakeGeocoder {
        async fn geocode(&self, _address: &str) -> Result<Option<(f64, f64)>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.result
                .map_err(|_| GeocodeError::Malformed)
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn empty_address_is_not_geocoded() {
        let geocoder = FakeGeocoder::returning(Ok(Some((50.85, 4.35))));
        let outcome = resolve_address(&geocoder, "  ", TIMEOUT).await;
        assert_eq!(outcome, GeocodeOutcome::NotAttempted);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.signal(), None);
    }

    #[tokio::test]
    async fn successful_geocode_resolves_coordinates() {
        let geocoder = FakeGeocoder::returning(Ok(Some((50.85, 4.35))));
        let outcome = resolve_address(&geocoder, "Brussels", TIMEOUT).await;
        assert_eq!(
            outcome,
            GeocodeOutcome::Resolved {
                latitude: 50.85,
                longitude: 4.35
            }
        );
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.signal(), Some("geocoded"));
    }

    #[tokio::test]
    async fn rejected_address_degrades() {
        let geocoder = FakeGeocoder::returning(Ok(None));
        let outcome = resolve_address(&geocoder, "nowhere at all", TIMEOUT).await;
        assert_eq!(outcome, GeocodeOutcome::Degraded);
        assert_eq!(outcome.signal(), Some("geocode_failed"));
    }

    #[tokio::test]
    async fn provider_error_degrades() {
        let geocoder = FakeGeocoder::returning(Err(()));
        let outcome = resolve_address(&geocoder, "Brussels", TIMEOUT).await;
        assert_eq!(outcome, GeocodeOutcome::Degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_degrades_after_timeout() {
        let geocoder = FakeGeocoder {
            result: Ok(Some((50.85, 4.35))),
            delay: Some(Duration::from_secs(60)),
            calls: AtomicUsize::new(0),
        };
        let outcome = resolve_address(&geocoder, "Brussels", TIMEOUT).await;
        assert_eq!(outcome, GeocodeOutcome::Degraded);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
    }
}
