use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::predict::normalize_longitude;
use crate::store::{CrewRecord, PositionSample, Visibility};
use crate::sync::error::SyncError;

/// Live position feed.
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn current_position(&self) -> Result<PositionSample, SyncError>;
}

/// Who is aboard right now.
#[async_trait]
pub trait CrewSource: Send + Sync {
    async fn current_crew(&self) -> Result<Vec<CrewRecord>, SyncError>;
}

#[derive(Debug, Deserialize)]
struct PositionPayload {
    latitude: f64,
    longitude: f64,
    altitude: f64,
    velocity: f64,
    #[serde(default)]
    visibility: Option<String>,
    timestamp: i64,
}

impl PositionPayload {
    fn into_sample(self) -> PositionSample {
        let visibility = match self.visibility.as_deref() {
            Some("daylight") => Visibility::Daylight,
            Some("eclipsed") => Visibility::Eclipsed,
            _ => Visibility::Orbiting,
        };
        PositionSample {
            id: PositionSample::live_id(self.timestamp),
            latitude: self.latitude,
            longitude: normalize_longitude(self.longitude),
            altitude_km: self.altitude,
            velocity_kmh: self.velocity,
            timestamp: self.timestamp,
            visibility,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CrewPayload {
    people: Vec<CrewMember>,
}

#[derive(Debug, Deserialize)]
struct CrewMember {
    name: String,
    craft: String,
}

fn crew_from_payload(payload: CrewPayload, fetched_at: DateTime<Utc>) -> Vec<CrewRecord> {
    payload
        .people
        .iter()
        .map(|member| CrewRecord::new(&member.name, &member.craft, fetched_at))
        .collect()
}

/// JSON-over-HTTP client shared by the live sources.
#[derive(Clone)]
struct JsonClient {
    client: reqwest::Client,
}

impl JsonClient {
    fn new(timeout: StdDuration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, SyncError> {
        let http = |source| SyncError::Http {
            url: url.to_string(),
            source,
        };
        let response = self.client.get(url).send().await.map_err(http)?;
        if !response.status().is_success() {
            return Err(SyncError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        let body = response.text().await.map_err(http)?;
        serde_json::from_str(&body).map_err(|e| SyncError::Decode(format!("{}: {}", url, e)))
    }
}

pub struct HttpPositionSource {
    client: JsonClient,
    url: String,
}

impl HttpPositionSource {
    pub fn new(url: String, timeout: StdDuration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: JsonClient::new(timeout)?,
            url,
        })
    }
}

#[async_trait]
impl PositionSource for HttpPositionSource {
    async fn current_position(&self) -> Result<PositionSample, SyncError> {
        let payload: PositionPayload = self.client.get(&self.url).await?;
        Ok(payload.into_sample())
    }
}

pub struct HttpCrewSource {
    client: JsonClient,
    url: String,
}

impl HttpCrewSource {
    pub fn new(url: String, timeout: StdDuration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: JsonClient::new(timeout)?,
            url,
        })
    }
}

#[async_trait]
impl CrewSource for HttpCrewSource {
    async fn current_crew(&self) -> Result<Vec<CrewRecord>, SyncError> {
        let payload: CrewPayload = self.client.get(&self.url).await?;
        Ok(crew_from_payload(payload, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_payload_maps_to_live_sample() {
        let body = r#"{
            "name": "iss", "id": 25544,
            "latitude": 50.11, "longitude": 118.07, "altitude": 408.05,
            "velocity": 27623.36, "visibility": "daylight",
            "footprint": 4446.1, "timestamp": 1364069476,
            "units": "kilometers"
        }"#;
        let payload: PositionPayload = serde_json::from_str(body).unwrap();
        let sample = payload.into_sample();

        assert_eq!(sample.id, "pos-1364069476");
        assert_eq!(sample.timestamp, 1_364_069_476);
        assert_eq!(sample.visibility, Visibility::Daylight);
        assert!((sample.altitude_km - 408.05).abs() < 1e-9);
    }

    #[test]
    fn unknown_visibility_and_wrapped_longitude() {
        let body = r#"{"latitude": 1.0, "longitude": 180.0, "altitude": 410.0,
            "velocity": 27600.0, "visibility": "twilight", "timestamp": 100}"#;
        let sample = serde_json::from_str::<PositionPayload>(body)
            .unwrap()
            .into_sample();
        assert_eq!(sample.visibility, Visibility::Orbiting);
        assert_eq!(sample.longitude, -180.0);
    }

    #[test]
    fn crew_payload_yields_one_record_per_person() {
        let body = r#"{"message": "success", "number": 2, "people": [
            {"name": "Jasmin Moghbeli", "craft": "ISS"},
            {"name": "Jing Haiping", "craft": "Tiangong"}
        ]}"#;
        let now = Utc::now();
        let crew = crew_from_payload(serde_json::from_str(body).unwrap(), now);
        assert_eq!(crew.len(), 2);
        assert_eq!(crew[0].id, "crew-jasmin-moghbeli");
        assert_eq!(crew[1].craft, "Tiangong");
        assert!(crew.iter().all(|c| c.fetched_at == now));
    }
}
