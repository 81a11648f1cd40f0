//! Device location.
//!
//! A single-shot lookup used to geotag form submissions. Failures are
//! reported to the caller and never retried.

use crate::config::{GeolocationConfig, GeolocationProvider};
use crate::models::Location;
use anyhow::{anyhow, bail, Result};
use serde::Deserialize;
use std::time::Duration;

pub trait Locator {
    fn locate(&self) -> Result<Location>;
}

/// A position supplied up front (config file or command line)
pub struct FixedLocator {
    location: Option<Location>,
}

impl FixedLocator {
    pub fn new(location: Option<Location>) -> Self {
        Self { location }
    }
}

impl Locator for FixedLocator {
    fn locate(&self) -> Result<Location> {
        match self.location {
            Some(loc) if loc.is_valid() => Ok(loc),
            Some(loc) => bail!("configured location {} is out of range", loc),
            None => bail!("no location configured (set --lat/--lng or [geolocation])"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IpLookup {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

impl IpLookup {
    fn into_location(self) -> Result<Location> {
        if let Some(status) = &self.status {
            if status != "success" {
                bail!(
                    "lookup failed: {}",
                    self.message.as_deref().unwrap_or(status)
                );
            }
        }
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Ok(Location::new(lat, lon)),
            _ => Err(anyhow!("lookup response has no coordinates")),
        }
    }
}

/// Approximate position from the public IP address
pub struct IpLocator {
    url: String,
    agent: ureq::Agent,
}

impl IpLocator {
    pub fn new(url: &str, timeout: Duration) -> Self {
        Self {
            url: url.to_string(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl Locator for IpLocator {
    fn locate(&self) -> Result<Location> {
        let resp = self
            .agent
            .get(&self.url)
            .call()
            .map_err(|e| anyhow!("location lookup failed: {}", e))?;
        let lookup: IpLookup = resp.into_json()?;
        lookup.into_location()
    }
}

/// Build the locator described by config; an explicit position wins
pub fn from_config(cfg: &GeolocationConfig, explicit: Option<Location>) -> Box<dyn Locator> {
    if explicit.is_some() {
        return Box::new(FixedLocator::new(explicit));
    }
    match cfg.provider {
        GeolocationProvider::Fixed => Box::new(FixedLocator::new(cfg.fixed_location())),
        GeolocationProvider::Ip => Box::new(IpLocator::new(
            &cfg.lookup_url,
            Duration::from_millis(cfg.timeout_ms),
        )),
    }
}
