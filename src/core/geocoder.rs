use crate::domain::model::{GeocodeOutcome, GeocodeStats, Table};
use crate::domain::ports::{AddressLookup, GeocoderSettings};
use crate::utils::error::{EtlError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;

/// 確保兩次查詢之間至少間隔 `interval`
#[derive(Debug)]
struct Throttle {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Throttle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    async fn wait(&self) {
        let mut next_slot = self.next_slot.lock().await;
        let now = Instant::now();
        let start = match *next_slot {
            Some(slot) if slot > now => {
                tokio::time::sleep_until(slot).await;
                slot
            }
            _ => now,
        };
        *next_slot = Some(start + self.interval);
    }
}

/// Resolves addresses one lookup per record. Every failure kind collapses to
/// an unknown coordinate pair in the table; the distinction survives only in
/// logs and [`GeocodeStats`].
pub struct Geocoder {
    lookup: Arc<dyn AddressLookup>,
    concurrency: usize,
    throttle: Option<Arc<Throttle>>,
}

impl Geocoder {
    pub fn new(lookup: Arc<dyn AddressLookup>) -> Self {
        Self {
            lookup,
            concurrency: 1,
            throttle: None,
        }
    }

    pub fn from_settings(lookup: Arc<dyn AddressLookup>, settings: &GeocoderSettings) -> Self {
        Self::new(lookup)
            .with_concurrency(settings.concurrent_requests)
            .with_min_interval(settings.min_request_interval)
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_min_interval(mut self, interval: Option<Duration>) -> Self {
        self.throttle = interval
            .filter(|d| !d.is_zero())
            .map(|d| Arc::new(Throttle::new(d)));
        self
    }

    pub async fn resolve(&self, address: &str) -> GeocodeOutcome {
        resolve_with(self.lookup.as_ref(), self.throttle.as_deref(), address).await
    }

    /// 為每一列加上緯度與經度欄位，列順序不變
    pub async fn geocode_table(
        &self,
        dataset: &str,
        mut table: Table,
        settings: &GeocoderSettings,
    ) -> Result<(Table, GeocodeStats)> {
        if !table.has_column(&settings.address_column) {
            return Err(EtlError::MissingColumn {
                dataset: dataset.to_string(),
                column: settings.address_column.clone(),
            });
        }

        let addresses: Vec<String> = table
            .records
            .iter()
            .map(|r| address_text(r.data.get(&settings.address_column)))
            .collect();

        tracing::info!(
            "🌍 [{}] Geocoding {} addresses (concurrency: {})",
            dataset,
            addresses.len(),
            self.concurrency
        );

        let outcomes = if self.concurrency <= 1 {
            self.resolve_sequential(&addresses).await
        } else {
            self.resolve_concurrent(&addresses).await?
        };

        let mut stats = GeocodeStats::default();
        table.ensure_column(&settings.latitude_column);
        table.ensure_column(&settings.longitude_column);

        for (record, outcome) in table.records.iter_mut().zip(outcomes.iter()) {
            stats.record(outcome);
            let (lat, lon) = outcome.to_values();
            record.data.insert(settings.latitude_column.clone(), lat);
            record.data.insert(settings.longitude_column.clone(), lon);
        }

        tracing::info!(
            "🌍 [{}] Geocoding finished: {} resolved, {} not found, {} failed",
            dataset,
            stats.resolved,
            stats.not_found,
            stats.failed
        );
        Ok((table, stats))
    }

    async fn resolve_sequential(&self, addresses: &[String]) -> Vec<GeocodeOutcome> {
        let mut outcomes = Vec::with_capacity(addresses.len());
        for address in addresses {
            outcomes.push(self.resolve(address).await);
        }
        outcomes
    }

    /// 有界並行查詢，結果依原始列索引重組，而不是依完成順序
    async fn resolve_concurrent(&self, addresses: &[String]) -> Result<Vec<GeocodeOutcome>> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (index, address) in addresses.iter().cloned().enumerate() {
            let lookup = Arc::clone(&self.lookup);
            let throttle = self.throttle.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let outcome = resolve_with(lookup.as_ref(), throttle.as_deref(), &address).await;
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<GeocodeOutcome>> = vec![None; addresses.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, outcome) = joined.map_err(|e| EtlError::ProcessingError {
                message: format!("Geocoding task failed: {}", e),
            })?;
            slots[index] = Some(outcome);
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| EtlError::ProcessingError {
                    message: format!("No geocoding result for row {}", index),
                })
            })
            .collect()
    }
}

async fn resolve_with(
    lookup: &dyn AddressLookup,
    throttle: Option<&Throttle>,
    address: &str,
) -> GeocodeOutcome {
    if let Some(throttle) = throttle {
        throttle.wait().await;
    }

    match lookup.lookup(address).await {
        Ok(Some(coords)) => {
            tracing::debug!("Resolved '{}' -> ({}, {})", address, coords.lat, coords.lon);
            GeocodeOutcome::Resolved(coords)
        }
        Ok(None) => {
            tracing::warn!(address = %address, kind = "not_found", "⚠️ No match for address");
            GeocodeOutcome::NotFound
        }
        Err(failure) => {
            tracing::warn!(
                address = %address,
                kind = failure.kind(),
                detail = %failure,
                "⚠️ Lookup failed, coordinates left unknown"
            );
            GeocodeOutcome::Failed(failure)
        }
    }
}

fn address_text(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
