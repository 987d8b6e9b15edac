//! Dashboard aggregates computed from current gateway state.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use domain::collections::{
    BOOKING_COLLECTIONS, EXPERIENCE_BOOKINGS, GUIDE_PROFILES, GUIDE_VERIFICATIONS,
    LODGING_BOOKINGS, TRANSPORT_BOOKINGS,
};
use resource_gateway::ResourceGateway;

use crate::Result;
use crate::event::MetricValue;

/// Derives named metrics from the full current state of some collections.
#[async_trait]
pub trait Aggregator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Collections whose changes make this aggregator's metrics stale.
    fn relevant_collections(&self) -> &[&'static str];

    /// Recomputes every metric from scratch.
    async fn compute(&self) -> Result<BTreeMap<String, MetricValue>>;
}

const RELEVANT: [&str; 5] = [
    EXPERIENCE_BOOKINGS,
    LODGING_BOOKINGS,
    TRANSPORT_BOOKINGS,
    GUIDE_PROFILES,
    GUIDE_VERIFICATIONS,
];

/// Booking and guide counters for the admin dashboard.
///
/// A combined booking writes one record per leg, all carrying the same
/// reference and price breakdown, so bookings and revenue are counted per
/// distinct reference.
pub struct DashboardAggregator<G> {
    gateway: G,
}

impl<G: ResourceGateway> DashboardAggregator<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl<G> Aggregator for DashboardAggregator<G>
where
    G: ResourceGateway + 'static,
{
    fn name(&self) -> &'static str {
        "dashboard"
    }

    fn relevant_collections(&self) -> &[&'static str] {
        &RELEVANT
    }

    #[tracing::instrument(skip(self))]
    async fn compute(&self) -> Result<BTreeMap<String, MetricValue>> {
        let mut metrics = BTreeMap::new();
        let mut totals_by_reference: HashMap<String, i64> = HashMap::new();
        let mut latest: Option<DateTime<Utc>> = None;

        for collection in BOOKING_COLLECTIONS {
            let records = self.gateway.list(collection).await?;
            metrics.insert(collection.to_string(), MetricValue::from(records.len()));

            for record in &records {
                latest = latest.max(Some(record.created_at));
                let Some(reference) = record.data.get("reference").and_then(|v| v.as_str())
                else {
                    continue;
                };
                let total = record
                    .data
                    .pointer("/breakdown/total_cents")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0);
                totals_by_reference
                    .entry(reference.to_string())
                    .or_insert(total);
            }
        }

        metrics.insert(
            "total_bookings".into(),
            MetricValue::from(totals_by_reference.len()),
        );
        metrics.insert(
            "gross_revenue_cents".into(),
            MetricValue::from(totals_by_reference.values().sum::<i64>()),
        );
        metrics.insert(
            "latest_booking_at".into(),
            MetricValue::from(
                latest
                    .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
                    .unwrap_or_default(),
            ),
        );

        let guides = self.gateway.list(GUIDE_PROFILES).await?;
        metrics.insert("registered_guides".into(), MetricValue::from(guides.len()));

        let pending = self
            .gateway
            .list(GUIDE_VERIFICATIONS)
            .await?
            .iter()
            .filter(|r| r.data.get("status").and_then(|v| v.as_str()) == Some("pending"))
            .count();
        metrics.insert("pending_verifications".into(), MetricValue::from(pending));

        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resource_gateway::{InMemoryResourceGateway, NewRecord};
    use serde_json::json;

    async fn book(gateway: &InMemoryResourceGateway, collection: &str, reference: &str, n: i64) {
        gateway
            .create(
                collection,
                NewRecord::new(json!({
                    "reference": reference,
                    "breakdown": { "total_cents": n },
                })),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_empty_state() {
        let aggregator = DashboardAggregator::new(InMemoryResourceGateway::new());

        let metrics = aggregator.compute().await.unwrap();

        assert_eq!(metrics["total_bookings"], MetricValue::Number(0));
        assert_eq!(metrics["gross_revenue_cents"], MetricValue::Number(0));
        assert_eq!(metrics["latest_booking_at"], MetricValue::Text(String::new()));
        assert_eq!(metrics["registered_guides"], MetricValue::Number(0));
    }

    #[tokio::test]
    async fn test_combined_booking_counted_once() {
        let gateway = InMemoryResourceGateway::new();
        book(&gateway, EXPERIENCE_BOOKINGS, "BK-1", 10_000).await;
        book(&gateway, LODGING_BOOKINGS, "BK-1", 10_000).await;
        book(&gateway, TRANSPORT_BOOKINGS, "BK-2", 2_500).await;

        let metrics = DashboardAggregator::new(gateway).compute().await.unwrap();

        assert_eq!(metrics[EXPERIENCE_BOOKINGS], MetricValue::Number(1));
        assert_eq!(metrics[LODGING_BOOKINGS], MetricValue::Number(1));
        assert_eq!(metrics[TRANSPORT_BOOKINGS], MetricValue::Number(1));
        assert_eq!(metrics["total_bookings"], MetricValue::Number(2));
        assert_eq!(metrics["gross_revenue_cents"], MetricValue::Number(12_500));
        assert!(!metrics["latest_booking_at"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_guide_counters() {
        let gateway = InMemoryResourceGateway::new();
        gateway
            .create(GUIDE_PROFILES, NewRecord::new(json!({ "full_name": "A" })))
            .await
            .unwrap();
        gateway
            .create(GUIDE_VERIFICATIONS, NewRecord::new(json!({ "status": "pending" })))
            .await
            .unwrap();
        gateway
            .create(GUIDE_VERIFICATIONS, NewRecord::new(json!({ "status": "approved" })))
            .await
            .unwrap();

        let metrics = DashboardAggregator::new(gateway).compute().await.unwrap();

        assert_eq!(metrics["registered_guides"], MetricValue::Number(1));
        assert_eq!(metrics["pending_verifications"], MetricValue::Number(1));
    }
}
