//! Derived dashboard and leaderboard views.
//!
//! Nothing here is cached or materialized: every call recomputes aggregates
//! from the currently stored reps and sales, so the views always reflect the
//! store.

use std::collections::HashMap;

use crate::error::RepError;
use crate::handle::normalize_handle;
use crate::scoring::{SalesTotals, ScoringConfig};
use crate::storage::RepStore;
use crate::types::{DashboardView, LeaderboardRow, SaleKind};

/// Dashboard presentation settings.
#[derive(Debug, Clone)]
pub struct ViewConfig {
    /// Landing page the referral link points at.
    pub landing_url: String,
    /// How many recent sales the dashboard lists.
    pub recent_sales_limit: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            landing_url: "http://localhost:3000".to_string(),
            recent_sales_limit: 10,
        }
    }
}

/// Compute the full leaderboard: one row per approved rep, points
/// descending.
///
/// Ties break deterministically by earliest application timestamp, then by
/// handle, so repeated reads of the same data always order identically.
pub async fn leaderboard(
    store: &dyn RepStore,
    scoring: &ScoringConfig,
) -> Result<Vec<LeaderboardRow>, RepError> {
    let reps = store.approved_reps().await?;
    let sales = store.all_sales().await?;

    let mut totals_by_handle: HashMap<&str, SalesTotals> = HashMap::new();
    for sale in &sales {
        let totals = totals_by_handle.entry(sale.rep_handle.as_str()).or_default();
        match sale.kind {
            SaleKind::Shirt => totals.shirts += u64::from(sale.quantity),
            SaleKind::Ticket => totals.tickets += u64::from(sale.quantity),
        }
    }

    let mut rows: Vec<LeaderboardRow> = reps
        .iter()
        .map(|rep| {
            let totals = totals_by_handle
                .get(rep.handle.as_str())
                .copied()
                .unwrap_or_default();
            LeaderboardRow {
                rank: 0,
                handle: rep.handle.clone(),
                full_name: rep.full_name.clone(),
                shirts_sold: totals.shirts,
                tickets_sold: totals.tickets,
                total_units: totals.total_units(),
                total_points: scoring.points(&totals),
                total_commission: scoring.commission(&totals),
                applied_at: rep.applied_at,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.total_points
            .cmp(&a.total_points)
            .then_with(|| a.applied_at.cmp(&b.applied_at))
            .then_with(|| a.handle.cmp(&b.handle))
    });

    for (index, row) in rows.iter_mut().enumerate() {
        row.rank = index + 1;
    }

    Ok(rows)
}

/// Build the dashboard for one handle.
///
/// Returns `None` when the handle is unknown or the rep is not approved;
/// pending and rejected applications must not leak their existence.
pub async fn dashboard(
    store: &dyn RepStore,
    scoring: &ScoringConfig,
    config: &ViewConfig,
    handle: &str,
) -> Result<Option<DashboardView>, RepError> {
    let handle = normalize_handle(handle);

    let Some(rep) = store.find_approved_rep(&handle).await? else {
        return Ok(None);
    };

    let sales = store.sales_for(&handle).await?;
    let totals = SalesTotals::from_sales(&sales);

    let board = leaderboard(store, scoring).await?;
    let rep_count = board.len();
    let rank = board
        .iter()
        .find(|row| row.handle == handle)
        .map(|row| row.rank)
        .unwrap_or(0);

    let mut recent_sales = sales;
    recent_sales.truncate(config.recent_sales_limit);

    let referral_link = format!(
        "{}/?utm_source={}",
        config.landing_url.trim_end_matches('/'),
        handle
    );

    Ok(Some(DashboardView {
        handle: rep.handle,
        full_name: rep.full_name,
        shirts_sold: totals.shirts,
        tickets_sold: totals.tickets,
        total_units: totals.total_units(),
        total_points: scoring.points(&totals),
        total_commission: scoring.commission(&totals),
        rank,
        rep_count,
        bonus_tiers: scoring.tier_progress(totals.total_units()),
        referral_link,
        recent_sales,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryRepStore;
    use crate::types::{Experience, Rep, RepStatus, Sale};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn rep(handle: &str, status: RepStatus, applied_offset_secs: i64) -> Rep {
        Rep {
            id: Uuid::new_v4(),
            handle: handle.to_string(),
            full_name: format!("Rep {handle}"),
            phone: "555-0100".to_string(),
            university: None,
            promo_plan: "plan".to_string(),
            prev_experience: Experience::None,
            status,
            applied_at: Utc::now() + Duration::seconds(applied_offset_secs),
            approved_at: (status == RepStatus::Approved).then(Utc::now),
            crm_contact_id: None,
        }
    }

    fn sale(handle: &str, kind: SaleKind, quantity: u32) -> Sale {
        Sale {
            id: Uuid::new_v4(),
            rep_handle: handle.to_string(),
            kind,
            quantity,
            amount: None,
            source: None,
            external_order_id: None,
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn leaderboard_orders_by_points_descending() {
        let store = MemoryRepStore::new();
        store.seed_rep(rep("low", RepStatus::Approved, 0)).await;
        store.seed_rep(rep("high", RepStatus::Approved, 0)).await;
        store.seed_sale(sale("low", SaleKind::Ticket, 2)).await;
        store.seed_sale(sale("high", SaleKind::Shirt, 5)).await;

        let rows = leaderboard(&store, &ScoringConfig::default()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].handle, "high");
        assert_eq!(rows[0].total_points, 10);
        assert_eq!(rows[0].rank, 1);
        assert_eq!(rows[1].handle, "low");
        assert_eq!(rows[1].total_points, 2);
        assert_eq!(rows[1].rank, 2);
    }

    #[tokio::test]
    async fn leaderboard_excludes_unapproved_reps_and_their_sales() {
        let store = MemoryRepStore::new();
        store.seed_rep(rep("approved", RepStatus::Approved, 0)).await;
        store.seed_rep(rep("pending", RepStatus::Pending, 0)).await;
        store.seed_rep(rep("rejected", RepStatus::Rejected, 0)).await;
        store.seed_sale(sale("pending", SaleKind::Shirt, 100)).await;

        let rows = leaderboard(&store, &ScoringConfig::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].handle, "approved");
    }

    #[tokio::test]
    async fn point_ties_break_by_earliest_application() {
        let store = MemoryRepStore::new();
        store.seed_rep(rep("later", RepStatus::Approved, 100)).await;
        store.seed_rep(rep("earlier", RepStatus::Approved, 0)).await;

        let rows = leaderboard(&store, &ScoringConfig::default()).await.unwrap();
        assert_eq!(rows[0].handle, "earlier");
        assert_eq!(rows[1].handle, "later");
    }

    #[tokio::test]
    async fn zero_sale_reps_stay_on_the_board() {
        let store = MemoryRepStore::new();
        store.seed_rep(rep("quiet", RepStatus::Approved, 0)).await;

        let rows = leaderboard(&store, &ScoringConfig::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_points, 0);
        assert_eq!(rows[0].total_commission, 0);
        assert_eq!(rows[0].rank, 1);
    }

    #[tokio::test]
    async fn dashboard_aggregates_and_ranks() {
        let store = MemoryRepStore::new();
        store.seed_rep(rep("star", RepStatus::Approved, 0)).await;
        store.seed_rep(rep("other", RepStatus::Approved, 0)).await;
        store.seed_sale(sale("star", SaleKind::Shirt, 10)).await;
        store.seed_sale(sale("star", SaleKind::Ticket, 15)).await;

        let view = dashboard(
            &store,
            &ScoringConfig::default(),
            &ViewConfig::default(),
            "@Star",
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(view.shirts_sold, 10);
        assert_eq!(view.tickets_sold, 15);
        assert_eq!(view.total_units, 25);
        assert_eq!(view.total_points, 35);
        assert_eq!(view.total_commission, 95);
        assert_eq!(view.rank, 1);
        assert_eq!(view.rep_count, 2);
        assert_eq!(view.referral_link, "http://localhost:3000/?utm_source=star");

        let achieved: Vec<bool> = view.bonus_tiers.iter().map(|t| t.achieved).collect();
        assert_eq!(achieved, vec![true, true, false]);
    }

    #[tokio::test]
    async fn dashboard_hides_pending_and_rejected_reps() {
        let store = MemoryRepStore::new();
        store.seed_rep(rep("pending", RepStatus::Pending, 0)).await;
        store.seed_rep(rep("rejected", RepStatus::Rejected, 0)).await;

        let scoring = ScoringConfig::default();
        let config = ViewConfig::default();
        assert!(dashboard(&store, &scoring, &config, "pending")
            .await
            .unwrap()
            .is_none());
        assert!(dashboard(&store, &scoring, &config, "rejected")
            .await
            .unwrap()
            .is_none());
        assert!(dashboard(&store, &scoring, &config, "missing")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn dashboard_caps_recent_sales() {
        let store = MemoryRepStore::new();
        store.seed_rep(rep("busy", RepStatus::Approved, 0)).await;
        for _ in 0..15 {
            store.seed_sale(sale("busy", SaleKind::Ticket, 1)).await;
        }

        let view = dashboard(
            &store,
            &ScoringConfig::default(),
            &ViewConfig::default(),
            "busy",
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(view.recent_sales.len(), 10);
        assert_eq!(view.tickets_sold, 15);
    }
}
