//! Lead scoring: a pure function over a lead snapshot producing a 0-100
//! score and an urgency classification, plus batch recompute and reporting
//! queries.

use crate::error::{CoreError, CoreResult};
use crate::models::{Lead, Urgency};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

/// How many recent activities feed the engagement window.
const ACTIVITY_WINDOW: i64 = 50;

/// Source quality table; matched by substring containment, first match wins
/// by declaration order.
const SOURCE_SCORES: &[(&str, f64)] = &[
    ("referral", 20.0),
    ("website", 15.0),
    ("organic", 15.0),
    ("paid_search", 12.0),
    ("social", 10.0),
    ("email_campaign", 10.0),
    ("direct", 8.0),
];

const UNMATCHED_SOURCE_SCORE: f64 = 5.0;

/// Everything the scoring function reads; no external calls.
#[derive(Debug, Clone)]
pub struct LeadSnapshot {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub state: Option<String>,
    pub filing_status: Option<String>,
    pub source: Option<String>,
    pub annual_income: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub email_opens: i32,
    pub email_clicks: i32,
    /// Activities recorded in the trailing 7 days.
    pub recent_activity_count: i64,
}

impl LeadSnapshot {
    pub fn from_lead(lead: &Lead, recent_activity_count: i64) -> Self {
        Self {
            first_name: lead.first_name.clone(),
            last_name: lead.last_name.clone(),
            email: lead.email.clone(),
            phone: lead.phone.clone(),
            state: lead.state.clone(),
            filing_status: lead.filing_status.clone(),
            source: lead.source.clone(),
            annual_income: lead.annual_income,
            created_at: lead.created_at,
            email_opens: lead.email_opens,
            email_clicks: lead.email_clicks,
            recent_activity_count,
        }
    }
}

/// Per-component breakdown of a computed score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub profile: f64,
    pub engagement: f64,
    pub source: f64,
    pub timing: f64,
    pub demographics: f64,
    pub total: i32,
    pub urgency: Urgency,
    pub reason: String,
}

/// Profile completeness, 0-25.
fn profile_score(snapshot: &LeadSnapshot) -> f64 {
    let mut score = 0.0;
    for present in [
        snapshot.first_name.is_some(),
        snapshot.last_name.is_some(),
        snapshot.email.is_some(),
        snapshot.phone.is_some(),
    ] {
        if present {
            score += 5.0;
        }
    }
    if snapshot.state.is_some() {
        score += 2.5;
    }
    if snapshot.filing_status.is_some() {
        score += 2.5;
    }
    score
}

/// Engagement, 0-25: opens, clicks, and trailing-7-day activity.
fn engagement_score(snapshot: &LeadSnapshot) -> f64 {
    let opens = (snapshot.email_opens as f64 * 2.0).min(10.0);
    let clicks = (snapshot.email_clicks as f64 * 3.0).min(10.0);
    let recent = (snapshot.recent_activity_count as f64).min(5.0);
    opens + clicks + recent
}

/// Source quality, 0-20, by substring containment against the table.
fn source_score(snapshot: &LeadSnapshot) -> f64 {
    let source = match &snapshot.source {
        Some(s) => s.to_lowercase(),
        None => return UNMATCHED_SOURCE_SCORE,
    };

    for (key, score) in SOURCE_SCORES {
        if source.contains(key) {
            return *score;
        }
    }
    UNMATCHED_SOURCE_SCORE
}

/// Timing, 0-15: newer leads score higher.
fn timing_score(age: Duration) -> f64 {
    let hours = age.num_hours();
    if hours < 1 {
        15.0
    } else if hours < 24 {
        12.0
    } else if hours < 72 {
        8.0
    } else if hours < 168 {
        4.0
    } else {
        1.0
    }
}

/// Demographics, 0-15 (capped): filing status plus income band.
fn demographics_score(snapshot: &LeadSnapshot) -> f64 {
    let filing: f64 = match snapshot.filing_status.as_deref() {
        Some("married_filing_jointly") => 5.0,
        Some("head_of_household") | Some("married_filing_separately") | Some("qualifying_widow") => {
            4.0
        }
        Some("single") => 3.0,
        _ => 0.0,
    };

    let income = match snapshot.annual_income {
        Some(income) if income > 150_000 => 10.0,
        Some(income) if income > 75_000 => 7.0,
        Some(income) if income > 40_000 => 4.0,
        _ => 2.0,
    };

    (filing + income).min(15.0)
}

/// First match wins; freshness plus engagement can override a mid score.
fn classify_urgency(score: i32, age: Duration, opens: i32, clicks: i32) -> Urgency {
    if score >= 80 {
        Urgency::Urgent
    } else if score >= 60 {
        Urgency::High
    } else if age.num_hours() < 2 && (opens > 0 || clicks > 0) {
        Urgency::High
    } else if score >= 40 {
        Urgency::Normal
    } else {
        Urgency::Low
    }
}

fn score_reason(profile: f64, engagement: f64, source: f64, timing: f64, demographics: f64) -> String {
    let mut parts = Vec::new();
    if profile >= 20.0 {
        parts.push("complete profile");
    } else if profile >= 10.0 {
        parts.push("partial profile");
    }
    if engagement >= 15.0 {
        parts.push("strong engagement");
    } else if engagement >= 5.0 {
        parts.push("some engagement");
    }
    if source >= 15.0 {
        parts.push("high-quality source");
    }
    if timing >= 12.0 {
        parts.push("very recent inquiry");
    } else if timing >= 8.0 {
        parts.push("recent inquiry");
    }
    if demographics >= 10.0 {
        parts.push("high-value demographics");
    }

    if parts.is_empty() {
        "limited signals".to_string()
    } else {
        parts.join(", ")
    }
}

/// Compute the five capped sub-scores, total (clamped to 100), urgency,
/// and reason for a snapshot.
pub fn compute(snapshot: &LeadSnapshot, now: DateTime<Utc>) -> ScoreBreakdown {
    let age = now - snapshot.created_at;

    let profile = profile_score(snapshot);
    let engagement = engagement_score(snapshot);
    let source = source_score(snapshot);
    let timing = timing_score(age);
    let demographics = demographics_score(snapshot);

    let total = (profile + engagement + source + timing + demographics)
        .round()
        .clamp(0.0, 100.0) as i32;

    let urgency = classify_urgency(total, age, snapshot.email_opens, snapshot.email_clicks);
    let reason = score_reason(profile, engagement, source, timing, demographics);

    ScoreBreakdown {
        profile,
        engagement,
        source,
        timing,
        demographics,
        total,
        urgency,
        reason,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecalculateReport {
    pub total: u32,
    pub successful: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBand {
    pub label: String,
    pub count: i64,
}

#[derive(Clone)]
pub struct ScoringService {
    pool: PgPool,
}

impl ScoringService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Score one lead and persist `{lead_score, lead_score_updated_at,
    /// urgency}` on the lead row.
    pub async fn score(&self, lead_id: Uuid) -> CoreResult<ScoreBreakdown> {
        let lead: Option<Lead> = sqlx::query_as("SELECT * FROM leads WHERE id = $1")
            .bind(lead_id)
            .fetch_optional(&self.pool)
            .await?;
        let lead = lead.ok_or_else(|| CoreError::not_found("Lead"))?;

        let now = Utc::now();
        let window_start = now - Duration::days(7);

        // Engagement window reads the most recent activities only.
        let recent: Vec<(DateTime<Utc>,)> = sqlx::query_as(
            "SELECT created_at FROM lead_activities WHERE lead_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(lead_id)
        .bind(ACTIVITY_WINDOW)
        .fetch_all(&self.pool)
        .await?;
        let recent_activity_count = recent.iter().filter(|(at,)| *at >= window_start).count() as i64;

        let snapshot = LeadSnapshot::from_lead(&lead, recent_activity_count);
        let breakdown = compute(&snapshot, now);

        sqlx::query(
            "UPDATE leads SET lead_score = $2, lead_score_updated_at = NOW(), urgency = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(lead_id)
        .bind(breakdown.total)
        .bind(breakdown.urgency.as_str())
        .execute(&self.pool)
        .await?;

        Ok(breakdown)
    }

    /// Rescore every non-converted lead. Best-effort batch work: a single
    /// failure is reported, never aborts the run.
    pub async fn recalculate_all(&self) -> CoreResult<RecalculateReport> {
        let ids: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM leads WHERE converted = false")
            .fetch_all(&self.pool)
            .await?;

        let mut report = RecalculateReport {
            total: ids.len() as u32,
            successful: 0,
            failed: 0,
        };

        for (lead_id,) in ids {
            match self.score(lead_id).await {
                Ok(_) => report.successful += 1,
                Err(e) => {
                    warn!("Rescore failed for lead {}: {}", lead_id, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Recalculated scores: {}/{} successful",
            report.successful, report.total
        );
        Ok(report)
    }

    /// Highest-scored open leads, optionally restricted to one preparer.
    pub async fn get_top_leads(
        &self,
        limit: i64,
        preparer_id: Option<Uuid>,
    ) -> CoreResult<Vec<Lead>> {
        let leads = match preparer_id {
            Some(preparer) => {
                sqlx::query_as::<_, Lead>(
                    r#"
                    SELECT * FROM leads
                    WHERE converted = false AND lead_score IS NOT NULL AND assigned_to = $2
                    ORDER BY lead_score DESC
                    LIMIT $1
                    "#,
                )
                .bind(limit)
                .bind(preparer)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Lead>(
                    r#"
                    SELECT * FROM leads
                    WHERE converted = false AND lead_score IS NOT NULL
                    ORDER BY lead_score DESC
                    LIMIT $1
                    "#,
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(leads)
    }

    /// Score histogram for the admin dashboard.
    pub async fn get_score_distribution(&self) -> CoreResult<Vec<ScoreBand>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT band, COUNT(*) FROM (
                SELECT CASE
                    WHEN lead_score IS NULL THEN 'unscored'
                    WHEN lead_score >= 80 THEN '80-100'
                    WHEN lead_score >= 60 THEN '60-79'
                    WHEN lead_score >= 40 THEN '40-59'
                    WHEN lead_score >= 20 THEN '20-39'
                    ELSE '0-19'
                END AS band
                FROM leads
                WHERE converted = false
            ) banded
            GROUP BY band
            ORDER BY band
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(label, count)| ScoreBand { label, count })
            .collect())
    }
}
