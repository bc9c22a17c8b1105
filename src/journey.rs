//! Journey stage tracker: a four-state progression state machine per
//! attributed click, with aggregate conversion counters on the owning
//! marketing link.
//!
//! Stage timestamps are set at most once, in the fixed order
//! CLICKED -> INTAKE_STARTED -> INTAKE_COMPLETED -> RETURN_FILED.
//! Validation and stamping happen as one read-check-write unit: the click
//! row is locked for the duration of validate + stamp + counter increment,
//! and the stamp itself is a compare-and-swap on the nullable timestamp.

use crate::error::{CoreError, CoreResult};
use crate::models::{LinkClick, MarketingLink};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

const TRACKING_CODE_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JourneyStage {
    Clicked,
    IntakeStarted,
    IntakeCompleted,
    ReturnFiled,
}

impl JourneyStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clicked => "CLICKED",
            Self::IntakeStarted => "INTAKE_STARTED",
            Self::IntakeCompleted => "INTAKE_COMPLETED",
            Self::ReturnFiled => "RETURN_FILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CLICKED" => Some(Self::Clicked),
            "INTAKE_STARTED" => Some(Self::IntakeStarted),
            "INTAKE_COMPLETED" => Some(Self::IntakeCompleted),
            "RETURN_FILED" => Some(Self::ReturnFiled),
            _ => None,
        }
    }

    /// The furthest stage this click has reached.
    pub fn current(click: &LinkClick) -> Self {
        if click.tax_return_completed_at.is_some() {
            Self::ReturnFiled
        } else if click.intake_completed_at.is_some() {
            Self::IntakeCompleted
        } else if click.intake_started_at.is_some() {
            Self::IntakeStarted
        } else {
            Self::Clicked
        }
    }
}

/// Check that `stage` is the legal next transition for `click`.
/// Returns the human-readable reason on violation.
pub fn validate_transition(click: &LinkClick, stage: JourneyStage) -> Result<(), String> {
    match stage {
        JourneyStage::Clicked => {
            Err("CLICKED is recorded when the click is created, not tracked".to_string())
        }
        JourneyStage::IntakeStarted => {
            if click.intake_started_at.is_some() {
                Err("intake already started for this click".to_string())
            } else {
                Ok(())
            }
        }
        JourneyStage::IntakeCompleted => {
            if click.intake_started_at.is_none() {
                Err("intake has not been started for this click".to_string())
            } else if click.intake_completed_at.is_some() {
                Err("intake already completed for this click".to_string())
            } else {
                Ok(())
            }
        }
        JourneyStage::ReturnFiled => {
            if click.intake_completed_at.is_none() {
                Err("intake has not been completed for this click".to_string())
            } else if click.tax_return_completed_at.is_some() {
                Err("return already filed for this click".to_string())
            } else {
                Ok(())
            }
        }
    }
}

/// `counter / clicks * 100`, 0 when there are no clicks yet.
pub fn conversion_rate(counter: i64, clicks: i64) -> f64 {
    if clicks == 0 {
        0.0
    } else {
        counter as f64 / clicks as f64 * 100.0
    }
}

/// Attribution payload returned to callers for downstream CRM routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackResult {
    pub click: LinkClick,
    pub link_id: Uuid,
    pub link_name: String,
    pub link_created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JourneyStatus {
    pub click: LinkClick,
    pub stage: JourneyStage,
}

#[derive(Clone)]
pub struct JourneyService {
    pool: PgPool,
}

impl JourneyService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record the initial click for a marketing link and increment the
    /// link's click counter. The tracking code is a first-class indexed
    /// column; one is generated when the caller does not supply one.
    pub async fn create_click(
        &self,
        link_id: Uuid,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
        referrer: Option<&str>,
        tracking_code: Option<&str>,
    ) -> CoreResult<LinkClick> {
        let mut tx = self.pool.begin().await?;

        let link: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM marketing_links WHERE id = $1 FOR UPDATE")
                .bind(link_id)
                .fetch_optional(&mut *tx)
                .await?;
        if link.is_none() {
            return Err(CoreError::not_found("Marketing link"));
        }

        let code = match tracking_code {
            Some(code) => code.to_string(),
            None => generate_tracking_code(),
        };

        let click = sqlx::query_as::<_, LinkClick>(
            r#"
            INSERT INTO link_clicks (id, link_id, tracking_code, ip_address, user_agent, referrer, clicked_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(link_id)
        .bind(&code)
        .bind(ip_address)
        .bind(user_agent)
        .bind(referrer)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE marketing_links SET clicks = clicks + 1 WHERE id = $1")
            .bind(link_id)
            .execute(&mut *tx)
            .await?;

        recompute_rates(&mut tx, link_id).await?;
        tx.commit().await?;

        info!("Click recorded for link {} (code {})", link_id, code);
        Ok(click)
    }

    /// Advance the click identified by `tracking_code` to `stage`.
    ///
    /// The whole transition (lock, validate, stamp, counter increment, rate
    /// recompute) runs in one transaction so concurrent attempts on the same
    /// click cannot double-apply a stage.
    pub async fn track(
        &self,
        tracking_code: &str,
        stage: JourneyStage,
        client_id: Option<Uuid>,
        metadata: Option<JsonValue>,
    ) -> CoreResult<TrackResult> {
        let mut tx = self.pool.begin().await?;

        // Most recent click wins when a code has been reused.
        let click: Option<LinkClick> = sqlx::query_as(
            "SELECT * FROM link_clicks WHERE tracking_code = $1 ORDER BY clicked_at DESC LIMIT 1 FOR UPDATE",
        )
        .bind(tracking_code)
        .fetch_optional(&mut *tx)
        .await?;

        let click = click.ok_or_else(|| CoreError::not_found("Click"))?;

        if let Err(reason) = validate_transition(&click, stage) {
            return Err(CoreError::stage_violation(reason));
        }

        // CAS on the nullable timestamp backs up the row lock.
        let stamped = match stage {
            JourneyStage::Clicked => unreachable!("rejected by validate_transition"),
            JourneyStage::IntakeStarted => {
                sqlx::query(
                    r#"
                    UPDATE link_clicks
                    SET intake_started_at = NOW(),
                        stage_metadata = COALESCE(stage_metadata, '{}'::jsonb) || COALESCE($2, '{}'::jsonb)
                    WHERE id = $1 AND intake_started_at IS NULL
                    "#,
                )
                .bind(click.id)
                .bind(&metadata)
                .execute(&mut *tx)
                .await?
            }
            JourneyStage::IntakeCompleted => {
                sqlx::query(
                    r#"
                    UPDATE link_clicks
                    SET intake_completed_at = NOW(),
                        converted = true,
                        client_id = COALESCE($2, client_id),
                        stage_metadata = COALESCE(stage_metadata, '{}'::jsonb) || COALESCE($3, '{}'::jsonb)
                    WHERE id = $1 AND intake_started_at IS NOT NULL AND intake_completed_at IS NULL
                    "#,
                )
                .bind(click.id)
                .bind(client_id)
                .bind(&metadata)
                .execute(&mut *tx)
                .await?
            }
            JourneyStage::ReturnFiled => {
                sqlx::query(
                    r#"
                    UPDATE link_clicks
                    SET tax_return_completed_at = NOW(),
                        stage_metadata = COALESCE(stage_metadata, '{}'::jsonb) || COALESCE($2, '{}'::jsonb)
                    WHERE id = $1 AND intake_completed_at IS NOT NULL AND tax_return_completed_at IS NULL
                    "#,
                )
                .bind(click.id)
                .bind(&metadata)
                .execute(&mut *tx)
                .await?
            }
        };

        if stamped.rows_affected() == 0 {
            return Err(CoreError::stage_violation(format!(
                "stage {} was applied concurrently",
                stage.as_str()
            )));
        }

        let counter_update = match stage {
            JourneyStage::Clicked => unreachable!(),
            JourneyStage::IntakeStarted => {
                "UPDATE marketing_links SET intake_starts = intake_starts + 1 WHERE id = $1"
            }
            JourneyStage::IntakeCompleted => {
                "UPDATE marketing_links SET intake_completes = intake_completes + 1, conversions = conversions + 1 WHERE id = $1"
            }
            JourneyStage::ReturnFiled => {
                "UPDATE marketing_links SET returns_filed = returns_filed + 1 WHERE id = $1"
            }
        };
        sqlx::query(counter_update)
            .bind(click.link_id)
            .execute(&mut *tx)
            .await?;

        recompute_rates(&mut tx, click.link_id).await?;

        let updated: LinkClick = sqlx::query_as("SELECT * FROM link_clicks WHERE id = $1")
            .bind(click.id)
            .fetch_one(&mut *tx)
            .await?;

        let link: MarketingLink = sqlx::query_as("SELECT * FROM marketing_links WHERE id = $1")
            .bind(click.link_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            "Click {} advanced to {} (link {})",
            updated.id,
            stage.as_str(),
            link.id
        );

        Ok(TrackResult {
            click: updated,
            link_id: link.id,
            link_name: link.name,
            link_created_by: link.created_by,
        })
    }

    /// Current journey position for a tracking code.
    pub async fn get_status(&self, tracking_code: &str) -> CoreResult<JourneyStatus> {
        let click: Option<LinkClick> = sqlx::query_as(
            "SELECT * FROM link_clicks WHERE tracking_code = $1 ORDER BY clicked_at DESC LIMIT 1",
        )
        .bind(tracking_code)
        .fetch_optional(&self.pool)
        .await?;

        let click = click.ok_or_else(|| CoreError::not_found("Click"))?;
        let stage = JourneyStage::current(&click);

        Ok(JourneyStatus { click, stage })
    }
}

/// Recompute the link's derived conversion rates from its counters.
async fn recompute_rates(tx: &mut Transaction<'_, Postgres>, link_id: Uuid) -> CoreResult<()> {
    sqlx::query(
        r#"
        UPDATE marketing_links
        SET intake_conversion_rate = CASE WHEN clicks = 0 THEN 0 ELSE intake_starts::float8 / clicks * 100 END,
            complete_conversion_rate = CASE WHEN clicks = 0 THEN 0 ELSE intake_completes::float8 / clicks * 100 END,
            filed_conversion_rate = CASE WHEN clicks = 0 THEN 0 ELSE returns_filed::float8 / clicks * 100 END
        WHERE id = $1
        "#,
    )
    .bind(link_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn generate_tracking_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TRACKING_CODE_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn click_at_stage(stage: JourneyStage) -> LinkClick {
        let now = Utc::now();
        LinkClick {
            id: Uuid::new_v4(),
            link_id: Uuid::new_v4(),
            tracking_code: "ab12cd34ef56".to_string(),
            ip_address: None,
            user_agent: None,
            referrer: None,
            clicked_at: now,
            intake_started_at: matches!(
                stage,
                JourneyStage::IntakeStarted | JourneyStage::IntakeCompleted | JourneyStage::ReturnFiled
            )
            .then_some(now),
            intake_completed_at: matches!(
                stage,
                JourneyStage::IntakeCompleted | JourneyStage::ReturnFiled
            )
            .then_some(now),
            tax_return_completed_at: matches!(stage, JourneyStage::ReturnFiled).then_some(now),
            converted: false,
            client_id: None,
            stage_metadata: None,
        }
    }

    #[test]
    fn test_monotonic_progression() {
        let click = click_at_stage(JourneyStage::Clicked);
        assert!(validate_transition(&click, JourneyStage::IntakeStarted).is_ok());

        let click = click_at_stage(JourneyStage::IntakeStarted);
        assert!(validate_transition(&click, JourneyStage::IntakeCompleted).is_ok());

        let click = click_at_stage(JourneyStage::IntakeCompleted);
        assert!(validate_transition(&click, JourneyStage::ReturnFiled).is_ok());
    }

    #[test]
    fn test_no_skipping() {
        let click = click_at_stage(JourneyStage::Clicked);
        assert!(validate_transition(&click, JourneyStage::IntakeCompleted).is_err());
        assert!(validate_transition(&click, JourneyStage::ReturnFiled).is_err());

        let click = click_at_stage(JourneyStage::IntakeStarted);
        assert!(validate_transition(&click, JourneyStage::ReturnFiled).is_err());
    }

    #[test]
    fn test_no_repeats() {
        let click = click_at_stage(JourneyStage::IntakeStarted);
        let err = validate_transition(&click, JourneyStage::IntakeStarted).unwrap_err();
        assert!(err.contains("already started"));

        let click = click_at_stage(JourneyStage::ReturnFiled);
        assert!(validate_transition(&click, JourneyStage::ReturnFiled).is_err());
    }

    #[test]
    fn test_clicked_is_not_trackable() {
        let click = click_at_stage(JourneyStage::Clicked);
        assert!(validate_transition(&click, JourneyStage::Clicked).is_err());
    }

    #[test]
    fn test_current_stage() {
        assert_eq!(
            JourneyStage::current(&click_at_stage(JourneyStage::Clicked)),
            JourneyStage::Clicked
        );
        assert_eq!(
            JourneyStage::current(&click_at_stage(JourneyStage::IntakeCompleted)),
            JourneyStage::IntakeCompleted
        );
        assert_eq!(
            JourneyStage::current(&click_at_stage(JourneyStage::ReturnFiled)),
            JourneyStage::ReturnFiled
        );
    }

    #[test]
    fn test_conversion_rate() {
        assert_eq!(conversion_rate(0, 0), 0.0);
        assert_eq!(conversion_rate(5, 0), 0.0);
        assert_eq!(conversion_rate(1, 1), 100.0);
        assert_eq!(conversion_rate(1, 4), 25.0);
        assert!((conversion_rate(1, 3) - 33.333333).abs() < 0.001);
        assert!(conversion_rate(0, 10) >= 0.0);
    }

    #[test]
    fn test_stage_round_trip() {
        for stage in [
            JourneyStage::Clicked,
            JourneyStage::IntakeStarted,
            JourneyStage::IntakeCompleted,
            JourneyStage::ReturnFiled,
        ] {
            assert_eq!(JourneyStage::parse(stage.as_str()), Some(stage));
        }
        assert_eq!(JourneyStage::parse("UNKNOWN"), None);
    }

    #[test]
    fn test_tracking_code_shape() {
        let code = generate_tracking_code();
        assert_eq!(code.len(), TRACKING_CODE_LEN);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
