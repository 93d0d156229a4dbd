use chrono::{DateTime, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{postgres::PgPoolOptions, types::Json, FromRow, PgPool};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        Assignment, DateRange, Experiment, Insight, Interaction, InteractionFilter, ItemFilter,
        ItemUpdate, Newsletter, ProfileUpdate, RecommendationProfile, UserProfile, Variant,
    },
};

use super::store::{ExperimentStore, InsightStore, InteractionStore, ItemStore, ProfileStore};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Applies the embedded schema migrations
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Encodes a unit enum as the text its serde representation uses
fn to_text<T: Serialize>(column: &str, value: &T) -> AppResult<String> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => Ok(s),
        Ok(other) => Err(AppError::InvalidInput(format!(
            "{} must encode as text, got {}",
            column, other
        ))),
        Err(e) => Err(AppError::InvalidInput(format!(
            "cannot encode {} value: {}",
            column, e
        ))),
    }
}

fn opt_text<T: Serialize>(column: &str, value: Option<&T>) -> AppResult<Option<String>> {
    value.map(|v| to_text(column, v)).transpose()
}

fn from_text<T: DeserializeOwned>(column: &str, value: String) -> AppResult<T> {
    serde_json::from_value(serde_json::Value::String(value.clone())).map_err(|_| {
        AppError::StoreUnavailable(format!("unexpected {} value '{}'", column, value))
    })
}

/// PostgreSQL implementation of every storage trait
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct NewsletterRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    categories: Vec<String>,
    tags: Vec<String>,
    subscriber_count: i64,
    content_type: String,
    cadence: String,
    last_published_at: Option<DateTime<Utc>>,
    recommendation_score: f64,
    status: String,
}

impl TryFrom<NewsletterRow> for Newsletter {
    type Error = AppError;

    fn try_from(row: NewsletterRow) -> AppResult<Self> {
        Ok(Newsletter {
            id: row.id,
            title: row.title,
            description: row.description,
            categories: row.categories.into_iter().collect(),
            tags: row.tags.into_iter().collect(),
            subscriber_count: row.subscriber_count.max(0) as u64,
            content_type: from_text("content_type", row.content_type)?,
            cadence: from_text("cadence", row.cadence)?,
            last_published_at: row.last_published_at,
            recommendation_score: row.recommendation_score,
            status: from_text("status", row.status)?,
        })
    }
}

const NEWSLETTER_COLUMNS: &str = "id, title, description, categories, tags, subscriber_count, \
     content_type, cadence, last_published_at, recommendation_score, status";

#[async_trait::async_trait]
impl ItemStore for PgStore {
    async fn find(&self, filter: &ItemFilter) -> AppResult<Vec<Newsletter>> {
        let sql = format!(
            "SELECT {} FROM newsletters WHERE ($1::text IS NULL OR status = $1) \
             ORDER BY title LIMIT $2",
            NEWSLETTER_COLUMNS
        );
        let status = opt_text("status", filter.status.as_ref())?;
        let rows = sqlx::query_as::<_, NewsletterRow>(&sql)
            .bind(status)
            .bind(filter.limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Newsletter::try_from).collect()
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Newsletter>> {
        let sql = format!("SELECT {} FROM newsletters WHERE id = $1", NEWSLETTER_COLUMNS);
        let row = sqlx::query_as::<_, NewsletterRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Newsletter::try_from).transpose()
    }

    async fn update(&self, id: Uuid, update: &ItemUpdate) -> AppResult<()> {
        let status = opt_text("status", update.status.as_ref())?;
        sqlx::query(
            r#"
            UPDATE newsletters
            SET recommendation_score = COALESCE($2, recommendation_score),
                status = COALESCE($3, status)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(update.recommendation_score)
        .bind(status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[derive(FromRow)]
struct InteractionRow {
    id: Uuid,
    user_id: Uuid,
    item_id: Uuid,
    interaction_type: String,
    occurred_at: DateTime<Utc>,
    duration_secs: Option<i32>,
}

impl TryFrom<InteractionRow> for Interaction {
    type Error = AppError;

    fn try_from(row: InteractionRow) -> AppResult<Self> {
        Ok(Interaction {
            id: row.id,
            user_id: row.user_id,
            item_id: row.item_id,
            interaction_type: from_text("interaction_type", row.interaction_type)?,
            occurred_at: row.occurred_at,
            duration_secs: row.duration_secs.map(|d| d.max(0) as u32),
        })
    }
}

#[async_trait::async_trait]
impl InteractionStore for PgStore {
    async fn append(&self, interaction: &Interaction) -> AppResult<Uuid> {
        let interaction_type = to_text("interaction_type", &interaction.interaction_type)?;
        sqlx::query(
            r#"
            INSERT INTO interactions (id, user_id, item_id, interaction_type, occurred_at, duration_secs)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(interaction.id)
        .bind(interaction.user_id)
        .bind(interaction.item_id)
        .bind(interaction_type)
        .bind(interaction.occurred_at)
        .bind(interaction.duration_secs.map(|d| d as i32))
        .execute(&self.pool)
        .await?;

        Ok(interaction.id)
    }

    async fn query(&self, filter: &InteractionFilter) -> AppResult<Vec<Interaction>> {
        let rows = sqlx::query_as::<_, InteractionRow>(
            r#"
            SELECT id, user_id, item_id, interaction_type, occurred_at, duration_secs
            FROM interactions
            WHERE occurred_at >= $1
              AND ($2::uuid[] IS NULL OR user_id = ANY($2))
              AND ($3::uuid[] IS NULL OR item_id = ANY($3))
            ORDER BY occurred_at DESC
            LIMIT $4
            "#,
        )
        .bind(filter.since)
        .bind(filter.user_ids.clone())
        .bind(filter.item_ids.clone())
        .bind(filter.limit as i64)
        .fetch_all(&self.pool)
        .await?;

        // Newest rows were selected; callers expect oldest first
        let mut interactions = rows
            .into_iter()
            .map(Interaction::try_from)
            .collect::<AppResult<Vec<_>>>()?;
        interactions.reverse();
        Ok(interactions)
    }
}

#[derive(FromRow)]
struct ExperimentRow {
    id: Uuid,
    name: String,
    status: String,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    variants: Json<Vec<Variant>>,
    winner: Option<String>,
}

impl TryFrom<ExperimentRow> for Experiment {
    type Error = AppError;

    fn try_from(row: ExperimentRow) -> AppResult<Self> {
        Ok(Experiment {
            id: row.id,
            name: row.name,
            status: from_text("status", row.status)?,
            started_at: row.started_at,
            ended_at: row.ended_at,
            variants: row.variants.0,
            winner: row.winner,
        })
    }
}

#[derive(FromRow)]
struct AssignmentRow {
    user_id: Uuid,
    experiment_id: Uuid,
    variant: String,
    assigned_at: DateTime<Utc>,
}

impl From<AssignmentRow> for Assignment {
    fn from(row: AssignmentRow) -> Self {
        Assignment {
            user_id: row.user_id,
            experiment_id: row.experiment_id,
            variant: row.variant,
            assigned_at: row.assigned_at,
        }
    }
}

#[async_trait::async_trait]
impl ExperimentStore for PgStore {
    async fn get(&self, experiment_id: Uuid) -> AppResult<Option<Experiment>> {
        let row = sqlx::query_as::<_, ExperimentRow>(
            r#"
            SELECT id, name, status, started_at, ended_at, variants, winner
            FROM experiments
            WHERE id = $1
            "#,
        )
        .bind(experiment_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Experiment::try_from).transpose()
    }

    async fn put(&self, experiment: &Experiment) -> AppResult<()> {
        let status = to_text("status", &experiment.status)?;
        sqlx::query(
            r#"
            INSERT INTO experiments (id, name, status, started_at, ended_at, variants, winner)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                status = EXCLUDED.status,
                started_at = EXCLUDED.started_at,
                ended_at = EXCLUDED.ended_at,
                variants = EXCLUDED.variants,
                winner = EXCLUDED.winner
            "#,
        )
        .bind(experiment.id)
        .bind(&experiment.name)
        .bind(status)
        .bind(experiment.started_at)
        .bind(experiment.ended_at)
        .bind(Json(&experiment.variants))
        .bind(&experiment.winner)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_assignment(
        &self,
        user_id: Uuid,
        experiment_id: Uuid,
    ) -> AppResult<Option<Assignment>> {
        let row = sqlx::query_as::<_, AssignmentRow>(
            r#"
            SELECT user_id, experiment_id, variant, assigned_at
            FROM experiment_assignments
            WHERE user_id = $1 AND experiment_id = $2
            "#,
        )
        .bind(user_id)
        .bind(experiment_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Assignment::from))
    }

    async fn put_assignment_if_absent(&self, assignment: &Assignment) -> AppResult<Assignment> {
        sqlx::query(
            r#"
            INSERT INTO experiment_assignments (user_id, experiment_id, variant, assigned_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, experiment_id) DO NOTHING
            "#,
        )
        .bind(assignment.user_id)
        .bind(assignment.experiment_id)
        .bind(&assignment.variant)
        .bind(assignment.assigned_at)
        .execute(&self.pool)
        .await?;

        // Read back whichever row won the insert
        self.get_assignment(assignment.user_id, assignment.experiment_id)
            .await?
            .ok_or_else(|| {
                AppError::StoreUnavailable("assignment missing after insert".to_string())
            })
    }
}

#[derive(FromRow)]
struct InsightRow {
    date: NaiveDate,
    variant: String,
    total_recommendations: i64,
    positive_interactions: i64,
    negative_interactions: i64,
    average_score: f64,
}

impl From<InsightRow> for Insight {
    fn from(row: InsightRow) -> Self {
        Insight {
            date: row.date,
            variant: row.variant,
            total_recommendations: row.total_recommendations.max(0) as u64,
            positive_interactions: row.positive_interactions.max(0) as u64,
            negative_interactions: row.negative_interactions.max(0) as u64,
            average_score: row.average_score,
        }
    }
}

#[async_trait::async_trait]
impl InsightStore for PgStore {
    async fn append(&self, insight: &Insight) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO recommendation_insights
                (date, variant, total_recommendations, positive_interactions,
                 negative_interactions, average_score)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (date, variant) DO UPDATE
            SET average_score = CASE
                    WHEN recommendation_insights.total_recommendations + EXCLUDED.total_recommendations = 0
                        THEN recommendation_insights.average_score
                    ELSE (recommendation_insights.average_score * recommendation_insights.total_recommendations
                          + EXCLUDED.average_score * EXCLUDED.total_recommendations)
                         / (recommendation_insights.total_recommendations + EXCLUDED.total_recommendations)
                END,
                total_recommendations = recommendation_insights.total_recommendations + EXCLUDED.total_recommendations,
                positive_interactions = recommendation_insights.positive_interactions + EXCLUDED.positive_interactions,
                negative_interactions = recommendation_insights.negative_interactions + EXCLUDED.negative_interactions
            "#,
        )
        .bind(insight.date)
        .bind(&insight.variant)
        .bind(insight.total_recommendations as i64)
        .bind(insight.positive_interactions as i64)
        .bind(insight.negative_interactions as i64)
        .bind(insight.average_score)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query(&self, range: &DateRange, variant: Option<String>) -> AppResult<Vec<Insight>> {
        let rows = sqlx::query_as::<_, InsightRow>(
            r#"
            SELECT date, variant, total_recommendations, positive_interactions,
                   negative_interactions, average_score
            FROM recommendation_insights
            WHERE date BETWEEN $1 AND $2
              AND ($3::text IS NULL OR variant = $3)
            ORDER BY date, variant
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .bind(variant)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Insight::from).collect())
    }
}

#[derive(FromRow)]
struct ProfileRow {
    user_id: Uuid,
    categories: Vec<String>,
    cadence: Option<String>,
    depth: Option<String>,
    recommendation: Json<RecommendationProfile>,
}

impl TryFrom<ProfileRow> for UserProfile {
    type Error = AppError;

    fn try_from(row: ProfileRow) -> AppResult<Self> {
        Ok(UserProfile {
            user_id: row.user_id,
            categories: row.categories,
            cadence: row.cadence.map(|c| from_text("cadence", c)).transpose()?,
            depth: row.depth.map(|d| from_text("depth", d)).transpose()?,
            interaction_history: Vec::new(),
            recommendation: row.recommendation.0,
        })
    }
}

#[async_trait::async_trait]
impl ProfileStore for PgStore {
    async fn get_profile(&self, user_id: Uuid) -> AppResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"
            SELECT user_id, categories, cadence, depth, recommendation
            FROM user_profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserProfile::try_from).transpose()
    }

    async fn update_profile(&self, user_id: Uuid, update: &ProfileUpdate) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        // Materialize the row so the lock below holds for first-time users too
        sqlx::query(
            r#"
            INSERT INTO user_profiles (user_id)
            VALUES ($1)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, ProfileRow>(
            r#"
            SELECT user_id, categories, cadence, depth, recommendation
            FROM user_profiles
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut profile = UserProfile::try_from(row)?;
        profile.apply(update);
        let cadence = opt_text("cadence", profile.cadence.as_ref())?;
        let depth = opt_text("depth", profile.depth.as_ref())?;

        sqlx::query(
            r#"
            UPDATE user_profiles
            SET categories = $2,
                cadence = $3,
                depth = $4,
                recommendation = $5
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(&profile.categories)
        .bind(cadence)
        .bind(depth)
        .bind(Json(&profile.recommendation))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
