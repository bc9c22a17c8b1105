//! Profile lookup used to denormalize actor names onto activity records.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Profile {
    pub first_name: String,
    pub last_name: String,
}

impl Profile {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Look up a profile by id. `None` means the profile does not resolve;
    /// callers decide whether that is an error or a fallback.
    async fn profile(&self, user_id: Uuid) -> Option<Profile>;
}

#[derive(Debug, Clone)]
pub struct PgIdentityResolver {
    pool: PgPool,
}

impl PgIdentityResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityResolver for PgIdentityResolver {
    async fn profile(&self, user_id: Uuid) -> Option<Profile> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT first_name, last_name FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!("Profile lookup failed for {}: {}", user_id, e);
                    None
                });

        row.map(|(first_name, last_name)| Profile {
            first_name,
            last_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_display_name() {
        let profile = Profile {
            first_name: "Alma".to_string(),
            last_name: "Reyes".to_string(),
        };
        assert_eq!(profile.display_name(), "Alma Reyes");
    }
}
