use crate::errors::{AppError, Result};
use crate::models::kyc::KycRecord;
use crate::models::user::User;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use uuid::Uuid;

#[derive(Debug)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    pub async fn new(database_path: &str) -> Result<Self> {
        // Ensure the directory exists
        if let Some(parent) = Path::new(database_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Database(format!("Failed to create database directory: {}", e))
            })?;
        }

        // Create the database file if it doesn't exist
        if !Path::new(database_path).exists() {
            std::fs::File::create(database_path).map_err(|e| {
                AppError::Database(format!("Failed to create database file: {}", e))
            })?;
        }
        let database_url = format!("sqlite:{}", database_path);

        let pool = SqlitePool::connect(&database_url)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to database: {}", e)))?;

        let db = Self { pool };

        // Create tables if they don't exist
        db.create_tables().await?;

        tracing::info!(action = "database_ready", path = %database_path);
        Ok(db)
    }

    async fn create_tables(&self) -> Result<()> {
        let query = r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kyc_records (
                id TEXT PRIMARY KEY,
                user_id TEXT UNIQUE NOT NULL,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                national_id TEXT NOT NULL,
                id_image_hash TEXT NOT NULL DEFAULT '',
                selfie_image_hash TEXT NOT NULL DEFAULT '',
                ai_verified BOOLEAN NOT NULL DEFAULT FALSE,
                admin_verified BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_kyc_records_user_id ON kyc_records(user_id);
        "#;

        sqlx::query(query)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to create tables: {}", e)))?;

        Ok(())
    }

    pub async fn create_user(&self, user: &User) -> Result<()> {
        let query = r#"
            INSERT INTO users (id, username, email, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
        "#;

        sqlx::query(query)
            .bind(user.id.to_string())
            .bind(&user.username)
            .bind(&user.email)
            .bind(user.created_at.to_rfc3339())
            .bind(user.updated_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to create user: {}", e)))?;

        Ok(())
    }

    pub async fn get_user_by_id(&self, user_id: &Uuid) -> Result<Option<User>> {
        let query = "SELECT * FROM users WHERE id = ?1";
        let row = sqlx::query(query)
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch user: {}", e)))?;

        row.map(|row| user_from_row(&row)).transpose()
    }

    /// Upsert after a successful face match: identity fields, fresh hashes,
    /// automated flag set. One atomic statement so concurrent submissions for
    /// the same user resolve to last-writer-wins without a read-modify-write
    /// race.
    pub async fn upsert_kyc_matched(
        &self,
        user_id: &Uuid,
        first_name: &str,
        last_name: &str,
        national_id: &str,
        id_image_hash: &str,
        selfie_image_hash: &str,
    ) -> Result<KycRecord> {
        let now = Utc::now().to_rfc3339();
        let query = r#"
            INSERT INTO kyc_records (id, user_id, first_name, last_name, national_id, id_image_hash, selfie_image_hash, ai_verified, admin_verified, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, TRUE, FALSE, ?8, ?8)
            ON CONFLICT(user_id) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                national_id = excluded.national_id,
                id_image_hash = excluded.id_image_hash,
                selfie_image_hash = excluded.selfie_image_hash,
                ai_verified = TRUE,
                updated_at = excluded.updated_at
        "#;

        sqlx::query(query)
            .bind(Uuid::new_v4().to_string())
            .bind(user_id.to_string())
            .bind(first_name)
            .bind(last_name)
            .bind(national_id)
            .bind(id_image_hash)
            .bind(selfie_image_hash)
            .bind(&now)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to upsert KYC record: {}", e)))?;

        self.get_kyc_by_user(user_id)
            .await?
            .ok_or_else(|| AppError::Database("KYC record missing after upsert".to_string()))
    }

    /// Upsert after a failed face match: identity fields are recorded and the
    /// automated flag drops to false, but previously stored hashes are left
    /// untouched.
    pub async fn upsert_kyc_unmatched(
        &self,
        user_id: &Uuid,
        first_name: &str,
        last_name: &str,
        national_id: &str,
    ) -> Result<KycRecord> {
        let now = Utc::now().to_rfc3339();
        let query = r#"
            INSERT INTO kyc_records (id, user_id, first_name, last_name, national_id, id_image_hash, selfie_image_hash, ai_verified, admin_verified, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, '', '', FALSE, FALSE, ?6, ?6)
            ON CONFLICT(user_id) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                national_id = excluded.national_id,
                ai_verified = FALSE,
                updated_at = excluded.updated_at
        "#;

        sqlx::query(query)
            .bind(Uuid::new_v4().to_string())
            .bind(user_id.to_string())
            .bind(first_name)
            .bind(last_name)
            .bind(national_id)
            .bind(&now)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to upsert KYC record: {}", e)))?;

        self.get_kyc_by_user(user_id)
            .await?
            .ok_or_else(|| AppError::Database("KYC record missing after upsert".to_string()))
    }

    pub async fn get_kyc_by_user(&self, user_id: &Uuid) -> Result<Option<KycRecord>> {
        let query = "SELECT * FROM kyc_records WHERE user_id = ?1";
        let row = sqlx::query(query)
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch KYC record: {}", e)))?;

        row.map(|row| kyc_from_row(&row)).transpose()
    }

    pub async fn get_kyc_by_id(&self, kyc_id: &Uuid) -> Result<Option<KycRecord>> {
        let query = "SELECT * FROM kyc_records WHERE id = ?1";
        let row = sqlx::query(query)
            .bind(kyc_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to fetch KYC record: {}", e)))?;

        row.map(|row| kyc_from_row(&row)).transpose()
    }

    /// Persist the outcome of an administrative re-verification. Hashes are
    /// refreshed only on a match.
    pub async fn update_kyc_ai_result(
        &self,
        kyc_id: &Uuid,
        matched: bool,
        hashes: Option<(&str, &str)>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        match hashes {
            Some((id_image_hash, selfie_image_hash)) => {
                sqlx::query(
                    "UPDATE kyc_records SET ai_verified = ?1, id_image_hash = ?2, selfie_image_hash = ?3, updated_at = ?4 WHERE id = ?5",
                )
                .bind(matched)
                .bind(id_image_hash)
                .bind(selfie_image_hash)
                .bind(&now)
                .bind(kyc_id.to_string())
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::Database(format!("Failed to update KYC record: {}", e)))?;
            }
            None => {
                sqlx::query(
                    "UPDATE kyc_records SET ai_verified = ?1, updated_at = ?2 WHERE id = ?3",
                )
                .bind(matched)
                .bind(&now)
                .bind(kyc_id.to_string())
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::Database(format!("Failed to update KYC record: {}", e)))?;
            }
        }

        Ok(())
    }

    /// Set only by the privileged human review flow; the automated path never
    /// touches this flag.
    pub async fn set_kyc_admin_verified(&self, kyc_id: &Uuid, verified: bool) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE kyc_records SET admin_verified = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(verified)
            .bind(&now)
            .bind(kyc_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Failed to update KYC record: {}", e)))?;

        Ok(())
    }
}

fn kyc_from_row(row: &SqliteRow) -> Result<KycRecord> {
    Ok(KycRecord {
        id: Uuid::parse_str(&row.get::<String, _>("id"))
            .map_err(|e| AppError::Database(format!("Invalid KYC record ID: {}", e)))?,
        user_id: Uuid::parse_str(&row.get::<String, _>("user_id"))
            .map_err(|e| AppError::Database(format!("Invalid user ID: {}", e)))?,
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        national_id: row.get("national_id"),
        id_image_hash: row.get("id_image_hash"),
        selfie_image_hash: row.get("selfie_image_hash"),
        ai_verified: row.get("ai_verified"),
        admin_verified: row.get("admin_verified"),
        created_at: chrono::DateTime::parse_from_rfc3339(&row.get::<String, _>("created_at"))
            .map_err(|e| AppError::Database(format!("Invalid created_at date: {}", e)))?
            .with_timezone(&chrono::Utc),
        updated_at: chrono::DateTime::parse_from_rfc3339(&row.get::<String, _>("updated_at"))
            .map_err(|e| AppError::Database(format!("Invalid updated_at date: {}", e)))?
            .with_timezone(&chrono::Utc),
    })
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: Uuid::parse_str(&row.get::<String, _>("id"))
            .map_err(|e| AppError::Database(format!("Invalid user ID: {}", e)))?,
        username: row.get("username"),
        email: row.get("email"),
        created_at: chrono::DateTime::parse_from_rfc3339(&row.get::<String, _>("created_at"))
            .map_err(|e| AppError::Database(format!("Invalid created_at date: {}", e)))?
            .with_timezone(&chrono::Utc),
        updated_at: chrono::DateTime::parse_from_rfc3339(&row.get::<String, _>("updated_at"))
            .map_err(|e| AppError::Database(format!("Invalid updated_at date: {}", e)))?
            .with_timezone(&chrono::Utc),
    })
}
