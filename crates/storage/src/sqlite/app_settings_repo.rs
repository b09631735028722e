use async_trait::async_trait;
use sqlx::Row;

use crate::repository::{AppSettingsRepository, StorageError};
use study_core::model::{AppSettings, AppSettingsDraft};

use super::SqliteRepository;
use super::mapping::{conn_err, ser};

#[async_trait]
impl AppSettingsRepository for SqliteRepository {
    async fn get_settings(&self) -> Result<Option<AppSettings>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT
                api_key,
                api_model,
                api_base_url,
                ai_system_prompt,
                quiz_stream_url
            FROM app_settings
            WHERE id = 1
            ",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(conn_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        AppSettings::from_persisted(AppSettingsDraft {
            api_key: row.try_get("api_key").map_err(ser)?,
            api_model: row.try_get("api_model").map_err(ser)?,
            api_base_url: row.try_get("api_base_url").map_err(ser)?,
            ai_system_prompt: row.try_get("ai_system_prompt").map_err(ser)?,
            quiz_stream_url: row.try_get("quiz_stream_url").map_err(ser)?,
        })
        .map(Some)
        .map_err(ser)
    }

    async fn save_settings(&self, settings: &AppSettings) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO app_settings (
                id,
                api_key,
                api_model,
                api_base_url,
                ai_system_prompt,
                quiz_stream_url
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                api_key = excluded.api_key,
                api_model = excluded.api_model,
                api_base_url = excluded.api_base_url,
                ai_system_prompt = excluded.ai_system_prompt,
                quiz_stream_url = excluded.quiz_stream_url
            ",
        )
        .bind(1_i64)
        .bind(settings.api_key())
        .bind(settings.api_model())
        .bind(settings.api_base_url())
        .bind(settings.ai_system_prompt())
        .bind(settings.quiz_stream_url())
        .execute(&self.pool)
        .await
        .map_err(conn_err)?;

        Ok(())
    }
}
