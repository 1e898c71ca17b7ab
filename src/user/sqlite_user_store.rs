use crate::recommendation::Recommendation;
use crate::sqlite_column;
use crate::sqlite_persistence::{
    open_versioned_db, Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
    DEFAULT_TIMESTAMP,
};
use crate::user::*;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::{
    path::Path,
    str::FromStr,
    sync::{Arc, Mutex},
    time::SystemTime,
};
use tracing::{debug, warn};

use super::auth::MoodifyHasher;

/// V 0
const USER_TABLE_V_0: Table = Table {
    name: "user",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            is_unique = true
        ),
        sqlite_column!("username", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("email", &SqlType::Text, non_null = true),
        sqlite_column!(
            "token_version",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_user_username", "username")],
};
const USER_PASSWORD_CREDENTIALS_V_0: Table = Table {
    name: "user_password_credentials",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            is_unique = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "user",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("salt", &SqlType::Text, non_null = true),
        sqlite_column!("hash", &SqlType::Text, non_null = true),
        sqlite_column!("hasher", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("last_tried", &SqlType::Integer),
        sqlite_column!("last_used", &SqlType::Integer),
    ],
    indices: &[],
};
const USER_PROFILE_TABLE_V_0: Table = Table {
    name: "user_profile",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Text,
            is_primary_key = true,
            non_null = true,
            is_unique = true
        ),
        sqlite_column!(
            "username",
            &SqlType::Text,
            non_null = true,
            is_unique = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "user",
                foreign_column: "username",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_user_profile_username", "username")],
};
const MOOD_HISTORY_TABLE_V_0: Table = Table {
    name: "mood_history",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            is_unique = true
        ),
        sqlite_column!(
            "profile_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "user_profile",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("mood", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_mood_history_profile_id", "profile_id")],
};
const LISTENING_HISTORY_TABLE_V_0: Table = Table {
    name: "listening_history",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            is_unique = true
        ),
        sqlite_column!(
            "profile_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "user_profile",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("track", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_listening_history_profile_id", "profile_id")],
};

/// V 1
const SAVED_RECOMMENDATION_TABLE_V_1: Table = Table {
    name: "saved_recommendation",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            is_unique = true
        ),
        sqlite_column!(
            "profile_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "user_profile",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("artist", &SqlType::Text, non_null = true),
        sqlite_column!("preview_url", &SqlType::Text),
        sqlite_column!("external_url", &SqlType::Text),
        sqlite_column!("image_url", &SqlType::Text),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_saved_recommendation_profile_id", "profile_id")],
};

pub const VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[
            USER_TABLE_V_0,
            USER_PASSWORD_CREDENTIALS_V_0,
            USER_PROFILE_TABLE_V_0,
            MOOD_HISTORY_TABLE_V_0,
            LISTENING_HISTORY_TABLE_V_0,
        ],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[
            USER_TABLE_V_0,
            USER_PASSWORD_CREDENTIALS_V_0,
            USER_PROFILE_TABLE_V_0,
            MOOD_HISTORY_TABLE_V_0,
            LISTENING_HISTORY_TABLE_V_0,
            SAVED_RECOMMENDATION_TABLE_V_1,
        ],
        migration: Some(|conn: &Connection| {
            SAVED_RECOMMENDATION_TABLE_V_1.create(conn)?;
            Ok(())
        }),
    },
];

fn system_time_from_column_result(value: i64) -> SystemTime {
    SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(value.max(0) as u64)
}

fn user_account_from_row(row: &rusqlite::Row) -> rusqlite::Result<UserAccount> {
    Ok(UserAccount {
        id: row.get::<_, i64>(0)? as usize,
        username: row.get(1)?,
        email: row.get(2)?,
        token_version: row.get::<_, i64>(3)? as u32,
        created: system_time_from_column_result(row.get(4)?),
    })
}

#[derive(Clone)]
pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUserStore {
    pub fn new<T: AsRef<Path>>(db_path: T) -> Result<Self> {
        let conn = open_versioned_db(db_path, VERSIONED_SCHEMAS)?;
        Ok(SqliteUserStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn history(conn: &Connection, profile_id: &str, kind: HistoryKind) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE profile_id = ?1 ORDER BY id",
            kind.value_column(),
            kind.table_name()
        ))?;
        let values = stmt
            .query_map(params![profile_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(values)
    }

    fn recommendations(conn: &Connection, profile_id: &str) -> Result<Vec<Recommendation>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT name, artist, preview_url, external_url, image_url FROM {} WHERE profile_id = ?1 ORDER BY id",
            SAVED_RECOMMENDATION_TABLE_V_1.name
        ))?;
        let values = stmt
            .query_map(params![profile_id], |row| {
                Ok(Recommendation {
                    name: row.get(0)?,
                    artist: row.get(1)?,
                    preview_url: row.get(2)?,
                    external_url: row.get(3)?,
                    image_url: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<Recommendation>, _>>()?;
        Ok(values)
    }

    fn load_profile(conn: &Connection, column: &str, value: &str) -> Result<Option<UserProfile>> {
        let row = conn
            .query_row(
                &format!(
                    "SELECT id, username, created FROM {} WHERE {} = ?1",
                    USER_PROFILE_TABLE_V_0.name, column
                ),
                params![value],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((id, username, created)) = row else {
            return Ok(None);
        };

        Ok(Some(UserProfile {
            mood_history: Self::history(conn, &id, HistoryKind::Mood)?,
            listening_history: Self::history(conn, &id, HistoryKind::Listening)?,
            recommendations: Self::recommendations(conn, &id)?,
            created_at: DateTime::<Utc>::from_timestamp(created, 0).unwrap_or_default(),
            id,
            username,
        }))
    }

    fn require_profile(conn: &Connection, profile_id: &str) -> Result<()> {
        let exists = conn
            .query_row(
                "SELECT 1 FROM user_profile WHERE id = ?1",
                params![profile_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            bail!("Profile {} not found", profile_id);
        }
        Ok(())
    }
}

impl UserStore for SqliteUserStore {
    fn create_user(&self, username: &str, email: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO user (username, email) VALUES (?1, ?2)",
            params![username, email],
        )
        .with_context(|| format!("Failed to create user {}", username))?;
        Ok(conn.last_insert_rowid() as usize)
    }

    fn register_user(
        &self,
        username: &str,
        email: &str,
        password: &UsernamePasswordCredentials,
    ) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO user (username, email) VALUES (?1, ?2)",
            params![username, email],
        )
        .with_context(|| format!("Failed to create user {}", username))?;
        let user_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO user_password_credentials (salt, hash, hasher, user_id) VALUES (?1, ?2, ?3, ?4)",
            params![
                password.salt,
                password.hash,
                password.hasher.to_string(),
                user_id
            ],
        )?;
        let profile_id = uuid::Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO user_profile (id, username) VALUES (?1, ?2)",
            params![profile_id, username],
        )
        .with_context(|| format!("Failed to create profile for {}", username))?;
        tx.commit()?;
        debug!("Registered {} with profile {}", username, profile_id);
        Ok(user_id as usize)
    }

    fn get_user(&self, user_id: usize) -> Result<Option<UserAccount>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT id, username, email, token_version, created FROM user WHERE id = ?1",
                params![user_id as i64],
                user_account_from_row,
            )
            .optional()?)
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<UserAccount>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT id, username, email, token_version, created FROM user WHERE username = ?1",
                params![username],
                user_account_from_row,
            )
            .optional()?)
    }

    fn get_all_usernames(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT username FROM {} ORDER BY id",
            USER_TABLE_V_0.name
        ))?;
        let rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(rows)
    }

    fn update_user_email(&self, user_id: usize, email: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE user SET email = ?1 WHERE id = ?2",
            params![email, user_id as i64],
        )?;
        if updated == 0 {
            bail!("User {} not found", user_id);
        }
        Ok(())
    }

    fn bump_token_version(&self, user_id: usize) -> Result<u32> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE user SET token_version = token_version + 1 WHERE id = ?1",
            params![user_id as i64],
        )?;
        if updated == 0 {
            bail!("User {} not found", user_id);
        }
        let version: i64 = conn.query_row(
            "SELECT token_version FROM user WHERE id = ?1",
            params![user_id as i64],
            |row| row.get(0),
        )?;
        Ok(version as u32)
    }

    fn delete_user(&self, user_id: usize) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM user WHERE id = ?1", params![user_id as i64])?;
        Ok(deleted > 0)
    }
}

impl UserAuthCredentialsStore for SqliteUserStore {
    fn get_user_auth_credentials(&self, username: &str) -> Result<Option<UserAuthCredentials>> {
        let Some(user) = self.get_user_by_username(username)? else {
            return Ok(None);
        };
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT salt, hash, hasher, created, last_tried, last_used FROM user_password_credentials WHERE user_id = ?1",
                params![user.id as i64],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                        row.get::<_, Option<i64>>(5)?,
                    ))
                },
            )
            .optional()?;

        let username_password = match row {
            Some((salt, hash, hasher, created, last_tried, last_used)) => {
                let hasher = MoodifyHasher::from_str(&hasher)
                    .with_context(|| format!("Invalid hasher for user {}", username))?;
                Some(UsernamePasswordCredentials {
                    user_id: user.id,
                    salt,
                    hash,
                    hasher,
                    created: created
                        .map(system_time_from_column_result)
                        .unwrap_or(SystemTime::UNIX_EPOCH),
                    last_tried: last_tried.map(system_time_from_column_result),
                    last_used: last_used.map(system_time_from_column_result),
                })
            }
            None => None,
        };

        Ok(Some(UserAuthCredentials {
            user_id: user.id,
            username_password,
        }))
    }

    fn update_user_auth_credentials(&self, credentials: UserAuthCredentials) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let user_id = credentials.user_id as i64;
        match credentials.username_password.as_ref() {
            Some(password_credentials) => {
                let updated = conn.execute(
                    "UPDATE user_password_credentials SET salt = ?1, hash = ?2, hasher = ?3 WHERE user_id = ?4",
                    params![
                        password_credentials.salt,
                        password_credentials.hash,
                        password_credentials.hasher.to_string(),
                        user_id
                    ],
                )?;
                if updated == 0 {
                    conn.execute(
                        "INSERT INTO user_password_credentials (salt, hash, hasher, user_id) VALUES (?1, ?2, ?3, ?4)",
                        params![
                            password_credentials.salt,
                            password_credentials.hash,
                            password_credentials.hasher.to_string(),
                            user_id
                        ],
                    )?;
                }
            }
            None => {
                conn.execute(
                    "DELETE FROM user_password_credentials WHERE user_id = ?1",
                    params![user_id],
                )?;
            }
        };
        Ok(())
    }
}

impl UserProfileStore for SqliteUserStore {
    fn create_profile(&self, username: &str) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO user_profile (id, username) VALUES (?1, ?2)",
            params![id, username],
        )
        .with_context(|| format!("Failed to create profile for {}", username))?;
        debug!("Created profile {} for {}", id, username);
        Ok(id)
    }

    fn get_profile(&self, profile_id: &str) -> Result<Option<UserProfile>> {
        let conn = self.conn.lock().unwrap();
        Self::load_profile(&conn, "id", profile_id)
    }

    fn get_profile_by_username(&self, username: &str) -> Result<Option<UserProfile>> {
        let conn = self.conn.lock().unwrap();
        Self::load_profile(&conn, "username", username)
    }

    fn delete_profile(&self, profile_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM user_profile WHERE id = ?1",
            params![profile_id],
        )?;
        Ok(deleted > 0)
    }

    fn append_history(&self, profile_id: &str, kind: HistoryKind, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::require_profile(&conn, profile_id)?;
        conn.execute(
            &format!(
                "INSERT INTO {} (profile_id, {}) VALUES (?1, ?2)",
                kind.table_name(),
                kind.value_column()
            ),
            params![profile_id, value],
        )?;
        Ok(())
    }

    fn remove_history_entry(
        &self,
        profile_id: &str,
        kind: HistoryKind,
        value: &str,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let table = kind.table_name();
        let deleted = conn.execute(
            &format!(
                "DELETE FROM {table} WHERE id = (SELECT id FROM {table} WHERE profile_id = ?1 AND {} = ?2 ORDER BY id LIMIT 1)",
                kind.value_column()
            ),
            params![profile_id, value],
        )?;
        Ok(deleted > 0)
    }

    fn replace_history(
        &self,
        profile_id: &str,
        kind: HistoryKind,
        values: &[String],
    ) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        Self::require_profile(&conn, profile_id)?;
        let tx = conn.transaction()?;
        tx.execute(
            &format!("DELETE FROM {} WHERE profile_id = ?1", kind.table_name()),
            params![profile_id],
        )?;
        {
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {} (profile_id, {}) VALUES (?1, ?2)",
                kind.table_name(),
                kind.value_column()
            ))?;
            for value in values {
                insert.execute(params![profile_id, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn append_recommendations(
        &self,
        profile_id: &str,
        recommendations: &[Recommendation],
    ) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        Self::require_profile(&conn, profile_id)?;
        let tx = conn.transaction()?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO saved_recommendation (profile_id, name, artist, preview_url, external_url, image_url) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for rec in recommendations {
                if rec.name.is_empty() {
                    warn!("Saving a recommendation without a name for {}", profile_id);
                }
                insert.execute(params![
                    profile_id,
                    rec.name,
                    rec.artist,
                    rec.preview_url,
                    rec.external_url,
                    rec.image_url
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn clear_recommendations(&self, profile_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.execute(
            "DELETE FROM saved_recommendation WHERE profile_id = ?1",
            params![profile_id],
        )?)
    }
}
