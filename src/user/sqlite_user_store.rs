use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, BASE_DB_VERSION,
    DEFAULT_TIMESTAMP,
};
use crate::user::*;
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::{
    path::Path,
    str::FromStr,
    sync::{Arc, Mutex},
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tracing::info;
use uuid::Uuid;

use super::auth::KaraokeHasher;

const USER_FK: ForeignKey = ForeignKey {
    foreign_table: "user",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};
const SONG_FK: ForeignKey = ForeignKey {
    foreign_table: "song",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};
const PLAYLIST_FK: ForeignKey = ForeignKey {
    foreign_table: "playlist",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

/// V 0
const USER_TABLE_V_0: Table = Table {
    name: "user",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text),
        sqlite_column!("email", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("image", &SqlType::Text),
        sqlite_column!(
            "is_premium",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("stripe_customer_id", &SqlType::Text),
        sqlite_column!("stripe_subscription_id", &SqlType::Text),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[],
    indices: &[("idx_user_name", "name")],
};
const AUTH_TOKEN_TABLE_V_0: Table = Table {
    name: "auth_token",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&USER_FK)
        ),
        sqlite_column!("value", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("last_used", &SqlType::Integer),
    ],
    unique_constraints: &[],
    indices: &[("idx_auth_token_value", "value")],
};
const USER_PASSWORD_CREDENTIALS_TABLE_V_0: Table = Table {
    name: "user_password_credentials",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&USER_FK)
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
    unique_constraints: &[&["user_id"]],
    indices: &[],
};

/// V 1
const SONG_TABLE_V_1: Table = Table {
    name: "song",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("artist", &SqlType::Text, non_null = true),
        sqlite_column!("album", &SqlType::Text),
        sqlite_column!("duration", &SqlType::Text, non_null = true),
        sqlite_column!("thumbnail", &SqlType::Text),
        sqlite_column!("source", &SqlType::Text, non_null = true),
        sqlite_column!("source_url", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[&["source_url"]],
    indices: &[("idx_song_created", "created")],
};
const PLAYLIST_TABLE_V_1: Table = Table {
    name: "playlist",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "user_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&USER_FK)
        ),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("description", &SqlType::Text),
        sqlite_column!("thumbnail", &SqlType::Text),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[],
    indices: &[("idx_playlist_user", "user_id")],
};
const PLAYLIST_SONG_TABLE_V_1: Table = Table {
    name: "playlist_song",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "playlist_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&PLAYLIST_FK)
        ),
        sqlite_column!(
            "song_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&SONG_FK)
        ),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "added",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[&["playlist_id", "song_id"]],
    indices: &[("idx_playlist_song_playlist", "playlist_id")],
};
const LIKED_SONG_TABLE_V_1: Table = Table {
    name: "liked_song",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "user_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&USER_FK)
        ),
        sqlite_column!(
            "song_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&SONG_FK)
        ),
        sqlite_column!(
            "liked_at",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[&["user_id", "song_id"]],
    indices: &[],
};
const LOCAL_SONG_TABLE_V_1: Table = Table {
    name: "local_song",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "user_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&USER_FK)
        ),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("artist", &SqlType::Text, non_null = true),
        sqlite_column!("duration", &SqlType::Text, non_null = true),
        sqlite_column!("file_path", &SqlType::Text, non_null = true),
        sqlite_column!("file_size", &SqlType::Integer, non_null = true),
        sqlite_column!("mime_type", &SqlType::Text, non_null = true),
        sqlite_column!(
            "uploaded_at",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[],
    indices: &[("idx_local_song_user", "user_id")],
};
const RECENTLY_PLAYED_TABLE_V_1: Table = Table {
    name: "recently_played",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "user_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&USER_FK)
        ),
        sqlite_column!(
            "song_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&SONG_FK)
        ),
        sqlite_column!(
            "played_at",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[],
    indices: &[("idx_recently_played_user", "user_id")],
};

/// V 2
const USER_TABLE_V_2: Table = Table {
    name: "user",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text),
        sqlite_column!("email", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!("image", &SqlType::Text),
        sqlite_column!(
            "is_premium",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("stripe_customer_id", &SqlType::Text),
        sqlite_column!("stripe_subscription_id", &SqlType::Text),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "token_version",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
    ],
    unique_constraints: &[],
    indices: &[("idx_user_name", "name")],
};
const AUTH_TOKEN_TABLE_V_2: Table = Table {
    name: "auth_token",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&USER_FK)
        ),
        sqlite_column!("value", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("last_used", &SqlType::Integer),
        sqlite_column!(
            "expires",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    unique_constraints: &[],
    indices: &[("idx_auth_token_value", "value")],
};

/// Session lifetime applied to tokens that predate the `expires` column.
const LEGACY_SESSION_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

const VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[
            USER_TABLE_V_0,
            AUTH_TOKEN_TABLE_V_0,
            USER_PASSWORD_CREDENTIALS_TABLE_V_0,
        ],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[
            USER_TABLE_V_0,
            AUTH_TOKEN_TABLE_V_0,
            USER_PASSWORD_CREDENTIALS_TABLE_V_0,
            SONG_TABLE_V_1,
            PLAYLIST_TABLE_V_1,
            PLAYLIST_SONG_TABLE_V_1,
            LIKED_SONG_TABLE_V_1,
            LOCAL_SONG_TABLE_V_1,
            RECENTLY_PLAYED_TABLE_V_1,
        ],
        migration: Some(|conn: &Connection| {
            SONG_TABLE_V_1.create(conn)?;
            PLAYLIST_TABLE_V_1.create(conn)?;
            PLAYLIST_SONG_TABLE_V_1.create(conn)?;
            LIKED_SONG_TABLE_V_1.create(conn)?;
            LOCAL_SONG_TABLE_V_1.create(conn)?;
            RECENTLY_PLAYED_TABLE_V_1.create(conn)?;
            Ok(())
        }),
    },
    VersionedSchema {
        version: 2,
        tables: &[
            USER_TABLE_V_2,
            AUTH_TOKEN_TABLE_V_2,
            USER_PASSWORD_CREDENTIALS_TABLE_V_0,
            SONG_TABLE_V_1,
            PLAYLIST_TABLE_V_1,
            PLAYLIST_SONG_TABLE_V_1,
            LIKED_SONG_TABLE_V_1,
            LOCAL_SONG_TABLE_V_1,
            RECENTLY_PLAYED_TABLE_V_1,
        ],
        migration: Some(|conn: &Connection| {
            conn.execute(
                "ALTER TABLE user ADD COLUMN token_version INTEGER NOT NULL DEFAULT 1",
                [],
            )?;
            conn.execute(
                "ALTER TABLE auth_token ADD COLUMN expires INTEGER NOT NULL DEFAULT 0",
                [],
            )?;
            conn.execute(
                "UPDATE auth_token SET expires = created + ?1",
                params![LEGACY_SESSION_MAX_AGE.as_secs() as i64],
            )?;
            Ok(())
        }),
    },
];

const USER_COLUMNS: &str = "id, name, email, image, is_premium, stripe_customer_id, stripe_subscription_id, token_version, created";
const SONG_COLUMNS: &str =
    "s.id, s.title, s.artist, s.album, s.duration, s.thumbnail, s.source, s.source_url, s.created";
const PLAYLIST_COLUMNS: &str = "p.id, p.user_id, p.name, p.description, p.thumbnail, p.created";

fn now_secs() -> i64 {
    system_time_to_secs(SystemTime::now())
}

fn system_time_to_secs(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn system_time_from_secs(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        image: row.get(3)?,
        is_premium: row.get::<_, i64>(4)? != 0,
        stripe_customer_id: row.get(5)?,
        stripe_subscription_id: row.get(6)?,
        token_version: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn song_from_row(row: &Row, offset: usize) -> rusqlite::Result<Song> {
    Ok(Song {
        id: row.get(offset)?,
        title: row.get(offset + 1)?,
        artist: row.get(offset + 2)?,
        album: row.get(offset + 3)?,
        duration: row.get(offset + 4)?,
        thumbnail: row.get(offset + 5)?,
        source: row.get(offset + 6)?,
        source_url: row.get(offset + 7)?,
        created_at: row.get(offset + 8)?,
    })
}

fn playlist_from_row(row: &Row, offset: usize) -> rusqlite::Result<Playlist> {
    Ok(Playlist {
        id: row.get(offset)?,
        user_id: row.get(offset + 1)?,
        name: row.get(offset + 2)?,
        description: row.get(offset + 3)?,
        thumbnail: row.get(offset + 4)?,
        created_at: row.get(offset + 5)?,
    })
}

fn auth_token_from_row(row: &Row) -> rusqlite::Result<AuthToken> {
    Ok(AuthToken {
        user_id: row.get(0)?,
        value: AuthTokenValue(row.get(1)?),
        created: system_time_from_secs(row.get(2)?),
        last_used: row.get::<_, Option<i64>>(3)?.map(system_time_from_secs),
        expires: system_time_from_secs(row.get(4)?),
    })
}

pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUserStore {
    pub fn new<T: AsRef<Path>>(db_path: T) -> Result<Self> {
        let conn = if db_path.as_ref().exists() {
            Connection::open_with_flags(
                db_path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        } else {
            let conn = Connection::open(db_path)?;
            VERSIONED_SCHEMAS
                .last()
                .context("No schema defined")?
                .create(&conn)?;
            conn
        };
        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        let db_version = conn
            .query_row("PRAGMA user_version;", [], |row| row.get::<usize, i64>(0))
            .context("Failed to read database version")?
            - BASE_DB_VERSION as i64;

        if db_version < 0 {
            bail!(
                "Database version {} is too old, does not contain base db version {}",
                db_version,
                BASE_DB_VERSION
            );
        }
        let version = db_version as usize;

        if version >= VERSIONED_SCHEMAS.len() {
            bail!("Database version {} is too new", version);
        }
        VERSIONED_SCHEMAS
            .get(version)
            .context("Failed to get schema")?
            .validate(&conn)?;

        Self::migrate_if_needed(&conn, version)?;

        Ok(SqliteUserStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate_if_needed(conn: &Connection, version: usize) -> Result<()> {
        let mut latest_from = version;
        for schema in VERSIONED_SCHEMAS.iter().skip(version + 1) {
            if let Some(migration_fn) = schema.migration {
                info!(
                    "Migrating db from version {} to {}",
                    latest_from, schema.version
                );
                migration_fn(conn)?;
                latest_from = schema.version;
            }
        }
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + latest_from),
            [],
        )?;
        Ok(())
    }

    fn query_user(&self, where_clause: &str, arg: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        let user = conn
            .query_row(
                &format!("SELECT {} FROM user WHERE {}", USER_COLUMNS, where_clause),
                params![arg],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    fn query_songs_with<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<(String, i64, Song)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok((row.get(0)?, row.get(1)?, song_from_row(row, 2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl UserStore for SqliteUserStore {
    fn create_user(&self, name: Option<&str>, email: &str) -> Result<String> {
        let conn = self.conn.lock().unwrap();
        let id = new_id();
        match conn.execute(
            "INSERT INTO user (id, name, email, created) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, email, now_secs()],
        ) {
            Ok(_) => Ok(id),
            Err(err) if is_unique_violation(&err) => Err(DuplicateEntry("user").into()),
            Err(err) => Err(err).with_context(|| format!("Failed to create user {}", email)),
        }
    }

    fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        self.query_user("id = ?1", user_id)
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.query_user("email = ?1", email)
    }

    fn get_user_by_name(&self, name: &str) -> Result<Option<User>> {
        self.query_user("name = ?1", name)
    }

    fn get_all_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM user ORDER BY created DESC, rowid DESC",
            USER_COLUMNS
        ))?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    fn update_user(
        &self,
        user_id: &str,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>> {
        let updated = {
            let conn = self.conn.lock().unwrap();
            match conn.execute(
                "UPDATE user SET name = COALESCE(?2, name), email = COALESCE(?3, email) WHERE id = ?1",
                params![user_id, name, email],
            ) {
                Ok(n) => n,
                Err(err) if is_unique_violation(&err) => return Err(DuplicateEntry("user").into()),
                Err(err) => return Err(err.into()),
            }
        };
        if updated == 0 {
            return Ok(None);
        }
        self.get_user(user_id)
    }

    fn delete_user(&self, user_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.execute("DELETE FROM user WHERE id = ?1", params![user_id])? > 0)
    }

    fn set_user_premium(&self, user_id: &str, is_premium: bool) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE user SET is_premium = ?2 WHERE id = ?1",
            params![user_id, is_premium as i64],
        )?;
        Ok(changed > 0)
    }

    fn set_user_stripe_customer(&self, user_id: &str, customer_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE user SET stripe_customer_id = ?2 WHERE id = ?1",
            params![user_id, customer_id],
        )?;
        Ok(changed > 0)
    }

    fn set_user_stripe_subscription(
        &self,
        user_id: &str,
        subscription_id: Option<&str>,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE user SET stripe_subscription_id = ?2 WHERE id = ?1",
            params![user_id, subscription_id],
        )?;
        Ok(changed > 0)
    }

    fn bump_token_version(&self, user_id: &str) -> Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let version = conn
            .query_row(
                "UPDATE user SET token_version = token_version + 1 WHERE id = ?1 RETURNING token_version",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version)
    }

    fn get_user_stats(&self, user_id: &str) -> Result<Option<UserStats>> {
        let conn = self.conn.lock().unwrap();
        let stats = conn
            .query_row(
                "SELECT
                    (SELECT COUNT(*) FROM playlist WHERE user_id = u.id),
                    (SELECT COUNT(*) FROM liked_song WHERE user_id = u.id),
                    (SELECT COUNT(*) FROM recently_played WHERE user_id = u.id)
                 FROM user u WHERE u.id = ?1",
                params![user_id],
                |row| {
                    Ok(UserStats {
                        playlists: row.get::<_, i64>(0)? as usize,
                        liked_songs: row.get::<_, i64>(1)? as usize,
                        recently_played: row.get::<_, i64>(2)? as usize,
                    })
                },
            )
            .optional()?;
        Ok(stats)
    }
}

impl UserAuthCredentialsStore for SqliteUserStore {
    fn get_password_credentials(&self, user_id: &str) -> Result<Option<UsernamePasswordCredentials>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT user_id, salt, hash, hasher, created, last_tried, last_used
                 FROM user_password_credentials WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, Option<i64>>(5)?,
                        row.get::<_, Option<i64>>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((user_id, salt, hash, hasher, created, last_tried, last_used)) = row else {
            return Ok(None);
        };
        Ok(Some(UsernamePasswordCredentials {
            user_id,
            salt,
            hash,
            hasher: KaraokeHasher::from_str(&hasher)?,
            created: system_time_from_secs(created),
            last_tried: last_tried.map(system_time_from_secs),
            last_used: last_used.map(system_time_from_secs),
        }))
    }

    fn update_password_credentials(&self, credentials: &UsernamePasswordCredentials) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO user_password_credentials (user_id, salt, hash, hasher, created)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                salt = excluded.salt, hash = excluded.hash, hasher = excluded.hasher",
            params![
                credentials.user_id,
                credentials.salt,
                credentials.hash,
                credentials.hasher.to_string(),
                system_time_to_secs(credentials.created),
            ],
        )
        .with_context(|| format!("Failed to store credentials of user {}", credentials.user_id))?;
        Ok(())
    }

    fn record_password_attempt(&self, user_id: &str, success: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE user_password_credentials
             SET last_tried = ?2, last_used = CASE WHEN ?3 THEN ?2 ELSE last_used END
             WHERE user_id = ?1",
            params![user_id, now_secs(), success],
        )?;
        Ok(())
    }
}

impl UserAuthTokenStore for SqliteUserStore {
    fn get_user_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>> {
        let conn = self.conn.lock().unwrap();
        let token = conn
            .query_row(
                "SELECT user_id, value, created, last_used, expires FROM auth_token WHERE value = ?1",
                params![token.0],
                auth_token_from_row,
            )
            .optional()?;
        Ok(token)
    }

    fn delete_user_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn
            .query_row(
                "DELETE FROM auth_token WHERE value = ?1 RETURNING user_id, value, created, last_used, expires",
                params![token.0],
                auth_token_from_row,
            )
            .optional()?;
        Ok(deleted)
    }

    fn update_user_auth_token_last_used_timestamp(&self, token: &AuthTokenValue) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE auth_token SET last_used = ?2 WHERE value = ?1",
            params![token.0, now_secs()],
        )?;
        Ok(())
    }

    fn extend_user_auth_token(&self, token: &AuthTokenValue, expires: SystemTime) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE auth_token SET expires = ?2 WHERE value = ?1",
            params![token.0, system_time_to_secs(expires)],
        )?;
        Ok(changed > 0)
    }

    fn add_user_auth_token(&self, token: &AuthToken) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO auth_token (user_id, value, created, last_used, expires) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                token.user_id,
                token.value.0,
                system_time_to_secs(token.created),
                token.last_used.map(system_time_to_secs),
                system_time_to_secs(token.expires),
            ],
        )
        .with_context(|| format!("Failed to add auth token for user {}", token.user_id))?;
        Ok(())
    }

    fn prune_expired_auth_tokens(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM auth_token WHERE expires <= ?1",
            params![now_secs()],
        )?;
        Ok(deleted)
    }
}

impl MusicLibraryStore for SqliteUserStore {
    fn create_song(&self, song: &NewSong) -> Result<Song> {
        let conn = self.conn.lock().unwrap();
        let created = Song {
            id: new_id(),
            title: song.title.clone(),
            artist: song.artist.clone(),
            album: song.album.clone(),
            duration: song.duration.clone(),
            thumbnail: song.thumbnail.clone(),
            source: song.source.clone(),
            source_url: song.source_url.clone(),
            created_at: now_secs(),
        };
        match conn.execute(
            "INSERT INTO song (id, title, artist, album, duration, thumbnail, source, source_url, created)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                created.id,
                created.title,
                created.artist,
                created.album,
                created.duration,
                created.thumbnail,
                created.source,
                created.source_url,
                created.created_at,
            ],
        ) {
            Ok(_) => Ok(created),
            Err(err) if is_unique_violation(&err) => Err(DuplicateEntry("song").into()),
            Err(err) => Err(err).context("Failed to create song"),
        }
    }

    fn get_song(&self, song_id: &str) -> Result<Option<Song>> {
        let conn = self.conn.lock().unwrap();
        let song = conn
            .query_row(
                &format!("SELECT {} FROM song s WHERE s.id = ?1", SONG_COLUMNS),
                params![song_id],
                |row| song_from_row(row, 0),
            )
            .optional()?;
        Ok(song)
    }

    fn get_song_by_source_url(&self, source_url: &str) -> Result<Option<Song>> {
        let conn = self.conn.lock().unwrap();
        let song = conn
            .query_row(
                &format!("SELECT {} FROM song s WHERE s.source_url = ?1", SONG_COLUMNS),
                params![source_url],
                |row| song_from_row(row, 0),
            )
            .optional()?;
        Ok(song)
    }

    fn get_songs(&self) -> Result<Vec<Song>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM song s ORDER BY s.created DESC, s.rowid DESC",
            SONG_COLUMNS
        ))?;
        let songs = stmt
            .query_map([], |row| song_from_row(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(songs)
    }

    fn create_playlist(
        &self,
        user_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Playlist> {
        let conn = self.conn.lock().unwrap();
        let playlist = Playlist {
            id: new_id(),
            user_id: user_id.to_owned(),
            name: name.to_owned(),
            description: description.map(str::to_owned),
            thumbnail: None,
            created_at: now_secs(),
        };
        conn.execute(
            "INSERT INTO playlist (id, user_id, name, description, created) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                playlist.id,
                playlist.user_id,
                playlist.name,
                playlist.description,
                playlist.created_at
            ],
        )
        .with_context(|| format!("Failed to create playlist for user {}", user_id))?;
        Ok(playlist)
    }

    fn get_playlist(&self, playlist_id: &str) -> Result<Option<Playlist>> {
        let conn = self.conn.lock().unwrap();
        let playlist = conn
            .query_row(
                &format!("SELECT {} FROM playlist p WHERE p.id = ?1", PLAYLIST_COLUMNS),
                params![playlist_id],
                |row| playlist_from_row(row, 0),
            )
            .optional()?;
        Ok(playlist)
    }

    fn get_playlist_songs(&self, playlist_id: &str) -> Result<Vec<PlaylistSongEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT ps.position, {} FROM playlist_song ps JOIN song s ON s.id = ps.song_id
             WHERE ps.playlist_id = ?1 ORDER BY ps.position ASC",
            SONG_COLUMNS
        ))?;
        let songs = stmt
            .query_map(params![playlist_id], |row| {
                Ok(PlaylistSongEntry {
                    position: row.get(0)?,
                    song: song_from_row(row, 1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(songs)
    }

    fn get_user_playlists(&self, user_id: &str) -> Result<Vec<PlaylistSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, (SELECT COUNT(*) FROM playlist_song ps WHERE ps.playlist_id = p.id)
             FROM playlist p WHERE p.user_id = ?1 ORDER BY p.created DESC, p.rowid DESC",
            PLAYLIST_COLUMNS
        ))?;
        let playlists = stmt
            .query_map(params![user_id], |row| {
                Ok(PlaylistSummary {
                    playlist: playlist_from_row(row, 0)?,
                    count: PlaylistCount {
                        songs: row.get::<_, i64>(6)? as usize,
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(playlists)
    }

    fn get_public_playlists(
        &self,
        premium_owners_only: bool,
        limit: Option<usize>,
    ) -> Result<Vec<PublicPlaylist>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, (SELECT COUNT(*) FROM playlist_song ps WHERE ps.playlist_id = p.id),
                    u.id, u.name, u.email, u.is_premium
             FROM playlist p JOIN user u ON u.id = p.user_id
             WHERE (?1 = 0 OR u.is_premium = 1)
             ORDER BY p.created DESC, p.rowid DESC LIMIT ?2",
            PLAYLIST_COLUMNS
        ))?;
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let playlists = stmt
            .query_map(params![premium_owners_only, limit], |row| {
                Ok(PublicPlaylist {
                    playlist: playlist_from_row(row, 0)?,
                    count: PlaylistCount {
                        songs: row.get::<_, i64>(6)? as usize,
                    },
                    user: PlaylistOwner {
                        id: row.get(7)?,
                        name: row.get(8)?,
                        email: row.get(9)?,
                        is_premium: row.get::<_, i64>(10)? != 0,
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(playlists)
    }

    fn update_playlist(
        &self,
        playlist_id: &str,
        update: &PlaylistUpdate,
    ) -> Result<Option<Playlist>> {
        let changed = {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "UPDATE playlist SET
                    name = COALESCE(?2, name),
                    description = COALESCE(?3, description),
                    thumbnail = COALESCE(?4, thumbnail)
                 WHERE id = ?1",
                params![
                    playlist_id,
                    update.name,
                    update.description,
                    update.thumbnail
                ],
            )?
        };
        if changed == 0 {
            return Ok(None);
        }
        self.get_playlist(playlist_id)
    }

    fn delete_playlist(&self, playlist_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.execute("DELETE FROM playlist WHERE id = ?1", params![playlist_id])? > 0)
    }

    fn delete_duplicate_playlists(&self, user_id: &str, name: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM playlist WHERE user_id = ?1 AND name = ?2 AND id NOT IN (
                SELECT id FROM playlist WHERE user_id = ?1 AND name = ?2
                ORDER BY created DESC, rowid DESC LIMIT 1
             )",
            params![user_id, name],
        )?;
        Ok(deleted)
    }

    fn count_user_playlists(&self, user_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM playlist WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn add_song_to_playlist(&self, playlist_id: &str, song_id: &str) -> Result<Option<i64>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let already_present = tx
            .prepare("SELECT 1 FROM playlist_song WHERE playlist_id = ?1 AND song_id = ?2")?
            .exists(params![playlist_id, song_id])?;
        if already_present {
            return Ok(None);
        }
        let position: i64 = tx.query_row(
            "SELECT COALESCE(MAX(position), -1) + 1 FROM playlist_song WHERE playlist_id = ?1",
            params![playlist_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO playlist_song (id, playlist_id, song_id, position, added) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![new_id(), playlist_id, song_id, position, now_secs()],
        )?;
        tx.commit()?;
        Ok(Some(position))
    }

    fn remove_song_from_playlist(&self, playlist_id: &str, song_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM playlist_song WHERE playlist_id = ?1 AND song_id = ?2",
            params![playlist_id, song_id],
        )?;
        Ok(deleted > 0)
    }

    fn like_song(&self, user_id: &str, song_id: &str) -> Result<Option<LikedSong>> {
        let inserted = {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT OR IGNORE INTO liked_song (id, user_id, song_id, liked_at) VALUES (?1, ?2, ?3, ?4)",
                params![new_id(), user_id, song_id, now_secs()],
            )?
        };
        if inserted == 0 {
            return Ok(None);
        }
        Ok(self
            .get_liked_songs(user_id)?
            .into_iter()
            .find(|liked| liked.song_id == song_id))
    }

    fn unlike_song(&self, user_id: &str, song_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM liked_song WHERE user_id = ?1 AND song_id = ?2",
            params![user_id, song_id],
        )?;
        Ok(deleted > 0)
    }

    fn get_liked_songs(&self, user_id: &str) -> Result<Vec<LikedSong>> {
        let rows = self.query_songs_with(
            &format!(
                "SELECT l.id, l.liked_at, {} FROM liked_song l JOIN song s ON s.id = l.song_id
                 WHERE l.user_id = ?1 ORDER BY l.liked_at DESC, l.rowid DESC",
                SONG_COLUMNS
            ),
            params![user_id],
        )?;
        Ok(rows
            .into_iter()
            .map(|(id, liked_at, song)| LikedSong {
                id,
                user_id: user_id.to_owned(),
                song_id: song.id.clone(),
                liked_at,
                song,
            })
            .collect())
    }

    fn create_local_song(&self, song: &NewLocalSong) -> Result<LocalSong> {
        let conn = self.conn.lock().unwrap();
        let created = LocalSong {
            id: new_id(),
            user_id: song.user_id.clone(),
            title: song.title.clone(),
            artist: song.artist.clone(),
            duration: song.duration.clone(),
            file_path: song.file_path.clone(),
            file_size: song.file_size,
            mime_type: song.mime_type.clone(),
            uploaded_at: now_secs(),
        };
        conn.execute(
            "INSERT INTO local_song (id, user_id, title, artist, duration, file_path, file_size, mime_type, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                created.id,
                created.user_id,
                created.title,
                created.artist,
                created.duration,
                created.file_path,
                created.file_size,
                created.mime_type,
                created.uploaded_at,
            ],
        )
        .context("Failed to create local song")?;
        Ok(created)
    }

    fn get_local_songs(&self, user_id: &str) -> Result<Vec<LocalSong>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, title, artist, duration, file_path, file_size, mime_type, uploaded_at
             FROM local_song WHERE user_id = ?1 ORDER BY uploaded_at DESC, rowid DESC",
        )?;
        let songs = stmt
            .query_map(params![user_id], |row| {
                Ok(LocalSong {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    title: row.get(2)?,
                    artist: row.get(3)?,
                    duration: row.get(4)?,
                    file_path: row.get(5)?,
                    file_size: row.get(6)?,
                    mime_type: row.get(7)?,
                    uploaded_at: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(songs)
    }

    fn count_local_songs(&self, user_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM local_song WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn record_recently_played(&self, user_id: &str, song_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO recently_played (id, user_id, song_id, played_at) VALUES (?1, ?2, ?3, ?4)",
            params![new_id(), user_id, song_id, now_secs()],
        )?;
        Ok(())
    }

    fn get_recently_played(&self, user_id: &str, limit: usize) -> Result<Vec<RecentlyPlayedEntry>> {
        let rows = self.query_songs_with(
            &format!(
                "SELECT r.id, r.played_at, {} FROM recently_played r JOIN song s ON s.id = r.song_id
                 WHERE r.user_id = ?1 ORDER BY r.played_at DESC, r.rowid DESC LIMIT ?2",
                SONG_COLUMNS
            ),
            params![user_id, limit as i64],
        )?;
        Ok(rows
            .into_iter()
            .map(|(id, played_at, song)| RecentlyPlayedEntry {
                id,
                played_at,
                song,
            })
            .collect())
    }
}
