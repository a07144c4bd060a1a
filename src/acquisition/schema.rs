//! Database schema for acquisition.db.
//!
//! Defines versioned schema migrations for the queue, library, blacklist and
//! activity tables.

use crate::sqlite_column;
use crate::sqlite_persistence::{SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

// =============================================================================
// Version 0
// =============================================================================

/// Pending acquisition requests. `external_id` is deliberately not unique.
const QUEUE_ENTRIES_TABLE_V1: Table = Table {
    name: "queue_entries",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("media_kind", &SqlType::Text, non_null = true),
        sqlite_column!("external_id", &SqlType::Text, non_null = true),
        sqlite_column!("cover_url", &SqlType::Text),
        sqlite_column!("payload", &SqlType::Text, non_null = true),
        sqlite_column!("requested_by", &SqlType::Text, non_null = true),
        sqlite_column!("approved_by", &SqlType::Text),
        sqlite_column!(
            "attempts",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_queue_external_id", "external_id"),
        ("idx_queue_eligible", "approved_by, attempts, created_at"),
    ],
};

const BOOKS_TABLE_V1: Table = Table {
    name: "books",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("author", &SqlType::Text, non_null = true),
        sqlite_column!("publisher", &SqlType::Text),
        sqlite_column!("year", &SqlType::Text),
        sqlite_column!("extension", &SqlType::Text),
        sqlite_column!("path", &SqlType::Text, non_null = true),
        sqlite_column!("external_id", &SqlType::Text, non_null = true),
        sqlite_column!(
            "cache_key",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_books_external_id", "external_id")],
};

const SONGS_TABLE_V1: Table = Table {
    name: "songs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("artist", &SqlType::Text, non_null = true),
        sqlite_column!("album", &SqlType::Text),
        sqlite_column!("release_date", &SqlType::Text),
        sqlite_column!("isrc", &SqlType::Text),
        sqlite_column!("path", &SqlType::Text, non_null = true),
        sqlite_column!("external_id", &SqlType::Text, non_null = true),
        sqlite_column!(
            "cache_key",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_songs_external_id", "external_id")],
};

const BLACKLIST_TABLE_V1: Table = Table {
    name: "blacklist",
    columns: &[
        sqlite_column!("external_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("media_kind", &SqlType::Text, non_null = true),
        sqlite_column!("created_by", &SqlType::Text),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
};

const ACTIVITY_TABLE_V1: Table = Table {
    name: "activity",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("kind", &SqlType::Text, non_null = true),
        sqlite_column!("detail", &SqlType::Text, non_null = true),
        sqlite_column!("library_kind", &SqlType::Text),
        sqlite_column!("library_id", &SqlType::Integer),
        sqlite_column!("user_id", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_activity_created_at", "created_at")],
};

pub const ACQUISITION_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        QUEUE_ENTRIES_TABLE_V1,
        BOOKS_TABLE_V1,
        SONGS_TABLE_V1,
        BLACKLIST_TABLE_V1,
        ACTIVITY_TABLE_V1,
    ],
    migration: None,
}];
