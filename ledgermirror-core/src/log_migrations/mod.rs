//! Event log migrations - embedded SQL files
//!
//! Each migration is a (name, sql) pair compiled in with include_str!.
//! Migrations are applied in the order listed here.

/// All event log migrations.
///
/// When adding a migration, create `NNN_description.sql` next to this file
/// and append an entry below.
pub const LOG_MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    (
        "001_initial_schema.sql",
        include_str!("001_initial_schema.sql"),
    ),
];
