/// One step in the schema evolution chain. Steps are applied in order and
/// recorded in `schema_migrations`; `down` reverses the step where feasible.
pub struct Migration {
    pub id: &'static str,
    pub up: &'static str,
    pub down: Option<&'static str>,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        id: "0001_identity",
        up: r#"
-- Users are the accountable subjects behind tokens and memberships
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,

    -- Bumped on profile change; denormalized copies carry id::revision tags
    revision INTEGER NOT NULL DEFAULT 1,

    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Groups are admin-managed collective subjects
CREATE TABLE IF NOT EXISTS groups (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT DEFAULT (datetime('now'))
);

-- Tokens are auth credentials; non-admin tokens must belong to a user
CREATE TABLE IF NOT EXISTS tokens (
    id TEXT PRIMARY KEY,
    token_hash TEXT NOT NULL,          -- argon2id hash with embedded salt
    token_lookup TEXT NOT NULL,        -- first 8 chars of ID for fast lookup
    is_admin INTEGER NOT NULL DEFAULT 0,

    user_id TEXT REFERENCES users(id) ON DELETE CASCADE,

    created_at TEXT DEFAULT (datetime('now')),
    expires_at TEXT,            -- NULL = never
    last_used_at TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_tokens_lookup ON tokens(token_lookup);
CREATE INDEX IF NOT EXISTS idx_tokens_user ON tokens(user_id);
"#,
        down: Some(
            r#"
DROP TABLE IF EXISTS tokens;
DROP TABLE IF EXISTS groups;
DROP TABLE IF EXISTS users;
"#,
        ),
    },
    Migration {
        id: "0002_communities",
        up: r#"
-- Communities curate records; rows are soft-deleted to keep history intact
CREATE TABLE IF NOT EXISTS communities (
    id TEXT PRIMARY KEY,
    slug TEXT NOT NULL,
    title TEXT NOT NULL,
    kind TEXT NOT NULL DEFAULT 'topic',
    visibility TEXT NOT NULL DEFAULT 'public',
    status TEXT NOT NULL DEFAULT 'new',

    allow_children INTEGER NOT NULL DEFAULT 0,
    parent_id TEXT REFERENCES communities(id) ON DELETE RESTRICT,

    bucket_id TEXT,

    -- Optimistic concurrency counter
    revision INTEGER NOT NULL DEFAULT 1,

    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    deleted_at TEXT             -- NULL = live
);

-- Slugs are reusable after deletion, unique among live rows
CREATE UNIQUE INDEX IF NOT EXISTS idx_communities_slug
    ON communities(slug) WHERE deleted_at IS NULL;
CREATE INDEX IF NOT EXISTS idx_communities_parent ON communities(parent_id);

-- Full row snapshot per revision
CREATE TABLE IF NOT EXISTS community_versions (
    community_id TEXT NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
    revision INTEGER NOT NULL,
    snapshot TEXT NOT NULL,     -- JSON copy of the row at this revision
    created_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (community_id, revision)
);
"#,
        down: Some(
            r#"
DROP TABLE IF EXISTS community_versions;
DROP TABLE IF EXISTS communities;
"#,
        ),
    },
    Migration {
        id: "0003_members",
        up: r#"
-- Workflow requests back pending invitations and join requests
CREATE TABLE IF NOT EXISTS requests (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,         -- invitation | membership_request
    community_id TEXT NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
    status TEXT NOT NULL DEFAULT 'open',
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Members and pending invitations share one table; active = 0 marks pending
CREATE TABLE IF NOT EXISTS members (
    id TEXT PRIMARY KEY,
    community_id TEXT NOT NULL REFERENCES communities(id) ON DELETE CASCADE,

    -- Exactly one subject reference
    user_id TEXT REFERENCES users(id) ON DELETE CASCADE,
    group_id TEXT REFERENCES groups(id) ON DELETE CASCADE,

    role TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    visible INTEGER NOT NULL DEFAULT 0,

    -- Deleting the request clears the link, never the member
    request_id TEXT REFERENCES requests(id) ON DELETE SET NULL,

    -- NULL for user subjects
    group_notifications INTEGER,

    revision INTEGER NOT NULL DEFAULT 1,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),

    CHECK ((user_id IS NULL) != (group_id IS NULL))
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_members_community_user
    ON members(community_id, user_id) WHERE user_id IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS idx_members_community_group
    ON members(community_id, group_id) WHERE group_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_members_request ON members(request_id);
CREATE INDEX IF NOT EXISTS idx_members_user ON members(user_id);

-- Immutable snapshots of concluded invitations, kept for audit
CREATE TABLE IF NOT EXISTS archived_invitations (
    id TEXT PRIMARY KEY,
    member_id TEXT NOT NULL,
    community_id TEXT NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
    user_id TEXT,
    group_id TEXT,
    role TEXT NOT NULL,
    visible INTEGER NOT NULL,
    active INTEGER NOT NULL,
    request_id TEXT,
    outcome TEXT NOT NULL,      -- accepted | declined | cancelled | expired
    archived_at TEXT DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_archived_invitations_community
    ON archived_invitations(community_id);
"#,
        down: Some(
            r#"
DROP TABLE IF EXISTS archived_invitations;
DROP TABLE IF EXISTS members;
DROP TABLE IF EXISTS requests;
"#,
        ),
    },
    Migration {
        id: "0004_featured",
        up: r#"
-- Operator-curated front-page slots
CREATE TABLE IF NOT EXISTS featured_communities (
    id TEXT PRIMARY KEY,
    community_id TEXT NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
    start_at TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_featured_community
    ON featured_communities(community_id);
"#,
        down: Some(
            r#"
DROP TABLE IF EXISTS featured_communities;
"#,
        ),
    },
];

/// Tracking table for applied migration steps.
pub const MIGRATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    id TEXT PRIMARY KEY,
    applied_at TEXT DEFAULT (datetime('now'))
);
"#;
