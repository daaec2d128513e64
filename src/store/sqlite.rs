use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use super::Store;
use super::schema::{MIGRATIONS, MIGRATIONS_TABLE};
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Parses a TEXT column into one of the domain enums.
fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = Error>,
{
    let s: String = row.get(idx)?;
    s.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid enum value '{s}'").into(),
        )
    })
}

const COMMUNITY_COLUMNS: &str = "id, slug, title, kind, visibility, status, allow_children, \
     parent_id, bucket_id, revision, created_at, updated_at, deleted_at";

fn community_from_row(row: &Row<'_>) -> rusqlite::Result<Community> {
    Ok(Community {
        id: row.get(0)?,
        slug: row.get(1)?,
        title: row.get(2)?,
        kind: row.get(3)?,
        visibility: parse_column(row, 4)?,
        status: parse_column(row, 5)?,
        allow_children: ChildrenFlag::stored(row.get(6)?),
        parent_id: row.get(7)?,
        bucket_id: row.get(8)?,
        revision: row.get(9)?,
        created_at: parse_datetime(&row.get::<_, String>(10)?),
        updated_at: parse_datetime(&row.get::<_, String>(11)?),
        deleted_at: row.get::<_, Option<String>>(12)?.map(|s| parse_datetime(&s)),
    })
}

const MEMBER_COLUMNS: &str = "id, community_id, user_id, group_id, role, active, visible, \
     request_id, group_notifications, revision, created_at, updated_at";

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<Member> {
    Ok(Member {
        id: row.get(0)?,
        community_id: row.get(1)?,
        user_id: row.get(2)?,
        group_id: row.get(3)?,
        role: parse_column(row, 4)?,
        active: row.get(5)?,
        visible: row.get(6)?,
        request_id: row.get(7)?,
        group_notifications: row.get(8)?,
        revision: row.get(9)?,
        created_at: parse_datetime(&row.get::<_, String>(10)?),
        updated_at: parse_datetime(&row.get::<_, String>(11)?),
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        revision: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn token_from_row(row: &Row<'_>) -> rusqlite::Result<Token> {
    Ok(Token {
        id: row.get(0)?,
        token_hash: row.get(1)?,
        token_lookup: row.get(2)?,
        is_admin: row.get(3)?,
        user_id: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        expires_at: row.get::<_, Option<String>>(6)?.map(|s| parse_datetime(&s)),
        last_used_at: row.get::<_, Option<String>>(7)?.map(|s| parse_datetime(&s)),
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        let mut conn = self.conn();
        conn.execute_batch(MIGRATIONS_TABLE)?;

        for migration in MIGRATIONS {
            let applied: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE id = ?1)",
                params![migration.id],
                |row| row.get(0),
            )?;
            if applied {
                continue;
            }

            let tx = conn.transaction()?;
            tx.execute_batch(migration.up)?;
            tx.execute(
                "INSERT INTO schema_migrations (id) VALUES (?1)",
                params![migration.id],
            )?;
            tx.commit()?;

            tracing::debug!("applied migration {}", migration.id);
        }

        Ok(())
    }

    // Community operations

    fn create_community(&self, community: &Community) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let result = tx.execute(
            "INSERT INTO communities (id, slug, title, kind, visibility, status, allow_children, \
             parent_id, bucket_id, revision, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                community.id,
                community.slug,
                community.title,
                community.kind,
                community.visibility.as_str(),
                community.status.as_str(),
                community.allow_children.get(),
                community.parent_id,
                community.bucket_id,
                community.revision,
                format_datetime(&community.created_at),
                format_datetime(&community.updated_at),
            ],
        );

        match result {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => return Err(Error::AlreadyExists),
            Err(e) => return Err(Error::from(e)),
        }

        tx.execute(
            "INSERT INTO community_versions (community_id, revision, snapshot) VALUES (?1, ?2, ?3)",
            params![
                community.id,
                community.revision,
                serde_json::to_string(community)?
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn get_community(&self, id: &str) -> Result<Option<Community>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {COMMUNITY_COLUMNS} FROM communities WHERE id = ?1 AND deleted_at IS NULL"),
            params![id],
            community_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_community_by_slug(&self, slug: &str) -> Result<Option<Community>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {COMMUNITY_COLUMNS} FROM communities WHERE slug = ?1 AND deleted_at IS NULL"
            ),
            params![slug],
            community_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_communities(&self, cursor: &str, limit: i32) -> Result<Vec<Community>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COMMUNITY_COLUMNS} FROM communities \
             WHERE slug > ?1 AND deleted_at IS NULL ORDER BY slug LIMIT ?2"
        ))?;

        let rows = stmt.query_map(params![cursor, limit], community_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_children(&self, parent_id: &str) -> Result<Vec<Community>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COMMUNITY_COLUMNS} FROM communities \
             WHERE parent_id = ?1 AND deleted_at IS NULL ORDER BY slug"
        ))?;

        let rows = stmt.query_map(params![parent_id], community_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_community(&self, community: &Community) -> Result<Community> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let result = tx.execute(
            "UPDATE communities SET slug = ?1, title = ?2, kind = ?3, visibility = ?4, \
             status = ?5, allow_children = ?6, parent_id = ?7, bucket_id = ?8, \
             revision = revision + 1, updated_at = ?9
             WHERE id = ?10 AND revision = ?11 AND deleted_at IS NULL",
            params![
                community.slug,
                community.title,
                community.kind,
                community.visibility.as_str(),
                community.status.as_str(),
                community.allow_children.get(),
                community.parent_id,
                community.bucket_id,
                format_datetime(&Utc::now()),
                community.id,
                community.revision,
            ],
        );

        let rows = match result {
            Ok(rows) => rows,
            Err(e) if is_constraint_violation(&e) => return Err(Error::AlreadyExists),
            Err(e) => return Err(Error::from(e)),
        };

        if rows == 0 {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM communities WHERE id = ?1 AND deleted_at IS NULL)",
                params![community.id],
                |row| row.get(0),
            )?;
            return Err(if exists {
                Error::StaleRevision
            } else {
                Error::NotFound
            });
        }

        let updated = tx.query_row(
            &format!("SELECT {COMMUNITY_COLUMNS} FROM communities WHERE id = ?1"),
            params![community.id],
            community_from_row,
        )?;

        tx.execute(
            "INSERT INTO community_versions (community_id, revision, snapshot) VALUES (?1, ?2, ?3)",
            params![updated.id, updated.revision, serde_json::to_string(&updated)?],
        )?;

        tx.commit()?;
        Ok(updated)
    }

    fn soft_delete_community(&self, id: &str, revision: i64) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let rows = tx.execute(
            "UPDATE communities SET deleted_at = ?1, revision = revision + 1, updated_at = ?1 \
             WHERE id = ?2 AND revision = ?3 AND deleted_at IS NULL",
            params![format_datetime(&Utc::now()), id, revision],
        )?;

        if rows == 0 {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM communities WHERE id = ?1 AND deleted_at IS NULL)",
                params![id],
                |row| row.get(0),
            )?;
            return Err(if exists {
                Error::StaleRevision
            } else {
                Error::NotFound
            });
        }

        let deleted = tx.query_row(
            &format!("SELECT {COMMUNITY_COLUMNS} FROM communities WHERE id = ?1"),
            params![id],
            community_from_row,
        )?;

        tx.execute(
            "INSERT INTO community_versions (community_id, revision, snapshot) VALUES (?1, ?2, ?3)",
            params![deleted.id, deleted.revision, serde_json::to_string(&deleted)?],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn get_community_version(&self, id: &str, revision: i64) -> Result<Option<Community>> {
        let conn = self.conn();
        let snapshot: Option<String> = conn
            .query_row(
                "SELECT snapshot FROM community_versions WHERE community_id = ?1 AND revision = ?2",
                params![id, revision],
                |row| row.get(0),
            )
            .optional()?;

        match snapshot {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn list_community_revisions(&self, id: &str) -> Result<Vec<i64>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT revision FROM community_versions WHERE community_id = ?1 ORDER BY revision",
        )?;

        let rows = stmt.query_map(params![id], |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Member operations

    fn create_member(&self, member: &Member) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO members (id, community_id, user_id, group_id, role, active, visible, \
             request_id, group_notifications, revision, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                member.id,
                member.community_id,
                member.user_id,
                member.group_id,
                member.role.as_str(),
                member.active,
                member.visible,
                member.request_id,
                member.group_notifications,
                member.revision,
                format_datetime(&member.created_at),
                format_datetime(&member.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::AlreadyMember),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_member(&self, id: &str) -> Result<Option<Member>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {MEMBER_COLUMNS} FROM members WHERE id = ?1"),
            params![id],
            member_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_member_by_subject(
        &self,
        community_id: &str,
        subject: &Subject,
    ) -> Result<Option<Member>> {
        let conn = self.conn();
        let (sql, subject_id) = match subject {
            Subject::User(id) => (
                format!("SELECT {MEMBER_COLUMNS} FROM members WHERE community_id = ?1 AND user_id = ?2"),
                id,
            ),
            Subject::Group(id) => (
                format!("SELECT {MEMBER_COLUMNS} FROM members WHERE community_id = ?1 AND group_id = ?2"),
                id,
            ),
        };

        conn.query_row(&sql, params![community_id, subject_id], member_from_row)
            .optional()
            .map_err(Error::from)
    }

    fn list_members(&self, community_id: &str, cursor: &str, limit: i32) -> Result<Vec<Member>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members \
             WHERE community_id = ?1 AND id > ?2 ORDER BY id LIMIT ?3"
        ))?;

        let rows = stmt.query_map(params![community_id, cursor, limit], member_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_public_members(&self, community_id: &str) -> Result<Vec<Member>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members \
             WHERE community_id = ?1 AND active = 1 AND visible = 1 ORDER BY id"
        ))?;

        let rows = stmt.query_map(params![community_id], member_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_pending_members(&self, community_id: &str) -> Result<Vec<Member>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members \
             WHERE community_id = ?1 AND active = 0 AND request_id IS NOT NULL ORDER BY id"
        ))?;

        let rows = stmt.query_map(params![community_id], member_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_user_memberships(&self, user_id: &str) -> Result<Vec<Member>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members \
             WHERE user_id = ?1 AND active = 1 ORDER BY community_id"
        ))?;

        let rows = stmt.query_map(params![user_id], member_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_member(&self, member: &Member) -> Result<Member> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let rows = tx.execute(
            "UPDATE members SET role = ?1, active = ?2, visible = ?3, request_id = ?4, \
             group_notifications = ?5, revision = revision + 1, updated_at = ?6
             WHERE id = ?7 AND revision = ?8",
            params![
                member.role.as_str(),
                member.active,
                member.visible,
                member.request_id,
                member.group_notifications,
                format_datetime(&Utc::now()),
                member.id,
                member.revision,
            ],
        )?;

        if rows == 0 {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM members WHERE id = ?1)",
                params![member.id],
                |row| row.get(0),
            )?;
            return Err(if exists {
                Error::StaleRevision
            } else {
                Error::NotFound
            });
        }

        let updated = tx.query_row(
            &format!("SELECT {MEMBER_COLUMNS} FROM members WHERE id = ?1"),
            params![member.id],
            member_from_row,
        )?;

        tx.commit()?;
        Ok(updated)
    }

    fn delete_member(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM members WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn count_active_owners(&self, community_id: &str) -> Result<i32> {
        let conn = self.conn();
        conn.query_row(
            "SELECT COUNT(*) FROM members \
             WHERE community_id = ?1 AND active = 1 AND role = 'owner'",
            params![community_id],
            |row| row.get(0),
        )
        .map_err(Error::from)
    }

    // Request operations

    fn create_request(&self, request: &WorkflowRequest) -> Result<()> {
        self.conn().execute(
            "INSERT INTO requests (id, kind, community_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                request.id,
                request.kind.as_str(),
                request.community_id,
                request.status.as_str(),
                format_datetime(&request.created_at),
                format_datetime(&request.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_request(&self, id: &str) -> Result<Option<WorkflowRequest>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, kind, community_id, status, created_at, updated_at \
             FROM requests WHERE id = ?1",
            params![id],
            |row| {
                Ok(WorkflowRequest {
                    id: row.get(0)?,
                    kind: parse_column(row, 1)?,
                    community_id: row.get(2)?,
                    status: parse_column(row, 3)?,
                    created_at: parse_datetime(&row.get::<_, String>(4)?),
                    updated_at: parse_datetime(&row.get::<_, String>(5)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn delete_request(&self, id: &str) -> Result<bool> {
        // members.request_id is ON DELETE SET NULL; the member row survives
        let rows = self
            .conn()
            .execute("DELETE FROM requests WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn conclude_membership_request(
        &self,
        member_id: &str,
        outcome: RequestStatus,
    ) -> Result<Member> {
        if outcome.is_open() {
            return Err(Error::BadRequest(
                "cannot conclude a request as open".to_string(),
            ));
        }

        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let member = tx
            .query_row(
                &format!("SELECT {MEMBER_COLUMNS} FROM members WHERE id = ?1"),
                params![member_id],
                member_from_row,
            )
            .optional()?
            .ok_or(Error::NotFound)?;

        let request_id = member
            .request_id
            .clone()
            .ok_or_else(|| Error::Conflict("member has no associated request".to_string()))?;

        let status: RequestStatus = tx
            .query_row(
                "SELECT status FROM requests WHERE id = ?1",
                params![request_id],
                |row| parse_column(row, 0),
            )
            .optional()?
            .ok_or(Error::NotFound)?;

        if !status.is_open() {
            return Err(Error::Conflict(format!(
                "request is already {}",
                status.as_str()
            )));
        }

        tx.execute(
            "UPDATE requests SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![
                outcome.as_str(),
                format_datetime(&Utc::now()),
                request_id
            ],
        )?;

        tx.execute(
            "INSERT INTO archived_invitations (id, member_id, community_id, user_id, group_id, \
             role, visible, active, request_id, outcome, archived_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                Uuid::new_v4().to_string(),
                member.id,
                member.community_id,
                member.user_id,
                member.group_id,
                member.role.as_str(),
                member.visible,
                member.active,
                member.request_id,
                outcome.as_str(),
                format_datetime(&Utc::now()),
            ],
        )?;

        match outcome {
            RequestStatus::Accepted => {
                tx.execute(
                    "UPDATE members SET active = 1, revision = revision + 1, updated_at = ?1 \
                     WHERE id = ?2",
                    params![format_datetime(&Utc::now()), member.id],
                )?;
            }
            _ => {
                tx.execute("DELETE FROM members WHERE id = ?1", params![member.id])?;
            }
        }

        tx.commit()?;
        Ok(member)
    }

    // Archived invitation operations

    fn list_archived_invitations(&self, community_id: &str) -> Result<Vec<ArchivedInvitation>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, member_id, community_id, user_id, group_id, role, visible, active, \
             request_id, outcome, archived_at
             FROM archived_invitations WHERE community_id = ?1 ORDER BY archived_at",
        )?;

        let rows = stmt.query_map(params![community_id], |row| {
            Ok(ArchivedInvitation {
                id: row.get(0)?,
                member_id: row.get(1)?,
                community_id: row.get(2)?,
                user_id: row.get(3)?,
                group_id: row.get(4)?,
                role: parse_column(row, 5)?,
                visible: row.get(6)?,
                active: row.get(7)?,
                request_id: row.get(8)?,
                outcome: parse_column(row, 9)?,
                archived_at: parse_datetime(&row.get::<_, String>(10)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO users (id, username, display_name, revision, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id,
                user.username,
                user.display_name,
                user.revision,
                format_datetime(&user.created_at),
                format_datetime(&user.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::AlreadyExists),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, username, display_name, revision, created_at, updated_at \
             FROM users WHERE id = ?1",
            params![id],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, username, display_name, revision, created_at, updated_at \
             FROM users WHERE username = ?1",
            params![username],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_users(&self, cursor: &str, limit: i32) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, username, display_name, revision, created_at, updated_at \
             FROM users WHERE id > ?1 ORDER BY id LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![cursor, limit], user_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_user(&self, user: &User) -> Result<User> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let rows = tx.execute(
            "UPDATE users SET display_name = ?1, revision = revision + 1, updated_at = ?2 \
             WHERE id = ?3",
            params![user.display_name, format_datetime(&Utc::now()), user.id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }

        let updated = tx.query_row(
            "SELECT id, username, display_name, revision, created_at, updated_at \
             FROM users WHERE id = ?1",
            params![user.id],
            user_from_row,
        )?;

        tx.commit()?;
        Ok(updated)
    }

    fn delete_user(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Group operations

    fn create_group(&self, group: &Group) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO groups (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![group.id, group.name, format_datetime(&group.created_at)],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::AlreadyExists),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_group(&self, id: &str) -> Result<Option<Group>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, created_at FROM groups WHERE id = ?1",
            params![id],
            |row| {
                Ok(Group {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: parse_datetime(&row.get::<_, String>(2)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_group_by_name(&self, name: &str) -> Result<Option<Group>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, created_at FROM groups WHERE name = ?1",
            params![name],
            |row| {
                Ok(Group {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: parse_datetime(&row.get::<_, String>(2)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_groups(&self, cursor: &str, limit: i32) -> Result<Vec<Group>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, created_at FROM groups WHERE id > ?1 ORDER BY id LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![cursor, limit], |row| {
            Ok(Group {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: parse_datetime(&row.get::<_, String>(2)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_group(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM groups WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Token operations

    fn create_token(&self, token: &Token) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO tokens (id, token_hash, token_lookup, is_admin, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                token.id,
                token.token_hash,
                token.token_lookup,
                token.is_admin,
                token.user_id,
                format_datetime(&token.created_at),
                token.expires_at.as_ref().map(format_datetime),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::TokenLookupCollision),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_token_by_id(&self, id: &str) -> Result<Option<Token>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, token_hash, token_lookup, is_admin, user_id, created_at, expires_at, last_used_at
             FROM tokens WHERE id = ?1",
            params![id],
            token_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, token_hash, token_lookup, is_admin, user_id, created_at, expires_at, last_used_at
             FROM tokens WHERE token_lookup = ?1",
            params![lookup],
            token_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_tokens(&self, cursor: &str, limit: i32) -> Result<Vec<Token>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, token_hash, token_lookup, is_admin, user_id, created_at, expires_at, last_used_at
             FROM tokens WHERE id > ?1 ORDER BY id LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![cursor, limit], token_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_user_tokens(&self, user_id: &str) -> Result<Vec<Token>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, token_hash, token_lookup, is_admin, user_id, created_at, expires_at, last_used_at
             FROM tokens WHERE user_id = ?1 ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![user_id], token_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_token(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM tokens WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn update_token_last_used(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE tokens SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    // Featured community operations

    fn create_featured(&self, entry: &FeaturedCommunity) -> Result<()> {
        self.conn().execute(
            "INSERT INTO featured_communities (id, community_id, start_at, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.id,
                entry.community_id,
                format_datetime(&entry.start_at),
                format_datetime(&entry.created_at),
            ],
        )?;
        Ok(())
    }

    fn list_featured(&self, cursor: &str, limit: i32) -> Result<Vec<FeaturedCommunity>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, community_id, start_at, created_at \
             FROM featured_communities WHERE id > ?1 ORDER BY id LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![cursor, limit], |row| {
            Ok(FeaturedCommunity {
                id: row.get(0)?,
                community_id: row.get(1)?,
                start_at: parse_datetime(&row.get::<_, String>(2)?),
                created_at: parse_datetime(&row.get::<_, String>(3)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_featured_communities(&self) -> Result<Vec<Community>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT c.id, c.slug, c.title, c.kind, c.visibility, c.status, c.allow_children, \
             c.parent_id, c.bucket_id, c.revision, c.created_at, c.updated_at, c.deleted_at
             FROM featured_communities f
             JOIN communities c ON c.id = f.community_id
             WHERE f.start_at <= ?1 AND c.deleted_at IS NULL AND c.visibility = 'public'
             ORDER BY f.start_at DESC",
        )?;

        let rows = stmt.query_map(params![format_datetime(&Utc::now())], community_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_featured(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM featured_communities WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Admin token check

    fn has_admin_token(&self) -> Result<bool> {
        let conn = self.conn();
        let count: i32 = conn.query_row(
            "SELECT COUNT(*) FROM tokens WHERE is_admin = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
