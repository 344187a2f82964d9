//! Work items with their child items and context entries.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;

use super::docs::like_pattern;
use crate::sync::{ResultCount, SyncCache, SyncResult};

/// Child item status that counts as done.
pub const DONE_STATUS: &str = "completed";

/// `critical` > `high` > `medium` > `low` > anything else.
const PRIORITY_RANK: &str = "CASE priority
    WHEN 'critical' THEN 4 WHEN 'high' THEN 3 WHEN 'medium' THEN 2 WHEN 'low' THEN 1
    ELSE 0 END";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChildItem {
    pub id: i64,
    pub item_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: i64,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ContextEntry {
    pub id: i64,
    pub item_id: i64,
    pub context_type: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ItemWithChildren {
    #[serde(flatten)]
    pub item: Item,
    pub children: Vec<ChildItem>,
    pub context: Vec<ContextEntry>,
}

const ITEM_COLUMNS: &str =
    "id, name, title, description, status, priority, created_at, updated_at";

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        name: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        status: row.get(4)?,
        priority: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Items filtered by text, status, and priority; most urgent and newest first.
pub fn search(
    conn: &Connection,
    query: Option<&str>,
    status: Option<&str>,
    priority: Option<&str>,
    limit: usize,
) -> rusqlite::Result<Vec<Item>> {
    let mut sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE 1=1");
    let mut args: Vec<Value> = Vec::new();

    if let Some(query) = query.map(str::trim).filter(|q| !q.is_empty()) {
        args.push(Value::Text(like_pattern(query)));
        let n = args.len();
        sql.push_str(&format!(
            " AND (name LIKE ?{n} ESCAPE '\\' OR title LIKE ?{n} ESCAPE '\\' \
             OR description LIKE ?{n} ESCAPE '\\')"
        ));
    }
    if let Some(status) = status {
        args.push(Value::Text(status.to_string()));
        sql.push_str(&format!(" AND status = ?{}", args.len()));
    }
    if let Some(priority) = priority {
        args.push(Value::Text(priority.to_string()));
        sql.push_str(&format!(" AND priority = ?{}", args.len()));
    }
    args.push(Value::Integer(limit as i64));
    sql.push_str(&format!(
        " ORDER BY {PRIORITY_RANK} DESC, created_at DESC, id DESC LIMIT ?{}",
        args.len()
    ));

    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(params_from_iter(args), row_to_item)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

/// One item with its children (highest priority first) and context entries.
pub fn with_children(conn: &Connection, id: i64) -> rusqlite::Result<Option<ItemWithChildren>> {
    let item = conn
        .query_row(
            &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"),
            [id],
            row_to_item,
        )
        .optional()?;
    let Some(item) = item else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT id, item_id, title, description, status, priority, created_at, updated_at
         FROM child_items WHERE item_id = ?1
         ORDER BY priority DESC, created_at ASC, id ASC",
    )?;
    let children = stmt
        .query_map([id], |row| {
            Ok(ChildItem {
                id: row.get(0)?,
                item_id: row.get(1)?,
                title: row.get(2)?,
                description: row.get(3)?,
                status: row.get(4)?,
                priority: row.get(5)?,
                created_at: row.get(6)?,
                updated_at: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT id, item_id, context_type, content FROM context WHERE item_id = ?1 ORDER BY id",
    )?;
    let context = stmt
        .query_map([id], |row| {
            Ok(ContextEntry {
                id: row.get(0)?,
                item_id: row.get(1)?,
                context_type: row.get(2)?,
                content: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(ItemWithChildren {
        item,
        children,
        context,
    }))
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ItemSummary {
    pub total: i64,
    pub active: i64,
    pub completed: i64,
    pub high_priority: i64,
    pub critical: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ActiveItemProgress {
    pub id: i64,
    pub name: String,
    pub title: Option<String>,
    pub child_count: i64,
    pub completed_children: i64,
    /// Percentage of children done, 0 when there are none.
    pub completion_rate: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ItemAnalytics {
    pub summary: ItemSummary,
    pub by_status: Vec<StatusCount>,
    pub top_active: Vec<ActiveItemProgress>,
}

impl ResultCount for ItemAnalytics {}

pub fn analytics(conn: &Connection) -> rusqlite::Result<ItemAnalytics> {
    let summary = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(status = 'active'), 0),
                COALESCE(SUM(status = 'completed'), 0),
                COALESCE(SUM(priority = 'high'), 0),
                COALESCE(SUM(priority = 'critical'), 0)
         FROM items",
        [],
        |row| {
            Ok(ItemSummary {
                total: row.get(0)?,
                active: row.get(1)?,
                completed: row.get(2)?,
                high_priority: row.get(3)?,
                critical: row.get(4)?,
            })
        },
    )?;

    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) AS n FROM items GROUP BY status ORDER BY n DESC, status",
    )?;
    let by_status = stmt
        .query_map([], |row| {
            Ok(StatusCount {
                status: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT i.id, i.name, i.title,
                COUNT(c.id) AS child_count,
                COALESCE(SUM(c.status = ?1), 0)
         FROM items i
         LEFT JOIN child_items c ON c.item_id = i.id
         WHERE i.status = 'active'
         GROUP BY i.id
         ORDER BY child_count DESC, i.id
         LIMIT 5",
    )?;
    let top_active = stmt
        .query_map([DONE_STATUS], |row| {
            let child_count: i64 = row.get(3)?;
            let completed_children: i64 = row.get(4)?;
            Ok(ActiveItemProgress {
                id: row.get(0)?,
                name: row.get(1)?,
                title: row.get(2)?,
                child_count,
                completed_children,
                completion_rate: completion_rate(completed_children, child_count),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ItemAnalytics {
        summary,
        by_status,
        top_active,
    })
}

fn completion_rate(done: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let rate = done as f64 / total as f64 * 100.0;
    (rate * 10.0).round() / 10.0
}

pub async fn search_items(
    cache: &SyncCache,
    query: Option<&str>,
    status: Option<&str>,
    priority: Option<&str>,
    limit: usize,
) -> SyncResult<Vec<Item>> {
    let limit = limit.clamp(1, 100);
    cache
        .run("search_items", &["items"], move |conn| {
            Ok(search(conn, query, status, priority, limit)?)
        })
        .await
}

pub async fn get_item_with_children(
    cache: &SyncCache,
    id: i64,
) -> SyncResult<Option<ItemWithChildren>> {
    cache
        .run(
            "get_item_with_children",
            &["items", "child_items", "context"],
            move |conn| Ok(with_children(conn, id)?),
        )
        .await
}

pub async fn get_item_analytics(cache: &SyncCache) -> SyncResult<ItemAnalytics> {
    cache
        .run("get_item_analytics", &["items", "child_items"], |conn| {
            Ok(analytics(conn)?)
        })
        .await
}
