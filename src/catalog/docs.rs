//! Documentation catalog queries: `docs` and `clusters`.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::sync::{ResultCount, SyncCache, SyncResult};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Doc {
    pub id: i64,
    pub slug: Option<String>,
    pub title: String,
    pub summary: Option<String>,
    pub keywords: Option<String>,
    pub category: Option<String>,
    pub difficulty: Option<String>,
    pub doc_type: Option<String>,
    pub cluster_name: Option<String>,
    pub quality_score: f64,
    pub relevance_score: f64,
    pub view_count: i64,
    pub estimated_read_time: Option<i64>,
    pub content_status: String,
    pub updated_at: Option<String>,
}

const DOC_COLUMNS: &str = "id, slug, title, summary, keywords, category, difficulty, doc_type, \
     cluster_name, quality_score, relevance_score, view_count, estimated_read_time, \
     content_status, updated_at";

fn row_to_doc(row: &Row<'_>) -> rusqlite::Result<Doc> {
    Ok(Doc {
        id: row.get(0)?,
        slug: row.get(1)?,
        title: row.get(2)?,
        summary: row.get(3)?,
        keywords: row.get(4)?,
        category: row.get(5)?,
        difficulty: row.get(6)?,
        doc_type: row.get(7)?,
        cluster_name: row.get(8)?,
        quality_score: row.get(9)?,
        relevance_score: row.get(10)?,
        view_count: row.get(11)?,
        estimated_read_time: row.get(12)?,
        content_status: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

/// `%query%` with LIKE wildcards in the query escaped.
pub(crate) fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Active docs whose title, summary, or keywords contain `query`, best quality first.
pub fn search(
    conn: &Connection,
    query: &str,
    limit: usize,
    category: Option<&str>,
    difficulty: Option<&str>,
) -> rusqlite::Result<Vec<Doc>> {
    let mut sql = format!(
        "SELECT {DOC_COLUMNS} FROM docs
         WHERE content_status = 'active'
           AND (title LIKE ?1 ESCAPE '\\' OR summary LIKE ?1 ESCAPE '\\'
                OR keywords LIKE ?1 ESCAPE '\\')"
    );
    let mut args: Vec<Value> = vec![Value::Text(like_pattern(query.trim()))];

    if let Some(category) = category {
        args.push(Value::Text(category.to_string()));
        sql.push_str(&format!(" AND category = ?{}", args.len()));
    }
    if let Some(difficulty) = difficulty {
        args.push(Value::Text(difficulty.to_string()));
        sql.push_str(&format!(" AND difficulty = ?{}", args.len()));
    }
    args.push(Value::Integer(limit as i64));
    sql.push_str(&format!(
        " ORDER BY quality_score DESC, relevance_score DESC, id LIMIT ?{}",
        args.len()
    ));

    let mut stmt = conn.prepare(&sql)?;
    let docs = stmt
        .query_map(params_from_iter(args), row_to_doc)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(docs)
}

/// An active doc by id. Archived docs are not served.
pub fn get_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<Doc>> {
    conn.query_row(
        &format!("SELECT {DOC_COLUMNS} FROM docs WHERE id = ?1 AND content_status = 'active'"),
        [id],
        row_to_doc,
    )
    .optional()
}

/// A cluster row, with doc statistics when requested.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClusterSummary {
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_quality: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ClusterOrDoc {
    Cluster(ClusterSummary),
    Doc(Doc),
}

/// Tables a cluster query reads, so only those are pre-synced.
pub fn cluster_query_tables(cluster: Option<&str>, include_stats: bool) -> &'static [&'static str] {
    match (cluster, include_stats) {
        (Some(_), _) => &["docs"],
        (None, true) => &["docs", "clusters"],
        (None, false) => &["clusters"],
    }
}

/// Docs of one cluster, or every cluster (optionally with doc statistics).
pub fn by_cluster(
    conn: &Connection,
    cluster: Option<&str>,
    include_stats: bool,
    limit: usize,
) -> rusqlite::Result<Vec<ClusterOrDoc>> {
    if let Some(cluster) = cluster {
        let mut stmt = conn.prepare(&format!(
            "SELECT {DOC_COLUMNS} FROM docs
             WHERE cluster_name = ?1 AND content_status = 'active'
             ORDER BY cluster_priority DESC, quality_score DESC, id
             LIMIT ?2"
        ))?;
        let docs = stmt
            .query_map(rusqlite::params![cluster, limit as i64], row_to_doc)?
            .map(|doc| doc.map(ClusterOrDoc::Doc))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(docs);
    }

    let sql = if include_stats {
        "SELECT c.name, c.display_name, c.description, c.icon, c.color,
                COUNT(d.id), AVG(d.quality_score)
         FROM clusters c
         LEFT JOIN docs d ON d.cluster_name = c.name AND d.content_status = 'active'
         GROUP BY c.id
         ORDER BY COUNT(d.id) DESC, c.name
         LIMIT ?1"
    } else {
        "SELECT name, display_name, description, icon, color, NULL, NULL
         FROM clusters ORDER BY name LIMIT ?1"
    };

    let mut stmt = conn.prepare(sql)?;
    let clusters = stmt
        .query_map([limit as i64], |row| {
            Ok(ClusterOrDoc::Cluster(ClusterSummary {
                name: row.get(0)?,
                display_name: row.get(1)?,
                description: row.get(2)?,
                icon: row.get(3)?,
                color: row.get(4)?,
                doc_count: row.get(5)?,
                avg_quality: row.get(6)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(clusters)
}

pub async fn search_docs(
    cache: &SyncCache,
    query: &str,
    limit: usize,
    category: Option<&str>,
    difficulty: Option<&str>,
) -> SyncResult<Vec<Doc>> {
    let limit = limit.clamp(1, 100);
    cache
        .run("search_docs", &["docs"], move |conn| {
            Ok(search(conn, query, limit, category, difficulty)?)
        })
        .await
}

pub async fn get_doc_by_id(cache: &SyncCache, id: i64) -> SyncResult<Option<Doc>> {
    cache
        .run("get_doc_by_id", &["docs"], move |conn| Ok(get_by_id(conn, id)?))
        .await
}

pub async fn get_docs_by_cluster(
    cache: &SyncCache,
    cluster: Option<&str>,
    include_stats: bool,
    limit: usize,
) -> SyncResult<Vec<ClusterOrDoc>> {
    let limit = limit.clamp(1, 200);
    let tables = cluster_query_tables(cluster, include_stats);
    cache
        .run("get_docs_by_cluster", tables, move |conn| {
            Ok(by_cluster(conn, cluster, include_stats, limit)?)
        })
        .await
}

impl ResultCount for Doc {}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Connection {
        let conn = crate::db::open_memory_database().unwrap();
        conn.execute_batch(
            "INSERT INTO clusters (id, name, display_name) VALUES
                (1, 'turso', 'Turso'), (2, 'mcp', 'MCP'), (3, 'empty', 'Empty');
             INSERT INTO docs (id, title, summary, keywords, category, difficulty,
                               cluster_name, quality_score, relevance_score, content_status) VALUES
                (1, 'Turso replication', 'embedded replicas', 'turso,sync', 'guide', 'advanced', 'turso', 9.0, 8.0, 'active'),
                (2, 'Turso CLI basics', 'shell usage', 'turso,cli', 'guide', 'beginner', 'turso', 7.5, 9.0, 'active'),
                (3, 'MCP tools', 'writing tools', 'mcp', 'reference', 'beginner', 'mcp', 8.0, 7.0, 'active'),
                (4, 'Old turso notes', 'archived', 'turso', 'guide', 'beginner', 'turso', 9.9, 9.9, 'archived'),
                (5, '100% coverage', 'percent', NULL, 'guide', 'beginner', 'mcp', 5.0, 5.0, 'active');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn search_ranks_by_quality_and_skips_inactive() {
        let conn = seeded();
        let docs = search(&conn, "turso", 10, None, None).unwrap();
        let ids: Vec<i64> = docs.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn search_filters_and_limit() {
        let conn = seeded();
        let docs = search(&conn, "turso", 10, Some("guide"), Some("beginner")).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, 2);

        assert_eq!(search(&conn, "", 2, None, None).unwrap().len(), 2);
    }

    #[test]
    fn like_wildcards_are_literal() {
        let conn = seeded();
        let docs = search(&conn, "100%", 10, None, None).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, 5);
        assert!(search(&conn, "_", 10, None, None).unwrap().is_empty());
    }

    #[test]
    fn get_by_id_missing() {
        let conn = seeded();
        assert_eq!(get_by_id(&conn, 3).unwrap().unwrap().title, "MCP tools");
        assert!(get_by_id(&conn, 4).unwrap().is_none());
        assert!(get_by_id(&conn, 99).unwrap().is_none());
    }

    #[test]
    fn clusters_with_stats() {
        let conn = seeded();
        let rows = by_cluster(&conn, None, true, 20).unwrap();
        match &rows[0] {
            ClusterOrDoc::Cluster(c) => {
                assert_eq!(c.doc_count, Some(2));
                assert!(c.avg_quality.is_some());
            }
            other => panic!("expected cluster, got {other:?}"),
        }
        let empty = rows
            .iter()
            .find_map(|r| match r {
                ClusterOrDoc::Cluster(c) if c.name == "empty" => Some(c),
                _ => None,
            })
            .unwrap();
        assert_eq!(empty.doc_count, Some(0));
        assert_eq!(empty.avg_quality, None);
    }

    #[test]
    fn clusters_without_stats_omit_counts() {
        let conn = seeded();
        let rows = by_cluster(&conn, None, false, 20).unwrap();
        assert_eq!(rows.len(), 3);
        let json = serde_json::to_value(&rows[0]).unwrap();
        assert!(json.get("doc_count").is_none());
    }

    #[test]
    fn docs_of_one_cluster() {
        let conn = seeded();
        let rows = by_cluster(&conn, Some("turso"), true, 20).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| matches!(r, ClusterOrDoc::Doc(_))));
    }

    #[test]
    fn declared_tables() {
        assert_eq!(cluster_query_tables(Some("x"), true), &["docs"]);
        assert_eq!(cluster_query_tables(None, true), &["docs", "clusters"]);
        assert_eq!(cluster_query_tables(None, false), &["clusters"]);
    }
}
