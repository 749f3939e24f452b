//! Item rows, tags, and full-text search.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Transaction};
use uuid::Uuid;

use fc_domain::item::{normalize_tag, ClipboardItem, ContentType};
use fc_domain::{Error, Result};

use crate::{db_err, parse_ts, parse_uuid, Store};

/// Filter for `list_items`.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub content_type: Option<ContentType>,
    pub source_app: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl Store {
    /// Insert a freshly captured item together with its search entry.
    ///
    /// Empty content is a contract violation by the capture adapter.
    pub fn insert_item(&self, item: &ClipboardItem) -> Result<()> {
        if item.content.trim().is_empty() {
            return Err(Error::bad_transition("empty-content", "item"));
        }
        self.with_tx(|tx| {
            tx.execute(
                r#"
                INSERT INTO clipboard_items
                    (id, content, content_type, timestamp, source_app,
                     window_title, screenshot_path, surrounding_text, analysis)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    item.id.to_string(),
                    item.content,
                    item.content_type.as_str(),
                    item.timestamp.to_rfc3339(),
                    item.source_app,
                    item.window_title,
                    item.screenshot_path,
                    item.surrounding_text,
                    item.analysis.as_ref().map(|a| a.to_string()),
                ],
            )
            .map_err(db_err)?;
            replace_tags(tx, item.id, &item.tags)?;
            refresh_search_row(tx, item.id)?;
            Ok(())
        })
    }

    /// Atomically replace an item's analysis blob and tag set.
    pub fn update_item_analysis(
        &self,
        id: Uuid,
        analysis: &serde_json::Value,
        tags: &[String],
    ) -> Result<()> {
        self.with_tx(|tx| {
            let n = tx
                .execute(
                    "UPDATE clipboard_items SET analysis = ?2 WHERE id = ?1",
                    params![id.to_string(), analysis.to_string()],
                )
                .map_err(db_err)?;
            if n == 0 {
                return Err(Error::NotFound(format!("item {id}")));
            }
            replace_tags(tx, id, tags)?;
            refresh_search_row(tx, id)?;
            Ok(())
        })
    }

    pub fn delete_item(&self, id: Uuid) -> Result<()> {
        self.with_tx(|tx| {
            tx.execute(
                "DELETE FROM clipboard_search WHERE item_id = ?1",
                params![id.to_string()],
            )
            .map_err(db_err)?;
            let n = tx
                .execute(
                    "DELETE FROM clipboard_items WHERE id = ?1",
                    params![id.to_string()],
                )
                .map_err(db_err)?;
            if n == 0 {
                return Err(Error::NotFound(format!("item {id}")));
            }
            Ok(())
        })
    }

    pub fn get_item(&self, id: Uuid) -> Result<ClipboardItem> {
        self.with_tx(|tx| {
            read_item(tx, id)?.ok_or_else(|| Error::NotFound(format!("item {id}")))
        })
    }

    pub fn list_items(&self, filter: &ItemFilter) -> Result<Vec<ClipboardItem>> {
        self.with_tx(|tx| {
            let mut sql = String::from(
                "SELECT id FROM clipboard_items WHERE 1=1",
            );
            let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            if let Some(ct) = filter.content_type {
                sql.push_str(" AND content_type = ?");
                args.push(Box::new(ct.as_str().to_string()));
            }
            if let Some(app) = &filter.source_app {
                sql.push_str(" AND source_app = ?");
                args.push(Box::new(app.clone()));
            }
            if let Some(from) = filter.from {
                sql.push_str(" AND timestamp >= ?");
                args.push(Box::new(from.to_rfc3339()));
            }
            if let Some(to) = filter.to {
                sql.push_str(" AND timestamp <= ?");
                args.push(Box::new(to.to_rfc3339()));
            }
            sql.push_str(" ORDER BY timestamp DESC LIMIT ?");
            let limit = if filter.limit == 0 { 100 } else { filter.limit };
            args.push(Box::new(limit as i64));

            let mut stmt = tx.prepare(&sql).map_err(db_err)?;
            let ids: Vec<String> = stmt
                .query_map(rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())), |row| {
                    row.get(0)
                })
                .map_err(db_err)?
                .collect::<std::result::Result<_, _>>()
                .map_err(db_err)?;
            drop(stmt);

            hydrate_items(tx, &ids)
        })
    }

    /// The most recent captures, newest first.
    pub fn recent_items(&self, limit: usize) -> Result<Vec<ClipboardItem>> {
        self.list_items(&ItemFilter {
            limit,
            ..Default::default()
        })
    }

    /// Ranked full-text search across content, window title, surrounding
    /// text, and tags. Matches are ordered newest-first.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<ClipboardItem>> {
        let fts_query = sanitize_fts_query(query);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }
        self.with_tx(|tx| {
            let mut stmt = tx
                .prepare(
                    r#"
                    SELECT s.item_id
                    FROM clipboard_search s
                    JOIN clipboard_items i ON i.id = s.item_id
                    WHERE clipboard_search MATCH ?1
                    ORDER BY i.timestamp DESC
                    LIMIT ?2
                    "#,
                )
                .map_err(db_err)?;
            let ids: Vec<String> = stmt
                .query_map(params![fts_query, limit as i64], |row| row.get(0))
                .map_err(db_err)?
                .collect::<std::result::Result<_, _>>()
                .map_err(db_err)?;
            drop(stmt);
            hydrate_items(tx, &ids)
        })
    }
}

// ── internals ───────────────────────────────────────────────────────

/// Quote each token so user input cannot inject FTS5 syntax; tokens are
/// implicitly ANDed.
fn sanitize_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|tok| tok.replace('"', ""))
        .filter(|tok| !tok.is_empty())
        .map(|tok| format!("\"{tok}\""))
        .collect::<Vec<_>>()
        .join(" ")
}

fn replace_tags(tx: &Transaction<'_>, item_id: Uuid, tags: &[String]) -> Result<()> {
    tx.execute(
        "DELETE FROM item_tags WHERE item_id = ?1",
        params![item_id.to_string()],
    )
    .map_err(db_err)?;
    for raw in tags {
        let tag = normalize_tag(raw);
        if tag.is_empty() {
            continue;
        }
        tx.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", params![tag])
            .map_err(db_err)?;
        tx.execute(
            "INSERT OR IGNORE INTO item_tags (item_id, tag_name) VALUES (?1, ?2)",
            params![item_id.to_string(), tag],
        )
        .map_err(db_err)?;
    }
    Ok(())
}

fn item_tags(tx: &Transaction<'_>, item_id: &str) -> Result<Vec<String>> {
    let mut stmt = tx
        .prepare("SELECT tag_name FROM item_tags WHERE item_id = ?1 ORDER BY tag_name")
        .map_err(db_err)?;
    let tags = stmt
        .query_map([item_id], |row| row.get(0))
        .map_err(db_err)?
        .collect::<std::result::Result<_, _>>()
        .map_err(db_err)?;
    Ok(tags)
}

/// Rewrite the FTS row for an item from its current row + tags.
fn refresh_search_row(tx: &Transaction<'_>, item_id: Uuid) -> Result<()> {
    let id = item_id.to_string();
    tx.execute("DELETE FROM clipboard_search WHERE item_id = ?1", params![id])
        .map_err(db_err)?;
    let row = tx
        .query_row(
            "SELECT content, window_title, surrounding_text FROM clipboard_items WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()
        .map_err(db_err)?;
    let Some((content, window_title, surrounding)) = row else {
        return Ok(());
    };
    let tags = item_tags(tx, &id)?.join(" ");
    tx.execute(
        r#"
        INSERT INTO clipboard_search (item_id, content, window_title, surrounding_text, tags)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            id,
            content,
            window_title.unwrap_or_default(),
            surrounding.unwrap_or_default(),
            tags
        ],
    )
    .map_err(db_err)?;
    Ok(())
}

fn read_item(tx: &Transaction<'_>, id: Uuid) -> Result<Option<ClipboardItem>> {
    let raw = tx
        .query_row(
            r#"
            SELECT id, content, content_type, timestamp, source_app,
                   window_title, screenshot_path, surrounding_text, analysis
            FROM clipboard_items WHERE id = ?1
            "#,
            params![id.to_string()],
            row_to_parts,
        )
        .optional()
        .map_err(db_err)?;
    match raw {
        Some(parts) => Ok(Some(parts_to_item(tx, parts)?)),
        None => Ok(None),
    }
}

type ItemParts = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn row_to_parts(row: &rusqlite::Row<'_>) -> rusqlite::Result<ItemParts> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn parts_to_item(tx: &Transaction<'_>, parts: ItemParts) -> Result<ClipboardItem> {
    let (id, content, content_type, ts, source_app, window_title, screenshot, surrounding, analysis) =
        parts;
    let tags = item_tags(tx, &id)?;
    Ok(ClipboardItem {
        id: parse_uuid(&id)?,
        content,
        content_type: ContentType::parse(&content_type)
            .ok_or_else(|| Error::StoreIo(format!("bad content_type {content_type:?}")))?,
        timestamp: parse_ts(&ts)?,
        source_app,
        window_title,
        screenshot_path: screenshot,
        surrounding_text: surrounding,
        tags,
        analysis: analysis
            .map(|a| serde_json::from_str(&a))
            .transpose()
            .map_err(|e| Error::StoreIo(format!("bad analysis json: {e}")))?,
    })
}

pub(crate) fn hydrate_items(tx: &Transaction<'_>, ids: &[String]) -> Result<Vec<ClipboardItem>> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(item) = read_item(tx, parse_uuid(id)?)? {
            out.push(item);
        }
    }
    Ok(out)
}
