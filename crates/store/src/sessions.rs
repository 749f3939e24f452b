//! Session rows and membership edges.
//!
//! The store enforces the structural invariants here (single membership,
//! dense sequence order, validated status transitions); the engine owns
//! the decisions about which transitions to request.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Transaction};
use uuid::Uuid;

use fc_domain::session::{Session, SessionMember, SessionStatus, SessionType};
use fc_domain::{Error, Result};

use crate::{db_err, parse_ts, parse_uuid, Store};

/// Filter for `get_active_sessions`.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub session_type: Option<SessionType>,
    pub limit: usize,
}

impl Store {
    pub fn create_session(&self, session: &Session) -> Result<()> {
        self.with_tx(|tx| {
            tx.execute(
                r#"
                INSERT INTO clipboard_sessions
                    (id, session_type, session_label, status, start_time,
                     last_activity, context_summary, intent_analysis)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    session.id.to_string(),
                    session.session_type.as_str(),
                    session.session_label,
                    session.status.as_str(),
                    session.start_time.to_rfc3339(),
                    session.last_activity.to_rfc3339(),
                    session.context_summary.as_ref().map(|v| v.to_string()),
                    session.intent_analysis.as_ref().map(|v| v.to_string()),
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    pub fn get_session(&self, id: Uuid) -> Result<Session> {
        self.with_tx(|tx| {
            read_session(tx, id)?.ok_or_else(|| Error::NotFound(format!("session {id}")))
        })
    }

    /// Transition a session's status, enforcing the state machine.
    pub fn update_session_status(&self, id: Uuid, to: SessionStatus) -> Result<()> {
        self.with_tx(|tx| {
            let session = read_session(tx, id)?
                .ok_or_else(|| Error::NotFound(format!("session {id}")))?;
            if !SessionStatus::can_transition(session.status, to) {
                return Err(Error::bad_transition(session.status, to));
            }
            tx.execute(
                "UPDATE clipboard_sessions SET status = ?2 WHERE id = ?1",
                params![id.to_string(), to.as_str()],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    /// Overwrite the research artifacts of a session (latest wins).
    pub fn update_session_analysis(
        &self,
        id: Uuid,
        context_summary: Option<&serde_json::Value>,
        intent_analysis: Option<&serde_json::Value>,
    ) -> Result<()> {
        self.with_tx(|tx| {
            let n = tx
                .execute(
                    r#"
                    UPDATE clipboard_sessions
                    SET context_summary = COALESCE(?2, context_summary),
                        intent_analysis = COALESCE(?3, intent_analysis)
                    WHERE id = ?1
                    "#,
                    params![
                        id.to_string(),
                        context_summary.map(|v| v.to_string()),
                        intent_analysis.map(|v| v.to_string()),
                    ],
                )
                .map_err(db_err)?;
            if n == 0 {
                return Err(Error::NotFound(format!("session {id}")));
            }
            Ok(())
        })
    }

    /// Rename a session. Used when a later member yields a better label.
    pub fn update_session_label(&self, id: Uuid, label: &str) -> Result<()> {
        self.with_tx(|tx| {
            let n = tx
                .execute(
                    "UPDATE clipboard_sessions SET session_label = ?2 WHERE id = ?1",
                    params![id.to_string(), label],
                )
                .map_err(db_err)?;
            if n == 0 {
                return Err(Error::NotFound(format!("session {id}")));
            }
            Ok(())
        })
    }

    /// Append an item to a session with the next dense sequence order and
    /// advance `last_activity` to the max member timestamp.
    ///
    /// Returns the member count after the addition. An item may belong to
    /// at most one session.
    pub fn add_session_member(&self, session_id: Uuid, item_id: Uuid) -> Result<usize> {
        self.with_tx(|tx| {
            let existing: Option<String> = tx
                .query_row(
                    "SELECT session_id FROM session_members WHERE clipboard_item_id = ?1",
                    params![item_id.to_string()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err)?;
            if let Some(owner) = existing {
                return Err(Error::SessionConflict(format!(
                    "item {item_id} already belongs to session {owner}"
                )));
            }

            let next: i64 = tx
                .query_row(
                    "SELECT COALESCE(MAX(sequence_order), 0) + 1
                     FROM session_members WHERE session_id = ?1",
                    params![session_id.to_string()],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            tx.execute(
                r#"
                INSERT INTO session_members (session_id, clipboard_item_id, sequence_order)
                VALUES (?1, ?2, ?3)
                "#,
                params![session_id.to_string(), item_id.to_string(), next],
            )
            .map_err(db_err)?;

            touch_last_activity(tx, session_id)?;
            Ok(next as usize)
        })
    }

    /// Move an item between sessions, re-densifying both member lists.
    pub fn move_member(&self, from: Uuid, to: Uuid, item_id: Uuid) -> Result<()> {
        self.with_tx(|tx| {
            let n = tx
                .execute(
                    "DELETE FROM session_members
                     WHERE session_id = ?1 AND clipboard_item_id = ?2",
                    params![from.to_string(), item_id.to_string()],
                )
                .map_err(db_err)?;
            if n == 0 {
                return Err(Error::NotFound(format!(
                    "item {item_id} in session {from}"
                )));
            }
            densify(tx, from)?;

            let next: i64 = tx
                .query_row(
                    "SELECT COALESCE(MAX(sequence_order), 0) + 1
                     FROM session_members WHERE session_id = ?1",
                    params![to.to_string()],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            tx.execute(
                "INSERT INTO session_members (session_id, clipboard_item_id, sequence_order)
                 VALUES (?1, ?2, ?3)",
                params![to.to_string(), item_id.to_string(), next],
            )
            .map_err(db_err)?;

            touch_last_activity(tx, from)?;
            touch_last_activity(tx, to)?;
            Ok(())
        })
    }

    pub fn get_session_members_ordered(&self, session_id: Uuid) -> Result<Vec<SessionMember>> {
        self.with_tx(|tx| {
            let mut stmt = tx
                .prepare(
                    "SELECT session_id, clipboard_item_id, sequence_order
                     FROM session_members WHERE session_id = ?1
                     ORDER BY sequence_order",
                )
                .map_err(db_err)?;
            let rows: Vec<(String, String, i64)> = stmt
                .query_map(params![session_id.to_string()], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })
                .map_err(db_err)?
                .collect::<std::result::Result<_, _>>()
                .map_err(db_err)?;
            rows.into_iter()
                .map(|(sid, iid, ord)| {
                    Ok(SessionMember {
                        session_id: parse_uuid(&sid)?,
                        clipboard_item_id: parse_uuid(&iid)?,
                        sequence_order: ord as u32,
                    })
                })
                .collect()
        })
    }

    pub fn session_item_count(&self, session_id: Uuid) -> Result<usize> {
        self.with_tx(|tx| {
            let n: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM session_members WHERE session_id = ?1",
                    params![session_id.to_string()],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            Ok(n as usize)
        })
    }

    pub fn get_active_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>> {
        self.with_tx(|tx| {
            let limit = if filter.limit == 0 { 50 } else { filter.limit } as i64;
            let sessions = match filter.session_type {
                Some(t) => query_sessions(
                    tx,
                    "SELECT id FROM clipboard_sessions
                     WHERE status = 'active' AND session_type = ?1
                     ORDER BY last_activity DESC LIMIT ?2",
                    params![t.as_str(), limit],
                )?,
                None => query_sessions(
                    tx,
                    "SELECT id FROM clipboard_sessions
                     WHERE status = 'active'
                     ORDER BY last_activity DESC LIMIT ?1",
                    params![limit],
                )?,
            };
            Ok(sessions)
        })
    }

    /// Sessions a new item could join: active or inactive, last activity
    /// strictly inside the join window, newest first. Expired and completed
    /// sessions are never candidates.
    pub fn find_session_candidates(
        &self,
        item_ts: DateTime<Utc>,
        join_window: std::time::Duration,
    ) -> Result<Vec<Session>> {
        let horizon = item_ts
            - chrono::Duration::from_std(join_window)
                .map_err(|e| Error::Other(format!("join window out of range: {e}")))?;
        self.with_tx(|tx| {
            query_sessions(
                tx,
                "SELECT id FROM clipboard_sessions
                 WHERE status IN ('active', 'inactive') AND last_activity > ?1
                 ORDER BY last_activity DESC",
                params![horizon.to_rfc3339()],
            )
        })
    }

    /// Sessions whose idleness has crossed `idle_timeout` as of `now`.
    pub fn idle_sessions(
        &self,
        now: DateTime<Utc>,
        idle_timeout: std::time::Duration,
    ) -> Result<Vec<Session>> {
        let cutoff = now
            - chrono::Duration::from_std(idle_timeout)
                .map_err(|e| Error::Other(format!("idle timeout out of range: {e}")))?;
        self.with_tx(|tx| {
            query_sessions(
                tx,
                "SELECT id FROM clipboard_sessions
                 WHERE status IN ('active', 'inactive') AND last_activity < ?1
                 ORDER BY last_activity",
                params![cutoff.to_rfc3339()],
            )
        })
    }

    pub fn delete_session(&self, id: Uuid) -> Result<()> {
        self.with_tx(|tx| {
            let n = tx
                .execute(
                    "DELETE FROM clipboard_sessions WHERE id = ?1",
                    params![id.to_string()],
                )
                .map_err(db_err)?;
            if n == 0 {
                return Err(Error::NotFound(format!("session {id}")));
            }
            Ok(())
        })
    }
}

// ── internals ───────────────────────────────────────────────────────

fn read_session(tx: &Transaction<'_>, id: Uuid) -> Result<Option<Session>> {
    let raw = tx
        .query_row(
            r#"
            SELECT id, session_type, session_label, status, start_time,
                   last_activity, context_summary, intent_analysis
            FROM clipboard_sessions WHERE id = ?1
            "#,
            params![id.to_string()],
            row_to_session_parts,
        )
        .optional()
        .map_err(db_err)?;
    raw.map(parts_to_session).transpose()
}

type SessionParts = (
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
);

fn row_to_session_parts(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionParts> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn parts_to_session(parts: SessionParts) -> Result<Session> {
    let (id, session_type, label, status, start, activity, summary, intent) = parts;
    Ok(Session {
        id: parse_uuid(&id)?,
        session_type: SessionType::parse_lossy(&session_type),
        session_label: label,
        status: SessionStatus::parse(&status)
            .ok_or_else(|| Error::StoreIo(format!("bad session status {status:?}")))?,
        start_time: parse_ts(&start)?,
        last_activity: parse_ts(&activity)?,
        context_summary: summary
            .map(|v| serde_json::from_str(&v))
            .transpose()
            .map_err(|e| Error::StoreIo(format!("bad context_summary: {e}")))?,
        intent_analysis: intent
            .map(|v| serde_json::from_str(&v))
            .transpose()
            .map_err(|e| Error::StoreIo(format!("bad intent_analysis: {e}")))?,
    })
}

fn query_sessions(
    tx: &Transaction<'_>,
    sql: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<Session>> {
    let mut stmt = tx.prepare(sql).map_err(db_err)?;
    let ids: Vec<String> = stmt
        .query_map(args, |row| row.get(0))
        .map_err(db_err)?
        .collect::<std::result::Result<_, _>>()
        .map_err(db_err)?;
    drop(stmt);
    ids.into_iter()
        .map(|id| {
            read_session(tx, parse_uuid(&id)?)?
                .ok_or_else(|| Error::StoreIo(format!("session {id} vanished mid-query")))
        })
        .collect()
}

/// Set `last_activity` to the max member timestamp (or leave it when the
/// session has no members left).
fn touch_last_activity(tx: &Transaction<'_>, session_id: Uuid) -> Result<()> {
    tx.execute(
        r#"
        UPDATE clipboard_sessions
        SET last_activity = COALESCE(
            (SELECT MAX(i.timestamp)
             FROM session_members m
             JOIN clipboard_items i ON i.id = m.clipboard_item_id
             WHERE m.session_id = ?1),
            last_activity)
        WHERE id = ?1
        "#,
        params![session_id.to_string()],
    )
    .map_err(db_err)?;
    Ok(())
}

/// Rewrite sequence orders to a dense 1..N by current order.
fn densify(tx: &Transaction<'_>, session_id: Uuid) -> Result<()> {
    let mut stmt = tx
        .prepare(
            "SELECT clipboard_item_id FROM session_members
             WHERE session_id = ?1 ORDER BY sequence_order",
        )
        .map_err(db_err)?;
    let ids: Vec<String> = stmt
        .query_map(params![session_id.to_string()], |row| row.get(0))
        .map_err(db_err)?
        .collect::<std::result::Result<_, _>>()
        .map_err(db_err)?;
    drop(stmt);
    for (idx, item_id) in ids.iter().enumerate() {
        tx.execute(
            "UPDATE session_members SET sequence_order = ?3
             WHERE session_id = ?1 AND clipboard_item_id = ?2",
            params![session_id.to_string(), item_id, (idx + 1) as i64],
        )
        .map_err(db_err)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fc_domain::item::{CaptureContext, ClipboardItem};

    fn seeded() -> (Store, Vec<ClipboardItem>) {
        let store = Store::open_in_memory().unwrap();
        let mut items = Vec::new();
        for i in 0..4 {
            let mut it =
                ClipboardItem::new(format!("capture number {i}"), CaptureContext::default());
            it.timestamp = Utc::now() + chrono::Duration::seconds(i);
            store.insert_item(&it).unwrap();
            items.push(it);
        }
        (store, items)
    }

    fn new_session(store: &Store) -> Session {
        let s = Session::new(SessionType::GeneralResearch, "General Research".into(), Utc::now());
        store.create_session(&s).unwrap();
        s
    }

    #[test]
    fn members_get_dense_order_and_activity_tracks_max() {
        let (store, items) = seeded();
        let s = new_session(&store);

        assert_eq!(store.add_session_member(s.id, items[0].id).unwrap(), 1);
        assert_eq!(store.add_session_member(s.id, items[2].id).unwrap(), 2);

        let members = store.get_session_members_ordered(s.id).unwrap();
        let orders: Vec<u32> = members.iter().map(|m| m.sequence_order).collect();
        assert_eq!(orders, vec![1, 2]);

        let got = store.get_session(s.id).unwrap();
        assert_eq!(got.last_activity, items[2].timestamp);
    }

    #[test]
    fn item_cannot_join_two_sessions() {
        let (store, items) = seeded();
        let s1 = new_session(&store);
        let s2 = new_session(&store);

        store.add_session_member(s1.id, items[0].id).unwrap();
        let err = store.add_session_member(s2.id, items[0].id).unwrap_err();
        assert!(matches!(err, Error::SessionConflict(_)));
    }

    #[test]
    fn move_member_redensifies_both_sides() {
        let (store, items) = seeded();
        let s1 = new_session(&store);
        let s2 = new_session(&store);

        for it in &items[..3] {
            store.add_session_member(s1.id, it.id).unwrap();
        }
        store.move_member(s1.id, s2.id, items[1].id).unwrap();

        let left: Vec<u32> = store
            .get_session_members_ordered(s1.id)
            .unwrap()
            .iter()
            .map(|m| m.sequence_order)
            .collect();
        assert_eq!(left, vec![1, 2]);

        let right = store.get_session_members_ordered(s2.id).unwrap();
        assert_eq!(right.len(), 1);
        assert_eq!(right[0].sequence_order, 1);
        assert_eq!(right[0].clipboard_item_id, items[1].id);
    }

    #[test]
    fn illegal_status_transition_rejected() {
        let (store, _) = seeded();
        let s = new_session(&store);

        store
            .update_session_status(s.id, SessionStatus::Expired)
            .unwrap();
        let err = store
            .update_session_status(s.id, SessionStatus::Active)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));
    }

    #[test]
    fn candidates_exclude_expired_and_out_of_window() {
        let (store, _) = seeded();
        let now = Utc::now();

        let fresh = new_session(&store);
        let expired = new_session(&store);
        store
            .update_session_status(expired.id, SessionStatus::Expired)
            .unwrap();

        // A session whose last activity sits exactly at the window boundary.
        let stale = Session::new(
            SessionType::GeneralResearch,
            "General Research".into(),
            now - chrono::Duration::seconds(1200),
        );
        store.create_session(&stale).unwrap();

        let candidates = store
            .find_session_candidates(now, std::time::Duration::from_secs(1200))
            .unwrap();
        let ids: Vec<Uuid> = candidates.iter().map(|s| s.id).collect();
        assert!(ids.contains(&fresh.id));
        assert!(!ids.contains(&expired.id));
        assert!(!ids.contains(&stale.id));
    }

    #[test]
    fn active_sessions_filtered_by_type() {
        let (store, items) = seeded();
        let hotel = Session::new(
            SessionType::HotelResearch,
            "Hotel Research".into(),
            Utc::now(),
        );
        store.create_session(&hotel).unwrap();
        store.add_session_member(hotel.id, items[0].id).unwrap();
        store.add_session_member(hotel.id, items[1].id).unwrap();
        store
            .update_session_status(hotel.id, SessionStatus::Active)
            .unwrap();

        let inactive = new_session(&store);
        store.add_session_member(inactive.id, items[2].id).unwrap();

        let all = store.get_active_sessions(&SessionFilter::default()).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, hotel.id);

        let general = store
            .get_active_sessions(&SessionFilter {
                session_type: Some(SessionType::GeneralResearch),
                limit: 10,
            })
            .unwrap();
        assert!(general.is_empty());
    }

    #[test]
    fn delete_session_cascades_members() {
        let (store, items) = seeded();
        let s = new_session(&store);
        store.add_session_member(s.id, items[0].id).unwrap();

        store.delete_session(s.id).unwrap();
        // The item survives; the edge does not.
        assert!(store.get_item(items[0].id).is_ok());
        let orphan = Session::new(SessionType::GeneralResearch, "x".into(), Utc::now());
        store.create_session(&orphan).unwrap();
        let err = store.add_session_member(orphan.id, items[0].id);
        assert!(err.is_ok(), "membership edge should have been cascaded away");
    }
}
